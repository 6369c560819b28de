//! Strongly typed views over metadata maps
//!
//! A metadata view is a read-only struct whose properties are bound from a [MetadataMap]:
//!
//! * an absent key binds the declared fallback, or the [Default] of the property type;
//! * a present key is converted with [FromMetadata]; a value of the wrong type binds the
//!   fallback when one is declared, any other failure is reported as
//!   [ExportError::MetadataCoercion].
//!
//! View types are usually generated with the [metadata_view](crate::metadata_view) macro.
//! The [ViewCache] validates each view shape once and keeps the resulting [ViewFactory].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::ExportError;
use crate::metadata::{CoercionFailure, FromMetadata, MetadataMap};

/// Description of a single view property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyShape {
    name: &'static str,
    type_name: &'static str,
    writable: bool,
    has_fallback: bool,
}

impl PropertyShape {
    pub fn read_only(name: &'static str, type_name: &'static str, has_fallback: bool) -> Self {
        Self {
            name,
            type_name,
            writable: false,
            has_fallback,
        }
    }

    pub fn writable(name: &'static str, type_name: &'static str) -> Self {
        Self {
            name,
            type_name,
            writable: true,
            has_fallback: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn has_fallback(&self) -> bool {
        self.has_fallback
    }
}

/// Description of a view: its name and the list of its properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewShape {
    name: &'static str,
    properties: Vec<PropertyShape>,
}

impl ViewShape {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: PropertyShape) -> Self {
        self.properties.push(property);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn properties(&self) -> &[PropertyShape] {
        &self.properties
    }

    /// Reject shapes that expose anything but readable properties
    pub fn validate(&self) -> Result<(), ExportError> {
        match self.properties.iter().find(|p| p.writable) {
            Some(property) => Err(ExportError::InvalidViewShape {
                view: self.name,
                property: property.name,
            }),
            None => Ok(()),
        }
    }
}

/// A read-only value bound from a metadata map.
///
/// Binding is the whole conversion pass: once `bind` succeeds, reading a property does no further work.
pub trait MetadataView: Sized + Send + Sync + 'static {
    fn view_shape() -> ViewShape;

    /// Build the view. Callers go through a [ViewFactory], which validates the shape first.
    fn bind(metadata: &MetadataMap) -> Result<Self, ExportError>;
}

/// The map itself is the loosest possible view
impl MetadataView for MetadataMap {
    fn view_shape() -> ViewShape {
        ViewShape::new("MetadataMap")
    }

    fn bind(metadata: &MetadataMap) -> Result<Self, ExportError> {
        Ok(metadata.clone())
    }
}

/// Empty view, for exports whose metadata is not requested
impl MetadataView for () {
    fn view_shape() -> ViewShape {
        ViewShape::new("()")
    }

    fn bind(_metadata: &MetadataMap) -> Result<Self, ExportError> {
        Ok(())
    }
}

/// Bind a single view property.
///
/// This is the building block of generated [MetadataView::bind] implementations.
pub fn bind_property<T: FromMetadata>(
    metadata: &MetadataMap,
    view: &'static str,
    property: &'static str,
    fallback: Option<T>,
) -> Result<T, ExportError> {
    let Some(value) = metadata.get(property) else {
        return Ok(fallback.unwrap_or_default());
    };
    match (T::from_metadata(value), fallback) {
        (Ok(bound), _) => Ok(bound),
        (Err(CoercionFailure::WrongType), Some(fallback)) => Ok(fallback),
        (Err(failure), _) => Err(ExportError::MetadataCoercion {
            property,
            view,
            source_type: value.type_name(),
            failure,
        }),
    }
}

/// Validated adapter from metadata maps to a view type
pub struct ViewFactory<V> {
    shape: ViewShape,
    bind: fn(&MetadataMap) -> Result<V, ExportError>,
}

impl<V: MetadataView> ViewFactory<V> {
    /// Validate the view shape and build its factory
    pub fn generate() -> Result<Self, ExportError> {
        let shape = V::view_shape();
        shape.validate()?;
        Ok(Self { shape, bind: V::bind })
    }

    pub fn shape(&self) -> &ViewShape {
        &self.shape
    }

    pub fn create(&self, metadata: &MetadataMap) -> Result<V, ExportError> {
        (self.bind)(metadata)
    }
}

impl<V> fmt::Debug for ViewFactory<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewFactory").field("shape", &self.shape).finish()
    }
}

type SharedFactory = Arc<dyn Any + Send + Sync>;

/// Store view factories of [Any] view type, one per view type
#[derive(Default)]
pub struct ViewCache {
    factories: RwLock<HashMap<TypeId, SharedFactory>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the factory of a view type, generating it on first use.
    ///
    /// Invalid shapes are not cached: every request reports the same error again.
    pub fn factory<V: MetadataView>(&self) -> Result<Arc<ViewFactory<V>>, ExportError> {
        let key = TypeId::of::<V>();
        if let Some(existing) = self.factories.read().get(&key) {
            return Ok(downcast_factory(existing));
        }

        let mut factories = self.factories.write();
        if let Some(existing) = factories.get(&key) {
            return Ok(downcast_factory(existing));
        }
        let factory = Arc::new(ViewFactory::<V>::generate()?);
        debug!(view = factory.shape().name(), "generated metadata view factory");
        factories.insert(key, factory.clone());
        Ok(factory)
    }

    /// Bind a view of the given metadata
    pub fn get_view<V: MetadataView>(&self, metadata: &MetadataMap) -> Result<V, ExportError> {
        self.factory::<V>()?.create(metadata)
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl fmt::Debug for ViewCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewCache").field("len", &self.len()).finish()
    }
}

fn downcast_factory<V: MetadataView>(entry: &SharedFactory) -> Arc<ViewFactory<V>> {
    match entry.clone().downcast::<ViewFactory<V>>() {
        Ok(factory) => factory,
        Err(_) => panic!("view cache entry does not hold a factory for its key"),
    }
}

/// Declare a read-only metadata view.
///
/// Each field becomes a property bound from the metadata key of the same name,
/// exposed through a getter. A field may declare a fallback with ```= value```.
///
/// ```
/// use contractor::{metadata_view, MetadataMap, ViewCache};
///
/// metadata_view! {
///     /// Metadata of a logger export
///     pub struct LoggerInfo {
///         name: String,
///         priority: i32 = 10,
///     }
/// }
///
/// let metadata: MetadataMap = [("name", "console")].into_iter().collect();
/// let info = ViewCache::new().get_view::<LoggerInfo>(&metadata).unwrap();
/// assert_eq!(info.name(), "console");
/// assert_eq!(*info.priority(), 10);
/// ```
#[macro_export]
macro_rules! metadata_view {
    (@has_fallback) => { false };
    (@has_fallback $fallback:expr) => { true };
    (@fallback) => { ::core::option::Option::None };
    (@fallback $fallback:expr) => { ::core::option::Option::Some(::core::convert::Into::into($fallback)) };
    (
        $(#[$attr:meta])*
        $vis:vis struct $View:ident {
            $( $(#[$field_attr:meta])* $field:ident : $Type:ty $(= $fallback:expr)? ),* $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone)]
        $vis struct $View {
            $( $field: $Type, )*
        }

        impl $View {
            $(
            $(#[$field_attr])*
            pub fn $field(&self) -> &$Type {
                &self.$field
            }
            )*
        }

        impl $crate::MetadataView for $View {
            fn view_shape() -> $crate::ViewShape {
                $crate::ViewShape::new(::core::any::type_name::<Self>())
                    $( .with_property($crate::PropertyShape::read_only(
                        stringify!($field),
                        ::core::any::type_name::<$Type>(),
                        $crate::metadata_view!(@has_fallback $($fallback)?),
                    )) )*
            }

            fn bind(metadata: &$crate::MetadataMap) -> ::core::result::Result<Self, $crate::ExportError> {
                ::core::result::Result::Ok(Self {
                    $( $field: $crate::bind_property::<$Type>(
                        metadata,
                        ::core::any::type_name::<Self>(),
                        stringify!($field),
                        $crate::metadata_view!(@fallback $($fallback)?),
                    )?, )*
                })
            }
        }
    };
}
