//! Read-only metadata attached to exports
//!
//! A [MetadataMap] is finalized by the part scanner and never mutated afterwards.
//! Values are loosely typed ([MetadataValue]) and converted to concrete types through [FromMetadata].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Shared empty map, handed out by [MetadataMap::empty]
static EMPTY_METADATA: Lazy<MetadataMap> = Lazy::new(|| MetadataMap(Arc::new(HashMap::new())));

/// A value of arbitrary type stored in metadata
#[derive(Clone)]
pub struct OpaqueValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl OpaqueValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueValue({})", self.type_name)
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

/// Loosely typed metadata value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MetadataValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Multi-valued metadata
    List(Arc<[MetadataValue]>),
    Opaque(OpaqueValue),
}

impl MetadataValue {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        MetadataValue::Opaque(OpaqueValue::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }

    /// Name of the stored type, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::Null => "null",
            MetadataValue::Bool(_) => "bool",
            MetadataValue::Int(_) => "i64",
            MetadataValue::Float(_) => "f64",
            MetadataValue::Str(_) => "str",
            MetadataValue::List(_) => "list",
            MetadataValue::Opaque(v) => v.type_name(),
        }
    }
}

macro_rules! metadata_value_from {
    ($($Type:ty => $variant:ident $(as $Cast:ty)?),+ $(,)?) => {
        $(
        impl From<$Type> for MetadataValue {
            fn from(value: $Type) -> Self {
                MetadataValue::$variant(value $(as $Cast)?)
            }
        }
        )+
    };
}

metadata_value_from! {
    bool => Bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float,
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.into())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value.into())
    }
}

impl From<char> for MetadataValue {
    fn from(value: char) -> Self {
        MetadataValue::Str(value.to_string().into())
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(MetadataValue::Null, Into::into)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(values: Vec<T>) -> Self {
        MetadataValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Why a stored value could not be converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionFailure {
    /// The value is present but of another type (or out of range)
    WrongType,
    /// The value is null while the target type cannot represent it
    Null,
}

impl fmt::Display for CoercionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercionFailure::WrongType => f.write_str("wrong type"),
            CoercionFailure::Null => f.write_str("null value"),
        }
    }
}

/// Conversion from a metadata value to a concrete property type.
///
/// The [Default] value is used when the key is absent and no fallback is declared.
pub trait FromMetadata: Sized + Default {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure>;
}

fn non_null(value: &MetadataValue) -> Result<&MetadataValue, CoercionFailure> {
    match value {
        MetadataValue::Null => Err(CoercionFailure::Null),
        v => Ok(v),
    }
}

macro_rules! from_metadata_int {
    ($($Int:ty),+) => {
        $(
        impl FromMetadata for $Int {
            fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
                match non_null(value)? {
                    MetadataValue::Int(i) => <$Int>::try_from(*i).map_err(|_| CoercionFailure::WrongType),
                    _ => Err(CoercionFailure::WrongType),
                }
            }
        }
        )+
    };
}

from_metadata_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromMetadata for f64 {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        match non_null(value)? {
            MetadataValue::Float(f) => Ok(*f),
            _ => Err(CoercionFailure::WrongType),
        }
    }
}

impl FromMetadata for f32 {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        match f64::from_metadata(value)? {
            f if f.is_finite() && f.abs() > f32::MAX as f64 => Err(CoercionFailure::WrongType),
            f => Ok(f as f32),
        }
    }
}

impl FromMetadata for bool {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        match non_null(value)? {
            MetadataValue::Bool(b) => Ok(*b),
            _ => Err(CoercionFailure::WrongType),
        }
    }
}

impl FromMetadata for String {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        match non_null(value)? {
            MetadataValue::Str(s) => Ok(s.to_string()),
            _ => Err(CoercionFailure::WrongType),
        }
    }
}

impl FromMetadata for char {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        let MetadataValue::Str(s) = non_null(value)? else {
            return Err(CoercionFailure::WrongType);
        };
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(CoercionFailure::WrongType),
        }
    }
}

impl<T: FromMetadata> FromMetadata for Option<T> {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        match value {
            MetadataValue::Null => Ok(None),
            v => T::from_metadata(v).map(Some),
        }
    }
}

impl<T: FromMetadata> FromMetadata for Vec<T> {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        match non_null(value)? {
            MetadataValue::List(items) => items.iter().map(T::from_metadata).collect(),
            _ => Err(CoercionFailure::WrongType),
        }
    }
}

impl FromMetadata for MetadataValue {
    fn from_metadata(value: &MetadataValue) -> Result<Self, CoercionFailure> {
        Ok(value.clone())
    }
}

/// Read-only mapping from case-sensitive keys to metadata values
#[derive(Clone)]
pub struct MetadataMap(Arc<HashMap<String, MetadataValue>>);

impl MetadataMap {
    /// The shared empty map
    pub fn empty() -> Self {
        EMPTY_METADATA.clone()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check if both maps share the same storage
    pub fn ptr_eq(&self, other: &MetadataMap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for MetadataMap {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries: HashMap<String, MetadataValue> = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        if entries.is_empty() {
            return Self::empty();
        }
        MetadataMap(Arc::new(entries))
    }
}

impl PartialEq for MetadataMap {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl fmt::Debug for MetadataMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_maps_are_shared() {
        let a = MetadataMap::empty();
        let b: MetadataMap = Vec::<(String, MetadataValue)>::new().into_iter().collect();
        assert!(a.ptr_eq(&b));
        assert!(a.ptr_eq(&MetadataMap::default()));
    }

    #[test]
    fn keys_are_case_sensitive() {
        let map: MetadataMap = [("Name", "logger")].into_iter().collect();
        assert!(map.contains_key("Name"));
        assert!(!map.contains_key("name"));
    }

    #[test]
    fn integer_coercion_is_range_checked() {
        assert_eq!(i32::from_metadata(&MetadataValue::Int(5)), Ok(5));
        assert_eq!(u8::from_metadata(&MetadataValue::Int(300)), Err(CoercionFailure::WrongType));
        assert_eq!(u32::from_metadata(&MetadataValue::Int(-1)), Err(CoercionFailure::WrongType));
        assert_eq!(i32::from_metadata(&"5".into()), Err(CoercionFailure::WrongType));
    }

    #[test]
    fn float_narrowing_is_range_checked() {
        assert_eq!(f32::from_metadata(&MetadataValue::Float(1.5)), Ok(1.5));
        assert_eq!(f32::from_metadata(&MetadataValue::Float(1e300)), Err(CoercionFailure::WrongType));
        assert_eq!(f32::from_metadata(&MetadataValue::Float(-1e300)), Err(CoercionFailure::WrongType));
        assert_eq!(f32::from_metadata(&MetadataValue::Float(f64::INFINITY)), Ok(f32::INFINITY));
    }

    #[test]
    fn null_is_a_distinct_failure() {
        assert_eq!(String::from_metadata(&MetadataValue::Null), Err(CoercionFailure::Null));
        assert_eq!(Option::<String>::from_metadata(&MetadataValue::Null), Ok(None));
        assert_eq!(Option::<i64>::from_metadata(&MetadataValue::Int(3)), Ok(Some(3)));
        assert_eq!(MetadataValue::from_metadata(&MetadataValue::Null), Ok(MetadataValue::Null));
    }

    #[test]
    fn lists_convert_element_wise() {
        let value = MetadataValue::from(vec!["a", "b"]);
        assert_eq!(Vec::<String>::from_metadata(&value), Ok(vec!["a".to_string(), "b".to_string()]));

        let mixed = MetadataValue::List(Arc::new([MetadataValue::Int(1), MetadataValue::from("b")]));
        assert_eq!(Vec::<i64>::from_metadata(&mixed), Err(CoercionFailure::WrongType));
    }

    #[test]
    fn opaque_values_keep_their_type_name() {
        #[derive(Debug, PartialEq)]
        struct Endpoint(u16);

        let value = MetadataValue::opaque(Endpoint(8080));
        assert!(value.type_name().ends_with("Endpoint"));
        let MetadataValue::Opaque(opaque) = &value else {
            panic!("expected an opaque value");
        };
        assert_eq!(opaque.downcast_ref::<Endpoint>(), Some(&Endpoint(8080)));
    }
}
