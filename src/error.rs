//! Errors reported while materializing exports
//!
//! Two layers coexist:
//!
//! * [ExportError] is the typed outcome of a single core operation.
//! * [CompositionError] is the immutable record that a composition engine collects in a
//!   batch-level error list. Every [ExportError] converts into one.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::cardinality::{CardinalityVerdict, ImportCardinality};
use crate::contract::ContractName;
use crate::metadata::CoercionFailure;

/// Classification of a [CompositionError]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unknown,
    ContractMismatch,
    MetadataCoercion,
    InvalidViewShape,
    CardinalityMismatch,
    ProductMismatch,
    ActivationFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Unknown => "unknown",
            ErrorKind::ContractMismatch => "contract mismatch",
            ErrorKind::MetadataCoercion => "metadata coercion",
            ErrorKind::InvalidViewShape => "invalid view shape",
            ErrorKind::CardinalityMismatch => "cardinality mismatch",
            ErrorKind::ProductMismatch => "product mismatch",
            ErrorKind::ActivationFailure => "activation failure",
        };
        f.write_str(label)
    }
}

/// Describes the element (part, export, import) an error originates from.
///
/// An element may itself originate from another one, forming a chain that is
/// displayed from the innermost element outwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDescriptor {
    display_name: Arc<str>,
    origin: Option<Arc<ElementDescriptor>>,
}

impl ElementDescriptor {
    pub fn new(display_name: impl Into<Arc<str>>) -> Self {
        Self {
            display_name: display_name.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: ElementDescriptor) -> Self {
        self.origin = Some(Arc::new(origin));
        self
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn origin(&self) -> Option<&ElementDescriptor> {
        self.origin.as_deref()
    }

    /// Iterate over this element and all its origins
    pub fn chain(&self) -> impl Iterator<Item = &ElementDescriptor> {
        std::iter::successors(Some(self), |e| e.origin())
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Errors triggered while wrapping, narrowing or describing exports
#[derive(Error, Debug, Clone)]
pub enum ExportError {
    #[error("the exported value of {element} is a {actual} and cannot be cast to {target}")]
    ContractMismatch {
        element: ElementDescriptor,
        target: &'static str,
        actual: &'static str,
    },
    #[error("metadata property '{property}' of view {view} cannot be read from a {source_type} value ({failure})")]
    MetadataCoercion {
        property: &'static str,
        view: &'static str,
        source_type: &'static str,
        failure: CoercionFailure,
    },
    #[error("{view} is not a valid metadata view: property '{property}' is writable")]
    InvalidViewShape {
        view: &'static str,
        property: &'static str,
    },
    #[error("{element} has {verdict} matching contract '{contract}' where exactly one is required")]
    ProductMismatch {
        element: ElementDescriptor,
        contract: ContractName,
        verdict: CardinalityVerdict,
    },
    #[error("activation of {element} failed")]
    Activation {
        element: ElementDescriptor,
        #[source]
        cause: CompositionError,
    },
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::ContractMismatch { .. } => ErrorKind::ContractMismatch,
            ExportError::MetadataCoercion { .. } => ErrorKind::MetadataCoercion,
            ExportError::InvalidViewShape { .. } => ErrorKind::InvalidViewShape,
            ExportError::ProductMismatch { .. } => ErrorKind::ProductMismatch,
            ExportError::Activation { .. } => ErrorKind::ActivationFailure,
        }
    }

    /// The element the failure originates from, if known
    pub fn element(&self) -> Option<&ElementDescriptor> {
        match self {
            ExportError::ContractMismatch { element, .. }
            | ExportError::ProductMismatch { element, .. }
            | ExportError::Activation { element, .. } => Some(element),
            ExportError::MetadataCoercion { .. } | ExportError::InvalidViewShape { .. } => None,
        }
    }
}

/// Immutable error record collected by a composition engine.
#[derive(Error, Debug, Clone)]
#[error("{description}")]
pub struct CompositionError {
    kind: ErrorKind,
    element: Option<ElementDescriptor>,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    description: String,
}

impl CompositionError {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            element: None,
            cause: None,
            description: description.into(),
        }
    }

    pub fn with_element(mut self, element: ElementDescriptor) -> Self {
        self.element = Some(element);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn element(&self) -> Option<&ElementDescriptor> {
        self.element.as_ref()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Render the description followed by the element chain, e.g. `Element: Export --> Part`
    pub fn report(&self) -> String {
        match &self.element {
            None => self.description.clone(),
            Some(element) => {
                let chain: Vec<&str> = element.chain().map(|e| e.display_name()).collect();
                format!("{}\nElement: {}", self.description, chain.join(" --> "))
            }
        }
    }

    pub(crate) fn cardinality(contract: &ContractName, cardinality: ImportCardinality, verdict: CardinalityVerdict) -> Self {
        CompositionError::new(
            ErrorKind::CardinalityMismatch,
            format!("import of '{contract}' expects {cardinality} but found {verdict}"),
        )
    }
}

impl From<ExportError> for CompositionError {
    fn from(err: ExportError) -> Self {
        let mut record = CompositionError::new(err.kind(), err.to_string());
        record.element = err.element().cloned();
        record.with_cause(err)
    }
}
