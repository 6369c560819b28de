//! Deferred, memoized exports

use std::fmt;

use once_cell::sync::OnceCell;

use crate::error::ExportError;

/// Release action of an export, run at most once
pub struct DisposeAction(Box<dyn FnOnce() + Send + Sync>);

impl DisposeAction {
    pub fn new(action: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Box::new(action))
    }

    /// An action releasing nothing
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for DisposeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DisposeAction")
    }
}

type Producer<T> = Box<dyn Fn() -> Result<T, ExportError> + Send + Sync>;

/// Export whose value is produced on first access.
///
/// The producer runs at most once successfully; a failed production is not
/// memoized and the next access runs the producer again.
/// A disposal bound at construction is released by [LazyExport::dispose],
/// whether the value was materialized or not. Dropping the export does not
/// dispose it.
pub struct LazyExport<T, M = ()> {
    value: OnceCell<T>,
    producer: Producer<T>,
    metadata: M,
    disposal: Option<DisposeAction>,
}

impl<T> LazyExport<T> {
    pub fn new(producer: impl Fn() -> Result<T, ExportError> + Send + Sync + 'static) -> Self {
        Self::with_metadata(producer, ())
    }
}

impl<T, M> LazyExport<T, M> {
    pub fn with_metadata(producer: impl Fn() -> Result<T, ExportError> + Send + Sync + 'static, metadata: M) -> Self {
        Self {
            value: OnceCell::new(),
            producer: Box::new(producer),
            metadata,
            disposal: None,
        }
    }

    /// Bind a disposal obligation to this export
    pub fn with_disposal(mut self, disposal: DisposeAction) -> Self {
        self.disposal = Some(disposal);
        self
    }

    /// Obtain the value, producing it on first access
    pub fn value(&self) -> Result<&T, ExportError> {
        self.value.get_or_try_init(|| (self.producer)())
    }

    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn is_disposable(&self) -> bool {
        self.disposal.is_some()
    }

    /// Release the bound disposal, if any.
    ///
    /// Only the first call releases anything.
    pub fn dispose(&mut self) {
        if let Some(disposal) = self.disposal.take() {
            disposal.run();
        }
    }

    /// Take the value out of the export, if it was produced
    pub fn into_value(self) -> Option<T> {
        self.value.into_inner()
    }
}

impl<T, M: fmt::Debug> fmt::Debug for LazyExport<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyExport")
            .field("value_created", &self.is_value_created())
            .field("metadata", &self.metadata)
            .field("disposable", &self.is_disposable())
            .finish()
    }
}
