//! Entry point of the composition core
//!
//! A [CompositionContext] owns the contract-name and metadata-view caches and exposes
//! the operations used by a composition engine. Contexts are cheap to clone; clones
//! share the same caches, and [CompositionContext::with_caches] shares caches between
//! independently built contexts.

use std::any::Any;
use std::sync::Arc;

use crate::cardinality::{check_cardinality, CardinalityVerdict, ImportCardinality, ObservedCount};
use crate::contract::{ContractName, ContractNameCache, TypeDescriptor};
use crate::error::ExportError;
use crate::export::{ExportFactory, ExportRecord, PartCreator};
use crate::lazy::{DisposeAction, LazyExport};
use crate::metadata::MetadataMap;
use crate::view::{MetadataView, ViewCache};

#[derive(Debug, Clone, Default)]
pub struct CompositionContext {
    names: Arc<ContractNameCache>,
    views: Arc<ViewCache>,
}

impl CompositionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caches(names: Arc<ContractNameCache>, views: Arc<ViewCache>) -> Self {
        Self { names, views }
    }

    pub fn name_cache(&self) -> &Arc<ContractNameCache> {
        &self.names
    }

    pub fn view_cache(&self) -> &Arc<ViewCache> {
        &self.views
    }

    /// Canonical contract name of a type
    pub fn contract_name(&self, ty: &TypeDescriptor) -> ContractName {
        self.names.contract_name(ty)
    }

    /// Bind a metadata view
    pub fn get_view<V: MetadataView>(&self, metadata: &MetadataMap) -> Result<V, ExportError> {
        self.views.get_view(metadata)
    }

    /// Classify candidate exports against the cardinality of an import
    pub fn check_cardinality<I: IntoIterator>(&self, cardinality: ImportCardinality, candidates: I) -> CardinalityVerdict {
        check_cardinality(cardinality, ObservedCount::of(candidates))
    }

    /// Wrap an export as a lazy value of type `T`.
    ///
    /// The value is produced and narrowed on first access. If the record owns a resource,
    /// the returned export is bound to its disposal right away.
    pub fn wrap<T: Any + Clone + Send + Sync>(&self, export: &ExportRecord) -> LazyExport<T> {
        bind_disposal(LazyExport::new(narrowing_producer(export)), export)
    }

    /// Wrap an export as a lazy value of type `T` along with a metadata view `M`.
    ///
    /// The view is bound immediately, only the value is deferred.
    pub fn wrap_with_metadata<T, M>(&self, export: &ExportRecord) -> Result<LazyExport<T, M>, ExportError>
    where
        T: Any + Clone + Send + Sync,
        M: MetadataView,
    {
        let metadata = self.views.get_view::<M>(export.metadata())?;
        let lazy = LazyExport::with_metadata(narrowing_producer(export), metadata);
        Ok(bind_disposal(lazy, export))
    }

    /// Build a factory minting new instances of `T` from an export whose value is a [PartCreator]
    pub fn export_factory<T: Any + Clone>(&self, export: &ExportRecord) -> Result<ExportFactory<T>, ExportError> {
        self.export_factory_with_metadata(export)
    }

    pub fn export_factory_with_metadata<T, M>(&self, export: &ExportRecord) -> Result<ExportFactory<T, M>, ExportError>
    where
        T: Any + Clone,
        M: MetadataView,
    {
        let metadata = self.views.get_view::<M>(export.metadata())?;
        let creator: Arc<dyn PartCreator> = export.produce()?.narrow(export.origin())?;
        Ok(ExportFactory::new(
            creator,
            export.contract().clone(),
            export.origin().clone(),
            metadata,
        ))
    }
}

fn narrowing_producer<T: Any + Clone>(export: &ExportRecord) -> impl Fn() -> Result<T, ExportError> + Send + Sync + 'static {
    let export = export.clone();
    move || export.produce()?.narrow(export.origin())
}

fn bind_disposal<T, M>(lazy: LazyExport<T, M>, export: &ExportRecord) -> LazyExport<T, M> {
    match export.disposal() {
        Some(disposal) => {
            let disposal = disposal.clone();
            lazy.with_disposal(DisposeAction::new(move || (*disposal)()))
        }
        None => lazy,
    }
}
