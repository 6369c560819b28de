//! Composition core of an attribute-driven dependency injection runtime.
//!
//! Parts (providers) export values under named contracts; consumers import them.
//! Deciding which part satisfies which import is left to a composition engine: this crate
//! names contracts, materializes and disposes exports, and validates multiplicity.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use contractor::*;
//! // A service and the metadata describing it
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English;
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "Hello".to_string()
//!     }
//! }
//!
//! metadata_view! {
//!     struct GreeterInfo {
//!         language: String,
//!         formal: bool = false,
//!     }
//! }
//!
//! # fn main() -> Result<(), ExportError> {
//! let context = CompositionContext::new();
//! let contract = context.contract_name(&TypeDescriptor::named("Demo", "IGreeter"));
//!
//! // An export as discovered by a part scanner
//! let export = ExportRecord::new(contract, || Ok(ExportedValue::new(Arc::new(English) as Arc<dyn Greeter>)))
//!     .with_metadata([("language", "en")].into_iter().collect());
//!
//! // A consumer asks for a typed, lazy view of it
//! let greeter = context.wrap_with_metadata::<Arc<dyn Greeter>, GreeterInfo>(&export)?;
//! assert_eq!(greeter.metadata().language(), "en");
//! assert_eq!(greeter.value()?.greet(), "Hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! * [TypeDescriptor]s are turned into canonical [ContractName]s by [type_identity],
//!   memoized in a [ContractNameCache].
//! * [MetadataMap]s are presented as strongly typed views through the [MetadataView] trait,
//!   usually implemented with the [metadata_view] macro. The [ViewCache] validates each view
//!   shape once and keeps its [ViewFactory].
//! * [LazyExport] defers the production of a value until first access and carries the
//!   disposal obligation of the export it wraps.
//! * [ExportFactory] mints a new [ExportLease] per request from a [PartCreator].
//! * [check_cardinality] classifies candidate exports against an [ImportCardinality].
//!
//! All caches live in an explicit [CompositionContext]; nothing is global except the shared
//! empty [MetadataMap].
//!
//! Failures are returned as [ExportError]s, which convert into [CompositionError] records
//! for engines that aggregate them.

mod cardinality;
mod context;
mod contract;
mod error;
mod export;
mod lazy;
mod metadata;
mod provide;
mod view;

pub use cardinality::{check_cardinality, CardinalityVerdict, ImportCardinality, ObservedCount};
pub use context::CompositionContext;
pub use contract::{type_identity, ContractName, ContractNameCache, Signature, TypeDescriptor};
pub use error::{CompositionError, ElementDescriptor, ErrorKind, ExportError};
pub use export::{
    ComposablePart, ExportDefinition, ExportFactory, ExportLease, ExportProducer, ExportRecord, ExportedValue,
    PartCreator, PartDefinition, Product, SharedDisposal,
};
pub use lazy::{DisposeAction, LazyExport};
pub use metadata::{CoercionFailure, FromMetadata, MetadataMap, MetadataValue, OpaqueValue};
pub use provide::{InstanceProvider, Provide, Provider, SingletonProvider};
pub use view::{bind_property, MetadataView, PropertyShape, ViewCache, ViewFactory, ViewShape};

#[cfg(test)]
mod tests;
