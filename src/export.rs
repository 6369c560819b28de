//! Raw exports, as handed over by the part scanner, and export factories
//!
//! An [ExportRecord] names a contract, carries finalized metadata and a producer of
//! untyped [ExportedValue]s. Records that own a resource declare their disposal up front.
//!
//! An export whose value is a [PartCreator] can back an [ExportFactory], which mints a
//! new [ExportLease] on every request instead of sharing a single value.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::cardinality::{check_cardinality, CardinalityVerdict, ImportCardinality, ObservedCount};
use crate::contract::ContractName;
use crate::error::{CompositionError, ElementDescriptor, ExportError};
use crate::lazy::DisposeAction;
use crate::metadata::MetadataMap;
use crate::provide::{InstanceProvider, Provider, SingletonProvider};

/// Untyped exported value
#[derive(Clone)]
pub struct ExportedValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ExportedValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Narrow the value to the type expected by a consumer
    pub fn narrow<T: Any + Clone>(&self, element: &ElementDescriptor) -> Result<T, ExportError> {
        match self.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            None => Err(ExportError::ContractMismatch {
                element: element.clone(),
                target: std::any::type_name::<T>(),
                actual: self.type_name,
            }),
        }
    }
}

impl fmt::Debug for ExportedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExportedValue({})", self.type_name)
    }
}

/// Producer of an export value
pub type ExportProducer = Provider<Result<ExportedValue, CompositionError>>;

/// Release function of an exported resource, shared by every wrapper of the record
pub type SharedDisposal = Arc<dyn Fn() + Send + Sync>;

/// Raw export discovered by the part scanner
#[derive(Clone)]
pub struct ExportRecord {
    contract: ContractName,
    metadata: MetadataMap,
    origin: ElementDescriptor,
    producer: ExportProducer,
    disposal: Option<SharedDisposal>,
}

impl ExportRecord {
    /// Export computed by a producer function
    pub fn new(
        contract: impl Into<ContractName>,
        producer: impl Fn() -> Result<ExportedValue, CompositionError> + Send + Sync + 'static,
    ) -> Self {
        Self::from_producer(contract.into(), InstanceProvider::build(producer))
    }

    /// Export of a constant value
    pub fn from_value<T: Any + Send + Sync>(contract: impl Into<ContractName>, value: T) -> Self {
        Self::from_producer(contract.into(), SingletonProvider::build(Ok::<_, CompositionError>(ExportedValue::new(value))))
    }

    /// Export whose value is a part creator, usable as an [ExportFactory]
    pub fn from_part_creator(contract: impl Into<ContractName>, creator: Arc<dyn PartCreator>) -> Self {
        let origin = creator.part_definition().origin().clone();
        Self::from_value(contract, creator).with_origin(origin)
    }

    pub fn from_producer(contract: ContractName, producer: ExportProducer) -> Self {
        let origin = ElementDescriptor::new(contract.as_str());
        Self {
            contract,
            metadata: MetadataMap::empty(),
            origin,
            producer,
            disposal: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Describe the element this export originates from, for diagnostics
    pub fn with_origin(mut self, origin: ElementDescriptor) -> Self {
        self.origin = origin;
        self
    }

    /// Declare that the export owns a resource released by the given function
    pub fn with_disposal(mut self, disposal: impl Fn() + Send + Sync + 'static) -> Self {
        self.disposal = Some(Arc::new(disposal));
        self
    }

    pub fn contract(&self) -> &ContractName {
        &self.contract
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn origin(&self) -> &ElementDescriptor {
        &self.origin
    }

    pub fn producer(&self) -> &ExportProducer {
        &self.producer
    }

    pub fn disposal(&self) -> Option<&SharedDisposal> {
        self.disposal.as_ref()
    }

    /// Run the producer, reporting failures against the origin of the export
    pub fn produce(&self) -> Result<ExportedValue, ExportError> {
        self.producer.provide().map_err(|cause| ExportError::Activation {
            element: self.origin.clone(),
            cause,
        })
    }
}

impl fmt::Debug for ExportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRecord")
            .field("contract", &self.contract)
            .field("metadata", &self.metadata)
            .field("origin", &self.origin)
            .field("disposable", &self.disposal.is_some())
            .finish()
    }
}

/// Static description of an export of a part
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDefinition {
    contract: ContractName,
    metadata: MetadataMap,
}

impl ExportDefinition {
    pub fn new(contract: impl Into<ContractName>) -> Self {
        Self {
            contract: contract.into(),
            metadata: MetadataMap::empty(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn contract(&self) -> &ContractName {
        &self.contract
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }
}

/// Instantiated part
pub trait ComposablePart: Send {
    fn exported_value(&mut self, definition: &ExportDefinition) -> Result<ExportedValue, CompositionError>;

    /// The release action of a part owning resources, `None` for plain parts
    fn into_disposal(self: Box<Self>) -> Option<DisposeAction> {
        None
    }
}

/// Blueprint from which parts are instantiated
pub trait PartDefinition: Send + Sync {
    fn origin(&self) -> &ElementDescriptor;

    fn export_definitions(&self) -> &[ExportDefinition];

    fn create_part(&self) -> Box<dyn ComposablePart>;
}

/// A fresh product and its release action
pub type Product = (ExportedValue, DisposeAction);

/// Source of new part instances
pub trait PartCreator: Send + Sync {
    fn part_definition(&self) -> &dyn PartDefinition;

    /// Shortcut producing a product directly, bypassing part instantiation.
    ///
    /// Creators that do not support it return `None`.
    fn create_product(&self) -> Option<Result<Product, CompositionError>> {
        None
    }
}

/// Value minted by an [ExportFactory], together with its release action
#[must_use = "the lease must be disposed to release the product"]
pub struct ExportLease<T> {
    value: T,
    disposal: DisposeAction,
}

impl<T> ExportLease<T> {
    pub fn new(value: T, disposal: DisposeAction) -> Self {
        Self { value, disposal }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_parts(self) -> (T, DisposeAction) {
        (self.value, self.disposal)
    }

    /// Release the product and return its value
    pub fn dispose(self) -> T {
        self.disposal.run();
        self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for ExportLease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportLease").field("value", &self.value).finish()
    }
}

/// Repeatable producer of independent leases for a contract
pub struct ExportFactory<T, M = ()> {
    creator: Arc<dyn PartCreator>,
    contract: ContractName,
    origin: ElementDescriptor,
    metadata: M,
    target: PhantomData<fn() -> T>,
}

impl<T: Any + Clone, M> ExportFactory<T, M> {
    pub fn new(creator: Arc<dyn PartCreator>, contract: ContractName, origin: ElementDescriptor, metadata: M) -> Self {
        Self {
            creator,
            contract,
            origin,
            metadata,
            target: PhantomData,
        }
    }

    pub fn contract(&self) -> &ContractName {
        &self.contract
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Mint a new product. Every call yields an independent lease.
    pub fn create_export(&self) -> Result<ExportLease<T>, ExportError> {
        let (value, disposal) = match self.creator.create_product() {
            Some(product) => {
                trace!(contract = %self.contract, "export factory product from creator shortcut");
                product.map_err(|cause| self.activation_error(cause))?
            }
            None => {
                trace!(contract = %self.contract, "export factory product from part instantiation");
                self.instantiate()?
            }
        };

        match value.narrow::<T>(&self.origin) {
            Ok(value) => Ok(ExportLease::new(value, disposal)),
            Err(err) => {
                disposal.run();
                Err(err)
            }
        }
    }

    fn instantiate(&self) -> Result<Product, ExportError> {
        let definition = self.creator.part_definition();
        let matching: Vec<&ExportDefinition> = definition
            .export_definitions()
            .iter()
            .filter(|d| d.contract() == &self.contract)
            .collect();
        let export = match check_cardinality(ImportCardinality::ExactlyOne, ObservedCount::from(matching.len())) {
            CardinalityVerdict::Match => matching[0],
            verdict => {
                return Err(ExportError::ProductMismatch {
                    element: definition.origin().clone(),
                    contract: self.contract.clone(),
                    verdict,
                })
            }
        };

        let mut part = definition.create_part();
        match part.exported_value(export) {
            Ok(value) => Ok((value, part.into_disposal().unwrap_or_else(DisposeAction::noop))),
            Err(cause) => {
                // the part was created for this request only
                if let Some(disposal) = part.into_disposal() {
                    disposal.run();
                }
                Err(self.activation_error(cause))
            }
        }
    }

    fn activation_error(&self, cause: CompositionError) -> ExportError {
        ExportError::Activation {
            element: self.origin.clone(),
            cause,
        }
    }
}

impl<T, M: fmt::Debug> fmt::Debug for ExportFactory<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportFactory")
            .field("contract", &self.contract)
            .field("origin", &self.origin)
            .field("metadata", &self.metadata)
            .finish()
    }
}
