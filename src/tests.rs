use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::*;

trait Storage: Send + Sync {
    fn id(&self) -> usize;
}

struct MemoryStorage {
    id: usize,
}

impl Storage for MemoryStorage {
    fn id(&self) -> usize {
        self.id
    }
}

metadata_view! {
    struct StorageInfo {
        scheme: String,
        capacity: u32 = 16u32,
    }
}

fn storage_contract(context: &CompositionContext) -> ContractName {
    context.contract_name(&TypeDescriptor::named("Demo.Storage", "IStorage"))
}

/// Export of a storage whose producer counts its invocations
fn storage_export(contract: ContractName, produced: &Arc<AtomicUsize>) -> ExportRecord {
    let produced = produced.clone();
    ExportRecord::new(contract, move || {
        let id = produced.fetch_add(1, Ordering::SeqCst);
        Ok(ExportedValue::new(Arc::new(MemoryStorage { id }) as Arc<dyn Storage>))
    })
    .with_metadata([("scheme", "mem")].into_iter().collect())
    .with_origin(ElementDescriptor::new("MemoryStorage").with_origin(ElementDescriptor::new("storage.rs")))
}

#[test]
fn wrapped_exports_are_lazy_and_memoized() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let export = storage_export(storage_contract(&context), &produced);

    let lazy: LazyExport<Arc<dyn Storage>> = context.wrap(&export);
    assert_eq!(produced.load(Ordering::SeqCst), 0);
    assert!(!lazy.is_disposable());

    let (a, b) = (lazy.value()?.clone(), lazy.value()?.clone());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(produced.load(Ordering::SeqCst), 1);

    // another wrapper of the same record has its own slot
    let other: LazyExport<Arc<dyn Storage>> = context.wrap(&export);
    assert_eq!(other.value()?.id(), 1);
    assert_eq!(produced.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn metadata_views_are_bound_at_wrap_time() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let export = storage_export(storage_contract(&context), &produced);

    let lazy = context.wrap_with_metadata::<Arc<dyn Storage>, StorageInfo>(&export)?;
    assert_eq!(lazy.metadata().scheme(), "mem");
    assert_eq!(*lazy.metadata().capacity(), 16);
    assert_eq!(produced.load(Ordering::SeqCst), 0);

    let raw = context.wrap_with_metadata::<Arc<dyn Storage>, MetadataMap>(&export)?;
    assert!(raw.metadata().ptr_eq(export.metadata()));
    Ok(())
}

#[test]
fn metadata_coercion_failures_surface_from_wrap() {
    let context = CompositionContext::new();
    let export = ExportRecord::from_value("Demo.Counter", 3u64).with_metadata([("scheme", 7)].into_iter().collect());

    let err = context.wrap_with_metadata::<u64, StorageInfo>(&export).unwrap_err();
    assert!(matches!(
        err,
        ExportError::MetadataCoercion {
            property: "scheme",
            source_type: "i64",
            ..
        }
    ));
    assert_eq!(CompositionError::from(err).kind(), ErrorKind::MetadataCoercion);
}

#[test]
fn disposal_is_bound_before_materialization() {
    let context = CompositionContext::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = disposed.clone();
    let export = storage_export(storage_contract(&context), &produced).with_disposal(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut lazy: LazyExport<Arc<dyn Storage>> = context.wrap(&export);
    assert!(lazy.is_disposable());
    lazy.dispose();

    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(produced.load(Ordering::SeqCst), 0);
}

#[test]
fn narrowing_to_the_wrong_type_reports_the_origin() {
    let context = CompositionContext::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let export = storage_export(storage_contract(&context), &produced);

    let lazy: LazyExport<String> = context.wrap(&export);
    let err = lazy.value().unwrap_err();
    let ExportError::ContractMismatch { element, target, .. } = &err else {
        panic!("unexpected error {err:?}");
    };
    assert_eq!(element.display_name(), "MemoryStorage");
    assert_eq!(*target, "alloc::string::String");

    let record = CompositionError::from(err);
    assert!(record.report().ends_with("Element: MemoryStorage --> storage.rs"));
}

#[test]
fn producer_failures_are_activation_errors() {
    let context = CompositionContext::new();
    let export = ExportRecord::new("Demo.Broken", || {
        Err(CompositionError::new(ErrorKind::Unknown, "database unreachable"))
    });

    let lazy: LazyExport<u8> = context.wrap(&export);
    let err = lazy.value().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActivationFailure);
    assert_eq!(err.element().map(ElementDescriptor::display_name), Some("Demo.Broken"));
}

#[test]
fn cardinality_over_candidate_exports() {
    let context = CompositionContext::new();
    let contract = ContractName::from("Demo.Clock");
    let candidates = vec![
        ExportRecord::from_value(contract.clone(), 1u8),
        ExportRecord::from_value(contract.clone(), 2u8),
    ];

    assert_eq!(
        context.check_cardinality(ImportCardinality::ZeroOrOne, &candidates),
        CardinalityVerdict::TooManyExports
    );
    assert_eq!(
        context.check_cardinality(ImportCardinality::ZeroOrMore, &candidates),
        CardinalityVerdict::Match
    );
    assert_eq!(
        context.check_cardinality(ImportCardinality::ExactlyOne, candidates.iter().take(0)),
        CardinalityVerdict::NoExports
    );
}

#[test]
fn contexts_can_share_caches() {
    let first = CompositionContext::new();
    let second = CompositionContext::with_caches(first.name_cache().clone(), first.view_cache().clone());

    let ty = TypeDescriptor::named("Demo", "Shared");
    assert!(first.contract_name(&ty).ptr_eq(&second.contract_name(&ty)));
    assert_eq!(second.name_cache().len(), 1);
}

/// Part counting its instances and releases
struct StoragePart {
    id: usize,
    broken: bool,
    released: Arc<Mutex<Vec<usize>>>,
}

impl ComposablePart for StoragePart {
    fn exported_value(&mut self, _definition: &ExportDefinition) -> Result<ExportedValue, CompositionError> {
        if self.broken {
            return Err(CompositionError::new(ErrorKind::Unknown, "storage backend offline"));
        }
        Ok(ExportedValue::new(Arc::new(MemoryStorage { id: self.id }) as Arc<dyn Storage>))
    }

    fn into_disposal(self: Box<Self>) -> Option<DisposeAction> {
        Some(DisposeAction::new(move || self.released.lock().unwrap().push(self.id)))
    }
}

struct StorageDefinition {
    origin: ElementDescriptor,
    exports: Vec<ExportDefinition>,
    created: AtomicUsize,
    broken: bool,
    released: Arc<Mutex<Vec<usize>>>,
}

impl StorageDefinition {
    fn new(exports: Vec<ExportDefinition>) -> Self {
        Self {
            origin: ElementDescriptor::new("StoragePart"),
            exports,
            created: AtomicUsize::new(0),
            broken: false,
            released: Arc::default(),
        }
    }

    /// Parts of this definition fail to produce their export
    fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

impl PartDefinition for StorageDefinition {
    fn origin(&self) -> &ElementDescriptor {
        &self.origin
    }

    fn export_definitions(&self) -> &[ExportDefinition] {
        &self.exports
    }

    fn create_part(&self) -> Box<dyn ComposablePart> {
        Box::new(StoragePart {
            id: self.created.fetch_add(1, Ordering::SeqCst),
            broken: self.broken,
            released: self.released.clone(),
        })
    }
}

/// Creator instantiating parts from its definition
struct StorageCreator(StorageDefinition);

impl PartCreator for StorageCreator {
    fn part_definition(&self) -> &dyn PartDefinition {
        &self.0
    }
}

/// Creator with a product shortcut; its definition is never instantiated
struct FastStorageCreator {
    definition: StorageDefinition,
    minted: AtomicUsize,
    released: Arc<Mutex<Vec<usize>>>,
}

impl PartCreator for FastStorageCreator {
    fn part_definition(&self) -> &dyn PartDefinition {
        &self.definition
    }

    fn create_product(&self) -> Option<Result<Product, CompositionError>> {
        let id = 100 + self.minted.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        let value = ExportedValue::new(Arc::new(MemoryStorage { id }) as Arc<dyn Storage>);
        Some(Ok((value, DisposeAction::new(move || released.lock().unwrap().push(id)))))
    }
}

#[test]
fn export_factories_mint_independent_leases() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let contract = storage_contract(&context);
    let creator = Arc::new(StorageCreator(StorageDefinition::new(vec![
        ExportDefinition::new(contract.clone()),
        ExportDefinition::new("Demo.Unrelated"),
    ])));
    let released = creator.0.released.clone();
    let export = ExportRecord::from_part_creator(contract, creator);

    let factory: ExportFactory<Arc<dyn Storage>> = context.export_factory(&export)?;
    let first = factory.create_export()?;
    let second = factory.create_export()?;

    assert!(!Arc::ptr_eq(first.value(), second.value()));
    assert_eq!((first.value().id(), second.value().id()), (0, 1));

    second.dispose();
    assert_eq!(*released.lock().unwrap(), vec![1]);
    first.dispose();
    assert_eq!(*released.lock().unwrap(), vec![1, 0]);
    Ok(())
}

#[test]
fn export_factories_prefer_the_creator_shortcut() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let contract = storage_contract(&context);
    let released = Arc::new(Mutex::new(Vec::new()));
    let creator = Arc::new(FastStorageCreator {
        definition: StorageDefinition::new(vec![ExportDefinition::new(contract.clone())]),
        minted: AtomicUsize::new(0),
        released: released.clone(),
    });
    let export = ExportRecord::from_part_creator(contract, creator.clone())
        .with_metadata([("scheme", "fast")].into_iter().collect());

    let factory = context.export_factory_with_metadata::<Arc<dyn Storage>, StorageInfo>(&export)?;
    assert_eq!(factory.metadata().scheme(), "fast");

    let (value, disposal) = factory.create_export()?.into_parts();
    assert_eq!(value.id(), 100);
    assert_eq!(factory.create_export()?.dispose().id(), 101);
    disposal.run();

    assert_eq!(*released.lock().unwrap(), vec![101, 100]);
    assert_eq!(creator.definition.created.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn ambiguous_part_definitions_are_product_mismatches() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let contract = storage_contract(&context);
    let creator = Arc::new(StorageCreator(StorageDefinition::new(vec![
        ExportDefinition::new(contract.clone()),
        ExportDefinition::new(contract.clone()),
    ])));
    let export = ExportRecord::from_part_creator(contract, creator);

    let factory: ExportFactory<Arc<dyn Storage>> = context.export_factory(&export)?;
    let Err(err) = factory.create_export() else {
        panic!("two matching export definitions must be rejected");
    };
    assert!(matches!(
        err,
        ExportError::ProductMismatch {
            verdict: CardinalityVerdict::TooManyExports,
            ..
        }
    ));
    assert_eq!(err.element().map(ElementDescriptor::display_name), Some("StoragePart"));
    Ok(())
}

#[test]
fn parts_failing_to_export_are_released() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let contract = storage_contract(&context);
    let creator = Arc::new(StorageCreator(
        StorageDefinition::new(vec![ExportDefinition::new(contract.clone())]).broken(),
    ));
    let released = creator.0.released.clone();
    let export = ExportRecord::from_part_creator(contract, creator);

    let factory: ExportFactory<Arc<dyn Storage>> = context.export_factory(&export)?;
    let Err(err) = factory.create_export() else {
        panic!("a part failing to export must not produce a lease");
    };
    assert_eq!(err.kind(), ErrorKind::ActivationFailure);
    assert_eq!(*released.lock().unwrap(), vec![0]);
    Ok(())
}

#[test]
fn mistyped_products_are_released() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let contract = storage_contract(&context);
    let creator = Arc::new(StorageCreator(StorageDefinition::new(vec![ExportDefinition::new(
        contract.clone(),
    )])));
    let released = creator.0.released.clone();
    let export = ExportRecord::from_part_creator(contract, creator);

    let factory: ExportFactory<String> = context.export_factory(&export)?;
    assert!(matches!(factory.create_export(), Err(ExportError::ContractMismatch { .. })));
    assert_eq!(*released.lock().unwrap(), vec![0]);
    Ok(())
}

#[test]
fn plain_exports_cannot_back_a_factory() {
    let context = CompositionContext::new();
    let export = ExportRecord::from_value("Demo.Clock", 5u8);

    let err = context.export_factory::<u8>(&export).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContractMismatch);
}
