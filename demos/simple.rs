use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use contractor::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

struct ConsoleLogger {
    prefix: String,
}

impl Logger for ConsoleLogger {
    fn log(&self, content: &str) {
        println!("{}{}", self.prefix, content);
    }
}

// Describe the metadata attached to logger exports

metadata_view! {
    struct LoggerInfo {
        name: String,
        verbosity: u8 = 1u8,
    }
}

// A part minting a new session logger per request

struct SessionPart {
    id: usize,
}

impl ComposablePart for SessionPart {
    fn exported_value(&mut self, _definition: &ExportDefinition) -> Result<ExportedValue, CompositionError> {
        let logger = ConsoleLogger {
            prefix: format!("[session {}] ", self.id),
        };
        Ok(ExportedValue::new(Arc::new(logger) as Arc<dyn Logger>))
    }

    fn into_disposal(self: Box<Self>) -> Option<DisposeAction> {
        Some(DisposeAction::new(move || println!("session {} closed", self.id)))
    }
}

struct SessionDefinition {
    origin: ElementDescriptor,
    exports: Vec<ExportDefinition>,
    sessions: AtomicUsize,
}

impl PartDefinition for SessionDefinition {
    fn origin(&self) -> &ElementDescriptor {
        &self.origin
    }

    fn export_definitions(&self) -> &[ExportDefinition] {
        &self.exports
    }

    fn create_part(&self) -> Box<dyn ComposablePart> {
        Box::new(SessionPart {
            id: self.sessions.fetch_add(1, Ordering::SeqCst),
        })
    }
}

struct SessionCreator(SessionDefinition);

impl PartCreator for SessionCreator {
    fn part_definition(&self) -> &dyn PartDefinition {
        &self.0
    }
}

fn main() -> Result<(), ExportError> {
    let context = CompositionContext::new();
    let contract = context.contract_name(&TypeDescriptor::named("Demo", "ILogger"));

    // A shared logger, released when its consumer is done
    let export = ExportRecord::new(contract.clone(), || {
        let logger = ConsoleLogger {
            prefix: "[main] ".to_string(),
        };
        Ok(ExportedValue::new(Arc::new(logger) as Arc<dyn Logger>))
    })
    .with_metadata([("name", "console")].into_iter().collect())
    .with_disposal(|| println!("console logger released"));

    let mut logger = context.wrap_with_metadata::<Arc<dyn Logger>, LoggerInfo>(&export)?;
    println!(
        "using '{}' at verbosity {}",
        logger.metadata().name(),
        logger.metadata().verbosity()
    );
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap();
    logger.value()?.log(&format!("{}s since epoch", now.as_secs()));
    logger.dispose();

    // Independent session loggers from a factory
    let creator = Arc::new(SessionCreator(SessionDefinition {
        origin: ElementDescriptor::new("SessionPart"),
        exports: vec![ExportDefinition::new(contract.clone())],
        sessions: AtomicUsize::new(0),
    }));
    let factory: ExportFactory<Arc<dyn Logger>> =
        context.export_factory(&ExportRecord::from_part_creator(contract, creator))?;

    for _ in 0..2 {
        let session = factory.create_export()?;
        session.value().log("opened");
        session.dispose();
    }

    Ok(())
}
