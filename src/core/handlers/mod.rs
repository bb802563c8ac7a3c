/// Backup handler registry
///
/// Handlers are registered on a [`RegistryBuilder`] at startup. `build()`
/// freezes the set: the resulting [`HandlerRegistry`] has no mutators and is
/// shared read-only for the rest of the process.

pub mod module;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::error::{BackupError, Result};
use super::i18n::Translator;
use super::ledger::BackupLedger;
use super::record::BackupRequest;
use crate::utils::MODULE_HANDLER_ID;

pub use module::ModuleHandler;

/// A producer (and optionally restorer) for one kind of backed-up unit
pub trait BackupHandler: Send + Sync {
    /// Create a backup. `Ok(false)` means the handler declined or failed
    /// without a specific error.
    fn backup(&self, request: BackupRequest, ledger: &BackupLedger) -> Result<bool>;

    fn restore(&self, _request: BackupRequest, _ledger: &BackupLedger) -> Result<bool> {
        Err(BackupError::Unsupported {
            handler: std::any::type_name::<Self>().to_string(),
            operation: "restore",
        })
    }
}

#[derive(Clone)]
pub struct HandlerDescriptor {
    pub id: String,
    pub name: String,
    handler: Arc<dyn BackupHandler>,
}

impl HandlerDescriptor {
    pub fn handler(&self) -> &dyn BackupHandler {
        self.handler.as_ref()
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Serializable view of a handler for listings
#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Restore,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Backup => "backup",
            Operation::Restore => "restore",
        }
    }
}

/// Result of running a handler. Faults never escape the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Success,
    Failed,
    UnknownHandler(String),
    Error(String),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }

    pub fn message(&self) -> String {
        match self {
            DispatchOutcome::Success => "Operation completed".to_string(),
            DispatchOutcome::Failed => "Operation failed".to_string(),
            DispatchOutcome::UnknownHandler(id) => format!("Handler {} not found", id),
            DispatchOutcome::Error(msg) => msg.clone(),
        }
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<HandlerDescriptor>,
}

impl RegistryBuilder {
    /// Add or replace the handler for `id`. A replacement keeps the
    /// original position.
    pub fn register(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        handler: impl BackupHandler + 'static,
    ) -> Self {
        let descriptor = HandlerDescriptor {
            id: id.into(),
            name: name.into(),
            handler: Arc::new(handler),
        };

        match self.entries.iter_mut().find(|d| d.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => self.entries.push(descriptor),
        }
        self
    }

    /// Register the built-in module handler
    pub fn with_defaults(self, translator: Arc<dyn Translator>) -> Self {
        let name = translator.text("Module", &[]);
        self.register(MODULE_HANDLER_ID, name, ModuleHandler::new(translator))
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            entries: self.entries,
        }
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<HandlerDescriptor>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, id: &str) -> Option<&HandlerDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    /// Handlers in registration order
    pub fn list(&self) -> &[HandlerDescriptor] {
        &self.entries
    }

    pub fn info(&self) -> Vec<HandlerInfo> {
        self.entries
            .iter()
            .map(|d| HandlerInfo {
                id: d.id.clone(),
                name: d.name.clone(),
            })
            .collect()
    }

    /// Run `operation` on the handler registered as `id`
    pub fn dispatch(
        &self,
        id: &str,
        operation: Operation,
        request: BackupRequest,
        ledger: &BackupLedger,
    ) -> DispatchOutcome {
        let Some(descriptor) = self.get(id) else {
            warn!("Backup handler {} is not registered", id);
            return DispatchOutcome::UnknownHandler(id.to_string());
        };

        let handler = descriptor.handler();
        let result = panic::catch_unwind(AssertUnwindSafe(|| match operation {
            Operation::Backup => handler.backup(request, ledger),
            Operation::Restore => handler.restore(request, ledger),
        }));

        match result {
            Ok(Ok(true)) => DispatchOutcome::Success,
            Ok(Ok(false)) => DispatchOutcome::Failed,
            Ok(Err(e)) => {
                warn!("Handler {} failed to {}: {}", id, operation.as_str(), e);
                DispatchOutcome::Error(e.to_string())
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                warn!("Handler {} panicked during {}: {}", id, operation.as_str(), msg);
                DispatchOutcome::Error(format!("Handler {} crashed: {}", id, msg))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::i18n::Catalog;

    struct Noop;

    impl BackupHandler for Noop {
        fn backup(&self, _request: BackupRequest, _ledger: &BackupLedger) -> Result<bool> {
            Ok(true)
        }
    }

    struct Other;

    impl BackupHandler for Other {
        fn backup(&self, _request: BackupRequest, _ledger: &BackupLedger) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn test_registration_order_and_override() {
        let registry = HandlerRegistry::builder()
            .with_defaults(Arc::new(Catalog::new()))
            .register("db", "Database", Noop)
            .register("module", "Modules", Other)
            .build();

        let ids: Vec<_> = registry.list().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["module", "db"]);
        assert_eq!(registry.get("module").unwrap().name, "Modules");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_default_handler_name_is_translated() {
        let catalog = Catalog::new().with_entry("Module", "Modul");
        let registry = HandlerRegistry::builder()
            .with_defaults(Arc::new(catalog))
            .build();

        assert_eq!(registry.info()[0].name, "Modul");
    }

    #[test]
    fn test_outcome_messages() {
        assert!(DispatchOutcome::Success.is_success());
        assert!(!DispatchOutcome::Failed.is_success());
        assert_eq!(
            DispatchOutcome::UnknownHandler("x".into()).message(),
            "Handler x not found"
        );
    }
}
