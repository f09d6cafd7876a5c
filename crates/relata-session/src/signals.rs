//! Lifecycle signals fired around engine writes.
//!
//! Handlers are synchronous closures registered per model on the engine's
//! [`Signals`] table and invoked in registration order. A failing pre-hook
//! vetoes the write before any statement is issued; a failing post-hook is
//! reported to the caller after the row is already committed.

use std::collections::HashMap;
use std::fmt;

use relata_core::Instance;

// ============================================================================
// Signal identity
// ============================================================================

/// The six lifecycle moments the engine announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Before an insert issued by `save`, `insert`, or a cascade.
    PreSave,
    /// After an insert committed and any generated key was read back.
    PostSave,
    /// Before an update issued by `save` or `update`.
    PreUpdate,
    /// After an update committed.
    PostUpdate,
    /// Before a delete.
    PreDelete,
    /// After a delete committed.
    PostDelete,
}

impl Signal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::PreSave => "pre_save",
            Signal::PostSave => "post_save",
            Signal::PreUpdate => "pre_update",
            Signal::PostUpdate => "post_update",
            Signal::PreDelete => "pre_delete",
            Signal::PostDelete => "post_delete",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Handler table
// ============================================================================

/// Handler signature. Hooks may mutate the instance; returning `Err`
/// carries a message the engine wraps into a persistence error.
pub type Handler = Box<dyn Fn(&mut Instance) -> Result<(), String> + Send + Sync>;

/// Per-model, per-signal handler table.
///
/// Built alongside the registry during startup and handed to the engine;
/// the engine never mutates it after construction.
#[derive(Default)]
pub struct Signals {
    handlers: HashMap<String, HashMap<Signal, Vec<Handler>>>,
}

impl Signals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `signal` on `model`. Handlers for the same
    /// slot fire in registration order.
    pub fn on<F>(&mut self, model: impl Into<String>, signal: Signal, handler: F)
    where
        F: Fn(&mut Instance) -> Result<(), String> + Send + Sync + 'static,
    {
        self.handlers
            .entry(model.into())
            .or_default()
            .entry(signal)
            .or_default()
            .push(Box::new(handler));
    }

    /// Invoke every handler registered for `(model, signal)`, stopping at
    /// the first failure.
    ///
    /// Models and signals with no handlers are a successful no-op.
    pub fn emit(&self, model: &str, signal: Signal, instance: &mut Instance) -> Result<(), String> {
        let Some(per_model) = self.handlers.get(model) else {
            return Ok(());
        };
        let Some(list) = per_model.get(&signal) else {
            return Ok(());
        };
        for handler in list {
            handler(instance)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: usize = self.handlers.values().map(HashMap::len).sum();
        f.debug_struct("Signals")
            .field("models", &self.handlers.len())
            .field("slots", &slots)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use relata_core::Value;

    fn author() -> Instance {
        let mut instance = Instance::new("Author");
        instance.set("name", Value::Text("ada".into()));
        instance
    }

    #[test]
    fn test_emit_without_handlers_is_noop() {
        let signals = Signals::new();
        let mut instance = author();
        assert_eq!(signals.emit("Author", Signal::PreSave, &mut instance), Ok(()));
        assert!(signals.is_empty());
    }

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut signals = Signals::new();
        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            signals.on("Author", Signal::PreSave, move |_| {
                seen.lock().unwrap().push(label);
                Ok(())
            });
        }

        let mut instance = author();
        signals.emit("Author", Signal::PreSave, &mut instance).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_first_error_short_circuits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut signals = Signals::new();
        signals.on("Author", Signal::PreDelete, |_| Err("vetoed".into()));
        {
            let seen = Arc::clone(&seen);
            signals.on("Author", Signal::PreDelete, move |_| {
                seen.lock().unwrap().push("ran");
                Ok(())
            });
        }

        let mut instance = author();
        let outcome = signals.emit("Author", Signal::PreDelete, &mut instance);
        assert_eq!(outcome, Err("vetoed".to_string()));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handlers_scoped_to_model_and_signal() {
        let mut signals = Signals::new();
        signals.on("Author", Signal::PreSave, |_| Err("author pre-save".into()));

        let mut instance = author();
        assert!(signals.emit("Book", Signal::PreSave, &mut instance).is_ok());
        assert!(signals.emit("Author", Signal::PostSave, &mut instance).is_ok());
        assert!(signals.emit("Author", Signal::PreSave, &mut instance).is_err());
    }

    #[test]
    fn test_handler_can_mutate_instance() {
        let mut signals = Signals::new();
        signals.on("Author", Signal::PreSave, |instance| {
            let name = instance
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_uppercase();
            instance.set("name", Value::Text(name));
            Ok(())
        });

        let mut instance = author();
        signals.emit("Author", Signal::PreSave, &mut instance).unwrap();
        assert_eq!(instance.get("name"), Some(&Value::Text("ADA".into())));
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::PreSave.as_str(), "pre_save");
        assert_eq!(Signal::PostDelete.to_string(), "post_delete");
    }
}
