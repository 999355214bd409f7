//! Foreign top-level variables
//!
//! Scalars are bound through a handle that looks the name up once. If the
//! lookup fails the handle is permanently invalid: reads give the failure
//! sentinel, writes are dropped, and the foreign runtime is not asked again.
//!
//! String and object variables are read and written by name each time.

use crate::bridge::ObjectBridge;
use crate::error::BridgeError;
use crate::foreign::{ForeignRuntime, VarPtr, FAILURE_SENTINEL};
use crate::logging::{debug, warn};
use crate::value::HostRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct VariableBridge {
    objects: ObjectBridge,
}

impl VariableBridge {
    pub fn new(objects: ObjectBridge) -> Self {
        Self { objects }
    }

    #[inline]
    fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        self.objects.runtime()
    }

    /// Look `name` up once and keep the result
    pub fn bind(&self, name: &str) -> VariableHandle {
        let pointer = self.runtime().locate_variable(name);
        if pointer.is_none() {
            warn!(event = "variable_missing", name = name, "Foreign variable not found");
        }
        VariableHandle {
            runtime: Arc::clone(self.runtime()),
            name: name.to_string(),
            pointer,
        }
    }

    /// One-shot read by name
    pub fn get_double(&self, name: &str) -> f64 {
        self.bind(name).get()
    }

    /// One-shot write by name; `false` if the variable does not exist
    pub fn set_double(&self, name: &str, value: f64) -> bool {
        let handle = self.bind(name);
        handle.set(value);
        handle.is_valid()
    }

    /// String variable; `None` if missing or not a string
    pub fn get_string(&self, name: &str) -> Option<String> {
        let value = self.runtime().read_string_variable(name);
        if value.is_none() {
            warn!(event = "variable_missing", name = name, "Foreign string variable not found");
        }
        value
    }

    pub fn set_string(&self, name: &str, value: &str) -> bool {
        let ok = self.runtime().write_string_variable(name, value);
        if !ok {
            debug!(event = "variable_write_dropped", name = name, "No string variable to write");
        }
        ok
    }

    /// Object held by an object variable; `Ok(None)` when it holds null
    ///
    /// A foreign object comes back wrapped, holding its own reference.
    pub fn get_object(&self, name: &str) -> Result<Option<HostRef>, BridgeError> {
        self.objects
            .object_result(self.runtime().read_object_variable(name), || BridgeError::ForeignFieldFailed {
                field: name.to_string(),
            })
    }

    /// Point an object variable at `value` (or null)
    pub fn set_object(&self, name: &str, value: Option<&HostRef>) -> bool {
        let ok = self.runtime().write_object_variable(name, self.objects.to_foreign(value));
        if !ok {
            debug!(event = "variable_write_dropped", name = name, "No object variable to write");
        }
        ok
    }

    /// Run a statement in the foreign interpreter
    pub fn execute(&self, statement: &str) -> bool {
        let ok = self.runtime().execute(statement);
        if !ok {
            warn!(event = "execute_failed", statement = statement, "Foreign statement failed");
        }
        ok
    }
}

/// A bound foreign variable
pub struct VariableHandle {
    runtime: Arc<dyn ForeignRuntime>,
    name: String,
    pointer: Option<VarPtr>,
}

impl VariableHandle {
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.pointer.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, or [`FAILURE_SENTINEL`] for an invalid handle
    pub fn get(&self) -> f64 {
        match self.pointer {
            Some(p) => self.runtime.read_variable(p),
            None => FAILURE_SENTINEL,
        }
    }

    pub fn set(&self, value: f64) {
        match self.pointer {
            Some(p) => self.runtime.write_variable(p, value),
            None => debug!(event = "variable_write_dropped", name = %self.name, "Write to unbound variable ignored"),
        }
    }
}
