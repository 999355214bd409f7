//! nrnbridge - host/interpreter marshalling and dispatch
//!
//! Lets an embedded foreign interpreter construct host objects, call their
//! methods and read back results, and lets host code hold and call
//! interpreter objects. The interpreter is reached only through the
//! [`ForeignRuntime`] and [`ArgSource`] traits.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nrnbridge::{Bridge, loopback::Loopback};
//!
//! let bridge = Bridge::new(Arc::new(Loopback::new()));
//! let _ = nrnbridge::install(bridge);
//! ```

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod foreign;
pub mod logging;
pub mod loopback;
pub mod marshal;
pub mod overload;
pub mod registry;
pub mod signature;
pub mod value;
pub mod variable;

// Re-export core types
pub use bridge::{ForeignObject, ObjectBridge, ObjectKind, WrapperKind};
pub use config::{BridgeConfig, ConfigError};
pub use dispatch::{Dispatcher, MethodSelector, Returned, StatsSnapshot};
pub use error::{BridgeError, HostError, RegistrationError};
pub use foreign::{ArgSource, ForeignPtr, ForeignRuntime, ObjectRef, FAILURE_SENTINEL, VOID_SUCCESS};
pub use registry::{ClassCatalog, ClassDescriptor, ClassId, ClassSpec, HostClass, TypeRegistry};
pub use signature::{ParamKind, ReturnKind};
pub use value::{host_ref, Args, ArgumentValue, HostRef, HostValue};
pub use variable::{VariableBridge, VariableHandle};

use logging::log_registration_error;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Process-wide bridge, set once
static GLOBAL: OnceCell<Bridge> = OnceCell::new();

/// Everything one embedding needs, wired to a single foreign runtime
pub struct Bridge {
    runtime: Arc<dyn ForeignRuntime>,
    registry: Arc<TypeRegistry>,
    objects: ObjectBridge,
    dispatcher: Dispatcher,
    variables: VariableBridge,
    /// Class ids already announced to the runtime
    declared: Mutex<HashSet<ClassId>>,
}

impl Bridge {
    pub fn new(runtime: Arc<dyn ForeignRuntime>) -> Self {
        Self::with_config(runtime, &BridgeConfig::default())
    }

    pub fn with_config(runtime: Arc<dyn ForeignRuntime>, config: &BridgeConfig) -> Self {
        let registry = Arc::new(TypeRegistry::with_config(config.registry.clone()));
        let objects = ObjectBridge::new(Arc::clone(&runtime), Arc::clone(&registry));
        Self {
            dispatcher: Dispatcher::new(objects.clone()),
            variables: VariableBridge::new(objects.clone()),
            declared: Mutex::new(HashSet::new()),
            objects,
            registry,
            runtime,
        }
    }

    /// Load configuration from `NRNBRIDGE_CONFIG`, start logging, and build
    pub fn from_env(runtime: Arc<dyn ForeignRuntime>) -> Result<Self, ConfigError> {
        let config = BridgeConfig::from_env()?;
        logging::init_with_config(config.logging.to_log_config());
        Ok(Self::with_config(runtime, &config))
    }

    /// Register `T` and declare it to the foreign runtime
    pub fn register<T: HostClass>(&self) -> Result<Arc<ClassDescriptor>, RegistrationError> {
        self.register_spec(T::class_spec(), None)
    }

    /// Register a class by dotted name from `catalog`
    ///
    /// The foreign side sees it as `foreign_name`, or the mangled class name
    /// when none is given.
    pub fn load_class(
        &self,
        catalog: &ClassCatalog,
        name: &str,
        foreign_name: Option<&str>,
    ) -> Result<Arc<ClassDescriptor>, RegistrationError> {
        let Some(spec) = catalog.load(name) else {
            let err = RegistrationError::ClassNotFound { name: name.to_string() };
            log_registration_error(name, &err.to_string());
            return Err(err);
        };
        self.register_spec(spec, foreign_name)
    }

    fn register_spec(&self, spec: ClassSpec, foreign_name: Option<&str>) -> Result<Arc<ClassDescriptor>, RegistrationError> {
        let descriptor = self.registry.register_spec(spec)?;
        // The registry may already hold classes registered directly on it
        if self.declared.lock().insert(descriptor.id()) {
            let foreign_name = foreign_name.map_or_else(|| descriptor.foreign_name(), str::to_string);
            self.runtime
                .declare_class(&foreign_name, descriptor.id(), &descriptor.foreign_method_table());
        }
        Ok(descriptor)
    }

    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn objects(&self) -> &ObjectBridge {
        &self.objects
    }

    pub fn variables(&self) -> &VariableBridge {
        &self.variables
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }
}

/// Make `bridge` the process-wide instance
///
/// Only the first call succeeds; later calls hand their bridge back.
pub fn install(bridge: Bridge) -> Result<&'static Bridge, Bridge> {
    GLOBAL.try_insert(bridge).map_err(|(_, rejected)| rejected)
}

/// The process-wide bridge, if installed
#[inline]
pub fn global() -> Option<&'static Bridge> {
    GLOBAL.get()
}
