//! Object bridge - moving object references across the boundary
//!
//! Two directions:
//! - foreign -> host: a foreign pointer plus wrapper tag becomes a
//!   [`ForeignObject`] holding one counted reference
//! - host -> foreign: any host object is classified into an [`ObjectKind`]
//!   so the foreign side knows whether it can introspect it
//!
//! Calls on wrapped foreign objects also go through here, because pushing
//! object arguments needs the same classification.

mod kind;
mod object;

#[cfg(test)]
mod tests;

pub use kind::{ObjectKind, WrapperKind};
pub use object::ForeignObject;

use crate::error::BridgeError;
use crate::foreign::{
    ForeignPtr, ForeignRuntime, IncomingObject, MethodId, ObjectRef, FAILURE_SENTINEL,
};
use crate::logging::log_dispatch;
use crate::registry::TypeRegistry;
use crate::value::{ArgumentValue, HostRef};
use core::any::Any;
use std::sync::Arc;

/// Outcome of decoding an incoming object
pub(crate) enum Unwrapped {
    Value(ArgumentValue),
    Failed,
    UnknownTag(u8),
}

#[derive(Clone)]
pub struct ObjectBridge {
    runtime: Arc<dyn ForeignRuntime>,
    registry: Arc<TypeRegistry>,
}

impl ObjectBridge {
    pub fn new(runtime: Arc<dyn ForeignRuntime>, registry: Arc<TypeRegistry>) -> Self {
        Self { runtime, registry }
    }

    pub fn runtime(&self) -> &Arc<dyn ForeignRuntime> {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Foreign -> host
    // ------------------------------------------------------------------

    /// Wrap a foreign object in the wrapper variant selected by `tag`
    pub fn encapsulate(&self, pointer: ForeignPtr, tag: u8) -> Result<Arc<ForeignObject>, BridgeError> {
        if pointer.is_null() {
            return Err(BridgeError::NullPointer);
        }
        let kind = WrapperKind::from_tag(tag).ok_or(BridgeError::UnknownWrapperTag { tag })?;
        Ok(Arc::new(ForeignObject::encapsulate(
            Arc::clone(&self.runtime),
            pointer,
            kind,
        )))
    }

    /// Decode an object reported by the foreign side
    pub(crate) fn unwrap_incoming(&self, incoming: IncomingObject) -> Unwrapped {
        match incoming {
            IncomingObject::Null => Unwrapped::Value(ArgumentValue::Null),
            IncomingObject::Host(object) => Unwrapped::Value(ArgumentValue::Object(object)),
            IncomingObject::Chars(s) => Unwrapped::Value(ArgumentValue::String(s)),
            IncomingObject::Foreign { pointer, .. } if pointer.is_null() => {
                Unwrapped::Value(ArgumentValue::Null)
            }
            IncomingObject::Foreign { pointer, tag } => match self.encapsulate(pointer, tag) {
                Ok(wrapper) => Unwrapped::Value(ArgumentValue::Object(wrapper)),
                Err(_) => Unwrapped::UnknownTag(tag),
            },
            IncomingObject::Failed => Unwrapped::Failed,
        }
    }

    // ------------------------------------------------------------------
    // Host -> foreign
    // ------------------------------------------------------------------

    /// Classify a host object for the foreign side
    pub fn kind_of(&self, object: &HostRef) -> ObjectKind {
        if let Some(kind) = as_foreign(object).and_then(ForeignObject::object_kind) {
            return kind;
        }
        let type_id = Any::type_id(&**object);
        match self.registry.id_of(type_id) {
            Some(id) => ObjectKind::registered(id),
            None => ObjectKind::OPAQUE,
        }
    }

    /// Package a host object (or null) with its kind
    ///
    /// A live wrapper travels as itself, so its reference outlasts whatever
    /// produced it.
    pub fn to_foreign(&self, object: Option<&HostRef>) -> ObjectRef {
        let Some(object) = object else {
            return ObjectRef::Null;
        };
        let kind = self.kind_of(object);
        if kind.wrapper_tag().is_some() {
            if let Ok(wrapper) = Arc::clone(object).downcast::<ForeignObject>() {
                if let Some(pointer) = wrapper.pointer() {
                    return ObjectRef::Foreign {
                        pointer,
                        kind,
                        object: wrapper,
                    };
                }
            }
        }
        ObjectRef::Host {
            object: Arc::clone(object),
            kind,
        }
    }

    /// Same object on both sides: host identity, or same foreign pointer
    pub fn identical(&self, a: &HostRef, b: &HostRef) -> bool {
        if Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const () {
            return true;
        }
        match (
            as_foreign(a).and_then(ForeignObject::pointer),
            as_foreign(b).and_then(ForeignObject::pointer),
        ) {
            (Some(pa), Some(pb)) => pa == pb,
            _ => false,
        }
    }

    /// Registered class name, or the foreign object's own name
    pub fn class_name(&self, object: &HostRef) -> Option<String> {
        if let Some(wrapper) = as_foreign(object) {
            return wrapper.name();
        }
        self.registry.lookup(Any::type_id(&**object)).map(|d| d.name().to_string())
    }

    // ------------------------------------------------------------------
    // Creating foreign objects
    // ------------------------------------------------------------------

    /// Instantiate a foreign template; no extra reference is taken because
    /// the creation itself hands us the only one
    pub fn new_object(&self, template: &str, args: &[ArgumentValue]) -> Result<Arc<ForeignObject>, BridgeError> {
        self.push_args(args);
        let pointer = self
            .runtime
            .new_object(template, args.len())
            .filter(|p| !p.is_null())
            .ok_or_else(|| BridgeError::ForeignAllocationFailed {
                template: template.to_string(),
            })?;
        Ok(Arc::new(ForeignObject::adopt(
            Arc::clone(&self.runtime),
            pointer,
            WrapperKind::Object,
        )))
    }

    /// Create a zero-filled foreign vector
    pub fn new_vector(&self, size: usize) -> Result<Arc<ForeignObject>, BridgeError> {
        let pointer = self
            .runtime
            .vector_new(size)
            .filter(|p| !p.is_null())
            .ok_or_else(|| BridgeError::ForeignAllocationFailed {
                template: "Vector".to_string(),
            })?;
        Ok(Arc::new(ForeignObject::adopt(
            Arc::clone(&self.runtime),
            pointer,
            WrapperKind::Vector,
        )))
    }

    /// Create a foreign vector holding `values`
    pub fn vector_from(&self, values: &[f64]) -> Result<Arc<ForeignObject>, BridgeError> {
        let vector = self.new_vector(values.len())?;
        vector.assign(values)?;
        Ok(vector)
    }

    // ------------------------------------------------------------------
    // Calling foreign methods
    // ------------------------------------------------------------------

    fn push_args(&self, args: &[ArgumentValue]) {
        for arg in args {
            match arg {
                ArgumentValue::Double(d) => self.runtime.push_double(*d),
                ArgumentValue::Int(i) => self.runtime.push_double(f64::from(*i)),
                ArgumentValue::Bool(b) => self.runtime.push_double(if *b { 1.0 } else { 0.0 }),
                ArgumentValue::String(s) => self.runtime.push_string(s),
                ArgumentValue::Object(o) => self.runtime.push_object(self.to_foreign(Some(o))),
                ArgumentValue::Null => self.runtime.push_object(ObjectRef::Null),
            }
        }
    }

    fn prepare(&self, target: &ForeignObject, name: &str, args: &[ArgumentValue]) -> Result<(ForeignPtr, MethodId), BridgeError> {
        let pointer = target.live_pointer()?;
        let method = target.method_id(name)?;
        log_dispatch("<foreign>", name, args.len());
        self.push_args(args);
        Ok((pointer, method))
    }

    /// Call a foreign method returning a number
    pub fn call_double(&self, target: &ForeignObject, name: &str, args: &[ArgumentValue]) -> Result<f64, BridgeError> {
        let (pointer, method) = self.prepare(target, name, args)?;
        let value = self.runtime.call_double(pointer, method, args.len());
        if value == FAILURE_SENTINEL {
            return Err(BridgeError::ForeignCallFailed {
                method: name.to_string(),
            });
        }
        Ok(value)
    }

    /// Call a foreign method returning a string
    pub fn call_chars(&self, target: &ForeignObject, name: &str, args: &[ArgumentValue]) -> Result<String, BridgeError> {
        let (pointer, method) = self.prepare(target, name, args)?;
        self.runtime
            .call_chars(pointer, method, args.len())
            .ok_or_else(|| BridgeError::ForeignCallFailed {
                method: name.to_string(),
            })
    }

    /// Call a foreign method returning an object; `None` for null
    pub fn call_object(&self, target: &ForeignObject, name: &str, args: &[ArgumentValue]) -> Result<Option<HostRef>, BridgeError> {
        let (pointer, method) = self.prepare(target, name, args)?;
        self.object_result(self.runtime.call_object(pointer, method, args.len()), || {
            BridgeError::ForeignCallFailed {
                method: name.to_string(),
            }
        })
    }

    /// Call a top-level foreign function by name
    pub fn call_function(&self, name: &str, args: &[ArgumentValue]) -> Result<f64, BridgeError> {
        log_dispatch("<toplevel>", name, args.len());
        self.push_args(args);
        let value = self.runtime.call_function(name, args.len());
        if value == FAILURE_SENTINEL {
            return Err(BridgeError::ForeignCallFailed {
                method: name.to_string(),
            });
        }
        Ok(value)
    }

    /// Decode an object result, keeping strings as host strings
    pub(crate) fn object_result(
        &self,
        incoming: IncomingObject,
        failure: impl FnOnce() -> BridgeError,
    ) -> Result<Option<HostRef>, BridgeError> {
        match self.unwrap_incoming(incoming) {
            Unwrapped::Value(ArgumentValue::Object(o)) => Ok(Some(o)),
            Unwrapped::Value(ArgumentValue::String(s)) => Ok(Some(Arc::new(s))),
            Unwrapped::Value(_) => Ok(None),
            Unwrapped::UnknownTag(tag) => Err(BridgeError::UnknownWrapperTag { tag }),
            Unwrapped::Failed => Err(failure()),
        }
    }

    // ------------------------------------------------------------------
    // Fields of foreign objects
    // ------------------------------------------------------------------

    pub fn field_chars(&self, target: &ForeignObject, field: &str) -> Result<String, BridgeError> {
        let pointer = target.live_pointer()?;
        self.runtime
            .field_chars(pointer, field)
            .ok_or_else(|| field_failure(field))
    }

    /// Object held in a field; `None` when the field is null
    pub fn field_object(&self, target: &ForeignObject, field: &str) -> Result<Option<HostRef>, BridgeError> {
        let pointer = target.live_pointer()?;
        self.object_result(self.runtime.field_object(pointer, field), || field_failure(field))
    }

    /// Store `value` (or null) in an object field of `target`
    pub fn set_field_object(&self, target: &ForeignObject, field: &str, value: Option<&HostRef>) -> Result<(), BridgeError> {
        let pointer = target.live_pointer()?;
        if self.runtime.set_field_object(pointer, field, self.to_foreign(value)) {
            Ok(())
        } else {
            Err(field_failure(field))
        }
    }
}

fn field_failure(field: &str) -> BridgeError {
    BridgeError::ForeignFieldFailed {
        field: field.to_string(),
    }
}

/// View a host object as a foreign wrapper, if it is one
#[inline]
pub fn as_foreign(object: &HostRef) -> Option<&ForeignObject> {
    (**object).downcast_ref::<ForeignObject>()
}
