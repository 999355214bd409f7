//! Host-side wrapper owning one counted reference to a foreign object
//!
//! The reference is taken when the wrapper is created and given back exactly
//! once, either by `close()` or by `Drop`. Both paths go through an atomic
//! swap of the pointer to zero, so whichever runs first releases and the
//! other finds nothing to do. Drop may run on any thread.

use super::kind::{ObjectKind, WrapperKind};
use crate::error::BridgeError;
use crate::foreign::{ForeignPtr, ForeignRuntime, MethodId};
use crate::logging::{log_encapsulate, log_release};
use core::fmt;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct ForeignObject {
    runtime: Arc<dyn ForeignRuntime>,
    pointer: AtomicU64,
    kind: WrapperKind,
    method_ids: DashMap<String, MethodId>,
}

impl ForeignObject {
    /// Wrap an object the foreign side still owns; takes one new reference
    pub(crate) fn encapsulate(runtime: Arc<dyn ForeignRuntime>, pointer: ForeignPtr, kind: WrapperKind) -> Self {
        debug_assert!(!pointer.is_null());
        runtime.retain(pointer);
        log_encapsulate(pointer.0, kind.tag());
        Self::adopt(runtime, pointer, kind)
    }

    /// Wrap a freshly created object whose single reference is already ours
    pub(crate) fn adopt(runtime: Arc<dyn ForeignRuntime>, pointer: ForeignPtr, kind: WrapperKind) -> Self {
        Self {
            runtime,
            pointer: AtomicU64::new(pointer.0),
            kind,
            method_ids: DashMap::new(),
        }
    }

    /// The foreign pointer, or `None` once released
    #[inline]
    pub fn pointer(&self) -> Option<ForeignPtr> {
        match self.pointer.load(Ordering::Acquire) {
            0 => None,
            p => Some(ForeignPtr(p)),
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.pointer().is_some()
    }

    #[inline]
    pub fn wrapper_kind(&self) -> WrapperKind {
        self.kind
    }

    #[inline]
    pub fn type_tag(&self) -> u8 {
        self.kind.tag()
    }

    /// Kind reported to the foreign side while the reference is held
    pub fn object_kind(&self) -> Option<ObjectKind> {
        self.pointer().map(|_| self.kind.object_kind())
    }

    /// Give the reference back now instead of at drop
    ///
    /// Returns `false` if it had already been released.
    pub fn close(&self) -> bool {
        let old = self.pointer.swap(0, Ordering::AcqRel);
        if old == 0 {
            return false;
        }
        self.runtime.release(ForeignPtr(old));
        log_release(old);
        true
    }

    pub(crate) fn live_pointer(&self) -> Result<ForeignPtr, BridgeError> {
        self.pointer().ok_or(BridgeError::Released)
    }

    /// Method id for `name`, looked up once per wrapper
    pub(crate) fn method_id(&self, name: &str) -> Result<MethodId, BridgeError> {
        if let Some(id) = self.method_ids.get(name) {
            return Ok(*id);
        }
        let pointer = self.live_pointer()?;
        let id = self
            .runtime
            .method_id(pointer, name)
            .ok_or_else(|| BridgeError::ForeignMethodNotFound {
                method: name.to_string(),
            })?;
        self.method_ids.insert(name.to_string(), id);
        Ok(id)
    }

    /// Printable foreign name of the object
    pub fn name(&self) -> Option<String> {
        self.pointer().and_then(|p| self.runtime.object_name(p))
    }

    // Vector access

    pub fn len(&self) -> Result<usize, BridgeError> {
        let p = self.live_pointer()?;
        self.runtime
            .vector_len(p)
            .ok_or_else(|| vector_failure("len"))
    }

    pub fn is_empty(&self) -> Result<bool, BridgeError> {
        self.len().map(|n| n == 0)
    }

    pub fn get(&self, index: usize) -> Result<f64, BridgeError> {
        let p = self.live_pointer()?;
        self.runtime
            .vector_get(p, index)
            .ok_or_else(|| vector_failure("get"))
    }

    pub fn set(&self, index: usize, value: f64) -> Result<(), BridgeError> {
        let p = self.live_pointer()?;
        if self.runtime.vector_set(p, index, value) {
            Ok(())
        } else {
            Err(vector_failure("set"))
        }
    }

    pub fn to_vec(&self) -> Result<Vec<f64>, BridgeError> {
        let p = self.live_pointer()?;
        self.runtime
            .vector_snapshot(p)
            .ok_or_else(|| vector_failure("snapshot"))
    }

    pub fn assign(&self, values: &[f64]) -> Result<(), BridgeError> {
        let p = self.live_pointer()?;
        if self.runtime.vector_assign(p, values) {
            Ok(())
        } else {
            Err(vector_failure("assign"))
        }
    }
}

fn vector_failure(op: &str) -> BridgeError {
    BridgeError::ForeignCallFailed {
        method: format!("vector.{}", op),
    }
}

impl Drop for ForeignObject {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ForeignObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObject")
            .field("pointer", &self.pointer())
            .field("kind", &self.kind)
            .finish()
    }
}
