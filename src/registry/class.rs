//! Host class description
//!
//! Rust has no runtime reflection, so a host class states its public surface
//! once through [`ClassBuilder`]. The registry then filters that surface the
//! way reflection-driven registration would: members whose types fall
//! outside the signature alphabet are dropped.

use crate::error::HostError;
use crate::signature::{ParamKind, ReturnKind};
use crate::value::{Args, HostRef, HostValue};
use core::any::{Any, TypeId};
use core::marker::PhantomData;
use std::sync::Arc;

/// Type-erased constructor body
pub type ConstructorFn = Arc<dyn Fn(&Args) -> Result<HostRef, HostError> + Send + Sync>;

/// Type-erased method body; the receiver is `None` for static methods
pub type MethodFn =
    Arc<dyn Fn(Option<&HostRef>, &Args) -> Result<HostValue, HostError> + Send + Sync>;

/// A host type that can describe itself to the registry
pub trait HostClass: Any + Send + Sync + Sized {
    fn class_spec() -> ClassSpec;
}

/// One declared constructor
#[derive(Clone)]
pub struct ConstructorSpec {
    pub params: Vec<ParamKind>,
    pub call: ConstructorFn,
}

/// One declared method
#[derive(Clone)]
pub struct MethodSpec {
    pub name: String,
    pub params: Vec<ParamKind>,
    pub returns: ReturnKind,
    pub is_static: bool,
    pub call: MethodFn,
}

/// Full public surface of a host class, before filtering
#[derive(Clone)]
pub struct ClassSpec {
    pub name: String,
    pub type_id: TypeId,
    pub constructors: Vec<ConstructorSpec>,
    pub methods: Vec<MethodSpec>,
}

impl ClassSpec {
    /// Start describing host type `T` under a dotted class name
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> ClassBuilder<T> {
        ClassBuilder {
            spec: ClassSpec {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                constructors: Vec::new(),
                methods: Vec::new(),
            },
            _marker: PhantomData,
        }
    }
}

/// Builder for [`ClassSpec`]; closures are typed against `T`
pub struct ClassBuilder<T> {
    spec: ClassSpec,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    /// Constructor taking the given parameters
    pub fn constructor<F>(mut self, params: &[ParamKind], body: F) -> Self
    where
        F: Fn(&Args) -> Result<T, HostError> + Send + Sync + 'static,
    {
        self.spec.constructors.push(ConstructorSpec {
            params: params.to_vec(),
            call: Arc::new(move |args| body(args).map(|v| Arc::new(v) as HostRef)),
        });
        self
    }

    /// Zero-argument constructor
    pub fn no_arg_constructor<F>(self, body: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.constructor(&[], move |_| Ok(body()))
    }

    /// Instance method; the receiver is downcast to `T` before `body` runs
    pub fn method<F>(mut self, name: &str, params: &[ParamKind], returns: ReturnKind, body: F) -> Self
    where
        F: Fn(&T, &Args) -> Result<HostValue, HostError> + Send + Sync + 'static,
    {
        let method = name.to_string();
        self.spec.methods.push(MethodSpec {
            name: name.to_string(),
            params: params.to_vec(),
            returns,
            is_static: false,
            call: Arc::new(move |receiver, args| {
                let this = receiver
                    .and_then(|r| r.downcast_ref::<T>())
                    .ok_or_else(|| {
                        HostError::new(format!("{} called on a foreign receiver", method))
                    })?;
                body(this, args)
            }),
        });
        self
    }

    /// Static method; runs without a receiver
    pub fn static_method<F>(mut self, name: &str, params: &[ParamKind], returns: ReturnKind, body: F) -> Self
    where
        F: Fn(&Args) -> Result<HostValue, HostError> + Send + Sync + 'static,
    {
        self.spec.methods.push(MethodSpec {
            name: name.to_string(),
            params: params.to_vec(),
            returns,
            is_static: true,
            call: Arc::new(move |_, args| body(args)),
        });
        self
    }

    pub fn build(self) -> ClassSpec {
        self.spec
    }
}
