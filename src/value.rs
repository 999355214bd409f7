//! Values crossing the boundary
//!
//! `ArgumentValue` is what the marshaller produces from foreign positional
//! data; `HostValue` is what a host callable hands back before the declared
//! return kind decides how the foreign side sees it.

use crate::error::HostError;
use core::any::Any;
use core::fmt;
use std::sync::Arc;

/// Shared reference to a host object
///
/// Wrappers around foreign objects (`bridge::ForeignObject`) are host
/// objects too, which is how a foreign object travels back out unchanged.
pub type HostRef = Arc<dyn Any + Send + Sync>;

/// Wrap a host value as a shared host reference
#[inline]
pub fn host_ref<T: Any + Send + Sync>(value: T) -> HostRef {
    Arc::new(value)
}

/// One decoded argument
#[derive(Clone)]
pub enum ArgumentValue {
    Double(f64),
    Int(i32),
    Bool(bool),
    String(String),
    Object(HostRef),
    Null,
}

impl ArgumentValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Double(_) => "double",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Null => "null",
        }
    }
}

impl fmt::Debug for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double(d) => write!(f, "Double({})", d),
            Self::Int(i) => write!(f, "Int({})", i),
            Self::Bool(b) => write!(f, "Bool({})", b),
            Self::String(s) => write!(f, "String({:?})", s),
            Self::Object(o) => write!(f, "Object({:p})", Arc::as_ptr(o)),
            Self::Null => write!(f, "Null"),
        }
    }
}

/// Value produced by a host callable
#[derive(Clone)]
pub enum HostValue {
    Void,
    Double(f64),
    Int(i32),
    Bool(bool),
    Chars(String),
    Object(HostRef),
    Null,
}

impl HostValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Double(_) => "double",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Chars(_) => "chars",
            Self::Object(_) => "object",
            Self::Null => "null",
        }
    }

    /// Wrap any host object
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Self::Object(Arc::new(value))
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => write!(f, "Void"),
            Self::Double(d) => write!(f, "Double({})", d),
            Self::Int(i) => write!(f, "Int({})", i),
            Self::Bool(b) => write!(f, "Bool({})", b),
            Self::Chars(s) => write!(f, "Chars({:?})", s),
            Self::Object(o) => write!(f, "Object({:p})", Arc::as_ptr(o)),
            Self::Null => write!(f, "Null"),
        }
    }
}

/// Typed positional view over a pulled argument list
///
/// Indices are 0-based here; the foreign side's 1-based positions are
/// translated by the marshaller.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<ArgumentValue>,
}

impl Args {
    pub fn new(values: Vec<ArgumentValue>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&ArgumentValue> {
        self.values.get(index)
    }

    pub fn as_slice(&self) -> &[ArgumentValue] {
        &self.values
    }

    pub fn double(&self, index: usize) -> Result<f64, HostError> {
        match self.values.get(index) {
            Some(ArgumentValue::Double(d)) => Ok(*d),
            other => Err(mismatch(index, "double", other)),
        }
    }

    pub fn int(&self, index: usize) -> Result<i32, HostError> {
        match self.values.get(index) {
            Some(ArgumentValue::Int(i)) => Ok(*i),
            other => Err(mismatch(index, "int", other)),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool, HostError> {
        match self.values.get(index) {
            Some(ArgumentValue::Bool(b)) => Ok(*b),
            other => Err(mismatch(index, "bool", other)),
        }
    }

    pub fn string(&self, index: usize) -> Result<&str, HostError> {
        match self.values.get(index) {
            Some(ArgumentValue::String(s)) => Ok(s),
            other => Err(mismatch(index, "string", other)),
        }
    }

    /// Object argument; `None` for a null reference
    pub fn object(&self, index: usize) -> Result<Option<&HostRef>, HostError> {
        match self.values.get(index) {
            Some(ArgumentValue::Object(o)) => Ok(Some(o)),
            Some(ArgumentValue::Null) => Ok(None),
            other => Err(mismatch(index, "object", other)),
        }
    }

    /// Object argument downcast to a concrete host type
    pub fn downcast<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, HostError> {
        match self.object(index)? {
            Some(o) => Arc::clone(o).downcast::<T>().map_err(|_| {
                HostError::new(format!(
                    "argument {} is not a {}",
                    index,
                    core::any::type_name::<T>()
                ))
            }),
            None => Err(HostError::new(format!("argument {} is null", index))),
        }
    }

    pub fn into_vec(self) -> Vec<ArgumentValue> {
        self.values
    }
}

fn mismatch(index: usize, expected: &str, found: Option<&ArgumentValue>) -> HostError {
    let found = found.map_or("nothing", ArgumentValue::kind_name);
    HostError::new(format!("argument {}: expected {}, found {}", index, expected, found))
}
