//! Foreign runtime interface
//!
//! The embedded interpreter is reached only through these traits. It owns
//! the main thread of control: every dispatch starts with the interpreter
//! calling in, carrying its pending arguments as an [`ArgSource`].

use crate::bridge::{ForeignObject, ObjectKind};
use crate::value::HostRef;
use core::fmt;
use std::sync::Arc;

/// Reserved out-of-range double signalling a failed fetch, get or call
pub const FAILURE_SENTINEL: f64 = -1e98;

/// Double surfaced for a successful call of a void method
pub const VOID_SUCCESS: f64 = 1.0;

/// Opaque foreign object pointer; zero is never a live object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignPtr(pub u64);

impl ForeignPtr {
    pub const NULL: ForeignPtr = ForeignPtr(0);

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ForeignPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Foreign method identity, valid for objects of one template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u64);

/// Stable pointer to a foreign scalar variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarPtr(pub u64);

/// How the foreign side should coerce a numeric argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericHint {
    /// Pass the double through unchanged
    Real,
    /// Round to an integral value (for int and bool parameters)
    Integral,
}

/// Object argument as reported by the foreign runtime
#[derive(Clone)]
pub enum IncomingObject {
    /// A null object reference
    Null,
    /// A host object the foreign side was holding on our behalf
    Host(HostRef),
    /// A native foreign object; `tag` selects the wrapper variant
    Foreign { pointer: ForeignPtr, tag: u8 },
    /// A string passed where an object was expected
    Chars(String),
    /// The fetch failed (missing or wrongly typed argument)
    Failed,
}

impl fmt::Debug for IncomingObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Host(_) => write!(f, "Host(..)"),
            Self::Foreign { pointer, tag } => write!(f, "Foreign({}, tag={})", pointer, tag),
            Self::Chars(s) => write!(f, "Chars({:?})", s),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Object handed to the foreign runtime, tagged with its object kind
#[derive(Clone)]
pub enum ObjectRef {
    Null,
    /// A foreign object surfaced through a wrapper (kind <= -2)
    ///
    /// `object` keeps the wrapper's reference alive for as long as the
    /// foreign side holds this value, so the runtime must take its own
    /// reference before dropping it.
    Foreign {
        pointer: ForeignPtr,
        kind: ObjectKind,
        object: Arc<ForeignObject>,
    },
    /// A host object: registered class (kind >= 0) or opaque (kind == -1)
    Host { object: HostRef, kind: ObjectKind },
}

impl ObjectRef {
    pub fn kind(&self) -> Option<ObjectKind> {
        match self {
            Self::Null => None,
            Self::Foreign { kind, .. } | Self::Host { kind, .. } => Some(*kind),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Foreign { pointer, kind, .. } => write!(f, "Foreign({}, {:?})", pointer, kind),
            Self::Host { kind, .. } => write!(f, "Host({:?})", kind),
        }
    }
}

/// Positional, 1-indexed accessor into the foreign call's pending arguments
pub trait ArgSource {
    /// Number of pending arguments
    fn arg_count(&self) -> usize;

    /// Fetch a numeric argument; [`FAILURE_SENTINEL`] on failure
    fn double_arg(&self, index: usize, hint: NumericHint) -> f64;

    /// Fetch a string argument; `None` on failure
    fn string_arg(&self, index: usize) -> Option<String>;

    /// Fetch an object argument; [`IncomingObject::Failed`] on failure
    fn object_arg(&self, index: usize) -> IncomingObject;

    /// Foreign-collapsed signature of the actual arguments (`d`, `S`, `o`)
    fn signature(&self) -> String;
}

/// The embedded interpreter
///
/// All methods except [`ForeignRuntime::release`] are only called from the
/// interpreter's own thread of control. `release` runs whenever a wrapper is
/// dropped, which may be on any thread, so implementations must make it
/// safe to run concurrently with everything else.
pub trait ForeignRuntime: Send + Sync {
    /// Add one reference to a foreign object
    fn retain(&self, pointer: ForeignPtr);

    /// Drop one reference to a foreign object
    fn release(&self, pointer: ForeignPtr);

    /// Announce a registered host class: foreign name, numeric id and its
    /// method table (`"<d|s|o> <name> <signature> ..."`)
    fn declare_class(&self, foreign_name: &str, id: usize, methods: &str);

    // Call protocol: push arguments, then invoke

    fn push_double(&self, value: f64);
    fn push_string(&self, value: &str);
    fn push_object(&self, value: ObjectRef);

    /// Look up a method by name on an object's template
    fn method_id(&self, object: ForeignPtr, name: &str) -> Option<MethodId>;

    /// Invoke a method returning a number; [`FAILURE_SENTINEL`] on failure
    fn call_double(&self, object: ForeignPtr, method: MethodId, argc: usize) -> f64;

    /// Invoke a method returning a string; `None` on failure
    fn call_chars(&self, object: ForeignPtr, method: MethodId, argc: usize) -> Option<String>;

    /// Invoke a method returning an object
    fn call_object(&self, object: ForeignPtr, method: MethodId, argc: usize) -> IncomingObject;

    /// Instantiate a foreign template with `argc` pushed arguments. The
    /// returned pointer already carries the caller's single reference.
    fn new_object(&self, template: &str, argc: usize) -> Option<ForeignPtr>;

    /// Printable name of a foreign object (e.g. `Vector[3]`)
    fn object_name(&self, object: ForeignPtr) -> Option<String>;

    // Variables

    /// One-shot lookup of a scalar variable; `None` if it is missing or not
    /// a number
    fn locate_variable(&self, name: &str) -> Option<VarPtr>;
    fn read_variable(&self, var: VarPtr) -> f64;
    fn write_variable(&self, var: VarPtr, value: f64);

    /// Top-level string variable; `None` if missing or not a string
    fn read_string_variable(&self, name: &str) -> Option<String>;
    /// `false` if the variable is missing or not a string
    fn write_string_variable(&self, name: &str, value: &str) -> bool;

    /// Top-level object variable. The variable keeps its own reference, so
    /// a foreign result is still owned by the interpreter.
    fn read_object_variable(&self, name: &str) -> IncomingObject;
    /// Store an object, taking a reference and dropping the old one
    fn write_object_variable(&self, name: &str, value: ObjectRef) -> bool;

    /// Execute a statement; `false` if the interpreter reported an error
    fn execute(&self, statement: &str) -> bool;

    /// Call a top-level function with `argc` pushed arguments;
    /// [`FAILURE_SENTINEL`] on failure
    fn call_function(&self, name: &str, argc: usize) -> f64;

    // Fields of foreign objects

    fn field_chars(&self, object: ForeignPtr, name: &str) -> Option<String>;
    fn field_object(&self, object: ForeignPtr, name: &str) -> IncomingObject;
    fn set_field_object(&self, object: ForeignPtr, name: &str, value: ObjectRef) -> bool;

    // Vectors

    /// Create a vector of `size` zeros, carrying the caller's reference
    fn vector_new(&self, size: usize) -> Option<ForeignPtr>;
    fn vector_len(&self, vector: ForeignPtr) -> Option<usize>;
    fn vector_get(&self, vector: ForeignPtr, index: usize) -> Option<f64>;
    fn vector_set(&self, vector: ForeignPtr, index: usize, value: f64) -> bool;
    /// Resize and overwrite the whole vector
    fn vector_assign(&self, vector: ForeignPtr, values: &[f64]) -> bool;
    fn vector_snapshot(&self, vector: ForeignPtr) -> Option<Vec<f64>>;
}
