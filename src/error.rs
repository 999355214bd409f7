//! Error taxonomy for the bridge
//!
//! Every failure is terminal for the call that raised it. Boundary functions
//! in `dispatch` log these and hand the foreign runtime a sentinel instead.

use crate::signature::{ReturnKind, SigChar};
use core::fmt;

/// Error raised by a host callable (constructor or method body)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HostError {}

/// Malformed signature text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    UnknownTag { tag: char, position: usize },
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag { tag, position } => {
                write!(f, "Unknown signature tag '{}' at position {}", tag, position)
            }
        }
    }
}

impl std::error::Error for SignatureError {}

/// A class could not be registered; the registry is left untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    ClassNotFound { name: String },
    AlreadyRegistered { name: String },
    InvalidMember { class: String, member: String, reason: &'static str },
    AmbiguousOverloads { class: String, member: String, foreign_signature: String },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassNotFound { name } => write!(f, "Class not found: {}", name),
            Self::AlreadyRegistered { name } => write!(f, "Class already registered: {}", name),
            Self::InvalidMember { class, member, reason } => {
                write!(f, "Invalid member '{}' on {}: {}", member, class, reason)
            }
            Self::AmbiguousOverloads { class, member, foreign_signature } => write!(
                f,
                "Overloads of {}.{} are indistinguishable as ({})",
                class, member, foreign_signature
            ),
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Overload resolution failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NoCandidates,
    MissingHint { candidates: Vec<String> },
    NoMatch { hint: String, candidates: Vec<String> },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "No callable variant available"),
            Self::MissingHint { candidates } => write!(
                f,
                "Overloaded; disambiguate using one of: ({})",
                candidates.join("), (")
            ),
            Self::NoMatch { hint, candidates } => write!(
                f,
                "No overload matches ({}); candidates: ({})",
                hint,
                candidates.join("), (")
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Argument pull failed; no argument list was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    BadArgument { position: usize, expected: SigChar },
    UnknownWrapperTag { position: usize, tag: u8 },
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadArgument { position, expected } => write!(
                f,
                "Bad argument {}: expected {}",
                position,
                expected.describe()
            ),
            Self::UnknownWrapperTag { position, tag } => {
                write!(f, "Argument {}: no wrapper class for tag {}", position, tag)
            }
        }
    }
}

impl std::error::Error for ArgumentError {}

/// Umbrella error for dispatch and object-bridge operations
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    UnknownClass { id: usize },
    UnknownMethod { class: String, method: String },
    NoDefaultConstructor { class: String },
    MissingReceiver { class: String, method: String },
    Resolve(ResolveError),
    Argument(ArgumentError),
    Invocation { member: String, error: HostError },
    Panicked { member: String },
    ReturnMismatch { member: String, declared: ReturnKind, found: &'static str },
    WrongAccessor { member: String, declared: ReturnKind, requested: char },
    UnknownWrapperTag { tag: u8 },
    NullPointer,
    Released,
    ForeignCallFailed { method: String },
    ForeignMethodNotFound { method: String },
    ForeignAllocationFailed { template: String },
    ForeignFieldFailed { field: String },
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownClass { id } => write!(f, "No registered class with id {}", id),
            Self::UnknownMethod { class, method } => {
                write!(f, "{} has no registered method {}", class, method)
            }
            Self::NoDefaultConstructor { class } => {
                write!(f, "{} cannot be constructed without arguments", class)
            }
            Self::MissingReceiver { class, method } => {
                write!(f, "{}.{} requires an instance receiver", class, method)
            }
            Self::Resolve(e) => write!(f, "{}", e),
            Self::Argument(e) => write!(f, "{}", e),
            Self::Invocation { member, error } => write!(f, "{} raised: {}", member, error),
            Self::Panicked { member } => write!(f, "{} panicked", member),
            Self::ReturnMismatch { member, declared, found } => write!(
                f,
                "{} declared return kind '{}' but produced {}",
                member,
                declared.tag(),
                found
            ),
            Self::WrongAccessor { member, declared, requested } => write!(
                f,
                "{} returns '{}' but was called through the '{}' accessor",
                member,
                declared.tag(),
                requested
            ),
            Self::UnknownWrapperTag { tag } => write!(f, "No wrapper class for tag {}", tag),
            Self::NullPointer => write!(f, "Cannot wrap a null foreign pointer"),
            Self::Released => write!(f, "Foreign reference already released"),
            Self::ForeignCallFailed { method } => write!(f, "Foreign call {} failed", method),
            Self::ForeignMethodNotFound { method } => {
                write!(f, "Foreign object has no method {}", method)
            }
            Self::ForeignAllocationFailed { template } => {
                write!(f, "Could not create foreign {} object", template)
            }
            Self::ForeignFieldFailed { field } => {
                write!(f, "Foreign field {} is missing or has the wrong type", field)
            }
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<ResolveError> for BridgeError {
    fn from(e: ResolveError) -> Self {
        Self::Resolve(e)
    }
}

impl From<ArgumentError> for BridgeError {
    fn from(e: ArgumentError) -> Self {
        Self::Argument(e)
    }
}
