//! Dispatcher - the entry points the foreign runtime calls into
//!
//! Each call walks `Idle -> ArgsPulled -> Invoked -> Returned`, dropping to
//! `Failed` from any state. Failures never propagate across the boundary:
//! the `invoke_*` accessors log them and hand back a sentinel instead.
//!
//! Host callables run under `catch_unwind`, so a panicking method is just
//! another failed call.

#[cfg(test)]
mod tests;

use crate::bridge::ObjectBridge;
use crate::error::BridgeError;
use crate::foreign::{ArgSource, ObjectRef, FAILURE_SENTINEL, VOID_SUCCESS};
use crate::logging::{log_call_failure, log_dispatch, trace};
use crate::marshal::ArgumentMarshaller;
use crate::overload::resolve;
use crate::registry::{ClassDescriptor, ClassId, ConstructorDescriptor, MethodDescriptor, TypeRegistry};
use crate::signature::ReturnKind;
use crate::value::{Args, HostRef, HostValue};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How the foreign side names the method it wants
#[derive(Debug, Clone, Copy)]
pub enum MethodSelector<'a> {
    /// Position in the class's dense method table
    Index(usize),
    /// Overloaded name, resolved by the caller's argument signature
    Name(&'a str),
}

/// Value surfaced to the foreign runtime
#[derive(Debug, Clone)]
pub enum Returned {
    Double(f64),
    Chars(String),
    Object(ObjectRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    ArgsPulled,
    Invoked,
    Returned,
    Failed,
}

/// One in-flight call
struct Invocation<'a> {
    class: &'a str,
    member: &'a str,
    state: CallState,
}

impl<'a> Invocation<'a> {
    fn new(class: &'a str, member: &'a str) -> Self {
        Self {
            class,
            member,
            state: CallState::Idle,
        }
    }

    #[inline]
    fn advance(&mut self, next: CallState) {
        trace!(
            class = self.class,
            member = self.member,
            from = ?self.state,
            to = ?next,
            "call state"
        );
        self.state = next;
    }
}

/// Call counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    calls: AtomicU64,
    constructions: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub calls: u64,
    pub constructions: u64,
    pub failures: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            constructions: self.constructions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    objects: ObjectBridge,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(objects: ObjectBridge) -> Self {
        Self {
            objects,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    #[inline]
    fn registry(&self) -> &TypeRegistry {
        self.objects.registry()
    }

    fn class(&self, id: ClassId) -> Result<Arc<ClassDescriptor>, BridgeError> {
        self.registry().get(id).ok_or(BridgeError::UnknownClass { id })
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create an instance of class `class_id` from the pending arguments
    ///
    /// `Ok(None)` means the class has no constructors at all (a holder of
    /// static methods) and was asked for with no arguments.
    pub fn construct(&self, class_id: ClassId, source: &dyn ArgSource) -> Result<Option<HostRef>, BridgeError> {
        self.stats.constructions.fetch_add(1, Ordering::Relaxed);
        let class = self.class(class_id)?;
        let mut call = Invocation::new(class.name(), "<init>");
        log_dispatch(call.class, call.member, source.arg_count());

        let result = self.construct_inner(&class, source, &mut call);
        self.finish(&mut call, result)
    }

    fn construct_inner(
        &self,
        class: &ClassDescriptor,
        source: &dyn ArgSource,
        call: &mut Invocation<'_>,
    ) -> Result<Option<HostRef>, BridgeError> {
        if source.arg_count() == 0 {
            if class.is_pure_static() {
                return Ok(None);
            }
            let ctor = class.no_arg.as_ref().ok_or_else(|| BridgeError::NoDefaultConstructor {
                class: class.name().to_string(),
            })?;
            call.advance(CallState::ArgsPulled);
            let object = guarded(call.member, || ctor(&Args::default()))?;
            call.advance(CallState::Invoked);
            return Ok(Some(object));
        }

        let candidates: Vec<&ConstructorDescriptor> = class.constructors().iter().collect();
        let hint = (candidates.len() > 1).then(|| source.signature());
        let ctor = resolve(&candidates, hint.as_deref())?;

        let values = ArgumentMarshaller::new(&self.objects).pull(&ctor.signature, source)?;
        call.advance(CallState::ArgsPulled);
        let object = guarded(call.member, || (ctor.call)(&Args::new(values)))?;
        call.advance(CallState::Invoked);
        Ok(Some(object))
    }

    // ------------------------------------------------------------------
    // Method calls
    // ------------------------------------------------------------------

    /// Invoke a method and surface its result by declared return kind
    ///
    /// `receiver` is ignored for static methods and required otherwise.
    pub fn invoke(
        &self,
        receiver: Option<&HostRef>,
        class_id: ClassId,
        selector: MethodSelector<'_>,
        source: &dyn ArgSource,
    ) -> Result<Returned, BridgeError> {
        self.run(receiver, class_id, selector, source, None)
    }

    /// Numeric accessor: doubles, ints, bools and void methods
    ///
    /// Returns [`FAILURE_SENTINEL`] on any failure.
    pub fn invoke_double(
        &self,
        receiver: Option<&HostRef>,
        class_id: ClassId,
        selector: MethodSelector<'_>,
        source: &dyn ArgSource,
    ) -> f64 {
        match self.run(receiver, class_id, selector, source, Some('d')) {
            Ok(Returned::Double(d)) => d,
            _ => FAILURE_SENTINEL,
        }
    }

    /// String accessor; `None` on any failure
    pub fn invoke_chars(
        &self,
        receiver: Option<&HostRef>,
        class_id: ClassId,
        selector: MethodSelector<'_>,
        source: &dyn ArgSource,
    ) -> Option<String> {
        match self.run(receiver, class_id, selector, source, Some('s')) {
            Ok(Returned::Chars(s)) => Some(s),
            _ => None,
        }
    }

    /// Object accessor; `None` on any failure
    ///
    /// A method that legitimately returns null gives `Some(ObjectRef::Null)`.
    pub fn invoke_object(
        &self,
        receiver: Option<&HostRef>,
        class_id: ClassId,
        selector: MethodSelector<'_>,
        source: &dyn ArgSource,
    ) -> Option<ObjectRef> {
        match self.run(receiver, class_id, selector, source, Some('o')) {
            Ok(Returned::Object(o)) => Some(o),
            _ => None,
        }
    }

    fn run(
        &self,
        receiver: Option<&HostRef>,
        class_id: ClassId,
        selector: MethodSelector<'_>,
        source: &dyn ArgSource,
        accessor: Option<char>,
    ) -> Result<Returned, BridgeError> {
        self.stats.calls.fetch_add(1, Ordering::Relaxed);
        let class = match self.class(class_id) {
            Ok(class) => class,
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                log_call_failure("<unknown>", &selector_label(selector), &e.to_string());
                return Err(e);
            }
        };
        let label = selector_label(selector);
        let mut call = Invocation::new(class.name(), &label);
        log_dispatch(call.class, call.member, source.arg_count());

        let result = self.run_inner(receiver, &class, selector, source, accessor, &mut call);
        self.finish(&mut call, result)
    }

    fn run_inner(
        &self,
        receiver: Option<&HostRef>,
        class: &ClassDescriptor,
        selector: MethodSelector<'_>,
        source: &dyn ArgSource,
        accessor: Option<char>,
        call: &mut Invocation<'_>,
    ) -> Result<Returned, BridgeError> {
        let method = select(class, selector, source)?;

        if let Some(requested) = accessor {
            if method.returns.foreign_type() != Some(requested) {
                return Err(BridgeError::WrongAccessor {
                    member: method.name.clone(),
                    declared: method.returns,
                    requested,
                });
            }
        }

        let receiver = if method.is_static {
            None
        } else {
            Some(receiver.ok_or_else(|| BridgeError::MissingReceiver {
                class: class.name().to_string(),
                method: method.name.clone(),
            })?)
        };

        let values = ArgumentMarshaller::new(&self.objects).pull(&method.signature, source)?;
        call.advance(CallState::ArgsPulled);

        let args = Args::new(values);
        let value = guarded(&method.name, || (method.call)(receiver, &args))?;
        call.advance(CallState::Invoked);

        self.surface(method, value)
    }

    /// Gate the produced value through the declared return kind
    fn surface(&self, method: &MethodDescriptor, value: HostValue) -> Result<Returned, BridgeError> {
        let returned = match (method.returns, value) {
            (ReturnKind::Double, HostValue::Double(d)) => Returned::Double(d),
            (ReturnKind::Int, HostValue::Int(i)) => Returned::Double(f64::from(i)),
            (ReturnKind::Bool, HostValue::Bool(b)) => Returned::Double(if b { 1.0 } else { 0.0 }),
            (ReturnKind::Void, HostValue::Void) => Returned::Double(VOID_SUCCESS),
            (ReturnKind::Chars, HostValue::Chars(s)) => Returned::Chars(s),
            (ReturnKind::Object, HostValue::Object(o)) => Returned::Object(self.objects.to_foreign(Some(&o))),
            (ReturnKind::Object, HostValue::Null) => Returned::Object(ObjectRef::Null),
            (declared, other) => {
                return Err(BridgeError::ReturnMismatch {
                    member: method.name.clone(),
                    declared,
                    found: other.kind_name(),
                })
            }
        };
        Ok(returned)
    }

    fn finish<T>(&self, call: &mut Invocation<'_>, result: Result<T, BridgeError>) -> Result<T, BridgeError> {
        match &result {
            Ok(_) => call.advance(CallState::Returned),
            Err(e) => {
                call.advance(CallState::Failed);
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                log_call_failure(call.class, call.member, &e.to_string());
            }
        }
        result
    }
}

fn select<'c>(
    class: &'c ClassDescriptor,
    selector: MethodSelector<'_>,
    source: &dyn ArgSource,
) -> Result<&'c MethodDescriptor, BridgeError> {
    match selector {
        MethodSelector::Index(i) => class.method(i).ok_or_else(|| BridgeError::UnknownMethod {
            class: class.name().to_string(),
            method: format!("#{}", i),
        }),
        MethodSelector::Name(name) => {
            let candidates: Vec<&MethodDescriptor> = class.methods_named(name).collect();
            if candidates.is_empty() {
                return Err(BridgeError::UnknownMethod {
                    class: class.name().to_string(),
                    method: name.to_string(),
                });
            }
            let hint = (candidates.len() > 1).then(|| source.signature());
            Ok(resolve(&candidates, hint.as_deref())?)
        }
    }
}

fn selector_label(selector: MethodSelector<'_>) -> String {
    match selector {
        MethodSelector::Index(i) => format!("#{}", i),
        MethodSelector::Name(name) => name.to_string(),
    }
}

/// Run a host callable, turning its error or panic into a `BridgeError`
fn guarded<T, F>(member: &str, f: F) -> Result<T, BridgeError>
where
    F: FnOnce() -> Result<T, crate::error::HostError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(BridgeError::Invocation {
            member: member.to_string(),
            error,
        }),
        Err(_) => Err(BridgeError::Panicked {
            member: member.to_string(),
        }),
    }
}
