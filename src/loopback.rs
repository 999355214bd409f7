//! In-process foreign runtime
//!
//! A small interpreter double with a reference-counted heap, object
//! templates whose methods are Rust closures, a push/call argument stack,
//! top-level variables and functions, object fields and vectors. Useful for dry runs of an embedding and for
//! exercising the bridge without a real interpreter.
//!
//! Every reference-count change is counted, so tests can check that each
//! retain is matched by exactly one release.

use crate::bridge::WrapperKind;
use crate::value::HostRef;
use crate::foreign::{
    ArgSource, ForeignPtr, ForeignRuntime, IncomingObject, MethodId, NumericHint, ObjectRef, VarPtr,
    FAILURE_SENTINEL,
};
use crate::logging::{trace, warn};
use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A value on the argument stack, or produced by a template method
#[derive(Debug, Clone)]
pub enum StackValue {
    Number(f64),
    Str(String),
    Object(ObjectRef),
    /// A reference the interpreter owns itself; stored in variables and
    /// fields, and released when overwritten or freed
    Native(ForeignPtr),
}

/// Template method body: runtime, receiver, popped arguments
pub type TemplateMethod = Arc<dyn Fn(&Loopback, ForeignPtr, &[StackValue]) -> StackValue + Send + Sync>;

/// Index of a defined template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(usize);

/// A `declare_class` call as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredClass {
    pub foreign_name: String,
    pub id: usize,
    pub methods: String,
}

struct Template {
    name: String,
    methods: Vec<(String, TemplateMethod)>,
}

enum Payload {
    Plain,
    Vector(Vec<f64>),
}

struct Entry {
    refs: usize,
    template: TemplateId,
    payload: Payload,
    fields: HashMap<String, StackValue>,
}

#[derive(Default)]
struct Heap {
    next: u64,
    objects: HashMap<u64, Entry>,
}

const VECTOR_TEMPLATE: TemplateId = TemplateId(0);

pub struct Loopback {
    heap: Mutex<Heap>,
    templates: Mutex<Vec<Template>>,
    stack: Mutex<Vec<StackValue>>,
    variables: Mutex<Vec<(String, StackValue)>>,
    functions: Mutex<Vec<(String, TemplateMethod)>>,
    declared: Mutex<Vec<DeclaredClass>>,
    retains: AtomicU64,
    releases: AtomicU64,
    invalid_releases: AtomicU64,
    allocations: AtomicU64,
    lookups: AtomicU64,
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl Loopback {
    pub fn new() -> Self {
        let vector = Template {
            name: "Vector".to_string(),
            methods: vec![(
                "size".to_string(),
                method(|rt, this, _| StackValue::Number(rt.vector_len(this).map_or(FAILURE_SENTINEL, |n| n as f64))),
            )],
        };
        Self {
            heap: Mutex::new(Heap {
                next: 0x10,
                objects: HashMap::new(),
            }),
            templates: Mutex::new(vec![vector]),
            stack: Mutex::new(Vec::new()),
            variables: Mutex::new(Vec::new()),
            functions: Mutex::new(Vec::new()),
            declared: Mutex::new(Vec::new()),
            retains: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            invalid_releases: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Define an object template with named methods
    pub fn define_template(&self, name: &str, methods: Vec<(&str, TemplateMethod)>) -> TemplateId {
        let mut templates = self.templates.lock();
        templates.push(Template {
            name: name.to_string(),
            methods: methods.into_iter().map(|(n, m)| (n.to_string(), m)).collect(),
        });
        TemplateId(templates.len() - 1)
    }

    /// Create an object of `template` holding one reference
    pub fn alloc(&self, template: TemplateId) -> ForeignPtr {
        self.alloc_entry(template, Payload::Plain)
    }

    fn alloc_entry(&self, template: TemplateId, payload: Payload) -> ForeignPtr {
        let mut heap = self.heap.lock();
        let ptr = heap.next;
        heap.next += 0x10;
        heap.objects.insert(
            ptr,
            Entry {
                refs: 1,
                template,
                payload,
                fields: HashMap::new(),
            },
        );
        self.allocations.fetch_add(1, Ordering::Relaxed);
        ForeignPtr(ptr)
    }

    /// Create or overwrite a scalar variable
    pub fn define_variable(&self, name: &str, value: f64) {
        self.store_variable(name, StackValue::Number(value));
    }

    pub fn define_string_variable(&self, name: &str, value: &str) {
        self.store_variable(name, StackValue::Str(value.to_string()));
    }

    /// Create an object variable holding `object`, taking over the
    /// reference `alloc` handed out
    pub fn define_object_variable(&self, name: &str, object: Option<ForeignPtr>) {
        let value = match object {
            Some(p) => StackValue::Native(p),
            None => StackValue::Object(ObjectRef::Null),
        };
        self.store_variable(name, value);
    }

    /// Define a top-level function; it runs with a null receiver
    pub fn define_function(&self, name: &str, body: TemplateMethod) {
        self.functions.lock().push((name.to_string(), body));
    }

    /// Set a field on a live object; a `Native` value takes over its
    /// reference
    pub fn define_field(&self, object: ForeignPtr, name: &str, value: StackValue) {
        let old = {
            let mut heap = self.heap.lock();
            match heap.objects.get_mut(&object.0) {
                Some(entry) => entry.fields.insert(name.to_string(), value),
                None => Some(value),
            }
        };
        if let Some(old) = old {
            self.discard(old);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current reference count; `None` once the object is freed
    pub fn refcount(&self, ptr: ForeignPtr) -> Option<usize> {
        self.heap.lock().objects.get(&ptr.0).map(|e| e.refs)
    }

    pub fn live_objects(&self) -> usize {
        self.heap.lock().objects.len()
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        match self.variable_value(name) {
            Some(StackValue::Number(v)) => Some(v),
            _ => None,
        }
    }

    pub fn string_variable(&self, name: &str) -> Option<String> {
        match self.variable_value(name) {
            Some(StackValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Raw value of any variable
    pub fn variable_value(&self, name: &str) -> Option<StackValue> {
        self.variables.lock().iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
    }

    /// Raw value of an object field
    pub fn field(&self, object: ForeignPtr, name: &str) -> Option<StackValue> {
        self.heap.lock().objects.get(&object.0)?.fields.get(name).cloned()
    }

    pub fn declared(&self) -> Vec<DeclaredClass> {
        self.declared.lock().clone()
    }

    /// Values pushed but not yet consumed by a call
    pub fn pending_pushes(&self) -> usize {
        self.stack.lock().len()
    }

    pub fn retains(&self) -> u64 {
        self.retains.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    /// Releases of objects that were not alive
    pub fn invalid_releases(&self) -> u64 {
        self.invalid_releases.load(Ordering::Relaxed)
    }

    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Variable lookups performed
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn pop_args(&self, argc: usize) -> Option<Vec<StackValue>> {
        let mut stack = self.stack.lock();
        if stack.len() < argc {
            // Dropped after the lock; wrappers release through the heap
            let stale = std::mem::take(&mut *stack);
            drop(stack);
            drop(stale);
            return None;
        }
        let at = stack.len() - argc;
        Some(stack.split_off(at))
    }

    /// Replace a variable's value, creating it if needed
    fn store_variable(&self, name: &str, value: StackValue) {
        let old = {
            let mut vars = self.variables.lock();
            match vars.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => Some(std::mem::replace(&mut slot.1, value)),
                None => {
                    vars.push((name.to_string(), value));
                    None
                }
            }
        };
        if let Some(old) = old {
            self.discard(old);
        }
    }

    /// Overwrite an existing object variable; `false` if there is none
    fn replace_object_variable(&self, name: &str, value: StackValue) -> bool {
        let old = {
            let mut vars = self.variables.lock();
            match vars.iter_mut().find(|(n, v)| n == name && is_object_slot(v)) {
                Some(slot) => Ok(std::mem::replace(&mut slot.1, value)),
                None => Err(value),
            }
        };
        let stored = old.is_ok();
        match old {
            Ok(v) | Err(v) => self.discard(v),
        }
        stored
    }

    /// Convert an object handed in by the bridge into stored form, taking
    /// the interpreter's own reference on foreign objects
    fn keep(&self, value: ObjectRef) -> StackValue {
        match value {
            ObjectRef::Foreign { pointer, .. } => {
                self.retain(pointer);
                StackValue::Native(pointer)
            }
            other => StackValue::Object(other),
        }
    }

    /// Drop a stored value, giving back an owned reference
    fn discard(&self, value: StackValue) {
        if let StackValue::Native(p) = value {
            self.release(p);
        }
    }

    /// Report a stored or returned value as an object
    fn incoming(&self, value: StackValue) -> IncomingObject {
        match value {
            StackValue::Object(ObjectRef::Null) => IncomingObject::Null,
            // The wrapper itself comes back; its reference stays with it
            StackValue::Object(ObjectRef::Foreign { object, .. }) => IncomingObject::Host(object as HostRef),
            StackValue::Object(ObjectRef::Host { object, .. }) => IncomingObject::Host(object),
            StackValue::Native(pointer) => IncomingObject::Foreign {
                pointer,
                tag: self.wrapper_tag(pointer),
            },
            StackValue::Str(s) => IncomingObject::Chars(s),
            StackValue::Number(_) => IncomingObject::Failed,
        }
    }

    fn wrapper_tag(&self, object: ForeignPtr) -> u8 {
        let template = self.heap.lock().objects.get(&object.0).map(|e| e.template);
        match template {
            Some(VECTOR_TEMPLATE) => WrapperKind::Vector.tag(),
            _ => WrapperKind::Object.tag(),
        }
    }

    fn call(&self, object: ForeignPtr, method: MethodId, argc: usize) -> Option<StackValue> {
        let args = self.pop_args(argc)?;
        let template = self.heap.lock().objects.get(&object.0).map(|e| e.template)?;
        let (template_index, method_index) = decode_method_id(method);
        if template_index != template.0 {
            return None;
        }
        let body = self
            .templates
            .lock()
            .get(template_index)
            .and_then(|t| t.methods.get(method_index))
            .map(|(_, m)| Arc::clone(m))?;
        // Locks are released; the body may call back into the runtime
        Some(body(self, object, &args))
    }

    fn with_vector<R>(&self, vector: ForeignPtr, f: impl FnOnce(&mut Vec<f64>) -> R) -> Option<R> {
        let mut heap = self.heap.lock();
        match heap.objects.get_mut(&vector.0).map(|e| &mut e.payload) {
            Some(Payload::Vector(values)) => Some(f(values)),
            _ => None,
        }
    }
}

/// Wrap a closure as a template method
pub fn method<F>(body: F) -> TemplateMethod
where
    F: Fn(&Loopback, ForeignPtr, &[StackValue]) -> StackValue + Send + Sync + 'static,
{
    Arc::new(body)
}

fn is_object_slot(value: &StackValue) -> bool {
    matches!(value, StackValue::Object(_) | StackValue::Native(_))
}

#[inline]
fn encode_method_id(template: usize, index: usize) -> MethodId {
    MethodId(((template as u64) << 32) | index as u64)
}

#[inline]
fn decode_method_id(id: MethodId) -> (usize, usize) {
    ((id.0 >> 32) as usize, (id.0 & 0xffff_ffff) as usize)
}

impl ForeignRuntime for Loopback {
    fn retain(&self, pointer: ForeignPtr) {
        let mut heap = self.heap.lock();
        if let Some(entry) = heap.objects.get_mut(&pointer.0) {
            entry.refs += 1;
            self.retains.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn release(&self, pointer: ForeignPtr) {
        let freed = {
            let mut heap = self.heap.lock();
            let Some(entry) = heap.objects.get_mut(&pointer.0) else {
                self.invalid_releases.fetch_add(1, Ordering::Relaxed);
                warn!(pointer = pointer.0, "release of a dead object");
                return;
            };
            entry.refs -= 1;
            self.releases.fetch_add(1, Ordering::Relaxed);
            if entry.refs == 0 {
                heap.objects.remove(&pointer.0)
            } else {
                None
            }
        };
        // Fields are dropped outside the heap lock
        if let Some(entry) = freed {
            trace!(pointer = pointer.0, "object freed");
            for (_, value) in entry.fields {
                self.discard(value);
            }
        }
    }

    fn declare_class(&self, foreign_name: &str, id: usize, methods: &str) {
        self.declared.lock().push(DeclaredClass {
            foreign_name: foreign_name.to_string(),
            id,
            methods: methods.to_string(),
        });
    }

    fn push_double(&self, value: f64) {
        self.stack.lock().push(StackValue::Number(value));
    }

    fn push_string(&self, value: &str) {
        self.stack.lock().push(StackValue::Str(value.to_string()));
    }

    fn push_object(&self, value: ObjectRef) {
        self.stack.lock().push(StackValue::Object(value));
    }

    fn method_id(&self, object: ForeignPtr, name: &str) -> Option<MethodId> {
        let template = self.heap.lock().objects.get(&object.0).map(|e| e.template)?;
        let templates = self.templates.lock();
        let index = templates.get(template.0)?.methods.iter().position(|(n, _)| n == name)?;
        Some(encode_method_id(template.0, index))
    }

    fn call_double(&self, object: ForeignPtr, method: MethodId, argc: usize) -> f64 {
        match self.call(object, method, argc) {
            Some(StackValue::Number(d)) => d,
            _ => FAILURE_SENTINEL,
        }
    }

    fn call_chars(&self, object: ForeignPtr, method: MethodId, argc: usize) -> Option<String> {
        match self.call(object, method, argc) {
            Some(StackValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    fn call_object(&self, object: ForeignPtr, method: MethodId, argc: usize) -> IncomingObject {
        match self.call(object, method, argc) {
            Some(value) => self.incoming(value),
            None => IncomingObject::Failed,
        }
    }

    fn new_object(&self, template: &str, argc: usize) -> Option<ForeignPtr> {
        let args = self.pop_args(argc)?;
        let id = self.templates.lock().iter().position(|t| t.name == template).map(TemplateId)?;
        if id == VECTOR_TEMPLATE {
            let size = match args.first() {
                Some(StackValue::Number(n)) if *n >= 0.0 => *n as usize,
                None => 0,
                _ => return None,
            };
            return self.vector_new(size);
        }
        Some(self.alloc(id))
    }

    fn object_name(&self, object: ForeignPtr) -> Option<String> {
        let template = self.heap.lock().objects.get(&object.0).map(|e| e.template)?;
        let name = self.templates.lock().get(template.0).map(|t| t.name.clone())?;
        Some(format!("{}[{}]", name, object.0 / 0x10 - 1))
    }

    fn locate_variable(&self, name: &str) -> Option<VarPtr> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.variables
            .lock()
            .iter()
            .position(|(n, v)| n == name && matches!(v, StackValue::Number(_)))
            .map(|i| VarPtr(i as u64 + 1))
    }

    fn read_variable(&self, var: VarPtr) -> f64 {
        let index = var.0.wrapping_sub(1) as usize;
        match self.variables.lock().get(index) {
            Some((_, StackValue::Number(v))) => *v,
            _ => FAILURE_SENTINEL,
        }
    }

    fn write_variable(&self, var: VarPtr, value: f64) {
        let index = var.0.wrapping_sub(1) as usize;
        if let Some((_, StackValue::Number(slot))) = self.variables.lock().get_mut(index) {
            *slot = value;
        }
    }

    fn read_string_variable(&self, name: &str) -> Option<String> {
        self.string_variable(name)
    }

    fn write_string_variable(&self, name: &str, value: &str) -> bool {
        let mut vars = self.variables.lock();
        match vars.iter_mut().find(|(n, _)| n == name) {
            Some((_, StackValue::Str(slot))) => {
                *slot = value.to_string();
                true
            }
            _ => false,
        }
    }

    fn read_object_variable(&self, name: &str) -> IncomingObject {
        match self.variable_value(name) {
            Some(value) if is_object_slot(&value) => self.incoming(value),
            _ => IncomingObject::Failed,
        }
    }

    fn write_object_variable(&self, name: &str, value: ObjectRef) -> bool {
        let value = self.keep(value);
        self.replace_object_variable(name, value)
    }

    /// Understands assignments of the form `name = number`
    fn execute(&self, statement: &str) -> bool {
        let Some((name, value)) = statement.split_once('=') else {
            return false;
        };
        let name = name.trim();
        let valid_name = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !name.starts_with(|c: char| c.is_ascii_digit());
        match value.trim().parse::<f64>() {
            Ok(v) if valid_name => {
                self.define_variable(name, v);
                true
            }
            _ => false,
        }
    }

    fn call_function(&self, name: &str, argc: usize) -> f64 {
        let Some(args) = self.pop_args(argc) else {
            return FAILURE_SENTINEL;
        };
        let body = self
            .functions
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| Arc::clone(f));
        match body.map(|f| f(self, ForeignPtr::NULL, &args)) {
            Some(StackValue::Number(d)) => d,
            _ => FAILURE_SENTINEL,
        }
    }

    fn field_chars(&self, object: ForeignPtr, name: &str) -> Option<String> {
        match self.field(object, name) {
            Some(StackValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    fn field_object(&self, object: ForeignPtr, name: &str) -> IncomingObject {
        match self.field(object, name) {
            Some(value) if is_object_slot(&value) => self.incoming(value),
            _ => IncomingObject::Failed,
        }
    }

    fn set_field_object(&self, object: ForeignPtr, name: &str, value: ObjectRef) -> bool {
        let value = self.keep(value);
        let old = {
            let mut heap = self.heap.lock();
            let slot = heap
                .objects
                .get_mut(&object.0)
                .and_then(|e| e.fields.get_mut(name))
                .filter(|v| is_object_slot(v));
            match slot {
                Some(slot) => Ok(std::mem::replace(slot, value)),
                None => Err(value),
            }
        };
        let stored = old.is_ok();
        match old {
            Ok(v) | Err(v) => self.discard(v),
        }
        stored
    }

    fn vector_new(&self, size: usize) -> Option<ForeignPtr> {
        Some(self.alloc_entry(VECTOR_TEMPLATE, Payload::Vector(vec![0.0; size])))
    }

    fn vector_len(&self, vector: ForeignPtr) -> Option<usize> {
        self.with_vector(vector, |v| v.len())
    }

    fn vector_get(&self, vector: ForeignPtr, index: usize) -> Option<f64> {
        self.with_vector(vector, |v| v.get(index).copied()).flatten()
    }

    fn vector_set(&self, vector: ForeignPtr, index: usize, value: f64) -> bool {
        self.with_vector(vector, |v| match v.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        })
        .unwrap_or(false)
    }

    fn vector_assign(&self, vector: ForeignPtr, values: &[f64]) -> bool {
        self.with_vector(vector, |v| {
            v.clear();
            v.extend_from_slice(values);
        })
        .is_some()
    }

    fn vector_snapshot(&self, vector: ForeignPtr) -> Option<Vec<f64>> {
        self.with_vector(vector, |v| v.clone())
    }
}

// ----------------------------------------------------------------------
// Pending arguments of one foreign call
// ----------------------------------------------------------------------

/// One positional argument as the interpreter holds it
#[derive(Debug, Clone)]
pub enum CallArg {
    Number(f64),
    Str(String),
    Object(IncomingObject),
}

/// The argument frame of a call into the host
///
/// Counts every fetch so tests can see which positions were read.
#[derive(Debug)]
pub struct PendingCall {
    args: Vec<CallArg>,
    fetches: Cell<usize>,
}

impl PendingCall {
    pub fn new(args: Vec<CallArg>) -> Self {
        Self {
            args,
            fetches: Cell::new(0),
        }
    }

    /// A frame with no arguments
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// A frame of numeric arguments
    pub fn numbers(values: &[f64]) -> Self {
        Self::new(values.iter().copied().map(CallArg::Number).collect())
    }

    /// Fetches performed so far
    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }

    fn fetch(&self, index: usize) -> Option<&CallArg> {
        self.fetches.set(self.fetches.get() + 1);
        index.checked_sub(1).and_then(|i| self.args.get(i))
    }
}

impl ArgSource for PendingCall {
    fn arg_count(&self) -> usize {
        self.args.len()
    }

    fn double_arg(&self, index: usize, hint: NumericHint) -> f64 {
        match (self.fetch(index), hint) {
            (Some(CallArg::Number(d)), NumericHint::Real) => *d,
            (Some(CallArg::Number(d)), NumericHint::Integral) => d.round(),
            _ => FAILURE_SENTINEL,
        }
    }

    fn string_arg(&self, index: usize) -> Option<String> {
        match self.fetch(index) {
            Some(CallArg::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn object_arg(&self, index: usize) -> IncomingObject {
        match self.fetch(index) {
            Some(CallArg::Object(o)) => o.clone(),
            Some(CallArg::Str(s)) => IncomingObject::Chars(s.clone()),
            _ => IncomingObject::Failed,
        }
    }

    fn signature(&self) -> String {
        self.args
            .iter()
            .map(|a| match a {
                CallArg::Number(_) => 'd',
                CallArg::Str(_) => 'S',
                CallArg::Object(_) => 'o',
            })
            .collect()
    }
}
