//! Registry metadata records

use super::class::{ConstructorFn, MethodFn};
use crate::overload::Overload;
use crate::signature::{ReturnKind, Signature};
use core::any::TypeId;
use core::fmt;
use serde::Serialize;

/// Numeric class identity known to the foreign runtime
pub type ClassId = usize;

/// A registrable constructor
#[derive(Clone)]
pub struct ConstructorDescriptor {
    pub signature: Signature,
    pub foreign_signature: Signature,
    pub(crate) call: ConstructorFn,
}

impl Overload for ConstructorDescriptor {
    fn foreign_signature(&self) -> &Signature {
        &self.foreign_signature
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Constructor({})", self.signature)
    }
}

/// A registrable method
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub signature: Signature,
    pub foreign_signature: Signature,
    pub returns: ReturnKind,
    pub is_static: bool,
    pub(crate) call: MethodFn,
}

impl Overload for MethodDescriptor {
    fn foreign_signature(&self) -> &Signature {
        &self.foreign_signature
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}({})", self.returns.tag(), self.name, self.signature)
    }
}

/// Two variants the foreign caller cannot tell apart; `kept` wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub member: String,
    pub foreign_signature: String,
    pub kept: String,
    pub shadowed: String,
}

/// Everything the bridge knows about one registered host class
pub struct ClassDescriptor {
    pub(crate) name: String,
    pub(crate) type_id: TypeId,
    pub(crate) id: ClassId,
    pub(crate) pure_static: bool,
    pub(crate) no_arg: Option<ConstructorFn>,
    pub(crate) constructors: Vec<ConstructorDescriptor>,
    pub(crate) methods: Vec<MethodDescriptor>,
    pub(crate) collisions: Vec<Collision>,
}

impl ClassDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    /// True iff the class declared no constructor at all
    pub fn is_pure_static(&self) -> bool {
        self.pure_static
    }

    pub fn has_no_arg_constructor(&self) -> bool {
        self.no_arg.is_some()
    }

    /// Constructors taking at least one argument, in registration order
    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    /// The dispatch table; a method id is an index into it
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, id: usize) -> Option<&MethodDescriptor> {
        self.methods.get(id)
    }

    /// Overload set for a name, in registration order
    pub fn methods_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a MethodDescriptor> + 'n
    where
        'a: 'n,
    {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Foreign-side name: dots become underscores
    pub fn foreign_name(&self) -> String {
        mangle_name(&self.name)
    }

    /// Method declaration sent to the foreign runtime, one triple per
    /// method: `<d|s|o> <name> <signature>`, space separated
    pub fn foreign_method_table(&self) -> String {
        let mut table = String::new();
        for m in &self.methods {
            // Registered methods always have a supported return kind
            let Some(ty) = m.returns.foreign_type() else {
                continue;
            };
            if !table.is_empty() {
                table.push(' ');
            }
            table.push(ty);
            table.push(' ');
            table.push_str(&m.name);
            table.push(' ');
            table.push_str(&m.signature.to_string());
        }
        table
    }

    /// Serializable summary for metadata export
    pub fn summary(&self) -> ClassSummary {
        ClassSummary {
            id: self.id,
            name: self.name.clone(),
            pure_static: self.pure_static,
            no_arg_constructor: self.no_arg.is_some(),
            constructors: self
                .constructors
                .iter()
                .map(|c| SignatureSummary {
                    host: c.signature.to_string(),
                    foreign: c.foreign_signature.to_string(),
                })
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|m| MethodSummary {
                    name: m.name.clone(),
                    returns: m.returns.tag(),
                    is_static: m.is_static,
                    host: m.signature.to_string(),
                    foreign: m.foreign_signature.to_string(),
                })
                .collect(),
            collisions: self.collisions.clone(),
        }
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("pure_static", &self.pure_static)
            .field("constructors", &self.constructors)
            .field("methods", &self.methods)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub id: ClassId,
    pub name: String,
    pub pure_static: bool,
    pub no_arg_constructor: bool,
    pub constructors: Vec<SignatureSummary>,
    pub methods: Vec<MethodSummary>,
    pub collisions: Vec<Collision>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignatureSummary {
    pub host: String,
    pub foreign: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodSummary {
    pub name: String,
    pub returns: char,
    pub is_static: bool,
    pub host: String,
    pub foreign: String,
}

/// `org.example.Cell` -> `org_example_Cell`
pub fn mangle_name(name: &str) -> String {
    name.replace('.', "_")
}
