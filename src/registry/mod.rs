//! Type registry - host classes known to the foreign runtime
//!
//! Design: append-only tables assigned once per class:
//! - `by_type`: host type identity -> numeric id
//! - `by_id`: dense table indexed by numeric id
//!
//! Ids are never reused or reassigned. Registration validates the whole
//! class before touching either table, so a failed registration leaves no
//! trace.

mod catalog;
mod class;
mod descriptor;


pub use catalog::ClassCatalog;
pub use class::{ClassBuilder, ClassSpec, ConstructorFn, ConstructorSpec, HostClass, MethodFn, MethodSpec};
pub use descriptor::{
    mangle_name, ClassDescriptor, ClassId, ClassSummary, Collision, ConstructorDescriptor,
    MethodDescriptor, MethodSummary, SignatureSummary,
};

use crate::config::{CollisionPolicy, DuplicatePolicy, RegistryConfig};
use crate::error::RegistrationError;
use crate::logging::{
    log_member_skipped, log_overload_collision, log_registration, log_registration_error, perf,
};
use crate::signature::{derive_host_signature, foreign_collisions, to_foreign_signature, Signature};
use core::any::TypeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Tables {
    by_type: HashMap<TypeId, ClassId>,
    by_id: Vec<Arc<ClassDescriptor>>,
}

/// Process-wide class registry
#[derive(Default)]
pub struct TypeRegistry {
    tables: RwLock<Tables>,
    config: RegistryConfig,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            tables: RwLock::default(),
            config,
        }
    }

    /// Register a self-describing host type
    pub fn register<T: HostClass>(&self) -> Result<Arc<ClassDescriptor>, RegistrationError> {
        self.register_spec(T::class_spec())
    }

    /// Register a class from its full public surface
    pub fn register_spec(&self, spec: ClassSpec) -> Result<Arc<ClassDescriptor>, RegistrationError> {
        let name = spec.name.clone();
        let result = self.register_inner(spec);
        if let Err(e) = &result {
            log_registration_error(&name, &e.to_string());
        }
        result
    }

    fn register_inner(&self, spec: ClassSpec) -> Result<Arc<ClassDescriptor>, RegistrationError> {
        let _timer = perf::track("register_class");
        validate(&spec)?;

        let mut tables = self.tables.write();
        if let Some(&id) = tables.by_type.get(&spec.type_id) {
            return match self.config.duplicates {
                DuplicatePolicy::Reuse => Ok(Arc::clone(&tables.by_id[id])),
                DuplicatePolicy::Reject => Err(RegistrationError::AlreadyRegistered { name: spec.name }),
            };
        }

        let id = tables.by_id.len();
        let descriptor = Arc::new(self.build_descriptor(spec, id)?);

        tables.by_type.insert(descriptor.type_id, id);
        tables.by_id.push(Arc::clone(&descriptor));

        log_registration(
            &descriptor.name,
            id,
            descriptor.constructors.len(),
            descriptor.methods.len(),
        );
        Ok(descriptor)
    }

    fn build_descriptor(&self, spec: ClassSpec, id: ClassId) -> Result<ClassDescriptor, RegistrationError> {
        let pure_static = spec.constructors.is_empty();
        let mut no_arg = None;
        let mut constructors = Vec::new();

        for ctor in spec.constructors {
            if ctor.params.is_empty() {
                no_arg = Some(ctor.call);
                continue;
            }
            match derive_host_signature(&ctor.params) {
                Some(signature) => constructors.push(ConstructorDescriptor {
                    foreign_signature: to_foreign_signature(&signature),
                    signature,
                    call: ctor.call,
                }),
                None => log_member_skipped(&spec.name, "<init>", "parameter type not in signature alphabet"),
            }
        }

        let mut methods = Vec::new();
        for method in spec.methods {
            if !method.returns.is_supported() {
                log_member_skipped(&spec.name, &method.name, "unsupported return type");
                continue;
            }
            let Some(signature) = derive_host_signature(&method.params) else {
                log_member_skipped(&spec.name, &method.name, "parameter type not in signature alphabet");
                continue;
            };
            methods.push(MethodDescriptor {
                name: method.name,
                foreign_signature: to_foreign_signature(&signature),
                signature,
                returns: method.returns,
                is_static: method.is_static,
                call: method.call,
            });
        }

        let mut collisions = Vec::new();
        let ctor_sigs: Vec<Signature> = constructors.iter().map(|c| c.signature.clone()).collect();
        collect_collisions("<init>", &ctor_sigs, &mut collisions);

        let mut names: Vec<&str> = Vec::new();
        for m in &methods {
            if !names.contains(&m.name.as_str()) {
                names.push(&m.name);
            }
        }
        for name in names {
            let sigs: Vec<Signature> = methods
                .iter()
                .filter(|m| m.name == name)
                .map(|m| m.signature.clone())
                .collect();
            collect_collisions(name, &sigs, &mut collisions);
        }

        for c in &collisions {
            log_overload_collision(&spec.name, &c.member, &c.foreign_signature, &c.kept, &c.shadowed);
        }
        if self.config.collisions == CollisionPolicy::Reject {
            if let Some(c) = collisions.first() {
                return Err(RegistrationError::AmbiguousOverloads {
                    class: spec.name,
                    member: c.member.clone(),
                    foreign_signature: c.foreign_signature.clone(),
                });
            }
        }

        Ok(ClassDescriptor {
            name: spec.name,
            type_id: spec.type_id,
            id,
            pure_static,
            no_arg,
            constructors,
            methods,
            collisions,
        })
    }

    /// Descriptor by numeric id
    pub fn get(&self, id: ClassId) -> Option<Arc<ClassDescriptor>> {
        self.tables.read().by_id.get(id).cloned()
    }

    /// Descriptor by host type identity
    pub fn lookup(&self, type_id: TypeId) -> Option<Arc<ClassDescriptor>> {
        let tables = self.tables.read();
        tables.by_type.get(&type_id).map(|&id| Arc::clone(&tables.by_id[id]))
    }

    /// Descriptor by dotted class name
    pub fn lookup_name(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.tables.read().by_id.iter().find(|d| d.name == name).cloned()
    }

    /// Numeric id of a host type, if registered
    #[inline]
    pub fn id_of(&self, type_id: TypeId) -> Option<ClassId> {
        self.tables.read().by_type.get(&type_id).copied()
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verify the two tables agree for every registered class
    pub fn check_consistency(&self) -> bool {
        let tables = self.tables.read();
        tables.by_type.len() == tables.by_id.len()
            && tables.by_type.iter().all(|(type_id, &id)| {
                tables
                    .by_id
                    .get(id)
                    .map_or(false, |d| d.id == id && d.type_id == *type_id)
            })
    }

    /// Export all descriptors as JSON
    pub fn metadata_json(&self) -> serde_json::Result<String> {
        let summaries: Vec<ClassSummary> = self.tables.read().by_id.iter().map(|d| d.summary()).collect();
        serde_json::to_string_pretty(&summaries)
    }
}

fn collect_collisions(member: &str, sigs: &[Signature], out: &mut Vec<Collision>) {
    for (kept, shadowed) in foreign_collisions(sigs) {
        out.push(Collision {
            member: member.to_string(),
            foreign_signature: to_foreign_signature(&sigs[kept]).to_string(),
            kept: sigs[kept].to_string(),
            shadowed: sigs[shadowed].to_string(),
        });
    }
}

/// Reject names that would corrupt the foreign method table
fn validate(spec: &ClassSpec) -> Result<(), RegistrationError> {
    let bad_name = |s: &str| s.is_empty() || s.chars().any(char::is_whitespace);

    if bad_name(&spec.name) {
        return Err(RegistrationError::InvalidMember {
            class: spec.name.clone(),
            member: spec.name.clone(),
            reason: "class name must be non-empty and contain no whitespace",
        });
    }
    for m in &spec.methods {
        if bad_name(&m.name) {
            return Err(RegistrationError::InvalidMember {
                class: spec.name.clone(),
                member: m.name.clone(),
                reason: "method name must be non-empty and contain no whitespace",
            });
        }
    }
    Ok(())
}
