//! Object bridge tests

use super::*;
use crate::loopback::{method, Loopback, StackValue};
use crate::registry::{ClassSpec, HostClass};
use crate::value::host_ref;

struct Synapse;

impl HostClass for Synapse {
    fn class_spec() -> ClassSpec {
        ClassSpec::builder::<Synapse>("org.neuron.Synapse")
            .no_arg_constructor(|| Synapse)
            .build()
    }
}

fn setup() -> (Arc<Loopback>, ObjectBridge) {
    let rt = Arc::new(Loopback::new());
    let registry = Arc::new(TypeRegistry::new());
    registry.register::<Synapse>().unwrap();
    (rt.clone(), ObjectBridge::new(rt, registry))
}

#[test]
fn test_encapsulate_retains_once() {
    let (rt, objects) = setup();
    let template = rt.define_template("List", Vec::new());
    let ptr = rt.alloc(template);

    let wrapper = objects.encapsulate(ptr, 0).unwrap();
    assert_eq!(rt.refcount(ptr), Some(2));
    assert_eq!(wrapper.wrapper_kind(), WrapperKind::Object);

    drop(wrapper);
    assert_eq!(rt.refcount(ptr), Some(1));
    assert_eq!(rt.retains(), rt.releases());
}

#[test]
fn test_close_then_drop_releases_once() {
    let (rt, objects) = setup();
    let template = rt.define_template("List", Vec::new());
    let ptr = rt.alloc(template);

    let wrapper = objects.encapsulate(ptr, 0).unwrap();
    assert!(wrapper.close());
    assert!(!wrapper.close());
    assert!(!wrapper.is_live());
    drop(wrapper);

    assert_eq!(rt.releases(), 1);
    assert_eq!(rt.invalid_releases(), 0);
}

#[test]
fn test_release_from_another_thread() {
    let (rt, objects) = setup();
    let template = rt.define_template("List", Vec::new());
    let ptr = rt.alloc(template);
    let wrapper = objects.encapsulate(ptr, 0).unwrap();

    std::thread::spawn(move || drop(wrapper)).join().unwrap();
    assert_eq!(rt.refcount(ptr), Some(1));
}

#[test]
fn test_unknown_tag() {
    let (_rt, objects) = setup();
    let err = objects.encapsulate(ForeignPtr(0x10), 7).unwrap_err();
    assert_eq!(err, BridgeError::UnknownWrapperTag { tag: 7 });
}

#[test]
fn test_encapsulate_null() {
    let (rt, objects) = setup();
    let err = objects.encapsulate(ForeignPtr::NULL, 0).unwrap_err();
    assert_eq!(err, BridgeError::NullPointer);
    assert_eq!(rt.retains(), 0);
}

#[test]
fn test_kind_of() {
    let (rt, objects) = setup();

    let registered = host_ref(Synapse);
    assert_eq!(objects.kind_of(&registered), ObjectKind::registered(0));

    let opaque = host_ref(vec![1u8, 2, 3]);
    assert_eq!(objects.kind_of(&opaque), ObjectKind::OPAQUE);

    let vector: HostRef = objects.new_vector(2).unwrap();
    assert_eq!(objects.kind_of(&vector), ObjectKind(-3));

    let template = rt.define_template("List", Vec::new());
    let plain: HostRef = objects.encapsulate(rt.alloc(template), 0).unwrap();
    assert_eq!(objects.kind_of(&plain), ObjectKind(-2));

    // A released wrapper is no longer a foreign reference
    as_foreign(&plain).unwrap().close();
    assert_eq!(objects.kind_of(&plain), ObjectKind::OPAQUE);
}

#[test]
fn test_to_foreign_round_trip() {
    let (rt, objects) = setup();
    let template = rt.define_template("List", Vec::new());
    let ptr = rt.alloc(template);
    let wrapper: HostRef = objects.encapsulate(ptr, 0).unwrap();

    match objects.to_foreign(Some(&wrapper)) {
        ObjectRef::Foreign { pointer, kind, object } => {
            assert_eq!(pointer, ptr);
            assert_eq!(kind.wrapper_tag(), Some(0));
            assert!(objects.identical(&(object as HostRef), &wrapper));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(objects.to_foreign(None), ObjectRef::Null));
}

#[test]
fn test_new_object_adopts() {
    let (rt, objects) = setup();
    rt.define_template("IClamp", Vec::new());

    let clamp = objects.new_object("IClamp", &[]).unwrap();
    let ptr = clamp.pointer().unwrap();
    assert_eq!(rt.refcount(ptr), Some(1));
    assert_eq!(rt.retains(), 0);

    drop(clamp);
    assert_eq!(rt.refcount(ptr), None);

    let err = objects.new_object("NoSuchTemplate", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::ForeignAllocationFailed { .. }));
}

#[test]
fn test_vector_wrapper() {
    let (rt, objects) = setup();
    let v = objects.vector_from(&[1.0, 2.0, 3.0]).unwrap();
    assert_eq!(v.len().unwrap(), 3);
    v.set(0, 9.0).unwrap();
    assert_eq!(v.get(0).unwrap(), 9.0);
    assert_eq!(v.to_vec().unwrap(), vec![9.0, 2.0, 3.0]);
    assert!(v.get(10).is_err());
    assert_eq!(objects.call_double(&v, "size", &[]).unwrap(), 3.0);

    v.close();
    assert_eq!(v.len(), Err(BridgeError::Released));
    assert_eq!(rt.live_objects(), 0);
}

#[test]
fn test_calls_on_wrapped_objects() {
    let (rt, objects) = setup();
    let template = rt.define_template(
        "Cell",
        vec![
            (
                "area",
                method(|_, _, args| match args {
                    [StackValue::Number(d)] => StackValue::Number(d * d),
                    _ => StackValue::Number(crate::foreign::FAILURE_SENTINEL),
                }),
            ),
            ("name", method(|_, _, _| StackValue::Str("soma".into()))),
            (
                "echo",
                method(|_, _, args| match args {
                    [StackValue::Object(o)] => StackValue::Object(o.clone()),
                    _ => StackValue::Object(ObjectRef::Null),
                }),
            ),
        ],
    );
    let cell = objects.encapsulate(rt.alloc(template), 0).unwrap();

    assert_eq!(objects.call_double(&cell, "area", &[ArgumentValue::Double(3.0)]).unwrap(), 9.0);
    assert_eq!(objects.call_chars(&cell, "name", &[]).unwrap(), "soma");

    // Host objects travel through the foreign side unchanged
    let synapse = host_ref(Synapse);
    let back = objects
        .call_object(&cell, "echo", &[ArgumentValue::Object(Arc::clone(&synapse))])
        .unwrap()
        .unwrap();
    assert!(objects.identical(&synapse, &back));

    let err = objects.call_double(&cell, "volume", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::ForeignMethodNotFound { .. }));
    assert_eq!(rt.pending_pushes(), 0);
}

#[test]
fn test_identity_and_names() {
    let (rt, objects) = setup();
    let template = rt.define_template("List", Vec::new());
    let ptr = rt.alloc(template);
    let a: HostRef = objects.encapsulate(ptr, 0).unwrap();
    let b: HostRef = objects.encapsulate(ptr, 0).unwrap();
    assert!(objects.identical(&a, &b));

    let s: HostRef = host_ref(Synapse);
    assert!(!objects.identical(&a, &s));
    assert_eq!(objects.class_name(&s).as_deref(), Some("org.neuron.Synapse"));
    assert!(objects.class_name(&a).unwrap().starts_with("List["));
    assert_eq!(objects.class_name(&host_ref(1u8)), None);
}

#[test]
fn test_handed_out_wrapper_keeps_reference() {
    let (rt, objects) = setup();
    let vector: HostRef = objects.new_vector(4).unwrap();
    let ptr = as_foreign(&vector).unwrap().pointer().unwrap();

    let handed_out = objects.to_foreign(Some(&vector));
    drop(vector);
    assert_eq!(rt.refcount(ptr), Some(1));

    drop(handed_out);
    assert_eq!(rt.refcount(ptr), None);
}

#[test]
fn test_fields() {
    let (rt, objects) = setup();
    let template = rt.define_template("Section", Vec::new());
    let section = rt.alloc(template);
    let parent = rt.alloc(template);
    rt.define_field(section, "name", StackValue::Str("dend".into()));
    rt.define_field(section, "parent", StackValue::Native(parent));
    rt.define_field(section, "child", StackValue::Object(ObjectRef::Null));
    let wrapper = objects.encapsulate(section, 0).unwrap();

    assert_eq!(objects.field_chars(&wrapper, "name").unwrap(), "dend");
    assert!(objects.field_chars(&wrapper, "parent").is_err());

    let held = objects.field_object(&wrapper, "parent").unwrap().unwrap();
    assert_eq!(as_foreign(&held).unwrap().pointer(), Some(parent));
    assert_eq!(rt.refcount(parent), Some(2));
    assert!(objects.field_object(&wrapper, "child").unwrap().is_none());
    assert_eq!(
        objects.field_object(&wrapper, "nope").unwrap_err(),
        BridgeError::ForeignFieldFailed { field: "nope".into() }
    );

    // Moving the parent into another field: the field takes its own reference
    objects.set_field_object(&wrapper, "child", Some(&held)).unwrap();
    assert_eq!(rt.refcount(parent), Some(3));
    objects.set_field_object(&wrapper, "parent", None).unwrap();
    assert_eq!(rt.refcount(parent), Some(2));
    assert!(objects.set_field_object(&wrapper, "name", None).is_err());

    let synapse = host_ref(Synapse);
    objects.set_field_object(&wrapper, "parent", Some(&synapse)).unwrap();
    let back = objects.field_object(&wrapper, "parent").unwrap().unwrap();
    assert!(objects.identical(&synapse, &back));

    wrapper.close();
    assert_eq!(objects.field_chars(&wrapper, "name"), Err(BridgeError::Released));

    // Freeing the section drops the reference its field held
    drop(held);
    assert_eq!(rt.refcount(parent), Some(1));
    rt.release(section);
    assert_eq!(rt.refcount(parent), None);
    assert_eq!(rt.live_objects(), 0);
    assert_eq!(rt.invalid_releases(), 0);
}

#[test]
fn test_call_function() {
    let (rt, objects) = setup();
    rt.define_function(
        "hypot",
        method(|_, _, args| match args {
            [StackValue::Number(a), StackValue::Number(b)] => StackValue::Number((a * a + b * b).sqrt()),
            _ => StackValue::Number(crate::foreign::FAILURE_SENTINEL),
        }),
    );

    let args = [ArgumentValue::Double(3.0), ArgumentValue::Int(4)];
    assert_eq!(objects.call_function("hypot", &args).unwrap(), 5.0);
    assert!(matches!(
        objects.call_function("hypot", &[ArgumentValue::String("x".into())]),
        Err(BridgeError::ForeignCallFailed { .. })
    ));
    assert!(objects.call_function("missing", &args).is_err());
    assert_eq!(rt.pending_pushes(), 0);
}
