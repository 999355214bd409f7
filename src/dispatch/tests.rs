//! Dispatcher tests against the loopback runtime

use super::*;
use crate::bridge::ObjectKind;
use crate::error::{HostError, ResolveError};
use crate::loopback::{CallArg, Loopback, PendingCall};
use crate::registry::{ClassSpec, HostClass};
use crate::signature::ParamKind;
use crate::value::host_ref;

struct Neuron {
    v: f64,
    label: String,
}

impl HostClass for Neuron {
    fn class_spec() -> ClassSpec {
        ClassSpec::builder::<Neuron>("org.neuron.Neuron")
            .no_arg_constructor(|| Neuron {
                v: -65.0,
                label: "soma".into(),
            })
            .constructor(&[ParamKind::Double], |a| {
                Ok(Neuron {
                    v: a.double(0)?,
                    label: "soma".into(),
                })
            })
            .constructor(&[ParamKind::Double, ParamKind::Double], |a| {
                Ok(Neuron {
                    v: a.double(0)? + a.double(1)?,
                    label: "soma".into(),
                })
            })
            .constructor(&[ParamKind::String], |a| {
                Ok(Neuron {
                    v: -65.0,
                    label: a.string(0)?.to_string(),
                })
            })
            .method("voltage", &[], ReturnKind::Double, |n, _| Ok(HostValue::Double(n.v)))
            .method("scale", &[ParamKind::Double], ReturnKind::Double, |n, a| {
                Ok(HostValue::Double(n.v * a.double(0)?))
            })
            .method("label", &[], ReturnKind::Chars, |n, _| Ok(HostValue::Chars(n.label.clone())))
            .method("reset", &[], ReturnKind::Void, |_, _| Ok(HostValue::Void))
            .method("count", &[ParamKind::Int], ReturnKind::Int, |_, a| Ok(HostValue::Int(a.int(0)? * 2)))
            .method("active", &[], ReturnKind::Bool, |n, _| Ok(HostValue::Bool(n.v > -70.0)))
            .method("sibling", &[], ReturnKind::Object, |n, _| {
                Ok(HostValue::object(Neuron {
                    v: n.v,
                    label: format!("{}'", n.label),
                }))
            })
            .method("nothing", &[], ReturnKind::Object, |_, _| Ok(HostValue::Null))
            .method("opaque", &[], ReturnKind::Object, |_, _| Ok(HostValue::object(42u8)))
            .method("add", &[ParamKind::Double], ReturnKind::Double, |n, a| Ok(HostValue::Double(n.v + a.double(0)?)))
            .method("add", &[ParamKind::String], ReturnKind::Double, |_, a| Ok(HostValue::Double(a.string(0)?.len() as f64)))
            .method("boom", &[], ReturnKind::Double, |_, _| panic!("host bug"))
            .method("fail", &[], ReturnKind::Double, |_, _| Err(HostError::new("refused")))
            .method("lie", &[], ReturnKind::Double, |_, _| Ok(HostValue::Chars("oops".into())))
            .static_method("version", &[], ReturnKind::Chars, |_| Ok(HostValue::Chars("1.0".into())))
            .build()
    }
}

struct Units;

impl HostClass for Units {
    fn class_spec() -> ClassSpec {
        ClassSpec::builder::<Units>("org.neuron.Units")
            .static_method("ms", &[], ReturnKind::Double, |_| Ok(HostValue::Double(1.0)))
            .build()
    }
}

struct Probe;

impl HostClass for Probe {
    fn class_spec() -> ClassSpec {
        ClassSpec::builder::<Probe>("org.neuron.Probe")
            .constructor(&[ParamKind::Double], |_| Ok(Probe))
            .build()
    }
}

struct Fixture {
    dispatcher: Dispatcher,
    neuron: ClassId,
    units: ClassId,
    probe: ClassId,
}

fn fixture() -> Fixture {
    let runtime = Arc::new(Loopback::new());
    let registry = Arc::new(TypeRegistry::new());
    let neuron = registry.register::<Neuron>().unwrap().id();
    let units = registry.register::<Units>().unwrap().id();
    let probe = registry.register::<Probe>().unwrap().id();
    Fixture {
        dispatcher: Dispatcher::new(ObjectBridge::new(runtime, registry)),
        neuron,
        units,
        probe,
    }
}

fn voltage_of(obj: &HostRef) -> f64 {
    obj.downcast_ref::<Neuron>().unwrap().v
}

#[test]
fn test_construct_no_arg() {
    let f = fixture();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::empty()).unwrap().unwrap();
    assert_eq!(voltage_of(&obj), -65.0);
}

#[test]
fn test_construct_overloads_by_hint() {
    let f = fixture();
    let one = f.dispatcher.construct(f.neuron, &PendingCall::numbers(&[3.0])).unwrap().unwrap();
    assert_eq!(voltage_of(&one), 3.0);

    let two = f.dispatcher.construct(f.neuron, &PendingCall::numbers(&[3.0, 4.0])).unwrap().unwrap();
    assert_eq!(voltage_of(&two), 7.0);

    let named = f
        .dispatcher
        .construct(f.neuron, &PendingCall::new(vec![CallArg::Str("axon".into())]))
        .unwrap()
        .unwrap();
    assert_eq!(named.downcast_ref::<Neuron>().unwrap().label, "axon");
}

#[test]
fn test_construct_no_matching_overload() {
    let f = fixture();
    let call = PendingCall::numbers(&[1.0, 2.0, 3.0]);
    let err = f.dispatcher.construct(f.neuron, &call).unwrap_err();
    assert!(matches!(err, BridgeError::Resolve(ResolveError::NoMatch { .. })));
    // Nothing was fetched
    assert_eq!(call.fetches(), 0);
}

#[test]
fn test_construct_pure_static() {
    let f = fixture();
    assert!(f.dispatcher.construct(f.units, &PendingCall::empty()).unwrap().is_none());
}

#[test]
fn test_construct_requires_default() {
    let f = fixture();
    let err = f.dispatcher.construct(f.probe, &PendingCall::empty()).unwrap_err();
    assert!(matches!(err, BridgeError::NoDefaultConstructor { .. }));

    // Single constructor: taken without consulting the signature
    assert!(f.dispatcher.construct(f.probe, &PendingCall::numbers(&[1.0])).unwrap().is_some());
}

#[test]
fn test_construct_unknown_class() {
    let f = fixture();
    let err = f.dispatcher.construct(99, &PendingCall::empty()).unwrap_err();
    assert_eq!(err, BridgeError::UnknownClass { id: 99 });
}

#[test]
fn test_numeric_returns() {
    let f = fixture();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::numbers(&[-20.0])).unwrap().unwrap();
    let d = &f.dispatcher;

    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("voltage"), &PendingCall::empty()), -20.0);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Index(0), &PendingCall::empty()), -20.0);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("scale"), &PendingCall::numbers(&[2.0])), -40.0);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("reset"), &PendingCall::empty()), VOID_SUCCESS);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("count"), &PendingCall::numbers(&[2.6])), 6.0);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("active"), &PendingCall::empty()), 1.0);
}

#[test]
fn test_overloaded_method() {
    let f = fixture();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::numbers(&[1.0])).unwrap().unwrap();
    let d = &f.dispatcher;

    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("add"), &PendingCall::numbers(&[2.0])), 3.0);
    let text = PendingCall::new(vec![CallArg::Str("four".into())]);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("add"), &text), 4.0);
}

#[test]
fn test_chars_and_static() {
    let f = fixture();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::empty()).unwrap().unwrap();
    let d = &f.dispatcher;

    assert_eq!(
        d.invoke_chars(Some(&obj), f.neuron, MethodSelector::Name("label"), &PendingCall::empty()).as_deref(),
        Some("soma")
    );
    assert_eq!(
        d.invoke_chars(None, f.neuron, MethodSelector::Name("version"), &PendingCall::empty()).as_deref(),
        Some("1.0")
    );
    assert_eq!(d.invoke_double(None, f.units, MethodSelector::Name("ms"), &PendingCall::empty()), 1.0);
}

#[test]
fn test_object_returns() {
    let f = fixture();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::empty()).unwrap().unwrap();
    let d = &f.dispatcher;

    match d.invoke_object(Some(&obj), f.neuron, MethodSelector::Name("sibling"), &PendingCall::empty()) {
        Some(ObjectRef::Host { object, kind }) => {
            assert_eq!(kind, ObjectKind::registered(f.neuron));
            assert_eq!(object.downcast_ref::<Neuron>().unwrap().label, "soma'");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        d.invoke_object(Some(&obj), f.neuron, MethodSelector::Name("nothing"), &PendingCall::empty()),
        Some(ObjectRef::Null)
    ));
    match d.invoke_object(Some(&obj), f.neuron, MethodSelector::Name("opaque"), &PendingCall::empty()) {
        Some(ObjectRef::Host { kind, .. }) => assert!(kind.is_opaque()),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_failures_become_sentinels() {
    let f = fixture();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::empty()).unwrap().unwrap();
    let d = &f.dispatcher;
    let before = d.stats().failures;

    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("boom"), &PendingCall::empty()), FAILURE_SENTINEL);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("fail"), &PendingCall::empty()), FAILURE_SENTINEL);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("lie"), &PendingCall::empty()), FAILURE_SENTINEL);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("missing"), &PendingCall::empty()), FAILURE_SENTINEL);
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Index(999), &PendingCall::empty()), FAILURE_SENTINEL);
    // Wrong accessor for the declared kind
    assert!(d.invoke_chars(Some(&obj), f.neuron, MethodSelector::Name("voltage"), &PendingCall::empty()).is_none());
    assert_eq!(d.invoke_double(Some(&obj), f.neuron, MethodSelector::Name("label"), &PendingCall::empty()), FAILURE_SENTINEL);

    assert_eq!(d.stats().failures - before, 7);
}

#[test]
fn test_error_variants() {
    let f = fixture();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::empty()).unwrap().unwrap();
    let d = &f.dispatcher;

    let err = d.invoke(Some(&obj), f.neuron, MethodSelector::Name("boom"), &PendingCall::empty()).unwrap_err();
    assert_eq!(err, BridgeError::Panicked { member: "boom".into() });

    let err = d.invoke(Some(&obj), f.neuron, MethodSelector::Name("fail"), &PendingCall::empty()).unwrap_err();
    assert!(matches!(err, BridgeError::Invocation { ref error, .. } if error.message() == "refused"));

    let err = d.invoke(Some(&obj), f.neuron, MethodSelector::Name("lie"), &PendingCall::empty()).unwrap_err();
    assert!(matches!(err, BridgeError::ReturnMismatch { declared: ReturnKind::Double, found: "chars", .. }));

    let err = d.invoke(None, f.neuron, MethodSelector::Name("voltage"), &PendingCall::empty()).unwrap_err();
    assert!(matches!(err, BridgeError::MissingReceiver { .. }));

    let err = d
        .invoke(Some(&obj), f.neuron, MethodSelector::Name("scale"), &PendingCall::new(vec![CallArg::Str("x".into())]))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Argument(_)));
}

#[test]
fn test_foreign_receiver_rejected() {
    let f = fixture();
    let stranger = host_ref(Probe);
    let err = f
        .dispatcher
        .invoke(Some(&stranger), f.neuron, MethodSelector::Name("voltage"), &PendingCall::empty())
        .unwrap_err();
    assert!(matches!(err, BridgeError::Invocation { .. }));
}

#[test]
fn test_stats_count_calls() {
    let f = fixture();
    let before = f.dispatcher.stats();
    let obj = f.dispatcher.construct(f.neuron, &PendingCall::empty()).unwrap().unwrap();
    f.dispatcher
        .invoke_double(Some(&obj), f.neuron, MethodSelector::Name("voltage"), &PendingCall::empty());
    let after = f.dispatcher.stats();
    assert_eq!(after.constructions - before.constructions, 1);
    assert_eq!(after.calls - before.calls, 1);
    assert_eq!(after.failures, before.failures);
}

/// Hands out foreign vectors it creates on the spot
struct Recorder;

#[test]
fn test_fresh_foreign_vector_outlives_the_call() {
    use crate::foreign::ForeignRuntime;

    let runtime = Arc::new(Loopback::new());
    let registry = Arc::new(TypeRegistry::new());
    let objects = ObjectBridge::new(runtime.clone(), registry.clone());
    let maker = objects.clone();
    let spec = ClassSpec::builder::<Recorder>("org.neuron.Recorder")
        .no_arg_constructor(|| Recorder)
        .method("record", &[ParamKind::Int], ReturnKind::Object, move |_, a| {
            let vector = maker
                .new_vector(a.int(0)? as usize)
                .map_err(|e| HostError::new(e.to_string()))?;
            Ok(HostValue::Object(vector as HostRef))
        })
        .build();
    let id = registry.register_spec(spec).unwrap().id();
    let dispatcher = Dispatcher::new(objects);

    let recorder = dispatcher.construct(id, &PendingCall::empty()).unwrap().unwrap();
    let returned = dispatcher
        .invoke_object(Some(&recorder), id, MethodSelector::Name("record"), &PendingCall::numbers(&[3.0]))
        .unwrap();
    let pointer = match &returned {
        ObjectRef::Foreign { pointer, kind, .. } => {
            assert_eq!(*kind, ObjectKind(-3));
            *pointer
        }
        other => panic!("unexpected {:?}", other),
    };

    // The only reference travels with the returned value
    assert_eq!(runtime.refcount(pointer), Some(1));
    assert_eq!(runtime.vector_len(pointer), Some(3));

    drop(returned);
    assert_eq!(runtime.refcount(pointer), None);
    assert_eq!(runtime.live_objects(), 0);
    assert_eq!(runtime.invalid_releases(), 0);
}
