//! Shared fixtures for integration tests

#![allow(dead_code)]

use nrnbridge::loopback::Loopback;
use nrnbridge::{Bridge, ClassSpec, HostClass, HostValue, ParamKind, ReturnKind};
use std::sync::Arc;

/// A passive membrane patch
pub struct Membrane {
    pub area: f64,
}

impl HostClass for Membrane {
    fn class_spec() -> ClassSpec {
        ClassSpec::builder::<Membrane>("org.neuron.Membrane")
            .no_arg_constructor(|| Membrane { area: 1.0 })
            .method("current", &[ParamKind::Double], ReturnKind::Double, |m, a| {
                Ok(HostValue::Double(2.0 * a.double(0)? + m.area))
            })
            .method("describe", &[], ReturnKind::Chars, |_, _| {
                Ok(HostValue::Chars("passive membrane".into()))
            })
            .build()
    }
}

/// Two constructors whose signatures share a prefix
pub struct Segment {
    pub length: f64,
    pub diam: Option<f64>,
}

impl HostClass for Segment {
    fn class_spec() -> ClassSpec {
        ClassSpec::builder::<Segment>("org.neuron.Segment")
            .constructor(&[ParamKind::Double, ParamKind::Double], |a| {
                Ok(Segment {
                    length: a.double(0)?,
                    diam: Some(a.double(1)?),
                })
            })
            .constructor(&[ParamKind::Double], |a| {
                Ok(Segment {
                    length: a.double(0)?,
                    diam: None,
                })
            })
            .method("length", &[], ReturnKind::Double, |s, _| Ok(HostValue::Double(s.length)))
            .method("join", &[ParamKind::Object], ReturnKind::Double, |s, a| {
                let other = a.downcast::<Segment>(0)?;
                Ok(HostValue::Double(s.length + other.length))
            })
            .build()
    }
}

pub fn bridge() -> (Arc<Loopback>, Bridge) {
    let runtime = Arc::new(Loopback::new());
    let bridge = Bridge::new(runtime.clone());
    (runtime, bridge)
}
