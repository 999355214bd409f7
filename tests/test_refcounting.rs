mod common;

use common::{bridge, Membrane};
use nrnbridge::loopback::Loopback;
use nrnbridge::{ForeignRuntime, HostRef, ObjectKind, WrapperKind};
use proptest::prelude::*;
use std::sync::Arc;

#[test]
fn test_wrappers_released_across_threads() {
    let (runtime, bridge) = bridge();
    let template = runtime.define_template("List", Vec::new());
    let ptr = runtime.alloc(template);

    let wrappers: Vec<_> = (0..8)
        .map(|_| bridge.objects().encapsulate(ptr, WrapperKind::Object.tag()).unwrap())
        .collect();
    assert_eq!(runtime.refcount(ptr), Some(9));

    let handles: Vec<_> = wrappers
        .into_iter()
        .map(|w| std::thread::spawn(move || drop(w)))
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(runtime.refcount(ptr), Some(1));
    assert_eq!(runtime.retains(), runtime.releases());

    runtime.release(ptr);
    assert_eq!(runtime.live_objects(), 0);
}

proptest! {
    #[test]
    fn prop_k_wrappers_balance_references(k in 1usize..32, close_mask in any::<u32>()) {
        let runtime = Arc::new(Loopback::new());
        let bridge = nrnbridge::Bridge::new(runtime.clone());
        let template = runtime.define_template("List", Vec::new());
        let ptr = runtime.alloc(template);

        let wrappers: Vec<_> = (0..k)
            .map(|_| bridge.objects().encapsulate(ptr, 0).unwrap())
            .collect();
        prop_assert_eq!(runtime.retains(), k as u64);

        // Some closed explicitly, the rest dropped; either way once each
        for (i, w) in wrappers.iter().enumerate() {
            if close_mask & (1 << (i % 32)) != 0 {
                w.close();
            }
        }
        drop(wrappers);

        prop_assert_eq!(runtime.releases(), k as u64);
        prop_assert_eq!(runtime.invalid_releases(), 0);
        prop_assert_eq!(runtime.refcount(ptr), Some(1));
    }

    #[test]
    fn prop_new_vectors_are_not_retained(sizes in proptest::collection::vec(0usize..16, 1..10)) {
        let runtime = Arc::new(Loopback::new());
        let bridge = nrnbridge::Bridge::new(runtime.clone());

        let vectors: Vec<_> = sizes
            .iter()
            .map(|&n| bridge.objects().new_vector(n).unwrap())
            .collect();
        prop_assert_eq!(runtime.retains(), 0);
        prop_assert_eq!(runtime.live_objects(), sizes.len());

        drop(vectors);
        prop_assert_eq!(runtime.releases(), sizes.len() as u64);
        prop_assert_eq!(runtime.live_objects(), 0);
    }

    #[test]
    fn prop_object_kind_inverts(id in 0usize..10_000, tag in 0u8..=1) {
        let registered = ObjectKind::registered(id);
        prop_assert_eq!(registered.class_id(), Some(id));
        prop_assert!(registered.wrapper_tag().is_none());

        let wrapped = WrapperKind::from_tag(tag).unwrap().object_kind();
        prop_assert_eq!(wrapped.wrapper_tag(), Some(tag));
        prop_assert!(wrapped.class_id().is_none());
        prop_assert!(!wrapped.is_opaque());
    }
}

#[test]
fn test_kind_of_registered_instance() {
    let (_runtime, bridge) = bridge();
    let id = bridge.register::<Membrane>().unwrap().id();
    let obj: HostRef = Arc::new(Membrane { area: 2.0 });
    assert_eq!(bridge.objects().kind_of(&obj).class_id(), Some(id));
}
