/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Loads a library through its exported entry point, like the engine does, and drives one extension instance.
//!
//! The binding is process-wide and can be installed only once, so this binary holds a single test.

use gdlink::init::BindingConfig;
use gdlink::prelude::*;
use gdlink::sys;
use gdlink_ffi::mock;

struct Spinner {
    base: Base<Node>,
    turns: i64,
}

impl ExtensionClass for Spinner {
    type Base = Node;
    const CLASS_NAME: &'static str = "Spinner";

    fn init(base: Base<Node>) -> Self {
        Self { base, turns: 0 }
    }

    fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
        builder
            .on::<node::Ready, _>(|this, ()| {
                this.base.set_name("Spinner");
                this.base.set_process(true);
            })?
            .on::<node::Process, _>(|this, (delta,)| {
                assert!(delta > 0.0);
                this.turns += 1;
                this.base.set_name(&format!("turn{}", this.turns));
            })?;
        Ok(())
    }
}

struct SpinLibrary;

#[gdextension(entry_point = spin_library_init)]
unsafe impl ExtensionLibrary for SpinLibrary {
    fn config() -> BindingConfig {
        mock::test_config()
    }

    fn register_classes(registry: &mut ClassRegistry) -> Result<(), RegisterError> {
        registry.register::<Spinner>()
    }
}

fn call_virtual(object: sys::GDExtensionObjectPtr, name: &str, frame: &mut sys::CallFrame) -> bool {
    let args = frame.args_ptr();
    let ret = frame.ret_ptr();
    unsafe { mock::call_virtual(object, name, args, ret) }
}

#[test]
fn library_lifecycle() {
    let mut init = sys::GDExtensionInitialization {
        minimum_initialization_level: 0,
        userdata: std::ptr::null_mut(),
        initialize: None,
        deinitialize: None,
    };

    let ok = unsafe { spin_library_init(mock::get_proc_address(), mock::library(), &mut init) };
    assert_eq!(ok, 1);
    assert_eq!(init.minimum_initialization_level, InitLevel::Scene.to_sys());

    // Binding is installed now; the session only serializes and clears the log.
    let _session = mock::install();
    let initialize = init.initialize.expect("initialize callback");
    let deinitialize = init.deinitialize.expect("deinitialize callback");

    for level in InitLevel::Scene.up_to() {
        unsafe { initialize(init.userdata, level.to_sys()) };
    }
    assert!(mock::is_extension_class_registered("Spinner"));

    let before = mock::stats();
    let object = mock::construct("Spinner");
    assert!(!object.is_null());

    let node = unsafe { Obj::<Node, Borrowed>::borrow(ObjPtr::from_obj_sys(object)) };
    assert_eq!(node.get_class(), "Spinner");
    assert!(node.is_class("Node"));

    // Engine-side lifecycle: `_ready` once, then `_process` every frame.
    assert!(call_virtual(object, "_ready", &mut sys::CallFrame::new()));
    assert_eq!(node.get_name().to_string(), "Spinner");
    assert!(node.is_processing());

    for _ in 0..3 {
        let mut frame = sys::CallFrame::new();
        frame.arg(1.0f64 / 60.0);
        assert!(call_virtual(object, "_process", &mut frame));
    }
    assert_eq!(node.get_name().to_string(), "turn3");

    // Declared by Node, not overridden.
    assert!(!call_virtual(object, "_exit_tree", &mut sys::CallFrame::new()));

    drop(node);
    mock::destroy(object);

    let after = mock::stats();
    assert_eq!(after.instances_created - before.instances_created, 1);
    assert_eq!(after.instances_freed - before.instances_freed, 1);
    assert_eq!(after.double_destroys, before.double_destroys);

    for level in InitLevel::Scene.up_to().rev() {
        unsafe { deinitialize(init.userdata, level.to_sys()) };
    }
    assert!(!mock::is_extension_class_registered("Spinner"));
    assert!(mock::log().is_empty(), "unexpected errors: {:?}", mock::log());

    // The binding is write-once.
    let mut second = init;
    let ok = unsafe { spin_library_init(mock::get_proc_address(), mock::library(), &mut second) };
    assert_eq!(ok, 0);
}
