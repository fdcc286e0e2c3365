/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Callbacks that are passed as function pointers to the engine.
//!
//! None of them may unwind: panics are caught with [`handle_panic`] and reported through the engine's error log.

use std::ffi::c_void;
use std::ptr;

use crate::builtin::StringName;
use crate::obj::{Base, EngineClass};
use crate::private::handle_panic;
use crate::registry::class::{ClassEntry, ExtensionClass, VirtualEntry};
use crate::registry::storage::{as_storage, destroy_storage, InstanceStorage};
use crate::sys;

/// Creates the engine object of class `T::Base`, and attaches a new `T` to it.
pub unsafe extern "C" fn create<T: ExtensionClass>(_class_userdata: *mut c_void) -> sys::GDExtensionObjectPtr {
    let binding = sys::binding();

    let base_name = StringName::from_str(<T::Base as EngineClass>::class_name());
    let object = (binding.interface().classdb_construct_object)(base_name.raw().sys());
    if object.is_null() {
        crate::gd_error!("{}: engine could not construct base object", T::CLASS_NAME);
        return ptr::null_mut();
    }

    // The storage exists before the user value, so that the value's base can refer to it.
    let instance = InstanceStorage::<T>::new().into_raw();

    let result = handle_panic(
        || format!("{}::init", T::CLASS_NAME),
        // SAFETY: `object` was just constructed and lives until the engine destroys it; `instance` is attached below.
        || T::init(unsafe { Base::from_sys::<T>(object, instance) }),
    );

    let user_instance = match result {
        Ok(user_instance) => user_instance,
        Err(_) => {
            // SAFETY: the storage was never handed to the engine. No instance attached, so destroying the object runs
            // no free callback.
            unsafe { destroy_storage::<T>(instance) };
            (binding.interface().object_destroy)(object);
            return ptr::null_mut();
        }
    };

    // SAFETY: the storage is live and not shared with the engine yet.
    unsafe { as_storage::<T>(instance) }.initialize(user_instance);

    let class_name = StringName::from_str(T::CLASS_NAME);
    (binding.interface().object_set_instance)(object, class_name.raw().sys(), instance);

    sys::out!("create instance {} at {object:?}", T::CLASS_NAME);
    object
}

/// Drops the Rust side of an instance, when the engine destroys its object.
pub unsafe extern "C" fn free<T: ExtensionClass>(
    _class_userdata: *mut c_void,
    instance: sys::GDExtensionClassInstancePtr,
) {
    let _ = handle_panic(
        || format!("{}::drop", T::CLASS_NAME),
        // SAFETY: the engine frees each instance exactly once.
        || unsafe { destroy_storage::<T>(instance) },
    );
}

/// Looks up the override of a virtual method by name.
///
/// Returns the [`VirtualEntry`] as call data, or null if the class does not override the method; the engine then runs
/// its own default.
pub unsafe extern "C" fn get_virtual_call_data(
    class_userdata: *mut c_void,
    name: sys::GDExtensionConstStringNamePtr,
) -> *mut c_void {
    // SAFETY: the userdata is the boxed class entry, which outlives the class registration.
    let entry = &*(class_userdata as *const ClassEntry);

    // SAFETY: the engine passes a live `StringName`.
    let method_name = StringName::borrow_string_sys(name).to_rust_string();

    match entry.find_virtual(&method_name) {
        Some(virtual_entry) => {
            sys::out!("virtual {}::{method_name} overridden", entry.name());
            virtual_entry as *const VirtualEntry as *mut c_void
        }
        None => ptr::null_mut(),
    }
}

/// Runs the override previously returned by [`get_virtual_call_data`].
pub unsafe extern "C" fn call_virtual_with_data(
    instance: sys::GDExtensionClassInstancePtr,
    _name: sys::GDExtensionConstStringNamePtr,
    virtual_call_userdata: *mut c_void,
    args: *const sys::GDExtensionConstTypePtr,
    ret: sys::GDExtensionTypePtr,
) {
    // SAFETY: the call data is a `VirtualEntry` owned by a registered class entry.
    let virtual_entry = &*(virtual_call_userdata as *const VirtualEntry);

    let _ = handle_panic(
        || format!("{}::{}", virtual_entry.class_name(), virtual_entry.method_name()),
        // SAFETY: the engine passes the instance and the argument layout of this very method.
        std::panic::AssertUnwindSafe(|| unsafe { virtual_entry.invoke(instance, args, ret) }),
    );
}
