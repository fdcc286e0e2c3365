/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Loading of the GDExtension interface.
//!
//! The extension entry point is passed a `get_proc_address` function pointer, which is used to load all other
//! interface functions by name. Every function gdlink needs is resolved once, up front; a missing one fails initialization
//! instead of surfacing later as a null call.

use crate as sys;
use crate::toolbox::{load_fn, read_version_string};

/// Non-nullable form of [`sys::GDExtensionInterfaceGetProcAddress`].
pub type GetProcAddressFn =
    unsafe extern "C" fn(p_function_name: *const std::ffi::c_char) -> sys::GDExtensionInterfaceFunctionPtr;

macro_rules! interface_table {
    ($( $(#[$attr:meta])* $field:ident: $Ty:ident; )*) => {
        /// Function table of the loaded GDExtension interface.
        ///
        /// Field names match the names under which Godot publishes the functions.
        #[derive(Copy, Clone)]
        pub struct GDExtensionInterface {
            $(
                $(#[$attr])*
                pub $field: <sys::$Ty as crate::toolbox::Inner>::FnPtr,
            )*
        }

        impl GDExtensionInterface {
            /// Loads every function of the table through `get_proc_address`.
            ///
            /// # Safety
            /// `get_proc_address` must be the function pointer passed by Godot (or a faithful stand-in), so that each
            /// published function has the declared signature.
            pub unsafe fn load(get_proc_address: GetProcAddressFn) -> Result<Self, sys::InitError> {
                Ok(Self {
                    $(
                        $field: load_fn::<sys::$Ty>(get_proc_address, concat!(stringify!($field), "\0"))?,
                    )*
                })
            }
        }
    };
}

interface_table! {
    get_godot_version: GDExtensionInterfaceGetGodotVersion;
    print_error: GDExtensionInterfacePrintError;
    print_warning: GDExtensionInterfacePrintWarning;
    variant_get_ptr_constructor: GDExtensionInterfaceVariantGetPtrConstructor;
    variant_get_ptr_destructor: GDExtensionInterfaceVariantGetPtrDestructor;
    get_variant_from_type_constructor: GDExtensionInterfaceGetVariantFromTypeConstructor;
    get_variant_to_type_constructor: GDExtensionInterfaceGetVariantToTypeConstructor;
    variant_new_copy: GDExtensionInterfaceVariantNewCopy;
    variant_destroy: GDExtensionInterfaceVariantDestroy;
    variant_get_type: GDExtensionInterfaceVariantGetType;
    string_new_with_utf8_chars_and_len: GDExtensionInterfaceStringNewWithUtf8CharsAndLen;
    string_name_new_with_utf8_chars_and_len: GDExtensionInterfaceStringNameNewWithUtf8CharsAndLen;
    string_to_utf8_chars: GDExtensionInterfaceStringToUtf8Chars;
    classdb_get_method_bind: GDExtensionInterfaceClassdbGetMethodBind;
    /// Entry point of every outbound engine method call.
    object_method_bind_ptrcall: GDExtensionInterfaceObjectMethodBindPtrcall;
    classdb_construct_object: GDExtensionInterfaceClassdbConstructObject;
    object_destroy: GDExtensionInterfaceObjectDestroy;
    object_get_instance_id: GDExtensionInterfaceObjectGetInstanceId;
    object_get_instance_from_id: GDExtensionInterfaceObjectGetInstanceFromId;
    object_set_instance: GDExtensionInterfaceObjectSetInstance;
    object_cast_to: GDExtensionInterfaceObjectCastTo;
    classdb_get_class_tag: GDExtensionInterfaceClassdbGetClassTag;
    global_get_singleton: GDExtensionInterfaceGlobalGetSingleton;
    callable_custom_create: GDExtensionInterfaceCallableCustomCreate;
    classdb_register_extension_class3: GDExtensionInterfaceClassdbRegisterExtensionClass3;
    classdb_unregister_extension_class: GDExtensionInterfaceClassdbUnregisterExtensionClass;
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Version of the running Godot binary.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct GodotVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub full_string: String,
}

impl GodotVersion {
    /// Queries the version through an already loaded interface.
    pub fn query(interface: &GDExtensionInterface) -> Self {
        let mut raw = sys::GDExtensionGodotVersion {
            major: 0,
            minor: 0,
            patch: 0,
            string: std::ptr::null(),
        };

        // SAFETY: the function only writes into the struct.
        unsafe { (interface.get_godot_version)(&mut raw) };

        Self {
            major: raw.major as u8,
            minor: raw.minor as u8,
            patch: raw.patch as u8,
            // SAFETY: Godot provides a static C string or null.
            full_string: unsafe { read_version_string(&raw) },
        }
    }

    /// Lexicographically comparable `(major, minor, patch)`.
    pub fn triple(&self) -> (u8, u8, u8) {
        (self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for GodotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_string)
    }
}
