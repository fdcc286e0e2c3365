/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;
use std::mem::MaybeUninit;

use crate as sys;

/// Caches `StringName` instances while method binds are loaded.
///
/// Every class and method name is constructed once, and all of them are destroyed when the cache is dropped.
pub struct StringCache<'a> {
    // Box is needed for element stability (new insertions don't move object; i.e. pointers to it remain valid).
    instances_by_str: HashMap<String, Box<sys::RawStringName>>,
    interface: &'a sys::GDExtensionInterface,
}

impl<'a> StringCache<'a> {
    pub fn new(interface: &'a sys::GDExtensionInterface) -> Self {
        Self {
            instances_by_str: HashMap::new(),
            interface,
        }
    }

    /// Get a pointer to a `StringName`. Reuses cached instances, only deallocates on destruction of this cache.
    pub fn fetch(&mut self, key: &str) -> sys::GDExtensionConstStringNamePtr {
        // Already cached.
        if let Some(sname) = self.instances_by_str.get(key) {
            return sname.sys();
        }

        let sname = Box::new(new_string_name(self.interface, key));
        let ptr = sname.sys();

        self.instances_by_str.insert(key.to_string(), sname);
        ptr
    }

    pub fn len(&self) -> usize {
        self.instances_by_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances_by_str.is_empty()
    }
}

/// Destroy all string names.
impl Drop for StringCache<'_> {
    fn drop(&mut self) {
        // SAFETY: each cached value was constructed by Godot and is destroyed exactly once here.
        unsafe {
            let Some(destroy) =
                (self.interface.variant_get_ptr_destructor)(sys::VariantType::StringName.sys())
            else {
                return;
            };

            for (_, mut sname) in self.instances_by_str.drain() {
                destroy(sname.sys_mut());
            }
        }
    }
}

/// Constructs a `StringName` from UTF-8 text.
pub fn new_string_name(interface: &sys::GDExtensionInterface, text: &str) -> sys::RawStringName {
    let mut sname = MaybeUninit::<sys::RawStringName>::uninit();

    // SAFETY: Godot initializes the destination with a new StringName.
    unsafe {
        (interface.string_name_new_with_utf8_chars_and_len)(
            sname.as_mut_ptr() as sys::GDExtensionUninitializedStringNamePtr,
            text.as_ptr() as *const std::ffi::c_char,
            text.len() as sys::GDExtensionInt,
        );

        sname.assume_init()
    }
}

/// Constructs a `String` from UTF-8 text.
pub fn new_string(interface: &sys::GDExtensionInterface, text: &str) -> sys::RawString {
    let mut string = MaybeUninit::<sys::RawString>::uninit();

    // SAFETY: Godot initializes the destination with a new String.
    unsafe {
        (interface.string_new_with_utf8_chars_and_len)(
            string.as_mut_ptr() as sys::GDExtensionUninitializedStringPtr,
            text.as_ptr() as *const std::ffi::c_char,
            text.len() as sys::GDExtensionInt,
        );

        string.assume_init()
    }
}

/// Reads the UTF-8 contents of a Godot `String`.
///
/// # Safety
/// `string` must point to a live `String`.
pub unsafe fn string_to_rust(
    interface: &sys::GDExtensionInterface,
    string: sys::GDExtensionConstStringPtr,
) -> String {
    // First call only measures.
    let len = (interface.string_to_utf8_chars)(string, std::ptr::null_mut(), 0);
    let mut buf = vec![0u8; len.max(0) as usize];

    (interface.string_to_utf8_chars)(
        string,
        buf.as_mut_ptr() as *mut std::ffi::c_char,
        len,
    );

    String::from_utf8_lossy(&buf).into_owned()
}

/// Reads the text of a Godot `StringName`, through a temporary `String` (Godot has no direct accessor).
///
/// # Safety
/// `sname` must point to a live `StringName`.
pub unsafe fn string_name_to_rust(
    interface: &sys::GDExtensionInterface,
    sname: sys::GDExtensionConstStringNamePtr,
) -> String {
    // Constructor #2 of String: `String(StringName from)`.
    const STRING_FROM_STRING_NAME: i32 = 2;

    let construct =
        (interface.variant_get_ptr_constructor)(sys::VariantType::String.sys(), STRING_FROM_STRING_NAME);
    let destroy = (interface.variant_get_ptr_destructor)(sys::VariantType::String.sys());

    let (Some(construct), Some(destroy)) = (construct, destroy) else {
        return String::new();
    };

    let mut temp = sys::RawString::null();
    let args = [sname];
    construct(temp.sys_mut(), args.as_ptr());

    let text = string_to_rust(interface, temp.sys());
    destroy(temp.sys_mut());

    text
}
