/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::builtin::GString;
use crate::classes::{engine_class, ptrcall};
use crate::obj::InstanceId;
use crate::sys;
use sys::MethodBindCache;

engine_class! {
    /// Base class of all engine objects.
    class Object;
}

impl Object {
    /// Engine class name of the object, e.g. `"Node3D"`, or the extension class name for extension instances.
    pub fn get_class(&self) -> String {
        static BIND: MethodBindCache = MethodBindCache::new("Object", "get_class");

        let raw: sys::RawString = ptrcall(&BIND, self.raw, ());

        // SAFETY: the engine returns a new string, owned by the caller.
        let class = unsafe { GString::from_raw(raw) };
        class.to_rust_string()
    }

    pub fn get_instance_id(&self) -> Option<InstanceId> {
        static BIND: MethodBindCache = MethodBindCache::new("Object", "get_instance_id");

        ptrcall(&BIND, self.raw, ())
    }

    /// Whether the object is of class `class` or inherits from it.
    pub fn is_class(&self, class: &str) -> bool {
        static BIND: MethodBindCache = MethodBindCache::new("Object", "is_class");

        let class = GString::from_str(class);
        ptrcall(&BIND, self.raw, (class.as_borrowed(),))
    }
}
