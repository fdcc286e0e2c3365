/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::classes::{engine_class, ptrcall, Object};
use crate::sys::MethodBindCache;

engine_class! {
    /// Base class of reference-counted objects. Handled through [`Obj<T, Shared>`](crate::obj::Obj).
    class RefCounted: Object;

    virtuals {}
}

impl RefCounted {
    pub fn get_reference_count(&self) -> i32 {
        static BIND: MethodBindCache = MethodBindCache::new("RefCounted", "get_reference_count");

        ptrcall(&BIND, self.raw, ())
    }
}
