/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::builtin::{GString, StringName};
use crate::classes::{engine_class, ptrcall, Object};
use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::obj::{Borrowed, Inherits, Obj, Owned};
use crate::sys;
use sys::MethodBindCache;

engine_class! {
    /// Base class of all scene objects.
    class Node: Object;

    virtuals {
        /// Called every frame, with the elapsed time since the previous frame in seconds.
        fn _process as Process(delta: f64);

        /// Called every physics tick, with the fixed time step in seconds.
        fn _physics_process as PhysicsProcess(delta: f64);

        fn _enter_tree as EnterTree();

        fn _exit_tree as ExitTree();

        /// Called once the node and its children have entered the scene tree.
        fn _ready as Ready();
    }
}

impl Node {
    /// Adds `node` as child. The parent takes ownership: it destroys the child when it is destroyed itself.
    pub fn add_child<C: Inherits<Node>>(&self, node: Obj<C, Owned>) {
        self.add_child_ex(node, false, InternalMode::DISABLED)
    }

    pub fn add_child_ex<C: Inherits<Node>>(&self, node: Obj<C, Owned>, force_readable_name: bool, internal: InternalMode) {
        static BIND: MethodBindCache = MethodBindCache::new("Node", "add_child");

        // Ownership passes to the parent.
        let child = node.end();
        ptrcall(&BIND, self.raw, (child, force_readable_name, internal))
    }

    pub fn get_child_count(&self) -> i32 {
        self.get_child_count_ex(false)
    }

    pub fn get_child_count_ex(&self, include_internal: bool) -> i32 {
        static BIND: MethodBindCache = MethodBindCache::new("Node", "get_child_count");

        ptrcall(&BIND, self.raw, (include_internal,))
    }

    /// Child at `index`, or `None` if out of range. The child stays owned by this node.
    pub fn get_child(&self, index: i32) -> Option<Obj<Node, Borrowed>> {
        static BIND: MethodBindCache = MethodBindCache::new("Node", "get_child");

        ptrcall(&BIND, self.raw, (index, false))
    }

    pub fn set_name(&self, name: &str) {
        static BIND: MethodBindCache = MethodBindCache::new("Node", "set_name");

        let name = GString::from_str(name);
        ptrcall(&BIND, self.raw, (name.as_borrowed(),))
    }

    pub fn get_name(&self) -> StringName {
        static BIND: MethodBindCache = MethodBindCache::new("Node", "get_name");

        let raw: sys::RawStringName = ptrcall(&BIND, self.raw, ());

        // SAFETY: the engine returns a new string name, owned by the caller.
        unsafe { StringName::from_raw(raw) }
    }

    pub fn set_process(&self, enable: bool) {
        static BIND: MethodBindCache = MethodBindCache::new("Node", "set_process");

        ptrcall(&BIND, self.raw, (enable,))
    }

    pub fn is_processing(&self) -> bool {
        static BIND: MethodBindCache = MethodBindCache::new("Node", "is_processing");

        ptrcall(&BIND, self.raw, ())
    }
}

/// Whether a child is internal, i.e. hidden from the regular child list (`Node.InternalMode`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct InternalMode {
    ord: i64,
}

impl InternalMode {
    pub const DISABLED: Self = Self { ord: 0 };
    pub const FRONT: Self = Self { ord: 1 };
    pub const BACK: Self = Self { ord: 2 };

    pub const fn ord(self) -> i64 {
        self.ord
    }
}

// SAFETY: enums are `int64_t` in ptrcalls.
unsafe impl sys::GodotFfi for InternalMode {
    fn variant_type() -> sys::VariantType {
        sys::VariantType::Int
    }

    sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
}

impl GodotConvert for InternalMode {
    type Via = Self;
}

impl ToGodot for InternalMode {
    fn to_godot(&self) -> Self::Via {
        *self
    }
}

impl FromGodot for InternalMode {
    fn from_godot(via: Self::Via) -> Self {
        via
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::Node3D;
    use crate::sys::mock;

    #[test]
    fn children_are_owned_by_parent() {
        let _session = mock::install();
        let double_before = mock::stats().double_destroys;

        let parent = Obj::<Node>::new_alloc();
        let child = Obj::<Node3D>::new_alloc();
        let child_ptr = child.as_object_ptr();

        parent.add_child(child);
        assert_eq!(parent.get_child_count(), 1);

        let first = parent.get_child(0).expect("child exists");
        assert_eq!(first.as_object_ptr(), child_ptr);
        assert!(parent.get_child(1).is_none());
        drop(first);
        assert!(!mock::is_destroyed(child_ptr));

        drop(parent);
        assert!(mock::is_destroyed(child_ptr));
        assert_eq!(mock::stats().double_destroys, double_before);
    }

    #[test]
    fn name_round_trip_releases_strings() {
        let _session = mock::install();
        let node = Obj::<Node>::new_alloc();
        let before = mock::live_values();

        node.set_name("Player");
        let name = node.get_name();
        assert_eq!(name.to_string(), "Player");
        assert_eq!(mock::live_values(), before + 1);

        drop(name);
        assert_eq!(mock::live_values(), before);
    }

    #[test]
    fn processing_flag() {
        let _session = mock::install();
        let node = Obj::<Node>::new_alloc();

        assert!(!node.is_processing());
        node.set_process(true);
        assert!(node.is_processing());
        assert!(node.is_class("Object"));
        assert!(!node.is_class("Node3D"));
    }
}
