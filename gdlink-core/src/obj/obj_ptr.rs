/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::obj::InstanceId;
use crate::sys;

/// Raw bits of an object handle: the object pointer, plus the instance ID it had when the handle was created.
///
/// In call frames, only the pointer is passed. The cached ID lets gdlink detect objects that were destroyed behind the
/// handle's back (e.g. a borrowed child whose parent was freed) before their pointer reaches the engine again.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ObjPtr {
    raw: sys::RawObject,
    id: Option<InstanceId>,
}

impl ObjPtr {
    pub const fn null() -> Self {
        Self {
            raw: sys::RawObject::null(),
            id: None,
        }
    }

    /// Wraps an object pointer received from the engine, querying its instance ID.
    ///
    /// # Safety
    /// `ptr` must be null or point to a live engine object.
    pub unsafe fn from_obj_sys(ptr: sys::GDExtensionObjectPtr) -> Self {
        let raw = sys::RawObject::from_ptr(ptr);
        if raw.is_null() {
            return Self::null();
        }

        let id = sys::try_binding().and_then(|binding| {
            // SAFETY: `ptr` is live, per the caller.
            let id = unsafe { (binding.interface().object_get_instance_id)(ptr) };
            InstanceId::try_from_u64(id)
        });

        Self { raw, id }
    }

    pub fn as_ptr(self) -> sys::GDExtensionObjectPtr {
        self.raw.as_ptr()
    }

    pub fn raw_object(self) -> sys::RawObject {
        self.raw
    }

    pub fn is_null(self) -> bool {
        self.raw.is_null()
    }

    /// Instance ID of the object at the time the pointer was obtained. Available even after the object is destroyed.
    pub fn instance_id(self) -> Option<InstanceId> {
        self.id
    }

    /// Whether the object behind the pointer still exists.
    ///
    /// Looks up the cached instance ID in the engine; a destroyed object no longer resolves to this pointer.
    pub fn is_alive(self) -> bool {
        let (Some(id), Some(binding)) = (self.id, sys::try_binding()) else {
            return false;
        };

        // SAFETY: unknown IDs yield null.
        let current = unsafe { (binding.interface().object_get_instance_from_id)(id.to_u64()) };
        current == self.raw.as_ptr()
    }

    /// # Panics
    /// If the object was destroyed.
    pub(crate) fn ensure_alive(self, class: &str, method: &str) {
        assert!(
            self.is_alive(),
            "{class}::{method}(): access to object {:?} (instance ID {}) after it has been freed",
            self.raw.as_ptr(),
            self.id.map_or_else(|| "none".to_string(), |id| id.to_string()),
        );
    }
}

impl fmt::Debug for ObjPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "ObjPtr({:?}, #{id})", self.raw.as_ptr()),
            None => write!(f, "ObjPtr({:?})", self.raw.as_ptr()),
        }
    }
}

// SAFETY: the slot holds `Object*`, one word. The instance ID is queried, not read from the frame.
unsafe impl sys::GodotFfi for ObjPtr {
    const SLOT_WORDS: usize = sys::RawObject::SLOT_WORDS;

    fn variant_type() -> sys::VariantType {
        sys::VariantType::Object
    }

    unsafe fn from_sys(ptr: sys::GDExtensionConstTypePtr) -> Self {
        let raw = sys::RawObject::from_sys(ptr);

        // SAFETY: object pointers in frames refer to live objects, or are null.
        Self::from_obj_sys(raw.as_ptr())
    }

    unsafe fn write_sys(self, dst: sys::GDExtensionTypePtr) {
        self.raw.write_sys(dst)
    }
}

impl GodotConvert for ObjPtr {
    type Via = ObjPtr;
}

impl ToGodot for ObjPtr {
    fn to_godot(&self) -> Self::Via {
        *self
    }
}

impl FromGodot for ObjPtr {
    fn from_godot(via: Self::Via) -> Self {
        via
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mock;
    use sys::GodotFfi;

    #[test]
    fn liveness_follows_engine() {
        let _session = mock::install();

        let object = mock::construct("Node");
        let ptr = unsafe { ObjPtr::from_obj_sys(object) };
        assert!(ptr.is_alive());
        assert!(ptr.instance_id().is_some());

        mock::destroy(object);
        assert!(!ptr.is_alive());
        assert!(ptr.instance_id().is_some(), "cached id survives the object");
    }

    #[test]
    fn frame_slot_is_pointer_only() {
        let _session = mock::install();
        let object = mock::construct("Object");

        let mut frame = sys::CallFrame::new();
        frame.arg(unsafe { ObjPtr::from_obj_sys(object) });
        assert_eq!(frame.arg_widths(), [1]);

        let read = unsafe { frame.read_arg::<ObjPtr>(0) };
        assert_eq!(read.as_ptr(), object);
        assert!(read.is_alive());
        assert_eq!(ObjPtr::SLOT_WORDS, 1);

        frame.free();
        mock::destroy(object);
    }

    #[test]
    fn null_is_never_alive() {
        let _session = mock::install();

        assert!(ObjPtr::null().is_null());
        assert!(!ObjPtr::null().is_alive());
        assert_eq!(unsafe { ObjPtr::from_obj_sys(std::ptr::null_mut()) }, ObjPtr::null());
    }
}
