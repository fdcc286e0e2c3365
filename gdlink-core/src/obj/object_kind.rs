/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::convert::Infallible;
use std::marker::PhantomData;
use std::ops::Deref;

use crate::builtin::StringName;
use crate::classes::RefCounted;
use crate::meta::Signature;
use crate::obj::{
    Borrowed, EngineClass, Handle, HandleKind, HandleRef, Inherits, InstanceId, ObjPtr, Owned, Ownership, Shared,
};
use crate::sys;

/// Handle kind of engine objects of class `C`.
///
/// Releasing depends on the object's dynamic class, as encoded in its instance ID: plain objects are destroyed with
/// `object_destroy`, ref-counted ones give up a reference and are destroyed by whoever drops the last one.
pub struct ObjectKind<C: EngineClass> {
    _class: PhantomData<fn() -> C>,
    _never: Infallible,
}

impl<C: EngineClass> HandleKind for ObjectKind<C> {
    type Raw = ObjPtr;

    const NAME: &'static str = C::CLASS_INFO.name();

    unsafe fn release(binding: &sys::Binding, raw: ObjPtr) {
        if !raw.is_alive() {
            crate::gd_warn!("owned {} {:?} was already destroyed by someone else", C::CLASS_INFO.name(), raw);
            return;
        }

        // The dynamic class decides, not `C`: a ref-counted object may be held through a handle to one of its bases.
        if raw.instance_id().is_some_and(InstanceId::is_ref_counted) {
            // An owned ref-counted object holds one reference, like a shared handle.
            Self::release_shared(binding, raw);
        } else {
            (binding.interface().object_destroy)(raw.as_ptr());
        }
    }

    unsafe fn release_shared(binding: &sys::Binding, raw: ObjPtr) {
        if call_ref_counted::<bool>(binding, "unreference", raw) {
            sys::out!("last reference to {} {:?} gone, destroying", C::CLASS_INFO.name(), raw);
            (binding.interface().object_destroy)(raw.as_ptr());
        }
    }

    unsafe fn duplicate_shared(binding: &sys::Binding, raw: ObjPtr) -> ObjPtr {
        call_ref_counted::<bool>(binding, "reference", raw);
        raw
    }

    fn is_null(raw: &ObjPtr) -> bool {
        raw.is_null()
    }
}

/// Calls one of `RefCounted`'s reference counting methods. Yields the default value if the method is not bound.
unsafe fn call_ref_counted<R: crate::meta::FromGodot + Default>(
    binding: &sys::Binding,
    method: &str,
    raw: ObjPtr,
) -> R {
    match binding.method_table().get("RefCounted", method) {
        Some(entry) => Signature::<(), R>::out_class_ptrcall(binding, entry, raw.as_ptr(), ()),
        None => {
            crate::gd_error!("RefCounted::{} is not bound; reference count of {:?} unchanged", method, raw);
            R::default()
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Handle to an engine object of class `C`, with ownership `O`.
///
/// - `Obj<C>` (owned): destroyed when dropped, unless ended or handed to the engine (e.g. added as a child).
/// - `Obj<C, Borrowed>`: object owned by someone else, like the engine's scene tree.
/// - `Obj<C, Shared>`: reference-counted object; cloning adds a reference.
///
/// Dereferences to the class wrapper `C`, giving access to the engine methods of `C` and all its base classes.
pub type Obj<C, O = Owned> = Handle<ObjectKind<C>, O>;

impl<C: EngineClass, O: Ownership> Deref for Handle<ObjectKind<C>, O> {
    type Target = C;

    fn deref(&self) -> &C {
        C::from_raw_ref(self.raw_ref())
    }
}

impl<C: EngineClass> Deref for HandleRef<'_, ObjectKind<C>> {
    type Target = C;

    fn deref(&self) -> &C {
        C::from_raw_ref(self.raw_ref())
    }
}

impl<C: EngineClass, O: Ownership> Handle<ObjectKind<C>, O> {
    /// Converts to a handle of a base class, keeping the ownership.
    pub fn upcast<B: EngineClass>(self) -> Obj<B, O>
    where
        C: Inherits<B>,
    {
        let raw = self.raw();
        std::mem::forget(self);
        Handle::from_raw_unchecked(raw)
    }

    /// Converts to a handle of a derived class, keeping the ownership.
    ///
    /// The engine checks the dynamic class of the object. If it is not a `D`, or the object is gone, the original
    /// handle is returned unchanged.
    pub fn try_cast<D>(self) -> Result<Obj<D, O>, Self>
    where
        D: Inherits<C>,
    {
        let raw = self.raw();
        if raw.is_null() || !raw.is_alive() {
            return Err(self);
        }

        let binding = sys::binding();
        let class_name = StringName::from_str(D::class_name());

        // SAFETY: the object is alive and the class name outlives both calls.
        let cast = unsafe {
            let tag = (binding.interface().classdb_get_class_tag)(class_name.raw().sys());
            (binding.interface().object_cast_to)(raw.as_ptr(), tag)
        };
        if cast.is_null() {
            return Err(self);
        }

        // Same object, same reference: the ownership moves over.
        std::mem::forget(self);
        Ok(Handle::from_raw_unchecked(raw))
    }

    /// Like [`try_cast()`](Self::try_cast), but panics on failure.
    ///
    /// # Panics
    /// If the object is not of class `D`.
    pub fn cast<D>(self) -> Obj<D, O>
    where
        D: Inherits<C>,
    {
        self.try_cast().unwrap_or_else(|original| {
            panic!(
                "cannot cast {:?} from {} to {}",
                original.raw(),
                C::class_name(),
                D::class_name()
            )
        })
    }

    /// Instance ID of the object, or `None` if the handle is null or the object is gone.
    pub fn instance_id(&self) -> Option<InstanceId> {
        let raw = self.raw();
        if raw.is_alive() {
            raw.instance_id()
        } else {
            None
        }
    }

    /// Whether the object still exists. Calling engine methods on a destroyed object panics.
    pub fn is_instance_valid(&self) -> bool {
        self.raw().is_alive()
    }

    pub fn as_object_ptr(&self) -> sys::GDExtensionObjectPtr {
        self.raw().as_ptr()
    }
}

impl<C: EngineClass + Inherits<RefCounted>, O: Ownership> Handle<ObjectKind<C>, O> {
    /// New shared handle to the same object, holding a reference of its own.
    pub fn to_shared(&self) -> Obj<C, Shared> {
        let raw = self.raw();
        raw.ensure_alive(C::class_name(), "to_shared");

        // SAFETY: the object is alive; `duplicate_shared` adds the reference that the new handle adopts.
        unsafe { Obj::from_shared(ObjectKind::<C>::duplicate_shared(sys::binding(), raw)) }
    }
}

impl<C: EngineClass> Obj<C, Owned> {
    /// Allocates a new object of class `C`.
    ///
    /// For classes inheriting `RefCounted`, the handle holds the first reference: dropping it gives up that
    /// reference instead of destroying the object outright.
    ///
    /// # Panics
    /// If the engine cannot instantiate `C` (e.g. the class is abstract).
    pub fn new_alloc() -> Self {
        let binding = sys::binding();
        let raw = construct_object(binding, C::class_name());
        assert!(!raw.is_null(), "engine failed to instantiate class `{}`", C::class_name());

        if raw.instance_id().is_some_and(InstanceId::is_ref_counted) {
            // SAFETY: live RefCounted object, fresh from the engine.
            unsafe { call_ref_counted::<bool>(binding, "init_ref", raw) };
        }

        // SAFETY: freshly constructed object, not owned by anyone else.
        unsafe { Self::from_raw(raw) }
    }
}

impl<C: EngineClass + Inherits<RefCounted>> Obj<C, Shared> {
    /// Allocates a new reference-counted object of class `C`, holding its first reference.
    ///
    /// # Panics
    /// If the engine cannot instantiate `C`.
    pub fn new_ref() -> Self {
        let binding = sys::binding();
        let raw = construct_object(binding, C::class_name());
        assert!(!raw.is_null(), "engine failed to instantiate class `{}`", C::class_name());

        // SAFETY: live RefCounted object; `init_ref` establishes the first reference, which the handle adopts.
        unsafe {
            call_ref_counted::<bool>(binding, "init_ref", raw);
            Self::from_shared(raw)
        }
    }
}

impl<C: EngineClass> Obj<C, Borrowed> {
    /// Looks up a live object by instance ID, without taking ownership.
    ///
    /// Returns `None` if there is no such object or it is not of class `C`.
    pub fn from_instance_id(id: InstanceId) -> Option<Self> {
        let binding = sys::binding();

        // SAFETY: unknown IDs yield null; known ones a live object.
        let raw = unsafe {
            let ptr = (binding.interface().object_get_instance_from_id)(id.to_u64());
            ObjPtr::from_obj_sys(ptr)
        };
        if raw.is_null() {
            return None;
        }

        // SAFETY: the object is alive; it is merely borrowed.
        let object = unsafe { Obj::<crate::classes::Object, Borrowed>::borrow(raw) };
        if !object.is_class(C::class_name()) {
            return None;
        }

        // SAFETY: the class check above passed.
        Some(unsafe { Self::borrow(raw) })
    }
}

fn construct_object(binding: &sys::Binding, class: &str) -> ObjPtr {
    let class_name = StringName::from_str(class);

    // SAFETY: the string name stays alive during the call; the result is a new object or null.
    unsafe {
        let ptr = (binding.interface().classdb_construct_object)(class_name.raw().sys());
        ObjPtr::from_obj_sys(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::{Node, Node3D, Object};
    use crate::sys::mock;

    #[test]
    fn owned_object_destroyed_on_drop() {
        let _session = mock::install();

        let node = Obj::<Node>::new_alloc();
        let ptr = node.as_object_ptr();
        assert!(!mock::is_destroyed(ptr));

        drop(node);
        assert!(mock::is_destroyed(ptr));
    }

    #[test]
    fn ended_object_survives() {
        let _session = mock::install();

        let raw = Obj::<Node>::new_alloc().end();
        assert!(!mock::is_destroyed(raw.as_ptr()));

        mock::destroy(raw.as_ptr());
    }

    #[test]
    fn borrowed_object_never_destroyed() {
        let _session = mock::install();
        let node = Obj::<Node>::new_alloc();

        let id = node.instance_id().expect("live object has an id");
        let borrowed = Obj::<Node, Borrowed>::from_instance_id(id).expect("object found by id");
        drop(borrowed);

        assert!(!mock::is_destroyed(node.as_object_ptr()));
        assert!(Obj::<Node3D, Borrowed>::from_instance_id(id).is_none());
    }

    #[test]
    fn upcast_keeps_ownership() {
        let _session = mock::install();
        let double_before = mock::stats().double_destroys;

        let node: Obj<Object> = Obj::<Node3D>::new_alloc().upcast::<Node>().upcast();
        let ptr = node.as_object_ptr();
        assert_eq!(node.get_class(), "Node3D");

        drop(node);
        assert!(mock::is_destroyed(ptr));
        assert_eq!(mock::stats().double_destroys, double_before);
    }

    #[test]
    fn shared_object_destroyed_with_last_reference() {
        let _session = mock::install();

        let first = Obj::<RefCounted, Shared>::new_ref();
        let ptr = first.as_object_ptr();
        assert_eq!(mock::reference_count(ptr), Some(1));

        let second = first.clone();
        assert_eq!(mock::reference_count(ptr), Some(2));
        assert_eq!(second.get_reference_count(), 2);

        drop(first);
        assert!(!mock::is_destroyed(ptr));

        drop(second);
        assert!(mock::is_destroyed(ptr));
    }

    #[test]
    fn instance_id_encodes_ref_counted() {
        let _session = mock::install();

        let counted = Obj::<RefCounted, Shared>::new_ref();
        let plain = Obj::<Object>::new_alloc();

        assert!(counted.instance_id().unwrap().is_ref_counted());
        assert!(!plain.instance_id().unwrap().is_ref_counted());
    }

    #[test]
    fn upcast_ref_counted_gives_up_reference() {
        let _session = mock::install();
        let double_before = mock::stats().double_destroys;

        let owned = Obj::<RefCounted>::new_alloc();
        let ptr = owned.as_object_ptr();
        let other = owned.to_shared();
        assert_eq!(mock::reference_count(ptr), Some(2));

        // Released through `Object`, which does not know about reference counting.
        let object: Obj<Object> = owned.upcast();
        drop(object);
        assert!(!mock::is_destroyed(ptr));
        assert_eq!(mock::reference_count(ptr), Some(1));

        drop(other);
        assert!(mock::is_destroyed(ptr));
        assert_eq!(mock::stats().double_destroys, double_before);
    }

    #[test]
    fn new_alloc_ref_counted_holds_first_reference() {
        let _session = mock::install();

        let owned = Obj::<RefCounted>::new_alloc();
        let ptr = owned.as_object_ptr();
        assert_eq!(mock::reference_count(ptr), Some(1));
        assert_eq!(owned.get_reference_count(), 1);

        drop(owned);
        assert!(mock::is_destroyed(ptr));
    }

    #[test]
    fn method_on_freed_object_panics_before_engine() {
        let _session = mock::install();

        let parent = Obj::<Node>::new_alloc();
        parent.add_child(Obj::<Node>::new_alloc());
        let child = parent.get_child(0).expect("child exists");
        assert!(child.is_instance_valid());

        // Destroys the child along with it.
        drop(parent);
        assert!(!child.is_instance_valid());
        assert_eq!(child.instance_id(), None);

        let ptrcalls_before = mock::stats().ptrcalls;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| child.get_child_count()));

        let message = result.expect_err("call on freed object must panic");
        let message = message.downcast_ref::<String>().expect("formatted panic message");
        assert!(message.contains("Node::get_child_count(): access to object"), "{message}");
        assert_eq!(mock::stats().ptrcalls, ptrcalls_before);
    }

    #[test]
    fn owned_object_freed_elsewhere_is_not_destroyed_again() {
        let _session = mock::install();
        let double_before = mock::stats().double_destroys;

        let node = Obj::<Node>::new_alloc();
        mock::destroy(node.as_object_ptr());
        drop(node);

        assert_eq!(mock::stats().double_destroys, double_before);
        assert!(mock::log()[0].message.contains("already destroyed"));
    }

    #[test]
    fn checked_downcast() {
        let _session = mock::install();

        let object: Obj<Object> = Obj::<Node3D>::new_alloc().upcast();
        let ptr = object.as_object_ptr();

        let node = object.try_cast::<Node>().expect("Node3D is a Node");
        let object: Obj<Object> = node.upcast();
        let object = object.try_cast::<RefCounted>().expect_err("Node3D is not RefCounted");
        assert_eq!(object.as_object_ptr(), ptr);
        assert!(!mock::is_destroyed(ptr), "failed cast hands the original back");

        let node3d = object.cast::<Node3D>();
        assert_eq!(node3d.get_class(), "Node3D");

        drop(node3d);
        assert!(mock::is_destroyed(ptr));
    }

    #[test]
    #[should_panic(expected = "cannot cast")]
    fn failed_cast_panics() {
        let _session = mock::install();

        let object: Obj<Object> = Obj::<Object>::new_alloc();
        let _node = object.cast::<Node>();
    }

    #[test]
    fn view_dereferences_to_class() {
        let _session = mock::install();

        let node = Obj::<Node>::new_alloc();
        let view = node.as_borrowed();
        view.set_name("Viewed");

        assert_eq!(node.get_name().to_string(), "Viewed");
        assert_eq!(view.raw(), node.raw());
    }
}
