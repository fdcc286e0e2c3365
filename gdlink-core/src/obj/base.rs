/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::any::TypeId;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::ops::Deref;

#[cfg(feature = "experimental-threads")]
use godot_cell::blocking::InaccessibleGuard;
#[cfg(not(feature = "experimental-threads"))]
use godot_cell::panicking::InaccessibleGuard;

use crate::obj::{Borrowed, EngineClass, Obj, ObjPtr};
use crate::registry::storage::as_storage;
use crate::registry::ExtensionClass;
use crate::sys;

/// Engine object underlying an extension instance, held inside the user's [`ExtensionClass`].
///
/// Behaves like a borrowed [`Obj`]: the engine owns the object, and the object owns the instance, so the base never
/// destroys anything. Cannot be constructed by the user.
pub struct Base<T: EngineClass> {
    obj: Obj<T, Borrowed>,

    /// Storage of the instance holding this base, and the type it was created for.
    instance: sys::GDExtensionClassInstancePtr,
    instance_type: TypeId,
}

impl<T: EngineClass> Base<T> {
    /// # Safety
    /// `base_ptr` must be the live object that owns the instance holding this base. `instance` must be the
    /// (possibly not yet initialized) storage of a `U`, attached to that object.
    pub(crate) unsafe fn from_sys<U: ExtensionClass>(
        base_ptr: sys::GDExtensionObjectPtr,
        instance: sys::GDExtensionClassInstancePtr,
    ) -> Self {
        assert!(!base_ptr.is_null(), "instance base is null pointer");

        Self {
            obj: Obj::<T, Borrowed>::borrow(ObjPtr::from_obj_sys(base_ptr)),
            instance,
            instance_type: TypeId::of::<U>(),
        }
    }

    /// Borrowed handle to the base object, e.g. to pass it to an engine method.
    pub fn to_obj(&self) -> Obj<T, Borrowed> {
        self.obj.clone()
    }

    /// Instance storage pointer, checked to belong to class `U`.
    fn instance_of<U: ExtensionClass>(&self) -> sys::GDExtensionClassInstancePtr {
        assert_eq!(
            self.instance_type,
            TypeId::of::<U>(),
            "base of {} used by another class",
            U::CLASS_NAME
        );
        self.instance
    }
}

impl<T: EngineClass> Deref for Base<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.obj
    }
}

impl<T: EngineClass> Debug for Base<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Base<{}>({:?})", T::class_name(), self.obj.raw())
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Extension class that stores its [`Base`] in a field.
///
/// Gives access to the base object while the instance is bound by an engine call, in a way that lets the engine call
/// back into the same instance.
pub trait WithBaseField: ExtensionClass {
    fn base_field(&self) -> &Base<Self::Base>;

    /// Base object, for calls that may re-enter this instance.
    ///
    /// While the returned guard lives, `self` is inaccessible, and the engine may run other overrides of this
    /// instance (e.g. a virtual method invoked by the engine method being called). Without the guard, such a call is
    /// skipped, since the instance is still bound.
    ///
    /// ```ignore
    /// builder.on::<ProcessSilence, _>(|this, ()| {
    ///     let base = this.base_mut();
    ///     base.some_engine_method_that_calls_process();
    ///     true
    /// })?;
    /// ```
    ///
    /// # Panics
    /// If called during `init`, or on an instance that is not the one bound by the current engine call.
    fn base_mut(&mut self) -> BaseMut<'_, Self> {
        let base = self.base_field();
        let obj = base.to_obj();
        let instance = base.instance_of::<Self>();

        // SAFETY: the base was created together with this storage, which lives as long as the engine object.
        let storage = unsafe { as_storage::<Self>(instance) };
        let guard = storage.get_inaccessible(self);

        BaseMut {
            obj,
            _inaccessible_guard: guard,
        }
    }
}

/// Base object of `T`, obtained through [`WithBaseField::base_mut()`].
///
/// Dereferences to the engine class. Makes the instance available for reentrant calls until dropped.
pub struct BaseMut<'a, T: WithBaseField> {
    obj: Obj<T::Base, Borrowed>,
    _inaccessible_guard: InaccessibleGuard<'a, T>,
}

impl<T: WithBaseField> Deref for BaseMut<'_, T> {
    type Target = T::Base;

    fn deref(&self) -> &T::Base {
        &self.obj
    }
}

impl<T: WithBaseField> Debug for BaseMut<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "BaseMut<{}>({:?})", T::CLASS_NAME, self.obj.raw())
    }
}
