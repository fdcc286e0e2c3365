/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::any::type_name;
use std::cell::OnceCell;
use std::error::Error;

#[cfg(feature = "experimental-threads")]
use godot_cell::blocking::{GdCell, InaccessibleGuard, MutGuard};
#[cfg(not(feature = "experimental-threads"))]
use godot_cell::panicking::{GdCell, InaccessibleGuard, MutGuard};

use crate::registry::ExtensionClass;
use crate::sys;

/// Rust side of an extension instance. The user's value holds the [`Base`](crate::obj::Base) itself.
///
/// Boxed and attached to the engine object with `object_set_instance`; the pointer is what the engine passes back as
/// `GDExtensionClassInstancePtr`. The box exists before the user value, so that the base can point to it; the value
/// is filled in once `init` returns. Dropped by the `free_instance` callback.
pub(crate) struct InstanceStorage<T: ExtensionClass> {
    user_instance: OnceCell<GdCell<T>>,
}

impl<T: ExtensionClass> InstanceStorage<T> {
    pub fn new() -> Self {
        sys::out!("    Storage::new                   <{}>", type_name::<T>());

        Self {
            user_instance: OnceCell::new(),
        }
    }

    pub fn into_raw(self) -> sys::GDExtensionClassInstancePtr {
        Box::into_raw(Box::new(self)) as sys::GDExtensionClassInstancePtr
    }

    /// Stores the value returned by `init`.
    pub fn initialize(&self, user_instance: T) {
        let result = self.user_instance.set(GdCell::new(user_instance));
        assert!(result.is_ok(), "{} instance initialized twice", T::CLASS_NAME);
    }

    /// Exclusive access to the user instance, for the duration of one engine call into it.
    ///
    /// Fails if the instance is bound already, unless the holder of that binding made it reentrant through
    /// [`base_mut()`](crate::obj::WithBaseField::base_mut).
    pub fn get_mut(&self) -> Result<MutGuard<'_, T>, Box<dyn Error>> {
        match self.user_instance.get() {
            Some(cell) => cell.borrow_mut(),
            None => Err(format!("{} is still being initialized", T::CLASS_NAME).into()),
        }
    }

    /// Hands `value`, which must be the currently bound instance, back to the cell until the guard is dropped.
    ///
    /// # Panics
    /// If the instance is not initialized yet, or `value` is not the mutably bound instance.
    pub fn get_inaccessible<'a: 'b, 'b>(&'a self, value: &'b mut T) -> InaccessibleGuard<'b, T> {
        let Some(cell) = self.user_instance.get() else {
            panic!("{}::base_mut() called during init", T::CLASS_NAME);
        };

        cell.make_inaccessible(value)
            .unwrap_or_else(|err| panic!("{}::base_mut() failed: {err}", T::CLASS_NAME))
    }

    /// Whether any binding (accessible or not) to the user instance exists.
    pub fn is_bound(&self) -> bool {
        self.user_instance.get().is_some_and(GdCell::is_currently_bound)
    }
}

impl<T: ExtensionClass> Drop for InstanceStorage<T> {
    fn drop(&mut self) {
        sys::out!("    Storage::drop                  <{}>", type_name::<T>());
    }
}

/// Interprets an instance pointer handed out by the engine.
///
/// # Safety
/// `instance` must come from [`InstanceStorage::<T>::into_raw()`] and not be destroyed yet.
pub(crate) unsafe fn as_storage<'u, T: ExtensionClass>(
    instance: sys::GDExtensionClassInstancePtr,
) -> &'u InstanceStorage<T> {
    &*(instance as *mut InstanceStorage<T>)
}

/// Drops the storage behind `instance`.
///
/// An instance that is still bound (the engine destroys its object from within one of its own overrides) is leaked
/// instead, since a guard up the stack still refers to it.
///
/// # Safety
/// `instance` must come from [`InstanceStorage::<T>::into_raw()`]. It is invalid afterwards.
pub(crate) unsafe fn destroy_storage<T: ExtensionClass>(instance: sys::GDExtensionClassInstancePtr) {
    let storage = Box::from_raw(instance as *mut InstanceStorage<T>);

    if storage.is_bound() {
        crate::gd_error!(
            "{} destroyed while one of its methods is running; leaking the Rust instance",
            T::CLASS_NAME
        );
        std::mem::forget(storage);
        return;
    }

    drop(storage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::AudioEffectInstance;
    use crate::obj::Base;

    struct Counter {
        _base: Option<Base<AudioEffectInstance>>,
        hits: u32,
    }

    impl ExtensionClass for Counter {
        type Base = AudioEffectInstance;
        const CLASS_NAME: &'static str = "Counter";

        fn init(base: Base<AudioEffectInstance>) -> Self {
            Self {
                _base: Some(base),
                hits: 0,
            }
        }
    }

    fn counter() -> Counter {
        Counter { _base: None, hits: 0 }
    }

    #[test]
    fn exclusive_until_made_inaccessible() {
        let storage = InstanceStorage::<Counter>::new();
        assert!(storage.get_mut().is_err(), "not initialized yet");

        storage.initialize(counter());
        assert!(!storage.is_bound());

        let mut outer = storage.get_mut().expect("first binding");
        outer.hits += 1;
        assert!(storage.is_bound());
        assert!(storage.get_mut().is_err(), "second binding while the first is accessible");

        {
            let _guard = storage.get_inaccessible(&mut *outer);
            let mut inner = storage.get_mut().expect("reentrant binding");
            inner.hits += 1;
        }

        assert_eq!(outer.hits, 2);
        drop(outer);
        assert!(!storage.is_bound());
    }

    #[test]
    #[should_panic(expected = "Counter::base_mut() called during init")]
    fn inaccessible_before_init_panics() {
        let storage = InstanceStorage::<Counter>::new();
        let mut value = counter();
        let _guard = storage.get_inaccessible(&mut value);
    }
}
