/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

/// Lazily initialized global behind a mutex.
///
/// Holds the mutable process-wide state of gdlink (the class registry, the test engine) in `static`s without
/// `Mutex<Option<...>>` handling at every use site:
/// - `const` constructor taking the initialization function.
/// - Access through a guard that derefs to `&T` and `&mut T`.
/// - A panicking initializer poisons the global for good.
pub struct Global<T> {
    value: Mutex<Slot<T>>,
}

enum Slot<T> {
    Pending(fn() -> T),
    Ready(T),
    Poisoned,
}

impl<T> Global<T> {
    /// Create `Global<T>`, providing a lazy initialization function.
    pub const fn new(init_fn: fn() -> T) -> Self {
        Self {
            value: Mutex::new(Slot::Pending(init_fn)),
        }
    }

    /// Create `Global<T>` with `T::default()` as initialization function.
    ///
    /// Inherent rather than `Default`, because the trait is not `const`.
    pub const fn default() -> Self
    where
        T: Default,
    {
        Self::new(T::default)
    }

    /// Returns a guard that gives shared or mutable access to the value, initializing it first if needed.
    ///
    /// Blocks until the internal mutex is available.
    ///
    /// # Panics
    /// If the initialization function panics (now or earlier).
    pub fn lock(&self) -> GlobalGuard<'_, T> {
        let guard = self.value.lock().unwrap_or_else(|poison| poison.into_inner());
        Self::ensure_init(guard)
    }

    fn ensure_init(mut guard: MutexGuard<'_, Slot<T>>) -> GlobalGuard<'_, T> {
        if let Slot::Pending(init_fn) = *guard {
            *guard = Slot::Poisoned;

            // Unwinding leaves the slot poisoned, which is what we want.
            let value = init_fn();
            *guard = Slot::Ready(value);
        }

        if let Slot::Poisoned = *guard {
            panic!("previous Global<T> initialization failed due to panic");
        }

        GlobalGuard { guard }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Guards

/// Guard that temporarily gives access to a `Global<T>`'s inner value.
pub struct GlobalGuard<'a, T> {
    guard: MutexGuard<'a, Slot<T>>,
}

impl<T> Deref for GlobalGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match &*self.guard {
            Slot::Ready(value) => value,
            // Guards are only handed out for initialized slots.
            _ => unreachable!("GlobalGuard for uninitialized value"),
        }
    }
}

impl<T> DerefMut for GlobalGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut *self.guard {
            Slot::Ready(value) => value,
            _ => unreachable!("GlobalGuard for uninitialized value"),
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    static NAMES: Global<HashMap<&'static str, u32>> = Global::default();
    static LEVELS: Global<Vec<u8>> = Global::new(|| vec![0, 1]);
    static BROKEN: Global<u8> = Global::new(|| panic!("init failed"));

    #[test]
    fn lazy_default() {
        NAMES.lock().insert("Node", 1);
        NAMES.lock().insert("Node3D", 2);

        let names = NAMES.lock();
        assert_eq!(names.get("Node"), Some(&1));
        assert_eq!(names.get("Node3D"), Some(&2));
    }

    #[test]
    fn lazy_custom_init() {
        LEVELS.lock().push(2);
        assert_eq!(*LEVELS.lock(), [0, 1, 2]);
    }

    #[test]
    fn failed_init_stays_failed() {
        let first = std::panic::catch_unwind(|| *BROKEN.lock());
        assert!(first.is_err());

        let second = std::panic::catch_unwind(|| *BROKEN.lock());
        assert!(second.is_err());
    }
}
