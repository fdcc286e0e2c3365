/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::classes::{engine_class, ptrcall, singleton, Object};
use crate::obj::{Borrowed, Obj};
use crate::sys::MethodBindCache;

engine_class! {
    /// Engine-wide settings and state. Only exists as singleton.
    class Engine: Object;

    virtuals {}
}

impl Engine {
    /// The engine's instance, owned by the engine.
    ///
    /// # Panics
    /// If the engine does not provide the singleton.
    pub fn singleton() -> Obj<Engine, Borrowed> {
        singleton::<Engine>("Engine")
    }

    pub fn set_physics_ticks_per_second(&self, ticks_per_second: i32) {
        static BIND: MethodBindCache = MethodBindCache::new("Engine", "set_physics_ticks_per_second");

        ptrcall(&BIND, self.raw, (ticks_per_second,))
    }

    pub fn get_physics_ticks_per_second(&self) -> i32 {
        static BIND: MethodBindCache = MethodBindCache::new("Engine", "get_physics_ticks_per_second");

        ptrcall(&BIND, self.raw, ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::mock;

    #[test]
    fn singleton_is_shared_engine_object() {
        let _session = mock::install();
        let destroyed_before = mock::stats().objects_destroyed;

        let engine = Engine::singleton();
        assert_eq!(Some(engine.as_object_ptr()), mock::singleton("Engine"));
        let ticks = engine.get_physics_ticks_per_second();

        engine.set_physics_ticks_per_second(ticks + 30);
        drop(engine);

        let engine = Engine::singleton();
        assert_eq!(engine.get_physics_ticks_per_second(), ticks + 30);
        engine.set_physics_ticks_per_second(ticks);

        assert_eq!(
            mock::stats().objects_destroyed,
            destroyed_before,
            "borrowed singleton is never destroyed"
        );
    }
}
