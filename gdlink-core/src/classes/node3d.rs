/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::builtin::{Transform3D, Vector3};
use crate::classes::{engine_class, ptrcall, Node, Object};
use crate::sys::MethodBindCache;

engine_class! {
    /// Node with a 3D transform.
    class Node3D: Node, Object;

    virtuals {}
}

impl Node3D {
    pub fn set_position(&self, position: Vector3) {
        static BIND: MethodBindCache = MethodBindCache::new("Node3D", "set_position");

        ptrcall(&BIND, self.raw, (position,))
    }

    pub fn get_position(&self) -> Vector3 {
        static BIND: MethodBindCache = MethodBindCache::new("Node3D", "get_position");

        ptrcall(&BIND, self.raw, ())
    }

    pub fn set_transform(&self, transform: Transform3D) {
        static BIND: MethodBindCache = MethodBindCache::new("Node3D", "set_transform");

        ptrcall(&BIND, self.raw, (transform,))
    }

    pub fn get_transform(&self) -> Transform3D {
        static BIND: MethodBindCache = MethodBindCache::new("Node3D", "get_transform");

        ptrcall(&BIND, self.raw, ())
    }
}

#[cfg(test)]
mod tests {
    use crate::builtin::{Basis, Transform3D, Vector3};
    use crate::classes::Node3D;
    use crate::obj::Obj;
    use crate::sys::mock;

    #[test]
    fn multi_word_values_round_trip() {
        let _session = mock::install();
        let node = Obj::<Node3D>::new_alloc();

        node.set_position(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(node.get_position(), Vector3::new(1.0, 2.0, 3.0));

        let xform = Transform3D::new(Basis::from_scale(Vector3::splat(2.0)), Vector3::new(0.0, 5.0, 0.0));
        node.set_transform(xform);
        assert_eq!(node.get_transform(), xform);
    }
}
