/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Lifetime scopes holding engine objects and builtin values of several kinds at once.

use gdlink_core::builtin::{GString, StringKind};
use gdlink_core::classes::{AudioEffectInstance, Node, Node3D};
use gdlink_core::meta::error::HandleError;
use gdlink_core::obj::{Borrowed, HandleArena, Obj, ObjectKind, OwnershipClass, Shared};
use gdlink_core::sys::{self, mock};

#[test]
fn scope_end_releases_objects_and_values() {
    let _session = mock::install();
    let binding = sys::binding();
    let values_before = mock::live_values();
    let double_before = mock::stats().double_destroys;

    let mut arena = HandleArena::new();
    let mut scope = arena.scope(binding);

    let parent_raw = Obj::<Node>::new_alloc().end();
    let parent = scope.adopt::<ObjectKind<Node>>(parent_raw, OwnershipClass::Owned);

    // Same object seen through a borrowed handle: never released by the scope.
    scope.adopt::<ObjectKind<Node>>(parent_raw, OwnershipClass::Borrowed);

    let child = Obj::<Node3D>::new_alloc();
    let child_ptr = child.as_object_ptr();
    let parent_view = unsafe { Obj::<Node, Borrowed>::borrow(scope.get(parent).expect("live")) };
    parent_view.add_child(child);
    drop(parent_view);

    let effect_raw = Obj::<AudioEffectInstance, Shared>::new_ref().end();
    scope.adopt::<ObjectKind<AudioEffectInstance>>(effect_raw, OwnershipClass::Shared);

    scope.adopt::<StringKind>(GString::from_str("label").end(), OwnershipClass::Owned);

    assert_eq!(scope.live_count(), 4);
    assert_eq!(mock::live_values(), values_before + 1);
    assert!(!mock::is_destroyed(parent_raw.as_ptr()));

    scope.end();

    assert!(mock::is_destroyed(parent_raw.as_ptr()));
    assert!(mock::is_destroyed(child_ptr));
    assert!(mock::is_destroyed(effect_raw.as_ptr()));
    assert_eq!(mock::live_values(), values_before);
    assert_eq!(mock::stats().double_destroys, double_before);
    assert_eq!(arena.live_count(), 0);
}

#[test]
fn ended_handle_leaves_scope() {
    let _session = mock::install();
    let binding = sys::binding();

    let mut arena = HandleArena::new();
    let kept_raw;
    {
        let mut scope = arena.scope(binding);
        let effect = scope.adopt::<ObjectKind<AudioEffectInstance>>(
            Obj::<AudioEffectInstance, Shared>::new_ref().end(),
            OwnershipClass::Shared,
        );

        kept_raw = scope.end_handle(effect).expect("first end succeeds");
        assert!(matches!(
            scope.end_handle(effect),
            Err(HandleError::AlreadyReleased { .. })
        ));
    }

    // The scope is gone, the reference it handed over is still alive.
    assert!(!mock::is_destroyed(kept_raw.as_ptr()));
    assert_eq!(mock::reference_count(kept_raw.as_ptr()), Some(1));

    let effect = unsafe { Obj::<AudioEffectInstance, Shared>::from_shared(kept_raw) };
    drop(effect);
    assert!(mock::is_destroyed(kept_raw.as_ptr()));
}
