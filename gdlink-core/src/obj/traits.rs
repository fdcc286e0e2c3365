/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::obj::ObjPtr;
use crate::registry::ClassInfo;

/// Wrapper of a class provided by the engine.
///
/// Engine classes are zero-cost views of an object pointer, declared through the crate-internal `engine_class!` macro.
/// They are not constructed by user code; [`Obj`](crate::obj::Obj) dereferences to them.
///
/// # Safety
/// The implementing type must be `#[repr(transparent)]` over [`ObjPtr`], and `CLASS_INFO` must describe the
/// engine class of that name.
pub unsafe trait EngineClass: Sized + 'static {
    /// Direct base class. `Object` is its own base.
    type Base: EngineClass;

    const CLASS_INFO: &'static ClassInfo;

    fn raw_object(&self) -> ObjPtr;

    /// Reinterprets the bits of an object handle as this class.
    fn from_raw_ref(raw: &ObjPtr) -> &Self;

    fn class_name() -> &'static str {
        Self::CLASS_INFO.name()
    }
}

/// Non-strict inheritance relationship in the engine class hierarchy.
///
/// `Derived: Inherits<Base>` means that either `Derived` is a subclass of `Base`, or the class `Base` itself (hence
/// "non-strict").
///
/// This trait is automatically implemented for all engine classes.
///
/// # Safety
/// Only implemented for types that are a subclass of `Base` (or `Base` itself), so that an object of `Self` may be
/// used wherever `Base` is expected.
pub unsafe trait Inherits<Base: EngineClass>: EngineClass {}
