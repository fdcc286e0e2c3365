/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Built-in types like vectors, colors and strings.
//!
//! Value types ([`Vector3`], [`Color`], [`Transform3D`], ...) have the engine's memory layout and are copied into
//! call frames. Handle types ([`GString`], [`Array`], ...) live in engine memory and are [`Handle`](crate::obj::Handle)s
//! with engine-provided constructors and destructors. [`Variant`] holds any of them, with the engine converting in and
//! out.

mod callable;
mod color;
mod handles;
mod matrices;
mod others;
mod variant;
mod vectors;

pub use color::Color;
pub use handles::{
    Array, ArrayKind, Callable, CallableKind, Dictionary, DictionaryKind, GString, PackedByteArray,
    PackedByteArrayKind, StringKind, StringName, StringNameKind,
};
pub use matrices::{Basis, Transform2D, Transform3D};
pub use others::{AudioFrame, Error};
pub use variant::{FromVariant, Variant, VariantKind};
pub use vectors::{Vector2, Vector2i, Vector3};
