/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Handles to engine resources and their ownership.
//!
//! The most important symbols in this module are:
//! * [`Handle`], a typed handle whose ownership (owned, borrowed, shared) is part of the type.
//! * [`Obj`], a handle to an engine object, dereferencing to its [`EngineClass`] wrapper.
//! * [`HandleArena`] and [`Lifetime`], tracking handles whose ownership is only known at runtime.

mod arena;
mod base;
mod handle;
mod instance_id;
mod obj_ptr;
mod object_kind;
mod traits;

pub use arena::{HandleArena, HandleId, Lifetime};
pub use base::{Base, BaseMut, WithBaseField};
pub use handle::{Borrowed, Handle, HandleKind, HandleRef, Owned, Ownership, OwnershipClass, Releasing, Shared};
pub use instance_id::InstanceId;
pub use obj_ptr::ObjPtr;
pub use object_kind::{Obj, ObjectKind};
pub use traits::{EngineClass, Inherits};
