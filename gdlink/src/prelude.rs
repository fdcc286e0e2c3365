/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub use super::builtin::*;
pub use super::classes::virtuals::*;
pub use super::classes::{AudioEffectInstance, Engine, Node, Node3D, Object, RefCounted};
pub use super::init::{gdextension, ExtensionLibrary, InitLevel};
pub use super::log::{gd_error, gd_print, gd_warn};
pub use super::meta::error::{CallError, ConvertError, HandleError, RegisterError};
pub use super::meta::{FromGodot, GodotConvert, RawPtr, ToGodot};
pub use super::obj::{
    Base, BaseMut, Borrowed, EngineClass, Handle, HandleArena, HandleId, HandleRef, Inherits, InstanceId, Lifetime, Obj,
    ObjPtr, Owned, Shared, WithBaseField,
};
pub use super::registry::{ClassBuilder, ClassRegistry, ExtensionClass};
