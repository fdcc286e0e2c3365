/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate as sys;

/// Builtin type tags, as used by `variant_get_ptr_constructor` and `variant_get_ptr_destructor`.
///
/// Discriminants are Godot's `Variant::Type` ordinals.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(u32)]
pub enum VariantType {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    Vector2 = 5,
    Vector2i = 6,
    Vector3 = 9,
    Transform2D = 11,
    Basis = 17,
    Transform3D = 18,
    Color = 20,
    StringName = 21,
    Object = 24,
    Callable = 25,
    Dictionary = 27,
    Array = 28,
    PackedByteArray = 29,
}

impl VariantType {
    #[doc(hidden)]
    pub fn sys(self) -> sys::GDExtensionVariantType {
        self as sys::GDExtensionVariantType
    }

    /// Tag for a `GDExtensionVariantType` ordinal, if gdlink knows the type.
    pub fn from_sys(ty: sys::GDExtensionVariantType) -> Option<Self> {
        const ALL: [VariantType; 18] = [
            VariantType::Nil,
            VariantType::Bool,
            VariantType::Int,
            VariantType::Float,
            VariantType::String,
            VariantType::Vector2,
            VariantType::Vector2i,
            VariantType::Vector3,
            VariantType::Transform2D,
            VariantType::Basis,
            VariantType::Transform3D,
            VariantType::Color,
            VariantType::StringName,
            VariantType::Object,
            VariantType::Callable,
            VariantType::Dictionary,
            VariantType::Array,
            VariantType::PackedByteArray,
        ];

        ALL.into_iter().find(|candidate| candidate.sys() == ty)
    }

    /// Whether values of this type own engine memory that must be released through a destructor.
    pub fn needs_destructor(self) -> bool {
        matches!(
            self,
            Self::String
                | Self::StringName
                | Self::Callable
                | Self::Dictionary
                | Self::Array
                | Self::PackedByteArray
        )
    }
}
