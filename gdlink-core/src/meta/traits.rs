/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::sys;
use sys::GodotFfi;

/// Indicates that a type can be passed to/from Godot, by way of its frame representation `Via`.
///
/// `Via` is what sits in a call-frame slot: a scalar, a value struct, or the raw bits of a handle.
pub trait GodotConvert {
    /// The type through which `Self` is represented in Godot.
    type Via: GodotFfi;
}

/// Defines the canonical conversion to Godot for a type.
///
/// Converting must not transfer ownership: passing a handle as argument lends it to the engine for the duration
/// of the call.
pub trait ToGodot: GodotConvert {
    /// Converts this type to the Godot type by reference, usually by cloning.
    fn to_godot(&self) -> Self::Via;
}

/// Defines the canonical conversion from Godot for a type.
///
/// Handles are only received borrowed. A value the engine hands over is adopted explicitly, with the `unsafe`
/// [`Handle::from_raw()`](crate::obj::Handle::from_raw) or [`Handle::from_shared()`](crate::obj::Handle::from_shared).
pub trait FromGodot: GodotConvert + Sized {
    /// Converts the Godot representation to this type.
    fn from_godot(via: Self::Via) -> Self;
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Impls for types that are their own frame representation

macro_rules! impl_as_self {
    ($($T:ty),* $(,)?) => {
        $(
            impl GodotConvert for $T {
                type Via = $T;
            }

            impl ToGodot for $T {
                fn to_godot(&self) -> Self::Via {
                    *self
                }
            }

            impl FromGodot for $T {
                fn from_godot(via: Self::Via) -> Self {
                    via
                }
            }
        )*
    };
}

impl_as_self!(
    (),
    bool,
    i32,
    i64,
    u32,
    f32,
    f64,
    sys::RawObject,
    sys::RawString,
    sys::RawStringName,
    sys::RawArray,
    sys::RawDictionary,
    sys::RawCallable,
    sys::RawPackedByteArray,
    sys::RawVariant,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_convert_as_self() {
        assert_eq!(i32::from_godot((-7i32).to_godot()), -7);
        assert!(bool::from_godot(true.to_godot()));
        assert_eq!(f64::from_godot(2.5f64.to_godot()), 2.5);
        assert!(sys::RawObject::from_godot(sys::RawObject::null()).is_null());
    }
}
