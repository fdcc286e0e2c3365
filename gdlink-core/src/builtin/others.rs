/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::sys;

/// One stereo sample, as processed by audio effects.
///
/// Passed by pointer (`AudioFrame*`) into audio callbacks; see [`RawPtr`](crate::meta::RawPtr).
#[derive(Copy, Clone, PartialEq, Default, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}

// SAFETY: `repr(C)` layout equals Godot's native structure.
unsafe impl sys::GodotFfi for AudioFrame {
    // Native structures have no variant type.
    fn variant_type() -> sys::VariantType {
        sys::VariantType::Nil
    }

    sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
}

impl GodotConvert for AudioFrame {
    type Via = Self;
}

impl ToGodot for AudioFrame {
    fn to_godot(&self) -> Self::Via {
        *self
    }
}

impl FromGodot for AudioFrame {
    fn from_godot(via: Self::Via) -> Self {
        via
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Error code reported by an engine method (Godot's `Error` enum).
///
/// Passed through as-is: a non-`OK` value is a result of the call, not a failure of the binding.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Error {
    ord: i64,
}

impl Error {
    pub const OK: Self = Self { ord: 0 };
    pub const FAILED: Self = Self { ord: 1 };
    pub const ERR_UNAVAILABLE: Self = Self { ord: 2 };
    pub const ERR_UNCONFIGURED: Self = Self { ord: 3 };
    pub const ERR_UNAUTHORIZED: Self = Self { ord: 4 };
    pub const ERR_PARAMETER_RANGE_ERROR: Self = Self { ord: 5 };
    pub const ERR_OUT_OF_MEMORY: Self = Self { ord: 6 };
    pub const ERR_FILE_NOT_FOUND: Self = Self { ord: 7 };
    pub const ERR_INVALID_DATA: Self = Self { ord: 30 };
    pub const ERR_INVALID_PARAMETER: Self = Self { ord: 31 };
    pub const ERR_ALREADY_EXISTS: Self = Self { ord: 32 };
    pub const ERR_DOES_NOT_EXIST: Self = Self { ord: 33 };
    pub const ERR_BUSY: Self = Self { ord: 44 };
    pub const ERR_BUG: Self = Self { ord: 47 };

    pub const fn from_ord(ord: i64) -> Self {
        Self { ord }
    }

    pub const fn ord(self) -> i64 {
        self.ord
    }

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    fn name(self) -> Option<&'static str> {
        let name = match self.ord {
            0 => "OK",
            1 => "FAILED",
            2 => "ERR_UNAVAILABLE",
            3 => "ERR_UNCONFIGURED",
            4 => "ERR_UNAUTHORIZED",
            5 => "ERR_PARAMETER_RANGE_ERROR",
            6 => "ERR_OUT_OF_MEMORY",
            7 => "ERR_FILE_NOT_FOUND",
            30 => "ERR_INVALID_DATA",
            31 => "ERR_INVALID_PARAMETER",
            32 => "ERR_ALREADY_EXISTS",
            33 => "ERR_DOES_NOT_EXIST",
            44 => "ERR_BUSY",
            47 => "ERR_BUG",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Error::{name}"),
            None => write!(f, "Error({})", self.ord),
        }
    }
}

// SAFETY: enums are `int64_t` in ptrcalls.
unsafe impl sys::GodotFfi for Error {
    fn variant_type() -> sys::VariantType {
        sys::VariantType::Int
    }

    sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
}

impl GodotConvert for Error {
    type Via = Self;
}

impl ToGodot for Error {
    fn to_godot(&self) -> Self::Via {
        *self
    }
}

impl FromGodot for Error {
    fn from_godot(via: Self::Via) -> Self {
        via
    }
}
