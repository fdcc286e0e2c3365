/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::sys;

/// Color built-in type, in floating-point RGBA format.
///
/// Channel values are _typically_ in the range of 0 to 1, but this is not a requirement, and
/// values outside this range are explicitly allowed for e.g. High Dynamic Range (HDR).
#[repr(C)]
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::from_rgb(1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::from_rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT_BLACK: Self = Self::from_rgba(0.0, 0.0, 0.0, 0.0);

    /// Constructs a new `Color` with the given components.
    pub const fn from_rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Constructs a new `Color` with the given color components, and the alpha channel set to 1.
    pub const fn from_rgb(r: f32, g: f32, b: f32) -> Self {
        Self::from_rgba(r, g, b, 1.0)
    }

    /// Constructs a new `Color` with the given components as bytes. 0 is mapped to 0.0, 255 is
    /// mapped to 1.0.
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::from_rgba(from_u8(r), from_u8(g), from_u8(b), from_u8(a))
    }

    /// Returns the color with its channels multiplied by `factor`, alpha unchanged.
    pub fn scaled(self, factor: f32) -> Self {
        Self::from_rgba(self.r * factor, self.g * factor, self.b * factor, self.a)
    }
}

fn from_u8(v: u8) -> f32 {
    (v as f32) / 255.0
}

impl From<glam::Vec4> for Color {
    fn from(v: glam::Vec4) -> Self {
        Self::from_rgba(v.x, v.y, v.z, v.w)
    }
}

impl From<Color> for glam::Vec4 {
    fn from(c: Color) -> Self {
        glam::Vec4::new(c.r, c.g, c.b, c.a)
    }
}

// SAFETY: `repr(C)` layout equals Godot's.
unsafe impl sys::GodotFfi for Color {
    fn variant_type() -> sys::VariantType {
        sys::VariantType::Color
    }

    sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
}

impl GodotConvert for Color {
    type Via = Self;
}

impl ToGodot for Color {
    fn to_godot(&self) -> Self::Via {
        *self
    }
}

impl FromGodot for Color {
    fn from_godot(via: Self::Via) -> Self {
        via
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sys::GodotFfi;

    #[test]
    fn bytes_map_to_unit_range() {
        let c = Color::from_rgba8(255, 0, 51, 255);
        assert_eq!(c, Color::from_rgba(1.0, 0.0, 0.2, 1.0));
        assert_eq!(Color::SLOT_WORDS, 2);
    }
}
