/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::ops;

use crate::sys;
use sys::GodotFfi;

/// Declares a vector type with `glam` conversions and component-wise arithmetic.
macro_rules! impl_vector {
    (
        $(#[$attr:meta])*
        $Vector:ident($Scalar:ty, $Glam:ty) { $($comp:ident),+ } => $variant:ident
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Default, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(C)]
        pub struct $Vector {
            $(pub $comp: $Scalar,)+
        }

        impl $Vector {
            /// Returns a vector with the given components.
            pub const fn new($($comp: $Scalar),+) -> Self {
                Self { $($comp),+ }
            }

            /// Returns a vector with all components set to `v`.
            pub const fn splat(v: $Scalar) -> Self {
                Self { $($comp: v),+ }
            }

            /// Converts `self` to the corresponding `glam` type.
            pub fn to_glam(self) -> $Glam {
                <$Glam>::new($(self.$comp),+)
            }

            /// Converts the corresponding `glam` type to `Self`.
            pub fn from_glam(v: $Glam) -> Self {
                Self::new($(v.$comp),+)
            }
        }

        impl From<$Glam> for $Vector {
            fn from(v: $Glam) -> Self {
                Self::from_glam(v)
            }
        }

        impl From<$Vector> for $Glam {
            fn from(v: $Vector) -> Self {
                v.to_glam()
            }
        }

        impl ops::Add for $Vector {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self::new($(self.$comp + rhs.$comp),+)
            }
        }

        impl ops::Sub for $Vector {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self::new($(self.$comp - rhs.$comp),+)
            }
        }

        impl ops::Mul<$Scalar> for $Vector {
            type Output = Self;

            fn mul(self, rhs: $Scalar) -> Self {
                Self::new($(self.$comp * rhs),+)
            }
        }

        // SAFETY: `repr(C)` layout equals Godot's.
        unsafe impl GodotFfi for $Vector {
            fn variant_type() -> sys::VariantType {
                sys::VariantType::$variant
            }

            sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
        }

        impl crate::meta::GodotConvert for $Vector {
            type Via = Self;
        }

        impl crate::meta::ToGodot for $Vector {
            fn to_godot(&self) -> Self::Via {
                *self
            }
        }

        impl crate::meta::FromGodot for $Vector {
            fn from_godot(via: Self::Via) -> Self {
                via
            }
        }
    };
}

impl_vector!(
    /// Vector used for 2D math using floating point coordinates.
    Vector2(f32, glam::Vec2) { x, y } => Vector2
);

impl_vector!(
    /// Vector used for 2D math using integer coordinates.
    Vector2i(i32, glam::IVec2) { x, y } => Vector2i
);

impl_vector!(
    /// Vector used for 3D math using floating point coordinates.
    ///
    /// 32-bit components, matching engines built with single precision.
    Vector3(f32, glam::Vec3) { x, y, z } => Vector3
);

impl Vector2 {
    pub const ZERO: Self = Self::splat(0.0);
    pub const ONE: Self = Self::splat(1.0);

    pub fn length(self) -> f32 {
        self.to_glam().length()
    }
}

impl Vector2i {
    pub const ZERO: Self = Self::splat(0);
    pub const ONE: Self = Self::splat(1);
}

impl Vector3 {
    /// Vector with all components set to `0.0`.
    pub const ZERO: Self = Self::splat(0.0);

    /// Vector with all components set to `1.0`.
    pub const ONE: Self = Self::splat(1.0);

    /// Unit vector in +Y direction. Typically interpreted as up in a 3D world.
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit vector in -Z direction. Can be interpreted as "into the screen" in an untransformed 3D world.
    pub const FORWARD: Self = Self::new(0.0, 0.0, -1.0);

    pub fn length(self) -> f32 {
        self.to_glam().length()
    }

    pub fn dot(self, with: Self) -> f32 {
        self.to_glam().dot(with.to_glam())
    }

    pub fn cross(self, with: Self) -> Self {
        Self::from_glam(self.to_glam().cross(with.to_glam()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_widths() {
        assert_eq!(Vector2::SLOT_WORDS, 1);
        assert_eq!(Vector2i::SLOT_WORDS, 1);
        assert_eq!(Vector3::SLOT_WORDS, 2);
    }

    #[test]
    fn glam_conversion() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(Vector3::from(glam::Vec3::from(v)), v);
        assert_eq!(v.cross(Vector3::UP), Vector3::new(-3.0, 0.0, 1.0));
        assert_eq!(Vector2i::new(3, 4) - Vector2i::ONE, Vector2i::new(2, 3));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_roundtrip() {
        let v = Vector2::new(0.5, -1.0);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"x":0.5,"y":-1.0}"#);
        assert_eq!(serde_json::from_str::<Vector2>(&json).unwrap(), v);
    }
}
