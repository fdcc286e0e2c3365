/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::ops::Mul;

use crate::builtin::{Vector2, Vector3};
use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::sys;

/// A 3x3 matrix, typically used as an orthogonal basis for [`Transform3D`].
///
/// The basis vectors are the columns of the matrix, whereas the [`rows`](Self::rows) field represents
/// the row vectors, which is how Godot stores them.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Basis {
    /// The rows of the matrix. These are *not* the basis vectors.
    pub rows: [Vector3; 3],
}

impl Basis {
    /// The identity basis, with no rotation or scaling applied.
    pub const IDENTITY: Self = Self::from_rows(
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, 1.0),
    );

    pub const fn from_rows(x: Vector3, y: Vector3, z: Vector3) -> Self {
        Self { rows: [x, y, z] }
    }

    pub fn from_cols(a: Vector3, b: Vector3, c: Vector3) -> Self {
        Self::from_glam(glam::Mat3::from_cols(a.to_glam(), b.to_glam(), c.to_glam()))
    }

    pub fn from_scale(scale: Vector3) -> Self {
        Self::from_glam(glam::Mat3::from_diagonal(scale.to_glam()))
    }

    pub fn from_glam(mat: glam::Mat3) -> Self {
        // glam stores columns, Godot rows.
        let t = mat.transpose();
        Self::from_rows(
            Vector3::from_glam(t.x_axis),
            Vector3::from_glam(t.y_axis),
            Vector3::from_glam(t.z_axis),
        )
    }

    pub fn to_glam(self) -> glam::Mat3 {
        glam::Mat3::from_cols(
            self.rows[0].to_glam(),
            self.rows[1].to_glam(),
            self.rows[2].to_glam(),
        )
        .transpose()
    }

    pub fn determinant(self) -> f32 {
        self.to_glam().determinant()
    }
}

impl Mul for Basis {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::from_glam(self.to_glam() * rhs.to_glam())
    }
}

impl Mul<Vector3> for Basis {
    type Output = Vector3;

    fn mul(self, rhs: Vector3) -> Vector3 {
        Vector3::from_glam(self.to_glam() * rhs.to_glam())
    }
}

/// Affine 3D transform (3x4 matrix): a [`Basis`] and an origin.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Transform3D {
    pub basis: Basis,
    pub origin: Vector3,
}

impl Transform3D {
    pub const IDENTITY: Self = Self::new(Basis::IDENTITY, Vector3::ZERO);

    pub const fn new(basis: Basis, origin: Vector3) -> Self {
        Self { basis, origin }
    }

    pub fn from_glam(affine: glam::Affine3A) -> Self {
        Self::new(
            Basis::from_glam(affine.matrix3.into()),
            Vector3::from_glam(affine.translation.into()),
        )
    }

    pub fn to_glam(self) -> glam::Affine3A {
        glam::Affine3A::from_mat3_translation(self.basis.to_glam(), self.origin.to_glam())
    }

    pub fn translated(self, offset: Vector3) -> Self {
        Self::new(self.basis, self.origin + offset)
    }
}

impl Mul<Vector3> for Transform3D {
    type Output = Vector3;

    fn mul(self, rhs: Vector3) -> Vector3 {
        Vector3::from_glam(self.to_glam().transform_point3(rhs.to_glam()))
    }
}

/// Affine 2D transform (2x3 matrix): basis vectors `a`, `b` and an origin.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Transform2D {
    /// The first basis vector (x axis).
    pub a: Vector2,
    /// The second basis vector (y axis).
    pub b: Vector2,
    pub origin: Vector2,
}

impl Transform2D {
    pub const IDENTITY: Self = Self::from_cols(Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0), Vector2::ZERO);

    pub const fn from_cols(a: Vector2, b: Vector2, origin: Vector2) -> Self {
        Self { a, b, origin }
    }

    pub fn from_glam(affine: glam::Affine2) -> Self {
        Self::from_cols(
            Vector2::from_glam(affine.matrix2.x_axis),
            Vector2::from_glam(affine.matrix2.y_axis),
            Vector2::from_glam(affine.translation),
        )
    }

    pub fn to_glam(self) -> glam::Affine2 {
        glam::Affine2::from_cols(self.a.to_glam(), self.b.to_glam(), self.origin.to_glam())
    }
}

impl Mul<Vector2> for Transform2D {
    type Output = Vector2;

    fn mul(self, rhs: Vector2) -> Vector2 {
        Vector2::from_glam(self.to_glam().transform_point2(rhs.to_glam()))
    }
}

macro_rules! impl_value_ffi {
    ($($T:ident),*) => {
        $(
            // SAFETY: `repr(C)` layout equals Godot's.
            unsafe impl sys::GodotFfi for $T {
                fn variant_type() -> sys::VariantType {
                    sys::VariantType::$T
                }

                sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
            }

            impl GodotConvert for $T {
                type Via = Self;
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

impl_value_ffi!(Basis, Transform3D, Transform2D);

#[cfg(test)]
mod tests {
    use super::*;
    use sys::GodotFfi;

    #[test]
    fn frame_widths() {
        assert_eq!(Transform2D::SLOT_WORDS, 3);
        assert_eq!(Basis::SLOT_WORDS, 5);
        assert_eq!(Transform3D::SLOT_WORDS, 6);
    }

    #[test]
    fn basis_rows_and_glam_columns() {
        let basis = Basis::from_cols(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(4.0, 5.0, 6.0),
            Vector3::new(7.0, 8.0, 10.0),
        );
        assert_eq!(basis.rows[0], Vector3::new(1.0, 4.0, 7.0));
        assert_eq!(Basis::from_glam(basis.to_glam()), basis);
        assert_eq!(Basis::IDENTITY * Vector3::new(1.0, 2.0, 3.0), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn transform_moves_points() {
        let xform = Transform3D::IDENTITY.translated(Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(xform * Vector3::ZERO, Vector3::UP);

        let scaled = Transform3D::new(Basis::from_scale(Vector3::splat(2.0)), Vector3::ZERO);
        assert_eq!(scaled * Vector3::ONE, Vector3::splat(2.0));

        let xform2 = Transform2D::from_cols(Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0), Vector2::ONE);
        assert_eq!(xform2 * Vector2::ZERO, Vector2::ONE);
    }
}
