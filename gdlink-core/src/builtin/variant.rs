/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Godot's dynamically typed value, as passed to and returned from callables.

use crate::builtin::{
    ArrayKind, Basis, CallableKind, Color, DictionaryKind, PackedByteArrayKind, StringKind, StringNameKind,
    Transform2D, Transform3D, Vector2, Vector2i, Vector3,
};
use crate::classes::{Object, RefCounted};
use crate::meta::error::ConvertError;
use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::obj::{Borrowed, EngineClass, Handle, HandleKind, HandleRef, Inherits, Obj, Owned, Ownership, Shared};
use crate::sys;
use sys::{GodotFfi, VariantType};

/// Kind of Godot `Variant` handles.
///
/// A variant holds its value (or a reference to it), so dropping an owned variant releases what it holds.
pub enum VariantKind {}

impl HandleKind for VariantKind {
    type Raw = sys::RawVariant;

    const NAME: &'static str = "Variant";

    unsafe fn release(binding: &sys::Binding, mut raw: sys::RawVariant) {
        (binding.interface().variant_destroy)(raw.sys_mut());
    }

    unsafe fn duplicate_shared(binding: &sys::Binding, raw: sys::RawVariant) -> sys::RawVariant {
        let mut copy = sys::RawVariant::null();
        (binding.interface().variant_new_copy)(copy.sys_mut(), raw.sys());
        copy
    }

    /// All-zero bits are `nil`, which holds nothing to release.
    fn is_null(raw: &sys::RawVariant) -> bool {
        raw.is_null()
    }
}

/// Dynamically typed engine value.
///
/// ```ignore
/// let variant = Variant::from_value(&42i64);
/// assert_eq!(variant.try_to::<i64>(), Ok(42));
/// ```
pub type Variant<O = Owned> = Handle<VariantKind, O>;

impl Variant {
    /// The `nil` variant.
    pub fn nil() -> Self {
        // SAFETY: nil bits own nothing.
        unsafe { Self::from_raw(sys::RawVariant::null()) }
    }

    /// Variant holding a copy of `value`. For objects, the variant holds a reference if the object is ref-counted.
    ///
    /// Handles are passed through [`as_borrowed()`](Handle::as_borrowed), like for engine calls. Variants themselves
    /// are copied with `try_to::<Variant>()` instead.
    pub fn from_value<T: ToGodot>(value: &T) -> Self {
        let via = value.to_godot();
        let ty = <T::Via as GodotFfi>::variant_type();
        if ty == VariantType::Nil {
            return Self::nil();
        }

        let binding = sys::binding();

        // SAFETY: the constructor is selected by type tag.
        let Some(convert) = (unsafe { (binding.interface().get_variant_from_type_constructor)(ty.sys()) }) else {
            crate::gd_error!("engine has no conversion from {:?} to Variant", ty);
            return Self::nil();
        };

        let mut frame = sys::CallFrame::new();
        frame.arg(via);

        let mut raw = sys::RawVariant::null();

        // SAFETY: the slot holds a `T::Via`, which matches the constructor's type. The variant is new and ours.
        unsafe {
            convert(raw.sys_mut(), frame.arg_ptr(0) as sys::GDExtensionTypePtr);
            Self::from_raw(raw)
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::nil()
    }
}

impl<O: Ownership> Handle<VariantKind, O> {
    /// Type of the held value, or `None` for types gdlink has no tag for.
    pub fn get_type(&self) -> Option<VariantType> {
        get_type_of(&self.raw())
    }

    pub fn is_nil(&self) -> bool {
        self.get_type() == Some(VariantType::Nil)
    }

    /// Reads the held value as `T`.
    pub fn try_to<T: FromVariant>(&self) -> Result<T, ConvertError> {
        T::try_from_variant(self.as_borrowed())
    }

    /// Like [`try_to()`](Self::try_to), but panics on failure.
    ///
    /// # Panics
    /// If the variant does not hold a `T`.
    pub fn to<T: FromVariant>(&self) -> T {
        self.try_to()
            .unwrap_or_else(|err| panic!("Variant::to::<{}>(): {err}", std::any::type_name::<T>()))
    }
}

fn get_type_of(raw: &sys::RawVariant) -> Option<VariantType> {
    if raw.is_null() {
        return Some(VariantType::Nil);
    }

    // SAFETY: the variant is live while its handle or view exists.
    let ty = unsafe { (sys::binding().interface().variant_get_type)(raw.sys()) };
    VariantType::from_sys(ty)
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Conversions out of a variant

/// Types that can be read out of a [`Variant`].
///
/// Builtin handles come out owned: the engine copies the value for the caller. Objects come out borrowed (or shared,
/// for ref-counted classes), since the variant keeps holding them.
pub trait FromVariant: Sized {
    fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError>;
}

/// Runs the engine's conversion of `variant` to `R`, after checking that the variant holds an `R`.
fn convert_to<R: GodotFfi>(variant: HandleRef<'_, VariantKind>) -> Result<R, ConvertError> {
    let expected = R::variant_type();
    let actual = get_type_of(variant.raw_ref());
    if actual != Some(expected) {
        return Err(ConvertError::WrongType { expected, actual });
    }

    let binding = sys::binding();

    // SAFETY: the constructor is selected by type tag.
    let Some(convert) = (unsafe { (binding.interface().get_variant_to_type_constructor)(expected.sys()) }) else {
        return Err(ConvertError::Unsupported { ty: expected });
    };

    let mut frame = sys::CallFrame::new();
    let ret = frame.ret::<R>();

    // Conversion reads the variant only; the copy of its bits stays with the view.
    let mut bits = variant.raw();

    // SAFETY: the variant holds an `R`, checked above, and the return region spans an `R`.
    unsafe {
        convert(frame.ret_ptr(), bits.sys_mut());
        Ok(ret.get(&frame))
    }
}

macro_rules! impl_from_variant_by_value {
    ($($T:ty),* $(,)?) => {
        $(
            impl FromVariant for $T {
                fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError> {
                    convert_to::<<$T as GodotConvert>::Via>(variant).map(<$T>::from_godot)
                }
            }
        )*
    };
}

impl_from_variant_by_value!(bool, i64, f64, Vector2, Vector2i, Vector3, Color, Basis, Transform2D, Transform3D);

macro_rules! impl_from_variant_narrow_int {
    ($($T:ty),* $(,)?) => {
        $(
            impl FromVariant for $T {
                fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError> {
                    let value = convert_to::<i64>(variant)?;
                    <$T>::try_from(value).map_err(|_| ConvertError::OutOfRange {
                        value,
                        target: stringify!($T),
                    })
                }
            }
        )*
    };
}

impl_from_variant_narrow_int!(i32, u32);

/// Rounds to the nearest `f32`, like the engine does for single-precision properties.
impl FromVariant for f32 {
    fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError> {
        convert_to::<f64>(variant).map(|value| value as f32)
    }
}

macro_rules! impl_from_variant_owned_handle {
    ($($Kind:ty),* $(,)?) => {
        $(
            impl FromVariant for Handle<$Kind, Owned> {
                fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError> {
                    let raw = convert_to::<<$Kind as HandleKind>::Raw>(variant)?;

                    // SAFETY: the conversion constructed a new value for us.
                    Ok(unsafe { Handle::from_raw(raw) })
                }
            }
        )*
    };
}

impl_from_variant_owned_handle!(
    StringKind,
    StringNameKind,
    ArrayKind,
    DictionaryKind,
    CallableKind,
    PackedByteArrayKind,
);

/// Copy of the variant, owned by the caller.
impl FromVariant for Variant {
    fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError> {
        // SAFETY: the view is live; the copy is new and ours.
        Ok(unsafe { Variant::from_raw(VariantKind::duplicate_shared(sys::binding(), variant.raw())) })
    }
}

/// The object stays held by the variant; the handle is valid while the variant is.
impl<C> FromVariant for Obj<C, Borrowed>
where
    C: EngineClass + Inherits<Object>,
{
    fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError> {
        let object = convert_to::<crate::obj::ObjPtr>(variant)?;
        if object.is_null() {
            return Err(ConvertError::WrongClass {
                expected: C::class_name(),
            });
        }

        // SAFETY: a variant holding an object keeps it alive, or reports it destroyed through its ID.
        let object = unsafe { Obj::<Object, Borrowed>::borrow(object) };
        object.try_cast::<C>().map_err(|_| ConvertError::WrongClass {
            expected: C::class_name(),
        })
    }
}

/// Takes a reference of its own, so the handle outlives the variant.
impl<C> FromVariant for Obj<C, Shared>
where
    C: EngineClass + Inherits<Object> + Inherits<RefCounted>,
{
    fn try_from_variant(variant: HandleRef<'_, VariantKind>) -> Result<Self, ConvertError> {
        Obj::<C, Borrowed>::try_from_variant(variant).map(|object| object.to_shared())
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::GString;
    use crate::classes::{Node, Node3D};
    use crate::sys::mock;

    #[test]
    fn scalars_round_trip() {
        let _session = mock::install();

        let int = Variant::from_value(&-12i64);
        assert_eq!(int.get_type(), Some(VariantType::Int));
        assert_eq!(int.try_to::<i64>(), Ok(-12));
        assert_eq!(int.try_to::<i32>(), Ok(-12));
        assert_eq!(
            int.try_to::<bool>(),
            Err(ConvertError::WrongType {
                expected: VariantType::Bool,
                actual: Some(VariantType::Int)
            })
        );

        let flag = Variant::from_value(&true);
        assert!(flag.to::<bool>());

        let position = Variant::from_value(&Vector3::new(1.0, -2.0, 0.5));
        assert_eq!(position.to::<Vector3>(), Vector3::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn narrow_int_out_of_range() {
        let _session = mock::install();

        let big = Variant::from_value(&(1i64 << 40));
        assert_eq!(
            big.try_to::<i32>(),
            Err(ConvertError::OutOfRange {
                value: 1 << 40,
                target: "i32"
            })
        );
        assert_eq!(Variant::from_value(&-1i64).try_to::<u32>().ok(), None);
    }

    #[test]
    fn nil_owns_nothing() {
        let _session = mock::install();
        let before = mock::live_values();

        let nil = Variant::nil();
        assert!(nil.is_nil());
        assert!(nil.try_to::<i64>().is_err());
        drop(nil);

        assert_eq!(mock::live_values(), before);
        assert!(Variant::from_value(&()).is_nil());
    }

    #[test]
    fn string_is_copied_in_and_out() {
        let _session = mock::install();
        let before = mock::live_values();

        let text = GString::from("payload");
        let variant = Variant::from_value(&text.as_borrowed());
        drop(text);

        let out: GString = variant.to();
        assert_eq!(out.to_string(), "payload");

        drop(variant);
        drop(out);
        assert_eq!(mock::live_values(), before);
    }

    #[test]
    fn large_values_survive_copies() {
        let _session = mock::install();
        let before = mock::live_values();

        let xform = Transform3D::new(Basis::from_scale(Vector3::splat(3.0)), Vector3::new(1.0, 2.0, 3.0));
        let variant = Variant::from_value(&xform);
        let copy = variant.try_to::<Variant>().expect("copy");
        drop(variant);

        assert_eq!(copy.to::<Transform3D>(), xform);
        drop(copy);
        assert_eq!(mock::live_values(), before);
    }

    #[test]
    fn object_read_back_with_class_check() {
        let _session = mock::install();
        let node = Obj::<Node3D>::new_alloc();

        let variant = Variant::from_value(&node.as_borrowed());
        let as_node: Obj<Node, Borrowed> = variant.to();
        assert_eq!(as_node.as_object_ptr(), node.as_object_ptr());

        assert_eq!(
            variant.try_to::<Obj<RefCounted, Borrowed>>().err(),
            Some(ConvertError::WrongClass {
                expected: "RefCounted"
            })
        );
    }

    #[test]
    fn ref_counted_object_held_by_variant() {
        let _session = mock::install();
        let object = Obj::<RefCounted>::new_alloc();
        let ptr = object.as_object_ptr();

        let variant = Variant::from_value(&object.as_borrowed());
        assert_eq!(mock::reference_count(ptr), Some(2));

        let shared: Obj<RefCounted, Shared> = variant.to();
        assert_eq!(mock::reference_count(ptr), Some(3));

        drop(object);
        drop(variant);
        assert_eq!(mock::reference_count(ptr), Some(1));
        assert!(!mock::is_destroyed(ptr));

        drop(shared);
        assert!(mock::is_destroyed(ptr));
    }
}
