/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate as sys;

/// Types that can directly and fully represent some Godot type inside a call frame.
///
/// A value occupies [`SLOT_WORDS`](GodotFfi::SLOT_WORDS) machine words in a frame and is read and written through
/// Godot's _type ptr_ convention: a pointer to the slot holding the encoded value.
/// See [crate::ffi_methods] for ergonomic implementation.
///
/// # Safety
///
/// [`from_sys`](GodotFfi::from_sys) and [`write_sys`](GodotFfi::write_sys) must read and write exactly the
/// encoding Godot uses for the type, and that encoding must fit into `SLOT_WORDS` words.
#[doc(hidden)] // shows up in implementors otherwise
pub unsafe trait GodotFfi: Copy + 'static {
    /// Width of the slot, in machine words.
    const SLOT_WORDS: usize = sys::slot_words(std::mem::size_of::<Self>());

    fn variant_type() -> sys::VariantType;

    /// Reads a value from a Godot _type ptr_.
    ///
    /// # Safety
    /// `ptr` must point to a valid encoding of `Self`.
    unsafe fn from_sys(ptr: sys::GDExtensionConstTypePtr) -> Self;

    /// Writes the encoding of `self` to `dst`.
    ///
    /// # Safety
    /// `dst` must be valid for writes of `SLOT_WORDS` words (or of the encoded size, if smaller).
    unsafe fn write_sys(self, dst: sys::GDExtensionTypePtr);

    /// Construct from a pointer to an argument in a call.
    ///
    /// # Safety
    /// * `ptr` must be a valid _type ptr_: it must follow Godot's convention to encode `Self`.
    /// * `ptr` must encode `Self` according to the given `call_type`'s encoding of argument values.
    unsafe fn from_arg_ptr(ptr: sys::GDExtensionConstTypePtr, _call_type: PtrcallType) -> Self {
        Self::from_sys(ptr)
    }

    /// Move self into the return pointer `dst`.
    ///
    /// # Safety
    /// `dst` must be able to accept a value of type `Self` encoded according to the given `call_type`'s encoding of
    /// return values.
    unsafe fn move_return_ptr(self, dst: sys::GDExtensionTypePtr, _call_type: PtrcallType) {
        self.write_sys(dst)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// An indication of what type of pointer call is being made.
#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub enum PtrcallType {
    /// Standard pointer call.
    ///
    /// In a standard ptrcall, every argument is passed in as a pointer to a value of that type, and the
    /// return value must be moved into the return pointer.
    #[default]
    Standard,

    /// Virtual pointer call, i.e. the engine calling into an extension class.
    ///
    /// Behaves like [`PtrcallType::Standard`], except for objects inheriting `RefCounted`, which are passed as `Ref<T>*`.
    /// Reading such an argument yields the same pointer word as a standard call.
    Virtual,
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Macro to implement the sys methods of `GodotFfi`

/// Provides `from_sys` and `write_sys` for [`GodotFfi`] implementations.
///
/// * `type sys::GDExtensionTypePtr = *mut Self; ..`<br>
///   The address of the slot is directly reinterpreted as `*mut Self`. Used for types whose Rust layout is Godot's
///   layout (`repr(C)` structs, `bool`, `i64`, opaque handles).
///
/// * `type sys::GDExtensionTypePtr = *mut Self via $Via; ..`<br>
///   The slot holds a `$Via` and `Self` is converted with `as`. Used for `f32`, which Godot always encodes as `double`;
///   reading rounds to the nearest `f32`.
///
/// * `type sys::GDExtensionTypePtr = *mut Self via $Via, checked; ..`<br>
///   The slot holds a `$Via`, which `Self` widens into losslessly. Reading narrows, which is checked in debug builds;
///   release builds truncate like the engine's own C++ casts. Used for integers, which Godot encodes as `int64_t`.
#[macro_export]
macro_rules! ffi_methods {
    (type $Ptr:ty = *mut Self; ..) => {
        unsafe fn from_sys(ptr: $crate::GDExtensionConstTypePtr) -> Self {
            std::ptr::read(ptr as *const Self)
        }

        unsafe fn write_sys(self, dst: $Ptr) {
            std::ptr::write(dst as *mut Self, self)
        }
    };

    (type $Ptr:ty = *mut Self via $Via:ty; ..) => {
        const SLOT_WORDS: usize = $crate::slot_words(std::mem::size_of::<$Via>());

        unsafe fn from_sys(ptr: $crate::GDExtensionConstTypePtr) -> Self {
            std::ptr::read(ptr as *const $Via) as Self
        }

        unsafe fn write_sys(self, dst: $Ptr) {
            std::ptr::write(dst as *mut $Via, self as $Via)
        }
    };

    (type $Ptr:ty = *mut Self via $Via:ty, checked; ..) => {
        const SLOT_WORDS: usize = $crate::slot_words(std::mem::size_of::<$Via>());

        unsafe fn from_sys(ptr: $crate::GDExtensionConstTypePtr) -> Self {
            let wide = std::ptr::read(ptr as *const $Via);
            debug_assert!(
                <Self>::try_from(wide).is_ok(),
                "engine passed {wide}, which is out of range for {}",
                std::any::type_name::<Self>()
            );

            wide as Self
        }

        unsafe fn write_sys(self, dst: $Ptr) {
            std::ptr::write(dst as *mut $Via, <$Via>::from(self))
        }
    };
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Implementation for common types (needs to be this crate due to orphan rule)

mod scalars {
    use super::GodotFfi;
    use crate as sys;

    // SAFETY: Godot encodes bool as a single byte.
    unsafe impl GodotFfi for bool {
        fn variant_type() -> sys::VariantType {
            sys::VariantType::Bool
        }

        ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
    }

    unsafe impl GodotFfi for i64 {
        fn variant_type() -> sys::VariantType {
            sys::VariantType::Int
        }

        ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
    }

    // Godot has no 32-bit integers in ptrcalls; `int` is always `int64_t`.
    unsafe impl GodotFfi for i32 {
        fn variant_type() -> sys::VariantType {
            sys::VariantType::Int
        }

        ffi_methods! { type sys::GDExtensionTypePtr = *mut Self via i64, checked; .. }
    }

    unsafe impl GodotFfi for u32 {
        fn variant_type() -> sys::VariantType {
            sys::VariantType::Int
        }

        ffi_methods! { type sys::GDExtensionTypePtr = *mut Self via i64, checked; .. }
    }

    unsafe impl GodotFfi for f64 {
        fn variant_type() -> sys::VariantType {
            sys::VariantType::Float
        }

        ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
    }

    // Same for `float`, which is `double` in ptrcalls regardless of `real_t`.
    unsafe impl GodotFfi for f32 {
        fn variant_type() -> sys::VariantType {
            sys::VariantType::Float
        }

        ffi_methods! { type sys::GDExtensionTypePtr = *mut Self via f64; .. }
    }

    unsafe impl GodotFfi for () {
        const SLOT_WORDS: usize = 0;

        fn variant_type() -> sys::VariantType {
            sys::VariantType::Nil
        }

        unsafe fn from_sys(_ptr: sys::GDExtensionConstTypePtr) -> Self {
            // Do nothing
        }

        unsafe fn write_sys(self, _dst: sys::GDExtensionTypePtr) {
            // Do nothing
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
