/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::sys;

/// Wrapper around a raw pointer, for the native-structure parameters of engine APIs.
///
/// Such parameters (e.g. `const void*` and `AudioFrame*` of audio effect processing) occupy one word in the call
/// frame, holding the address.
///
/// # Example
/// ```no_run
/// use gdlink_core::builtin::AudioFrame;
/// use gdlink_core::meta::RawPtr;
///
/// let mut frames = [AudioFrame::default(); 128];
///
/// // SAFETY: `frames` outlives every use of `dst`.
/// let dst = unsafe { RawPtr::new(frames.as_mut_ptr()) };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawPtr<P: FfiRawPointer> {
    ptr: P,
}

impl<P: FfiRawPointer> RawPtr<P> {
    /// Constructs a new `RawPtr` from a raw pointer.
    ///
    /// # Safety
    /// The pointer must remain valid as long as a Godot API accesses its value.
    #[inline]
    pub unsafe fn new(ptr: P) -> Self {
        RawPtr { ptr }
    }

    /// Constructs a new `RawPtr` wrapping a null pointer.
    ///
    /// # Safety
    /// You must ensure that Godot can handle null pointers in the specific Godot API where this value will be used.
    #[inline]
    pub unsafe fn null() -> Self {
        RawPtr::new(P::ptr_from_usize(0))
    }

    /// Returns the wrapped raw pointer.
    #[inline]
    pub fn ptr(self) -> P {
        self.ptr
    }

    pub fn is_null(self) -> bool {
        self.ptr.to_usize() == 0
    }
}

// SAFETY: the slot holds the address, exactly one word wide.
unsafe impl<P: FfiRawPointer> sys::GodotFfi for RawPtr<P> {
    fn variant_type() -> sys::VariantType {
        sys::VariantType::Int
    }

    unsafe fn from_sys(ptr: sys::GDExtensionConstTypePtr) -> Self {
        RawPtr {
            ptr: P::ptr_from_usize(std::ptr::read(ptr as *const usize)),
        }
    }

    unsafe fn write_sys(self, dst: sys::GDExtensionTypePtr) {
        std::ptr::write(dst as *mut usize, self.ptr.to_usize())
    }
}

impl<P: FfiRawPointer> GodotConvert for RawPtr<P> {
    type Via = Self;
}

impl<P: FfiRawPointer> ToGodot for RawPtr<P> {
    fn to_godot(&self) -> Self::Via {
        *self
    }
}

impl<P: FfiRawPointer> FromGodot for RawPtr<P> {
    fn from_godot(via: Self::Via) -> Self {
        via
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Pointer trait

mod sealed {
    pub trait Sealed {}
}

/// Trait for raw pointers that can be passed over the Godot FFI boundary.
///
/// Implemented for `*const T` and `*mut T`.
pub trait FfiRawPointer: sealed::Sealed + Copy + std::fmt::Debug + PartialEq + Eq + 'static {
    #[doc(hidden)]
    fn ptr_from_usize(addr: usize) -> Self;

    #[doc(hidden)]
    fn to_usize(self) -> usize;
}

impl<T: 'static> sealed::Sealed for *const T {}
impl<T: 'static> sealed::Sealed for *mut T {}

impl<T: 'static> FfiRawPointer for *const T {
    fn ptr_from_usize(addr: usize) -> Self {
        addr as Self
    }

    fn to_usize(self) -> usize {
        self as usize
    }
}

impl<T: 'static> FfiRawPointer for *mut T {
    fn ptr_from_usize(addr: usize) -> Self {
        addr as Self
    }

    fn to_usize(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sys::GodotFfi;

    #[test]
    fn pointer_fills_one_word() {
        assert_eq!(RawPtr::<*const u8>::SLOT_WORDS, 1);

        let value = 42u32;
        let wrapped = unsafe { RawPtr::new(&value as *const u32) };

        let mut frame = sys::CallFrame::new();
        frame.arg(wrapped);

        let back = unsafe { frame.read_arg::<RawPtr<*const u32>>(0) };
        assert_eq!(unsafe { *back.ptr() }, 42);
    }
}
