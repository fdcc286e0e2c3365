/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate as sys;
use crate::GodotFfi;

/// Stores an opaque object of a certain size, with very restricted operations
///
/// Note: due to `align(8)` and not `packed` repr, this type may be bigger than `N` bytes
/// (which should be OK since C++ just needs to read/write those `N` bytes reliably).
#[repr(C, align(8))]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Opaque<const N: usize> {
    storage: [u8; N],
    marker: std::marker::PhantomData<*const u8>, // disable Send/Sync
}

impl<const N: usize> Opaque<N> {
    /// All-zero bytes. Godot never hands out such a value for a live resource.
    pub const fn zeroed() -> Self {
        Self {
            storage: [0; N],
            marker: std::marker::PhantomData,
        }
    }

    pub fn is_zeroed(&self) -> bool {
        self.storage.iter().all(|&b| b == 0)
    }
}

impl<const N: usize> std::fmt::Debug for Opaque<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Opaque<{N}>(")?;
        for byte in self.storage.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

pub type OpaqueString = Opaque<8>;
pub type OpaqueStringName = Opaque<8>;
pub type OpaqueArray = Opaque<8>;
pub type OpaqueDictionary = Opaque<8>;
pub type OpaqueCallable = Opaque<16>;
pub type OpaquePackedByteArray = Opaque<16>;
pub type OpaqueVariant = Opaque<24>;

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Raw handles

/// Declares the bit pattern of one builtin handle type, as it sits inside a call frame.
macro_rules! raw_handle {
    ($(#[$attr:meta])* $Raw:ident($Opaque:ty) => $variant:ident) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Eq, PartialEq, Debug)]
        pub struct $Raw {
            pub opaque: $Opaque,
        }

        impl $Raw {
            pub const fn null() -> Self {
                Self { opaque: <$Opaque>::zeroed() }
            }

            pub fn is_null(&self) -> bool {
                self.opaque.is_zeroed()
            }

            /// Pointer to the handle bits, for engine functions that take the value by address.
            pub fn sys(&self) -> sys::GDExtensionConstTypePtr {
                &self.opaque as *const $Opaque as sys::GDExtensionConstTypePtr
            }

            pub fn sys_mut(&mut self) -> sys::GDExtensionTypePtr {
                &mut self.opaque as *mut $Opaque as sys::GDExtensionTypePtr
            }
        }

        // SAFETY: the handle is stored in the slot exactly as Godot stores the value.
        unsafe impl GodotFfi for $Raw {
            fn variant_type() -> sys::VariantType {
                sys::VariantType::$variant
            }

            sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
        }
    };
}

raw_handle!(
    /// Bits of a Godot `String`.
    RawString(OpaqueString) => String
);
raw_handle!(
    /// Bits of a Godot `StringName`.
    RawStringName(OpaqueStringName) => StringName
);
raw_handle!(
    /// Bits of a Godot `Array`.
    RawArray(OpaqueArray) => Array
);
raw_handle!(
    /// Bits of a Godot `Dictionary`.
    RawDictionary(OpaqueDictionary) => Dictionary
);
raw_handle!(
    /// Bits of a Godot `Callable`.
    RawCallable(OpaqueCallable) => Callable
);
raw_handle!(
    /// Bits of a Godot `PackedByteArray`.
    RawPackedByteArray(OpaquePackedByteArray) => PackedByteArray
);

raw_handle!(
    /// Bits of a Godot `Variant`. All-zero bits are `null`.
    RawVariant(OpaqueVariant) => Nil
);

/// Pointer to an engine object, as passed in ptrcalls (`Object*` in the slot).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RawObject {
    ptr: sys::GDExtensionObjectPtr,
}

impl RawObject {
    pub const fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
        }
    }

    pub fn from_ptr(ptr: sys::GDExtensionObjectPtr) -> Self {
        Self { ptr }
    }

    pub fn as_ptr(self) -> sys::GDExtensionObjectPtr {
        self.ptr
    }

    pub fn is_null(self) -> bool {
        self.ptr.is_null()
    }
}

// SAFETY: an object argument is a pointer to a slot holding `Object*`. For `Ref<T>*` in virtual calls, the first word
// of `Ref<T>` is the same pointer.
unsafe impl GodotFfi for RawObject {
    fn variant_type() -> sys::VariantType {
        sys::VariantType::Object
    }

    sys::ffi_methods! { type sys::GDExtensionTypePtr = *mut Self; .. }
}

sys::static_assert_eq_size!(RawString, usize);
sys::static_assert_eq_size!(RawObject, usize);
sys::static_assert_eq_size!(RawCallable, [usize; 2]);
sys::static_assert_eq_size!(RawVariant, [usize; 3]);
sys::static_assert_eq_size!(RawPackedByteArray, [usize; 2]);

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_widths() {
        assert_eq!(RawObject::SLOT_WORDS, 1);
        assert_eq!(RawString::SLOT_WORDS, 1);
        assert_eq!(RawStringName::SLOT_WORDS, 1);
        assert_eq!(RawArray::SLOT_WORDS, 1);
        assert_eq!(RawCallable::SLOT_WORDS, 2);
        assert_eq!(RawPackedByteArray::SLOT_WORDS, 2);
        assert_eq!(RawVariant::SLOT_WORDS, 3);
    }

    #[test]
    fn null_handles() {
        assert!(RawString::null().is_null());
        assert!(RawCallable::null().is_null());
        assert!(RawObject::null().is_null());
    }
}
