/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Builtin types that live in engine memory and are referred to by handle.

use std::fmt;

use crate::obj::{Borrowed, Handle, HandleKind, Owned, Ownership};
use crate::sys;

/// Declares a handle kind for a builtin type released through the engine's variant destructor.
macro_rules! builtin_kind {
    ($(#[$attr:meta])* $Kind:ident($Raw:ty) => $variant:ident) => {
        $(#[$attr])*
        pub enum $Kind {}

        impl HandleKind for $Kind {
            type Raw = $Raw;

            const NAME: &'static str = stringify!($variant);

            unsafe fn release(binding: &sys::Binding, mut raw: Self::Raw) {
                let destroy = (binding.interface().variant_get_ptr_destructor)(sys::VariantType::$variant.sys());
                if let Some(destroy) = destroy {
                    destroy(raw.sys_mut());
                }
            }

            unsafe fn duplicate_shared(binding: &sys::Binding, raw: Self::Raw) -> Self::Raw {
                construct_with(binding, sys::VariantType::$variant, 1, &[raw.sys()])
            }

            fn is_null(raw: &Self::Raw) -> bool {
                raw.is_null()
            }
        }
    };
}

builtin_kind!(
    /// Kind of Godot `String` handles.
    StringKind(sys::RawString) => String
);
builtin_kind!(
    /// Kind of Godot `StringName` handles.
    StringNameKind(sys::RawStringName) => StringName
);
builtin_kind!(
    /// Kind of Godot `Array` handles.
    ArrayKind(sys::RawArray) => Array
);
builtin_kind!(
    /// Kind of Godot `Dictionary` handles.
    DictionaryKind(sys::RawDictionary) => Dictionary
);
builtin_kind!(
    /// Kind of Godot `Callable` handles.
    CallableKind(sys::RawCallable) => Callable
);
builtin_kind!(
    /// Kind of Godot `PackedByteArray` handles.
    PackedByteArrayKind(sys::RawPackedByteArray) => PackedByteArray
);

/// Godot's reference counted string.
pub type GString<O = Owned> = Handle<StringKind, O>;

/// Interned string, used for class and method names.
pub type StringName<O = Owned> = Handle<StringNameKind, O>;

/// Godot's untyped array.
pub type Array<O = Owned> = Handle<ArrayKind, O>;

pub type Dictionary<O = Owned> = Handle<DictionaryKind, O>;

pub type Callable<O = Owned> = Handle<CallableKind, O>;

pub type PackedByteArray<O = Owned> = Handle<PackedByteArrayKind, O>;

/// Runs engine constructor `index` of `variant_type` into a fresh handle.
///
/// Yields a null handle if the engine has no such constructor.
unsafe fn construct_with<R: sys::GodotFfi>(
    binding: &sys::Binding,
    variant_type: sys::VariantType,
    index: i32,
    args: &[sys::GDExtensionConstTypePtr],
) -> R {
    // Zero bits are the null handle.
    let mut raw = std::mem::MaybeUninit::<R>::zeroed();
    let constructor = (binding.interface().variant_get_ptr_constructor)(variant_type.sys(), index);

    match constructor {
        Some(construct) => construct(raw.as_mut_ptr() as sys::GDExtensionUninitializedTypePtr, args.as_ptr()),
        None => crate::gd_error!(
            "engine provides no constructor #{} for {:?}",
            index,
            variant_type
        ),
    }
    raw.assume_init()
}

macro_rules! impl_default_constructible {
    ($($Kind:ident => $variant:ident),*) => {
        $(
            impl Handle<$Kind, Owned> {
                /// Constructs an empty value.
                pub fn new() -> Self {
                    // SAFETY: a default-constructed value is owned by us.
                    unsafe {
                        let raw = construct_with(sys::binding(), sys::VariantType::$variant, 0, &[]);
                        Self::from_raw(raw)
                    }
                }
            }

            impl Default for Handle<$Kind, Owned> {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl<O: Ownership> Handle<$Kind, O> {
                /// Owned copy of the value. Godot shares the underlying data until either side changes.
                pub fn to_owned_copy(&self) -> Handle<$Kind, Owned> {
                    // SAFETY: the copy is a new value owned by us.
                    unsafe { Handle::from_raw($Kind::duplicate_shared(sys::binding(), self.raw())) }
                }
            }
        )*
    };
}

impl_default_constructible!(
    StringKind => String,
    StringNameKind => StringName,
    ArrayKind => Array,
    DictionaryKind => Dictionary,
    CallableKind => Callable,
    PackedByteArrayKind => PackedByteArray
);

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Strings

impl GString {
    pub fn from_str(s: &str) -> Self {
        let raw = sys::new_string(sys::binding().interface(), s);

        // SAFETY: new string owned by us.
        unsafe { Self::from_raw(raw) }
    }
}

impl<O: Ownership> GString<O> {
    /// Converts to a Rust string, copying the contents.
    pub fn to_rust_string(&self) -> String {
        // SAFETY: the handle is live.
        unsafe { sys::string_to_rust(sys::binding().interface(), self.raw().sys()) }
    }
}

impl StringName {
    pub fn from_str(s: &str) -> Self {
        let raw = sys::new_string_name(sys::binding().interface(), s);

        // SAFETY: new string name owned by us.
        unsafe { Self::from_raw(raw) }
    }
}

impl<O: Ownership> StringName<O> {
    /// Converts to a Rust string, copying the contents.
    pub fn to_rust_string(&self) -> String {
        // SAFETY: the handle is live.
        unsafe { sys::string_name_to_rust(sys::binding().interface(), self.raw().sys()) }
    }
}

impl StringName<Borrowed> {
    /// Borrows a string name that the engine passed by pointer, e.g. a method name in a callback.
    ///
    /// # Safety
    /// `ptr` must point to a live `StringName`.
    pub unsafe fn borrow_string_sys(ptr: sys::GDExtensionConstStringNamePtr) -> Self {
        Self::borrow(std::ptr::read(ptr as *const sys::RawStringName))
    }
}

impl From<&str> for GString {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<&str> for StringName {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl<O: Ownership> fmt::Display for GString<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rust_string())
    }
}

impl<O: Ownership> fmt::Display for StringName<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rust_string())
    }
}
