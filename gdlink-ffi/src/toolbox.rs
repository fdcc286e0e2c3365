/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Functions and macros that are not very specific to gdlink, but come in handy.

use crate as sys;

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Macros

/// Verifies a condition at compile time.
#[macro_export]
macro_rules! static_assert {
    ($cond:expr) => {
        const _: () = assert!($cond);
    };
    ($cond:expr, $msg:literal) => {
        const _: () = assert!($cond, $msg);
    };
}

/// Verifies at compile time that two types `T` and `U` have the same size.
#[macro_export]
macro_rules! static_assert_eq_size {
    ($T:ty, $U:ty) => {
        $crate::static_assert!(std::mem::size_of::<$T>() == std::mem::size_of::<$U>());
    };
    ($T:ty, $U:ty, $msg:literal) => {
        $crate::static_assert!(std::mem::size_of::<$T>() == std::mem::size_of::<$U>(), $msg);
    };
}

/// Trace output.
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! out {
    ()                          => (eprintln!());
    ($fmt:literal)              => (eprintln!($fmt));
    ($fmt:literal, $($arg:tt)*) => (eprintln!($fmt, $($arg)*));
}

/// Trace output.
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! out {
    ()                          => ({});
    ($fmt:literal)              => ({ use std::io::{sink, Write}; let _ = write!(sink(), $fmt); });
    ($fmt:literal, $($arg:tt)*) => ({ use std::io::{sink, Write}; let _ = write!(sink(), $fmt, $($arg)*); })
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Utility functions

/// Returns a C `const char*` for a null-terminated byte string.
#[inline]
pub(crate) fn c_str(s: &[u8]) -> *const std::ffi::c_char {
    // Ensure null-terminated
    debug_assert!(!s.is_empty() && s[s.len() - 1] == 0);

    s.as_ptr() as *const std::ffi::c_char
}

/// Number of machine words occupied by a value of `size_bytes` bytes inside a call frame.
#[inline]
pub const fn slot_words(size_bytes: usize) -> usize {
    size_bytes.div_ceil(std::mem::size_of::<usize>())
}

/// Reads the version string that Godot passes alongside the numeric version.
///
/// # Safety
/// `version.string` must be null or point to a null-terminated C string.
pub unsafe fn read_version_string(version: &sys::GDExtensionGodotVersion) -> String {
    if version.string.is_null() {
        return format!("{}.{}.{}", version.major, version.minor, version.patch);
    }

    std::ffi::CStr::from_ptr(version.string)
        .to_string_lossy()
        .into_owned()
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Private helpers

/// Metafunction to extract inner function pointer types from the `Option<F>` aliases in the C declarations.
pub(crate) trait Inner: Sized {
    type FnPtr: Copy;
}

impl<T: Copy> Inner for Option<T> {
    type FnPtr = T;
}

/// Looks up `name` (null-terminated) through `get_proc_address` and reinterprets the result as `T`'s function pointer.
///
/// # Safety
/// The function registered under `name` must have the signature described by `T`.
pub(crate) unsafe fn load_fn<T: Inner>(
    get_proc_address: sys::GetProcAddressFn,
    name: &'static str,
) -> Result<T::FnPtr, sys::InitError> {
    debug_assert_eq!(
        std::mem::size_of::<T::FnPtr>(),
        std::mem::size_of::<unsafe extern "C" fn()>()
    );

    match get_proc_address(c_str(name.as_bytes())) {
        Some(ptr) => Ok(std::mem::transmute_copy::<unsafe extern "C" fn(), T::FnPtr>(&ptr)),
        None => Err(sys::InitError::MissingInterfaceFn {
            name: name.trim_end_matches('\0'),
        }),
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_words_round_up() {
        assert_eq!(slot_words(0), 0);
        assert_eq!(slot_words(1), 1);
        assert_eq!(slot_words(8), 1);
        assert_eq!(slot_words(12), 2);
        assert_eq!(slot_words(16), 2);
        assert_eq!(slot_words(36), 5);
        assert_eq!(slot_words(48), 6);
    }
}
