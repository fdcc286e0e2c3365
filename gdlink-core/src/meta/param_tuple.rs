/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

#![deny(unsafe_op_in_unsafe_fn)]

use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::sys;
use sys::GodotFfi;

/// Represents a parameter list as Rust tuple where each tuple element is one parameter.
///
/// This trait only contains metadata for the parameter list, the actual functionality is contained in [`InParamTuple`] and
/// [`OutParamTuple`].
pub trait ParamTuple: Sized {
    /// The number of elements in this parameter list.
    const LEN: usize;

    /// Frame widths of the parameters, in machine words.
    fn slot_widths() -> Vec<usize>;
}

/// Represents a parameter list that is received from Godot, i.e. the arguments of a virtual call.
pub trait InParamTuple: ParamTuple {
    /// Converts `args_ptr` to `Self` directly.
    ///
    /// # Safety
    ///
    /// - `args_ptr` must be a pointer to a valid array of length [`Self::LEN`](ParamTuple::LEN)
    /// - each element of `args_ptr` must be of the same type as each element of `Self`
    unsafe fn from_ptrcall_args(args_ptr: *const sys::GDExtensionConstTypePtr, call_type: sys::PtrcallType) -> Self;
}

/// Represents a parameter list that is used to call an engine method.
pub trait OutParamTuple: ParamTuple {
    /// Appends every element of the tuple as one argument slot to `frame`.
    ///
    /// Arguments are consumed here, before the call happens. Handles must therefore be passed as borrowed views
    /// (see [`Handle::as_borrowed()`](crate::obj::Handle::as_borrowed)) or raw bits of ended handles.
    fn push_args(self, frame: &mut sys::CallFrame);
}

macro_rules! count_idents {
    () => { 0 };
    ($id:ident $($rest:ident)*) => { 1 + count_idents!($($rest)*)};
}

macro_rules! impl_param_tuple {
    ($(($p:ident, $n:tt): $P:ident),*) => {
        impl<$($P),*> ParamTuple for ($($P,)*) where $($P: GodotConvert),* {
            const LEN: usize = count_idents!($($P)*);

            fn slot_widths() -> Vec<usize> {
                vec![$( <$P::Via as GodotFfi>::SLOT_WORDS, )*]
            }
        }

        impl<$($P),*> InParamTuple for ($($P,)*) where $($P: FromGodot),* {
            unsafe fn from_ptrcall_args(
                args_ptr: *const sys::GDExtensionConstTypePtr,
                call_type: sys::PtrcallType,
            ) -> Self {
                (
                    $(
                        // SAFETY: `args_ptr` has length `Self::LEN`, `$n` is less than that, and its `$n`-th element
                        // points to a `$P::Via`.
                        unsafe { ptrcall_arg::<$P>(args_ptr, $n, call_type) },
                    )*
                )
            }
        }

        impl<$($P),*> OutParamTuple for ($($P,)*) where $($P: ToGodot),* {
            fn push_args(self, frame: &mut sys::CallFrame) {
                let ($($p,)*) = self;
                $(
                    frame.arg($p.to_godot());
                )*
            }
        }
    };
}

#[allow(unused_variables, unused_mut, clippy::unused_unit)]
mod unit_impl {
    use super::*;
    impl_param_tuple!();
}
impl_param_tuple!((p0, 0): P0);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4, (p5, 5): P5);
impl_param_tuple!((p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4, (p5, 5): P5, (p6, 6): P6);
impl_param_tuple!(
    (p0, 0): P0, (p1, 1): P1, (p2, 2): P2, (p3, 3): P3, (p4, 4): P4, (p5, 5): P5, (p6, 6): P6, (p7, 7): P7
);

/// Convert the `index`th argument of `args_ptr` into a value of type `P`.
///
/// # Safety
/// - It must be safe to dereference the address at `args_ptr.add(index)`.
/// - The pointer at `args_ptr.add(index)` must follow the safety requirements as laid out in
///   [`GodotFfi::from_arg_ptr`].
unsafe fn ptrcall_arg<P: FromGodot>(
    args_ptr: *const sys::GDExtensionConstTypePtr,
    index: usize,
    call_type: sys::PtrcallType,
) -> P {
    // SAFETY: It is safe to dereference `args_ptr` at `index`.
    let arg_ptr = unsafe { *args_ptr.add(index) };

    // SAFETY: `arg_ptr` follows the safety requirements of `from_arg_ptr`.
    let via = unsafe { <P::Via as GodotFfi>::from_arg_ptr(arg_ptr, call_type) };
    P::from_godot(via)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_frame_representation() {
        assert_eq!(<() as ParamTuple>::LEN, 0);
        assert_eq!(<(bool, i32, f64) as ParamTuple>::LEN, 3);
        assert_eq!(<(bool, sys::RawCallable) as ParamTuple>::slot_widths(), [1, 2]);
    }

    #[test]
    fn push_then_read_back() {
        let mut frame = sys::CallFrame::new();
        (true, 128i32, -1.5f64).push_args(&mut frame);

        let args: (bool, i32, f64) =
            unsafe { InParamTuple::from_ptrcall_args(frame.args_ptr(), sys::PtrcallType::Virtual) };
        assert_eq!(args, (true, 128, -1.5));
    }

    #[test]
    fn eight_params() {
        type Eight = (bool, i32, i64, f32, f64, u32, sys::RawCallable, bool);
        assert_eq!(<Eight as ParamTuple>::LEN, 8);
        assert_eq!(<Eight as ParamTuple>::slot_widths(), [1, 1, 1, 1, 1, 1, 2, 1]);

        let mut frame = sys::CallFrame::new();
        (false, -3i32, 1i64 << 40, 0.5f32, 2.25f64, 7u32, sys::RawCallable::null(), true).push_args(&mut frame);
        assert_eq!(frame.arg_count(), 8);

        let (a, b, c, d, e, f, callable, h): Eight =
            unsafe { InParamTuple::from_ptrcall_args(frame.args_ptr(), sys::PtrcallType::Virtual) };
        assert_eq!((a, b, c, d, e, f, h), (false, -3, 1 << 40, 0.5, 2.25, 7, true));
        assert!(callable.is_null());
    }
}
