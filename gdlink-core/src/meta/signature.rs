/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::marker::PhantomData;

use crate::meta::{FromGodot, InParamTuple, OutParamTuple, ParamTuple, ToGodot};
use crate::sys;
use sys::GodotFfi;

/// Static signature of a call, `Params` being a tuple of parameter types and `Ret` the return type.
///
/// Turns typed Rust values into a call frame and back, in both directions: calls from Rust into engine methods
/// (`out_*`), and engine calls into extension virtuals (`in_*`).
pub struct Signature<Params, Ret> {
    _p: PhantomData<Params>,
    _r: PhantomData<fn() -> Ret>,
}

impl<Params: ParamTuple, Ret: FromOrToVia> Signature<Params, Ret> {
    /// Frame layout of this signature.
    pub fn frame_signature() -> sys::FrameSignature {
        sys::FrameSignature {
            arg_words: Params::slot_widths(),
            ret_words: Ret::RET_WORDS,
        }
    }
}

impl<Params: OutParamTuple, Ret: FromGodot> Signature<Params, Ret> {
    /// Calls an engine method through a call frame.
    ///
    /// # Safety
    /// - `object` must be a live object of the entry's class, or null if the method is static.
    /// - `Params` and `Ret` must be the parameter and return types of the method in `entry`.
    pub unsafe fn out_class_ptrcall(
        binding: &sys::Binding,
        entry: &sys::MethodBindEntry,
        object: sys::GDExtensionObjectPtr,
        args: Params,
    ) -> Ret {
        let mut frame = sys::CallFrame::new();
        args.push_args(&mut frame);

        let ret = frame.ret::<Ret::Via>();
        init_ret_value::<Ret::Via>(binding, &mut frame);

        frame.ptrcall(binding, entry, object);

        let via = ret.get(&frame);
        frame.free();

        Ret::from_godot(via)
    }
}

impl<Params: InParamTuple, Ret: ToGodot> Signature<Params, Ret> {
    /// Receives an engine call: reads the arguments, invokes `func` and moves its result to `ret_ptr`.
    ///
    /// # Safety
    /// `args_ptr` must point to [`Params::LEN`](ParamTuple::LEN) argument pointers matching `Params`, and `ret_ptr`
    /// must accept a `Ret` (or be null when `Ret` occupies no words).
    pub unsafe fn in_ptrcall<F>(args_ptr: *const sys::GDExtensionConstTypePtr, ret_ptr: sys::GDExtensionTypePtr, func: F)
    where
        F: FnOnce(Params) -> Ret,
    {
        let params = Params::from_ptrcall_args(args_ptr, sys::PtrcallType::Virtual);
        let ret = func(params);

        if !ret_ptr.is_null() {
            ret.to_godot().move_return_ptr(ret_ptr, sys::PtrcallType::Virtual);
        }
    }
}

impl<Params: ParamTuple, Ret: FromOrToVia> fmt::Debug for Signature<Params, Ret> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("frame", &Self::frame_signature())
            .finish()
    }
}

/// Return types are either read from (engine calls) or written to (virtual calls) a frame.
#[doc(hidden)]
pub trait FromOrToVia {
    const RET_WORDS: usize;
}

impl<T: crate::meta::GodotConvert> FromOrToVia for T {
    const RET_WORDS: usize = <T::Via as GodotFfi>::SLOT_WORDS;
}

/// Engine methods assign their result to the return slot, so handle-backed return values must be constructed before.
unsafe fn init_ret_value<T: GodotFfi>(binding: &sys::Binding, frame: &mut sys::CallFrame) {
    let variant_type = T::variant_type();
    if !variant_type.needs_destructor() {
        return;
    }

    let constructor = (binding.interface().variant_get_ptr_constructor)(variant_type.sys(), 0);
    if let Some(construct_default) = constructor {
        construct_default(frame.ret_ptr(), std::ptr::null());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_signature_matches_widths() {
        type Sig = Signature<(i64, bool, sys::RawCallable), sys::RawString>;

        let sig = Sig::frame_signature();
        assert_eq!(sig.arg_words, [1, 1, 2]);
        assert_eq!(sig.ret_words, 1);

        assert_eq!(Signature::<(), ()>::frame_signature().ret_words, 0);
    }

    #[test]
    fn in_ptrcall_writes_return() {
        let mut frame = sys::CallFrame::new();
        frame.arg(20i64).arg(22i64);
        let ret = frame.ret::<i64>();

        let args = frame.args_ptr();
        let ret_ptr = frame.ret_ptr();
        unsafe {
            Signature::<(i64, i64), i64>::in_ptrcall(args, ret_ptr, |(a, b)| a + b);
            assert_eq!(ret.get(&frame), 42);
        }
    }
}
