/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Argument and return buffers for `object_method_bind_ptrcall`.
//!
//! A frame lays out arguments back to back in machine words; argument `i` starts at the sum of the widths of all
//! previous arguments. The return value lives in its own region, so that `ret()` may be requested at any point.
//! Buffers are recycled through a thread-local pool.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;

use crate as sys;
use crate::{FrameSignature, GodotFfi, MethodBindEntry};

/// Frames kept around for reuse, per thread.
const POOL_CAPACITY: usize = 16;

thread_local! {
    static POOL: RefCell<Vec<FrameBuffers>> = const { RefCell::new(Vec::new()) };
    static NEXT_FRAME_ID: Cell<u64> = const { Cell::new(0) };
}

#[derive(Default)]
struct FrameBuffers {
    args: Vec<usize>,
    ret: Vec<usize>,
    offsets: Vec<usize>,
    widths: Vec<usize>,
    arg_ptrs: Vec<sys::GDExtensionConstTypePtr>,
}

impl FrameBuffers {
    fn clear(&mut self) {
        self.args.clear();
        self.ret.clear();
        self.offsets.clear();
        self.widths.clear();
        self.arg_ptrs.clear();
    }
}

/// Argument and return buffer of one outbound call.
///
/// Protocol: [`new()`](Self::new), [`arg()`](Self::arg) per parameter, [`ret()`](Self::ret) for the result,
/// [`ptrcall()`](Self::ptrcall), [`RetSlot::get()`], [`free()`](Self::free). Dropping the frame frees it as well,
/// so every exit path returns the buffers. A frame is not `Send`; pointers handed to Godot stay valid until the frame
/// is modified or freed.
pub struct CallFrame {
    id: u64,
    buffers: FrameBuffers,
    has_ret: bool,
    _not_send: PhantomData<*const ()>,
}

impl CallFrame {
    /// Takes a frame from the pool, or allocates one. The frame is empty and its buffers are zeroed on growth.
    pub fn new() -> Self {
        let buffers = POOL
            .with(|pool| pool.borrow_mut().pop())
            .unwrap_or_default();

        let id = NEXT_FRAME_ID.with(|next| {
            let id = next.get();
            next.set(id.wrapping_add(1));
            id
        });

        Self {
            id,
            buffers,
            has_ret: false,
            _not_send: PhantomData,
        }
    }

    /// Appends one argument slot of `T::SLOT_WORDS` words and stores `value` in it.
    pub fn arg<T: GodotFfi>(&mut self, value: T) -> &mut Self {
        debug_assert!(std::mem::align_of::<T>() <= std::mem::align_of::<usize>());

        let offset = self.buffers.args.len();
        let width = T::SLOT_WORDS;
        self.buffers.args.resize(offset + width, 0);

        if width > 0 {
            // SAFETY: the slot spans `width` zeroed, word-aligned words, which is the encoded size of `T`.
            unsafe {
                let dst = self.buffers.args.as_mut_ptr().add(offset);
                value.write_sys(dst as sys::GDExtensionTypePtr);
            }
        }

        self.buffers.offsets.push(offset);
        self.buffers.widths.push(width);
        self
    }

    /// Pre-sizes the return region for a `T` and returns the token to read it after the call.
    pub fn ret<T: GodotFfi>(&mut self) -> RetSlot<T> {
        debug_assert!(!self.has_ret, "return slot requested twice for the same frame");

        self.buffers.ret.clear();
        self.buffers.ret.resize(T::SLOT_WORDS, 0);
        self.has_ret = true;

        RetSlot {
            frame_id: self.id,
            _marker: PhantomData,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.buffers.offsets.len()
    }

    /// Total argument size in words.
    pub fn words(&self) -> usize {
        self.buffers.args.len()
    }

    /// Word offset of each argument.
    pub fn arg_offsets(&self) -> &[usize] {
        &self.buffers.offsets
    }

    /// Width in words of each argument.
    pub fn arg_widths(&self) -> &[usize] {
        &self.buffers.widths
    }

    pub fn ret_words(&self) -> usize {
        self.buffers.ret.len()
    }

    /// Pointer to argument `index`, as passed to Godot.
    pub fn arg_ptr(&self, index: usize) -> sys::GDExtensionConstTypePtr {
        let offset = self.buffers.offsets[index];

        // SAFETY: offset is within (or one past, for zero-width slots) the argument buffer.
        unsafe { self.buffers.args.as_ptr().add(offset) as sys::GDExtensionConstTypePtr }
    }

    /// Reads argument `index` back as `T`.
    ///
    /// # Panics
    /// If `index` is out of range or the slot width does not match `T`.
    ///
    /// # Safety
    /// The slot must hold a valid encoding of `T`.
    pub unsafe fn read_arg<T: GodotFfi>(&self, index: usize) -> T {
        assert!(
            index < self.arg_count(),
            "argument index {index} out of range for frame with {} arguments",
            self.arg_count()
        );
        assert_eq!(
            self.buffers.widths[index],
            T::SLOT_WORDS,
            "argument {index} has a different width than {}",
            std::any::type_name::<T>()
        );

        T::from_sys(self.arg_ptr(index))
    }

    /// The `const GDExtensionConstTypePtr*` array: one pointer per argument slot.
    pub fn args_ptr(&mut self) -> *const sys::GDExtensionConstTypePtr {
        let base = self.buffers.args.as_ptr();
        let ptrs = &mut self.buffers.arg_ptrs;

        ptrs.clear();
        ptrs.extend(self.buffers.offsets.iter().map(|&offset| {
            // SAFETY: see `arg_ptr()`.
            unsafe { base.add(offset) as sys::GDExtensionConstTypePtr }
        }));

        ptrs.as_ptr()
    }

    /// Pointer to the return region, or null if the frame has no (or a zero-sized) return value.
    pub fn ret_ptr(&mut self) -> sys::GDExtensionTypePtr {
        if self.buffers.ret.is_empty() {
            std::ptr::null_mut()
        } else {
            self.buffers.ret.as_mut_ptr() as sys::GDExtensionTypePtr
        }
    }

    /// Compares the frame layout with the one a method declares.
    pub fn validate(&self, expected: &FrameSignature) -> Result<(), FrameMismatch> {
        if self.buffers.widths == expected.arg_words && self.ret_words() == expected.ret_words {
            Ok(())
        } else {
            Err(FrameMismatch {
                expected: expected.clone(),
                actual: FrameSignature {
                    arg_words: self.buffers.widths.clone(),
                    ret_words: self.ret_words(),
                },
            })
        }
    }

    /// Calls the method described by `entry` on `object` with this frame.
    ///
    /// When frame validation is enabled in the binding's config, a layout that differs from the method's declared
    /// one panics before Godot reads any argument.
    ///
    /// # Safety
    /// `object` must be a live object of the entry's class (or null for static methods), and every argument slot must
    /// hold what the engine method expects.
    pub unsafe fn ptrcall(
        &mut self,
        binding: &sys::Binding,
        entry: &MethodBindEntry,
        object: sys::GDExtensionObjectPtr,
    ) {
        if binding.config().validate_frames {
            if let Err(mismatch) = self.validate(entry.signature()) {
                panic!(
                    "{mismatch} in call to {}::{}",
                    entry.class_name(),
                    entry.method_name()
                );
            }
        }

        sys::out!(
            "ptrcall {}::{} ({} args, {} words)",
            entry.class_name(),
            entry.method_name(),
            self.arg_count(),
            self.words()
        );

        let args = self.args_ptr();
        let ret = self.ret_ptr();
        (binding.interface().object_method_bind_ptrcall)(entry.bind().as_ptr(), object, args, ret);
    }

    /// Returns the buffers to the pool. The frame cannot be used afterwards.
    pub fn free(self) {
        drop(self)
    }
}

impl Default for CallFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        let mut buffers = std::mem::take(&mut self.buffers);
        buffers.clear();

        // Pool may already be gone during thread teardown.
        let _ = POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < POOL_CAPACITY {
                pool.push(buffers);
            }
        });
    }
}

impl fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("arg_widths", &self.buffers.widths)
            .field("ret_words", &self.ret_words())
            .finish()
    }
}

/// Number of frames currently parked in this thread's pool.
#[doc(hidden)]
pub fn pooled_frame_count() -> usize {
    POOL.with(|pool| pool.borrow().len())
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Token for the return region of one frame.
pub struct RetSlot<T> {
    frame_id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: GodotFfi> RetSlot<T> {
    /// Reads the return value.
    ///
    /// # Panics
    /// If `frame` is not the frame this slot was requested from.
    ///
    /// # Safety
    /// The callee must have written a valid `T`, or left the zeroed region untouched with zero bits being valid for `T`.
    pub unsafe fn get(&self, frame: &CallFrame) -> T {
        assert_eq!(
            self.frame_id, frame.id,
            "return slot read from a different frame"
        );

        if T::SLOT_WORDS == 0 {
            return T::from_sys(std::ptr::null());
        }

        T::from_sys(frame.buffers.ret.as_ptr() as sys::GDExtensionConstTypePtr)
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Frame layout differs from a method's declared layout.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FrameMismatch {
    pub expected: FrameSignature,
    pub actual: FrameSignature,
}

impl fmt::Display for FrameMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame layout mismatch: expected args {:?} -> {} words, got args {:?} -> {} words",
            self.expected.arg_words,
            self.expected.ret_words,
            self.actual.arg_words,
            self.actual.ret_words
        )
    }
}

impl std::error::Error for FrameMismatch {}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RawCallable, RawObject};

    #[test]
    fn offsets_accumulate_widths() {
        let mut frame = CallFrame::new();
        frame
            .arg(true)
            .arg(RawCallable::null())
            .arg(7i32)
            .arg(2.5f64);

        assert_eq!(frame.arg_widths(), &[1, 2, 1, 1]);
        assert_eq!(frame.arg_offsets(), &[0, 1, 3, 4]);
        assert_eq!(frame.words(), 5);
    }

    #[test]
    fn values_read_back() {
        let obj = RawObject::from_ptr(0x1234 as sys::GDExtensionObjectPtr);

        let mut frame = CallFrame::new();
        frame.arg(false).arg(-3i32).arg(i64::MIN).arg(0.125f64).arg(obj);

        unsafe {
            assert!(!frame.read_arg::<bool>(0));
            assert_eq!(frame.read_arg::<i32>(1), -3);
            assert_eq!(frame.read_arg::<i64>(2), i64::MIN);
            assert_eq!(frame.read_arg::<f64>(3), 0.125);
            assert_eq!(frame.read_arg::<RawObject>(4), obj);
        }
    }

    #[test]
    fn args_ptr_points_into_slots() {
        let mut frame = CallFrame::new();
        frame.arg(11i64).arg(RawCallable::null()).arg(22i64);

        let args = frame.args_ptr();
        unsafe {
            assert_eq!(*(*args.add(0) as *const i64), 11);
            assert_eq!(*(*args.add(2) as *const i64), 22);
        }
    }

    #[test]
    fn ret_region_is_separate() {
        let mut frame = CallFrame::new();
        let ret = frame.ret::<f64>();
        frame.arg(1i64);

        assert_eq!(frame.words(), 1);
        assert_eq!(frame.ret_words(), 1);

        unsafe {
            *(frame.ret_ptr() as *mut f64) = 4.5;
            assert_eq!(ret.get(&frame), 4.5);
        }
    }

    #[test]
    fn unit_return_has_no_region() {
        let mut frame = CallFrame::new();
        let ret = frame.ret::<()>();

        assert!(frame.ret_ptr().is_null());
        unsafe { ret.get(&frame) };
    }

    #[test]
    #[should_panic(expected = "different frame")]
    fn ret_slot_bound_to_frame() {
        let mut a = CallFrame::new();
        let b = CallFrame::new();
        let ret = a.ret::<i64>();

        unsafe { ret.get(&b) };
    }

    #[test]
    #[should_panic(expected = "different width")]
    fn read_arg_checks_width() {
        let mut frame = CallFrame::new();
        frame.arg(RawCallable::null());

        unsafe { frame.read_arg::<i64>(0) };
    }

    #[test]
    fn freed_frame_is_reused_clean() {
        let mut first = CallFrame::new();
        first.arg(0x5555_5555i64).arg(0x6666_6666i64);
        first.ret::<i64>();
        first.free();

        let pooled = pooled_frame_count();
        assert!(pooled >= 1);

        let mut second = CallFrame::new();
        assert_eq!(pooled_frame_count(), pooled - 1);
        assert_eq!(second.words(), 0);
        assert_eq!(second.ret_words(), 0);

        second.arg(RawCallable::null());
        unsafe {
            // Previous contents must not shine through.
            assert_eq!(*(second.arg_ptr(0) as *const [usize; 2]), [0, 0]);
        }
    }

    #[test]
    fn validate_against_signature() {
        let mut frame = CallFrame::new();
        frame.arg(1i64).arg(RawCallable::null());
        let _ret = frame.ret::<bool>();

        let ok = FrameSignature {
            arg_words: vec![1, 2],
            ret_words: 1,
        };
        assert_eq!(frame.validate(&ok), Ok(()));

        let wrong = FrameSignature {
            arg_words: vec![1, 1],
            ret_words: 1,
        };
        let err = frame.validate(&wrong).unwrap_err();
        assert_eq!(err.actual, ok);
    }
}
