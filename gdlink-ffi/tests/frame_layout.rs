/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Layout properties of call frames, for arbitrary argument sequences.

use gdlink_ffi::{CallFrame, GodotFfi, RawCallable, RawObject, RawPackedByteArray, RawString};
use proptest::collection::vec;
use proptest::prelude::*;

#[derive(Copy, Clone, Debug)]
enum Arg {
    Bool(bool),
    Int(i64),
    Int32(i32),
    Float(f64),
    Object,
    String,
    Callable,
    Bytes,
}

impl Arg {
    fn push(self, frame: &mut CallFrame) {
        match self {
            Arg::Bool(v) => frame.arg(v),
            Arg::Int(v) => frame.arg(v),
            Arg::Int32(v) => frame.arg(v),
            Arg::Float(v) => frame.arg(v),
            Arg::Object => frame.arg(RawObject::null()),
            Arg::String => frame.arg(RawString::null()),
            Arg::Callable => frame.arg(RawCallable::null()),
            Arg::Bytes => frame.arg(RawPackedByteArray::null()),
        };
    }

    fn words(self) -> usize {
        match self {
            Arg::Bool(_) => bool::SLOT_WORDS,
            Arg::Int(_) => i64::SLOT_WORDS,
            Arg::Int32(_) => i32::SLOT_WORDS,
            Arg::Float(_) => f64::SLOT_WORDS,
            Arg::Object => RawObject::SLOT_WORDS,
            Arg::String => RawString::SLOT_WORDS,
            Arg::Callable => RawCallable::SLOT_WORDS,
            Arg::Bytes => RawPackedByteArray::SLOT_WORDS,
        }
    }

    /// Checks that the slot at `index` holds this argument.
    fn check(self, frame: &CallFrame, index: usize) -> bool {
        unsafe {
            match self {
                Arg::Bool(v) => frame.read_arg::<bool>(index) == v,
                Arg::Int(v) => frame.read_arg::<i64>(index) == v,
                Arg::Int32(v) => frame.read_arg::<i32>(index) == v,
                Arg::Float(v) => frame.read_arg::<f64>(index).to_bits() == v.to_bits(),
                Arg::Object => frame.read_arg::<RawObject>(index).is_null(),
                Arg::String => frame.read_arg::<RawString>(index).is_null(),
                Arg::Callable => frame.read_arg::<RawCallable>(index).is_null(),
                Arg::Bytes => frame.read_arg::<RawPackedByteArray>(index).is_null(),
            }
        }
    }
}

fn arbitrary_arg() -> impl Strategy<Value = Arg> {
    prop_oneof![
        any::<bool>().prop_map(Arg::Bool),
        any::<i64>().prop_map(Arg::Int),
        any::<i32>().prop_map(Arg::Int32),
        any::<f64>().prop_map(Arg::Float),
        Just(Arg::Object),
        Just(Arg::String),
        Just(Arg::Callable),
        Just(Arg::Bytes),
    ]
}

proptest! {
    #[test]
    fn offsets_are_prefix_sums(args in vec(arbitrary_arg(), 0..12)) {
        let mut frame = CallFrame::new();
        for arg in &args {
            arg.push(&mut frame);
        }

        let mut expected_offset = 0;
        for (i, arg) in args.iter().enumerate() {
            prop_assert_eq!(frame.arg_offsets()[i], expected_offset);
            prop_assert_eq!(frame.arg_widths()[i], arg.words());
            expected_offset += arg.words();
        }
        prop_assert_eq!(frame.words(), expected_offset);
        prop_assert_eq!(frame.arg_count(), args.len());
    }

    #[test]
    fn args_read_back(args in vec(arbitrary_arg(), 1..12)) {
        let mut frame = CallFrame::new();
        for arg in &args {
            arg.push(&mut frame);
        }

        for (i, arg) in args.iter().enumerate() {
            prop_assert!(arg.check(&frame, i), "argument {} ({:?}) changed", i, arg);
        }
    }

    #[test]
    fn pointer_array_matches_offsets(args in vec(arbitrary_arg(), 1..12)) {
        let mut frame = CallFrame::new();
        for arg in &args {
            arg.push(&mut frame);
        }

        let ptrs = frame.args_ptr();
        for i in 0..args.len() {
            let ptr = unsafe { *ptrs.add(i) };
            prop_assert_eq!(ptr, frame.arg_ptr(i));
        }
    }

    #[test]
    fn reused_frame_starts_empty(first in vec(arbitrary_arg(), 1..8), second in vec(arbitrary_arg(), 0..8)) {
        let mut frame = CallFrame::new();
        for arg in &first {
            arg.push(&mut frame);
        }
        frame.free();

        let mut frame = CallFrame::new();
        prop_assert_eq!(frame.words(), 0);
        prop_assert_eq!(frame.ret_words(), 0);

        for arg in &second {
            arg.push(&mut frame);
        }
        prop_assert_eq!(frame.arg_count(), second.len());
    }
}
