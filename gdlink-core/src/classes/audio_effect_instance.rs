/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::ffi::c_void;

use crate::builtin::AudioFrame;
use crate::classes::{engine_class, Object, RefCounted};
use crate::meta::RawPtr;

engine_class! {
    /// Processing state of an audio effect on one bus. Extension classes override its virtuals to implement effects.
    class AudioEffectInstance: RefCounted, Object;

    virtuals {
        /// Processes `frame_count` frames from `src_buffer` into `dst_buffer`.
        fn _process as Process(src_buffer: RawPtr<*const c_void>, dst_buffer: RawPtr<*mut AudioFrame>, frame_count: i32);

        /// Whether `_process` should still be called while the bus is silent.
        fn _process_silence as ProcessSilence() -> bool;
    }
}
