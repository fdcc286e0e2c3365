/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Meta-information about types and calls: conversions to frame representations, parameter tuples, signatures.

pub mod error;

mod param_tuple;
mod raw_ptr;
mod signature;
mod traits;

pub use param_tuple::{InParamTuple, OutParamTuple, ParamTuple};
pub use raw_ptr::{FfiRawPointer, RawPtr};
pub use signature::Signature;
pub use traits::{FromGodot, GodotConvert, ToGodot};

#[doc(hidden)]
pub use signature::FromOrToVia;
