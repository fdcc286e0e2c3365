/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Registration of extension classes, and dispatch of engine virtual calls to Rust overrides.

mod callbacks;
mod class;
mod class_db;
pub(crate) mod storage;

pub use class::{ClassBuilder, ClassRegistry, ExtensionClass, VirtualMethod};
pub use class_db::ClassInfo;
