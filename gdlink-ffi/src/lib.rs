/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! # Internal crate of [**gdlink**](https://docs.rs/gdlink)
//!
//! Do not depend on this crate directly, instead use the `gdlink` crate.
//! No SemVer or other guarantees are provided.
//!
//! Contains the low-level GDExtension ABI: C types, the interface function table, the process-wide binding,
//! method binds resolved from the API manifest, and call frames used to marshal ptrcall arguments.

#[allow(non_camel_case_types, non_upper_case_globals, non_snake_case)]
mod gdextension_interface;

mod toolbox;

mod api_manifest;
mod binding;
mod call_frame;
mod global;
mod godot_ffi;
mod init_level;
mod interface;
mod method_table;
mod opaque;
mod string_cache;
mod variant_type;

#[cfg(any(test, feature = "mock-engine"))]
pub mod mock;

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Public re-exports

pub use gdextension_interface::*;

pub use api_manifest::{
    slot_words_for_type, ApiManifest, ManifestArgument, ManifestClass, ManifestError, ManifestHeader, ManifestMethod,
    ManifestReturn, ManifestSingleton, BUILTIN_MANIFEST,
};
pub use binding::{binding, initialize, install, is_initialized, try_binding, Binding, BindingConfig, InitError};
pub use call_frame::{pooled_frame_count, CallFrame, FrameMismatch, RetSlot};
pub use global::{Global, GlobalGuard};
pub use godot_ffi::{GodotFfi, PtrcallType};
pub use init_level::InitLevel;
pub use interface::{GDExtensionInterface, GetProcAddressFn, GodotVersion};
pub use method_table::{ClassMethodBind, FrameSignature, MethodBindCache, MethodBindEntry, MethodTable};
pub use opaque::{
    Opaque, OpaqueArray, OpaqueCallable, OpaqueDictionary, OpaquePackedByteArray, OpaqueString, OpaqueStringName,
    OpaqueVariant, RawArray, RawCallable, RawDictionary, RawObject, RawPackedByteArray, RawString, RawStringName,
    RawVariant,
};
pub use string_cache::{new_string, new_string_name, string_name_to_rust, string_to_rust, StringCache};
pub use toolbox::slot_words;
pub use variant_type::VariantType;
