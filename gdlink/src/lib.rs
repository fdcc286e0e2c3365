/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! # Typed marshaling between Rust and Godot 4
//!
//! gdlink sits between Rust code and the GDExtension C interface of Godot 4. It provides:
//!
//! * **Handles** ([`obj::Handle`]) that record whether Rust owns, borrows or shares an engine value, so that every
//!   value is released exactly once. Handles can be tracked in a [`obj::HandleArena`] and grouped in a
//!   [`obj::Lifetime`] scope that releases them all at its end.
//! * **Call frames** ([`sys::CallFrame`]) that lay out the arguments of a ptrcall in the engine's native encoding.
//! * **Virtual dispatch**: extension classes register overrides for engine virtual methods through
//!   [`registry::ClassBuilder`]; the engine then calls into Rust through a single trampoline.
//! * **Variants and callables**: [`builtin::Variant`] converts values in and out of the engine's dynamic type, and
//!   [`builtin::Callable::from_fn()`] hands Rust closures to the engine, e.g. for signals.
//!
//! ## Cargo features
//!
//! * **`experimental-threads`**: disables the check that the engine is only accessed from the main thread.
//! * **`serde`**: `Serialize`/`Deserialize` for builtin value types and [`obj::InstanceId`].
//!
//! ## Example
//!
//! ```no_run
//! use gdlink::prelude::*;
//!
//! struct Gain {
//!     _base: Base<AudioEffectInstance>,
//! }
//!
//! impl ExtensionClass for Gain {
//!     type Base = AudioEffectInstance;
//!     const CLASS_NAME: &'static str = "Gain";
//!
//!     fn init(base: Base<AudioEffectInstance>) -> Self {
//!         Self { _base: base }
//!     }
//!
//!     fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
//!         builder.on::<audio_effect_instance::ProcessSilence, _>(|_, ()| false)?;
//!         Ok(())
//!     }
//! }
//!
//! struct MyExtension;
//!
//! #[gdextension]
//! unsafe impl ExtensionLibrary for MyExtension {
//!     fn register_classes(registry: &mut ClassRegistry) -> Result<(), RegisterError> {
//!         registry.register::<Gain>()
//!     }
//! }
//! ```

#[doc(inline)]
pub use gdlink_core::{builtin, classes, log, meta, obj, registry};

#[doc(hidden)]
pub use gdlink_core::sys;

/// Entry point and global init/shutdown of the library.
pub mod init {
    pub use gdlink_core::init::*;

    // Re-exports
    pub use gdlink_macros::gdextension;
}

#[doc(hidden)]
pub use gdlink_core::private;

/// Often-imported symbols.
pub mod prelude;
