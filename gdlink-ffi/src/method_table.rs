/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::collections::HashMap;
use std::sync::OnceLock;

use crate as sys;
use crate::{ApiManifest, StringCache};

/// Engine-side function pointer of one class method, as returned by `classdb_get_method_bind`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ClassMethodBind(sys::GDExtensionMethodBindPtr);

impl ClassMethodBind {
    pub fn from_sys(ptr: sys::GDExtensionMethodBindPtr) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self(ptr))
        }
    }

    pub fn as_ptr(self) -> sys::GDExtensionMethodBindPtr {
        self.0
    }
}

// SAFETY: a method bind is an immutable engine-side descriptor. Calling through it is unsafe on its own and subject to
// the engine's threading rules; sharing the pointer value is not.
unsafe impl Send for ClassMethodBind {}
// SAFETY: see `Send` impl.
unsafe impl Sync for ClassMethodBind {}

/// Slot layout of one method's ptrcall, in machine words.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FrameSignature {
    pub arg_words: Vec<usize>,
    pub ret_words: usize,
}

/// Resolved method bind together with the declared frame layout.
#[derive(Clone, Debug)]
pub struct MethodBindEntry {
    class: String,
    method: String,
    hash: i64,
    bind: ClassMethodBind,
    signature: FrameSignature,
}

impl MethodBindEntry {
    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }

    pub fn hash(&self) -> i64 {
        self.hash
    }

    pub fn bind(&self) -> ClassMethodBind {
        self.bind
    }

    pub fn signature(&self) -> &FrameSignature {
        &self.signature
    }
}

/// All method binds of the manifest, resolved once during initialization.
///
/// Lookup is by class and method name. The table is immutable after [`load()`](Self::load).
#[derive(Default, Debug)]
pub struct MethodTable {
    classes: HashMap<String, HashMap<String, MethodBindEntry>>,
    len: usize,
}

impl MethodTable {
    /// Resolves every bindable method of `manifest`.
    ///
    /// Fails on the first method that the engine does not know under the given hash, which means that the
    /// manifest and the running engine are incompatible.
    pub fn load(
        interface: &sys::GDExtensionInterface,
        manifest: &ApiManifest,
    ) -> Result<Self, sys::InitError> {
        let mut string_names = StringCache::new(interface);
        let mut table = Self::default();

        // Classes without bindable methods are known too.
        for class in &manifest.classes {
            table.classes.entry(class.name.clone()).or_default();
        }

        for (class, method, hash) in manifest.bindable_methods() {
            let class_sname = string_names.fetch(&class.name);
            let method_sname = string_names.fetch(&method.name);

            // SAFETY: function pointer provided by Godot; both string names stay alive until the cache is dropped.
            let raw = unsafe { (interface.classdb_get_method_bind)(class_sname, method_sname, hash) };

            let Some(bind) = ClassMethodBind::from_sys(raw) else {
                return Err(sys::InitError::MethodNotFound {
                    class: class.name.clone(),
                    method: method.name.clone(),
                    hash,
                });
            };

            sys::out!("Loaded method bind {}::{} (hash {})", class.name, method.name, hash);

            table.insert(MethodBindEntry {
                class: class.name.clone(),
                method: method.name.clone(),
                hash,
                bind,
                signature: method.frame_signature(),
            });
        }

        Ok(table)
    }

    fn insert(&mut self, entry: MethodBindEntry) {
        let methods = self.classes.entry(entry.class.clone()).or_default();
        if methods.insert(entry.method.clone(), entry).is_none() {
            self.len += 1;
        }
    }

    pub fn get(&self, class: &str, method: &str) -> Option<&MethodBindEntry> {
        self.classes.get(class)?.get(method)
    }

    /// Whether `class` is part of the manifest the table was loaded from.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodBindEntry> {
        self.classes.values().flat_map(|methods| methods.values())
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Per-call-site cache of a method bind looked up in the installed binding's [`MethodTable`].
///
/// Intended as a `static` inside engine class wrappers: the table lookup happens on first use only.
pub struct MethodBindCache {
    class: &'static str,
    method: &'static str,
    entry: OnceLock<&'static MethodBindEntry>,
}

impl MethodBindCache {
    pub const fn new(class: &'static str, method: &'static str) -> Self {
        Self {
            class,
            method,
            entry: OnceLock::new(),
        }
    }

    /// Returns the entry, looking it up in `binding` on first use.
    ///
    /// # Panics
    /// If the method is not part of the loaded manifest. Wrappers and manifest are out of sync in that case.
    pub fn resolve(&self, binding: &'static sys::Binding) -> &'static MethodBindEntry {
        self.entry.get_or_init(|| {
            binding
                .method_table()
                .get(self.class, self.method)
                .unwrap_or_else(|| {
                    panic!(
                        "method {}::{} is not part of the loaded API manifest; \
                        make sure the manifest covers every class that gdlink wraps",
                        self.class, self.method
                    )
                })
        })
    }
}
