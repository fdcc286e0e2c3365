/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::sync::OnceLock;
use std::thread::ThreadId;

use crate as sys;
use crate::{ApiManifest, GDExtensionInterface, GodotVersion, ManifestError, MethodTable};

/// Runtime settings of a binding, provided by the extension library.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BindingConfig {
    /// Compare every call frame with the method's declared layout before the ptrcall.
    pub validate_frames: bool,

    /// Panic when the binding is accessed from a thread other than the one that initialized it.
    ///
    /// Always off with the `experimental-threads` feature.
    pub thread_checks: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            validate_frames: cfg!(debug_assertions),
            thread_checks: !cfg!(feature = "experimental-threads"),
        }
    }
}

/// Everything loaded from Godot during initialization: interface functions, library pointer, method binds.
///
/// Built once by [`Binding::load()`] and immutable afterwards.
pub struct Binding {
    interface: GDExtensionInterface,
    library: ClassLibraryPtr,
    method_table: MethodTable,
    runtime_version: GodotVersion,
    config: BindingConfig,
    main_thread: ThreadId,
}

impl Binding {
    /// Loads the interface, checks version compatibility and resolves all method binds of `manifest`.
    ///
    /// # Safety
    /// `get_proc_address` must be the function passed by Godot to the entry point (or a faithful stand-in), and
    /// `library` the library pointer passed alongside.
    pub unsafe fn load(
        get_proc_address: sys::GDExtensionInterfaceGetProcAddress,
        library: sys::GDExtensionClassLibraryPtr,
        manifest: &ApiManifest,
        config: BindingConfig,
    ) -> Result<Self, InitError> {
        let get_proc_address = get_proc_address.ok_or(InitError::NullProcAddress)?;
        let interface = GDExtensionInterface::load(get_proc_address)?;

        // Runtime must not be older than the API the manifest describes. Lexicographical tuple comparison does that.
        let runtime_version = GodotVersion::query(&interface);
        if runtime_version.triple() < manifest.version() {
            return Err(InitError::IncompatibleVersion {
                manifest: manifest.version(),
                runtime: runtime_version.full_string,
            });
        }

        sys::out!("Initialize gdlink binding for {runtime_version}");

        let method_table = MethodTable::load(&interface, manifest)?;

        Ok(Self {
            interface,
            library: ClassLibraryPtr(library),
            method_table,
            runtime_version,
            config,
            main_thread: std::thread::current().id(),
        })
    }

    pub fn interface(&self) -> &GDExtensionInterface {
        &self.interface
    }

    pub fn library(&self) -> sys::GDExtensionClassLibraryPtr {
        self.library.0
    }

    pub fn method_table(&self) -> &MethodTable {
        &self.method_table
    }

    pub fn runtime_version(&self) -> &GodotVersion {
        &self.runtime_version
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn is_main_thread(&self) -> bool {
        std::thread::current().id() == self.main_thread
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("runtime_version", &self.runtime_version)
            .field("method_binds", &self.method_table.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Newtype around `GDExtensionClassLibraryPtr` so we can implement `Sync` and `Send` manually for this.
struct ClassLibraryPtr(sys::GDExtensionClassLibraryPtr);

// SAFETY: This implementation of `Sync` and `Send` does not guarantee that reading from or writing to the pointer is actually
// thread safe. It merely means we can send/share the pointer itself between threads. Which is safe since any place that actually
// reads/writes to this pointer must ensure they do so in a thread safe manner.
unsafe impl Sync for ClassLibraryPtr {}
// SAFETY: See `Sync` impl safety doc.
unsafe impl Send for ClassLibraryPtr {}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Global storage

static BINDING: OnceLock<Binding> = OnceLock::new();

/// Loads a binding and installs it as the process-wide one.
///
/// # Safety
/// See [`Binding::load()`].
pub unsafe fn initialize(
    get_proc_address: sys::GDExtensionInterfaceGetProcAddress,
    library: sys::GDExtensionClassLibraryPtr,
    manifest_json: &str,
    config: BindingConfig,
) -> Result<&'static Binding, InitError> {
    if is_initialized() {
        return Err(InitError::AlreadyInitialized);
    }

    let manifest = ApiManifest::parse(manifest_json)?;
    let binding = Binding::load(get_proc_address, library, &manifest, config)?;

    install(binding)
}

/// Installs an already loaded binding. Write-once: a second call fails.
pub fn install(binding: Binding) -> Result<&'static Binding, InitError> {
    BINDING
        .set(binding)
        .map_err(|_rejected| InitError::AlreadyInitialized)?;

    BINDING.get().ok_or(InitError::AlreadyInitialized)
}

pub fn is_initialized() -> bool {
    BINDING.get().is_some()
}

/// The installed binding, or `None` before initialization.
///
/// Performs no thread check.
pub fn try_binding() -> Option<&'static Binding> {
    BINDING.get()
}

/// The installed binding.
///
/// # Panics
/// - If no binding is installed yet.
/// - If thread checks are enabled and this is not the thread that loaded the binding.
#[inline]
pub fn binding() -> &'static Binding {
    let Some(binding) = BINDING.get() else {
        panic!("Godot engine not available; make sure you are not calling it from unit/doc tests");
    };

    if cfg!(not(feature = "experimental-threads"))
        && binding.config.thread_checks
        && !binding.is_main_thread()
    {
        panic!(
            "attempted to access binding from different thread than main thread; this is UB - use the \"experimental-threads\" feature."
        );
    }

    binding
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Errors

/// Failure to set up the binding.
#[derive(Debug)]
pub enum InitError {
    NullProcAddress,
    AlreadyInitialized,
    MissingInterfaceFn {
        name: &'static str,
    },
    IncompatibleVersion {
        manifest: (u8, u8, u8),
        runtime: String,
    },
    Manifest(ManifestError),
    MethodNotFound {
        class: String,
        method: String,
        hash: i64,
    },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullProcAddress => write!(f, "get_proc_address unexpectedly null"),
            Self::AlreadyInitialized => write!(f, "gdlink binding is already initialized"),
            Self::MissingInterfaceFn { name } => {
                write!(f, "Godot does not provide interface function `{name}`")
            }
            Self::IncompatibleVersion { manifest, runtime } => {
                let (major, minor, patch) = manifest;
                write!(
                    f,
                    "API manifest targets Godot {major}.{minor}.{patch}, \
                    but loaded by older Godot binary, with version: {runtime}"
                )
            }
            Self::Manifest(e) => write!(f, "{e}"),
            Self::MethodNotFound {
                class,
                method,
                hash,
            } => write!(
                f,
                "failed to load class method {class}::{method} (hash {hash}); \
                make sure the API manifest matches the running Godot version"
            ),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Manifest(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ManifestError> for InitError {
    fn from(e: ManifestError) -> Self {
        Self::Manifest(e)
    }
}
