/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::meta::error::RegisterError;
use crate::registry::ClassRegistry;
use crate::{gd_error, sys};

pub use sys::{BindingConfig, InitLevel};

/// Classes of the library, registered with the engine while the `Scene` level is loaded.
static REGISTRY: sys::Global<ClassRegistry> = sys::Global::default();

#[doc(hidden)]
pub unsafe fn __gdlink_load_library<E: ExtensionLibrary>(
    get_proc_address: sys::GDExtensionInterfaceGetProcAddress,
    library: sys::GDExtensionClassLibraryPtr,
    init: *mut sys::GDExtensionInitialization,
) -> sys::GDExtensionBool {
    let init_code = || {
        // SAFETY: both pointers come straight from the engine's entry point call.
        let binding = unsafe { sys::initialize(get_proc_address, library, E::api_manifest(), E::config()) };

        if let Err(e) = binding {
            gd_error!("failed to load GDExtension library: {e}");
            return false as sys::GDExtensionBool;
        }

        let godot_init_params = sys::GDExtensionInitialization {
            minimum_initialization_level: E::min_level().to_sys(),
            userdata: std::ptr::null_mut(),
            initialize: Some(ffi_initialize_layer::<E>),
            deinitialize: Some(ffi_deinitialize_layer::<E>),
        };

        // SAFETY: the engine passes a writable initialization struct.
        unsafe { *init = godot_init_params };

        true as sys::GDExtensionBool
    };

    let ctx = || "error when loading GDExtension library";
    let is_success = crate::private::handle_panic(ctx, init_code);

    is_success.unwrap_or(0)
}

unsafe extern "C" fn ffi_initialize_layer<E: ExtensionLibrary>(
    _userdata: *mut std::ffi::c_void,
    init_level: sys::GDExtensionInitializationLevel,
) {
    let level = InitLevel::from_sys(init_level);
    let ctx = || format!("failed to initialize GDExtension level `{level:?}`");

    // Swallow panics.
    let _ = crate::private::handle_panic(ctx, || {
        gdlink_on_level_init::<E>(level);
        E::on_level_init(level);
    });
}

unsafe extern "C" fn ffi_deinitialize_layer<E: ExtensionLibrary>(
    _userdata: *mut std::ffi::c_void,
    init_level: sys::GDExtensionInitializationLevel,
) {
    let level = InitLevel::from_sys(init_level);
    let ctx = || format!("failed to deinitialize GDExtension level `{level:?}`");

    // Swallow panics.
    let _ = crate::private::handle_panic(ctx, || {
        E::on_level_deinit(level);
        gdlink_on_level_deinit(level);
    });
}

/// Tasks done internally upon loading an initialization level. Called before user code.
fn gdlink_on_level_init<E: ExtensionLibrary>(level: InitLevel) {
    sys::out!("Init level {level:?}");

    if level != InitLevel::Scene {
        return;
    }

    let mut registry = REGISTRY.lock();
    let result = E::register_classes(&mut registry).and_then(|()| registry.load_into_engine(sys::binding()));

    if let Err(e) = result {
        gd_error!("failed to register extension classes: {e}");
    }
}

/// Tasks done internally upon unloading an initialization level. Called after user code.
fn gdlink_on_level_deinit(level: InitLevel) {
    sys::out!("Deinit level {level:?}");

    if level != InitLevel::Scene {
        return;
    }

    // Classes of a later reload are registered from scratch.
    let mut registry = REGISTRY.lock();
    registry.unload(sys::binding());
    *registry = ClassRegistry::new();
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Defines the entry point for a GDExtension Rust library.
///
/// Every library should have exactly one implementation of this trait. It is always used in combination with the
/// `#[gdextension]` proc-macro attribute, which exports the C symbol the engine looks up.
///
/// ```ignore
/// struct MyExtension;
///
/// #[gdextension]
/// unsafe impl ExtensionLibrary for MyExtension {
///     fn register_classes(registry: &mut ClassRegistry) -> Result<(), RegisterError> {
///         registry.register::<MyEffect>()
///     }
/// }
/// ```
///
/// # Safety
/// The library cannot enforce any safety guarantees outside Rust code: engine objects can be freed by scripts or other
/// extensions at any time, which borrowed handles cannot detect.
pub unsafe trait ExtensionLibrary {
    /// JSON API manifest, describing classes and method hashes. Must not be newer than the running engine.
    fn api_manifest() -> &'static str {
        sys::BUILTIN_MANIFEST
    }

    /// Runtime settings of the binding.
    fn config() -> BindingConfig {
        BindingConfig::default()
    }

    /// Determines the initialization level at which the extension is loaded (`Scene` by default).
    fn min_level() -> InitLevel {
        InitLevel::Scene
    }

    /// Registers the classes of this library. Called once the `Scene` level is loaded.
    #[allow(unused_variables)]
    fn register_classes(registry: &mut ClassRegistry) -> Result<(), RegisterError> {
        Ok(())
    }

    /// Custom logic when a certain init-level of Godot is loaded.
    ///
    /// This will only be invoked for levels >= [`Self::min_level()`], in ascending order.
    #[allow(unused_variables)]
    fn on_level_init(level: InitLevel) {
        // Nothing by default.
    }

    /// Custom logic when a certain init-level of Godot is unloaded.
    ///
    /// This will only be invoked for levels >= [`Self::min_level()`], in descending order.
    #[allow(unused_variables)]
    fn on_level_deinit(level: InitLevel) {
        // Nothing by default.
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::classes::Node;
    use crate::obj::Base;
    use crate::registry::{ClassBuilder, ExtensionClass};
    use crate::sys::mock;

    static LEVEL_INITS: AtomicUsize = AtomicUsize::new(0);

    struct Spinner {
        _base: Base<Node>,
    }

    impl ExtensionClass for Spinner {
        type Base = Node;
        const CLASS_NAME: &'static str = "Spinner";

        fn init(base: Base<Node>) -> Self {
            Self { _base: base }
        }

        fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
            builder.on::<crate::classes::virtuals::node::Ready, _>(|_, ()| {})?;
            Ok(())
        }
    }

    struct SpinnerLibrary;

    unsafe impl ExtensionLibrary for SpinnerLibrary {
        fn register_classes(registry: &mut ClassRegistry) -> Result<(), RegisterError> {
            registry.register::<Spinner>()
        }

        fn on_level_init(_level: InitLevel) {
            LEVEL_INITS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn classes_live_while_scene_level_is_loaded() {
        let _session = mock::install();
        let inits_before = LEVEL_INITS.load(Ordering::SeqCst);

        for level in InitLevel::Editor.up_to() {
            unsafe { ffi_initialize_layer::<SpinnerLibrary>(std::ptr::null_mut(), level.to_sys()) };

            let expected = level >= InitLevel::Scene;
            assert_eq!(mock::is_extension_class_registered("Spinner"), expected, "{level:?}");
        }
        assert_eq!(LEVEL_INITS.load(Ordering::SeqCst), inits_before + 4);

        let object = mock::construct("Spinner");
        assert_eq!(mock::object_class(object).as_deref(), Some("Spinner"));
        mock::destroy(object);

        for level in InitLevel::Editor.up_to().rev() {
            unsafe { ffi_deinitialize_layer::<SpinnerLibrary>(std::ptr::null_mut(), level.to_sys()) };

            let expected = level > InitLevel::Scene;
            assert_eq!(mock::is_extension_class_registered("Spinner"), expected, "{level:?}");
        }

        assert!(REGISTRY.lock().is_empty());
        assert!(mock::log().is_empty());
    }

    #[test]
    fn second_load_is_rejected() {
        let _session = mock::install();

        let mut init = sys::GDExtensionInitialization {
            minimum_initialization_level: 0,
            userdata: std::ptr::null_mut(),
            initialize: None,
            deinitialize: None,
        };

        // The mock session already installed a binding.
        let ok = unsafe {
            __gdlink_load_library::<SpinnerLibrary>(mock::get_proc_address(), mock::library(), &mut init)
        };

        assert_eq!(ok, 0);
        assert!(init.initialize.is_none());
    }
}
