/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::marker::PhantomData;

use crate::builtin::StringName;
use crate::meta::error::RegisterError;
use crate::meta::{InParamTuple, Signature, ToGodot};
use crate::obj::{Base, EngineClass, Inherits};
use crate::registry::storage::as_storage;
use crate::registry::{callbacks, ClassInfo};
use crate::{gd_error, sys};

/// Class defined in Rust, registered with the engine as subclass of an engine class.
///
/// ```ignore
/// struct Foo {
///     base: Base<AudioEffectInstance>,
/// }
///
/// impl ExtensionClass for Foo {
///     type Base = AudioEffectInstance;
///     const CLASS_NAME: &'static str = "Foo";
///
///     fn init(base: Base<AudioEffectInstance>) -> Self {
///         Self { base }
///     }
///
///     fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
///         builder.on::<audio_effect_instance::Process, _>(|this, (src, dst, frame_count)| { /* ... */ })?;
///         Ok(())
///     }
/// }
/// ```
pub trait ExtensionClass: Sized + 'static {
    /// Engine class this class extends.
    type Base: EngineClass;

    /// Name under which the engine knows the class.
    const CLASS_NAME: &'static str;

    /// Creates the Rust part of a new instance, once the engine has allocated the base object.
    fn init(base: Base<Self::Base>) -> Self;

    /// Declares virtual method overrides.
    fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
        let _ = builder;
        Ok(())
    }
}

/// Virtual method of an engine class, as marker type. Declared in the `virtuals` modules of [`classes`](crate::classes).
pub trait VirtualMethod: 'static {
    /// Class declaring the method.
    type Class: EngineClass;

    /// Parameter tuple, in declaration order.
    type Params: InParamTuple;

    type Ret: ToGodot;

    /// Name the engine asks for, e.g. `"_process"`.
    const NAME: &'static str;

    /// Slot in the virtual table of `Class` and all its subclasses.
    const INDEX: usize;
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

type ErasedVirtualFn =
    dyn Fn(sys::GDExtensionClassInstancePtr, *const sys::GDExtensionConstTypePtr, sys::GDExtensionTypePtr) + Send + Sync;

/// Override of one virtual method, invoked through the engine's `call_virtual_with_data`.
pub(crate) struct VirtualEntry {
    class_name: &'static str,
    method_name: &'static str,
    call: Box<ErasedVirtualFn>,
}

impl VirtualEntry {
    pub fn class_name(&self) -> &'static str {
        self.class_name
    }

    pub fn method_name(&self) -> &'static str {
        self.method_name
    }

    /// # Safety
    /// `instance` must be a live instance of the class this entry belongs to; `args` and `ret` must match the method.
    pub unsafe fn invoke(
        &self,
        instance: sys::GDExtensionClassInstancePtr,
        args: *const sys::GDExtensionConstTypePtr,
        ret: sys::GDExtensionTypePtr,
    ) {
        (self.call)(instance, args, ret)
    }
}

/// Collects the virtual method overrides of one extension class.
///
/// The table has one slot per virtual method of the base class chain (see [`ClassInfo::virtual_total()`]), so each
/// slot holds at most one override.
pub struct ClassBuilder<T: ExtensionClass> {
    virtuals: Vec<Option<VirtualEntry>>,
    _class: PhantomData<fn() -> T>,
}

impl<T: ExtensionClass> ClassBuilder<T> {
    fn new() -> Self {
        let slots = <T::Base as EngineClass>::CLASS_INFO.virtual_total();

        Self {
            virtuals: std::iter::repeat_with(|| None).take(slots).collect(),
            _class: PhantomData,
        }
    }

    /// Overrides virtual method `M` with `f`.
    ///
    /// `M` must be declared by the base class or one of its ancestors, which is checked at compile time. Overriding
    /// the same method twice is an error.
    pub fn on<M, F>(&mut self, f: F) -> Result<&mut Self, RegisterError>
    where
        M: VirtualMethod,
        T::Base: Inherits<M::Class>,
        F: Fn(&mut T, M::Params) -> M::Ret + Send + Sync + 'static,
    {
        let slot = &mut self.virtuals[M::INDEX];
        if slot.is_some() {
            return Err(RegisterError::DuplicateVirtual {
                class: T::CLASS_NAME,
                method: M::NAME,
            });
        }

        let call = move |instance: sys::GDExtensionClassInstancePtr,
                         args: *const sys::GDExtensionConstTypePtr,
                         ret: sys::GDExtensionTypePtr| {
            // SAFETY: the engine passes back the instance pointer of a live `T`.
            let storage = unsafe { as_storage::<T>(instance) };

            let mut guard = match storage.get_mut() {
                Ok(guard) => guard,
                Err(err) => {
                    gd_error!(
                        "{}::{} skipped: instance is already bound ({err}); use base_mut() for calls that re-enter it",
                        T::CLASS_NAME,
                        M::NAME
                    );
                    return;
                }
            };

            // SAFETY: `args` and `ret` follow the signature of `M`, as declared by the engine.
            unsafe {
                Signature::<M::Params, M::Ret>::in_ptrcall(args, ret, |params| f(&mut *guard, params));
            }
        };

        sys::out!("register virtual {}::{} in slot {}", T::CLASS_NAME, M::NAME, M::INDEX);
        *slot = Some(VirtualEntry {
            class_name: T::CLASS_NAME,
            method_name: M::NAME,
            call: Box::new(call),
        });

        Ok(self)
    }

    /// Number of virtual methods overridden so far.
    pub fn override_count(&self) -> usize {
        self.virtuals.iter().flatten().count()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Everything the engine callbacks need to know about one class. Boxed, so that its address can be class userdata.
pub(crate) struct ClassEntry {
    name: &'static str,
    base: &'static ClassInfo,
    virtuals: Box<[Option<VirtualEntry>]>,
    create_instance_func: sys::GDExtensionClassCreateInstance,
    free_instance_func: sys::GDExtensionClassFreeInstance,
}

impl ClassEntry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Override for virtual method `method_name`, resolved along the base chain.
    pub fn find_virtual(&self, method_name: &str) -> Option<&VirtualEntry> {
        let index = self.base.resolve_virtual(method_name)?;
        self.virtuals.get(index)?.as_ref()
    }
}

/// Extension classes of a library, and their registration with the engine.
///
/// Classes go through two steps: [`register()`](Self::register) collects a class and its overrides (once per class),
/// [`load_into_engine()`](Self::load_into_engine) hands all of them to the engine. Unloading happens in reverse order,
/// on [`unload()`](Self::unload) or drop.
#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<Box<ClassEntry>>,
    loaded: bool,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers class `T` with its overrides from [`ExtensionClass::register()`].
    pub fn register<T: ExtensionClass>(&mut self) -> Result<(), RegisterError> {
        if self.is_registered(T::CLASS_NAME) {
            return Err(RegisterError::AlreadyRegistered { class: T::CLASS_NAME });
        }
        if self.loaded {
            return Err(RegisterError::AlreadyLoaded);
        }

        let mut builder = ClassBuilder::<T>::new();
        T::register(&mut builder)?;

        sys::out!(
            "register class {} (base {}, {} overrides)",
            T::CLASS_NAME,
            <T::Base as EngineClass>::class_name(),
            builder.override_count()
        );

        self.classes.push(Box::new(ClassEntry {
            name: T::CLASS_NAME,
            base: <T::Base as EngineClass>::CLASS_INFO,
            virtuals: builder.virtuals.into_boxed_slice(),
            create_instance_func: Some(callbacks::create::<T>),
            free_instance_func: Some(callbacks::free::<T>),
        }));

        Ok(())
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.classes.iter().any(|entry| entry.name == class_name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.classes.iter().map(|entry| entry.name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Registers all classes with the engine, in registration order.
    ///
    /// Base classes must be part of the loaded API manifest.
    pub fn load_into_engine(&mut self, binding: &sys::Binding) -> Result<(), RegisterError> {
        if self.loaded {
            return Err(RegisterError::AlreadyLoaded);
        }

        if let Some(entry) = self
            .classes
            .iter()
            .find(|entry| !binding.method_table().has_class(entry.base.name()))
        {
            return Err(RegisterError::UnknownClass {
                class: entry.base.name().to_string(),
            });
        }

        for entry in &self.classes {
            let info = creation_info(entry);
            let class_name = StringName::from_str(entry.name);
            let parent_name = StringName::from_str(entry.base.name());

            sys::out!("load class {} into engine", entry.name);

            // SAFETY: the creation info is copied by the engine; `class_userdata` points to the boxed entry, which stays
            // at the same address until the class is unloaded.
            unsafe {
                (binding.interface().classdb_register_extension_class3)(
                    binding.library(),
                    class_name.raw().sys(),
                    parent_name.raw().sys(),
                    &info,
                );
            }
        }

        self.loaded = true;
        Ok(())
    }

    /// Unregisters all classes from the engine, in reverse order. No-op if not loaded.
    pub fn unload(&mut self, binding: &sys::Binding) {
        if !self.loaded {
            return;
        }

        for entry in self.classes.iter().rev() {
            let class_name = StringName::from_str(entry.name);

            sys::out!("unload class {}", entry.name);

            // SAFETY: the class was registered by `load_into_engine()`.
            unsafe {
                (binding.interface().classdb_unregister_extension_class)(binding.library(), class_name.raw().sys());
            }
        }

        self.loaded = false;
    }
}

impl Drop for ClassRegistry {
    fn drop(&mut self) {
        // Class userdata must not dangle.
        if let Some(binding) = sys::try_binding() {
            self.unload(binding);
        }
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.classes.iter().map(|e| e.name).collect::<Vec<_>>())
            .field("loaded", &self.loaded)
            .finish()
    }
}

fn creation_info(entry: &ClassEntry) -> sys::GDExtensionClassCreationInfo3 {
    sys::GDExtensionClassCreationInfo3 {
        is_virtual: false as sys::GDExtensionBool,
        is_abstract: false as sys::GDExtensionBool,
        is_exposed: true as sys::GDExtensionBool,
        is_runtime: false as sys::GDExtensionBool,
        set_func: None,
        get_func: None,
        get_property_list_func: None,
        free_property_list_func: None,
        property_can_revert_func: None,
        property_get_revert_func: None,
        validate_property_func: None,
        notification_func: None,
        to_string_func: None,
        reference_func: None,
        unreference_func: None,
        create_instance_func: entry.create_instance_func,
        free_instance_func: entry.free_instance_func,
        recreate_instance_func: None,
        get_virtual_func: None,
        get_virtual_call_data_func: Some(callbacks::get_virtual_call_data),
        call_virtual_with_data_func: Some(callbacks::call_virtual_with_data),
        get_rid_func: None,
        class_userdata: entry as *const ClassEntry as *mut std::ffi::c_void,
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use super::*;
    use crate::builtin::AudioFrame;
    use crate::classes::virtuals::audio_effect_instance::{Process, ProcessSilence};
    use crate::classes::{engine_class, AudioEffectInstance, Object};
    use crate::meta::RawPtr;
    use crate::obj::WithBaseField;
    use crate::sys::mock;

    static FRAMES_SEEN: AtomicI64 = AtomicI64::new(0);
    static PROCESS_CALLS: AtomicUsize = AtomicUsize::new(0);
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Foo {
        base: Base<AudioEffectInstance>,
        gain: f32,
    }

    impl ExtensionClass for Foo {
        type Base = AudioEffectInstance;
        const CLASS_NAME: &'static str = "Foo";

        fn init(base: Base<AudioEffectInstance>) -> Self {
            Self { base, gain: 0.5 }
        }

        fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
            builder.on::<Process, _>(|this, (_src, dst, frame_count)| {
                PROCESS_CALLS.fetch_add(1, Ordering::SeqCst);
                FRAMES_SEEN.store(frame_count as i64, Ordering::SeqCst);

                // SAFETY: the caller passes `frame_count` writable frames.
                let frames = unsafe { std::slice::from_raw_parts_mut(dst.ptr(), frame_count as usize) };
                for frame in frames {
                    *frame = AudioFrame::new(this.gain, -this.gain);
                }
            })?;
            Ok(())
        }
    }

    impl Drop for Foo {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Calls `_process` like the audio server does.
    fn call_process(object: sys::GDExtensionObjectPtr, frames: &mut [AudioFrame]) -> bool {
        let mut frame = sys::CallFrame::new();
        unsafe {
            frame
                .arg(RawPtr::<*const c_void>::null())
                .arg(RawPtr::new(frames.as_mut_ptr()))
                .arg(frames.len() as i64);
        }

        let args = frame.args_ptr();
        let ret = frame.ret_ptr();
        unsafe { mock::call_virtual(object, "_process", args, ret) }
    }

    #[test]
    fn virtual_override_is_dispatched() {
        let _session = mock::install();
        let before = mock::stats();

        let mut registry = ClassRegistry::new();
        registry.register::<Foo>().unwrap();
        registry.load_into_engine(sys::binding()).unwrap();
        assert!(mock::is_extension_class_registered("Foo"));

        let object = mock::construct("Foo");
        assert!(!object.is_null());
        assert_eq!(mock::object_class(object).as_deref(), Some("Foo"));

        let calls_before = PROCESS_CALLS.load(Ordering::SeqCst);
        let mut frames = [AudioFrame::default(); 128];
        assert!(call_process(object, &mut frames));

        assert_eq!(PROCESS_CALLS.load(Ordering::SeqCst), calls_before + 1);
        assert_eq!(FRAMES_SEEN.load(Ordering::SeqCst), 128);
        assert!(frames.iter().all(|f| *f == AudioFrame::new(0.5, -0.5)));

        // Not overridden: the engine keeps its default.
        let mut frame = sys::CallFrame::new();
        let ret_slot = frame.ret::<bool>();
        let args = frame.args_ptr();
        let ret = frame.ret_ptr();
        assert!(!unsafe { mock::call_virtual(object, "_process_silence", args, ret) });
        assert!(!unsafe { ret_slot.get(&frame) });

        let drops_before = DROPS.load(Ordering::SeqCst);
        mock::destroy(object);
        assert_eq!(DROPS.load(Ordering::SeqCst), drops_before + 1);

        let after = mock::stats();
        assert_eq!(after.instances_created - before.instances_created, 1);
        assert_eq!(after.instances_freed - before.instances_freed, 1);

        registry.unload(sys::binding());
        assert!(!mock::is_extension_class_registered("Foo"));
    }

    #[test]
    fn registration_errors() {
        let _session = mock::install();

        let mut registry = ClassRegistry::new();
        registry.register::<Foo>().unwrap();
        assert_eq!(
            registry.register::<Foo>(),
            Err(RegisterError::AlreadyRegistered { class: "Foo" })
        );

        registry.load_into_engine(sys::binding()).unwrap();
        assert_eq!(
            registry.load_into_engine(sys::binding()),
            Err(RegisterError::AlreadyLoaded)
        );
        assert_eq!(registry.class_names().collect::<Vec<_>>(), ["Foo"]);

        // Dropping unloads.
        drop(registry);
        assert!(!mock::is_extension_class_registered("Foo"));
    }

    struct Doubled {
        _base: Base<AudioEffectInstance>,
    }

    impl ExtensionClass for Doubled {
        type Base = AudioEffectInstance;
        const CLASS_NAME: &'static str = "Doubled";

        fn init(base: Base<AudioEffectInstance>) -> Self {
            Self { _base: base }
        }

        fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
            builder
                .on::<ProcessSilence, _>(|_, ()| true)?
                .on::<ProcessSilence, _>(|_, ()| false)?;
            Ok(())
        }
    }

    #[test]
    fn duplicate_virtual_is_rejected() {
        let _session = mock::install();

        let mut registry = ClassRegistry::new();
        assert_eq!(
            registry.register::<Doubled>(),
            Err(RegisterError::DuplicateVirtual {
                class: "Doubled",
                method: "_process_silence",
            })
        );
        assert!(registry.is_empty());
    }

    engine_class! {
        class Unlisted: Object;
        virtuals {}
    }

    struct Orphan {
        _base: Base<Unlisted>,
    }

    impl ExtensionClass for Orphan {
        type Base = Unlisted;
        const CLASS_NAME: &'static str = "Orphan";

        fn init(base: Base<Unlisted>) -> Self {
            Self { _base: base }
        }
    }

    #[test]
    fn base_must_be_in_manifest() {
        let _session = mock::install();

        let mut registry = ClassRegistry::new();
        registry.register::<Orphan>().unwrap();
        assert_eq!(
            registry.load_into_engine(sys::binding()),
            Err(RegisterError::UnknownClass {
                class: "Unlisted".to_string()
            })
        );
        assert!(!registry.is_loaded());
        assert!(!mock::is_extension_class_registered("Orphan"));
    }

    struct Reentrant {
        base: Base<AudioEffectInstance>,
    }

    static REENTERED_FRAMES: AtomicI64 = AtomicI64::new(-1);

    impl ExtensionClass for Reentrant {
        type Base = AudioEffectInstance;
        const CLASS_NAME: &'static str = "Reentrant";

        fn init(base: Base<AudioEffectInstance>) -> Self {
            Self { base }
        }

        fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
            builder
                .on::<ProcessSilence, _>(|this, ()| {
                    let base = this.base_mut();

                    // Calls back into the same instance, like an engine method running a virtual would.
                    let mut frames = [AudioFrame::default(); 3];
                    assert!(call_process(base.raw_object().as_ptr(), &mut frames));
                    true
                })?
                .on::<Process, _>(|_, (_, _, frame_count)| {
                    REENTERED_FRAMES.store(frame_count as i64, Ordering::SeqCst);
                })?;
            Ok(())
        }
    }

    impl WithBaseField for Reentrant {
        fn base_field(&self) -> &Base<AudioEffectInstance> {
            &self.base
        }
    }

    /// Calls `_process_silence` like the audio server does.
    fn call_process_silence(object: sys::GDExtensionObjectPtr) -> bool {
        let mut frame = sys::CallFrame::new();
        let ret_slot = frame.ret::<bool>();
        let args = frame.args_ptr();
        let ret = frame.ret_ptr();

        assert!(unsafe { mock::call_virtual(object, "_process_silence", args, ret) });
        unsafe { ret_slot.get(&frame) }
    }

    #[test]
    fn reentrant_call_through_base_mut_runs() {
        let _session = mock::install();

        let mut registry = ClassRegistry::new();
        registry.register::<Reentrant>().unwrap();
        registry.load_into_engine(sys::binding()).unwrap();

        let object = mock::construct("Reentrant");
        REENTERED_FRAMES.store(-1, Ordering::SeqCst);

        assert!(call_process_silence(object));
        assert_eq!(REENTERED_FRAMES.load(Ordering::SeqCst), 3);
        assert!(mock::log().is_empty(), "{:?}", mock::log());

        mock::destroy(object);
    }

    struct Greedy {
        base: Base<AudioEffectInstance>,
    }

    static GREEDY_PROCESS_CALLS: AtomicUsize = AtomicUsize::new(0);

    impl ExtensionClass for Greedy {
        type Base = AudioEffectInstance;
        const CLASS_NAME: &'static str = "Greedy";

        fn init(base: Base<AudioEffectInstance>) -> Self {
            Self { base }
        }

        fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
            builder
                .on::<ProcessSilence, _>(|this, ()| {
                    // Keeps `this` accessible while calling back.
                    let object = this.base.to_obj().as_object_ptr();
                    let mut frames = [AudioFrame::default(); 3];
                    assert!(call_process(object, &mut frames));
                    true
                })?
                .on::<Process, _>(|_, _| {
                    GREEDY_PROCESS_CALLS.fetch_add(1, Ordering::SeqCst);
                })?;
            Ok(())
        }
    }

    #[test]
    fn reentrant_call_while_bound_is_skipped() {
        let _session = mock::install();

        let mut registry = ClassRegistry::new();
        registry.register::<Greedy>().unwrap();
        registry.load_into_engine(sys::binding()).unwrap();

        let object = mock::construct("Greedy");
        let calls_before = GREEDY_PROCESS_CALLS.load(Ordering::SeqCst);

        assert!(call_process_silence(object));
        assert_eq!(GREEDY_PROCESS_CALLS.load(Ordering::SeqCst), calls_before);

        let log = mock::log();
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("Greedy::_process skipped"));

        // Outside the outer call, the instance is available again.
        let mut frames = [AudioFrame::default(); 2];
        assert!(call_process(object, &mut frames));
        assert_eq!(GREEDY_PROCESS_CALLS.load(Ordering::SeqCst), calls_before + 1);

        mock::destroy(object);
    }

    struct Panicky {
        _base: Base<AudioEffectInstance>,
    }

    impl ExtensionClass for Panicky {
        type Base = AudioEffectInstance;
        const CLASS_NAME: &'static str = "Panicky";

        fn init(base: Base<AudioEffectInstance>) -> Self {
            Self { _base: base }
        }

        fn register(builder: &mut ClassBuilder<Self>) -> Result<(), RegisterError> {
            builder
                .on::<ProcessSilence, _>(|_, ()| true)?
                .on::<Process, _>(|_, (_, _, frame_count)| {
                    panic!("processing {frame_count} frames failed");
                })?;
            Ok(())
        }
    }

    #[test]
    fn panic_in_override_is_reported() {
        let _session = mock::install();

        let mut registry = ClassRegistry::new();
        registry.register::<Panicky>().unwrap();
        registry.load_into_engine(sys::binding()).unwrap();

        let object = mock::construct("Panicky");
        let mut frames = [AudioFrame::default(); 4];
        assert!(call_process(object, &mut frames));

        let log = mock::log();
        assert!(log[0].message.contains("Context: Panicky::_process"));
        assert_eq!(log[1].message, "[panic]  processing 4 frames failed");

        // The instance is still usable afterwards.
        assert!(call_process_silence(object));

        mock::destroy(object);
    }

    struct Faulty {
        _base: Base<AudioEffectInstance>,
    }

    impl ExtensionClass for Faulty {
        type Base = AudioEffectInstance;
        const CLASS_NAME: &'static str = "Faulty";

        fn init(_base: Base<AudioEffectInstance>) -> Self {
            panic!("cannot initialize");
        }
    }

    #[test]
    fn panic_in_init_yields_no_object() {
        let _session = mock::install();
        let before = mock::stats();

        let mut registry = ClassRegistry::new();
        registry.register::<Faulty>().unwrap();
        registry.load_into_engine(sys::binding()).unwrap();

        assert!(mock::construct("Faulty").is_null());

        let after = mock::stats();
        assert_eq!(after.instances_created, before.instances_created);
        assert_eq!(
            after.objects_created - before.objects_created,
            after.objects_destroyed - before.objects_destroyed
        );
        assert!(mock::log()[0].message.contains("Context: Faulty::init"));
    }
}
