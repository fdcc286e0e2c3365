/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! In-process stand-in for the Godot engine, for tests.
//!
//! Implements the interface functions that gdlink loads, with `extern "C"` functions behind a mock `get_proc_address`.
//! Builtin values (strings, arrays, ...) are represented by an ID stored in the first word of the opaque handle; objects
//! by fake addresses that are never dereferenced. Variants are a type tag word followed by two payload words; payloads
//! larger than that are stored as values like the builtins. Method binds for the classes of the builtin manifest are registered
//! on first use; tests may add more with [`register_method()`].
//!
//! The engine state lock is never held while calling back into the extension (method closures, class callbacks), so
//! callbacks may freely call engine functions again.

use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate as sys;
use crate::{ApiManifest, Binding, BindingConfig, GodotFfi, Global, InitError, VariantType};

/// Version reported by the mock engine, unless changed with [`set_runtime_version()`].
pub const MOCK_VERSION: (u32, u32, u32) = (4, 3, 0);

const VERSION_STRING: &CStr = c"Godot Engine v4.3.stable.mock";
const FIRST_OBJECT_ADDR: usize = 0x10_0000;
const LIBRARY_ADDR: usize = 0x11b_0000;
const REF_COUNTED_BIT: u64 = 1 << 63;

static STATE: Global<MockState> = Global::new(MockState::with_builtin_classes);
static SERIAL: Mutex<()> = Mutex::new(());

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Public API

/// Exclusive access to the mock engine for one test. Tests in the same binary run one after another while they hold it.
pub struct MockSession {
    _serial: MutexGuard<'static, ()>,
}

/// Starts a test session: installs the process-wide binding (once per process) and clears the log.
///
/// The installed binding has thread checks off, since the test harness runs tests on several threads, and frame
/// validation on.
pub fn install() -> MockSession {
    let serial = SERIAL.lock().unwrap_or_else(|poison| poison.into_inner());

    if !sys::is_initialized() {
        let binding = load_binding(test_config()).expect("mock engine provides a complete binding");

        // Ignore a lost race; some binding is installed either way.
        let _ = sys::install(binding);
    }

    STATE.lock().log.clear();
    MockSession { _serial: serial }
}

/// Config used by [`install()`].
pub fn test_config() -> BindingConfig {
    BindingConfig {
        validate_frames: true,
        thread_checks: false,
    }
}

/// Loads a fresh (not installed) binding against the mock engine, using the builtin manifest.
pub fn load_binding(config: BindingConfig) -> Result<Binding, InitError> {
    let manifest = ApiManifest::builtin()?;

    // SAFETY: the mock get_proc_address hands out functions with the declared signatures.
    unsafe { Binding::load(get_proc_address(), library(), &manifest, config) }
}

pub fn get_proc_address() -> sys::GDExtensionInterfaceGetProcAddress {
    Some(engine::get_proc_address)
}

pub fn library() -> sys::GDExtensionClassLibraryPtr {
    LIBRARY_ADDR as sys::GDExtensionClassLibraryPtr
}

/// Makes `get_proc_address` return null for `name`, until [`restore_interface_fns()`].
pub fn hide_interface_fn(name: &str) {
    STATE.lock().hidden_fns.insert(name.to_string());
}

pub fn restore_interface_fns() {
    STATE.lock().hidden_fns.clear();
}

pub fn set_runtime_version(major: u32, minor: u32, patch: u32) {
    STATE.lock().version = (major, minor, patch);
}

/// Counters since process start.
pub fn stats() -> MockStats {
    STATE.lock().stats.clone()
}

/// Builtin values (strings, arrays, ...) constructed and not yet destroyed.
pub fn live_values() -> usize {
    STATE.lock().values.len()
}

/// Objects constructed and not yet destroyed.
pub fn live_objects() -> usize {
    STATE.lock().objects.values().filter(|o| !o.destroyed).count()
}

pub fn is_destroyed(object: sys::GDExtensionObjectPtr) -> bool {
    STATE
        .lock()
        .objects
        .get(&(object as usize))
        .is_none_or(|o| o.destroyed)
}

/// Class of a live object, as the engine sees it (extension class name for extension instances).
pub fn object_class(object: sys::GDExtensionObjectPtr) -> Option<String> {
    let state = STATE.lock();
    let obj = state.objects.get(&(object as usize))?;

    (!obj.destroyed).then(|| obj.class.clone())
}

pub fn reference_count(object: sys::GDExtensionObjectPtr) -> Option<i64> {
    STATE.lock().objects.get(&(object as usize)).map(|o| o.refcount)
}

/// Text of a `String` or `StringName` handle.
pub fn value_text(handle: sys::GDExtensionConstTypePtr) -> Option<String> {
    // SAFETY: caller passes a pointer to a handle; the mock only reads the ID word.
    let id = unsafe { read_id(handle) };
    STATE.lock().values.get(&id).and_then(|v| v.text.clone())
}

pub fn is_extension_class_registered(class: &str) -> bool {
    STATE.lock().extension_classes.contains_key(class)
}

/// Object registered under `name` as engine singleton, as returned by `global_get_singleton`.
pub fn singleton(name: &str) -> Option<sys::GDExtensionObjectPtr> {
    STATE
        .lock()
        .singletons
        .get(name)
        .map(|&addr| addr as sys::GDExtensionObjectPtr)
}

/// Whether `callable` (a `Callable` handle) was created by the extension through `callable_custom_create`.
pub fn is_custom_callable(callable: sys::GDExtensionConstTypePtr) -> bool {
    // SAFETY: caller passes a pointer to a handle; the mock only reads the ID word.
    let id = unsafe { read_id(callable) };
    STATE.lock().values.get(&id).is_some_and(|v| v.custom.is_some())
}

/// Invokes a custom callable like the engine does, e.g. when a signal it is connected to is emitted.
///
/// `args` are borrowed by the callee. On success, the returned variant is owned by the caller and must be destroyed
/// with `variant_destroy`.
pub fn call_callable(
    callable: sys::GDExtensionConstTypePtr,
    args: &[sys::GDExtensionConstVariantPtr],
) -> Result<sys::RawVariant, sys::GDExtensionCallError> {
    let (custom, target_alive) = {
        // SAFETY: see `is_custom_callable()`.
        let id = unsafe { read_id(callable) };
        let state = STATE.lock();
        let custom = state.values.get(&id).and_then(|v| v.custom.clone());
        let target_alive = custom
            .as_ref()
            .is_some_and(|c| c.info.object_id == 0 || state.instances.contains_key(&c.info.object_id));
        (custom, target_alive)
    };

    // The clone keeps the userdata alive, even if the callee drops the last handle to the callable.
    let Some(custom) = custom else {
        return Err(call_error(sys::GDEXTENSION_CALL_ERROR_INVALID_METHOD));
    };
    let info = custom.info;

    // SAFETY: the functions were provided by the extension for this userdata.
    unsafe {
        let valid = info
            .is_valid_func
            .is_none_or(|is_valid| is_valid(info.callable_userdata) != 0);
        if !target_alive || !valid {
            return Err(call_error(sys::GDEXTENSION_CALL_ERROR_INSTANCE_IS_NULL));
        }

        let Some(call) = info.call_func else {
            return Err(call_error(sys::GDEXTENSION_CALL_ERROR_INVALID_METHOD));
        };

        let mut ret = sys::RawVariant::null();
        let mut error = call_error(sys::GDEXTENSION_CALL_OK);
        call(
            info.callable_userdata,
            args.as_ptr(),
            args.len() as sys::GDExtensionInt,
            ret.sys_mut(),
            &mut error,
        );

        if error.error == sys::GDEXTENSION_CALL_OK {
            Ok(ret)
        } else {
            Err(error)
        }
    }
}

/// Text of a custom callable, as the engine prints it. `None` if the extension provides no text.
pub fn callable_text(callable: sys::GDExtensionConstTypePtr) -> Option<String> {
    // SAFETY: see `is_custom_callable()`.
    let id = unsafe { read_id(callable) };
    let custom = STATE.lock().values.get(&id).and_then(|v| v.custom.clone())?;
    let to_string = custom.info.to_string_func?;

    let mut is_valid: sys::GDExtensionBool = 0;
    let mut out = 0u64;

    // SAFETY: the extension writes a new `String` handle to `out`.
    unsafe {
        to_string(
            custom.info.callable_userdata,
            &mut is_valid,
            &mut out as *mut u64 as sys::GDExtensionStringPtr,
        );
    }

    if out == 0 {
        return None;
    }
    let text = STATE.lock().values.get(&out).and_then(|v| v.text.clone());
    destroy_value_id(out);

    text.filter(|_| is_valid != 0)
}

fn call_error(error: sys::GDExtensionCallErrorType) -> sys::GDExtensionCallError {
    sys::GDExtensionCallError {
        error,
        argument: 0,
        expected: 0,
    }
}

/// Messages received through `print_error` and `print_warning` during the current session.
pub fn log() -> Vec<LogEntry> {
    STATE.lock().log.clone()
}

/// Adds (or replaces) a method that can be resolved with `classdb_get_method_bind`.
pub fn register_method<F>(class: &str, method: &str, hash: i64, func: F)
where
    F: Fn(&MockCall) + Send + Sync + 'static,
{
    STATE.lock().add_method(class, method, hash, Box::new(func));
}

/// Number of ptrcalls that reached `class::method`.
pub fn method_call_count(class: &str, method: &str) -> usize {
    let addr = STATE
        .lock()
        .methods
        .get(&(class.to_string(), method.to_string()))
        .copied();

    match addr {
        // SAFETY: method records are leaked and live for the rest of the process.
        Some(addr) => unsafe { (*(addr as *const MockMethod)).calls.load(Ordering::Relaxed) },
        None => 0,
    }
}

/// Constructs an object the way the engine does when a scene or script instantiates `class`.
///
/// For extension classes, this goes through the registered `create_instance` callback.
pub fn construct(class: &str) -> sys::GDExtensionObjectPtr {
    let sname = new_value(VariantType::StringName, Some(class.to_string()));
    let args = sname.to_le_bytes();

    // SAFETY: `args` holds the ID word of a live StringName.
    let obj = unsafe { engine::classdb_construct_object(args.as_ptr() as sys::GDExtensionConstStringNamePtr) };
    destroy_value_id(sname);

    obj
}

/// Destroys an object the way the engine does (e.g. `free()` from a script).
pub fn destroy(object: sys::GDExtensionObjectPtr) {
    // SAFETY: destroying unknown objects is recorded, not dereferenced.
    unsafe { engine::object_destroy(object) }
}

/// Invokes virtual method `name` on an extension instance, like the engine does.
///
/// Returns `false` if the object is not an extension instance, or the extension has no override for `name` (the engine
/// would then run its own default).
///
/// # Safety
/// `args` and `ret` must match the virtual method's signature.
pub unsafe fn call_virtual(
    object: sys::GDExtensionObjectPtr,
    name: &str,
    args: *const sys::GDExtensionConstTypePtr,
    ret: sys::GDExtensionTypePtr,
) -> bool {
    let target = {
        let state = STATE.lock();
        state.objects.get(&(object as usize)).and_then(|obj| {
            let (class, instance) = obj.extension.as_ref()?;
            let info = state.extension_classes.get(class)?.info.0;
            Some((info, *instance))
        })
    };

    let Some((info, instance)) = target else {
        return false;
    };
    let (Some(get_call_data), Some(call_with_data)) =
        (info.get_virtual_call_data_func, info.call_virtual_with_data_func)
    else {
        return false;
    };

    let sname = new_value(VariantType::StringName, Some(name.to_string()));
    let sname_bytes = sname.to_le_bytes();
    let sname_ptr = sname_bytes.as_ptr() as sys::GDExtensionConstStringNamePtr;

    let data = get_call_data(info.class_userdata, sname_ptr);
    let found = !data.is_null();
    if found {
        call_with_data(instance as sys::GDExtensionClassInstancePtr, sname_ptr, data, args, ret);
    }

    destroy_value_id(sname);
    found
}

/// Arguments of a ptrcall that reached a mock method.
pub struct MockCall {
    pub object: sys::GDExtensionObjectPtr,
    args: *const sys::GDExtensionConstTypePtr,
    ret: sys::GDExtensionTypePtr,
}

impl MockCall {
    /// # Safety
    /// Argument `index` must exist and hold a `T`.
    pub unsafe fn arg<T: GodotFfi>(&self, index: usize) -> T {
        T::from_sys(*self.args.add(index))
    }

    /// Pointer to argument `index`.
    ///
    /// # Safety
    /// Argument `index` must exist.
    pub unsafe fn arg_ptr(&self, index: usize) -> sys::GDExtensionConstTypePtr {
        *self.args.add(index)
    }

    /// # Safety
    /// The caller must have provided a return slot for a `T`.
    pub unsafe fn set_ret<T: GodotFfi>(&self, value: T) {
        value.write_sys(self.ret)
    }

    /// Text of the `String`/`StringName` argument `index`.
    ///
    /// # Safety
    /// Argument `index` must exist and be a string handle.
    pub unsafe fn arg_text(&self, index: usize) -> String {
        value_text(self.arg_ptr(index)).unwrap_or_default()
    }

    /// Assigns a fresh `String`/`StringName` holding `text` to the return slot.
    ///
    /// Like the engine, this assigns to the value already in the slot, destroying it first.
    ///
    /// # Safety
    /// The caller must have provided a return slot for a string.
    pub unsafe fn set_ret_string(&self, text: &str, kind: VariantType) {
        let previous = read_id(self.ret);
        if previous != 0 {
            destroy_value_id(previous);
        }

        let id = new_value(kind, Some(text.to_string()));
        *(self.ret as *mut u64) = id;
    }
}

#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct MockStats {
    pub values_created: usize,
    pub values_destroyed: usize,
    pub objects_created: usize,
    pub objects_destroyed: usize,
    /// Destruction of an already destroyed or unknown value/object. Must stay 0.
    pub double_destroys: usize,
    pub ptrcalls: usize,
    pub instances_created: usize,
    pub instances_freed: usize,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LogLevel {
    Error,
    Warning,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub function: String,
    pub file: String,
    pub line: i32,
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// State

struct MockValue {
    kind: VariantType,
    text: Option<String>,
    /// Payload of a variant too large to be stored inline.
    words: Vec<usize>,
    /// Extension data of a custom callable, shared between copies of the callable.
    custom: Option<Arc<CustomCallable>>,
}

impl MockValue {
    fn new(kind: VariantType, text: Option<String>) -> Self {
        Self {
            kind,
            text,
            words: Vec::new(),
            custom: None,
        }
    }
}

struct CustomCallable {
    info: sys::GDExtensionCallableCustomInfo,
}

// SAFETY: the mock only passes the userdata back to the extension's own callbacks.
unsafe impl Send for CustomCallable {}
unsafe impl Sync for CustomCallable {}

impl CustomCallable {
    /// Hands the userdata back to the extension, once the last copy of the callable is gone.
    fn free(self) {
        if let Some(free) = self.info.free_func {
            // SAFETY: the userdata is not used afterwards.
            unsafe { free(self.info.callable_userdata) };
        }
    }
}

struct MockObject {
    class: String,
    instance_id: u64,
    refcount: i64,
    destroyed: bool,
    extension: Option<(String, usize)>,
    children: Vec<usize>,
    name: String,
    processing: bool,
    props: HashMap<&'static str, Vec<usize>>,
}

struct MockMethod {
    hash: i64,
    func: Box<dyn Fn(&MockCall) + Send + Sync>,
    calls: AtomicUsize,
}

struct ExtensionClass {
    info: SendInfo,
}

#[derive(Copy, Clone)]
struct SendInfo(sys::GDExtensionClassCreationInfo3);

// SAFETY: the mock only passes `class_userdata` back to the extension's own callbacks.
unsafe impl Send for SendInfo {}

struct MockState {
    version: (u32, u32, u32),
    hidden_fns: HashSet<String>,
    next_value_id: u64,
    next_object: usize,
    values: HashMap<u64, MockValue>,
    objects: HashMap<usize, MockObject>,
    instances: HashMap<u64, usize>,
    methods: HashMap<(String, String), usize>,
    parents: HashMap<String, String>,
    extension_classes: HashMap<String, ExtensionClass>,
    singletons: HashMap<String, usize>,
    /// Class of each tag handed out by `classdb_get_class_tag`; the tag is the index plus one.
    class_tags: Vec<String>,
    log: Vec<LogEntry>,
    stats: MockStats,
}

impl MockState {
    fn with_builtin_classes() -> Self {
        let mut state = Self {
            version: MOCK_VERSION,
            hidden_fns: HashSet::new(),
            next_value_id: 1,
            next_object: 0,
            values: HashMap::new(),
            objects: HashMap::new(),
            instances: HashMap::new(),
            methods: HashMap::new(),
            parents: HashMap::new(),
            extension_classes: HashMap::new(),
            singletons: HashMap::new(),
            class_tags: Vec::new(),
            log: Vec::new(),
            stats: MockStats::default(),
        };

        if let Ok(manifest) = ApiManifest::builtin() {
            for class in &manifest.classes {
                if let Some(base) = &class.inherits {
                    state.parents.insert(class.name.clone(), base.clone());
                }
            }
            builtin_methods::install(&mut state, &manifest);

            for singleton in &manifest.singletons {
                let addr = state.new_object(&singleton.type_);
                state.singletons.insert(singleton.name.clone(), addr);
            }
            if let Some(engine) = state.singletons.get("Engine").and_then(|addr| state.objects.get_mut(addr)) {
                engine.props.insert("physics_ticks_per_second", vec![60]);
            }
        }

        state
    }

    fn add_method(&mut self, class: &str, method: &str, hash: i64, func: Box<dyn Fn(&MockCall) + Send + Sync>) {
        let record = Box::new(MockMethod {
            hash,
            func,
            calls: AtomicUsize::new(0),
        });

        // Leaked: binds handed out to the extension must stay valid.
        let addr = Box::into_raw(record) as usize;
        self.methods.insert((class.to_string(), method.to_string()), addr);
    }

    fn inherits(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.parents.get(name).map(String::as_str);
        }
        false
    }

    fn is_known_class(&self, class: &str) -> bool {
        class == "Object" || self.parents.contains_key(class)
    }

    fn new_object(&mut self, class: &str) -> usize {
        self.next_object += 1;
        let addr = FIRST_OBJECT_ADDR + self.next_object * 0x10;

        let mut instance_id = self.next_object as u64;
        let refcounted = self.inherits(class, "RefCounted");
        if refcounted {
            instance_id |= REF_COUNTED_BIT;
        }

        self.objects.insert(
            addr,
            MockObject {
                class: class.to_string(),
                instance_id,
                refcount: 0,
                destroyed: false,
                extension: None,
                children: Vec::new(),
                name: String::new(),
                processing: false,
                props: HashMap::new(),
            },
        );
        self.instances.insert(instance_id, addr);
        self.stats.objects_created += 1;

        addr
    }

    fn object_mut(&mut self, addr: usize) -> Option<&mut MockObject> {
        self.objects.get_mut(&addr).filter(|o| !o.destroyed)
    }
}

fn new_value(kind: VariantType, text: Option<String>) -> u64 {
    insert_value(MockValue::new(kind, text))
}

fn insert_value(value: MockValue) -> u64 {
    let mut state = STATE.lock();
    let id = state.next_value_id;
    state.next_value_id += 1;
    state.values.insert(id, value);
    state.stats.values_created += 1;
    id
}

/// New value with the same contents as `id`, or 0 if there is no such value.
fn copy_value_id(id: u64) -> u64 {
    let copy = STATE.lock().values.get(&id).map(|v| MockValue {
        kind: v.kind,
        text: v.text.clone(),
        words: v.words.clone(),
        custom: v.custom.clone(),
    });

    copy.map_or(0, insert_value)
}

fn destroy_value_id(id: u64) {
    let removed = {
        let mut state = STATE.lock();
        match state.values.remove(&id) {
            Some(value) => {
                state.stats.values_destroyed += 1;
                value.custom
            }
            None => {
                state.stats.double_destroys += 1;
                None
            }
        }
    };

    // Outside the lock: the extension's free callback may call back into the engine.
    if let Some(custom) = removed.and_then(Arc::into_inner) {
        custom.free();
    }
}

/// Takes a reference on behalf of a variant, if `addr` is a live ref-counted object.
fn reference_object(addr: usize) {
    let mut state = STATE.lock();
    let refcounted = state
        .objects
        .get(&addr)
        .is_some_and(|o| !o.destroyed && state.inherits(&o.class, "RefCounted"));

    if let Some(obj) = state.object_mut(addr).filter(|_| refcounted) {
        obj.refcount += 1;
    }
}

/// Gives up a variant's reference, destroying the object when it was the last one.
fn unreference_object(addr: usize) {
    let reached_zero = {
        let mut state = STATE.lock();
        let refcounted = state
            .objects
            .get(&addr)
            .is_some_and(|o| !o.destroyed && state.inherits(&o.class, "RefCounted"));

        match state.object_mut(addr).filter(|_| refcounted) {
            Some(obj) => {
                obj.refcount -= 1;
                obj.refcount <= 0
            }
            None => false,
        }
    };

    if reached_zero {
        // SAFETY: the object is live, checked above.
        unsafe { engine::object_destroy(addr as sys::GDExtensionObjectPtr) };
    }
}

unsafe fn read_id(ptr: sys::GDExtensionConstTypePtr) -> u64 {
    if ptr.is_null() {
        0
    } else {
        *(ptr as *const u64)
    }
}

unsafe fn read_text(ptr: sys::GDExtensionConstTypePtr) -> Option<String> {
    let id = read_id(ptr);
    STATE.lock().values.get(&id).and_then(|v| v.text.clone())
}

unsafe fn c_text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Engine methods

mod builtin_methods {
    use super::*;
    use crate::RawObject;

    type MethodFn = fn(&MockCall);

    pub(super) fn install(state: &mut MockState, manifest: &ApiManifest) {
        let table: [(&str, &str, MethodFn); 20] = [
            ("Object", "get_class", get_class),
            ("Object", "get_instance_id", get_instance_id),
            ("Object", "is_class", is_class),
            ("RefCounted", "init_ref", init_ref),
            ("RefCounted", "reference", reference),
            ("RefCounted", "unreference", unreference),
            ("RefCounted", "get_reference_count", get_reference_count),
            ("Node", "add_child", add_child),
            ("Node", "get_child_count", get_child_count),
            ("Node", "get_child", get_child),
            ("Node", "set_name", set_name),
            ("Node", "get_name", get_name),
            ("Node", "set_process", set_process),
            ("Node", "is_processing", is_processing),
            ("Node3D", "set_position", |call| set_prop(call, "position", 2)),
            ("Node3D", "get_position", |call| get_prop(call, "position", 2)),
            ("Node3D", "set_transform", |call| set_prop(call, "transform", 6)),
            ("Node3D", "get_transform", |call| get_prop(call, "transform", 6)),
            ("Engine", "set_physics_ticks_per_second", |call| {
                set_prop(call, "physics_ticks_per_second", 1)
            }),
            ("Engine", "get_physics_ticks_per_second", |call| {
                get_prop(call, "physics_ticks_per_second", 1)
            }),
        ];

        for (class, method, func) in table {
            let hash = manifest
                .class(class)
                .and_then(|c| c.methods.iter().find(|m| m.name == method))
                .and_then(|m| m.hash);

            if let Some(hash) = hash {
                state.add_method(class, method, hash, Box::new(func));
            }
        }
    }

    fn with_object<R>(call: &MockCall, f: impl FnOnce(&mut MockObject) -> R) -> Option<R> {
        STATE.lock().object_mut(call.object as usize).map(f)
    }

    fn get_class(call: &MockCall) {
        let class = with_object(call, |o| o.class.clone()).unwrap_or_default();
        unsafe { call.set_ret_string(&class, VariantType::String) };
    }

    fn get_instance_id(call: &MockCall) {
        let id = with_object(call, |o| o.instance_id).unwrap_or(0);
        unsafe { call.set_ret(id as i64) };
    }

    fn is_class(call: &MockCall) {
        let queried = unsafe { call.arg_text(0) };
        let result = {
            let state = STATE.lock();
            state
                .objects
                .get(&(call.object as usize))
                .is_some_and(|o| state.inherits(&o.class, &queried))
        };
        unsafe { call.set_ret(result) };
    }

    fn init_ref(call: &MockCall) {
        let ok = with_object(call, |o| {
            o.refcount = 1;
            true
        });
        unsafe { call.set_ret(ok.unwrap_or(false)) };
    }

    fn reference(call: &MockCall) {
        let ok = with_object(call, |o| {
            o.refcount += 1;
            true
        });
        unsafe { call.set_ret(ok.unwrap_or(false)) };
    }

    fn unreference(call: &MockCall) {
        let reached_zero = with_object(call, |o| {
            o.refcount -= 1;
            o.refcount <= 0
        });
        unsafe { call.set_ret(reached_zero.unwrap_or(false)) };
    }

    fn get_reference_count(call: &MockCall) {
        let count = with_object(call, |o| o.refcount).unwrap_or(0);
        unsafe { call.set_ret(count) };
    }

    fn add_child(call: &MockCall) {
        let child = unsafe { call.arg::<RawObject>(0) };
        with_object(call, |o| o.children.push(child.as_ptr() as usize));
    }

    fn get_child_count(call: &MockCall) {
        let count = with_object(call, |o| o.children.len()).unwrap_or(0);
        unsafe { call.set_ret(count as i64) };
    }

    fn get_child(call: &MockCall) {
        let index = unsafe { call.arg::<i64>(0) };
        let child = with_object(call, |o| {
            usize::try_from(index)
                .ok()
                .and_then(|i| o.children.get(i).copied())
        })
        .flatten()
        .unwrap_or(0);

        unsafe { call.set_ret(RawObject::from_ptr(child as sys::GDExtensionObjectPtr)) };
    }

    fn set_name(call: &MockCall) {
        let name = unsafe { call.arg_text(0) };
        with_object(call, |o| o.name = name);
    }

    fn get_name(call: &MockCall) {
        let name = with_object(call, |o| o.name.clone()).unwrap_or_default();
        unsafe { call.set_ret_string(&name, VariantType::StringName) };
    }

    fn set_process(call: &MockCall) {
        let enable = unsafe { call.arg::<bool>(0) };
        with_object(call, |o| o.processing = enable);
    }

    fn is_processing(call: &MockCall) {
        let processing = with_object(call, |o| o.processing).unwrap_or(false);
        unsafe { call.set_ret(processing) };
    }

    fn set_prop(call: &MockCall, prop: &'static str, words: usize) {
        // SAFETY: the frame slot spans `words` words.
        let value = unsafe { std::slice::from_raw_parts(call.arg_ptr(0) as *const usize, words).to_vec() };
        with_object(call, |o| o.props.insert(prop, value));
    }

    fn get_prop(call: &MockCall, prop: &'static str, words: usize) {
        let value = with_object(call, |o| o.props.get(prop).cloned())
            .flatten()
            .unwrap_or_else(|| vec![0; words]);

        // SAFETY: the return region spans `words` words.
        unsafe {
            std::ptr::copy_nonoverlapping(value.as_ptr(), call.ret as *mut usize, words);
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Interface functions

mod engine {
    use super::*;

    pub(super) unsafe extern "C" fn get_proc_address(
        name: *const c_char,
    ) -> sys::GDExtensionInterfaceFunctionPtr {
        let name = c_text(name);
        if STATE.lock().hidden_fns.contains(&name) {
            return None;
        }

        macro_rules! proc_table {
            ($( $function:ident ),* $(,)?) => {
                match name.as_str() {
                    $(
                        stringify!($function) => Some(std::mem::transmute::<*const (), unsafe extern "C" fn()>(
                            $function as *const (),
                        )),
                    )*
                    _ => None,
                }
            };
        }

        proc_table!(
            get_godot_version,
            print_error,
            print_warning,
            variant_get_ptr_constructor,
            variant_get_ptr_destructor,
            get_variant_from_type_constructor,
            get_variant_to_type_constructor,
            variant_new_copy,
            variant_destroy,
            variant_get_type,
            string_new_with_utf8_chars_and_len,
            string_name_new_with_utf8_chars_and_len,
            string_to_utf8_chars,
            classdb_get_method_bind,
            object_method_bind_ptrcall,
            classdb_construct_object,
            object_destroy,
            object_get_instance_id,
            object_get_instance_from_id,
            object_set_instance,
            object_cast_to,
            classdb_get_class_tag,
            global_get_singleton,
            callable_custom_create,
            classdb_register_extension_class3,
            classdb_unregister_extension_class,
        )
    }

    unsafe extern "C" fn get_godot_version(r_version: *mut sys::GDExtensionGodotVersion) {
        let (major, minor, patch) = STATE.lock().version;
        *r_version = sys::GDExtensionGodotVersion {
            major,
            minor,
            patch,
            string: VERSION_STRING.as_ptr(),
        };
    }

    unsafe fn push_log(
        level: LogLevel,
        description: *const c_char,
        function: *const c_char,
        file: *const c_char,
        line: i32,
    ) {
        let entry = LogEntry {
            level,
            message: c_text(description),
            function: c_text(function),
            file: c_text(file),
            line,
        };
        STATE.lock().log.push(entry);
    }

    unsafe extern "C" fn print_error(
        description: *const c_char,
        function: *const c_char,
        file: *const c_char,
        line: i32,
        _editor_notify: sys::GDExtensionBool,
    ) {
        push_log(LogLevel::Error, description, function, file, line);
    }

    unsafe extern "C" fn print_warning(
        description: *const c_char,
        function: *const c_char,
        file: *const c_char,
        line: i32,
        _editor_notify: sys::GDExtensionBool,
    ) {
        push_log(LogLevel::Warning, description, function, file, line);
    }

    // Constructors receive no type tag, so there is one function per type.
    macro_rules! default_constructors {
        ($( $name:ident => $variant:ident ),* $(,)?) => {
            $(
                unsafe extern "C" fn $name(
                    base: sys::GDExtensionUninitializedTypePtr,
                    _args: *const sys::GDExtensionConstTypePtr,
                ) {
                    write_handle(base, new_value(VariantType::$variant, Some(String::new())));
                }
            )*

            fn default_constructor(ty: VariantType) -> sys::GDExtensionPtrConstructor {
                match ty {
                    $( VariantType::$variant => Some($name), )*
                    _ => None,
                }
            }
        };
    }

    default_constructors!(
        construct_string => String,
        construct_string_name => StringName,
        construct_array => Array,
        construct_dictionary => Dictionary,
        construct_callable => Callable,
        construct_packed_byte_array => PackedByteArray,
    );

    unsafe fn write_handle(dst: sys::GDExtensionTypePtr, id: u64) {
        *(dst as *mut u64) = id;
    }

    /// Copy constructor: new handle, same contents.
    unsafe extern "C" fn copy_value(
        base: sys::GDExtensionUninitializedTypePtr,
        args: *const sys::GDExtensionConstTypePtr,
    ) {
        write_handle(base, copy_value_id(read_id(*args)));
    }

    unsafe extern "C" fn string_from_string_name(
        base: sys::GDExtensionUninitializedTypePtr,
        args: *const sys::GDExtensionConstTypePtr,
    ) {
        let text = read_text(*args);
        write_handle(base, new_value(VariantType::String, text));
    }

    unsafe extern "C" fn variant_get_ptr_constructor(
        p_type: sys::GDExtensionVariantType,
        p_constructor: i32,
    ) -> sys::GDExtensionPtrConstructor {
        let Some(ty) = variant_type_from_sys(p_type) else {
            return None;
        };

        match (ty, p_constructor) {
            (_, 0) => default_constructor(ty),
            (ty, 1) if ty.needs_destructor() => Some(copy_value),
            (VariantType::String, 2) => Some(string_from_string_name),
            _ => None,
        }
    }

    unsafe extern "C" fn destroy_value(base: sys::GDExtensionTypePtr) {
        destroy_value_id(read_id(base));
    }

    unsafe extern "C" fn variant_get_ptr_destructor(
        p_type: sys::GDExtensionVariantType,
    ) -> sys::GDExtensionPtrDestructor {
        match variant_type_from_sys(p_type) {
            Some(ty) if ty.needs_destructor() => Some(destroy_value),
            _ => None,
        }
    }

    fn variant_type_from_sys(p_type: sys::GDExtensionVariantType) -> Option<VariantType> {
        [
            VariantType::String,
            VariantType::StringName,
            VariantType::Array,
            VariantType::Dictionary,
            VariantType::Callable,
            VariantType::PackedByteArray,
        ]
        .into_iter()
        .find(|ty| ty.sys() == p_type)
    }

    unsafe fn utf8(contents: *const c_char, size: sys::GDExtensionInt) -> String {
        if contents.is_null() || size <= 0 {
            return String::new();
        }

        let bytes = std::slice::from_raw_parts(contents as *const u8, size as usize);
        String::from_utf8_lossy(bytes).into_owned()
    }

    unsafe extern "C" fn string_new_with_utf8_chars_and_len(
        r_dest: sys::GDExtensionUninitializedStringPtr,
        contents: *const c_char,
        size: sys::GDExtensionInt,
    ) {
        write_handle(r_dest, new_value(VariantType::String, Some(utf8(contents, size))));
    }

    unsafe extern "C" fn string_name_new_with_utf8_chars_and_len(
        r_dest: sys::GDExtensionUninitializedStringNamePtr,
        contents: *const c_char,
        size: sys::GDExtensionInt,
    ) {
        write_handle(r_dest, new_value(VariantType::StringName, Some(utf8(contents, size))));
    }

    unsafe extern "C" fn string_to_utf8_chars(
        p_self: sys::GDExtensionConstStringPtr,
        r_text: *mut c_char,
        max_write_length: sys::GDExtensionInt,
    ) -> sys::GDExtensionInt {
        let text = read_text(p_self).unwrap_or_default();
        let bytes = text.as_bytes();

        if !r_text.is_null() {
            let count = bytes.len().min(max_write_length.max(0) as usize);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), r_text as *mut u8, count);
        }

        bytes.len() as sys::GDExtensionInt
    }

    unsafe extern "C" fn classdb_get_method_bind(
        p_classname: sys::GDExtensionConstStringNamePtr,
        p_methodname: sys::GDExtensionConstStringNamePtr,
        p_hash: sys::GDExtensionInt,
    ) -> sys::GDExtensionMethodBindPtr {
        let class = read_text(p_classname).unwrap_or_default();
        let method = read_text(p_methodname).unwrap_or_default();

        let state = STATE.lock();
        match state.methods.get(&(class, method)) {
            Some(&addr) if (*(addr as *const MockMethod)).hash == p_hash => {
                addr as sys::GDExtensionMethodBindPtr
            }
            _ => std::ptr::null(),
        }
    }

    unsafe extern "C" fn object_method_bind_ptrcall(
        p_method_bind: sys::GDExtensionMethodBindPtr,
        p_instance: sys::GDExtensionObjectPtr,
        p_args: *const sys::GDExtensionConstTypePtr,
        r_ret: sys::GDExtensionTypePtr,
    ) {
        STATE.lock().stats.ptrcalls += 1;

        let method = &*(p_method_bind as *const MockMethod);
        method.calls.fetch_add(1, Ordering::Relaxed);

        (method.func)(&MockCall {
            object: p_instance,
            args: p_args,
            ret: r_ret,
        });
    }

    pub(super) unsafe extern "C" fn classdb_construct_object(
        p_classname: sys::GDExtensionConstStringNamePtr,
    ) -> sys::GDExtensionObjectPtr {
        let class = read_text(p_classname).unwrap_or_default();

        let create = {
            let mut state = STATE.lock();
            if let Some(ext) = state.extension_classes.get(&class) {
                Some(ext.info.0)
            } else if state.is_known_class(&class) {
                return state.new_object(&class) as sys::GDExtensionObjectPtr;
            } else {
                return std::ptr::null_mut();
            }
        };

        match create {
            Some(info) => match info.create_instance_func {
                Some(create_instance) => create_instance(info.class_userdata),
                None => std::ptr::null_mut(),
            },
            None => std::ptr::null_mut(),
        }
    }

    pub(super) unsafe extern "C" fn object_destroy(p_o: sys::GDExtensionObjectPtr) {
        let addr = p_o as usize;

        let (extension, children) = {
            let mut state = STATE.lock();
            let Some(obj) = state.object_mut(addr) else {
                state.stats.double_destroys += 1;
                return;
            };

            obj.destroyed = true;
            let extension = obj.extension.take();
            let children = std::mem::take(&mut obj.children);
            let instance_id = obj.instance_id;

            state.instances.remove(&instance_id);
            state.stats.objects_destroyed += 1;

            let extension = extension.and_then(|(class, instance)| {
                state
                    .extension_classes
                    .get(&class)
                    .map(|ext| (ext.info.0, instance))
            });
            (extension, children)
        };

        if let Some((info, instance)) = extension {
            if let Some(free_instance) = info.free_instance_func {
                free_instance(info.class_userdata, instance as sys::GDExtensionClassInstancePtr);
                STATE.lock().stats.instances_freed += 1;
            }
        }

        // Nodes own their children.
        for child in children {
            object_destroy(child as sys::GDExtensionObjectPtr);
        }
    }

    unsafe extern "C" fn object_get_instance_id(
        p_object: sys::GDExtensionConstObjectPtr,
    ) -> sys::GDObjectInstanceID {
        STATE
            .lock()
            .object_mut(p_object as usize)
            .map_or(0, |o| o.instance_id)
    }

    unsafe extern "C" fn object_get_instance_from_id(
        p_instance_id: sys::GDObjectInstanceID,
    ) -> sys::GDExtensionObjectPtr {
        let state = STATE.lock();
        match state.instances.get(&p_instance_id) {
            Some(&addr) => addr as sys::GDExtensionObjectPtr,
            None => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn object_set_instance(
        p_o: sys::GDExtensionObjectPtr,
        p_classname: sys::GDExtensionConstStringNamePtr,
        p_instance: sys::GDExtensionClassInstancePtr,
    ) {
        let class = read_text(p_classname).unwrap_or_default();

        let mut state = STATE.lock();
        if let Some(obj) = state.object_mut(p_o as usize) {
            obj.class = class.clone();
            obj.extension = Some((class, p_instance as usize));
            state.stats.instances_created += 1;
        }
    }

    unsafe extern "C" fn object_cast_to(
        p_object: sys::GDExtensionConstObjectPtr,
        p_class_tag: *mut c_void,
    ) -> sys::GDExtensionObjectPtr {
        let state = STATE.lock();
        let target = (p_class_tag as usize)
            .checked_sub(1)
            .and_then(|index| state.class_tags.get(index));

        match (target, state.objects.get(&(p_object as usize))) {
            (Some(target), Some(obj)) if !obj.destroyed && state.inherits(&obj.class, target) => {
                p_object as sys::GDExtensionObjectPtr
            }
            _ => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn classdb_get_class_tag(p_classname: sys::GDExtensionConstStringNamePtr) -> *mut c_void {
        let class = read_text(p_classname).unwrap_or_default();

        let mut state = STATE.lock();
        if !state.is_known_class(&class) {
            return std::ptr::null_mut();
        }

        let index = match state.class_tags.iter().position(|tagged| *tagged == class) {
            Some(index) => index,
            None => {
                state.class_tags.push(class);
                state.class_tags.len() - 1
            }
        };
        (index + 1) as *mut c_void
    }

    unsafe extern "C" fn global_get_singleton(p_name: sys::GDExtensionConstStringNamePtr) -> sys::GDExtensionObjectPtr {
        let name = read_text(p_name).unwrap_or_default();

        match STATE.lock().singletons.get(&name) {
            Some(&addr) => addr as sys::GDExtensionObjectPtr,
            None => std::ptr::null_mut(),
        }
    }

    unsafe extern "C" fn callable_custom_create(
        r_callable: sys::GDExtensionUninitializedTypePtr,
        p_callable_custom_info: *mut sys::GDExtensionCallableCustomInfo,
    ) {
        let value = MockValue {
            custom: Some(Arc::new(CustomCallable {
                info: *p_callable_custom_info,
            })),
            ..MockValue::new(VariantType::Callable, None)
        };
        write_handle(r_callable, insert_value(value));
    }

    // Variants

    /// Where a variant of some type keeps its value.
    enum Payload {
        Nil,
        /// Directly in the payload words.
        Inline(usize),
        /// In a value, whose ID is the first payload word.
        Boxed(usize),
        /// Builtin handle: copy of the value, whose ID is the first payload word.
        Handle,
        /// Object pointer in the first payload word.
        Object,
    }

    fn payload_of(ty: VariantType) -> Payload {
        match ty {
            VariantType::Nil => Payload::Nil,
            VariantType::Bool | VariantType::Int | VariantType::Float | VariantType::Vector2 | VariantType::Vector2i => {
                Payload::Inline(1)
            }
            VariantType::Vector3 | VariantType::Color => Payload::Inline(2),
            VariantType::Transform2D => Payload::Boxed(3),
            VariantType::Basis => Payload::Boxed(5),
            VariantType::Transform3D => Payload::Boxed(6),
            VariantType::Object => Payload::Object,
            _ => Payload::Handle,
        }
    }

    unsafe fn read_variant(p_variant: sys::GDExtensionConstVariantPtr) -> [usize; 3] {
        *(p_variant as *const [usize; 3])
    }

    unsafe fn write_variant(r_variant: sys::GDExtensionUninitializedVariantPtr, words: [usize; 3]) {
        *(r_variant as *mut [usize; 3]) = words;
    }

    unsafe fn read_payload(ty: VariantType, src: sys::GDExtensionConstTypePtr, words: usize) -> Vec<usize> {
        if ty == VariantType::Bool {
            // One byte in ptrcalls.
            vec![*(src as *const u8) as usize]
        } else {
            std::slice::from_raw_parts(src as *const usize, words).to_vec()
        }
    }

    unsafe fn write_payload(ty: VariantType, dst: sys::GDExtensionTypePtr, words: &[usize]) {
        if ty == VariantType::Bool {
            *(dst as *mut u8) = words.first().is_some_and(|&w| w != 0) as u8;
        } else {
            std::ptr::copy_nonoverlapping(words.as_ptr(), dst as *mut usize, words.len());
        }
    }

    unsafe extern "C" fn variant_from_type<const TAG: u32>(
        r_variant: sys::GDExtensionUninitializedVariantPtr,
        p_type: sys::GDExtensionTypePtr,
    ) {
        let Some(ty) = VariantType::from_sys(TAG) else {
            return;
        };

        let payload = match payload_of(ty) {
            Payload::Nil => [0, 0],
            Payload::Inline(words) => {
                let value = read_payload(ty, p_type, words);
                [value[0], value.get(1).copied().unwrap_or(0)]
            }
            Payload::Boxed(words) => {
                let value = MockValue {
                    words: read_payload(ty, p_type, words),
                    ..MockValue::new(ty, None)
                };
                [insert_value(value) as usize, 0]
            }
            Payload::Handle => [copy_value_id(read_id(p_type)) as usize, 0],
            Payload::Object => {
                let addr = *(p_type as *const usize);
                reference_object(addr);
                [addr, 0]
            }
        };

        write_variant(r_variant, [TAG as usize, payload[0], payload[1]]);
    }

    unsafe extern "C" fn variant_to_type<const TAG: u32>(
        r_type: sys::GDExtensionUninitializedTypePtr,
        p_variant: sys::GDExtensionVariantPtr,
    ) {
        let [tag, first, second] = read_variant(p_variant);
        let Some(ty) = VariantType::from_sys(TAG).filter(|_| tag as u32 == TAG) else {
            return;
        };

        match payload_of(ty) {
            Payload::Nil => {}
            Payload::Inline(words) => write_payload(ty, r_type, &[first, second][..words]),
            Payload::Boxed(_) => {
                let words = STATE
                    .lock()
                    .values
                    .get(&(first as u64))
                    .map(|v| v.words.clone())
                    .unwrap_or_default();
                write_payload(ty, r_type, &words);
            }
            Payload::Handle => write_handle(r_type, copy_value_id(first as u64)),
            Payload::Object => *(r_type as *mut usize) = first,
        }
    }

    // Like constructors, conversions receive no type tag; one instantiation per type.
    macro_rules! by_type {
        ($ty:expr, $func:ident, [$( $variant:ident ),* $(,)?]) => {
            match $ty {
                $( Some(VariantType::$variant) => Some($func::<{ VariantType::$variant as u32 }>), )*
                _ => None,
            }
        };
    }

    unsafe extern "C" fn get_variant_from_type_constructor(
        p_type: sys::GDExtensionVariantType,
    ) -> sys::GDExtensionVariantFromTypeConstructorFunc {
        by_type!(VariantType::from_sys(p_type), variant_from_type, [
            Bool, Int, Float, String, Vector2, Vector2i, Vector3, Transform2D, Basis, Transform3D, Color, StringName,
            Object, Callable, Dictionary, Array, PackedByteArray,
        ])
    }

    unsafe extern "C" fn get_variant_to_type_constructor(
        p_type: sys::GDExtensionVariantType,
    ) -> sys::GDExtensionTypeFromVariantConstructorFunc {
        by_type!(VariantType::from_sys(p_type), variant_to_type, [
            Bool, Int, Float, String, Vector2, Vector2i, Vector3, Transform2D, Basis, Transform3D, Color, StringName,
            Object, Callable, Dictionary, Array, PackedByteArray,
        ])
    }

    unsafe extern "C" fn variant_new_copy(
        r_dest: sys::GDExtensionUninitializedVariantPtr,
        p_src: sys::GDExtensionConstVariantPtr,
    ) {
        let [tag, first, second] = read_variant(p_src);

        let payload = match VariantType::from_sys(tag as u32).map(payload_of) {
            Some(Payload::Handle | Payload::Boxed(_)) => [copy_value_id(first as u64) as usize, 0],
            Some(Payload::Object) => {
                reference_object(first);
                [first, second]
            }
            _ => [first, second],
        };

        write_variant(r_dest, [tag, payload[0], payload[1]]);
    }

    unsafe extern "C" fn variant_destroy(p_self: sys::GDExtensionVariantPtr) {
        let [tag, first, _] = read_variant(p_self);

        match VariantType::from_sys(tag as u32).map(payload_of) {
            Some(Payload::Handle | Payload::Boxed(_)) => destroy_value_id(first as u64),
            Some(Payload::Object) => unreference_object(first),
            _ => {}
        }
    }

    unsafe extern "C" fn variant_get_type(p_self: sys::GDExtensionConstVariantPtr) -> sys::GDExtensionVariantType {
        read_variant(p_self)[0] as sys::GDExtensionVariantType
    }

    unsafe extern "C" fn classdb_register_extension_class3(
        _p_library: sys::GDExtensionClassLibraryPtr,
        p_class_name: sys::GDExtensionConstStringNamePtr,
        p_parent_class_name: sys::GDExtensionConstStringNamePtr,
        p_extension_funcs: *const sys::GDExtensionClassCreationInfo3,
    ) {
        let class = read_text(p_class_name).unwrap_or_default();
        let parent = read_text(p_parent_class_name).unwrap_or_default();

        let mut state = STATE.lock();
        state.parents.insert(class.clone(), parent);
        state.extension_classes.insert(
            class,
            ExtensionClass {
                info: SendInfo(*p_extension_funcs),
            },
        );
    }

    unsafe extern "C" fn classdb_unregister_extension_class(
        _p_library: sys::GDExtensionClassLibraryPtr,
        p_class_name: sys::GDExtensionConstStringNamePtr,
    ) {
        let class = read_text(p_class_name).unwrap_or_default();

        let mut state = STATE.lock();
        state.extension_classes.remove(&class);
        state.parents.remove(&class);
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests
