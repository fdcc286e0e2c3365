/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::ffi::c_void;
use std::panic::AssertUnwindSafe;
use std::ptr;

use crate::builtin::{Callable, GString, Variant};
use crate::meta::error::CallError;
use crate::obj::{Borrowed, EngineClass, Obj, Ownership};
use crate::sys;

impl Callable {
    /// Creates a callable that runs a Rust function, e.g. to connect it to a signal.
    ///
    /// The function receives the call's arguments as borrowed variants and returns the call's result. `name` is what
    /// the engine prints for the callable.
    ///
    /// The function is dropped once the engine releases the last copy of the callable. Since the engine may call it
    /// from any thread, it must be `Send + Sync`.
    ///
    /// ```ignore
    /// let sum = Callable::from_fn("sum", |args| {
    ///     CallError::check_arg_count(args.len(), 2)?;
    ///     let a: i64 = args[0].try_to().map_err(|e| CallError::invalid_argument(0, &e))?;
    ///     let b: i64 = args[1].try_to().map_err(|e| CallError::invalid_argument(1, &e))?;
    ///     Ok(Variant::from_value(&(a + b)))
    /// });
    /// ```
    pub fn from_fn<F>(name: &str, function: F) -> Self
    where
        F: 'static + Send + Sync + FnMut(&[Variant<Borrowed>]) -> Result<Variant, CallError>,
    {
        Self::from_custom_info(custom_info(name, function, 0))
    }

    /// Like [`from_fn()`](Self::from_fn), but bound to `object`: once the object is destroyed, the engine considers
    /// the callable invalid and no longer calls the function.
    ///
    /// # Panics
    /// If the object was destroyed already.
    pub fn from_object_fn<C, O, F>(object: &Obj<C, O>, name: &str, function: F) -> Self
    where
        C: EngineClass,
        O: Ownership,
        F: 'static + Send + Sync + FnMut(&[Variant<Borrowed>]) -> Result<Variant, CallError>,
    {
        object.raw().ensure_alive(C::class_name(), "Callable::from_object_fn");
        let object_id = object.instance_id().map_or(0, |id| id.to_u64());

        Self::from_custom_info(custom_info(name, function, object_id))
    }

    fn from_custom_info(mut info: sys::GDExtensionCallableCustomInfo) -> Self {
        let binding = sys::binding();
        let mut raw = sys::RawCallable::null();

        // SAFETY: the engine takes over the userdata, and frees it through `free_func`. The handle is new and ours.
        unsafe {
            (binding.interface().callable_custom_create)(raw.sys_mut(), ptr::addr_of_mut!(info));
            Self::from_raw(raw)
        }
    }
}

fn custom_info<F>(name: &str, function: F, object_id: u64) -> sys::GDExtensionCallableCustomInfo
where
    F: 'static + Send + Sync + FnMut(&[Variant<Borrowed>]) -> Result<Variant, CallError>,
{
    let userdata = FnWrapper {
        function,
        name: name.to_string(),
    };

    sys::GDExtensionCallableCustomInfo {
        callable_userdata: Box::into_raw(Box::new(userdata)) as *mut c_void,
        token: sys::binding().library(),
        object_id,
        call_func: Some(rust_callable_call::<F>),
        is_valid_func: None,
        free_func: Some(rust_callable_free::<F>),
        hash_func: None,
        equal_func: None,
        less_than_func: None,
        to_string_func: Some(rust_callable_to_string::<F>),
    }
}

/// Userdata of a callable created by [`Callable::from_fn()`].
struct FnWrapper<F> {
    function: F,
    name: String,
}

unsafe fn wrapper_from_raw<'a, F>(callable_userdata: *mut c_void) -> &'a mut FnWrapper<F> {
    &mut *(callable_userdata as *mut FnWrapper<F>)
}

unsafe extern "C" fn rust_callable_call<F>(
    callable_userdata: *mut c_void,
    p_args: *const sys::GDExtensionConstVariantPtr,
    p_argument_count: sys::GDExtensionInt,
    r_return: sys::GDExtensionVariantPtr,
    r_error: *mut sys::GDExtensionCallError,
) where
    F: FnMut(&[Variant<Borrowed>]) -> Result<Variant, CallError>,
{
    let wrapper = wrapper_from_raw::<F>(callable_userdata);

    let count = usize::try_from(p_argument_count).unwrap_or(0);
    let args: Vec<Variant<Borrowed>> = if count == 0 || p_args.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(p_args, count)
            .iter()
            // SAFETY: the engine lends the arguments for the duration of the call.
            .map(|&arg| Variant::<Borrowed>::borrow(<sys::RawVariant as sys::GodotFfi>::from_sys(arg)))
            .collect()
    };

    let name = &wrapper.name;
    let function = &mut wrapper.function;
    let result = crate::private::handle_panic(
        || format!("callable `{name}`"),
        AssertUnwindSafe(|| function(&args)),
    );

    let error = match result {
        Ok(Ok(ret)) => {
            // The engine passes a nil variant, which holds nothing to destroy before overwriting.
            ptr::write(r_return as *mut sys::RawVariant, ret.end());
            sys::GDExtensionCallError {
                error: sys::GDEXTENSION_CALL_OK,
                argument: 0,
                expected: 0,
            }
        }
        Ok(Err(err)) => {
            crate::gd_error!("callable `{}` failed: {}", wrapper.name, err);
            err.to_sys()
        }
        Err(_panic) => CallError::Failed.to_sys(),
    };

    if !r_error.is_null() {
        *r_error = error;
    }
}

unsafe extern "C" fn rust_callable_free<F>(callable_userdata: *mut c_void) {
    let _drop = Box::from_raw(callable_userdata as *mut FnWrapper<F>);
}

unsafe extern "C" fn rust_callable_to_string<F>(
    callable_userdata: *mut c_void,
    r_is_valid: *mut sys::GDExtensionBool,
    r_out: sys::GDExtensionStringPtr,
) {
    let wrapper = wrapper_from_raw::<F>(callable_userdata);

    // The engine adopts the string.
    ptr::write(r_out as *mut sys::RawString, GString::from_str(&wrapper.name).end());
    *r_is_valid = sys::GDEXTENSION_TRUE;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::classes::Node;
    use crate::sys::mock;

    fn sum() -> Callable {
        Callable::from_fn("sum", |args| {
            CallError::check_arg_count(args.len(), 2)?;

            let mut total = 0i64;
            for (index, arg) in args.iter().enumerate() {
                total += arg.try_to::<i64>().map_err(|err| CallError::invalid_argument(index, &err))?;
            }
            Ok(Variant::from_value(&total))
        })
    }

    fn call(callable: &Callable, args: &[&Variant]) -> Result<Variant, sys::GDExtensionCallError> {
        let raws: Vec<sys::RawVariant> = args.iter().map(|arg| arg.raw()).collect();
        let ptrs: Vec<sys::GDExtensionConstVariantPtr> = raws.iter().map(|raw| raw.sys()).collect();
        let callable = callable.raw();

        // SAFETY: a successful call hands over the returned variant.
        mock::call_callable(callable.sys(), &ptrs).map(|ret| unsafe { Variant::from_raw(ret) })
    }

    #[test]
    fn engine_calls_rust_function() {
        let _session = mock::install();
        let callable = sum();
        assert!(mock::is_custom_callable(callable.raw().sys()));

        let ret = call(&callable, &[&Variant::from_value(&40i64), &Variant::from_value(&2i64)]).expect("call");
        assert_eq!(ret.to::<i64>(), 42);
    }

    #[test]
    fn call_errors_reach_engine() {
        let _session = mock::install();
        let callable = sum();

        let err = call(&callable, &[&Variant::from_value(&1i64)]).err();
        assert_eq!(err, Some(CallError::TooFewArguments { expected: 2 }.to_sys()));

        let err = call(&callable, &[&Variant::from_value(&1i64), &Variant::from_value(&true)]).err();
        assert_eq!(
            err.map(|e| (e.error, e.argument)),
            Some((sys::GDEXTENSION_CALL_ERROR_INVALID_ARGUMENT, 1))
        );
    }

    #[test]
    fn panic_becomes_call_error() {
        let _session = mock::install();
        let callable = Callable::from_fn("explode", |_args| panic!("callable panicked"));

        let err = call(&callable, &[]).err();
        assert_eq!(err, Some(CallError::Failed.to_sys()));
    }

    #[test]
    fn function_dropped_with_last_copy() {
        let _session = mock::install();
        let drops = Arc::new(AtomicUsize::new(0));

        struct CountDrop(Arc<AtomicUsize>);
        impl Drop for CountDrop {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let guard = CountDrop(drops.clone());
        let callable = Callable::from_fn("counted", move |_args| {
            let _keep = &guard;
            Ok(Variant::nil())
        });
        let copy = callable.to_owned_copy();

        drop(callable);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(copy);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn engine_prints_name() {
        let _session = mock::install();
        let callable = sum();

        assert_eq!(mock::callable_text(callable.raw().sys()).as_deref(), Some("sum"));
    }

    #[test]
    fn bound_callable_invalid_after_object() {
        let _session = mock::install();
        let node = Obj::<Node>::new_alloc();
        let callable = Callable::from_object_fn(&node, "on_ready", |_args| Ok(Variant::from_value(&true)));

        assert!(call(&callable, &[]).is_ok());

        drop(node);
        let err = call(&callable, &[]).err().map(|e| e.error);
        assert_eq!(err, Some(sys::GDEXTENSION_CALL_ERROR_INSTANCE_IS_NULL));
    }
}
