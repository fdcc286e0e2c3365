/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Internals used by the macros and the engine callbacks. Not part of the public API.

use std::sync::{Arc, Mutex};

use crate::gd_error;

pub use crate::init::__gdlink_load_library;

struct GodotPanicInfo {
    line: u32,
    file: String,
}

pub fn extract_panic_message(err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = err.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("(panic of type ID {:?})", err.type_id())
    }
}

fn format_panic_message(msg: String) -> String {
    // Multi-line messages start on their own line, indented.
    let lbegin = "\n  ";
    let indented = msg.replace('\n', lbegin);

    if indented.len() != msg.len() {
        format!("[panic]{lbegin}{indented}")
    } else {
        format!("[panic]  {msg}")
    }
}

/// Executes `code`. If a panic is thrown, it is caught and an error message is printed to Godot.
///
/// Returns `Err(message)` if a panic occurred, and `Ok(result)` with the result of `code` otherwise.
///
/// Every callback invoked by the engine goes through this, so that no unwinding crosses the C ABI.
pub fn handle_panic<E, F, R, S>(error_context: E, code: F) -> Result<R, String>
where
    E: FnOnce() -> S,
    F: FnOnce() -> R + std::panic::UnwindSafe,
    S: std::fmt::Display,
{
    let info: Arc<Mutex<Option<GodotPanicInfo>>> = Arc::new(Mutex::new(None));

    // Back up previous hook, set new one.
    let prev_hook = std::panic::take_hook();
    {
        let info = info.clone();
        std::panic::set_hook(Box::new(move |panic_info| {
            if let Some(location) = panic_info.location() {
                let mut slot = info.lock().unwrap_or_else(|poison| poison.into_inner());
                *slot = Some(GodotPanicInfo {
                    file: location.file().to_string(),
                    line: location.line(),
                });
            } else {
                eprintln!("panic occurred, but can't get location information");
            }
        }));
    }

    // Run code that may panic, restore hook.
    let panic = std::panic::catch_unwind(code);
    std::panic::set_hook(prev_hook);

    match panic {
        Ok(result) => Ok(result),
        Err(err) => {
            let guard = info.lock().unwrap_or_else(|poison| poison.into_inner());
            match guard.as_ref() {
                Some(info) => gd_error!(
                    "Rust function panicked at {}:{}.\n  Context: {}",
                    info.file,
                    info.line,
                    error_context()
                ),
                None => gd_error!("Rust function panicked.\n  Context: {}", error_context()),
            }

            let msg = format_panic_message(extract_panic_message(err));
            gd_error!("{}", msg);

            Err(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_formats() {
        assert_eq!(format_panic_message("boom".to_string()), "[panic]  boom");
        assert_eq!(
            format_panic_message("first\nsecond".to_string()),
            "[panic]\n  first\n  second"
        );
    }

    #[test]
    fn caught_panic_returns_message() {
        let _session = crate::sys::mock::install();

        let result: Result<(), String> = handle_panic(|| "test context", || panic!("bad value {}", 7));
        assert_eq!(result, Err("[panic]  bad value 7".to_string()));

        let result = handle_panic(|| "test context", || 5);
        assert_eq!(result, Ok(5));

        let log = crate::sys::mock::log();
        assert!(log[0].message.contains("Context: test context"));
        assert_eq!(log[1].message, "[panic]  bad value 7");
    }
}
