/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Printing and logging functionality.
//!
//! Errors and warnings go to the Godot console (and editor output) once a binding is installed, and to stderr before
//! that, e.g. while the binding itself fails to load.

use std::ffi::c_char;

use crate::sys;

/// Pushes a warning message to Godot's built-in debugger and to the OS terminal.
///
/// Falls back to stderr when no binding is installed.
#[macro_export]
macro_rules! gd_warn {
    ($fmt:literal $(, $args:expr)* $(,)?) => {
        $crate::log::print_warning(
            &format!($fmt $(, $args)*),
            concat!(file!(), "\0"),
            line!(),
        )
    };
}

/// Pushes an error message to Godot's built-in debugger and to the OS terminal.
///
/// Falls back to stderr when no binding is installed.
#[macro_export]
macro_rules! gd_error {
    ($fmt:literal $(, $args:expr)* $(,)?) => {
        $crate::log::print_error(
            &format!($fmt $(, $args)*),
            concat!(file!(), "\0"),
            line!(),
        )
    };
}

/// Prints to standard output.
#[macro_export]
macro_rules! gd_print {
    ($fmt:literal $(, $args:expr)* $(,)?) => {
        println!($fmt $(, $args)*)
    };
}

pub use crate::{gd_error, gd_print, gd_warn};

#[derive(Copy, Clone)]
enum Level {
    Error,
    Warning,
}

#[doc(hidden)]
pub fn print_error(message: &str, file_nul: &'static str, line: u32) {
    print_with_level(Level::Error, message, file_nul, line)
}

#[doc(hidden)]
pub fn print_warning(message: &str, file_nul: &'static str, line: u32) {
    print_with_level(Level::Warning, message, file_nul, line)
}

fn print_with_level(level: Level, message: &str, file_nul: &'static str, line: u32) {
    let Some(binding) = sys::try_binding() else {
        let prefix = match level {
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
        };
        eprintln!("{prefix}: {message}");
        return;
    };

    // Interior NUL bytes would truncate the message on the engine side.
    let msg = format!("{}\0", message.replace('\0', "\\0"));
    let print_fn = match level {
        Level::Error => binding.interface().print_error,
        Level::Warning => binding.interface().print_warning,
    };

    // SAFETY: all strings are NUL-terminated and outlive the call.
    unsafe {
        print_fn(
            msg.as_ptr() as *const c_char,
            c"<function unset>".as_ptr(),
            file_nul.as_ptr() as *const c_char,
            i32::try_from(line).unwrap_or(i32::MAX),
            false as sys::GDExtensionBool,
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::sys::mock;

    #[test]
    fn errors_reach_engine_log() {
        let _session = mock::install();

        crate::gd_error!("cannot load {}", "res://scene.tscn");
        crate::gd_warn!("slow frame: {} ms", 40);

        let log = mock::log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].level, mock::LogLevel::Error);
        assert_eq!(log[0].message, "cannot load res://scene.tscn");
        assert!(log[0].file.ends_with("log.rs"));
        assert_eq!(log[1].level, mock::LogLevel::Warning);
        assert_eq!(log[1].message, "slow frame: 40 ms");
    }
}
