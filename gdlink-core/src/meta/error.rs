/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Error types of the public API.

use std::error::Error;
use std::fmt;

use crate::sys;

/// Misuse of a handle tracked in a [`HandleArena`](crate::obj::HandleArena).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HandleError {
    /// The handle was already ended or released.
    AlreadyReleased { kind: &'static str },

    /// The id refers to a slot that has since been reused for another handle.
    Stale { kind: &'static str },

    /// End was requested on a borrowed handle, which was never ours to hand over.
    NotOwned { kind: &'static str },

    /// Forget was requested on an owned or shared handle, which must be ended or released instead.
    MustRelease { kind: &'static str },

    /// The id was issued for a different handle kind than the one stored (e.g. an id from another arena).
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyReleased { kind } => write!(f, "{kind} handle was already ended or released"),
            Self::Stale { kind } => write!(f, "{kind} handle id is stale; its slot was reused"),
            Self::NotOwned { kind } => write!(f, "{kind} handle is borrowed and cannot be ended"),
            Self::MustRelease { kind } => write!(f, "{kind} handle is owned and must be ended or released"),
            Self::KindMismatch { expected, actual } => {
                write!(f, "handle id for {expected} refers to a {actual} handle")
            }
        }
    }
}

impl Error for HandleError {}

/// Failure to register an extension class.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum RegisterError {
    /// A class with this name is already part of the registry.
    AlreadyRegistered { class: &'static str },

    /// The same virtual method was overridden twice for one class.
    DuplicateVirtual {
        class: &'static str,
        method: &'static str,
    },

    /// The base class is not known to the loaded API manifest.
    UnknownClass { class: String },

    /// Registry classes were already loaded into the engine.
    AlreadyLoaded,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered { class } => write!(f, "class `{class}` is already registered"),
            Self::DuplicateVirtual { class, method } => {
                write!(f, "virtual method `{method}` of class `{class}` is overridden twice")
            }
            Self::UnknownClass { class } => {
                write!(f, "class `{class}` is not part of the loaded API manifest")
            }
            Self::AlreadyLoaded => write!(f, "classes were already loaded into the engine"),
        }
    }
}

impl Error for RegisterError {}

/// Failure to read a typed value out of a [`Variant`](crate::builtin::Variant).
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ConvertError {
    /// The variant holds a value of another type. `actual` is `None` for types gdlink has no tag for.
    WrongType {
        expected: sys::VariantType,
        actual: Option<sys::VariantType>,
    },

    /// The variant holds an integer that does not fit into the requested type.
    OutOfRange { value: i64, target: &'static str },

    /// The variant holds a null or destroyed object, or one that is not of the requested class.
    WrongClass { expected: &'static str },

    /// The engine provides no conversion between the type and `Variant`.
    Unsupported { ty: sys::VariantType },
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongType {
                expected,
                actual: Some(actual),
            } => write!(f, "expected variant of type {expected:?}, got {actual:?}"),
            Self::WrongType { expected, actual: None } => {
                write!(f, "expected variant of type {expected:?}, got an unsupported type")
            }
            Self::OutOfRange { value, target } => write!(f, "integer {value} does not fit into {target}"),
            Self::WrongClass { expected } => write!(f, "variant does not hold a live object of class {expected}"),
            Self::Unsupported { ty } => write!(f, "engine has no variant conversion for type {ty:?}"),
        }
    }
}

impl Error for ConvertError {}

/// Failed call of a Rust function through a [`Callable`](crate::builtin::Callable), as reported to the engine.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum CallError {
    /// Argument `index` has the wrong type or value.
    InvalidArgument { index: usize, expected: sys::VariantType },

    TooFewArguments { expected: usize },

    TooManyArguments { expected: usize },

    /// The function could not complete, e.g. it panicked.
    Failed,
}

impl CallError {
    /// Error for argument `index`, which could not be converted.
    pub fn invalid_argument(index: usize, cause: &ConvertError) -> Self {
        let expected = match cause {
            ConvertError::WrongType { expected, .. } | ConvertError::Unsupported { ty: expected } => *expected,
            ConvertError::OutOfRange { .. } => sys::VariantType::Int,
            ConvertError::WrongClass { .. } => sys::VariantType::Object,
        };

        Self::InvalidArgument { index, expected }
    }

    /// Checks that a call received exactly `expected` arguments.
    pub fn check_arg_count(actual: usize, expected: usize) -> Result<(), Self> {
        match actual.cmp(&expected) {
            std::cmp::Ordering::Less => Err(Self::TooFewArguments { expected }),
            std::cmp::Ordering::Greater => Err(Self::TooManyArguments { expected }),
            std::cmp::Ordering::Equal => Ok(()),
        }
    }

    /// Encoding of the error in a `GDExtensionCallError`.
    pub fn to_sys(&self) -> sys::GDExtensionCallError {
        let (error, argument, expected) = match *self {
            Self::InvalidArgument { index, expected } => (
                sys::GDEXTENSION_CALL_ERROR_INVALID_ARGUMENT,
                i32::try_from(index).unwrap_or(i32::MAX),
                i32::try_from(expected.sys()).unwrap_or(i32::MAX),
            ),
            Self::TooFewArguments { expected } => (
                sys::GDEXTENSION_CALL_ERROR_TOO_FEW_ARGUMENTS,
                0,
                i32::try_from(expected).unwrap_or(i32::MAX),
            ),
            Self::TooManyArguments { expected } => (
                sys::GDEXTENSION_CALL_ERROR_TOO_MANY_ARGUMENTS,
                0,
                i32::try_from(expected).unwrap_or(i32::MAX),
            ),
            Self::Failed => (sys::GDEXTENSION_CALL_ERROR_INVALID_METHOD, 0, 0),
        };

        sys::GDExtensionCallError {
            error,
            argument,
            expected,
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { index, expected } => {
                write!(f, "argument {index} is invalid, expected {expected:?}")
            }
            Self::TooFewArguments { expected } => write!(f, "too few arguments, expected {expected}"),
            Self::TooManyArguments { expected } => write!(f, "too many arguments, expected {expected}"),
            Self::Failed => write!(f, "call failed"),
        }
    }
}

impl Error for CallError {}
