/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;
use std::marker::PhantomData;

use crate::meta::{FromGodot, GodotConvert, ToGodot};
use crate::sys;
use sys::GodotFfi;

/// A kind of engine resource that is referred to by an opaque handle.
///
/// Implemented by zero-sized marker types (see [`builtin`](crate::builtin) and [`ObjectKind`](crate::obj::ObjectKind)).
/// The kind knows how to release a handle; the handle itself is just bits.
pub trait HandleKind: 'static {
    /// Bits of the handle, as passed in a call frame.
    type Raw: GodotFfi;

    /// Name used in diagnostics.
    const NAME: &'static str;

    /// Releases an owned handle.
    ///
    /// # Safety
    /// `raw` must be a live handle of this kind, owned by the caller. It is invalid afterwards.
    unsafe fn release(binding: &sys::Binding, raw: Self::Raw);

    /// Gives up one reference of a shared handle.
    ///
    /// # Safety
    /// `raw` must be a live handle of this kind, holding one reference owned by the caller.
    unsafe fn release_shared(binding: &sys::Binding, raw: Self::Raw) {
        Self::release(binding, raw)
    }

    /// Adds a reference to a shared handle and returns the bits of the new handle.
    ///
    /// # Safety
    /// `raw` must be a live handle of this kind.
    unsafe fn duplicate_shared(binding: &sys::Binding, raw: Self::Raw) -> Self::Raw;

    fn is_null(raw: &Self::Raw) -> bool;
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Ownership

/// Runtime counterpart of the [`Ownership`] markers, used where handles are tracked dynamically.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum OwnershipClass {
    /// Released exactly once, by us.
    Owned,

    /// Owned by the engine or another object; never released by us.
    Borrowed,

    /// Reference counted; every handle holds one reference.
    Shared,
}

mod sealed {
    pub trait Sealed {}
}

/// Static ownership of a [`Handle`]: one of [`Owned`], [`Borrowed`], [`Shared`].
pub trait Ownership: sealed::Sealed + 'static {
    const CLASS: OwnershipClass;
}

/// Ownerships whose handles hold something to give up: either release it, or end it and hand it over.
pub trait Releasing: Ownership {}

/// The handle is released exactly once: on drop, unless ended before.
pub enum Owned {}

/// The handle is never released by us.
pub enum Borrowed {}

/// The handle holds one reference of a reference-counted resource.
pub enum Shared {}

impl sealed::Sealed for Owned {}
impl sealed::Sealed for Borrowed {}
impl sealed::Sealed for Shared {}

impl Ownership for Owned {
    const CLASS: OwnershipClass = OwnershipClass::Owned;
}

impl Ownership for Borrowed {
    const CLASS: OwnershipClass = OwnershipClass::Borrowed;
}

impl Ownership for Shared {
    const CLASS: OwnershipClass = OwnershipClass::Shared;
}

impl Releasing for Owned {}
impl Releasing for Shared {}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Handle

/// Typed handle to an engine resource, with its ownership encoded in the type.
///
/// The three operations on handles map to Rust ownership:
/// - _New_: [`from_raw()`](Self::from_raw) (owned), [`borrow()`](Handle::<K, Borrowed>::borrow) (borrowed),
///   [`from_shared()`](Handle::<K, Shared>::from_shared) (shared). These take raw bits, typically a frame result.
/// - _Get_: [`raw()`](Self::raw) returns the bits for a frame slot. Any number of times; never releases.
/// - _End_: [`end()`](Self::end) consumes an owned handle, returning the bits without releasing them. The receiver
///   (usually the engine) is responsible from then on. Since `end()` takes `self`, ending twice does not compile.
///
/// A handle that is not ended is released when dropped: owned handles through the kind's destructor, shared
/// handles by giving up their reference. Borrowed handles are never released.
///
/// Handles are not `Send`: engine resources belong to the thread that created them.
#[repr(transparent)]
pub struct Handle<K: HandleKind, O: Ownership = Owned> {
    raw: K::Raw,
    _marker: PhantomData<(fn() -> K, fn() -> O, *const ())>,
}

impl<K: HandleKind, O: Ownership> Handle<K, O> {
    /// Wraps `raw` without any ownership check. Constructors above decide which `O` is valid.
    pub(crate) fn from_raw_unchecked(raw: K::Raw) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Raw bits of the handle, for a call frame slot. Does not transfer ownership.
    pub fn raw(&self) -> K::Raw {
        self.raw
    }

    pub(crate) fn raw_ref(&self) -> &K::Raw {
        &self.raw
    }

    /// Borrowed view of this handle, e.g. to pass it as an argument. The view cannot outlive `self`.
    ///
    /// ```compile_fail
    /// use gdlink_core::builtin::GString;
    ///
    /// let view = {
    ///     let text = GString::from("temporary");
    ///     text.as_borrowed()
    /// };
    /// drop(view);
    /// ```
    pub fn as_borrowed(&self) -> HandleRef<'_, K> {
        HandleRef {
            raw: self.raw,
            _marker: PhantomData,
        }
    }

    pub fn ownership(&self) -> OwnershipClass {
        O::CLASS
    }

    pub fn is_null(&self) -> bool {
        K::is_null(&self.raw)
    }
}

impl<K: HandleKind> Handle<K, Owned> {
    /// Takes ownership of `raw`.
    ///
    /// # Safety
    /// `raw` must be a live handle of kind `K` that nobody else releases.
    pub unsafe fn from_raw(raw: K::Raw) -> Self {
        Self::from_raw_unchecked(raw)
    }
}

impl<K: HandleKind> Handle<K, Borrowed> {
    /// Wraps `raw` without taking ownership.
    ///
    /// # Safety
    /// `raw` must stay live while the handle is used.
    pub unsafe fn borrow(raw: K::Raw) -> Self {
        Self::from_raw_unchecked(raw)
    }
}

impl<K: HandleKind> Handle<K, Shared> {
    /// Adopts one existing reference of `raw`.
    ///
    /// # Safety
    /// `raw` must be a live handle of kind `K`, carrying one reference that the caller hands over.
    pub unsafe fn from_shared(raw: K::Raw) -> Self {
        Self::from_raw_unchecked(raw)
    }
}

impl<K: HandleKind, O: Releasing> Handle<K, O> {
    /// Ends the handle: returns the raw bits without releasing them.
    ///
    /// The receiver of the bits is now responsible for releasing the resource (or reference).
    #[must_use = "the returned handle must be released by someone"]
    pub fn end(self) -> K::Raw {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}

impl<K: HandleKind, O: Ownership> Drop for Handle<K, O> {
    fn drop(&mut self) {
        if K::is_null(&self.raw) {
            return;
        }

        match O::CLASS {
            OwnershipClass::Borrowed => {}
            OwnershipClass::Owned => {
                sys::out!("release {} handle", K::NAME);
                // SAFETY: owned handles are released exactly once, here, unless ended before.
                unsafe { K::release(sys::binding(), self.raw) }
            }
            OwnershipClass::Shared => {
                // SAFETY: the handle holds one reference.
                unsafe { K::release_shared(sys::binding(), self.raw) }
            }
        }
    }
}

impl<K: HandleKind> Clone for Handle<K, Shared> {
    fn clone(&self) -> Self {
        // SAFETY: `self` is live while borrowed.
        let raw = unsafe { K::duplicate_shared(sys::binding(), self.raw) };
        Self::from_raw_unchecked(raw)
    }
}

impl<K: HandleKind> Clone for Handle<K, Borrowed> {
    fn clone(&self) -> Self {
        Self::from_raw_unchecked(self.raw)
    }
}

impl<K: HandleKind, O: Ownership> fmt::Debug for Handle<K, O>
where
    K::Raw: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &K::NAME)
            .field("ownership", &O::CLASS)
            .field("raw", &self.raw)
            .finish()
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Frame conversions

impl<K: HandleKind, O: Ownership> GodotConvert for Handle<K, O> {
    type Via = K::Raw;
}

/// Passing a borrowed handle as argument lends it for the duration of the call.
///
/// Owned and shared handles are passed through [`as_borrowed()`](Handle::as_borrowed) instead; by value, they would be
/// released before the engine reads the slot.
impl<K: HandleKind> ToGodot for Handle<K, Borrowed> {
    fn to_godot(&self) -> Self::Via {
        self.raw
    }
}

/// Receiving a handle borrows it: the engine lends arguments of virtual calls for the duration of the call.
///
/// Owned and shared handles are never adopted through this trait, since the frame cannot tell who releases the value.
/// Engine wrappers returning a value the caller owns read the raw bits and adopt them with [`Handle::from_raw()`] or
/// [`Handle::from_shared()`].
impl<K: HandleKind> FromGodot for Handle<K, Borrowed> {
    fn from_godot(via: Self::Via) -> Self {
        Self::from_raw_unchecked(via)
    }
}

/// Nullable handles: null bits become `None`.
impl<K: HandleKind> GodotConvert for Option<Handle<K, Borrowed>> {
    type Via = K::Raw;
}

impl<K: HandleKind> FromGodot for Option<Handle<K, Borrowed>> {
    fn from_godot(via: Self::Via) -> Self {
        (!K::is_null(&via)).then(|| Handle::from_raw_unchecked(via))
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// HandleRef

/// Borrowed view of a [`Handle`], valid as long as the handle it was taken from.
///
/// Obtained with [`Handle::as_borrowed()`]. Unlike `Handle<K, Borrowed>`, the view carries the lifetime of its source,
/// so it cannot be used after the source released the resource.
pub struct HandleRef<'a, K: HandleKind> {
    raw: K::Raw,
    _marker: PhantomData<(&'a (), fn() -> K, *const ())>,
}

impl<K: HandleKind> HandleRef<'_, K> {
    pub fn raw(&self) -> K::Raw {
        self.raw
    }

    pub(crate) fn raw_ref(&self) -> &K::Raw {
        &self.raw
    }

    pub fn is_null(&self) -> bool {
        K::is_null(&self.raw)
    }
}

impl<K: HandleKind> Copy for HandleRef<'_, K> {}

impl<K: HandleKind> Clone for HandleRef<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> fmt::Debug for HandleRef<'_, K>
where
    K::Raw: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRef")
            .field("kind", &K::NAME)
            .field("raw", &self.raw)
            .finish()
    }
}

impl<K: HandleKind> GodotConvert for HandleRef<'_, K> {
    type Via = K::Raw;
}

impl<K: HandleKind> ToGodot for HandleRef<'_, K> {
    fn to_godot(&self) -> Self::Via {
        self.raw
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{GString, StringKind};
    use crate::sys::mock;

    #[test]
    fn received_handles_are_borrowed() {
        let _session = mock::install();
        let owner = GString::from("lent by the engine");
        let double_before = mock::stats().double_destroys;
        let live_before = mock::live_values();

        let received = Handle::<StringKind, Borrowed>::from_godot(owner.raw());
        assert_eq!(received.ownership(), OwnershipClass::Borrowed);
        drop(received);

        let maybe = <Option<Handle<StringKind, Borrowed>>>::from_godot(owner.raw());
        assert!(maybe.is_some());
        drop(maybe);

        assert_eq!(mock::live_values(), live_before);
        assert_eq!(owner.to_string(), "lent by the engine");

        drop(owner);
        assert_eq!(mock::stats().double_destroys, double_before);
    }

    #[test]
    fn null_bits_are_none() {
        let _session = mock::install();

        let none = <Option<Handle<StringKind, Borrowed>>>::from_godot(sys::RawString::null());
        assert!(none.is_none());
    }

    #[test]
    fn view_passes_bits_without_release() {
        let _session = mock::install();
        let text = GString::from("viewed");
        let live_before = mock::live_values();

        let view = text.as_borrowed();
        let copy = view;
        assert_eq!(view.to_godot(), text.raw());
        assert_eq!(copy.raw(), text.raw());
        assert!(!copy.is_null());

        assert_eq!(mock::live_values(), live_before);
        drop(text);
        assert_eq!(mock::live_values(), live_before - 1);
    }

    #[test]
    fn owned_adoption_releases_once() {
        let _session = mock::install();
        let double_before = mock::stats().double_destroys;
        let live_before = mock::live_values();

        let raw = GString::from("returned by a call").end();
        let adopted = unsafe { GString::from_raw(raw) };
        assert_eq!(adopted.ownership(), OwnershipClass::Owned);

        drop(adopted);
        assert_eq!(mock::live_values(), live_before);
        assert_eq!(mock::stats().double_destroys, double_before);
    }
}
