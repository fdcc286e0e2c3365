/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::num::NonZeroU64;

use crate::meta::{FromGodot, GodotConvert, ToGodot};

/// Represents a non-zero instance ID.
///
/// Godot hands out instance IDs as `u64`, while scripts see them as `i64`. The signed form is the canonical one in
/// this API. In call frames, an ID occupies one `int64_t` slot; zero stands for "no object" and maps to `None`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct InstanceId {
    value: NonZeroU64,
}

impl InstanceId {
    /// Constructs an instance ID from an integer, or `None` if the integer is zero.
    ///
    /// This does *not* check if the instance is valid.
    pub fn try_from_i64(id: i64) -> Option<Self> {
        Self::try_from_u64(id as u64)
    }

    pub(crate) fn try_from_u64(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(|value| Self { value })
    }

    pub fn to_i64(self) -> i64 {
        self.to_u64() as i64
    }

    /// Returns if the object being referred-to is inheriting `RefCounted`.
    ///
    /// No engine round-trip: the information is encoded in the ID itself.
    pub fn is_ref_counted(self) -> bool {
        self.to_u64() & (1u64 << 63) != 0
    }

    pub(crate) fn to_u64(self) -> u64 {
        self.value.get()
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_i64())
    }
}

impl Debug for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "InstanceId({})", self.to_i64())
    }
}

impl GodotConvert for Option<InstanceId> {
    type Via = i64;
}

impl ToGodot for Option<InstanceId> {
    fn to_godot(&self) -> i64 {
        self.map_or(0, InstanceId::to_i64)
    }
}

impl FromGodot for Option<InstanceId> {
    fn from_godot(via: i64) -> Self {
        InstanceId::try_from_i64(via)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_no_instance() {
        assert_eq!(InstanceId::try_from_i64(0), None);
        assert_eq!(<Option<InstanceId>>::from_godot(0), None);
        assert_eq!(None::<InstanceId>.to_godot(), 0);
    }

    #[test]
    fn ref_counted_bit() {
        let plain = InstanceId::try_from_u64(42).unwrap();
        let counted = InstanceId::try_from_u64(42 | 1 << 63).unwrap();

        assert!(!plain.is_ref_counted());
        assert!(counted.is_ref_counted());
        assert!(counted.to_i64() < 0);
        assert_eq!(format!("{plain:?}"), "InstanceId(42)");
    }
}
