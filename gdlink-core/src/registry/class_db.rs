/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

/// Static metadata of an engine class: name, base class and the virtual methods it declares itself.
///
/// Virtual methods are numbered depth-first starting at `Object`: a class's own virtuals follow those of all its
/// ancestors. An extension class therefore needs a table of [`virtual_total()`](Self::virtual_total) slots to hold
/// an override of any virtual along its base chain.
pub struct ClassInfo {
    name: &'static str,
    base: Option<&'static ClassInfo>,
    virtuals: &'static [&'static str],
}

impl ClassInfo {
    pub const fn new(
        name: &'static str,
        base: Option<&'static ClassInfo>,
        virtuals: &'static [&'static str],
    ) -> Self {
        Self { name, base, virtuals }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn base(&self) -> Option<&'static ClassInfo> {
        self.base
    }

    /// Virtual methods declared by this class itself, excluding inherited ones.
    pub const fn virtuals(&self) -> &'static [&'static str] {
        self.virtuals
    }

    /// Slot of this class's first own virtual method.
    pub const fn virtual_offset(&self) -> usize {
        let mut offset = 0;
        let mut current = self.base;
        while let Some(class) = current {
            offset += class.virtuals.len();
            current = class.base;
        }
        offset
    }

    /// Number of virtual slots of this class, inherited ones included.
    pub const fn virtual_total(&self) -> usize {
        self.virtual_offset() + self.virtuals.len()
    }

    /// Slot of a virtual method declared by this class itself. Usable in constants.
    ///
    /// # Panics
    /// If this class does not declare `name`. In a constant, this is a compile-time error.
    pub const fn own_virtual_slot(&self, name: &str) -> usize {
        let mut i = 0;
        while i < self.virtuals.len() {
            if str_eq(self.virtuals[i], name) {
                return self.virtual_offset() + i;
            }
            i += 1;
        }
        panic!("virtual method is not declared by this class");
    }

    /// Slot of virtual method `name`, looked up in this class and then along its base chain.
    ///
    /// A redeclared virtual (same name in class and ancestor) resolves to the most derived declaration.
    pub fn resolve_virtual(&self, name: &str) -> Option<usize> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(pos) = class.virtuals.iter().position(|v| *v == name) {
                return Some(class.virtual_offset() + pos);
            }
            current = class.base;
        }
        None
    }

    /// Name of the virtual method in slot `index`.
    pub fn virtual_name(&self, index: usize) -> Option<&'static str> {
        let mut current = Some(self);
        while let Some(class) = current {
            let offset = class.virtual_offset();
            if index >= offset {
                return class.virtuals.get(index - offset).copied();
            }
            current = class.base;
        }
        None
    }

    /// Whether this class is `ancestor` or derives from it.
    pub fn inherits(&self, ancestor: &str) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == ancestor {
                return true;
            }
            current = class.base;
        }
        false
    }
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }

    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("base", &self.base.map(ClassInfo::name))
            .field("virtuals", &self.virtuals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static OBJECT: ClassInfo = ClassInfo::new("Object", None, &[]);
    static NODE: ClassInfo = ClassInfo::new("Node", Some(&OBJECT), &["_process", "_ready"]);
    static NODE3D: ClassInfo = ClassInfo::new("Node3D", Some(&NODE), &["_enter_world"]);
    static CUSTOM: ClassInfo = ClassInfo::new("Custom", Some(&NODE3D), &["_process"]);

    #[test]
    fn slots_are_numbered_from_the_root() {
        assert_eq!(OBJECT.virtual_total(), 0);
        assert_eq!(NODE.virtual_offset(), 0);
        assert_eq!(NODE3D.virtual_offset(), 2);
        assert_eq!(NODE3D.virtual_total(), 3);

        const TOTAL: usize = NODE3D.virtual_total();
        assert_eq!(TOTAL, 3);
    }

    #[test]
    fn resolve_walks_base_chain() {
        assert_eq!(NODE3D.resolve_virtual("_ready"), Some(1));
        assert_eq!(NODE3D.resolve_virtual("_enter_world"), Some(2));
        assert_eq!(NODE3D.resolve_virtual("_unknown"), None);
        assert_eq!(NODE.resolve_virtual("_enter_world"), None);

        assert_eq!(NODE3D.virtual_name(1), Some("_ready"));
        assert_eq!(NODE3D.own_virtual_slot("_enter_world"), 2);
        assert_eq!(NODE3D.virtual_name(3), None);
    }

    #[test]
    fn redeclared_virtual_resolves_to_derived() {
        assert_eq!(CUSTOM.resolve_virtual("_process"), Some(3));
        assert_eq!(CUSTOM.resolve_virtual("_ready"), Some(1));
    }

    #[test]
    fn inheritance() {
        assert!(NODE3D.inherits("Object"));
        assert!(NODE3D.inherits("Node3D"));
        assert!(!NODE.inherits("Node3D"));
    }
}
