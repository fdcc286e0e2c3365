/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Runtime view of Godot's `extension_api.json`.
//!
//! Only the parts that drive method-bind resolution are modeled: the header version, classes with their base, and
//! methods with hash and argument/return types. Unknown JSON keys are ignored, so a full `extension_api.json` dump
//! deserializes as well.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::FrameSignature;

/// Manifest describing the classes whose methods ship with gdlink's own engine wrappers.
pub const BUILTIN_MANIFEST: &str = include_str!("extension_api.json");

#[derive(Clone, Debug, Deserialize)]
pub struct ApiManifest {
    pub header: ManifestHeader,
    #[serde(default)]
    pub classes: Vec<ManifestClass>,
    #[serde(default)]
    pub singletons: Vec<ManifestSingleton>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub version_patch: u8,
    #[serde(default)]
    pub version_full_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestClass {
    pub name: String,
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default)]
    pub methods: Vec<ManifestMethod>,
}

/// Engine object reachable by name through `global_get_singleton`.
#[derive(Clone, Debug, Deserialize)]
pub struct ManifestSingleton {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestMethod {
    pub name: String,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub hash: Option<i64>,
    #[serde(default)]
    pub arguments: Vec<ManifestArgument>,
    #[serde(default)]
    pub return_value: Option<ManifestReturn>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub meta: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestReturn {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub meta: Option<String>,
}

impl ApiManifest {
    /// Parses and validates a manifest.
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(json).map_err(ManifestError::Json)?;
        manifest.validate()?;

        Ok(manifest)
    }

    pub fn builtin() -> Result<Self, ManifestError> {
        Self::parse(BUILTIN_MANIFEST)
    }

    /// `(major, minor, patch)` of the Godot version the manifest was dumped from.
    pub fn version(&self) -> (u8, u8, u8) {
        let h = &self.header;
        (h.version_major, h.version_minor, h.version_patch)
    }

    pub fn class(&self, name: &str) -> Option<&ManifestClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// All methods that can be called through a method bind: non-virtual, with a compatibility hash.
    pub fn bindable_methods(&self) -> impl Iterator<Item = (&ManifestClass, &ManifestMethod, i64)> {
        self.classes.iter().flat_map(|class| {
            class
                .methods
                .iter()
                .filter(|m| !m.is_virtual)
                .filter_map(move |m| m.hash.map(|hash| (class, m, hash)))
        })
    }

    fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashMap::new();
        for class in &self.classes {
            if seen.insert(class.name.as_str(), ()).is_some() {
                return Err(ManifestError::DuplicateClass {
                    class: class.name.clone(),
                });
            }
        }

        for singleton in &self.singletons {
            if !seen.contains_key(singleton.type_.as_str()) {
                return Err(ManifestError::UnknownSingletonClass {
                    singleton: singleton.name.clone(),
                    class: singleton.type_.clone(),
                });
            }
        }

        for class in &self.classes {
            if let Some(base) = &class.inherits {
                if !seen.contains_key(base.as_str()) {
                    return Err(ManifestError::UnknownBase {
                        class: class.name.clone(),
                        base: base.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl ManifestMethod {
    /// Frame layout that a ptrcall to this method must use.
    pub fn frame_signature(&self) -> FrameSignature {
        FrameSignature {
            arg_words: self
                .arguments
                .iter()
                .map(|arg| slot_words_for_type(&arg.type_))
                .collect(),
            ret_words: self
                .return_value
                .as_ref()
                .map_or(0, |ret| slot_words_for_type(&ret.type_)),
        }
    }
}

/// Width in machine words of a ptrcall slot holding a value of the Godot type `godot_ty`.
///
/// Sizes are those of 64-bit builds with single-precision `real_t`. Anything not listed is a single word: numbers
/// (always 64-bit in ptrcalls), enums and bitfields, objects, native pointers and the one-pointer builtin handles.
pub fn slot_words_for_type(godot_ty: &str) -> usize {
    let bytes = match godot_ty {
        "Vector3" | "Vector3i" | "Color" | "Rect2" | "Rect2i" | "Vector4" | "Vector4i"
        | "Plane" | "Quaternion" | "Callable" | "Signal" => 16,
        "Transform2D" | "AABB" | "Variant" => 24,
        "Basis" => 36,
        "Transform3D" => 48,
        "Projection" => 64,
        packed if packed.starts_with("Packed") && packed.ends_with("Array") => 16,
        _ => 8,
    };

    crate::slot_words(bytes)
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

/// Error while reading an API manifest.
#[derive(Debug)]
pub enum ManifestError {
    Json(serde_json::Error),
    DuplicateClass { class: String },
    UnknownBase { class: String, base: String },
    UnknownSingletonClass { singleton: String, class: String },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "malformed API manifest: {e}"),
            Self::DuplicateClass { class } => {
                write!(f, "class `{class}` appears more than once in API manifest")
            }
            Self::UnknownBase { class, base } => write!(
                f,
                "class `{class}` inherits `{base}`, which is missing from API manifest"
            ),
            Self::UnknownSingletonClass { singleton, class } => write!(
                f,
                "singleton `{singleton}` has class `{class}`, which is missing from API manifest"
            ),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_manifest_parses() {
        let manifest = ApiManifest::builtin().expect("builtin manifest is valid");

        assert_eq!(manifest.version(), (4, 3, 0));
        assert_eq!(
            manifest.class("Node3D").and_then(|c| c.inherits.as_deref()),
            Some("Node")
        );

        assert_eq!(manifest.singletons.len(), 1);
        assert_eq!(manifest.singletons[0].type_, "Engine");

        // Virtual methods have no bind.
        assert!(manifest
            .bindable_methods()
            .all(|(_, method, _)| !method.name.starts_with('_')));
    }

    #[test]
    fn frame_signature_from_types() {
        let manifest = ApiManifest::builtin().unwrap();
        let node3d = manifest.class("Node3D").unwrap();

        let set_transform = node3d
            .methods
            .iter()
            .find(|m| m.name == "set_transform")
            .unwrap();
        assert_eq!(set_transform.frame_signature().arg_words, vec![6]);
        assert_eq!(set_transform.frame_signature().ret_words, 0);

        let get_position = node3d
            .methods
            .iter()
            .find(|m| m.name == "get_position")
            .unwrap();
        assert_eq!(get_position.frame_signature().arg_words, Vec::<usize>::new());
        assert_eq!(get_position.frame_signature().ret_words, 2);
    }

    #[test]
    fn type_widths() {
        assert_eq!(slot_words_for_type("bool"), 1);
        assert_eq!(slot_words_for_type("int"), 1);
        assert_eq!(slot_words_for_type("enum::Error"), 1);
        assert_eq!(slot_words_for_type("Node"), 1);
        assert_eq!(slot_words_for_type("const void*"), 1);
        assert_eq!(slot_words_for_type("Callable"), 2);
        assert_eq!(slot_words_for_type("PackedByteArray"), 2);
        assert_eq!(slot_words_for_type("Variant"), 3);
        assert_eq!(slot_words_for_type("Basis"), 5);
    }

    #[test]
    fn rejects_unknown_base() {
        let json = r#"{
            "header": { "version_major": 4, "version_minor": 3, "version_patch": 0 },
            "classes": [ { "name": "Node", "inherits": "Object" } ]
        }"#;

        let err = ApiManifest::parse(json).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownBase { ref base, .. } if base == "Object"));
    }

    #[test]
    fn rejects_singleton_of_unknown_class() {
        let json = r#"{
            "header": { "version_major": 4, "version_minor": 3, "version_patch": 0 },
            "classes": [ { "name": "Object" } ],
            "singletons": [ { "name": "Input", "type": "Input" } ]
        }"#;

        let err = ApiManifest::parse(json).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownSingletonClass { ref class, .. } if class == "Input"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            ApiManifest::parse("{ \"header\": 3 }"),
            Err(ManifestError::Json(_))
        ));
    }
}
