/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Wrappers of engine classes.
//!
//! Every class lives in its own module, together with a `virtuals` sidecar module: one marker type per virtual method
//! the class declares, to be used with [`ClassBuilder::on()`](crate::registry::ClassBuilder::on).
//!
//! Methods are resolved lazily in the loaded method table, once per call site.

/// Declares an engine class wrapper, its place in the hierarchy and its virtual methods.
///
/// ```ignore
/// engine_class! {
///     /// Docs.
///     class Node3D: Node, Object;
///
///     virtuals {
///         fn _enter_world as EnterWorld();
///     }
/// }
/// ```
///
/// The first class after the colon is the direct base; the following ones are the remaining ancestors.
macro_rules! engine_class {
    (
        $(#[$attr:meta])*
        class Object;
    ) => {
        engine_class!(@struct $(#[$attr])* Object);

        unsafe impl $crate::obj::EngineClass for Object {
            type Base = Object;

            const CLASS_INFO: &'static $crate::registry::ClassInfo =
                &$crate::registry::ClassInfo::new("Object", None, &[]);

            engine_class!(@raw_fns);
        }
    };

    (
        $(#[$attr:meta])*
        class $Class:ident : $Base:ident $(, $Ancestor:ident)*;

        virtuals {
            $(
                $(#[$vattr:meta])*
                fn $virt:ident as $Marker:ident ( $($param:ident : $Param:ty),* $(,)? ) $(-> $Ret:ty)?;
            )*
        }
    ) => {
        engine_class!(@struct $(#[$attr])* $Class);

        unsafe impl $crate::obj::EngineClass for $Class {
            type Base = $Base;

            const CLASS_INFO: &'static $crate::registry::ClassInfo = &$crate::registry::ClassInfo::new(
                stringify!($Class),
                Some(<$Base as $crate::obj::EngineClass>::CLASS_INFO),
                &[$(stringify!($virt)),*],
            );

            engine_class!(@raw_fns);
        }

        impl std::ops::Deref for $Class {
            type Target = $Base;

            fn deref(&self) -> &$Base {
                <$Base as $crate::obj::EngineClass>::from_raw_ref(&self.raw)
            }
        }

        unsafe impl $crate::obj::Inherits<$Base> for $Class {}
        $( unsafe impl $crate::obj::Inherits<$Ancestor> for $Class {} )*

        /// Virtual methods declared by this class.
        pub mod virtuals {
            #[allow(unused_imports)]
            use super::*;

            $(
                $(#[$vattr])*
                #[doc = concat!("Marker of virtual method `", stringify!($Class), "::", stringify!($virt), "`.")]
                pub enum $Marker {}

                impl $crate::registry::VirtualMethod for $Marker {
                    type Class = $Class;
                    type Params = ($($Param,)*);
                    type Ret = engine_class!(@ret $($Ret)?);

                    const NAME: &'static str = stringify!($virt);
                    const INDEX: usize = <$Class as $crate::obj::EngineClass>::CLASS_INFO.own_virtual_slot(stringify!($virt));
                }
            )*
        }
    };

    (@struct $(#[$attr:meta])* $Class:ident) => {
        $(#[$attr])*
        #[derive(Debug)]
        #[repr(transparent)]
        pub struct $Class {
            raw: $crate::obj::ObjPtr,
        }

        unsafe impl $crate::obj::Inherits<$Class> for $Class {}
    };

    (@raw_fns) => {
        fn raw_object(&self) -> $crate::obj::ObjPtr {
            self.raw
        }

        fn from_raw_ref(raw: &$crate::obj::ObjPtr) -> &Self {
            // SAFETY: `repr(transparent)` over `ObjPtr`.
            unsafe { &*(raw as *const $crate::obj::ObjPtr as *const Self) }
        }
    };

    (@ret) => { () };
    (@ret $Ret:ty) => { $Ret };
}

pub(crate) use engine_class;

mod audio_effect_instance;
mod engine;
mod node;
mod node3d;
mod object;
mod ref_counted;

pub use audio_effect_instance::AudioEffectInstance;
pub use engine::Engine;
pub use node::{InternalMode, Node};
pub use node3d::Node3D;
pub use object::Object;
pub use ref_counted::RefCounted;

pub mod virtuals {
    //! Virtual method markers of all engine classes, one module per class.

    pub use super::audio_effect_instance::virtuals as audio_effect_instance;
    pub use super::node::virtuals as node;
}

use crate::builtin::StringName;
use crate::meta::{FromGodot, OutParamTuple, Signature};
use crate::obj::{Borrowed, EngineClass, Inherits, Obj, ObjPtr};
use crate::sys;

/// Calls an engine method on `object`.
///
/// # Panics
/// If the object was destroyed. The pointer never reaches the engine in that case.
fn ptrcall<P: OutParamTuple, R: FromGodot>(bind: &'static sys::MethodBindCache, object: ObjPtr, args: P) -> R {
    let binding = sys::binding();
    let entry = bind.resolve(binding);
    object.ensure_alive(entry.class_name(), entry.method_name());

    // SAFETY: wrappers declare `P` and `R` after the method's manifest signature; frame validation double-checks the
    // layout. `object` is the receiver's object pointer.
    unsafe { Signature::<P, R>::out_class_ptrcall(binding, entry, object.as_ptr(), args) }
}

/// Engine singleton `name`, checked to be a `C`. The engine owns singletons for its whole lifetime.
///
/// # Panics
/// If the engine has no singleton of that name, or it is of another class.
fn singleton<C: EngineClass + Inherits<Object>>(name: &str) -> Obj<C, Borrowed> {
    let binding = sys::binding();
    let string_name = StringName::from_str(name);

    // SAFETY: unknown names yield null; known ones a live object.
    let raw = unsafe {
        let ptr = (binding.interface().global_get_singleton)(string_name.raw().sys());
        ObjPtr::from_obj_sys(ptr)
    };
    assert!(!raw.is_null(), "engine has no singleton `{name}`");

    // SAFETY: singletons live until the engine shuts down.
    let object = unsafe { Obj::<Object, Borrowed>::borrow(raw) };
    object
        .try_cast::<C>()
        .unwrap_or_else(|_| panic!("singleton `{name}` is not of class {}", C::class_name()))
}
