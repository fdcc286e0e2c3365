/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! C declarations from `gdextension_interface.h` (Godot 4.3), limited to what gdlink loads or hands to the engine.
//!
//! Names follow the header. Only 64-bit targets with single-precision `real_t` are described here.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};

pub type GDExtensionBool = u8;
pub type GDExtensionInt = i64;
pub type GDObjectInstanceID = u64;

pub const GDEXTENSION_TRUE: GDExtensionBool = 1;
pub const GDEXTENSION_FALSE: GDExtensionBool = 0;

pub type GDExtensionVariantPtr = *mut c_void;
pub type GDExtensionConstVariantPtr = *const c_void;
pub type GDExtensionUninitializedVariantPtr = *mut c_void;
pub type GDExtensionStringNamePtr = *mut c_void;
pub type GDExtensionConstStringNamePtr = *const c_void;
pub type GDExtensionUninitializedStringNamePtr = *mut c_void;
pub type GDExtensionStringPtr = *mut c_void;
pub type GDExtensionConstStringPtr = *const c_void;
pub type GDExtensionUninitializedStringPtr = *mut c_void;
pub type GDExtensionObjectPtr = *mut c_void;
pub type GDExtensionConstObjectPtr = *const c_void;
pub type GDExtensionTypePtr = *mut c_void;
pub type GDExtensionConstTypePtr = *const c_void;
pub type GDExtensionUninitializedTypePtr = *mut c_void;
pub type GDExtensionMethodBindPtr = *const c_void;
pub type GDExtensionClassLibraryPtr = *mut c_void;
pub type GDExtensionClassInstancePtr = *mut c_void;

pub type GDExtensionVariantType = u32;
pub type GDExtensionInitializationLevel = u32;

pub const GDEXTENSION_INITIALIZATION_CORE: GDExtensionInitializationLevel = 0;
pub const GDEXTENSION_INITIALIZATION_SERVERS: GDExtensionInitializationLevel = 1;
pub const GDEXTENSION_INITIALIZATION_SCENE: GDExtensionInitializationLevel = 2;
pub const GDEXTENSION_INITIALIZATION_EDITOR: GDExtensionInitializationLevel = 3;
pub const GDEXTENSION_MAX_INITIALIZATION_LEVEL: GDExtensionInitializationLevel = 4;

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Interface loading

pub type GDExtensionInterfaceFunctionPtr = Option<unsafe extern "C" fn()>;

pub type GDExtensionInterfaceGetProcAddress = Option<
    unsafe extern "C" fn(p_function_name: *const c_char) -> GDExtensionInterfaceFunctionPtr,
>;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct GDExtensionGodotVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub string: *const c_char,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct GDExtensionInitialization {
    pub minimum_initialization_level: GDExtensionInitializationLevel,
    pub userdata: *mut c_void,
    pub initialize: Option<
        unsafe extern "C" fn(userdata: *mut c_void, p_level: GDExtensionInitializationLevel),
    >,
    pub deinitialize: Option<
        unsafe extern "C" fn(userdata: *mut c_void, p_level: GDExtensionInitializationLevel),
    >,
}

pub type GDExtensionInitializationFunction = Option<
    unsafe extern "C" fn(
        p_get_proc_address: GDExtensionInterfaceGetProcAddress,
        p_library: GDExtensionClassLibraryPtr,
        r_initialization: *mut GDExtensionInitialization,
    ) -> GDExtensionBool,
>;

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Interface functions (loaded by name)

pub type GDExtensionInterfaceGetGodotVersion =
    Option<unsafe extern "C" fn(r_godot_version: *mut GDExtensionGodotVersion)>;

pub type GDExtensionInterfacePrintError = Option<
    unsafe extern "C" fn(
        p_description: *const c_char,
        p_function: *const c_char,
        p_file: *const c_char,
        p_line: i32,
        p_editor_notify: GDExtensionBool,
    ),
>;

pub type GDExtensionInterfacePrintWarning = GDExtensionInterfacePrintError;

pub type GDExtensionPtrConstructor = Option<
    unsafe extern "C" fn(p_base: GDExtensionUninitializedTypePtr, p_args: *const GDExtensionConstTypePtr),
>;

pub type GDExtensionPtrDestructor = Option<unsafe extern "C" fn(p_base: GDExtensionTypePtr)>;

pub type GDExtensionInterfaceVariantGetPtrConstructor = Option<
    unsafe extern "C" fn(
        p_type: GDExtensionVariantType,
        p_constructor: i32,
    ) -> GDExtensionPtrConstructor,
>;

pub type GDExtensionInterfaceVariantGetPtrDestructor =
    Option<unsafe extern "C" fn(p_type: GDExtensionVariantType) -> GDExtensionPtrDestructor>;

pub type GDExtensionInterfaceStringNewWithUtf8CharsAndLen = Option<
    unsafe extern "C" fn(
        r_dest: GDExtensionUninitializedStringPtr,
        p_contents: *const c_char,
        p_size: GDExtensionInt,
    ),
>;

pub type GDExtensionInterfaceStringNameNewWithUtf8CharsAndLen = Option<
    unsafe extern "C" fn(
        r_dest: GDExtensionUninitializedStringNamePtr,
        p_contents: *const c_char,
        p_size: GDExtensionInt,
    ),
>;

pub type GDExtensionInterfaceStringToUtf8Chars = Option<
    unsafe extern "C" fn(
        p_self: GDExtensionConstStringPtr,
        r_text: *mut c_char,
        p_max_write_length: GDExtensionInt,
    ) -> GDExtensionInt,
>;

pub type GDExtensionInterfaceClassdbGetMethodBind = Option<
    unsafe extern "C" fn(
        p_classname: GDExtensionConstStringNamePtr,
        p_methodname: GDExtensionConstStringNamePtr,
        p_hash: GDExtensionInt,
    ) -> GDExtensionMethodBindPtr,
>;

pub type GDExtensionInterfaceObjectMethodBindPtrcall = Option<
    unsafe extern "C" fn(
        p_method_bind: GDExtensionMethodBindPtr,
        p_instance: GDExtensionObjectPtr,
        p_args: *const GDExtensionConstTypePtr,
        r_ret: GDExtensionTypePtr,
    ),
>;

pub type GDExtensionInterfaceClassdbConstructObject = Option<
    unsafe extern "C" fn(p_classname: GDExtensionConstStringNamePtr) -> GDExtensionObjectPtr,
>;

pub type GDExtensionInterfaceObjectDestroy = Option<unsafe extern "C" fn(p_o: GDExtensionObjectPtr)>;

pub type GDExtensionInterfaceObjectGetInstanceId =
    Option<unsafe extern "C" fn(p_object: GDExtensionConstObjectPtr) -> GDObjectInstanceID>;

pub type GDExtensionInterfaceObjectGetInstanceFromId =
    Option<unsafe extern "C" fn(p_instance_id: GDObjectInstanceID) -> GDExtensionObjectPtr>;

pub type GDExtensionInterfaceObjectSetInstance = Option<
    unsafe extern "C" fn(
        p_o: GDExtensionObjectPtr,
        p_classname: GDExtensionConstStringNamePtr,
        p_instance: GDExtensionClassInstancePtr,
    ),
>;

pub type GDExtensionInterfaceClassdbRegisterExtensionClass3 = Option<
    unsafe extern "C" fn(
        p_library: GDExtensionClassLibraryPtr,
        p_class_name: GDExtensionConstStringNamePtr,
        p_parent_class_name: GDExtensionConstStringNamePtr,
        p_extension_funcs: *const GDExtensionClassCreationInfo3,
    ),
>;

pub type GDExtensionInterfaceClassdbUnregisterExtensionClass = Option<
    unsafe extern "C" fn(
        p_library: GDExtensionClassLibraryPtr,
        p_class_name: GDExtensionConstStringNamePtr,
    ),
>;

pub type GDExtensionVariantFromTypeConstructorFunc = Option<
    unsafe extern "C" fn(r_variant: GDExtensionUninitializedVariantPtr, p_type: GDExtensionTypePtr),
>;

pub type GDExtensionTypeFromVariantConstructorFunc = Option<
    unsafe extern "C" fn(r_type: GDExtensionUninitializedTypePtr, p_variant: GDExtensionVariantPtr),
>;

pub type GDExtensionInterfaceGetVariantFromTypeConstructor = Option<
    unsafe extern "C" fn(p_type: GDExtensionVariantType) -> GDExtensionVariantFromTypeConstructorFunc,
>;

pub type GDExtensionInterfaceGetVariantToTypeConstructor = Option<
    unsafe extern "C" fn(p_type: GDExtensionVariantType) -> GDExtensionTypeFromVariantConstructorFunc,
>;

pub type GDExtensionInterfaceVariantNewCopy = Option<
    unsafe extern "C" fn(r_dest: GDExtensionUninitializedVariantPtr, p_src: GDExtensionConstVariantPtr),
>;

pub type GDExtensionInterfaceVariantDestroy = Option<unsafe extern "C" fn(p_self: GDExtensionVariantPtr)>;

pub type GDExtensionInterfaceVariantGetType =
    Option<unsafe extern "C" fn(p_self: GDExtensionConstVariantPtr) -> GDExtensionVariantType>;

pub type GDExtensionInterfaceGlobalGetSingleton =
    Option<unsafe extern "C" fn(p_name: GDExtensionConstStringNamePtr) -> GDExtensionObjectPtr>;

pub type GDExtensionInterfaceClassdbGetClassTag =
    Option<unsafe extern "C" fn(p_classname: GDExtensionConstStringNamePtr) -> *mut c_void>;

pub type GDExtensionInterfaceObjectCastTo = Option<
    unsafe extern "C" fn(p_object: GDExtensionConstObjectPtr, p_class_tag: *mut c_void) -> GDExtensionObjectPtr,
>;

pub type GDExtensionInterfaceCallableCustomCreate = Option<
    unsafe extern "C" fn(
        r_callable: GDExtensionUninitializedTypePtr,
        p_callable_custom_info: *mut GDExtensionCallableCustomInfo,
    ),
>;

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Custom callables

pub type GDExtensionCallErrorType = u32;

pub const GDEXTENSION_CALL_OK: GDExtensionCallErrorType = 0;
pub const GDEXTENSION_CALL_ERROR_INVALID_METHOD: GDExtensionCallErrorType = 1;
pub const GDEXTENSION_CALL_ERROR_INVALID_ARGUMENT: GDExtensionCallErrorType = 2;
pub const GDEXTENSION_CALL_ERROR_TOO_MANY_ARGUMENTS: GDExtensionCallErrorType = 3;
pub const GDEXTENSION_CALL_ERROR_TOO_FEW_ARGUMENTS: GDExtensionCallErrorType = 4;
pub const GDEXTENSION_CALL_ERROR_INSTANCE_IS_NULL: GDExtensionCallErrorType = 5;
pub const GDEXTENSION_CALL_ERROR_METHOD_NOT_CONST: GDExtensionCallErrorType = 6;

#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct GDExtensionCallError {
    pub error: GDExtensionCallErrorType,
    pub argument: i32,
    pub expected: i32,
}

pub type GDExtensionCallableCustomCall = Option<
    unsafe extern "C" fn(
        callable_userdata: *mut c_void,
        p_args: *const GDExtensionConstVariantPtr,
        p_argument_count: GDExtensionInt,
        r_return: GDExtensionVariantPtr,
        r_error: *mut GDExtensionCallError,
    ),
>;
pub type GDExtensionCallableCustomIsValid =
    Option<unsafe extern "C" fn(callable_userdata: *mut c_void) -> GDExtensionBool>;
pub type GDExtensionCallableCustomFree = Option<unsafe extern "C" fn(callable_userdata: *mut c_void)>;
pub type GDExtensionCallableCustomHash = Option<unsafe extern "C" fn(callable_userdata: *mut c_void) -> u32>;
pub type GDExtensionCallableCustomEqual = Option<
    unsafe extern "C" fn(callable_userdata_a: *mut c_void, callable_userdata_b: *mut c_void) -> GDExtensionBool,
>;
pub type GDExtensionCallableCustomLessThan = GDExtensionCallableCustomEqual;
pub type GDExtensionCallableCustomToString = Option<
    unsafe extern "C" fn(
        callable_userdata: *mut c_void,
        r_is_valid: *mut GDExtensionBool,
        r_out: GDExtensionStringPtr,
    ),
>;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct GDExtensionCallableCustomInfo {
    pub callable_userdata: *mut c_void,
    pub token: *mut c_void,
    pub object_id: GDObjectInstanceID,
    pub call_func: GDExtensionCallableCustomCall,
    pub is_valid_func: GDExtensionCallableCustomIsValid,
    pub free_func: GDExtensionCallableCustomFree,
    pub hash_func: GDExtensionCallableCustomHash,
    pub equal_func: GDExtensionCallableCustomEqual,
    pub less_than_func: GDExtensionCallableCustomLessThan,
    pub to_string_func: GDExtensionCallableCustomToString,
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Class registration

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct GDExtensionPropertyInfo {
    pub type_: GDExtensionVariantType,
    pub name: GDExtensionStringNamePtr,
    pub class_name: GDExtensionStringNamePtr,
    pub hint: u32,
    pub hint_string: GDExtensionStringPtr,
    pub usage: u32,
}

pub type GDExtensionClassSet = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_name: GDExtensionConstStringNamePtr,
        p_value: GDExtensionConstVariantPtr,
    ) -> GDExtensionBool,
>;
pub type GDExtensionClassGet = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_name: GDExtensionConstStringNamePtr,
        r_ret: GDExtensionVariantPtr,
    ) -> GDExtensionBool,
>;
pub type GDExtensionClassGetPropertyList = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        r_count: *mut u32,
    ) -> *const GDExtensionPropertyInfo,
>;
pub type GDExtensionClassFreePropertyList2 = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_list: *const GDExtensionPropertyInfo,
        p_count: u32,
    ),
>;
pub type GDExtensionClassPropertyCanRevert = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_name: GDExtensionConstStringNamePtr,
    ) -> GDExtensionBool,
>;
pub type GDExtensionClassPropertyGetRevert = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_name: GDExtensionConstStringNamePtr,
        r_ret: GDExtensionVariantPtr,
    ) -> GDExtensionBool,
>;
pub type GDExtensionClassValidateProperty = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_property: *mut GDExtensionPropertyInfo,
    ) -> GDExtensionBool,
>;
pub type GDExtensionClassNotification2 = Option<
    unsafe extern "C" fn(p_instance: GDExtensionClassInstancePtr, p_what: i32, p_reversed: GDExtensionBool),
>;
pub type GDExtensionClassToString = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        r_is_valid: *mut GDExtensionBool,
        p_out: GDExtensionStringPtr,
    ),
>;
pub type GDExtensionClassReference = Option<unsafe extern "C" fn(p_instance: GDExtensionClassInstancePtr)>;
pub type GDExtensionClassUnreference = GDExtensionClassReference;
pub type GDExtensionClassCreateInstance =
    Option<unsafe extern "C" fn(p_class_userdata: *mut c_void) -> GDExtensionObjectPtr>;
pub type GDExtensionClassFreeInstance = Option<
    unsafe extern "C" fn(p_class_userdata: *mut c_void, p_instance: GDExtensionClassInstancePtr),
>;
pub type GDExtensionClassRecreateInstance = Option<
    unsafe extern "C" fn(
        p_class_userdata: *mut c_void,
        p_object: GDExtensionObjectPtr,
    ) -> GDExtensionClassInstancePtr,
>;
pub type GDExtensionClassCallVirtual = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_args: *const GDExtensionConstTypePtr,
        r_ret: GDExtensionTypePtr,
    ),
>;
pub type GDExtensionClassGetVirtual = Option<
    unsafe extern "C" fn(
        p_class_userdata: *mut c_void,
        p_name: GDExtensionConstStringNamePtr,
    ) -> GDExtensionClassCallVirtual,
>;
pub type GDExtensionClassGetVirtualCallData = Option<
    unsafe extern "C" fn(
        p_class_userdata: *mut c_void,
        p_name: GDExtensionConstStringNamePtr,
    ) -> *mut c_void,
>;
pub type GDExtensionClassCallVirtualWithData = Option<
    unsafe extern "C" fn(
        p_instance: GDExtensionClassInstancePtr,
        p_name: GDExtensionConstStringNamePtr,
        p_virtual_call_userdata: *mut c_void,
        p_args: *const GDExtensionConstTypePtr,
        r_ret: GDExtensionTypePtr,
    ),
>;
pub type GDExtensionClassGetRID =
    Option<unsafe extern "C" fn(p_instance: GDExtensionClassInstancePtr) -> u64>;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct GDExtensionClassCreationInfo3 {
    pub is_virtual: GDExtensionBool,
    pub is_abstract: GDExtensionBool,
    pub is_exposed: GDExtensionBool,
    pub is_runtime: GDExtensionBool,
    pub set_func: GDExtensionClassSet,
    pub get_func: GDExtensionClassGet,
    pub get_property_list_func: GDExtensionClassGetPropertyList,
    pub free_property_list_func: GDExtensionClassFreePropertyList2,
    pub property_can_revert_func: GDExtensionClassPropertyCanRevert,
    pub property_get_revert_func: GDExtensionClassPropertyGetRevert,
    pub validate_property_func: GDExtensionClassValidateProperty,
    pub notification_func: GDExtensionClassNotification2,
    pub to_string_func: GDExtensionClassToString,
    pub reference_func: GDExtensionClassReference,
    pub unreference_func: GDExtensionClassUnreference,
    pub create_instance_func: GDExtensionClassCreateInstance,
    pub free_instance_func: GDExtensionClassFreeInstance,
    pub recreate_instance_func: GDExtensionClassRecreateInstance,
    pub get_virtual_func: GDExtensionClassGetVirtual,
    pub get_virtual_call_data_func: GDExtensionClassGetVirtualCallData,
    pub call_virtual_with_data_func: GDExtensionClassCallVirtualWithData,
    pub get_rid_func: GDExtensionClassGetRID,
    pub class_userdata: *mut c_void,
}
