/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use proc_macro2::TokenStream;
use quote::quote;

use crate::util::{bail, ident, validate_impl, KvArgs};
use crate::ParseResult;

pub fn attribute_gdextension(meta: TokenStream, item: venial::Item) -> ParseResult<TokenStream> {
    let venial::Item::Impl(impl_decl) = item else {
        return bail(
            "#[gdextension] can only be applied to trait impls",
            proc_macro2::Span::call_site(),
        );
    };

    validate_impl(&impl_decl, "ExtensionLibrary", "gdextension")?;
    if impl_decl.tk_unsafe.is_none() {
        return bail(
            "`impl ExtensionLibrary` must be marked unsafe, to confirm your opt-in to gdlink's safety model",
            impl_decl.tk_impl.span(),
        );
    }

    let mut args = KvArgs::parse(meta)?;
    let entry_point = args.take_ident("entry_point");
    args.finish()?;

    let entry_point = entry_point.unwrap_or_else(|| ident("gdext_rust_init"));
    let impl_ty = &impl_decl.self_ty;

    Ok(quote! {
        #impl_decl

        #[no_mangle]
        unsafe extern "C" fn #entry_point(
            get_proc_address: ::gdlink::sys::GDExtensionInterfaceGetProcAddress,
            library: ::gdlink::sys::GDExtensionClassLibraryPtr,
            init: *mut ::gdlink::sys::GDExtensionInitialization,
        ) -> ::gdlink::sys::GDExtensionBool {
            ::gdlink::private::__gdlink_load_library::<#impl_ty>(
                get_proc_address,
                library,
                init
            )
        }

        // Ensures that the init function matches the signature advertised in the FFI header.
        const _: ::gdlink::sys::GDExtensionInitializationFunction = Some(#entry_point);
    })
}
