/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Internal crate of [**gdlink**](https://docs.rs/gdlink)
//!
//! Do not depend on this crate directly, instead use the `gdlink` crate.
//! No SemVer or other guarantees are provided.

mod gdextension;
mod util;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;

/// Proc-macro attribute to be used in combination with the [`ExtensionLibrary`] trait.
///
/// Exports the C entry symbol that Godot looks up when loading the library, `gdext_rust_init` by default. Another name
/// can be chosen with `entry_point`, which must then match the `entry_symbol` in the `.gdextension` file:
///
/// ```no_run
/// # use gdlink::prelude::*;
/// struct MyExtension;
///
/// #[gdextension(entry_point = my_extension_init)]
/// unsafe impl ExtensionLibrary for MyExtension {}
/// ```
///
/// [`ExtensionLibrary`]: ../gdlink/init/trait.ExtensionLibrary.html
#[proc_macro_attribute]
pub fn gdextension(meta: TokenStream, input: TokenStream) -> TokenStream {
    translate_meta(meta, input, gdextension::attribute_gdextension)
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Implementation

type ParseResult<T> = Result<T, venial::Error>;

fn translate_meta<F>(meta: TokenStream, input: TokenStream, transform: F) -> TokenStream
where
    F: FnOnce(TokenStream2, venial::Item) -> ParseResult<TokenStream2>,
{
    let meta2 = TokenStream2::from(meta);
    let input2 = TokenStream2::from(input);

    let result2 = venial::parse_item(input2)
        .and_then(|item| transform(meta2, item))
        .unwrap_or_else(|e| e.to_compile_error());

    TokenStream::from(result2)
}
