/*
 * Copyright (c) godot-rust; Bromeon and contributors.
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use proc_macro2::{Ident, Span, TokenStream, TokenTree};
use quote::format_ident;
use venial::{Error, Impl};

use crate::ParseResult;

pub fn ident(s: &str) -> Ident {
    format_ident!("{}", s)
}

pub fn bail<R>(msg: impl AsRef<str>, span: Span) -> ParseResult<R> {
    Err(error(msg, span))
}

pub fn error(msg: impl AsRef<str>, span: Span) -> Error {
    Error::new_at_span(span, msg.as_ref())
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Key-value parsing of proc attributes

/// Arguments of the form `key = ident, key2 = ident2` inside an attribute.
pub(crate) struct KvArgs {
    entries: Vec<(Ident, Ident)>,
}

impl KvArgs {
    pub fn parse(meta: TokenStream) -> ParseResult<Self> {
        let mut entries: Vec<(Ident, Ident)> = Vec::new();
        let mut tokens = meta.into_iter();

        while let Some(tt) = tokens.next() {
            let span = tt.span();
            let TokenTree::Ident(key) = tt else {
                return bail("expected key", span);
            };

            match tokens.next() {
                Some(TokenTree::Punct(p)) if p.as_char() == '=' => {}
                Some(tt) => return bail("expected `=` after key", tt.span()),
                None => return bail(format!("missing value for key `{key}`"), key.span()),
            }

            let value = match tokens.next() {
                Some(TokenTree::Ident(value)) => value,
                Some(tt) => return bail("expected identifier", tt.span()),
                None => return bail(format!("missing value for key `{key}`"), key.span()),
            };

            if entries.iter().any(|(existing, _)| *existing == key) {
                return bail(format!("duplicate key `{key}`"), key.span());
            }
            entries.push((key, value));

            match tokens.next() {
                Some(TokenTree::Punct(p)) if p.as_char() == ',' => {}
                Some(tt) => return bail("expected `,` between arguments", tt.span()),
                None => break,
            }
        }

        Ok(Self { entries })
    }

    /// Removes and returns the value for `key`, if present.
    pub fn take_ident(&mut self, key: &str) -> Option<Ident> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Fails if any key was not taken.
    pub fn finish(self) -> ParseResult<()> {
        match self.entries.first() {
            Some((key, _)) => bail(format!("unrecognized key `{key}`"), key.span()),
            None => Ok(()),
        }
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------
// Validation of impl blocks

/// Validates that the declaration is `impl Trait for SomeType`, with `Trait` named `expected_trait` and `SomeType` a
/// simple, non-generic path.
pub(crate) fn validate_impl(original_impl: &Impl, expected_trait: &str, attr: &str) -> ParseResult<Ident> {
    let span = original_impl.tk_impl.span();

    let is_expected_trait = original_impl
        .trait_ty
        .as_ref()
        .and_then(extract_typename)
        .is_some_and(|seg| seg.ident == expected_trait);

    if !is_expected_trait {
        return bail(
            format!("#[{attr}] for trait impls requires trait to be `{expected_trait}`"),
            span,
        );
    }

    match extract_typename(&original_impl.self_ty) {
        Some(segment) if segment.generic_args.is_none() => Ok(segment.ident),
        Some(_) => bail(format!("#[{attr}] does not support generic arguments"), span),
        None => bail(format!("#[{attr}] requires Self type to be a simple path"), span),
    }
}

/// Gets the right-most type name in the path.
fn extract_typename(ty: &venial::TypeExpr) -> Option<venial::PathSegment> {
    match ty.as_path() {
        Some(mut path) => path.segments.pop(),
        _ => None,
    }
}

// ----------------------------------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn kv_args_take_and_finish() {
        let mut args = KvArgs::parse(quote! { entry_point = my_init }).unwrap();

        assert_eq!(args.take_ident("entry_point").unwrap(), "my_init");
        assert!(args.take_ident("entry_point").is_none());
        assert!(args.finish().is_ok());
    }

    #[test]
    fn kv_args_empty() {
        let args = KvArgs::parse(TokenStream::new()).unwrap();
        assert!(args.finish().is_ok());
    }

    #[test]
    fn kv_args_reject_malformed() {
        assert!(KvArgs::parse(quote! { entry_point }).is_err());
        assert!(KvArgs::parse(quote! { entry_point = 5 }).is_err());
        assert!(KvArgs::parse(quote! { a = b c = d }).is_err());
        assert!(KvArgs::parse(quote! { a = b, a = c }).is_err());

        let args = KvArgs::parse(quote! { unknown = x, }).unwrap();
        assert!(args.finish().is_err());
    }

    #[test]
    fn impl_must_name_trait() {
        let item = venial::parse_item(quote! { unsafe impl ExtensionLibrary for MyExtension {} }).unwrap();
        let venial::Item::Impl(impl_decl) = item else {
            panic!("expected impl");
        };
        assert_eq!(
            validate_impl(&impl_decl, "ExtensionLibrary", "gdextension").unwrap(),
            "MyExtension"
        );

        let item = venial::parse_item(quote! { impl Other for MyExtension {} }).unwrap();
        let venial::Item::Impl(impl_decl) = item else {
            panic!("expected impl");
        };
        assert!(validate_impl(&impl_decl, "ExtensionLibrary", "gdextension").is_err());
    }
}
