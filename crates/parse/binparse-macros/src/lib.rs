//! Proc-macro crate for `#[derive(FromBytes)]` and `#[derive(TableEntries)]`.
//!
//! `FromBytes` generates `unsafe impl lumen_binparse::FromBytes for T {}` together with
//! compile-time checks that make the `unsafe` sound:
//!
//! - the struct is `#[repr(C)]` (optionally `packed`),
//! - every field type implements `FromBytes`,
//! - the struct size equals the sum of its field sizes, so the layout has no
//!   implicit padding and mirrors the on-disk/firmware format byte for byte.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Type, parse_macro_input};

mod table_entries;

/// Derives `lumen_binparse::FromBytes` for a `#[repr(C)]` struct.
///
/// # Example
///
/// ```ignore
/// #[derive(Clone, Copy, FromBytes)]
/// #[repr(C, packed)]
/// pub struct SdtHeader {
///     pub signature: [u8; 4],
///     pub length: u32,
///     // ...
/// }
/// ```
#[proc_macro_derive(FromBytes)]
pub fn derive_from_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives a record iterator for an enum of type-length records.
///
/// Every record starts with a type byte and a length byte that covers the
/// whole record. Variants marked `#[entry(type_id = N, min_length = M)]`
/// decode their named fields from `#[field(offset = K)]`. Records of other
/// types become the `#[fallback]` variant, which must be
/// `{ entry_type: u8, length: u8 }`.
///
/// The generated `<Enum>Iter` yields `Result<Enum, lumen_binparse::EntryError>`:
/// a record shorter than `min_length` (or than its header) is `Malformed`,
/// one that runs past the end of the region is `Truncated`. Iteration stops
/// after the first error.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, TableEntries)]
/// pub enum MadtEntry {
///     #[entry(type_id = 1, min_length = 12)]
///     IoApic {
///         #[field(offset = 2)]
///         id: u8,
///         #[field(offset = 4)]
///         address: u32,
///     },
///     #[fallback]
///     Unknown { entry_type: u8, length: u8 },
/// }
/// ```
#[proc_macro_derive(TableEntries, attributes(entry, field, fallback))]
pub fn derive_table_entries(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match table_entries::derive(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    if !has_repr_c(input) {
        return Err(syn::Error::new_spanned(
            name,
            "FromBytes requires #[repr(C)] or #[repr(C, packed)]",
        ));
    }

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "FromBytes cannot be derived for generic structs",
        ));
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "FromBytes can only be derived for structs",
        ));
    };

    let field_types: Vec<&Type> = match &data.fields {
        Fields::Named(named) => named.named.iter().map(|f| &f.ty).collect(),
        Fields::Unnamed(unnamed) => unnamed.unnamed.iter().map(|f| &f.ty).collect(),
        Fields::Unit => Vec::new(),
    };

    let padding_msg = format!("{name} has implicit padding; FromBytes needs an exact layout");

    Ok(quote! {
        const _: fn() = || {
            fn assert_from_bytes<T: ::lumen_binparse::FromBytes>() {}
            #(assert_from_bytes::<#field_types>();)*
        };

        const _: () = assert!(
            ::core::mem::size_of::<#name>() == 0 #(+ ::core::mem::size_of::<#field_types>())*,
            #padding_msg,
        );

        // SAFETY: `#name` is `repr(C)`, has no padding bytes (checked above),
        // and every field accepts any bit pattern (checked above).
        unsafe impl ::lumen_binparse::FromBytes for #name {}
    })
}

fn has_repr_c(input: &DeriveInput) -> bool {
    input.attrs.iter().any(|attr| {
        if !attr.path().is_ident("repr") {
            return false;
        }
        let mut found = false;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("C") {
                found = true;
            }
            // Skip `packed(N)` / `align(N)` arguments.
            if meta.input.peek(syn::token::Paren) {
                let _content;
                syn::parenthesized!(_content in meta.input);
            }
            Ok(())
        });
        found
    })
}
