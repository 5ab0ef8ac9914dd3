//! Parsing and code generation for `#[derive(TableEntries)]`.
//!
//! The enum describes a stream of records that each start with a type byte
//! and a length byte covering the whole record. The derive emits
//! `<Enum>Iter`, which walks the stream with a `lumen_binparse::Cursor` and
//! decodes each record into the variant registered for its type.

use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, Ident, LitInt, Type, Variant};

/// `#[entry(type_id = N, min_length = M)]` on a variant.
struct EntryAttrs {
    type_id: u8,
    min_length: usize,
}

/// A field decoded at a fixed offset inside its record.
struct ParsedField {
    ident: Ident,
    ty: Type,
    offset: usize,
}

struct ParsedVariant {
    ident: Ident,
    attrs: EntryAttrs,
    fields: Vec<ParsedField>,
}

/// Generates the `TableEntries` derive output.
pub fn derive(input: &DeriveInput) -> syn::Result<TokenStream> {
    let enum_name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "TableEntries cannot be derived for generic enums",
        ));
    }

    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            enum_name,
            "TableEntries can only be derived for enums",
        ));
    };

    let mut entries = Vec::new();
    let mut fallback: Option<&Variant> = None;
    for variant in &data_enum.variants {
        if has_attr(&variant.attrs, "fallback") {
            if fallback.is_some() {
                return Err(syn::Error::new_spanned(
                    &variant.ident,
                    "only one #[fallback] variant is allowed",
                ));
            }
            check_fallback(variant)?;
            fallback = Some(variant);
        } else {
            entries.push(ParsedVariant {
                ident: variant.ident.clone(),
                attrs: parse_entry_attrs(variant)?,
                fields: parse_variant_fields(variant)?,
            });
        }
    }

    let Some(fallback) = fallback else {
        return Err(syn::Error::new_spanned(
            enum_name,
            "TableEntries requires a #[fallback] variant for unknown record types",
        ));
    };
    let fallback_ident = &fallback.ident;

    for (i, entry) in entries.iter().enumerate() {
        if entries[..i]
            .iter()
            .any(|earlier| earlier.attrs.type_id == entry.attrs.type_id)
        {
            return Err(syn::Error::new_spanned(
                &entry.ident,
                "duplicate type_id in TableEntries enum",
            ));
        }
    }

    let iter_name = format_ident!("{}Iter", enum_name);

    let min_length_arms = entries.iter().map(|v| {
        let type_id = Literal::u8_suffixed(v.attrs.type_id);
        let min_length = Literal::usize_unsuffixed(v.attrs.min_length);
        quote! { #type_id => #min_length }
    });

    // Every field must lie inside the minimum record length, so reads from a
    // record that passed the length check cannot come up short.
    let layout_checks = entries.iter().flat_map(|v| {
        let min_length = v.attrs.min_length;
        v.fields.iter().map(move |f| {
            let ty = &f.ty;
            let offset = f.offset;
            let msg = format!(
                "field `{}::{}` extends past min_length {min_length}",
                v.ident, f.ident
            );
            quote! {
                const _: () = assert!(#offset + ::core::mem::size_of::<#ty>() <= #min_length, #msg);
            }
        })
    });

    let decode_arms = entries.iter().map(|v| {
        let variant_ident = &v.ident;
        let type_id = Literal::u8_suffixed(v.attrs.type_id);
        let field_reads = v.fields.iter().map(|f| {
            let field_ident = &f.ident;
            let ty = &f.ty;
            let offset = f.offset;
            quote! {
                #field_ident: <#ty as ::lumen_binparse::FromBytes>::read_at(record, #offset)
                    .unwrap_or_default()
            }
        });
        quote! {
            #type_id => #enum_name::#variant_ident { #(#field_reads),* }
        }
    });

    Ok(quote! {
        #(#layout_checks)*

        /// Iterator over the records of a byte region, in order.
        ///
        /// Stops after the first [`lumen_binparse::EntryError`].
        pub struct #iter_name<'a> {
            cursor: ::lumen_binparse::Cursor<'a>,
            done: bool,
        }

        impl #enum_name {
            /// Creates an iterator over the records in `data`.
            #[must_use]
            pub fn iter(data: &[u8]) -> #iter_name<'_> {
                #iter_name {
                    cursor: ::lumen_binparse::Cursor::new(data),
                    done: false,
                }
            }
        }

        impl #iter_name<'_> {
            fn fail(
                &mut self,
                err: ::lumen_binparse::EntryError,
            ) -> ::core::option::Option<
                ::core::result::Result<#enum_name, ::lumen_binparse::EntryError>,
            > {
                self.done = true;
                ::core::option::Option::Some(::core::result::Result::Err(err))
            }
        }

        impl ::core::iter::Iterator for #iter_name<'_> {
            type Item = ::core::result::Result<#enum_name, ::lumen_binparse::EntryError>;

            fn next(&mut self) -> ::core::option::Option<Self::Item> {
                if self.done || self.cursor.is_empty() {
                    return ::core::option::Option::None;
                }

                let offset = self.cursor.position();
                let remaining = self.cursor.remaining();
                let (::core::option::Option::Some(entry_type), ::core::option::Option::Some(length)) =
                    (self.cursor.read_at::<u8>(0), self.cursor.read_at::<u8>(1))
                else {
                    return self.fail(::lumen_binparse::EntryError::Truncated { offset, remaining });
                };

                let min_length: usize = match entry_type {
                    #(#min_length_arms,)*
                    _ => 2,
                };
                if usize::from(length) < min_length {
                    return self.fail(::lumen_binparse::EntryError::Malformed { offset, length });
                }

                let ::core::result::Result::Ok(record) = self.cursor.advance(usize::from(length))
                else {
                    return self.fail(::lumen_binparse::EntryError::Truncated { offset, remaining });
                };

                let entry = match entry_type {
                    #(#decode_arms,)*
                    _ => #enum_name::#fallback_ident { entry_type, length },
                };
                ::core::option::Option::Some(::core::result::Result::Ok(entry))
            }
        }
    })
}

fn has_attr(attrs: &[syn::Attribute], name: &str) -> bool {
    attrs.iter().any(|a| a.path().is_ident(name))
}

/// The fallback variant must be `Name { entry_type: u8, length: u8 }`.
fn check_fallback(variant: &Variant) -> syn::Result<()> {
    let ok = match &variant.fields {
        Fields::Named(named) => {
            let names: Vec<String> = named
                .named
                .iter()
                .filter_map(|f| f.ident.as_ref().map(ToString::to_string))
                .collect();
            names == ["entry_type", "length"]
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(syn::Error::new_spanned(
            &variant.ident,
            "#[fallback] variant must be `{ entry_type: u8, length: u8 }`",
        ))
    }
}

fn parse_entry_attrs(variant: &Variant) -> syn::Result<EntryAttrs> {
    let attr = variant
        .attrs
        .iter()
        .find(|a| a.path().is_ident("entry"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &variant.ident,
                "variant requires #[entry(type_id = N, min_length = M)] or #[fallback]",
            )
        })?;

    let mut type_id = None;
    let mut min_length = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("type_id") {
            type_id = Some(meta.value()?.parse::<LitInt>()?.base10_parse::<u8>()?);
            Ok(())
        } else if meta.path.is_ident("min_length") {
            min_length = Some(meta.value()?.parse::<LitInt>()?.base10_parse::<usize>()?);
            Ok(())
        } else {
            Err(meta.error("expected `type_id` or `min_length`"))
        }
    })?;

    let type_id = type_id.ok_or_else(|| syn::Error::new_spanned(attr, "missing type_id"))?;
    let min_length =
        min_length.ok_or_else(|| syn::Error::new_spanned(attr, "missing min_length"))?;
    if !(2..=255).contains(&min_length) {
        return Err(syn::Error::new_spanned(
            attr,
            "min_length must cover the 2-byte header and fit in a u8",
        ));
    }
    Ok(EntryAttrs {
        type_id,
        min_length,
    })
}

/// Parses `#[field(offset = N)]` on each named field of an entry variant.
fn parse_variant_fields(variant: &Variant) -> syn::Result<Vec<ParsedField>> {
    let Fields::Named(named) = &variant.fields else {
        return Err(syn::Error::new_spanned(
            &variant.ident,
            "entry variants must have named fields",
        ));
    };

    let mut parsed = Vec::new();
    for field in &named.named {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let attr = field
            .attrs
            .iter()
            .find(|a| a.path().is_ident("field"))
            .ok_or_else(|| {
                syn::Error::new_spanned(&ident, "entry fields require #[field(offset = N)]")
            })?;

        let mut offset = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("offset") {
                offset = Some(meta.value()?.parse::<LitInt>()?.base10_parse::<usize>()?);
                Ok(())
            } else {
                Err(meta.error("expected `offset`"))
            }
        })?;
        let offset =
            offset.ok_or_else(|| syn::Error::new_spanned(&ident, "missing offset in #[field()]"))?;
        if offset < 2 {
            return Err(syn::Error::new_spanned(
                &ident,
                "field offset overlaps the type and length bytes",
            ));
        }

        parsed.push(ParsedField {
            ident,
            ty: field.ty.clone(),
            offset,
        });
    }
    Ok(parsed)
}
