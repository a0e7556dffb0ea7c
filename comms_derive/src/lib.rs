extern crate proc_macro;

use itertools::Itertools;
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

fn parse_newtype_field(data: syn::Data) -> syn::Field {
    let syn::Data::Struct(syn::DataStruct { fields, .. }) = data else {
        panic!("Only structs are supported")
    };

    match fields {
        syn::Fields::Unnamed(syn::FieldsUnnamed { unnamed, .. }) => unnamed
            .into_iter()
            .exactly_one()
            .unwrap_or_else(|_| panic!("Only structs with a single field are supported")),
        syn::Fields::Named(syn::FieldsNamed { named, .. }) => named
            .into_iter()
            .exactly_one()
            .unwrap_or_else(|_| panic!("Only structs with a single field are supported")),
        syn::Fields::Unit => panic!("Only structs with a single field are supported"),
    }
}

fn check_index_type(field: &syn::Field) {
    let syn::Type::Path(syn::TypePath { path, .. }) = &field.ty else {
        panic!("Must be plain identifier")
    };

    let field_type = path
        .segments
        .iter()
        .exactly_one()
        .unwrap_or_else(|_| panic!("Must be plain identifier"))
        .ident
        .to_string();

    match field_type.as_str() {
        "u8" | "u16" | "u32" | "usize" => (),
        _ => panic!("Type {} not handled", field_type),
    }
}

/// Implements `Debug` as `Name(value)` and `Display` as the bare decimal value
#[proc_macro_derive(IndexNewType)]
pub fn derive_index_newtype(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident: struct_name_ident,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let field = parse_newtype_field(data);

    check_index_type(&field);

    let field_name = field
        .ident
        .map_or_else(|| quote::quote!(self.0), |name| quote::quote!(self.#name));

    let debug_format = format!("{}({{}})", struct_name_ident);

    quote::quote!(
        impl core::fmt::Debug for #struct_name_ident {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, #debug_format, self)
            }
        }

        impl core::fmt::Display for #struct_name_ident {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&#field_name, f)
            }
        }
    )
    .into()
}

/// Converts both ways between a newtype and the newtype of the same name in `comms`
#[proc_macro_derive(CommsFromInto)]
pub fn derive_comms_from_into(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident: struct_name_ident,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let field = parse_newtype_field(data);

    let pattern = match field.ident {
        None => quote::quote!((inner)),
        Some(field_name) => quote::quote!({ #field_name: inner }),
    };

    quote::quote!(
        impl From<::comms::#struct_name_ident> for #struct_name_ident {
            fn from(::comms::#struct_name_ident #pattern: ::comms::#struct_name_ident) -> Self {
                Self #pattern
            }
        }

        impl From<#struct_name_ident> for ::comms::#struct_name_ident {
            fn from(#struct_name_ident #pattern: #struct_name_ident) -> Self {
                Self #pattern
            }
        }
    )
    .into()
}
