use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

extern crate proc_macro;

/// Declares a sample-log row.
///
/// Derives the serde and comparison traits a row needs to be persisted and
/// asserted on, and implements `Record` for it. `Record` must be in scope at
/// the call site.
#[proc_macro_attribute]
pub fn record(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemStruct);
    let input_struct = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let expanded = quote! {
        #[derive(
            serde::Serialize,
            serde::Deserialize,
            std::cmp::PartialOrd,
            std::cmp::PartialEq,
            std::fmt::Debug,
            std::clone::Clone,
            std::marker::Copy
        )]
        #ast

        impl #impl_generics Record for #input_struct #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}
