extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro_error::{abort, proc_macro_error};
use quote::{quote, quote_spanned};
use syn::parse_macro_input;
use syn::spanned::Spanned;

fn is_repr_c(attrs: &[syn::Attribute]) -> bool {
    let mut repr_c = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("repr")) {
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("C") || meta.path.is_ident("transparent") {
                repr_c = true;
            }
            Ok(())
        });
    }
    repr_c
}

/// Derive `dash::Dist` for a `#[repr(C)]` struct whose fields are all `Dist`.
///
/// ```ignore
/// #[derive(Clone, Copy, dash::Dist)]
/// #[repr(C)]
/// struct Particle {
///     pos: [f64; 3],
///     id: u64,
/// }
/// ```
#[proc_macro_error]
#[proc_macro_derive(Dist)]
pub fn derive_dist(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as syn::DeriveInput);
    let name = &input.ident;
    let fields = match &input.data {
        syn::Data::Struct(data) => &data.fields,
        _ => abort!(input.span(), "Dist can only be derived for structs"),
    };
    if !is_repr_c(&input.attrs) {
        abort!(
            input.span(),
            "Dist requires a stable layout, add #[repr(C)] to {}",
            name
        );
    }
    if !input.generics.params.is_empty() {
        abort!(
            input.generics.span(),
            "Dist cannot be derived for generic structs"
        );
    }

    let checks = fields.iter().map(|field| {
        let ty = &field.ty;
        quote_spanned! {ty.span()=>
            __assert_dist::<#ty>();
        }
    });

    let output = quote! {
        const _: () = {
            extern crate dash as __dash;
            #[allow(dead_code)]
            fn __dist_fields() {
                fn __assert_dist<T: __dash::Dist>() {}
                #(#checks)*
            }
            unsafe impl __dash::Dist for #name {}
        };
    };
    TokenStream::from(output)
}
