use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

/// Derives `IntoResponse` for an error enum: every variant becomes a JSON
/// `ErrorResponse` body filled from the variant's `Display` text, with the
/// status code taken from its `#[status_code(StatusCode::...)]` attribute
/// (500 when the attribute is missing).
///
/// The expansion refers to `StatusCode`, `Json`, `IntoResponse` and
/// `ErrorResponse` unqualified, so those must be in scope at the derive
/// site.
#[proc_macro_derive(JsonErrorResponse, attributes(status_code))]
pub fn derive_json_error_response(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let Data::Enum(data) = input.data else {
        return syn::Error::new_spanned(&name, "JsonErrorResponse can only be derived for enums")
            .to_compile_error()
            .into();
    };

    let arms = data.variants.iter().map(|variant| {
        let ident = &variant.ident;
        let pattern = match &variant.fields {
            Fields::Unit => quote! {},
            Fields::Unnamed(_) => quote! { (..) },
            Fields::Named(_) => quote! { { .. } },
        };
        let status = variant
            .attrs
            .iter()
            .find(|attr| attr.path().is_ident("status_code"))
            .map(|attr| {
                let expr: syn::ExprPath = attr
                    .parse_args()
                    .expect("#[status_code(...)] only allows axum `StatusCode::...` expressions");
                quote! { #expr }
            })
            .unwrap_or_else(|| quote! { StatusCode::INTERNAL_SERVER_ERROR });
        quote! {
            #name::#ident #pattern => (
                #status,
                Json(ErrorResponse {
                    error_message: self.to_string(),
                    ..Default::default()
                }),
            )
                .into_response()
        }
    });

    quote! {
        impl IntoResponse for #name {
            fn into_response(self) -> axum::response::Response {
                match self {
                    #(#arms),*
                }
            }
        }
    }
    .into()
}
