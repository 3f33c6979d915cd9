use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemFn};

/// Proc macro to denote a Scenario
///
/// The function must be `async`, take a single [`Http`](surge::Http) argument and return
/// nothing. It is replaced by a plain function of the same name returning a configurable
/// `Scenario`; the body becomes one iteration of a virtual user.
///
/// # Example
/// ```ignore
/// use surge::prelude::*;
///
/// #[scenario]
/// async fn my_scenario(http: Http) {
///     let res = http.get("https://accounts.svc.plus/api/auth/session").await;
///     http.check("session status is 200", res.status == Some(200));
/// }
/// ```
#[proc_macro_attribute]
pub fn scenario(attr: TokenStream, item: TokenStream) -> TokenStream {
    match scenario_internal(attr.into(), item.into()) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn scenario_internal(attr: TokenStream2, item: TokenStream2) -> syn::Result<TokenStream2> {
    if !attr.is_empty() {
        return Err(syn::Error::new_spanned(
            attr,
            "#[scenario] does not take arguments",
        ));
    }

    let input = syn::parse2::<ItemFn>(item)?;
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            sig.fn_token,
            "#[scenario] functions must be async",
        ));
    }
    if sig.inputs.len() != 1 {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            "#[scenario] functions take exactly one `Http` argument",
        ));
    }
    if let syn::ReturnType::Type(_, ty) = &sig.output {
        return Err(syn::Error::new_spanned(
            ty,
            "#[scenario] functions must not return a value",
        ));
    }

    let scen_name = sig.ident.clone();
    let new_name = Ident::new(&format!("__surge_{}", sig.ident), Span::call_site());
    let mut new_sig = sig.clone();
    new_sig.ident = new_name.clone();

    let res = quote! {
        #(#attrs)* #vis fn #scen_name() -> impl ::surge::scenario::ConfigurableScenario<
            ::std::result::Result<::surge::RunStatistics, ::surge::ConfigError>
        > {
            ::surge::Scenario::new(stringify!(#scen_name), #new_name)
        }

        #[doc(hidden)]
        #vis #new_sig #block
    };

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_async_fn() {
        let out = scenario_internal(
            quote! {},
            quote! {
                async fn login(http: Http) {
                    http.get("http://localhost").await;
                }
            },
        )
        .unwrap()
        .to_string();

        assert!(out.contains("fn login ()"));
        assert!(out.contains("async fn __surge_login (http : Http)"));
        assert!(out.contains("Scenario :: new (stringify ! (login) , __surge_login)"));
    }

    #[test]
    fn rejects_sync_fn() {
        let err = scenario_internal(quote! {}, quote! { fn login(http: Http) {} }).unwrap_err();
        assert!(err.to_string().contains("must be async"));
    }

    #[test]
    fn rejects_return_value() {
        let err = scenario_internal(
            quote! {},
            quote! { async fn login(http: Http) -> u32 { 1 } },
        )
        .unwrap_err();
        assert!(err.to_string().contains("must not return"));
    }
}
