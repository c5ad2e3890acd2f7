//! `#[modkit::module(...)]` — the attribute that replaces per-route
//! registration boilerplate with a filesystem-scan-equivalent, compile-time
//! auto-discovery (spec §9 "Route auto-discovery").
//!
//! The macro leaves the annotated struct untouched and appends an
//! `inventory::submit!` block that constructs a single `Default` instance
//! and registers it under each capability the attribute names. Capability
//! trait impls (`RestApiCapability`, `RunnableCapability`) are written by
//! hand elsewhere in the module crate; the macro only wires discovery.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Expr, ExprArray, ExprLit, ItemStruct, Lit, Meta, Token, parse_macro_input, punctuated::Punctuated};

#[proc_macro_attribute]
pub fn module(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input = parse_macro_input!(item as ItemStruct);
    let ident = input.ident.clone();

    let mut name: Option<String> = None;
    let mut capabilities: Vec<String> = Vec::new();
    let mut deps: Vec<String> = Vec::new();

    for meta in &args {
        let Meta::NameValue(nv) = meta else { continue };
        if nv.path.is_ident("name") {
            if let Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) = &nv.value {
                name = Some(s.value());
            }
        } else if nv.path.is_ident("capabilities") {
            if let Expr::Array(ExprArray { elems, .. }) = &nv.value {
                for e in elems {
                    if let Expr::Path(p) = e {
                        if let Some(id) = p.path.get_ident() {
                            capabilities.push(id.to_string());
                        }
                    }
                }
            }
        } else if nv.path.is_ident("deps") {
            if let Expr::Array(ExprArray { elems, .. }) = &nv.value {
                for e in elems {
                    if let Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) = e {
                        deps.push(s.value());
                    }
                }
            }
        }
    }

    let name = name.unwrap_or_else(|| ident.to_string());
    let has_rest = capabilities.iter().any(|c| c == "rest");
    let has_runnable = capabilities.iter().any(|c| c == "runnable");

    let mut registrations = vec![quote! {
        b.register_core_with_meta(
            #name,
            &[#(#deps),*],
            instance.clone() as ::std::sync::Arc<dyn ::modkit::contracts::Module>,
        );
    }];
    if has_rest {
        registrations.push(quote! {
            b.register_rest_with_meta(
                #name,
                instance.clone() as ::std::sync::Arc<dyn ::modkit::contracts::RestApiCapability>,
            );
        });
    }
    if has_runnable {
        registrations.push(quote! {
            b.register_runnable_with_meta(
                #name,
                instance.clone() as ::std::sync::Arc<dyn ::modkit::contracts::RunnableCapability>,
            );
        });
    }

    let expanded = quote! {
        #input

        ::modkit::inventory::submit! {
            ::modkit::registry::Registrator(|b: &mut ::modkit::registry::RegistryBuilder| {
                let instance = ::std::sync::Arc::new(<#ident as ::std::default::Default>::default());
                #(#registrations)*
            })
        }
    };

    expanded.into()
}
