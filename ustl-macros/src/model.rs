use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{DeriveInput, Ident, LitStr, parse_macro_input};

pub fn derive_model_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.generics,
            "Model can't be derived for generic structs",
        )
        .to_compile_error()
        .into();
    }

    let fields = match input.data {
        syn::Data::Struct(data) => match data.fields {
            syn::Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new_spanned(
                    name,
                    "Model only supports structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(name, "Model only supports structs")
                .to_compile_error()
                .into();
        }
    };

    let (getters, predicates) = match parse_struct_attrs(&input.attrs) {
        Ok(methods) => methods,
        Err(e) => return e.to_compile_error().into(),
    };

    let mut registrations = Vec::new();
    for field in &fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let (key, ignore) = match parse_field_attrs(field) {
            Ok(attrs) => attrs,
            Err(e) => return e.to_compile_error().into(),
        };
        if ignore {
            continue;
        }
        let key_lit = LitStr::new(&key, Span::call_site());
        registrations.push(quote! {
            .field(#key_lit, |s: &#name| ustl::ToValue::to_value(&s.#field_name))
        });
    }
    for getter in &getters {
        let key_lit = LitStr::new(&getter.to_string(), Span::call_site());
        registrations.push(quote! {
            .getter(#key_lit, |s: &#name| ustl::ToValue::to_value(&s.#getter()))
        });
    }
    for predicate in &predicates {
        let key_lit = LitStr::new(&predicate.to_string(), Span::call_site());
        let method = format_ident!("is_{}", predicate);
        registrations.push(quote! {
            .predicate(#key_lit, |s: &#name| ustl::ToValue::to_value(&s.#method()))
        });
    }

    TokenStream::from(quote! {
        impl ustl::Model for #name {
            fn property(&self, name: &str) -> ::std::option::Option<ustl::Value> {
                static ACCESSORS: ::std::sync::OnceLock<ustl::model::Accessors<#name>> =
                    ::std::sync::OnceLock::new();
                ACCESSORS
                    .get_or_init(|| ustl::model::Accessors::new() #(#registrations)*)
                    .resolve(self, name)
            }
        }

        impl ustl::ToValue for #name {
            fn to_value(&self) -> ustl::Value {
                ustl::Value::object(::std::clone::Clone::clone(self))
            }
        }
    })
}

/// `#[model(get(a, b), is(c))]` on the struct.
fn parse_struct_attrs(attrs: &[syn::Attribute]) -> syn::Result<(Vec<Ident>, Vec<Ident>)> {
    let mut getters = Vec::new();
    let mut predicates = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let target = if meta.path.is_ident("get") {
                &mut getters
            } else if meta.path.is_ident("is") {
                &mut predicates
            } else {
                return Err(meta.error("expected `get(...)` or `is(...)`"));
            };
            meta.parse_nested_meta(|inner| {
                let ident = inner
                    .path
                    .get_ident()
                    .cloned()
                    .ok_or_else(|| inner.error("expected a method name"))?;
                target.push(ident);
                Ok(())
            })
        })?;
    }
    Ok((getters, predicates))
}

fn parse_field_attrs(field: &syn::Field) -> syn::Result<(String, bool)> {
    let mut name = field
        .ident
        .as_ref()
        .map(|i| i.to_string())
        .unwrap_or_default();
    let mut ignore = false;

    for attr in &field.attrs {
        if attr.path().is_ident("model") {
            if let Ok(s) = attr.parse_args::<LitStr>() {
                name = s.value();
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("ignore") {
                    ignore = true;
                } else if meta.path.is_ident("rename") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    name = s.value();
                } else {
                    return Err(meta.error("expected `ignore` or `rename = \"...\"`"));
                }
                Ok(())
            })?;
        }
    }
    Ok((name, ignore))
}
