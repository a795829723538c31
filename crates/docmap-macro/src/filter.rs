use proc_macro2::TokenStream;
use quote::quote;
use syn::{DataStruct, DeriveInput, Fields, LitStr, Result};

use crate::attrs::field_name;

#[derive(Debug, Default)]
struct FilterField {
    match_style: Option<TokenStream>,
    /// `Some(None)` means "same style as `match`".
    keyword: Option<Option<TokenStream>>,
    operator: Option<TokenStream>,
    bson: Option<String>,
    envelope: bool,
    skip: bool,
}

fn match_style(lit: &LitStr) -> Result<TokenStream> {
    match lit.value().as_str() {
        "prefix" => Ok(quote!(::docmap::query::MatchStyle::Prefix)),
        "contain" | "contains" => Ok(quote!(::docmap::query::MatchStyle::Contain)),
        "equal" | "equals" => Ok(quote!(::docmap::query::MatchStyle::Equal)),
        other => Err(syn::Error::new_spanned(
            lit,
            format!("unknown match style '{}', expected prefix, contain or equal", other),
        )),
    }
}

fn operator(lit: &LitStr) -> Result<TokenStream> {
    match lit.value().as_str() {
        "=" | "==" => Ok(quote!(::docmap::query::Operator::Eq)),
        "!=" | "<>" => Ok(quote!(::docmap::query::Operator::Ne)),
        ">" => Ok(quote!(::docmap::query::Operator::Gt)),
        ">=" => Ok(quote!(::docmap::query::Operator::Gte)),
        "<" => Ok(quote!(::docmap::query::Operator::Lt)),
        "<=" => Ok(quote!(::docmap::query::Operator::Lte)),
        other => Err(syn::Error::new_spanned(
            lit,
            format!("unknown operator '{}'", other),
        )),
    }
}

fn filter_field(field: &syn::Field) -> Result<FilterField> {
    let mut parsed = FilterField::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("filter")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("match") {
                let s: LitStr = meta.value()?.parse()?;
                parsed.match_style = Some(match_style(&s)?);
                Ok(())
            } else if meta.path.is_ident("keyword") {
                if meta.input.peek(syn::Token![=]) {
                    let s: LitStr = meta.value()?.parse()?;
                    parsed.keyword = Some(Some(match_style(&s)?));
                } else {
                    parsed.keyword = Some(None);
                }
                Ok(())
            } else if meta.path.is_ident("operator") {
                let s: LitStr = meta.value()?.parse()?;
                parsed.operator = Some(operator(&s)?);
                Ok(())
            } else if meta.path.is_ident("bson") {
                let s: LitStr = meta.value()?.parse()?;
                parsed.bson = Some(s.value());
                Ok(())
            } else if meta.path.is_ident("envelope") {
                parsed.envelope = true;
                Ok(())
            } else if meta.path.is_ident("skip") {
                parsed.skip = true;
                Ok(())
            } else {
                Err(meta.error("unknown filter attribute"))
            }
        })?;
    }
    Ok(parsed)
}

pub(crate) fn generate_filter(ast: &DeriveInput, data: &DataStruct) -> Result<TokenStream> {
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &ast.ident,
            "Filter can only be derived for structs with named fields",
        ));
    };

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let mut criteria = Vec::new();
    let mut envelope = None;

    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let parsed = filter_field(field)?;
        if parsed.skip {
            continue;
        }
        if parsed.envelope {
            if envelope.is_some() {
                return Err(syn::Error::new_spanned(
                    ident,
                    "only one field can be marked #[filter(envelope)]",
                ));
            }
            envelope = Some(ident.clone());
            continue;
        }

        let rust_name = field_name(ident);
        let mut criterion = quote! {
            ::docmap::query::Criterion::new(
                #rust_name,
                ::docmap::query::ToCriterion::to_criterion(&self.#ident),
            )
        };
        if let Some(style) = &parsed.match_style {
            criterion.extend(quote!(.matching(#style)));
        }
        match parsed.keyword {
            Some(Some(style)) => criterion.extend(quote!(.keyword(#style))),
            Some(None) => {
                let style = parsed
                    .match_style
                    .clone()
                    .unwrap_or_else(|| quote!(::docmap::query::MatchStyle::Contain));
                criterion.extend(quote!(.keyword(#style)));
            }
            None => {}
        }
        if let Some(op) = &parsed.operator {
            criterion.extend(quote!(.operator(#op)));
        }
        if let Some(bson) = &parsed.bson {
            criterion.extend(quote!(.stored_as(#bson)));
        }
        criteria.push(criterion);
    }

    let envelope_fn = envelope.map(|ident| {
        quote! {
            fn envelope(&self) -> ::std::option::Option<&::docmap::query::SearchEnvelope> {
                ::std::option::Option::Some(&self.#ident)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::docmap::query::Filter for #name #ty_generics #where_clause {
            fn criteria(&self) -> ::std::vec::Vec<::docmap::query::Criterion> {
                ::std::vec![#(#criteria),*]
            }

            #envelope_fn
        }
    })
}
