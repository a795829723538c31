use proc_macro2::TokenStream;
use quote::quote;
use syn::{DataStruct, DeriveInput, Fields, LitStr, Result, Type};

use crate::attrs::{container_rename_rule, field_name, serde_field};

/// `#[model(...)]` markers of one field.
#[derive(Debug, Default)]
struct ModelField {
    id: bool,
    object_id_hex: bool,
    version: bool,
    json: Option<String>,
    skip: bool,
}

fn model_field(field: &syn::Field) -> Result<ModelField> {
    let mut parsed = ModelField::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                parsed.id = true;
                Ok(())
            } else if meta.path.is_ident("object_id_hex") {
                parsed.id = true;
                parsed.object_id_hex = true;
                Ok(())
            } else if meta.path.is_ident("version") {
                parsed.version = true;
                Ok(())
            } else if meta.path.is_ident("json") {
                let s: LitStr = meta.value()?.parse()?;
                parsed.json = Some(s.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                parsed.skip = true;
                Ok(())
            } else {
                Err(meta.error("unknown model attribute"))
            }
        })?;
    }
    Ok(parsed)
}

/// The version width for a field type: `i32`, `isize` or `i64`.
fn version_width(ty: &Type) -> Result<TokenStream> {
    let ident = match ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last().map(|s| &s.ident),
        _ => None,
    };
    match ident.map(ToString::to_string).as_deref() {
        Some("i32") => Ok(quote!(::docmap::schema::VersionWidth::I32)),
        Some("isize") => Ok(quote!(::docmap::schema::VersionWidth::Int)),
        Some("i64") => Ok(quote!(::docmap::schema::VersionWidth::I64)),
        _ => Err(syn::Error::new_spanned(
            ty,
            "version field must be i32, isize or i64",
        )),
    }
}

pub(crate) fn generate_model(ast: &DeriveInput, data: &DataStruct) -> Result<TokenStream> {
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &ast.ident,
            "Model can only be derived for structs with named fields",
        ));
    };

    let name = &ast.ident;
    let model_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let rule = container_rename_rule(&ast.attrs)?;

    let mut descriptors = Vec::new();
    let mut identities = Vec::new();
    let mut fallback_identity = None;
    let mut version = None;

    for (index, field) in fields.named.iter().enumerate() {
        let Some(ident) = &field.ident else {
            continue;
        };
        let markers = model_field(field)?;
        let serde = serde_field(&field.attrs)?;
        if markers.skip || serde.skipped {
            continue;
        }

        let rust_name = field_name(ident);
        let cased = rule.map_or_else(|| rust_name.clone(), |rule| rule.apply(&rust_name));
        let bson = serde.rename.unwrap_or_else(|| cased.clone());
        // A field stored as `_id` is read back under its own (cased) name.
        let json = markers
            .json
            .unwrap_or_else(|| if bson == "_id" { cased } else { bson.clone() });

        descriptors.push(quote! {
            .field(::docmap::schema::FieldDescriptor::new(#index, #rust_name, #json, #bson))
        });

        if markers.id {
            let kind = if markers.object_id_hex {
                quote!(::docmap::schema::IdentityKind::ObjectIdHex)
            } else {
                quote!(::docmap::schema::IdentityKind::Native)
            };
            identities.push(quote!(.identity(#rust_name, #kind)));
        } else if bson == "_id" {
            fallback_identity = Some(rust_name.clone());
        }

        if markers.version {
            if version.is_some() {
                return Err(syn::Error::new_spanned(
                    ident,
                    "only one field can be marked #[model(version)]",
                ));
            }
            let width = version_width(&field.ty)?;
            version = Some(quote!(.version(#rust_name, #width)));
        }
    }

    if identities.is_empty() {
        if let Some(rust_name) = fallback_identity {
            identities.push(quote!(.identity(#rust_name, ::docmap::schema::IdentityKind::Native)));
        }
    }

    Ok(quote! {
        impl #impl_generics ::docmap::model::Model for #name #ty_generics #where_clause {
            fn schema() -> ::std::result::Result<
                ::docmap::schema::ModelSchema,
                ::docmap::error::SchemaError,
            > {
                ::docmap::schema::ModelSchema::builder(#model_name)
                    #(#descriptors)*
                    #(#identities)*
                    #version
                    .build()
            }
        }
    })
}
