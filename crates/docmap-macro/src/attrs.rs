//! Reading the serde attributes that decide storage names.

use heck::{
    ToKebabCase, ToLowerCamelCase, ToShoutyKebabCase, ToShoutySnakeCase, ToSnakeCase,
    ToUpperCamelCase,
};
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{Attribute, Expr, Ident, LitStr, Result, Token};

/// A `rename_all` case rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> Result<Self> {
        Ok(match lit.value().as_str() {
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebab,
            other => {
                return Err(syn::Error::new_spanned(
                    lit,
                    format!("unknown rename_all rule '{}'", other),
                ));
            }
        })
    }

    /// Applies the rule to a snake_case field name.
    pub(crate) fn apply(self, field: &str) -> String {
        match self {
            RenameRule::Lower => field.to_ascii_lowercase(),
            RenameRule::Upper => field.to_ascii_uppercase(),
            RenameRule::Pascal => field.to_upper_camel_case(),
            RenameRule::Camel => field.to_lower_camel_case(),
            RenameRule::Snake => field.to_snake_case(),
            RenameRule::ScreamingSnake => field.to_shouty_snake_case(),
            RenameRule::Kebab => field.to_kebab_case(),
            RenameRule::ScreamingKebab => field.to_shouty_kebab_case(),
        }
    }
}

/// Consumes a nested meta item this crate does not interpret.
pub(crate) fn ignore_meta(meta: &ParseNestedMeta) -> Result<()> {
    if meta.input.peek(Token![=]) {
        let _: Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|nested| ignore_meta(&nested))?;
    }
    Ok(())
}

/// Reads `name = "..."` or `name(serialize = "...", deserialize = "...")`,
/// returning the serialize side.
fn serialize_name(meta: &ParseNestedMeta) -> Result<Option<LitStr>> {
    if meta.input.peek(Token![=]) {
        return Ok(Some(meta.value()?.parse()?));
    }
    let mut found = None;
    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("serialize") {
            found = Some(nested.value()?.parse()?);
            Ok(())
        } else {
            ignore_meta(&nested)
        }
    })?;
    Ok(found)
}

/// The Rust name of a field, without any `r#` prefix.
pub(crate) fn field_name(ident: &Ident) -> String {
    ident.unraw().to_string()
}

/// The struct-level `rename_all` rule, if any.
pub(crate) fn container_rename_rule(attrs: &[Attribute]) -> Result<Option<RenameRule>> {
    let mut rule = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if let Some(lit) = serialize_name(&meta)? {
                    rule = Some(RenameRule::parse(&lit)?);
                }
                Ok(())
            } else {
                ignore_meta(&meta)
            }
        })?;
    }
    Ok(rule)
}

/// What serde does with one field.
#[derive(Debug, Default)]
pub(crate) struct SerdeField {
    pub rename: Option<String>,
    pub skipped: bool,
}

pub(crate) fn serde_field(attrs: &[Attribute]) -> Result<SerdeField> {
    let mut field = SerdeField::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if let Some(lit) = serialize_name(&meta)? {
                    field.rename = Some(lit.value());
                }
                Ok(())
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                field.skipped = true;
                Ok(())
            } else if meta.path.is_ident("flatten") {
                Err(meta.error("flattened fields have no storage key of their own"))
            } else {
                ignore_meta(&meta)
            }
        })?;
    }
    Ok(field)
}
