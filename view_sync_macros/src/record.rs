use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Ident, LitStr};

pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let table = match extract_table(&input) {
        Ok(table) => table,
        Err(err) => return err.to_compile_error().into(),
    };

    let (id_field, id_column) = match extract_id_field(&input) {
        Ok(found) => found,
        Err(err) => return err.to_compile_error().into(),
    };

    let expanded = quote! {
        impl #impl_generics ::view_sync::Record for #name #ty_generics #where_clause {
            const TABLE: &'static str = #table;
            const ID_COLUMN: &'static str = #id_column;

            fn id(&self) -> ::view_sync::RecordId {
                ::view_sync::RecordId::new(::std::string::ToString::to_string(&self.#id_field))
            }
        }
    };

    TokenStream::from(expanded)
}

fn extract_table(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        let mut table = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `table = \"...\"`"))
            }
        })?;

        if let Some(t) = table {
            if t.is_empty() {
                return Err(syn::Error::new_spanned(attr, "record table must not be empty"));
            }
            return Ok(t);
        }
    }

    Ok(format!("{}s", to_snake_case(&input.ident.to_string())))
}

/// The id field and the row column it is stored under.
fn extract_id_field(input: &DeriveInput) -> syn::Result<(Ident, String)> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Record derive requires a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Record derive only supports structs",
            ))
        }
    };

    for field in &fields.named {
        for attr in &field.attrs {
            if !attr.path().is_ident("record") {
                continue;
            }
            let mut is_id = false;
            let mut column = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    is_id = true;
                    Ok(())
                } else if meta.path.is_ident("column") {
                    let value: LitStr = meta.value()?.parse()?;
                    column = Some(value.value());
                    Ok(())
                } else {
                    Err(meta.error("expected `id` or `column = \"...\"`"))
                }
            })?;
            if column.is_some() && !is_id {
                return Err(syn::Error::new_spanned(
                    attr,
                    "`column` is only allowed alongside `id`",
                ));
            }
            if is_id {
                if let Some(ident) = &field.ident {
                    let column = column.unwrap_or_else(|| column_of(field, ident));
                    return Ok((ident.clone(), column));
                }
            }
        }
    }

    fields
        .named
        .iter()
        .find_map(|field| match &field.ident {
            Some(ident) if ident == "id" => Some((ident.clone(), column_of(field, ident))),
            _ => None,
        })
        .ok_or_else(|| {
            syn::Error::new_spanned(
                &input.ident,
                "Record derive: no field marked with #[record(id)] and no field named `id`",
            )
        })
}

/// Column name serde reads the field from: `#[serde(rename = "...")]`, or
/// the deserialize side of `rename(...)`, else the field name.
fn column_of(field: &Field, ident: &Ident) -> String {
    let mut column = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        // Other serde keys are serde's to validate.
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if meta.input.peek(syn::Token![=]) {
                    let value: LitStr = meta.value()?.parse()?;
                    column = Some(value.value());
                } else {
                    meta.parse_nested_meta(|side| {
                        let value: LitStr = side.value()?.parse()?;
                        if side.path.is_ident("deserialize") {
                            column = Some(value.value());
                        }
                        Ok(())
                    })?;
                }
            } else if meta.input.peek(syn::Token![=]) {
                meta.value()?.parse::<syn::Expr>()?;
            } else if meta.input.peek(syn::token::Paren) {
                let content;
                syn::parenthesized!(content in meta.input);
                content.parse::<proc_macro2::TokenStream>()?;
            }
            Ok(())
        });
    }
    column.unwrap_or_else(|| ident.to_string())
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
