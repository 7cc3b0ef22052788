//! Derive macros for `view_sync`.

mod record;

use proc_macro::TokenStream;

/// Derive macro for the `Record` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Record)]
/// #[record(table = "classes")]
/// struct Class {
///     #[record(id)]
///     id: i64,
///     name: String,
/// }
/// ```
///
/// - `#[record(table = "...")]` names the backend table. Defaults to the
///   snake_case struct name with an `s` suffix.
/// - `#[record(id)]` marks the identity field. Defaults to a field named `id`.
///   The row column carrying the id is the field's `#[serde(rename)]` name
///   if it has one, else the field name; `#[record(id, column = "...")]`
///   overrides both.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    record::derive_record(input)
}
