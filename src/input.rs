//! Input safety
//!
//! Free-text values that end up inside SQL (the session role) can be run
//! through a conservative injection check, and identifiers are always
//! double-quoted before interpolation.

use std::sync::LazyLock;

use regex::Regex;
use tracing::error;

use crate::error::InfoError;

/// Quotes, statement separators and comment openers
static DANGEROUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['";]|--|/\*"#).expect("static pattern is valid"));

/// Returns `true` if `value` looks like an attempt to break out of an identifier
pub fn is_input_dangerous(value: &str) -> bool {
    DANGEROUS.is_match(value)
}

/// Reject `value` for `field` if it is potentially dangerous
pub fn check_input(field: &str, value: Option<&str>) -> Result<(), InfoError> {
    match value {
        Some(value) if is_input_dangerous(value) => {
            error!(field = ?field, value = ?value, "Rejected potentially dangerous input");
            Err(InfoError::InputRejected {
                field: field.to_string(),
                value: value.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
