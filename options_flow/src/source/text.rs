//! Cleaning of the formatted numbers shown on the analytics page.
//!
//! The page renders values like `$5,123.45`, `-1,234,567` or `($12,000)`.
//! Currency symbols, thousands separators and whitespace are stripped before
//! conversion; a parenthesised value is negative.

use snafu::OptionExt;

use crate::source::{ParseSnafu, SourceError};

/// Strips `$`, `,` and whitespace, and turns `(x)` into `-x`.
pub fn clean_number_text(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '$' || *c == ','))
        .collect();

    match stripped
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
    {
        Some(inner) => format!("-{inner}"),
        None => stripped,
    }
}

pub fn parse_price(field: &'static str, raw: &str) -> Result<f64, SourceError> {
    let cleaned = clean_number_text(raw);
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .context(ParseSnafu { field, text: raw })
}

/// Whole-number fields (net delta, net premium).
pub fn parse_whole(field: &'static str, raw: &str) -> Result<i64, SourceError> {
    clean_number_text(raw)
        .parse::<i64>()
        .ok()
        .context(ParseSnafu { field, text: raw })
}
