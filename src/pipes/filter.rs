//! In-memory text filter
//!
//! Rows are tested against the words of a search text. Field declarations
//! follow the projection syntax: `tarifa(descripcion)` and `tarifa.descripcion`
//! descend into embedded objects, a trailing `?` marks a property that may be
//! absent. Without declared fields every key of the row is searched.

use crate::core::clauses::ConcatOp;
use crate::core::error::{EngineError, PipeError};
use crate::core::fields::{split_fields, split_table_and_fields};
use crate::core::model::FilterConfig;
use crate::core::row::{Row, is_truthy};
use crate::pipes::words::{match_words, strip_accents, word_matches};
use anyhow::Result;
use serde_json::Value;

/// Row key holding the multi-select check mark
pub const CHECKED: &str = "checked";

/// Per-call options of [`apply_filter`]
#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// Checked rows always pass
    pub ignore_checked: bool,
    /// Word concatenation used when the config does not set one
    pub concat: ConcatOp,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            ignore_checked: true,
            concat: ConcatOp::And,
        }
    }
}

#[derive(Clone, Copy)]
struct Normalize {
    ignore_case: bool,
    ignore_accents: bool,
}

/// Rows passing the filter, in their original order
pub fn filter_rows(
    rows: &[Row],
    text: &str,
    config: &FilterConfig,
    options: &MatchOptions,
) -> Result<Vec<Row>> {
    let mut passed = Vec::new();
    for row in rows {
        if apply_filter(row, text, config, options)? {
            passed.push(row.clone());
        }
    }
    Ok(passed)
}

/// Whether a single row passes the filter
pub fn apply_filter(
    row: &Row,
    text: &str,
    config: &FilterConfig,
    options: &MatchOptions,
) -> Result<bool> {
    if options.ignore_checked && row.get(CHECKED).is_some_and(is_truthy) {
        return Ok(true);
    }
    if let Some(pre_filter) = &config.pre_filter {
        if !pre_filter.call(row) {
            return Ok(false);
        }
    }
    let text = text.trim();
    if text.is_empty() {
        return Ok(true);
    }

    let normalize = Normalize {
        ignore_case: config.ignore_case,
        ignore_accents: config.ignore_accents,
    };
    let words = if config.split_pipe_words {
        match_words(text)
    } else {
        vec![text.to_string()]
    };
    let fields = (!config.pipe.is_empty()).then_some(config.pipe.as_slice());

    match config.concat_pipe_words {
        ConcatOp::And => {
            for word in &words {
                if !matches_fields(row, std::slice::from_ref(word), fields, normalize)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConcatOp::Or => matches_fields(row, &words, fields, normalize),
    }
}

fn missing(property: &str) -> anyhow::Error {
    EngineError::from(PipeError::MissingProperty {
        property: property.to_string(),
    })
    .into()
}

/// Whether any declared field of the object matches any of the words
fn matches_fields(
    object: &Row,
    words: &[String],
    fields: Option<&[String]>,
    normalize: Normalize,
) -> Result<bool> {
    let keys: Vec<String> = match fields {
        Some(fields) => fields.iter().flat_map(|f| split_fields(f)).collect(),
        None => object.keys().cloned().collect(),
    };

    for prop in &keys {
        if prop.contains('(') || prop.contains('.') {
            let nested = split_table_and_fields(prop, false);
            if !nested.optional && !object.contains_key(&nested.table) {
                return Err(missing(&nested.table));
            }
            let columns = if prop.contains('(') {
                nested.columns.clone()
            } else {
                vec![nested.columns.join(".")]
            };
            if matches_embedded(object.get(&nested.table), words, &columns, normalize)? {
                return Ok(true);
            }
            continue;
        }

        match object.get(prop) {
            Some(Value::Null) => {}
            Some(Value::Object(inner)) => {
                if matches_fields(inner, words, None, normalize)? {
                    return Ok(true);
                }
            }
            _ => {
                let (property, optional) = match prop.strip_suffix('?') {
                    Some(p) => (p, true),
                    None => (prop.as_str(), false),
                };
                match object.get(property) {
                    Some(value) => {
                        let Normalize {
                            ignore_case,
                            ignore_accents,
                        } = normalize;
                        if filter_property(value, words, ignore_case, ignore_accents) {
                            return Ok(true);
                        }
                    }
                    None if optional => {}
                    None => return Err(missing(property)),
                }
            }
        }
    }
    Ok(false)
}

fn matches_embedded(
    value: Option<&Value>,
    words: &[String],
    columns: &[String],
    normalize: Normalize,
) -> Result<bool> {
    match value {
        Some(Value::Object(inner)) => matches_fields(inner, words, Some(columns), normalize),
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::Object(inner) = item {
                    if matches_fields(inner, words, Some(columns), normalize)? {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Test a scalar value against the words
///
/// Only non-empty strings and non-zero numbers can match.
pub fn filter_property(
    value: &Value,
    words: &[String],
    ignore_case: bool,
    ignore_accents: bool,
) -> bool {
    if !is_truthy(value) {
        return false;
    }
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return false,
    };
    let text = if ignore_accents {
        strip_accents(&text)
    } else {
        text
    };
    words.iter().any(|word| {
        let word = if ignore_accents {
            strip_accents(word)
        } else {
            word.clone()
        };
        word_matches(&text, &word, ignore_case)
    })
}
