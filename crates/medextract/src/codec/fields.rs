//! Flattening a record into named metadata fields

use super::record::{ElementValue, Record, Vr};
use super::{dictionary, tags};
use crate::row::FieldValue;

/// Which elements become fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldOptions {
    /// Drop odd-group (vendor private) elements
    pub public_only: bool,
    /// Expand sequence items into `<Sequence>_<Field>` fields
    pub expand_nested: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            public_only: true,
            expand_nested: false,
        }
    }
}

/// Flatten `record` in tag order
///
/// File meta, group lengths, pixel data and binary values are not fields.
/// Nested names are prefixed with the chain of sequence names; when two
/// items produce the same name the later one wins.
pub fn extract_fields(record: &Record, options: &FieldOptions) -> Vec<(String, FieldValue)> {
    let mut out = Vec::new();
    collect(record, "", options, &mut out);
    out
}

fn collect(record: &Record, prefix: &str, options: &FieldOptions, out: &mut Vec<(String, FieldValue)>) {
    for element in record.elements() {
        let tag = element.tag;
        if tag.group == 0x0002 || tag.element == 0x0000 || tag == tags::PIXEL_DATA {
            continue;
        }
        if options.public_only && tag.is_private() {
            continue;
        }

        let name = dictionary::name(tag);
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{}_{}", prefix, name)
        };

        match &element.value {
            ElementValue::Sequence(items) => {
                if options.expand_nested {
                    for item in items {
                        collect(item, &key, options, out);
                    }
                }
            }
            value => {
                if let Some(coerced) = coerce(element.vr, value) {
                    out.push((key, coerced));
                }
            }
        }
    }
}

/// Primitive form of a value; `None` for binary data
fn coerce(vr: Vr, value: &ElementValue) -> Option<FieldValue> {
    match value {
        ElementValue::Strings(values) => Some(match vr {
            Vr::IS => parse_all(values, |v| v.parse::<i64>().ok().map(FieldValue::Int)),
            Vr::DS => parse_all(values, |v| v.parse::<f64>().ok().map(FieldValue::Float)),
            _ => collapse(values.iter().map(|v| FieldValue::Text(v.clone())).collect()),
        }),
        ElementValue::Ints(values) => Some(collapse(values.iter().map(|&v| FieldValue::Int(v)).collect())),
        ElementValue::Floats(values) => {
            Some(collapse(values.iter().map(|&v| FieldValue::Float(v)).collect()))
        }
        ElementValue::Bytes(_)
        | ElementValue::Sequence(_)
        | ElementValue::Encapsulated { .. }
        | ElementValue::Deferred { .. } => None,
    }
}

/// Numeric parse of every value, falling back to the original text
fn parse_all<F>(values: &[String], parse: F) -> FieldValue
where
    F: Fn(&str) -> Option<FieldValue>,
{
    let parsed: Option<Vec<FieldValue>> = values.iter().map(|v| parse(v.trim())).collect();
    match parsed {
        Some(parsed) => collapse(parsed),
        None => FieldValue::Text(values.join("\\")),
    }
}

fn collapse(mut values: Vec<FieldValue>) -> FieldValue {
    match values.len() {
        0 => FieldValue::Null,
        1 => values.pop().unwrap_or(FieldValue::Null),
        _ => FieldValue::List(values),
    }
}
