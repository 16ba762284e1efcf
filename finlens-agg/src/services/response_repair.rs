//! Structured Response Repairer
//!
//! Generative completions are asked for one JSON object but routinely wrap it
//! in prose or code fences, or leave out sections. This module:
//!
//! 1. finds the first balanced `{ ... }` in free text that parses as a JSON
//!    object (brace scanning honours string literals and escapes);
//! 2. backfills every missing or `null` required field with a clearly
//!    labelled placeholder.
//!
//! Text with no parseable object is a hard failure; only partial output is
//! repaired. Repairing an already complete object is a no-op.

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix on every synthesized value so the UI can tell it apart
pub const PLACEHOLDER_PREFIX: &str = "[Unavailable]";

/// Shape of the placeholder synthesized for a missing field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Text,
    List,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredField {
    pub name: &'static str,
    pub kind: PlaceholderKind,
}

impl RequiredField {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: PlaceholderKind::Text,
        }
    }

    pub const fn list(name: &'static str) -> Self {
        Self {
            name,
            kind: PlaceholderKind::List,
        }
    }

    pub const fn object(name: &'static str) -> Self {
        Self {
            name,
            kind: PlaceholderKind::Object,
        }
    }
}

/// Required top-level fields of one generated document type
#[derive(Debug, Clone, Copy)]
pub struct ShapeContract {
    pub name: &'static str,
    pub fields: &'static [RequiredField],
}

/// Narrative research report sections
pub const REPORT_CONTRACT: ShapeContract = ShapeContract {
    name: "report",
    fields: &[
        RequiredField::text("executive_summary"),
        RequiredField::text("business_overview"),
        RequiredField::object("financial_analysis"),
        RequiredField::text("valuation"),
        RequiredField::list("risks"),
        RequiredField::text("outlook"),
    ],
};

/// Price prediction fields
pub const PREDICTION_CONTRACT: ShapeContract = ShapeContract {
    name: "prediction",
    fields: &[
        RequiredField::text("direction"),
        RequiredField::text("price_target"),
        RequiredField::text("confidence"),
        RequiredField::text("horizon"),
        RequiredField::list("rationale"),
    ],
};

impl ShapeContract {
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepairError {
    /// No balanced `{ ... }` anywhere in the text
    #[error("no JSON object found in generated text")]
    NoJsonObject,

    /// Balanced braces were found but none parsed as a JSON object
    #[error("generated JSON could not be parsed: {0}")]
    InvalidJson(String),

    /// Input value was valid JSON but not an object
    #[error("generated JSON is a {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Contract-satisfying object plus the fields that had to be synthesized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Repaired {
    pub value: Value,
    pub backfilled: Vec<String>,
}

impl Repaired {
    pub fn is_complete(&self) -> bool {
        self.backfilled.is_empty()
    }
}

/// Byte ranges of every balanced `{ ... }` in `text`, in one pass
///
/// String state is tracked only inside an open brace, so quotes in the
/// surrounding prose are ignored. Spans are returned ordered by start offset.
fn balanced_spans(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, b) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(offset),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, offset + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

/// Extract the first balanced JSON object embedded in free text
///
/// Candidates that are balanced but do not parse (e.g. `{placeholder}` in
/// prose) are skipped in favour of the next one by start offset.
pub fn extract_first_json_object(text: &str) -> Result<Map<String, Value>, RepairError> {
    let mut last_parse_error = None;

    for (start, end) in balanced_spans(text) {
        match serde_json::from_str::<Map<String, Value>>(&text[start..end]) {
            Ok(map) => return Ok(map),
            Err(e) => {
                debug!(offset = start, error = %e, "Skipping unparseable brace block");
                last_parse_error = Some(e.to_string());
            }
        }
    }

    match last_parse_error {
        Some(e) => Err(RepairError::InvalidJson(e)),
        None => Err(RepairError::NoJsonObject),
    }
}

fn placeholder(contract: &ShapeContract, field: &RequiredField) -> Value {
    let label = format!(
        "{} {} was not generated for this {}",
        PLACEHOLDER_PREFIX, field.name, contract.name
    );
    match field.kind {
        PlaceholderKind::Text => Value::String(label),
        PlaceholderKind::List => json!([label]),
        PlaceholderKind::Object => json!({ "placeholder": true, "note": label }),
    }
}

/// Backfill missing required fields of an already parsed value
pub fn repair_value(value: Value, contract: &ShapeContract) -> Result<Repaired, RepairError> {
    let mut map = match value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(RepairError::NotAnObject("array")),
        Value::String(_) => return Err(RepairError::NotAnObject("string")),
        Value::Number(_) => return Err(RepairError::NotAnObject("number")),
        Value::Bool(_) => return Err(RepairError::NotAnObject("boolean")),
        Value::Null => return Err(RepairError::NotAnObject("null")),
    };

    let mut backfilled = Vec::new();
    for field in contract.fields {
        let missing = matches!(map.get(field.name), None | Some(Value::Null));
        if missing {
            map.insert(field.name.to_string(), placeholder(contract, field));
            backfilled.push(field.name.to_string());
        }
    }

    if !backfilled.is_empty() {
        warn!(
            contract = contract.name,
            fields = ?backfilled,
            "Generated output missing required fields, backfilled placeholders"
        );
    }

    Ok(Repaired {
        value: Value::Object(map),
        backfilled,
    })
}

/// Extract the first JSON object from generator text and repair it
pub fn repair_text(text: &str, contract: &ShapeContract) -> Result<Repaired, RepairError> {
    let map = extract_first_json_object(text)?;
    repair_value(Value::Object(map), contract)
}
