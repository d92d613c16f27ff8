//! Prompts, expected response shapes, and extraction of JSON from model text.

use serde_json::{Map, Value};

use super::Provider;

/// A prompt for one generation: a system instruction plus the user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    TextList,
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::TextList => "array of strings",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// The set of fields a caller expects back from a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
        }
    }

    pub fn required(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
        });
        self
    }

    /// Output-format instruction appended to every prompt for this schema.
    pub fn instructions(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let optional = if f.required { "" } else { ", optional" };
                format!("- \"{}\": {}{}", f.name, f.kind.describe(), optional)
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Respond with a single JSON object with these fields:\n{fields}\n\n\
             ONLY output the JSON object. No other text."
        )
    }

    /// Check a parsed object against the schema. Unknown fields are kept.
    pub fn validate(&self, object: &Map<String, Value>) -> Result<(), String> {
        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!("missing field \"{}\"", field.name));
                    }
                }
                Some(value) => {
                    let ok = match field.kind {
                        FieldKind::Text => value.as_str().is_some_and(|s| !s.trim().is_empty()),
                        FieldKind::Number => number_value(value).is_some(),
                        FieldKind::TextList => value
                            .as_array()
                            .is_some_and(|items| items.iter().all(Value::is_string)),
                    };
                    if !ok {
                        return Err(format!(
                            "field \"{}\" is not a {}",
                            field.name,
                            field.kind.describe()
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Numbers sometimes come back quoted ("7.5"); accept both.
fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// A schema-conforming generation result.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub fields: Map<String, Value>,
    /// Which provider slot produced it.
    pub provider: Provider,
}

impl Generated {
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(number_value)
    }

    pub fn text_list(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parse model output into an object matching `schema`.
pub fn parse_response(text: &str, schema: &ResponseSchema) -> Result<Map<String, Value>, String> {
    let json_str =
        extract_json_object(text).ok_or_else(|| "no JSON object in response".to_string())?;
    let value: Value =
        serde_json::from_str(json_str).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Object(object) = value else {
        return Err("response is not a JSON object".to_string());
    };
    schema.validate(&object)?;
    Ok(object)
}

/// Extract a JSON object from LLM output that might contain markdown or extra text.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    // Wrapped in a markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    // Object embedded in prose
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}
