//! Frontmatter validation against a small JSON-Schema subset.
//!
//! Supported keywords: `type`, `enum`, `pattern`, `minimum`, `maximum`,
//! `items`, `properties`, `required`, `deprecated` and
//! `additionalProperties`. Schemas load from `.json`, `.yaml` or `.yml`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Document;
use crate::Error;

/// Top-level schema for a frontmatter mapping.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    /// Top-level keys that still validate but should be migrated away from.
    #[serde(default)]
    pub deprecated: Vec<String>,
    #[serde(default = "allow")]
    pub additional_properties: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(rename = "type", default)]
    pub kind: Option<TypeSpec>,
    #[serde(rename = "enum", default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub items: Option<Box<Property>>,
    #[serde(default)]
    pub properties: Option<BTreeMap<String, Property>>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub additional_properties: Option<bool>,
}

/// `"type": "string"` or `"type": ["string", "null"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    One(String),
    Any(Vec<String>),
}

impl TypeSpec {
    fn names(&self) -> Vec<&str> {
        match self {
            TypeSpec::One(name) => vec![name.as_str()],
            TypeSpec::Any(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

fn allow() -> bool {
    true
}

/// One problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub field: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(Issue { field: field.to_string(), message: message.into() });
    }

    fn warn(&mut self, field: &str, message: impl Into<String>) {
        self.warnings.push(Issue { field: field.to_string(), message: message.into() });
    }
}

impl Schema {
    /// Load a schema file, picking the format from its extension.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for a missing file, `Error::InvalidInput` for a
    /// schema that does not parse or carries an invalid `pattern`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::from_io(e, path))?;
        let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
        let schema: Schema = if is_yaml {
            serde_yml::from_str(&text)
                .map_err(|e| Error::InvalidInput(format!("schema {}: {e}", path.display())))?
        } else {
            serde_json::from_str(&text)
                .map_err(|e| Error::InvalidInput(format!("schema {}: {e}", path.display())))?
        };
        schema.check_patterns()?;
        Ok(schema)
    }

    fn check_patterns(&self) -> Result<(), Error> {
        fn walk(prop: &Property, field: &str) -> Result<(), Error> {
            if let Some(pattern) = &prop.pattern {
                Regex::new(pattern).map_err(|e| Error::InvalidInput(format!("pattern for {field}: {e}")))?;
            }
            if let Some(items) = &prop.items {
                walk(items, &format!("{field}[]"))?;
            }
            for (key, child) in prop.properties.iter().flatten() {
                walk(child, &format!("{field}.{key}"))?;
            }
            Ok(())
        }
        self.properties.iter().try_for_each(|(key, prop)| walk(prop, key))
    }

    /// Validate a document's frontmatter.
    pub fn validate(&self, doc: &Document) -> Result<ValidationReport, Error> {
        let value = serde_json::to_value(serde_yml::Value::Mapping(doc.frontmatter.clone()))?;
        let mut report = ValidationReport::default();
        match value.as_object() {
            Some(object) => self.validate_object(object, &mut report),
            None => report.error("", "frontmatter must be a mapping"),
        }
        Ok(report)
    }

    fn validate_object(&self, object: &Map<String, Value>, report: &mut ValidationReport) {
        for key in &self.required {
            if !object.contains_key(key) {
                report.error(key, "required field is missing");
            }
        }
        for (key, value) in object {
            if self.deprecated.contains(key) {
                report.warn(key, "field is deprecated");
            }
            match self.properties.get(key) {
                Some(prop) => validate_value(prop, value, key, report),
                None if self.deprecated.contains(key) => {}
                None if self.additional_properties => report.warn(key, "unknown field"),
                None => report.error(key, "unknown field not allowed"),
            }
        }
    }
}

fn validate_value(prop: &Property, value: &Value, field: &str, report: &mut ValidationReport) {
    if prop.deprecated {
        report.warn(field, "field is deprecated");
    }

    if let Some(kind) = &prop.kind {
        let names = kind.names();
        if !names.iter().any(|name| matches_type(name, value)) {
            report.error(field, format!("expected {}, found {}", names.join(" or "), json_kind(value)));
            return;
        }
    }

    if let Some(allowed) = &prop.allowed
        && !allowed.contains(value)
    {
        let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
        report.error(field, format!("{value} is not one of [{}]", options.join(", ")));
    }

    if let (Some(pattern), Some(text)) = (&prop.pattern, value.as_str()) {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(text) => {}
            Ok(_) => report.error(field, format!("'{text}' does not match pattern {pattern}")),
            Err(e) => report.error(field, format!("invalid pattern {pattern}: {e}")),
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = prop.minimum
            && number < min
        {
            report.error(field, format!("{number} is below minimum {min}"));
        }
        if let Some(max) = prop.maximum
            && number > max
        {
            report.error(field, format!("{number} is above maximum {max}"));
        }
    }

    if let (Some(items), Some(values)) = (&prop.items, value.as_array()) {
        for (idx, item) in values.iter().enumerate() {
            validate_value(items, item, &format!("{field}[{idx}]"), report);
        }
    }

    if let Some(object) = value.as_object() {
        for key in &prop.required {
            if !object.contains_key(key) {
                report.error(&format!("{field}.{key}"), "required field is missing");
            }
        }
        if let Some(properties) = &prop.properties {
            for (key, child) in object {
                let path = format!("{field}.{key}");
                match properties.get(key) {
                    Some(child_prop) => validate_value(child_prop, child, &path, report),
                    None if prop.additional_properties == Some(false) => {
                        report.error(&path, "unknown field not allowed");
                    }
                    None => {}
                }
            }
        }
    }
}

fn matches_type(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read `path` and validate it with `schema`.
pub fn validate_file(path: impl AsRef<Path>, schema: &Schema) -> Result<ValidationReport, Error> {
    let doc = Document::read(path.as_ref())?;
    let report = schema.validate(&doc)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validated frontmatter"
    );
    Ok(report)
}
