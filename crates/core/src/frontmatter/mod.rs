//! Markdown files with a YAML frontmatter header.
//!
//! A document starts with a `---` line, carries a YAML mapping, and closes
//! the header with the next `---` line. Everything after the closing line is
//! the body and is written back byte for byte; only the header is
//! re-serialized, with its key order intact.
//!
//! Keys are addressed by dotted paths (`metadata.owner`). A numeric segment
//! indexes into a sequence (`tasks.0.status`).

use std::fs;
use std::path::Path;

use serde_yml::{Mapping, Value};

use crate::Error;

pub mod schema;

const DELIMITER: &str = "---";

/// A parsed markdown document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub frontmatter: Mapping,
    pub body: String,
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches(['\r', '\n']).trim_end_matches([' ', '\t', '\r']) == DELIMITER
}

impl Document {
    /// Split `text` into header and body.
    ///
    /// # Errors
    ///
    /// `Error::InvalidFrontmatter` if the first line is not `---`, no
    /// closing `---` follows, the YAML is malformed, or it is not a mapping.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut lines = text.split_inclusive('\n');
        let first = lines.next().unwrap_or_default();
        if !is_delimiter(first) {
            return Err(Error::InvalidFrontmatter("document does not start with ---".into()));
        }

        let mut offset = first.len();
        let header_start = offset;
        let mut header_end = None;
        for line in lines {
            if is_delimiter(line) {
                header_end = Some(offset);
                offset += line.len();
                break;
            }
            offset += line.len();
        }
        let header_end =
            header_end.ok_or_else(|| Error::InvalidFrontmatter("missing closing --- delimiter".into()))?;

        let yaml = &text[header_start..header_end];
        let frontmatter = if yaml.trim().is_empty() {
            Mapping::new()
        } else {
            match serde_yml::from_str::<Value>(yaml)? {
                Value::Mapping(mapping) => mapping,
                Value::Null => Mapping::new(),
                other => {
                    return Err(Error::InvalidFrontmatter(format!(
                        "frontmatter must be a mapping, found {}",
                        value_kind(&other)
                    )));
                }
            }
        };

        Ok(Self { frontmatter, body: text[offset..].to_string() })
    }

    /// Serialize back to text.
    pub fn render(&self) -> Result<String, Error> {
        let yaml = if self.frontmatter.is_empty() {
            String::new()
        } else {
            serde_yml::to_string(&Value::Mapping(self.frontmatter.clone()))?
        };

        let mut out = String::with_capacity(yaml.len() + self.body.len() + 8);
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&yaml);
        if !yaml.is_empty() && !yaml.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&self.body);
        Ok(out)
    }

    /// Read and parse a file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::from_io(e, path))?;
        Self::parse(&text).map_err(|e| match e {
            Error::InvalidFrontmatter(msg) => Error::InvalidFrontmatter(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Render and write to `path`, replacing it through a sibling temp file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let text = self.render()?;
        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, text).map_err(|e| Error::from_io(e, &tmp))?;
        fs::rename(&tmp, path).map_err(|e| Error::from_io(e, path))?;
        tracing::debug!(path = %path.display(), "wrote frontmatter");
        Ok(())
    }

    /// Value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = split_path(path).ok()?.into_iter();
        let first = segments.next()?;
        let mut current = self.frontmatter.get(first)?;
        for segment in segments {
            current = child(current, segment)?;
        }
        Some(current)
    }

    /// Set a value, creating intermediate mappings as needed.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` if the path is empty or runs through a scalar.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), Error> {
        let segments = split_path(path)?;
        let (last, parents) = segments.split_last().ok_or_else(|| Error::InvalidInput("empty key".into()))?;
        let slot = parent_mut(&mut self.frontmatter, parents, path)?;
        assign(slot, last, value, path)
    }

    /// Append to a sequence, creating it if the key is missing.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` if the key holds something other than a
    /// sequence.
    pub fn append(&mut self, path: &str, value: Value) -> Result<(), Error> {
        match self.get_mut(path) {
            Some(Value::Sequence(items)) => {
                items.push(value);
                Ok(())
            }
            Some(other) => Err(Error::InvalidInput(format!(
                "cannot append to {path}: it holds a {}, not a list",
                value_kind(other)
            ))),
            None => self.set(path, Value::Sequence(vec![value])),
        }
    }

    /// Remove a key, returning its old value.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        let (last, parents) = segments.split_last()?;

        let Some((first, rest)) = parents.split_first() else {
            return remove_key(&mut self.frontmatter, last);
        };
        let mut container = self.frontmatter.get_mut(*first)?;
        for segment in rest {
            container = child_mut(container, segment)?;
        }

        match container {
            Value::Mapping(mapping) => remove_key(mapping, last),
            Value::Sequence(items) => {
                let idx: usize = last.parse().ok()?;
                (idx < items.len()).then(|| items.remove(idx))
            }
            _ => None,
        }
    }

    /// Mutable value at a dotted path.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        let segments = split_path(path).ok()?;
        let (first, rest) = segments.split_first()?;
        let mut current = self.frontmatter.get_mut(*first)?;
        for segment in rest {
            current = child_mut(current, segment)?;
        }
        Some(current)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, Error> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalidInput(format!("invalid key path '{path}'")));
    }
    Ok(segments)
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Mapping(mapping) => mapping.get(segment),
        Value::Sequence(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Mapping(mapping) => mapping.get_mut(segment),
        Value::Sequence(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

/// Walk `parents`, creating empty mappings for missing keys.
fn parent_mut<'a>(root: &'a mut Mapping, parents: &[&str], path: &str) -> Result<&'a mut Mapping, Error> {
    let mut current = root;
    for segment in parents {
        let key = Value::String((*segment).to_string());
        if !current.contains_key(&key) {
            current.insert(key.clone(), Value::Mapping(Mapping::new()));
        }
        current = match current.get_mut(&key) {
            Some(Value::Mapping(next)) => next,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "cannot set {path}: {segment} holds a {}",
                    value_kind(other)
                )));
            }
            None => return Err(Error::InvalidInput(format!("cannot set {path}"))),
        };
    }
    Ok(current)
}

fn assign(mapping: &mut Mapping, key: &str, value: Value, path: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidInput(format!("invalid key path '{path}'")));
    }
    mapping.insert(Value::String(key.to_string()), value);
    Ok(())
}

/// Remove `key` keeping the order of the remaining entries.
fn remove_key(mapping: &mut Mapping, key: &str) -> Option<Value> {
    let removed = mapping.get(key).cloned()?;
    let kept: Mapping = std::mem::take(mapping)
        .into_iter()
        .filter(|(k, _)| k.as_str() != Some(key))
        .collect();
    *mapping = kept;
    Some(removed)
}

/// Short name of a YAML value's type, for messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Interpret a command-line string as YAML.
///
/// `42` becomes a number, `true` a boolean, `[a, b]` a list. Anything that
/// does not parse, and the empty string, stays a plain string.
pub fn parse_value(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::String(raw.to_string());
    }
    match serde_yml::from_str::<Value>(raw) {
        Ok(Value::Null) if raw.trim() != "null" && raw.trim() != "~" => Value::String(raw.to_string()),
        Ok(value) => value,
        Err(_) => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\ntitle: Phase 1\nstatus: pending\nmetadata:\n  owner: sam\n---\n\n# Phase 1\n\nBody with --- inside\r\n  trailing spaces  \n";

    #[test]
    fn test_parse_splits_header_and_body() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.get("title").and_then(Value::as_str), Some("Phase 1"));
        assert_eq!(doc.get("metadata.owner").and_then(Value::as_str), Some("sam"));
        assert_eq!(doc.body, "\n# Phase 1\n\nBody with --- inside\r\n  trailing spaces  \n");
    }

    #[test]
    fn test_render_preserves_body_and_key_order() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        doc.set("status", Value::String("completed".into())).unwrap();
        let rendered = doc.render().unwrap();

        assert!(rendered.ends_with(&doc.body));
        let reparsed = Document::parse(&rendered).unwrap();
        assert_eq!(reparsed.body, doc.body);
        let keys: Vec<&str> = reparsed.frontmatter.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["title", "status", "metadata"]);
        assert_eq!(reparsed.get("status").and_then(Value::as_str), Some("completed"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Document::parse("# no header\n"), Err(Error::InvalidFrontmatter(_))));
        assert!(matches!(Document::parse("---\ntitle: x\n"), Err(Error::InvalidFrontmatter(_))));
        assert!(matches!(Document::parse("---\n- a\n- b\n---\n"), Err(Error::InvalidFrontmatter(_))));
        assert!(matches!(Document::parse("---\ntitle: [unclosed\n---\n"), Err(Error::InvalidFrontmatter(_))));
    }

    #[test]
    fn test_empty_header_and_crlf_delimiters() {
        let doc = Document::parse("---\n---\nbody").unwrap();
        assert!(doc.frontmatter.is_empty());
        assert_eq!(doc.body, "body");
        assert_eq!(doc.render().unwrap(), "---\n---\nbody");

        let doc = Document::parse("---\r\nname: x\r\n---  \r\nrest\r\n").unwrap();
        assert_eq!(doc.get("name").and_then(Value::as_str), Some("x"));
        assert_eq!(doc.body, "rest\r\n");
    }

    #[test]
    fn test_set_creates_nested_and_rejects_scalars() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        doc.set("links.pr", Value::from(42)).unwrap();
        assert_eq!(doc.get("links.pr").and_then(Value::as_i64), Some(42));

        let err = doc.set("title.sub", Value::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(doc.set("a..b", Value::Null).is_err());
    }

    #[test]
    fn test_append() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        doc.append("blockers", Value::String("waiting on API".into())).unwrap();
        doc.append("blockers", Value::String("review".into())).unwrap();
        assert_eq!(doc.get("blockers").and_then(Value::as_sequence).map(Vec::len), Some(2));

        let err = doc.append("title", Value::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("not a list")));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.remove("title").and_then(|v| v.as_str().map(str::to_string)).as_deref(), Some("Phase 1"));
        assert!(doc.remove("title").is_none());
        assert!(doc.remove("metadata.owner").is_some());
        let keys: Vec<&str> = doc.frontmatter.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["status", "metadata"]);
    }

    #[test]
    fn test_sequence_index_paths() {
        let mut doc = Document::parse("---\ntasks:\n  - id: T1\n    status: pending\n---\n").unwrap();
        assert_eq!(doc.get("tasks.0.id").and_then(Value::as_str), Some("T1"));
        *doc.get_mut("tasks.0.status").unwrap() = Value::String("completed".into());
        assert_eq!(doc.get("tasks.0.status").and_then(Value::as_str), Some("completed"));
        assert!(doc.get("tasks.5.id").is_none());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), Value::from(42));
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("hello world"), Value::String("hello world".into()));
        assert_eq!(parse_value("2025-01-31"), Value::String("2025-01-31".into()));
        assert!(parse_value("[a, b]").is_sequence());
        assert_eq!(parse_value(""), Value::String(String::new()));
        assert_eq!(parse_value("null"), Value::Null);
        assert_eq!(parse_value("key: [oops"), Value::String("key: [oops".into()));
    }

    #[test]
    fn test_read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase-1-progress.md");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut doc = Document::read(&path).unwrap();
        doc.set("status", Value::String("in_progress".into())).unwrap();
        doc.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("status: in_progress"));
        assert!(text.ends_with("Body with --- inside\r\n  trailing spaces  \n"));

        let err = Document::read(dir.path().join("missing.md")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
