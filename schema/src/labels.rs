//! Label and label-set types for remote-write samples and read-back selectors
//!
//! A [`LabelSet`] is the identity of the synthetic series `up` writes and then
//! selects on when reading it back. Every name is checked against the standard
//! label-name syntax and duplicates are rejected, so an invalid set can never
//! reach a running probe.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Reserved label carrying the metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

static LABEL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label name pattern is valid")
});

/// Check a label name against `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME_RE.is_match(name)
}

/// Errors produced while parsing or assembling label sets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    /// Entry is not of the form `name="value"`
    #[error("unrecognized label {0:?}")]
    Unrecognized(String),

    /// Name fails the label-name syntax
    #[error("unsupported format for label {0}")]
    InvalidName(String),

    /// Value is not a valid quoted string
    #[error("unquote label value for {label}: {reason}")]
    InvalidValue { label: String, reason: String },

    /// Same name given twice
    #[error("duplicate label name {0}")]
    Duplicate(String),
}

/// A single name/value pair
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a label without validation
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, escape_value(&self.value))
    }
}

/// An ordered collection of labels with unique, valid names
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct LabelSet(Vec<Label>);

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a label set, validating every name and rejecting duplicates
    pub fn from_labels(labels: impl IntoIterator<Item = Label>) -> Result<Self, LabelError> {
        let mut set = Self::new();
        for label in labels {
            set.push(label)?;
        }
        Ok(set)
    }

    /// Parse the flag syntax `a="b",c="d"`
    ///
    /// Values must be quoted, either as double-quoted strings with the usual
    /// escapes or as raw back-quoted strings. Commas inside quoted values do not
    /// split entries.
    pub fn parse_flag(input: &str) -> Result<Self, LabelError> {
        let mut set = Self::new();
        for entry in split_entries(input) {
            let (name, raw) = entry
                .split_once('=')
                .ok_or_else(|| LabelError::Unrecognized(entry.to_string()))?;
            let name = name.trim();
            if !is_valid_label_name(name) {
                return Err(LabelError::InvalidName(entry.to_string()));
            }
            let value = unquote(raw.trim()).map_err(|reason| LabelError::InvalidValue {
                label: name.to_string(),
                reason,
            })?;
            set.push(Label::new(name, value))?;
        }
        Ok(set)
    }

    /// Append a label, validating its name
    pub fn push(&mut self, label: Label) -> Result<(), LabelError> {
        if !is_valid_label_name(&label.name) {
            return Err(LabelError::InvalidName(label.name));
        }
        if self.get(&label.name).is_some() {
            return Err(LabelError::Duplicate(label.name));
        }
        self.0.push(label);
        Ok(())
    }

    /// Merge another set into this one, rejecting names present in both
    pub fn extend(&mut self, other: LabelSet) -> Result<(), LabelError> {
        for label in other.0 {
            self.push(label)?;
        }
        Ok(())
    }

    /// Look up the value of a label by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Sort labels by name (byte order), as remote-write receivers require
    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no labels
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the labels in order
    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    /// Borrow the labels as a slice
    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }

    /// Labels whose names do not start with the reserved `__` prefix
    pub fn without_reserved(&self) -> LabelSet {
        LabelSet(
            self.0
                .iter()
                .filter(|l| !l.name.starts_with("__"))
                .cloned()
                .collect(),
        )
    }

    /// Render an equality selector matching exactly this label set
    pub fn selector(&self) -> String {
        let matchers: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        format!("{{{}}}", matchers.join(","))
    }
}

impl FromStr for LabelSet {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_flag(s)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|l| format!("{}={}", l.name, l.value))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Split on commas that are not inside a quoted value
fn split_entries(input: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '`' => quote = Some(c),
            None if c == ',' => {
                entries.push(&input[start..i]);
                start = i + 1;
            }
            None => {}
        }
    }
    entries.push(&input[start..]);
    entries.into_iter().filter(|e| !e.trim().is_empty()).collect()
}

/// Unquote a double-quoted (escaped) or back-quoted (raw) value
fn unquote(raw: &str) -> Result<String, String> {
    if raw.len() >= 2 && raw.starts_with('`') && raw.ends_with('`') {
        return Ok(raw[1..raw.len() - 1].to_string());
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return serde_json::from_str::<String>(raw).map_err(|e| e.to_string());
    }
    Err("invalid syntax".to_string())
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}
