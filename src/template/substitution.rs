//! Placeholder substitution for template bodies
//!
//! Placeholders are brace-delimited upper snake identifiers (`{ENTITY_NAME}`).
//! Substitution is a single pass over the input; afterwards the output is
//! scanned again and every placeholder still present is reported.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Placeholder wire syntax shared with template authors
pub static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Z_]+)\}").expect("placeholder pattern compiles"));

/// Scalar value bound to a placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Explicitly unset; the placeholder is left untouched
    Absent,
}

impl TemplateValue {
    /// Text form used in the rendered output, `None` when absent
    pub fn render(&self) -> Option<String> {
        match self {
            TemplateValue::Bool(value) => Some(value.to_string()),
            TemplateValue::Number(value) => Some(format_number(*value)),
            TemplateValue::Text(value) => Some(value.clone()),
            TemplateValue::Absent => None,
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(text) => f.write_str(&text),
            None => Ok(()),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Text(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::Text(value)
    }
}

impl From<&String> for TemplateValue {
    fn from(value: &String) -> Self {
        TemplateValue::Text(value.clone())
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        TemplateValue::Bool(value)
    }
}

impl From<f64> for TemplateValue {
    fn from(value: f64) -> Self {
        TemplateValue::Number(value)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        TemplateValue::Number(value as f64)
    }
}

impl From<i32> for TemplateValue {
    fn from(value: i32) -> Self {
        TemplateValue::Number(f64::from(value))
    }
}

impl From<u32> for TemplateValue {
    fn from(value: u32) -> Self {
        TemplateValue::Number(f64::from(value))
    }
}

impl From<usize> for TemplateValue {
    fn from(value: usize) -> Self {
        TemplateValue::Number(value as f64)
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(TemplateValue::Absent)
    }
}

/// Mapping from placeholder name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateVariables {
    values: HashMap<String, TemplateValue>,
}

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any previous binding
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`TemplateVariables::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for TemplateVariables
where
    K: Into<String>,
    V: Into<TemplateValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = TemplateVariables::new();
        for (name, value) in iter {
            vars.set(name, value);
        }
        vars
    }
}

/// Rendered text plus placeholders that had no value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionResult {
    pub content: String,
    pub unsubstituted_variables: Vec<String>,
}

impl SubstitutionResult {
    pub fn is_complete(&self) -> bool {
        self.unsubstituted_variables.is_empty()
    }
}

/// Replace every placeholder in `template` that has a value in `variables`
pub fn substitute(template: &str, variables: &TemplateVariables) -> SubstitutionResult {
    let content = PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &Captures<'_>| {
            match variables.get(&caps[1]).and_then(TemplateValue::render) {
                Some(text) => text,
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    let unsubstituted_variables = find_placeholders(&content);
    if !unsubstituted_variables.is_empty() {
        tracing::warn!(
            unresolved = ?unsubstituted_variables,
            "template has unsubstituted variables"
        );
    }

    SubstitutionResult {
        content,
        unsubstituted_variables,
    }
}

/// Distinct placeholder names in `text`, first occurrence first
pub fn find_placeholders(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps[1].to_string();
            seen.insert(name.clone()).then_some(name)
        })
        .collect()
}
