//! Entity field definitions and their Drizzle column rendering
//!
//! `render_columns` turns field definitions into the `FIELDS` block of a
//! schema template; `parse_field_declarations` reads column declarations back
//! out of generated schema code.

use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DEFAULT_VARCHAR_LENGTH: u32 = 255;

const AUDIT_TIMESTAMPS: [&str; 2] = ["createdAt", "updatedAt"];

/// Placeholder text for a schema with no fields
pub const EMPTY_FIELDS_MARKER: &str = "  // No fields defined";

static COLUMN_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*([A-Za-z_$][\w$]*):\s*(varchar|text|integer|boolean|timestamp|uuid|jsonb)\("([^"]+)"([^)]*)\)((?:\.\w+\([^)]*\))*),?\s*$"#,
    )
    .expect("column declaration pattern compiles")
});

static VARCHAR_LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"length:\s*(\d+)").expect("length pattern compiles"));

/// Scalar kind of an entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Uuid,
    Text,
    Json,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Uuid => "uuid",
            FieldKind::Text => "text",
            FieldKind::Json => "json",
        }
    }

    /// Drizzle pg-core column builder for this kind
    pub fn column_builder(&self) -> &'static str {
        match self {
            FieldKind::String => "varchar",
            FieldKind::Number => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "timestamp",
            FieldKind::Uuid => "uuid",
            FieldKind::Text => "text",
            FieldKind::Json => "jsonb",
        }
    }

    fn from_column_builder(builder: &str) -> Option<Self> {
        Some(match builder {
            "varchar" => FieldKind::String,
            "integer" => FieldKind::Number,
            "boolean" => FieldKind::Boolean,
            "timestamp" => FieldKind::Date,
            "uuid" => FieldKind::Uuid,
            "text" => FieldKind::Text,
            "jsonb" => FieldKind::Json,
            _ => return None,
        })
    }
}

/// Unknown kinds fall back to `string`
impl From<String> for FieldKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "number" => FieldKind::Number,
            "boolean" => FieldKind::Boolean,
            "date" => FieldKind::Date,
            "uuid" => FieldKind::Uuid,
            "text" => FieldKind::Text,
            "json" => FieldKind::Json,
            _ => FieldKind::String,
        }
    }
}

impl From<FieldKind> for String {
    fn from(value: FieldKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entity field as supplied by the codegen request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub primary_key: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            unique: false,
            default_value: None,
            max_length: None,
            primary_key: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Render as a Drizzle column declaration line (two-space indent, trailing comma)
    pub fn to_column(&self) -> String {
        let column_name = to_snake_case(&self.name);
        let builder = self.kind.column_builder();
        let column = match self.kind {
            FieldKind::String => format!(
                "{builder}(\"{column_name}\", {{ length: {} }})",
                self.max_length.unwrap_or(DEFAULT_VARCHAR_LENGTH)
            ),
            _ => format!("{builder}(\"{column_name}\")"),
        };

        let mut modifiers = String::new();
        if self.primary_key {
            modifiers.push_str(".primaryKey()");
        }
        if self.required {
            modifiers.push_str(".notNull()");
        }
        if self.unique {
            modifiers.push_str(".unique()");
        }
        if let Some(default) = &self.default_value {
            match self.kind {
                FieldKind::Uuid => modifiers.push_str(".defaultRandom()"),
                FieldKind::String | FieldKind::Text => {
                    let literal = serde_json::to_string(default).unwrap_or_default();
                    modifiers.push_str(&format!(".default({literal})"));
                }
                FieldKind::Number => modifiers.push_str(&format!(".default({default})")),
                FieldKind::Boolean => {
                    modifiers.push_str(&format!(".default({})", default == "true"))
                }
                FieldKind::Date if default.eq_ignore_ascii_case("now") => {
                    modifiers.push_str(".defaultNow()")
                }
                FieldKind::Date | FieldKind::Json => {}
            }
        }

        format!("  {}: {column}{modifiers},", self.name)
    }
}

/// `name:kind[:required][:unique][:pk][:max=N][:default=V]`
impl FromStr for FieldDefinition {
    type Err = anyhow::Error;

    fn from_str(spec: &str) -> Result<Self> {
        let mut parts = spec.split(':');
        let name = parts.next().unwrap_or_default().trim();
        if name.is_empty() {
            bail!("field spec '{spec}' has no name");
        }
        let kind = parts
            .next()
            .map(|kind| FieldKind::from(kind.trim().to_string()))
            .unwrap_or(FieldKind::String);

        let mut field = FieldDefinition::new(name, kind);
        for flag in parts.map(str::trim) {
            match flag {
                "required" => field.required = true,
                "unique" => field.unique = true,
                "pk" | "primaryKey" => field.primary_key = true,
                other => {
                    if let Some(length) = other.strip_prefix("max=") {
                        field.max_length = Some(length.parse()?);
                    } else if let Some(value) = other.strip_prefix("default=") {
                        field.default_value = Some(value.to_string());
                    } else {
                        bail!("unknown field flag '{other}' in '{spec}'");
                    }
                }
            }
        }
        Ok(field)
    }
}

/// Column lines for `fields`, or the empty marker when there are none
pub fn render_columns(fields: &[FieldDefinition]) -> String {
    if fields.is_empty() {
        return EMPTY_FIELDS_MARKER.to_string();
    }
    fields
        .iter()
        .map(FieldDefinition::to_column)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `fields` followed by `createdAt`/`updatedAt` timestamp columns for any
/// that are missing. An empty field list stays empty.
pub fn with_audit_timestamps(fields: &[FieldDefinition]) -> Vec<FieldDefinition> {
    let mut out = fields.to_vec();
    if fields.is_empty() {
        return out;
    }
    for name in AUDIT_TIMESTAMPS {
        let column = to_snake_case(name);
        if !fields.iter().any(|field| to_snake_case(&field.name) == column) {
            out.push(
                FieldDefinition::new(name, FieldKind::Date)
                    .required()
                    .with_default("now"),
            );
        }
    }
    out
}

/// Drizzle builders needed by `fields`, deduplicated, first use first
pub fn column_imports(fields: &[FieldDefinition]) -> Vec<&'static str> {
    let mut imports = Vec::new();
    for field in fields {
        let builder = field.kind.column_builder();
        if !imports.contains(&builder) {
            imports.push(builder);
        }
    }
    imports
}

/// A column declaration recovered from generated schema code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedField {
    pub name: String,
    pub column: String,
    pub kind: FieldKind,
    pub required: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub max_length: Option<u32>,
}

/// Scan generated schema code for column declarations
pub fn parse_field_declarations(code: &str) -> Vec<ParsedField> {
    code.lines()
        .filter_map(|line| {
            let caps = COLUMN_DECLARATION.captures(line)?;
            let kind = FieldKind::from_column_builder(&caps[2])?;
            let modifiers = &caps[5];
            let max_length = match kind {
                FieldKind::String => VARCHAR_LENGTH
                    .captures(&caps[4])
                    .and_then(|length| length[1].parse().ok()),
                _ => None,
            };
            Some(ParsedField {
                name: caps[1].to_string(),
                column: caps[3].to_string(),
                kind,
                required: modifiers.contains(".notNull()"),
                unique: modifiers.contains(".unique()"),
                primary_key: modifiers.contains(".primaryKey()"),
                max_length,
            })
        })
        .collect()
}

pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        out.push(ch.to_ascii_lowercase());
    }
    out
}

/// `order_items` / `order-items` / `OrderItems` -> `orderItems`
pub fn to_camel_case(name: &str) -> String {
    let spaced = to_snake_case(name);
    spaced
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .enumerate()
        .map(|(index, word)| {
            if index == 0 {
                word.to_string()
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .collect()
}

/// Lower-case the first character only (`OrderItem` -> `orderItem`)
pub fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
