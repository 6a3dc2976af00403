// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Structural payload descriptions and the tree-walking validator.
//!
//! A [`Shape`] is the structural description stored with every schema record.
//! Subscribers never compile publisher types: they validate inbound data by
//! walking the shape that the registry hands back.
//!
//! Validation collects every problem it finds instead of stopping at the
//! first one, drops fields the shape does not know about, and fills in
//! declared defaults for absent optional fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// FieldType / StringFormat
// ---------------------------------------------------------------------------

/// Type of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    /// Any JSON number, integers included.
    Number,
    Boolean,
    Array { items: Box<FieldType> },
    /// Nested record with its own fields.
    Object { shape: Shape },
    /// Free-form key/value object.
    Map,
    Any,
}

impl FieldType {
    pub fn array(items: FieldType) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    pub fn object(shape: Shape) -> Self {
        Self::Object { shape }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Map => "map",
            Self::Any => "any",
        }
    }
}

/// Well-known string formats checked on top of the `string` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    Email,
    Uuid,
    DateTime,
}

impl StringFormat {
    fn check(self, value: &str) -> bool {
        match self {
            Self::Email => email_regex().is_match(value),
            Self::Uuid => uuid::Uuid::parse_str(value).is_ok(),
            Self::DateTime => chrono::DateTime::parse_from_rfc3339(value).is_ok(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Uuid => "uuid",
            Self::DateTime => "date-time",
        }
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
    })
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Declaration of one named field inside a [`Shape`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<StringFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl Field {
    pub fn required(ty: FieldType) -> Self {
        Self {
            ty,
            required: true,
            default: None,
            format: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn optional(ty: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(ty)
        }
    }

    /// Set a default value; implies the field is optional.
    pub fn with_default(mut self, value: Value) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }

    pub fn with_format(mut self, format: StringFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// Structural description of a payload: a set of named fields.
///
/// Equality is structural: the title and field declaration order are
/// ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Field>,
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Add (or replace) a field declaration.
    pub fn with(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Shorthand for a required field of the given type.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.with(name, Field::required(ty))
    }

    /// Shorthand for an optional field without default.
    pub fn optional(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.with(name, Field::optional(ty))
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate `data` against this shape.
    ///
    /// On success returns the validated object: unknown fields removed,
    /// defaults applied.
    pub fn validate(&self, data: &Value) -> Result<Value, ValidationError> {
        let mut errors = Vec::new();
        let out = match data {
            Value::Object(map) => Value::Object(validate_object(self, map, "", &mut errors)),
            other => {
                errors.push(FieldError::new("", "input should be an object", "object_type"));
                other.clone()
            }
        };

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(ValidationError { errors })
        }
    }

    /// Build a shape from a JSON-Schema-style document.
    ///
    /// Understands `title`, `properties`, `required`, `type`, `items`,
    /// `format`, `minLength`, `maxLength`, `minimum`, `maximum`, `default`
    /// and nullable `anyOf` unions.  Unknown keywords are ignored.
    pub fn from_json_schema(doc: &Value) -> Result<Self, ShapeError> {
        let obj = doc.as_object().ok_or(ShapeError::NotAnObject)?;
        let required: Vec<&str> = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut shape = Shape {
            title: obj.get("title").and_then(Value::as_str).map(str::to_string),
            fields: BTreeMap::new(),
        };

        if let Some(props) = obj.get("properties") {
            let props = props
                .as_object()
                .ok_or_else(|| ShapeError::Invalid("properties must be an object".into()))?;
            for (name, prop) in props {
                let mut field = field_from_json_schema(name, prop)?;
                field.required = required.contains(&name.as_str()) && field.default.is_none();
                shape.fields.insert(name.clone(), field);
            }
        }

        Ok(shape)
    }
}

fn field_from_json_schema(name: &str, prop: &Value) -> Result<Field, ShapeError> {
    let obj = prop
        .as_object()
        .ok_or_else(|| ShapeError::Invalid(format!("property '{}' must be an object", name)))?;

    // Optional[T] is emitted as anyOf [T, null]: use the non-null branch.
    if let Some(variants) = obj.get("anyOf").and_then(Value::as_array) {
        let non_null: Vec<&Value> = variants
            .iter()
            .filter(|v| v.get("type").and_then(Value::as_str) != Some("null"))
            .collect();
        if let [single] = non_null.as_slice() {
            let mut field = field_from_json_schema(name, single)?;
            field.default = obj.get("default").cloned().filter(|d| !d.is_null());
            return Ok(field);
        }
    }

    let mut field = Field::optional(type_from_json_schema(name, obj)?);
    field.default = obj.get("default").cloned();
    field.format = match obj.get("format").and_then(Value::as_str) {
        Some("email") => Some(StringFormat::Email),
        Some("uuid") => Some(StringFormat::Uuid),
        Some("date-time") => Some(StringFormat::DateTime),
        _ => None,
    };
    field.min_length = obj.get("minLength").and_then(Value::as_u64).map(|n| n as usize);
    field.max_length = obj.get("maxLength").and_then(Value::as_u64).map(|n| n as usize);
    field.minimum = obj.get("minimum").and_then(Value::as_f64);
    field.maximum = obj.get("maximum").and_then(Value::as_f64);
    Ok(field)
}

fn type_from_json_schema(name: &str, obj: &Map<String, Value>) -> Result<FieldType, ShapeError> {
    let ty = match obj.get("type").and_then(Value::as_str) {
        Some("string") => FieldType::String,
        Some("integer") => FieldType::Integer,
        Some("number") => FieldType::Number,
        Some("boolean") => FieldType::Boolean,
        Some("array") => match obj.get("items") {
            Some(items) => {
                let items = items.as_object().ok_or_else(|| {
                    ShapeError::Invalid(format!("items of '{}' must be an object", name))
                })?;
                FieldType::array(type_from_json_schema(name, items)?)
            }
            None => FieldType::array(FieldType::Any),
        },
        Some("object") if obj.contains_key("properties") => {
            FieldType::object(Shape::from_json_schema(&Value::Object(obj.clone()))?)
        }
        Some("object") => FieldType::Map,
        Some(other) => {
            return Err(ShapeError::Invalid(format!(
                "unsupported type '{}' for '{}'",
                other, name
            )))
        }
        None => FieldType::Any,
    };
    Ok(ty)
}

// ---------------------------------------------------------------------------
// Tree walk
// ---------------------------------------------------------------------------

fn join_key(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn validate_object(
    shape: &Shape,
    input: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Map<String, Value> {
    let mut out = Map::new();

    for (name, field) in &shape.fields {
        let loc = join_key(path, name);
        match input.get(name) {
            None => {
                if let Some(default) = &field.default {
                    out.insert(name.clone(), default.clone());
                } else if field.required {
                    errors.push(FieldError::new(&loc, "field required", "missing"));
                }
            }
            Some(Value::Null) if !field.required => {
                out.insert(name.clone(), Value::Null);
            }
            Some(value) => {
                let checked = validate_value(&field.ty, value, &loc, errors);
                check_constraints(field, value, &loc, errors);
                out.insert(name.clone(), checked);
            }
        }
    }

    out
}

fn validate_value(ty: &FieldType, value: &Value, loc: &str, errors: &mut Vec<FieldError>) -> Value {
    let type_error = |errors: &mut Vec<FieldError>, kind: &str| {
        errors.push(FieldError::new(
            loc,
            &format!("input should be a valid {}", ty.name()),
            kind,
        ));
    };

    match (ty, value) {
        (FieldType::Any, v) => v.clone(),
        (FieldType::String, Value::String(_)) => value.clone(),
        (FieldType::String, _) => {
            type_error(errors, "string_type");
            value.clone()
        }
        (FieldType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => value.clone(),
        (FieldType::Integer, _) => {
            type_error(errors, "int_type");
            value.clone()
        }
        (FieldType::Number, Value::Number(_)) => value.clone(),
        (FieldType::Number, _) => {
            type_error(errors, "float_type");
            value.clone()
        }
        (FieldType::Boolean, Value::Bool(_)) => value.clone(),
        (FieldType::Boolean, _) => {
            type_error(errors, "bool_type");
            value.clone()
        }
        (FieldType::Array { items }, Value::Array(values)) => Value::Array(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| validate_value(items, v, &format!("{}[{}]", loc, i), errors))
                .collect(),
        ),
        (FieldType::Array { .. }, _) => {
            type_error(errors, "list_type");
            value.clone()
        }
        (FieldType::Object { shape }, Value::Object(map)) => {
            Value::Object(validate_object(shape, map, loc, errors))
        }
        (FieldType::Map, Value::Object(_)) => value.clone(),
        (FieldType::Object { .. } | FieldType::Map, _) => {
            type_error(errors, "dict_type");
            value.clone()
        }
    }
}

fn check_constraints(field: &Field, value: &Value, loc: &str, errors: &mut Vec<FieldError>) {
    if let Value::String(s) = value {
        let len = s.chars().count();
        if let Some(min) = field.min_length {
            if len < min {
                errors.push(FieldError::new(
                    loc,
                    &format!("string should have at least {} characters", min),
                    "string_too_short",
                ));
            }
        }
        if let Some(max) = field.max_length {
            if len > max {
                errors.push(FieldError::new(
                    loc,
                    &format!("string should have at most {} characters", max),
                    "string_too_long",
                ));
            }
        }
        if let Some(format) = field.format {
            if !format.check(s) {
                errors.push(FieldError::new(
                    loc,
                    &format!("value is not a valid {}", format.name()),
                    "value_error",
                ));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = field.minimum {
            if n < min {
                errors.push(FieldError::new(
                    loc,
                    &format!("input should be greater than or equal to {}", min),
                    "greater_than_equal",
                ));
            }
        }
        if let Some(max) = field.maximum {
            if n > max {
                errors.push(FieldError::new(
                    loc,
                    &format!("input should be less than or equal to {}", max),
                    "less_than_equal",
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Location path such as `items[0].email`; `root` for the payload itself.
    pub loc: String,
    pub msg: String,
    /// Machine-readable error kind (`missing`, `int_type`, ...).
    pub kind: String,
}

impl FieldError {
    fn new(loc: &str, msg: &str, kind: &str) -> Self {
        Self {
            loc: if loc.is_empty() {
                "root".to_string()
            } else {
                loc.to_string()
            },
            msg: msg.to_string(),
            kind: kind.to_string(),
        }
    }
}

/// Payload did not match its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

/// Number of errors spelled out in [`ValidationError::summary`].
const SUMMARY_LIMIT: usize = 5;

impl ValidationError {
    /// Build a single-error validation failure.
    pub fn single(loc: &str, msg: &str, kind: &str) -> Self {
        Self {
            errors: vec![FieldError::new(loc, msg, kind)],
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// One-line human readable summary, safe for logs.
    pub fn summary(&self) -> String {
        match self.errors.as_slice() {
            [] => "0 validation errors".to_string(),
            [e] => format!("{}: {} [type={}]", e.loc, e.msg, e.kind),
            errors => {
                let mut parts: Vec<String> = errors
                    .iter()
                    .take(SUMMARY_LIMIT)
                    .map(|e| format!("{}: {}", e.loc, e.msg))
                    .collect();
                if errors.len() > SUMMARY_LIMIT {
                    parts.push(format!("... and {} more", errors.len() - SUMMARY_LIMIT));
                }
                format!("{} validation errors: {}", errors.len(), parts.join("; "))
            }
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for ValidationError {}

/// A structural description could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("schema document must be a JSON object")]
    NotAnObject,
    #[error("invalid schema document: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
