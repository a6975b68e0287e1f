//! Structured Value Schemas
//!
//! A fluent builder for describing JSON-shaped values, checking candidate
//! values against the description, and rendering it as a JSON-Schema tree
//! that providers understand.
//!
//! ```rust,ignore
//! use agent_core::Schema;
//!
//! let schema = Schema::object([
//!     ("name", Schema::string().description("The name")),
//!     ("age", Schema::integer().min(0).max(150)),
//!     ("tags", Schema::array(Schema::string()).optional()),
//! ]);
//!
//! let result = schema.validate(&serde_json::json!({"name": "Ada", "age": 36}));
//! assert!(result.valid);
//! ```
//!
//! `min`/`max` are overloaded by the receiver's type: on a string schema they
//! set `minLength`/`maxLength`, on every other type a numeric bound. Existing
//! schemas rely on this, so it must stay that way.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Path of the value being validated when no other path is given
pub const ROOT_PATH: &str = "$";

/// The declared shape of a schema node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Enum,
    Null,
}

impl SchemaType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Enum => "enum",
            Self::Null => "null",
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`Schema::validate`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Raised by [`Schema::parse`] with every collected violation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Schema validation failed:\n{}", .errors.join("\n"))]
pub struct SchemaValidationError {
    pub errors: Vec<String>,
}

/// A string pattern, compiled once when the schema is built
#[derive(Clone, Debug)]
struct Pattern {
    source: String,
    /// None when `source` is not a valid regex
    compiled: Option<Regex>,
}

impl Pattern {
    fn new(source: String) -> Self {
        let compiled = Regex::new(&source).ok();
        Self { source, compiled }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Immutable description of an expected value shape
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    schema_type: SchemaType,
    description: Option<String>,
    nullable: bool,
    optional: bool,
    default: Option<Value>,

    // String constraints
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Pattern>,

    // Number constraints
    minimum: Option<f64>,
    maximum: Option<f64>,

    // Array constraints
    items: Option<Box<Schema>>,
    min_items: Option<usize>,
    max_items: Option<usize>,

    // Object constraints, in declaration order
    properties: Vec<(String, Schema)>,
    required: Vec<String>,

    enum_values: Vec<Value>,
}

impl Schema {
    const fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            description: None,
            nullable: false,
            optional: false,
            default: None,
            min_length: None,
            max_length: None,
            pattern: None,
            minimum: None,
            maximum: None,
            items: None,
            min_items: None,
            max_items: None,
            properties: Vec::new(),
            required: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    pub const fn string() -> Self {
        Self::new(SchemaType::String)
    }

    /// Any JSON number, integral or not
    pub const fn number() -> Self {
        Self::new(SchemaType::Number)
    }

    pub const fn integer() -> Self {
        Self::new(SchemaType::Integer)
    }

    pub const fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    /// A list whose every element matches `items`
    pub fn array(items: Self) -> Self {
        let mut schema = Self::new(SchemaType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    /// An object with the given properties.
    ///
    /// Every property not marked [`optional`](Self::optional) at this point
    /// becomes required.
    pub fn object<K, I>(properties: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        let mut schema = Self::new(SchemaType::Object);
        for (name, property) in properties {
            let name = name.into();
            // Re-declaring a name replaces the earlier definition
            schema.properties.retain(|(n, _)| *n != name);
            schema.required.retain(|r| *r != name);
            if !property.optional {
                schema.required.push(name.clone());
            }
            schema.properties.push((name, property));
        }
        schema
    }

    /// One of a fixed set of values, compared strictly
    pub fn enumeration<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let mut schema = Self::new(SchemaType::Enum);
        schema.enum_values = values.into_iter().map(Into::into).collect();
        schema
    }

    pub const fn null() -> Self {
        Self::new(SchemaType::Null)
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Advertised default. Never applied by validation.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Minimum length on strings, minimum value on everything else
    #[must_use]
    pub fn min(mut self, value: impl Into<f64>) -> Self {
        let value = value.into();
        if self.schema_type == SchemaType::String {
            self.min_length = Some(length_bound(value));
        } else {
            self.minimum = Some(value);
        }
        self
    }

    /// Maximum length on strings, maximum value on everything else
    #[must_use]
    pub fn max(mut self, value: impl Into<f64>) -> Self {
        let value = value.into();
        if self.schema_type == SchemaType::String {
            self.max_length = Some(length_bound(value));
        } else {
            self.maximum = Some(value);
        }
        self
    }

    /// Regular expression (regex crate syntax, unanchored) a string must match
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(Pattern::new(pattern.into()));
        self
    }

    #[must_use]
    pub const fn min_items(mut self, count: usize) -> Self {
        self.min_items = Some(count);
        self
    }

    #[must_use]
    pub const fn max_items(mut self, count: usize) -> Self {
        self.max_items = Some(count);
        self
    }

    pub const fn schema_type(&self) -> SchemaType {
        self.schema_type
    }

    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Names of required object properties, in declaration order
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Object properties, in declaration order
    pub fn properties(&self) -> &[(String, Self)] {
        &self.properties
    }

    /// Render as a JSON-Schema tree.
    ///
    /// Enums are described as `{"type": "string", "enum": [...]}` and a
    /// nullable schema widens `type` to `[type, "null"]`. Objects always carry
    /// `"additionalProperties": false`.
    pub fn describe(&self) -> Value {
        let mut schema = Map::new();

        let type_name = match self.schema_type {
            SchemaType::Enum => "string",
            other => other.as_str(),
        };

        schema.insert("type".into(), json!(type_name));
        if self.schema_type == SchemaType::Enum {
            schema.insert("enum".into(), Value::Array(self.enum_values.clone()));
        }

        if let Some(description) = &self.description {
            schema.insert("description".into(), json!(description));
        }

        if self.nullable && self.schema_type != SchemaType::Null {
            schema.insert("type".into(), json!([type_name, "null"]));
        }

        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }

        if let Some(min_length) = self.min_length {
            schema.insert("minLength".into(), json!(min_length));
        }
        if let Some(max_length) = self.max_length {
            schema.insert("maxLength".into(), json!(max_length));
        }
        if let Some(pattern) = &self.pattern {
            schema.insert("pattern".into(), json!(pattern.source));
        }

        if let Some(minimum) = self.minimum {
            schema.insert("minimum".into(), number_value(minimum));
        }
        if let Some(maximum) = self.maximum {
            schema.insert("maximum".into(), number_value(maximum));
        }

        if self.schema_type == SchemaType::Array {
            if let Some(items) = &self.items {
                schema.insert("items".into(), items.describe());
            }
            if let Some(min_items) = self.min_items {
                schema.insert("minItems".into(), json!(min_items));
            }
            if let Some(max_items) = self.max_items {
                schema.insert("maxItems".into(), json!(max_items));
            }
        }

        if self.schema_type == SchemaType::Object {
            let properties: Map<String, Value> = self
                .properties
                .iter()
                .map(|(name, prop)| (name.clone(), prop.describe()))
                .collect();
            schema.insert("properties".into(), Value::Object(properties));
            if !self.required.is_empty() {
                schema.insert("required".into(), json!(self.required));
            }
            schema.insert("additionalProperties".into(), json!(false));
        }

        Value::Object(schema)
    }

    /// Check `value` against this schema, rooted at `$`
    pub fn validate(&self, value: &Value) -> ValidationResult {
        self.validate_at(value, ROOT_PATH)
    }

    /// Check `value` against this schema, reporting errors under `path`.
    ///
    /// Every violation in the tree is collected; nothing short-circuits.
    pub fn validate_at(&self, value: &Value, path: &str) -> ValidationResult {
        let mut errors = Vec::new();
        self.collect_errors(value, path, &mut errors);
        ValidationResult::from_errors(errors)
    }

    /// Verify `value` and hand it back untouched
    pub fn parse(&self, value: Value) -> Result<Value, SchemaValidationError> {
        let result = self.validate(&value);
        if result.valid {
            Ok(value)
        } else {
            Err(SchemaValidationError {
                errors: result.errors,
            })
        }
    }

    /// Like [`parse`](Self::parse), discarding the error details
    pub fn safe_parse(&self, value: Value) -> Option<Value> {
        self.parse(value).ok()
    }

    fn collect_errors(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        if value.is_null() {
            if !(self.nullable || self.optional) {
                errors.push(format!("{path}: Value cannot be null"));
            }
            return;
        }

        match self.schema_type {
            SchemaType::String => self.check_string(value, path, errors),
            SchemaType::Number => {
                if value.is_number() {
                    self.check_bounds(value, path, errors);
                } else {
                    errors.push(type_error(path, self.schema_type, value));
                }
            }
            SchemaType::Integer => {
                if value.is_i64() || value.is_u64() {
                    self.check_bounds(value, path, errors);
                } else {
                    errors.push(type_error(path, self.schema_type, value));
                }
            }
            SchemaType::Boolean => {
                if !value.is_boolean() {
                    errors.push(type_error(path, self.schema_type, value));
                }
            }
            SchemaType::Array => self.check_array(value, path, errors),
            SchemaType::Object => self.check_object(value, path, errors),
            SchemaType::Enum => {
                if !self.enum_values.contains(value) {
                    let allowed = self
                        .enum_values
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    errors.push(format!("{path}: Value must be one of: {allowed}"));
                }
            }
            SchemaType::Null => errors.push(type_error(path, self.schema_type, value)),
        }
    }

    fn check_string(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        let Some(text) = value.as_str() else {
            errors.push(type_error(path, self.schema_type, value));
            return;
        };

        if let Some(min) = self.min_length {
            if text.len() < min {
                errors.push(format!("{path}: String length must be at least {min}"));
            }
        }
        if let Some(max) = self.max_length {
            if text.len() > max {
                errors.push(format!("{path}: String length must be at most {max}"));
            }
        }
        if let Some(pattern) = &self.pattern {
            let source = &pattern.source;
            match &pattern.compiled {
                Some(re) if re.is_match(text) => {}
                Some(_) => errors.push(format!("{path}: String must match pattern {source}")),
                None => errors.push(format!("{path}: Invalid pattern {source}")),
            }
        }
    }

    fn check_bounds(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        let Some(number) = value.as_f64() else {
            return;
        };
        if let Some(min) = self.minimum {
            if number < min {
                errors.push(format!("{path}: Value must be at least {min}"));
            }
        }
        if let Some(max) = self.maximum {
            if number > max {
                errors.push(format!("{path}: Value must be at most {max}"));
            }
        }
    }

    fn check_array(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        let Some(elements) = value.as_array() else {
            errors.push(type_error(path, self.schema_type, value));
            return;
        };

        if let Some(min) = self.min_items {
            if elements.len() < min {
                errors.push(format!("{path}: Array must have at least {min} items"));
            }
        }
        if let Some(max) = self.max_items {
            if elements.len() > max {
                errors.push(format!("{path}: Array must have at most {max} items"));
            }
        }
        if let Some(items) = &self.items {
            for (i, element) in elements.iter().enumerate() {
                items.collect_errors(element, &format!("{path}[{i}]"), errors);
            }
        }
    }

    fn check_object(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        let Some(object) = value.as_object() else {
            errors.push(type_error(path, self.schema_type, value));
            return;
        };

        for name in &self.required {
            if !object.contains_key(name) {
                errors.push(format!("{path}.{name}: Required property is missing"));
            }
        }

        // Unknown keys are tolerated here; the described form forbids them upstream
        for (name, property) in &self.properties {
            if let Some(field) = object.get(name) {
                property.collect_errors(field, &format!("{path}.{name}"), errors);
            }
        }
    }
}

fn type_error(path: &str, expected: SchemaType, value: &Value) -> String {
    format!("{path}: Expected {expected}, got {}", value_type_name(value))
}

/// JSON type name of a value, distinguishing integers from other numbers
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn length_bound(value: f64) -> usize {
    value.max(0.0) as usize
}

/// Integral bounds are emitted as JSON integers so `min(0)` reads `0`, not `0.0`
#[allow(clippy::cast_possible_truncation)]
fn number_value(value: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE {
        json!(value as i64)
    } else {
        json!(value)
    }
}
