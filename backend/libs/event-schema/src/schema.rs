use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

/// Fallback schema applied to event types with no registered schema.
pub const GENERIC_SCHEMA: &str = "generic";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("event_type is required and must be a string")]
    MissingOrInvalidType,

    #[error("no schema found for event type: {0}")]
    NoSchema(String),

    #[error("required field '{0}' is missing")]
    MissingField(String),

    #[error("field '{field}' must be a {expected}, got {actual}")]
    WrongType {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("custom validation failed for field '{field}': {message}")]
    CustomRule { field: String, message: String },
}

/// Declared type for a schema field. Anything outside the known set is
/// declared as `NonNull`, which only checks that the value is not null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Map,
    Array,
    NonNull,
}

impl FieldType {
    fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Map => "map",
            FieldType::Array => "array",
            FieldType::NonNull => "non-null value",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Map => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::NonNull => !value.is_null(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// Custom per-field validation predicate.
pub type ValidationRule = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Field schema for a single event type.
#[derive(Clone, Default)]
pub struct EventSchema {
    pub required_fields: Vec<String>,
    pub field_types: HashMap<String, FieldType>,
    pub custom_rules: HashMap<String, ValidationRule>,
}

impl EventSchema {
    pub fn new(required_fields: &[&str], field_types: &[(&str, FieldType)]) -> Self {
        Self {
            required_fields: required_fields.iter().map(|f| f.to_string()).collect(),
            field_types: field_types
                .iter()
                .map(|(f, t)| (f.to_string(), *t))
                .collect(),
            custom_rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, field: impl Into<String>, rule: ValidationRule) -> Self {
        self.custom_rules.insert(field.into(), rule);
        self
    }
}

/// Registry of event schemas, consulted on every tracked event.
///
/// Schemas are registered once at startup and the registry is shared
/// immutably afterwards; validation is a pure function over the registry
/// and the incoming payload.
pub struct SchemaRegistry {
    schemas: HashMap<String, EventSchema>,
}

impl SchemaRegistry {
    /// An empty registry with no schemas, not even the generic fallback.
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the default analytics schemas.
    pub fn with_default_schemas() -> Self {
        let mut registry = Self::new();

        registry.register(
            "page_view",
            EventSchema::new(
                &["event_type", "user_id"],
                &[
                    ("event_type", FieldType::String),
                    ("user_id", FieldType::String),
                    ("page", FieldType::String),
                    ("properties", FieldType::Map),
                    ("session_id", FieldType::String),
                    ("ip_address", FieldType::String),
                ],
            )
            .with_rule("event_type", literal_event_type("page_view")),
        );

        registry.register(
            "conversion",
            EventSchema::new(
                &["event_type", "user_id"],
                &[
                    ("event_type", FieldType::String),
                    ("user_id", FieldType::String),
                    ("page", FieldType::String),
                    ("properties", FieldType::Map),
                    ("amount", FieldType::Number),
                    ("currency", FieldType::String),
                ],
            )
            .with_rule("event_type", literal_event_type("conversion")),
        );

        registry.register(
            GENERIC_SCHEMA,
            EventSchema::new(
                &["event_type", "user_id"],
                &[
                    ("event_type", FieldType::String),
                    ("user_id", FieldType::String),
                    ("page", FieldType::String),
                    ("properties", FieldType::Map),
                    ("session_id", FieldType::String),
                    ("ip_address", FieldType::String),
                ],
            ),
        );

        registry
    }

    /// Installs or overwrites the schema for an event type.
    pub fn register(&mut self, event_type: impl Into<String>, schema: EventSchema) {
        self.schemas.insert(event_type.into(), schema);
    }

    /// Validates an event payload against the schema for its `event_type`,
    /// falling back to the generic schema for unregistered types.
    ///
    /// Checks run in order: required fields, declared field types (only for
    /// fields actually present), custom rules. The first failure wins.
    pub fn validate(&self, event_data: &Map<String, Value>) -> Result<(), ValidationError> {
        let schema = self.resolve_schema(event_data)?;

        for field in &schema.required_fields {
            if !event_data.contains_key(field) {
                return Err(ValidationError::MissingField(field.clone()));
            }
        }

        for (field, expected) in &schema.field_types {
            if let Some(value) = event_data.get(field) {
                if !expected.matches(value) {
                    return Err(ValidationError::WrongType {
                        field: field.clone(),
                        expected: expected.name(),
                        actual: json_type_name(value),
                    });
                }
            }
        }

        for (field, rule) in &schema.custom_rules {
            if let Some(value) = event_data.get(field) {
                if let Err(message) = rule(value) {
                    return Err(ValidationError::CustomRule {
                        field: field.clone(),
                        message,
                    });
                }
            }
        }

        Ok(())
    }

    /// Collects every violation instead of stopping at the first one.
    /// Intended for diagnostics endpoints, not for the hot ingestion path.
    pub fn validation_errors(&self, event_data: &Map<String, Value>) -> Vec<String> {
        let schema = match self.resolve_schema(event_data) {
            Ok(schema) => schema,
            Err(e) => return vec![e.to_string()],
        };

        let mut errors = Vec::new();

        for field in &schema.required_fields {
            if !event_data.contains_key(field) {
                errors.push(ValidationError::MissingField(field.clone()).to_string());
            }
        }

        for (field, expected) in &schema.field_types {
            if let Some(value) = event_data.get(field) {
                if !expected.matches(value) {
                    errors.push(
                        ValidationError::WrongType {
                            field: field.clone(),
                            expected: expected.name(),
                            actual: json_type_name(value),
                        }
                        .to_string(),
                    );
                }
            }
        }

        for (field, rule) in &schema.custom_rules {
            if let Some(value) = event_data.get(field) {
                if let Err(message) = rule(value) {
                    errors.push(
                        ValidationError::CustomRule {
                            field: field.clone(),
                            message,
                        }
                        .to_string(),
                    );
                }
            }
        }

        errors
    }

    fn resolve_schema(
        &self,
        event_data: &Map<String, Value>,
    ) -> Result<&EventSchema, ValidationError> {
        let event_type = event_data
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingOrInvalidType)?;

        self.schemas
            .get(event_type)
            .or_else(|| self.schemas.get(GENERIC_SCHEMA))
            .ok_or_else(|| ValidationError::NoSchema(event_type.to_string()))
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::with_default_schemas()
    }
}

/// Rule pinning `event_type` to a literal, so a payload cannot claim one
/// schema while carrying another tag.
fn literal_event_type(expected: &'static str) -> ValidationRule {
    Arc::new(move |value: &Value| {
        if let Some(s) = value.as_str() {
            if s != expected {
                return Err(format!(
                    "event_type must be '{expected}' for {expected} events"
                ));
            }
        }
        Ok(())
    })
}
