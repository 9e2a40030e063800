//! JSON-schema validation of work orders, contracts, attention templates, and
//! configuration objects (C5).
//!
//! No crate in the reference stack does JSON-schema validation directly; this
//! one pulls in `jsonschema`, the crate seen in other agent-runtime manifests
//! in the wider retrieval pack, rather than hand-rolling a validator.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema compilation failed: {0}")]
    Invalid(String),

    #[error("instance failed validation: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}

/// A compiled JSON schema, ready for repeated validation. Compilation is the
/// expensive part, so callers (prompt contracts, attention templates) compile
/// once and hold the result alongside the schema `Value` they loaded it from.
pub struct CompiledSchema {
    schema: JSONSchema,
}

impl CompiledSchema {
    pub fn compile(schema: &Value) -> Result<Self, SchemaError> {
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| SchemaError::Invalid(e.to_string()))?;
        Ok(Self { schema })
    }

    pub fn validate(&self, instance: &Value) -> Result<(), SchemaError> {
        match self.schema.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
                Err(SchemaError::ValidationFailed(messages))
            }
        }
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.schema.is_valid(instance)
    }
}

/// Compile and validate in one call, for the common case of a schema that is
/// not reused across many instances (e.g. validating a single WO at plan time).
pub fn validate_once(schema: &Value, instance: &Value) -> Result<(), SchemaError> {
    CompiledSchema::compile(schema)?.validate(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_and_validates_matching_instance() {
        let schema = json!({
            "type": "object",
            "required": ["response_text"],
            "properties": { "response_text": { "type": "string" } }
        });
        let compiled = CompiledSchema::compile(&schema).unwrap();
        assert!(compiled.validate(&json!({"response_text": "hi"})).is_ok());
    }

    #[test]
    fn rejects_instance_missing_required_field() {
        let schema = json!({
            "type": "object",
            "required": ["response_text"]
        });
        let compiled = CompiledSchema::compile(&schema).unwrap();
        let err = compiled.validate(&json!({})).unwrap_err();
        assert!(matches!(err, SchemaError::ValidationFailed(_)));
    }

    #[test]
    fn invalid_schema_itself_is_reported() {
        let not_a_schema = json!({"type": "not-a-real-type"});
        let result = CompiledSchema::compile(&not_a_schema);
        assert!(result.is_err());
    }

    #[test]
    fn validate_once_matches_two_step_path() {
        let schema = json!({"type": "string"});
        assert!(validate_once(&schema, &json!("ok")).is_ok());
        assert!(validate_once(&schema, &json!(1)).is_err());
    }
}
