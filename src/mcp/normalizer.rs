//! Perception alignment -- normalizes raw tool outputs for model
//! consumption: JSON parse, schema validation, secret redaction, and
//! truncated summaries.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::client::McpToolDef;

/// Concise summary budget in characters.
const CONCISE_CHARS: usize = 200;
/// Detailed summary budget in characters.
const DETAILED_CHARS: usize = 2000;

/// Secret patterns paired with their replacement markers.
fn secret_patterns() -> Vec<(Regex, &'static str)> {
    let raw = [
        (r"sk-[A-Za-z0-9]{8,}", "[REDACTED_API_KEY]"),
        (r"Bearer\s+[A-Za-z0-9._\-]{10,}", "[REDACTED_BEARER]"),
        (r"(?i)password\s*[=:]\s*\S+", "[REDACTED_PASSWORD]"),
        (r"(?i)api[_-]?key\s*[=:]\s*\S+", "[REDACTED_API_KEY]"),
        (r"(?i)secret\s*[=:]\s*\S+", "[REDACTED_SECRET]"),
        (r"ghp_[A-Za-z0-9]{36}", "[REDACTED_GH_TOKEN]"),
        (r"gho_[A-Za-z0-9]{36}", "[REDACTED_GH_TOKEN]"),
    ];
    raw.iter()
        .filter_map(|(pattern, marker)| Regex::new(pattern).ok().map(|r| (r, *marker)))
        .collect()
}

/// Redact secrets, returning the sanitized text and the markers applied.
fn redact(text: &str) -> (String, Vec<String>) {
    let mut result = text.to_owned();
    let mut markers = Vec::new();
    for (pattern, marker) in secret_patterns() {
        if pattern.is_match(&result) {
            markers.push((marker).to_owned());
            result = pattern.replace_all(&result, marker).into_owned();
        }
    }
    (result, markers)
}

/// Word-boundary truncation with a trailing ellipsis.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    if let Some(last_space) = truncated.rfind(' ') {
        if last_space > max_chars / 2 {
            truncated.truncate(last_space);
        }
    }
    truncated.push_str("...");
    truncated
}

// ── Schema registry ─────────────────────────────────────────────

/// Registry of per-tool output JSON Schemas.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, serde_json::Value>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output schema for a tool.
    pub fn register(&mut self, tool_name: &str, schema: serde_json::Value) {
        self.schemas.insert(tool_name.to_owned(), schema);
    }

    /// Registered schema for a tool, if any.
    pub fn get(&self, tool_name: &str) -> Option<&serde_json::Value> {
        self.schemas.get(tool_name)
    }

    /// Import output schemas advertised in a `tools/list` response.
    pub fn auto_discover(&mut self, tools: &[McpToolDef]) {
        for tool in tools {
            if let Some(ref schema) = tool.output_schema {
                self.schemas.insert(tool.name.clone(), schema.clone());
            }
        }
    }

    /// Validate data against a tool's schema. Tools without a registered
    /// schema validate trivially. Checks the top-level type, required
    /// fields, and primitive property types.
    pub fn validate(&self, tool_name: &str, data: &serde_json::Value) -> (bool, Vec<String>) {
        let Some(schema) = self.schemas.get(tool_name) else {
            return (true, Vec::new());
        };
        let mut errors = Vec::new();

        let expected_type = schema.get("type").and_then(|t| t.as_str());
        if expected_type == Some("object") {
            let Some(object) = data.as_object() else {
                errors.push(format!("Expected object, got {}", type_name(data)));
                return (false, errors);
            };

            if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
                for field in required.iter().filter_map(|f| f.as_str()) {
                    if !object.contains_key(field) {
                        errors.push(format!("Missing required field: {field}"));
                    }
                }
            }

            if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
                for (key, value) in object {
                    let Some(prop_type) = props
                        .get(key)
                        .and_then(|p| p.get("type"))
                        .and_then(|t| t.as_str())
                    else {
                        continue;
                    };
                    let ok = match prop_type {
                        "string" => value.is_string(),
                        "number" => value.is_number(),
                        "boolean" => value.is_boolean(),
                        _ => true,
                    };
                    if !ok {
                        errors.push(format!(
                            "Field '{key}': expected {prop_type}, got {}",
                            type_name(value)
                        ));
                    }
                }
            }
        }

        (errors.is_empty(), errors)
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ── Aligner ─────────────────────────────────────────────────────

/// Normalized view of a raw tool output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedOutput {
    /// Whether the output validated against the tool's schema.
    pub valid: bool,
    /// Parsed JSON when the output was JSON, else the raw string.
    pub data: serde_json::Value,
    /// Redacted summary within 200 chars.
    pub summary_concise: String,
    /// Redacted summary within 2000 chars.
    pub summary_detailed: String,
    /// Redaction markers that were applied.
    pub redacted_fields: Vec<String>,
    /// Schema validation errors, empty when valid.
    pub validation_errors: Vec<String>,
}

/// Normalizes raw tool outputs: parse, validate, redact, summarize.
pub struct PerceptionAligner {
    registry: SchemaRegistry,
}

impl PerceptionAligner {
    /// Aligner over a schema registry.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Mutable access to the registry for late schema registration.
    pub fn registry_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.registry
    }

    /// Normalize a raw tool output string.
    pub fn normalize(&self, tool_name: &str, raw_output: &str) -> NormalizedOutput {
        let parsed: Result<serde_json::Value, _> = serde_json::from_str(raw_output);
        let (data, is_json) = match parsed {
            Ok(value) => (value, true),
            Err(_) => (serde_json::Value::String(raw_output.to_owned()), false),
        };

        let (valid, validation_errors) = if is_json {
            self.registry.validate(tool_name, &data)
        } else {
            (true, Vec::new())
        };

        let rendered = if is_json {
            data.to_string()
        } else {
            raw_output.to_owned()
        };
        let (redacted, redacted_fields) = redact(&rendered);

        NormalizedOutput {
            valid,
            data,
            summary_concise: truncate(&redacted, CONCISE_CHARS),
            summary_detailed: truncate(&redacted, DETAILED_CHARS),
            redacted_fields,
            validation_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligner_with(tool: &str, schema: serde_json::Value) -> PerceptionAligner {
        let mut registry = SchemaRegistry::new();
        registry.register(tool, schema);
        PerceptionAligner::new(registry)
    }

    #[test]
    fn test_plain_text_passthrough() {
        let aligner = PerceptionAligner::new(SchemaRegistry::new());
        let out = aligner.normalize("any", "plain tool output");
        assert!(out.valid);
        assert_eq!(out.data, serde_json::json!("plain tool output"));
        assert_eq!(out.summary_concise, "plain tool output");
        assert!(out.redacted_fields.is_empty());
    }

    #[test]
    fn test_json_is_parsed() {
        let aligner = PerceptionAligner::new(SchemaRegistry::new());
        let out = aligner.normalize("any", r#"{"count": 3, "ok": true}"#);
        assert!(out.valid);
        assert_eq!(out.data["count"], 3);
    }

    #[test]
    fn test_schema_validation_failure() {
        let aligner = aligner_with(
            "lookup",
            serde_json::json!({
                "type": "object",
                "required": ["status"],
                "properties": {"status": {"type": "string"}, "count": {"type": "number"}},
            }),
        );
        let out = aligner.normalize("lookup", r#"{"count": "not-a-number"}"#);
        assert!(!out.valid);
        assert!(out
            .validation_errors
            .iter()
            .any(|e| e.contains("Missing required field: status")));
        assert!(out
            .validation_errors
            .iter()
            .any(|e| e.contains("expected number, got string")));
    }

    #[test]
    fn test_schema_top_level_type_mismatch() {
        let aligner = aligner_with("lookup", serde_json::json!({"type": "object"}));
        let out = aligner.normalize("lookup", "[1, 2, 3]");
        assert!(!out.valid);
        assert_eq!(out.validation_errors, vec!["Expected object, got array"]);
    }

    #[test]
    fn test_api_key_redaction() {
        let aligner = PerceptionAligner::new(SchemaRegistry::new());
        let out = aligner.normalize("env", "key=sk-abcdef1234567890 rest of output");
        assert!(out.summary_concise.contains("[REDACTED_API_KEY]"));
        assert!(!out.summary_concise.contains("sk-abcdef"));
        assert!(out.redacted_fields.contains(&"[REDACTED_API_KEY]".to_owned()));
    }

    #[test]
    fn test_bearer_and_password_redaction() {
        let aligner = PerceptionAligner::new(SchemaRegistry::new());
        let out = aligner.normalize(
            "curl",
            "Authorization: Bearer abc.def-ghi_jkl123 password: hunter2-long",
        );
        assert!(out.summary_concise.contains("[REDACTED_BEARER]"));
        assert!(out.summary_concise.contains("[REDACTED_PASSWORD]"));
        assert_eq!(out.redacted_fields.len(), 2);
    }

    #[test]
    fn test_github_token_redaction() {
        let aligner = PerceptionAligner::new(SchemaRegistry::new());
        let token = format!("ghp_{}", "A".repeat(36));
        let out = aligner.normalize("git", &format!("remote set to {token}"));
        assert!(out.summary_concise.contains("[REDACTED_GH_TOKEN]"));
    }

    #[test]
    fn test_summaries_truncate() {
        let aligner = PerceptionAligner::new(SchemaRegistry::new());
        let long = "word ".repeat(1000);
        let out = aligner.normalize("big", &long);
        assert!(out.summary_concise.chars().count() <= CONCISE_CHARS + 3);
        assert!(out.summary_concise.ends_with("..."));
        assert!(out.summary_detailed.chars().count() <= DETAILED_CHARS + 3);
        assert!(out.summary_detailed.chars().count() > out.summary_concise.chars().count());
    }

    #[test]
    fn test_auto_discover_imports_output_schemas() {
        let mut registry = SchemaRegistry::new();
        registry.auto_discover(&[
            McpToolDef {
                name: "with-schema".to_owned(),
                description: None,
                input_schema: serde_json::json!({}),
                output_schema: Some(serde_json::json!({"type": "object"})),
            },
            McpToolDef {
                name: "without-schema".to_owned(),
                description: None,
                input_schema: serde_json::json!({}),
                output_schema: None,
            },
        ]);
        assert!(registry.get("with-schema").is_some());
        assert!(registry.get("without-schema").is_none());
    }

    #[test]
    fn test_unregistered_tool_validates_trivially() {
        let registry = SchemaRegistry::new();
        let (valid, errors) = registry.validate("anything", &serde_json::json!([1]));
        assert!(valid);
        assert!(errors.is_empty());
    }
}
