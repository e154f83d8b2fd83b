//! Provider configuration validation
//!
//! Checks an untyped JSON configuration against the field schema of its
//! provider type. Every violation is reported, in schema order, and nothing
//! here touches the network.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{EvictionPolicy, ProviderType};

/// Result of [`validate_configuration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
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

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Text,
    Flag,
    Integer { min: u64, max: u64 },
    TextList,
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
struct FieldRule {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldRule {
    FieldRule {
        name,
        kind,
        required: false,
    }
}

const fn required(name: &'static str, kind: FieldKind) -> FieldRule {
    FieldRule {
        name,
        kind,
        required: true,
    }
}

const TIMEOUT_RANGE: FieldKind = FieldKind::Integer {
    min: 1,
    max: 600_000,
};
const TTL_RANGE: FieldKind = FieldKind::Integer {
    min: 0,
    max: u32::MAX as u64,
};

const MEMORY_SCHEMA: &[FieldRule] = &[
    optional("name", FieldKind::Text),
    optional(
        "maxSize",
        FieldKind::Integer {
            min: 1,
            max: u32::MAX as u64,
        },
    ),
    optional(
        "maxMemory",
        FieldKind::Integer {
            min: 1,
            max: i64::MAX as u64,
        },
    ),
    optional("defaultTTL", TTL_RANGE),
    optional("evictionPolicy", FieldKind::OneOf(&EvictionPolicy::NAMES)),
];

const REDIS_SCHEMA: &[FieldRule] = &[
    optional("name", FieldKind::Text),
    required("host", FieldKind::Text),
    optional("port", FieldKind::Integer { min: 1, max: 65_535 }),
    optional("db", FieldKind::Integer { min: 0, max: 15 }),
    optional("password", FieldKind::Text),
    optional("keyPrefix", FieldKind::Text),
    optional("lazyConnect", FieldKind::Flag),
    optional("defaultTTL", TTL_RANGE),
    optional("timeout", TIMEOUT_RANGE),
];

const MEMCACHED_SCHEMA: &[FieldRule] = &[
    optional("name", FieldKind::Text),
    required("servers", FieldKind::TextList),
    optional("timeout", TIMEOUT_RANGE),
    optional("retries", FieldKind::Integer { min: 0, max: 10 }),
    optional("defaultTTL", TTL_RANGE),
];

fn schema(provider_type: ProviderType) -> &'static [FieldRule] {
    match provider_type {
        ProviderType::Memory => MEMORY_SCHEMA,
        ProviderType::Redis => REDIS_SCHEMA,
        ProviderType::Memcached => MEMCACHED_SCHEMA,
    }
}

/// Validates a provider configuration without constructing anything.
pub fn validate_configuration(config: &Value) -> ValidationResult {
    let Some(object) = config.as_object() else {
        return ValidationResult::from_errors(vec![
            "configuration must be a JSON object".to_string(),
        ]);
    };

    let provider_type = match object.get("type") {
        None | Some(Value::Null) => {
            return ValidationResult::from_errors(vec!["type is required".to_string()]);
        }
        Some(Value::String(raw)) => match raw.parse::<ProviderType>() {
            Ok(provider_type) => provider_type,
            Err(_) => {
                return ValidationResult::from_errors(vec![format!(
                    "type must be one of {}, got \"{}\"",
                    supported_list(),
                    raw
                )]);
            }
        },
        Some(other) => {
            return ValidationResult::from_errors(vec![format!(
                "type must be a string, got {}",
                json_kind(other)
            )]);
        }
    };

    ValidationResult::from_errors(validate_fields(object, schema(provider_type)))
}

fn validate_fields(object: &Map<String, Value>, rules: &[FieldRule]) -> Vec<String> {
    let mut errors = Vec::new();

    for rule in rules {
        match object.get(rule.name) {
            None | Some(Value::Null) => {
                if rule.required {
                    errors.push(format!("{} is required", rule.name));
                }
            }
            Some(value) => {
                if let Some(error) = check_field(rule, value) {
                    errors.push(error);
                }
            }
        }
    }

    for field in object.keys() {
        if field != "type" && !rules.iter().any(|rule| rule.name == field) {
            errors.push(format!("{} is not a recognised field", field));
        }
    }

    errors
}

fn check_field(rule: &FieldRule, value: &Value) -> Option<String> {
    let name = rule.name;
    match rule.kind {
        FieldKind::Text => match value.as_str() {
            Some(text) if text.trim().is_empty() && rule.required => {
                Some(format!("{} must not be empty", name))
            }
            Some(_) => None,
            None => Some(expected(name, "a string", value)),
        },
        FieldKind::Flag => (!value.is_boolean()).then(|| expected(name, "a boolean", value)),
        FieldKind::Integer { min, max } => match value.as_u64() {
            Some(n) if n < min || n > max => Some(format!(
                "{} must be between {} and {}, got {}",
                name, min, max, n
            )),
            Some(_) => None,
            None if value.is_i64() => Some(format!(
                "{} must be between {} and {}, got {}",
                name, min, max, value
            )),
            None => Some(expected(name, "an integer", value)),
        },
        FieldKind::TextList => match value.as_array() {
            Some(items) if items.is_empty() => Some(format!("{} must not be empty", name)),
            Some(items) => items
                .iter()
                .position(|item| !item.as_str().is_some_and(|s| !s.trim().is_empty()))
                .map(|index| format!("{}[{}] must be a non-empty string", name, index)),
            None => Some(expected(name, "an array of strings", value)),
        },
        FieldKind::OneOf(allowed) => match value.as_str() {
            Some(choice) if allowed.contains(&choice) => None,
            Some(choice) => Some(format!(
                "{} must be one of {}, got \"{}\"",
                name,
                allowed.join(", "),
                choice
            )),
            None => Some(expected(name, "a string", value)),
        },
    }
}

fn expected(name: &str, what: &str, value: &Value) -> String {
    format!("{} must be {}, got {}", name, what, json_kind(value))
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

fn supported_list() -> String {
    ProviderType::ALL
        .iter()
        .map(ProviderType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
