//! Configuration validation for catalog schemas.
//!
//! This module checks a configuration before any reconciliation starts:
//! naming, reserved metadata keys, generation-specific shapes and, for the
//! legacy generation, that every embedded snippet parses.

use crate::catalog::ObjectKind;
use crate::error::{ConfigError, CatalogSyncError, Result};
use crate::planner::{OWNER_TAG_KEY, RETENTION_POLICY_KEY};
use crate::query::{Expr, parse_snippet};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::spec::{
    CatalogConfig, CollectionSpec, ConnectionConfig, Generation, IndexField, RetentionPolicy,
    SchemaSection,
};

/// Roles provided by the catalog itself.
const BUILTIN_ROLES: &[&str] = &["admin", "server", "server-readonly"];

/// Validator for catalog configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a catalog configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &CatalogConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_connection(&config.connection, &mut result);

        match config.active_section() {
            Ok((generation, section)) => Self::validate_section(generation, section, &mut result),
            Err(CatalogSyncError::Config(ConfigError::ValidationError { message, .. })) => {
                result.errors.push(ValidationError {
                    field: String::from("catalog"),
                    message,
                });
            }
            Err(e) => return Err(e),
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(CatalogSyncError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates connection settings.
    fn validate_connection(connection: &ConnectionConfig, result: &mut ValidationResult) {
        if !connection.endpoint.starts_with("http://") && !connection.endpoint.starts_with("https://") {
            result.errors.push(ValidationError {
                field: String::from("connection.endpoint"),
                message: format!("Endpoint '{}' must be an http(s) URL", connection.endpoint),
            });
        }
        if connection.page_size == 0 {
            result.errors.push(ValidationError {
                field: String::from("connection.page_size"),
                message: String::from("Page size must be at least 1"),
            });
        }
        if connection.concurrency == 0 {
            result.errors.push(ValidationError {
                field: String::from("connection.concurrency"),
                message: String::from("Concurrency must be at least 1"),
            });
        }
        if connection.secret_env.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("connection.secret_env"),
                message: String::from("Secret variable name cannot be empty"),
            });
        }
    }

    /// Validates the active schema section.
    fn validate_section(
        generation: Generation,
        section: &SchemaSection,
        result: &mut ValidationResult,
    ) {
        let root = generation.section_key();

        if section.object_count() == 0 {
            result.warnings.push(format!(
                "{root}: No objects declared; a deploy will remove every owned object"
            ));
        }

        for (name, collection) in &section.collections {
            let prefix = format!("{root}.collections.{name}");
            check_name(name, &prefix, result);
            check_data(&collection.data, &prefix, result);
            Self::validate_collection(generation, collection, &prefix, result);
        }

        if generation == Generation::Current && !section.indexes.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{root}.indexes"),
                message: String::from(
                    "Stand-alone indexes require catalog_v1; declare them under their collection",
                ),
            });
        }

        for (name, index) in &section.indexes {
            let prefix = format!("{root}.indexes.{name}");
            check_name(name, &prefix, result);
            check_data(&index.data, &prefix, result);
            check_index_fields(&index.terms, &index.values, &prefix, result);
            let field = format!("{prefix}.source");
            match check_snippet(&index.source, &field, result) {
                Some(Expr::Ref { kind: ObjectKind::Collection, name: source }) => {
                    if !section.collections.contains_key(&source) {
                        result.warnings.push(format!(
                            "{field}: Collection '{source}' is not declared in this configuration"
                        ));
                    }
                }
                Some(_) => result.errors.push(ValidationError {
                    field,
                    message: String::from("Index source must be a reference such as Collection(\"name\")"),
                }),
                None => {}
            }
        }

        for (name, function) in &section.functions {
            let prefix = format!("{root}.functions.{name}");
            check_name(name, &prefix, result);
            check_data(&function.data, &prefix, result);
            if function.body.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.body"),
                    message: String::from("Function body cannot be empty"),
                });
            } else if generation == Generation::Legacy {
                check_snippet(&function.body, &format!("{prefix}.body"), result);
            }
            if let Some(role) = &function.role {
                let target = match generation {
                    Generation::Current => Some(role.clone()),
                    Generation::Legacy => {
                        match check_snippet(role, &format!("{prefix}.role"), result) {
                            Some(Expr::Ref { name, .. }) => Some(name),
                            _ => None,
                        }
                    }
                };
                if let Some(target) = target
                    && !section.roles.contains_key(&target)
                    && !BUILTIN_ROLES.contains(&target.as_str())
                {
                    result.warnings.push(format!(
                        "{prefix}.role: Role '{target}' is not declared in this configuration"
                    ));
                }
            }
        }

        for (name, role) in &section.roles {
            let prefix = format!("{root}.roles.{name}");
            check_name(name, &prefix, result);
            check_data(&role.data, &prefix, result);

            for (i, privilege) in role.privileges.iter().enumerate() {
                let field = format!("{prefix}.privileges[{i}]");
                Self::validate_resource(generation, &privilege.resource, &format!("{field}.resource"), result);
                for (action, value) in &privilege.actions {
                    match value {
                        Value::Bool(_) => {}
                        Value::String(predicate) if generation == Generation::Legacy => {
                            check_snippet(predicate, &format!("{field}.actions.{action}"), result);
                        }
                        Value::String(_) => {}
                        _ => result.errors.push(ValidationError {
                            field: format!("{field}.actions.{action}"),
                            message: String::from("Action must be a boolean or a predicate"),
                        }),
                    }
                }
            }

            for (i, member) in role.membership.iter().enumerate() {
                let field = format!("{prefix}.membership[{i}]");
                Self::validate_resource(generation, &member.resource, &format!("{field}.resource"), result);
                if let Some(predicate) = &member.predicate
                    && generation == Generation::Legacy
                {
                    check_snippet(predicate, &format!("{field}.predicate"), result);
                }
            }
        }
    }

    /// Validates generation-specific collection attributes.
    fn validate_collection(
        generation: Generation,
        collection: &CollectionSpec,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        match generation {
            Generation::Current => {
                for (index_name, index) in &collection.indexes {
                    let field = format!("{prefix}.indexes.{index_name}");
                    check_name(index_name, &field, result);
                    check_index_fields(&index.terms, &index.values, &field, result);
                }
                let mut seen = HashSet::new();
                for (i, constraint) in collection.constraints.iter().enumerate() {
                    if !constraint.is_object() {
                        result.errors.push(ValidationError {
                            field: format!("{prefix}.constraints[{i}]"),
                            message: String::from("Constraint must be a mapping"),
                        });
                    } else if !seen.insert(constraint.to_string()) {
                        result.warnings.push(format!(
                            "{prefix}.constraints[{i}]: Duplicate constraint is ignored"
                        ));
                    }
                }
            }
            Generation::Legacy => {
                if !collection.indexes.is_empty() || !collection.constraints.is_empty() {
                    result.errors.push(ValidationError {
                        field: prefix.to_string(),
                        message: String::from(
                            "Nested indexes and constraints require the catalog section; \
                             use catalog_v1.indexes instead",
                        ),
                    });
                }
            }
        }
    }

    /// Validates a privilege or membership resource.
    fn validate_resource(
        generation: Generation,
        resource: &str,
        field: &str,
        result: &mut ValidationResult,
    ) {
        match generation {
            Generation::Current => {
                if !is_valid_name(resource) {
                    result.errors.push(ValidationError {
                        field: field.to_string(),
                        message: format!("Resource '{resource}' is not a valid name"),
                    });
                }
            }
            Generation::Legacy => {
                if let Some(expr) = check_snippet(resource, field, result)
                    && !matches!(expr, Expr::Ref { .. })
                {
                    result.errors.push(ValidationError {
                        field: field.to_string(),
                        message: format!("Resource '{resource}' must be a reference such as Collection(\"name\")"),
                    });
                }
            }
        }
    }
}

/// Checks an object name.
fn check_name(name: &str, prefix: &str, result: &mut ValidationResult) {
    if !is_valid_name(name) {
        result.errors.push(ValidationError {
            field: prefix.to_string(),
            message: format!(
                "Name '{name}' is invalid. Must start with a letter or underscore and contain only letters, digits and underscores."
            ),
        });
    }
}

/// Checks reserved keys in a user `data` map.
fn check_data(data: &BTreeMap<String, Value>, prefix: &str, result: &mut ValidationResult) {
    if data.contains_key(OWNER_TAG_KEY) {
        result.errors.push(ValidationError {
            field: format!("{prefix}.data.{OWNER_TAG_KEY}"),
            message: format!("`{OWNER_TAG_KEY}` is managed by the reconciler and cannot be set"),
        });
    }
    if let Some(policy) = data.get(RETENTION_POLICY_KEY)
        && policy.as_str().and_then(RetentionPolicy::parse).is_none()
    {
        result.errors.push(ValidationError {
            field: format!("{prefix}.data.{RETENTION_POLICY_KEY}"),
            message: format!("Retention policy must be 'retain' or 'destroy', found {policy}"),
        });
    }
}

/// Checks index term and value fields.
fn check_index_fields(
    terms: &[IndexField],
    values: &[IndexField],
    prefix: &str,
    result: &mut ValidationResult,
) {
    for (i, field) in terms.iter().enumerate() {
        if field.field.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.terms[{i}].field"),
                message: String::from("Index field cannot be empty"),
            });
        }
    }
    for (i, field) in values.iter().enumerate() {
        if field.field.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.values[{i}].field"),
                message: String::from("Index field cannot be empty"),
            });
        }
    }
}

/// Parses a snippet, recording an error if it is malformed.
fn check_snippet(snippet: &str, field: &str, result: &mut ValidationResult) -> Option<Expr> {
    match parse_snippet(snippet) {
        Ok(expr) => Some(expr),
        Err(e) => {
            result.errors.push(ValidationError {
                field: field.to_string(),
                message: e.to_string(),
            });
            None
        }
    }
}

/// Validates that a name follows the catalog identifier convention.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
