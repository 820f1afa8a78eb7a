//! Operation registry and parameter validation.
//!
//! The registry holds the parameter contract for every operation the
//! dispatcher can run. Validation is a pure function over the registry and
//! the caller-supplied parameter map: aliasing first, then required-key
//! checks, then lenient dropping of unknown keys.

use super::model::OperationDefinition;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Synonym corrections applied before validation. A key on the left is
/// renamed to the key on the right when the definition expects the canonical
/// name and the caller did not already supply it.
const PARAMETER_ALIASES: &[(&str, &str)] = &[
    ("body", "message"),
    ("text", "message"),
    ("content", "message"),
    ("recipient", "to"),
    ("email", "to"),
    ("filename", "path"),
    ("file", "path"),
    ("file_path", "path"),
    ("folder", "path"),
    ("cmd", "command"),
    ("shell_command", "command"),
    ("query_string", "query"),
    ("search_term", "query"),
    ("title", "subject"),
];

/// Validation failures for a single operation request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("missing required parameters: {}", .0.join(", "))]
    MissingRequiredParameters(Vec<String>),

    #[error("operation `{name}` declares {} as both required and optional", .keys.join(", "))]
    OverlappingContract { name: String, keys: Vec<String> },
}

/// A validated, alias-corrected parameter set ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedParams {
    pub params: Map<String, Value>,
    /// Keys that were neither required nor optional and were dropped.
    pub dropped: Vec<String>,
}

/// Immutable catalog of operation definitions, keyed by name.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    definitions: BTreeMap<String, OperationDefinition>,
}

impl OperationRegistry {
    /// Builds a registry, rejecting definitions whose required and optional
    /// sets overlap.
    pub fn new(definitions: Vec<OperationDefinition>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for def in definitions {
            let overlap: Vec<String> = def
                .required_parameters
                .iter()
                .filter(|key| def.optional_parameters.contains(key))
                .cloned()
                .collect();
            if !overlap.is_empty() {
                return Err(ValidationError::OverlappingContract {
                    name: def.name.clone(),
                    keys: overlap,
                });
            }
            map.insert(def.name.clone(), def);
        }
        Ok(Self { definitions: map })
    }

    pub fn get(&self, name: &str) -> Option<&OperationDefinition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Renders the catalog as one line per operation for classifier prompts:
    /// `name: description | required: a, b | optional: c`.
    pub fn render_catalog(&self) -> String {
        self.definitions
            .values()
            .map(|def| {
                format!(
                    "{}: {} | required: {} | optional: {}",
                    def.name,
                    if def.description.is_empty() {
                        "(no description)"
                    } else {
                        &def.description
                    },
                    if def.required_parameters.is_empty() {
                        "(none)".to_string()
                    } else {
                        def.required_parameters.join(", ")
                    },
                    if def.optional_parameters.is_empty() {
                        "(none)".to_string()
                    } else {
                        def.optional_parameters.join(", ")
                    },
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validates and normalizes a caller-supplied parameter map.
    ///
    /// Aliasing runs before validation so the required-key check sees the
    /// corrected set. Unknown keys are dropped rather than rejected; the
    /// dropped names are reported on the result for the caller to log.
    pub fn validate(
        &self,
        name: &str,
        provided: &Map<String, Value>,
    ) -> Result<NormalizedParams, ValidationError> {
        let def = self
            .definitions
            .get(name)
            .ok_or_else(|| ValidationError::UnknownOperation(name.to_string()))?;

        let (aliased, mut dropped) = apply_aliases(def, provided);

        let missing: Vec<String> = def
            .required_parameters
            .iter()
            .filter(|key| !aliased.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingRequiredParameters(missing));
        }

        let mut params = Map::new();
        for (key, value) in aliased {
            if def.required_parameters.contains(&key) || def.optional_parameters.contains(&key) {
                params.insert(key, value);
            } else {
                dropped.push(key);
            }
        }

        Ok(NormalizedParams { params, dropped })
    }
}

fn expects(def: &OperationDefinition, key: &str) -> bool {
    def.required_parameters.iter().any(|k| k == key)
        || def.optional_parameters.iter().any(|k| k == key)
}

/// Applies the synonym table, returning the corrected map plus the keys that
/// lost an alias collision (two aliases resolving to the same canonical name:
/// the first one seen wins, the rest are dropped).
fn apply_aliases(
    def: &OperationDefinition,
    provided: &Map<String, Value>,
) -> (Map<String, Value>, Vec<String>) {
    let mut out = Map::new();
    let mut dropped = Vec::new();
    for (key, value) in provided {
        let canonical = PARAMETER_ALIASES
            .iter()
            .find(|(alias, target)| {
                alias == key && !expects(def, key) && expects(def, target) && !provided.contains_key(*target)
            })
            .map(|(_, target)| target.to_string());
        match canonical {
            Some(target) => {
                if out.contains_key(&target) {
                    dropped.push(key.clone());
                } else {
                    out.insert(target, value.clone());
                }
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    (out, dropped)
}
