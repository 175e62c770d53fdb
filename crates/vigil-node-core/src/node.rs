//! The contract a node capability supplies to the shared runtime.
//!
//! A capability is the pluggable analysis logic behind one node process. It
//! exchanges only [`Value`]s with the dispatcher, so the runtime never needs
//! node-specific types. `validate` is the cheap dry-run half of the contract;
//! `execute` is the only operation allowed externally visible side effects
//! and must tolerate being called repeatedly.

use std::fmt;

use crate::value::{Mapping, Value};

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Identity reported by `node.info`, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Globally namespaced identifier, e.g. `"vigil.logic"`.
    pub node_id: String,
    /// Human label.
    pub name: String,
    pub version: String,
    pub description: String,
}

impl NodeDescriptor {
    pub fn to_value(&self) -> Value {
        Value::Map(
            Mapping::new()
                .with("node_id", self.node_id.as_str())
                .with("name", self.name.as_str())
                .with("version", self.version.as_str())
                .with("description", self.description.as_str()),
        )
    }
}

// ---------------------------------------------------------------------------
// Validation outcome
// ---------------------------------------------------------------------------

/// Outcome of a `node.validate` dry run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Map(
            Mapping::new().with("valid", self.valid).with(
                "errors",
                self.errors
                    .iter()
                    .map(|e| Value::from(e.as_str()))
                    .collect::<Vec<_>>(),
            ),
        )
    }
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// The two analysis entry points a node supplies, plus its identity.
///
/// Faults are plain strings; the dispatcher converts them into
/// `{error: "..."}` results so they never escape the connection task.
pub trait NodeCapability: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &NodeDescriptor;

    /// Check whether `input` would be acceptable to [`execute`](Self::execute),
    /// without doing the expensive or side-effecting work.
    fn validate(&self, input: &Value) -> Result<Validation, String>;

    /// Run the analysis. Must be safe to call repeatedly with the same input.
    fn execute<'a>(
        &'a self,
        input: &'a Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send + 'a>>;
}
