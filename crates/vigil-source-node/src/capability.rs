//! The source node's capability: heuristic C++ analysis.

use std::path::PathBuf;

use vigil_node_core::node::{NodeCapability, NodeDescriptor, Validation};
use vigil_node_core::value::{Mapping, Value};

use crate::analyze::{analyze, SourceMetrics};

const DEFAULT_MAX_FUNCTION_LINES: usize = 80;

#[derive(Debug)]
pub struct SourceCapability {
    descriptor: NodeDescriptor,
}

/// Where the text to analyze comes from: inline or a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceInput {
    Inline(String),
    File(PathBuf),
}

impl SourceCapability {
    pub fn new() -> Self {
        Self {
            descriptor: NodeDescriptor {
                node_id: "vigil.source".into(),
                name: "Source node".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                description: "Heuristic static analysis of C++ sources".into(),
            },
        }
    }
}

impl Default for SourceCapability {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_input(input: &Value) -> Result<(SourceInput, usize), String> {
    let m = input.as_map();

    let source = match (m.get("source"), m.get("path")) {
        (Some(_), Some(_)) => {
            return Err("provide either 'source' or 'path', not both".into());
        }
        (Some(Value::Str(text)), None) => SourceInput::Inline(text.clone()),
        (Some(other), None) => {
            return Err(format!(
                "'source' must be a string, got {}",
                other.type_name()
            ));
        }
        (None, Some(Value::Str(path))) if !path.is_empty() => {
            SourceInput::File(PathBuf::from(path))
        }
        (None, Some(_)) => return Err("'path' must be a non-empty string".into()),
        (None, None) => return Err("input has neither 'source' nor 'path'".into()),
    };

    let max_function_lines = match m.get("max_function_lines") {
        None | Some(Value::Null) => DEFAULT_MAX_FUNCTION_LINES,
        Some(Value::Int(n)) if *n > 0 => *n as usize,
        Some(_) => return Err("'max_function_lines' must be a positive integer".into()),
    };

    Ok((source, max_function_lines))
}

fn metrics_to_value(metrics: &SourceMetrics) -> Value {
    let includes: Vec<Value> = metrics
        .includes
        .iter()
        .map(|i| Value::from(i.as_str()))
        .collect();

    let functions: Vec<Value> = metrics
        .functions
        .iter()
        .map(|f| {
            Value::Map(
                Mapping::new()
                    .with("name", f.name.as_str())
                    .with("line", f.line)
                    .with("length", f.length),
            )
        })
        .collect();

    let diagnostics: Vec<Value> = metrics
        .diagnostics
        .iter()
        .map(|d| Value::from(d.as_str()))
        .collect();

    Value::Map(
        Mapping::new()
            .with("lines", metrics.lines)
            .with("includes", includes)
            .with("function_count", metrics.functions.len())
            .with("functions", functions)
            .with("classes", metrics.classes)
            .with("using_namespace", metrics.using_namespace)
            .with("diagnostics", diagnostics),
    )
}

impl NodeCapability for SourceCapability {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    /// Shape checks only; the source text is never analyzed here.
    fn validate(&self, input: &Value) -> Result<Validation, String> {
        let (source, _) = match parse_input(input) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(Validation::fail(vec![e])),
        };

        if let SourceInput::File(path) = &source {
            if !path.exists() {
                return Ok(Validation::fail(vec![format!(
                    "path does not exist: {}",
                    path.display()
                )]));
            }
            if !path.is_file() {
                return Ok(Validation::fail(vec![format!(
                    "path is not a file: {}",
                    path.display()
                )]));
            }
        }

        Ok(Validation::ok())
    }

    fn execute<'a>(
        &'a self,
        input: &'a Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send + 'a>>
    {
        Box::pin(async move {
            let (source, max_function_lines) = parse_input(input)?;

            let text = match source {
                SourceInput::Inline(text) => text,
                SourceInput::File(path) => tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
            };

            let metrics = analyze(&text, max_function_lines);
            Ok(metrics_to_value(&metrics))
        })
    }
}
