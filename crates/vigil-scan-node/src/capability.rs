//! The scan node's capability: filesystem inventory.

use std::path::PathBuf;
use std::sync::Mutex;

use vigil_node_core::node::{NodeCapability, NodeDescriptor, Validation};
use vigil_node_core::value::{Mapping, Value};

use crate::scan::{scan, ScanOptions, ScanSummary};

#[derive(Debug)]
pub struct ScanCapability {
    descriptor: NodeDescriptor,
    /// Most recent scan summary. One coarse lock: concurrent `execute` calls
    /// simply overwrite each other, last writer wins.
    last_scan: Mutex<Option<ScanSummary>>,
}

impl ScanCapability {
    pub fn new() -> Self {
        Self {
            descriptor: NodeDescriptor {
                node_id: "vigil.scan".into(),
                name: "Scan node".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                description: "Walks directory trees and inventories their files".into(),
            },
            last_scan: Mutex::new(None),
        }
    }

    pub fn last_scan(&self) -> Option<ScanSummary> {
        self.last_scan
            .lock()
            .expect("scan results mutex poisoned")
            .clone()
    }
}

impl Default for ScanCapability {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_options(input: &Value) -> Result<ScanOptions, String> {
    let m = input.as_map();

    let root = match m.get("root") {
        Some(Value::Str(s)) if !s.is_empty() => PathBuf::from(s),
        Some(Value::Str(_)) => return Err("'root' is empty".into()),
        Some(other) => {
            return Err(format!("'root' must be a string, got {}", other.type_name()));
        }
        None => return Err("input has no 'root'".into()),
    };

    let max_depth = match m.get("max_depth") {
        None | Some(Value::Null) => None,
        Some(Value::Int(n)) if *n > 0 => Some(*n as usize),
        Some(_) => return Err("'max_depth' must be a positive integer".into()),
    };

    let extensions = m
        .get("extensions")
        .map(|v| {
            v.as_seq()
                .iter()
                .map(|e| e.as_str().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(ScanOptions {
        root,
        max_depth,
        include_hidden: m.get("include_hidden").map(Value::as_bool).unwrap_or(false),
        extensions,
    })
}

fn summary_to_value(summary: &ScanSummary) -> Value {
    let files: Vec<Value> = summary
        .files
        .iter()
        .map(|f| {
            Value::Map(
                Mapping::new()
                    .with("path", f.path.as_str())
                    .with("size", f.size as i64)
                    .with("extension", f.extension.as_str()),
            )
        })
        .collect();

    Value::Map(
        Mapping::new()
            .with("root", summary.root.as_str())
            .with("total_files", summary.files.len())
            .with("directories", summary.directories)
            .with("total_bytes", summary.total_bytes as i64)
            .with("files", files),
    )
}

impl NodeCapability for ScanCapability {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    /// Shape and filesystem checks only; the tree is never walked here.
    fn validate(&self, input: &Value) -> Result<Validation, String> {
        let options = match parse_options(input) {
            Ok(options) => options,
            Err(e) => return Ok(Validation::fail(vec![e])),
        };

        let mut errors = Vec::new();
        if !options.root.exists() {
            errors.push(format!("root does not exist: {}", options.root.display()));
        } else if !options.root.is_dir() {
            errors.push(format!("root is not a directory: {}", options.root.display()));
        }

        if errors.is_empty() {
            Ok(Validation::ok())
        } else {
            Ok(Validation::fail(errors))
        }
    }

    fn execute<'a>(
        &'a self,
        input: &'a Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send + 'a>>
    {
        Box::pin(async move {
            let options = parse_options(input)?;

            // The walk is blocking I/O; keep it off the runtime workers.
            let summary = tokio::task::spawn_blocking(move || scan(&options))
                .await
                .map_err(|e| format!("scan task failed: {e}"))??;

            let value = summary_to_value(&summary);
            *self.last_scan.lock().expect("scan results mutex poisoned") = Some(summary);
            Ok(value)
        })
    }
}
