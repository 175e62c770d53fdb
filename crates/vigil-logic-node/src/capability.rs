//! The logic node's capability: parse and evaluate rule expressions.

use vigil_node_core::node::{NodeCapability, NodeDescriptor, Validation};
use vigil_node_core::value::{Mapping, Value};

use crate::eval;

#[derive(Debug)]
pub struct LogicCapability {
    descriptor: NodeDescriptor,
}

impl LogicCapability {
    pub fn new() -> Self {
        Self {
            descriptor: NodeDescriptor {
                node_id: "vigil.logic".into(),
                name: "Logic node".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                description: "Evaluates rule expressions against provided variables".into(),
            },
        }
    }

    fn expression(input: &Value) -> Result<&str, String> {
        match input.as_map().get("expression") {
            Some(Value::Str(src)) if !src.trim().is_empty() => Ok(src),
            Some(Value::Str(_)) => Err("'expression' is empty".into()),
            Some(other) => Err(format!(
                "'expression' must be a string, got {}",
                other.type_name()
            )),
            None => Err("input has no 'expression'".into()),
        }
    }
}

impl Default for LogicCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeCapability for LogicCapability {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    /// Tokenize and parse only; evaluation (and variable resolution) is left
    /// to `execute`, so an expression over not-yet-known variables validates.
    fn validate(&self, input: &Value) -> Result<Validation, String> {
        let src = match Self::expression(input) {
            Ok(src) => src,
            Err(e) => return Ok(Validation::fail(vec![e])),
        };
        match eval::parse(src) {
            Ok(_) => Ok(Validation::ok()),
            Err(e) => Ok(Validation::fail(vec![e])),
        }
    }

    fn execute<'a>(
        &'a self,
        input: &'a Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send + 'a>>
    {
        Box::pin(async move {
            let src = Self::expression(input)?;
            let variables = input
                .as_map()
                .get("variables")
                .map(|v| v.as_map().clone())
                .unwrap_or_default();
            eval::evaluate(src, &variables)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(expression: &str) -> Value {
        Value::Map(Mapping::new().with("expression", expression))
    }

    #[tokio::test]
    async fn evaluates_trivial_truth() {
        let cap = LogicCapability::new();
        let result = cap.execute(&input("1 == 1")).await.unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[tokio::test]
    async fn resolves_variables_from_input() {
        let cap = LogicCapability::new();
        let input = Value::Map(
            Mapping::new()
                .with("expression", "count * 2 > limit")
                .with("variables", Mapping::new().with("count", 6i64).with("limit", 10i64)),
        );
        assert_eq!(cap.execute(&input).await.unwrap(), Value::Bool(true));
    }

    #[tokio::test]
    async fn execute_faults_on_unknown_variable() {
        let cap = LogicCapability::new();
        let err = cap.execute(&input("missing == 1")).await.unwrap_err();
        assert!(err.contains("unknown variable"));
    }

    #[test]
    fn validate_accepts_well_formed_expressions() {
        let cap = LogicCapability::new();
        let v = cap.validate(&input("a > 1 && b == 'x'")).unwrap();
        assert!(v.valid);
    }

    #[test]
    fn validate_reports_syntax_errors() {
        let cap = LogicCapability::new();
        let v = cap.validate(&input("1 +")).unwrap();
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 1);
    }

    #[test]
    fn validate_requires_an_expression() {
        let cap = LogicCapability::new();
        let v = cap.validate(&Value::Null).unwrap();
        assert!(!v.valid);

        let v = cap
            .validate(&Value::Map(Mapping::new().with("expression", 5i64)))
            .unwrap();
        assert!(!v.valid);
        assert!(v.errors[0].contains("must be a string"));
    }
}
