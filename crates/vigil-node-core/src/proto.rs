//! Request/response envelopes and the fixed protocol error codes.
//!
//! Protocol errors (bad envelope, unknown method) travel in the response's
//! `error` field with the codes below. Faults raised by node capabilities are
//! **not** protocol errors: they are ordinary results shaped
//! `{error: "<message>"}`, so a host can always tell "the protocol broke"
//! from "the analysis failed".

use crate::value::{Mapping, Value};

/// Protocol tag carried by every response; the host checks this exact value.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Frame payload was not a well-formed envelope.
pub const PARSE_ERROR: i64 = -32700;
/// Envelope decoded but carries no usable `method`.
pub const INVALID_REQUEST: i64 = -32600;
/// `method` names no recognized operation.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Reserved alongside the codes above (JSON-RPC numbering, kept verbatim).
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Envelope-shape errors, distinct from text-level [`CodecError`](crate::codec::CodecError).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("envelope is not a mapping")]
    NotAMapping,

    #[error("request envelope has no method")]
    MissingMethod,

    #[error("response envelope carries neither result nor error")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One decoded request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    /// Caller-chosen correlation token; may be empty.
    pub id: String,
    pub params: Value,
}

impl Request {
    pub fn new(method: impl Into<String>, id: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            id: id.into(),
            params,
        }
    }

    /// Parse a decoded payload into a request.
    ///
    /// A non-mapping payload is a malformed envelope; a mapping without a
    /// non-empty string `method` is an invalid request. `id` and `params`
    /// default to empty/null when absent.
    pub fn from_value(envelope: &Value) -> Result<Self, ProtoError> {
        let Value::Map(m) = envelope else {
            return Err(ProtoError::NotAMapping);
        };

        let method = m.get("method").map(Value::as_str).unwrap_or_default();
        if method.is_empty() {
            return Err(ProtoError::MissingMethod);
        }

        Ok(Self {
            method: method.to_owned(),
            id: m.get("id").map(Value::as_str).unwrap_or_default().to_owned(),
            params: m.get("params").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Map(
            Mapping::new()
                .with("method", self.method.as_str())
                .with("id", self.id.as_str())
                .with("params", self.params.clone()),
        )
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A protocol-level error object (`error` envelope field).
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// One response envelope. Exactly one of `result`/`error` is set; the
/// constructors below are the only way these are built.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

impl Response {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut m = Mapping::new().with("yamlrpc", PROTOCOL_VERSION);
        match (&self.result, &self.error) {
            (_, Some(e)) => {
                m.set(
                    "error",
                    Mapping::new()
                        .with("code", e.code)
                        .with("message", e.message.as_str()),
                );
            }
            (Some(r), None) => m.set("result", r.clone()),
            (None, None) => m.set("result", Value::Null),
        }
        m.set("id", self.id.as_str());
        Value::Map(m)
    }

    /// Parse a decoded payload into a response (client side).
    pub fn from_value(envelope: &Value) -> Result<Self, ProtoError> {
        let Value::Map(m) = envelope else {
            return Err(ProtoError::NotAMapping);
        };

        let id = m.get("id").map(Value::as_str).unwrap_or_default().to_owned();

        if let Some(e) = m.get("error") {
            let e = e.as_map();
            return Ok(Self::err(
                id,
                e.get("code").map(Value::as_int).unwrap_or_default(),
                e.get("message").map(Value::as_str).unwrap_or_default(),
            ));
        }

        match m.get("result") {
            Some(r) => Ok(Self::ok(id, r.clone())),
            None => Err(ProtoError::EmptyResponse),
        }
    }
}
