//! Method dispatch for the five node lifecycle operations.
//!
//! Each request moves through `Received -> Decoded -> Dispatched` and ends
//! `Succeeded` or `Failed`; no state is carried between requests. Protocol
//! faults produce an `error` envelope with a fixed code. Capability faults
//! are caught here and become `{error: "..."}` **results** — a domain
//! failure is a successful RPC from the protocol's point of view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::codec;
use crate::node::NodeCapability;
use crate::proto::{self, ProtoError, Request, Response};
use crate::value::{Mapping, Value};

/// Delay between answering `node.shutdown` and signalling the stop, so the
/// response frame is written before the listener is torn down.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Server control handle
// ---------------------------------------------------------------------------

/// Shutdown seam between the dispatcher and the accept loop.
///
/// The shutdown RPC never stops the server inline; it schedules the signal on
/// a detached delayed task and returns, which is what guarantees its response
/// reaches the client first.
#[derive(Debug, Clone)]
pub struct ServerControl {
    shutdown_tx: watch::Sender<bool>,
}

impl ServerControl {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// Receiver for the accept loop to select on.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Clear a previous stop signal before a restart.
    pub fn reset(&self) {
        let _ = self.shutdown_tx.send(false);
    }

    pub fn signal_stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal a stop after a short grace period, from a detached task.
    pub fn signal_stop_deferred(&self) {
        let tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            let _ = tx.send(true);
        });
    }
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Dispatcher {
    capability: Arc<dyn NodeCapability>,
    control: ServerControl,
    started_at: Instant,
    requests: AtomicU64,
}

impl Dispatcher {
    pub fn new(capability: Arc<dyn NodeCapability>, control: ServerControl) -> Self {
        Self {
            capability,
            control,
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
        }
    }

    /// Decode one frame payload and dispatch it.
    ///
    /// Counts every payload that reaches us, including ones answered with a
    /// protocol error.
    pub async fn dispatch_payload(&self, payload: &[u8]) -> Response {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let envelope = match codec::decode(payload) {
            Ok(v) => v,
            Err(e) => {
                debug!("unparseable request payload: {e}");
                return Response::err("", proto::PARSE_ERROR, "Parse error");
            }
        };

        let request = match Request::from_value(&envelope) {
            Ok(r) => r,
            Err(ProtoError::MissingMethod) => {
                // The id is still echoable even when the method is not.
                let id = envelope
                    .as_map()
                    .get("id")
                    .map(Value::as_str)
                    .unwrap_or_default();
                return Response::err(id, proto::INVALID_REQUEST, "Invalid Request");
            }
            Err(e) => {
                debug!("malformed request envelope: {e}");
                return Response::err("", proto::PARSE_ERROR, "Parse error");
            }
        };

        self.dispatch(request).await
    }

    /// Route a decoded request to exactly one of the five operations.
    pub async fn dispatch(&self, request: Request) -> Response {
        debug!(method = %request.method, id = %request.id, "dispatching request");

        match request.method.as_str() {
            "node.info" => Response::ok(request.id, self.capability.descriptor().to_value()),

            "node.validate" => {
                let input = extract_input(&request.params);
                match self.capability.validate(&input) {
                    Ok(validation) => Response::ok(request.id, validation.to_value()),
                    Err(message) => Response::ok(request.id, domain_error(message)),
                }
            }

            "node.execute" => {
                let input = extract_input(&request.params);
                match self.capability.execute(&input).await {
                    Ok(result) => Response::ok(request.id, result),
                    Err(message) => Response::ok(request.id, domain_error(message)),
                }
            }

            "node.health" => Response::ok(
                request.id,
                Value::Map(
                    Mapping::new()
                        .with("status", "ok")
                        .with("uptime", self.started_at.elapsed().as_secs() as i64)
                        .with(
                            "requests_processed",
                            self.requests.load(Ordering::Relaxed) as i64,
                        ),
                ),
            ),

            "node.shutdown" => {
                info!("shutdown requested over RPC");
                self.control.signal_stop_deferred();
                Response::ok(
                    request.id,
                    Value::Map(Mapping::new().with("status", "shutting_down")),
                )
            }

            other => {
                debug!("unrecognized method: {other}");
                Response::err(request.id, proto::METHOD_NOT_FOUND, "Method not found")
            }
        }
    }
}

/// Pull `params.input` out of the request, defaulting to Null.
fn extract_input(params: &Value) -> Value {
    params.as_map().get("input").cloned().unwrap_or(Value::Null)
}

/// A capability fault surfaced as a result value, not a protocol error.
fn domain_error(message: String) -> Value {
    Value::Map(Mapping::new().with("error", message))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeDescriptor, Validation};

    /// Echoes its input back; faults when the input asks it to.
    #[derive(Debug)]
    struct EchoCapability {
        descriptor: NodeDescriptor,
    }

    impl EchoCapability {
        fn new() -> Self {
            Self {
                descriptor: NodeDescriptor {
                    node_id: "vigil.echo".into(),
                    name: "Echo node".into(),
                    version: "0.0.1".into(),
                    description: "Test capability".into(),
                },
            }
        }
    }

    impl NodeCapability for EchoCapability {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.descriptor
        }

        fn validate(&self, input: &Value) -> Result<Validation, String> {
            if input.as_map().contains_key("invalid") {
                Ok(Validation::fail(vec!["input rejected".into()]))
            } else if input.as_map().contains_key("panic_validate") {
                Err("validator blew up".into())
            } else {
                Ok(Validation::ok())
            }
        }

        fn execute<'a>(
            &'a self,
            input: &'a Value,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Value, String>> + Send + 'a>,
        > {
            Box::pin(async move {
                if input.as_map().contains_key("boom") {
                    Err("capability exploded".into())
                } else {
                    Ok(input.clone())
                }
            })
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(EchoCapability::new()), ServerControl::new())
    }

    fn request(method: &str, id: &str, params: Value) -> Request {
        Request::new(method, id, params)
    }

    fn input_params(input: Mapping) -> Value {
        Value::Map(Mapping::new().with("input", input))
    }

    #[tokio::test]
    async fn info_is_idempotent() {
        let d = dispatcher();
        let a = d.dispatch(request("node.info", "1", Value::Null)).await;
        let b = d.dispatch(request("node.info", "2", Value::Null)).await;
        assert_eq!(a.result, b.result);
        assert_eq!(
            a.result.unwrap().as_map().get("node_id").unwrap().as_str(),
            "vigil.echo"
        );
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let d = dispatcher();
        let resp = d
            .dispatch(request("does.not.exist", "5", Value::Null))
            .await;
        assert_eq!(resp.id, "5");
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, proto::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn unparseable_payload_is_parse_error() {
        let d = dispatcher();
        let resp = d.dispatch_payload(b"{ this is not an envelope").await;
        assert_eq!(resp.error.unwrap().code, proto::PARSE_ERROR);
    }

    #[tokio::test]
    async fn non_mapping_payload_is_parse_error() {
        let d = dispatcher();
        let resp = d.dispatch_payload(b"just a scalar\n").await;
        assert_eq!(resp.error.unwrap().code, proto::PARSE_ERROR);
    }

    #[tokio::test]
    async fn missing_method_is_invalid_request_and_echoes_id() {
        let d = dispatcher();
        let payload =
            codec::encode(&Value::Map(Mapping::new().with("id", "44"))).unwrap();
        let resp = d.dispatch_payload(&payload).await;
        assert_eq!(resp.id, "44");
        assert_eq!(resp.error.unwrap().code, proto::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn execute_round_trips_input() {
        let d = dispatcher();
        let resp = d
            .dispatch(request(
                "node.execute",
                "2",
                input_params(Mapping::new().with("expression", "1 == 1")),
            ))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(
            result.as_map().get("expression").unwrap().as_str(),
            "1 == 1"
        );
    }

    #[tokio::test]
    async fn capability_fault_becomes_error_result() {
        let d = dispatcher();
        let resp = d
            .dispatch(request(
                "node.execute",
                "3",
                input_params(Mapping::new().with("boom", true)),
            ))
            .await;
        // Still a successful RPC: the fault rides in the result.
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(
            result.as_map().get("error").unwrap().as_str(),
            "capability exploded"
        );
    }

    #[tokio::test]
    async fn validate_fault_becomes_error_result() {
        let d = dispatcher();
        let resp = d
            .dispatch(request(
                "node.validate",
                "4",
                input_params(Mapping::new().with("panic_validate", true)),
            ))
            .await;
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(
            result.as_map().get("error").unwrap().as_str(),
            "validator blew up"
        );
    }

    #[tokio::test]
    async fn validate_reports_rejections() {
        let d = dispatcher();
        let resp = d
            .dispatch(request(
                "node.validate",
                "6",
                input_params(Mapping::new().with("invalid", true)),
            ))
            .await;
        let result = resp.result.unwrap();
        assert!(!result.as_map().get("valid").unwrap().as_bool());
        assert_eq!(result.as_map().get("errors").unwrap().as_seq().len(), 1);
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let d = dispatcher();
        let _ = d.dispatch(request("node.info", "1", Value::Null)).await;
        let payload = codec::encode(&request("node.health", "2", Value::Null).to_value()).unwrap();
        let resp = d.dispatch_payload(&payload).await;

        let result = resp.result.unwrap();
        let m = result.as_map();
        assert_eq!(m.get("status").unwrap().as_str(), "ok");
        assert!(m.get("uptime").unwrap().as_int() >= 0);
        // The health request itself went through dispatch_payload.
        assert_eq!(m.get("requests_processed").unwrap().as_int(), 1);
    }

    #[tokio::test]
    async fn shutdown_replies_then_signals() {
        let control = ServerControl::new();
        let mut rx = control.subscribe();
        let d = Dispatcher::new(Arc::new(EchoCapability::new()), control);

        let resp = d.dispatch(request("node.shutdown", "9", Value::Null)).await;
        let result = resp.result.unwrap();
        assert_eq!(
            result.as_map().get("status").unwrap().as_str(),
            "shutting_down"
        );

        // The signal arrives only after the grace delay.
        assert!(!*rx.borrow());
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("stop signal within grace window")
            .unwrap();
        assert!(*rx.borrow());
    }
}
