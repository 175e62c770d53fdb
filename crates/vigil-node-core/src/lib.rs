//! Shared runtime for Vigil analysis nodes.
//!
//! Every node process is the same machine around a different capability: a
//! unix socket bound to a well-known path, length-prefixed YAML envelopes,
//! and five lifecycle operations (`node.info`, `node.validate`,
//! `node.execute`, `node.health`, `node.shutdown`). This crate provides that
//! machinery once; node binaries supply only a [`node::NodeCapability`].

pub mod client;
pub mod codec;
pub mod dispatch;
pub mod node;
pub mod proto;
pub mod server;
pub mod socket;
pub mod value;

/// Maximum wire frame size in bytes (1 MiB).
///
/// Nodes and the host must agree on this limit. Using a shared constant
/// prevents frame-size mismatches that would show up as connection resets
/// instead of clean errors.
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;
