//! Wire types for the `certd` JSON-RPC-lite protocol.
//!
//! Messages are single-line JSON objects separated by `\n`. A client opens a
//! connection, sends `hello`, then any number of requests; every request gets
//! exactly one response carrying the same `id`.

pub mod jsonrpc;
pub mod methods;

pub use jsonrpc::{JsonRpcError, JsonRpcErrorBody, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use methods::*;

/// Protocol version negotiated by `hello`.
pub const PROTOCOL_VERSION: &str = "1.0";
