//! Unix domain socket IPC listener.
//!
//! Accepts connections, reads newline-delimited JSON-RPC-lite messages and
//! dispatches them to the [`CertificateManager`].

use std::path::Path;
use std::sync::Arc;

use certd_protocol::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::PROTOCOL_VERSION;
use crate::manager::{CertificateManager, ManagerError};

/// A failed call: JSON-RPC `error.code`, message and optional data.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

type RpcResult = Result<serde_json::Value, RpcError>;

/// Bind a listener at `path`, removing a stale socket file first.
pub fn bind(path: &Path) -> std::io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)?;
    tracing::info!("certd service listening on {}", path.display());
    Ok(listener)
}

/// Accept connections until `shutdown` flips to `true`.
pub async fn serve(
    manager: Arc<CertificateManager>,
    listener: UnixListener,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let mgr = Arc::clone(&manager);
                    mgr.inc_connections();
                    mgr.touch_activity().await;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(&mgr, stream).await {
                            tracing::warn!("Connection error: {e}");
                        }
                        mgr.dec_connections();
                        mgr.touch_activity().await;
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {e}");
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Listener shutting down");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Handle a single client connection.
async fn handle_connection(manager: &CertificateManager, stream: UnixStream) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = dispatch_message(manager, trimmed).await;
        let mut response_bytes = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());
        response_bytes.push(b'\n');
        writer.write_all(&response_bytes).await?;
        writer.flush().await?;
        manager.touch_activity().await;
    }

    Ok(())
}

/// Parse and dispatch a single JSON-RPC message.
pub async fn dispatch_message(manager: &CertificateManager, raw: &str) -> serde_json::Value {
    let request: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(req) => req,
        Err(e) => {
            return serde_json::to_value(JsonRpcError {
                id: RequestId::default(),
                error: JsonRpcErrorBody {
                    code: ERR_INVALID_REQUEST,
                    message: format!("Invalid JSON-RPC: {e}"),
                    data: None,
                },
            })
            .unwrap_or_default();
        }
    };

    let id = request.id.clone();
    match dispatch_method(manager, &request.method, request.params).await {
        Ok(result) => serde_json::to_value(JsonRpcResponse { id, result }).unwrap_or_default(),
        Err(err) => serde_json::to_value(JsonRpcError {
            id,
            error: JsonRpcErrorBody {
                code: err.code,
                message: err.message,
                data: err.data,
            },
        })
        .unwrap_or_default(),
    }
}

/// Dispatch to the appropriate handler based on method name.
async fn dispatch_method(
    manager: &CertificateManager,
    method: &str,
    params: Option<serde_json::Value>,
) -> RpcResult {
    match method {
        "hello" => handle_hello(params),
        "cert.issue" => {
            let params: CertIssueParams = parse_params(method, params)?;
            to_result(manager.issue(&params.into()).await)
        }
        "cert.verify" => {
            let params: CertVerifyParams = parse_params(method, params)?;
            to_result(manager.verify(&params.id).await)
        }
        "admin.login" => {
            let params: AdminLoginParams = parse_params(method, params)?;
            to_result(manager.login(&params.username, &params.password).await)
        }
        "admin.logout" => {
            let params: SessionParams = parse_params(method, params)?;
            to_result(manager.logout(&params.session_id).await)
        }
        "admin.list" => {
            let params: SessionParams = parse_params(method, params)?;
            to_result(manager.list(&params.session_id).await)
        }
        "admin.show" => {
            let params: AdminCertParams = parse_params(method, params)?;
            to_result(manager.show(&params.session_id, &params.id).await)
        }
        "admin.revoke" => {
            let params: AdminCertParams = parse_params(method, params)?;
            to_result(manager.revoke(&params.session_id, &params.id).await)
        }
        "service.status" => serialize(manager.status().await),
        _ => Err(RpcError::new(
            ERR_METHOD_NOT_FOUND,
            format!("Unknown method: {method}"),
        )),
    }
}

/// Handle the `hello` handshake.
fn handle_hello(params: Option<serde_json::Value>) -> RpcResult {
    let hello: HelloParams = parse_params("hello", params)?;

    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(RpcError::new(
            ERR_INVALID_PARAMS,
            format!(
                "Incompatible protocol version: client={}, service={}",
                hello.protocol_version, PROTOCOL_VERSION
            ),
        ));
    }

    serialize(HelloResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        service_version: env!("CARGO_PKG_VERSION").to_string(),
        capabilities: [
            "cert.issue",
            "cert.verify",
            "admin.login",
            "admin.logout",
            "admin.list",
            "admin.show",
            "admin.revoke",
            "service.status",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
    })
}

fn parse_params<T: DeserializeOwned>(
    method: &str,
    params: Option<serde_json::Value>,
) -> Result<T, RpcError> {
    let value = params.ok_or_else(|| RpcError::new(ERR_INVALID_PARAMS, "Missing params"))?;
    serde_json::from_value(value)
        .map_err(|e| RpcError::new(ERR_INVALID_PARAMS, format!("Invalid {method} params: {e}")))
}

fn serialize<T: Serialize>(value: T) -> RpcResult {
    serde_json::to_value(value)
        .map_err(|e| RpcError::new(ERR_INFRA, format!("Serialize error: {e}")))
}

fn to_result<T: Serialize>(result: Result<T, ManagerError>) -> RpcResult {
    result.map_err(|e| manager_error_to_rpc(&e)).and_then(serialize)
}

/// Map ManagerError to a JSON-RPC error.
fn manager_error_to_rpc(err: &ManagerError) -> RpcError {
    use certd_core::AuthError;

    match err {
        ManagerError::Validation(fields) => RpcError {
            code: ERR_VALIDATION,
            message: err.to_string(),
            data: serde_json::to_value(fields).ok(),
        },
        ManagerError::InvalidRequest { .. } | ManagerError::Auth(AuthError::MissingCredentials) => {
            RpcError::new(ERR_INVALID_PARAMS, err.to_string())
        }
        ManagerError::Auth(AuthError::InvalidCredentials) => {
            RpcError::new(ERR_AUTH_FAILED, err.to_string())
        }
        ManagerError::Auth(AuthError::NotAuthenticated) | ManagerError::UnknownSession { .. } => {
            RpcError::new(ERR_UNAUTHENTICATED, err.to_string())
        }
        ManagerError::NotFound { .. } => RpcError::new(ERR_NOT_FOUND, err.to_string()),
        ManagerError::Infra(_) => RpcError::new(ERR_INFRA, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certd_core::{Issuer, Registry, StaticCredentials, Verifier};
    use pretty_assertions::assert_eq;

    fn manager() -> CertificateManager {
        CertificateManager::new(
            Registry::seeded(),
            Issuer::default(),
            Verifier::immediate(),
            Arc::new(StaticCredentials::default()),
        )
    }

    async fn call(manager: &CertificateManager, msg: serde_json::Value) -> serde_json::Value {
        dispatch_message(manager, &msg.to_string()).await
    }

    #[tokio::test]
    async fn dispatch_hello() {
        let manager = manager();
        let result = call(
            &manager,
            serde_json::json!({
                "id": 0,
                "method": "hello",
                "params": {"protocol_version": "1.0", "client_version": "0.1.0"}
            }),
        )
        .await;
        assert_eq!(result["result"]["protocol_version"], "1.0");
        assert!(
            result["result"]["capabilities"]
                .as_array()
                .is_some_and(|caps| caps.iter().any(|c| c == "cert.verify"))
        );
    }

    #[tokio::test]
    async fn dispatch_hello_version_mismatch() {
        let manager = manager();
        let result = call(
            &manager,
            serde_json::json!({
                "id": 0,
                "method": "hello",
                "params": {"protocol_version": "2.0", "client_version": "0.1.0"}
            }),
        )
        .await;
        assert_eq!(result["error"]["code"], ERR_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn dispatch_unknown_method() {
        let manager = manager();
        let result = call(&manager, serde_json::json!({"id": 1, "method": "cert.delete"})).await;
        assert_eq!(result["id"], 1);
        assert_eq!(result["error"]["code"], ERR_METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn dispatch_garbage_is_invalid_request() {
        let manager = manager();
        let result = dispatch_message(&manager, "{not json").await;
        assert_eq!(result["error"]["code"], ERR_INVALID_REQUEST);
    }

    #[tokio::test]
    async fn dispatch_issue_validation_carries_field_messages() {
        let manager = manager();
        let result = call(
            &manager,
            serde_json::json!({
                "id": 2,
                "method": "cert.issue",
                "params": {
                    "participant_name": "",
                    "email": "not-an-email",
                    "event_name": "Conf",
                    "event_date": "2025-06-01"
                }
            }),
        )
        .await;
        assert_eq!(result["error"]["code"], ERR_VALIDATION);
        assert_eq!(
            result["error"]["data"],
            serde_json::json!({
                "participant_name": "Participant name is required",
                "email": "Please enter a valid email address"
            })
        );
    }

    #[tokio::test]
    async fn dispatch_verify_miss_is_a_result() {
        let manager = manager();
        let result = call(
            &manager,
            serde_json::json!({"id": 3, "method": "cert.verify", "params": {"id": "nope"}}),
        )
        .await;
        assert_eq!(result["result"]["state"], "not_found");
        assert_eq!(result["result"]["searched_id"], "nope");
        assert_eq!(result["result"]["valid"], false);
    }

    #[tokio::test]
    async fn dispatch_verify_without_params() {
        let manager = manager();
        let result = call(&manager, serde_json::json!({"id": 4, "method": "cert.verify"})).await;
        assert_eq!(result["error"]["code"], ERR_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn dispatch_bad_login() {
        let manager = manager();
        let result = call(
            &manager,
            serde_json::json!({
                "id": 5,
                "method": "admin.login",
                "params": {"username": "admin", "password": "wrong"}
            }),
        )
        .await;
        assert_eq!(result["error"]["code"], ERR_AUTH_FAILED);
        assert_eq!(result["error"]["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn dispatch_blank_login() {
        let manager = manager();
        let result = call(
            &manager,
            serde_json::json!({
                "id": 6,
                "method": "admin.login",
                "params": {"username": "admin", "password": "  "}
            }),
        )
        .await;
        assert_eq!(result["error"]["code"], ERR_INVALID_PARAMS);
        assert_eq!(
            result["error"]["message"],
            "Please enter both username and password"
        );
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn dispatch_list_with_unknown_session() {
        let manager = manager();
        let result = call(
            &manager,
            serde_json::json!({
                "id": 6,
                "method": "admin.list",
                "params": {"session_id": "forged"}
            }),
        )
        .await;
        assert_eq!(result["error"]["code"], ERR_UNAUTHENTICATED);
    }

    #[tokio::test]
    async fn dispatch_service_status() {
        let manager = manager();
        let result = call(&manager, serde_json::json!({"id": 7, "method": "service.status"})).await;
        assert_eq!(result["result"]["certificates"], 3);
        assert_eq!(result["result"]["sessions"], 0);
    }

    #[test]
    fn registry_exhaustion_maps_to_infra() {
        let err = ManagerError::from(certd_core::RegistryError::IdSpaceExhausted { attempts: 1 });
        assert_eq!(manager_error_to_rpc(&err).code, ERR_INFRA);
    }

    #[test]
    fn bind_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let path = dir.path().join("nested").join("certd.sock");
        std::fs::create_dir_all(dir.path().join("nested")).unwrap_or_else(|e| panic!("{e}"));
        std::fs::write(&path, b"stale").unwrap_or_else(|e| panic!("{e}"));

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|e| panic!("runtime: {e}"));
        let bound = rt.block_on(async { bind(&path).map(|_| ()) });
        tokio_test::assert_ok!(bound);
    }
}
