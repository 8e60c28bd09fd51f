//! `certd-service`: certificate issuance and verification over a Unix socket.
//!
//! Listens at `$XDG_RUNTIME_DIR/certd.sock` unless configured otherwise and
//! speaks the JSON-RPC-lite protocol from `certd-protocol`.

use std::path::PathBuf;

use certd_core::config::AppConfig;

pub mod ipc;
pub mod manager;

pub use certd_protocol::PROTOCOL_VERSION;

/// Default socket filename.
pub const SOCKET_FILENAME: &str = "certd.sock";

/// Get the default socket path using XDG_RUNTIME_DIR.
///
/// Falls back to `/tmp/certd-<username>.sock` if XDG_RUNTIME_DIR is not set.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join(SOCKET_FILENAME)
    } else {
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        PathBuf::from(format!("/tmp/certd-{user}.sock"))
    }
}

/// The configured socket path, or the default one.
pub fn socket_path(config: &AppConfig) -> PathBuf {
    config
        .service
        .socket_path
        .clone()
        .unwrap_or_else(default_socket_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_socket_path_wins() {
        let mut config = AppConfig::default();
        config.service.socket_path = Some(PathBuf::from("/tmp/elsewhere.sock"));
        assert_eq!(socket_path(&config), PathBuf::from("/tmp/elsewhere.sock"));
    }

    #[test]
    fn default_socket_path_names_certd() {
        let path = default_socket_path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        assert!(name.starts_with("certd"), "unexpected socket name {name}");
        assert!(name.ends_with(".sock"));
    }
}
