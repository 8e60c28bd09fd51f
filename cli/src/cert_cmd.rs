//! `certd` subcommands.
//!
//! Thin IPC client that connects to `certd-service` via Unix socket and
//! dispatches JSON-RPC-lite requests.
//!
//! ## Commands
//!
//! - `certd issue --name <NAME> --email <EMAIL> --event <EVENT> --date <YYYY-MM-DD>`
//! - `certd verify <ID>`
//! - `certd admin login --username <USER> --password <PASS>`
//! - `certd admin list|logout --session <SESSION>`
//! - `certd admin show|revoke --session <SESSION> <ID>`
//! - `certd service status`
//! - `certd service ping`

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use certd_core::config::ConfigLoader;
use certd_core::{Certificate, FieldErrors};
use certd_protocol::{
    AdminListResult, AdminLoginResult, CertVerifyResult, ERR_VALIDATION, HelloResult,
    LookupState, PROTOCOL_VERSION, ServiceStatusResult,
};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;

/// Exit code for a failed command (RPC error, invalid certificate).
pub const EXIT_FAILED: u8 = 1;
/// Exit code when the service cannot be reached or answers garbage.
pub const EXIT_INFRA: u8 = 3;

/// Certificate issuance and verification client.
#[derive(Debug, Parser)]
#[command(name = "certd", version)]
pub struct CertCli {
    #[command(subcommand)]
    pub command: CertSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum CertSubcommand {
    /// Issue a new certificate.
    Issue(IssueArgs),
    /// Look up a certificate by id.
    Verify(VerifyArgs),
    /// Admin operations (login, list, revoke).
    Admin(AdminCli),
    /// Service management (status, ping).
    Service(ServiceCli),
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,

    /// Override socket path.
    #[arg(long = "socket", env = "CERTD_SOCKET")]
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct IssueArgs {
    /// Participant's full name.
    #[arg(long = "name", short = 'n')]
    pub participant_name: String,

    /// Participant's email address.
    #[arg(long = "email", short = 'e')]
    pub email: String,

    /// Event name.
    #[arg(long = "event")]
    pub event_name: String,

    /// Event date (YYYY-MM-DD).
    #[arg(long = "date", short = 'd')]
    pub event_date: String,

    #[command(flatten)]
    pub conn: ConnectionArgs,
}

#[derive(Debug, Parser)]
pub struct VerifyArgs {
    /// Certificate id, e.g. CERT-2024-001-XK9P (case-insensitive).
    pub id: String,

    #[command(flatten)]
    pub conn: ConnectionArgs,
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin subcommands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
pub struct AdminCli {
    #[command(subcommand)]
    pub command: AdminSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum AdminSubcommand {
    /// Log in and print a session id.
    Login(AdminLoginArgs),
    /// End a session.
    Logout(SessionArgs),
    /// List every certificate.
    List(SessionArgs),
    /// Show one certificate.
    Show(AdminCertArgs),
    /// Revoke a certificate.
    Revoke(AdminCertArgs),
}

#[derive(Debug, Parser)]
pub struct AdminLoginArgs {
    #[arg(long = "username", short = 'u')]
    pub username: String,

    #[arg(long = "password", short = 'p', env = "CERTD_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[command(flatten)]
    pub conn: ConnectionArgs,
}

#[derive(Debug, Parser)]
pub struct SessionArgs {
    /// Session id returned by `certd admin login`.
    #[arg(long = "session", short = 's', env = "CERTD_SESSION")]
    pub session_id: String,

    #[command(flatten)]
    pub conn: ConnectionArgs,
}

#[derive(Debug, Parser)]
pub struct AdminCertArgs {
    /// Certificate id.
    pub id: String,

    #[arg(long = "session", short = 's', env = "CERTD_SESSION")]
    pub session_id: String,

    #[command(flatten)]
    pub conn: ConnectionArgs,
}

// ─────────────────────────────────────────────────────────────────────────────
// Service subcommands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
pub struct ServiceCli {
    #[command(subcommand)]
    pub command: ServiceSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ServiceSubcommand {
    /// Show service status (uptime, certificate and session counts).
    Status(ConnectionArgs),
    /// Handshake only.
    Ping(ConnectionArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(
        "Cannot connect to certd service at {}: {source}\nHint: start the service with: certd-service",
        .path.display()
    )]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        source: std::io::Error,
    },

    #[error("Malformed response: {0}")]
    Protocol(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("{message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The call succeeded but the answer is a negative one.
    #[error("{0}")]
    Rejected(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Connect { .. }
            | CliError::Io { .. }
            | CliError::Protocol(_)
            | CliError::Handshake(_) => EXIT_INFRA,
            CliError::Rpc { .. } | CliError::Rejected(_) => EXIT_FAILED,
        }
    }

    /// Per-field messages carried by a validation failure.
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            CliError::Rpc {
                code,
                data: Some(data),
                ..
            } if *code == ERR_VALIDATION => serde_json::from_value(data.clone()).ok(),
            _ => None,
        }
    }
}

fn io_err(context: &'static str) -> impl FnOnce(std::io::Error) -> CliError {
    move |source| CliError::Io { context, source }
}

// ─────────────────────────────────────────────────────────────────────────────
// IPC Client
// ─────────────────────────────────────────────────────────────────────────────

fn read_response(reader: &mut BufReader<UnixStream>) -> Result<serde_json::Value, CliError> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .map_err(io_err("Read response"))?;
    if n == 0 {
        return Err(CliError::Protocol("connection closed".to_string()));
    }
    serde_json::from_str(&line).map_err(|e| CliError::Protocol(e.to_string()))
}

fn write_request(writer: &mut UnixStream, request: &serde_json::Value) -> Result<(), CliError> {
    let mut bytes = serde_json::to_vec(request).map_err(|e| CliError::Protocol(e.to_string()))?;
    bytes.push(b'\n');
    writer.write_all(&bytes).map_err(io_err("Write request"))?;
    writer.flush().map_err(io_err("Flush request"))
}

/// `--socket`, else the configured `service.socket_path`, else the default.
fn resolve_socket(socket_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = socket_path {
        return path.clone();
    }
    match ConfigLoader::load_default() {
        Ok(config) => certd_service::socket_path(&config),
        Err(e) => {
            eprintln!("Warning: ignoring configuration: {e}");
            certd_service::default_socket_path()
        }
    }
}

/// Connect to the service socket, handshake, and send one request.
fn send_rpc(
    socket_path: Option<&PathBuf>,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value, CliError> {
    let path = resolve_socket(socket_path);

    let stream = UnixStream::connect(&path).map_err(|source| CliError::Connect {
        path: path.clone(),
        source,
    })?;
    let mut writer = stream.try_clone().map_err(io_err("Clone stream"))?;
    let mut reader = BufReader::new(stream);

    let hello = serde_json::json!({
        "id": 0,
        "method": "hello",
        "params": {
            "protocol_version": PROTOCOL_VERSION,
            "client_version": env!("CARGO_PKG_VERSION"),
        }
    });
    write_request(&mut writer, &hello)?;
    let hello_resp = read_response(&mut reader)?;
    if let Some(error) = hello_resp.get("error") {
        return Err(CliError::Handshake(error.to_string()));
    }
    if method == "hello" {
        return Ok(hello_resp
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null));
    }

    let request = serde_json::json!({
        "id": 1,
        "method": method,
        "params": params,
    });
    write_request(&mut writer, &request)?;
    let response = read_response(&mut reader)?;

    if let Some(error) = response.get("error") {
        return Err(CliError::Rpc {
            code: error
                .get("code")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or_default(),
            message: error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            data: error.get("data").cloned(),
        });
    }

    Ok(response
        .get("result")
        .cloned()
        .unwrap_or(serde_json::Value::Null))
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, CliError> {
    serde_json::from_value(value).map_err(|e| CliError::Protocol(e.to_string()))
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Long-form date, e.g. `March 15, 2024`.
pub fn format_date(date: chrono::NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

pub fn render_certificate(cert: &Certificate) -> String {
    let rows = [
        ("CERTIFICATE ID", cert.id.clone()),
        ("PARTICIPANT NAME", cert.participant_name.clone()),
        ("EMAIL", cert.email.clone()),
        ("EVENT NAME", cert.event_name.clone()),
        ("EVENT DATE", format_date(cert.event_date)),
        ("ISSUER", cert.issuer.clone()),
        ("ISSUED DATE", format_date(cert.issued_date)),
        ("STATUS", cert.status.as_str().to_uppercase()),
    ];
    rows.iter()
        .map(|(label, value)| format!("  {label:<17} {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_verification(result: &CertVerifyResult) -> String {
    match (&result.state, &result.certificate) {
        (LookupState::Found, Some(cert)) => {
            let headline = if result.valid {
                "VALID CERTIFICATE\nCertificate authenticated successfully"
            } else {
                "REVOKED CERTIFICATE\nThis certificate has been revoked by the issuer"
            };
            format!("{headline}\n\n{}", render_certificate(cert))
        }
        _ => format!(
            "INVALID CERTIFICATE\nNo certificate found with ID: {}",
            result.searched_id
        ),
    }
}

pub fn render_listing(listing: &AdminListResult) -> String {
    let mut out = format!(
        "Total: {} certificate{}",
        listing.total,
        if listing.total == 1 { "" } else { "s" }
    );
    if listing.certificates.is_empty() {
        return out;
    }
    out.push_str(&format!(
        "\n\n  {:<20} {:<24} {:<40} {:<20} STATUS",
        "CERTIFICATE ID", "PARTICIPANT", "EVENT", "DATE"
    ));
    for cert in &listing.certificates {
        out.push_str(&format!(
            "\n  {:<20} {:<24} {:<40} {:<20} {}",
            cert.id,
            cert.participant_name,
            cert.event_name,
            format_date(cert.event_date),
            cert.status.as_str().to_uppercase()
        ));
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

impl CertCli {
    pub fn run(&self) -> Result<(), CliError> {
        match &self.command {
            CertSubcommand::Issue(args) => cmd_issue(args),
            CertSubcommand::Verify(args) => cmd_verify(args),
            CertSubcommand::Admin(admin) => admin.run(),
            CertSubcommand::Service(svc) => svc.run(),
        }
    }
}

impl AdminCli {
    fn run(&self) -> Result<(), CliError> {
        match &self.command {
            AdminSubcommand::Login(args) => cmd_admin_login(args),
            AdminSubcommand::Logout(args) => cmd_admin_logout(args),
            AdminSubcommand::List(args) => cmd_admin_list(args),
            AdminSubcommand::Show(args) => cmd_admin_cert(args, "admin.show"),
            AdminSubcommand::Revoke(args) => cmd_admin_cert(args, "admin.revoke"),
        }
    }
}

impl ServiceCli {
    fn run(&self) -> Result<(), CliError> {
        match &self.command {
            ServiceSubcommand::Status(args) => cmd_service_status(args),
            ServiceSubcommand::Ping(args) => cmd_service_ping(args),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command implementations
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_issue(args: &IssueArgs) -> Result<(), CliError> {
    let params = serde_json::json!({
        "participant_name": args.participant_name,
        "email": args.email,
        "event_name": args.event_name,
        "event_date": args.event_date,
    });

    let result = match send_rpc(args.conn.socket.as_ref(), "cert.issue", params) {
        Ok(result) => result,
        Err(err) => {
            if let Some(fields) = err.field_errors() {
                for (field, message) in fields.iter() {
                    eprintln!("  {field}: {message}");
                }
            }
            return Err(err);
        }
    };

    if args.conn.json {
        print_json(&result);
        return Ok(());
    }

    let cert: Certificate = decode(result)?;
    println!("CERTIFICATE ISSUED\nCertificate has been successfully generated\n");
    println!("{}", render_certificate(&cert));
    Ok(())
}

fn cmd_verify(args: &VerifyArgs) -> Result<(), CliError> {
    let result = send_rpc(
        args.conn.socket.as_ref(),
        "cert.verify",
        serde_json::json!({ "id": args.id }),
    )?;
    let verification: CertVerifyResult = decode(result.clone())?;

    if args.conn.json {
        print_json(&result);
    } else {
        println!("{}", render_verification(&verification));
    }

    if verification.valid {
        Ok(())
    } else {
        Err(CliError::Rejected(format!(
            "{} is not a valid certificate",
            verification.searched_id
        )))
    }
}

fn cmd_admin_login(args: &AdminLoginArgs) -> Result<(), CliError> {
    let result = send_rpc(
        args.conn.socket.as_ref(),
        "admin.login",
        serde_json::json!({ "username": args.username, "password": args.password }),
    )?;

    if args.conn.json {
        print_json(&result);
    } else {
        let login: AdminLoginResult = decode(result)?;
        println!("Logged in. Session: {}", login.session_id);
        println!("Hint: export CERTD_SESSION={}", login.session_id);
    }
    Ok(())
}

fn cmd_admin_logout(args: &SessionArgs) -> Result<(), CliError> {
    let result = send_rpc(
        args.conn.socket.as_ref(),
        "admin.logout",
        serde_json::json!({ "session_id": args.session_id }),
    )?;

    if args.conn.json {
        print_json(&result);
    } else {
        println!("Logged out");
    }
    Ok(())
}

fn cmd_admin_list(args: &SessionArgs) -> Result<(), CliError> {
    let result = send_rpc(
        args.conn.socket.as_ref(),
        "admin.list",
        serde_json::json!({ "session_id": args.session_id }),
    )?;

    if args.conn.json {
        print_json(&result);
    } else {
        let listing: AdminListResult = decode(result)?;
        println!("ALL CERTIFICATES\n{}", render_listing(&listing));
    }
    Ok(())
}

fn cmd_admin_cert(args: &AdminCertArgs, method: &str) -> Result<(), CliError> {
    let result = send_rpc(
        args.conn.socket.as_ref(),
        method,
        serde_json::json!({ "session_id": args.session_id, "id": args.id }),
    )?;

    if args.conn.json {
        print_json(&result);
    } else {
        let cert: Certificate = decode(result)?;
        println!("{}", render_certificate(&cert));
    }
    Ok(())
}

fn cmd_service_status(args: &ConnectionArgs) -> Result<(), CliError> {
    let result = send_rpc(
        args.socket.as_ref(),
        "service.status",
        serde_json::json!({}),
    )?;

    if args.json {
        print_json(&result);
    } else {
        let status: ServiceStatusResult = decode(result)?;
        println!("certd service: running");
        println!("  Uptime:       {}s", status.uptime_s);
        println!("  Certificates: {}", status.certificates);
        println!("  Sessions:     {}", status.sessions);
    }
    Ok(())
}

fn cmd_service_ping(args: &ConnectionArgs) -> Result<(), CliError> {
    let result = send_rpc(args.socket.as_ref(), "hello", serde_json::Value::Null)?;

    if args.json {
        print_json(&result);
    } else {
        let hello: HelloResult = decode(result)?;
        println!(
            "certd service v{} (protocol {})",
            hello.service_version, hello.protocol_version
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use certd_core::{CertificateStatus, Registry};
    use pretty_assertions::assert_eq;

    fn seeded(id: &str) -> Certificate {
        Registry::seeded()
            .find(id)
            .cloned()
            .unwrap_or_else(|| panic!("missing seed {id}"))
    }

    #[test]
    fn dates_render_long_form() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap_or_default();
        assert_eq!(format_date(date), "March 5, 2024");
    }

    #[test]
    fn miss_renders_invalid_with_searched_id() {
        let result = CertVerifyResult {
            state: LookupState::NotFound,
            searched_id: "CERT-2099-001-ZZZZ".to_string(),
            valid: false,
            certificate: None,
        };
        assert_eq!(
            render_verification(&result),
            "INVALID CERTIFICATE\nNo certificate found with ID: CERT-2099-001-ZZZZ"
        );
    }

    #[test]
    fn hit_renders_every_field() {
        let cert = seeded("CERT-2024-001-XK9P");
        let result = CertVerifyResult {
            state: LookupState::Found,
            searched_id: cert.id.clone(),
            valid: true,
            certificate: Some(cert),
        };
        let text = render_verification(&result);
        assert!(text.starts_with("VALID CERTIFICATE"));
        for needle in [
            "CERT-2024-001-XK9P",
            "Alex Morgan",
            "alex.morgan@example.com",
            "Advanced Cybersecurity Workshop 2024",
            "March 15, 2024",
            "0x0 PIR4T3S Team",
            "VALID",
        ] {
            assert!(text.contains(needle), "missing {needle:?} in:\n{text}");
        }
    }

    #[test]
    fn revoked_hit_says_so() {
        let mut cert = seeded("CERT-2024-002-LM4T");
        cert.status = CertificateStatus::Revoked;
        let result = CertVerifyResult {
            state: LookupState::Found,
            searched_id: cert.id.clone(),
            valid: false,
            certificate: Some(cert),
        };
        assert!(render_verification(&result).starts_with("REVOKED CERTIFICATE"));
    }

    #[test]
    fn listing_pluralizes_total() {
        let one = AdminListResult {
            certificates: vec![seeded("CERT-2024-003-QW7R")],
            total: 1,
        };
        assert!(render_listing(&one).starts_with("Total: 1 certificate\n"));

        let none = AdminListResult {
            certificates: Vec::new(),
            total: 0,
        };
        assert_eq!(render_listing(&none), "Total: 0 certificates");
    }

    #[test]
    fn validation_error_exposes_fields() {
        let err = CliError::Rpc {
            code: ERR_VALIDATION,
            message: "validation failed".to_string(),
            data: Some(serde_json::json!({"email": "Email is required"})),
        };
        let fields = err.field_errors().unwrap_or_default();
        assert_eq!(fields.email.as_deref(), Some("Email is required"));
        assert_eq!(err.exit_code(), EXIT_FAILED);
    }

    #[test]
    fn unreachable_service_is_infra() {
        let missing = PathBuf::from("/nonexistent/certd-test.sock");
        let err = send_rpc(Some(&missing), "service.status", serde_json::json!({}));
        assert!(matches!(err, Err(CliError::Connect { .. })));
        assert_eq!(err.err().map(|e| e.exit_code()), Some(EXIT_INFRA));
    }
}
