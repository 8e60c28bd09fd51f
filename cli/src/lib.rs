pub mod cert_cmd;

pub use cert_cmd::CertCli;
pub use cert_cmd::CliError;
