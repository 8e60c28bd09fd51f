use std::process::ExitCode;

use certd_cli::CertCli;
use clap::Parser;

fn main() -> ExitCode {
    let cli = CertCli::parse();
    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
