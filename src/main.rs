//! jiracli - a command line client for JIRA.

use std::process::ExitCode;

use clap::Parser;

use jiracli::cli::{self, Cli};
use jiracli::error::Severity;
use jiracli::{logging, output};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Without a log file the commands still work.
    let _ = logging::init();

    let args = Cli::parse();
    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            output::print_error(&err);
            match err.severity() {
                Severity::Warning => ExitCode::SUCCESS,
                Severity::Critical => ExitCode::FAILURE,
            }
        }
    }
}
