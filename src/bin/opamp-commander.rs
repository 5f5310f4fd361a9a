//! Entry point: parses CLI arguments and either runs the commander or
//! performs a one-shot config validation.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    opamp_commander::cli::run().await
}
