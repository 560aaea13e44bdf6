pub mod cli;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod render;

use std::process::ExitCode;

/// Exit status for bad arguments and for anything that stops a plot from being written.
pub const FAILURE_EXIT_CODE: u8 = 1;

/// Prints a fatal error to stdout and turns it into the exit status.
pub fn exit_code(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}
