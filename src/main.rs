use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::Parser;
use cellsync::logging::{init_logging, LogConfig};

mod cli;
mod commands;

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        with_ansi: io::stderr().is_terminal(),
        ..LogConfig::from_flags(cli.verbose, cli.quiet)
    };
    if let Err(err) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
