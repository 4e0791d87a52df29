//! CLI binary for `ontrack`.
//!
//! A thin wrapper: parsing and execution live in the library.

use clap::Parser;
use ontrack::cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match ontrack::cli::run(&cli) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
