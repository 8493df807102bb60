//! estilizar CLI
//!
//! Training entry point for the estilizar library.
//!
//! # Usage
//!
//! ```bash
//! # Train against content tensors on disk
//! estilizar train --content-dir ./content --style-text "oil painting"
//!
//! # Smoke run on a synthetic content set
//! estilizar train --synthetic 8 --style-text fire --max-iter 100 --save-model-interval 100
//! ```

use clap::Parser;
use estilizar::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
