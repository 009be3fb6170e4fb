//! DICOM Conversion CLI Tool
//!
//! A command-line utility for turning compressed DICOM payloads into
//! PNG images and running requests through the conversion service.

use clap::Parser;
use medimg_convert::cli::{run, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
