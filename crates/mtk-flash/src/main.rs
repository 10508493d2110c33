use std::{
    io::{Write, stdout},
    process::ExitCode,
};

use colored::Colorize;

use crate::err::Error;

mod cli;
mod commands;
mod discovery;
mod err;
mod logging;
mod orchestrator;

/// A framed transport over the one USB bulk endpoint pair every command in
/// this crate talks through. Generic over [`mtk_transport::RawIo`] so the
/// exact same command functions run against a real device or, in tests, an
/// in-memory double; the default parameter keeps production call sites
/// (discovery, the orchestrator) free of any type argument.
pub(crate) type Port<T = mtk_transport::UsbBulk<rusb::Context>> = mtk_transport::Transport<T>;
pub(crate) type Result<T> = core::result::Result<T, Error>;

fn main() -> ExitCode {
    let config = match cli::parse() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", "error".red());
            return ExitCode::from(1);
        }
    };

    match orchestrator::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
