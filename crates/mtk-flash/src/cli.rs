//! Flag parsing (§6). Files are opened eagerly here so a bad path is
//! reported before any USB activity starts, and address/length accumulate
//! as running state consumed by whichever `--dump`/`--flash` follows them —
//! mirroring the informative original's single sequential argument pass.
use std::{
    fs::{File, OpenOptions},
    path::PathBuf,
};

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use clap_num::maybe_hex;

use crate::{
    Result,
    commands::{FileIo, IoCallback},
    err::Error,
    orchestrator::DeviceState,
};

const MAX_OPERATIONS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Dump,
    Flash,
}

pub struct Operation {
    pub kind: OperationKind,
    pub address: u64,
    pub length: u64,
    pub io: Box<dyn IoCallback>,
}

pub struct Config {
    pub state: DeviceState,
    pub download_agent: Option<PathBuf>,
    pub operations: Vec<Operation>,
    pub reboot: bool,
    pub verbose: bool,
}

#[derive(Parser)]
#[command(about = "Drives the MediaTek Preloader/DA boot protocol to dump or flash eMMC storage")]
struct Cli {
    /// Device is in Preloader mode
    #[arg(short = 'P', long)]
    preloader: bool,

    /// Device is in DA Stage 2
    #[arg(short = '2', long = "da-stage2")]
    da_stage2: bool,

    /// Path to MediaTek Download Agent binary
    #[arg(short, long, value_name = "FILE")]
    download_agent: Option<PathBuf>,

    /// EMMC address to read/write
    #[arg(short, long, value_name = "ADDRESS", value_parser = maybe_hex::<u64>, action = ArgAction::Append)]
    address: Vec<u64>,

    /// Length of data to read/write
    #[arg(short, long, value_name = "LENGTH", value_parser = maybe_hex::<u64>, action = ArgAction::Append)]
    length: Vec<u64>,

    /// Path to dump data to
    #[arg(short = 'D', long, value_name = "FILE", action = ArgAction::Append)]
    dump: Vec<PathBuf>,

    /// Path to flash data from
    #[arg(short = 'F', long, value_name = "FILE", action = ArgAction::Append)]
    flash: Vec<PathBuf>,

    /// Reboot device after completion
    #[arg(short = 'R', long)]
    reboot: bool,

    /// Produce verbose output
    #[arg(short, long)]
    verbose: bool,
}

enum Event {
    Address(u64),
    Length(u64),
    Dump(PathBuf),
    Flash(PathBuf),
}

fn occurrences<T: Clone + Send + Sync + 'static>(matches: &clap::ArgMatches, id: &str) -> Vec<(usize, T)> {
    match (matches.indices_of(id), matches.get_many::<T>(id)) {
        (Some(indices), Some(values)) => indices.zip(values.cloned()).collect(),
        _ => Vec::new(),
    }
}

/// Parses `argv`, validates it against §6/§8's rules, and opens every
/// operation's backing file.
pub fn parse() -> Result<Config> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).map_err(|e| Error::Custom(e.to_string()))?;

    // `-P`/`-2` are independent flags; whichever was given later on the
    // command line decides the state, matching the original's sequential
    // `switch` over repeated options.
    let state = match (matches.index_of("preloader"), matches.index_of("da_stage2")) {
        (None, None) => DeviceState::None,
        (Some(_), None) => DeviceState::Preloader,
        (None, Some(_)) => DeviceState::DaStage2,
        (Some(p), Some(d)) if d > p => DeviceState::DaStage2,
        (Some(_), Some(_)) => DeviceState::Preloader,
    };

    if state != DeviceState::DaStage2 && cli.download_agent.is_none() {
        return Err(Error::MissingDownloadAgent);
    }
    if let Some(path) = &cli.download_agent {
        File::open(path)?;
    }

    let mut events: Vec<(usize, Event)> = Vec::new();
    events.extend(occurrences::<u64>(&matches, "address").into_iter().map(|(i, v)| (i, Event::Address(v))));
    events.extend(occurrences::<u64>(&matches, "length").into_iter().map(|(i, v)| (i, Event::Length(v))));
    events.extend(occurrences::<PathBuf>(&matches, "dump").into_iter().map(|(i, v)| (i, Event::Dump(v))));
    events.extend(occurrences::<PathBuf>(&matches, "flash").into_iter().map(|(i, v)| (i, Event::Flash(v))));
    events.sort_by_key(|(i, _)| *i);

    let mut address = 0u64;
    let mut length = 0u64;
    let mut operations = Vec::new();
    for (_, event) in events {
        match event {
            Event::Address(a) => address = a,
            Event::Length(l) => length = l,
            Event::Dump(path) => {
                if operations.len() == MAX_OPERATIONS {
                    return Err(Error::TooManyOperations(MAX_OPERATIONS));
                }
                operations.push(build_operation(OperationKind::Dump, address, length, path)?);
            }
            Event::Flash(path) => {
                if operations.len() == MAX_OPERATIONS {
                    return Err(Error::TooManyOperations(MAX_OPERATIONS));
                }
                operations.push(build_operation(OperationKind::Flash, address, length, path)?);
            }
        }
    }

    Ok(Config {
        state,
        download_agent: cli.download_agent,
        operations,
        reboot: cli.reboot,
        verbose: cli.verbose,
    })
}

fn build_operation(kind: OperationKind, address: u64, length: u64, path: PathBuf) -> Result<Operation> {
    if length == 0 {
        return Err(Error::ZeroLengthOperation);
    }

    let file = match kind {
        OperationKind::Flash => {
            let file = File::open(&path)?;
            let actual = file.metadata()?.len();
            if actual < length {
                return Err(Error::FlashSourceTooShort { path, required: length, actual });
            }
            file
        }
        OperationKind::Dump => OpenOptions::new().write(true).create(true).truncate(true).open(&path)?,
    };

    Ok(Operation { kind, address, length, io: Box::new(FileIo::new(file)) })
}
