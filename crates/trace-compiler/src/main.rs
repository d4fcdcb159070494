// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::*;
use colored::Colorize;
use log::debug;
use simplelog::{Config, TermLogger, TerminalMode};
use trace_compiler::{execute, GeneralConfig, MergeConfig, Options};

#[derive(Parser)]
#[clap(
    name = env!("CARGO_BIN_NAME"),
    about = "Compiles a log of straight-line operation traces into one branching program per segment kind",
    rename_all = "kebab-case",
    author,
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Args {
    /// Execution log to compile
    pub log: PathBuf,

    /// TOML options file; command-line flags take precedence
    #[clap(long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// General options
    #[clap(flatten)]
    pub general_config: GeneralConfig,

    /// Merge options
    #[clap(flatten)]
    pub merge_config: MergeConfig,
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut options = match &args.config {
        Some(path) => Options::from_file(path)?,
        None => Options::default(),
    };
    options.apply(&args.general_config, &args.merge_config);

    if TermLogger::init(options.verbosity_level, Config::default(), TerminalMode::Stderr).is_err() {
        eprintln!("logger already initialized");
    }
    debug!("{} version: {}", env!("CARGO_BIN_NAME"), env!("CARGO_PKG_VERSION"));

    execute(&args.log, &options)
}

fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).unwrap();

    match run(Args::parse()) {
        Ok(_) => (),
        Err(err) => {
            let err = format!("{:?}", err);
            println!("{}", err.bold().red());
            std::process::exit(1);
        }
    }
}
