// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use log::{info, LevelFilter};
use trace_merger::{compile, ValueRanges};
use trace_model::read_log;

use crate::options::Options;

/// General options
#[derive(Args, Default)]
#[clap(next_help_heading = "General Options")]
pub struct GeneralConfig {
    /// Display detailed merge progress
    #[clap(name = "verbose", long, short = 'v')]
    pub verbose: bool,

    /// Write the merged program to this file instead of stdout
    #[clap(name = "output", long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Append value ranges of every computed signature
    #[clap(name = "ranges", long, short = 'r')]
    pub ranges: bool,
}

/// Merge options
#[derive(Args, Default)]
#[clap(next_help_heading = "Merge Options")]
pub struct MergeConfig {
    /// Don't run the consistency checks before merging
    #[clap(name = "no-check", long)]
    pub no_check: bool,

    /// Don't replay the input traces against the merged program
    #[clap(name = "no-replay", long)]
    pub no_replay: bool,

    /// Renumber identifiers as t000, t001, ... in order of definition
    #[clap(name = "dense-ids", long)]
    pub dense_ids: bool,
}

impl Options {
    /// Command-line flags override whatever the config file set.
    pub fn apply(&mut self, general: &GeneralConfig, merge: &MergeConfig) {
        if general.verbose {
            self.verbosity_level = LevelFilter::Debug;
        }
        if let Some(output) = &general.output {
            self.output_path = Some(output.to_string_lossy().to_string());
        }
        self.value_ranges |= general.ranges;
        self.skip_checks |= merge.no_check;
        self.verify_replay &= !merge.no_replay;
        self.dense_ids |= merge.dense_ids;
    }
}

/// Compiles one log and renders the result.
pub fn compile_log(path: &Path, options: &Options) -> anyhow::Result<String> {
    let (traces, _) = read_log(path)?;
    let compiled = compile(&traces, &options.pipeline())
        .with_context(|| format!("Failed to compile {}", path.display()))?;

    let mut output = compiled.to_string();
    if options.value_ranges {
        let kinds = &options.measured_leaf_kinds;
        let frames = ValueRanges::collect("FRAME VALUE RANGES", traces.frame_traces(), kinds);
        let pixels = ValueRanges::collect("PIXEL VALUE RANGES", traces.pixel_traces(), kinds);
        output.push('\n');
        output.push_str(&frames.to_string());
        output.push('\n');
        output.push_str(&pixels.to_string());
    }
    Ok(output)
}

/// Compiles `log` and writes the rendered program where the options say.
pub fn execute(log: &Path, options: &Options) -> anyhow::Result<()> {
    let output = compile_log(log, options)?;
    match &options.output_path {
        Some(path) => {
            std::fs::write(path, &output).with_context(|| format!("Failed to write {}", path))?;
            info!("wrote {}", path);
        }
        None => print!("{}", output),
    }
    Ok(())
}
