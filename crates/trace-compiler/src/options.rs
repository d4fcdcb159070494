// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use anyhow::Context;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use trace_merger::PipelineOptions;

/// Represents options provided to the tool. Most of those options are configured via a toml
/// source; some over the command line flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Where to write the rendered program; stdout when unset.
    pub output_path: Option<String>,
    /// Verbosity level for logging.
    pub verbosity_level: LevelFilter,
    /// Skip the consistency checks before merging.
    pub skip_checks: bool,
    /// Replay every trace against the merged programs.
    pub verify_replay: bool,
    /// Renumber identifiers densely after canonicalization.
    pub dense_ids: bool,
    /// Append frame and pixel value ranges to the output.
    pub value_ranges: bool,
    /// Leaf kinds whose values are measured rather than constant.
    pub measured_leaf_kinds: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            output_path: None,
            verbosity_level: LevelFilter::Info,
            skip_checks: false,
            verify_replay: true,
            dense_ids: false,
            value_ranges: false,
            measured_leaf_kinds: vec!["input".to_string()],
        }
    }
}

impl Options {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn pipeline(&self) -> PipelineOptions {
        PipelineOptions {
            check_consistency: !self.skip_checks,
            verify_replay: self.verify_replay,
            dense_ids: self.dense_ids,
            measured_leaf_kinds: self.measured_leaf_kinds.clone(),
        }
    }
}
