// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

pub mod compile;
pub mod options;

pub use compile::{compile_log, execute, GeneralConfig, MergeConfig};
pub use options::Options;
