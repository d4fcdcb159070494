// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Trace merger
//!
//! Turns a corpus of straight-line traces into branching programs: traces are grouped
//! by path, checked for consistency, merged one exemplar per path, and renamed to
//! canonical identifiers.

pub mod canonicalization;
pub mod consistency;
pub mod control_flow_merge;
pub mod path_grouping;
pub mod pipeline;
pub mod render;
pub mod replay;
pub mod value_ranges;

pub use canonicalization::{canonicalize, renumber_dense, IdentifierMap};
pub use control_flow_merge::{merge_paths, MergedItem, MergedProgram};
pub use path_grouping::{group_by_path, PathGroups};
pub use pipeline::{compile, CompiledProgram, MergeStats, PipelineOptions};
pub use replay::replay;
pub use value_ranges::{ValueRange, ValueRanges};
