// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Control flow merge module
//!
//! Folds one exemplar trace per distinct path into a single program with
//! conditional branches, labels and shared straight-line code:
//! 1. Lockstep: traces sitting at the same signature emit one shared instruction
//! 2. Split: a test whose traces disagree on the next step becomes a branch;
//!    one side falls through, the other is deferred under a label
//! 3. Join: deferred traces rejoin the active set when it reaches their signature

mod helpers;
mod merger;
mod types;

pub use merger::merge_paths;
pub use types::{InstrKind, Instruction, LabelId, MergedItem, MergedProgram, Operand};
