// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Trace model
//!
//! Immutable representation of recorded primitive operations and of the straight-line
//! traces they form, plus ingestion of the textual execution log into per-segment
//! trace collections.

mod corpus;
mod ingestion;
mod operation;
mod trace;
mod value;

pub use corpus::Traces;
pub use ingestion::{parse_log, read_log, IngestionReport};
pub use operation::{OpId, OpKind, Operation, Signature, TEST_KIND_PREFIX};
pub use trace::{Path, SegmentKey, Trace, TraceBuilder};
pub use value::Value;
