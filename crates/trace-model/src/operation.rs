// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{anyhow, bail};
use internment::ArcIntern;

use crate::value::Value;

/// Operation kinds starting with this prefix are two-way branch points.
pub const TEST_KIND_PREFIX: &str = "is_";

/// Result identifier of a recorded operation.
///
/// Only the numeric part carries identity; the textual prefix of the log is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub u32);

impl Display for OpId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{:03}", self.0)
    }
}

impl FromStr for OpId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '_');
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            bail!("`{}` is not an operation identifier", s);
        }
        digits
            .parse::<u32>()
            .map(OpId)
            .map_err(|e| anyhow!("identifier `{}` out of range: {}", s, e))
    }
}

/// Content-derived identity of an operation.
///
/// Interned, so clones are cheap and equality is a pointer comparison. Ordering is by
/// text, which keeps every map keyed by signature independent of allocation order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature(ArcIntern<String>);

impl Signature {
    pub fn new(text: impl Into<String>) -> Self {
        Signature(ArcIntern::new(text.into()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag naming the primitive that ran, e.g. `add.ss` or `is_neg.s`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpKind(String);

impl OpKind {
    pub fn new(kind: impl Into<String>) -> Self {
        OpKind(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_test(&self) -> bool {
        self.0.starts_with(TEST_KIND_PREFIX)
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One traced primitive computation.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub result: OpId,
    pub kind: OpKind,
    /// Result identifiers of earlier operations, in operand order
    pub operands: Vec<OpId>,
    pub signature: Signature,
    pub value: Value,
    /// The test recorded immediately before this operation in the same trace, if any
    pub comes_from: Option<OpId>,
}

impl Operation {
    pub fn new(
        result: OpId,
        kind: OpKind,
        operands: Vec<OpId>,
        value: Value,
        signature: Signature,
    ) -> Self {
        Self {
            result,
            kind,
            operands,
            signature,
            value,
            comes_from: None,
        }
    }

    pub fn is_test(&self) -> bool {
        self.kind.is_test()
    }

    /// Branch outcome of a test. `None` for non-tests.
    pub fn outcome(&self) -> Option<bool> {
        if self.is_test() {
            self.value.as_bool()
        } else {
            None
        }
    }

    /// A leaf whose value is fixed by the program text rather than measured per segment.
    pub fn is_constant(&self, measured_leaf_kinds: &[String]) -> bool {
        self.operands.is_empty()
            && !measured_leaf_kinds.iter().any(|k| k == self.kind.as_str())
    }
}
