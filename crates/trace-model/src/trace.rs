// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use anyhow::{bail, ensure};

use crate::operation::{OpId, Operation, Signature};

/// Coordinates of the segment a trace was recorded in.
///
/// Ordering is extern first, then frames by number, then pixels by (frame, pixel).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentKey {
    Extern,
    Frame(u32),
    Pixel { frame: u32, pixel: u32 },
}

impl SegmentKey {
    /// Segment whose results this one may also refer to: a pixel sees its frame, a
    /// frame sees the extern segment.
    pub fn enclosing(self) -> Option<SegmentKey> {
        match self {
            SegmentKey::Extern => None,
            SegmentKey::Frame(_) => Some(SegmentKey::Extern),
            SegmentKey::Pixel { frame, .. } => Some(SegmentKey::Frame(frame)),
        }
    }

    /// This segment followed by every segment enclosing it.
    pub fn scope(self) -> impl Iterator<Item = SegmentKey> {
        std::iter::successors(Some(self), |key| key.enclosing())
    }
}

impl Display for SegmentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentKey::Extern => write!(f, "extern"),
            SegmentKey::Frame(n) => write!(f, "frame {}", n),
            SegmentKey::Pixel { frame, pixel } => write!(f, "frame {} pixel {}", frame, pixel),
        }
    }
}

/// Branch outcomes of every test in a trace, in encounter order, as `T`/`F` letters.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(String);

impl Path {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn letter(outcome: bool) -> char {
        if outcome {
            'T'
        } else {
            'F'
        }
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("<straight>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// One full execution of a segment. Immutable once built.
#[derive(Clone, Debug)]
pub struct Trace {
    key: SegmentKey,
    ops: Vec<Operation>,
    positions: BTreeMap<OpId, usize>,
}

impl Trace {
    pub fn key(&self) -> SegmentKey {
        self.key
    }

    pub fn name(&self) -> String {
        self.key.to_string()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn get(&self, pc: usize) -> Option<&Operation> {
        self.ops.get(pc)
    }

    pub fn signature_at(&self, pc: usize) -> Option<&Signature> {
        self.ops.get(pc).map(|op| &op.signature)
    }

    /// Position of the operation producing `id`, if it was recorded in this trace.
    pub fn position_of(&self, id: OpId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Whether `sig` occurs strictly after position `pc`.
    pub fn remaining_contains(&self, pc: usize, sig: &Signature) -> bool {
        self.ops
            .iter()
            .skip(pc + 1)
            .any(|op| &op.signature == sig)
    }

    pub fn tests(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().filter(|op| op.is_test())
    }

    pub fn path(&self) -> Path {
        Path(
            self.tests()
                .map(|op| Path::letter(op.outcome().unwrap_or(false)))
                .collect(),
        )
    }
}

/// Accumulates operations of one segment in recording order.
#[derive(Debug)]
pub struct TraceBuilder {
    key: SegmentKey,
    ops: Vec<Operation>,
    positions: BTreeMap<OpId, usize>,
    dangling_test: Option<OpId>,
}

impl TraceBuilder {
    pub fn new(key: SegmentKey) -> Self {
        Self {
            key,
            ops: Vec::new(),
            positions: BTreeMap::new(),
            dangling_test: None,
        }
    }

    pub fn key(&self) -> SegmentKey {
        self.key
    }

    pub fn contains(&self, id: OpId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Appends an operation. Result identifiers must strictly increase and tests must
    /// carry a boolean; the pending test, if any, becomes the operation's `comes_from`.
    pub fn push(&mut self, mut op: Operation) -> anyhow::Result<()> {
        if let Some(last) = self.ops.last() {
            ensure!(
                op.result > last.result,
                "{}: identifier {} recorded after {}; identifiers must strictly increase",
                self.key,
                op.result,
                last.result
            );
        }
        if op.is_test() && op.value.as_bool().is_none() {
            bail!(
                "{}: test {} `{}` has non-boolean value {}",
                self.key,
                op.result,
                op.signature,
                op.value
            );
        }
        op.comes_from = self.dangling_test.take();
        if op.is_test() {
            self.dangling_test = Some(op.result);
        }
        self.positions.insert(op.result, self.ops.len());
        self.ops.push(op);
        Ok(())
    }

    pub fn finish(self) -> Trace {
        Trace {
            key: self.key,
            ops: self.ops,
            positions: self.positions,
        }
    }
}
