// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use itertools::Itertools;
use trace_model::{Operation, Signature, Trace};

/// A program counter into one exemplar trace. The trace itself is never mutated.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'t> {
    pub trace: &'t Trace,
    pub pc: usize,
}

impl<'t> Cursor<'t> {
    pub fn start(trace: &'t Trace) -> Self {
        Self { trace, pc: 0 }
    }

    /// Operation under the cursor. Callers only hold unfinished cursors.
    pub fn op(&self) -> &'t Operation {
        &self.trace.ops()[self.pc]
    }

    pub fn signature(&self) -> &'t Signature {
        &self.op().signature
    }

    pub fn next_signature(&self) -> Option<&'t Signature> {
        self.trace.signature_at(self.pc + 1)
    }

    pub fn advance(&mut self) {
        self.pc += 1;
    }

    pub fn finished(&self) -> bool {
        self.pc >= self.trace.len()
    }

    /// Operations left, including the one under the cursor.
    pub fn remaining(&self) -> usize {
        self.trace.len().saturating_sub(self.pc)
    }

    /// Whether `sig` lies strictly ahead of the cursor.
    pub fn reaches(&self, sig: &Signature) -> bool {
        self.trace.remaining_contains(self.pc, sig)
    }
}

/// Whether any cursor in `group` will later arrive at `sig`.
pub fn group_reaches(group: &[Cursor], sig: Option<&Signature>) -> bool {
    sig.map_or(false, |sig| group.iter().any(|c| c.reaches(sig)))
}

/// Longest remaining trace among `group`.
pub fn longest_remaining(group: &[Cursor]) -> usize {
    group.iter().map(Cursor::remaining).max().unwrap_or(0)
}

pub fn trace_names(group: &[Cursor]) -> String {
    group.iter().map(|c| c.trace.name()).join(", ")
}
