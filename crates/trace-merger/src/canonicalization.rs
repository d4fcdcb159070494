// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Identifier canonicalization
//!
//! Recorded identifiers are allocation artifacts of one run. After canonicalization
//! every instruction is named by the smallest identifier ever recorded for its
//! signature (or a fresh one, when segments reused that identifier for another
//! signature), so equivalent corpora print the same program.

use std::collections::BTreeMap;

use log::debug;
use trace_model::{OpId, SegmentKey, Signature, Trace, Traces};

use crate::control_flow_merge::{MergedProgram, Operand};

/// Identifier to signature per segment, and signature to canonical identifier, over a
/// corpus.
///
/// Identifiers are only meaningful inside the segment that recorded them, so lookups
/// go through the segment's scope: the segment itself, then its frame, then extern.
#[derive(Clone, Debug, Default)]
pub struct IdentifierMap {
    signatures: BTreeMap<SegmentKey, BTreeMap<OpId, Signature>>,
    canonical: BTreeMap<Signature, OpId>,
    /// Inverse of `canonical`
    by_canonical: BTreeMap<OpId, Signature>,
}

impl IdentifierMap {
    pub fn build<'t>(traces: impl IntoIterator<Item = &'t Trace>) -> Self {
        let mut map = Self::default();
        let mut smallest: BTreeMap<Signature, OpId> = BTreeMap::new();
        for trace in traces {
            let local = map.signatures.entry(trace.key()).or_default();
            for op in trace.ops() {
                local.entry(op.result).or_insert_with(|| op.signature.clone());
                smallest
                    .entry(op.signature.clone())
                    .and_modify(|id| *id = (*id).min(op.result))
                    .or_insert(op.result);
            }
        }
        map.assign_canonical(smallest);
        debug!(
            "identifier map: {} segments, {} signatures",
            map.signatures.len(),
            map.canonical.len()
        );
        map
    }

    /// Gives every signature its smallest recorded identifier. Segments may reuse
    /// identifiers, so when two signatures share a smallest identifier the one with the
    /// smaller signature keeps it and the other gets a fresh one past all of them.
    fn assign_canonical(&mut self, smallest: BTreeMap<Signature, OpId>) {
        let mut fresh = smallest.values().map(|id| id.0 + 1).max().unwrap_or(0);
        let mut order: Vec<(OpId, Signature)> =
            smallest.into_iter().map(|(sig, id)| (id, sig)).collect();
        order.sort();
        for (id, sig) in order {
            let id = if self.by_canonical.contains_key(&id) {
                let renamed = OpId(fresh);
                fresh += 1;
                debug!("identifier {} is shared; `{}` becomes {}", id, sig, renamed);
                renamed
            } else {
                id
            };
            self.by_canonical.insert(id, sig.clone());
            self.canonical.insert(sig, id);
        }
    }

    /// Extern first, then frames and pixels in ascending order.
    pub fn from_corpus(traces: &Traces) -> Self {
        Self::build(traces.all())
    }

    /// Signature of the operation `id` names when referred to from segment `key`.
    pub fn signature_of(&self, key: SegmentKey, id: OpId) -> Option<&Signature> {
        key.scope()
            .find_map(|k| self.signatures.get(&k).and_then(|local| local.get(&id)))
    }

    pub fn canonical_id(&self, sig: &Signature) -> Option<OpId> {
        self.canonical.get(sig).copied()
    }

    /// Signature a canonical identifier stands for.
    pub fn canonical_signature(&self, id: OpId) -> Option<&Signature> {
        self.by_canonical.get(&id)
    }

    /// Canonical identifier of whatever `id` names when referred to from segment `key`.
    pub fn canonical_for(&self, key: SegmentKey, id: OpId) -> Option<OpId> {
        self.signature_of(key, id).and_then(|sig| self.canonical_id(sig))
    }

    pub fn signature_count(&self) -> usize {
        self.canonical.len()
    }
}

/// Rewrites results and operands of `program` to canonical identifiers.
///
/// Results are renamed through their signature. Operands are resolved in the segment
/// the instruction was recorded in and renamed when the map knows them; label operands
/// are never touched. Operands of an instruction are rewritten only once.
pub fn canonicalize(program: &mut MergedProgram, ids: &IdentifierMap) {
    for instr in program.instructions_mut() {
        if let Some(id) = ids.canonical_id(&instr.signature) {
            instr.result = id;
        }
        let Some(origin) = instr.recorded_in.take() else {
            continue;
        };
        for operand in instr.operands.iter_mut() {
            if let Operand::Id(id) = operand {
                if let Some(canonical) = ids.canonical_for(origin, *id) {
                    *id = canonical;
                }
            }
        }
    }
}

/// Renames identifiers to `t000, t001, ...` in order of first definition across
/// `programs`, taken in the given order. Operands defined outside them are kept.
pub fn renumber_dense(programs: &mut [&mut MergedProgram]) {
    let mut dense: BTreeMap<OpId, OpId> = BTreeMap::new();
    for program in programs.iter() {
        for instr in program.instructions() {
            let next = OpId(dense.len() as u32);
            dense.entry(instr.result).or_insert(next);
        }
    }
    for program in programs.iter_mut() {
        for instr in program.instructions_mut() {
            instr.result = dense[&instr.result];
            for operand in instr.operands.iter_mut() {
                if let Operand::Id(id) = operand {
                    if let Some(renamed) = dense.get(id) {
                        *id = *renamed;
                    }
                }
            }
        }
    }
}
