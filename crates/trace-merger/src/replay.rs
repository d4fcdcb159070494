// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Replays a merged program along the branch outcomes recorded in one trace and
//! checks that it reproduces the trace operation by operation.

use std::collections::BTreeMap;

use anyhow::{bail, ensure, Context};
use trace_model::{OpId, Operation, Signature, Trace};

use crate::canonicalization::IdentifierMap;
use crate::control_flow_merge::{Instruction, LabelId, MergedItem, MergedProgram};

struct Replay<'a> {
    program: &'a MergedProgram,
    trace: &'a Trace,
    ids: &'a IdentifierMap,
    labels: BTreeMap<LabelId, usize>,
    defined: BTreeMap<OpId, Signature>,
}

/// Replays `program` along `trace`, returning the number of operations matched.
///
/// An operand matches when both sides resolve to the same signature: the program side
/// through the segment an instruction was recorded in or, once canonical, through its
/// own results and the canonical identifiers of `ids`; the trace side through its own
/// positions or its enclosing segments.
pub fn replay(program: &MergedProgram, trace: &Trace, ids: &IdentifierMap) -> anyhow::Result<usize> {
    Replay {
        program,
        trace,
        ids,
        labels: program.label_positions(),
        defined: program.defined_signatures(),
    }
    .run()
    .with_context(|| format!("replay of {} diverged", trace.name()))
}

impl<'a> Replay<'a> {
    fn run(&self) -> anyhow::Result<usize> {
        let items = self.program.items();
        let mut idx = 0;
        let mut pc = 0;
        // labels only ever sit ahead of the branches and jumps naming them
        for _ in 0..=items.len() {
            let item = items
                .get(idx)
                .with_context(|| format!("ran off the end of the program after {} operations", pc))?;
            match item {
                MergedItem::Label(_) | MergedItem::Separator => idx += 1,
                MergedItem::Jump(label) => idx = self.target(*label)?,
                MergedItem::SegmentEnd => {
                    ensure!(
                        pc == self.trace.len(),
                        "program ends after {} of {} operations",
                        pc,
                        self.trace.len()
                    );
                    return Ok(pc);
                }
                MergedItem::Instr(instr) => {
                    let op = self.trace.get(pc).with_context(|| {
                        format!("trace ended but the program continues at `{}`", instr.signature)
                    })?;
                    self.check(instr, op)
                        .with_context(|| format!("at operation {} (`{}`)", pc, op.signature))?;
                    pc += 1;
                    idx = match instr.branch_target() {
                        Some((sense, label)) if op.outcome() == Some(sense) => self.target(label)?,
                        _ => idx + 1,
                    };
                }
            }
        }
        bail!("replay did not terminate")
    }

    fn target(&self, label: LabelId) -> anyhow::Result<usize> {
        self.labels
            .get(&label)
            .copied()
            .with_context(|| format!("label L{} is never placed", label))
    }

    fn check(&self, instr: &Instruction, op: &Operation) -> anyhow::Result<()> {
        ensure!(
            instr.signature == op.signature,
            "program has `{}` where the trace has `{}`",
            instr.signature,
            op.signature
        );
        ensure!(
            instr.kind.op_kind() == &op.kind,
            "program has kind {} where the trace has {}",
            instr.kind.op_kind(),
            op.kind
        );
        let operands: Vec<OpId> = instr.value_operands().collect();
        ensure!(
            operands.len() == op.operands.len(),
            "program has {} operands where the trace has {}",
            operands.len(),
            op.operands.len()
        );
        for (slot, (ours, theirs)) in operands.iter().zip(&op.operands).enumerate() {
            let ours_sig = self.program_signature(instr, *ours);
            let theirs_sig = self.trace_signature(*theirs);
            match (ours_sig, theirs_sig) {
                (Some(a), Some(b)) if a == b => {}
                (a, b) => bail!(
                    "operand {} refers to `{}` in the program but `{}` in the trace",
                    slot,
                    a.map_or("<unknown>", |s| s.as_str()),
                    b.map_or("<unknown>", |s| s.as_str())
                ),
            }
        }
        Ok(())
    }

    fn program_signature(&self, instr: &Instruction, id: OpId) -> Option<&Signature> {
        match instr.recorded_in {
            Some(origin) => self.ids.signature_of(origin, id),
            None => self
                .defined
                .get(&id)
                .or_else(|| self.ids.canonical_signature(id)),
        }
    }

    fn trace_signature(&self, id: OpId) -> Option<&Signature> {
        match self.trace.position_of(id) {
            Some(pos) => self.trace.signature_at(pos),
            None => self.ids.signature_of(self.trace.key(), id),
        }
    }
}
