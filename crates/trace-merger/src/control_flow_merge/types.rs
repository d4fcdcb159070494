// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use trace_model::{OpId, OpKind, Operation, SegmentKey, Signature, Value};

/// Index of a label. Once a program is finished this equals the label's placement
/// order, so `L0` is the first label in the output.
pub type LabelId = usize;

/// An operand of a merged instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    /// Result of an earlier operation
    Id(OpId),
    /// Jump target of a branch; carries no signature
    Label(LabelId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstrKind {
    Op(OpKind),
    /// A test that jumps to its label operand when its outcome equals `sense`
    Branch { sense: bool, test: OpKind },
}

impl InstrKind {
    /// The primitive this instruction evaluates.
    pub fn op_kind(&self) -> &OpKind {
        match self {
            InstrKind::Op(kind) => kind,
            InstrKind::Branch { test, .. } => test,
        }
    }
}

/// One instruction of the merged program, shared by every trace that reaches it.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub kind: InstrKind,
    pub result: OpId,
    pub operands: Vec<Operand>,
    pub value: Value,
    pub signature: Signature,
    /// Segment whose identifiers the operands still use; cleared once they are canonical
    pub recorded_in: Option<SegmentKey>,
}

impl Instruction {
    /// Copies `op` as recorded in segment `origin`.
    pub fn from_operation(op: &Operation, origin: SegmentKey) -> Self {
        Self {
            kind: InstrKind::Op(op.kind.clone()),
            result: op.result,
            operands: op.operands.iter().copied().map(Operand::Id).collect(),
            value: op.value,
            signature: op.signature.clone(),
            recorded_in: Some(origin),
        }
    }

    /// Turns a test into a branch to `target`, taken when the outcome is `sense`.
    pub fn branch(test: &Operation, sense: bool, target: LabelId, origin: SegmentKey) -> Self {
        let mut operands = vec![Operand::Label(target)];
        operands.extend(test.operands.iter().copied().map(Operand::Id));
        Self {
            kind: InstrKind::Branch {
                sense,
                test: test.kind.clone(),
            },
            result: test.result,
            operands,
            value: Value::Bool(sense),
            signature: test.signature.clone(),
            recorded_in: Some(origin),
        }
    }

    pub fn branch_target(&self) -> Option<(bool, LabelId)> {
        match (&self.kind, self.operands.first()) {
            (InstrKind::Branch { sense, .. }, Some(Operand::Label(label))) => Some((*sense, *label)),
            _ => None,
        }
    }

    /// Operands that refer to results, skipping the label of a branch.
    pub fn value_operands(&self) -> impl Iterator<Item = OpId> + '_ {
        self.operands.iter().filter_map(|o| match o {
            Operand::Id(id) => Some(*id),
            Operand::Label(_) => None,
        })
    }
}

/// Element of the merged program.
#[derive(Clone, Debug, PartialEq)]
pub enum MergedItem {
    Instr(Instruction),
    /// Resumption point of deferred traces
    Label(LabelId),
    /// Unconditional transfer to a join point scheduled later
    Jump(LabelId),
    /// Visual break after a branch
    Separator,
    /// Every active trace ended here
    SegmentEnd,
}

/// The merged program: built append-only by the merger and returned whole.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedProgram {
    items: Vec<MergedItem>,
}

impl MergedProgram {
    pub fn new(items: Vec<MergedItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[MergedItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [MergedItem] {
        &mut self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.items.iter().filter_map(|item| match item {
            MergedItem::Instr(instr) => Some(instr),
            _ => None,
        })
    }

    pub fn instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.items.iter_mut().filter_map(|item| match item {
            MergedItem::Instr(instr) => Some(instr),
            _ => None,
        })
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions().count()
    }

    pub fn branch_count(&self) -> usize {
        self.instructions().filter(|i| i.branch_target().is_some()).count()
    }

    /// Item index of every placed label.
    pub fn label_positions(&self) -> BTreeMap<LabelId, usize> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| match item {
                MergedItem::Label(label) => Some((*label, idx)),
                _ => None,
            })
            .collect()
    }

    /// Signature of every instruction result defined by this program.
    pub fn defined_signatures(&self) -> BTreeMap<OpId, Signature> {
        self.instructions()
            .map(|i| (i.result, i.signature.clone()))
            .collect()
    }
}
