// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Textual form of merged programs
//!
//! ```text
//!     scalar t001 = 5 # const 5
//!     br_true(is_neg.s) t003 L0, t001 = true # scene.py:42 hit < 0
//!
//!     add.ss t004 t001, t001 = 10 # scene.py:43 hit + hit
//!     end
//! L0:
//!     mul.ss t005 t001, t001 = 25 # scene.py:45 hit * hit
//!     end
//! ```

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::control_flow_merge::{InstrKind, Instruction, MergedItem, MergedProgram, Operand};

const INDENT: &str = "    ";

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Id(id) => write!(f, "{}", id),
            Operand::Label(label) => write!(f, "L{}", label),
        }
    }
}

impl Display for InstrKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrKind::Op(kind) => write!(f, "{}", kind),
            InstrKind::Branch { sense, test } => write!(f, "br_{}({})", sense, test),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.result)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.iter().join(", "))?;
        }
        write!(f, " = {} # {}", self.value, self.signature)
    }
}

impl Display for MergedItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MergedItem::Instr(instr) => write!(f, "{}{}", INDENT, instr),
            MergedItem::Label(label) => write!(f, "L{}:", label),
            MergedItem::Jump(label) => write!(f, "{}jump L{}", INDENT, label),
            MergedItem::Separator => Ok(()),
            MergedItem::SegmentEnd => write!(f, "{}end", INDENT),
        }
    }
}

impl Display for MergedProgram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for item in self.items() {
            writeln!(f, "{}", item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_model::{OpId, OpKind, Operation, SegmentKey, Signature, Value};

    #[test]
    fn renders_instructions_and_markers() {
        let test = Operation::new(
            OpId(3),
            OpKind::new("is_neg.s"),
            vec![OpId(1)],
            Value::Bool(true),
            Signature::new("hit < 0"),
        );
        let scale = Operation::new(
            OpId(1),
            OpKind::new("scalar"),
            vec![],
            Value::Scalar(5.0),
            Signature::new("const 5"),
        );
        let program = MergedProgram::new(vec![
            MergedItem::Instr(Instruction::from_operation(&scale, SegmentKey::Extern)),
            MergedItem::Instr(Instruction::branch(&test, false, 0, SegmentKey::Extern)),
            MergedItem::Separator,
            MergedItem::Jump(0),
            MergedItem::Label(0),
            MergedItem::SegmentEnd,
        ]);
        assert_eq!(
            program.to_string(),
            "    scalar t001 = 5 # const 5\n\
             \x20   br_false(is_neg.s) t003 L0, t001 = false # hit < 0\n\
             \n\
             \x20   jump L0\n\
             L0:\n\
             \x20   end\n"
        );
    }
}
