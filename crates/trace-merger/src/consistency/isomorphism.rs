// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, ensure, Context};
use trace_model::{OpId, Operation, Signature, Trace};

use crate::canonicalization::IdentifierMap;
use crate::path_grouping::PathGroups;

/// Where an operand points: a position in the same trace, or an operation recorded
/// in another segment, identified by signature.
#[derive(Debug, PartialEq)]
enum Reference<'a> {
    Local(usize),
    Outside(Option<&'a Signature>),
}

impl std::fmt::Display for Reference<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reference::Local(pos) => write!(f, "position {}", pos),
            Reference::Outside(Some(sig)) => write!(f, "`{}`", sig),
            Reference::Outside(None) => write!(f, "an unknown identifier"),
        }
    }
}

fn reference<'a>(trace: &Trace, id: OpId, ids: &'a IdentifierMap) -> Reference<'a> {
    match trace.position_of(id) {
        Some(pos) => Reference::Local(pos),
        None => Reference::Outside(ids.signature_of(trace.key(), id)),
    }
}

/// Traces sharing a path must be interchangeable position by position.
pub fn check_isomorphism(groups: &PathGroups, ids: &IdentifierMap) -> anyhow::Result<()> {
    for (path, traces) in groups.iter() {
        let (exemplar, rest) = traces
            .split_first()
            .with_context(|| format!("path {} has no traces", path))?;
        for trace in rest {
            compare(exemplar, trace, ids).with_context(|| {
                format!(
                    "{} and {} share path {} but are not isomorphic",
                    exemplar.name(),
                    trace.name(),
                    path
                )
            })?;
        }
    }
    Ok(())
}

fn compare(a: &Trace, b: &Trace, ids: &IdentifierMap) -> anyhow::Result<()> {
    ensure!(
        a.len() == b.len(),
        "lengths differ: {} against {}",
        a.len(),
        b.len()
    );
    for (pos, (x, y)) in a.ops().iter().zip(b.ops()).enumerate() {
        compare_op(a, x, b, y, ids).with_context(|| format!("at position {}", pos))?;
    }
    Ok(())
}

fn compare_op(
    a: &Trace,
    x: &Operation,
    b: &Trace,
    y: &Operation,
    ids: &IdentifierMap,
) -> anyhow::Result<()> {
    ensure!(
        x.signature == y.signature,
        "signature `{}` against `{}`",
        x.signature,
        y.signature
    );
    ensure!(
        x.kind == y.kind,
        "`{}` has kind {} against {}",
        x.signature,
        x.kind,
        y.kind
    );
    ensure!(
        x.operands.len() == y.operands.len(),
        "`{}` has {} operands against {}",
        x.signature,
        x.operands.len(),
        y.operands.len()
    );
    for (slot, (p, q)) in x.operands.iter().zip(&y.operands).enumerate() {
        let (rp, rq) = (reference(a, *p, ids), reference(b, *q, ids));
        if rp != rq {
            bail!(
                "operand {} of `{}` refers to {} against {}",
                slot,
                x.signature,
                rp,
                rq
            );
        }
    }
    let flow = |t: &Trace, op: &Operation| op.comes_from.and_then(|id| t.position_of(id));
    ensure!(
        flow(a, x) == flow(b, y),
        "`{}` follows the test at {:?} against {:?}",
        x.signature,
        flow(a, x),
        flow(b, y)
    );
    Ok(())
}
