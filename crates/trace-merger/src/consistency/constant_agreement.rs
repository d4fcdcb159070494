// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use anyhow::bail;
use trace_model::{Signature, Trace, Value};

#[derive(Default)]
struct Occurrences {
    /// First constant occurrence: value and trace name
    constant: Option<(Value, String)>,
    /// First computed occurrence
    computed: Option<String>,
}

/// Every constant signature carries one value, and is constant wherever it occurs.
pub fn check_constant_agreement<'t>(
    traces: impl IntoIterator<Item = &'t Trace>,
    measured_leaf_kinds: &[String],
) -> anyhow::Result<()> {
    let mut seen: BTreeMap<&Signature, Occurrences> = BTreeMap::new();
    for trace in traces {
        for op in trace.ops() {
            let entry = seen.entry(&op.signature).or_default();
            if op.is_constant(measured_leaf_kinds) {
                if let Some(other) = &entry.computed {
                    bail!(
                        "`{}` is sometimes constant: constant in {}, computed in {}",
                        op.signature,
                        trace.name(),
                        other
                    );
                }
                if let Some((value, other)) = &entry.constant {
                    if !value.identical(&op.value) {
                        bail!(
                            "constant `{}` is {} in {} but {} in {}",
                            op.signature,
                            value,
                            other,
                            op.value,
                            trace.name()
                        );
                    }
                } else {
                    entry.constant = Some((op.value, trace.name()));
                }
            } else {
                if let Some((_, other)) = &entry.constant {
                    bail!(
                        "`{}` is sometimes constant: constant in {}, computed in {}",
                        op.signature,
                        other,
                        trace.name()
                    );
                }
                entry.computed.get_or_insert_with(|| trace.name());
            }
        }
    }
    Ok(())
}
