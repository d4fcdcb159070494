// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use anyhow::bail;
use trace_model::{OpId, Signature, Trace};

/// No signature may occur twice within one trace.
pub fn check_signature_uniqueness<'t>(
    traces: impl IntoIterator<Item = &'t Trace>,
) -> anyhow::Result<()> {
    for trace in traces {
        let mut seen: BTreeMap<&Signature, OpId> = BTreeMap::new();
        for op in trace.ops() {
            if let Some(first) = seen.insert(&op.signature, op.result) {
                bail!(
                    "{}: signature `{}` occurs twice, as {} and {}",
                    trace.name(),
                    op.signature,
                    first,
                    op.result
                );
            }
        }
    }
    Ok(())
}
