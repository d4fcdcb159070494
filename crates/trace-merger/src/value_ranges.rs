// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use trace_model::{Signature, Trace, Value};

/// Observed range of one computed signature, component-wise for vectors and colors.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueRange {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub samples: usize,
}

impl ValueRange {
    fn new(value: &Value) -> Self {
        let components = value.components();
        Self {
            min: components.clone(),
            max: components,
            samples: 1,
        }
    }

    fn widen(&mut self, value: &Value) {
        for (i, c) in value.components().into_iter().enumerate() {
            if let (Some(lo), Some(hi)) = (self.min.get_mut(i), self.max.get_mut(i)) {
                *lo = lo.min(c);
                *hi = hi.max(c);
            }
        }
        self.samples += 1;
    }
}

fn bound(components: &[f64]) -> String {
    match components {
        [single] => single.to_string(),
        many => format!("({})", many.iter().join(" ")),
    }
}

/// Value ranges of every non-constant, non-boolean signature in a set of traces.
#[derive(Clone, Debug, Default)]
pub struct ValueRanges {
    heading: String,
    ranges: BTreeMap<Signature, ValueRange>,
}

impl ValueRanges {
    pub fn collect<'t>(
        heading: &str,
        traces: impl IntoIterator<Item = &'t Trace>,
        measured_leaf_kinds: &[String],
    ) -> Self {
        let mut ranges: BTreeMap<Signature, ValueRange> = BTreeMap::new();
        for op in traces.into_iter().flat_map(|t| t.ops()) {
            if op.is_constant(measured_leaf_kinds) || op.value.components().is_empty() {
                continue;
            }
            ranges
                .entry(op.signature.clone())
                .and_modify(|r| r.widen(&op.value))
                .or_insert_with(|| ValueRange::new(&op.value));
        }
        Self {
            heading: heading.to_string(),
            ranges,
        }
    }

    pub fn get(&self, sig: &Signature) -> Option<&ValueRange> {
        self.ranges.get(sig)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl Display for ValueRanges {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.heading)?;
        writeln!(f)?;
        for (sig, range) in &self.ranges {
            writeln!(
                f,
                "{:<28} {:>28} {:>28}",
                sig.as_str(),
                bound(&range.min),
                bound(&range.max)
            )?;
        }
        Ok(())
    }
}
