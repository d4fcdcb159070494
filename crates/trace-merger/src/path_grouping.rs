// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use log::debug;
use trace_model::{Path, Trace};

/// Traces of one segment kind bucketed by the path they took.
///
/// Buckets are sorted by segment key, so the exemplar of a path is the trace with the
/// smallest key regardless of the order traces were recorded in.
#[derive(Debug, Default)]
pub struct PathGroups<'t> {
    groups: BTreeMap<Path, Vec<&'t Trace>>,
}

impl<'t> PathGroups<'t> {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[&'t Trace])> {
        self.groups.iter().map(|(path, traces)| (path, traces.as_slice()))
    }

    pub fn get(&self, path: &Path) -> Option<&[&'t Trace]> {
        self.groups.get(path).map(Vec::as_slice)
    }

    /// One trace per path, in path order.
    pub fn exemplars(&self) -> Vec<&'t Trace> {
        self.groups.values().map(|traces| traces[0]).collect()
    }

    pub fn trace_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Buckets `traces` by path. Empty traces carry no program and are left out.
pub fn group_by_path<'t>(traces: impl IntoIterator<Item = &'t Trace>) -> PathGroups<'t> {
    let mut groups: BTreeMap<Path, Vec<&'t Trace>> = BTreeMap::new();
    for trace in traces.into_iter().filter(|t| !t.is_empty()) {
        groups.entry(trace.path()).or_default().push(trace);
    }
    for (path, traces) in groups.iter_mut() {
        traces.sort_by_key(|t| t.key());
        debug!("path {}: {} traces, exemplar {}", path, traces.len(), traces[0].name());
    }
    PathGroups { groups }
}
