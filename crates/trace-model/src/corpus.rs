// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use crate::trace::{SegmentKey, Trace};

/// The fully assembled trace corpus of one log.
#[derive(Clone, Debug)]
pub struct Traces {
    /// Operations recorded outside any frame or pixel
    pub extern_trace: Trace,
    /// Indexed by frame number; frames that were never begun are `None`
    pub frames: Vec<Option<Trace>>,
    /// Keyed by (frame, pixel)
    pub pixels: BTreeMap<(u32, u32), Trace>,
}

impl Traces {
    pub fn frame_traces(&self) -> impl Iterator<Item = &Trace> {
        self.frames.iter().flatten()
    }

    pub fn pixel_traces(&self) -> impl Iterator<Item = &Trace> {
        self.pixels.values()
    }

    /// Every trace in canonical order: extern, frames ascending, pixels ascending.
    pub fn all(&self) -> impl Iterator<Item = &Trace> {
        std::iter::once(&self.extern_trace)
            .chain(self.frame_traces())
            .chain(self.pixel_traces())
    }

    pub fn get(&self, key: SegmentKey) -> Option<&Trace> {
        match key {
            SegmentKey::Extern => Some(&self.extern_trace),
            SegmentKey::Frame(n) => self.frames.get(n as usize).and_then(|f| f.as_ref()),
            SegmentKey::Pixel { frame, pixel } => self.pixels.get(&(frame, pixel)),
        }
    }

    pub fn operation_count(&self) -> usize {
        self.all().map(Trace::len).sum()
    }
}
