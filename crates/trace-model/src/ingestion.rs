// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

//! Trace ingestion
//!
//! Splits a linear execution log into the extern trace, per-frame traces and
//! per-pixel traces. A log line is either a record
//!
//! ```text
//! add.ss   t012 t003, t007 = 0.25 # scene.py:88 ray.origin + t
//! ```
//!
//! or a segment marker (`# BEGIN frame 3`, `# END frame 3 pixel 17`). Lines that are
//! neither are reported and skipped; everything else that is inconsistent is fatal.

use std::collections::BTreeMap;
use std::path::Path as FsPath;

use anyhow::{bail, ensure, Context};
use itertools::Itertools;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::corpus::Traces;
use crate::operation::{OpId, OpKind, Operation, Signature};
use crate::trace::{SegmentKey, TraceBuilder};
use crate::value::Value;

static RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<kind>index \d+|\S+)\s+(?P<result>[A-Za-z_]*\d+)(?:\s+(?P<operands>[A-Za-z_]*\d+(?:\s*,\s*[A-Za-z_]*\d+)*))?\s+=\s+(?P<value>.+?)\s+#\s+(?P<sig>\S.*)$",
    )
    .expect("record pattern is valid")
});

/// Frames live in a table indexed by frame number; markers at or beyond this are rejected.
const MAX_FRAMES: u32 = 1 << 20;

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#\s*(?P<edge>BEGIN|END)\s+frame\s+(?P<frame>\d+)(?:\s+pixel\s+(?P<pixel>\d+))?$")
        .expect("marker pattern is valid")
});

/// Summary of what ingestion accepted and skipped.
#[derive(Debug, Default, Clone)]
pub struct IngestionReport {
    pub lines: usize,
    pub records: usize,
    /// (1-based line number, line text) of every skipped line
    pub skipped: Vec<(usize, String)>,
}

enum Line {
    Record(Operation),
    Begin(SegmentKey),
    End(SegmentKey),
}

fn classify(line: &str) -> Option<anyhow::Result<Line>> {
    if let Some(caps) = MARKER.captures(line) {
        let frame: u32 = caps["frame"].parse().ok()?;
        let key = match caps.name("pixel") {
            Some(p) => SegmentKey::Pixel {
                frame,
                pixel: p.as_str().parse().ok()?,
            },
            None => SegmentKey::Frame(frame),
        };
        return Some(Ok(if &caps["edge"] == "BEGIN" {
            Line::Begin(key)
        } else {
            Line::End(key)
        }));
    }
    let caps = RECORD.captures(line)?;
    let value: Value = caps["value"].parse().ok()?;
    Some(parse_record(&caps, value))
}

fn parse_record(caps: &Captures, value: Value) -> anyhow::Result<Line> {
    let operands = match caps.name("operands") {
        Some(list) => list
            .as_str()
            .split(',')
            .map(|o| o.trim().parse::<OpId>())
            .collect::<anyhow::Result<Vec<_>>>()?,
        None => vec![],
    };
    Ok(Line::Record(Operation::new(
        caps["result"].parse()?,
        OpKind::new(&caps["kind"]),
        operands,
        value,
        Signature::new(caps["sig"].trim()),
    )))
}

struct Ingestor {
    extern_trace: TraceBuilder,
    frames: Vec<Option<TraceBuilder>>,
    pixels: BTreeMap<(u32, u32), TraceBuilder>,
    open_frame: Option<u32>,
    open_pixel: Option<u32>,
}

impl Ingestor {
    fn new() -> Self {
        Self {
            extern_trace: TraceBuilder::new(SegmentKey::Extern),
            frames: Vec::new(),
            pixels: BTreeMap::new(),
            open_frame: None,
            open_pixel: None,
        }
    }

    fn current(&mut self) -> &mut TraceBuilder {
        match (self.open_frame, self.open_pixel) {
            (Some(frame), Some(pixel)) => self
                .pixels
                .get_mut(&(frame, pixel))
                .expect("open pixel has a builder"),
            (Some(frame), None) => self.frames[frame as usize]
                .as_mut()
                .expect("open frame has a builder"),
            _ => &mut self.extern_trace,
        }
    }

    fn builder(&self, key: SegmentKey) -> Option<&TraceBuilder> {
        match key {
            SegmentKey::Extern => Some(&self.extern_trace),
            SegmentKey::Frame(n) => self.frames.get(n as usize).and_then(|f| f.as_ref()),
            SegmentKey::Pixel { frame, pixel } => self.pixels.get(&(frame, pixel)),
        }
    }

    /// Whether `id` was recorded in `key` or in a segment enclosing it.
    fn in_scope(&self, key: SegmentKey, id: OpId) -> bool {
        key.scope().any(|k| self.builder(k).map_or(false, |b| b.contains(id)))
    }

    fn begin(&mut self, key: SegmentKey) -> anyhow::Result<()> {
        match key {
            SegmentKey::Frame(n) => {
                ensure!(
                    self.open_frame.is_none(),
                    "BEGIN {} while frame {} is still open",
                    key,
                    self.open_frame.unwrap_or_default()
                );
                ensure!(
                    n < MAX_FRAMES,
                    "frame number {} exceeds the supported maximum of {}",
                    n,
                    MAX_FRAMES - 1
                );
                let idx = n as usize;
                if self.frames.len() <= idx {
                    self.frames.resize_with(idx + 1, || None);
                }
                ensure!(self.frames[idx].is_none(), "{} begun twice", key);
                self.frames[idx] = Some(TraceBuilder::new(key));
                self.open_frame = Some(n);
            }
            SegmentKey::Pixel { frame, pixel } => {
                ensure!(
                    self.open_frame == Some(frame) && self.open_pixel.is_none(),
                    "BEGIN {} outside of an open frame {}",
                    key,
                    frame
                );
                ensure!(!self.pixels.contains_key(&(frame, pixel)), "{} begun twice", key);
                self.pixels.insert((frame, pixel), TraceBuilder::new(key));
                self.open_pixel = Some(pixel);
            }
            SegmentKey::Extern => unreachable!("markers never name the extern segment"),
        }
        debug!("begin {}", key);
        Ok(())
    }

    fn end(&mut self, key: SegmentKey) -> anyhow::Result<()> {
        let open = self.current().key();
        ensure!(open == key, "END {} does not match the open segment {}", key, open);
        match key {
            SegmentKey::Pixel { .. } => self.open_pixel = None,
            _ => self.open_frame = None,
        }
        debug!("end {}", key);
        Ok(())
    }

    fn record(&mut self, op: Operation) -> anyhow::Result<()> {
        let key = self.current().key();
        if let Some(unknown) = op.operands.iter().find(|o| !self.in_scope(key, **o)) {
            bail!(
                "{}: operand {} of {} `{}` was never defined",
                key,
                unknown,
                op.result,
                op.signature
            );
        }
        self.current().push(op)
    }

    fn finish(self) -> anyhow::Result<Traces> {
        if self.open_frame.is_some() {
            let open = match (self.open_frame, self.open_pixel) {
                (Some(frame), Some(pixel)) => SegmentKey::Pixel { frame, pixel },
                (Some(frame), None) => SegmentKey::Frame(frame),
                _ => SegmentKey::Extern,
            };
            bail!("log ended inside {}", open);
        }
        Ok(Traces {
            extern_trace: self.extern_trace.finish(),
            frames: self
                .frames
                .into_iter()
                .map(|f| f.map(TraceBuilder::finish))
                .collect(),
            pixels: self
                .pixels
                .into_iter()
                .map(|(k, b)| (k, b.finish()))
                .collect(),
        })
    }
}

/// Parses a whole execution log into a trace corpus.
pub fn parse_log(text: &str) -> anyhow::Result<(Traces, IngestionReport)> {
    let mut ingestor = Ingestor::new();
    let mut report = IngestionReport::default();

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        report.lines += 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match classify(line) {
            None => {
                warn!("line {}: unrecognized input `{}`, skipping", lineno, line);
                report.skipped.push((lineno, line.to_string()));
            }
            Some(parsed) => {
                let result = parsed.and_then(|l| match l {
                    Line::Record(op) => {
                        report.records += 1;
                        ingestor.record(op)
                    }
                    Line::Begin(key) => ingestor.begin(key),
                    Line::End(key) => ingestor.end(key),
                });
                result.with_context(|| format!("line {}: `{}`", lineno, line))?;
            }
        }
    }

    let traces = ingestor.finish()?;
    info!(
        "ingested {} records: extern {} ops, {} frames, {} pixels, {} lines skipped",
        report.records,
        traces.extern_trace.len(),
        traces.frame_traces().count(),
        traces.pixels.len(),
        report.skipped.len()
    );
    if !report.skipped.is_empty() {
        debug!(
            "skipped lines: {}",
            report.skipped.iter().map(|(n, _)| n).join(", ")
        );
    }
    Ok((traces, report))
}

/// Reads and parses a log file.
pub fn read_log(path: &FsPath) -> anyhow::Result<(Traces, IngestionReport)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_log(&text).with_context(|| format!("Failed to ingest {}", path.display()))
}
