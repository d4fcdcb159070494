// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Compilation pipeline: grouping, checks, merging, canonicalization and replay over
//! a fully ingested corpus.

use std::fmt::{Display, Formatter};

use anyhow::Context;
use log::{debug, info};
use trace_model::{SegmentKey, Traces};

use crate::canonicalization::{canonicalize, renumber_dense, IdentifierMap};
use crate::consistency::{check_constant_agreement, check_isomorphism, check_signature_uniqueness};
use crate::control_flow_merge::{merge_paths, MergedProgram};
use crate::path_grouping::{group_by_path, PathGroups};
use crate::replay::replay;

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub check_consistency: bool,
    /// Replay every input trace against the merged programs
    pub verify_replay: bool,
    /// Renumber identifiers to `t000, t001, ...` after canonicalization
    pub dense_ids: bool,
    /// Leaf kinds whose values are measured per segment rather than fixed
    pub measured_leaf_kinds: Vec<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            check_consistency: true,
            verify_replay: true,
            dense_ids: false,
            measured_leaf_kinds: vec!["input".to_string()],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub traces: usize,
    pub operations: usize,
    pub signatures: usize,
    pub frame_paths: usize,
    pub pixel_paths: usize,
    pub instructions: usize,
    pub branches: usize,
    pub replayed: usize,
}

/// The three merged programs of one corpus.
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub extern_program: MergedProgram,
    pub frame_program: MergedProgram,
    pub pixel_program: MergedProgram,
    pub stats: MergeStats,
}

impl CompiledProgram {
    pub fn program_for(&self, key: SegmentKey) -> &MergedProgram {
        match key {
            SegmentKey::Extern => &self.extern_program,
            SegmentKey::Frame(_) => &self.frame_program,
            SegmentKey::Pixel { .. } => &self.pixel_program,
        }
    }

    fn programs(&self) -> [(&'static str, &MergedProgram); 3] {
        [
            ("extern", &self.extern_program),
            ("frame", &self.frame_program),
            ("pixel", &self.pixel_program),
        ]
    }
}

impl Display for CompiledProgram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, (name, program)) in self.programs().into_iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", name)?;
            write!(f, "{}", program)?;
        }
        Ok(())
    }
}

fn run_checks(
    traces: &Traces,
    frames: &PathGroups,
    pixels: &PathGroups,
    ids: &IdentifierMap,
    options: &PipelineOptions,
) -> anyhow::Result<()> {
    check_signature_uniqueness(traces.all()).context("Signature uniqueness check failed")?;
    check_isomorphism(frames, ids).context("Frame isomorphism check failed")?;
    check_isomorphism(pixels, ids).context("Pixel isomorphism check failed")?;
    check_constant_agreement(traces.all(), &options.measured_leaf_kinds)
        .context("Constant agreement check failed")?;
    debug!("consistency checks passed");
    Ok(())
}

/// Compiles a corpus into its extern, frame and pixel programs.
pub fn compile(traces: &Traces, options: &PipelineOptions) -> anyhow::Result<CompiledProgram> {
    let ids = IdentifierMap::from_corpus(traces);
    let frames = group_by_path(traces.frame_traces());
    let pixels = group_by_path(traces.pixel_traces());
    info!(
        "{} frame paths over {} frames, {} pixel paths over {} pixels",
        frames.len(),
        frames.trace_count(),
        pixels.len(),
        pixels.trace_count()
    );

    if options.check_consistency {
        run_checks(traces, &frames, &pixels, &ids, options)?;
    }

    let mut extern_program =
        merge_paths(&[&traces.extern_trace]).context("Failed to merge the extern trace")?;
    let mut frame_program =
        merge_paths(&frames.exemplars()).context("Failed to merge frame paths")?;
    let mut pixel_program =
        merge_paths(&pixels.exemplars()).context("Failed to merge pixel paths")?;

    for program in [&mut extern_program, &mut frame_program, &mut pixel_program] {
        canonicalize(program, &ids);
    }

    let mut compiled = CompiledProgram {
        extern_program,
        frame_program,
        pixel_program,
        stats: MergeStats::default(),
    };

    if options.verify_replay {
        for trace in traces.all().filter(|t| !t.is_empty()) {
            replay(compiled.program_for(trace.key()), trace, &ids)?;
            compiled.stats.replayed += 1;
        }
        debug!("replayed {} traces", compiled.stats.replayed);
    }

    if options.dense_ids {
        renumber_dense(&mut [
            &mut compiled.extern_program,
            &mut compiled.frame_program,
            &mut compiled.pixel_program,
        ]);
    }

    let stats = &mut compiled.stats;
    stats.traces = traces.all().filter(|t| !t.is_empty()).count();
    stats.operations = traces.operation_count();
    stats.signatures = ids.signature_count();
    stats.frame_paths = frames.len();
    stats.pixel_paths = pixels.len();
    let programs = [
        &compiled.extern_program,
        &compiled.frame_program,
        &compiled.pixel_program,
    ];
    stats.instructions = programs.iter().map(|p| p.instruction_count()).sum();
    stats.branches = programs.iter().map(|p| p.branch_count()).sum();

    info!(
        "merged {} operations ({} signatures) into {} instructions with {} branches",
        stats.operations, stats.signatures, stats.instructions, stats.branches
    );
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_model::parse_log;

    const LOG: &str = "\
scalar t001 = 2 # TWO
# BEGIN frame 0
input  t002 = 0.5 # Frame.t
# BEGIN frame 0 pixel 0
input    t003 = 1 # Pixel.x
is_neg.s t004 t003 = false # scene.py:10 x < 0
mul.ss   t005 t001, t003 = 2 # scene.py:11 2 * x
# END frame 0 pixel 0
# BEGIN frame 0 pixel 1
input    t006 = -1 # Pixel.x
is_neg.s t007 t006 = true # scene.py:10 x < 0
neg.s    t008 t006 = 1 # scene.py:13 -x
# END frame 0 pixel 1
# BEGIN frame 0 pixel 2
input    t009 = 3 # Pixel.x
is_neg.s t010 t009 = false # scene.py:10 x < 0
mul.ss   t011 t001, t009 = 6 # scene.py:11 2 * x
# END frame 0 pixel 2
# END frame 0
";

    fn reordered() -> String {
        // pixel 2 recorded before pixel 0 and 1
        let lines: Vec<&str> = LOG.lines().collect();
        let mut out = lines[..3].to_vec();
        out.extend(&lines[13..18]);
        out.extend(&lines[3..13]);
        out.extend(&lines[18..]);
        out.join("\n") + "\n"
    }

    #[test]
    fn compiles_the_branching_corpus() {
        let (traces, _) = parse_log(LOG).unwrap();
        let compiled = compile(&traces, &PipelineOptions::default()).unwrap();

        assert_eq!(
            compiled.to_string(),
            "\
extern:
    scalar t001 = 2 # TWO
    end

frame:
    input t002 = 0.5 # Frame.t
    end

pixel:
    input t003 = 1 # Pixel.x
    br_true(is_neg.s) t004 L0, t003 = true # scene.py:10 x < 0

    mul.ss t005 t001, t003 = 2 # scene.py:11 2 * x
    end
L0:
    neg.s t008 t003 = 1 # scene.py:13 -x
    end
"
        );
        assert_eq!(compiled.stats.replayed, 5);
        assert_eq!(compiled.stats.pixel_paths, 2);
        assert_eq!(compiled.stats.branches, 1);
        assert_eq!(compiled.stats.instructions, 6);
    }

    #[test]
    fn output_does_not_depend_on_segment_order() {
        let (traces, _) = parse_log(LOG).unwrap();
        let (shuffled, _) = parse_log(&reordered()).unwrap();
        let options = PipelineOptions::default();
        assert_eq!(
            compile(&traces, &options).unwrap().to_string(),
            compile(&shuffled, &options).unwrap().to_string()
        );
    }

    #[test]
    fn dense_ids_start_at_zero() {
        let (traces, _) = parse_log(LOG).unwrap();
        let options = PipelineOptions {
            dense_ids: true,
            ..Default::default()
        };
        let compiled = compile(&traces, &options).unwrap();
        let text = compiled.pixel_program.to_string();
        assert!(text.contains("mul.ss t004 t000, t002 = 2"), "{}", text);
        assert!(text.contains("neg.s t005 t002 = 1"), "{}", text);
    }

    #[test]
    fn pixels_may_reuse_identifiers() {
        let text = "\
scalar t001 = 2 # TWO
# BEGIN frame 0
# BEGIN frame 0 pixel 0
input    t002 = 0.5 # Pixel.x
is_neg.s t003 t002 = false # x < 0
mul.ss   t004 t002, t002 = 0.25 # x * x
add.ss   t005 t004, t001 = 2.25 # r
# END frame 0 pixel 0
# BEGIN frame 0 pixel 1
input    t002 = -0.5 # Pixel.x
is_neg.s t003 t002 = true # x < 0
neg.s    t004 t002 = 0.5 # -x
sub.ss   t005 t004, t001 = -1.5 # s
# END frame 0 pixel 1
# END frame 0
";
        let expected = "    input t002 = 0.5 # Pixel.x
    br_true(is_neg.s) t003 L0, t002 = true # x < 0

    mul.ss t006 t002, t002 = 0.25 # x * x
    add.ss t005 t006, t001 = 2.25 # r
    end
L0:
    neg.s t004 t002 = 0.5 # -x
    sub.ss t007 t004, t001 = -1.5 # s
    end
";
        let (traces, _) = parse_log(text).unwrap();
        let compiled = compile(&traces, &PipelineOptions::default()).unwrap();
        assert_eq!(compiled.pixel_program.to_string(), expected);
        assert_eq!(compiled.stats.replayed, 3);

        let unverified = PipelineOptions {
            verify_replay: false,
            ..Default::default()
        };
        let compiled = compile(&traces, &unverified).unwrap();
        assert_eq!(compiled.pixel_program.to_string(), expected);
    }

    #[test]
    fn inconsistent_corpus_is_rejected() {
        let text = "\
# BEGIN frame 0
scalar t001 = 1 # ONE
# END frame 0
# BEGIN frame 1
scalar t002 = 2 # ONE
# END frame 1
";
        let (traces, _) = parse_log(text).unwrap();
        let err = compile(&traces, &PipelineOptions::default()).unwrap_err();
        assert!(format!("{:#}", err).starts_with("Constant agreement check failed"));

        let unchecked = PipelineOptions {
            check_consistency: false,
            verify_replay: false,
            ..Default::default()
        };
        assert!(compile(&traces, &unchecked).is_ok());
    }
}
