// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, ensure, Context};
use log::debug;
use trace_model::{Signature, Trace};

use super::helpers::{group_reaches, longest_remaining, trace_names, Cursor};
use super::types::{Instruction, LabelId, MergedItem, MergedProgram, Operand};

/// Deferred traces waiting for the active set to reach their signature.
struct Reactivation<'t> {
    label: LabelId,
    traces: Vec<Cursor<'t>>,
}

/// State of one merge invocation.
struct PathMerger<'t> {
    /// Traces advancing in lockstep; all sit at the same signature
    active: Vec<Cursor<'t>>,
    reactivations: BTreeMap<Signature, Reactivation<'t>>,
    output: Vec<MergedItem>,
    /// Placement order of every allocated label, `None` until placed
    labels: Vec<Option<usize>>,
    placed: usize,
    scheduled: BTreeSet<Signature>,
    /// The active set was just promoted from a reactivation and must emit before parking
    promoted: bool,
}

/// Merges one exemplar per distinct path into a single branching program.
///
/// Every exemplar starts at its first operation. The result reproduces each exemplar's
/// operation sequence when replayed along that exemplar's branch outcomes, and
/// schedules each signature exactly once.
pub fn merge_paths(exemplars: &[&Trace]) -> anyhow::Result<MergedProgram> {
    let mut merger = PathMerger::new(exemplars);

    while !merger.active.is_empty() || !merger.reactivations.is_empty() {
        if merger.active.is_empty() {
            merger.promote();
            continue;
        }
        merger.step()?;
    }

    merger.finish(exemplars)
}

impl<'t> PathMerger<'t> {
    fn new(exemplars: &[&'t Trace]) -> Self {
        let mut active: Vec<Cursor<'t>> = exemplars
            .iter()
            .copied()
            .filter(|t| !t.is_empty())
            .map(Cursor::start)
            .collect();
        active.sort_by_key(|c| c.trace.key());
        Self {
            active,
            reactivations: BTreeMap::new(),
            output: Vec::new(),
            labels: Vec::new(),
            placed: 0,
            scheduled: BTreeSet::new(),
            promoted: false,
        }
    }

    fn step(&mut self) -> anyhow::Result<()> {
        let sig0 = self.active[0].signature().clone();

        if let Some(entry) = self.reactivations.remove(&sig0) {
            debug!(
                "[merge] reactivating {} at `{}`",
                trace_names(&entry.traces),
                sig0
            );
            self.place(entry.label);
            self.active.extend(entry.traces);
            self.active.sort_by_key(|c| c.trace.key());
        }

        if let Some(stray) = self.active.iter().find(|c| c.signature() != &sig0) {
            bail!(
                "active set straddles two program points: {} is at `{}` while {} is at `{}`",
                self.active[0].trace.name(),
                sig0,
                stray.trace.name(),
                stray.signature()
            );
        }

        if !self.promoted && self.awaited(&sig0) {
            self.park(sig0);
            return Ok(());
        }
        self.promoted = false;

        let head = self.active[0];
        if head.op().is_test() {
            self.split_at_test(head)?;
        } else {
            self.emit(head)?;
        }

        for cursor in self.active.iter_mut() {
            cursor.advance();
        }
        let before = self.active.len();
        self.active.retain(|c| !c.finished());
        if self.active.is_empty() {
            self.output.push(MergedItem::SegmentEnd);
        } else if self.active.len() != before {
            bail!(
                "traces diverge without a test after `{}`: {} continue to `{}` while others end",
                sig0,
                trace_names(&self.active),
                self.active[0].signature()
            );
        }
        Ok(())
    }

    /// Whether a deferred trace will still arrive at `sig` later on.
    fn awaited(&self, sig: &Signature) -> bool {
        self.reactivations
            .values()
            .any(|entry| group_reaches(&entry.traces, Some(sig)))
    }

    /// Parks the active set at a join point that deferred traces have yet to reach.
    fn park(&mut self, sig: Signature) {
        debug!(
            "[merge] parking {} at join `{}`",
            trace_names(&self.active),
            sig
        );
        let active = std::mem::take(&mut self.active);
        let label = self.reactivation_label(sig, active);
        self.output.push(MergedItem::Jump(label));
    }

    fn split_at_test(&mut self, head: Cursor<'t>) -> anyhow::Result<()> {
        let test = head.op();
        let mut groups: BTreeMap<(bool, Option<&'t Signature>), Vec<Cursor<'t>>> =
            BTreeMap::new();
        for cursor in self.active.drain(..) {
            let outcome = cursor.op().outcome().with_context(|| {
                format!(
                    "test `{}` in {} has no boolean outcome",
                    test.signature,
                    cursor.trace.name()
                )
            })?;
            groups
                .entry((outcome, cursor.next_signature()))
                .or_default()
                .push(cursor);
        }

        ensure!(
            groups.len() <= 2,
            "test `{}` splits its traces into {} groups; only two-way branches are supported: {}",
            test.signature,
            groups.len(),
            groups
                .iter()
                .map(|((outcome, next), g)| format!(
                    "[{} -> {}: {}]",
                    outcome,
                    next.map_or("<end>", |s| s.as_str()),
                    trace_names(g)
                ))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut sides = groups.into_iter();
        let ((first_outcome, first_next), first) =
            sides.next().context("test with no active traces")?;
        let Some(((second_outcome, second_next), second)) = sides.next() else {
            // every trace agrees on what follows: nothing to branch on
            self.active = first;
            return self.emit(head);
        };

        ensure!(
            first_outcome != second_outcome,
            "test `{}` has outcome {} in {} and in {} but they continue at `{}` and `{}`",
            test.signature,
            first_outcome,
            trace_names(&first),
            trace_names(&second),
            first_next.map_or("<end>", |s| s.as_str()),
            second_next.map_or("<end>", |s| s.as_str())
        );

        let (continuing, deferred, deferred_outcome) = match (first_next, second_next) {
            (None, None) => {
                // both sides end at the test
                let mut all = first;
                all.extend(second);
                all.sort_by_key(|c| c.trace.key());
                self.active = all;
                return self.emit(head);
            }
            (Some(_), None) => (second, first, first_outcome),
            (None, Some(_)) => (first, second, second_outcome),
            (Some(_), Some(_)) => {
                let swap =
                    !group_reaches(&first, second_next) && group_reaches(&second, first_next);
                if swap {
                    (second, first, first_outcome)
                } else {
                    (first, second, second_outcome)
                }
            }
        };

        debug!(
            "[merge] branch at `{}`: {} fall through, {} deferred",
            test.signature,
            trace_names(&continuing),
            trace_names(&deferred)
        );

        let mut resumed = deferred;
        for cursor in resumed.iter_mut() {
            cursor.advance();
        }
        let resume_at = resumed[0].signature().clone();
        let label = self.reactivation_label(resume_at, resumed);

        self.schedule(&test.signature)?;
        self.output.push(MergedItem::Instr(Instruction::branch(
            test,
            deferred_outcome,
            label,
            head.trace.key(),
        )));
        self.output.push(MergedItem::Separator);
        self.active = continuing;
        Ok(())
    }

    /// Registers `traces` under `sig`, allocating the entry's label on first use.
    fn reactivation_label(&mut self, sig: Signature, traces: Vec<Cursor<'t>>) -> LabelId {
        if let Some(entry) = self.reactivations.get_mut(&sig) {
            entry.traces.extend(traces);
            return entry.label;
        }
        let label = self.labels.len();
        self.labels.push(None);
        self.reactivations.insert(sig, Reactivation { label, traces });
        label
    }

    /// Picks the next reactivation entry once the active set has run out.
    ///
    /// Entries no other deferred trace is still heading for go first, then the one
    /// holding the longest remaining trace, then the smallest signature.
    fn promote(&mut self) {
        let awaited_by_others = |sig: &Signature| {
            self.reactivations
                .iter()
                .any(|(other, entry)| other != sig && group_reaches(&entry.traces, Some(sig)))
        };
        let free: Vec<&Signature> = self
            .reactivations
            .keys()
            .filter(|sig| !awaited_by_others(sig))
            .collect();
        let candidates: Vec<&Signature> = if free.is_empty() {
            self.reactivations.keys().collect()
        } else {
            free
        };

        let mut chosen = candidates[0];
        let mut best = longest_remaining(&self.reactivations[chosen].traces);
        for sig in &candidates[1..] {
            let len = longest_remaining(&self.reactivations[*sig].traces);
            if len > best {
                best = len;
                chosen = *sig;
            }
        }
        let chosen = chosen.clone();

        let entry = self
            .reactivations
            .remove(&chosen)
            .expect("chosen entry exists");
        debug!(
            "[merge] promoting {} at `{}`",
            trace_names(&entry.traces),
            chosen
        );
        self.place(entry.label);
        self.active = entry.traces;
        self.active.sort_by_key(|c| c.trace.key());
        self.promoted = true;
    }

    fn place(&mut self, label: LabelId) {
        if self.labels[label].is_none() {
            self.labels[label] = Some(self.placed);
            self.placed += 1;
        }
        self.output.push(MergedItem::Label(label));
    }

    fn schedule(&mut self, sig: &Signature) -> anyhow::Result<()> {
        ensure!(
            self.scheduled.insert(sig.clone()),
            "signature `{}` scheduled twice; the traces do not form one acyclic program",
            sig
        );
        Ok(())
    }

    fn emit(&mut self, at: Cursor<'t>) -> anyhow::Result<()> {
        let op = at.op();
        self.schedule(&op.signature)?;
        self.output.push(MergedItem::Instr(Instruction::from_operation(op, at.trace.key())));
        Ok(())
    }

    /// Checks full coverage and renames labels to their placement order.
    fn finish(self, exemplars: &[&Trace]) -> anyhow::Result<MergedProgram> {
        let expected: BTreeSet<&Signature> = exemplars
            .iter()
            .flat_map(|t| t.ops().iter().map(|op| &op.signature))
            .collect();
        ensure!(
            expected.len() == self.scheduled.len()
                && expected.iter().all(|s| self.scheduled.contains(*s)),
            "merge scheduled {} signatures but the exemplars contain {}",
            self.scheduled.len(),
            expected.len()
        );

        let mut order = Vec::with_capacity(self.labels.len());
        for (label, placement) in self.labels.iter().enumerate() {
            match placement {
                Some(p) => order.push(*p),
                None => bail!("label {} was allocated but never placed", label),
            }
        }

        let items = self
            .output
            .into_iter()
            .map(|item| match item {
                MergedItem::Label(l) => MergedItem::Label(order[l]),
                MergedItem::Jump(l) => MergedItem::Jump(order[l]),
                MergedItem::Instr(mut instr) => {
                    for operand in instr.operands.iter_mut() {
                        if let Operand::Label(l) = operand {
                            *l = order[*l];
                        }
                    }
                    MergedItem::Instr(instr)
                }
                other => other,
            })
            .collect();
        Ok(MergedProgram::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalization::IdentifierMap;
    use crate::replay::replay;
    use trace_model::{parse_log, Traces};

    /// One frame holding one pixel per entry of `segments`.
    fn pixels(segments: &[&str]) -> Traces {
        let mut text = String::from("# BEGIN frame 0\n");
        for (pixel, body) in segments.iter().enumerate() {
            text.push_str(&format!("# BEGIN frame 0 pixel {}\n", pixel));
            text.push_str(body);
            text.push_str(&format!("# END frame 0 pixel {}\n", pixel));
        }
        text.push_str("# END frame 0\n");
        parse_log(&text).unwrap().0
    }

    fn merge_pixels(traces: &Traces) -> anyhow::Result<MergedProgram> {
        let exemplars: Vec<&Trace> = traces.pixel_traces().collect();
        merge_paths(&exemplars)
    }

    fn assert_replays(program: &MergedProgram, traces: &Traces) {
        let ids = IdentifierMap::from_corpus(traces);
        for trace in traces.pixel_traces() {
            let matched = replay(program, trace, &ids).unwrap();
            assert_eq!(matched, trace.len());
        }
    }

    fn distinct_signatures(traces: &Traces) -> usize {
        traces
            .pixel_traces()
            .flat_map(|t| t.ops().iter().map(|op| &op.signature))
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn render_items(program: &MergedProgram) -> Vec<String> {
        program.items().iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn shared_prefix_splits_at_the_test() {
        let traces = pixels(&[
            "scalar t001 = 5 # const 5 (first)\n\
             scalar t002 = 5 # const 5 (second)\n\
             is_lt.ss t003 t001, t002 = false # a < b\n\
             add.ss t004 t001, t002 = 10 # X\n",
            "scalar t011 = 5 # const 5 (first)\n\
             scalar t012 = 5 # const 5 (second)\n\
             is_lt.ss t013 t011, t012 = true # a < b\n\
             mul.ss t014 t011, t012 = 25 # Y\n",
        ]);
        let program = merge_pixels(&traces).unwrap();

        assert_eq!(
            program.to_string(),
            "    scalar t001 = 5 # const 5 (first)\n\
             \x20   scalar t002 = 5 # const 5 (second)\n\
             \x20   br_true(is_lt.ss) t003 L0, t001, t002 = true # a < b\n\
             \n\
             \x20   add.ss t004 t001, t002 = 10 # X\n\
             \x20   end\n\
             L0:\n\
             \x20   mul.ss t014 t011, t012 = 25 # Y\n\
             \x20   end\n"
        );
        assert_eq!(program.instruction_count(), 5);
        assert_eq!(program.branch_count(), 1);
        assert_replays(&program, &traces);
    }

    #[test]
    fn diamond_rejoins_through_a_jump() {
        let traces = pixels(&[
            "input t001 = 1 # Pixel.x\n\
             is_neg.s t002 t001 = false # x < 0\n\
             mul.ss t003 t001, t001 = 1 # x * x\n\
             add.ss t004 t001, t001 = 2 # x + x\n\
             neg.s t005 t004 = -2 # -(x + x)\n",
            "input t011 = -1 # Pixel.x\n\
             is_neg.s t012 t011 = true # x < 0\n\
             neg.s t013 t011 = 1 # -x\n\
             add.ss t014 t011, t011 = -2 # x + x\n\
             neg.s t015 t014 = 2 # -(x + x)\n",
        ]);
        let program = merge_pixels(&traces).unwrap();

        assert_eq!(
            program.to_string(),
            "    input t001 = 1 # Pixel.x\n\
             \x20   br_true(is_neg.s) t002 L0, t001 = true # x < 0\n\
             \n\
             \x20   mul.ss t003 t001, t001 = 1 # x * x\n\
             \x20   jump L1\n\
             L0:\n\
             \x20   neg.s t013 t011 = 1 # -x\n\
             L1:\n\
             \x20   add.ss t004 t001, t001 = 2 # x + x\n\
             \x20   neg.s t005 t004 = -2 # -(x + x)\n\
             \x20   end\n"
        );
        // one instruction per distinct signature
        assert_eq!(program.instruction_count(), 6);
        assert_replays(&program, &traces);
    }

    #[test]
    fn agreeing_test_passes_through() {
        let traces = pixels(&[
            "input t001 = 1 # Pixel.x\n\
             is_neg.s t002 t001 = false # x < 0\n\
             mul.ss t003 t001, t001 = 1 # x * x\n",
            "input t011 = 2 # Pixel.x\n\
             is_neg.s t012 t011 = false # x < 0\n\
             mul.ss t013 t011, t011 = 4 # x * x\n",
        ]);
        let program = merge_pixels(&traces).unwrap();

        assert_eq!(program.branch_count(), 0);
        assert_eq!(program.instruction_count(), 3);
        assert!(program
            .to_string()
            .contains("    is_neg.s t002 t001 = false # x < 0\n"));
        assert_replays(&program, &traces);
    }

    #[test]
    fn trace_ending_at_a_test_falls_through() {
        let traces = pixels(&[
            "input t001 = 1 # Pixel.x\n\
             is_neg.s t002 t001 = false # x < 0\n",
            "input t011 = -1 # Pixel.x\n\
             is_neg.s t012 t011 = true # x < 0\n\
             neg.s t013 t011 = 1 # -x\n",
        ]);
        let program = merge_pixels(&traces).unwrap();

        assert_eq!(
            render_items(&program),
            vec![
                "    input t001 = 1 # Pixel.x",
                "    br_true(is_neg.s) t002 L0, t001 = true # x < 0",
                "",
                "    end",
                "L0:",
                "    neg.s t013 t011 = 1 # -x",
                "    end",
            ]
        );
        assert_replays(&program, &traces);
    }

    #[test]
    fn nested_branches_rejoin_in_order() {
        // a; if t1 { b; if t2 { c } else { d }; e } else { f }; g
        let traces = pixels(&[
            "input t001 = 4 # a\n\
             is_neg.s t002 t001 = false # t1\n\
             sqrt.s t003 t001 = 2 # f\n\
             copy.s t004 t001 = 4 # g\n",
            "input t011 = -1 # a\n\
             is_neg.s t012 t011 = true # t1\n\
             neg.s t013 t011 = 1 # b\n\
             is_lt.s t014 t013 = true # t2\n\
             mul.ss t015 t013, t013 = 1 # c\n\
             abs.s t016 t011 = 1 # e\n\
             copy.s t017 t011 = -1 # g\n",
            "input t021 = -3 # a\n\
             is_neg.s t022 t021 = true # t1\n\
             neg.s t023 t021 = 3 # b\n\
             is_lt.s t024 t023 = false # t2\n\
             add.ss t025 t023, t023 = 6 # d\n\
             abs.s t026 t021 = 3 # e\n\
             copy.s t027 t021 = -3 # g\n",
        ]);
        let program = merge_pixels(&traces).unwrap();

        assert_eq!(
            render_items(&program),
            vec![
                "    input t001 = 4 # a",
                "    br_true(is_neg.s) t002 L0, t001 = true # t1",
                "",
                "    sqrt.s t003 t001 = 2 # f",
                "    jump L3",
                "L0:",
                "    neg.s t013 t011 = 1 # b",
                "    br_true(is_lt.s) t014 L1, t013 = true # t2",
                "",
                "    add.ss t025 t023, t023 = 6 # d",
                "    jump L2",
                "L1:",
                "    mul.ss t015 t013, t013 = 1 # c",
                "L2:",
                "    abs.s t016 t011 = 1 # e",
                "L3:",
                "    copy.s t004 t001 = 4 # g",
                "    end",
            ]
        );
        assert_eq!(program.instruction_count(), distinct_signatures(&traces));
        assert_eq!(program.branch_count(), 2);
        assert_replays(&program, &traces);
    }

    #[test]
    fn optional_block_falls_through_its_body() {
        // a; if t1 { b }; c; if t2 { d } else { e }; f
        let traces = pixels(&[
            "input t001 = 3 # a\n\
             is_neg.s t002 t001 = false # t1\n\
             mul.ss t003 t001, t001 = 9 # c\n\
             is_big.s t004 t003 = true # t2\n\
             sqrt.s t005 t003 = 3 # d\n\
             copy.s t006 t001 = 3 # f\n",
            "input t011 = -2 # a\n\
             is_neg.s t012 t011 = true # t1\n\
             neg.s t013 t011 = 2 # b\n\
             mul.ss t014 t011, t011 = 4 # c\n\
             is_big.s t015 t014 = false # t2\n\
             sub.ss t016 t014, t011 = 6 # e\n\
             copy.s t017 t011 = -2 # f\n",
        ]);
        let program = merge_pixels(&traces).unwrap();

        // the side skipping `b` is deferred to `c`, so the branch is taken on false
        assert_eq!(
            render_items(&program),
            vec![
                "    input t001 = 3 # a",
                "    br_false(is_neg.s) t002 L0, t001 = false # t1",
                "",
                "    neg.s t013 t011 = 2 # b",
                "L0:",
                "    mul.ss t003 t001, t001 = 9 # c",
                "    br_true(is_big.s) t004 L1, t003 = true # t2",
                "",
                "    sub.ss t016 t014, t011 = 6 # e",
                "    jump L2",
                "L1:",
                "    sqrt.s t005 t003 = 3 # d",
                "L2:",
                "    copy.s t006 t001 = 3 # f",
                "    end",
            ]
        );
        assert_eq!(program.instruction_count(), distinct_signatures(&traces));
        assert_replays(&program, &traces);
    }

    #[test]
    fn unawaited_entry_is_promoted_before_a_longer_one() {
        // the parked join `j` holds the longer trace but `b` must run first
        let traces = pixels(&[
            "input t001 = 2 # a\n\
             is_neg.s t002 t001 = false # t1\n\
             mul.ss t003 t001, t001 = 4 # c\n\
             add.ss t004 t001, t001 = 4 # j\n\
             is_big.s t005 t004 = true # t2\n\
             sqrt.s t006 t004 = 2 # y1\n\
             neg.s t007 t006 = -2 # y2\n\
             copy.s t008 t007 = -2 # y3\n",
            "input t011 = -1 # a\n\
             is_neg.s t012 t011 = true # t1\n\
             neg.s t013 t011 = 1 # b\n\
             add.ss t014 t011, t011 = -2 # j\n\
             is_big.s t015 t014 = false # t2\n\
             abs.s t016 t014 = 2 # x\n",
        ]);
        let program = merge_pixels(&traces).unwrap();

        assert_eq!(
            render_items(&program),
            vec![
                "    input t001 = 2 # a",
                "    br_true(is_neg.s) t002 L0, t001 = true # t1",
                "",
                "    mul.ss t003 t001, t001 = 4 # c",
                "    jump L1",
                "L0:",
                "    neg.s t013 t011 = 1 # b",
                "L1:",
                "    add.ss t004 t001, t001 = 4 # j",
                "    br_true(is_big.s) t005 L2, t004 = true # t2",
                "",
                "    abs.s t016 t014 = 2 # x",
                "    end",
                "L2:",
                "    sqrt.s t006 t004 = 2 # y1",
                "    neg.s t007 t006 = -2 # y2",
                "    copy.s t008 t007 = -2 # y3",
                "    end",
            ]
        );
        assert_eq!(program.instruction_count(), distinct_signatures(&traces));
        assert_replays(&program, &traces);
    }

    #[test]
    fn rejects_three_way_split() {
        let traces = pixels(&[
            "input t001 = 1 # Pixel.x\nis_neg.s t002 t001 = false # x < 0\nneg.s t003 t001 = -1 # A\n",
            "input t011 = -1 # Pixel.x\nis_neg.s t012 t011 = true # x < 0\nneg.s t013 t011 = 1 # B\n",
            "input t021 = -2 # Pixel.x\nis_neg.s t022 t021 = true # x < 0\nneg.s t023 t021 = 2 # C\n",
        ]);
        let err = merge_pixels(&traces).unwrap_err();
        assert!(err.to_string().contains("into 3 groups"), "{}", err);
    }

    #[test]
    fn rejects_split_with_one_outcome() {
        let traces = pixels(&[
            "input t001 = 1 # Pixel.x\nis_neg.s t002 t001 = false # x < 0\nneg.s t003 t001 = -1 # A\n",
            "input t011 = 2 # Pixel.x\nis_neg.s t012 t011 = false # x < 0\nneg.s t013 t011 = -2 # B\n",
        ]);
        let err = merge_pixels(&traces).unwrap_err();
        assert!(err.to_string().contains("has outcome false"), "{}", err);
    }

    #[test]
    fn rejects_divergence_without_a_test() {
        let traces = pixels(&[
            "input t001 = 1 # Pixel.x\nneg.s t002 t001 = -1 # -x\n",
            "input t011 = 2 # Pixel.x\n",
        ]);
        let err = merge_pixels(&traces).unwrap_err();
        assert!(err.to_string().contains("diverge without a test"), "{}", err);
    }

    #[test]
    fn no_exemplars_merge_to_nothing() {
        let program = merge_paths(&[]).unwrap();
        assert!(program.is_empty());
    }
}
