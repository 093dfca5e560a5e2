//! Stateless full-scan filtering with context-line expansion.
//!
//! [`run_filter`] evaluates every line of a store snapshot against a
//! filter root, then widens the result by `context_lines` around each
//! direct match. Matching is one linear pass and the window expansion is
//! a linear merge, so a pass is O(n) regardless of how many lines match.

use crate::filter::FilterNode;
use crate::store::StoredLine;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::debug;

/// How often a cancellable pass polls its cancellation probe.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// One line of a filtered view.
///
/// `is_context` is true when the line is included only because it lies
/// within the context window of a direct match. Records are produced
/// fresh on every pass and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredLogLine {
    pub number: u64,
    pub text: Arc<str>,
    pub is_context: bool,
}

/// Result of one filter pass.
#[derive(Debug, Clone, Default)]
pub struct FilterPass {
    pub lines: Vec<FilteredLogLine>,
    /// Lines whose evaluation panicked; each was treated as non-matching.
    pub eval_failures: u64,
    pub first_failed_line: Option<u64>,
}

/// Per-line predicate evaluation outcome for a slice of lines.
pub(crate) struct MatchOutcome {
    pub matched: Vec<bool>,
    pub failures: u64,
    pub first_failed_line: Option<u64>,
}

fn safe_match(
    root: Option<&FilterNode>,
    line: &StoredLine,
    failures: &mut u64,
    first_failed_line: &mut Option<u64>,
) -> bool {
    let Some(node) = root else {
        // No filter behaves like a match-all root.
        return true;
    };
    match catch_unwind(AssertUnwindSafe(|| node.is_match(&line.text))) {
        Ok(matched) => matched,
        Err(_) => {
            // Evaluation failures are isolated per line: the line is
            // treated as non-matching and the pass continues.
            *failures += 1;
            if first_failed_line.is_none() {
                *first_failed_line = Some(line.number);
            }
            false
        }
    }
}

/// Evaluates the predicate over `lines` without window expansion.
pub(crate) fn evaluate_lines(lines: &[StoredLine], root: Option<&FilterNode>) -> MatchOutcome {
    let mut matched = Vec::with_capacity(lines.len());
    let mut failures = 0u64;
    let mut first_failed_line = None;
    for line in lines {
        matched.push(safe_match(root, line, &mut failures, &mut first_failed_line));
    }
    MatchOutcome {
        matched,
        failures,
        first_failed_line,
    }
}

/// Marks every index within `context` of a direct match.
///
/// Two linear sweeps (nearest direct match at-or-before, then at-or-after
/// each index) keep this O(n) however dense the matches are.
pub(crate) fn context_inclusion(matched: &[bool], context: usize) -> Vec<bool> {
    let n = matched.len();
    let mut include = vec![false; n];

    let mut last: Option<usize> = None;
    for i in 0..n {
        if matched[i] {
            last = Some(i);
        }
        if let Some(j) = last
            && i - j <= context
        {
            include[i] = true;
        }
    }

    let mut next: Option<usize> = None;
    for i in (0..n).rev() {
        if matched[i] {
            next = Some(i);
        }
        if let Some(j) = next
            && j - i <= context
        {
            include[i] = true;
        }
    }

    include
}

/// Runs a full filter pass over a store snapshot.
///
/// An absent root matches every line, so the output equals the store with
/// every context flag false. `context_lines = 0` returns exactly the
/// direct matches. Output is in ascending line-number order with no
/// duplicates even when context windows overlap.
pub fn run_filter(
    lines: &[StoredLine],
    root: Option<&FilterNode>,
    context_lines: usize,
) -> FilterPass {
    match run_filter_cancellable(lines, root, context_lines, &|| false) {
        Some(pass) => pass,
        // Unreachable: the probe above never requests cancellation.
        None => FilterPass::default(),
    }
}

/// Like [`run_filter`], but polls `should_cancel` periodically and
/// returns `None` without producing output when it fires. Used to
/// abandon a pass that a newer settings change has superseded.
pub fn run_filter_cancellable(
    lines: &[StoredLine],
    root: Option<&FilterNode>,
    context_lines: usize,
    should_cancel: &dyn Fn() -> bool,
) -> Option<FilterPass> {
    let mut matched = Vec::with_capacity(lines.len());
    let mut failures = 0u64;
    let mut first_failed_line = None;

    for (i, line) in lines.iter().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && should_cancel() {
            debug!(scanned = i, total = lines.len(), "filter pass superseded, abandoning");
            return None;
        }
        matched.push(safe_match(root, line, &mut failures, &mut first_failed_line));
    }

    let include = context_inclusion(&matched, context_lines);
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if include[i] {
            out.push(FilteredLogLine {
                number: line.number,
                text: Arc::clone(&line.text),
                is_context: !matched[i],
            });
        }
    }

    Some(FilterPass {
        lines: out,
        eval_failures: failures,
        first_failed_line,
    })
}
