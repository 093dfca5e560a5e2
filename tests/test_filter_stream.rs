use log_sift::{
    FilterNode, FilterSession, FilterUpdate, FilteredLogLine, StreamEvent, run_filter,
};
use std::sync::mpsc::Receiver;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

/// Consumer-side mirror of the filtered view, built by applying updates
/// in emission order exactly as a UI would.
#[derive(Default)]
struct ViewModel {
    lines: Vec<FilteredLogLine>,
    replaces: usize,
    appends: usize,
    initial_flags: Vec<bool>,
    total: u64,
}

impl ViewModel {
    fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Update(FilterUpdate::Replace {
                lines,
                initial_load_complete,
            }) => {
                self.lines = lines;
                self.replaces += 1;
                self.initial_flags.push(initial_load_complete);
            }
            StreamEvent::Update(FilterUpdate::Append { lines }) => {
                self.appends += 1;
                self.lines.extend(lines);
            }
            StreamEvent::TotalLines(total) => self.total = total,
            StreamEvent::Error(_) => {}
        }
    }
}

/// Applies events until the reported total reaches `expected`. Every
/// update event for those lines precedes its total, so the view is
/// complete when this returns.
fn drain_until_total(rx: &Receiver<StreamEvent>, model: &mut ViewModel, expected: u64) {
    while model.total < expected {
        let event = rx
            .recv_timeout(WAIT)
            .expect("stream event should arrive before timeout");
        model.apply(event);
    }
}

fn drain_until_replace(rx: &Receiver<StreamEvent>, model: &mut ViewModel) {
    let replaces = model.replaces;
    while model.replaces == replaces {
        let event = rx
            .recv_timeout(WAIT)
            .expect("replace should arrive before timeout");
        model.apply(event);
    }
}

/// Applies events until `pred` holds for the view model.
fn drain_until(
    rx: &Receiver<StreamEvent>,
    model: &mut ViewModel,
    pred: impl Fn(&ViewModel) -> bool,
) {
    let deadline = std::time::Instant::now() + WAIT;
    while !pred(model) {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        let event = rx
            .recv_timeout(remaining)
            .expect("stream event should arrive before timeout");
        model.apply(event);
    }
}

fn texts(lines: &[FilteredLogLine]) -> Vec<String> {
    lines.iter().map(|l| l.text.to_string()).collect()
}

#[test]
fn test_initial_replace_is_flagged_once_even_when_empty() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    session.set_filter(Some(FilterNode::substring("nothing")), 0);
    drain_until_replace(&rx, &mut model);

    assert!(model.lines.is_empty());
    assert_eq!(model.initial_flags, vec![true]);

    // A later settings change replaces again, but the flag stays false.
    session.set_filter(Some(FilterNode::substring("still nothing")), 0);
    drain_until_replace(&rx, &mut model);
    assert_eq!(model.initial_flags, vec![true, false]);
}

#[test]
fn test_incremental_appends_match_full_pass_after_every_batch() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    let root = FilterNode::substring("ERROR");
    session.set_filter(Some(root.clone()), 1);
    drain_until_replace(&rx, &mut model);

    let batches: [&[&str]; 4] = [
        &["boot", "ERROR disk", "recovered"],
        &["idle", "idle"],
        &["ERROR net", "retrying", "ok"],
        &["shutdown"],
    ];

    let mut appended = 0u64;
    for batch in batches {
        for text in batch {
            session.append_line(text);
            appended += 1;
        }
        drain_until_total(&rx, &mut model, appended);

        // Incremental-equals-full must hold after every batch of pure
        // appends.
        let snapshot = session.store().lines().to_vec();
        let full = run_filter(&snapshot, Some(&root), 1);
        assert_eq!(model.lines, full.lines);
    }

    // Pure appends never replaced the view after the initial load.
    assert_eq!(model.replaces, 1);
    assert!(model.appends > 0);
}

#[test]
fn test_thousand_lines_appended_equal_one_full_pass() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    let root = FilterNode::substring("needle");
    session.set_filter(Some(root.clone()), 2);
    drain_until_replace(&rx, &mut model);

    // ~1% of lines match; appending in chunks forces many separate
    // incremental passes.
    let mut appended = 0u64;
    for chunk in 0..10 {
        for i in 0..100 {
            let n = chunk * 100 + i;
            if n % 100 == 50 {
                session.append_line(&format!("line {n} with needle inside"));
            } else {
                session.append_line(&format!("line {n}"));
            }
            appended += 1;
        }
        drain_until_total(&rx, &mut model, appended);
    }

    let snapshot = session.store().lines().to_vec();
    let full = run_filter(&snapshot, Some(&root), 2);
    assert_eq!(model.lines, full.lines);
    assert_eq!(model.total, 1000);
    assert_eq!(model.replaces, 1);
}

#[test]
fn test_new_match_pulls_previously_excluded_trailing_context() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    let root = FilterNode::substring("ERROR");
    session.set_filter(Some(root.clone()), 2);
    drain_until_replace(&rx, &mut model);

    // No matches yet: nothing emitted.
    for text in ["a", "b", "c", "d"] {
        session.append_line(text);
    }
    drain_until_total(&rx, &mut model, 4);
    assert!(model.lines.is_empty());

    // The match at line 5 retroactively pulls 3 and 4 in as context.
    session.append_line("ERROR now");
    drain_until_total(&rx, &mut model, 5);

    assert_eq!(texts(&model.lines), vec!["c", "d", "ERROR now"]);
    let context: Vec<bool> = model.lines.iter().map(|l| l.is_context).collect();
    assert_eq!(context, vec![true, true, false]);
    assert_eq!(model.replaces, 1);
}

#[test]
fn test_settings_change_forces_full_replace() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    session.set_filter(Some(FilterNode::substring("alpha")), 0);
    drain_until_replace(&rx, &mut model);

    for text in ["alpha one", "beta two", "gamma three", "beta four"] {
        session.append_line(text);
    }
    drain_until_total(&rx, &mut model, 4);
    assert_eq!(texts(&model.lines), vec!["alpha one"]);

    let new_root = FilterNode::substring("beta");
    session.set_filter(Some(new_root.clone()), 0);
    drain_until_replace(&rx, &mut model);

    assert_eq!(texts(&model.lines), vec!["beta two", "beta four"]);
    let snapshot = session.store().lines().to_vec();
    assert_eq!(model.lines, run_filter(&snapshot, Some(&new_root), 0).lines);
}

#[test]
fn test_widening_context_recomputes_the_whole_view() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    let root = FilterNode::substring("ERROR");
    session.set_filter(Some(root.clone()), 0);
    drain_until_replace(&rx, &mut model);

    for text in ["a", "ERROR x", "b", "c", "ERROR y", "d"] {
        session.append_line(text);
    }
    drain_until_total(&rx, &mut model, 6);
    assert_eq!(texts(&model.lines), vec!["ERROR x", "ERROR y"]);

    session.set_filter(Some(root.clone()), 1);
    drain_until_replace(&rx, &mut model);

    assert_eq!(
        texts(&model.lines),
        vec!["a", "ERROR x", "b", "c", "ERROR y", "d"]
    );
    let context: Vec<bool> = model.lines.iter().map(|l| l.is_context).collect();
    assert_eq!(context, vec![true, false, true, true, false, true]);
}

#[test]
fn test_reset_rearms_the_initial_load_flag() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    session.set_filter(Some(FilterNode::substring("keep")), 0);
    drain_until_replace(&rx, &mut model);
    assert_eq!(model.initial_flags, vec![true]);

    session.append_line("keep me");
    drain_until_total(&rx, &mut model, 1);
    assert_eq!(texts(&model.lines), vec!["keep me"]);

    // Source reset: store cleared, numbering restarts, next replace is an
    // initial load again.
    session.reset();
    session.append_line("keep fresh");
    drain_until(&rx, &mut model, |m| texts(&m.lines) == vec!["keep fresh"]);

    assert_eq!(texts(&model.lines), vec!["keep fresh"]);
    assert_eq!(model.lines[0].number, 1);
    assert_eq!(model.initial_flags.last(), Some(&true));
    assert_eq!(
        model.initial_flags.iter().filter(|f| **f).count(),
        2,
        "one initial flag per activation/reset cycle"
    );
}

#[test]
fn test_lines_racing_a_settings_change_end_up_in_order() {
    // The replace is computed against the store at the moment the pass
    // starts; whatever lands after that snapshot arrives via later
    // events, and the resulting view must still be in original order.
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    for i in 0..50 {
        session.append_line(&format!("early {i}"));
    }
    session.set_filter(None, 0);
    for i in 0..50 {
        session.append_line(&format!("late {i}"));
    }

    drain_until_total(&rx, &mut model, 100);
    assert_eq!(model.lines.len(), 100);
    let numbers: Vec<u64> = model.lines.iter().map(|l| l.number).collect();
    let expected: Vec<u64> = (1..=100).collect();
    assert_eq!(numbers, expected, "view stays in original line order");
}

#[test]
fn test_disabled_root_matches_everything() {
    let mut session = FilterSession::new();
    let rx = session.subscribe();
    let mut model = ViewModel::default();

    let root = FilterNode::substring("nothing matches this").disabled();
    session.set_filter(Some(root), 0);
    drain_until_replace(&rx, &mut model);

    for text in ["a", "b"] {
        session.append_line(text);
    }
    drain_until_total(&rx, &mut model, 2);
    assert_eq!(texts(&model.lines), vec!["a", "b"]);
}
