//! Live incremental filtering over a [`LineStore`].
//!
//! [`FilterStream`] owns a dedicated worker thread fed by a single work
//! queue. Settings changes, new-line notifications, and resets all funnel
//! through that queue, so processing is serialized and every subscriber
//! observes updates in one total order. When the worker wakes it drains
//! the queue first: a burst of line notifications coalesces into one
//! pass, and of several queued settings changes only the last is applied.
//!
//! A full `Replace` pass over a large store is CPU-bound and runs
//! entirely on the worker thread. Passes poll a shared settings epoch and
//! abandon themselves when a newer settings change is already queued, so
//! a stale pass can never clobber a newer one (last writer wins on epoch,
//! not on arrival order).
//!
//! Incremental appends are only taken when they cannot change the
//! inclusion status of any previously emitted line; anything else falls
//! back to a full `Replace`.

use crate::engine::{
    FilteredLogLine, context_inclusion, evaluate_lines, run_filter_cancellable,
};
use crate::filter::FilterNode;
use crate::store::{LineStore, StoredLine};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, trace};

/// A view update emitted to subscribers.
///
/// Updates are totally ordered per subscriber and must be applied in
/// emission order; a `Replace` fully supersedes all prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    /// New lines extending the current view in order.
    Append { lines: Vec<FilteredLogLine> },
    /// A recomputed view replacing everything emitted so far.
    /// `initial_load_complete` is true exactly once after the first
    /// settings application following activation or a reset, even when
    /// the result set is empty.
    Replace {
        lines: Vec<FilteredLogLine>,
        initial_load_complete: bool,
    },
}

/// Recoverable failures surfaced on the subscriber channel.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error(
        "{failures} line(s) failed filter evaluation (first at line {first_line}); each was treated as non-matching"
    )]
    Evaluation { failures: u64, first_line: u64 },

    #[error("line source failed: {message}")]
    Source { message: String },
}

/// Everything a subscriber receives, in one ordered channel: view
/// updates, total-line-count telemetry, and the side error channel.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Update(FilterUpdate),
    TotalLines(u64),
    Error(StreamError),
}

enum Job {
    Settings {
        root: Option<FilterNode>,
        context_lines: usize,
        epoch: u64,
    },
    LinesAppended,
    Reset,
    Subscribe(mpsc::Sender<StreamEvent>),
    SourceError(String),
    Shutdown,
}

/// Cheap cloneable handle for producers and sources: lets a tail-reader
/// thread notify the stream without owning it.
#[derive(Clone)]
pub struct StreamHandle {
    jobs: mpsc::Sender<Job>,
    epoch: Arc<AtomicU64>,
}

impl StreamHandle {
    /// Applies new filter settings. Always forces a full `Replace`: the
    /// context window makes append-only updates unsafe when the predicate
    /// or window size changes.
    pub fn update_filter_settings(&self, root: Option<FilterNode>, context_lines: usize) {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = self.jobs.send(Job::Settings {
            root,
            context_lines,
            epoch,
        });
    }

    /// Signals that lines were appended to the store. Safe to call from
    /// the producer thread; bursts coalesce into a single pass.
    pub fn notify_lines_appended(&self) {
        let _ = self.jobs.send(Job::LinesAppended);
    }

    /// Clears emitted-line bookkeeping and re-arms the initial-load flag;
    /// the next update will be a full `Replace`.
    pub fn reset(&self) {
        let _ = self.jobs.send(Job::Reset);
    }

    /// Surfaces a line-source failure to subscribers. The stream stays
    /// usable for the data already ingested.
    pub fn report_source_error(&self, message: impl Into<String>) {
        let _ = self.jobs.send(Job::SourceError(message.into()));
    }
}

/// Stateful incremental filter over a shared [`LineStore`].
///
/// Dropping the stream shuts the worker down and joins it.
pub struct FilterStream {
    store: Arc<LineStore>,
    handle: StreamHandle,
    worker: Option<JoinHandle<()>>,
}

impl FilterStream {
    pub fn spawn(store: Arc<LineStore>) -> Self {
        let (jobs, rx) = mpsc::channel::<Job>();
        let epoch = Arc::new(AtomicU64::new(0));
        let worker = Worker::new(Arc::clone(&store), Arc::clone(&epoch));
        let join = thread::Builder::new()
            .name("log-sift-filter".into())
            .spawn(move || worker.run(rx))
            .expect("failed to spawn filter worker thread");

        Self {
            store,
            handle: StreamHandle { jobs, epoch },
            worker: Some(join),
        }
    }

    pub fn store(&self) -> &Arc<LineStore> {
        &self.store
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Registers a subscriber. Registration goes through the work queue,
    /// so the new subscriber's first event is a coherent full view.
    pub fn subscribe(&self) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel();
        let _ = self.handle.jobs.send(Job::Subscribe(tx));
        rx
    }

    pub fn update_filter_settings(&self, root: Option<FilterNode>, context_lines: usize) {
        self.handle.update_filter_settings(root, context_lines);
    }

    pub fn notify_lines_appended(&self) {
        self.handle.notify_lines_appended();
    }

    pub fn reset(&self) {
        self.handle.reset();
    }

    pub fn report_source_error(&self, message: impl Into<String>) {
        self.handle.report_source_error(message);
    }
}

impl Drop for FilterStream {
    fn drop(&mut self) {
        let _ = self.handle.jobs.send(Job::Shutdown);
        if let Some(join) = self.worker.take() {
            let _ = join.join();
        }
    }
}

/// Bookkeeping for the incremental path: which lines have been surfaced
/// and how far the store has been processed.
#[derive(Debug, Default)]
struct EmittedState {
    /// Original line numbers already surfaced to subscribers.
    emitted: HashSet<u64>,
    /// Highest line number surfaced so far (0 = none).
    last_emitted: u64,
    /// Highest direct-match line number seen so far (0 = none); its
    /// trailing context window may still claim future lines.
    last_direct: u64,
    /// Highest line number evaluated so far.
    processed: u64,
}

/// Outcome of planning an incremental step.
#[derive(Debug)]
enum IncrementalPlan {
    /// Emit an `Append`: backfill of previously excluded lines (by
    /// number, all above `last_emitted`) followed by qualifying new
    /// lines (`include` flags parallel to the new slice).
    Append {
        backfill: Vec<u64>,
        include: Vec<bool>,
    },
    /// The step would need a line at or below `last_emitted` that was
    /// never emitted; emitting it now would reorder the view, so the
    /// whole pass must be recomputed.
    FallBack,
}

/// Decides whether newly appended lines can be emitted incrementally.
///
/// `new_lines` is the unevaluated tail (numbers above
/// `state.processed`), `matched` its per-line direct-match flags. A new
/// line qualifies when it matches directly, sits in the trailing context
/// window of the last pre-existing direct match, or sits in the window
/// of a new direct match. A new match's leading window may also pull
/// previously excluded lines in as backfill, but only from above
/// `last_emitted`; reaching a non-emitted line at or below it falls
/// back to a full replace.
fn plan_incremental(
    state: &EmittedState,
    new_lines: &[StoredLine],
    matched: &[bool],
    context: usize,
) -> IncrementalPlan {
    let ctx = context as u64;
    let mut include = context_inclusion(matched, context);

    if state.last_direct > 0 {
        for (i, line) in new_lines.iter().enumerate() {
            if line.number > state.last_direct + ctx {
                break;
            }
            include[i] = true;
        }
    }

    let mut backfill = BTreeSet::new();
    for (i, line) in new_lines.iter().enumerate() {
        if !matched[i] {
            continue;
        }
        let start = line.number.saturating_sub(ctx).max(1);
        for number in start..=state.processed {
            if !state.emitted.contains(&number) {
                if number <= state.last_emitted {
                    return IncrementalPlan::FallBack;
                }
                backfill.insert(number);
            }
        }
    }

    IncrementalPlan::Append {
        backfill: backfill.into_iter().collect(),
        include,
    }
}

struct Worker {
    store: Arc<LineStore>,
    epoch: Arc<AtomicU64>,
    subscribers: Vec<mpsc::Sender<StreamEvent>>,
    root: Option<FilterNode>,
    context_lines: usize,
    current_epoch: u64,
    settings_applied: bool,
    needs_full: bool,
    lines_pending: bool,
    initial_load_done: bool,
    state: EmittedState,
    reported_total: Option<u64>,
}

impl Worker {
    fn new(store: Arc<LineStore>, epoch: Arc<AtomicU64>) -> Self {
        Self {
            store,
            epoch,
            subscribers: Vec::new(),
            root: None,
            context_lines: 0,
            current_epoch: 0,
            settings_applied: false,
            needs_full: false,
            lines_pending: false,
            initial_load_done: false,
            state: EmittedState::default(),
            reported_total: None,
        }
    }

    fn run(mut self, rx: mpsc::Receiver<Job>) {
        loop {
            let first = match rx.recv() {
                Ok(job) => job,
                Err(_) => return,
            };

            let mut shutdown = false;
            self.absorb(first, &mut shutdown);
            while !shutdown {
                match rx.try_recv() {
                    Ok(job) => self.absorb(job, &mut shutdown),
                    Err(_) => break,
                }
            }
            if shutdown {
                return;
            }

            self.process_pending();
        }
    }

    fn absorb(&mut self, job: Job, shutdown: &mut bool) {
        match job {
            Job::Settings {
                root,
                context_lines,
                epoch,
            } => {
                self.root = root;
                self.context_lines = context_lines;
                self.current_epoch = epoch;
                self.settings_applied = true;
                self.needs_full = true;
            }
            Job::LinesAppended => self.lines_pending = true,
            Job::Reset => {
                self.state = EmittedState::default();
                self.needs_full = true;
                self.initial_load_done = false;
            }
            Job::Subscribe(tx) => {
                self.subscribers.push(tx);
                // Late subscribers get a coherent full view on the next pass.
                if self.settings_applied {
                    self.needs_full = true;
                }
            }
            Job::SourceError(message) => {
                self.broadcast(StreamEvent::Error(StreamError::Source { message }));
            }
            Job::Shutdown => *shutdown = true,
        }
    }

    fn process_pending(&mut self) {
        if !self.settings_applied {
            // Telemetry mirrors store size even before the first settings
            // application; view updates wait for it.
            if self.lines_pending {
                self.lines_pending = false;
                self.publish_total(self.store.len() as u64);
            }
            return;
        }

        if self.needs_full {
            self.run_full();
        } else if self.lines_pending {
            self.run_incremental();
        }
    }

    fn run_full(&mut self) {
        let pass_epoch = self.current_epoch;
        let snapshot: Vec<StoredLine> = self.store.lines().to_vec();

        let superseded = || self.epoch.load(Ordering::Relaxed) != pass_epoch;
        let Some(pass) = run_filter_cancellable(
            &snapshot,
            self.root.as_ref(),
            self.context_lines,
            &superseded,
        ) else {
            // A newer settings job is already queued; leave flags set and
            // let the next wake recompute against it.
            return;
        };

        self.state.emitted = pass.lines.iter().map(|l| l.number).collect();
        self.state.last_emitted = pass.lines.last().map_or(0, |l| l.number);
        self.state.last_direct = pass
            .lines
            .iter()
            .rev()
            .find(|l| !l.is_context)
            .map_or(0, |l| l.number);
        self.state.processed = snapshot.last().map_or(0, |l| l.number);
        self.needs_full = false;
        self.lines_pending = false;

        let initial_load_complete = !self.initial_load_done;
        self.initial_load_done = true;

        debug!(
            lines = self.state.processed,
            included = pass.lines.len(),
            initial_load_complete,
            "full replace pass"
        );
        let failure = failure_event(pass.eval_failures, pass.first_failed_line);
        self.broadcast(StreamEvent::Update(FilterUpdate::Replace {
            lines: pass.lines,
            initial_load_complete,
        }));
        if let Some(event) = failure {
            self.broadcast(event);
        }
        self.publish_total(self.state.processed);
    }

    fn run_incremental(&mut self) {
        self.lines_pending = false;
        let new_lines = self.store.lines_from(self.state.processed + 1);
        if new_lines.is_empty() {
            self.publish_total(self.state.processed);
            return;
        }

        let outcome = evaluate_lines(&new_lines, self.root.as_ref());
        let plan = plan_incremental(&self.state, &new_lines, &outcome.matched, self.context_lines);
        let (backfill, include) = match plan {
            IncrementalPlan::FallBack => {
                debug!("incremental update would alter emitted lines; replacing view");
                self.needs_full = true;
                self.run_full();
                return;
            }
            IncrementalPlan::Append { backfill, include } => (backfill, include),
        };

        let mut lines = Vec::new();
        if !backfill.is_empty() {
            let guard = self.store.lines();
            for &number in &backfill {
                let index = (number - 1) as usize;
                if index >= guard.len() {
                    // The store was cleared under us; a reset job is queued.
                    return;
                }
                lines.push(FilteredLogLine {
                    number,
                    text: Arc::clone(&guard[index].text),
                    is_context: true,
                });
            }
        }
        for (i, line) in new_lines.iter().enumerate() {
            if include[i] {
                lines.push(FilteredLogLine {
                    number: line.number,
                    text: Arc::clone(&line.text),
                    is_context: !outcome.matched[i],
                });
            }
        }

        for line in &lines {
            self.state.emitted.insert(line.number);
        }
        if let Some(last) = lines.last() {
            self.state.last_emitted = self.state.last_emitted.max(last.number);
        }
        for (i, line) in new_lines.iter().enumerate() {
            if outcome.matched[i] {
                self.state.last_direct = self.state.last_direct.max(line.number);
            }
        }
        self.state.processed = new_lines.last().map_or(self.state.processed, |l| l.number);

        trace!(
            new = new_lines.len(),
            emitted = lines.len(),
            "incremental append pass"
        );
        if !lines.is_empty() {
            self.broadcast(StreamEvent::Update(FilterUpdate::Append { lines }));
        }
        if let Some(event) = failure_event(outcome.failures, outcome.first_failed_line) {
            self.broadcast(event);
        }
        self.publish_total(self.state.processed);
    }

    fn publish_total(&mut self, total: u64) {
        if self.reported_total != Some(total) {
            self.reported_total = Some(total);
            self.broadcast(StreamEvent::TotalLines(total));
        }
    }

    fn broadcast(&mut self, event: StreamEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn failure_event(failures: u64, first_failed_line: Option<u64>) -> Option<StreamEvent> {
    let first_line = first_failed_line?;
    (failures > 0).then_some(StreamEvent::Error(StreamError::Evaluation {
        failures,
        first_line,
    }))
}
