//! Line sources feeding a session.
//!
//! A [`LineFeed`] is the producer-side handle a source writes through:
//! it appends to the store and nudges the stream, and translates a
//! source reset (file truncated) into a store clear plus stream reset.
//! [`read_initial`] performs the one-shot "prepare" read; [`FileTail`]
//! polls a file for appended data on its own thread.

use crate::store::LineStore;
use crate::stream::StreamHandle;
use std::fs::File;
use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Producer-side handle: appends lines and forwards source signals.
#[derive(Clone)]
pub struct LineFeed {
    store: Arc<LineStore>,
    stream: StreamHandle,
}

impl LineFeed {
    pub(crate) fn new(store: Arc<LineStore>, stream: StreamHandle) -> Self {
        Self { store, stream }
    }

    /// Appends one line and notifies the stream; returns its number.
    pub fn append_line(&self, text: &str) -> u64 {
        let number = self.store.append_line(text);
        self.stream.notify_lines_appended();
        number
    }

    /// Source reset: the underlying log restarted (e.g. truncation).
    /// Drops ingested lines and re-arms the stream for a fresh initial
    /// load.
    pub fn reset(&self) {
        self.store.clear();
        self.stream.reset();
    }

    /// Surfaces a source failure on the stream's error channel.
    pub fn report_error(&self, message: impl Into<String>) {
        self.stream.report_source_error(message);
    }
}

/// One-shot initial read: appends every line of `reader` through the
/// feed and returns how many lines were ingested. `observe` is called
/// per line so callers can drive a progress indicator.
pub fn read_initial<R: BufRead>(
    reader: R,
    feed: &LineFeed,
    mut observe: impl FnMut(u64),
) -> std::io::Result<u64> {
    let mut count = 0u64;
    for line in reader.lines() {
        let line = line?;
        feed.append_line(&line);
        count += 1;
        observe(count);
    }
    Ok(count)
}

/// Polling file follower on a dedicated thread.
///
/// Reads appended data since the last poll and splits it into lines; a
/// trailing fragment without a newline is held back until completed. A
/// shrinking file is treated as a source reset: the feed is reset and
/// reading restarts from the beginning. Read errors are reported on the
/// error channel and polling continues, so a transiently unreadable file
/// does not kill the follow.
pub struct FileTail {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FileTail {
    pub fn spawn(path: PathBuf, feed: LineFeed, start_offset: u64, poll: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("log-sift-tail".into())
            .spawn(move || follow(path, feed, start_offset, poll, worker_stop))
            .expect("failed to spawn tail thread");
        Self {
            stop,
            worker: Some(worker),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for FileTail {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn follow(path: PathBuf, feed: LineFeed, start_offset: u64, poll: Duration, stop: Arc<AtomicBool>) {
    let mut offset = start_offset;
    let mut fragment = String::new();

    while !stop.load(Ordering::Relaxed) {
        match poll_once(&path, &feed, offset, &mut fragment) {
            Ok(next_offset) => offset = next_offset,
            Err(err) => {
                warn!(path = %path.display(), %err, "tail poll failed");
                feed.report_error(format!("{}: {err}", path.display()));
            }
        }
        thread::sleep(poll);
    }
}

fn poll_once(
    path: &Path,
    feed: &LineFeed,
    offset: u64,
    fragment: &mut String,
) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut offset = offset;
    if len < offset {
        debug!(path = %path.display(), "file shrank; treating as source reset");
        feed.reset();
        fragment.clear();
        offset = 0;
    }
    if len == offset {
        return Ok(offset);
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut chunk = String::new();
    let read = file.take(len - offset).read_to_string(&mut chunk)?;

    fragment.push_str(&chunk);
    while let Some(newline) = fragment.find('\n') {
        let line: String = fragment.drain(..=newline).collect();
        feed.append_line(line.trim_end_matches(['\n', '\r']));
    }

    Ok(offset + read as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FilterSession;
    use std::io::Cursor;

    #[test]
    fn test_read_initial_counts_and_appends_lines() {
        let session = FilterSession::new();
        let feed = session.feed();

        let reader = Cursor::new("one\ntwo\nthree\n");
        let mut observed = 0;
        let count = read_initial(reader, &feed, |n| observed = n).expect("read");

        assert_eq!(count, 3);
        assert_eq!(observed, 3);
        assert_eq!(session.store().len(), 3);
        assert_eq!(&*session.store().lines()[1].text, "two");
    }

    #[test]
    fn test_feed_reset_clears_store() {
        let session = FilterSession::new();
        let feed = session.feed();
        feed.append_line("stale");
        feed.reset();
        assert!(session.store().is_empty());
        assert_eq!(feed.append_line("fresh"), 1);
    }
}
