//! One live log view: store, filter tree, undo stacks, and stream.
//!
//! [`FilterSession`] owns everything a single view needs and is the only
//! place the filter tree is mutated, so the stream always evaluates
//! cloned snapshots of the root and never races an edit. Each
//! state-changing execute/undo/redo triggers exactly one re-filter; a
//! no-op undo/redo (empty stack) triggers none.

use crate::commands::{CommandExecutor, FilterCommand};
use crate::filter::{FilterError, FilterNode, FilterTree};
use crate::source::LineFeed;
use crate::store::LineStore;
use crate::stream::{FilterStream, StreamEvent};
use std::sync::Arc;
use std::sync::mpsc;

pub struct FilterSession {
    store: Arc<LineStore>,
    stream: FilterStream,
    tree: FilterTree,
    context_lines: usize,
    executor: CommandExecutor,
}

impl FilterSession {
    pub fn new() -> Self {
        let store = Arc::new(LineStore::new());
        let stream = FilterStream::spawn(Arc::clone(&store));
        Self {
            store,
            stream,
            tree: FilterTree::new(),
            context_lines: 0,
            executor: CommandExecutor::new(),
        }
    }

    pub fn store(&self) -> &Arc<LineStore> {
        &self.store
    }

    pub fn tree(&self) -> &FilterTree {
        &self.tree
    }

    pub fn context_lines(&self) -> usize {
        self.context_lines
    }

    pub fn subscribe(&self) -> mpsc::Receiver<StreamEvent> {
        self.stream.subscribe()
    }

    /// Cloneable producer-side handle for line sources.
    pub fn feed(&self) -> LineFeed {
        LineFeed::new(Arc::clone(&self.store), self.stream.handle())
    }

    /// Appends one line and notifies the stream. Returns the assigned
    /// original line number.
    pub fn append_line(&self, text: &str) -> u64 {
        let number = self.store.append_line(text);
        self.stream.notify_lines_appended();
        number
    }

    /// Applies the current tree and context setting to the stream,
    /// forcing a full replace. Called once after building the session and
    /// again by every state-changing edit.
    pub fn apply_filter_settings(&self) {
        self.stream
            .update_filter_settings(self.tree.root().cloned(), self.context_lines);
    }

    /// Replaces or clears the tree root. Deliberately outside the undo
    /// system: recorded commands whose paths no longer resolve fail with
    /// `InvalidPath` instead of corrupting the new tree.
    pub fn set_root(&mut self, root: Option<FilterNode>) {
        self.tree.set_root(root);
        self.apply_filter_settings();
    }

    /// Sets root and context window together with a single settings
    /// application (one replace pass instead of two).
    pub fn set_filter(&mut self, root: Option<FilterNode>, context_lines: usize) {
        self.tree.set_root(root);
        self.context_lines = context_lines;
        self.apply_filter_settings();
    }

    pub fn set_context_lines(&mut self, context_lines: usize) {
        self.context_lines = context_lines;
        self.apply_filter_settings();
    }

    /// Runs an undoable edit against the tree and re-filters on success.
    pub fn execute(&mut self, command: Box<dyn FilterCommand>) -> Result<(), FilterError> {
        self.executor.execute(command, &mut self.tree)?;
        self.apply_filter_settings();
        Ok(())
    }

    /// Undoes the most recent edit. Returns `Ok(false)` (and does not
    /// re-filter) when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, FilterError> {
        let undone = self.executor.undo(&mut self.tree)?;
        if undone {
            self.apply_filter_settings();
        }
        Ok(undone)
    }

    /// Redoes the most recently undone edit. Returns `Ok(false)` (and
    /// does not re-filter) when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool, FilterError> {
        let redone = self.executor.redo(&mut self.tree)?;
        if redone {
            self.apply_filter_settings();
        }
        Ok(redone)
    }

    pub fn can_undo(&self) -> bool {
        self.executor.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.executor.can_redo()
    }

    /// Handles a source reset signal (e.g. the tailed file was
    /// truncated): drops all stored lines, restarts numbering, and forces
    /// the next update to be a fresh initial `Replace`.
    pub fn reset(&self) {
        self.store.clear();
        self.stream.reset();
    }
}

impl Default for FilterSession {
    fn default() -> Self {
        Self::new()
    }
}
