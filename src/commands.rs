//! Undoable filter-tree mutations.
//!
//! Every edit below the root goes through a [`FilterCommand`] executed by
//! the [`CommandExecutor`], which keeps the undo and redo stacks. The
//! executor only mutates the tree; it deliberately knows nothing about
//! re-filtering. The session that owns both the tree and the stream
//! reacts to the returned outcome, which keeps the trigger explicit
//! instead of hiding it in a callback chain.
//!
//! Root-level set/clear of the tree is outside the undo system; commands
//! whose paths no longer resolve after such a change fail with
//! `InvalidPath` without mutating anything.

use crate::filter::{FilterError, FilterNode, FilterTree, NodePath};

/// A reversible mutation of the filter tree.
///
/// `apply` and `revert` must be symmetric: reverting after a successful
/// apply restores the exact prior tree, and applying again after a revert
/// restores the exact post-apply tree.
pub trait FilterCommand {
    fn apply(&mut self, tree: &mut FilterTree) -> Result<(), FilterError>;
    fn revert(&mut self, tree: &mut FilterTree) -> Result<(), FilterError>;
}

/// Inserts a child node at a fixed index under a composite parent.
pub struct AddChild {
    parent: NodePath,
    index: usize,
    node: FilterNode,
}

impl AddChild {
    pub fn new(parent: NodePath, index: usize, node: FilterNode) -> Self {
        Self {
            parent,
            index,
            node,
        }
    }
}

impl FilterCommand for AddChild {
    fn apply(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let children = tree.children_mut(&self.parent)?;
        if self.index > children.len() {
            return Err(FilterError::InvalidPath(child_path(
                &self.parent,
                self.index,
            )));
        }
        children.insert(self.index, self.node.clone());
        Ok(())
    }

    fn revert(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let children = tree.children_mut(&self.parent)?;
        if self.index >= children.len() {
            return Err(FilterError::InvalidPath(child_path(
                &self.parent,
                self.index,
            )));
        }
        children.remove(self.index);
        Ok(())
    }
}

/// Removes the child at an index; undo restores the exact subtree at the
/// exact prior index.
pub struct RemoveChild {
    parent: NodePath,
    index: usize,
    removed: Option<FilterNode>,
}

impl RemoveChild {
    pub fn new(parent: NodePath, index: usize) -> Self {
        Self {
            parent,
            index,
            removed: None,
        }
    }
}

impl FilterCommand for RemoveChild {
    fn apply(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let children = tree.children_mut(&self.parent)?;
        if self.index >= children.len() {
            return Err(FilterError::InvalidPath(child_path(
                &self.parent,
                self.index,
            )));
        }
        self.removed = Some(children.remove(self.index));
        Ok(())
    }

    fn revert(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let node = self
            .removed
            .take()
            .ok_or_else(|| FilterError::InvalidPath(self.parent.clone()))?;
        let children = match tree.children_mut(&self.parent) {
            Ok(children) => children,
            Err(err) => {
                self.removed = Some(node);
                return Err(err);
            }
        };
        if self.index > children.len() {
            self.removed = Some(node);
            return Err(FilterError::InvalidPath(child_path(
                &self.parent,
                self.index,
            )));
        }
        children.insert(self.index, node);
        Ok(())
    }
}

/// Flips a node's `enabled` flag; its own inverse.
pub struct ToggleEnabled {
    path: NodePath,
}

impl ToggleEnabled {
    pub fn new(path: NodePath) -> Self {
        Self { path }
    }

    fn toggle(&self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let node = tree
            .node_mut(&self.path)
            .ok_or_else(|| FilterError::InvalidPath(self.path.clone()))?;
        node.enabled = !node.enabled;
        Ok(())
    }
}

impl FilterCommand for ToggleEnabled {
    fn apply(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        self.toggle(tree)
    }

    fn revert(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        self.toggle(tree)
    }
}

/// Replaces the textual value of a `Substring` or `Regex` node.
pub struct SetValue {
    path: NodePath,
    value: String,
    previous: Option<String>,
}

impl SetValue {
    pub fn new(path: NodePath, value: impl Into<String>) -> Self {
        Self {
            path,
            value: value.into(),
            previous: None,
        }
    }
}

impl FilterCommand for SetValue {
    fn apply(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let node = tree
            .node_mut(&self.path)
            .ok_or_else(|| FilterError::InvalidPath(self.path.clone()))?;
        let previous = node
            .value()
            .ok_or(FilterError::UnsupportedOperation(node.variant_name()))?
            .to_string();
        node.set_value(&self.value)?;
        self.previous = Some(previous);
        Ok(())
    }

    fn revert(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let previous = self
            .previous
            .take()
            .ok_or_else(|| FilterError::InvalidPath(self.path.clone()))?;
        let node = match tree.node_mut(&self.path) {
            Some(node) => node,
            None => {
                self.previous = Some(previous);
                return Err(FilterError::InvalidPath(self.path.clone()));
            }
        };
        node.set_value(&previous)?;
        self.previous = None;
        Ok(())
    }
}

/// Changes a node's highlight color key.
pub struct SetHighlightColor {
    path: NodePath,
    color: String,
    previous: Option<String>,
}

impl SetHighlightColor {
    pub fn new(path: NodePath, color: impl Into<String>) -> Self {
        Self {
            path,
            color: color.into(),
            previous: None,
        }
    }
}

impl FilterCommand for SetHighlightColor {
    fn apply(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let node = tree
            .node_mut(&self.path)
            .ok_or_else(|| FilterError::InvalidPath(self.path.clone()))?;
        self.previous = Some(std::mem::replace(
            &mut node.highlight_color,
            self.color.clone(),
        ));
        Ok(())
    }

    fn revert(&mut self, tree: &mut FilterTree) -> Result<(), FilterError> {
        let previous = self
            .previous
            .take()
            .ok_or_else(|| FilterError::InvalidPath(self.path.clone()))?;
        let node = match tree.node_mut(&self.path) {
            Some(node) => node,
            None => {
                self.previous = Some(previous);
                return Err(FilterError::InvalidPath(self.path.clone()));
            }
        };
        node.highlight_color = previous;
        Ok(())
    }
}

/// Undo/redo stacks over [`FilterCommand`]s.
#[derive(Default)]
pub struct CommandExecutor {
    undo: Vec<Box<dyn FilterCommand>>,
    redo: Vec<Box<dyn FilterCommand>>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a command, pushes it to the undo stack, and clears the
    /// redo stack. On failure the tree and both stacks are unchanged.
    pub fn execute(
        &mut self,
        mut command: Box<dyn FilterCommand>,
        tree: &mut FilterTree,
    ) -> Result<(), FilterError> {
        command.apply(tree)?;
        self.undo.push(command);
        self.redo.clear();
        Ok(())
    }

    /// Reverts the most recent command. Returns `Ok(false)` when there is
    /// nothing to undo.
    pub fn undo(&mut self, tree: &mut FilterTree) -> Result<bool, FilterError> {
        let Some(mut command) = self.undo.pop() else {
            return Ok(false);
        };
        if let Err(err) = command.revert(tree) {
            self.undo.push(command);
            return Err(err);
        }
        self.redo.push(command);
        Ok(true)
    }

    /// Re-applies the most recently undone command. Returns `Ok(false)`
    /// when there is nothing to redo.
    pub fn redo(&mut self, tree: &mut FilterTree) -> Result<bool, FilterError> {
        let Some(mut command) = self.redo.pop() else {
            return Ok(false);
        };
        if let Err(err) = command.apply(tree) {
            self.redo.push(command);
            return Err(err);
        }
        self.undo.push(command);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

fn child_path(parent: &[usize], index: usize) -> NodePath {
    let mut path = parent.to_vec();
    path.push(index);
    path
}
