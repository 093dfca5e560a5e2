use super::error::FilterError;
use super::node::FilterNode;

/// Address of a node in a [`FilterTree`]: child indices from the root.
///
/// The empty path addresses the root. Paths replace stored parent
/// back-pointers; ownership stays strictly parent→child so the tree can
/// never form a cycle.
pub type NodePath = Vec<usize>;

/// The filter tree owned by an active profile.
///
/// Root-level changes (`set_root`) are deliberate direct mutations outside
/// the undo system; everything below the root is edited through commands.
#[derive(Debug, Clone, Default)]
pub struct FilterTree {
    root: Option<FilterNode>,
}

impl FilterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: FilterNode) -> Self {
        Self { root: Some(root) }
    }

    pub fn root(&self) -> Option<&FilterNode> {
        self.root.as_ref()
    }

    pub fn set_root(&mut self, root: Option<FilterNode>) {
        self.root = root;
    }

    /// Looks up the node at `path`, if the path still resolves.
    pub fn node(&self, path: &[usize]) -> Option<&FilterNode> {
        let mut current = self.root.as_ref()?;
        for &index in path {
            current = current.children().get(index)?;
        }
        Some(current)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut FilterNode> {
        let mut current = self.root.as_mut()?;
        for &index in path {
            current = current.children_mut()?.get_mut(index)?;
        }
        Some(current)
    }

    /// Mutable child list of the node at `path`.
    ///
    /// Fails with `InvalidPath` when the path does not resolve and with
    /// `UnsupportedOperation` when it names a leaf.
    pub fn children_mut(&mut self, path: &[usize]) -> Result<&mut Vec<FilterNode>, FilterError> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| FilterError::InvalidPath(path.to_vec()))?;
        let variant = node.variant_name();
        node.children_mut()
            .ok_or(FilterError::UnsupportedOperation(variant))
    }
}
