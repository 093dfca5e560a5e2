//! The composable filter predicate tree.
//!
//! A filter is a tree of [`FilterNode`]s evaluated against one line of
//! text at a time. Leaves test the line (`Substring`, `Regex`,
//! `MatchAll`); composites combine their children (`And`, `Or`, `Nor`).
//!
//! # Evaluation rules
//!
//! - A disabled node matches everything, so it never constrains the
//!   composite it sits in.
//! - `Substring` is case-insensitive containment; an empty text is
//!   neutral and matches everything.
//! - `Regex` fails closed: an empty or invalid pattern matches nothing
//!   until corrected.
//! - Composites with no enabled children are vacuously true. That holds
//!   for `Or` as well, which is surprising but preserved deliberately.
//!
//! Nodes are addressed by child-index paths ([`NodePath`]) rather than
//! parent back-pointers, so the tree is plain owned data with no cycles.

pub mod error;
pub mod node;
pub mod tree;

pub use error::FilterError;
pub use node::{DEFAULT_HIGHLIGHT_COLOR, FilterKind, FilterNode};
pub use tree::{FilterTree, NodePath};
