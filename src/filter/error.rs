use thiserror::Error;

/// Errors from filter-tree operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter node of type '{0}' does not carry a textual value")]
    UnsupportedOperation(&'static str),

    #[error("no filter node at path {0:?}")]
    InvalidPath(Vec<usize>),
}
