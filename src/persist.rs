//! JSON persistence of filter trees.
//!
//! A saved profile round-trips every per-node attribute: variant type,
//! textual value, `enabled`, and `highlight_color`. Older saves that
//! predate highlight colors load with the `"Default"` key. Compiled
//! regex caches are not serialized and are rebuilt on load, so a profile
//! containing a pattern that no longer parses loads fine and simply
//! matches nothing until corrected.

use crate::filter::FilterNode;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read filter profile '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write filter profile '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse filter profile: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn tree_from_json(json: &str) -> Result<FilterNode, PersistError> {
    let mut root: FilterNode = serde_json::from_str(json)?;
    root.recompile();
    Ok(root)
}

pub fn tree_to_json(root: &FilterNode) -> Result<String, PersistError> {
    Ok(serde_json::to_string_pretty(root)?)
}

pub fn load_tree(path: &Path) -> Result<FilterNode, PersistError> {
    let json = fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.display().to_string(),
        source,
    })?;
    tree_from_json(&json)
}

pub fn save_tree(root: &FilterNode, path: &Path) -> Result<(), PersistError> {
    let json = tree_to_json(root)?;
    fs::write(path, json).map_err(|source| PersistError::Write {
        path: path.display().to_string(),
        source,
    })
}
