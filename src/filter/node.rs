use super::error::FilterError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Highlight color key assigned to nodes that have not been given one.
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "Default";

fn default_enabled() -> bool {
    true
}

fn default_highlight_color() -> String {
    DEFAULT_HIGHLIGHT_COLOR.to_string()
}

/// A node of the filter predicate tree.
///
/// Every node carries `enabled` and a highlight color key; the variant
/// lives in [`FilterKind`]. A disabled node matches every line so it never
/// constrains the result of a composite it sits in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterNode {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
    kind: FilterKind,
}

/// The closed set of filter variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    /// Case-insensitive containment. Empty text matches everything.
    Substring { text: String },
    /// Regular-expression match. An empty or invalid pattern matches
    /// nothing until corrected; this asymmetry with `Substring` is
    /// deliberate.
    Regex {
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(skip)]
        compiled: Option<Regex>,
    },
    And { children: Vec<FilterNode> },
    Or { children: Vec<FilterNode> },
    Nor { children: Vec<FilterNode> },
    MatchAll,
}

impl FilterKind {
    fn variant_name(&self) -> &'static str {
        match self {
            FilterKind::Substring { .. } => "substring",
            FilterKind::Regex { .. } => "regex",
            FilterKind::And { .. } => "and",
            FilterKind::Or { .. } => "or",
            FilterKind::Nor { .. } => "nor",
            FilterKind::MatchAll => "match_all",
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn compile_pattern(pattern: &str, case_sensitive: bool) -> Option<Regex> {
    // Empty patterns fail closed, unlike empty substrings.
    if pattern.is_empty() {
        return None;
    }
    match RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(%pattern, %err, "invalid regex pattern; filter matches nothing until corrected");
            None
        }
    }
}

impl FilterNode {
    pub fn substring(text: impl Into<String>) -> Self {
        Self::from_kind(FilterKind::Substring { text: text.into() })
    }

    pub fn regex(pattern: impl Into<String>, case_sensitive: bool) -> Self {
        let pattern = pattern.into();
        let compiled = compile_pattern(&pattern, case_sensitive);
        Self::from_kind(FilterKind::Regex {
            pattern,
            case_sensitive,
            compiled,
        })
    }

    pub fn and(children: Vec<FilterNode>) -> Self {
        Self::from_kind(FilterKind::And { children })
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        Self::from_kind(FilterKind::Or { children })
    }

    pub fn nor(children: Vec<FilterNode>) -> Self {
        Self::from_kind(FilterKind::Nor { children })
    }

    pub fn match_all() -> Self {
        Self::from_kind(FilterKind::MatchAll)
    }

    fn from_kind(kind: FilterKind) -> Self {
        Self {
            enabled: true,
            highlight_color: default_highlight_color(),
            kind,
        }
    }

    pub fn with_highlight_color(mut self, key: impl Into<String>) -> Self {
        self.highlight_color = key.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// Serialized variant name, used in error messages.
    pub fn variant_name(&self) -> &'static str {
        self.kind.variant_name()
    }

    /// Evaluates this node against one line of text.
    ///
    /// Disabled nodes are neutral: they match unconditionally. Composites
    /// with no enabled children are vacuously true, including `Or`, which
    /// most boolean-OR semantics would make false. That quirk is kept
    /// as-is.
    pub fn is_match(&self, line: &str) -> bool {
        if !self.enabled {
            return true;
        }
        match &self.kind {
            FilterKind::Substring { text } => text.is_empty() || contains_ci(line, text),
            FilterKind::Regex { compiled, .. } => {
                compiled.as_ref().is_some_and(|re| re.is_match(line))
            }
            FilterKind::And { children } => children
                .iter()
                .filter(|c| c.enabled)
                .all(|c| c.is_match(line)),
            FilterKind::Or { children } => {
                let mut enabled = children.iter().filter(|c| c.enabled).peekable();
                if enabled.peek().is_none() {
                    true
                } else {
                    enabled.any(|c| c.is_match(line))
                }
            }
            FilterKind::Nor { children } => !children
                .iter()
                .filter(|c| c.enabled)
                .any(|c| c.is_match(line)),
            FilterKind::MatchAll => true,
        }
    }

    /// The textual value of a `Substring` or `Regex` node.
    pub fn value(&self) -> Option<&str> {
        match &self.kind {
            FilterKind::Substring { text } => Some(text),
            FilterKind::Regex { pattern, .. } => Some(pattern),
            _ => None,
        }
    }

    /// Replaces the textual value of a `Substring` or `Regex` node.
    ///
    /// Regex nodes recompile their pattern; an invalid replacement leaves
    /// the node matching nothing rather than failing the edit.
    pub fn set_value(&mut self, value: &str) -> Result<(), FilterError> {
        let variant = self.kind.variant_name();
        match &mut self.kind {
            FilterKind::Substring { text } => {
                *text = value.to_string();
                Ok(())
            }
            FilterKind::Regex {
                pattern,
                case_sensitive,
                compiled,
            } => {
                *pattern = value.to_string();
                *compiled = compile_pattern(pattern, *case_sensitive);
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperation(variant)),
        }
    }

    /// One canonical human-readable rendering per node, consumed by
    /// highlighting code.
    pub fn display_text(&self) -> String {
        match &self.kind {
            FilterKind::Substring { text } => format!("\"{text}\""),
            FilterKind::Regex { pattern, .. } => format!("/{pattern}/"),
            FilterKind::And { .. } => "∧".to_string(),
            FilterKind::Or { .. } => "∨".to_string(),
            FilterKind::Nor { .. } => "⊽".to_string(),
            FilterKind::MatchAll => "✱".to_string(),
        }
    }

    pub fn children(&self) -> &[FilterNode] {
        match &self.kind {
            FilterKind::And { children }
            | FilterKind::Or { children }
            | FilterKind::Nor { children } => children,
            _ => &[],
        }
    }

    /// Mutable child list, `None` for leaf variants.
    pub fn children_mut(&mut self) -> Option<&mut Vec<FilterNode>> {
        match &mut self.kind {
            FilterKind::And { children }
            | FilterKind::Or { children }
            | FilterKind::Nor { children } => Some(children),
            _ => None,
        }
    }

    /// Rebuilds the regex caches of this subtree.
    ///
    /// Serialization skips compiled patterns, so this must run after
    /// deserializing a saved tree.
    pub fn recompile(&mut self) {
        match &mut self.kind {
            FilterKind::Regex {
                pattern,
                case_sensitive,
                compiled,
            } => {
                *compiled = compile_pattern(pattern, *case_sensitive);
            }
            FilterKind::And { children }
            | FilterKind::Or { children }
            | FilterKind::Nor { children } => {
                for child in children {
                    child.recompile();
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let node = FilterNode::substring("error");
        assert!(node.is_match("an ERROR occurred"));
        assert!(node.is_match("Error: disk full"));
        assert!(!node.is_match("all good"));
    }

    #[test]
    fn test_empty_substring_matches_everything() {
        let node = FilterNode::substring("");
        assert!(node.is_match("anything"));
        assert!(node.is_match(""));
    }

    #[test]
    fn test_empty_regex_matches_nothing() {
        let node = FilterNode::regex("", false);
        assert!(!node.is_match("anything"));
        assert!(!node.is_match(""));
    }

    #[test]
    fn test_invalid_regex_matches_nothing_until_corrected() {
        let mut node = FilterNode::regex("([unclosed", false);
        assert!(!node.is_match("([unclosed"));

        node.set_value("closed").expect("regex accepts value");
        assert!(node.is_match("now CLOSED properly"));
    }

    #[test]
    fn test_regex_case_sensitivity_flag() {
        let insensitive = FilterNode::regex("error", false);
        assert!(insensitive.is_match("ERROR"));

        let sensitive = FilterNode::regex("error", true);
        assert!(!sensitive.is_match("ERROR"));
        assert!(sensitive.is_match("error"));
    }

    #[test]
    fn test_disabled_node_matches_everything() {
        let node = FilterNode::substring("nope").disabled();
        assert!(node.is_match("unrelated"));
        assert!(node.is_match(""));

        let composite = FilterNode::nor(vec![FilterNode::substring("x")]).disabled();
        assert!(composite.is_match("x marks the spot"));
    }

    #[test]
    fn test_empty_composites_are_vacuously_true() {
        assert!(FilterNode::and(vec![]).is_match("line"));
        assert!(FilterNode::nor(vec![]).is_match("line"));
        // Surprising but preserved: an empty Or matches everything too.
        assert!(FilterNode::or(vec![]).is_match("line"));
    }

    #[test]
    fn test_or_with_only_disabled_children_matches_everything() {
        let node = FilterNode::or(vec![FilterNode::substring("nope").disabled()]);
        assert!(node.is_match("unrelated"));
    }

    #[test]
    fn test_and_requires_every_enabled_child() {
        let node = FilterNode::and(vec![
            FilterNode::substring("error"),
            FilterNode::substring("disk"),
        ]);
        assert!(node.is_match("ERROR: disk full"));
        assert!(!node.is_match("ERROR: out of memory"));

        let with_disabled = FilterNode::and(vec![
            FilterNode::substring("error"),
            FilterNode::substring("disk").disabled(),
        ]);
        assert!(with_disabled.is_match("ERROR: out of memory"));
    }

    #[test]
    fn test_nor_rejects_any_enabled_child_match() {
        let node = FilterNode::nor(vec![
            FilterNode::substring("debug"),
            FilterNode::substring("trace"),
        ]);
        assert!(node.is_match("INFO ready"));
        assert!(!node.is_match("DEBUG noisy"));
    }

    #[test]
    fn test_value_only_supported_on_text_variants() {
        let mut and = FilterNode::and(vec![]);
        assert_eq!(and.value(), None);
        assert_eq!(
            and.set_value("x"),
            Err(FilterError::UnsupportedOperation("and"))
        );

        let mut sub = FilterNode::substring("old");
        assert_eq!(sub.value(), Some("old"));
        sub.set_value("new").expect("substring accepts value");
        assert_eq!(sub.value(), Some("new"));
    }

    #[test]
    fn test_display_text_renders_one_canonical_string() {
        assert_eq!(FilterNode::substring("err").display_text(), "\"err\"");
        assert_eq!(FilterNode::regex("a+", false).display_text(), "/a+/");
        assert_eq!(FilterNode::and(vec![]).display_text(), "∧");
        assert_eq!(FilterNode::or(vec![]).display_text(), "∨");
        assert_eq!(FilterNode::nor(vec![]).display_text(), "⊽");
    }

    #[test]
    fn test_match_all_always_matches() {
        assert!(FilterNode::match_all().is_match(""));
        assert!(FilterNode::match_all().is_match("anything"));
    }
}
