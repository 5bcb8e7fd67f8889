//! Data models for notegraph
//!
//! Defines the core value types: NotePath, Note, Link and TextRange.
//! Notes and links carry no behavior of their own; all mutation goes
//! through the reconciliation engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered note metadata (front matter, title, aliases...)
pub type Metadata = BTreeMap<String, String>;

/// Canonical path identifying a note
///
/// Equality is exact string equality. Callers canonicalize before
/// handing paths to the cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotePath(String);

impl NotePath {
    /// Create a new path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NotePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NotePath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for NotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A tracked document, real or placeholder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    /// Canonical path
    pub path: NotePath,
    /// True when the note only exists because something links to it
    pub placeholder: bool,
    /// Parsed metadata (empty for placeholders)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Note {
    /// Create a real note with no metadata
    pub fn new(path: impl Into<NotePath>) -> Self {
        Self {
            path: path.into(),
            placeholder: false,
            metadata: Metadata::new(),
        }
    }

    /// Create a placeholder note
    pub fn placeholder(path: impl Into<NotePath>) -> Self {
        Self {
            path: path.into(),
            placeholder: true,
            metadata: Metadata::new(),
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Zero-based line/character location inside a note
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Span of source text where a reference occurs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

impl TextRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range on a single line
    pub fn on_line(line: u32, start: u32, end: u32) -> Self {
        Self {
            start: Position::new(line, start),
            end: Position::new(line, end),
        }
    }
}

/// A directed edge from one note to another
///
/// Every textual occurrence of the same (source, target) pair is
/// collapsed into a single link carrying several ranges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    /// Note containing the reference
    pub source: NotePath,
    /// Resolved target note
    pub target: NotePath,
    /// Locations of the reference in the source text
    #[serde(default)]
    pub ranges: Vec<TextRange>,
}

impl Link {
    /// Create a link with no recorded ranges
    pub fn new(source: impl Into<NotePath>, target: impl Into<NotePath>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ranges: Vec::new(),
        }
    }

    /// Add a range (builder style)
    pub fn with_range(mut self, range: TextRange) -> Self {
        self.ranges.push(range);
        self
    }

    /// True when the link points back at its own source
    pub fn is_self_link(&self) -> bool {
        self.source == self.target
    }
}

/// Collapse links sharing a target into one link per target
///
/// Ranges are concatenated in first-seen order; exact duplicate ranges
/// are dropped. The result is ordered by target.
pub fn collapse_links(links: Vec<Link>) -> BTreeMap<NotePath, Link> {
    let mut by_target: BTreeMap<NotePath, Link> = BTreeMap::new();
    for link in links {
        match by_target.get_mut(&link.target) {
            Some(existing) => {
                for range in link.ranges {
                    if !existing.ranges.contains(&range) {
                        existing.ranges.push(range);
                    }
                }
            }
            None => {
                by_target.insert(link.target.clone(), link);
            }
        }
    }
    by_target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_new() {
        let note = Note::new("notes/a.md");
        assert_eq!(note.path.as_str(), "notes/a.md");
        assert!(!note.placeholder);
        assert!(note.metadata.is_empty());
    }

    #[test]
    fn test_note_placeholder() {
        let note = Note::placeholder("missing.md");
        assert!(note.placeholder);
        assert!(note.metadata.is_empty());
    }

    #[test]
    fn test_note_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), "Alpha".to_string());
        metadata.insert("aliases".to_string(), "first".to_string());
        let note = Note::new("a.md").with_metadata(metadata);
        let keys: Vec<_> = note.metadata.keys().cloned().collect();
        assert_eq!(keys, vec!["aliases", "title"]);
    }

    #[test]
    fn test_path_equality_is_exact() {
        assert_ne!(NotePath::from("a.md"), NotePath::from("A.md"));
        assert_ne!(NotePath::from("a.md"), NotePath::from("./a.md"));
        assert_eq!(NotePath::from("a.md"), NotePath::new(String::from("a.md")));
    }

    #[test]
    fn test_self_link() {
        assert!(Link::new("a.md", "a.md").is_self_link());
        assert!(!Link::new("a.md", "b.md").is_self_link());
    }

    #[test]
    fn test_collapse_links_merges_ranges() {
        let links = vec![
            Link::new("a.md", "b.md").with_range(TextRange::on_line(0, 0, 5)),
            Link::new("a.md", "c.md").with_range(TextRange::on_line(1, 0, 5)),
            Link::new("a.md", "b.md").with_range(TextRange::on_line(4, 2, 7)),
            Link::new("a.md", "b.md").with_range(TextRange::on_line(0, 0, 5)),
        ];

        let collapsed = collapse_links(links);
        assert_eq!(collapsed.len(), 2);

        let b = &collapsed[&NotePath::from("b.md")];
        assert_eq!(
            b.ranges,
            vec![TextRange::on_line(0, 0, 5), TextRange::on_line(4, 2, 7)]
        );
    }

    #[test]
    fn test_link_serialization() {
        let link = Link::new("a.md", "b.md").with_range(TextRange::on_line(3, 1, 9));
        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("\"source\":\"a.md\""));
        let deserialized: Link = serde_json::from_str(&json).unwrap();
        assert_eq!(link, deserialized);
    }
}
