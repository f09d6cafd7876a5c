//! Explicit relation paths.
//!
//! A [`RelationPath`] is the parsed form of a dot-separated eager-load or
//! filter path (`"author.publisher"`): an ordered list of relation-name
//! segments. Construction never validates against a registry; resolution
//! does that (see [`RelationGraph::resolve_path`]), so an empty or bogus
//! segment surfaces as an unknown-relation failure at the point of use.
//!
//! [`RelationGraph::resolve_path`]: crate::graph::RelationGraph::resolve_path

use std::fmt;

/// Ordered relation-name segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationPath {
    segments: Vec<String>,
}

impl RelationPath {
    /// Split a dot path into segments. Never fails; empty segments are kept
    /// and rejected during resolution with full context.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment and the remainder, for recursive descent.
    pub fn split_first(&self) -> Option<(&str, RelationPath)> {
        self.segments.split_first().map(|(head, tail)| {
            (
                head.as_str(),
                RelationPath {
                    segments: tail.to_vec(),
                },
            )
        })
    }

    /// The path extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }
}

impl fmt::Display for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<&str> for RelationPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}
