//! Path Codec
//!
//! Pure functions for building, parsing and rebasing the two materialized
//! paths every location carries:
//!
//! - [`MaterializedPath`] - ordered ancestor ids including self, rendered as
//!   `/1/5/2/` in storage
//! - [`IdentificationPath`] - the parallel human-readable path built from
//!   segment keys, rendered as `media/images/banner` (the root renders as `""`)
//!
//! Both paths are manipulated as decoded segment lists. Rebasing a subtree is
//! a slice-prefix replacement, so an empty prefix (moving out from directly
//! under the tree root) cannot accidentally match anywhere else in the path.
//!
//! No storage access happens here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::location::LocationId;

/// Number of leading path segments that do not count towards depth (the root itself)
pub const ROOT_OFFSET: usize = 1;

const PATH_DELIMITER: char = '/';

/// Errors raised when decoding a stored path string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathParseError {
    #[error("Path string is empty")]
    Empty,

    #[error("Path string '{0}' must start and end with '/'")]
    MissingDelimiters(String),

    #[error("Invalid path segment '{segment}' in '{path}'")]
    InvalidSegment { path: String, segment: String },

    #[error("Location {id} appears more than once in path '{path}'")]
    DuplicateSegment { path: String, id: LocationId },
}

/// Replace a leading run of `old_prefix` with `new_prefix`
///
/// Returns `None` when `segments` does not start with `old_prefix`. An empty
/// `old_prefix` matches every list, which is the "moved out from directly
/// under the root" case.
pub fn rebase_segments<T: Clone + PartialEq>(
    segments: &[T],
    old_prefix: &[T],
    new_prefix: &[T],
) -> Option<Vec<T>> {
    let rest = segments.strip_prefix(old_prefix)?;
    Some(new_prefix.iter().chain(rest.iter()).cloned().collect())
}

/// Ordered list of ancestor ids including self, root first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MaterializedPath(Vec<LocationId>);

impl MaterializedPath {
    /// Path of the tree root itself
    pub fn root(id: LocationId) -> Self {
        Self(vec![id])
    }

    /// Build a path from already-decoded segments
    ///
    /// Rejects empty lists and repeated ids.
    pub fn from_segments(segments: Vec<LocationId>) -> Result<Self, PathParseError> {
        if segments.is_empty() {
            return Err(PathParseError::Empty);
        }
        for (index, id) in segments.iter().enumerate() {
            if segments[..index].contains(id) {
                let rendered = Self(segments.clone()).to_string();
                return Err(PathParseError::DuplicateSegment {
                    path: rendered,
                    id: *id,
                });
            }
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[LocationId] {
        &self.0
    }

    /// Append `child_id` to this path (buildChildPath)
    pub fn child(&self, child_id: LocationId) -> Self {
        let mut segments = self.0.clone();
        segments.push(child_id);
        Self(segments)
    }

    /// Segment count minus the root offset
    pub fn depth(&self) -> i64 {
        self.0.len().saturating_sub(ROOT_OFFSET) as i64
    }

    /// The id the path belongs to
    pub fn leaf(&self) -> LocationId {
        // from_segments/root/child never produce an empty list
        self.0[self.0.len() - 1]
    }

    /// Parent id read from the path itself (second-to-last segment)
    ///
    /// Only meaningful for the root of a freshly rebased subtree, whose new
    /// parent is the move destination. Returns `None` for the tree root.
    pub fn parent_id(&self) -> Option<LocationId> {
        self.0.len().checked_sub(2).map(|index| self.0[index])
    }

    /// Ancestor ids, excluding self
    pub fn ancestors(&self) -> &[LocationId] {
        &self.0[..self.0.len() - 1]
    }

    /// True if `root_id` occurs anywhere in the path (isWithinSubtree)
    ///
    /// Relies on ids being unique across the live tree, which makes this
    /// equivalent to a prefix test.
    pub fn contains(&self, root_id: LocationId) -> bool {
        self.0.contains(&root_id)
    }

    /// True if this path lies inside the subtree rooted at `prefix` (inclusive)
    pub fn starts_with(&self, prefix: &MaterializedPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Replace the leading `old_prefix` segments with `new_prefix` (rebasePath)
    pub fn rebase(&self, old_prefix: &[LocationId], new_prefix: &[LocationId]) -> Option<Self> {
        rebase_segments(&self.0, old_prefix, new_prefix).map(Self)
    }

    /// SQL `LIKE` pattern matching this path and every descendant
    pub fn subtree_pattern(&self) -> String {
        format!("{}%", self)
    }
}

impl fmt::Display for MaterializedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", PATH_DELIMITER)?;
        for id in &self.0 {
            write!(f, "{}{}", id, PATH_DELIMITER)?;
        }
        Ok(())
    }
}

impl FromStr for MaterializedPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathParseError::Empty);
        }
        let inner = s
            .strip_prefix(PATH_DELIMITER)
            .and_then(|rest| rest.strip_suffix(PATH_DELIMITER))
            .ok_or_else(|| PathParseError::MissingDelimiters(s.to_string()))?;
        if inner.is_empty() {
            return Err(PathParseError::Empty);
        }

        let segments = inner
            .split(PATH_DELIMITER)
            .map(|segment| {
                segment
                    .parse::<LocationId>()
                    .map_err(|_| PathParseError::InvalidSegment {
                        path: s.to_string(),
                        segment: segment.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_segments(segments)
    }
}

impl From<MaterializedPath> for String {
    fn from(path: MaterializedPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for MaterializedPath {
    type Error = PathParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Human-readable path made of segment keys, one per level below the root
///
/// Segments may be empty. Because an empty single segment and the root both
/// render as `""`, decoding needs the node depth (see [`IdentificationPath::from_stored`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IdentificationPath(Vec<String>);

impl IdentificationPath {
    /// Identification path of the tree root (no segments)
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self(segments.into_iter().map(sanitize_segment).collect())
    }

    /// Decode a stored identification string for a node at `depth`
    pub fn from_stored(stored: &str, depth: i64) -> Self {
        if depth <= 0 {
            return Self::root();
        }
        Self(stored.split(PATH_DELIMITER).map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(sanitize_segment(segment.to_string()));
        Self(segments)
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Same path with the final segment replaced; the root stays the root
    pub fn with_last_segment(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        if let Some(last) = segments.last_mut() {
            *last = sanitize_segment(segment.to_string());
        }
        Self(segments)
    }

    pub fn rebase(&self, old_prefix: &[String], new_prefix: &[String]) -> Option<Self> {
        rebase_segments(&self.0, old_prefix, new_prefix).map(Self)
    }
}

impl fmt::Display for IdentificationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delimiter = PATH_DELIMITER.to_string();
        f.write_str(&self.0.join(&delimiter))
    }
}

/// Segment keys never contain the delimiter
fn sanitize_segment(segment: String) -> String {
    if segment.contains(PATH_DELIMITER) {
        segment.replace(PATH_DELIMITER, "-")
    } else {
        segment
    }
}
