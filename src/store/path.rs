use std::fmt;

use super::StoreError;

/// Characters the store refuses inside a path segment.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']', '/'];

/// A validated, slash-separated location in the record tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parses `a/b/c`. Leading and trailing slashes are ignored; empty
    /// segments are not.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::MalformedPath(format!(
                "'{}' has no segments",
                path
            )));
        }

        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            validate_segment(segment, path)?;
            segments.push(segment.to_string());
        }

        Ok(Self { segments })
    }

    /// `users/{user}/{collection}`.
    pub fn collection(user: &str, collection: &str) -> Result<Self, StoreError> {
        Self::parse("users")?.child(user)?.child(collection)
    }

    /// Appends a single segment.
    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        validate_segment(segment, &format!("{}/{}", self, segment))?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> &str {
        // parse/child never produce an empty path
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True when `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &StorePath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// True when a change at `self` can alter the value seen at `other`.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

fn validate_segment(segment: &str, full: &str) -> Result<(), StoreError> {
    if segment.is_empty() {
        return Err(StoreError::MalformedPath(format!(
            "'{}' contains an empty segment",
            full
        )));
    }
    if segment
        .chars()
        .any(|c| FORBIDDEN.contains(&c) || c.is_control())
    {
        return Err(StoreError::MalformedPath(format!(
            "'{}' contains a forbidden character",
            full
        )));
    }
    Ok(())
}
