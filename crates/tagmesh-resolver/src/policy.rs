//! Visibility policies: which authors count toward a tag's presence.

use std::collections::HashSet;

use tagmesh_types::AuthorId;

/// Decides whose statements count when reducing a subject's history.
///
/// Membership is exact for a given policy: an object is visible when at
/// least [`min_authors`](VisibilityPolicy::min_authors) admitted authors
/// have an active ADD on it.
pub trait VisibilityPolicy: Send + Sync {
    /// Whether statements by `author` are counted at all.
    fn admits(&self, author: &AuthorId) -> bool;

    /// Distinct admitted ADD authors required before a tag is visible.
    fn min_authors(&self) -> usize {
        1
    }
}

/// Admits every author and shows a tag as soon as one author adds it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPolicy;

impl VisibilityPolicy for OpenPolicy {
    fn admits(&self, _author: &AuthorId) -> bool {
        true
    }
}

/// Threshold policy with an author block list.
#[derive(Debug, Clone, Default)]
pub struct ThresholdPolicy {
    min_authors: usize,
    blocked: HashSet<AuthorId>,
}

impl ThresholdPolicy {
    /// Require `min_authors` distinct authors (values below 1 count as 1).
    pub fn new(min_authors: usize) -> Self {
        Self {
            min_authors: min_authors.max(1),
            blocked: HashSet::new(),
        }
    }

    /// Ignore every statement by `author`.
    pub fn block(mut self, author: AuthorId) -> Self {
        self.blocked.insert(author);
        self
    }
}

impl VisibilityPolicy for ThresholdPolicy {
    fn admits(&self, author: &AuthorId) -> bool {
        !self.blocked.contains(author)
    }

    fn min_authors(&self) -> usize {
        self.min_authors.max(1)
    }
}
