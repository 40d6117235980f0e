//! Reduction of a subject's statement history into its visible tag set.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tagmesh_ledger::Statement;
use tagmesh_types::{AuthorId, Operation, Predicate, Subject};

use crate::error::ResolveError;
use crate::policy::VisibilityPolicy;

/// One visible tag and how many admitted authors currently add it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagScore {
    /// The tag text.
    pub object: String,
    /// Distinct admitted authors whose active operation is ADD.
    pub authors: usize,
}

/// Current visible tag set of one `(subject, predicate)`, ranked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    /// Subject the view describes.
    pub subject: Subject,
    /// Predicate the view describes.
    pub predicate: Predicate,
    /// Visible tags, most-supported first, ties broken lexicographically.
    pub tags: Vec<TagScore>,
}

impl Aggregate {
    /// Reduce a statement slice into the aggregate view.
    ///
    /// Statements about other subjects or predicates are ignored. Within
    /// each edge the statement with the highest clock is active; two
    /// different statements at the same clock fail the whole computation.
    /// The result depends only on the set of statements, not their order.
    pub fn compute(
        subject: Subject,
        predicate: Predicate,
        statements: &[Statement],
        policy: &dyn VisibilityPolicy,
    ) -> Result<Self, ResolveError> {
        // (object, author) identifies the edge within this subject/predicate.
        let mut active: BTreeMap<(&str, AuthorId), &Statement> = BTreeMap::new();

        for s in statements {
            if s.subject != subject || s.predicate != predicate {
                continue;
            }
            match active.entry((s.object.as_str(), s.creator)) {
                Entry::Vacant(slot) => {
                    slot.insert(s);
                }
                Entry::Occupied(mut slot) => {
                    let current = *slot.get();
                    if s.clock > current.clock {
                        slot.insert(s);
                    } else if s.clock == current.clock && s != current {
                        return Err(ResolveError::IntegrityViolation {
                            edge: s.edge().to_string(),
                            clock: s.clock,
                        });
                    }
                }
            }
        }

        let mut support: BTreeMap<&str, usize> = BTreeMap::new();
        for ((object, author), s) in &active {
            if s.operation == Operation::Add && policy.admits(author) {
                *support.entry(*object).or_default() += 1;
            }
        }

        let min_authors = policy.min_authors().max(1);
        let mut tags: Vec<TagScore> = support
            .into_iter()
            .filter(|(_, authors)| *authors >= min_authors)
            .map(|(object, authors)| TagScore {
                object: object.to_string(),
                authors,
            })
            .collect();
        tags.sort_by(|a, b| b.authors.cmp(&a.authors).then_with(|| a.object.cmp(&b.object)));

        Ok(Self {
            subject,
            predicate,
            tags,
        })
    }

    /// Ranked tag texts.
    pub fn suggestions(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.object.clone()).collect()
    }

    /// Whether `object` is currently visible.
    pub fn contains(&self, object: &str) -> bool {
        self.tags.iter().any(|t| t.object == object)
    }

    /// Number of visible tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no tag is visible.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
