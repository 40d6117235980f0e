//! [`TagNode`]: the local edit API.
//!
//! A node turns a user's desired tag set for a subject into signed,
//! clocked statements: it diffs the desired set against the current
//! aggregate view, appends one statement per changed tag, and hands the
//! new statements to the synchronizer for dissemination.

use std::collections::BTreeSet;
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use tagmesh_gossip::Synchronizer;
use tagmesh_ledger::{Ledger, Statement};
use tagmesh_resolver::Resolver;
use tagmesh_types::{Operation, Predicate, Subject, validate_tag};
use tracing::{debug, info};

use crate::error::EngineError;

type Result<T> = std::result::Result<T, EngineError>;

/// Parse a subject from its 40-character hex rendering.
pub fn parse_subject(s: &str) -> Result<Subject> {
    Subject::from_hex(s).map_err(|e| EngineError::Malformed(format!("invalid infohash: {e}")))
}

/// Statements created by one [`TagNode::update_tags`] call.
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    /// Tags that got an ADD statement.
    pub added: Vec<String>,
    /// Tags that got a REMOVE statement.
    pub removed: Vec<String>,
    /// Every statement created, in creation order.
    pub statements: Vec<Statement>,
}

impl UpdateReport {
    /// Whether the call changed nothing.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Local entry point for reading and editing tags.
pub struct TagNode {
    resolver: Arc<Resolver>,
    sync: Option<Arc<Synchronizer>>,
}

impl TagNode {
    /// Create a node without networking. Edits stay local until a
    /// synchronizer picks them up from the ledger.
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            sync: None,
        }
    }

    /// Publish new statements through `sync` as soon as they are created.
    pub fn with_synchronizer(mut self, sync: Arc<Synchronizer>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// The node's resolver.
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// The node's ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        self.resolver.ledger()
    }

    /// Make the visible tag set of `subject` equal `new_objects`.
    ///
    /// Every tag in the desired set but not visible gets an ADD by the
    /// signing author; every visible tag missing from it gets a REMOVE on
    /// the signing author's own edge. The subject and every tag are
    /// validated before any statement is built, so a rejected call leaves
    /// the ledger untouched.
    pub async fn update_tags<I, S>(
        &self,
        subject: &str,
        predicate: Predicate,
        new_objects: I,
        signing_key: &SigningKey,
    ) -> Result<UpdateReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subject = parse_subject(subject)?;
        let mut desired = BTreeSet::new();
        for object in new_objects {
            let object = object.as_ref();
            validate_tag(object)?;
            desired.insert(object.to_string());
        }

        let current: BTreeSet<String> = self
            .resolver
            .aggregate(&subject, predicate)?
            .tags
            .iter()
            .map(|t| t.object.clone())
            .collect();

        let mut report = UpdateReport::default();
        let ledger = self.ledger();
        for object in desired.difference(&current) {
            let statement =
                ledger.append_local(subject, predicate, object, Operation::Add, signing_key)?;
            report.added.push(object.clone());
            report.statements.push(statement);
        }
        for object in current.difference(&desired) {
            let statement =
                ledger.append_local(subject, predicate, object, Operation::Remove, signing_key)?;
            report.removed.push(object.clone());
            report.statements.push(statement);
        }

        if report.is_empty() {
            debug!(%subject, "tag set unchanged");
            return Ok(report);
        }

        self.resolver.invalidate(&subject);
        info!(
            %subject,
            added = report.added.len(),
            removed = report.removed.len(),
            "updated tags"
        );
        if let Some(sync) = &self.sync {
            sync.publish(&report.statements).await;
        }
        Ok(report)
    }

    /// Ranked visible tags of `subject`. Pure read.
    pub fn get_suggestions(&self, subject: &str, predicate: Predicate) -> Result<Vec<String>> {
        let subject = parse_subject(subject)?;
        Ok(self.resolver.suggestions(&subject, predicate)?)
    }

    /// Every statement ever accepted about `subject`, grouped by edge.
    pub fn history(&self, subject: &str, predicate: Predicate) -> Result<Vec<Statement>> {
        let subject = parse_subject(subject)?;
        Ok(self.resolver.history(&subject, predicate)?)
    }
}
