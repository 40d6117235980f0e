//! Synchronizer tuning knobs.

use std::collections::HashSet;
use std::time::Duration;

use tagmesh_types::Subject;

/// Configuration of a [`Synchronizer`](crate::Synchronizer).
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Bound on every network step of an exchange.
    pub timeout: Duration,
    /// Newest statements summarized in one announce.
    pub announce_limit: usize,
    /// Statements asked for in one watermark pull.
    pub pull_limit: usize,
    /// Most statements accepted in, or sent as, one message.
    pub max_statements_per_message: usize,
    /// Peers contacted per gossip round.
    pub peers_per_round: usize,
    /// Peers that newly accepted statements are pushed on to (0 disables).
    pub forward_fanout: usize,
    /// Unsolicited statements accepted per peer per second.
    pub max_statements_per_sec: u64,
    /// Subjects this node stores. `None` accepts every subject.
    pub interest: Option<HashSet<Subject>>,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            announce_limit: 256,
            pull_limit: 512,
            max_statements_per_message: 1024,
            peers_per_round: 3,
            forward_fanout: 2,
            max_statements_per_sec: 500,
            interest: None,
        }
    }
}

impl GossipConfig {
    /// Whether statements about `subject` are wanted here.
    pub fn is_interested(&self, subject: &Subject) -> bool {
        self.interest
            .as_ref()
            .is_none_or(|subjects| subjects.contains(subject))
    }
}
