//! Anti-entropy gossip for the tagmesh ledger.
//!
//! The [`Synchronizer`] keeps a node's ledger converging with its peers'
//! without assuming any delivery order: insertion is idempotent and the
//! aggregate is a pure function of the ledger, so statements may arrive
//! in any order, any number of times, from any peer.

mod config;
mod error;
mod sync;
mod throttle;

#[cfg(test)]
mod tests;

pub use config::GossipConfig;
pub use error::GossipError;
pub use sync::{IngestReport, SyncReport, Synchronizer};
pub use throttle::PeerThrottle;
