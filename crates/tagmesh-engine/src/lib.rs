//! Local tag edit API for tagmesh.
//!
//! [`TagNode`] is what a UI gateway calls: `update_tags` to replace a
//! subject's tag set with the user's choice, `get_suggestions` to read the
//! ranked aggregate. Both take the subject as a 40-character hex infohash.

mod error;
mod node;


pub use error::EngineError;
pub use node::{TagNode, UpdateReport, parse_subject};
