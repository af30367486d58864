//! Client state tree.
//!
//! A connection node owns sessions; a session owns producers, consumers
//! and browsers.  See [`node`] for the tree rules.

pub mod connection;
pub mod endpoint;
pub mod node;
pub mod session;

pub use connection::ConnectionState;
pub use endpoint::{BrowserState, ConsumerState, ProducerSettings, ProducerState};
pub use node::{CloseReport, NodeId, NodeKind, NodeKindTag, ResyncReport, StateNode};
pub use session::{AcknowledgeMode, SessionOptions, SessionState};
