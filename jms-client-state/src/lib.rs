//! JMS Client State - Copy-on-Write Messages and the Client State Tree
//!
//! Two pieces of client-side bookkeeping for a JMS-style messaging client:
//!
//! - [`message`]: message delegates that share one underlying message and
//!   copy only the region (header, properties or body) a delegate writes to
//! - [`state`]: the connection → session → producer/consumer/browser tree
//!   used to find contextual state, tear everything down on close, and
//!   rebind to new server objects after failover
//!
//! # Design Patterns:
//! - Sharing is reference counting; a region is copied on its first write
//!   while shared and never again
//! - Each tree node guards its children with its own lock
//! - Transport, transactions and server objects stay behind traits
//!   ([`RemoteDelegate`], [`ResourceManager`])

pub mod config;
pub mod error;
pub mod message;
pub mod remote;
pub mod resource;
pub mod state;

pub use config::{ClientStateConfig, DuplicateChildPolicy};
pub use error::{ConfigError, MessageError, StateError};
pub use message::{CopyStats, MessageCore, MessageDelegate, Payload, PropertyValue};
pub use remote::RemoteDelegate;
pub use resource::{LocalResourceManager, ResourceManager, TransactionId, XaResource};
pub use state::{
    AcknowledgeMode, CloseReport, ConnectionState, NodeId, NodeKindTag, ResyncReport,
    SessionOptions, StateNode,
};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls leave the existing subscriber
/// in place.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        debug!("Global tracing subscriber already installed");
        return;
    }
    info!("JMS client state v{}", env!("CARGO_PKG_VERSION"));
}
