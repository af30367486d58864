//! Resource Manager Link - Local Transaction Ids for Sessions
//!
//! A transacted session must have a current transaction id bound from the
//! moment it exists.  The id comes from the connection's resource manager,
//! which is an external collaborator reached through [`ResourceManager`].
//! [`LocalResourceManager`] is an in-process implementation with an
//! optional cap on how many ids may be active at once.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ClientStateConfig;
use crate::error::StateError;
use crate::remote::RemoteDelegate;
use crate::state::node::NodeId;

/// A local transaction id handed out by a resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-tx-{}", self.0)
    }
}

/// Allocates and tracks transaction ids.
pub trait ResourceManager: Send + Sync + fmt::Debug {
    /// Allocate a fresh local transaction id.
    ///
    /// Fails with [`StateError::ResourceAllocation`] when none is available.
    fn create_local_transaction_id(&self) -> Result<TransactionId, StateError>;

    /// Hand an id back, e.g. when session construction is rolled back or
    /// a transacted session closes.
    fn release_transaction(&self, _id: TransactionId) {}
}

/// In-process resource manager.
pub struct LocalResourceManager {
    next_id: AtomicU64,
    active: Mutex<HashSet<TransactionId>>,
    max_active: Option<usize>,
}

impl LocalResourceManager {
    /// Create a manager with no cap on active transactions.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a manager that refuses to allocate beyond `max_active`
    /// concurrently active ids.
    pub fn with_limit(max_active: Option<usize>) -> Self {
        info!(?max_active, "Creating LocalResourceManager");
        Self {
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashSet::new()),
            max_active,
        }
    }

    pub fn from_config(config: &ClientStateConfig) -> Self {
        Self::with_limit(config.max_active_transactions)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_active(&self, id: TransactionId) -> bool {
        self.active.lock().contains(&id)
    }
}

impl Default for LocalResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalResourceManager")
            .field("active", &self.active_count())
            .field("max_active", &self.max_active)
            .finish()
    }
}

impl ResourceManager for LocalResourceManager {
    fn create_local_transaction_id(&self) -> Result<TransactionId, StateError> {
        let mut active = self.active.lock();
        if let Some(max) = self.max_active {
            if active.len() >= max {
                warn!(max, "Local transaction limit reached");
                return Err(StateError::ResourceAllocation {
                    reason: format!("{max} local transactions already active"),
                });
            }
        }
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        active.insert(id);
        debug!(tx = %id, "Allocated local transaction");
        Ok(id)
    }

    fn release_transaction(&self, id: TransactionId) {
        if self.active.lock().remove(&id) {
            debug!(tx = %id, "Released local transaction");
        } else {
            warn!(tx = %id, "Released unknown local transaction");
        }
    }
}

/// A session's handle for transaction coordination.
///
/// Bound to the resource manager, the session's remote delegate and the
/// session node (by id, so the tree keeps no reference cycle).
pub struct XaResource {
    resource_manager: Arc<dyn ResourceManager>,
    delegate: Arc<dyn RemoteDelegate>,
    session: NodeId,
    current: Mutex<Option<TransactionId>>,
}

impl XaResource {
    pub fn new(
        resource_manager: Arc<dyn ResourceManager>,
        delegate: Arc<dyn RemoteDelegate>,
        session: NodeId,
    ) -> Self {
        Self {
            resource_manager,
            delegate,
            session,
            current: Mutex::new(None),
        }
    }

    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        *self.current.lock()
    }

    /// Bind `id` as the current transaction, returning the one it replaces.
    pub fn set_current_transaction_id(&self, id: TransactionId) -> Option<TransactionId> {
        debug!(session = %self.session, tx = %id, "Binding current transaction");
        self.current.lock().replace(id)
    }

    /// Unbind the current transaction and hand it back to the resource manager.
    pub fn release_current(&self) -> Option<TransactionId> {
        let released = self.current.lock().take();
        if let Some(id) = released {
            self.resource_manager.release_transaction(id);
        }
        released
    }

    pub fn session_id(&self) -> NodeId {
        self.session
    }

    pub fn resource_manager(&self) -> &Arc<dyn ResourceManager> {
        &self.resource_manager
    }

    pub fn delegate(&self) -> &Arc<dyn RemoteDelegate> {
        &self.delegate
    }
}

impl fmt::Debug for XaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XaResource")
            .field("session", &self.session)
            .field("remote_id", &self.delegate.remote_id())
            .field("current", &self.current_transaction_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Stub;

    impl RemoteDelegate for Stub {
        fn remote_id(&self) -> u64 {
            7
        }
    }

    #[test]
    fn test_allocates_distinct_ids() {
        let rm = LocalResourceManager::new();
        let a = rm.create_local_transaction_id().unwrap();
        let b = rm.create_local_transaction_id().unwrap();
        assert_ne!(a, b);
        assert_eq!(rm.active_count(), 2);
        assert!(rm.is_active(a));
    }

    #[test]
    fn test_limit_and_release() {
        let rm = LocalResourceManager::with_limit(Some(1));
        let a = rm.create_local_transaction_id().unwrap();
        let err = rm.create_local_transaction_id().unwrap_err();
        assert!(matches!(err, StateError::ResourceAllocation { .. }));

        rm.release_transaction(a);
        assert!(!rm.is_active(a));
        assert!(rm.create_local_transaction_id().is_ok());
    }

    #[test]
    fn test_zero_limit_never_allocates() {
        let rm = LocalResourceManager::with_limit(Some(0));
        assert!(rm.create_local_transaction_id().is_err());
    }

    #[test]
    fn test_xa_resource_binding() {
        let rm: Arc<dyn ResourceManager> = Arc::new(LocalResourceManager::new());
        let session = NodeId::next();
        let xa = XaResource::new(Arc::clone(&rm), Arc::new(Stub), session);
        assert_eq!(xa.current_transaction_id(), None);

        let id = rm.create_local_transaction_id().unwrap();
        assert_eq!(xa.set_current_transaction_id(id), None);
        assert_eq!(xa.current_transaction_id(), Some(id));
        assert_eq!(xa.session_id(), session);
        assert_eq!(xa.delegate().remote_id(), 7);

        assert_eq!(xa.release_current(), Some(id));
        assert_eq!(xa.current_transaction_id(), None);
        assert_eq!(xa.release_current(), None);
    }

    #[test]
    fn test_transaction_id_display() {
        assert_eq!(TransactionId::new(3).to_string(), "local-tx-3");
    }
}
