use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ClientStateConfig;
use crate::error::StateError;
use crate::remote::RemoteDelegate;
use crate::resource::ResourceManager;
use crate::state::node::{NodeKind, StateNode};

/// Root state: the resource manager sessions draw transactions from, the
/// client id, and whether message delivery is started.
#[derive(Debug)]
pub struct ConnectionState {
    resource_manager: Arc<dyn ResourceManager>,
    client_id: Mutex<Option<String>>,
    started: AtomicBool,
}

impl ConnectionState {
    pub fn new(resource_manager: Arc<dyn ResourceManager>) -> Self {
        Self {
            resource_manager,
            client_id: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn resource_manager(&self) -> &Arc<dyn ResourceManager> {
        &self.resource_manager
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_id.lock().clone()
    }

    /// Set the client id. It can be set once.
    pub fn set_client_id(&self, id: impl Into<String>) -> Result<(), StateError> {
        let mut slot = self.client_id.lock();
        if let Some(current) = slot.as_ref() {
            return Err(StateError::ClientIdAlreadySet {
                current: current.clone(),
            });
        }
        let id = id.into();
        debug!(client_id = %id, "Client id set");
        *slot = Some(id);
        Ok(())
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

impl StateNode {
    /// Create the root node of a client state tree.
    pub fn new_connection(
        state: ConnectionState,
        delegate: Arc<dyn RemoteDelegate>,
        config: &ClientStateConfig,
    ) -> Arc<StateNode> {
        let node = StateNode::with_policy(
            NodeKind::Connection(state),
            delegate,
            config.duplicate_child_policy,
        );
        info!(connection = %node.id(), policy = ?config.duplicate_child_policy, "Connection state created");
        node
    }
}
