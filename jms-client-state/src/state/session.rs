//! Session state.
//!
//! A transacted session holds an [`XaResource`] with a local transaction
//! bound from construction on.  A session that is not transacted has none.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ClientStateConfig;
use crate::error::StateError;
use crate::remote::RemoteDelegate;
use crate::resource::{ResourceManager, TransactionId, XaResource};
use crate::state::node::{NodeId, NodeKind, NodeKindTag, StateNode};

/// How received messages are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgeMode {
    #[default]
    Auto,
    Client,
    DupsOk,
    /// No acknowledgement, used by transacted sessions.
    None,
}

/// Parameters a session is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub transacted: bool,
    pub acknowledge_mode: AcknowledgeMode,
    pub xa: bool,
}

impl SessionOptions {
    pub fn new(transacted: bool, acknowledge_mode: AcknowledgeMode) -> Self {
        Self {
            transacted,
            acknowledge_mode,
            xa: false,
        }
    }

    pub fn from_config(config: &ClientStateConfig, transacted: bool) -> Self {
        Self::new(transacted, config.default_acknowledge_mode)
    }

    /// Mark the session as XA-capable.
    pub fn xa(mut self, xa: bool) -> Self {
        self.xa = xa;
        self
    }
}

#[derive(Debug)]
pub struct SessionState {
    id: NodeId,
    acknowledge_mode: AcknowledgeMode,
    transacted: bool,
    xa: bool,
    xa_resource: Option<XaResource>,
    asf_receiver_id: Mutex<Option<String>>,
}

impl SessionState {
    /// Build a session's state.
    ///
    /// For a transacted session this creates the [`XaResource`], allocates a
    /// local transaction from `resource_manager` and binds it as current.
    /// An allocation failure leaves nothing behind.
    pub fn new(
        resource_manager: &Arc<dyn ResourceManager>,
        delegate: &Arc<dyn RemoteDelegate>,
        options: SessionOptions,
    ) -> Result<Self, StateError> {
        let id = NodeId::next();
        let xa_resource = if options.transacted {
            let xa = XaResource::new(Arc::clone(resource_manager), Arc::clone(delegate), id);
            let tx = resource_manager.create_local_transaction_id()?;
            xa.set_current_transaction_id(tx);
            Some(xa)
        } else {
            None
        };

        debug!(
            session = %id,
            transacted = options.transacted,
            xa = options.xa,
            ack = ?options.acknowledge_mode,
            "Session state created"
        );
        Ok(Self {
            id,
            acknowledge_mode: options.acknowledge_mode,
            transacted: options.transacted,
            xa: options.xa,
            xa_resource,
            asf_receiver_id: Mutex::new(None),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn acknowledge_mode(&self) -> AcknowledgeMode {
        self.acknowledge_mode
    }

    pub fn is_transacted(&self) -> bool {
        self.transacted
    }

    pub fn is_xa(&self) -> bool {
        self.xa
    }

    pub fn xa_resource(&self) -> Option<&XaResource> {
        self.xa_resource.as_ref()
    }

    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        self.xa_resource.as_ref()?.current_transaction_id()
    }

    /// Receiver id of an application-server-facility consumer, if any.
    pub fn asf_receiver_id(&self) -> Option<String> {
        self.asf_receiver_id.lock().clone()
    }

    pub fn set_asf_receiver_id(&self, id: Option<String>) {
        *self.asf_receiver_id.lock() = id;
    }

    pub(crate) fn release_transaction(&self) {
        if let Some(tx) = self.xa_resource.as_ref().and_then(XaResource::release_current) {
            debug!(session = %self.id, tx = %tx, "Released session transaction");
        }
    }
}

impl StateNode {
    /// Create a session under this connection node.
    pub fn create_session(
        self: &Arc<Self>,
        delegate: Arc<dyn RemoteDelegate>,
        options: SessionOptions,
    ) -> Result<Arc<StateNode>, StateError> {
        let connection = self.as_connection().ok_or(StateError::WrongParentKind {
            parent: self.tag(),
            child: NodeKindTag::Session,
        })?;
        let state = SessionState::new(connection.resource_manager(), &delegate, options)
            .map_err(|err| {
                warn!(connection = %self.id(), error = %err, "Failed to create session state");
                err
            })?;

        let node = StateNode::with_policy(NodeKind::Session(state), delegate, self.duplicate_policy());
        if let Err(err) = self.add_child(Arc::clone(&node)) {
            if let Some(session) = node.as_session() {
                session.release_transaction();
            }
            return Err(err);
        }
        info!(connection = %self.id(), session = %node.id(), transacted = options.transacted, "Session created");
        Ok(node)
    }
}
