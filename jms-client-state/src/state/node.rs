//! Hierarchical State Tree - Generic Node and Tree Maintenance
//!
//! Every live client object (connection, session, producer, consumer,
//! browser) has a [`StateNode`].  Nodes form a tree rooted at a connection.
//! The interception layer walks it to find contextual state, e.g. the
//! session a consumer belongs to, without threading that state through
//! every call.
//!
//! # Tree rules:
//! - Children are owned by their parent; the parent link is a [`Weak`]
//!   back-reference used for lookups only
//! - Connection → Session → Producer | Consumer | Browser, nothing else
//! - Attaching and closing are serialized by the parent's child lock, so a
//!   child can never be left attached to a closed parent
//! - Closing releases children first, then the node's own delegate

use anyhow::Result as AnyResult;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::config::DuplicateChildPolicy;
use crate::error::StateError;
use crate::remote::RemoteDelegate;
use crate::resource::ResourceManager;
use crate::state::connection::ConnectionState;
use crate::state::endpoint::{BrowserState, ConsumerState, ProducerState};
use crate::state::session::SessionState;

/// Identity of a state node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh, process-wide unique id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKindTag {
    Connection,
    Session,
    Producer,
    Consumer,
    Browser,
}

impl fmt::Display for NodeKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connection => "connection",
            Self::Session => "session",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Browser => "browser",
        };
        f.write_str(name)
    }
}

/// Node-specific state.
#[derive(Debug)]
pub enum NodeKind {
    Connection(ConnectionState),
    Session(SessionState),
    Producer(ProducerState),
    Consumer(ConsumerState),
    Browser(BrowserState),
}

impl NodeKind {
    pub fn tag(&self) -> NodeKindTag {
        match self {
            Self::Connection(_) => NodeKindTag::Connection,
            Self::Session(_) => NodeKindTag::Session,
            Self::Producer(_) => NodeKindTag::Producer,
            Self::Consumer(_) => NodeKindTag::Consumer,
            Self::Browser(_) => NodeKindTag::Browser,
        }
    }

    /// Whether a node of this kind may own a child of kind `child`.
    pub fn accepts(&self, child: NodeKindTag) -> bool {
        matches!(
            (self.tag(), child),
            (NodeKindTag::Connection, NodeKindTag::Session)
                | (
                    NodeKindTag::Session,
                    NodeKindTag::Producer | NodeKindTag::Consumer | NodeKindTag::Browser
                )
        )
    }

    // Some states bind their node id before the node exists.
    fn preassigned_id(&self) -> Option<NodeId> {
        match self {
            Self::Session(session) => Some(session.id()),
            Self::Producer(producer) => Some(producer.id()),
            _ => None,
        }
    }

    fn on_close(&self) {
        match self {
            Self::Connection(connection) => connection.stop(),
            Self::Session(session) => session.release_transaction(),
            _ => {}
        }
    }
}

#[derive(Default)]
struct Children {
    nodes: HashMap<NodeId, Arc<StateNode>>,
    closed: bool,
}

/// Outcome of [`StateNode::close`].
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Nodes closed by this call, children before parents.
    pub closed: Vec<NodeId>,
    /// Delegates whose release failed; the close went on regardless.
    pub release_failures: Vec<(NodeId, String)>,
    /// Structural problems found and skipped.
    pub inconsistencies: Vec<StateError>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.release_failures.is_empty() && self.inconsistencies.is_empty()
    }
}

/// Outcome of [`StateNode::synchronize_with`].
#[derive(Debug, Default)]
pub struct ResyncReport {
    /// Nodes whose delegate was replaced, parents before children.
    pub rebound: Vec<NodeId>,
    /// Nodes the rebinder failed on; their subtrees were skipped.
    pub skipped: Vec<(NodeId, String)>,
}

/// One node of the client state tree.
pub struct StateNode {
    id: NodeId,
    kind: NodeKind,
    parent: RwLock<Weak<StateNode>>,
    delegate: RwLock<Arc<dyn RemoteDelegate>>,
    children: Mutex<Children>,
    policy: DuplicateChildPolicy,
}

impl StateNode {
    /// Create a detached node with the default duplicate-child policy.
    pub fn new(kind: NodeKind, delegate: Arc<dyn RemoteDelegate>) -> Arc<Self> {
        Self::with_policy(kind, delegate, DuplicateChildPolicy::default())
    }

    /// Create a detached node.
    pub fn with_policy(
        kind: NodeKind,
        delegate: Arc<dyn RemoteDelegate>,
        policy: DuplicateChildPolicy,
    ) -> Arc<Self> {
        let id = kind.preassigned_id().unwrap_or_else(NodeId::next);
        debug!(node = %id, kind = %kind.tag(), remote_id = delegate.remote_id(), "Creating state node");
        Arc::new(Self {
            id,
            kind,
            parent: RwLock::new(Weak::new()),
            delegate: RwLock::new(delegate),
            children: Mutex::new(Children::default()),
            policy,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn tag(&self) -> NodeKindTag {
        self.kind.tag()
    }

    pub fn duplicate_policy(&self) -> DuplicateChildPolicy {
        self.policy
    }

    /// The remote-call delegate this node currently routes through.
    pub fn delegate(&self) -> Arc<dyn RemoteDelegate> {
        Arc::clone(&self.delegate.read())
    }

    pub fn parent(&self) -> Option<Arc<StateNode>> {
        self.parent.read().upgrade()
    }

    /// Snapshot of the children, ordered by id.
    pub fn children(&self) -> Vec<Arc<StateNode>> {
        let mut nodes: Vec<_> = self.children.lock().nodes.values().cloned().collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().nodes.len()
    }

    pub fn has_child(&self, id: NodeId) -> bool {
        self.children.lock().nodes.contains_key(&id)
    }

    pub fn is_closed(&self) -> bool {
        self.children.lock().closed
    }

    // ── typed views ───────────────────────────────────────────────────

    pub fn as_connection(&self) -> Option<&ConnectionState> {
        match &self.kind {
            NodeKind::Connection(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_session(&self) -> Option<&SessionState> {
        match &self.kind {
            NodeKind::Session(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_producer(&self) -> Option<&ProducerState> {
        match &self.kind {
            NodeKind::Producer(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_consumer(&self) -> Option<&ConsumerState> {
        match &self.kind {
            NodeKind::Consumer(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_browser(&self) -> Option<&BrowserState> {
        match &self.kind {
            NodeKind::Browser(state) => Some(state),
            _ => None,
        }
    }

    // ── lookups ───────────────────────────────────────────────────────

    /// The nearest node of kind `tag`, starting with this one.
    pub fn ancestor_of_kind(self: &Arc<Self>, tag: NodeKindTag) -> Option<Arc<StateNode>> {
        let mut current = Some(Arc::clone(self));
        while let Some(node) = current {
            if node.tag() == tag {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }

    pub fn connection(self: &Arc<Self>) -> Option<Arc<StateNode>> {
        self.ancestor_of_kind(NodeKindTag::Connection)
    }

    pub fn session(self: &Arc<Self>) -> Option<Arc<StateNode>> {
        self.ancestor_of_kind(NodeKindTag::Session)
    }

    /// The resource manager of the connection this node belongs to.
    pub fn resource_manager(self: &Arc<Self>) -> Option<Arc<dyn ResourceManager>> {
        let connection = self.connection()?;
        let rm = connection.as_connection().map(|c| Arc::clone(c.resource_manager()));
        rm
    }

    fn has_ancestor(&self, id: NodeId) -> bool {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.id == id {
                return true;
            }
            current = node.parent();
        }
        false
    }

    // ── tree maintenance ──────────────────────────────────────────────

    /// Attach `child` under this node and point its parent link here.
    ///
    /// Fails if this node is closed, if the kinds do not nest, if the child
    /// already hangs under another node, or if it would create a cycle.  A
    /// duplicate insert follows this node's [`DuplicateChildPolicy`].
    pub fn add_child(self: &Arc<Self>, child: Arc<StateNode>) -> Result<(), StateError> {
        if !self.kind.accepts(child.tag()) {
            return Err(StateError::WrongParentKind {
                parent: self.tag(),
                child: child.tag(),
            });
        }
        if child.id == self.id || self.has_ancestor(child.id) {
            return Err(StateError::Cycle {
                parent: self.id,
                child: child.id,
            });
        }

        let mut children = self.children.lock();
        if children.closed {
            return Err(StateError::ParentClosed {
                parent: self.id,
                child: child.id,
            });
        }
        if children.nodes.contains_key(&child.id) {
            return match self.policy {
                DuplicateChildPolicy::Warn => {
                    warn!(parent = %self.id, child = %child.id, "Child already attached, ignoring");
                    Ok(())
                }
                DuplicateChildPolicy::Reject => Err(StateError::DuplicateChild {
                    parent: self.id,
                    child: child.id,
                }),
            };
        }
        if child.is_closed() {
            return Err(StateError::inconsistent(child.id, "closed nodes cannot be attached"));
        }

        {
            let mut parent_link = child.parent.write();
            if let Some(existing) = parent_link.upgrade() {
                return Err(StateError::inconsistent(
                    child.id,
                    format!("already attached to {}", existing.id),
                ));
            }
            *parent_link = Arc::downgrade(self);
        }

        debug!(parent = %self.id, child = %child.id, kind = %child.tag(), "Attached child");
        children.nodes.insert(child.id, child);
        Ok(())
    }

    /// Detach `child` from this node. The child is not closed.
    pub fn remove_child(&self, child: &StateNode) -> Result<Arc<StateNode>, StateError> {
        let mut children = self.children.lock();
        match children.nodes.remove(&child.id) {
            Some(node) => {
                *node.parent.write() = Weak::new();
                debug!(parent = %self.id, child = %child.id, "Detached child");
                Ok(node)
            }
            None => Err(StateError::inconsistent(
                child.id,
                format!("not a child of {}", self.id),
            )),
        }
    }

    /// Create a node for `kind` and attach it under this one.
    pub(crate) fn attach_new(
        self: &Arc<Self>,
        kind: NodeKind,
        delegate: Arc<dyn RemoteDelegate>,
    ) -> Result<Arc<StateNode>, StateError> {
        if !self.kind.accepts(kind.tag()) {
            return Err(StateError::WrongParentKind {
                parent: self.tag(),
                child: kind.tag(),
            });
        }
        let node = Self::with_policy(kind, delegate, self.policy);
        self.add_child(Arc::clone(&node))?;
        Ok(node)
    }

    /// Close this node and its whole subtree, then detach it from its parent.
    ///
    /// Children are closed before this node's delegate is released.  Release
    /// failures and structural inconsistencies are logged, recorded in the
    /// report and skipped.  Closing an already closed node does nothing.
    pub fn close(&self) -> CloseReport {
        let mut report = CloseReport::default();
        self.close_into(&mut report, true);
        report
    }

    fn close_into(&self, report: &mut CloseReport, detach: bool) {
        let drained: Vec<Arc<StateNode>> = {
            let mut children = self.children.lock();
            if children.closed {
                return;
            }
            children.closed = true;
            children.nodes.drain().map(|(_, node)| node).collect()
        };

        for child in drained {
            *child.parent.write() = Weak::new();
            child.close_into(report, false);
        }

        self.kind.on_close();
        let delegate = self.delegate();
        if let Err(err) = delegate.release() {
            warn!(node = %self.id, remote_id = delegate.remote_id(), error = %err, "Failed to release remote delegate");
            report.release_failures.push((self.id, format!("{err:#}")));
        }
        report.closed.push(self.id);

        if detach {
            if let Some(parent) = self.parent() {
                if let Err(err) = parent.remove_child(self) {
                    warn!(node = %self.id, error = %err, "Parent did not list closing node");
                    report.inconsistencies.push(err);
                }
            }
        }

        match self.tag() {
            NodeKindTag::Connection | NodeKindTag::Session => {
                info!(node = %self.id, kind = %self.tag(), "Closed")
            }
            _ => debug!(node = %self.id, kind = %self.tag(), "Closed"),
        }
    }

    /// Rebind every live node in this subtree to a new remote delegate,
    /// e.g. after failing over to another server.
    ///
    /// `rebind` is called parent-first.  If it fails for a node, that node
    /// keeps its old delegate and its subtree is skipped.
    pub fn synchronize_with<F>(&self, mut rebind: F) -> ResyncReport
    where
        F: FnMut(&StateNode) -> AnyResult<Arc<dyn RemoteDelegate>>,
    {
        let mut report = ResyncReport::default();
        self.resync_into(&mut rebind, &mut report);
        info!(
            node = %self.id,
            rebound = report.rebound.len(),
            skipped = report.skipped.len(),
            "State tree resynchronized"
        );
        report
    }

    fn resync_into(
        &self,
        rebind: &mut dyn FnMut(&StateNode) -> AnyResult<Arc<dyn RemoteDelegate>>,
        report: &mut ResyncReport,
    ) {
        if self.is_closed() {
            return;
        }
        match rebind(self) {
            Ok(replacement) => {
                let old = std::mem::replace(&mut *self.delegate.write(), replacement);
                debug!(
                    node = %self.id,
                    old_remote_id = old.remote_id(),
                    new_remote_id = self.delegate().remote_id(),
                    "Rebound delegate"
                );
                report.rebound.push(self.id);
            }
            Err(err) => {
                warn!(node = %self.id, error = %err, "Failed to rebind delegate, skipping subtree");
                report.skipped.push((self.id, format!("{err:#}")));
                return;
            }
        }
        for child in self.children() {
            child.resync_into(rebind, report);
        }
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children = self.children.lock();
        f.debug_struct("StateNode")
            .field("id", &self.id)
            .field("kind", &self.kind.tag())
            .field("children", &children.nodes.len())
            .field("closed", &children.closed)
            .finish()
    }
}
