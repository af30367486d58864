//! Producer, consumer and browser state.
//!
//! These are the leaves of the state tree; they always hang under a session.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::config::ClientStateConfig;
use crate::error::{MessageError, StateError};
use crate::message::delegate::MessageDelegate;
use crate::message::header::{DeliveryMode, Destination, DEFAULT_PRIORITY, MAX_PRIORITY};
use crate::remote::RemoteDelegate;
use crate::state::node::{NodeId, NodeKind, StateNode};

/// Header defaults a producer stamps onto outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    pub delivery_mode: DeliveryMode,
    pub priority: u8,
    /// 0 means messages never expire.
    pub time_to_live_ms: u64,
    pub disable_message_id: bool,
    pub disable_timestamp: bool,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            priority: DEFAULT_PRIORITY,
            time_to_live_ms: 0,
            disable_message_id: false,
            disable_timestamp: false,
        }
    }
}

impl ProducerSettings {
    pub fn from_config(config: &ClientStateConfig) -> Self {
        Self {
            delivery_mode: config.default_delivery_mode,
            priority: config.default_priority,
            time_to_live_ms: config.default_time_to_live_ms,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), MessageError> {
        if self.priority > MAX_PRIORITY {
            return Err(MessageError::InvalidPriority(self.priority));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ProducerState {
    id: NodeId,
    destination: Option<Destination>,
    settings: Mutex<ProducerSettings>,
    sequence: AtomicU64,
}

impl ProducerState {
    /// `destination` is the default target; `None` makes an anonymous
    /// producer that needs a destination on every send.
    pub fn new(
        destination: Option<Destination>,
        settings: ProducerSettings,
    ) -> Result<Self, MessageError> {
        settings.validate()?;
        Ok(Self {
            id: NodeId::next(),
            destination,
            settings: Mutex::new(settings),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn settings(&self) -> ProducerSettings {
        self.settings.lock().clone()
    }

    pub fn set_settings(&self, settings: ProducerSettings) -> Result<(), MessageError> {
        settings.validate()?;
        *self.settings.lock() = settings;
        Ok(())
    }

    pub fn set_delivery_mode(&self, mode: DeliveryMode) {
        self.settings.lock().delivery_mode = mode;
    }

    pub fn set_priority(&self, priority: u8) -> Result<(), MessageError> {
        if priority > MAX_PRIORITY {
            return Err(MessageError::InvalidPriority(priority));
        }
        self.settings.lock().priority = priority;
        Ok(())
    }

    pub fn set_time_to_live(&self, time_to_live_ms: u64) {
        self.settings.lock().time_to_live_ms = time_to_live_ms;
    }

    /// Number of messages stamped so far.
    pub fn sent_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Stamp the send-time headers onto `message` as of `now_ms`.
    ///
    /// `destination` overrides the producer's default.  Only the header
    /// region of the message is written.
    pub fn stamp_at(
        &self,
        message: &mut MessageDelegate,
        destination: Option<&Destination>,
        now_ms: u64,
    ) -> Result<(), MessageError> {
        let settings = self.settings();
        let destination = destination
            .or(self.destination.as_ref())
            .cloned()
            .ok_or(MessageError::NoDestination)?;

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message_id = (!settings.disable_message_id)
            .then(|| format!("ID:{}-{}", self.id.as_u64(), seq));
        let expiration = match settings.time_to_live_ms {
            0 => 0,
            ttl => now_ms.saturating_add(ttl),
        };

        message.set_priority(settings.priority)?;
        message.set_destination(Some(destination));
        message.set_delivery_mode(settings.delivery_mode);
        message.set_timestamp(if settings.disable_timestamp { 0 } else { now_ms });
        message.set_expiration(expiration);
        message.set_message_id(message_id);

        debug!(producer = %self.id, seq, core = %message.core_id(), "Stamped outgoing message");
        Ok(())
    }

    /// [`stamp_at`](Self::stamp_at) with the current wall-clock time.
    pub fn stamp(
        &self,
        message: &mut MessageDelegate,
        destination: Option<&Destination>,
    ) -> Result<(), MessageError> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.stamp_at(message, destination, now_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerState {
    destination: Destination,
    selector: Option<String>,
    no_local: bool,
    subscription_name: Option<String>,
}

impl ConsumerState {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            selector: None,
            no_local: false,
            subscription_name: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_no_local(mut self, no_local: bool) -> Self {
        self.no_local = no_local;
        self
    }

    /// Make this a durable subscription under `name`.
    pub fn durable(mut self, name: impl Into<String>) -> Self {
        self.subscription_name = Some(name.into());
        self
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn no_local(&self) -> bool {
        self.no_local
    }

    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription_name.as_deref()
    }

    pub fn is_durable(&self) -> bool {
        self.subscription_name.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserState {
    queue: Destination,
    selector: Option<String>,
}

impl BrowserState {
    pub fn new(queue: Destination, selector: Option<String>) -> Self {
        Self { queue, selector }
    }

    pub fn queue(&self) -> &Destination {
        &self.queue
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }
}

impl StateNode {
    /// Create a producer under this session node.
    pub fn create_producer(
        self: &Arc<Self>,
        delegate: Arc<dyn RemoteDelegate>,
        state: ProducerState,
    ) -> Result<Arc<StateNode>, StateError> {
        self.attach_new(NodeKind::Producer(state), delegate)
    }

    /// Create a consumer under this session node.
    pub fn create_consumer(
        self: &Arc<Self>,
        delegate: Arc<dyn RemoteDelegate>,
        state: ConsumerState,
    ) -> Result<Arc<StateNode>, StateError> {
        self.attach_new(NodeKind::Consumer(state), delegate)
    }

    /// Create a queue browser under this session node.
    pub fn create_browser(
        self: &Arc<Self>,
        delegate: Arc<dyn RemoteDelegate>,
        state: BrowserState,
    ) -> Result<Arc<StateNode>, StateError> {
        self.attach_new(NodeKind::Browser(state), delegate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::body::Payload;
    use crate::message::record::MessageCore;

    fn queue() -> Destination {
        Destination::Queue("orders".into())
    }

    #[test]
    fn test_stamp_sets_send_headers() {
        let producer = ProducerState::new(
            Some(queue()),
            ProducerSettings {
                priority: 7,
                time_to_live_ms: 1_000,
                delivery_mode: DeliveryMode::NonPersistent,
                ..ProducerSettings::default()
            },
        )
        .unwrap();
        let mut message = MessageDelegate::new(MessageCore::default());

        producer.stamp_at(&mut message, None, 5_000).unwrap();
        let header = message.header();
        assert_eq!(header.destination, Some(queue()));
        assert_eq!(header.priority, 7);
        assert_eq!(header.delivery_mode, DeliveryMode::NonPersistent);
        assert_eq!(header.timestamp, 5_000);
        assert_eq!(header.expiration, 6_000);
        assert_eq!(
            header.message_id.as_deref(),
            Some(format!("ID:{}-1", producer.id().as_u64()).as_str())
        );
        assert_eq!(producer.sent_count(), 1);
    }

    #[test]
    fn test_stamp_on_shared_message_copies_header_only() {
        let producer = ProducerState::new(Some(queue()), ProducerSettings::default()).unwrap();
        let original = MessageDelegate::new(MessageCore::with_payload(Payload::Text("x".into())));
        let mut resent = original.deliver();

        producer.stamp_at(&mut resent, None, 1).unwrap();
        assert!(!resent.shares_core_with(&original));
        assert_ne!(resent.core().header_id(), original.core().header_id());
        assert_eq!(resent.core().properties_id(), original.core().properties_id());
        assert_eq!(resent.core().body_id(), original.core().body_id());

        let stats = resent.copy_stats();
        assert_eq!(stats.core_rebuilds, 1);
        assert_eq!(stats.header_copies, 1);
        assert_eq!(stats.region_copies(), 1);
        assert_eq!(original.header().destination, None);
    }

    #[test]
    fn test_anonymous_producer_needs_destination() {
        let producer = ProducerState::new(None, ProducerSettings::default()).unwrap();
        let mut message = MessageDelegate::new(MessageCore::default());
        let err = producer.stamp_at(&mut message, None, 0).unwrap_err();
        assert_eq!(err, MessageError::NoDestination);

        let topic = Destination::Topic("prices".into());
        producer.stamp_at(&mut message, Some(&topic), 0).unwrap();
        assert_eq!(message.header().destination, Some(topic));
    }

    #[test]
    fn test_disabled_id_and_timestamp() {
        let producer = ProducerState::new(
            Some(queue()),
            ProducerSettings {
                disable_message_id: true,
                disable_timestamp: true,
                ..ProducerSettings::default()
            },
        )
        .unwrap();
        let mut message = MessageDelegate::new(MessageCore::default());
        producer.stamp(&mut message, None).unwrap();
        assert_eq!(message.header().message_id, None);
        assert_eq!(message.header().timestamp, 0);
        assert_eq!(message.header().expiration, 0);
    }

    #[test]
    fn test_invalid_priority_rejected() {
        let err = ProducerState::new(
            None,
            ProducerSettings {
                priority: 10,
                ..ProducerSettings::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, MessageError::InvalidPriority(10));

        let producer = ProducerState::new(None, ProducerSettings::default()).unwrap();
        assert!(producer.set_priority(12).is_err());
        assert_eq!(producer.settings().priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_settings_from_config() {
        let config = ClientStateConfig {
            default_priority: 2,
            default_time_to_live_ms: 30_000,
            ..ClientStateConfig::default()
        };
        let settings = ProducerSettings::from_config(&config);
        assert_eq!(settings.priority, 2);
        assert_eq!(settings.time_to_live_ms, 30_000);
        assert!(!settings.disable_message_id);
    }

    #[test]
    fn test_consumer_builder() {
        let consumer = ConsumerState::new(Destination::Topic("news".into()))
            .with_selector("region = 'EU'")
            .with_no_local(true)
            .durable("news-sub");
        assert_eq!(consumer.selector(), Some("region = 'EU'"));
        assert!(consumer.no_local());
        assert!(consumer.is_durable());
        assert_eq!(consumer.subscription_name(), Some("news-sub"));
        assert!(!consumer.destination().is_queue());
    }
}
