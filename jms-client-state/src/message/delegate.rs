//! Message Delegates - Per-Party Views of a Shared Message
//!
//! A delegate is what a producer or consumer actually holds.  Any number of
//! delegates may point at one [`MessageCore`]; each behaves as if it owned
//! an independent, fully mutable message.
//!
//! # Copy discipline:
//! - Reads never copy and never touch sharer counts
//! - A write needs an exclusive core.  If the core is shared, a new core is
//!   built that shares all three regions with the old one (no region data
//!   is copied yet) and the delegate switches to it
//! - The written region is then copied only if it is still shared
//! - Later writes to the same region mutate in place

use std::sync::Arc;
use tracing::debug;

use crate::error::MessageError;
use crate::message::body::Payload;
use crate::message::cow::CowRegion;
use crate::message::header::{DeliveryMode, Destination, HeaderField, HeaderFields};
use crate::message::property::{validate_property_name, PropertyMap, PropertyValue};
use crate::message::record::{CoreId, MessageCore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegateRole {
    /// Held by the producer that sent the message.
    Sent,
    /// Held by a consumer the message was delivered to.
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Header,
    Properties,
    Body,
}

/// Copies triggered through one delegate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// New cores built because the old one was shared.
    pub core_rebuilds: u64,
    pub header_copies: u64,
    pub property_copies: u64,
    pub body_copies: u64,
}

impl CopyStats {
    fn record(&mut self, kind: RegionKind) {
        match kind {
            RegionKind::Header => self.header_copies += 1,
            RegionKind::Properties => self.property_copies += 1,
            RegionKind::Body => self.body_copies += 1,
        }
    }

    pub fn region_copies(&self) -> u64 {
        self.header_copies + self.property_copies + self.body_copies
    }
}

/// One party's handle on a message.
///
/// # Example
/// ```rust
/// # use jms_client_state::message::{MessageCore, MessageDelegate, Payload, DeliveryMode};
/// let mut sent = MessageDelegate::new(MessageCore::with_payload(Payload::Text("hi".into())));
/// let received = sent.deliver();
/// assert!(sent.shares_core_with(&received));
///
/// sent.set_delivery_mode(DeliveryMode::NonPersistent);
/// assert!(!sent.shares_core_with(&received));
/// assert_eq!(sent.core().body_id(), received.core().body_id());
/// ```
#[derive(Debug)]
pub struct MessageDelegate {
    core: Arc<MessageCore>,
    role: DelegateRole,
    stats: CopyStats,
}

impl MessageDelegate {
    /// Wrap a freshly built core as the sending side.
    pub fn new(core: MessageCore) -> Self {
        Self::from_shared(Arc::new(core), DelegateRole::Sent)
    }

    /// Attach a delegate to a core that may already have other holders.
    pub fn from_shared(core: Arc<MessageCore>, role: DelegateRole) -> Self {
        Self {
            core,
            role,
            stats: CopyStats::default(),
        }
    }

    /// Produce the receiving side's delegate, aliasing the same core.
    ///
    /// This is what delivery amounts to from this layer's point of view:
    /// the consumer gets a reference to the very core the producer sent.
    pub fn deliver(&self) -> Self {
        debug!(core = %self.core.id(), "Delivering shared message core");
        Self::from_shared(Arc::clone(&self.core), DelegateRole::Received)
    }

    pub fn role(&self) -> DelegateRole {
        self.role
    }

    /// The core this delegate currently points at.
    pub fn core(&self) -> &MessageCore {
        &self.core
    }

    pub fn core_id(&self) -> CoreId {
        self.core.id()
    }

    /// Number of delegates sharing this delegate's core, including itself.
    pub fn core_sharers(&self) -> usize {
        Arc::strong_count(&self.core)
    }

    pub fn shares_core_with(&self, other: &MessageDelegate) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub fn copy_stats(&self) -> CopyStats {
        self.stats
    }

    // ── reads ─────────────────────────────────────────────────────────

    pub fn header(&self) -> &HeaderFields {
        self.core.header()
    }

    pub fn properties(&self) -> &PropertyMap {
        self.core.properties()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.core.properties().get(name)
    }

    pub fn payload(&self) -> &Payload {
        self.core.payload()
    }

    // ── header writes ─────────────────────────────────────────────────

    /// Assign one header field, copying only the header region.
    pub fn set_header_field(&mut self, field: HeaderField) -> Result<(), MessageError> {
        field.validate()?;
        debug!(field = field.name(), core = %self.core.id(), "Setting header field");
        self.write_region(RegionKind::Header, header_region, |header| header.apply(field));
        Ok(())
    }

    pub fn set_delivery_mode(&mut self, mode: DeliveryMode) {
        self.write_region(RegionKind::Header, header_region, |h| h.delivery_mode = mode);
    }

    pub fn set_priority(&mut self, priority: u8) -> Result<(), MessageError> {
        self.set_header_field(HeaderField::Priority(priority))
    }

    pub fn set_message_id(&mut self, id: Option<String>) {
        self.write_region(RegionKind::Header, header_region, |h| h.message_id = id);
    }

    pub fn set_correlation_id(&mut self, id: Option<String>) {
        self.write_region(RegionKind::Header, header_region, |h| h.correlation_id = id);
    }

    pub fn set_destination(&mut self, destination: Option<Destination>) {
        self.write_region(RegionKind::Header, header_region, |h| {
            h.destination = destination
        });
    }

    pub fn set_reply_to(&mut self, reply_to: Option<Destination>) {
        self.write_region(RegionKind::Header, header_region, |h| h.reply_to = reply_to);
    }

    pub fn set_expiration(&mut self, expiration: u64) {
        self.write_region(RegionKind::Header, header_region, |h| h.expiration = expiration);
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.write_region(RegionKind::Header, header_region, |h| h.timestamp = timestamp);
    }

    pub fn set_redelivered(&mut self, redelivered: bool) {
        self.write_region(RegionKind::Header, header_region, |h| {
            h.redelivered = redelivered
        });
    }

    pub fn set_type(&mut self, message_type: Option<String>) {
        self.write_region(RegionKind::Header, header_region, |h| {
            h.message_type = message_type
        });
    }

    // ── property writes ───────────────────────────────────────────────

    /// Set a property, copying only the property region.
    ///
    /// The name is checked before anything is copied.
    pub fn set_property(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<Option<PropertyValue>, MessageError> {
        validate_property_name(name)?;
        let value = value.into();
        self.write_region(RegionKind::Properties, properties_region, |props| {
            props.set(name, value)
        })
    }

    /// Drop every property.
    ///
    /// A shared property region is replaced by a fresh empty one rather
    /// than copied and then cleared.
    pub fn clear_properties(&mut self) {
        self.reset_region(RegionKind::Properties, properties_region, PropertyMap::new());
    }

    // ── body writes ───────────────────────────────────────────────────

    /// Replace the whole body. The old body is never copied.
    pub fn set_body(&mut self, body: Payload) {
        self.reset_region(RegionKind::Body, body_region, body);
    }

    pub fn clear_body(&mut self) {
        self.set_body(Payload::Empty);
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.set_body(Payload::Text(text.into()));
    }

    /// Put an entry into a map body, copying only the body region.
    pub fn set_map_entry(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<Option<PropertyValue>, MessageError> {
        if name.is_empty() {
            return Err(MessageError::InvalidPropertyName {
                name: String::new(),
                reason: "map entry names must not be empty",
            });
        }
        self.check_body_kind("map", matches!(self.payload(), Payload::Empty | Payload::Map(_)))?;
        let value = value.into();
        self.write_region(RegionKind::Body, body_region, |body| {
            body.set_map_entry(name, value)
        })
    }

    pub fn push_stream(&mut self, value: impl Into<PropertyValue>) -> Result<(), MessageError> {
        self.check_body_kind(
            "stream",
            matches!(self.payload(), Payload::Empty | Payload::Stream(_)),
        )?;
        let value = value.into();
        self.write_region(RegionKind::Body, body_region, |body| body.push_stream(value))
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), MessageError> {
        self.check_body_kind(
            "bytes",
            matches!(self.payload(), Payload::Empty | Payload::Bytes(_)),
        )?;
        self.write_region(RegionKind::Body, body_region, |body| body.write_bytes(data))
    }

    // ── private helpers ───────────────────────────────────────────────

    fn check_body_kind(&self, expected: &'static str, ok: bool) -> Result<(), MessageError> {
        if ok {
            Ok(())
        } else {
            Err(MessageError::WrongBodyKind {
                expected,
                actual: self.payload().kind_name(),
            })
        }
    }

    /// Make the core exclusive, copy the selected region if it is shared,
    /// then hand the region's value to `apply`.
    fn write_region<T: Clone, R>(
        &mut self,
        kind: RegionKind,
        select: fn(&mut MessageCore) -> &mut CowRegion<T>,
        apply: impl FnOnce(&mut T) -> R,
    ) -> R {
        let core = exclusive_core(&mut self.core, &mut self.stats);
        let (value, copied) = select(core).write_tracked();
        if copied {
            self.stats.record(kind);
        }
        let out = apply(value);
        self.debug_check_exclusive(kind);
        out
    }

    /// Overwrite the selected region with `fresh`, without cloning the
    /// old value when it is shared.
    fn reset_region<T: Clone>(
        &mut self,
        kind: RegionKind,
        select: fn(&mut MessageCore) -> &mut CowRegion<T>,
        fresh: T,
    ) {
        let core = exclusive_core(&mut self.core, &mut self.stats);
        let region = select(core);
        if region.is_shared() {
            debug!(region = %region.id(), ?kind, "Detaching shared region on reset");
            *region = CowRegion::new(fresh);
            self.stats.record(kind);
        } else {
            *region.write() = fresh;
        }
        self.debug_check_exclusive(kind);
    }

    fn debug_check_exclusive(&self, kind: RegionKind) {
        let region_shared = match kind {
            RegionKind::Header => self.core.header.is_shared(),
            RegionKind::Properties => self.core.properties.is_shared(),
            RegionKind::Body => self.core.body.is_shared(),
        };
        debug_assert!(
            Arc::strong_count(&self.core) == 1 && !region_shared,
            "aliasing violation: {kind:?} region of {} still shared after write",
            self.core.id()
        );
    }
}

/// Make `core` exclusive, rebuilding it around the same regions if shared.
fn exclusive_core<'a>(core: &'a mut Arc<MessageCore>, stats: &mut CopyStats) -> &'a mut MessageCore {
    let before = core.id();
    let core = Arc::make_mut(core);
    if core.id() != before {
        stats.core_rebuilds += 1;
        debug!(from = %before, to = %core.id(), "Rebuilt shared message core");
    }
    core
}

fn header_region(core: &mut MessageCore) -> &mut CowRegion<HeaderFields> {
    &mut core.header
}

fn properties_region(core: &mut MessageCore) -> &mut CowRegion<PropertyMap> {
    &mut core.properties
}

fn body_region(core: &mut MessageCore) -> &mut CowRegion<Payload> {
    &mut core.body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_map_message() -> MessageDelegate {
        let mut sent = MessageDelegate::new(MessageCore::default());
        sent.set_map_entry("map_entry", "map_value").unwrap();
        sent.set_property("property_entry", "property_value").unwrap();
        sent
    }

    #[test]
    fn test_populating_exclusive_message_never_copies() {
        let sent = sent_map_message();
        assert_eq!(sent.copy_stats(), CopyStats::default());
        assert_eq!(sent.role(), DelegateRole::Sent);
    }

    #[test]
    fn test_deliver_aliases_core() {
        let sent = sent_map_message();
        let received = sent.deliver();
        assert_eq!(received.role(), DelegateRole::Received);
        assert_eq!(sent.core_id(), received.core_id());
        assert_eq!(sent.core_sharers(), 2);
    }

    #[test]
    fn test_header_write_rebuilds_core_only() {
        let mut sent = sent_map_message();
        let received = sent.deliver();
        let original = received.core_id();

        sent.set_delivery_mode(DeliveryMode::NonPersistent);

        assert_ne!(sent.core_id(), original);
        assert_eq!(received.core_id(), original);
        assert_ne!(sent.core().header_id(), received.core().header_id());
        assert_eq!(sent.core().properties_id(), received.core().properties_id());
        assert_eq!(sent.core().body_id(), received.core().body_id());
        assert_eq!(received.header().delivery_mode, DeliveryMode::Persistent);
        assert_eq!(
            sent.copy_stats(),
            CopyStats {
                core_rebuilds: 1,
                header_copies: 1,
                ..CopyStats::default()
            }
        );
    }

    #[test]
    fn test_invalid_writes_do_not_copy() {
        let mut sent = sent_map_message();
        let received = sent.deliver();

        assert!(sent.set_property("NOT", 1i32).is_err());
        assert!(sent.set_priority(42).is_err());
        assert!(sent.push_stream(1i32).is_err());

        assert!(sent.shares_core_with(&received));
        assert_eq!(sent.copy_stats(), CopyStats::default());
    }

    #[test]
    fn test_clear_properties_detaches_without_clone() {
        let mut received = sent_map_message().deliver();
        let sent = received.deliver();

        received.clear_properties();
        assert!(received.properties().is_empty());
        assert_eq!(sent.properties().len(), 1);
        assert_eq!(received.copy_stats().property_copies, 1);

        // Already exclusive: further writes stay in place.
        let props = received.core().properties_id();
        received.set_property("my_int_prop", 123i32).unwrap();
        assert_eq!(received.core().properties_id(), props);
        assert_eq!(received.copy_stats().property_copies, 1);
    }

    #[test]
    fn test_set_body_replaces_region() {
        let mut sent = sent_map_message();
        let received = sent.deliver();

        sent.set_text("replaced");
        assert_eq!(sent.payload().as_text(), Some("replaced"));
        assert_eq!(received.payload().map_string("map_entry").as_deref(), Some("map_value"));
        assert_eq!(sent.copy_stats().body_copies, 1);
        assert_eq!(sent.copy_stats().header_copies, 0);
    }

    #[test]
    fn test_header_field_enum() {
        let mut sent = MessageDelegate::new(MessageCore::default());
        sent.set_header_field(HeaderField::CorrelationId(Some("c-1".into())))
            .unwrap();
        sent.set_header_field(HeaderField::Priority(7)).unwrap();
        assert_eq!(sent.header().correlation_id.as_deref(), Some("c-1"));
        assert_eq!(sent.header().priority, 7);
    }

    #[test]
    fn test_drop_of_peer_makes_writes_in_place() {
        let mut sent = sent_map_message();
        let received = sent.deliver();
        drop(received);

        let core = sent.core_id();
        sent.set_redelivered(true);
        assert_eq!(sent.core_id(), core);
        assert_eq!(sent.copy_stats().region_copies(), 0);
    }
}
