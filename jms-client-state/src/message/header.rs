//! JMS header fields.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MessageError;

/// Lowest and highest legal JMS priorities.
pub const MIN_PRIORITY: u8 = 0;
pub const MAX_PRIORITY: u8 = 9;

/// Priority a message gets when nobody sets one.
pub const DEFAULT_PRIORITY: u8 = 4;

/// Where a message is sent to, or where replies should go.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Queue(String),
    Topic(String),
    TemporaryQueue(String),
    TemporaryTopic(String),
}

impl Destination {
    pub fn name(&self) -> &str {
        match self {
            Self::Queue(name)
            | Self::Topic(name)
            | Self::TemporaryQueue(name)
            | Self::TemporaryTopic(name) => name,
        }
    }

    pub fn is_queue(&self) -> bool {
        matches!(self, Self::Queue(_) | Self::TemporaryQueue(_))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::TemporaryQueue(_) | Self::TemporaryTopic(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue(name) => write!(f, "queue://{name}"),
            Self::Topic(name) => write!(f, "topic://{name}"),
            Self::TemporaryQueue(name) => write!(f, "temp-queue://{name}"),
            Self::TemporaryTopic(name) => write!(f, "temp-topic://{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Persistent,
    NonPersistent,
}

/// The JMS header block of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFields {
    pub message_id: Option<String>,
    pub destination: Option<Destination>,
    pub reply_to: Option<Destination>,
    pub correlation_id: Option<String>,
    pub delivery_mode: DeliveryMode,
    pub priority: u8,
    /// Expiry as epoch milliseconds, `0` meaning never.
    pub expiration: u64,
    /// Send time as epoch milliseconds, `0` when not stamped.
    pub timestamp: u64,
    pub redelivered: bool,
    pub message_type: Option<String>,
}

impl Default for HeaderFields {
    fn default() -> Self {
        Self {
            message_id: None,
            destination: None,
            reply_to: None,
            correlation_id: None,
            delivery_mode: DeliveryMode::Persistent,
            priority: DEFAULT_PRIORITY,
            expiration: 0,
            timestamp: 0,
            redelivered: false,
            message_type: None,
        }
    }
}

/// A single header assignment, as issued by "set header field" calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderField {
    MessageId(Option<String>),
    Destination(Option<Destination>),
    ReplyTo(Option<Destination>),
    CorrelationId(Option<String>),
    DeliveryMode(DeliveryMode),
    Priority(u8),
    Expiration(u64),
    Timestamp(u64),
    Redelivered(bool),
    Type(Option<String>),
}

impl HeaderField {
    /// The JMS name of the field, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageId(_) => "JMSMessageID",
            Self::Destination(_) => "JMSDestination",
            Self::ReplyTo(_) => "JMSReplyTo",
            Self::CorrelationId(_) => "JMSCorrelationID",
            Self::DeliveryMode(_) => "JMSDeliveryMode",
            Self::Priority(_) => "JMSPriority",
            Self::Expiration(_) => "JMSExpiration",
            Self::Timestamp(_) => "JMSTimestamp",
            Self::Redelivered(_) => "JMSRedelivered",
            Self::Type(_) => "JMSType",
        }
    }

    /// Reject values the header can never hold.
    pub fn validate(&self) -> Result<(), MessageError> {
        match self {
            Self::Priority(p) if *p > MAX_PRIORITY => Err(MessageError::InvalidPriority(*p)),
            _ => Ok(()),
        }
    }
}

impl HeaderFields {
    /// Store `field`. The caller validates first.
    pub fn apply(&mut self, field: HeaderField) {
        match field {
            HeaderField::MessageId(v) => self.message_id = v,
            HeaderField::Destination(v) => self.destination = v,
            HeaderField::ReplyTo(v) => self.reply_to = v,
            HeaderField::CorrelationId(v) => self.correlation_id = v,
            HeaderField::DeliveryMode(v) => self.delivery_mode = v,
            HeaderField::Priority(v) => self.priority = v,
            HeaderField::Expiration(v) => self.expiration = v,
            HeaderField::Timestamp(v) => self.timestamp = v,
            HeaderField::Redelivered(v) => self.redelivered = v,
            HeaderField::Type(v) => self.message_type = v,
        }
    }

    /// Returns `true` if the message has an expiry and `now_ms` is past it.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiration != 0 && now_ms >= self.expiration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_defaults() {
        let header = HeaderFields::default();
        assert_eq!(header.delivery_mode, DeliveryMode::Persistent);
        assert_eq!(header.priority, DEFAULT_PRIORITY);
        assert!(header.message_id.is_none());
        assert!(!header.redelivered);
    }

    #[test]
    fn test_apply_fields() {
        let mut header = HeaderFields::default();
        header.apply(HeaderField::DeliveryMode(DeliveryMode::NonPersistent));
        header.apply(HeaderField::CorrelationId(Some("corr-1".into())));
        header.apply(HeaderField::Destination(Some(Destination::Queue("orders".into()))));
        assert_eq!(header.delivery_mode, DeliveryMode::NonPersistent);
        assert_eq!(header.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(header.destination.as_ref().map(Destination::name), Some("orders"));
    }

    #[test]
    fn test_priority_validation() {
        assert!(HeaderField::Priority(9).validate().is_ok());
        assert_eq!(
            HeaderField::Priority(10).validate(),
            Err(MessageError::InvalidPriority(10))
        );
    }

    #[test]
    fn test_expiry() {
        let mut header = HeaderFields::default();
        assert!(!header.is_expired(u64::MAX));
        header.expiration = 1_000;
        assert!(!header.is_expired(999));
        assert!(header.is_expired(1_000));
    }

    #[test]
    fn test_destination_display() {
        assert_eq!(Destination::Queue("q".into()).to_string(), "queue://q");
        assert_eq!(Destination::TemporaryTopic("t".into()).to_string(), "temp-topic://t");
        assert!(Destination::TemporaryQueue("x".into()).is_queue());
        assert!(!Destination::Topic("x".into()).is_temporary());
    }
}
