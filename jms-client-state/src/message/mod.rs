//! Message module - copy-on-write message representation
//!
//! A [`MessageCore`] holds the header, property and body regions of one
//! message.  [`MessageDelegate`]s are the producer's and consumers' handles
//! on it; they share the core until one of them writes.

pub mod body;
pub mod cow;
pub mod delegate;
pub mod header;
pub mod property;
pub mod record;

pub use self::body::Payload;
pub use self::cow::{CowRegion, RegionId};
pub use self::delegate::{CopyStats, DelegateRole, MessageDelegate, RegionKind};
pub use self::header::{DeliveryMode, Destination, HeaderField, HeaderFields};
pub use self::property::{PropertyMap, PropertyValue};
pub use self::record::{CoreId, MessageCore};
