//! The underlying message record shared by delegates.

use std::fmt;

use crate::message::body::Payload;
use crate::message::cow::{next_identity, CowRegion, RegionId};
use crate::message::header::HeaderFields;
use crate::message::property::PropertyMap;

/// Identity of one [`MessageCore`] allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreId(u64);

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core-{}", self.0)
    }
}

/// Header, properties and body, each in its own [`CowRegion`] so they can
/// diverge independently.
///
/// Cloning a core is shallow: the clone gets a fresh [`CoreId`] and shares
/// all three regions with the original.
#[derive(Debug)]
pub struct MessageCore {
    id: CoreId,
    pub(crate) header: CowRegion<HeaderFields>,
    pub(crate) properties: CowRegion<PropertyMap>,
    pub(crate) body: CowRegion<Payload>,
}

impl MessageCore {
    pub fn new(header: HeaderFields, properties: PropertyMap, body: Payload) -> Self {
        Self {
            id: CoreId(next_identity()),
            header: CowRegion::new(header),
            properties: CowRegion::new(properties),
            body: CowRegion::new(body),
        }
    }

    /// A core with default headers, no properties and the given body.
    pub fn with_payload(body: Payload) -> Self {
        Self::new(HeaderFields::default(), PropertyMap::new(), body)
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn header(&self) -> &HeaderFields {
        self.header.read()
    }

    pub fn properties(&self) -> &PropertyMap {
        self.properties.read()
    }

    pub fn payload(&self) -> &Payload {
        self.body.read()
    }

    pub fn header_region(&self) -> &CowRegion<HeaderFields> {
        &self.header
    }

    pub fn properties_region(&self) -> &CowRegion<PropertyMap> {
        &self.properties
    }

    pub fn body_region(&self) -> &CowRegion<Payload> {
        &self.body
    }

    pub fn header_id(&self) -> RegionId {
        self.header.id()
    }

    pub fn properties_id(&self) -> RegionId {
        self.properties.id()
    }

    pub fn body_id(&self) -> RegionId {
        self.body.id()
    }
}

impl Clone for MessageCore {
    fn clone(&self) -> Self {
        Self {
            id: CoreId(next_identity()),
            header: self.header.clone(),
            properties: self.properties.clone(),
            body: self.body.clone(),
        }
    }
}

impl Default for MessageCore {
    fn default() -> Self {
        Self::with_payload(Payload::Empty)
    }
}
