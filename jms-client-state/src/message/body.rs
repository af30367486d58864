//! Message body payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::MessageError;
use crate::message::property::{convert_value, PropertyValue};

/// The body region of a message.
///
/// `Object` holds an already-serialized object; this layer never looks
/// inside it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, PropertyValue>),
    Stream(Vec<PropertyValue>),
    Object(Vec<u8>),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Map(_) => "map",
            Self::Stream(_) => "stream",
            Self::Object(_) => "object",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) | Self::Object(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::Stream(items) => Some(items),
            _ => None,
        }
    }

    /// Put an entry into a map body. An empty body becomes a map body.
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
        if self.is_empty() {
            *self = Self::Map(BTreeMap::new());
        }
        match self {
            Self::Map(map) => Ok(map.insert(name.to_owned(), value.into())),
            other => Err(MessageError::WrongBodyKind {
                expected: "map",
                actual: other.kind_name(),
            }),
        }
    }

    pub fn map_entry(&self, name: &str) -> Option<&PropertyValue> {
        self.as_map().and_then(|map| map.get(name))
    }

    /// Read a map entry as a string, following the property conversion rules.
    pub fn map_string(&self, name: &str) -> Option<String> {
        self.map_entry(name).map(PropertyValue::as_string)
    }

    pub fn map_int(&self, name: &str) -> Result<Option<i32>, MessageError> {
        convert_value(self.map_entry(name), name, "int", PropertyValue::as_int)
    }

    pub fn map_long(&self, name: &str) -> Result<Option<i64>, MessageError> {
        convert_value(self.map_entry(name), name, "long", PropertyValue::as_long)
    }

    pub fn map_bool(&self, name: &str) -> Result<Option<bool>, MessageError> {
        convert_value(self.map_entry(name), name, "boolean", PropertyValue::as_bool)
    }

    /// Append to a stream body. An empty body becomes a stream body.
    pub fn push_stream(&mut self, value: impl Into<PropertyValue>) -> Result<(), MessageError> {
        if self.is_empty() {
            *self = Self::Stream(Vec::new());
        }
        match self {
            Self::Stream(items) => {
                items.push(value.into());
                Ok(())
            }
            other => Err(MessageError::WrongBodyKind {
                expected: "stream",
                actual: other.kind_name(),
            }),
        }
    }

    /// Append raw bytes to a bytes body. An empty body becomes a bytes body.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), MessageError> {
        if self.is_empty() {
            *self = Self::Bytes(Vec::with_capacity(data.len()));
        }
        match self {
            Self::Bytes(bytes) => {
                bytes.extend_from_slice(data);
                Ok(())
            }
            other => Err(MessageError::WrongBodyKind {
                expected: "bytes",
                actual: other.kind_name(),
            }),
        }
    }
}
