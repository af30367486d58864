//! Typed message properties and the JMS conversion rules between them.
//!
//! The same [`PropertyValue`] type backs map-message entries, so the
//! conversion table here is shared by both.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MessageError;

/// Words that cannot be used as property names because selectors reserve them.
const RESERVED_WORDS: [&str; 11] = [
    "NULL", "TRUE", "FALSE", "NOT", "AND", "OR", "BETWEEN", "LIKE", "IN", "IS", "ESCAPE",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::String(s) => Some(s.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<i8> {
        match self {
            Self::Byte(v) => Some(*v),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_short(&self) -> Option<i16> {
        match self {
            Self::Byte(v) => Some(i16::from(*v)),
            Self::Short(v) => Some(*v),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Byte(v) => Some(i32::from(*v)),
            Self::Short(v) => Some(i32::from(*v)),
            Self::Int(v) => Some(*v),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Every property type reads as a string.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

/// Check `name` against the JMS identifier rules.
pub fn validate_property_name(name: &str) -> Result<(), MessageError> {
    let invalid = |reason| MessageError::InvalidPropertyName {
        name: name.to_owned(),
        reason,
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("name is empty")),
        Some(c) if !(c.is_alphabetic() || c == '_' || c == '$') => {
            return Err(invalid("name must start with a letter, '_' or '$'"))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return Err(invalid("name may only contain letters, digits, '_' or '$'"));
    }
    if RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name)) {
        return Err(invalid("name is a reserved selector word"));
    }
    Ok(())
}

/// The property region of a message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyMap {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property after checking its name. Returns the previous value.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<Option<PropertyValue>, MessageError> {
        validate_property_name(name)?;
        Ok(self.entries.insert(name.to_owned(), value.into()))
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, MessageError> {
        self.convert(name, "boolean", PropertyValue::as_bool)
    }

    pub fn get_byte(&self, name: &str) -> Result<Option<i8>, MessageError> {
        self.convert(name, "byte", PropertyValue::as_byte)
    }

    pub fn get_short(&self, name: &str) -> Result<Option<i16>, MessageError> {
        self.convert(name, "short", PropertyValue::as_short)
    }

    pub fn get_int(&self, name: &str) -> Result<Option<i32>, MessageError> {
        self.convert(name, "int", PropertyValue::as_int)
    }

    pub fn get_long(&self, name: &str) -> Result<Option<i64>, MessageError> {
        self.convert(name, "long", PropertyValue::as_long)
    }

    pub fn get_float(&self, name: &str) -> Result<Option<f32>, MessageError> {
        self.convert(name, "float", PropertyValue::as_float)
    }

    pub fn get_double(&self, name: &str) -> Result<Option<f64>, MessageError> {
        self.convert(name, "double", PropertyValue::as_double)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).map(PropertyValue::as_string)
    }

    fn convert<T>(
        &self,
        name: &str,
        requested: &'static str,
        read: impl Fn(&PropertyValue) -> Option<T>,
    ) -> Result<Option<T>, MessageError> {
        convert_value(self.get(name), name, requested, read)
    }
}

/// Apply a typed read to an optional value, turning a failed conversion
/// into a [`MessageError::Format`].
pub(crate) fn convert_value<T>(
    value: Option<&PropertyValue>,
    name: &str,
    requested: &'static str,
    read: impl Fn(&PropertyValue) -> Option<T>,
) -> Result<Option<T>, MessageError> {
    match value {
        None => Ok(None),
        Some(value) => read(value).map(Some).ok_or_else(|| MessageError::Format {
            name: name.to_owned(),
            requested,
            actual: format!("{} {:?}", value.type_name(), value.to_string()),
        }),
    }
}
