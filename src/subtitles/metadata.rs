/*!
 * Metadata values attached to subtitle lines and files.
 *
 * Format handlers store whatever they need for lossless recomposition
 * (styles, cue settings, override tags) as a map of discriminated values.
 */

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An RGBA colour, serialised as `{r,g,b,a}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Colour {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Colour { r, g, b, a }
    }
}

/// A metadata value with a fixed set of shapes.
///
/// The variants are tried in declaration order when deserialising, so the
/// more specific shapes (colour objects) come before the generic map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Colour(Colour),
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    /// The value as a string slice, when it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a boolean, when it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as an integer, when it is one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a nested map, when it is one
    pub fn as_map(&self) -> Option<&BTreeMap<String, MetadataValue>> {
        match self {
            MetadataValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<Colour> for MetadataValue {
    fn from(value: Colour) -> Self {
        MetadataValue::Colour(value)
    }
}

/// Convenience alias for metadata maps used throughout the subtitle tree
pub type Metadata = BTreeMap<String, MetadataValue>;
