//! Accessors translate between item definitions and a concrete backing
//! representation.
//!
//! Item definitions are representation agnostic; only the accessor differs.
//! The closed [`Accessor`] variant set is resolved at construction time from
//! the parsed definition and dispatches to the matching backend.

mod binary;
mod json;

pub use binary::BinaryAccessor;
pub use json::JsonAccessor;

use serde_json::Value as Json;

use crate::item::ItemDefinition;
use crate::{Error, Result, Value};

/// The backing representation of one packet instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    /// Flat byte buffer addressed by bit offset and size.
    Bytes(Vec<u8>),
    /// Nested document addressed by item keys.
    Document(Json),
}

impl Representation {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Representation::Bytes(_) => "bytes",
            Representation::Document(_) => "document",
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Representation::Bytes(b) => Some(b),
            Representation::Document(_) => None,
        }
    }

    #[must_use]
    pub fn as_document(&self) -> Option<&Json> {
        match self {
            Representation::Bytes(_) => None,
            Representation::Document(d) => Some(d),
        }
    }
}

/// Accessor kind for a packet. Each kind implements the same read/write
/// contract against its matching [`Representation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accessor {
    #[default]
    Binary,
    Json,
}

impl Accessor {
    /// An empty representation suitable for this accessor.
    #[must_use]
    pub fn empty_representation(&self) -> Representation {
        match self {
            Accessor::Binary => Representation::Bytes(Vec::new()),
            Accessor::Json => Representation::Document(Json::Null),
        }
    }

    /// Read one item's raw value. `Ok(None)` means the location does not
    /// exist in the representation, which is not an error.
    ///
    /// # Errors
    /// [`Error::Structure`] when the representation does not match this
    /// accessor, plus any backend error.
    pub fn read_item(&self, item: &ItemDefinition, source: &Representation) -> Result<Option<Value>> {
        match (self, source) {
            (Accessor::Binary, Representation::Bytes(buffer)) => {
                BinaryAccessor::read_item(item, buffer)
            }
            (Accessor::Json, Representation::Document(document)) => {
                JsonAccessor::read_item(item, document)
            }
            (accessor, source) => Err(Error::Structure(format!(
                "{accessor:?} accessor cannot read a {} representation",
                source.kind()
            ))),
        }
    }

    /// Write one item's raw value in place.
    ///
    /// # Errors
    /// [`Error::Structure`] on representation mismatch, plus any backend
    /// error.
    pub fn write_item(
        &self,
        item: &ItemDefinition,
        value: &Value,
        source: &mut Representation,
    ) -> Result<()> {
        match (self, source) {
            (Accessor::Binary, Representation::Bytes(buffer)) => {
                BinaryAccessor::write_item(item, value, buffer)
            }
            (Accessor::Json, Representation::Document(document)) => {
                JsonAccessor::write_item(item, value, document)
            }
            (accessor, source) => Err(Error::Structure(format!(
                "{accessor:?} accessor cannot write a {} representation",
                source.kind()
            ))),
        }
    }

    /// Batch read; equivalent to per-item [`Self::read_item`] calls in input
    /// order.
    ///
    /// # Errors
    /// First error from any single-item read.
    pub fn read_items<'a, I>(
        &self,
        items: I,
        source: &Representation,
    ) -> Result<Vec<(String, Option<Value>)>>
    where
        I: IntoIterator<Item = &'a ItemDefinition>,
    {
        match source {
            Representation::Bytes(buffer) if *self == Accessor::Binary => {
                BinaryAccessor::read_items(items, buffer)
            }
            Representation::Document(document) if *self == Accessor::Json => {
                JsonAccessor::read_items(items, document)
            }
            source => Err(Error::Structure(format!(
                "{self:?} accessor cannot read a {} representation",
                source.kind()
            ))),
        }
    }

    /// Batch write in input order; overlapping targets resolve to the last
    /// write.
    ///
    /// # Errors
    /// First error from any single-item write.
    pub fn write_items<'a, I>(
        &self,
        items: I,
        values: &[Value],
        source: &mut Representation,
    ) -> Result<()>
    where
        I: IntoIterator<Item = &'a ItemDefinition>,
    {
        match source {
            Representation::Bytes(buffer) if *self == Accessor::Binary => {
                BinaryAccessor::write_items(items, values, buffer)
            }
            Representation::Document(document) if *self == Accessor::Json => {
                JsonAccessor::write_items(items, values, document)
            }
            source => Err(Error::Structure(format!(
                "{self:?} accessor cannot write a {} representation",
                source.kind()
            ))),
        }
    }
}
