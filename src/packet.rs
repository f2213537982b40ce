//! Packet definitions and the packet runtime.
//!
//! A [`PacketDefinition`] is the immutable layout built at configuration
//! load time; a [`Packet`] binds one definition to a concrete
//! [`Representation`] plus reception bookkeeping and runs the read/convert
//! and convert/write flows.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::accessor::{Accessor, Representation};
use crate::item::{canonical_name, DataType, ItemDefinition};
use crate::{Error, Result, Value};

/// Ordered item layout for one packet type.
///
/// Built once by the configuration layer, then shared immutably between
/// every live packet of that type.
#[derive(Debug, Clone, Default)]
pub struct PacketDefinition {
    pub name: String,
    items: Vec<ItemDefinition>,
    index: HashMap<String, usize>,
    /// Next free bit for [`Self::append_item`]. `None` once a
    /// variable-length item ends the fixed layout.
    append_offset: Option<i64>,
}

impl PacketDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: canonical_name(&name.into()),
            items: Vec::new(),
            index: HashMap::new(),
            append_offset: Some(0),
        }
    }

    /// Add an item at its explicit `bit_offset`.
    ///
    /// Overlap with existing items is rejected unless `allow_overlap` is
    /// set; overlapping definitions are legal for aliased views of the same
    /// bytes.
    ///
    /// # Errors
    /// [`Error::ItemDefinition`] for an invalid layout, a duplicate name, or
    /// a disallowed overlap.
    pub fn define_item(&mut self, item: ItemDefinition, allow_overlap: bool) -> Result<()> {
        item.validate()?;
        if self.index.contains_key(&item.name) {
            return Err(Error::item(&item.name, "duplicate item name"));
        }
        if !allow_overlap {
            if let Some(existing) = self.find_overlap(&item) {
                return Err(Error::item(
                    &item.name,
                    format!("overlaps item {existing}"),
                ));
            }
        }
        debug!(
            packet = %self.name,
            item = %item.name,
            bit_offset = item.bit_offset,
            bit_size = item.bit_size,
            "defined item"
        );
        self.index.insert(item.name.clone(), self.items.len());
        self.items.push(item);
        Ok(())
    }

    /// Add an item directly after the previously appended one, computing its
    /// `bit_offset` automatically.
    ///
    /// # Errors
    /// [`Error::ItemDefinition`] for an invalid layout, a duplicate name, or
    /// an append after a variable-length item.
    pub fn append_item(&mut self, mut item: ItemDefinition) -> Result<()> {
        let Some(offset) = self.append_offset else {
            return Err(Error::item(
                &item.name,
                "cannot append after a variable-length item",
            ));
        };
        item.bit_offset = offset;
        let total = item.total_bits();
        let variable = item.data_type != DataType::Derived
            && (item.bit_size == 0 || item.array_size == Some(0));
        self.define_item(item, false)?;
        self.append_offset = if variable { None } else { Some(offset + total) };
        Ok(())
    }

    /// Look an item up by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ItemDefinition> {
        self.index
            .get(&canonical_name(name))
            .map(|&i| &self.items[i])
    }

    /// Items in definition order.
    pub fn items(&self) -> impl Iterator<Item = &ItemDefinition> {
        self.items.iter()
    }

    /// Fixed byte length implied by the positive-offset items. Variable
    /// items contribute only their starting offset.
    #[must_use]
    pub fn defined_length(&self) -> usize {
        let bits = self
            .items
            .iter()
            .filter(|item| item.data_type != DataType::Derived && item.bit_offset >= 0)
            .map(|item| item.bit_offset + item.total_bits())
            .max()
            .unwrap_or(0);
        usize::try_from((bits + 7) / 8).unwrap_or(0)
    }

    fn find_overlap(&self, item: &ItemDefinition) -> Option<&str> {
        let new = Self::occupied_range(item)?;
        for existing in &self.items {
            if let Some(old) = Self::occupied_range(existing) {
                if new.0 < old.1 && old.0 < new.1 {
                    return Some(&existing.name);
                }
            }
        }
        None
    }

    /// Bit range `[start, end)` an item occupies, for positive fixed-size
    /// items only. DERIVED, end-relative, and variable-length items never
    /// conflict.
    fn occupied_range(item: &ItemDefinition) -> Option<(i64, i64)> {
        if item.data_type == DataType::Derived || item.bit_offset < 0 {
            return None;
        }
        let total = item.total_bits();
        if total == 0 {
            return None;
        }
        Some((item.bit_offset, item.bit_offset + total))
    }
}

/// Externally computed statistics for one packet, e.g. watermarks. This
/// crate only reads the results; computing them is the caller's job.
#[derive(Debug, Clone, Default)]
pub struct Processor {
    pub results: HashMap<String, Value>,
}

/// One live packet: a shared definition bound to a concrete representation.
#[derive(Debug, Clone)]
pub struct Packet {
    definition: Arc<PacketDefinition>,
    accessor: Accessor,
    representation: Representation,
    pub processors: HashMap<String, Processor>,
    pub received_time: Option<DateTime<Utc>>,
    pub received_count: u64,
}

impl Packet {
    /// A binary-backed packet with a zeroed buffer of the definition's
    /// fixed length.
    #[must_use]
    pub fn new(definition: Arc<PacketDefinition>) -> Self {
        let length = definition.defined_length();
        Self {
            definition,
            accessor: Accessor::Binary,
            representation: Representation::Bytes(vec![0; length]),
            processors: HashMap::new(),
            received_time: None,
            received_count: 0,
        }
    }

    /// A packet backed by the given accessor's empty representation.
    #[must_use]
    pub fn with_accessor(definition: Arc<PacketDefinition>, accessor: Accessor) -> Self {
        match accessor {
            Accessor::Binary => Self::new(definition),
            accessor => Self {
                definition,
                accessor,
                representation: accessor.empty_representation(),
                processors: HashMap::new(),
                received_time: None,
                received_count: 0,
            },
        }
    }

    #[must_use]
    pub fn definition(&self) -> &Arc<PacketDefinition> {
        &self.definition
    }

    #[must_use]
    pub fn accessor(&self) -> Accessor {
        self.accessor
    }

    #[must_use]
    pub fn representation(&self) -> &Representation {
        &self.representation
    }

    /// The byte buffer, when binary backed.
    #[must_use]
    pub fn buffer(&self) -> Option<&[u8]> {
        self.representation.as_bytes()
    }

    /// Replace the byte buffer wholesale.
    ///
    /// # Errors
    /// [`Error::Structure`] when the packet is not binary backed.
    pub fn set_buffer(&mut self, buffer: Vec<u8>) -> Result<()> {
        match &mut self.representation {
            Representation::Bytes(bytes) => {
                *bytes = buffer;
                Ok(())
            }
            Representation::Document(_) => Err(Error::Structure(
                "cannot set a byte buffer on a document-backed packet".to_string(),
            )),
        }
    }

    /// Replace the document wholesale.
    ///
    /// # Errors
    /// [`Error::Structure`] when the packet is not document backed.
    pub fn set_document(&mut self, document: serde_json::Value) -> Result<()> {
        match &mut self.representation {
            Representation::Document(doc) => {
                *doc = document;
                Ok(())
            }
            Representation::Bytes(_) => Err(Error::Structure(
                "cannot set a document on a binary-backed packet".to_string(),
            )),
        }
    }

    /// Write every item's configured default through its write pipeline.
    ///
    /// # Errors
    /// First error from any default write.
    pub fn restore_defaults(&mut self) -> Result<()> {
        let definition = self.definition.clone();
        for item in definition.items() {
            if let Some(default) = &item.default {
                self.write(&item.name, default.clone())?;
            }
        }
        Ok(())
    }

    /// Read an item's converted value. `Ok(None)` means the location is
    /// absent from the representation.
    ///
    /// # Errors
    /// [`Error::UnknownItem`] for an undefined name, plus accessor and
    /// conversion errors.
    pub fn read(&self, name: &str) -> Result<Option<Value>> {
        let definition = self.definition.clone();
        let item = definition
            .get(name)
            .ok_or_else(|| Error::UnknownItem(canonical_name(name)))?;
        let raw = self.accessor.read_item(item, &self.representation)?;
        match &item.read_conversion {
            Some(conversion) => conversion.apply(raw, self, &self.representation),
            None => Ok(raw),
        }
    }

    /// Read an item's raw value, skipping its read conversion.
    ///
    /// # Errors
    /// [`Error::UnknownItem`] for an undefined name, plus accessor errors.
    pub fn read_raw(&self, name: &str) -> Result<Option<Value>> {
        self.read_raw_in(name, &self.representation)
    }

    /// Raw read against an explicit representation. Lets conversions reach
    /// into the representation they were handed without aliasing the packet.
    pub(crate) fn read_raw_in(
        &self,
        name: &str,
        source: &Representation,
    ) -> Result<Option<Value>> {
        let item = self
            .definition
            .get(name)
            .ok_or_else(|| Error::UnknownItem(canonical_name(name)))?;
        self.accessor.read_item(item, source)
    }

    /// Write an item's value through its write pipeline: write conversion,
    /// range check, then the accessor.
    ///
    /// # Errors
    /// [`Error::UnknownItem`] for an undefined name, [`Error::Access`] for a
    /// value outside the item's declared range, plus conversion and accessor
    /// errors.
    pub fn write(&mut self, name: &str, value: Value) -> Result<()> {
        let definition = self.definition.clone();
        let item = definition
            .get(name)
            .ok_or_else(|| Error::UnknownItem(canonical_name(name)))?;
        let converted = match &item.write_conversion {
            Some(conversion) => conversion
                .apply(Some(value), self, &self.representation)?
                .ok_or_else(|| {
                    Error::Conversion(format!("write conversion for {} produced no value", item.name))
                })?,
            None => value,
        };
        if let Some((min, max)) = item.range {
            if let Some(v) = converted.as_f64() {
                if v < min || v > max {
                    return Err(Error::Access(format!(
                        "value {v} for {} is outside the range {min}..={max}",
                        item.name
                    )));
                }
            }
        }
        self.accessor
            .write_item(item, &converted, &mut self.representation)
    }

    /// Write an item's raw value, skipping its write conversion and range
    /// check.
    ///
    /// # Errors
    /// [`Error::UnknownItem`] for an undefined name, plus accessor errors.
    pub fn write_raw(&mut self, name: &str, value: Value) -> Result<()> {
        let definition = self.definition.clone();
        let item = definition
            .get(name)
            .ok_or_else(|| Error::UnknownItem(canonical_name(name)))?;
        self.accessor
            .write_item(item, &value, &mut self.representation)
    }

    /// Converted values of every item, in definition order.
    ///
    /// # Errors
    /// First error from any single read.
    pub fn read_all(&self) -> Result<Vec<(String, Option<Value>)>> {
        let definition = self.definition.clone();
        let mut out = Vec::with_capacity(definition.items.len());
        for item in definition.items() {
            out.push((item.name.clone(), self.read(&item.name)?));
        }
        Ok(out)
    }
}
