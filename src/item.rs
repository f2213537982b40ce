//! Item definitions: one named field at a bit-precise location.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::conversions::Conversion;
use crate::{Error, Result, Value};

/// Data type of an item's raw value.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Int,
    Uint,
    Float,
    String,
    Block,
    /// No storage location; the value exists only through a conversion.
    Derived,
    Object,
    Array,
}

impl DataType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Uint => "UINT",
            DataType::Float => "FLOAT",
            DataType::String => "STRING",
            DataType::Block => "BLOCK",
            DataType::Derived => "DERIVED",
            DataType::Object => "OBJECT",
            DataType::Array => "ARRAY",
        }
    }
}

/// Byte order of an item within the buffer.
///
/// Bit offsets are always expressed in big-endian terms regardless of this
/// tag: bit 0 is the most significant bit of byte 0.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Endianness {
    #[serde(rename = "BIG_ENDIAN")]
    Big,
    #[serde(rename = "LITTLE_ENDIAN")]
    Little,
}

/// Policy applied when a written value exceeds the field's representable
/// range.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Overflow {
    /// Out-of-range values fail the write.
    Error,
    /// Like `Error`, but INT fields additionally accept raw bit patterns up
    /// to the unsigned max, e.g. `0xFF` into an 8-bit INT.
    ErrorAllowHex,
    /// Mask to the low-order bits (two's-complement wrap for INT).
    Truncate,
    /// Clamp to the representable min/max.
    Saturate,
}

/// Definition of one named field within a packet. Pure data.
///
/// `bit_offset` is zero-based from the most significant bit of the first
/// byte; negative offsets count back from the end of the buffer. A
/// `bit_size` of 0 means "rest of buffer" and is only legal for STRING and
/// BLOCK items. `array_size` is the total bit length of the whole array
/// (0 meaning "rest of buffer"), and must be a multiple of `bit_size`.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ItemDefinition {
    #[builder(setter(transform = |name: impl Into<String>| name.into().to_uppercase()))]
    pub name: String,
    #[builder(default = 0)]
    pub bit_offset: i64,
    #[builder(default = 0)]
    pub bit_size: u32,
    pub data_type: DataType,
    #[builder(default = Endianness::Big)]
    pub endianness: Endianness,
    #[builder(default, setter(strip_option))]
    pub array_size: Option<i64>,
    #[builder(default = Overflow::Error)]
    pub overflow: Overflow,
    #[builder(default, setter(strip_option))]
    pub default: Option<Value>,
    /// Valid engineering range checked on converted writes.
    #[builder(default, setter(strip_option))]
    pub range: Option<(f64, f64)>,
    /// Location descriptor for document-backed items, e.g. `$.packet.item4[3]`.
    /// Defaults to `$.<name lower-cased>` when absent.
    #[builder(default, setter(strip_option, into))]
    pub key: Option<String>,
    #[builder(default, setter(strip_option))]
    pub read_conversion: Option<Conversion>,
    #[builder(default, setter(strip_option))]
    pub write_conversion: Option<Conversion>,
}

impl ItemDefinition {
    /// Check layout legality. Fatal at definition load time.
    ///
    /// # Errors
    /// [`Error::ItemDefinition`] naming this item and the offending field.
    pub fn validate(&self) -> Result<()> {
        match self.data_type {
            DataType::Derived | DataType::Object | DataType::Array => {}
            DataType::Int | DataType::Uint => {
                if !(1..=64).contains(&self.bit_size) {
                    return Err(Error::item(
                        &self.name,
                        format!(
                            "bit_size must be between 1 and 64 for {}, got {}",
                            self.data_type.as_str(),
                            self.bit_size
                        ),
                    ));
                }
            }
            DataType::Float => {
                if self.bit_size != 32 && self.bit_size != 64 {
                    return Err(Error::item(
                        &self.name,
                        format!("bit_size must be 32 or 64 for FLOAT, got {}", self.bit_size),
                    ));
                }
            }
            DataType::String | DataType::Block => {
                if self.bit_size % 8 != 0 {
                    return Err(Error::item(
                        &self.name,
                        format!(
                            "bit_size must be byte aligned for {}, got {}",
                            self.data_type.as_str(),
                            self.bit_size
                        ),
                    ));
                }
                if self.bit_offset % 8 != 0 {
                    return Err(Error::item(
                        &self.name,
                        format!(
                            "bit_offset must be byte aligned for {}, got {}",
                            self.data_type.as_str(),
                            self.bit_offset
                        ),
                    ));
                }
            }
        }

        if self.data_type != DataType::Derived {
            if self.bit_offset < 0 && self.bit_offset % 8 != 0 {
                return Err(Error::item(
                    &self.name,
                    format!(
                        "negative bit_offset must be byte aligned, got {}",
                        self.bit_offset
                    ),
                ));
            }
            if let Some(array_size) = self.array_size {
                if array_size < 0 {
                    return Err(Error::item(
                        &self.name,
                        format!("array_size must not be negative, got {array_size}"),
                    ));
                }
                if array_size > 0 && self.bit_size > 0 && array_size % i64::from(self.bit_size) != 0
                {
                    return Err(Error::item(
                        &self.name,
                        format!(
                            "array_size {array_size} is not a multiple of bit_size {}",
                            self.bit_size
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Total bits this item occupies, accounting for arrays. Zero for
    /// variable-length and DERIVED items.
    #[must_use]
    pub fn total_bits(&self) -> i64 {
        if self.data_type == DataType::Derived {
            return 0;
        }
        self.array_size.unwrap_or(i64::from(self.bit_size))
    }

    /// The document path for this item when backed by a structured document.
    #[must_use]
    pub fn document_key(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("$.{}", self.name.to_lowercase()),
        }
    }
}

/// Canonical (upper-case) form of an item name for lookups.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    name.to_uppercase()
}
