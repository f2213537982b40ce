//! Post-decode value conversions.
//!
//! Conversions are attached to item definitions and run after a raw read
//! (read conversions) or before a raw write (write conversions). The set is
//! closed: every kind the definition language can name is a variant of
//! [`Conversion`].

mod generic;
mod object;
mod polynomial;
mod processor;
mod time;

pub use generic::GenericConversion;
pub use object::{ObjectReadConversion, ObjectWriteConversion};
pub use polynomial::{PolynomialConversion, SegmentedPolynomialConversion};
pub use processor::ProcessorConversion;
pub use time::{UnixTimeConversion, UnixTimeFormat};

use crate::accessor::Representation;
use crate::item::DataType;
use crate::packet::Packet;
use crate::{Error, Result, Value};

/// Reverses the bit order of an integer field, e.g. `0b0000_0001` over 8
/// bits becomes `0b1000_0000`. Self-inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitReverseConversion {
    pub(crate) data_type: DataType,
    pub(crate) bit_size: u32,
}

impl BitReverseConversion {
    /// # Errors
    /// [`Error::Conversion`] unless the type is INT or UINT with a bit size
    /// of 1 through 64.
    pub fn new(data_type: DataType, bit_size: u32) -> Result<Self> {
        if !matches!(data_type, DataType::Int | DataType::Uint) {
            return Err(Error::Conversion(format!(
                "bit reversal requires INT or UINT, got {}",
                data_type.as_str()
            )));
        }
        if !(1..=64).contains(&bit_size) {
            return Err(Error::Conversion(format!(
                "bit reversal requires a bit size between 1 and 64, got {bit_size}"
            )));
        }
        Ok(Self {
            data_type,
            bit_size,
        })
    }

    pub(crate) fn call(&self, value: &Value) -> Result<Value> {
        let pattern = match value {
            Value::Int(v) => *v as u64,
            Value::Uint(v) => *v,
            other => {
                return Err(Error::Conversion(format!(
                    "cannot bit-reverse {}",
                    other.kind()
                )))
            }
        };
        let mask = if self.bit_size == 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_size) - 1
        };
        let reversed = (pattern & mask).reverse_bits() >> (64 - self.bit_size);
        match self.data_type {
            DataType::Int => {
                let signed = if self.bit_size < 64 && reversed & (1 << (self.bit_size - 1)) != 0 {
                    (reversed | !0u64 << self.bit_size) as i64
                } else {
                    reversed as i64
                };
                Ok(Value::Int(signed))
            }
            _ => Ok(Value::Uint(reversed)),
        }
    }
}

/// One conversion step in an item's read or write pipeline.
#[derive(Debug, Clone)]
pub enum Conversion {
    /// Pass-through. Present so a pipeline slot is never `None`-with-meaning.
    Identity,
    Polynomial(PolynomialConversion),
    SegmentedPolynomial(SegmentedPolynomialConversion),
    Generic(GenericConversion),
    Processor(ProcessorConversion),
    ReceivedTimeFormatted,
    ReceivedTimeSeconds,
    ReceivedCount,
    UnixTime(UnixTimeConversion),
    BitReverse(BitReverseConversion),
    ObjectRead(ObjectReadConversion),
    ObjectWrite(ObjectWriteConversion),
}

impl Conversion {
    /// Run the conversion.
    ///
    /// `value` is the raw (read) or requested (write) value; it is `None`
    /// when the item is absent from the buffer. Value-driven conversions
    /// propagate absence untouched; packet-driven conversions (processor,
    /// time, count) produce a value regardless.
    ///
    /// # Errors
    /// [`Error::Conversion`] when the value's shape does not fit the
    /// conversion, plus whatever a nested packet read/write raises.
    pub fn apply(
        &self,
        value: Option<Value>,
        packet: &Packet,
        source: &Representation,
    ) -> Result<Option<Value>> {
        match self {
            Conversion::Identity => Ok(value),
            Conversion::Polynomial(c) => value.map(|v| c.call(&v)).transpose(),
            Conversion::SegmentedPolynomial(c) => value.map(|v| c.call(&v)).transpose(),
            Conversion::Generic(c) => value.map(|v| c.call(&v)).transpose(),
            Conversion::Processor(c) => Ok(Some(c.call(packet))),
            Conversion::ReceivedTimeFormatted => Ok(Some(time::received_time_formatted(packet))),
            Conversion::ReceivedTimeSeconds => Ok(Some(time::received_time_seconds(packet))),
            Conversion::ReceivedCount => Ok(Some(Value::Uint(packet.received_count))),
            Conversion::UnixTime(c) => c.call(packet, source).map(Some),
            Conversion::BitReverse(c) => value.map(|v| c.call(&v)).transpose(),
            Conversion::ObjectRead(c) => value.map(|v| c.call(&v)).transpose(),
            Conversion::ObjectWrite(c) => value.map(|v| c.call(&v)).transpose(),
        }
    }

    /// The data type this conversion produces, when it declares one.
    #[must_use]
    pub fn converted_type(&self) -> Option<DataType> {
        match self {
            Conversion::Identity => None,
            Conversion::Polynomial(_) | Conversion::SegmentedPolynomial(_) => {
                Some(DataType::Float)
            }
            Conversion::Generic(c) => c.converted_type,
            Conversion::Processor(c) => c.converted_type,
            Conversion::ReceivedTimeFormatted => Some(DataType::String),
            Conversion::ReceivedTimeSeconds => Some(DataType::Float),
            Conversion::ReceivedCount => Some(DataType::Uint),
            Conversion::UnixTime(c) => Some(match c.format {
                UnixTimeFormat::Seconds => DataType::Float,
                UnixTimeFormat::Formatted => DataType::String,
            }),
            Conversion::BitReverse(c) => Some(c.data_type),
            Conversion::ObjectRead(_) => Some(DataType::Object),
            Conversion::ObjectWrite(_) => Some(DataType::Block),
        }
    }

    /// The bit size of the produced value, when it declares one.
    #[must_use]
    pub fn converted_bit_size(&self) -> Option<u32> {
        match self {
            Conversion::Polynomial(_)
            | Conversion::SegmentedPolynomial(_)
            | Conversion::ReceivedTimeSeconds => Some(64),
            Conversion::Generic(c) => c.converted_bit_size,
            Conversion::Processor(c) => c.converted_bit_size,
            Conversion::ReceivedCount => Some(32),
            Conversion::UnixTime(c) => match c.format {
                UnixTimeFormat::Seconds => Some(64),
                UnixTimeFormat::Formatted => None,
            },
            Conversion::BitReverse(c) => Some(c.bit_size),
            _ => None,
        }
    }

    /// The array size of the produced value, when it declares one.
    #[must_use]
    pub fn converted_array_size(&self) -> Option<i64> {
        match self {
            Conversion::Processor(c) => c.converted_array_size,
            _ => None,
        }
    }

    /// The ordered argument list the conversion was constructed with.
    #[must_use]
    pub fn params(&self) -> Vec<String> {
        match self {
            Conversion::Identity
            | Conversion::ReceivedTimeFormatted
            | Conversion::ReceivedTimeSeconds
            | Conversion::ReceivedCount => vec![],
            Conversion::Polynomial(c) => {
                c.coefficients().iter().map(ToString::to_string).collect()
            }
            Conversion::SegmentedPolynomial(c) => c
                .segments()
                .iter()
                .flat_map(|(lower, coefficients)| {
                    std::iter::once(lower.to_string())
                        .chain(coefficients.iter().map(ToString::to_string))
                })
                .collect(),
            Conversion::Generic(c) => vec![c.code().to_string()],
            Conversion::Processor(c) => {
                let mut params =
                    vec![c.processor_name().to_string(), c.result_name().to_string()];
                if let Some(data_type) = c.converted_type {
                    params.push(data_type.as_str().to_string());
                }
                if let Some(bit_size) = c.converted_bit_size {
                    params.push(bit_size.to_string());
                }
                params
            }
            Conversion::UnixTime(c) => {
                let mut params = vec![c.seconds_item.clone()];
                if let Some(micro) = &c.microseconds_item {
                    params.push(micro.clone());
                }
                params
            }
            Conversion::BitReverse(c) => {
                vec![c.data_type.as_str().to_string(), c.bit_size.to_string()]
            }
            Conversion::ObjectRead(c) => vec![c.definition.name.clone()],
            Conversion::ObjectWrite(c) => vec![c.definition.name.clone()],
        }
    }

    /// Deterministic definition-language form of this conversion.
    ///
    /// `read_or_write` is `"READ"` or `"WRITE"`. Polynomials and generic
    /// formulas use their dedicated keywords; everything else uses the
    /// generic `{READ,WRITE}_CONVERSION <name> <params>` line. Identity
    /// produces nothing.
    #[must_use]
    pub fn to_config(&self, read_or_write: &str) -> String {
        let rw = read_or_write.to_uppercase();
        match self {
            Conversion::Identity => String::new(),
            Conversion::Polynomial(_) => {
                format!("    POLY_{rw}_CONVERSION {}\n", self.params().join(" "))
            }
            Conversion::SegmentedPolynomial(c) => c
                .segments()
                .iter()
                .map(|(lower, coefficients)| {
                    let coeffs: Vec<String> =
                        coefficients.iter().map(ToString::to_string).collect();
                    format!("    SEG_POLY_{rw}_CONVERSION {lower} {}\n", coeffs.join(" "))
                })
                .collect(),
            Conversion::Generic(c) => format!(
                "    GENERIC_{rw}_CONVERSION_START\n{}\n    GENERIC_{rw}_CONVERSION_END\n",
                c.code()
            ),
            _ => {
                let name = match self {
                    Conversion::Processor(_) => "processor_conversion",
                    Conversion::ReceivedTimeFormatted => "received_time_formatted_conversion",
                    Conversion::ReceivedTimeSeconds => "received_time_seconds_conversion",
                    Conversion::ReceivedCount => "received_count_conversion",
                    Conversion::UnixTime(c) => match c.format {
                        UnixTimeFormat::Seconds => "unix_time_seconds_conversion",
                        UnixTimeFormat::Formatted => "unix_time_formatted_conversion",
                    },
                    Conversion::BitReverse(_) => "bit_reverse_conversion",
                    Conversion::ObjectRead(_) => "object_read_conversion",
                    Conversion::ObjectWrite(_) => "object_write_conversion",
                    _ => unreachable!(),
                };
                let params = self.params();
                if params.is_empty() {
                    format!("    {rw}_CONVERSION {name}\n")
                } else {
                    format!("    {rw}_CONVERSION {name} {}\n", params.join(" "))
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::PacketDefinition;
    use std::sync::Arc;

    fn context() -> Packet {
        Packet::new(Arc::new(PacketDefinition::new("CTX")))
    }

    #[test]
    fn identity_passes_values_and_absence_through() {
        let packet = context();
        let source = packet.representation().clone();
        assert_eq!(
            Conversion::Identity
                .apply(Some(Value::Int(5)), &packet, &source)
                .unwrap(),
            Some(Value::Int(5))
        );
        assert_eq!(
            Conversion::Identity.apply(None, &packet, &source).unwrap(),
            None
        );
    }

    #[test]
    fn value_conversions_propagate_absence() {
        let packet = context();
        let source = packet.representation().clone();
        let c = Conversion::Polynomial(PolynomialConversion::new(vec![1.0, 2.0]).unwrap());
        assert_eq!(c.apply(None, &packet, &source).unwrap(), None);
        assert_eq!(
            c.apply(Some(Value::Int(2)), &packet, &source).unwrap(),
            Some(Value::Float(5.0))
        );
    }

    #[test]
    fn received_count_reads_the_packet() {
        let mut packet = context();
        packet.received_count = 7;
        let source = packet.representation().clone();
        assert_eq!(
            Conversion::ReceivedCount.apply(None, &packet, &source).unwrap(),
            Some(Value::Uint(7))
        );
    }

    #[test]
    fn bit_reverse_is_self_inverse() {
        let c = BitReverseConversion::new(DataType::Uint, 8).unwrap();
        assert_eq!(c.call(&Value::Uint(0b0000_0001)).unwrap(), Value::Uint(0b1000_0000));
        let once = c.call(&Value::Uint(0xa5)).unwrap();
        assert_eq!(c.call(&once).unwrap(), Value::Uint(0xa5));
    }

    #[test]
    fn bit_reverse_sign_extends_int() {
        let c = BitReverseConversion::new(DataType::Int, 4).unwrap();
        // 0b0001 -> 0b1000 = -8 over 4 bits
        assert_eq!(c.call(&Value::Int(1)).unwrap(), Value::Int(-8));
    }

    #[test]
    fn bit_reverse_rejects_bad_shapes() {
        assert!(BitReverseConversion::new(DataType::Float, 32).is_err());
        assert!(BitReverseConversion::new(DataType::Uint, 0).is_err());
        assert!(BitReverseConversion::new(DataType::Uint, 65).is_err());
    }

    #[test]
    fn converted_shapes() {
        let poly = Conversion::Polynomial(PolynomialConversion::new(vec![0.0]).unwrap());
        assert_eq!(poly.converted_type(), Some(DataType::Float));
        assert_eq!(poly.converted_bit_size(), Some(64));
        assert_eq!(poly.converted_array_size(), None);

        assert_eq!(
            Conversion::ReceivedTimeFormatted.converted_type(),
            Some(DataType::String)
        );
        assert_eq!(Conversion::ReceivedCount.converted_bit_size(), Some(32));
    }

    #[test]
    fn config_lines() {
        let poly = Conversion::Polynomial(PolynomialConversion::new(vec![1.0, 2.5]).unwrap());
        assert_eq!(poly.to_config("READ"), "    POLY_READ_CONVERSION 1 2.5\n");

        let seg = Conversion::SegmentedPolynomial(
            SegmentedPolynomialConversion::new(vec![(0.0, vec![1.0]), (10.0, vec![2.0])]).unwrap(),
        );
        assert_eq!(
            seg.to_config("write"),
            "    SEG_POLY_WRITE_CONVERSION 10 2\n    SEG_POLY_WRITE_CONVERSION 0 1\n"
        );

        let generic =
            Conversion::Generic(GenericConversion::new("value * 2", None, None).unwrap());
        assert_eq!(
            generic.to_config("READ"),
            "    GENERIC_READ_CONVERSION_START\nvalue * 2\n    GENERIC_READ_CONVERSION_END\n"
        );

        let processor = Conversion::Processor(ProcessorConversion::new(
            "stats",
            "max",
            Some(DataType::Float),
            Some(64),
            None,
        ));
        assert_eq!(
            processor.to_config("READ"),
            "    READ_CONVERSION processor_conversion STATS MAX FLOAT 64\n"
        );

        assert_eq!(Conversion::Identity.to_config("READ"), "");
    }
}
