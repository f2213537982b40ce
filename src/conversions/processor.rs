//! Lookup of externally computed processor results.

use crate::item::DataType;
use crate::packet::Packet;
use crate::Value;

/// Retrieves a named result from one of the packet's processors.
///
/// Processors are owned and updated outside this crate; this conversion
/// only looks results up. A result that has not been computed yet yields a
/// fixed default of `0` so downstream consumers never branch on "missing".
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorConversion {
    processor_name: String,
    result_name: String,
    pub(crate) converted_type: Option<DataType>,
    pub(crate) converted_bit_size: Option<u32>,
    pub(crate) converted_array_size: Option<i64>,
}

impl ProcessorConversion {
    pub fn new(
        processor_name: impl Into<String>,
        result_name: impl Into<String>,
        converted_type: Option<DataType>,
        converted_bit_size: Option<u32>,
        converted_array_size: Option<i64>,
    ) -> Self {
        Self {
            processor_name: processor_name.into().to_uppercase(),
            result_name: result_name.into().to_uppercase(),
            converted_type,
            converted_bit_size,
            converted_array_size,
        }
    }

    #[must_use]
    pub fn processor_name(&self) -> &str {
        &self.processor_name
    }

    #[must_use]
    pub fn result_name(&self) -> &str {
        &self.result_name
    }

    pub(crate) fn call(&self, packet: &Packet) -> Value {
        packet
            .processors
            .get(&self.processor_name)
            .and_then(|processor| processor.results.get(&self.result_name))
            .cloned()
            .unwrap_or(Value::Int(0))
    }
}
