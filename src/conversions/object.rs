//! Whole sub-packet object round-trips.
//!
//! These conversions treat one BLOCK item as the buffer of a nested packet:
//! reads explode the block into a field map, writes compose a field map back
//! into raw bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::packet::{Packet, PacketDefinition};
use crate::{Error, Result, Value};

/// BLOCK bytes -> nested object of the sub-packet's converted field values.
#[derive(Debug, Clone)]
pub struct ObjectReadConversion {
    pub(crate) definition: Arc<PacketDefinition>,
}

impl ObjectReadConversion {
    pub fn new(definition: Arc<PacketDefinition>) -> Self {
        Self { definition }
    }

    pub(crate) fn call(&self, value: &Value) -> Result<Value> {
        let bytes = value.as_bytes().ok_or_else(|| {
            Error::Conversion(format!("expected BLOCK bytes, got {}", value.kind()))
        })?;
        let mut fill = Packet::new(self.definition.clone());
        fill.set_buffer(bytes.to_vec())?;
        let mut map = BTreeMap::new();
        for item in self.definition.items() {
            if let Some(v) = fill.read(&item.name)? {
                map.insert(item.name.clone(), v);
            }
        }
        Ok(Value::Object(map))
    }
}

/// Nested object -> BLOCK bytes of the sub-packet's buffer.
///
/// The scratch packet is rebuilt from its defaults on every call, so
/// repeated applications are idempotent and independent of field order
/// across calls.
#[derive(Debug, Clone)]
pub struct ObjectWriteConversion {
    pub(crate) definition: Arc<PacketDefinition>,
}

impl ObjectWriteConversion {
    pub fn new(definition: Arc<PacketDefinition>) -> Self {
        Self { definition }
    }

    pub(crate) fn call(&self, value: &Value) -> Result<Value> {
        let Value::Object(fields) = value else {
            return Err(Error::Conversion(format!(
                "expected an object of field values, got {}",
                value.kind()
            )));
        };
        let mut fill = Packet::new(self.definition.clone());
        fill.restore_defaults()?;
        for (name, field_value) in fields {
            fill.write(name, field_value.clone())?;
        }
        let buffer = fill
            .buffer()
            .ok_or_else(|| Error::Conversion("scratch packet has no byte buffer".to_string()))?;
        Ok(Value::Bytes(buffer.to_vec()))
    }
}
