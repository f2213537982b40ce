//! Time and reception bookkeeping conversions.

use chrono::DateTime;

use crate::accessor::Representation;
use crate::packet::Packet;
use crate::{Error, Result, Value};

pub(crate) const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";
const NO_RECEIVED_TIME: &str = "No Packet Received Time";

pub(crate) fn received_time_formatted(packet: &Packet) -> Value {
    match packet.received_time {
        Some(time) => Value::String(time.format(TIME_FORMAT).to_string()),
        None => Value::String(NO_RECEIVED_TIME.to_string()),
    }
}

pub(crate) fn received_time_seconds(packet: &Packet) -> Value {
    match packet.received_time {
        Some(time) => Value::Float(
            time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1e6,
        ),
        None => Value::Float(0.0),
    }
}

/// Output form of a [`UnixTimeConversion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixTimeFormat {
    /// Floating point seconds since the unix epoch.
    Seconds,
    /// `YYYY/MM/DD HH:MM:SS.ffffff` UTC.
    Formatted,
}

/// Builds a timestamp from a seconds item (and optional microseconds item)
/// elsewhere in the packet. The incoming value is ignored; the conversion
/// reaches back into the packet's representation.
#[derive(Debug, Clone, PartialEq)]
pub struct UnixTimeConversion {
    pub(crate) seconds_item: String,
    pub(crate) microseconds_item: Option<String>,
    pub(crate) format: UnixTimeFormat,
}

impl UnixTimeConversion {
    pub fn new(
        seconds_item: impl Into<String>,
        microseconds_item: Option<String>,
        format: UnixTimeFormat,
    ) -> Self {
        Self {
            seconds_item: seconds_item.into().to_uppercase(),
            microseconds_item: microseconds_item.map(|name| name.to_uppercase()),
            format,
        }
    }

    pub(crate) fn call(&self, packet: &Packet, source: &Representation) -> Result<Value> {
        let seconds = packet
            .read_raw_in(&self.seconds_item, source)?
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                Error::Conversion(format!("no value for seconds item {}", self.seconds_item))
            })?;
        let micros = match &self.microseconds_item {
            Some(name) => packet
                .read_raw_in(name, source)?
                .and_then(|v| v.as_f64())
                .ok_or_else(|| {
                    Error::Conversion(format!("no value for microseconds item {name}"))
                })?,
            None => 0.0,
        };
        let total = seconds + micros / 1e6;
        match self.format {
            UnixTimeFormat::Seconds => Ok(Value::Float(total)),
            UnixTimeFormat::Formatted => {
                let secs = total.div_euclid(1.0) as i64;
                let nanos = (total.rem_euclid(1.0) * 1e9).round() as u32;
                let time = DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
                    Error::Conversion(format!("timestamp {total} is out of range"))
                })?;
                Ok(Value::String(time.format(TIME_FORMAT).to_string()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::item::{DataType, ItemDefinition};
    use crate::packet::PacketDefinition;
    use chrono::Utc;
    use std::sync::Arc;

    fn time_packet() -> Packet {
        let mut def = PacketDefinition::new("TIME");
        def.define_item(
            ItemDefinition::builder()
                .name("TIMESEC")
                .bit_offset(0)
                .bit_size(32)
                .data_type(DataType::Uint)
                .build(),
            false,
        )
        .unwrap();
        def.define_item(
            ItemDefinition::builder()
                .name("TIMEUS")
                .bit_offset(32)
                .bit_size(32)
                .data_type(DataType::Uint)
                .build(),
            false,
        )
        .unwrap();
        Packet::new(Arc::new(def))
    }

    #[test]
    fn unix_time_seconds() {
        let mut packet = time_packet();
        packet.write("TIMESEC", Value::Uint(1_577_836_800)).unwrap();
        packet.write("TIMEUS", Value::Uint(500_000)).unwrap();

        let c = UnixTimeConversion::new(
            "timesec",
            Some("timeus".to_string()),
            UnixTimeFormat::Seconds,
        );
        let value = c.call(&packet, packet.representation()).unwrap();
        assert_eq!(value, Value::Float(1_577_836_800.5));
    }

    #[test]
    fn unix_time_formatted() {
        let mut packet = time_packet();
        // 2020-01-01T00:00:00Z
        packet.write("TIMESEC", Value::Uint(1_577_836_800)).unwrap();
        packet.write("TIMEUS", Value::Uint(250_000)).unwrap();

        let c = UnixTimeConversion::new("TIMESEC", Some("TIMEUS".to_string()), UnixTimeFormat::Formatted);
        let value = c.call(&packet, packet.representation()).unwrap();
        assert_eq!(value, Value::String("2020/01/01 00:00:00.250000".to_string()));
    }

    #[test]
    fn missing_seconds_item_is_an_error() {
        let packet = Packet::new(Arc::new(PacketDefinition::new("EMPTY")));
        let c = UnixTimeConversion::new("NOPE", None, UnixTimeFormat::Seconds);
        assert!(c.call(&packet, packet.representation()).is_err());
    }

    #[test]
    fn received_time_defaults() {
        let mut packet = time_packet();
        assert_eq!(
            received_time_formatted(&packet),
            Value::String("No Packet Received Time".to_string())
        );
        assert_eq!(received_time_seconds(&packet), Value::Float(0.0));

        packet.received_time = Some(Utc::now());
        let Value::Float(seconds) = received_time_seconds(&packet) else {
            panic!("expected float");
        };
        assert!(seconds > 0.0);
    }
}
