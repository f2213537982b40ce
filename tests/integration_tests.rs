use std::collections::BTreeMap;
use std::sync::Arc;

use telepack::conversions::{
    Conversion, GenericConversion, ObjectReadConversion, ObjectWriteConversion,
    PolynomialConversion, UnixTimeConversion, UnixTimeFormat,
};
use telepack::{
    Accessor, DataType, Endianness, ItemDefinition, Overflow, Packet, PacketDefinition, Processor,
    Value,
};

fn health_definition() -> PacketDefinition {
    let mut def = PacketDefinition::new("HEALTH_STATUS");
    def.append_item(
        ItemDefinition::builder()
            .name("VERSION")
            .bit_size(3)
            .data_type(DataType::Uint)
            .build(),
    )
    .unwrap();
    def.append_item(
        ItemDefinition::builder()
            .name("TYPE")
            .bit_size(1)
            .data_type(DataType::Uint)
            .build(),
    )
    .unwrap();
    def.append_item(
        ItemDefinition::builder()
            .name("APID")
            .bit_size(12)
            .data_type(DataType::Uint)
            .build(),
    )
    .unwrap();
    def.append_item(
        ItemDefinition::builder()
            .name("TEMP1")
            .bit_size(16)
            .data_type(DataType::Int)
            .build(),
    )
    .unwrap();
    def.append_item(
        ItemDefinition::builder()
            .name("LABEL")
            .bit_size(64)
            .data_type(DataType::String)
            .build(),
    )
    .unwrap();
    def
}

#[test]
fn define_write_read_round_trip() {
    let mut packet = Packet::new(Arc::new(health_definition()));
    packet.write("VERSION", Value::Uint(0b101)).unwrap();
    packet.write("TYPE", Value::Uint(1)).unwrap();
    packet.write("APID", Value::Uint(0x7ff)).unwrap();
    packet.write("TEMP1", Value::Int(-1200)).unwrap();
    packet.write("LABEL", Value::String("OK".to_string())).unwrap();

    assert_eq!(packet.read("VERSION").unwrap(), Some(Value::Uint(5)));
    assert_eq!(packet.read("TYPE").unwrap(), Some(Value::Uint(1)));
    assert_eq!(packet.read("APID").unwrap(), Some(Value::Uint(0x7ff)));
    assert_eq!(packet.read("TEMP1").unwrap(), Some(Value::Int(-1200)));
    assert_eq!(
        packet.read("LABEL").unwrap(),
        Some(Value::String("OK".to_string()))
    );

    // The first two bytes pack version/type/apid most significant bit first
    let buffer = packet.buffer().unwrap();
    assert_eq!(buffer[0], 0b1011_0111);
    assert_eq!(buffer[1], 0xff);
}

#[test]
fn decode_a_captured_hex_dump() {
    let mut packet = Packet::new(Arc::new(health_definition()));
    packet
        .set_buffer(hex::decode("b7fffb504f4b000000000000").unwrap())
        .unwrap();
    assert_eq!(packet.read("VERSION").unwrap(), Some(Value::Uint(5)));
    assert_eq!(packet.read("APID").unwrap(), Some(Value::Uint(0x7ff)));
    assert_eq!(packet.read("TEMP1").unwrap(), Some(Value::Int(-1200)));
    assert_eq!(
        packet.read("LABEL").unwrap(),
        Some(Value::String("OK".to_string()))
    );
}

// Three fields packed into two bytes, the middle one little-endian: writing
// through the packet reproduces the documented layout and reads it back.
#[test]
fn little_endian_bitfield_layout_through_the_packet() {
    let mut def = PacketDefinition::new("PACKED");
    def.define_item(
        ItemDefinition::builder()
            .name("A")
            .bit_offset(4)
            .bit_size(4)
            .data_type(DataType::Uint)
            .build(),
        false,
    )
    .unwrap();
    def.define_item(
        ItemDefinition::builder()
            .name("C")
            .bit_offset(8)
            .bit_size(4)
            .data_type(DataType::Uint)
            .build(),
        false,
    )
    .unwrap();
    def.define_item(
        ItemDefinition::builder()
            .name("B")
            .bit_offset(12)
            .bit_size(8)
            .data_type(DataType::Uint)
            .endianness(Endianness::Little)
            .build(),
        true,
    )
    .unwrap();

    let mut packet = Packet::new(Arc::new(def));
    packet.set_buffer(vec![0xab, 0xcd]).unwrap();
    assert_eq!(packet.read("A").unwrap(), Some(Value::Uint(0xb)));
    assert_eq!(packet.read("C").unwrap(), Some(Value::Uint(0xc)));
    assert_eq!(packet.read("B").unwrap(), Some(Value::Uint(0xda)));

    packet.set_buffer(vec![0, 0]).unwrap();
    packet.write("A", Value::Uint(0xb)).unwrap();
    packet.write("B", Value::Uint(0xda)).unwrap();
    packet.write("C", Value::Uint(0xc)).unwrap();
    assert_eq!(packet.buffer().unwrap(), [0xab, 0xcd]);
}

#[test]
fn fixed_array_partial_rewrite() {
    let mut def = PacketDefinition::new("ARRAYS");
    let mut samples = ItemDefinition::builder()
        .name("SAMPLES")
        .bit_size(16)
        .data_type(DataType::Uint)
        .build();
    samples.array_size = Some(64);
    def.define_item(samples, false).unwrap();

    let mut packet = Packet::new(Arc::new(def));
    packet
        .write(
            "SAMPLES",
            Value::Array(vec![
                Value::Uint(1),
                Value::Uint(2),
                Value::Uint(3),
                Value::Uint(4),
            ]),
        )
        .unwrap();
    packet
        .write(
            "SAMPLES",
            Value::Array(vec![
                Value::Uint(1),
                Value::Uint(2),
                Value::Uint(99),
                Value::Uint(4),
            ]),
        )
        .unwrap();
    assert_eq!(
        packet.read("SAMPLES").unwrap(),
        Some(Value::Array(vec![
            Value::Uint(1),
            Value::Uint(2),
            Value::Uint(99),
            Value::Uint(4),
        ]))
    );

    // Element count must match the declared size exactly
    assert!(packet
        .write("SAMPLES", Value::Array(vec![Value::Uint(1)]))
        .is_err());
}

#[test]
fn float_sentinels_round_trip_on_both_accessors() {
    let mut def = PacketDefinition::new("FLOATS");
    def.append_item(
        ItemDefinition::builder()
            .name("F64")
            .bit_size(64)
            .data_type(DataType::Float)
            .build(),
    )
    .unwrap();
    let def = Arc::new(def);

    for accessor in [Accessor::Binary, Accessor::Json] {
        let mut packet = Packet::with_accessor(def.clone(), accessor);
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.25] {
            packet.write("F64", Value::Float(value)).unwrap();
            let Some(Value::Float(back)) = packet.read("F64").unwrap() else {
                panic!("expected a float from {accessor:?}");
            };
            if value.is_nan() {
                assert!(back.is_nan(), "{accessor:?}");
            } else {
                assert_eq!(back, value, "{accessor:?}");
            }
        }
    }
}

#[test]
fn overflow_policies_through_the_packet() {
    let mut def = PacketDefinition::new("OVERFLOW");
    for (name, overflow) in [
        ("ERR", Overflow::Error),
        ("HEX", Overflow::ErrorAllowHex),
        ("TRUNC", Overflow::Truncate),
        ("SAT", Overflow::Saturate),
    ] {
        let mut item = ItemDefinition::builder()
            .name(name)
            .bit_size(8)
            .data_type(DataType::Int)
            .build();
        item.bit_offset = match name {
            "ERR" => 0,
            "HEX" => 8,
            "TRUNC" => 16,
            _ => 24,
        };
        item.overflow = overflow;
        def.define_item(item, false).unwrap();
    }

    let mut packet = Packet::new(Arc::new(def));
    assert!(packet.write("ERR", Value::Int(128)).is_err());
    // 0xFF is accepted as a raw bit pattern and reads back as -1
    packet.write("HEX", Value::Int(0xff)).unwrap();
    assert_eq!(packet.read("HEX").unwrap(), Some(Value::Int(-1)));
    // Two's-complement wrap
    packet.write("TRUNC", Value::Int(130)).unwrap();
    assert_eq!(packet.read("TRUNC").unwrap(), Some(Value::Int(-126)));
    // Clamp
    packet.write("SAT", Value::Int(1000)).unwrap();
    assert_eq!(packet.read("SAT").unwrap(), Some(Value::Int(127)));
}

#[test]
fn conversion_pipeline_end_to_end() {
    let mut def = PacketDefinition::new("EPS");
    let mut volts = ItemDefinition::builder()
        .name("BUS_VOLTS")
        .bit_size(16)
        .data_type(DataType::Uint)
        .build();
    volts.read_conversion = Some(Conversion::Polynomial(
        PolynomialConversion::new(vec![0.0, 0.001]).unwrap(),
    ));
    def.append_item(volts).unwrap();

    let mut doubled = ItemDefinition::builder()
        .name("DOUBLED")
        .bit_size(8)
        .data_type(DataType::Uint)
        .build();
    doubled.read_conversion = Some(Conversion::Generic(
        GenericConversion::new("value * 2", Some(DataType::Int), Some(32)).unwrap(),
    ));
    def.append_item(doubled).unwrap();

    let mut max_volts = ItemDefinition::builder()
        .name("MAX_VOLTS")
        .data_type(DataType::Derived)
        .build();
    max_volts.read_conversion = Some(Conversion::Processor(
        telepack::conversions::ProcessorConversion::new(
            "WATERMARKS",
            "MAX",
            Some(DataType::Float),
            Some(64),
            None,
        ),
    ));
    def.append_item(max_volts).unwrap();

    let mut count = ItemDefinition::builder()
        .name("RX_COUNT")
        .data_type(DataType::Derived)
        .build();
    count.read_conversion = Some(Conversion::ReceivedCount);
    def.append_item(count).unwrap();

    let mut packet = Packet::new(Arc::new(def));
    packet.write_raw("BUS_VOLTS", Value::Uint(12500)).unwrap();
    packet.received_count = 42;
    let mut processor = Processor::default();
    processor.results.insert("MAX".to_string(), Value::Float(12.6));
    packet.processors.insert("WATERMARKS".to_string(), processor);

    packet.write_raw("DOUBLED", Value::Uint(21)).unwrap();

    assert_eq!(packet.read("BUS_VOLTS").unwrap(), Some(Value::Float(12.5)));
    assert_eq!(packet.read_raw("BUS_VOLTS").unwrap(), Some(Value::Uint(12500)));
    assert_eq!(packet.read("DOUBLED").unwrap(), Some(Value::Int(42)));
    // Derived items have no storage; their value exists only through a
    // packet-driven conversion
    assert_eq!(packet.read_raw("MAX_VOLTS").unwrap(), None);
    assert_eq!(packet.read("MAX_VOLTS").unwrap(), Some(Value::Float(12.6)));
    assert_eq!(packet.read("RX_COUNT").unwrap(), Some(Value::Uint(42)));
}

#[test]
fn unix_time_from_sibling_items() {
    let mut def = PacketDefinition::new("TIMED");
    def.append_item(
        ItemDefinition::builder()
            .name("TIMESEC")
            .bit_size(32)
            .data_type(DataType::Uint)
            .build(),
    )
    .unwrap();
    def.append_item(
        ItemDefinition::builder()
            .name("TIMEUS")
            .bit_size(32)
            .data_type(DataType::Uint)
            .build(),
    )
    .unwrap();
    let mut stamp = ItemDefinition::builder()
        .name("TIMESTAMP")
        .data_type(DataType::Derived)
        .build();
    stamp.read_conversion = Some(Conversion::UnixTime(UnixTimeConversion::new(
        "TIMESEC",
        Some("TIMEUS".to_string()),
        UnixTimeFormat::Formatted,
    )));
    def.append_item(stamp).unwrap();

    let mut packet = Packet::new(Arc::new(def));
    // 2020-01-01T00:00:00.5Z
    packet.write("TIMESEC", Value::Uint(1_577_836_800)).unwrap();
    packet.write("TIMEUS", Value::Uint(500_000)).unwrap();
    assert_eq!(
        packet.read("TIMESTAMP").unwrap(),
        Some(Value::String("2020/01/01 00:00:00.500000".to_string()))
    );
}

#[test]
fn nested_object_block_round_trip() {
    let mut sub = PacketDefinition::new("GPS");
    sub.append_item(
        ItemDefinition::builder()
            .name("LOCKED")
            .bit_size(8)
            .data_type(DataType::Uint)
            .build(),
    )
    .unwrap();
    sub.append_item(
        ItemDefinition::builder()
            .name("SATS")
            .bit_size(8)
            .data_type(DataType::Uint)
            .default(Value::Uint(0))
            .build(),
    )
    .unwrap();
    let sub = Arc::new(sub);

    let mut def = PacketDefinition::new("NAV");
    let mut gps = ItemDefinition::builder()
        .name("GPS")
        .bit_size(16)
        .data_type(DataType::Block)
        .build();
    gps.read_conversion = Some(Conversion::ObjectRead(ObjectReadConversion::new(
        sub.clone(),
    )));
    gps.write_conversion = Some(Conversion::ObjectWrite(ObjectWriteConversion::new(sub)));
    def.append_item(gps).unwrap();

    let mut packet = Packet::new(Arc::new(def));
    let mut fields = BTreeMap::new();
    fields.insert("LOCKED".to_string(), Value::Uint(1));
    fields.insert("SATS".to_string(), Value::Uint(9));
    packet.write("GPS", Value::Object(fields.clone())).unwrap();
    assert_eq!(packet.buffer().unwrap(), [1, 9]);
    assert_eq!(packet.read("GPS").unwrap(), Some(Value::Object(fields)));
}

#[test]
fn document_backed_packet_with_keys() {
    let mut def = PacketDefinition::new("STATE");
    def.define_item(
        ItemDefinition::builder()
            .name("MODE")
            .bit_size(8)
            .data_type(DataType::Uint)
            .key("$.state.mode")
            .build(),
        false,
    )
    .unwrap();
    def.define_item(
        ItemDefinition::builder()
            .name("HISTORY")
            .bit_offset(8)
            .bit_size(32)
            .data_type(DataType::Int)
            .key("$.state.history[2]")
            .build(),
        false,
    )
    .unwrap();

    let mut packet = Packet::with_accessor(Arc::new(def), Accessor::Json);
    // Containers are created on demand
    packet.write("MODE", Value::Uint(3)).unwrap();
    packet.write("HISTORY", Value::Int(-2)).unwrap();
    assert_eq!(packet.read("MODE").unwrap(), Some(Value::Uint(3)));
    assert_eq!(packet.read("HISTORY").unwrap(), Some(Value::Int(-2)));
    // Reads of absent locations are not errors
    assert_eq!(packet.read_raw("MODE").unwrap(), Some(Value::Uint(3)));
}

#[test]
fn variable_length_trailer() {
    let mut def = PacketDefinition::new("DUMP");
    def.append_item(
        ItemDefinition::builder()
            .name("LEN")
            .bit_size(16)
            .data_type(DataType::Uint)
            .build(),
    )
    .unwrap();
    def.append_item(
        ItemDefinition::builder()
            .name("DATA")
            .bit_size(0)
            .data_type(DataType::Block)
            .build(),
    )
    .unwrap();

    let mut packet = Packet::new(Arc::new(def));
    packet.write("LEN", Value::Uint(4)).unwrap();
    packet
        .write("DATA", Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]))
        .unwrap();
    assert_eq!(packet.buffer().unwrap(), [0, 4, 0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(
        packet.read("DATA").unwrap(),
        Some(Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]))
    );

    // A shorter write shrinks the trailer
    packet.write("DATA", Value::Bytes(vec![0x01])).unwrap();
    assert_eq!(packet.buffer().unwrap(), [0, 4, 0x01]);
}

#[test]
fn batch_reads_match_single_reads() {
    let def = health_definition();
    let mut packet = Packet::new(Arc::new(def.clone()));
    packet.write("APID", Value::Uint(100)).unwrap();
    packet.write("TEMP1", Value::Int(-5)).unwrap();

    let batch = Accessor::Binary
        .read_items(def.items(), packet.representation())
        .unwrap();
    for (name, value) in batch {
        assert_eq!(packet.read_raw(&name).unwrap(), value, "{name}");
    }
}
