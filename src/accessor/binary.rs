//! Bit-level codec over flat byte buffers.
//!
//! Bit offsets are always expressed in big-endian terms: bit 0 is the most
//! significant bit of byte 0, increasing monotonically through the buffer
//! regardless of an item's own endianness. For big-endian items and for
//! byte-aligned little-endian items of standard width (8/16/32/64 bits) the
//! offset addresses the first buffer byte the item occupies. Little-endian
//! bitfields follow the byte-swap rule implemented by [`bitfield_span`].

use tracing::trace;

use crate::item::{DataType, Endianness, ItemDefinition, Overflow};
use crate::{Error, Result, Value};

/// Reads and writes items against a flat byte buffer.
pub struct BinaryAccessor;

impl BinaryAccessor {
    /// Read one item. Returns `Ok(None)` when the item's location lies
    /// outside the buffer, and always for DERIVED items.
    ///
    /// # Errors
    /// [`Error::Access`] for layout combinations the codec cannot express,
    /// e.g. an unaligned FLOAT or an OBJECT item.
    pub fn read_item(item: &ItemDefinition, buffer: &[u8]) -> Result<Option<Value>> {
        if item.data_type == DataType::Derived {
            return Ok(None);
        }
        let Some(bit_offset) = resolve_offset(item.bit_offset, buffer.len()) else {
            return Ok(None);
        };
        if item.array_size.is_some() {
            return read_array(item, bit_offset, buffer);
        }
        read_value(
            buffer,
            bit_offset,
            item.bit_size,
            item.data_type,
            item.endianness,
        )
    }

    /// Write one item, applying the item's overflow policy. The buffer grows
    /// zero-filled as needed for positive-offset items; end-relative items
    /// never grow it. Writes to DERIVED items are silently ignored.
    ///
    /// # Errors
    /// [`Error::Overflow`] under the ERROR policies, [`Error::Access`] for
    /// unsupported layouts or end-relative writes past the buffer.
    pub fn write_item(item: &ItemDefinition, value: &Value, buffer: &mut Vec<u8>) -> Result<()> {
        if item.data_type == DataType::Derived {
            return Ok(());
        }
        let grow = item.bit_offset >= 0;
        let bit_offset = resolve_offset(item.bit_offset, buffer.len()).ok_or_else(|| {
            Error::Access(format!(
                "bit_offset {} resolves before the start of the buffer",
                item.bit_offset
            ))
        })?;
        if item.array_size.is_some() {
            return write_array(item, bit_offset, value, buffer, grow);
        }
        write_value(
            buffer,
            bit_offset,
            item.bit_size,
            item.data_type,
            item.endianness,
            item.overflow,
            value,
            grow,
        )
    }

    /// Batch read; identical to calling [`Self::read_item`] per item in
    /// order.
    ///
    /// # Errors
    /// First error from any single-item read.
    pub fn read_items<'a, I>(
        items: I,
        buffer: &[u8],
    ) -> Result<Vec<(String, Option<Value>)>>
    where
        I: IntoIterator<Item = &'a ItemDefinition>,
    {
        let mut out = Vec::new();
        for item in items {
            out.push((item.name.clone(), Self::read_item(item, buffer)?));
        }
        Ok(out)
    }

    /// Batch write; later items overwrite earlier ones where locations
    /// overlap (write order is input order).
    ///
    /// # Errors
    /// First error from any single-item write.
    pub fn write_items<'a, I>(items: I, values: &[Value], buffer: &mut Vec<u8>) -> Result<()>
    where
        I: IntoIterator<Item = &'a ItemDefinition>,
    {
        for (item, value) in items.into_iter().zip(values) {
            Self::write_item(item, value, buffer)?;
        }
        Ok(())
    }
}

/// Resolve a possibly end-relative bit offset against the current buffer
/// length. `None` if a negative offset reaches before the start.
fn resolve_offset(bit_offset: i64, buffer_len: usize) -> Option<u64> {
    if bit_offset >= 0 {
        return Some(bit_offset as u64);
    }
    let resolved = (buffer_len as i64) * 8 + bit_offset;
    u64::try_from(resolved).ok()
}

/// Byte span `[lower, upper]` occupied by a bitfield.
///
/// `bit_offset` addresses the most significant bit of the conceptual
/// big-endian-space field. For little-endian bitfields the physical span is
/// found by treating the minimal enclosing byte-aligned span as if
/// big-endian, byte-swapping that span, and extracting at the big-endian
/// position within the swapped span; the span therefore extends *backward*
/// in memory from the offset's byte. This reproduces hardware bit-packed
/// struct layouts after byte swapping.
pub(crate) fn bitfield_span(
    bit_offset: u64,
    bit_size: u32,
    endianness: Endianness,
) -> Result<(usize, usize)> {
    let num_bytes = ((bit_offset % 8 + u64::from(bit_size) - 1) / 8 + 1) as usize;
    match endianness {
        Endianness::Big => {
            let lower = (bit_offset / 8) as usize;
            Ok((lower, lower + num_bytes - 1))
        }
        Endianness::Little => {
            let upper = (bit_offset / 8) as usize;
            let lower = (upper + 1).checked_sub(num_bytes).ok_or_else(|| {
                Error::Access(format!(
                    "little-endian bitfield with bit_offset {bit_offset} and bit_size {bit_size} is invalid"
                ))
            })?;
            Ok((lower, upper))
        }
    }
}

fn mask(bit_size: u32) -> u128 {
    if bit_size >= 128 {
        u128::MAX
    } else {
        (1u128 << bit_size) - 1
    }
}

fn read_value(
    buffer: &[u8],
    bit_offset: u64,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
) -> Result<Option<Value>> {
    match data_type {
        DataType::String | DataType::Block => {
            // Alignment enforced at definition time; guard anyway.
            if bit_offset % 8 != 0 || bit_size % 8 != 0 {
                return Err(Error::Access(format!(
                    "{} items must be byte aligned",
                    data_type.as_str()
                )));
            }
            let byte_offset = (bit_offset / 8) as usize;
            let bytes = if bit_size == 0 {
                if byte_offset > buffer.len() {
                    return Ok(None);
                }
                &buffer[byte_offset..]
            } else {
                let end = byte_offset + (bit_size / 8) as usize;
                if end > buffer.len() {
                    return Ok(None);
                }
                &buffer[byte_offset..end]
            };
            if data_type == DataType::Block {
                return Ok(Some(Value::Bytes(bytes.to_vec())));
            }
            // C-string semantics: reads stop at the first NUL.
            let bytes = match bytes.iter().position(|&b| b == 0) {
                Some(index) => &bytes[..index],
                None => bytes,
            };
            Ok(Some(Value::String(
                String::from_utf8_lossy(bytes).into_owned(),
            )))
        }
        DataType::Int | DataType::Uint | DataType::Float => {
            read_numeric(buffer, bit_offset, bit_size, data_type, endianness)
        }
        DataType::Derived => Ok(None),
        DataType::Object | DataType::Array => Err(Error::Access(format!(
            "data type {} is not supported by the binary accessor",
            data_type.as_str()
        ))),
    }
}

fn read_numeric(
    buffer: &[u8],
    bit_offset: u64,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
) -> Result<Option<Value>> {
    if bit_offset % 8 == 0 && matches!(bit_size, 8 | 16 | 32 | 64) {
        let byte_offset = (bit_offset / 8) as usize;
        let num_bytes = (bit_size / 8) as usize;
        if byte_offset + num_bytes > buffer.len() {
            return Ok(None);
        }
        let bytes = &buffer[byte_offset..byte_offset + num_bytes];
        return Ok(Some(decode_aligned(bytes, bit_size, data_type, endianness)));
    }
    if data_type == DataType::Float {
        return Err(Error::Access(
            "FLOAT items must be byte aligned with bit_size 32 or 64".to_string(),
        ));
    }

    let (lower, upper) = bitfield_span(bit_offset, bit_size, endianness)?;
    if upper >= buffer.len() {
        return Ok(None);
    }
    let raw = extract_bitfield(&buffer[lower..=upper], bit_offset, bit_size, endianness);
    Ok(Some(make_int(raw, bit_size, data_type)))
}

fn decode_aligned(bytes: &[u8], bit_size: u32, data_type: DataType, endianness: Endianness) -> Value {
    macro_rules! decode {
        ($ty:ty) => {{
            let arr: [u8; std::mem::size_of::<$ty>()] = bytes.try_into().unwrap();
            match endianness {
                Endianness::Big => <$ty>::from_be_bytes(arr),
                Endianness::Little => <$ty>::from_le_bytes(arr),
            }
        }};
    }
    match (data_type, bit_size) {
        (DataType::Uint, 8) => Value::Uint(u64::from(bytes[0])),
        (DataType::Uint, 16) => Value::Uint(u64::from(decode!(u16))),
        (DataType::Uint, 32) => Value::Uint(u64::from(decode!(u32))),
        (DataType::Uint, 64) => Value::Uint(decode!(u64)),
        (DataType::Int, 8) => Value::Int(i64::from(bytes[0] as i8)),
        (DataType::Int, 16) => Value::Int(i64::from(decode!(i16))),
        (DataType::Int, 32) => Value::Int(i64::from(decode!(i32))),
        (DataType::Int, 64) => Value::Int(decode!(i64)),
        (DataType::Float, 32) => Value::Float(f64::from(decode!(f32))),
        (DataType::Float, 64) => Value::Float(decode!(f64)),
        // Unreachable given definition validation
        _ => Value::Uint(0),
    }
}

/// Pull `bit_size` bits out of `span`, which is the byte span returned by
/// [`bitfield_span`]. The span is assembled into one wide integer (reversed
/// first for little-endian fields) before shifting and masking.
fn extract_bitfield(span: &[u8], bit_offset: u64, bit_size: u32, endianness: Endianness) -> u128 {
    let mut acc: u128 = 0;
    match endianness {
        Endianness::Big => {
            for &b in span {
                acc = acc << 8 | u128::from(b);
            }
        }
        Endianness::Little => {
            for &b in span.iter().rev() {
                acc = acc << 8 | u128::from(b);
            }
        }
    }
    let total_bits = span.len() as u32 * 8;
    let shift = total_bits - (bit_offset % 8) as u32 - bit_size;
    (acc >> shift) & mask(bit_size)
}

fn make_int(raw: u128, bit_size: u32, data_type: DataType) -> Value {
    let raw = raw as u64;
    match data_type {
        DataType::Uint => Value::Uint(raw),
        _ => {
            // Sign extend from the extracted width
            let value = if bit_size < 64 && raw >> (bit_size - 1) & 1 == 1 {
                (raw | !0u64 << bit_size) as i64
            } else {
                raw as i64
            };
            Value::Int(value)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn write_value(
    buffer: &mut Vec<u8>,
    bit_offset: u64,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
    overflow: Overflow,
    value: &Value,
    grow: bool,
) -> Result<()> {
    match data_type {
        DataType::String | DataType::Block => {
            write_raw_bytes(buffer, bit_offset, bit_size, data_type, value, grow)
        }
        DataType::Float => {
            let v = value
                .as_f64()
                .ok_or_else(|| Error::Access(format!("cannot coerce {} to FLOAT", value.kind())))?;
            let bytes: Vec<u8> = match (bit_size, endianness) {
                (32, Endianness::Big) => (v as f32).to_be_bytes().to_vec(),
                (32, Endianness::Little) => (v as f32).to_le_bytes().to_vec(),
                (64, Endianness::Big) => v.to_be_bytes().to_vec(),
                (64, Endianness::Little) => v.to_le_bytes().to_vec(),
                _ => {
                    return Err(Error::Access(
                        "FLOAT items must have bit_size 32 or 64".to_string(),
                    ))
                }
            };
            if bit_offset % 8 != 0 {
                return Err(Error::Access("FLOAT items must be byte aligned".to_string()));
            }
            store_bytes(buffer, (bit_offset / 8) as usize, &bytes, grow)
        }
        DataType::Int | DataType::Uint => {
            let v = value.as_i128().ok_or_else(|| {
                Error::Access(format!(
                    "cannot coerce {} to {}",
                    value.kind(),
                    data_type.as_str()
                ))
            })?;
            let v = check_overflow(v, bit_size, data_type, overflow)?;
            let pattern = (v as u128) & mask(bit_size);
            write_int_pattern(buffer, bit_offset, bit_size, endianness, pattern, grow)
        }
        DataType::Derived => Ok(()),
        DataType::Object | DataType::Array => Err(Error::Access(format!(
            "data type {} is not supported by the binary accessor",
            data_type.as_str()
        ))),
    }
}

fn write_raw_bytes(
    buffer: &mut Vec<u8>,
    bit_offset: u64,
    bit_size: u32,
    data_type: DataType,
    value: &Value,
    grow: bool,
) -> Result<()> {
    if bit_offset % 8 != 0 {
        return Err(Error::Access(format!(
            "{} items must be byte aligned",
            data_type.as_str()
        )));
    }
    let data: Vec<u8> = match value {
        Value::Bytes(b) => b.clone(),
        Value::String(s) => s.clone().into_bytes(),
        other => other.to_string().into_bytes(),
    };
    let byte_offset = (bit_offset / 8) as usize;

    if bit_size == 0 {
        // Variable sized: the buffer is resized so the value is the final
        // field.
        if byte_offset > buffer.len() {
            if !grow {
                return Err(Error::Access(
                    "write extends past the end of the buffer".to_string(),
                ));
            }
            buffer.resize(byte_offset, 0);
        }
        buffer.truncate(byte_offset);
        buffer.extend_from_slice(&data);
        return Ok(());
    }

    let num_bytes = (bit_size / 8) as usize;
    if data.len() > num_bytes {
        return Err(Error::Access(format!(
            "value with length {} is too long for {}-bit {}",
            data.len(),
            bit_size,
            data_type.as_str()
        )));
    }
    let end = byte_offset + num_bytes;
    if end > buffer.len() {
        if !grow {
            return Err(Error::Access(
                "write extends past the end of the buffer".to_string(),
            ));
        }
        buffer.resize(end, 0);
    }
    buffer[byte_offset..byte_offset + data.len()].copy_from_slice(&data);
    // Shorter values zero-fill the remainder of the field
    buffer[byte_offset + data.len()..end].fill(0);
    Ok(())
}

fn store_bytes(buffer: &mut Vec<u8>, byte_offset: usize, bytes: &[u8], grow: bool) -> Result<()> {
    let end = byte_offset + bytes.len();
    if end > buffer.len() {
        if !grow {
            return Err(Error::Access(
                "write extends past the end of the buffer".to_string(),
            ));
        }
        buffer.resize(end, 0);
    }
    buffer[byte_offset..end].copy_from_slice(bytes);
    Ok(())
}

fn write_int_pattern(
    buffer: &mut Vec<u8>,
    bit_offset: u64,
    bit_size: u32,
    endianness: Endianness,
    pattern: u128,
    grow: bool,
) -> Result<()> {
    if bit_offset % 8 == 0 && matches!(bit_size, 8 | 16 | 32 | 64) {
        let bytes: Vec<u8> = match (bit_size, endianness) {
            (8, _) => vec![pattern as u8],
            (16, Endianness::Big) => (pattern as u16).to_be_bytes().to_vec(),
            (16, Endianness::Little) => (pattern as u16).to_le_bytes().to_vec(),
            (32, Endianness::Big) => (pattern as u32).to_be_bytes().to_vec(),
            (32, Endianness::Little) => (pattern as u32).to_le_bytes().to_vec(),
            (64, Endianness::Big) => (pattern as u64).to_be_bytes().to_vec(),
            _ => (pattern as u64).to_le_bytes().to_vec(),
        };
        return store_bytes(buffer, (bit_offset / 8) as usize, &bytes, grow);
    }

    let (lower, upper) = bitfield_span(bit_offset, bit_size, endianness)?;
    if upper >= buffer.len() {
        if !grow {
            return Err(Error::Access(
                "write extends past the end of the buffer".to_string(),
            ));
        }
        buffer.resize(upper + 1, 0);
    }

    // Read-modify-write the enclosing span
    let span = &buffer[lower..=upper];
    let mut acc: u128 = 0;
    match endianness {
        Endianness::Big => {
            for &b in span {
                acc = acc << 8 | u128::from(b);
            }
        }
        Endianness::Little => {
            for &b in span.iter().rev() {
                acc = acc << 8 | u128::from(b);
            }
        }
    }
    let total_bits = span.len() as u32 * 8;
    let shift = total_bits - (bit_offset % 8) as u32 - bit_size;
    acc &= !(mask(bit_size) << shift);
    acc |= (pattern & mask(bit_size)) << shift;

    let num_bytes = upper - lower + 1;
    for i in 0..num_bytes {
        let byte = (acc >> ((num_bytes - 1 - i) * 8)) as u8;
        match endianness {
            Endianness::Big => buffer[lower + i] = byte,
            Endianness::Little => buffer[upper - i] = byte,
        }
    }
    Ok(())
}

/// Apply the overflow policy to a value destined for a `bit_size`-wide
/// integer field.
fn check_overflow(
    value: i128,
    bit_size: u32,
    data_type: DataType,
    overflow: Overflow,
) -> Result<i128> {
    let hex_max = mask(bit_size) as i128;
    let (min, max) = if data_type == DataType::Uint {
        (0, hex_max)
    } else {
        (-(1i128 << (bit_size - 1)), (1i128 << (bit_size - 1)) - 1)
    };

    if overflow == Overflow::Truncate {
        let modulus = hex_max + 1;
        let mut v = value.rem_euclid(modulus);
        if data_type == DataType::Int && v > max {
            v -= modulus;
        }
        if v != value {
            trace!(value, truncated = v, bit_size, "truncated out-of-range value");
        }
        return Ok(v);
    }

    if value > max {
        match overflow {
            Overflow::Saturate => {
                trace!(value, max, bit_size, "saturated out-of-range value");
                Ok(max)
            }
            Overflow::ErrorAllowHex if value <= hex_max => Ok(value),
            _ => Err(Error::Overflow {
                value: value.to_string(),
                bit_size,
                data_type: data_type.as_str(),
            }),
        }
    } else if value < min {
        match overflow {
            Overflow::Saturate => {
                trace!(value, min, bit_size, "saturated out-of-range value");
                Ok(min)
            }
            _ => Err(Error::Overflow {
                value: value.to_string(),
                bit_size,
                data_type: data_type.as_str(),
            }),
        }
    } else {
        Ok(value)
    }
}

fn read_array(item: &ItemDefinition, bit_offset: u64, buffer: &[u8]) -> Result<Option<Value>> {
    let bit_size = u64::from(item.bit_size);
    if bit_size == 0 {
        return Err(Error::Access(
            "array elements must have a non-zero bit_size".to_string(),
        ));
    }
    let array_size = item.array_size.unwrap_or(0) as u64;
    let count = if array_size > 0 {
        array_size / bit_size
    } else {
        // Variable array: read to the end of the buffer
        let total = buffer.len() as u64 * 8;
        if total < bit_offset {
            return Ok(None);
        }
        (total - bit_offset) / bit_size
    };
    if bit_offset + count * bit_size > buffer.len() as u64 * 8 {
        return Ok(None);
    }
    let mut values = Vec::with_capacity(count as usize);
    for i in 0..count {
        match read_value(
            buffer,
            bit_offset + i * bit_size,
            item.bit_size,
            item.data_type,
            item.endianness,
        )? {
            Some(v) => values.push(v),
            None => return Ok(None),
        }
    }
    Ok(Some(Value::Array(values)))
}

fn write_array(
    item: &ItemDefinition,
    bit_offset: u64,
    value: &Value,
    buffer: &mut Vec<u8>,
    grow: bool,
) -> Result<()> {
    let Value::Array(values) = value else {
        return Err(Error::Access(format!(
            "expected an array value for {}, got {}",
            item.name,
            value.kind()
        )));
    };
    let bit_size = u64::from(item.bit_size);
    if bit_size == 0 {
        return Err(Error::Access(
            "array elements must have a non-zero bit_size".to_string(),
        ));
    }
    let array_size = item.array_size.unwrap_or(0) as u64;
    if array_size > 0 {
        let count = (array_size / bit_size) as usize;
        if values.len() != count {
            return Err(Error::Access(format!(
                "array value with {} elements does not match defined length {} for {}",
                values.len(),
                count,
                item.name
            )));
        }
    } else {
        // Variable array: resize the buffer so the array is the final field
        let end_byte = ((bit_offset + values.len() as u64 * bit_size) as usize + 7) / 8;
        if !grow && end_byte > buffer.len() {
            return Err(Error::Access(
                "write extends past the end of the buffer".to_string(),
            ));
        }
        buffer.resize(end_byte, 0);
    }
    for (i, v) in values.iter().enumerate() {
        write_value(
            buffer,
            bit_offset + i as u64 * bit_size,
            item.bit_size,
            item.data_type,
            item.endianness,
            item.overflow,
            v,
            grow,
        )?;
    }
    Ok(())
}
