//! Structured-document accessor over JSON documents.
//!
//! Items address document nodes with `$.path.to[3].field` style keys. Two
//! reserved tagged-object encodings keep values JSON cannot natively
//! represent bit-identical across round trips:
//!
//! * `{"json_class": "Float", "raw": "NaN" | "Infinity" | "-Infinity"}`
//! * `{"json_class": "String", "raw": [bytes]}` for arbitrary BLOCK payloads

use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;

use crate::item::{DataType, ItemDefinition};
use crate::{Error, Result, Value};

/// Reads and writes items against a nested JSON document.
pub struct JsonAccessor;

impl JsonAccessor {
    /// Read one item from the document. Missing paths, `null` nodes, and
    /// DERIVED items yield `Ok(None)`.
    ///
    /// # Errors
    /// [`Error::Structure`] for malformed item keys.
    pub fn read_item(item: &ItemDefinition, document: &Json) -> Result<Option<Value>> {
        if item.data_type == DataType::Derived {
            return Ok(None);
        }
        let segments = parse_key(&item.document_key())?;
        let Some(node) = resolve(document, &segments) else {
            return Ok(None);
        };
        if node.is_null() {
            return Ok(None);
        }
        let decoded = json_to_value(node);
        Ok(Some(coerce(
            decoded,
            item.data_type,
            item.array_size.is_some(),
        )))
    }

    /// Write one item into the document, coercing the value to the item's
    /// data type. Missing intermediate containers are created to match the
    /// path; writes to DERIVED items are silently ignored.
    ///
    /// # Errors
    /// [`Error::Structure`] when the path traverses an existing node of an
    /// incompatible shape, e.g. indexing into a non-array.
    pub fn write_item(item: &ItemDefinition, value: &Value, document: &mut Json) -> Result<()> {
        if item.data_type == DataType::Derived {
            return Ok(());
        }
        let segments = parse_key(&item.document_key())?;
        let coerced = coerce(value.clone(), item.data_type, item.array_size.is_some());
        let target = resolve_mut(document, &segments)?;
        *target = value_to_json(&coerced);
        Ok(())
    }

    /// Batch read; identical to calling [`Self::read_item`] per item in
    /// order.
    ///
    /// # Errors
    /// First error from any single-item read.
    pub fn read_items<'a, I>(items: I, document: &Json) -> Result<Vec<(String, Option<Value>)>>
    where
        I: IntoIterator<Item = &'a ItemDefinition>,
    {
        let mut out = Vec::new();
        for item in items {
            out.push((item.name.clone(), Self::read_item(item, document)?));
        }
        Ok(out)
    }

    /// Batch write in input order; later items may overwrite earlier ones.
    ///
    /// # Errors
    /// First error from any single-item write.
    pub fn write_items<'a, I>(items: I, values: &[Value], document: &mut Json) -> Result<()>
    where
        I: IntoIterator<Item = &'a ItemDefinition>,
    {
        for (item, value) in items.into_iter().zip(values) {
            Self::write_item(item, value, document)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Parse an item key: `$` for the document root, then any sequence of
/// `.name` and `[index]`.
fn parse_key(key: &str) -> Result<Vec<Segment>> {
    let rest = key
        .strip_prefix('$')
        .ok_or_else(|| Error::Structure(format!("item key must start with '$': {key}")))?;
    let mut segments = Vec::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        match c {
            '.' => {
                let mut end = rest.len();
                while let Some((i, c)) = chars.peek() {
                    if *c == '.' || *c == '[' {
                        end = *i;
                        break;
                    }
                    chars.next();
                }
                if end == start + 1 {
                    return Err(Error::Structure(format!("empty name segment in key: {key}")));
                }
                segments.push(Segment::Key(rest[start + 1..end].to_string()));
            }
            '[' => {
                let mut end = None;
                for (i, c) in chars.by_ref() {
                    if c == ']' {
                        end = Some(i);
                        break;
                    }
                }
                let end =
                    end.ok_or_else(|| Error::Structure(format!("unterminated index in key: {key}")))?;
                let index: usize = rest[start + 1..end]
                    .parse()
                    .map_err(|_| Error::Structure(format!("bad array index in key: {key}")))?;
                segments.push(Segment::Index(index));
            }
            _ => {
                return Err(Error::Structure(format!(
                    "unexpected character {c:?} in key: {key}"
                )))
            }
        }
    }
    Ok(segments)
}

fn resolve<'a>(mut node: &'a Json, segments: &[Segment]) -> Option<&'a Json> {
    for segment in segments {
        node = match segment {
            Segment::Key(k) => node.as_object()?.get(k)?,
            Segment::Index(i) => node.as_array()?.get(*i)?,
        };
    }
    Some(node)
}

/// Navigate to the target node, creating missing objects/arrays along the
/// way. Traversing an existing node of the wrong shape is a contract error.
fn resolve_mut<'a>(mut node: &'a mut Json, segments: &[Segment]) -> Result<&'a mut Json> {
    for segment in segments {
        match segment {
            Segment::Key(k) => {
                if node.is_null() {
                    *node = Json::Object(Map::new());
                }
                let Json::Object(map) = node else {
                    return Err(Error::Structure(format!(
                        "cannot write key {k:?} into a non-object node"
                    )));
                };
                node = map.entry(k.clone()).or_insert(Json::Null);
            }
            Segment::Index(i) => {
                if node.is_null() {
                    *node = Json::Array(Vec::new());
                }
                let Json::Array(array) = node else {
                    return Err(Error::Structure(format!(
                        "cannot index [{i}] into a non-array node"
                    )));
                };
                if array.len() <= *i {
                    array.resize(i + 1, Json::Null);
                }
                node = &mut array[*i];
            }
        }
    }
    Ok(node)
}

/// Decode a document node, honoring the reserved tagged encodings.
fn json_to_value(node: &Json) -> Value {
    match node {
        Json::Null => Value::Int(0),
        Json::Bool(b) => Value::Uint(u64::from(*b)),
        Json::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Int(v)
            } else if let Some(v) = n.as_u64() {
                Value::Uint(v)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        Json::Object(map) => {
            if let Some(tagged) = decode_tagged(map) {
                return tagged;
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), json_to_value(v)))
                    .collect::<BTreeMap<_, _>>(),
            )
        }
    }
}

fn decode_tagged(map: &Map<String, Json>) -> Option<Value> {
    let class = map.get("json_class")?.as_str()?;
    let raw = map.get("raw")?;
    match class {
        "Float" => match raw.as_str()? {
            "NaN" => Some(Value::Float(f64::NAN)),
            "Infinity" => Some(Value::Float(f64::INFINITY)),
            "-Infinity" => Some(Value::Float(f64::NEG_INFINITY)),
            _ => None,
        },
        "String" => {
            let bytes = raw
                .as_array()?
                .iter()
                .map(|b| b.as_u64().map(|b| b as u8))
                .collect::<Option<Vec<u8>>>()?;
            Some(Value::Bytes(bytes))
        }
        _ => None,
    }
}

/// Encode a value as a document node, tagging anything JSON cannot carry
/// natively.
fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Int(v) => Json::Number((*v).into()),
        Value::Uint(v) => Json::Number((*v).into()),
        Value::Float(v) => match Number::from_f64(*v) {
            Some(n) => Json::Number(n),
            None => {
                let raw = if v.is_nan() {
                    "NaN"
                } else if *v > 0.0 {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                tagged("Float", Json::String(raw.to_string()))
            }
        },
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => tagged(
            "String",
            Json::Array(bytes.iter().map(|&b| Json::Number(b.into())).collect()),
        ),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

fn tagged(class: &str, raw: Json) -> Json {
    let mut map = Map::new();
    map.insert("json_class".to_string(), Json::String(class.to_string()));
    map.insert("raw".to_string(), raw);
    Json::Object(map)
}

/// Coerce a decoded value to the item's declared type. Document coercion
/// never fails; unconvertible values become zero.
fn coerce(value: Value, data_type: DataType, is_array: bool) -> Value {
    if is_array {
        if let Value::Array(items) = value {
            return Value::Array(
                items
                    .into_iter()
                    .map(|v| coerce_scalar(v, data_type))
                    .collect(),
            );
        }
    }
    coerce_scalar(value, data_type)
}

fn coerce_scalar(value: Value, data_type: DataType) -> Value {
    match data_type {
        DataType::Int => Value::Int(value.as_i64().unwrap_or(0)),
        DataType::Uint => match value.as_u64() {
            Some(v) => Value::Uint(v),
            None => Value::Int(value.as_i64().unwrap_or(0)),
        },
        DataType::Float => Value::Float(value.as_f64().unwrap_or(0.0)),
        DataType::String => match value {
            Value::String(_) => value,
            Value::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
            other => Value::String(other.to_string()),
        },
        DataType::Block => match value {
            Value::Bytes(_) => value,
            Value::String(s) => Value::Bytes(s.into_bytes()),
            other => Value::Bytes(other.to_string().into_bytes()),
        },
        // OBJECT and ARRAY items pass through unconverted
        _ => value,
    }
}
