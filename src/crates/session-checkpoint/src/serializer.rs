//! Serialization codec for checkpoint payloads
//!
//! Payloads handed to a checkpoint store are opaque: the store never inspects
//! them beyond encoding and decoding. This module defines the value model the
//! stores accept ([`StateValue`]), the tagged byte representation they persist
//! ([`EncodedValue`]), and the codec between the two
//! ([`SerializerProtocol`] / [`JsonBinarySerializer`]).
//!
//! Three payload kinds are distinguished:
//!
//! - **`bytes`** - an immutable raw binary value, stored verbatim
//! - **`bytearray`** - a mutable raw binary value, stored verbatim
//! - **`json`** - everything else, as a structured JSON encoding
//!
//! Binary values nested *inside* structured data cannot be carried by JSON
//! directly, so they are captured as reconstruction hints of the form
//! `{"constructor": "bytes", "method": "fromhex", "args": ["<hex>"]}` and
//! rebuilt into binary leaves at decode time. The kind tags form a closed set:
//! decoding a blob with any other tag fails with
//! [`CheckpointError::UnsupportedEncodingKind`], which signals a writer/reader
//! version mismatch rather than a recoverable condition.

use crate::error::{CheckpointError, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const HINT_CONSTRUCTOR: &str = "constructor";
const HINT_METHOD: &str = "method";
const HINT_ARGS: &str = "args";
const HINT_METHOD_FROMHEX: &str = "fromhex";

/// An in-memory checkpoint payload.
///
/// Closed recursive value model: primitives, containers, and raw binary
/// leaves. `Bytes` and `ByteArray` carry the same representation in Rust but
/// are kept distinct so a payload round-trips with the exact kind the writer
/// chose.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<StateValue>),
    Object(BTreeMap<String, StateValue>),
    /// Immutable raw binary
    Bytes(Vec<u8>),
    /// Mutable raw binary
    ByteArray(Vec<u8>),
}

impl StateValue {
    /// True for the two raw-binary variants.
    pub fn is_binary(&self) -> bool {
        matches!(self, StateValue::Bytes(_) | StateValue::ByteArray(_))
    }
}

/// Structural conversion from JSON. Performs no hint reconstruction; an
/// object that happens to look like a binary hint stays an object.
impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => StateValue::Null,
            Value::Bool(b) => StateValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    StateValue::Int(i)
                } else {
                    StateValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => StateValue::String(s),
            Value::Array(items) => {
                StateValue::Array(items.into_iter().map(StateValue::from).collect())
            }
            Value::Object(map) => StateValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, StateValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// The closed set of storable payload kinds.
///
/// A new kind added here is a compile-time-visible gap in every `match`
/// downstream, not a silent runtime branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedKind {
    Bytes,
    ByteArray,
    Json,
}

impl EncodedKind {
    /// The tag written into storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodedKind::Bytes => "bytes",
            EncodedKind::ByteArray => "bytearray",
            EncodedKind::Json => "json",
        }
    }

    fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "bytes" => Ok(EncodedKind::Bytes),
            "bytearray" => Ok(EncodedKind::ByteArray),
            "json" => Ok(EncodedKind::Json),
            other => Err(CheckpointError::UnsupportedEncodingKind(other.to_string())),
        }
    }
}

/// A `(kind tag, raw byte payload)` pair ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    pub kind: EncodedKind,
    pub data: Vec<u8>,
}

impl EncodedValue {
    pub fn new(kind: EncodedKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Frame the pair into a single storable blob: ASCII tag, `:`, payload.
    pub fn into_storage_bytes(self) -> Vec<u8> {
        let tag = self.kind.as_str().as_bytes();
        let mut out = Vec::with_capacity(tag.len() + 1 + self.data.len());
        out.extend_from_slice(tag);
        out.push(b':');
        out.extend_from_slice(&self.data);
        out
    }

    /// Split a stored blob back into its tagged pair.
    ///
    /// Tags never contain `:`, so everything before the first separator is
    /// the tag. A blob with no separator, or with a tag outside the supported
    /// set, fails with [`CheckpointError::UnsupportedEncodingKind`].
    pub fn from_storage_bytes(raw: &[u8]) -> Result<Self> {
        let sep = raw.iter().position(|&b| b == b':').ok_or_else(|| {
            CheckpointError::UnsupportedEncodingKind(String::from_utf8_lossy(raw).into_owned())
        })?;
        let tag = std::str::from_utf8(&raw[..sep]).map_err(|_| {
            CheckpointError::UnsupportedEncodingKind(
                String::from_utf8_lossy(&raw[..sep]).into_owned(),
            )
        })?;
        Ok(Self {
            kind: EncodedKind::from_tag(tag)?,
            data: raw[sep + 1..].to_vec(),
        })
    }
}

/// Protocol for serializing and deserializing checkpoint payloads
///
/// Implementations must satisfy the round-trip law
/// `loads(dumps(v)) == v` for every supported [`StateValue`] shape.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a payload to its tagged byte representation
    fn dumps(&self, value: &StateValue) -> Result<EncodedValue>;

    /// Deserialize a payload from its tagged byte representation
    fn loads(&self, encoded: &EncodedValue) -> Result<StateValue>;
}

/// Default codec: raw binary passes through verbatim, everything else becomes
/// JSON with fromhex hints for embedded binary leaves.
#[derive(Debug, Clone, Default)]
pub struct JsonBinarySerializer;

impl JsonBinarySerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonBinarySerializer {
    fn dumps(&self, value: &StateValue) -> Result<EncodedValue> {
        match value {
            StateValue::Bytes(data) => Ok(EncodedValue::new(EncodedKind::Bytes, data.clone())),
            StateValue::ByteArray(data) => {
                Ok(EncodedValue::new(EncodedKind::ByteArray, data.clone()))
            }
            other => {
                let data = serde_json::to_vec(&value_to_json(other))?;
                Ok(EncodedValue::new(EncodedKind::Json, data))
            }
        }
    }

    fn loads(&self, encoded: &EncodedValue) -> Result<StateValue> {
        match encoded.kind {
            EncodedKind::Bytes => Ok(StateValue::Bytes(encoded.data.clone())),
            EncodedKind::ByteArray => Ok(StateValue::ByteArray(encoded.data.clone())),
            EncodedKind::Json => {
                let value: Value = serde_json::from_slice(&encoded.data)?;
                json_to_value(value)
            }
        }
    }
}

/// Structured encoding. Binary leaves become fromhex hints; non-finite floats
/// have no JSON representation and encode as null.
fn value_to_json(value: &StateValue) -> Value {
    match value {
        StateValue::Null => Value::Null,
        StateValue::Bool(b) => Value::Bool(*b),
        StateValue::Int(i) => Value::from(*i),
        StateValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        StateValue::String(s) => Value::String(s.clone()),
        StateValue::Array(items) => Value::Array(items.iter().map(value_to_json).collect()),
        StateValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        StateValue::Bytes(data) => binary_hint("bytes", data),
        StateValue::ByteArray(data) => binary_hint("bytearray", data),
    }
}

fn binary_hint(constructor: &str, data: &[u8]) -> Value {
    json!({
        HINT_CONSTRUCTOR: constructor,
        HINT_METHOD: HINT_METHOD_FROMHEX,
        HINT_ARGS: [hex::encode(data)],
    })
}

/// Structured decoding. An object of the exact hint shape is always
/// reconstructed as a binary leaf.
fn json_to_value(value: Value) -> Result<StateValue> {
    match value {
        Value::Object(map) => {
            if let Some(binary) = decode_binary_hint(&map)? {
                return Ok(binary);
            }
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k, json_to_value(v)?);
            }
            Ok(StateValue::Object(out))
        }
        Value::Array(items) => Ok(StateValue::Array(
            items.into_iter().map(json_to_value).collect::<Result<_>>()?,
        )),
        other => Ok(StateValue::from(other)),
    }
}

fn decode_binary_hint(map: &Map<String, Value>) -> Result<Option<StateValue>> {
    if map.len() != 3 || map.get(HINT_METHOD).and_then(Value::as_str) != Some(HINT_METHOD_FROMHEX)
    {
        return Ok(None);
    }
    let constructor = match map.get(HINT_CONSTRUCTOR).and_then(Value::as_str) {
        Some(c @ ("bytes" | "bytearray")) => c,
        _ => return Ok(None),
    };
    let hex_arg = match map.get(HINT_ARGS).and_then(Value::as_array) {
        Some(args) if args.len() == 1 => match args[0].as_str() {
            Some(s) => s,
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    let data = hex::decode(hex_arg)
        .map_err(|e| CheckpointError::MalformedPayload(format!("bad hex in binary hint: {e}")))?;
    Ok(Some(match constructor {
        "bytes" => StateValue::Bytes(data),
        _ => StateValue::ByteArray(data),
    }))
}
