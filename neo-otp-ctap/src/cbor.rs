//! CBOR encoding and decoding for OTP commands using cbor4ii
//!
//! OTP requests and responses are CBOR maps keyed by small integers, the same
//! convention CTAP2 uses for its own commands. [`MapBuilder`] produces maps in
//! canonical key order and [`WireMap`] gives typed access to a decoded
//! response.
//!
//! # Usage
//!
//! ```rust
//! use neo_otp_ctap::cbor::{MapBuilder, WireMap};
//!
//! let bytes = MapBuilder::new()
//!     .insert_text(1, "alice:example")
//!     .insert_uint(4, 6)
//!     .build()
//!     .unwrap();
//!
//! let map = WireMap::from_bytes(&bytes).unwrap();
//! assert_eq!(map.get_text(1).unwrap(), "alice:example");
//! assert_eq!(map.get_u64(4).unwrap(), 6);
//! ```

use crate::status::{OtpStatus, Result};

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Dynamic CBOR value
pub type Value = cbor4ii::core::Value;

/// Encode a value to CBOR bytes
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    cbor4ii::serde::to_vec(Vec::new(), value).map_err(|_| OtpStatus::InvalidCbor)
}

/// Decode CBOR bytes to a value
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    cbor4ii::serde::from_slice(data).map_err(|_| OtpStatus::InvalidCbor)
}

/// Convert any serializable value into a dynamic [`Value`]
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    let bytes = encode(value)?;
    decode(&bytes)
}

/// Wrapper for i32 that sorts by CBOR encoding order
///
/// Canonical CBOR sorts map keys by their encoded form, which puts every
/// unsigned key (major type 0) before every negative key (major type 1), and
/// orders negative keys by magnitude: 1, 3, -1, -2, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CborOrderedI32(i32);

impl PartialOrd for CborOrderedI32 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CborOrderedI32 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match (self.0 >= 0, other.0 >= 0) {
            (true, true) => self.0.cmp(&other.0),
            (false, false) => other.0.cmp(&self.0),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

/// Build a CBOR map with integer keys
///
/// Keys are emitted in canonical order regardless of insertion order.
/// Inserting the same key twice keeps the last value.
#[derive(Debug, Clone, Default)]
pub struct MapBuilder {
    entries: BTreeMap<CborOrderedI32, Value>,
}

impl MapBuilder {
    /// Create a new map builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert any serializable value
    pub fn insert<T: Serialize>(self, key: i32, value: T) -> Result<Self> {
        let value = to_value(&value)?;
        Ok(self.insert_value(key, value))
    }

    /// Insert an already built dynamic value
    pub fn insert_value(mut self, key: i32, value: Value) -> Self {
        self.entries.insert(CborOrderedI32(key), value);
        self
    }

    /// Insert an unsigned integer
    pub fn insert_uint(self, key: i32, value: u64) -> Self {
        self.insert_value(key, Value::Integer(value.into()))
    }

    /// Insert a signed integer
    pub fn insert_int(self, key: i32, value: i64) -> Self {
        self.insert_value(key, Value::Integer(value.into()))
    }

    /// Insert a text string
    pub fn insert_text(self, key: i32, value: &str) -> Self {
        self.insert_value(key, Value::Text(value.to_string()))
    }

    /// Insert a byte string
    pub fn insert_bytes(self, key: i32, bytes: &[u8]) -> Self {
        self.insert_value(key, Value::Bytes(bytes.to_vec()))
    }

    /// Insert an unsigned integer only if present
    pub fn insert_uint_opt(self, key: i32, value: Option<u64>) -> Self {
        match value {
            Some(v) => self.insert_uint(key, v),
            None => self,
        }
    }

    /// Insert a byte string only if present
    pub fn insert_bytes_opt(self, key: i32, bytes: Option<&[u8]>) -> Self {
        match bytes {
            Some(b) => self.insert_bytes(key, b),
            None => self,
        }
    }

    /// Number of entries inserted so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entry was inserted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the map as a dynamic value (for nesting inside another map)
    pub fn build_value(self) -> Value {
        Value::Map(
            self.entries
                .into_iter()
                .map(|(key, value)| (Value::Integer(key.0.into()), value))
                .collect(),
        )
    }

    /// Build the map and encode it to CBOR bytes
    pub fn build(self) -> Result<Vec<u8>> {
        encode(&self.build_value())
    }
}

/// A decoded CBOR map with integer keys
///
/// This is the raw wire result handed from the command executor to the codec.
/// Entries with non-integer keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMap {
    map: BTreeMap<i64, Value>,
}

impl WireMap {
    /// An empty map (the body of a bare acknowledgement)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse from CBOR bytes; an empty slice yields an empty map
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::empty());
        }
        let value: Value = decode(data)?;
        Self::from_value(value)
    }

    /// Build from a dynamic value, which must be a map
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Map(entries) = value else {
            return Err(OtpStatus::InvalidCbor);
        };

        let mut map = BTreeMap::new();
        for (key, value) in entries {
            if let Value::Integer(k) = key
                && let Ok(k) = i64::try_from(k)
            {
                map.insert(k, value);
            }
        }

        Ok(Self { map })
    }

    /// Check if a key exists
    pub fn contains_key(&self, key: i64) -> bool {
        self.map.contains_key(&key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the map has no entries
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get the raw value stored under a key
    pub fn get_raw(&self, key: i64) -> Option<&Value> {
        self.map.get(&key)
    }

    fn require(&self, key: i64) -> Result<&Value> {
        self.map.get(&key).ok_or(OtpStatus::InvalidParameter)
    }

    /// Get a required unsigned integer
    pub fn get_u64(&self, key: i64) -> Result<u64> {
        match self.require(key)? {
            Value::Integer(v) => u64::try_from(*v).map_err(|_| OtpStatus::InvalidParameter),
            _ => Err(OtpStatus::InvalidCbor),
        }
    }

    /// Get an optional unsigned integer
    pub fn get_u64_opt(&self, key: i64) -> Result<Option<u64>> {
        if self.contains_key(key) {
            self.get_u64(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Get a required string
    ///
    /// Byte strings are accepted too, as long as they hold UTF-8.
    pub fn get_text(&self, key: i64) -> Result<String> {
        match self.require(key)? {
            Value::Text(s) => Ok(s.clone()),
            Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|_| OtpStatus::InvalidCbor),
            _ => Err(OtpStatus::InvalidCbor),
        }
    }

    /// Get a required byte string
    pub fn get_bytes(&self, key: i64) -> Result<Vec<u8>> {
        match self.require(key)? {
            Value::Bytes(b) => Ok(b.clone()),
            _ => Err(OtpStatus::InvalidCbor),
        }
    }

    /// Get an optional byte string
    pub fn get_bytes_opt(&self, key: i64) -> Result<Option<Vec<u8>>> {
        if self.contains_key(key) {
            self.get_bytes(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Get a nested map
    pub fn get_map(&self, key: i64) -> Result<WireMap> {
        Self::from_value(self.require(key)?.clone())
    }

    /// Get an array, or an empty vector if the key is absent
    pub fn get_array_or_empty(&self, key: i64) -> Result<Vec<Value>> {
        match self.map.get(&key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(OtpStatus::InvalidCbor),
        }
    }

    /// Decode the value under a key into a serde type
    pub fn get<T: DeserializeOwned>(&self, key: i64) -> Result<T> {
        let bytes = encode(self.require(key)?)?;
        decode(&bytes)
    }
}
