//! Structural hashing.
//!
//! Every value feeds a deterministic byte stream into a [`HashSink`]: its
//! one-byte type marker, the hash of its extension data and then, for each
//! present component, a position byte followed by the component's own
//! stream. Absent components write nothing. The stream depends on content
//! only, never on whether an instance came out of a pool.
//!
//! [`ContentHash`] is the SHA-256 digest of that stream.

use std::fmt;
use std::hash::Hasher;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Type markers written first by each value.
pub mod marker {
    pub const BOOLEAN: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const INTEGER64: u8 = 2;
    pub const STRING: u8 = 3;
    pub const DECIMAL: u8 = 4;
    pub const URI: u8 = 5;
    pub const CODE: u8 = 13;
    pub const OID: u8 = 14;
    pub const ID: u8 = 15;
    pub const MARKDOWN: u8 = 16;
    pub const XHTML: u8 = 20;
    pub const LIST: u8 = 36;
    pub const MAP: u8 = 37;
    pub const EXTENSION: u8 = 39;
    pub const QUANTITY: u8 = 40;
    pub const REFERENCE: u8 = 43;
    pub const AGE: u8 = 74;
    pub const COUNT: u8 = 75;
    pub const DISTANCE: u8 = 76;
    pub const DURATION: u8 = 77;
}

const SYSTEM_BOOLEAN: u8 = 0;
const SYSTEM_STRING: u8 = 1;
const SYSTEM_LONG: u8 = 3;
const SYSTEM_DECIMAL: u8 = 4;

/// Destination of a structural byte stream.
pub trait HashSink {
    fn put_bytes(&mut self, bytes: &[u8]);

    fn put_byte(&mut self, byte: u8) {
        self.put_bytes(&[byte]);
    }

    fn put_i32(&mut self, value: i32) {
        self.put_bytes(&value.to_le_bytes());
    }

    fn put_i64(&mut self, value: i64) {
        self.put_bytes(&value.to_le_bytes());
    }
}

impl HashSink for Sha256 {
    fn put_bytes(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

impl HashSink for Vec<u8> {
    fn put_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Adapter feeding a structural stream into a [`std::hash::Hasher`], so
/// `Hash` agrees with structural equality.
pub(crate) struct HasherSink<'a, H: Hasher>(pub(crate) &'a mut H);

impl<H: Hasher> HashSink for HasherSink<'_, H> {
    fn put_bytes(&mut self, bytes: &[u8]) {
        self.0.write(bytes);
    }
}

/// A value with a structural byte stream.
pub trait HashInto {
    fn hash_into(&self, sink: &mut dyn HashSink);
}

pub fn hash_string(sink: &mut dyn HashSink, value: &str) {
    sink.put_byte(SYSTEM_STRING);
    sink.put_bytes(value.as_bytes());
}

pub fn hash_long(sink: &mut dyn HashSink, value: i64) {
    sink.put_byte(SYSTEM_LONG);
    sink.put_i64(value);
}

/// Decimals hash by their textual form, so `7.5` and `7.50` differ.
pub fn hash_decimal(sink: &mut dyn HashSink, text: &str) {
    sink.put_byte(SYSTEM_DECIMAL);
    sink.put_bytes(text.as_bytes());
}

pub fn hash_list<T: HashInto>(sink: &mut dyn HashSink, values: &[T]) {
    sink.put_byte(marker::LIST);
    for value in values {
        value.hash_into(sink);
    }
}

/// Hashes an arbitrary JSON value. Object members hash in key order.
pub fn hash_json(sink: &mut dyn HashSink, value: &serde_json::Value) {
    use serde_json::Value;

    match value {
        Value::Null => {}
        Value::Bool(b) => {
            sink.put_byte(SYSTEM_BOOLEAN);
            sink.put_byte(u8::from(*b));
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => hash_long(sink, i),
            None => hash_decimal(sink, &n.to_string()),
        },
        Value::String(s) => hash_string(sink, s),
        Value::Array(items) => {
            sink.put_byte(marker::LIST);
            for item in items {
                hash_json(sink, item);
            }
        }
        Value::Object(members) => {
            sink.put_byte(marker::MAP);
            let mut keys: Vec<&String> = members.keys().collect();
            keys.sort();
            for key in keys {
                hash_string(sink, key);
                hash_json(sink, &members[key.as_str()]);
            }
        }
    }
}

/// SHA-256 digest of a value's structural byte stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of<T: HashInto + ?Sized>(value: &T) -> Self {
        let mut hasher = Sha256::new();
        value.hash_into(&mut hasher);
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidContentHash(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| Error::InvalidContentHash(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First four bytes, big-endian.
    pub fn prefix(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Bytes(Vec<u8>);

    impl HashInto for Bytes {
        fn hash_into(&self, sink: &mut dyn HashSink) {
            sink.put_bytes(&self.0);
        }
    }

    #[test]
    fn test_string_stream() {
        let mut sink = Vec::new();
        hash_string(&mut sink, "kg");
        assert_eq!(sink, vec![1, b'k', b'g']);
    }

    #[test]
    fn test_long_stream_is_little_endian() {
        let mut sink = Vec::new();
        hash_long(&mut sink, 1);
        assert_eq!(sink, vec![3, 1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decimal_scale_matters() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        hash_decimal(&mut a, "7.5");
        hash_decimal(&mut b, "7.50");
        assert_ne!(a, b);
    }

    #[test]
    fn test_json_object_ignores_member_order() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        hash_json(&mut a, &json!({"a": 1, "b": [true, "x"]}));
        hash_json(&mut b, &json!({"b": [true, "x"], "a": 1}));
        assert_eq!(a, b);
        assert_eq!(a[0], marker::MAP);
    }

    #[test]
    fn test_content_hash_hex_round_trip() {
        let hash = ContentHash::of(&Bytes(vec![1, 2, 3]));
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_uppercase());
        assert_eq!(ContentHash::from_hex(&hex).unwrap(), hash);
        assert_eq!(hash.prefix().to_be_bytes(), hash.as_bytes()[..4]);
    }

    #[test]
    fn test_content_hash_rejects_short_input() {
        assert!(matches!(
            ContentHash::from_hex("ABCD"),
            Err(Error::InvalidContentHash(_))
        ));
    }
}
