//! AMF0 encoder and decoder
//!
//! AMF0 is the serialization used for command payloads on chunk stream 3.
//! Reference: AMF0 File Format Specification (amf0-file-format-specification.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x07 - Reference (16-bit index)
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (switch to AMF3, not decoded here)
//! ```
//!
//! Typed objects whose class name has a registered [`ExternalHandler`]
//! are replaced by whatever that handler returns.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::external::ExternalHandlers;
use super::value::AmfValue;
use crate::error::AmfError;

#[cfg(doc)]
use super::external::ExternalHandler;

// AMF0 type markers
const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
pub struct Amf0Decoder {
    /// Reference table for object references
    references: Vec<AmfValue>,
    /// Tolerate a missing object-end marker at end of input
    lenient: bool,
    /// Current nesting depth
    depth: usize,
    /// Resolvers for application-defined typed objects
    external: ExternalHandlers,
}

impl Amf0Decoder {
    /// Create a new decoder with default settings
    pub fn new() -> Self {
        Self::with_external_handlers(ExternalHandlers::new())
    }

    /// Create a decoder that resolves typed objects through `external`
    pub fn with_external_handlers(external: ExternalHandlers) -> Self {
        Self {
            references: Vec::new(),
            lenient: true,
            depth: 0,
            external,
        }
    }

    /// Create decoder with explicit lenient mode setting
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.references.clear();
        self.depth = 0;
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => {
                ensure(buf, 8)?;
                Ok(AmfValue::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                ensure(buf, 1)?;
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_LONG_STRING => Ok(AmfValue::String(read_utf8_long(buf)?)),
            MARKER_OBJECT => {
                let slot = self.reserve_reference();
                let properties = self.read_properties(buf)?;
                Ok(self.fill_reference(slot, AmfValue::Object(properties)))
            }
            MARKER_ECMA_ARRAY => {
                // Count is only a hint; the terminator is authoritative
                ensure(buf, 4)?;
                let _count = buf.get_u32();
                let slot = self.reserve_reference();
                let properties = self.read_properties(buf)?;
                Ok(self.fill_reference(slot, AmfValue::EcmaArray(properties)))
            }
            MARKER_STRICT_ARRAY => {
                ensure(buf, 4)?;
                let count = buf.get_u32() as usize;
                let slot = self.reserve_reference();
                let mut elements = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    elements.push(self.decode(buf)?);
                }
                Ok(self.fill_reference(slot, AmfValue::Array(elements)))
            }
            MARKER_TYPED_OBJECT => {
                let class_name = read_utf8(buf)?;
                let slot = self.reserve_reference();
                let properties = self.read_properties(buf)?;
                let value = match self.external.get(&class_name) {
                    Some(handler) => handler(&class_name, properties)?,
                    None => AmfValue::TypedObject {
                        class_name,
                        properties,
                    },
                };
                Ok(self.fill_reference(slot, value))
            }
            MARKER_REFERENCE => {
                ensure(buf, 2)?;
                let index = buf.get_u16();
                self.references
                    .get(index as usize)
                    .cloned()
                    .ok_or(AmfError::InvalidReference(index))
            }
            MARKER_DATE => {
                ensure(buf, 10)?;
                let timestamp = buf.get_f64();
                let _timezone = buf.get_i16(); // deprecated, always 0
                Ok(AmfValue::Date(timestamp))
            }
            MARKER_XML_DOCUMENT => Ok(AmfValue::Xml(read_utf8_long(buf)?)),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Undefined),
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    /// Read key/value pairs up to the 0x000009 terminator
    fn read_properties(&mut self, buf: &mut Bytes) -> Result<HashMap<String, AmfValue>, AmfError> {
        let mut properties = HashMap::new();

        loop {
            let key = read_utf8(buf)?;

            if key.is_empty() {
                if buf.is_empty() {
                    // Some servers drop the end marker on the last value
                    if self.lenient {
                        break;
                    }
                    return Err(AmfError::UnexpectedEof);
                }
                if buf.get_u8() != MARKER_OBJECT_END {
                    return Err(AmfError::InvalidObjectEnd);
                }
                break;
            }

            let value = self.decode(buf)?;
            properties.insert(key, value);
        }

        Ok(properties)
    }

    fn reserve_reference(&mut self) -> usize {
        self.references.push(AmfValue::Null);
        self.references.len() - 1
    }

    fn fill_reference(&mut self, slot: usize, value: AmfValue) -> AmfValue {
        self.references[slot] = value.clone();
        value
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure(buf: &Bytes, needed: usize) -> Result<(), AmfError> {
    if buf.remaining() < needed {
        return Err(AmfError::UnexpectedEof);
    }
    Ok(())
}

/// Read UTF-8 string with 16-bit length prefix
fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// Read UTF-8 string with 32-bit length prefix
fn read_utf8_long(buf: &mut Bytes) -> Result<String, AmfError> {
    ensure(buf, 4)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single AMF0 value
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Null => self.buf.put_u8(MARKER_NULL),
            AmfValue::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(*b as u8);
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.write_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.write_properties(props);
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.encode(elem);
                }
            }
            AmfValue::Date(timestamp) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(*timestamp);
                self.buf.put_i16(0);
            }
            AmfValue::Xml(s) => {
                self.buf.put_u8(MARKER_XML_DOCUMENT);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::TypedObject {
                class_name,
                properties,
            } => {
                self.buf.put_u8(MARKER_TYPED_OBJECT);
                self.write_utf8(class_name);
                self.write_properties(properties);
            }
        }
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    fn write_properties(&mut self, props: &HashMap<String, AmfValue>) {
        for (key, val) in props {
            self.write_utf8(key);
            self.encode(val);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(0xFFFF);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn roundtrip(value: AmfValue) -> AmfValue {
        let mut decoded = decode_all(&encode_all(&[value])).unwrap();
        assert_eq!(decoded.len(), 1);
        decoded.remove(0)
    }

    #[test]
    fn test_scalar_values() {
        for value in [
            AmfValue::Number(42.5),
            AmfValue::String("hello world".into()),
            AmfValue::Boolean(true),
            AmfValue::Null,
            AmfValue::Undefined,
            AmfValue::Date(1_700_000_000_000.0),
        ] {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn test_object_roundtrip() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), AmfValue::String("test".into()));
        props.insert("value".to_string(), AmfValue::Number(123.0));
        let value = AmfValue::Object(props);

        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_long_string() {
        let long_str = "x".repeat(70000);
        let value = AmfValue::String(long_str);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_command_sequence() {
        let values = vec![
            AmfValue::String("_result".into()),
            AmfValue::Number(1.0),
            AmfValue::Null,
            AmfValue::Array(vec![AmfValue::Number(1.0), AmfValue::Boolean(false)]),
        ];

        let encoded = encode_all(&values);
        assert_eq!(decode_all(&encoded).unwrap(), values);
    }

    #[test]
    fn test_reference_resolves_earlier_object() {
        let mut wire = BytesMut::new();
        wire.put_u8(MARKER_OBJECT);
        wire.put_u16(1);
        wire.put_slice(b"a");
        wire.put_u8(MARKER_NUMBER);
        wire.put_f64(1.0);
        wire.put_u16(0);
        wire.put_u8(MARKER_OBJECT_END);
        wire.put_u8(MARKER_REFERENCE);
        wire.put_u16(0);

        let values = decode_all(&wire).unwrap();
        assert_eq!(values[0], values[1]);

        let bad = [MARKER_REFERENCE, 0x00, 0x05];
        assert!(matches!(decode_all(&bad), Err(AmfError::InvalidReference(5))));
    }

    #[test]
    fn test_missing_object_end_lenient_vs_strict() {
        let mut wire = BytesMut::new();
        wire.put_u8(MARKER_OBJECT);
        wire.put_u16(1);
        wire.put_slice(b"k");
        wire.put_u8(MARKER_NULL);
        wire.put_u16(0);
        let wire = wire.freeze();

        let mut lenient = Amf0Decoder::new();
        assert!(lenient.decode(&mut wire.clone()).is_ok());

        let mut strict = Amf0Decoder::new().with_lenient(false);
        assert!(matches!(
            strict.decode(&mut wire.clone()),
            Err(AmfError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_unknown_marker_and_avmplus_are_errors() {
        assert!(matches!(decode_all(&[0x11, 0x01]), Err(AmfError::UnknownMarker(0x11))));
        assert!(matches!(decode_all(&[0x42]), Err(AmfError::UnknownMarker(0x42))));
    }

    #[test]
    fn test_nesting_limit() {
        let mut wire = BytesMut::new();
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            wire.put_u8(MARKER_STRICT_ARRAY);
            wire.put_u32(1);
        }
        wire.put_u8(MARKER_NULL);
        assert!(matches!(decode_all(&wire), Err(AmfError::NestingTooDeep)));
    }

    #[test]
    fn test_typed_object_resolved_by_external_handler() {
        let mut props = HashMap::new();
        props.insert("source".to_string(), AmfValue::Array(vec![AmfValue::Number(7.0)]));
        let typed = AmfValue::TypedObject {
            class_name: "flex.messaging.io.ArrayCollection".into(),
            properties: props,
        };
        let encoded = encode_all(&[typed.clone()]);

        // Without a handler the typed object passes through
        assert_eq!(decode_all(&encoded).unwrap(), vec![typed]);

        let handlers = ExternalHandlers::new();
        handlers.register(
            "flex.messaging.io.ArrayCollection",
            Arc::new(|_: &str, mut props: HashMap<String, AmfValue>| {
                props.remove("source").ok_or(AmfError::External {
                    class_name: "flex.messaging.io.ArrayCollection".into(),
                    reason: "missing source".into(),
                })
            }),
        );

        let mut decoder = Amf0Decoder::with_external_handlers(handlers);
        let value = decoder.decode(&mut encoded.clone()).unwrap();
        assert_eq!(value, AmfValue::Array(vec![AmfValue::Number(7.0)]));
    }
}
