//! Deterministic binary form of `AttributeValue`.
//!
//! Layout is a one-byte type tag followed by the payload. Every variable
//! length field is prefixed with a big-endian `u32` length.
//!
//! [`serialize`] keeps set members in the caller's order so a value decodes
//! back exactly as written. [`serialize_canonical`] sorts set members, and the
//! item signature uses it because the store does not preserve set order.
//! Map keys are sorted in both forms.

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

use crate::errors::{Error, Result};

const TAG_STRING: u8 = b'S';
const TAG_NUMBER: u8 = b'N';
const TAG_BINARY: u8 = b'B';
const TAG_STRING_SET: u8 = b's';
const TAG_NUMBER_SET: u8 = b'n';
const TAG_BINARY_SET: u8 = b'b';
const TAG_MAP: u8 = b'M';
const TAG_LIST: u8 = b'L';
const TAG_NULL: u8 = b'0';
const TAG_BOOL: u8 = b'?';

/// Encoding that round-trips through [`deserialize`] unchanged.
pub fn serialize(value: &AttributeValue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(&mut out, value, false)?;
    Ok(out)
}

/// Encoding where equal sets give equal bytes regardless of member order.
pub fn serialize_canonical(value: &AttributeValue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_value(&mut out, value, true)?;
    Ok(out)
}

pub fn deserialize(bytes: &[u8]) -> Result<AttributeValue> {
    let mut reader = Reader { bytes, pos: 0 };
    let value = reader.read_value()?;
    if reader.pos != bytes.len() {
        return Err(Error::Decryption(format!(
            "{} trailing bytes after serialized attribute",
            bytes.len() - reader.pos
        )));
    }
    Ok(value)
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::Encryption("attribute value too large to serialize".to_string()))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    write_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_set(out: &mut Vec<u8>, tag: u8, mut members: Vec<&[u8]>, canonical: bool) -> Result<()> {
    if canonical {
        members.sort_unstable();
    }
    out.push(tag);
    write_len(out, members.len())?;
    for member in members {
        write_bytes(out, member)?;
    }
    Ok(())
}

fn write_value(out: &mut Vec<u8>, value: &AttributeValue, canonical: bool) -> Result<()> {
    match value {
        AttributeValue::S(s) => {
            out.push(TAG_STRING);
            write_bytes(out, s.as_bytes())
        }
        AttributeValue::N(n) => {
            out.push(TAG_NUMBER);
            write_bytes(out, n.as_bytes())
        }
        AttributeValue::B(b) => {
            out.push(TAG_BINARY);
            write_bytes(out, b.as_ref())
        }
        AttributeValue::Ss(set) => write_set(
            out,
            TAG_STRING_SET,
            set.iter().map(|s| s.as_bytes()).collect(),
            canonical,
        ),
        AttributeValue::Ns(set) => write_set(
            out,
            TAG_NUMBER_SET,
            set.iter().map(|s| s.as_bytes()).collect(),
            canonical,
        ),
        AttributeValue::Bs(set) => write_set(
            out,
            TAG_BINARY_SET,
            set.iter().map(|b| b.as_ref()).collect(),
            canonical,
        ),
        AttributeValue::M(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push(TAG_MAP);
            write_len(out, entries.len())?;
            for (key, inner) in entries {
                write_bytes(out, key.as_bytes())?;
                write_value(out, inner, canonical)?;
            }
            Ok(())
        }
        AttributeValue::L(list) => {
            out.push(TAG_LIST);
            write_len(out, list.len())?;
            for inner in list {
                write_value(out, inner, canonical)?;
            }
            Ok(())
        }
        AttributeValue::Null(_) => {
            out.push(TAG_NULL);
            Ok(())
        }
        AttributeValue::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
            Ok(())
        }
        other => Err(Error::Encryption(format!(
            "unsupported attribute type: {:?}",
            other
        ))),
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| Error::Decryption("serialized attribute is truncated".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_len(&mut self) -> Result<usize> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
    }

    fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    fn read_string(&mut self) -> Result<String> {
        let raw = self.read_bytes()?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::Decryption(format!("invalid UTF-8 in attribute: {}", e)))
    }

    fn read_value(&mut self) -> Result<AttributeValue> {
        let tag = self.read_u8()?;
        match tag {
            TAG_STRING => Ok(AttributeValue::S(self.read_string()?)),
            TAG_NUMBER => Ok(AttributeValue::N(self.read_string()?)),
            TAG_BINARY => Ok(AttributeValue::B(Blob::new(self.read_bytes()?))),
            TAG_STRING_SET | TAG_NUMBER_SET => {
                let count = self.read_len()?;
                let members = (0..count)
                    .map(|_| self.read_string())
                    .collect::<Result<Vec<_>>>()?;
                Ok(if tag == TAG_STRING_SET {
                    AttributeValue::Ss(members)
                } else {
                    AttributeValue::Ns(members)
                })
            }
            TAG_BINARY_SET => {
                let count = self.read_len()?;
                let members = (0..count)
                    .map(|_| self.read_bytes().map(Blob::new))
                    .collect::<Result<Vec<_>>>()?;
                Ok(AttributeValue::Bs(members))
            }
            TAG_MAP => {
                let count = self.read_len()?;
                let mut map = HashMap::with_capacity(count);
                for _ in 0..count {
                    let key = self.read_string()?;
                    let value = self.read_value()?;
                    map.insert(key, value);
                }
                Ok(AttributeValue::M(map))
            }
            TAG_LIST => {
                let count = self.read_len()?;
                let list = (0..count)
                    .map(|_| self.read_value())
                    .collect::<Result<Vec<_>>>()?;
                Ok(AttributeValue::L(list))
            }
            TAG_NULL => Ok(AttributeValue::Null(true)),
            TAG_BOOL => Ok(AttributeValue::Bool(self.read_u8()? != 0)),
            other => Err(Error::Decryption(format!(
                "unknown attribute type tag: {:#04x}",
                other
            ))),
        }
    }
}
