//! Compact binary frame shared by inbound telemetry and outbound commands.
//!
//! Layout:
//! ```text
//! magic 0xB5 | version 0x01 | field count u8 | fields...
//! field: key len u8 | key bytes | tag u8 | value
//! tags:  0x01 i64 (8 bytes LE)
//!        0x02 f64 (8 bytes LE)
//!        0x03 bool (1 byte)
//!        0x04 string (u16 LE length + bytes)
//!        0x05 nested map (field count u8 + fields, scalars only)
//! ```
//!
//! Encoding a field map and decoding the frame yields the identical map;
//! the command dispatcher relies on this symmetry.

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAGIC: u8 = 0xB5;
const VERSION: u8 = 0x01;

const TAG_I64: u8 = 0x01;
const TAG_F64: u8 = 0x02;
const TAG_BOOL: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_MAP: u8 = 0x05;

/// Field map contains a value the frame format cannot carry.
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("unsupported value for key '{0}': only scalars and one nesting level")]
    Unsupported(String),
    #[error("non-finite number for key '{0}'")]
    NonFinite(String),
    #[error("key '{0}' exceeds 255 bytes")]
    KeyTooLong(String),
    #[error("string value for key '{0}' exceeds 65535 bytes")]
    StringTooLong(String),
    #[error("too many fields ({0}), frame carries at most 255")]
    TooManyFields(usize),
}

/// Frame failed structured decode; callers fall through to JSON.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum FrameError {
    #[error("missing or wrong magic/version")]
    BadHeader,
    #[error("truncated frame")]
    Truncated,
    #[error("unknown value tag {0:#04x}")]
    UnknownTag(u8),
    #[error("key is not valid UTF-8")]
    BadKey,
    #[error("non-finite float value")]
    NonFinite,
    #[error("trailing bytes after last field")]
    TrailingBytes,
}

/// Encode a field map into a compact binary frame.
pub fn encode(fields: &Map<String, Value>) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(64);
    out.push(MAGIC);
    out.push(VERSION);
    write_map(&mut out, fields, true)?;
    Ok(out)
}

fn write_map(out: &mut Vec<u8>, fields: &Map<String, Value>, allow_nesting: bool) -> Result<(), EncodeError> {
    if fields.len() > u8::MAX as usize {
        return Err(EncodeError::TooManyFields(fields.len()));
    }
    out.push(fields.len() as u8);

    for (key, value) in fields {
        if key.len() > u8::MAX as usize {
            return Err(EncodeError::KeyTooLong(key.clone()));
        }
        out.push(key.len() as u8);
        out.extend_from_slice(key.as_bytes());

        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    out.push(TAG_I64);
                    out.extend_from_slice(&i.to_le_bytes());
                } else {
                    let f = n.as_f64().ok_or_else(|| EncodeError::NonFinite(key.clone()))?;
                    if !f.is_finite() {
                        return Err(EncodeError::NonFinite(key.clone()));
                    }
                    out.push(TAG_F64);
                    out.extend_from_slice(&f.to_le_bytes());
                }
            }
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Value::String(s) => {
                if s.len() > u16::MAX as usize {
                    return Err(EncodeError::StringTooLong(key.clone()));
                }
                out.push(TAG_STRING);
                out.extend_from_slice(&(s.len() as u16).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Object(nested) if allow_nesting => {
                out.push(TAG_MAP);
                write_map(out, nested, false)?;
            }
            _ => return Err(EncodeError::Unsupported(key.clone())),
        }
    }

    Ok(())
}

/// Decode a compact binary frame into a field map.
pub(crate) fn decode_frame(bytes: &[u8]) -> Result<Map<String, Value>, FrameError> {
    if bytes.len() < 3 || bytes[0] != MAGIC || bytes[1] != VERSION {
        return Err(FrameError::BadHeader);
    }

    let mut cursor = Cursor {
        bytes,
        position: 2,
    };
    let fields = read_map(&mut cursor, true)?;

    if cursor.position != bytes.len() {
        return Err(FrameError::TrailingBytes);
    }

    Ok(fields)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], FrameError> {
        let end = self.position.checked_add(n).ok_or(FrameError::Truncated)?;
        if end > self.bytes.len() {
            return Err(FrameError::Truncated);
        }
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.take(1)?[0])
    }
}

fn read_map(cursor: &mut Cursor<'_>, allow_nesting: bool) -> Result<Map<String, Value>, FrameError> {
    let count = cursor.take_u8()? as usize;
    let mut fields = Map::new();

    for _ in 0..count {
        let key_len = cursor.take_u8()? as usize;
        let key = std::str::from_utf8(cursor.take(key_len)?)
            .map_err(|_| FrameError::BadKey)?
            .to_string();

        let tag = cursor.take_u8()?;
        let value = match tag {
            TAG_I64 => {
                let raw: [u8; 8] = cursor.take(8)?.try_into().unwrap();
                Value::Number(i64::from_le_bytes(raw).into())
            }
            TAG_F64 => {
                let raw: [u8; 8] = cursor.take(8)?.try_into().unwrap();
                let f = f64::from_le_bytes(raw);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or(FrameError::NonFinite)?
            }
            TAG_BOOL => Value::Bool(cursor.take_u8()? != 0),
            TAG_STRING => {
                let raw: [u8; 2] = cursor.take(2)?.try_into().unwrap();
                let len = u16::from_le_bytes(raw) as usize;
                let s = std::str::from_utf8(cursor.take(len)?)
                    .map_err(|_| FrameError::BadKey)?;
                Value::String(s.to_string())
            }
            TAG_MAP if allow_nesting => Value::Object(read_map(cursor, false)?),
            other => return Err(FrameError::UnknownTag(other)),
        };

        fields.insert(key, value);
    }

    Ok(fields)
}
