//! Field tables: the self-describing key/value maps AMQP threads through
//! method arguments and content properties, plus RabbitMQ's type-tag
//! errata (<https://www.rabbitmq.com/amqp-0-9-1-errata.html>).

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use num::ToPrimitive;

use crate::codec::primitive::{
    pack_long_string, pack_octet, pack_timestamp, unpack_long_string, unpack_octet,
    unpack_timestamp,
};
use crate::error::{AmqpError, AmqpResult};

/// A field table value. Variant set and wire tags per the RabbitMQ errata,
/// not the (looser) base AMQP 0-9-1 grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Boolean(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal { scale: u8, mantissa: i32 },
    LongString(Vec<u8>),
    Array(Vec<FieldValue>),
    Timestamp(u64),
    Table(FieldTable),
    Void,
}

/// An ordered field table. Ordering is preserved for encode-stability even
/// though lookups are by name; a `BTreeMap` gives us that plus equality.
pub type FieldTable = BTreeMap<String, FieldValue>;

fn tag_for(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Boolean(_) => b't',
        FieldValue::I8(_) => b'b',
        FieldValue::I16(_) => b's',
        FieldValue::I32(_) => b'I',
        FieldValue::I64(_) => b'l',
        FieldValue::F32(_) => b'f',
        FieldValue::F64(_) => b'd',
        FieldValue::Decimal { .. } => b'D',
        FieldValue::LongString(_) => b'S',
        FieldValue::Array(_) => b'A',
        FieldValue::Timestamp(_) => b'T',
        FieldValue::Table(_) => b'F',
        FieldValue::Void => b'V',
    }
}

impl FieldValue {
    pub fn pack(&self, buf: &mut Vec<u8>) -> AmqpResult<()> {
        match self {
            FieldValue::Boolean(b) => pack_octet(buf, u8::from(*b)),
            FieldValue::I8(v) => buf.push(*v as u8),
            FieldValue::I16(v) => buf.extend_from_slice(&v.to_be_bytes()),
            FieldValue::I32(v) => buf.extend_from_slice(&v.to_be_bytes()),
            FieldValue::I64(v) => buf.extend_from_slice(&v.to_be_bytes()),
            FieldValue::F32(v) => buf.extend_from_slice(&v.to_be_bytes()),
            FieldValue::F64(v) => buf.extend_from_slice(&v.to_be_bytes()),
            FieldValue::Decimal { scale, mantissa } => {
                pack_octet(buf, *scale);
                buf.extend_from_slice(&mantissa.to_be_bytes());
            }
            FieldValue::LongString(bytes) => pack_long_string(buf, bytes),
            FieldValue::Array(items) => {
                let mut payload = Vec::new();
                for item in items {
                    payload.push(tag_for(item));
                    item.pack(&mut payload)?;
                }
                pack_long_string(buf, &payload);
            }
            FieldValue::Timestamp(v) => pack_timestamp(buf, *v),
            FieldValue::Table(table) => {
                let mut payload = Vec::new();
                pack_table_entries(table, &mut payload)?;
                pack_long_string(buf, &payload);
            }
            FieldValue::Void => {}
        }
        Ok(())
    }

    pub fn unpack(tag: u8, data: &[u8]) -> AmqpResult<(FieldValue, &[u8])> {
        match tag {
            b't' => {
                let (v, rest) = unpack_octet(data)?;
                Ok((FieldValue::Boolean(v != 0), rest))
            }
            b'b' => {
                let (v, rest) = unpack_octet(data)?;
                Ok((FieldValue::I8(v as i8), rest))
            }
            b's' => {
                let (bytes, rest) = take(data, 2)?;
                Ok((FieldValue::I16(i16::from_be_bytes([bytes[0], bytes[1]])), rest))
            }
            b'I' => {
                let (bytes, rest) = take(data, 4)?;
                Ok((FieldValue::I32(i32::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            b'l' => {
                let (bytes, rest) = take(data, 8)?;
                Ok((FieldValue::I64(i64::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            b'f' => {
                let (bytes, rest) = take(data, 4)?;
                Ok((FieldValue::F32(f32::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            b'd' => {
                let (bytes, rest) = take(data, 8)?;
                Ok((FieldValue::F64(f64::from_be_bytes(bytes.try_into().unwrap())), rest))
            }
            b'D' => {
                let (scale, data) = unpack_octet(data)?;
                let (bytes, rest) = take(data, 4)?;
                let mantissa = i32::from_be_bytes(bytes.try_into().unwrap());
                Ok((FieldValue::Decimal { scale, mantissa }, rest))
            }
            b'S' | b'x' => {
                let (bytes, rest) = unpack_long_string(data)?;
                Ok((FieldValue::LongString(bytes), rest))
            }
            b'A' => {
                let (payload, rest) = unpack_long_string(data)?;
                let mut items = Vec::new();
                let mut slice: &[u8] = &payload;
                while !slice.is_empty() {
                    let (tag, after_tag) = unpack_octet(slice)?;
                    let (value, after_value) = FieldValue::unpack(tag, after_tag)?;
                    items.push(value);
                    slice = after_value;
                }
                Ok((FieldValue::Array(items), rest))
            }
            b'T' => {
                let (v, rest) = unpack_timestamp(data)?;
                Ok((FieldValue::Timestamp(v), rest))
            }
            b'F' => {
                let (payload, rest) = unpack_long_string(data)?;
                let table = unpack_table_entries(&payload)?;
                Ok((FieldValue::Table(table), rest))
            }
            b'V' => Ok((FieldValue::Void, data)),
            other => Err(AmqpError::SyntaxError {
                reason: format!("unrecognised field table type tag {:#04x}", other),
            }),
        }
    }

    /// Coerces a handful of common host value shapes into the closest
    /// `FieldValue`, per SPEC_FULL §4.2's coercion table. This is the escape
    /// hatch for callers that don't want to name an exact wire type; direct
    /// construction of a variant is always preferred when precision matters.
    pub fn from_bool(v: bool) -> FieldValue {
        FieldValue::Boolean(v)
    }

    pub fn from_i64(v: i64) -> FieldValue {
        FieldValue::I64(v)
    }

    pub fn from_f64(v: f64) -> FieldValue {
        FieldValue::F64(v)
    }

    pub fn from_str(v: impl Into<String>) -> FieldValue {
        FieldValue::LongString(v.into().into_bytes())
    }

    pub fn from_decimal(value: &BigDecimal) -> AmqpResult<FieldValue> {
        let (mantissa, scale) = value.as_bigint_and_exponent();
        let scale = u8::try_from(scale).map_err(|_| AmqpError::InternalError {
            reason: format!("decimal scale {scale} does not fit in a field-table octet"),
        })?;
        let mantissa = mantissa.to_i32().ok_or_else(|| AmqpError::InternalError {
            reason: "decimal mantissa does not fit in a signed 32-bit field-table value".to_owned(),
        })?;
        Ok(FieldValue::Decimal { scale, mantissa })
    }
}

fn take(data: &[u8], n: usize) -> AmqpResult<(&[u8], &[u8])> {
    if data.len() < n {
        return Err(AmqpError::SyntaxError {
            reason: "field table payload ended before expected value".to_owned(),
        });
    }
    Ok(data.split_at(n))
}

const FIELD_NAME_FIRST_EXTRA: &[u8] = b"$#";

/// Validates a field name per §4.2: first char in letters∪{$,#}, remaining
/// chars in letters∪digits∪{_}, length ≤ 128.
pub fn validate_field_name(name: &str) -> AmqpResult<()> {
    if name.is_empty() || name.len() > 128 {
        return Err(AmqpError::InternalError {
            reason: format!("field name {name:?} must be 1..=128 bytes"),
        });
    }
    let bytes = name.as_bytes();
    let first = bytes[0];
    let first_ok = first.is_ascii_alphabetic() || FIELD_NAME_FIRST_EXTRA.contains(&first);
    if !first_ok {
        return Err(AmqpError::InternalError {
            reason: format!("illegal first character in field name {name:?}"),
        });
    }
    for &c in &bytes[1..] {
        if !(c.is_ascii_alphanumeric() || c == b'_') {
            return Err(AmqpError::InternalError {
                reason: format!("illegal character in field name {name:?}"),
            });
        }
    }
    Ok(())
}

fn pack_table_entries(table: &FieldTable, buf: &mut Vec<u8>) -> AmqpResult<()> {
    for (name, value) in table {
        validate_field_name(name)?;
        crate::codec::primitive::pack_short_string(buf, name)?;
        buf.push(tag_for(value));
        value.pack(buf)?;
    }
    Ok(())
}

fn unpack_table_entries(mut data: &[u8]) -> AmqpResult<FieldTable> {
    let mut table = FieldTable::new();
    while !data.is_empty() {
        let (name, after_name) = crate::codec::primitive::unpack_short_string(data)?;
        let (tag, after_tag) = unpack_octet(after_name)?;
        let (value, after_value) = FieldValue::unpack(tag, after_tag)?;
        table.insert(name, value);
        data = after_value;
    }
    Ok(table)
}

/// Packs a field table as its long-string-wrapped wire form.
pub fn pack_field_table(buf: &mut Vec<u8>, table: &FieldTable) -> AmqpResult<()> {
    let mut payload = Vec::new();
    pack_table_entries(table, &mut payload)?;
    pack_long_string(buf, &payload);
    Ok(())
}

/// Unpacks the long-string-wrapped wire form of a field table.
pub fn unpack_field_table(data: &[u8]) -> AmqpResult<(FieldTable, &[u8])> {
    let (payload, rest) = unpack_long_string(data)?;
    let table = unpack_table_entries(&payload)?;
    Ok((table, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_values_round_trip() {
        for value in [
            FieldValue::Boolean(true),
            FieldValue::Boolean(false),
            FieldValue::I8(-5),
            FieldValue::I16(-300),
            FieldValue::I32(70_000),
            FieldValue::I64(-9_000_000_000),
            FieldValue::F32(1.5),
            FieldValue::F64(-2.25),
            FieldValue::Decimal { scale: 2, mantissa: 12345 },
            FieldValue::LongString(b"hello".to_vec()),
            FieldValue::Timestamp(1_700_000_000),
            FieldValue::Void,
        ] {
            let mut buf = Vec::new();
            value.pack(&mut buf).unwrap();
            let (back, rest) = FieldValue::unpack(tag_for(&value), &buf).unwrap();
            assert_eq!(back, value);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn nested_table_round_trips() {
        let mut inner = FieldTable::new();
        inner.insert("x".to_owned(), FieldValue::I64(1));
        let value = FieldValue::Table(inner);
        let mut buf = Vec::new();
        value.pack(&mut buf).unwrap();
        let (back, rest) = FieldValue::unpack(tag_for(&value), &buf).unwrap();
        assert_eq!(back, value);
        assert!(rest.is_empty());
    }

    #[test]
    fn array_round_trips() {
        let value = FieldValue::Array(vec![FieldValue::I64(1), FieldValue::Boolean(true)]);
        let mut buf = Vec::new();
        value.pack(&mut buf).unwrap();
        let (back, rest) = FieldValue::unpack(tag_for(&value), &buf).unwrap();
        assert_eq!(back, value);
        assert!(rest.is_empty());
    }

    #[test]
    fn field_table_top_level_round_trip() {
        let mut table = FieldTable::new();
        table.insert("count".to_owned(), FieldValue::I64(42));
        table.insert("ok".to_owned(), FieldValue::Boolean(true));
        let mut buf = Vec::new();
        pack_field_table(&mut buf, &table).unwrap();
        let (back, rest) = unpack_field_table(&buf).unwrap();
        assert_eq!(back, table);
        assert!(rest.is_empty());
    }

    #[test]
    fn field_name_validation() {
        assert!(validate_field_name("valid_name1").is_ok());
        assert!(validate_field_name("$special").is_ok());
        assert!(validate_field_name("1bad").is_err());
        assert!(validate_field_name("has space").is_err());
        assert!(validate_field_name(&"x".repeat(129)).is_err());
    }

    #[test]
    fn truncated_table_is_syntax_error() {
        let mut buf = Vec::new();
        pack_long(&mut buf, 100); // claims 100 bytes of payload that don't exist
        assert!(unpack_field_table(&buf).is_err());
    }

    fn pack_long(buf: &mut Vec<u8>, v: u32) {
        crate::codec::primitive::pack_long(buf, v);
    }

    #[test]
    fn unknown_type_tag_is_syntax_error() {
        assert!(FieldValue::unpack(b'?', &[]).is_err());
    }
}
