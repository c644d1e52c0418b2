//! Class 85: `confirm.*`, the publisher-confirms extension. Grounded on
//! `examples/original_source/grabbit/grabbit/methods/confirm.py`.
//!
//! The original source leaves `Select`'s response undeclared, unlike every
//! other `*.Select`/`*.SelectOk` pair in the registry; DESIGN.md records the
//! decision to treat that as an omission and declare `SelectOk` here.

use crate::codec::primitive::{pack_bits, unpack_bits};
use crate::error::AmqpResult;

pub const CLASS_ID: u16 = 85;

pub mod method_id {
    pub const SELECT: u16 = 10;
    pub const SELECT_OK: u16 = 11;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMethod {
    Select(Select),
    SelectOk(SelectOk),
}

impl ConfirmMethod {
    #[must_use]
    pub fn method_id(&self) -> u16 {
        match self {
            ConfirmMethod::Select(_) => method_id::SELECT,
            ConfirmMethod::SelectOk(_) => method_id::SELECT_OK,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ConfirmMethod::Select(m) => m.pack(&mut buf),
            ConfirmMethod::SelectOk(m) => m.pack(&mut buf),
        }
        buf
    }

    pub fn unpack(method_id: u16, data: &[u8]) -> AmqpResult<(ConfirmMethod, &[u8])> {
        use method_id as id;
        Ok(match method_id {
            id::SELECT => {
                let (m, rest) = Select::unpack(data)?;
                (ConfirmMethod::Select(m), rest)
            }
            id::SELECT_OK => {
                let (m, rest) = SelectOk::unpack(data)?;
                (ConfirmMethod::SelectOk(m), rest)
            }
            other => {
                return Err(crate::error::AmqpError::SyntaxError {
                    reason: format!("unknown confirm method id {other}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Select {
    pub no_wait: bool,
}

impl Select {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_bits(buf, &[self.no_wait]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Select, &[u8])> {
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((Select { no_wait: bits[0] }, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectOk;

impl SelectOk {
    fn pack(&self, _buf: &mut Vec<u8>) {}

    fn unpack(data: &[u8]) -> AmqpResult<(SelectOk, &[u8])> {
        Ok((SelectOk, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_round_trips() {
        let m = Select { no_wait: true };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = Select::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }

    #[test]
    fn select_declares_select_ok_as_its_response() {
        assert_eq!(
            crate::method::response_set(CLASS_ID, method_id::SELECT),
            &[method_id::SELECT_OK]
        );
    }
}
