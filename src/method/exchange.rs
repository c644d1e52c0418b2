//! Class 40: `exchange.*`. Grounded on
//! `examples/original_source/grabbit/grabbit/methods/exchange.py`.
//!
//! `Bind`/`BindOk` is a RabbitMQ extension (exchange-to-exchange binding)
//! beyond the base AMQP 0-9-1 grammar, carried here because the originating
//! implementation carries it.

use crate::codec::field_table::{pack_field_table, unpack_field_table, FieldTable};
use crate::codec::primitive::{
    pack_bits, pack_short, pack_short_string, unpack_bits, unpack_short, unpack_short_string,
};
use crate::error::AmqpResult;

pub const CLASS_ID: u16 = 40;

pub mod method_id {
    pub const DECLARE: u16 = 10;
    pub const DECLARE_OK: u16 = 11;
    pub const DELETE: u16 = 20;
    pub const DELETE_OK: u16 = 21;
    pub const BIND: u16 = 30;
    pub const BIND_OK: u16 = 31;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeMethod {
    Declare(Declare),
    DeclareOk(DeclareOk),
    Delete(Delete),
    DeleteOk(DeleteOk),
    Bind(Bind),
    BindOk(BindOk),
}

impl ExchangeMethod {
    #[must_use]
    pub fn method_id(&self) -> u16 {
        match self {
            ExchangeMethod::Declare(_) => method_id::DECLARE,
            ExchangeMethod::DeclareOk(_) => method_id::DECLARE_OK,
            ExchangeMethod::Delete(_) => method_id::DELETE,
            ExchangeMethod::DeleteOk(_) => method_id::DELETE_OK,
            ExchangeMethod::Bind(_) => method_id::BIND,
            ExchangeMethod::BindOk(_) => method_id::BIND_OK,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ExchangeMethod::Declare(m) => m.pack(&mut buf),
            ExchangeMethod::DeclareOk(m) => m.pack(&mut buf),
            ExchangeMethod::Delete(m) => m.pack(&mut buf),
            ExchangeMethod::DeleteOk(m) => m.pack(&mut buf),
            ExchangeMethod::Bind(m) => m.pack(&mut buf),
            ExchangeMethod::BindOk(m) => m.pack(&mut buf),
        }
        buf
    }

    pub fn unpack(method_id: u16, data: &[u8]) -> AmqpResult<(ExchangeMethod, &[u8])> {
        use method_id as id;
        Ok(match method_id {
            id::DECLARE => {
                let (m, rest) = Declare::unpack(data)?;
                (ExchangeMethod::Declare(m), rest)
            }
            id::DECLARE_OK => {
                let (m, rest) = DeclareOk::unpack(data)?;
                (ExchangeMethod::DeclareOk(m), rest)
            }
            id::DELETE => {
                let (m, rest) = Delete::unpack(data)?;
                (ExchangeMethod::Delete(m), rest)
            }
            id::DELETE_OK => {
                let (m, rest) = DeleteOk::unpack(data)?;
                (ExchangeMethod::DeleteOk(m), rest)
            }
            id::BIND => {
                let (m, rest) = Bind::unpack(data)?;
                (ExchangeMethod::Bind(m), rest)
            }
            id::BIND_OK => {
                let (m, rest) = BindOk::unpack(data)?;
                (ExchangeMethod::BindOk(m), rest)
            }
            other => {
                return Err(crate::error::AmqpError::SyntaxError {
                    reason: format!("unknown exchange method id {other}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declare {
    pub exchange: String,
    pub exchange_type: String,
    pub passive: bool,
    pub durable: bool,
    pub autodelete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Declare {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, 0); // reserved
        pack_short_string(buf, &self.exchange).expect("exchange name fits in a short string");
        pack_short_string(buf, &self.exchange_type).expect("exchange type fits in a short string");
        pack_bits(
            buf,
            &[
                self.passive,
                self.durable,
                self.autodelete,
                self.internal,
                self.no_wait,
            ],
        );
        pack_field_table(buf, &self.arguments).expect("arguments are well-formed");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Declare, &[u8])> {
        let (_reserved, data) = unpack_short(data)?;
        let (exchange, data) = unpack_short_string(data)?;
        let (exchange_type, data) = unpack_short_string(data)?;
        let (bits, data) = unpack_bits(data, 5)?;
        let (arguments, data) = unpack_field_table(data)?;
        Ok((
            Declare {
                exchange,
                exchange_type,
                passive: bits[0],
                durable: bits[1],
                autodelete: bits[2],
                internal: bits[3],
                no_wait: bits[4],
                arguments,
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeclareOk;

impl DeclareOk {
    fn pack(&self, _buf: &mut Vec<u8>) {}

    fn unpack(data: &[u8]) -> AmqpResult<(DeclareOk, &[u8])> {
        Ok((DeclareOk, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub exchange: String,
    pub if_unused: bool,
    pub no_wait: bool,
}

impl Delete {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, 0); // reserved
        pack_short_string(buf, &self.exchange).expect("exchange name fits in a short string");
        pack_bits(buf, &[self.if_unused, self.no_wait]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Delete, &[u8])> {
        let (_reserved, data) = unpack_short(data)?;
        let (exchange, data) = unpack_short_string(data)?;
        let (bits, data) = unpack_bits(data, 2)?;
        Ok((
            Delete {
                exchange,
                if_unused: bits[0],
                no_wait: bits[1],
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteOk;

impl DeleteOk {
    fn pack(&self, _buf: &mut Vec<u8>) {}

    fn unpack(data: &[u8]) -> AmqpResult<(DeleteOk, &[u8])> {
        Ok((DeleteOk, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub destination: String,
    pub source: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Bind {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, 0); // reserved
        pack_short_string(buf, &self.destination).expect("destination fits in a short string");
        pack_short_string(buf, &self.source).expect("source fits in a short string");
        pack_short_string(buf, &self.routing_key).expect("routing key fits in a short string");
        pack_bits(buf, &[self.no_wait]);
        pack_field_table(buf, &self.arguments).expect("arguments are well-formed");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Bind, &[u8])> {
        let (_reserved, data) = unpack_short(data)?;
        let (destination, data) = unpack_short_string(data)?;
        let (source, data) = unpack_short_string(data)?;
        let (routing_key, data) = unpack_short_string(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        let (arguments, data) = unpack_field_table(data)?;
        Ok((
            Bind {
                destination,
                source,
                routing_key,
                no_wait: bits[0],
                arguments,
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindOk;

impl BindOk {
    fn pack(&self, _buf: &mut Vec<u8>) {}

    fn unpack(data: &[u8]) -> AmqpResult<(BindOk, &[u8])> {
        Ok((BindOk, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_round_trips() {
        let m = Declare {
            exchange: "logs".to_owned(),
            exchange_type: "topic".to_owned(),
            passive: false,
            durable: true,
            autodelete: false,
            internal: false,
            no_wait: false,
            arguments: FieldTable::new(),
        };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = Declare::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }
}
