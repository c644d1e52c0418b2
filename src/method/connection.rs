//! Class 10: `connection.*`. Grounded on
//! `examples/original_source/grabbit/grabbit/methods/connection.py`.

use crate::codec::field_table::{pack_field_table, unpack_field_table, FieldTable};
use crate::codec::primitive::{
    pack_long, pack_octet, pack_short, pack_short_string, unpack_long, unpack_octet, unpack_short,
    unpack_short_string,
};
use crate::error::{AmqpError, AmqpResult};
use crate::method::common::CloseArgs;

pub const CLASS_ID: u16 = 10;

pub mod method_id {
    pub const START: u16 = 10;
    pub const START_OK: u16 = 11;
    pub const SECURE: u16 = 20;
    pub const SECURE_OK: u16 = 21;
    pub const TUNE: u16 = 30;
    pub const TUNE_OK: u16 = 31;
    pub const OPEN: u16 = 40;
    pub const OPEN_OK: u16 = 41;
    pub const CLOSE: u16 = 50;
    pub const CLOSE_OK: u16 = 51;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionMethod {
    Start(Start),
    StartOk(StartOk),
    Secure(Secure),
    SecureOk(SecureOk),
    Tune(Tune),
    TuneOk(TuneOk),
    Open(Open),
    OpenOk(OpenOk),
    Close(Close),
    CloseOk(CloseOk),
}

impl ConnectionMethod {
    #[must_use]
    pub fn method_id(&self) -> u16 {
        match self {
            ConnectionMethod::Start(_) => method_id::START,
            ConnectionMethod::StartOk(_) => method_id::START_OK,
            ConnectionMethod::Secure(_) => method_id::SECURE,
            ConnectionMethod::SecureOk(_) => method_id::SECURE_OK,
            ConnectionMethod::Tune(_) => method_id::TUNE,
            ConnectionMethod::TuneOk(_) => method_id::TUNE_OK,
            ConnectionMethod::Open(_) => method_id::OPEN,
            ConnectionMethod::OpenOk(_) => method_id::OPEN_OK,
            ConnectionMethod::Close(_) => method_id::CLOSE,
            ConnectionMethod::CloseOk(_) => method_id::CLOSE_OK,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ConnectionMethod::Start(m) => m.pack(&mut buf),
            ConnectionMethod::StartOk(m) => m.pack(&mut buf),
            ConnectionMethod::Secure(m) => m.pack(&mut buf),
            ConnectionMethod::SecureOk(m) => m.pack(&mut buf),
            ConnectionMethod::Tune(m) => m.pack(&mut buf),
            ConnectionMethod::TuneOk(m) => m.pack(&mut buf),
            ConnectionMethod::Open(m) => m.pack(&mut buf),
            ConnectionMethod::OpenOk(m) => m.pack(&mut buf),
            ConnectionMethod::Close(m) => m.pack(&mut buf),
            ConnectionMethod::CloseOk(m) => m.pack(&mut buf),
        }
        buf
    }

    pub fn unpack(method_id: u16, data: &[u8]) -> AmqpResult<(ConnectionMethod, &[u8])> {
        use method_id as id;
        Ok(match method_id {
            id::START => {
                let (m, rest) = Start::unpack(data)?;
                (ConnectionMethod::Start(m), rest)
            }
            id::START_OK => {
                let (m, rest) = StartOk::unpack(data)?;
                (ConnectionMethod::StartOk(m), rest)
            }
            id::SECURE => {
                let (m, rest) = Secure::unpack(data)?;
                (ConnectionMethod::Secure(m), rest)
            }
            id::SECURE_OK => {
                let (m, rest) = SecureOk::unpack(data)?;
                (ConnectionMethod::SecureOk(m), rest)
            }
            id::TUNE => {
                let (m, rest) = Tune::unpack(data)?;
                (ConnectionMethod::Tune(m), rest)
            }
            id::TUNE_OK => {
                let (m, rest) = TuneOk::unpack(data)?;
                (ConnectionMethod::TuneOk(m), rest)
            }
            id::OPEN => {
                let (m, rest) = Open::unpack(data)?;
                (ConnectionMethod::Open(m), rest)
            }
            id::OPEN_OK => {
                let (m, rest) = OpenOk::unpack(data)?;
                (ConnectionMethod::OpenOk(m), rest)
            }
            id::CLOSE => {
                let (m, rest) = Close::unpack(data)?;
                (ConnectionMethod::Close(m), rest)
            }
            id::CLOSE_OK => {
                let (m, rest) = CloseOk::unpack(data)?;
                (ConnectionMethod::CloseOk(m), rest)
            }
            other => {
                return Err(AmqpError::SyntaxError {
                    reason: format!("unknown connection method id {other}"),
                })
            }
        })
    }
}

/// Server's opening bid: protocol version, server properties, and the
/// space-separated lists of supported security mechanisms and locales.
#[derive(Debug, Clone, PartialEq)]
pub struct Start {
    pub version_major: u8,
    pub version_minor: u8,
    pub server_properties: FieldTable,
    pub security_mechanisms: Vec<String>,
    pub locales: Vec<String>,
}

impl Start {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_octet(buf, self.version_major);
        pack_octet(buf, self.version_minor);
        pack_field_table(buf, &self.server_properties).expect("server properties are well-formed");
        crate::codec::primitive::pack_long_string(
            buf,
            self.security_mechanisms.join(" ").as_bytes(),
        );
        crate::codec::primitive::pack_long_string(buf, self.locales.join(" ").as_bytes());
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Start, &[u8])> {
        let (version_major, data) = unpack_octet(data)?;
        let (version_minor, data) = unpack_octet(data)?;
        let (server_properties, data) = unpack_field_table(data)?;
        let (mechanisms, data) = crate::codec::primitive::unpack_long_string(data)?;
        let (locales, data) = crate::codec::primitive::unpack_long_string(data)?;
        let split = |bytes: Vec<u8>| -> Vec<String> {
            String::from_utf8_lossy(&bytes)
                .split_whitespace()
                .map(ToOwned::to_owned)
                .collect()
        };
        Ok((
            Start {
                version_major,
                version_minor,
                server_properties,
                security_mechanisms: split(mechanisms),
                locales: split(locales),
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartOk {
    pub client_properties: FieldTable,
    pub mechanism: String,
    pub response: Vec<u8>,
    pub locale: String,
}

impl StartOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_field_table(buf, &self.client_properties).expect("client properties are well-formed");
        pack_short_string(buf, &self.mechanism).expect("mechanism name fits in a short string");
        crate::codec::primitive::pack_long_string(buf, &self.response);
        pack_short_string(buf, &self.locale).expect("locale fits in a short string");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(StartOk, &[u8])> {
        let (client_properties, data) = unpack_field_table(data)?;
        let (mechanism, data) = unpack_short_string(data)?;
        let (response, data) = crate::codec::primitive::unpack_long_string(data)?;
        let (locale, data) = unpack_short_string(data)?;
        Ok((
            StartOk {
                client_properties,
                mechanism,
                response,
                locale,
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Secure {
    pub challenge: Vec<u8>,
}

impl Secure {
    fn pack(&self, buf: &mut Vec<u8>) {
        crate::codec::primitive::pack_long_string(buf, &self.challenge);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Secure, &[u8])> {
        let (challenge, data) = crate::codec::primitive::unpack_long_string(data)?;
        Ok((Secure { challenge }, data))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecureOk {
    pub response: Vec<u8>,
}

impl SecureOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        crate::codec::primitive::pack_long_string(buf, &self.response);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(SecureOk, &[u8])> {
        let (response, data) = crate::codec::primitive::unpack_long_string(data)?;
        Ok((SecureOk { response }, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tune {
    pub channel_max: u16,
    pub frame_size_max: u32,
    pub heartbeat_delay: u16,
}

impl Tune {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, self.channel_max);
        pack_long(buf, self.frame_size_max);
        pack_short(buf, self.heartbeat_delay);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Tune, &[u8])> {
        let (channel_max, data) = unpack_short(data)?;
        let (frame_size_max, data) = unpack_long(data)?;
        let (heartbeat_delay, data) = unpack_short(data)?;
        Ok((
            Tune {
                channel_max,
                frame_size_max,
                heartbeat_delay,
            },
            data,
        ))
    }
}

pub type TuneOk = Tune;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Open {
    pub virtual_host: String,
}

impl Open {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short_string(buf, &self.virtual_host).expect("vhost fits in a short string");
        pack_short_string(buf, "").expect("reserved1 is empty"); // reserved, must equal default ""
        crate::codec::primitive::pack_bits(buf, &[false]); // reserved bit, must equal default false
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Open, &[u8])> {
        let (virtual_host, data) = unpack_short_string(data)?;
        let (_reserved1, data) = unpack_short_string(data)?;
        let (_reserved_bits, data) = crate::codec::primitive::unpack_bits(data, 1)?;
        Ok((Open { virtual_host }, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenOk;

impl OpenOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short_string(buf, "").expect("reserved is empty");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(OpenOk, &[u8])> {
        let (_reserved, data) = unpack_short_string(data)?;
        Ok((OpenOk, data))
    }
}

pub type Close = CloseArgs;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseOk;

impl CloseOk {
    fn pack(&self, _buf: &mut Vec<u8>) {}

    fn unpack(data: &[u8]) -> AmqpResult<(CloseOk, &[u8])> {
        Ok((CloseOk, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_ok_round_trips() {
        let m = StartOk {
            client_properties: FieldTable::new(),
            mechanism: "PLAIN".to_owned(),
            response: b"\0guest\0guest".to_vec(),
            locale: "en_US".to_owned(),
        };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = StartOk::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }

    #[test]
    fn start_splits_space_separated_lists() {
        let m = Start {
            version_major: 0,
            version_minor: 9,
            server_properties: FieldTable::new(),
            security_mechanisms: vec!["PLAIN".to_owned(), "AMQPLAIN".to_owned()],
            locales: vec!["en_US".to_owned()],
        };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, _rest) = Start::unpack(&buf).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn tune_round_trips() {
        let m = Tune {
            channel_max: 2047,
            frame_size_max: 131_072,
            heartbeat_delay: 60,
        };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = Tune::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }

    #[test]
    fn close_dual_construction() {
        let graceful = CloseArgs::graceful();
        assert_eq!(graceful.code, 0);
        let from_err = CloseArgs::from_error(
            &AmqpError::ConnectionForced {
                reason: "CONNECTION_FORCED".to_owned(),
            },
            None,
        );
        assert_eq!(from_err.code, 320);
    }
}
