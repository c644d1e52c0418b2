//! Class 20: `channel.*`. Grounded on
//! `examples/original_source/grabbit/grabbit/methods/channel.py`.
//!
//! `Flow`/`FlowOk` are kept for completeness even though RabbitMQ does not
//! implement channel-level flow control, matching a note to that effect in
//! the original source.

use crate::codec::primitive::{pack_bits, unpack_bits};
use crate::error::AmqpResult;
use crate::method::common::CloseArgs;

pub const CLASS_ID: u16 = 20;

pub mod method_id {
    pub const OPEN: u16 = 10;
    pub const OPEN_OK: u16 = 11;
    pub const FLOW: u16 = 20;
    pub const FLOW_OK: u16 = 21;
    pub const CLOSE: u16 = 40;
    pub const CLOSE_OK: u16 = 41;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMethod {
    Open(Open),
    OpenOk(OpenOk),
    Flow(Flow),
    FlowOk(FlowOk),
    Close(Close),
    CloseOk(CloseOk),
}

impl ChannelMethod {
    #[must_use]
    pub fn method_id(&self) -> u16 {
        match self {
            ChannelMethod::Open(_) => method_id::OPEN,
            ChannelMethod::OpenOk(_) => method_id::OPEN_OK,
            ChannelMethod::Flow(_) => method_id::FLOW,
            ChannelMethod::FlowOk(_) => method_id::FLOW_OK,
            ChannelMethod::Close(_) => method_id::CLOSE,
            ChannelMethod::CloseOk(_) => method_id::CLOSE_OK,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ChannelMethod::Open(m) => m.pack(&mut buf),
            ChannelMethod::OpenOk(m) => m.pack(&mut buf),
            ChannelMethod::Flow(m) => m.pack(&mut buf),
            ChannelMethod::FlowOk(m) => m.pack(&mut buf),
            ChannelMethod::Close(m) => m.pack(&mut buf),
            ChannelMethod::CloseOk(m) => m.pack(&mut buf),
        }
        buf
    }

    pub fn unpack(method_id: u16, data: &[u8]) -> AmqpResult<(ChannelMethod, &[u8])> {
        use method_id as id;
        Ok(match method_id {
            id::OPEN => {
                let (m, rest) = Open::unpack(data)?;
                (ChannelMethod::Open(m), rest)
            }
            id::OPEN_OK => {
                let (m, rest) = OpenOk::unpack(data)?;
                (ChannelMethod::OpenOk(m), rest)
            }
            id::FLOW => {
                let (m, rest) = Flow::unpack(data)?;
                (ChannelMethod::Flow(m), rest)
            }
            id::FLOW_OK => {
                let (m, rest) = FlowOk::unpack(data)?;
                (ChannelMethod::FlowOk(m), rest)
            }
            id::CLOSE => {
                let (m, rest) = Close::unpack(data)?;
                (ChannelMethod::Close(m), rest)
            }
            id::CLOSE_OK => {
                let (m, rest) = CloseOk::unpack(data)?;
                (ChannelMethod::CloseOk(m), rest)
            }
            other => {
                return Err(crate::error::AmqpError::SyntaxError {
                    reason: format!("unknown channel method id {other}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Open;

impl Open {
    fn pack(&self, buf: &mut Vec<u8>) {
        crate::codec::primitive::pack_short_string(buf, "").expect("reserved is empty");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Open, &[u8])> {
        let (_reserved, data) = crate::codec::primitive::unpack_short_string(data)?;
        Ok((Open, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenOk;

impl OpenOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        crate::codec::primitive::pack_long_string(buf, b"");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(OpenOk, &[u8])> {
        let (_reserved, data) = crate::codec::primitive::unpack_long_string(data)?;
        Ok((OpenOk, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow {
    pub active: bool,
}

impl Flow {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_bits(buf, &[self.active]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Flow, &[u8])> {
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((Flow { active: bits[0] }, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowOk {
    pub active: bool,
}

impl FlowOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_bits(buf, &[self.active]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(FlowOk, &[u8])> {
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((FlowOk { active: bits[0] }, data))
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
    fn open_ok_round_trips() {
        let m = OpenOk;
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = OpenOk::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }

    #[test]
    fn close_uses_corrected_method_ids() {
        // (b) in SPEC_FULL's ambiguous-source-behaviour notes: channel.Close = 40.
        assert_eq!(method_id::CLOSE, 40);
    }

    #[test]
    fn flow_round_trips() {
        let m = Flow { active: true };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = Flow::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }
}
