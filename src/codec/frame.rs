//! The wire frame: `octet type ∥ short channel ∥ long size ∥ payload ∥ 0xCE`.
//! Grounded on `examples/original_source/grabbit/grabbit/frames/frame.py`,
//! which the same function names below (`pack`/`unpack`) and the same
//! terminator check are taken from.

use byteorder::{BigEndian, ByteOrder};

use crate::codec::primitive::{pack_long, pack_short, unpack_long, unpack_short};
use crate::codec::properties::BasicProperties;
use crate::error::{AmqpError, AmqpResult};
use crate::method::{basic, Method};

pub const FRAME_END: u8 = 0xCE;

/// Bytes consumed by framing itself around a frame's payload: 1 (type) + 2
/// (channel) + 4 (size) + 1 (the trailing `0xCE`). Used to size content-body
/// chunks against a negotiated `frame_size_max` (SPEC_FULL §4.6).
pub const FRAME_HEADER_OVERHEAD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Method,
    Header,
    Body,
    Heartbeat,
}

impl FrameType {
    fn octet(self) -> u8 {
        match self {
            FrameType::Method => 1,
            FrameType::Header => 2,
            FrameType::Body => 3,
            FrameType::Heartbeat => 4,
        }
    }

    fn from_octet(octet: u8) -> AmqpResult<FrameType> {
        match octet {
            1 => Ok(FrameType::Method),
            2 => Ok(FrameType::Header),
            3 => Ok(FrameType::Body),
            4 => Ok(FrameType::Heartbeat),
            other => Err(AmqpError::FrameError {
                reason: format!("unrecognised frame type {other}"),
            }),
        }
    }
}

/// A single decoded frame, addressed to a channel (0 for the connection
/// itself).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channel: u16,
    pub payload: FramePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Method(Method),
    /// A content header: the class whose content follows, the total body
    /// size announced up front, and its property set. Only `basic` content
    /// is understood (the sole content-bearing class in scope).
    Header {
        class_id: u16,
        body_size: u64,
        properties: BasicProperties,
    },
    Body(Vec<u8>),
    Heartbeat,
}

impl Frame {
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match &self.payload {
            FramePayload::Method(_) => FrameType::Method,
            FramePayload::Header { .. } => FrameType::Header,
            FramePayload::Body(_) => FrameType::Body,
            FramePayload::Heartbeat => FrameType::Heartbeat,
        }
    }

    pub fn heartbeat() -> Frame {
        Frame {
            channel: 0,
            payload: FramePayload::Heartbeat,
        }
    }

    pub fn pack(&self) -> AmqpResult<Vec<u8>> {
        let mut inner = Vec::new();
        match &self.payload {
            FramePayload::Method(method) => {
                pack_short(&mut inner, method.class_id());
                pack_short(&mut inner, method.method_id());
                inner.extend(method.pack_args());
            }
            FramePayload::Header {
                class_id,
                body_size,
                properties,
            } => {
                pack_short(&mut inner, *class_id);
                pack_short(&mut inner, 0); // weight, always zero
                let mut tmp = [0u8; 8];
                BigEndian::write_u64(&mut tmp, *body_size);
                inner.extend_from_slice(&tmp);
                inner.extend(properties.pack()?);
            }
            FramePayload::Body(bytes) => inner.extend_from_slice(bytes),
            FramePayload::Heartbeat => {}
        }

        let mut buf = Vec::with_capacity(inner.len() + 8);
        buf.push(self.frame_type().octet());
        pack_short(&mut buf, self.channel);
        pack_long(&mut buf, inner.len() as u32);
        buf.extend(inner);
        buf.push(FRAME_END);
        Ok(buf)
    }

    /// Parses exactly one frame, returning it with the unconsumed remainder
    /// of `data`. Returns `Err` on a short read so the caller can treat that
    /// as "need more bytes" only at the outermost I/O loop; within this
    /// function a short read past a declared field is always a genuine
    /// protocol fault once the length-prefixed payload itself is complete.
    pub fn unpack(data: &[u8]) -> AmqpResult<(Frame, &[u8])> {
        if data.len() < 7 {
            return Err(AmqpError::FrameError {
                reason: "incomplete frame header".to_owned(),
            });
        }
        let frame_type = FrameType::from_octet(data[0])?;
        let (channel, data) = unpack_short(&data[1..])?;
        let (size, data) = unpack_long(data)?;
        let size = size as usize;
        if data.len() < size + 1 {
            return Err(AmqpError::FrameError {
                reason: "incomplete frame payload".to_owned(),
            });
        }
        let (body, data) = data.split_at(size);
        let (terminator, data) = (data[0], &data[1..]);
        if terminator != FRAME_END {
            return Err(AmqpError::FrameError {
                reason: format!("frame did not end with 0xCE (found {terminator:#04x})"),
            });
        }

        let payload = match frame_type {
            FrameType::Method => {
                let (class_id, rest) = unpack_short(body)?;
                let (method_id, rest) = unpack_short(rest)?;
                let (method, rest) = Method::unpack(class_id, method_id, rest)?;
                if !rest.is_empty() {
                    return Err(AmqpError::SyntaxError {
                        reason: "method frame carried trailing bytes past its arguments"
                            .to_owned(),
                    });
                }
                FramePayload::Method(method)
            }
            FrameType::Header => {
                let (class_id, rest) = unpack_short(body)?;
                if class_id != basic::CLASS_ID {
                    return Err(AmqpError::NotImplemented {
                        reason: format!("content header for unsupported class {class_id}"),
                    });
                }
                let (_weight, rest) = unpack_short(rest)?;
                if rest.len() < 8 {
                    return Err(AmqpError::FrameError {
                        reason: "incomplete content header body size".to_owned(),
                    });
                }
                let body_size = BigEndian::read_u64(rest);
                let (properties, rest) = BasicProperties::unpack(&rest[8..])?;
                if !rest.is_empty() {
                    return Err(AmqpError::SyntaxError {
                        reason: "content header frame carried trailing bytes past its properties"
                            .to_owned(),
                    });
                }
                FramePayload::Header {
                    class_id,
                    body_size,
                    properties,
                }
            }
            FrameType::Body => FramePayload::Body(body.to_vec()),
            FrameType::Heartbeat => {
                if !body.is_empty() {
                    return Err(AmqpError::FrameError {
                        reason: "heartbeat frame carried a non-empty payload".to_owned(),
                    });
                }
                FramePayload::Heartbeat
            }
        };

        Ok((Frame { channel, payload }, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::tx;

    #[test]
    fn heartbeat_round_trips() {
        let frame = Frame::heartbeat();
        let packed = frame.pack().unwrap();
        assert_eq!(packed, vec![4, 0, 0, 0, 0, 0, 0, FRAME_END]);
        let (back, rest) = Frame::unpack(&packed).unwrap();
        assert_eq!(back, frame);
        assert!(rest.is_empty());
    }

    #[test]
    fn method_frame_round_trips() {
        let frame = Frame {
            channel: 3,
            payload: FramePayload::Method(Method::Tx(tx::TxMethod::Commit(tx::Commit))),
        };
        let packed = frame.pack().unwrap();
        let (back, rest) = Frame::unpack(&packed).unwrap();
        assert_eq!(back, frame);
        assert!(rest.is_empty());
    }

    #[test]
    fn header_frame_round_trips() {
        let frame = Frame {
            channel: 1,
            payload: FramePayload::Header {
                class_id: basic::CLASS_ID,
                body_size: 11,
                properties: BasicProperties {
                    content_type: Some("text/plain".to_owned()),
                    ..BasicProperties::default()
                },
            },
        };
        let packed = frame.pack().unwrap();
        let (back, rest) = Frame::unpack(&packed).unwrap();
        assert_eq!(back, frame);
        assert!(rest.is_empty());
    }

    #[test]
    fn body_frame_round_trips() {
        let frame = Frame {
            channel: 1,
            payload: FramePayload::Body(b"hello world".to_vec()),
        };
        let packed = frame.pack().unwrap();
        let (back, rest) = Frame::unpack(&packed).unwrap();
        assert_eq!(back, frame);
        assert!(rest.is_empty());
    }

    #[test]
    fn missing_terminator_is_a_frame_error() {
        let frame = Frame::heartbeat();
        let mut packed = frame.pack().unwrap();
        let last = packed.len() - 1;
        packed[last] = 0x00;
        assert!(Frame::unpack(&packed).is_err());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let frame = Frame {
            channel: 1,
            payload: FramePayload::Body(b"hello world".to_vec()),
        };
        let packed = frame.pack().unwrap();
        assert!(Frame::unpack(&packed[..packed.len() - 3]).is_err());
    }
}
