//! Class 60: `basic.*`. Grounded on
//! `examples/original_source/grabbit/grabbit/methods/basic.py`.
//!
//! `Publish`, `Return`, `Deliver` and `GetOk` are content-bearing: a
//! `basic.BasicProperties` header frame and zero or more body frames follow
//! the method frame itself (see `Method::has_content` and SPEC_FULL §4.6).

use crate::codec::field_table::{pack_field_table, unpack_field_table, FieldTable};
use crate::codec::primitive::{
    pack_bits, pack_long, pack_longlong, pack_short, pack_short_string, unpack_bits, unpack_long,
    unpack_longlong, unpack_short, unpack_short_string,
};
use crate::error::AmqpResult;

pub const CLASS_ID: u16 = 60;

pub mod method_id {
    pub const QOS: u16 = 10;
    pub const QOS_OK: u16 = 11;
    pub const CONSUME: u16 = 20;
    pub const CONSUME_OK: u16 = 21;
    pub const CANCEL: u16 = 30;
    pub const CANCEL_OK: u16 = 31;
    pub const PUBLISH: u16 = 40;
    pub const RETURN: u16 = 50;
    pub const DELIVER: u16 = 60;
    pub const GET: u16 = 70;
    pub const GET_OK: u16 = 71;
    pub const GET_EMPTY: u16 = 72;
    pub const ACK: u16 = 80;
    pub const REJECT: u16 = 90;
    pub const RECOVER_ASYNC: u16 = 100;
    pub const RECOVER: u16 = 110;
    pub const RECOVER_OK: u16 = 111;
    pub const NACK: u16 = 120;
}

#[derive(Debug, Clone, PartialEq)]
pub enum BasicMethod {
    Qos(Qos),
    QosOk(QosOk),
    Consume(Consume),
    ConsumeOk(ConsumeOk),
    Cancel(Cancel),
    CancelOk(CancelOk),
    Publish(Publish),
    Return(Return),
    Deliver(Deliver),
    Get(Get),
    GetOk(GetOk),
    GetEmpty(GetEmpty),
    Ack(Ack),
    Reject(Reject),
    RecoverAsync(RecoverAsync),
    Recover(Recover),
    RecoverOk(RecoverOk),
    Nack(Nack),
}

impl BasicMethod {
    #[must_use]
    pub fn method_id(&self) -> u16 {
        match self {
            BasicMethod::Qos(_) => method_id::QOS,
            BasicMethod::QosOk(_) => method_id::QOS_OK,
            BasicMethod::Consume(_) => method_id::CONSUME,
            BasicMethod::ConsumeOk(_) => method_id::CONSUME_OK,
            BasicMethod::Cancel(_) => method_id::CANCEL,
            BasicMethod::CancelOk(_) => method_id::CANCEL_OK,
            BasicMethod::Publish(_) => method_id::PUBLISH,
            BasicMethod::Return(_) => method_id::RETURN,
            BasicMethod::Deliver(_) => method_id::DELIVER,
            BasicMethod::Get(_) => method_id::GET,
            BasicMethod::GetOk(_) => method_id::GET_OK,
            BasicMethod::GetEmpty(_) => method_id::GET_EMPTY,
            BasicMethod::Ack(_) => method_id::ACK,
            BasicMethod::Reject(_) => method_id::REJECT,
            BasicMethod::RecoverAsync(_) => method_id::RECOVER_ASYNC,
            BasicMethod::Recover(_) => method_id::RECOVER,
            BasicMethod::RecoverOk(_) => method_id::RECOVER_OK,
            BasicMethod::Nack(_) => method_id::NACK,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            BasicMethod::Qos(m) => m.pack(&mut buf),
            BasicMethod::QosOk(m) => m.pack(&mut buf),
            BasicMethod::Consume(m) => m.pack(&mut buf),
            BasicMethod::ConsumeOk(m) => m.pack(&mut buf),
            BasicMethod::Cancel(m) => m.pack(&mut buf),
            BasicMethod::CancelOk(m) => m.pack(&mut buf),
            BasicMethod::Publish(m) => m.pack(&mut buf),
            BasicMethod::Return(m) => m.pack(&mut buf),
            BasicMethod::Deliver(m) => m.pack(&mut buf),
            BasicMethod::Get(m) => m.pack(&mut buf),
            BasicMethod::GetOk(m) => m.pack(&mut buf),
            BasicMethod::GetEmpty(m) => m.pack(&mut buf),
            BasicMethod::Ack(m) => m.pack(&mut buf),
            BasicMethod::Reject(m) => m.pack(&mut buf),
            BasicMethod::RecoverAsync(m) => m.pack(&mut buf),
            BasicMethod::Recover(m) => m.pack(&mut buf),
            BasicMethod::RecoverOk(m) => m.pack(&mut buf),
            BasicMethod::Nack(m) => m.pack(&mut buf),
        }
        buf
    }

    pub fn unpack(method_id: u16, data: &[u8]) -> AmqpResult<(BasicMethod, &[u8])> {
        use method_id as id;
        Ok(match method_id {
            id::QOS => {
                let (m, rest) = Qos::unpack(data)?;
                (BasicMethod::Qos(m), rest)
            }
            id::QOS_OK => {
                let (m, rest) = QosOk::unpack(data)?;
                (BasicMethod::QosOk(m), rest)
            }
            id::CONSUME => {
                let (m, rest) = Consume::unpack(data)?;
                (BasicMethod::Consume(m), rest)
            }
            id::CONSUME_OK => {
                let (m, rest) = ConsumeOk::unpack(data)?;
                (BasicMethod::ConsumeOk(m), rest)
            }
            id::CANCEL => {
                let (m, rest) = Cancel::unpack(data)?;
                (BasicMethod::Cancel(m), rest)
            }
            id::CANCEL_OK => {
                let (m, rest) = CancelOk::unpack(data)?;
                (BasicMethod::CancelOk(m), rest)
            }
            id::PUBLISH => {
                let (m, rest) = Publish::unpack(data)?;
                (BasicMethod::Publish(m), rest)
            }
            id::RETURN => {
                let (m, rest) = Return::unpack(data)?;
                (BasicMethod::Return(m), rest)
            }
            id::DELIVER => {
                let (m, rest) = Deliver::unpack(data)?;
                (BasicMethod::Deliver(m), rest)
            }
            id::GET => {
                let (m, rest) = Get::unpack(data)?;
                (BasicMethod::Get(m), rest)
            }
            id::GET_OK => {
                let (m, rest) = GetOk::unpack(data)?;
                (BasicMethod::GetOk(m), rest)
            }
            id::GET_EMPTY => {
                let (m, rest) = GetEmpty::unpack(data)?;
                (BasicMethod::GetEmpty(m), rest)
            }
            id::ACK => {
                let (m, rest) = Ack::unpack(data)?;
                (BasicMethod::Ack(m), rest)
            }
            id::REJECT => {
                let (m, rest) = Reject::unpack(data)?;
                (BasicMethod::Reject(m), rest)
            }
            id::RECOVER_ASYNC => {
                let (m, rest) = RecoverAsync::unpack(data)?;
                (BasicMethod::RecoverAsync(m), rest)
            }
            id::RECOVER => {
                let (m, rest) = Recover::unpack(data)?;
                (BasicMethod::Recover(m), rest)
            }
            id::RECOVER_OK => {
                let (m, rest) = RecoverOk::unpack(data)?;
                (BasicMethod::RecoverOk(m), rest)
            }
            id::NACK => {
                let (m, rest) = Nack::unpack(data)?;
                (BasicMethod::Nack(m), rest)
            }
            other => {
                return Err(crate::error::AmqpError::SyntaxError {
                    reason: format!("unknown basic method id {other}"),
                })
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qos {
    pub prefetch_size: u32,
    pub prefetch_count: u16,
    pub global_: bool,
}

impl Qos {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_long(buf, self.prefetch_size);
        pack_short(buf, self.prefetch_count);
        pack_bits(buf, &[self.global_]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Qos, &[u8])> {
        let (prefetch_size, data) = unpack_long(data)?;
        let (prefetch_count, data) = unpack_short(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((
            Qos {
                prefetch_size,
                prefetch_count,
                global_: bits[0],
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QosOk;

impl QosOk {
    fn pack(&self, _buf: &mut Vec<u8>) {}

    fn unpack(data: &[u8]) -> AmqpResult<(QosOk, &[u8])> {
        Ok((QosOk, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consume {
    pub queue: String,
    pub consumer_tag: String,
    pub no_local: bool,
    pub no_ack: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Consume {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, 0); // reserved
        pack_short_string(buf, &self.queue).expect("queue name fits in a short string");
        pack_short_string(buf, &self.consumer_tag).expect("consumer tag fits in a short string");
        pack_bits(
            buf,
            &[self.no_local, self.no_ack, self.exclusive, self.no_wait],
        );
        pack_field_table(buf, &self.arguments).expect("arguments are well-formed");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Consume, &[u8])> {
        let (_reserved, data) = unpack_short(data)?;
        let (queue, data) = unpack_short_string(data)?;
        let (consumer_tag, data) = unpack_short_string(data)?;
        let (bits, data) = unpack_bits(data, 4)?;
        let (arguments, data) = unpack_field_table(data)?;
        Ok((
            Consume {
                queue,
                consumer_tag,
                no_local: bits[0],
                no_ack: bits[1],
                exclusive: bits[2],
                no_wait: bits[3],
                arguments,
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeOk {
    pub consumer_tag: String,
}

impl ConsumeOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short_string(buf, &self.consumer_tag).expect("consumer tag fits in a short string");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(ConsumeOk, &[u8])> {
        let (consumer_tag, data) = unpack_short_string(data)?;
        Ok((ConsumeOk { consumer_tag }, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancel {
    pub consumer_tag: String,
    pub no_wait: bool,
}

impl Cancel {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short_string(buf, &self.consumer_tag).expect("consumer tag fits in a short string");
        pack_bits(buf, &[self.no_wait]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Cancel, &[u8])> {
        let (consumer_tag, data) = unpack_short_string(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((
            Cancel {
                consumer_tag,
                no_wait: bits[0],
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOk {
    pub consumer_tag: String,
}

impl CancelOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short_string(buf, &self.consumer_tag).expect("consumer tag fits in a short string");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(CancelOk, &[u8])> {
        let (consumer_tag, data) = unpack_short_string(data)?;
        Ok((CancelOk { consumer_tag }, data))
    }
}

/// Content-bearing: a `BasicProperties` header and body frames follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
}

impl Publish {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, 0); // reserved
        pack_short_string(buf, &self.exchange).expect("exchange name fits in a short string");
        pack_short_string(buf, &self.routing_key).expect("routing key fits in a short string");
        pack_bits(buf, &[self.mandatory, self.immediate]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Publish, &[u8])> {
        let (_reserved, data) = unpack_short(data)?;
        let (exchange, data) = unpack_short_string(data)?;
        let (routing_key, data) = unpack_short_string(data)?;
        let (bits, data) = unpack_bits(data, 2)?;
        Ok((
            Publish {
                exchange,
                routing_key,
                mandatory: bits[0],
                immediate: bits[1],
            },
            data,
        ))
    }
}

/// Content-bearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Return {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}

impl Return {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, self.reply_code);
        pack_short_string(buf, &self.reply_text).expect("reply text fits in a short string");
        pack_short_string(buf, &self.exchange).expect("exchange name fits in a short string");
        pack_short_string(buf, &self.routing_key).expect("routing key fits in a short string");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Return, &[u8])> {
        let (reply_code, data) = unpack_short(data)?;
        let (reply_text, data) = unpack_short_string(data)?;
        let (exchange, data) = unpack_short_string(data)?;
        let (routing_key, data) = unpack_short_string(data)?;
        Ok((
            Return {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            },
            data,
        ))
    }
}

/// Content-bearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deliver {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

impl Deliver {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short_string(buf, &self.consumer_tag).expect("consumer tag fits in a short string");
        pack_longlong(buf, self.delivery_tag);
        pack_bits(buf, &[self.redelivered]);
        pack_short_string(buf, &self.exchange).expect("exchange name fits in a short string");
        pack_short_string(buf, &self.routing_key).expect("routing key fits in a short string");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Deliver, &[u8])> {
        let (consumer_tag, data) = unpack_short_string(data)?;
        let (delivery_tag, data) = unpack_longlong(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        let (exchange, data) = unpack_short_string(data)?;
        let (routing_key, data) = unpack_short_string(data)?;
        Ok((
            Deliver {
                consumer_tag,
                delivery_tag,
                redelivered: bits[0],
                exchange,
                routing_key,
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    pub queue: String,
    pub no_ack: bool,
}

impl Get {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, 0); // reserved
        pack_short_string(buf, &self.queue).expect("queue name fits in a short string");
        pack_bits(buf, &[self.no_ack]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Get, &[u8])> {
        let (_reserved, data) = unpack_short(data)?;
        let (queue, data) = unpack_short_string(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((
            Get {
                queue,
                no_ack: bits[0],
            },
            data,
        ))
    }
}

/// Content-bearing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOk {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub message_count: u32,
}

impl GetOk {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_longlong(buf, self.delivery_tag);
        pack_bits(buf, &[self.redelivered]);
        pack_short_string(buf, &self.exchange).expect("exchange name fits in a short string");
        pack_short_string(buf, &self.routing_key).expect("routing key fits in a short string");
        pack_long(buf, self.message_count);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(GetOk, &[u8])> {
        let (delivery_tag, data) = unpack_longlong(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        let (exchange, data) = unpack_short_string(data)?;
        let (routing_key, data) = unpack_short_string(data)?;
        let (message_count, data) = unpack_long(data)?;
        Ok((
            GetOk {
                delivery_tag,
                redelivered: bits[0],
                exchange,
                routing_key,
                message_count,
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetEmpty;

impl GetEmpty {
    fn pack(&self, buf: &mut Vec<u8>) {
        crate::codec::primitive::pack_short_string(buf, "").expect("reserved is empty");
    }

    fn unpack(data: &[u8]) -> AmqpResult<(GetEmpty, &[u8])> {
        let (_reserved, data) = unpack_short_string(data)?;
        Ok((GetEmpty, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub delivery_tag: u64,
    pub multiple: bool,
}

impl Ack {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_longlong(buf, self.delivery_tag);
        pack_bits(buf, &[self.multiple]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Ack, &[u8])> {
        let (delivery_tag, data) = unpack_longlong(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((
            Ack {
                delivery_tag,
                multiple: bits[0],
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reject {
    pub delivery_tag: u64,
    pub requeue: bool,
}

impl Reject {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_longlong(buf, self.delivery_tag);
        pack_bits(buf, &[self.requeue]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Reject, &[u8])> {
        let (delivery_tag, data) = unpack_longlong(data)?;
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((
            Reject {
                delivery_tag,
                requeue: bits[0],
            },
            data,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverAsync {
    pub requeue: bool,
}

impl RecoverAsync {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_bits(buf, &[self.requeue]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(RecoverAsync, &[u8])> {
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((RecoverAsync { requeue: bits[0] }, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recover {
    pub requeue: bool,
}

impl Recover {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_bits(buf, &[self.requeue]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Recover, &[u8])> {
        let (bits, data) = unpack_bits(data, 1)?;
        Ok((Recover { requeue: bits[0] }, data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoverOk;

impl RecoverOk {
    fn pack(&self, _buf: &mut Vec<u8>) {}

    fn unpack(data: &[u8]) -> AmqpResult<(RecoverOk, &[u8])> {
        Ok((RecoverOk, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nack {
    pub delivery_tag: u64,
    pub multiple: bool,
    pub requeue: bool,
}

impl Nack {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_longlong(buf, self.delivery_tag);
        pack_bits(buf, &[self.multiple, self.requeue]);
    }

    fn unpack(data: &[u8]) -> AmqpResult<(Nack, &[u8])> {
        let (delivery_tag, data) = unpack_longlong(data)?;
        let (bits, data) = unpack_bits(data, 2)?;
        Ok((
            Nack {
                delivery_tag,
                multiple: bits[0],
                requeue: bits[1],
            },
            data,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_round_trips_to_the_prescribed_byte_sequence() {
        let m = Consume {
            queue: "q".to_owned(),
            consumer_tag: String::new(),
            no_local: false,
            no_ack: true,
            exclusive: false,
            no_wait: false,
            arguments: FieldTable::new(),
        };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let mut expected = Vec::new();
        pack_short(&mut expected, 0);
        pack_short_string(&mut expected, "q").unwrap();
        pack_short_string(&mut expected, "").unwrap();
        pack_bits(&mut expected, &[false, true, false, false]);
        pack_field_table(&mut expected, &FieldTable::new()).unwrap();
        assert_eq!(buf, expected);
        let (back, rest) = Consume::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }

    #[test]
    fn deliver_round_trips() {
        let m = Deliver {
            consumer_tag: "ctag".to_owned(),
            delivery_tag: 42,
            redelivered: false,
            exchange: "ex".to_owned(),
            routing_key: "rk".to_owned(),
        };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = Deliver::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }

    #[test]
    fn nack_round_trips() {
        let m = Nack {
            delivery_tag: 7,
            multiple: true,
            requeue: false,
        };
        let mut buf = Vec::new();
        m.pack(&mut buf);
        let (back, rest) = Nack::unpack(&buf).unwrap();
        assert_eq!(back, m);
        assert!(rest.is_empty());
    }
}
