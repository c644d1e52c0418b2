//! The method registry: a flat `(class_id, method_id)` table over typed
//! argument records, replacing the subclass-walk the original driver used
//! (`Method.from_id` scanning every loaded subclass).

pub mod basic;
pub mod channel;
pub mod common;
pub mod confirm;
pub mod connection;
pub mod exchange;
pub mod tx;

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::AmqpResult;

/// A decoded method argument sequence, tagged with its own class/method id
/// so a frame carrying it can be routed and matched against a pending
/// synchronous call without re-deriving the id from the enum variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Connection(connection::ConnectionMethod),
    Channel(channel::ChannelMethod),
    Exchange(exchange::ExchangeMethod),
    Basic(basic::BasicMethod),
    Tx(tx::TxMethod),
    Confirm(confirm::ConfirmMethod),
}

impl Method {
    #[must_use]
    pub fn class_id(&self) -> u16 {
        match self {
            Method::Connection(_) => connection::CLASS_ID,
            Method::Channel(_) => channel::CLASS_ID,
            Method::Exchange(_) => exchange::CLASS_ID,
            Method::Basic(_) => basic::CLASS_ID,
            Method::Tx(_) => tx::CLASS_ID,
            Method::Confirm(_) => confirm::CLASS_ID,
        }
    }

    #[must_use]
    pub fn method_id(&self) -> u16 {
        match self {
            Method::Connection(m) => m.method_id(),
            Method::Channel(m) => m.method_id(),
            Method::Exchange(m) => m.method_id(),
            Method::Basic(m) => m.method_id(),
            Method::Tx(m) => m.method_id(),
            Method::Confirm(m) => m.method_id(),
        }
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            Method::Basic(basic::BasicMethod::Publish(_))
                | Method::Basic(basic::BasicMethod::Return(_))
                | Method::Basic(basic::BasicMethod::Deliver(_))
                | Method::Basic(basic::BasicMethod::GetOk(_))
        )
    }

    pub fn pack_args(&self) -> Vec<u8> {
        match self {
            Method::Connection(m) => m.pack(),
            Method::Channel(m) => m.pack(),
            Method::Exchange(m) => m.pack(),
            Method::Basic(m) => m.pack(),
            Method::Tx(m) => m.pack(),
            Method::Confirm(m) => m.pack(),
        }
    }

    pub fn unpack(class_id: u16, method_id: u16, data: &[u8]) -> AmqpResult<(Method, &[u8])> {
        match class_id {
            connection::CLASS_ID => {
                let (m, rest) = connection::ConnectionMethod::unpack(method_id, data)?;
                Ok((Method::Connection(m), rest))
            }
            channel::CLASS_ID => {
                let (m, rest) = channel::ChannelMethod::unpack(method_id, data)?;
                Ok((Method::Channel(m), rest))
            }
            exchange::CLASS_ID => {
                let (m, rest) = exchange::ExchangeMethod::unpack(method_id, data)?;
                Ok((Method::Exchange(m), rest))
            }
            basic::CLASS_ID => {
                let (m, rest) = basic::BasicMethod::unpack(method_id, data)?;
                Ok((Method::Basic(m), rest))
            }
            tx::CLASS_ID => {
                let (m, rest) = tx::TxMethod::unpack(method_id, data)?;
                Ok((Method::Tx(m), rest))
            }
            confirm::CLASS_ID => {
                let (m, rest) = confirm::ConfirmMethod::unpack(method_id, data)?;
                Ok((Method::Confirm(m), rest))
            }
            other => Err(crate::error::AmqpError::SyntaxError {
                reason: format!("unknown class id {other}"),
            }),
        }
    }
}

/// The set of method ids that complete a synchronous call for a given
/// request, e.g. `basic.Get`'s response set is `{GetOk, GetEmpty}`.
#[must_use]
pub fn response_set(class_id: u16, method_id: u16) -> &'static [u16] {
    static TABLE: OnceLock<HashMap<(u16, u16), Vec<u16>>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = HashMap::new();
        t.insert((connection::CLASS_ID, connection::method_id::START), vec![]);
        t.insert(
            (connection::CLASS_ID, connection::method_id::START_OK),
            vec![connection::method_id::TUNE, connection::method_id::SECURE],
        );
        t.insert(
            (connection::CLASS_ID, connection::method_id::SECURE_OK),
            vec![connection::method_id::TUNE, connection::method_id::SECURE],
        );
        t.insert(
            (connection::CLASS_ID, connection::method_id::OPEN),
            vec![connection::method_id::OPEN_OK],
        );
        t.insert(
            (connection::CLASS_ID, connection::method_id::CLOSE),
            vec![connection::method_id::CLOSE_OK],
        );
        t.insert(
            (channel::CLASS_ID, channel::method_id::OPEN),
            vec![channel::method_id::OPEN_OK],
        );
        t.insert(
            (channel::CLASS_ID, channel::method_id::FLOW),
            vec![channel::method_id::FLOW_OK],
        );
        t.insert(
            (channel::CLASS_ID, channel::method_id::CLOSE),
            vec![channel::method_id::CLOSE_OK],
        );
        t.insert(
            (exchange::CLASS_ID, exchange::method_id::DECLARE),
            vec![exchange::method_id::DECLARE_OK],
        );
        t.insert(
            (exchange::CLASS_ID, exchange::method_id::DELETE),
            vec![exchange::method_id::DELETE_OK],
        );
        t.insert(
            (exchange::CLASS_ID, exchange::method_id::BIND),
            vec![exchange::method_id::BIND_OK],
        );
        t.insert(
            (basic::CLASS_ID, basic::method_id::QOS),
            vec![basic::method_id::QOS_OK],
        );
        t.insert(
            (basic::CLASS_ID, basic::method_id::CONSUME),
            vec![basic::method_id::CONSUME_OK],
        );
        t.insert(
            (basic::CLASS_ID, basic::method_id::CANCEL),
            vec![basic::method_id::CANCEL_OK],
        );
        t.insert(
            (basic::CLASS_ID, basic::method_id::GET),
            vec![basic::method_id::GET_OK, basic::method_id::GET_EMPTY],
        );
        t.insert(
            (basic::CLASS_ID, basic::method_id::RECOVER),
            vec![basic::method_id::RECOVER_OK],
        );
        t.insert(
            (tx::CLASS_ID, tx::method_id::SELECT),
            vec![tx::method_id::SELECT_OK],
        );
        t.insert(
            (tx::CLASS_ID, tx::method_id::COMMIT),
            vec![tx::method_id::COMMIT_OK],
        );
        t.insert(
            (tx::CLASS_ID, tx::method_id::ROLLBACK),
            vec![tx::method_id::ROLLBACK_OK],
        );
        t.insert(
            (confirm::CLASS_ID, confirm::method_id::SELECT),
            vec![confirm::method_id::SELECT_OK],
        );
        t
    });
    table
        .get(&(class_id, method_id))
        .map_or(&[], Vec::as_slice)
}
