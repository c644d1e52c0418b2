//! A client implementation of the AMQP 0-9-1 wire protocol: the frame
//! codec, the method registry, and the connection/channel state machines
//! that drive them over an async byte stream.
//!
//! This crate deliberately stops short of the high-level
//! queue/exchange/consumer convenience API, a concrete PLAIN/AMQPLAIN
//! security mechanism, and TLS termination; see [`security`] and
//! [`conn::connection::Connection::connect`] for the seams those are
//! expected to plug into.

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod codec;
pub mod config;
pub mod conn;
pub mod error;
pub mod method;
pub mod security;

pub use crate::codec::field_table::{FieldTable, FieldValue};
pub use crate::codec::properties::BasicProperties;
pub use crate::config::{ConnectParams, ConnectParamsBuilder};
pub use crate::conn::{Channel, ChannelState, Connection, Delivery, Matcher};
pub use crate::error::{AmqpError, AmqpResult, MethodRef};
pub use crate::method::Method;
pub use crate::security::SecurityHandler;
