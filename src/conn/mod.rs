//! Connection-level machinery: the priority send queue, the per-channel
//! state machine, and the connection state machine that ties them
//! together. See `connection.rs`'s module docs for the overall shape.

pub mod channel;
pub mod connection;
pub mod queue;

pub use channel::{Channel, ChannelState, Delivery, Matcher};
pub use connection::Connection;
