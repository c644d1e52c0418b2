//! Error taxonomy for the AMQP client.
//!
//! Mirrors the shape of a typical driver error enum: one `#[non_exhaustive]`
//! `thiserror` type, numeric-coded variants carrying their RabbitMQ reply
//! text, and a couple of non-protocol variants for conditions the wire
//! format itself has no code for.

use std::fmt;

/// Result alias used throughout the crate.
pub type AmqpResult<T> = Result<T, AmqpError>;

/// A method descriptor that was in play when an error occurred, kept around
/// for diagnostics the way the server's own `Close` methods report
/// `failed_class`/`failed_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRef {
    pub class_id: u16,
    pub method_id: u16,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.class_id, self.method_id)
    }
}

/// The unified error type for every failure mode this crate can produce.
///
/// Numeric codes match `grabbit.errors` / the AMQP 0-9-1 reply-code table.
/// Channel-scoped codes isolate to the channel that raised them; connection
/// codes are fatal to the whole connection (see SPEC_FULL §7).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AmqpError {
    // --- channel errors (isolate to a channel) ---
    #[error("CONTENT_TOO_LARGE - {reason}")]
    ContentTooLarge { reason: String },
    #[error("NO_ROUTE - {reason}")]
    NoRoute { reason: String },
    #[error("NO_CONSUMERS - {reason}")]
    NoConsumers { reason: String },
    #[error("ACCESS_REFUSED - {reason}")]
    AccessRefused { reason: String },
    #[error("NOT_FOUND - {reason}")]
    NotFound { reason: String, method: Option<MethodRef> },
    #[error("RESOURCE_LOCKED - {reason}")]
    ResourceLocked { reason: String },
    #[error("PRECONDITION_FAILED - {reason}")]
    PreconditionFailed { reason: String },

    // --- connection errors (fatal to the connection) ---
    #[error("CONNECTION_FORCED - {reason}")]
    ConnectionForced { reason: String },
    #[error("INVALID_PATH - {reason}")]
    InvalidPath { reason: String },
    #[error("FRAME_ERROR - {reason}")]
    FrameError { reason: String },
    #[error("SYNTAX_ERROR - {reason}")]
    SyntaxError { reason: String },
    #[error("COMMAND_INVALID - {reason}")]
    CommandInvalid { reason: String },
    #[error("CHANNEL_ERROR - {reason}")]
    InvalidChannelError { reason: String },
    #[error("UNEXPECTED_FRAME - {reason}")]
    UnexpectedFrame { reason: String },
    #[error("RESOURCE_ERROR - {reason}")]
    ResourceError { reason: String },
    #[error("NOT_ALLOWED - {reason}")]
    NotAllowed { reason: String },
    #[error("NOT_IMPLEMENTED - {reason}")]
    NotImplemented { reason: String },
    #[error("INTERNAL_ERROR - {reason}")]
    InternalError { reason: String },

    // --- non-AMQP conditions ---
    #[error("no configured security mechanism was accepted by the server (server offered: {server_supports})")]
    AuthFailed { server_supports: String },
    #[error("server announced unsupported protocol version {major}.{minor}")]
    BadServerVersion { major: u8, minor: u8 },
    #[error("channel-max {channel_max} exhausted, no channel ids available")]
    NoMoreChannels { channel_max: u16 },
    #[error("server closed the connection")]
    ServerClosed,
    #[error("connection was already closed")]
    ConnectionClosed,
    #[error("erroneous connection parameters: {reason}")]
    ConfigError { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AmqpError {
    /// Numeric reply code, where one exists, matching the AMQP 0-9-1 /
    /// RabbitMQ reply-code table.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        use AmqpError::{
            AccessRefused, CommandInvalid, ConnectionForced, ContentTooLarge, FrameError,
            InternalError, InvalidChannelError, InvalidPath, NoConsumers, NoRoute, NotAllowed,
            NotFound, NotImplemented, PreconditionFailed, ResourceError, ResourceLocked,
            SyntaxError, UnexpectedFrame,
        };
        Some(match self {
            ContentTooLarge { .. } => 311,
            NoRoute { .. } => 312,
            NoConsumers { .. } => 313,
            ConnectionForced { .. } => 320,
            InvalidPath { .. } => 402,
            AccessRefused { .. } => 403,
            NotFound { .. } => 404,
            ResourceLocked { .. } => 405,
            PreconditionFailed { .. } => 406,
            FrameError { .. } => 501,
            SyntaxError { .. } => 502,
            CommandInvalid { .. } => 503,
            InvalidChannelError { .. } => 504,
            UnexpectedFrame { .. } => 505,
            ResourceError { .. } => 506,
            NotAllowed { .. } => 530,
            NotImplemented { .. } => 540,
            InternalError { .. } => 541,
            _ => return None,
        })
    }

    /// True if this error, raised on a channel, only closes that channel
    /// rather than the whole connection.
    #[must_use]
    pub fn is_channel_scoped(&self) -> bool {
        matches!(self.code(), Some(311 | 312 | 313 | 403 | 404 | 405 | 406))
    }

    /// Builds an owned copy of this error.
    ///
    /// `AmqpError` can't derive `Clone` (it wraps `std::io::Error`), but a
    /// connection- or channel-fatal error is routinely shared across many
    /// independent waiters (every pending `send_sync`, every `on_error`
    /// callback, `finished`). Reconstructs from the display text for the
    /// handful of variants that can't be copied field-by-field; good
    /// enough for an error a caller is about to propagate or log, not
    /// re-match on by exact `io::ErrorKind`.
    #[must_use]
    pub fn duplicate(&self) -> AmqpError {
        // NotFound carries an extra `method` field that `from_code` can't
        // reconstruct, so it must be special-cased ahead of the generic
        // code-based path below.
        if let AmqpError::NotFound { reason, method } = self {
            return AmqpError::NotFound {
                reason: reason.clone(),
                method: *method,
            };
        }
        if let Some(code) = self.code() {
            return AmqpError::from_code(code, self.to_string());
        }
        match self {
            AmqpError::AuthFailed { server_supports } => AmqpError::AuthFailed {
                server_supports: server_supports.clone(),
            },
            AmqpError::BadServerVersion { major, minor } => AmqpError::BadServerVersion {
                major: *major,
                minor: *minor,
            },
            AmqpError::NoMoreChannels { channel_max } => AmqpError::NoMoreChannels {
                channel_max: *channel_max,
            },
            AmqpError::ServerClosed => AmqpError::ServerClosed,
            AmqpError::ConnectionClosed => AmqpError::ConnectionClosed,
            AmqpError::ConfigError { reason } => AmqpError::ConfigError {
                reason: reason.clone(),
            },
            AmqpError::Io(io) => AmqpError::Io(std::io::Error::new(io.kind(), io.to_string())),
            _ => unreachable!("every coded variant is handled by the `code()` branch above"),
        }
    }

    /// Reconstructs an error from a reply code and reason text, the way a
    /// received `Close` method is turned back into a typed error. Unknown
    /// codes fall back to `InternalError` rather than panicking.
    #[must_use]
    pub fn from_code(code: u16, reason: String) -> AmqpError {
        match code {
            311 => AmqpError::ContentTooLarge { reason },
            312 => AmqpError::NoRoute { reason },
            313 => AmqpError::NoConsumers { reason },
            320 => AmqpError::ConnectionForced { reason },
            402 => AmqpError::InvalidPath { reason },
            403 => AmqpError::AccessRefused { reason },
            404 => AmqpError::NotFound { reason, method: None },
            405 => AmqpError::ResourceLocked { reason },
            406 => AmqpError::PreconditionFailed { reason },
            501 => AmqpError::FrameError { reason },
            502 => AmqpError::SyntaxError { reason },
            503 => AmqpError::CommandInvalid { reason },
            504 => AmqpError::InvalidChannelError { reason },
            505 => AmqpError::UnexpectedFrame { reason },
            506 => AmqpError::ResourceError { reason },
            530 => AmqpError::NotAllowed { reason },
            540 => AmqpError::NotImplemented { reason },
            541 => AmqpError::InternalError { reason },
            _ => AmqpError::InternalError {
                reason: format!("unrecognised reply code {code}: {reason}"),
            },
        }
    }
}
