//! The security-mechanism plug-in point.
//!
//! A concrete PLAIN/AMQPLAIN implementation is out of scope for this crate
//! (SPEC_FULL §1 "Out of scope"), this is only the interface
//! `Connection::connect` negotiates against, grounded on
//! `examples/original_source/grabbit/protocol/connection.py`'s
//! `security_handlers` list of `(name, response, challenge)` tuples. The
//! embedding application supplies one [`SecurityHandler`] per mechanism it
//! is willing to speak; the first one the server also advertises in
//! `Start.mechanisms` is selected, in the caller's list order.

use crate::error::{AmqpError, AmqpResult};

/// One authentication mechanism a client is willing to use.
pub trait SecurityHandler: Send + Sync {
    /// The mechanism name as advertised in `StartOk`, e.g. `"PLAIN"`.
    fn name(&self) -> &str;

    /// The initial response bytes sent in `StartOk`.
    fn response(&self) -> Vec<u8>;

    /// Whether this handler drives an additional `Secure`/`SecureOk` round
    /// after `StartOk`. Most mechanisms (including PLAIN) answer `false`.
    fn has_challenge(&self) -> bool {
        false
    }

    /// Computes the `SecureOk` response to a received `Secure` challenge.
    /// Only called when [`SecurityHandler::has_challenge`] returns `true`;
    /// the default implementation is unreachable in that case and exists
    /// only so implementors of simple, non-challenging mechanisms don't
    /// have to provide one.
    fn challenge(&self, _data: &[u8]) -> AmqpResult<Vec<u8>> {
        Err(AmqpError::AuthFailed {
            server_supports: format!("{} does not support a challenge round", self.name()),
        })
    }
}
