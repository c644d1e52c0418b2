//! Shared argument shape for `connection.Close` / `channel.Close`: both
//! classes declare the identical `(code, reason, failed_class, failed_method)`
//! fields. `grabbit.methods.common.CloseMethod` is the direct model: a dual
//! constructor that builds from either raw wire fields or from an
//! `(error, method)` pair.

use crate::codec::primitive::{
    pack_short, pack_short_string, unpack_short, unpack_short_string,
};
use crate::error::{AmqpError, AmqpResult, MethodRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseArgs {
    pub code: u16,
    pub reason: String,
    pub failed_class: u16,
    pub failed_method: u16,
}

impl CloseArgs {
    /// Builds the raw application-level close used when there is no
    /// specific error or offending method to report: `code=0, reason="",
    /// failed_class=0, failed_method=0`.
    #[must_use]
    pub fn graceful() -> CloseArgs {
        CloseArgs {
            code: 0,
            reason: String::new(),
            failed_class: 0,
            failed_method: 0,
        }
    }

    /// Builds a close from an error and the method that provoked it.
    #[must_use]
    pub fn from_error(error: &AmqpError, method: Option<MethodRef>) -> CloseArgs {
        CloseArgs {
            code: error.code().unwrap_or(541),
            reason: error.to_string(),
            failed_class: method.map_or(0, |m| m.class_id),
            failed_method: method.map_or(0, |m| m.method_id),
        }
    }

    pub fn pack(&self, buf: &mut Vec<u8>) {
        pack_short(buf, self.code);
        // reason is a short string per the AMQP grammar; callers that hand
        // us a longer reply text get it truncated rather than failing the
        // close itself.
        let reason = if self.reason.len() > 255 {
            let boundary = (0..=255).rfind(|&i| self.reason.is_char_boundary(i)).unwrap_or(0);
            self.reason[..boundary].to_owned()
        } else {
            self.reason.clone()
        };
        pack_short_string(buf, &reason).expect("truncated to short-string bounds above");
        pack_short(buf, self.failed_class);
        pack_short(buf, self.failed_method);
    }

    pub fn unpack(data: &[u8]) -> AmqpResult<(CloseArgs, &[u8])> {
        let (code, data) = unpack_short(data)?;
        let (reason, data) = unpack_short_string(data)?;
        let (failed_class, data) = unpack_short(data)?;
        let (failed_method, data) = unpack_short(data)?;
        Ok((
            CloseArgs {
                code,
                reason,
                failed_class,
                failed_method,
            },
            data,
        ))
    }
}
