//! Connection-time configuration: everything that varies per deployment
//! rather than per protocol version. Grounded on the teacher's
//! `ConnectParams`/`ConnectParamsBuilder` split (see
//! `examples/emabee-rust-hdbconnect/hdbconnect_impl/src/conn/params/`),
//! an immutable record built through a fluent builder, rather than a
//! constructor with a dozen positional arguments.

use crate::codec::field_table::{FieldTable, FieldValue};
use crate::error::{AmqpError, AmqpResult};

/// Default AMQP port.
pub const DEFAULT_PORT: u16 = 5672;

/// Default virtual host.
pub const DEFAULT_VHOST: &str = "/";

/// Everything needed to dial and negotiate a new connection: `host`/`port`,
/// the virtual host to open, the client's half of frame-size/heartbeat
/// negotiation, preferred locales in order, and `client_properties` to
/// report in `StartOk`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectParams {
    host: String,
    port: u16,
    vhost: String,
    frame_size_max: u32,
    heartbeat: bool,
    locales: Vec<String>,
    client_properties: FieldTable,
}

impl ConnectParams {
    /// Starts a builder for the given host, with every other field at its
    /// default (port 5672, vhost "/", heartbeat enabled, no frame-size cap).
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConnectParamsBuilder {
        ConnectParamsBuilder::new(host)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn vhost(&self) -> &str {
        &self.vhost
    }

    /// 0 means "no cap"; see SPEC §4.7 step 5 for how this reconciles
    /// against the server's announced `frame_size_max`.
    #[must_use]
    pub fn frame_size_max(&self) -> u32 {
        self.frame_size_max
    }

    /// Whether heartbeating is wanted at all; the actual delay is always
    /// the server's (or disabled), per the reduction `SPEC_FULL` documents
    /// under Open Question (a).
    #[must_use]
    pub fn heartbeat(&self) -> bool {
        self.heartbeat
    }

    #[must_use]
    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    #[must_use]
    pub fn client_properties(&self) -> &FieldTable {
        &self.client_properties
    }
}

/// Builder for [`ConnectParams`]. See the module docs for the rationale.
#[derive(Clone, Debug, Default)]
pub struct ConnectParamsBuilder {
    host: Option<String>,
    port: Option<u16>,
    vhost: Option<String>,
    frame_size_max: u32,
    heartbeat: bool,
    locales: Vec<String>,
    client_properties: FieldTable,
}

impl ConnectParamsBuilder {
    #[must_use]
    pub fn new(host: impl Into<String>) -> ConnectParamsBuilder {
        ConnectParamsBuilder {
            host: Some(host.into()),
            heartbeat: true,
            ..ConnectParamsBuilder::default()
        }
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> ConnectParamsBuilder {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn vhost(mut self, vhost: impl Into<String>) -> ConnectParamsBuilder {
        self.vhost = Some(vhost.into());
        self
    }

    #[must_use]
    pub fn frame_size_max(mut self, frame_size_max: u32) -> ConnectParamsBuilder {
        self.frame_size_max = frame_size_max;
        self
    }

    #[must_use]
    pub fn heartbeat(mut self, enabled: bool) -> ConnectParamsBuilder {
        self.heartbeat = enabled;
        self
    }

    /// Appends a locale to the preference list, most preferred first.
    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> ConnectParamsBuilder {
        self.locales.push(locale.into());
        self
    }

    #[must_use]
    pub fn client_property(mut self, name: impl Into<String>, value: FieldValue) -> ConnectParamsBuilder {
        self.client_properties.insert(name.into(), value);
        self
    }

    /// Finalises the builder, defaulting `port` to 5672 and `vhost` to "/".
    ///
    /// # Errors
    /// Returns [`AmqpError::ConfigError`] if `host` was never set, or if a
    /// nonzero `frame_size_max` is too small to carry a content frame's
    /// header overhead at all.
    pub fn build(self) -> AmqpResult<ConnectParams> {
        let host = self.host.ok_or_else(|| AmqpError::ConfigError {
            reason: "host is required".to_owned(),
        })?;
        if host.is_empty() {
            return Err(AmqpError::ConfigError {
                reason: "host must not be empty".to_owned(),
            });
        }
        const MIN_FRAME_SIZE_MAX: u32 = crate::codec::frame::FRAME_HEADER_OVERHEAD as u32 + 1;
        if self.frame_size_max != 0 && self.frame_size_max < MIN_FRAME_SIZE_MAX {
            return Err(AmqpError::ConfigError {
                reason: format!(
                    "frame_size_max {} is too small to fit any content (minimum {MIN_FRAME_SIZE_MAX})",
                    self.frame_size_max
                ),
            });
        }
        Ok(ConnectParams {
            host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            vhost: self.vhost.unwrap_or_else(|| DEFAULT_VHOST.to_owned()),
            frame_size_max: self.frame_size_max,
            heartbeat: self.heartbeat,
            locales: self.locales,
            client_properties: self.client_properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_port_and_vhost() {
        let params = ConnectParams::builder("localhost").build().unwrap();
        assert_eq!(params.port(), DEFAULT_PORT);
        assert_eq!(params.vhost(), DEFAULT_VHOST);
        assert!(params.heartbeat());
    }

    #[test]
    fn rejects_missing_host() {
        assert!(ConnectParamsBuilder::default().build().is_err());
    }

    #[test]
    fn rejects_undersized_frame_max() {
        let err = ConnectParams::builder("localhost")
            .frame_size_max(4)
            .build();
        assert!(err.is_err());
    }
}
