//! The connection state machine: handshake, tuning, channel registry,
//! priority send loop, receive dispatcher, heartbeat, error propagation,
//! graceful close.
//!
//! Grounded on `examples/original_source/grabbit/protocol/connection.py`
//! (`connect()`'s phase-by-phase handshake and tune-reconciliation
//! arithmetic, `_send_loop`/`_recv_loop`, `error()`'s reentrant-safe
//! teardown) and on the teacher's `ConnectionCore`
//! (`hdbconnect_impl/src/conn/connection_core.rs`) for the Rust idiom: one
//! struct behind a lock-protected interior, a cloneable handle
//! (`Arc`-wrapped, mirroring `AmConnCore`) that application code and
//! background tasks share.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use crate::codec::frame::{Frame, FRAME_HEADER_OVERHEAD};
use crate::codec::primitive::ProtocolHeader;
use crate::config::ConnectParams;
use crate::conn::channel::{Channel, WeakChannel};
use crate::conn::queue::PriorityQueue;
use crate::error::{AmqpError, AmqpResult};
use crate::method::common::CloseArgs;
use crate::method::connection::{self, ConnectionMethod, SecureOk, StartOk, Tune};
use crate::method::Method;
use crate::security::SecurityHandler;

/// Outgoing `(frame, completion)` pair drained by the send loop; the
/// completion is resolved once the frame has actually been written (or
/// failed to write), so `Channel::send`'s caller knows when it's safe to
/// assume the peer has, or will, see it.
type QueueItem = (Frame, oneshot::Sender<AmqpResult<()>>);

pub(crate) struct ConnectionInner {
    params: ConnectParams,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    send_queue: PriorityQueue<QueueItem>,
    tune: Mutex<Tune>,
    server_properties: Mutex<crate::codec::field_table::FieldTable>,
    server_version: Mutex<(u8, u8)>,
    selected_locale: Mutex<String>,
    selected_mechanism: Mutex<String>,
    channels: Mutex<HashMap<u16, WeakChannel>>,
    control: Mutex<Option<Channel>>,
    connected: Mutex<bool>,
    connected_notify: Notify,
    finished: Mutex<Option<Result<(), Arc<AmqpError>>>>,
    finished_notify: Notify,
    on_error: Mutex<Vec<Arc<dyn Fn(Connection, Option<Arc<AmqpError>>) + Send + Sync>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    last_activity: Mutex<Instant>,
}

impl ConnectionInner {
    #[must_use]
    pub(crate) fn frame_size_max(&self) -> u32 {
        self.tune.lock().expect("tune mutex poisoned").frame_size_max
    }

    /// Enqueues every frame in `frames` at `priority`, then waits for all
    /// of them to finish writing. Pushed without any intervening `.await`
    /// by the caller (see `Channel::send_lock`), so the batch lands
    /// contiguously in the queue relative to this channel's own traffic.
    pub(crate) async fn enqueue_all(&self, priority: i16, frames: Vec<Frame>) -> AmqpResult<()> {
        let mut receivers = Vec::with_capacity(frames.len());
        for frame in frames {
            let (tx, rx) = oneshot::channel();
            self.send_queue.put(priority, (frame, tx));
            receivers.push(rx);
        }
        for rx in receivers {
            rx.await.map_err(|_| AmqpError::ConnectionClosed)??;
        }
        Ok(())
    }

    pub(crate) fn forget_channel(&self, id: u16) {
        self.channels.lock().expect("channel registry mutex poisoned").remove(&id);
    }
}

/// A cloneable handle to one AMQP connection. See the module docs.
#[derive(Clone)]
pub struct Connection(pub(crate) Arc<ConnectionInner>);

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("vhost", &self.0.params.vhost())
            .field("tune", &*self.0.tune.lock().expect("tune mutex poisoned"))
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Dials `params.host()`:`params.port()` over plain TCP and performs
    /// the full handshake. For anything other than a bare `TcpStream` (an
    /// in-memory duplex in tests, a pre-negotiated TLS stream, ...) use
    /// [`Connection::connect`] directly.
    pub async fn open(
        params: ConnectParams,
        security_handlers: Vec<Arc<dyn SecurityHandler>>,
    ) -> AmqpResult<Connection> {
        let socket = TcpStream::connect((params.host(), params.port())).await?;
        Connection::connect(socket, params, security_handlers).await
    }

    /// Performs the handshake over an already-established byte stream.
    /// Returns once `OpenOk` has been received (SPEC §6).
    pub async fn connect<S>(
        socket: S,
        params: ConnectParams,
        security_handlers: Vec<Arc<dyn SecurityHandler>>,
    ) -> AmqpResult<Connection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(socket);
        let inner = Arc::new(ConnectionInner {
            params,
            writer: tokio::sync::Mutex::new(Box::new(write_half)),
            send_queue: PriorityQueue::new(),
            tune: Mutex::new(Tune {
                channel_max: 0,
                frame_size_max: 0,
                heartbeat_delay: 0,
            }),
            server_properties: Mutex::new(crate::codec::field_table::FieldTable::new()),
            server_version: Mutex::new((0, 0)),
            selected_locale: Mutex::new(String::new()),
            selected_mechanism: Mutex::new(String::new()),
            channels: Mutex::new(HashMap::new()),
            control: Mutex::new(None),
            connected: Mutex::new(false),
            connected_notify: Notify::new(),
            finished: Mutex::new(None),
            finished_notify: Notify::new(),
            on_error: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            last_activity: Mutex::new(Instant::now()),
        });
        let connection = Connection(inner.clone());

        let control = Channel::new_control(Arc::downgrade(&inner));
        inner
            .channels
            .lock()
            .expect("channel registry mutex poisoned")
            .insert(0, control.downgrade());
        *inner.control.lock().expect("control channel mutex poisoned") = Some(control);

        connection.track_task({
            let connection = connection.clone();
            tokio::spawn(async move { connection.send_loop().await })
        });

        connection.write_raw(&ProtocolHeader::default().pack()).await?;

        connection.track_task({
            let connection = connection.clone();
            tokio::spawn(async move { connection.recv_loop(read_half).await })
        });

        let handshake = async {
            let _guard = inner.send_queue.limit_to(0);
            connection.handshake(&security_handlers).await?;
            *inner.connected.lock().expect("connected mutex poisoned") = true;
            inner.connected_notify.notify_waiters();
            Ok::<(), AmqpError>(())
        }
        .await;

        match handshake {
            Ok(()) => {
                connection.spawn_heartbeat();
                debug!("connection to {}:{} established", connection.0.params.host(), connection.0.params.port());
                Ok(connection)
            }
            Err(err) => {
                let reported = err.duplicate();
                connection.error(Some(err)).await;
                Err(reported)
            }
        }
    }

    #[must_use]
    pub(crate) fn control_channel(&self) -> Channel {
        self.0
            .control
            .lock()
            .expect("control channel mutex poisoned")
            .clone()
            .expect("control channel is set before connect() returns")
    }

    /// Opens a fresh channel at the given send priority (SPEC §6).
    pub async fn channel(&self, priority: i16) -> AmqpResult<Channel> {
        let id = self.next_channel_id()?;
        let channel = Channel::new(id, Arc::downgrade(&self.0), priority);
        self.0
            .channels
            .lock()
            .expect("channel registry mutex poisoned")
            .insert(id, channel.downgrade());
        channel.open().await
    }

    fn next_channel_id(&self) -> AmqpResult<u16> {
        let channels = self.0.channels.lock().expect("channel registry mutex poisoned");
        let channel_max = {
            let tune = self.0.tune.lock().expect("tune mutex poisoned");
            if tune.channel_max == 0 {
                u16::MAX
            } else {
                tune.channel_max
            }
        };
        for id in 1..=channel_max {
            let free = match channels.get(&id) {
                Some(weak) => Channel::upgrade(weak).is_none(),
                None => true,
            };
            if free {
                return Ok(id);
            }
        }
        Err(AmqpError::NoMoreChannels { channel_max })
    }

    /// Registers a callback invoked once this connection fails, gracefully
    /// or not (SPEC §6 `on_error`). Runs on an independent task so one
    /// misbehaving handler can't block others or the connection itself.
    pub fn on_error(&self, callback: impl Fn(Connection, Option<Arc<AmqpError>>) + Send + Sync + 'static) {
        self.0
            .on_error
            .lock()
            .expect("on_error mutex poisoned")
            .push(Arc::new(callback));
    }

    /// The server's negotiated protocol version, available once the
    /// handshake has received `Start` (SPEC §4.2 connection state).
    #[must_use]
    pub fn server_version(&self) -> (u8, u8) {
        *self.0.server_version.lock().expect("server version mutex poisoned")
    }

    /// The server properties field table received in `Start` (SPEC §4.2
    /// connection state).
    #[must_use]
    pub fn server_properties(&self) -> crate::codec::field_table::FieldTable {
        self.0
            .server_properties
            .lock()
            .expect("server properties mutex poisoned")
            .clone()
    }

    /// The locale selected during the handshake (SPEC §4.2 connection
    /// state, §4.7 step 2).
    #[must_use]
    pub fn selected_locale(&self) -> String {
        self.0.selected_locale.lock().expect("locale mutex poisoned").clone()
    }

    /// The security mechanism selected during the handshake (SPEC §4.2
    /// connection state, §4.7 step 2).
    #[must_use]
    pub fn selected_mechanism(&self) -> String {
        self.0
            .selected_mechanism
            .lock()
            .expect("mechanism mutex poisoned")
            .clone()
    }

    /// The tune parameters actually in effect after reconciliation (SPEC
    /// §4.7 step 5).
    #[must_use]
    pub fn frame_size_max(&self) -> u32 {
        self.0.frame_size_max()
    }

    /// Blocks until the connection is closed, returning the error that
    /// caused it, if any. The recommended way to "block forever" once
    /// application setup is complete (SPEC §6).
    pub async fn finished(&self) -> Result<(), Arc<AmqpError>> {
        loop {
            let notified = self.0.finished_notify.notified();
            if let Some(result) = &*self.0.finished.lock().expect("finished mutex poisoned") {
                return result.clone();
            }
            notified.await;
        }
    }

    /// True once the handshake has completed and ordinary application
    /// traffic is no longer held behind the handshake's priority-0 limit.
    pub async fn connected(&self) {
        loop {
            let notified = self.0.connected_notify.notified();
            if *self.0.connected.lock().expect("connected mutex poisoned") {
                return;
            }
            notified.await;
        }
    }

    async fn handshake(&self, security_handlers: &[Arc<dyn SecurityHandler>]) -> AmqpResult<()> {
        let control = self.control_channel();

        let start = match control
            .wait_for(&[connection::method_id::START])
            .await?
        {
            Method::Connection(ConnectionMethod::Start(start)) => start,
            other => {
                return Err(AmqpError::SyntaxError {
                    reason: format!("expected connection.Start, got {other:?}"),
                })
            }
        };
        if (start.version_major, start.version_minor) != (0, 9) {
            return Err(AmqpError::BadServerVersion {
                major: start.version_major,
                minor: start.version_minor,
            });
        }
        *self.0.server_version.lock().expect("server version mutex poisoned") =
            (start.version_major, start.version_minor);
        *self
            .0
            .server_properties
            .lock()
            .expect("server properties mutex poisoned") = start.server_properties.clone();

        let handler = security_handlers
            .iter()
            .find(|handler| start.security_mechanisms.iter().any(|m| m == handler.name()))
            .ok_or_else(|| AmqpError::AuthFailed {
                server_supports: start.security_mechanisms.join(", "),
            })?;

        let locale = self
            .0
            .params
            .locales()
            .iter()
            .find(|preferred| start.locales.contains(preferred))
            .cloned()
            .or_else(|| start.locales.first().cloned())
            .unwrap_or_else(|| "en_US".to_owned());
        *self.0.selected_locale.lock().expect("locale mutex poisoned") = locale.clone();
        *self.0.selected_mechanism.lock().expect("mechanism mutex poisoned") = handler.name().to_owned();

        control
            .send(
                Method::Connection(ConnectionMethod::StartOk(StartOk {
                    client_properties: self.0.params.client_properties().clone(),
                    mechanism: handler.name().to_owned(),
                    response: handler.response(),
                    locale,
                })),
                None,
                Some(0),
            )
            .await?;

        let tune_or_secure_ids = [connection::method_id::TUNE, connection::method_id::SECURE];
        let mut next = control.wait_for(&tune_or_secure_ids).await?;
        while let Method::Connection(ConnectionMethod::Secure(secure)) = next {
            if !handler.has_challenge() {
                return Err(AmqpError::AuthFailed {
                    server_supports: format!("{} does not support a challenge round", handler.name()),
                });
            }
            let response = handler.challenge(&secure.challenge)?;
            control
                .send(
                    Method::Connection(ConnectionMethod::SecureOk(SecureOk { response })),
                    None,
                    Some(0),
                )
                .await?;
            next = control.wait_for(&tune_or_secure_ids).await?;
        }
        let tune = match next {
            Method::Connection(ConnectionMethod::Tune(tune)) => tune,
            other => {
                return Err(AmqpError::SyntaxError {
                    reason: format!("expected connection.Tune, got {other:?}"),
                })
            }
        };

        const MIN_FRAME_SIZE_MAX: u32 = FRAME_HEADER_OVERHEAD as u32 + 1;
        if tune.frame_size_max != 0 && tune.frame_size_max < MIN_FRAME_SIZE_MAX {
            return Err(AmqpError::SyntaxError {
                reason: format!(
                    "server frame_size_max {} is too small to send any content",
                    tune.frame_size_max
                ),
            });
        }

        let reconciled = Tune {
            channel_max: reconcile(0, u32::from(tune.channel_max)) as u16,
            frame_size_max: reconcile(self.0.params.frame_size_max(), tune.frame_size_max),
            heartbeat_delay: if self.0.params.heartbeat() && tune.heartbeat_delay != 0 {
                tune.heartbeat_delay
            } else {
                0
            },
        };
        *self.0.tune.lock().expect("tune mutex poisoned") = reconciled;

        control
            .send(Method::Connection(ConnectionMethod::TuneOk(reconciled)), None, Some(0))
            .await?;

        control
            .send_sync(
                Method::Connection(ConnectionMethod::Open(connection::Open {
                    virtual_host: self.0.params.vhost().to_owned(),
                })),
                Some(0),
            )
            .await?;

        Ok(())
    }

    async fn write_raw(&self, bytes: &[u8]) -> AmqpResult<()> {
        let mut writer = self.0.writer.lock().await;
        writer.write_all(bytes).await?;
        Ok(())
    }

    async fn write_frame(&self, frame: &Frame) -> AmqpResult<()> {
        let packed = frame.pack()?;
        trace!("-> channel {} {:?}", frame.channel, frame.frame_type());
        self.write_raw(&packed).await
    }

    fn track_task(&self, handle: JoinHandle<()>) {
        self.0.tasks.lock().expect("task list mutex poisoned").push(handle);
    }

    /// Single consumer draining the priority send queue (SPEC §4.7, §5).
    async fn send_loop(self) {
        loop {
            let (frame, done) = self.0.send_queue.get().await;
            match self.write_frame(&frame).await {
                Ok(()) => {
                    let _ = done.send(Ok(()));
                }
                Err(err) => {
                    let reported = err.duplicate();
                    let _ = done.send(Err(err));
                    self.error(Some(reported)).await;
                    return;
                }
            }
        }
    }

    /// Reads bytes, decodes complete frames, and dispatches each to its
    /// channel. `Incomplete` (not enough bytes buffered yet) is handled
    /// entirely by `try_decode_frame`'s length pre-check, so any error
    /// `Frame::unpack` itself returns here is a genuine framing fault
    /// (SPEC §4.7).
    async fn recv_loop(self, mut reader: impl AsyncRead + Unpin) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => {
                    self.error(Some(AmqpError::ServerClosed)).await;
                    return;
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    self.error(Some(AmqpError::Io(err))).await;
                    return;
                }
            }
            loop {
                match Self::try_decode_frame(&buf) {
                    Ok(Some((frame, consumed))) => {
                        buf.drain(..consumed);
                        *self.0.last_activity.lock().expect("last-activity mutex poisoned") = Instant::now();
                        if let Err(err) = self.dispatch_frame(frame) {
                            self.error(Some(err)).await;
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        self.error(Some(err.duplicate())).await;
                        return;
                    }
                }
            }
        }
    }

    fn try_decode_frame(buf: &[u8]) -> AmqpResult<Option<(Frame, usize)>> {
        if buf.len() < 7 {
            return Ok(None);
        }
        let size = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
        let total = 7usize
            .checked_add(size)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| AmqpError::FrameError {
                reason: format!("declared frame size {size} overflows"),
            })?;
        if buf.len() < total {
            return Ok(None);
        }
        let (frame, rest) = Frame::unpack(&buf[..total])?;
        debug_assert!(rest.is_empty(), "exact-length slice must be fully consumed");
        Ok(Some((frame, total)))
    }

    fn dispatch_frame(&self, frame: Frame) -> AmqpResult<()> {
        let channel = {
            let channels = self.0.channels.lock().expect("channel registry mutex poisoned");
            channels.get(&frame.channel).and_then(Channel::upgrade)
        };
        match channel {
            Some(channel) => channel.receive_frame(frame),
            None => Err(AmqpError::CommandInvalid {
                reason: format!("frame received for unknown channel {}", frame.channel),
            }),
        }
    }

    fn spawn_heartbeat(&self) {
        let delay = self.0.tune.lock().expect("tune mutex poisoned").heartbeat_delay;
        if delay == 0 {
            return;
        }
        let send_interval = Duration::from_secs(u64::from(delay));
        let recv_timeout = Duration::from_secs(u64::from(delay) * 2);

        let sender = self.clone();
        self.track_task(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(send_interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                if sender.write_frame(&Frame::heartbeat()).await.is_err() {
                    return;
                }
            }
        }));

        let watchdog = self.clone();
        self.track_task(tokio::spawn(async move {
            loop {
                let elapsed = watchdog
                    .0
                    .last_activity
                    .lock()
                    .expect("last-activity mutex poisoned")
                    .elapsed();
                if elapsed >= recv_timeout {
                    watchdog
                        .error(Some(AmqpError::ConnectionForced {
                            reason: "CONNECTION_FORCED - missed heartbeat".to_owned(),
                        }))
                        .await;
                    return;
                }
                tokio::time::sleep(recv_timeout - elapsed).await;
            }
        }));
    }

    /// Gracefully closes the connection: blocks non-close sends, enqueues
    /// `connection.Close` at priority -1, optionally awaits `CloseOk`, then
    /// tears down via [`Connection::error`] (SPEC §4.7, §7).
    pub async fn close(&self, error: Option<AmqpError>, wait_for_ok: bool) -> AmqpResult<()> {
        if self.0.finished.lock().expect("finished mutex poisoned").is_some() {
            return Ok(());
        }
        self.0.send_queue.set_limit(-1);
        let send_error = error.unwrap_or(AmqpError::ConnectionForced {
            reason: "CONNECTION_FORCED".to_owned(),
        });
        let args = CloseArgs::from_error(&send_error, None);
        let control = self.control_channel();
        let send_result = if wait_for_ok {
            control
                .send_sync(Method::Connection(ConnectionMethod::Close(args)), Some(-1))
                .await
                .map(|_| ())
        } else {
            control
                .send(Method::Connection(ConnectionMethod::Close(args)), None, Some(-1))
                .await
        };
        self.error(None).await;
        send_result
    }

    /// React to a fatal error: resolves `finished` exactly once, fails
    /// every still-reachable channel, aborts every tracked task, closes the
    /// socket, and fans out to every `on_error` callback on independent
    /// tasks (SPEC §4.7, §5). Reentrant: a second call after `finished` has
    /// already resolved is a no-op, even with a different `ex`.
    pub async fn error(&self, ex: Option<AmqpError>) {
        let already_finished = {
            let mut finished = self.0.finished.lock().expect("finished mutex poisoned");
            if finished.is_some() {
                true
            } else {
                *finished = Some(match &ex {
                    Some(e) => Err(Arc::new(e.duplicate())),
                    None => Ok(()),
                });
                false
            }
        };
        if already_finished {
            return;
        }
        if let Some(e) = &ex {
            warn!("connection fatal error: {e}");
        } else {
            debug!("connection closed gracefully");
        }
        self.0.finished_notify.notify_waiters();

        let shared = match &*self.0.finished.lock().expect("finished mutex poisoned") {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        };

        let channels: Vec<WeakChannel> = self
            .0
            .channels
            .lock()
            .expect("channel registry mutex poisoned")
            .values()
            .cloned()
            .collect();
        for weak in channels {
            if let Some(channel) = Channel::upgrade(&weak) {
                channel.fail(shared.clone());
            }
        }

        let tasks: Vec<JoinHandle<()>> = self.0.tasks.lock().expect("task list mutex poisoned").drain(..).collect();
        for task in tasks {
            task.abort();
        }

        {
            let mut writer = self.0.writer.lock().await;
            let _ = writer.shutdown().await;
        }

        let callbacks: Vec<_> = self.0.on_error.lock().expect("on_error mutex poisoned").clone();
        for callback in callbacks {
            let connection = self.clone();
            let shared = shared.clone();
            tokio::spawn(async move { callback(connection, shared) });
        }
    }
}

/// `result = ours` iff `ours != 0 && (theirs == 0 || ours < theirs)`, else
/// `theirs`, per SPEC §4.7 step 5's `channel_max`/`frame_size_max`
/// reconciliation, verified against every `(ours, theirs)` pair in
/// SPEC_FULL §8's "Tune reconciliation" table.
fn reconcile(ours: u32, theirs: u32) -> u32 {
    if ours != 0 && (theirs == 0 || ours < theirs) {
        ours
    } else {
        theirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tune_reconciliation_matches_spec_table() {
        let cases = [
            ((0, 0), 0),
            ((0, 5), 5),
            ((5, 0), 5),
            ((3, 5), 3),
            ((5, 3), 3),
            ((5, 5), 5),
        ];
        for ((ours, theirs), expected) in cases {
            assert_eq!(reconcile(ours, theirs), expected, "ours={ours} theirs={theirs}");
        }
    }

    #[test]
    fn heartbeat_delay_reduces_to_boolean_and() {
        let reconcile_heartbeat = |ours: bool, theirs: u16| -> u16 { if ours && theirs != 0 { theirs } else { 0 } };
        assert_eq!(reconcile_heartbeat(true, 60), 60);
        assert_eq!(reconcile_heartbeat(false, 60), 0);
        assert_eq!(reconcile_heartbeat(true, 0), 0);
    }
}
