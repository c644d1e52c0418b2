//! End-to-end handshake and close scenarios driven over an in-memory
//! `tokio::io::duplex` pair standing in for the TCP socket, per SPEC_FULL's
//! "Test tooling" section. The "server" half hand-rolls frame reads with
//! the same length-prefix rule `ConnectionInner::try_decode_frame` checks,
//! since that helper is private to the crate.

mod test_utils;

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use amqp091::codec::field_table::FieldTable;
use amqp091::codec::frame::{Frame, FramePayload};
use amqp091::method::connection::{self, ConnectionMethod, Open, OpenOk, Start, StartOk, Tune};
use amqp091::method::Method;
use amqp091::{AmqpError, ConnectParams, Connection, SecurityHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

struct GuestPlain;

impl SecurityHandler for GuestPlain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn response(&self) -> Vec<u8> {
        let mut response = vec![0u8];
        response.extend_from_slice(b"guest");
        response.push(0);
        response.extend_from_slice(b"guest");
        response
    }
}

async fn read_frame(stream: &mut DuplexStream) -> Frame {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await.expect("peer closed before sending a full frame header");
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;
    let mut rest = vec![0u8; size + 1];
    stream.read_exact(&mut rest).await.expect("peer closed mid-frame");
    let mut full = header.to_vec();
    full.extend(rest);
    let (frame, leftover) = Frame::unpack(&full).expect("test peer sent a malformed frame");
    assert!(leftover.is_empty(), "unpack left bytes behind for an exact-length slice");
    frame
}

async fn write_frame(stream: &mut DuplexStream, frame: &Frame) {
    stream.write_all(&frame.pack().expect("test frame packs cleanly")).await.unwrap();
}

async fn read_protocol_header(stream: &mut DuplexStream) {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.expect("client never sent its protocol header");
    assert_eq!(&header[..4], b"AMQP", "client did not lead with the AMQP protocol header");
}

fn expect_connection_method(frame: Frame) -> ConnectionMethod {
    match frame.payload {
        FramePayload::Method(Method::Connection(m)) => m,
        other => panic!("expected a connection.* method frame, got {other:?}"),
    }
}

/// Plays the server side of a plain handshake with no `Secure` round,
/// advertising `frame_size_max` and `channel_max` smaller than whatever the
/// client asked for so the reconciliation in SPEC_FULL §8 is exercised for
/// real rather than just unit-tested against the bare formula.
async fn run_mock_broker(mut server: DuplexStream) -> DuplexStream {
    read_protocol_header(&mut server).await;

    write_frame(
        &mut server,
        &Frame {
            channel: 0,
            payload: FramePayload::Method(Method::Connection(ConnectionMethod::Start(Start {
                version_major: 0,
                version_minor: 9,
                server_properties: FieldTable::new(),
                security_mechanisms: vec!["PLAIN".to_owned()],
                locales: vec!["en_US".to_owned()],
            }))),
        },
    )
    .await;

    let start_ok = match expect_connection_method(read_frame(&mut server).await) {
        ConnectionMethod::StartOk(start_ok) => start_ok,
        other => panic!("expected connection.StartOk, got {other:?}"),
    };
    assert_eq!(start_ok.mechanism, "PLAIN");
    assert_eq!(start_ok.locale, "en_US");

    write_frame(
        &mut server,
        &Frame {
            channel: 0,
            payload: FramePayload::Method(Method::Connection(ConnectionMethod::Tune(Tune {
                channel_max: 16,
                frame_size_max: 8192,
                heartbeat_delay: 0,
            }))),
        },
    )
    .await;

    let tune_ok = match expect_connection_method(read_frame(&mut server).await) {
        ConnectionMethod::TuneOk(tune_ok) => tune_ok,
        other => panic!("expected connection.TuneOk, got {other:?}"),
    };
    assert_eq!(tune_ok.channel_max, 16);
    assert_eq!(tune_ok.frame_size_max, 4096);
    assert_eq!(tune_ok.heartbeat_delay, 0);

    let open = match expect_connection_method(read_frame(&mut server).await) {
        ConnectionMethod::Open(open) => open,
        other => panic!("expected connection.Open, got {other:?}"),
    };
    assert_eq!(open, Open { virtual_host: "/".to_owned() });

    write_frame(
        &mut server,
        &Frame {
            channel: 0,
            payload: FramePayload::Method(Method::Connection(ConnectionMethod::OpenOk(OpenOk))),
        },
    )
    .await;

    server
}

#[tokio::test]
async fn full_handshake_reconciles_tune_and_opens() {
    let _logger = test_utils::init_logger();
    let (client_socket, server_socket) = tokio::io::duplex(64 * 1024);

    let broker = tokio::spawn(run_mock_broker(server_socket));

    let params = ConnectParams::builder("broker.test")
        .frame_size_max(4096)
        .build()
        .unwrap();
    let handlers: Vec<Arc<dyn SecurityHandler>> = vec![Arc::new(GuestPlain)];

    let connection = Connection::connect(client_socket, params, handlers)
        .await
        .expect("handshake against the mock broker should succeed");

    assert_eq!(connection.server_version(), (0, 9));
    assert_eq!(connection.selected_mechanism(), "PLAIN");
    assert_eq!(connection.selected_locale(), "en_US");
    assert_eq!(connection.frame_size_max(), 4096);

    broker.await.expect("mock broker task panicked");
}

/// A malformed `Start.version_major` should fail the handshake with
/// `AmqpError::BadServerVersion` and never hand back a `Connection`, rather
/// than silently degrading to some other error (SPEC §4.7 step 1).
#[tokio::test]
async fn rejects_unsupported_protocol_version() {
    let _logger = test_utils::init_logger();
    let (client_socket, mut server_socket) = tokio::io::duplex(64 * 1024);

    let broker = tokio::spawn(async move {
        read_protocol_header(&mut server_socket).await;
        write_frame(
            &mut server_socket,
            &Frame {
                channel: 0,
                payload: FramePayload::Method(Method::Connection(ConnectionMethod::Start(Start {
                    version_major: 0,
                    version_minor: 8,
                    server_properties: FieldTable::new(),
                    security_mechanisms: vec!["PLAIN".to_owned()],
                    locales: vec!["en_US".to_owned()],
                }))),
            },
        )
        .await;
        server_socket
    });

    let params = ConnectParams::builder("broker.test").build().unwrap();
    let handlers: Vec<Arc<dyn SecurityHandler>> = vec![Arc::new(GuestPlain)];

    let err = Connection::connect(client_socket, params, handlers)
        .await
        .expect_err("a 0.8 server must be rejected, not silently accepted");
    assert!(
        matches!(err, AmqpError::BadServerVersion { major: 0, minor: 8 }),
        "unexpected error variant: {err:?}"
    );

    broker.await.unwrap();
}

/// A client offering only a mechanism the server doesn't advertise must
/// fail the handshake with `AmqpError::AuthFailed` (SPEC §4.7 step 2).
#[tokio::test]
async fn rejects_unadvertised_security_mechanism() {
    let _logger = test_utils::init_logger();
    let (client_socket, mut server_socket) = tokio::io::duplex(64 * 1024);

    let broker = tokio::spawn(async move {
        read_protocol_header(&mut server_socket).await;
        write_frame(
            &mut server_socket,
            &Frame {
                channel: 0,
                payload: FramePayload::Method(Method::Connection(ConnectionMethod::Start(Start {
                    version_major: 0,
                    version_minor: 9,
                    server_properties: FieldTable::new(),
                    security_mechanisms: vec!["AMQPLAIN".to_owned()],
                    locales: vec!["en_US".to_owned()],
                }))),
            },
        )
        .await;
        server_socket
    });

    let params = ConnectParams::builder("broker.test").build().unwrap();
    let handlers: Vec<Arc<dyn SecurityHandler>> = vec![Arc::new(GuestPlain)];

    let err = Connection::connect(client_socket, params, handlers)
        .await
        .expect_err("PLAIN must be rejected when only AMQPLAIN is advertised");
    assert!(matches!(err, AmqpError::AuthFailed { .. }), "unexpected error variant: {err:?}");

    broker.await.unwrap();
}

/// Once open, a graceful `close()` with no explicit error must send
/// `connection.Close(code=320, reason="CONNECTION_FORCED")` (SPEC §8
/// scenario 6), round-trip `CloseOk`, and resolve `finished()` with no
/// error (SPEC §4.7, §7).
#[tokio::test]
async fn graceful_close_round_trips_and_resolves_finished() {
    let _logger = test_utils::init_logger();
    let (client_socket, server_socket) = tokio::io::duplex(64 * 1024);
    let close_code = Arc::new(AtomicU16::new(0));

    let broker = tokio::spawn({
        let close_code = close_code.clone();
        async move {
            let mut server_socket = run_mock_broker(server_socket).await;
            let close = match expect_connection_method(read_frame(&mut server_socket).await) {
                ConnectionMethod::Close(close) => close,
                other => panic!("expected connection.Close, got {other:?}"),
            };
            close_code.store(close.code, Ordering::SeqCst);
            write_frame(
                &mut server_socket,
                &Frame {
                    channel: 0,
                    payload: FramePayload::Method(Method::Connection(ConnectionMethod::CloseOk(
                        connection::CloseOk,
                    ))),
                },
            )
            .await;
        }
    });

    let params = ConnectParams::builder("broker.test")
        .frame_size_max(4096)
        .build()
        .unwrap();
    let handlers: Vec<Arc<dyn SecurityHandler>> = vec![Arc::new(GuestPlain)];
    let connection = Connection::connect(client_socket, params, handlers).await.unwrap();

    connection.close(None, true).await.expect("graceful close should succeed");
    assert!(connection.finished().await.is_ok());
    assert_eq!(
        close_code.load(Ordering::SeqCst),
        320,
        "close() with no explicit error must send connection.Close(code=320, CONNECTION_FORCED)"
    );

    broker.await.expect("mock broker task panicked");
}
