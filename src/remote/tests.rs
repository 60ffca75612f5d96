//! Tests for the wire encoding and the default socket transport.

use std::{
    io::{self, Read},
    net::{SocketAddr, TcpListener},
    sync::mpsc,
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rstest::{fixture, rstest};

use crate::{
    cancel::cancellation,
    level::Severity,
    log_entry::{LogEntry, LogEntryList},
};

use super::{
    serialise::{WireTimestamp, decode_batch, frame_payload, serialise_batch},
    transport::{Connection, Connector, Endpoint, LogStream, TcpConnector},
};

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

/// Accept one connection and forward every frame until the peer half-closes.
fn spawn_frame_server(listener: TcpListener) -> (SocketAddr, mpsc::Receiver<Vec<u8>>) {
    let addr = listener.local_addr().expect("listener has address");
    let (notify_tx, notify_rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept connection");
        loop {
            let mut len_buf = [0u8; 4];
            if stream.read_exact(&mut len_buf).is_err() {
                break;
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).expect("read payload");
            if notify_tx.send(payload).is_err() {
                break;
            }
        }
    });
    (addr, notify_rx)
}

fn connector() -> TcpConnector {
    TcpConnector::new(None, Duration::from_secs(1), 1 << 16)
}

fn sample_entry() -> LogEntry {
    LogEntry::new(
        UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789),
        Severity::Critical,
        "worker lost heartbeat",
    )
    .with_location("src/harness.rs:88")
    .with_instruction_ref("inst-42")
}

#[rstest]
#[case("localhost:8088", Endpoint::Tcp { host: "localhost".into(), port: 8088 })]
#[case("[::1]:9000", Endpoint::Tcp { host: "::1".into(), port: 9000 })]
#[case("unix:/run/logs.sock", Endpoint::Unix("/run/logs.sock".into()))]
fn parses_endpoints(#[case] raw: &str, #[case] expected: Endpoint) {
    let parsed = Endpoint::parse(raw).expect("endpoint parses");
    assert_eq!(parsed, expected);
    assert_eq!(parsed.to_string(), raw);
}

#[rstest]
#[case("localhost")]
#[case(":8080")]
#[case("host:http")]
#[case("unix:")]
fn rejects_malformed_endpoints(#[case] raw: &str) {
    let err = Endpoint::parse(raw).expect_err("endpoint must be rejected");
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[rstest]
fn frame_payload_enforces_limit() {
    let payload = vec![0u8; 32];
    assert!(
        frame_payload(&payload, 16).is_none(),
        "payload larger than limit must be rejected",
    );
}

#[rstest]
fn frame_payload_prefixes_length() {
    let payload = vec![1u8, 2, 3];
    let framed = frame_payload(&payload, 16).expect("payload fits frame");
    assert_eq!(&framed[..4], &3u32.to_be_bytes());
    assert_eq!(&framed[4..], payload);
}

#[rstest]
fn decoded_batch_preserves_every_field() {
    let batch = LogEntryList::single(sample_entry());
    let payload = serialise_batch(&batch).expect("serialise batch");
    assert_eq!(decode_batch(&payload).expect("decode batch"), batch);
}

#[rstest]
fn optional_fields_stay_absent() {
    let batch = LogEntryList::single(LogEntry::new(UNIX_EPOCH, Severity::Info, "plain"));
    let payload = serialise_batch(&batch).expect("serialise batch");
    let decoded = decode_batch(&payload).expect("decode batch");
    assert_eq!(decoded.entries[0].location(), None);
    assert_eq!(decoded.entries[0].instruction_ref(), None);
}

#[rstest]
fn decode_rejects_garbage() {
    let err = decode_batch(&[0xc1, 0x00]).expect_err("invalid msgpack");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[rstest]
#[case(UNIX_EPOCH + Duration::new(5, 250), WireTimestamp { seconds: 5, nanos: 250 })]
#[case(UNIX_EPOCH - Duration::from_secs(2), WireTimestamp { seconds: -2, nanos: 0 })]
#[case(UNIX_EPOCH - Duration::from_millis(1500), WireTimestamp { seconds: -2, nanos: 500_000_000 })]
fn timestamps_split_into_seconds_and_nanos(#[case] time: SystemTime, #[case] wire: WireTimestamp) {
    assert_eq!(WireTimestamp::from(time), wire);
    assert_eq!(SystemTime::from(wire), time);
}

#[rstest]
fn tcp_stream_delivers_frames_in_order(tcp_listener: TcpListener) {
    let (addr, notify_rx) = spawn_frame_server(tcp_listener);
    let (_canceller, token) = cancellation();
    let mut connection = connector()
        .dial(&addr.to_string(), Duration::from_secs(1), &token)
        .expect("dial listener");
    let mut stream = connection.open_log_stream().expect("open stream");

    for message in ["one", "two"] {
        let batch = LogEntryList::single(LogEntry::new(SystemTime::now(), Severity::Info, message));
        stream.send(&batch).expect("send batch");
    }
    stream.close_send().expect("half-close");
    connection.close();

    let messages: Vec<_> = (0..2)
        .map(|_| {
            let payload = notify_rx
                .recv_timeout(Duration::from_secs(2))
                .expect("frame received");
            let batch = decode_batch(&payload).expect("decode frame");
            assert_eq!(batch.entries.len(), 1);
            batch.entries[0].message().to_owned()
        })
        .collect();
    assert_eq!(messages, ["one", "two"]);
}

#[rstest]
fn oversized_batch_fails_send(tcp_listener: TcpListener) {
    let (addr, _notify_rx) = spawn_frame_server(tcp_listener);
    let (_canceller, token) = cancellation();
    let mut connection = TcpConnector::new(None, Duration::from_secs(1), 8)
        .dial(&addr.to_string(), Duration::from_secs(1), &token)
        .expect("dial listener");
    let mut stream = connection.open_log_stream().expect("open stream");
    let err = stream
        .send(&LogEntryList::single(sample_entry()))
        .expect_err("frame limit exceeded");
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[rstest]
fn dial_fails_without_listener() {
    let addr = {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        listener.local_addr().expect("address")
    };
    let (_canceller, token) = cancellation();
    assert!(
        connector()
            .dial(&addr.to_string(), Duration::from_millis(500), &token)
            .is_err()
    );
}

#[rstest]
fn dial_stops_once_cancelled(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("address");
    let (canceller, token) = cancellation();
    canceller.cancel();
    let err = connector()
        .dial(&addr.to_string(), Duration::from_secs(1), &token)
        .expect_err("cancelled dial");
    assert_eq!(err.kind(), io::ErrorKind::Interrupted);
}

#[cfg(unix)]
#[rstest]
fn unix_dial_connects_to_listener() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("logs.sock");
    let _listener = std::os::unix::net::UnixListener::bind(&path).expect("bind unix listener");
    let (_canceller, token) = cancellation();
    let endpoint = format!("unix:{}", path.display());
    assert!(
        connector()
            .dial(&endpoint, Duration::from_secs(1), &token)
            .is_ok()
    );
}

#[cfg(unix)]
#[rstest]
fn unix_dial_stops_once_cancelled() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("logs.sock");
    let _listener = std::os::unix::net::UnixListener::bind(&path).expect("bind unix listener");
    let (canceller, token) = cancellation();
    canceller.cancel();
    let err = connector()
        .dial(&format!("unix:{}", path.display()), Duration::from_secs(1), &token)
        .expect_err("cancelled dial");
    assert_eq!(err.kind(), io::ErrorKind::Interrupted);
}
