//! End-to-end tests over real sockets, with the mock system behind `serve`.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use rfclink::Connection;
use rfclink::ConnectionConfig;
use rfclink::ErrorKind;
use rfclink::Outcome;
use rfclink::Record;
use rfclink::Value;
use rfclink::mock;
use rfclink::mock::MockSystem;

/// Binds an ephemeral port and serves `system` on it. The router string
/// makes the client's first hop that port, whatever ASHOST says.
async fn start(system: &MockSystem) -> (ConnectionConfig, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let server = tokio::spawn({
        let system = system.clone();
        async move {
            let _ = mock::serve(system, listener).await;
        }
    });

    let config = ConnectionConfig::new()
        .with("saprouter", format!("/H/127.0.0.1/S/{port}"))
        .with("ashost", "app.internal")
        .with("sysnr", "00")
        .with("client", "100")
        .with("user", "DEMO")
        .with("passwd", "secret");
    (config, server)
}

// --- Test 1: Full Round Trip ---

#[tokio::test]
async fn test_tcp_session_end_to_end() {
    let system = MockSystem::standard().expect("standard procedures");
    system.require_logon("DEMO", "secret");
    let (config, server) = start(&system).await;

    let conn = Connection::new();
    conn.open(&config).await.expect("open");
    assert!(conn.is_open());
    assert!(conn.ping().await.expect("ping"));

    let f = conn.lookup("STFC_CONNECTION").await.expect("lookup");
    let outcome = f.invoke(&Record::new().with("REQUTEXT", "over the wire")).await.expect("invoke");
    let results = outcome.into_result().expect("completed");
    assert_eq!(results.get("ECHOTEXT").and_then(Value::as_str).map(str::trim_end), Some("over the wire"));

    let raise = conn.lookup("RFC_RAISE_ERROR").await.expect("lookup");
    match raise.invoke(&Record::new()).await.expect("call completes") {
        Outcome::Exception(e) => assert_eq!((e.exception_type.as_str(), e.key.as_str()), ("E", "EXAMPLE")),
        other => panic!("Expected exception, got {other:?}"),
    }

    conn.close().await;
    assert!(!conn.is_open());
    assert_eq!(system.open_sessions(), 0);
    server.abort();
}

#[tokio::test]
async fn test_tcp_logon_rejected() {
    let system = MockSystem::standard().expect("standard procedures");
    system.require_logon("DEMO", "other");
    let (config, server) = start(&system).await;

    let conn = Connection::new();
    let err = conn.open(&config).await.expect_err("bad password");
    assert_eq!(err.kind(), ErrorKind::ConnectionError);
    assert_eq!(err.key(), "RFC_LOGON_FAILURE");
    assert!(!conn.is_open());
    server.abort();
}

// --- Test 2: Network Failures ---

#[tokio::test]
async fn test_tcp_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let config = ConnectionConfig::new()
        .with("saprouter", format!("/H/127.0.0.1/S/{port}"))
        .with("ashost", "app.internal")
        .with("sysnr", "00")
        .with("client", "100")
        .with("user", "DEMO");

    let conn = Connection::new();
    let err = conn.open(&config).await.expect_err("nothing listens");
    assert_eq!(err.kind(), ErrorKind::ConnectionError);
    assert_eq!(err.key(), "RFC_COMMUNICATION_FAILURE");
    assert!(!conn.is_open());
}

#[tokio::test]
async fn test_tcp_timeout_drops_session() {
    let system = MockSystem::standard().expect("standard procedures");
    let (config, server) = start(&system).await;

    let conn = Connection::builder().timeout(Duration::from_millis(100)).build();
    conn.open(&config).await.expect("open");

    system.set_latency(Duration::from_millis(500));
    assert!(!conn.ping().await.expect("ping"));
    assert!(!conn.is_open());

    system.set_latency(Duration::ZERO);
    conn.open(&config).await.expect("reopen");
    assert!(conn.ping().await.expect("ping"));
    server.abort();
}

#[tokio::test]
async fn test_tcp_server_going_away() {
    let system = MockSystem::standard().expect("standard procedures");
    let (config, server) = start(&system).await;

    let conn = Connection::new();
    conn.open(&config).await.expect("open");
    let f = conn.lookup("RFC_PING").await.expect("lookup");

    system.set_unreachable(true);
    let err = f.invoke(&Record::new()).await.expect_err("connection dropped");
    assert_eq!(err.kind(), ErrorKind::InvocationError);
    assert_eq!(err.key(), "RFC_COMMUNICATION_FAILURE");
    assert!(!conn.is_open());
    server.abort();
}
