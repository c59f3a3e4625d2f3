//! Sink and tracing output of a connection.

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value as Json;
use tracing_test::traced_test;

use rfclink::Connection;
use rfclink::ConnectionConfig;
use rfclink::Level;
use rfclink::LogSink;
use rfclink::Record;
use rfclink::TracingSink;
use rfclink::mock::MockSystem;

fn config() -> ConnectionConfig {
    ConnectionConfig::new()
        .with("ashost", "mock.internal")
        .with("sysnr", "00")
        .with("client", "100")
        .with("user", "DEMO")
}

#[derive(Clone, Default)]
struct Collector {
    entries: Arc<Mutex<Vec<(Level, String, Option<Json>)>>>,
}

impl LogSink for Collector {
    fn log(&self, level: Level, message: &str, meta: Option<&Json>) {
        self.entries.lock().unwrap().push((level, message.to_string(), meta.cloned()));
    }
}

#[tokio::test]
async fn test_sink_shared_by_function_handles() {
    let system = MockSystem::standard().expect("standard procedures");
    let sink = Collector::default();
    let conn = Connection::builder().connector(system.connector()).logger(sink.clone()).build();

    conn.open(&config()).await.expect("open");
    let f = conn.lookup("RFC_RAISE_ERROR").await.expect("lookup");
    f.invoke(&Record::new()).await.expect("invoke");

    let entries = sink.entries.lock().unwrap();
    let (level, message, meta) = entries.last().expect("invoke entry");
    assert_eq!(*level, Level::Warn);
    assert_eq!(message, "RFC API call failed");
    let meta = meta.as_ref().expect("meta");
    assert_eq!(meta["call"], "Invoke");
    assert_eq!(meta["name"], "RFC_RAISE_ERROR");
    assert_eq!(meta["key"], "EXAMPLE");
}

#[tokio::test]
async fn test_failed_open_is_reported() {
    let system = MockSystem::standard().expect("standard procedures");
    system.set_unreachable(true);
    let sink = Collector::default();
    let conn = Connection::builder().connector(system.connector()).logger(sink.clone()).build();

    assert!(conn.open(&config()).await.is_err());
    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    let meta = entries[0].2.as_ref().expect("meta");
    assert_eq!(meta["call"], "Open");
    assert_eq!(meta["key"], "RFC_COMMUNICATION_FAILURE");
    assert_eq!(meta["code"], 1);
}

#[tokio::test]
#[traced_test]
async fn test_tracing_sink_forwards_calls() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = Connection::builder().connector(system.connector()).logger(TracingSink).build();

    conn.open(&config()).await.expect("open");
    assert!(conn.ping().await.expect("ping"));

    assert!(logs_contain("RFC API call"));
    assert!(logs_contain(r#""call":"Ping""#));
}

#[tokio::test]
#[traced_test]
async fn test_teardown_is_logged() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = Connection::builder().connector(system.connector()).build();
    conn.open(&config()).await.expect("open");

    system.set_unreachable(true);
    assert!(!conn.ping().await.expect("ping"));
    assert!(logs_contain("session torn down"));
}
