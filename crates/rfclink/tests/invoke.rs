//! Invocation tests: metadata, marshalling and remote outcomes.

use std::sync::Arc;

use rand::Rng;

use rfclink::CachePolicy;
use rfclink::Connection;
use rfclink::ConnectionConfig;
use rfclink::Error;
use rfclink::ErrorInfo;
use rfclink::ErrorKind;
use rfclink::MetadataCache;
use rfclink::Outcome;
use rfclink::Record;
use rfclink::Value;
use rfclink::mock::MockSystem;
use rfcwire::Direction;
use rfcwire::FieldDesc;
use rfcwire::FieldKind;
use rfcwire::Parameter;
use rfcwire::Signature;
use rfcwire::StructDesc;

fn config() -> ConnectionConfig {
    ConnectionConfig::new()
        .with("ashost", "mock.internal")
        .with("sysnr", "00")
        .with("client", "100")
        .with("user", "DEMO")
        .with("passwd", "secret")
}

async fn open(system: &MockSystem) -> Connection {
    let conn = Connection::builder().connector(system.connector()).build();
    conn.open(&config()).await.expect("open");
    conn
}

fn completed(outcome: Outcome) -> Record {
    match outcome {
        Outcome::Completed(record) => record,
        Outcome::Exception(e) => panic!("Expected completed call, got {e}"),
    }
}

fn text<'a>(record: &'a Record, name: &str) -> &'a str {
    record.get(name).and_then(Value::as_str).unwrap_or_else(|| panic!("{name} is not text"))
}

fn int(record: &Record, name: &str) -> i64 {
    record.get(name).and_then(Value::as_int).unwrap_or_else(|| panic!("{name} is not an integer"))
}

// --- Test 1: Lookup ---

#[tokio::test]
async fn test_lookup_unknown_procedure() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;

    match conn.lookup("AAAAAAAA").await {
        Err(e @ Error::ProcedureNotFound(_)) => {
            assert!(e.is_lookup_error());
            assert_eq!(e.key(), "FU_NOT_FOUND");
        },
        other => panic!("Expected ProcedureNotFound, got {other:?}"),
    }
    assert!(conn.is_open(), "an unknown name does not end the session");
    assert!(conn.metadata_cache().get("AAAAAAAA").is_none());
}

#[tokio::test]
async fn test_lookup_rfc_ping_is_usable() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;

    let ping = conn.lookup("RFC_PING").await.expect("lookup");
    assert_eq!(ping.name(), "RFC_PING");
    assert!(completed(ping.invoke(&Record::new()).await.expect("invoke")).is_empty());
}

#[tokio::test]
async fn test_lookup_failure_during_transport_is_lookup_error() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    system.set_unreachable(true);

    let err = conn.lookup("STFC_CONNECTION").await.expect_err("unreachable");
    assert_eq!(err.kind(), ErrorKind::LookupError);
    assert_eq!(err.key(), "RFC_COMMUNICATION_FAILURE");
    assert!(!conn.is_open());
}

// --- Test 2: Metadata Cache ---

#[tokio::test]
async fn test_repeated_lookup_uses_cache() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;

    let first = conn.lookup("STFC_CONNECTION").await.expect("first lookup");
    let second = conn.lookup("STFC_CONNECTION").await.expect("second lookup");
    assert_eq!(system.describe_count("STFC_CONNECTION"), 1);
    assert!(Arc::ptr_eq(first.signature(), second.signature()));

    assert!(conn.metadata_cache().invalidate("STFC_CONNECTION"));
    let third = conn.lookup("STFC_CONNECTION").await.expect("third lookup");
    assert_eq!(system.describe_count("STFC_CONNECTION"), 2);
    assert!(!Arc::ptr_eq(first.signature(), third.signature()));
    assert_eq!(first.signature(), third.signature());
}

#[tokio::test]
async fn test_cache_shared_between_connections() {
    let system = MockSystem::standard().expect("standard procedures");
    let cache = Arc::new(MetadataCache::new());
    let a = Connection::builder().connector(system.connector()).metadata_cache(cache.clone()).build();
    let b = Connection::builder().connector(system.connector()).metadata_cache(cache.clone()).build();
    a.open(&config()).await.expect("open a");
    b.open(&config()).await.expect("open b");

    a.lookup("STFC_CHANGING").await.expect("lookup a");
    b.lookup("STFC_CHANGING").await.expect("lookup b");
    assert_eq!(system.describe_count("STFC_CHANGING"), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_expiring_cache_refetches() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = Connection::builder()
        .connector(system.connector())
        .cache_policy(CachePolicy::ExpireAfter(std::time::Duration::ZERO))
        .build();
    conn.open(&config()).await.expect("open");

    conn.lookup("RFC_PING").await.expect("lookup");
    conn.lookup("RFC_PING").await.expect("lookup");
    assert_eq!(system.describe_count("RFC_PING"), 2);
}

// --- Test 3: Metadata Description ---

#[tokio::test]
async fn test_metadata_describes_signature_in_order() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_STRUCTURE").await.expect("lookup");

    let schema = f.metadata();
    assert_eq!(schema.title, "Signature of SAP RFC function STFC_STRUCTURE");
    assert_eq!(schema.properties.names().collect::<Vec<_>>(), vec![
        "IMPORTSTRUCT",
        "ECHOSTRUCT",
        "RESPTEXT",
        "RFCTABLE"
    ]);

    let json = serde_json::to_value(&schema).expect("serialise");
    assert_eq!(json["type"], "object");
    assert_eq!(json["properties"]["IMPORTSTRUCT"]["sapDirection"], "RFC_IMPORT");
    assert_eq!(json["properties"]["IMPORTSTRUCT"]["sapTypeName"], "RFCTEST");
    assert_eq!(json["properties"]["IMPORTSTRUCT"]["properties"]["RFCINT4"]["type"], "integer");
    assert_eq!(json["properties"]["RESPTEXT"]["length"], "255");
    assert_eq!(json["properties"]["RFCTABLE"]["type"], "array");
    assert_eq!(json["properties"]["RFCTABLE"]["items"]["properties"]["RFCDATE"]["sapType"], "RFCTYPE_DATE");
}

// --- Test 4: Scalars ---

#[tokio::test]
async fn test_connection_echo_pads_and_keeps_unicode() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_CONNECTION").await.expect("lookup");

    let results = completed(f.invoke(&Record::new().with("REQUTEXT", "Grüße, 世界")).await.expect("invoke"));
    let echo = text(&results, "ECHOTEXT");
    assert_eq!(echo.chars().count(), 255);
    assert_eq!(echo.trim_end(), "Grüße, 世界");
    assert!(text(&results, "RESPTEXT").contains("MCK"));
    assert!(!results.contains("REQUTEXT"), "import-only parameters are not returned");
}

#[tokio::test]
async fn test_changing_counter_increments() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_CHANGING").await.expect("lookup");

    let mut rng = rand::thread_rng();
    let mut cases: Vec<(i64, i64)> = vec![(0, 0), (0, -1), (1, i32::MIN as i64), (0, i32::MAX as i64 - 1)];
    for _ in 0..32 {
        cases.push((rng.gen_range(-1_000_000..1_000_000), rng.gen_range(-1_000_000..1_000_000)));
    }

    for (start, counter) in cases {
        let params = Record::new().with("START_VALUE", start).with("COUNTER", counter);
        let results = completed(f.invoke(&params).await.expect("invoke"));
        assert_eq!(int(&results, "COUNTER"), counter + 1);
        assert_eq!(int(&results, "RESULT"), start + counter);
        assert_eq!(results.len(), 2);
    }
}

#[tokio::test]
async fn test_xstring_rejects_text_before_sending() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_XSTRING").await.expect("lookup");

    match f.invoke(&Record::new().with("INPUT", "not bytes")).await {
        Err(e @ Error::Encode { .. }) => {
            assert_eq!(e.kind(), ErrorKind::EncodeError);
            assert!(e.to_string().contains("unexpected type"), "{e}");
        },
        other => panic!("Expected EncodeError, got {other:?}"),
    }
    assert_eq!(system.invoke_count(), 0);
    assert!(conn.is_open());

    let payload = vec![0x00u8, 0xFF, 0x10, 0x00];
    let results = completed(f.invoke(&Record::new().with("INPUT", payload.clone())).await.expect("invoke"));
    assert_eq!(results.get("OUTPUT"), Some(&Value::Bytes(payload)));
    assert_eq!(int(&results, "LENGTH"), 4);
}

#[tokio::test]
async fn test_invalid_parameters_never_reach_the_system() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_CONNECTION").await.expect("lookup");

    let cases = vec![
        Record::new().with("NOPE", "x"),
        Record::new().with("REQUTEXT", "x".repeat(256)),
        Record::new().with("REQUTEXT", 42i64),
    ];
    for params in cases {
        let err = f.invoke(&params).await.expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::EncodeError);
        assert_eq!(err.key(), "RFC_CONVERSION_FAILURE");
    }
    assert_eq!(system.invoke_count(), 0);
}

#[tokio::test]
async fn test_encode_error_precedes_session_check() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_XSTRING").await.expect("lookup");
    conn.close().await;

    let err = f.invoke(&Record::new().with("INPUT", "text")).await.expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::EncodeError);
}

// --- Test 5: Structures And Tables ---

fn abc() -> Arc<StructDesc> {
    Arc::new(
        StructDesc::new("ZABC", vec![
            FieldDesc::new("A", FieldKind::Char(1)),
            FieldDesc::new("B", FieldKind::Float),
            FieldDesc::new("C", FieldKind::Int4),
        ])
        .expect("struct"),
    )
}

fn register_echo_abc(system: &MockSystem) {
    let signature = Signature::new("Z_ECHO_ABC", vec![
        Parameter::new("IN", Direction::Import, FieldKind::Structure(abc())),
        Parameter::new("OUT", Direction::Export, FieldKind::Structure(abc())),
        Parameter::new("ROWS", Direction::Tables, FieldKind::Table(abc())),
    ])
    .expect("signature");

    system.register(signature, |input| {
        let mut output = Record::new();
        if let Some(value) = input.get("IN") {
            output.insert("OUT", value.clone());
        }
        if let Some(rows) = input.get("ROWS") {
            output.insert("ROWS", rows.clone());
        }
        Ok(output)
    });
}

#[tokio::test]
async fn test_partial_structure_decodes_with_defaults() {
    let system = MockSystem::standard().expect("standard procedures");
    register_echo_abc(&system);
    let conn = open(&system).await;
    let f = conn.lookup("Z_ECHO_ABC").await.expect("lookup");

    let full = Record::new().with("A", "y").with("B", 1.5).with("C", 7i64);
    let params = Record::new()
        .with("IN", Record::new().with("A", "x").with("B", 3.14))
        .with("ROWS", vec![Record::new(), full.clone()]);

    let results = completed(f.invoke(&params).await.expect("invoke"));
    let out = results.get("OUT").and_then(Value::as_struct).expect("OUT structure");
    assert_eq!(out.get("A"), Some(&Value::from("x")));
    assert_eq!(out.get("B"), Some(&Value::Float(3.14)));
    assert_eq!(out.get("C"), Some(&Value::Int(0)));

    let rows = results.get("ROWS").and_then(Value::as_table).expect("ROWS table");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], Record::new().with("A", " ").with("B", 0.0).with("C", 0i64));
    assert_eq!(rows[1], full);
}

#[tokio::test]
async fn test_structure_procedure_round_trip() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_STRUCTURE").await.expect("lookup");

    let row = Record::new()
        .with("RFCFLOAT", 1.25)
        .with("RFCCHAR1", "A")
        .with("RFCINT2", -300i64)
        .with("RFCINT1", 100i64)
        .with("RFCINT4", 123456i64)
        .with("RFCHEX3", vec![0xABu8, 0xCD])
        .with("RFCTIME", "235959")
        .with("RFCDATE", "20240229");
    let params = Record::new().with("IMPORTSTRUCT", row.clone()).with("RFCTABLE", Vec::<Record>::new());

    let results = completed(f.invoke(&params).await.expect("invoke"));
    let echo = results.get("ECHOSTRUCT").and_then(Value::as_struct).expect("ECHOSTRUCT");
    assert_eq!(echo.len(), 12, "every declared field is present");
    assert_eq!(echo.get("RFCINT4"), Some(&Value::Int(123456)));
    assert_eq!(echo.get("RFCHEX3"), Some(&Value::Bytes(vec![0xAB, 0xCD, 0x00])));
    assert_eq!(echo.get("RFCICHAR4"), Some(&Value::from("    ")));
    assert_eq!(echo.get("RFCDATE"), Some(&Value::from("20240229")));

    assert_eq!(results.get("RFCTABLE").and_then(Value::as_table).map(<[Record]>::len), Some(0));
    assert_eq!(text(&results, "RESPTEXT").trim_end(), "0 rows received");
}

// --- Test 6: Remote Outcomes ---

#[tokio::test]
async fn test_application_exception_is_an_outcome() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("RFC_RAISE_ERROR").await.expect("lookup");

    let outcome = f.invoke(&Record::new()).await.expect("call completes");
    assert!(outcome.is_exception());
    let exception = outcome.exception().expect("exception");
    assert_eq!(exception.exception_type, "E");
    assert_eq!(exception.key, "EXAMPLE");

    let warning = f.invoke(&Record::new().with("MESSAGETYPE", "W")).await.expect("call completes");
    assert_eq!(warning.into_result().expect_err("exception").exception_type, "W");
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_runtime_failure_is_invocation_error() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("RFC_RAISE_ERROR").await.expect("lookup");

    match f.invoke(&Record::new().with("METHOD", 1i64)).await {
        Err(e @ Error::Invocation(_)) => assert_eq!(e.key(), "COMPUTE_INT_ZERODIVIDE"),
        other => panic!("Expected InvocationError, got {other:?}"),
    }
    assert!(conn.is_open(), "a runtime failure keeps the session");

    let quiet = completed(f.invoke(&Record::new().with("METHOD", 9i64)).await.expect("invoke"));
    assert_eq!(text(&quiet, "MESSAGE").trim_end(), "No error raised");
}

#[tokio::test]
async fn test_handler_errors_keep_their_diagnostics() {
    let system = MockSystem::standard().expect("standard procedures");
    let signature = Signature::new("Z_FAIL", vec![Parameter::new("X", Direction::Import, FieldKind::Int4)])
        .expect("signature");
    system.register(signature, |_| {
        Err(ErrorInfo::application("NOT_ALLOWED", "A", "Operation not allowed")
            .with_abap_message("ZMSG", "A", "001", ["one", "two", "", ""]))
    });
    let conn = open(&system).await;
    let f = conn.lookup("Z_FAIL").await.expect("lookup");

    let exception = f.invoke(&Record::new()).await.expect("call completes").into_result().expect_err("exception");
    assert_eq!(exception.key, "NOT_ALLOWED");
    assert_eq!(exception.exception_type, "A");
    assert_eq!(exception.info.class, "ZMSG");
    assert_eq!(exception.info.msgv2, "two");
}

#[tokio::test]
async fn test_unregistered_procedure_fails_invocation() {
    let system = MockSystem::standard().expect("standard procedures");
    let conn = open(&system).await;
    let f = conn.lookup("STFC_CONNECTION").await.expect("lookup");
    assert!(system.unregister("STFC_CONNECTION"));

    let err = f.invoke(&Record::new()).await.expect_err("gone");
    assert_eq!(err.kind(), ErrorKind::InvocationError);
    assert_eq!(err.key(), "FU_NOT_FOUND");
}
