//! Dispatcher behavior over an in-memory pipe: framed requests in, framed
//! responses out, one at a time, against the embedded SQLite driver.

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use sqlbridge::protocol::{encode_frame, shutdown_frame};
use sqlbridge::worker::{Dispatcher, SqliteDriver};

async fn write_frame(io: &mut DuplexStream, payload: &[u8]) {
    io.write_all(&encode_frame(payload)).await.unwrap();
    io.flush().await.unwrap();
}

async fn read_response(io: &mut DuplexStream) -> Value {
    let mut prefix = [0u8; 4];
    io.read_exact(&mut prefix).await.unwrap();
    let len = u32::from_le_bytes(prefix) as usize;
    assert!(len > 0, "worker must not emit zero-length frames");
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await.unwrap();
    serde_json::from_slice(&payload).unwrap()
}

fn spawn_worker(
) -> (DuplexStream, tokio::task::JoinHandle<Result<(), sqlbridge::worker::ServeError>>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(async move {
        let (read, write) = tokio::io::split(server_io);
        let mut dispatcher = Dispatcher::new(SqliteDriver);
        dispatcher.serve(read, write).await
    });
    (client_io, server)
}

async fn open_memory(io: &mut DuplexStream, idx: u64) {
    let open = json!({
        "idx": idx,
        "cmd": "open",
        "params": [":memory:", {"stringifyFetches": false}]
    });
    write_frame(io, open.to_string().as_bytes()).await;
    let response = read_response(io).await;
    assert_eq!(response["idx"], json!(idx));
    assert_eq!(response["result"], json!(true));
}

#[tokio::test]
async fn test_full_command_cycle() {
    let (mut io, server) = spawn_worker();
    open_memory(&mut io, 1).await;

    let create = json!({
        "idx": 2,
        "cmd": "exec",
        "params": ["CREATE TABLE t (id INTEGER, name TEXT)", []]
    });
    write_frame(&mut io, create.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    assert_eq!(response["result"]["rowCount"], json!(0));

    let insert = json!({
        "idx": 3,
        "cmd": "exec",
        "params": ["INSERT INTO t VALUES (?, ?), (?, ?)", [1, "a", 2, "b"]]
    });
    write_frame(&mut io, insert.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    assert_eq!(response["result"]["rowCount"], json!(2));

    let all = json!({
        "idx": 4,
        "cmd": "queryAll",
        "params": ["SELECT id, name FROM t ORDER BY id", []]
    });
    write_frame(&mut io, all.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    assert_eq!(
        response["result"],
        json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])
    );

    let one = json!({
        "idx": 5,
        "cmd": "queryOne",
        "params": ["SELECT name FROM t WHERE id = ?", [2]]
    });
    write_frame(&mut io, one.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    assert_eq!(response["result"], json!({"name": "b"}));

    let none = json!({
        "idx": 6,
        "cmd": "queryOne",
        "params": ["SELECT name FROM t WHERE id = ?", [99]]
    });
    write_frame(&mut io, none.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    assert_eq!(response["result"], json!(null));

    io.write_all(&shutdown_frame()).await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_command_is_answered_not_fatal() {
    let (mut io, server) = spawn_worker();
    open_memory(&mut io, 1).await;

    write_frame(
        &mut io,
        br#"{"idx":2,"cmd":"shrug","params":[]}"#,
    )
    .await;
    let response = read_response(&mut io).await;
    assert_eq!(response["idx"], json!(2));
    assert_eq!(response["error"]["type"], json!("UnknownCommand"));

    // Connection is still usable afterwards.
    let probe = json!({"idx": 3, "cmd": "queryOne", "params": ["SELECT 1 AS one", []]});
    write_frame(&mut io, probe.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    assert_eq!(response["result"], json!({"one": 1}));

    io.write_all(&shutdown_frame()).await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_data_command_before_open_fails() {
    let (mut io, server) = spawn_worker();

    let query = json!({"idx": 1, "cmd": "queryAll", "params": ["SELECT 1", []]});
    write_frame(&mut io, query.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    assert_eq!(response["error"]["type"], json!("InvalidRequest"));
    assert_eq!(response["error"]["message"], json!("database not connected"));

    io.write_all(&shutdown_frame()).await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_driver_error_carries_diagnostics() {
    let (mut io, server) = spawn_worker();
    open_memory(&mut io, 1).await;

    let bad = json!({"idx": 2, "cmd": "exec", "params": ["SELECT * FROM nope", []]});
    write_frame(&mut io, bad.to_string().as_bytes()).await;
    let response = read_response(&mut io).await;
    let error = &response["error"];
    assert_eq!(error["type"], json!("DriverError"));
    assert_eq!(error["sqlState"], json!("HY000"));
    assert!(error["driverCode"].is_string());
    assert!(error["message"].as_str().unwrap().contains("nope"));

    io.write_all(&shutdown_frame()).await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_zero_frame_ends_loop_without_response() {
    let (mut io, server) = spawn_worker();

    io.write_all(&shutdown_frame()).await.unwrap();
    io.flush().await.unwrap();
    server.await.unwrap().unwrap();

    // Nothing was emitted on the response stream.
    let mut probe = [0u8; 1];
    match io.read(&mut probe).await {
        Ok(0) => {}
        Ok(n) => panic!("unexpected {} response bytes after shutdown", n),
        Err(_) => {}
    }
}

#[tokio::test]
async fn test_malformed_envelope_is_connection_fatal() {
    let (mut io, server) = spawn_worker();

    write_frame(&mut io, b"this is not json").await;
    let result = server.await.unwrap();
    assert!(matches!(
        result,
        Err(sqlbridge::worker::ServeError::Decode(_))
    ));
}

#[tokio::test]
async fn test_batched_requests_are_served_in_arrival_order() {
    let (mut io, server) = spawn_worker();

    // Push open plus three queries in one write; replies must come back in
    // the same order, one response frame per request.
    let mut batch = Vec::new();
    let open = json!({"idx": 1, "cmd": "open", "params": [":memory:"]});
    batch.extend_from_slice(&encode_frame(open.to_string().as_bytes()));
    for idx in 2..=4u64 {
        let query = json!({
            "idx": idx,
            "cmd": "queryOne",
            "params": [format!("SELECT {} AS n", idx), []]
        });
        batch.extend_from_slice(&encode_frame(query.to_string().as_bytes()));
    }
    io.write_all(&batch).await.unwrap();
    io.flush().await.unwrap();

    assert_eq!(read_response(&mut io).await["idx"], json!(1));
    for idx in 2..=4u64 {
        let response = read_response(&mut io).await;
        assert_eq!(response["idx"], json!(idx));
        assert_eq!(response["result"]["n"], json!(idx));
    }

    io.write_all(&shutdown_frame()).await.unwrap();
    server.await.unwrap().unwrap();
}
