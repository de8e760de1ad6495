//! reqwest transport against a raw TCP mock server, plus end-to-end
//! dispatcher runs over real HTTP.

use std::time::Duration;

use periwatch::config::PollConfig;
use periwatch::dispatch::async_poll::{MonitorOutcome, fetch_status};
use periwatch::dispatch::dispatcher::Dispatcher;
use periwatch::dispatch::http::HttpApi;
use periwatch::dispatch::{GenerationOutcome, GenerationRequest, PdfApi};
use periwatch::error::PeriwatchError;
use periwatch::progress;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Helper: bind a TCP listener on localhost and return (listener, port).
async fn mock_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Read one full HTTP request (headers plus Content-Length body).
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|line| {
                    let (k, v) = line.split_once(':')?;
                    if k.eq_ignore_ascii_case("content-length") {
                        v.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn http_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (k, v) in headers {
        out.push_str(&format!("{k}: {v}\r\n"));
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

fn json_response(status_line: &str, body: serde_json::Value) -> Vec<u8> {
    http_response(
        status_line,
        &[("Content-Type", "application/json")],
        body.to_string().as_bytes(),
    )
}

/// Serve the given responses to consecutive connections. Resolves with the
/// captured requests.
fn serve(listener: TcpListener, responses: Vec<Vec<u8>>) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.ok();
        }
        requests
    })
}

fn api(port: u16) -> HttpApi {
    HttpApi::new(
        &format!("http://127.0.0.1:{port}/"),
        "secret-token",
        Duration::from_secs(5),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_sends_query_and_bearer_token() {
    let (listener, port) = mock_listener().await;
    let server = serve(
        listener,
        vec![json_response(
            "202 Accepted",
            serde_json::json!({"task_id": "t1", "message": "queued"}),
        )],
    );

    let request = GenerationRequest::new("a@b.com")
        .with_title("Q3")
        .with_company("Bank Central Asia");
    let reply = api(port).generate(&request).await.unwrap();

    assert_eq!(reply.status, 202);
    let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body["task_id"], "t1");

    let requests = server.await.unwrap();
    let raw = requests[0].to_lowercase();
    assert!(raw.starts_with("get /api/generate-pdf/?"), "got: {raw}");
    assert!(raw.contains("title=q3"));
    assert!(raw.contains("email=a%40b.com"));
    assert!(raw.contains("timeout=30"));
    assert!(raw.contains("company=bank+central+asia"));
    assert!(!raw.contains("ticker="));
    assert!(raw.contains("authorization: bearer secret-token"));
}

#[tokio::test]
async fn task_status_hits_task_path() {
    let (listener, port) = mock_listener().await;
    let server = serve(
        listener,
        vec![json_response("200 OK", serde_json::json!({"status": "running"}))],
    );

    let reply = api(port).task_status("t1").await.unwrap();
    assert!(reply.is_success());

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("GET /api/task-status/t1/ HTTP/1.1"));
}

#[tokio::test]
async fn cleanup_posts_hours_as_json() {
    let (listener, port) = mock_listener().await;
    let server = serve(
        listener,
        vec![json_response(
            "200 OK",
            serde_json::json!({"message": "Cleaned up 2 old tasks"}),
        )],
    );

    let reply = api(port).cleanup_tasks(6).await.unwrap();
    assert_eq!(reply.status, 200);

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("POST /api/cleanup-tasks/ HTTP/1.1"));
    assert!(requests[0].contains(r#"{"hours":6}"#));
    assert!(requests[0].to_lowercase().contains("content-type: application/json"));
}

#[tokio::test]
async fn response_headers_are_exposed() {
    let (listener, port) = mock_listener().await;
    let server = serve(
        listener,
        vec![http_response(
            "200 OK",
            &[("X-PDF-Status", "completed"), ("X-Task-ID", "t5")],
            b"%PDF",
        )],
    );

    let reply = api(port).generate(&GenerationRequest::new("a@b.com")).await.unwrap();
    assert_eq!(reply.header("X-PDF-Status"), Some("completed"));
    assert_eq!(reply.header("x-task-id"), Some("t5"));
    assert_eq!(reply.body, b"%PDF");

    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Transport failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_server_hits_request_deadline() {
    let (listener, port) = mock_listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = read_request(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let api = HttpApi::new(
        &format!("http://127.0.0.1:{port}"),
        "t",
        Duration::from_millis(300),
    )
    .unwrap();

    let start = std::time::Instant::now();
    let err = api.task_status("t1").await.unwrap_err();
    assert!(matches!(err, PeriwatchError::Timeout(_)), "got {err:?}");
    assert!(start.elapsed() < Duration::from_secs(5));

    let err = fetch_status(&api, "t1").await;
    assert!(matches!(
        err,
        Err(PeriwatchError::StatusQuery { status: None, .. })
    ));

    server.abort();
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let (listener, port) = mock_listener().await;
    drop(listener);

    let err = api(port).task_status("t1").await.unwrap_err();
    assert!(matches!(err, PeriwatchError::Transport(_)), "got {err:?}");
}

// ---------------------------------------------------------------------------
// End to end through the dispatcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_document_over_http() {
    let (listener, port) = mock_listener().await;
    let server = serve(
        listener,
        vec![http_response(
            "200 OK",
            &[
                ("Content-Type", "application/pdf"),
                ("X-PDF-Status", "completed"),
                ("X-Task-ID", "t7"),
                ("X-Message", "PDF generated successfully"),
            ],
            b"%PDF-1.7 body",
        )],
    );

    let dispatcher = Dispatcher::new(api(port), PollConfig::default());
    let (tx, mut rx) = progress::channel();
    let submission = dispatcher
        .submit(&GenerationRequest::new("a@b.com").with_title("Q3"), &tx)
        .await
        .unwrap();

    match submission.outcome {
        GenerationOutcome::Synchronous(doc) => {
            assert_eq!(doc.download_name, "Q3.pdf");
            assert_eq!(doc.message, "PDF generated successfully");
            assert_eq!(doc.document, b"%PDF-1.7 body");
        }
        other => panic!("expected Synchronous, got {other:?}"),
    }
    assert!(submission.monitor.is_none());
    assert_eq!(rx.drain().last().unwrap().percent, 100);

    server.await.unwrap();
}

#[tokio::test]
async fn partial_document_then_background_completion_over_http() {
    let (listener, port) = mock_listener().await;
    let server = serve(
        listener,
        vec![
            http_response(
                "200 OK",
                &[
                    ("X-PDF-Status", "partial"),
                    ("X-Task-ID", "t8"),
                    ("X-Message", "Partial PDF, full version will be emailed"),
                ],
                b"%PDF partial",
            ),
            json_response("200 OK", serde_json::json!({"status": "completed_and_sent"})),
        ],
    );

    let dispatcher = Dispatcher::new(
        api(port),
        PollConfig {
            check_limit: 3,
            interval: Duration::from_millis(50),
        },
    );
    let (tx, mut rx) = progress::channel();
    let submission = dispatcher
        .submit(&GenerationRequest::new("a@b.com").with_title("Q3"), &tx)
        .await
        .unwrap();

    assert_eq!(
        submission.outcome.document().map(<[u8]>::len),
        Some(b"%PDF partial".len())
    );
    let outcome = submission.monitor.unwrap().join().await.unwrap();
    assert!(matches!(outcome, MonitorOutcome::Completed(_)));

    let requests = server.await.unwrap();
    assert!(requests[1].starts_with("GET /api/task-status/t8/"));

    let last = rx.drain().pop().unwrap();
    assert_eq!(last.message, "PDF completed and sent to email");
}
