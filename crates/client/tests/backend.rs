//! Request shapes of [`HttpBackend`] against a one-shot local HTTP server.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use txlens_client::{BackendApi, Error, HttpBackend, LevelSpelling, Scenario};
use txlens_core::IsolationLevel;

struct Request {
    head: String,
    body: String,
}

impl Request {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map_or(0, |(_, value)| value.trim().parse().unwrap())
}

/// Accept one connection, answer it with `status` and `body`, and hand back
/// what the client sent.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0_u8; 1024];
        let request = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client hung up mid-request");
            received.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&received).into_owned();
            if let Some((head, rest)) = text.split_once("\r\n\r\n") {
                if rest.len() >= content_length(head) {
                    break Request {
                        head: head.to_string(),
                        body: rest.to_string(),
                    };
                }
            }
        };
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
             content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });
    (base_url, server)
}

fn backend(base_url: &str) -> HttpBackend {
    HttpBackend::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn isolation_level_is_posted_hyphenated() {
    let (base_url, server) = serve_once("200 OK", "{}").await;

    backend(&base_url)
        .set_isolation_level(IsolationLevel::ReadUncommitted)
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert_eq!(request.request_line(), "POST /api/isolation-level HTTP/1.1");
    assert_eq!(request.json(), json!({"level": "READ-UNCOMMITTED"}));
}

#[tokio::test]
async fn sql_spelling_is_opt_in() {
    let (base_url, server) = serve_once("200 OK", "{}").await;

    backend(&base_url)
        .with_level_spelling(LevelSpelling::Sql)
        .set_isolation_level(IsolationLevel::RepeatableRead)
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert_eq!(request.json(), json!({"level": "REPEATABLE READ"}));
}

#[tokio::test]
async fn rejected_level_change_reports_status() {
    let (base_url, server) = serve_once("400 Bad Request", r#"{"error":"bad level"}"#).await;

    let err = backend(&base_url)
        .set_isolation_level(IsolationLevel::Serializable)
        .await
        .unwrap_err();

    match err {
        Error::Status { endpoint, status } => {
            assert_eq!(status, 400);
            assert!(endpoint.ends_with("/api/isolation-level"));
        }
        other => panic!("expected a status error, got {other}"),
    }
    assert_eq!(server.await.unwrap().json(), json!({"level": "SERIALIZABLE"}));
}

#[tokio::test]
async fn reported_isolation_level_is_parsed() {
    let (base_url, server) =
        serve_once("200 OK", r#"{"isolation_level":"REPEATABLE-READ"}"#).await;

    let level = backend(&base_url).fetch_isolation_level().await.unwrap();

    assert_eq!(level, IsolationLevel::RepeatableRead);
    let request = server.await.unwrap();
    assert_eq!(request.request_line(), "GET /api/isolation-level HTTP/1.1");
}

#[tokio::test]
async fn scenario_body_is_posted() {
    let (base_url, server) = serve_once("200 OK", r#"{"status":"started"}"#).await;

    backend(&base_url)
        .run_scenario(&Scenario::DirtyRead {
            user_id: 1,
            amount: 500.0,
        })
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert_eq!(
        request.request_line(),
        "POST /api/scenarios/dirty-read HTTP/1.1"
    );
    assert_eq!(request.json(), json!({"user_id": 1, "amount": 500.0}));
}
