//! Variable retrieval against a simulated Conjur secrets endpoint.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use conjur_agent_core::{AccessTokenStore, ConjurClient, Error, FileTokenStore, VariableSource};

async fn secrets_endpoint(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if n == 0 || buf.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len(),
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        String::from_utf8_lossy(&buf).into_owned()
    });
    (format!("http://{addr}"), handle)
}

fn store_with_artifact(dir: &tempfile::TempDir, artifact: &[u8]) -> Arc<FileTokenStore> {
    let store = Arc::new(FileTokenStore::new(dir.path().join("access-token")));
    store.write(artifact).unwrap();
    store
}

#[tokio::test]
async fn fetch_authorizes_with_the_current_session_artifact() {
    let (base_url, server) = secrets_endpoint("200 OK", "s3cr3t-value").await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_artifact(&dir, b"session-artifact");

    let client = ConjurClient::new(reqwest::Client::new(), &base_url, "acme", store).unwrap();
    let value = client.fetch_variable("backend/db/password").await.unwrap();
    assert_eq!(value.as_slice(), b"s3cr3t-value");

    let request = server.await.unwrap();
    assert!(
        request.starts_with("GET /secrets/acme/variable/backend%2Fdb%2Fpassword HTTP/1.1"),
        "unexpected request line: {request}"
    );
    let expected_header = format!(
        "authorization: Token token=\"{}\"",
        STANDARD.encode(b"session-artifact")
    );
    assert!(
        request.to_ascii_lowercase().contains(&expected_header.to_ascii_lowercase()),
        "missing authorization header: {request}"
    );
}

#[tokio::test]
async fn non_success_names_the_variable_and_carries_the_status() {
    let (base_url, _server) = secrets_endpoint("403 Forbidden", "not entitled").await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_artifact(&dir, b"session-artifact");

    let client = ConjurClient::new(reqwest::Client::new(), &base_url, "acme", store).unwrap();
    let err = client.fetch_variable("backend/db/password").await.unwrap_err();

    match err {
        Error::VariableFetchFailed { variable, reason } => {
            assert_eq!(variable, "backend/db/password");
            assert!(reason.contains("403"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_artifact_fails_before_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("access-token")));

    // Port 9 is the discard service; nothing should ever be sent to it.
    let client =
        ConjurClient::new(reqwest::Client::new(), "http://127.0.0.1:9", "acme", store).unwrap();
    let err = client.fetch_variable("var1").await.unwrap_err();
    assert!(matches!(err, Error::TokenUnavailable(_)));
}
