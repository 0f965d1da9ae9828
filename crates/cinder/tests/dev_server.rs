//! Integration tests for the development server.
//!
//! A real axum server is started from a stream of build results; requests go
//! over plain TCP and notifications are read from the client hub.

use cinder::dev::{
    json_lines, AxumServerFactory, BuildResult, ClientHub, DevSession, FullResult,
    IncrementalResult, OutputFile, OutputKind,
};
use cinder::DevError;
use cinder_config::{DevSettings, ServeConfig};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};
use tokio_stream::wrappers::ReceiverStream;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn http_get(port: u16, path: &str) -> String {
    for _ in 0..100 {
        if let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)).await {
            let request = format!(
                "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
                path
            );
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).await.unwrap();
            return response;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("server on port {} never accepted a connection", port);
}

fn serve_config(port: u16) -> ServeConfig {
    ServeConfig {
        port,
        ..ServeConfig::default()
    }
}

#[tokio::test]
async fn test_session_serves_and_notifies() {
    let port = free_port();
    let hub = ClientHub::new();
    let factory = Arc::new(AxumServerFactory::new(serve_config(port), hub.clone()));
    let session = DevSession::new(DevSettings::default(), hub.clone(), factory);

    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(session.run(ReceiverStream::new(rx)));

    tx.send(BuildResult::Full(FullResult {
        files: vec![
            OutputFile::bundled("index.html", "<html><body>app</body></html>", OutputKind::Browser),
            OutputFile::bundled("main.js", "console.log(1)", OutputKind::Browser),
        ],
        ..FullResult::default()
    }))
    .await
    .unwrap();

    let index = http_get(port, "/").await;
    assert!(index.starts_with("HTTP/1.1 200"));
    assert!(index.contains("/__cinder_client__.js"));

    let (_id, mut client) = hub.register_client();
    let connected = client.recv().await.unwrap();
    assert!(connected.contains("connected"));

    tx.send(BuildResult::Incremental(IncrementalResult {
        modified: vec!["/main.js".into()],
        files: vec![OutputFile::bundled("main.js", "console.log(2)", OutputKind::Browser)],
        ..IncrementalResult::default()
    }))
    .await
    .unwrap();

    let message = timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("no notification after rebuild")
        .unwrap();
    assert_eq!(message, r#"{"type":"full-reload","path":"*"}"#);

    let script = http_get(port, "/main.js").await;
    assert!(script.contains("console.log(2)"));

    drop(tx);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_out_of_order_results_abort_the_session() {
    let hub = ClientHub::new();
    let factory = Arc::new(AxumServerFactory::new(serve_config(0), hub.clone()));
    let session = DevSession::new(DevSettings::default(), hub, factory);

    let input = concat!(
        r#"{"kind":"incremental","modified":["/main.js"],"files":[{"path":"main.js","contents":"1"}]}"#,
        "\n",
    );

    let err = session.run(json_lines(input.as_bytes())).await.unwrap_err();
    assert!(matches!(err, DevError::Protocol(_)));
}

#[tokio::test]
async fn test_stream_end_stops_the_server() {
    let port = free_port();
    let hub = ClientHub::new();
    let factory = Arc::new(AxumServerFactory::new(serve_config(port), hub.clone()));
    let session = DevSession::new(DevSettings::default(), hub, factory);

    let input = concat!(
        r#"{"kind":"full","files":[{"path":"index.html","contents":"<html></html>","kind":"browser"}]}"#,
        "\n",
    );
    session.run(json_lines(input.as_bytes())).await.unwrap();

    sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}
