//! Exchanges over synthetic, non-network streams.

use std::sync::Arc;

use http::{Method, Version};
use parking_lot::Mutex;
use patchcord::{Client, ConnectionBroker, ConnectionRequest, SyntheticHandle, SyntheticStream};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A broker that resolves every dial with a fresh synthetic stream, parking
/// the scripting handle where the test can pick it up.
fn synthetic_broker(slot: Arc<Mutex<Option<SyntheticHandle>>>) -> ConnectionBroker {
    ConnectionBroker::new(move |_request, _options, completer| {
        let (stream, handle) = SyntheticStream::new(4096);
        *slot.lock() = Some(handle);
        completer.resolve(stream);
    })
}

async fn take_handle(slot: &Mutex<Option<SyntheticHandle>>) -> SyntheticHandle {
    loop {
        if let Some(handle) = slot.lock().take() {
            return handle;
        }
        tokio::task::yield_now().await;
    }
}

/// Read from the handle until the collected bytes contain `needle`.
async fn read_until(handle: &mut SyntheticHandle, needle: &[u8]) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut chunk = [0u8; 1024];
    while !collected
        .windows(needle.len())
        .any(|window| window == needle)
    {
        let n = handle.read(&mut chunk).await.expect("stream open");
        assert!(n > 0, "stream ended before {needle:?}");
        collected.extend_from_slice(&chunk[..n]);
    }
    collected
}

#[tokio::test]
async fn a_prerecorded_response_replays_through_the_stream() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let slot = Arc::new(Mutex::new(None));
    let client = Client::new(synthetic_broker(slot.clone()));
    let request = ConnectionRequest::new(Method::GET, "http://127.0.0.1/".parse()?)?;

    let script = async {
        // emit after the current turn, the way a socket would
        tokio::task::yield_now().await;
        let mut handle = take_handle(&slot).await;
        handle
            .emit(b"HTTP/0.9 111\r\nFoo: bar\r\nSet-Cookie: 1\r\nSet-Cookie: 2\r\n\r\n")
            .await
            .expect("emit");
        handle.finish().await.expect("finish");
    };

    let (response, ()) = tokio::join!(client.request(request), script);
    let response = response?;

    assert_eq!(response.version(), Version::HTTP_09);
    assert_eq!(response.status().as_u16(), 111);
    assert_eq!(response.headers().get("foo").unwrap(), "bar");
    let cookies: Vec<_> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|value| value.to_str().unwrap())
        .collect();
    assert_eq!(cookies, ["1", "2"]);
    assert!(response.body().is_empty());
    Ok(())
}

#[tokio::test]
async fn the_request_reaches_the_stream_with_connection_close() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let slot = Arc::new(Mutex::new(None));
    let client = Client::new(synthetic_broker(slot.clone()));
    let request = ConnectionRequest::get("http://127.0.0.1/foo".parse()?)?;

    let script = async {
        let mut handle = take_handle(&slot).await;
        let written = read_until(&mut handle, b"\r\n\r\n").await;
        let written = String::from_utf8(written).expect("ascii head");

        assert!(written.starts_with("GET /foo HTTP/1.1\r\n"));
        let lower = written.to_ascii_lowercase();
        assert!(lower.contains("\r\nconnection: close\r\n"));
        assert!(lower.contains("\r\nhost: 127.0.0.1\r\n"));

        handle
            .emit(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .expect("emit");
        handle.finish().await.expect("finish");
    };

    let (response, ()) = tokio::join!(client.request(request), script);
    assert_eq!(response?.status(), http::StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn a_request_body_is_written_after_the_head() -> Result<(), BoxError> {
    let slot = Arc::new(Mutex::new(None));
    let client = Client::new(synthetic_broker(slot.clone()));
    let request = ConnectionRequest::new(Method::POST, "http://127.0.0.1/echo".parse()?)?
        .with_body("ping");

    let script = async {
        let mut handle = take_handle(&slot).await;
        let written = read_until(&mut handle, b"ping").await;
        let written = String::from_utf8(written).expect("ascii request");

        assert!(written.starts_with("POST /echo HTTP/1.1\r\n"));
        assert!(written
            .to_ascii_lowercase()
            .contains("\r\ncontent-length: 4\r\n"));
        assert!(written.ends_with("\r\n\r\nping"));

        handle
            .emit(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\npong")
            .await
            .expect("emit");
        handle.finish().await.expect("finish");
    };

    let (response, ()) = tokio::join!(client.request(request), script);
    let response = response?;
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"pong");
    Ok(())
}
