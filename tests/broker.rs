//! Error delivery and completion semantics through the broker.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use patchcord::{Client, Completer, ConnectionBroker, ConnectionRequest, Error, SyntheticStream};
use tower::ServiceExt as _;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn assert_dial_error(error: Error, message: &str) {
    match error {
        Error::Dial(error) => assert_eq!(error.to_string(), message),
        other => panic!("expected a dial error, got: {other}"),
    }
}

#[tokio::test]
async fn error_rejected_on_the_first_tick_reaches_the_request() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = ConnectionBroker::new(|_request, _options, completer| {
        completer.reject("is this caught?");
    });
    let client = Client::new(broker);

    let error = client
        .get("http://127.0.0.1/foo".parse()?)
        .await
        .unwrap_err();
    assert_dial_error(error, "is this caught?");
    Ok(())
}

#[tokio::test]
async fn error_rejected_after_a_delay_reaches_the_request() -> Result<(), BoxError> {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = ConnectionBroker::new(|_request, _options, completer| {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            completer.reject("is this caught?");
        });
    });
    let client = Client::new(broker);

    let error = client
        .get("http://127.0.0.1/foo".parse()?)
        .await
        .unwrap_err();
    assert_dial_error(error, "is this caught?");
    Ok(())
}

#[tokio::test]
async fn only_the_first_completion_counts() -> Result<(), BoxError> {
    let broker = ConnectionBroker::new(|_request, _options, completer| {
        assert!(completer.reject("first"));
        assert!(!completer.reject("second"));
        let (stream, _handle) = SyntheticStream::new(64);
        assert!(!completer.resolve(stream));
    });

    let request = ConnectionRequest::get("http://example.com/".parse()?)?;
    let error = broker.obtain_connection(&request).await.unwrap_err();
    assert_eq!(error.to_string(), "first");
    Ok(())
}

#[tokio::test]
async fn a_dial_that_never_settles_leaves_the_request_pending() -> Result<(), BoxError> {
    let broker = ConnectionBroker::new(|_request, _options, _completer| {
        // completer dropped without settling
    });

    let request = ConnectionRequest::get("http://example.com/".parse()?)?;
    let pending = broker.obtain_connection(&request);
    let waited = tokio::time::timeout(Duration::from_millis(50), pending).await;
    assert!(waited.is_err(), "request should still be pending");
    Ok(())
}

#[tokio::test]
async fn a_dropped_completer_keeps_the_request_pending_across_polls() -> Result<(), BoxError> {
    let broker = ConnectionBroker::new(|_request, _options, _completer| {
        // completer dropped without settling
    });

    let request = ConnectionRequest::get("http://example.com/".parse()?)?;
    let mut pending = broker.obtain_connection(&request);
    for _ in 0..3 {
        let waited = tokio::time::timeout(Duration::from_millis(10), &mut pending).await;
        assert!(waited.is_err(), "request should still be pending");
    }
    Ok(())
}

#[tokio::test]
async fn settling_after_the_request_was_abandoned_is_a_noop() -> Result<(), BoxError> {
    let smuggled: Arc<Mutex<Option<Completer>>> = Arc::new(Mutex::new(None));

    let broker = {
        let smuggled = smuggled.clone();
        ConnectionBroker::new(move |_request, _options, completer| {
            *smuggled.lock() = Some(completer);
        })
    };

    let request = ConnectionRequest::get("http://example.com/".parse()?)?;
    let pending = broker.obtain_connection(&request);
    drop(pending);

    let completer = smuggled.lock().take().expect("dial ran");
    assert!(!completer.reject("after abandonment"));
    Ok(())
}

#[tokio::test]
async fn default_port_injection_is_visible_after_dialing() -> Result<(), BoxError> {
    let broker = ConnectionBroker::new(|_request, options, completer| {
        assert_eq!(options.lock().port, None);
        assert_eq!(options.ensure_port(), 80);
        completer.reject("stop here");
    });

    let request = ConnectionRequest::get("http://example.com/".parse()?)?;
    let mut pending = broker.obtain_connection(&request);
    let error = (&mut pending).await.unwrap_err();
    assert_eq!(error.to_string(), "stop here");
    assert_eq!(pending.options().lock().port, Some(80));
    Ok(())
}

#[tokio::test]
async fn the_broker_is_a_tower_service() -> Result<(), BoxError> {
    let broker = ConnectionBroker::new(|_request, _options, completer| {
        completer.reject("service says no");
    });

    let request = ConnectionRequest::get("http://example.com/".parse()?)?;
    let error = broker.oneshot(request).await.unwrap_err();
    assert_eq!(error.to_string(), "service says no");
    Ok(())
}
