mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CollectingSink, FakeSession, init_tracing};
use storage_rent_scraper::{
    CaptureConfig, DiagnosticSink, HookPhase, NoopSink, ScrapeError, capture_payload,
};
use tokio::time::Instant;

const CARRIER: &str = "https://api.example.com/v1/facilities/42/space-types?lang=en";

fn noop() -> Arc<dyn DiagnosticSink> {
    Arc::new(NoopSink)
}

#[tokio::test(start_paused = true)]
async fn first_carrier_body_wins_without_waiting_for_settle_delay() {
    init_tracing();
    let session = FakeSession::new()
        .with_request("https://www.example.com/")
        .with_request("https://www.example.com/app.js")
        .with_response("https://www.example.com/app.js", "console.log(1)", Duration::ZERO)
        .with_response(CARRIER, r#"{"first":true}"#, Duration::from_millis(200))
        .with_response(CARRIER, r#"{"second":true}"#, Duration::from_millis(400));
    let start = Instant::now();

    let body = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    match body {
        Ok(body) => assert_eq!(body, r#"{"first":true}"#),
        Err(err) => panic!("expected Ok(_), got Err({err:?})"),
    }
    assert!(start.elapsed() < Duration::from_millis(5_000));
    assert!(session.interception_enabled());
    assert_eq!(session.continued(), 2);
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn response_after_settle_delay_still_counts() {
    let session = FakeSession::new().with_response(CARRIER, "{}", Duration::from_secs(30));

    let body = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    assert_eq!(body.ok().as_deref(), Some("{}"));
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn times_out_and_removes_every_observer() {
    let session = FakeSession::new()
        .with_request("https://www.example.com/")
        .with_response("https://www.example.com/units", "<html></html>", Duration::ZERO);
    let start = Instant::now();

    let result = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    match result {
        Err(ScrapeError::CaptureTimeout { timeout }) => {
            assert_eq!(timeout, Duration::from_millis(60_000));
        }
        other => panic!("expected CaptureTimeout, got {other:?}"),
    }
    assert!(start.elapsed() >= Duration::from_millis(60_000));
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_message_names_unsupported_page() {
    let session = FakeSession::new();

    let err = capture_payload(&session, &CaptureConfig::default(), noop())
        .await
        .expect_err("no carrier response");

    assert!(err.to_string().contains("likely not a supported rent page"));
}

#[tokio::test(start_paused = true)]
async fn empty_carrier_body_fails_immediately() {
    let session = FakeSession::new().with_response(CARRIER, "", Duration::ZERO);
    let start = Instant::now();

    let result = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    assert!(matches!(
        result,
        Err(ScrapeError::CaptureHookFailure {
            phase: HookPhase::Response,
            ..
        })
    ));
    assert!(start.elapsed() < Duration::from_millis(5_000));
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn unreadable_carrier_body_fails_capture() {
    let session = FakeSession::new()
        .with_unreadable_response(CARRIER, "No resource with given identifier");

    let result = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    match result {
        Err(ScrapeError::CaptureHookFailure { phase, reason }) => {
            assert_eq!(phase, HookPhase::Response);
            assert!(reason.contains("No resource with given identifier"));
        }
        other => panic!("expected CaptureHookFailure, got {other:?}"),
    }
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn request_hook_failure_fails_capture() {
    let session = FakeSession::new()
        .with_request("https://www.example.com/")
        .with_failing_continue()
        .with_response(CARRIER, "{}", Duration::from_secs(1));

    let result = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    assert!(matches!(
        result,
        Err(ScrapeError::CaptureHookFailure {
            phase: HookPhase::Request,
            ..
        })
    ));
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn reload_failure_fails_capture() {
    let session = FakeSession::new().with_reload_error("net::ERR_CONNECTION_RESET");

    let result = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    match result {
        Err(ScrapeError::CaptureHookFailure { phase, reason }) => {
            assert_eq!(phase, HookPhase::Reload);
            assert!(reason.contains("ERR_CONNECTION_RESET"));
        }
        other => panic!("expected CaptureHookFailure, got {other:?}"),
    }
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_response_after_timeout_is_discarded() {
    let session = FakeSession::new().with_response(CARRIER, "{}", Duration::from_secs(61));
    let sink = Arc::new(CollectingSink::default());

    let result = capture_payload(&session, &CaptureConfig::default(), sink.clone()).await;
    assert!(matches!(result, Err(ScrapeError::CaptureTimeout { .. })));

    // let the in-flight response land after the race was decided
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(sink.contains("late carrier response discarded"));
    assert!(sink.contains("capture hooks removed"));
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn consecutive_captures_do_not_share_observers() {
    let session = FakeSession::new().with_response(CARRIER, "{}", Duration::ZERO);
    let config = CaptureConfig::default();

    for _ in 0..3 {
        let body = capture_payload(&session, &config, noop()).await;
        assert_eq!(body.ok().as_deref(), Some("{}"));
        assert_eq!(session.residual_observers(), 0);
    }
    assert_eq!(session.reloads(), 3);
}

#[tokio::test(start_paused = true)]
async fn custom_timeout_and_marker_are_honoured() {
    let session = FakeSession::new()
        .with_response(CARRIER, "{}", Duration::ZERO)
        .with_response("https://api.example.com/units.json", "[1]", Duration::from_secs(2));
    let config = CaptureConfig {
        timeout_ms: 1_000,
        settle_delay_ms: 100,
        payload_marker: "units.json".to_string(),
    };

    let result = capture_payload(&session, &config, noop()).await;

    match result {
        Err(ScrapeError::CaptureTimeout { timeout }) => {
            assert_eq!(timeout, Duration::from_millis(1_000));
        }
        other => panic!("expected CaptureTimeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn overlapping_capture_is_rejected_and_first_still_succeeds() {
    let session = FakeSession::new().with_response(CARRIER, "{}", Duration::from_millis(500));
    let config = CaptureConfig::default();

    let (first, (second, installed_after_rejection)) = tokio::join!(
        capture_payload(&session, &config, noop()),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let second = capture_payload(&session, &config, noop()).await;
            (second, session.residual_observers())
        }
    );

    assert_eq!(first.ok().as_deref(), Some("{}"));
    assert!(matches!(
        second,
        Err(ScrapeError::CaptureInFlight { observers: 2 })
    ));
    assert_eq!(installed_after_rejection, 2);
    assert_eq!(session.reloads(), 1);
    assert_eq!(session.residual_observers(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_interception_is_bounded_by_timeout() {
    let session = FakeSession::new()
        .with_stalled_interception()
        .with_response(CARRIER, "{}", Duration::ZERO);
    let start = Instant::now();

    let result = capture_payload(&session, &CaptureConfig::default(), noop()).await;

    assert!(matches!(result, Err(ScrapeError::CaptureTimeout { .. })));
    assert!(start.elapsed() >= Duration::from_millis(60_000));
    assert_eq!(session.reloads(), 0);
    assert_eq!(session.residual_observers(), 0);
}
