//! Network capture race
//!
//! Arms request/response observers on a [`BrowserSession`], reloads the page and
//! waits for the first response whose url carries the payload marker. Capture
//! and timeout feed one [`Settlement`]; whichever settles first wins and any
//! later outcome is discarded. Observers are removed on every exit path by
//! [`ObserverScope`].

mod settlement;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::CaptureConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{HookPhase, ScrapeError, ScrapeResult};
use crate::session::{
    BrowserSession, InterceptedRequest, ObservedResponse, ObserverKind, RequestObserver,
    ResponseObserver, WaitUntil,
};

use settlement::Settlement;

type CaptureOutcome = ScrapeResult<String>;

/// Observer registrations held for the lifetime of one capture
///
/// Dropping the scope refuses further outcomes and removes every request and
/// response observer from the session.
struct ObserverScope<'a> {
    session: &'a dyn BrowserSession,
    settlement: Arc<Settlement<CaptureOutcome>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl<'a> ObserverScope<'a> {
    fn install(
        session: &'a dyn BrowserSession,
        settlement: Arc<Settlement<CaptureOutcome>>,
        marker: &str,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        session.add_request_observer(request_observer(settlement.clone(), sink.clone()));
        session.add_response_observer(response_observer(
            settlement.clone(),
            marker.to_string(),
            sink.clone(),
        ));
        sink.record(Diagnostic::debug("capture hooks installed"));

        Self {
            session,
            settlement,
            sink,
        }
    }
}

impl Drop for ObserverScope<'_> {
    fn drop(&mut self) {
        self.settlement.close();
        self.session.remove_all_observers(ObserverKind::Request);
        self.session.remove_all_observers(ObserverKind::Response);
        self.sink.record(Diagnostic::debug("capture hooks removed"));
    }
}

/// Capture the body of the first payload-carrying response after a reload
///
/// Only one capture may run per session. A call made while another capture's
/// observers are still installed is rejected before it touches the session.
///
/// # Errors
/// - [`ScrapeError::CaptureInFlight`] when the session already carries observers
/// - [`ScrapeError::CaptureTimeout`] when nothing qualifies within `timeout_ms`
/// - [`ScrapeError::CaptureHookFailure`] when a hook or the reload fails, or the
///   carrier response has an empty body
pub async fn capture_payload(
    session: &dyn BrowserSession,
    config: &CaptureConfig,
    sink: Arc<dyn DiagnosticSink>,
) -> ScrapeResult<String> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let settle_delay = Duration::from_millis(config.settle_delay_ms);

    // no await between this check and install
    let observers = session.observer_count(ObserverKind::Request)
        + session.observer_count(ObserverKind::Response);
    if observers > 0 {
        sink.record(Diagnostic::warn(format!(
            "capture rejected, {observers} observers already installed"
        )));
        return Err(ScrapeError::CaptureInFlight { observers });
    }

    let (settlement, outcome) = Settlement::channel();
    let _scope = ObserverScope::install(
        session,
        settlement.clone(),
        &config.payload_marker,
        sink.clone(),
    );

    let trigger = {
        let settlement = settlement.clone();
        let sink = sink.clone();
        async move {
            sink.record(Diagnostic::debug("reload triggered"));
            if let Err(e) = session.reload(WaitUntil::NetworkIdle).await {
                settlement.settle(Err(ScrapeError::CaptureHookFailure {
                    phase: HookPhase::Reload,
                    reason: e.to_string(),
                }));
                return;
            }
            // late async traffic still counts, the global timeout decides
            tokio::time::sleep(settle_delay).await;
        }
    };

    let race = async move {
        if let Err(e) = session.set_request_interception(true).await {
            return Err(ScrapeError::CaptureHookFailure {
                phase: HookPhase::Request,
                reason: format!("enabling request interception: {e}"),
            });
        }

        tokio::pin!(trigger);
        let mut outcome = outcome;
        let early = tokio::select! {
            settled = &mut outcome => Some(settled),
            () = &mut trigger => None,
        };
        let settled = match early {
            Some(settled) => settled,
            None => outcome.await,
        };
        settled.unwrap_or_else(|_closed| {
            Err(ScrapeError::CaptureHookFailure {
                phase: HookPhase::Response,
                reason: "capture channel closed before settling".to_string(),
            })
        })
    };

    match tokio::time::timeout(timeout, race).await {
        Ok(result) => {
            sink.record(Diagnostic::debug(match &result {
                Ok(body) => format!("capture settled with {} bytes", body.len()),
                Err(e) => format!("capture settled with failure: {e}"),
            }));
            result
        }
        Err(_elapsed) => {
            sink.record(Diagnostic::warn(format!(
                "capture timed out after {}ms",
                timeout.as_millis()
            )));
            Err(ScrapeError::CaptureTimeout { timeout })
        }
    }
}

/// Passes every request through untouched
fn request_observer(
    settlement: Arc<Settlement<CaptureOutcome>>,
    sink: Arc<dyn DiagnosticSink>,
) -> RequestObserver {
    Arc::new(move |request: Box<dyn InterceptedRequest>| {
        let settlement = settlement.clone();
        let sink = sink.clone();
        async move {
            if let Err(e) = request.continue_request().await {
                let failure = ScrapeError::CaptureHookFailure {
                    phase: HookPhase::Request,
                    reason: format!("continuing {}: {e}", request.url()),
                };
                if !settlement.settle(Err(failure)) {
                    sink.record(Diagnostic::debug("late request failure discarded"));
                }
            }
        }
        .boxed()
    })
}

/// Settles on the first response whose url contains `marker`
fn response_observer(
    settlement: Arc<Settlement<CaptureOutcome>>,
    marker: String,
    sink: Arc<dyn DiagnosticSink>,
) -> ResponseObserver {
    Arc::new(move |response: Box<dyn ObservedResponse>| {
        let settlement = settlement.clone();
        let marker = marker.clone();
        let sink = sink.clone();
        async move {
            let url = response.url().to_string();
            if !url.contains(&marker) {
                return;
            }
            if settlement.is_settled() {
                sink.record(Diagnostic::debug(format!(
                    "late carrier response discarded: {url}"
                )));
                return;
            }
            sink.record(Diagnostic::debug(format!("carrier response seen: {url}")));

            let outcome = match response.text().await {
                Ok(body) if !body.is_empty() => Ok(body),
                Ok(_) => Err(ScrapeError::CaptureHookFailure {
                    phase: HookPhase::Response,
                    reason: format!("empty body from {url}"),
                }),
                Err(e) => Err(ScrapeError::CaptureHookFailure {
                    phase: HookPhase::Response,
                    reason: format!("reading {url}: {e}"),
                }),
            };

            if !settlement.settle(outcome) {
                sink.record(Diagnostic::debug(format!(
                    "late carrier response discarded: {url}"
                )));
            }
        }
        .boxed()
    })
}
