#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use storage_rent_scraper::session::{
    BrowserSession, InterceptedRequest, ObservedResponse, ObserverKind, ObserverRegistry,
    RequestObserver, ResponseObserver, SessionError, SessionResult, WaitUntil,
};
use storage_rent_scraper::{Diagnostic, DiagnosticSink};

/// Response the fake page emits after a reload
#[derive(Clone)]
pub struct ScriptedResponse {
    pub url: String,
    pub body: Result<String, String>,
    pub delay: Duration,
}

/// In-memory page: replays scripted traffic on every reload
///
/// Observers are snapshotted when the reload starts, like responses already in
/// flight, so a delayed response can still reach an observer after it was removed.
pub struct FakeSession {
    registry: Arc<ObserverRegistry>,
    markup: String,
    requests: Vec<String>,
    responses: Vec<ScriptedResponse>,
    reload_error: Option<String>,
    fail_continue: bool,
    stall_interception: bool,
    continued: Arc<AtomicUsize>,
    interception: AtomicBool,
    reloads: AtomicUsize,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ObserverRegistry::new()),
            markup: String::new(),
            requests: Vec::new(),
            responses: Vec::new(),
            reload_error: None,
            fail_continue: false,
            stall_interception: false,
            continued: Arc::new(AtomicUsize::new(0)),
            interception: AtomicBool::new(false),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn with_markup(mut self, markup: &str) -> Self {
        self.markup = markup.to_string();
        self
    }

    pub fn with_request(mut self, url: &str) -> Self {
        self.requests.push(url.to_string());
        self
    }

    pub fn with_response(mut self, url: &str, body: &str, delay: Duration) -> Self {
        self.responses.push(ScriptedResponse {
            url: url.to_string(),
            body: Ok(body.to_string()),
            delay,
        });
        self
    }

    pub fn with_unreadable_response(mut self, url: &str, error: &str) -> Self {
        self.responses.push(ScriptedResponse {
            url: url.to_string(),
            body: Err(error.to_string()),
            delay: Duration::ZERO,
        });
        self
    }

    pub fn with_reload_error(mut self, message: &str) -> Self {
        self.reload_error = Some(message.to_string());
        self
    }

    pub fn with_failing_continue(mut self) -> Self {
        self.fail_continue = true;
        self
    }

    /// Enabling interception never completes, like a wedged protocol connection
    pub fn with_stalled_interception(mut self) -> Self {
        self.stall_interception = true;
        self
    }

    pub fn continued(&self) -> usize {
        self.continued.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn interception_enabled(&self) -> bool {
        self.interception.load(Ordering::SeqCst)
    }

    pub fn residual_observers(&self) -> usize {
        self.observer_count(ObserverKind::Request) + self.observer_count(ObserverKind::Response)
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn content(&self) -> SessionResult<String> {
        Ok(self.markup.clone())
    }

    async fn reload(&self, _wait: WaitUntil) -> SessionResult<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.reload_error {
            return Err(SessionError::NavigationFailed(message.clone()));
        }

        for url in &self.requests {
            for observer in self.registry.request_observers() {
                observer(Box::new(FakeRequest {
                    url: url.clone(),
                    fail: self.fail_continue,
                    continued: self.continued.clone(),
                }))
                .await;
            }
        }

        for scripted in self.responses.clone() {
            let observers = self.registry.response_observers();
            tokio::spawn(async move {
                tokio::time::sleep(scripted.delay).await;
                for observer in observers {
                    observer(Box::new(FakeResponse {
                        url: scripted.url.clone(),
                        body: scripted.body.clone(),
                    }))
                    .await;
                }
            });
        }
        Ok(())
    }

    async fn set_request_interception(&self, enabled: bool) -> SessionResult<()> {
        if self.stall_interception {
            futures::future::pending::<()>().await;
        }
        self.interception.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn add_request_observer(&self, observer: RequestObserver) {
        self.registry.add_request(observer);
    }

    fn add_response_observer(&self, observer: ResponseObserver) {
        self.registry.add_response(observer);
    }

    fn remove_all_observers(&self, kind: ObserverKind) {
        self.registry.clear(kind);
    }

    fn observer_count(&self, kind: ObserverKind) -> usize {
        self.registry.count(kind)
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }
}

struct FakeRequest {
    url: String,
    fail: bool,
    continued: Arc<AtomicUsize>,
}

#[async_trait]
impl InterceptedRequest for FakeRequest {
    fn url(&self) -> &str {
        &self.url
    }

    async fn continue_request(&self) -> SessionResult<()> {
        if self.fail {
            return Err(SessionError::Protocol("request already handled".to_string()));
        }
        self.continued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeResponse {
    url: String,
    body: Result<String, String>,
}

#[async_trait]
impl ObservedResponse for FakeResponse {
    fn url(&self) -> &str {
        &self.url
    }

    async fn text(&self) -> SessionResult<String> {
        self.body.clone().map_err(SessionError::BodyUnavailable)
    }
}

/// Keeps every diagnostic for assertions
#[derive(Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|d| d.message.clone()).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl DiagnosticSink for CollectingSink {
    fn record(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
