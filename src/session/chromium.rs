//! [`BrowserSession`] over a caller-owned chromiumoxide page
//!
//! Requests are paused through the CDP Fetch domain, responses are read through
//! the Network domain. Both event streams are pumped by background tasks that
//! are aborted when the session is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::Page;
use chromiumoxide::error::CdpError;
use chromiumoxide::listeners::EventStream;
use chromiumoxide_cdp::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused,
};
use chromiumoxide_cdp::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams,
};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    BrowserSession, InterceptedRequest, ObservedResponse, ObserverKind, ObserverRegistry,
    RequestObserver, ResponseObserver, SessionError, SessionResult, WaitUntil,
};

/// Quiet period with zero in-flight requests that counts as network idle
const IDLE_WINDOW: Duration = Duration::from_millis(500);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Same ceiling puppeteer-style navigations use before giving up
const IDLE_LIMIT: Duration = Duration::from_secs(30);

/// In-flight request bookkeeping for [`WaitUntil::NetworkIdle`]
struct NetworkActivity {
    in_flight: Mutex<HashSet<String>>,
    last_change: Mutex<Instant>,
}

impl NetworkActivity {
    fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            last_change: Mutex::new(Instant::now()),
        }
    }

    fn started(&self, request_id: &str) {
        self.in_flight.lock().insert(request_id.to_string());
        *self.last_change.lock() = Instant::now();
    }

    fn ended(&self, request_id: &str) {
        self.in_flight.lock().remove(request_id);
        *self.last_change.lock() = Instant::now();
    }

    fn is_idle(&self) -> bool {
        self.in_flight.lock().is_empty() && self.last_change.lock().elapsed() >= IDLE_WINDOW
    }
}

/// Chromium page adapted to the engine's session capabilities
///
/// The page stays owned by the caller; [`BrowserSession::close`] closes it.
pub struct ChromiumSession {
    page: Page,
    registry: Arc<ObserverRegistry>,
    activity: Arc<NetworkActivity>,
    network_pump: JoinHandle<()>,
    request_pump: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumSession {
    /// Subscribe to the page's network events and wrap it
    pub async fn attach(page: Page) -> SessionResult<Self> {
        let sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(protocol_error)?;
        let received = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(protocol_error)?;
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(protocol_error)?;
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(protocol_error)?;

        page.execute(network::EnableParams::default())
            .await
            .map_err(protocol_error)?;

        let registry = Arc::new(ObserverRegistry::new());
        let activity = Arc::new(NetworkActivity::new());

        let network_pump = tokio::spawn(pump_network(
            page.clone(),
            registry.clone(),
            activity.clone(),
            NetworkStreams {
                sent,
                received,
                finished,
                failed,
            },
        ));

        info!("Attached browser session to page");
        Ok(Self {
            page,
            registry,
            activity,
            network_pump,
            request_pump: Mutex::new(None),
        })
    }

    /// Underlying chromiumoxide page
    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn wait_for_network_idle(&self) -> SessionResult<()> {
        let start = Instant::now();
        loop {
            if self.activity.is_idle() {
                return Ok(());
            }
            if start.elapsed() >= IDLE_LIMIT {
                return Err(SessionError::NavigationFailed(format!(
                    "network did not go idle within {}ms",
                    IDLE_LIMIT.as_millis()
                )));
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        debug!("Dropping ChromiumSession - aborting event pumps");
        self.network_pump.abort();
        if let Some(handle) = self.request_pump.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn content(&self) -> SessionResult<String> {
        self.page.content().await.map_err(protocol_error)
    }

    async fn reload(&self, wait: WaitUntil) -> SessionResult<()> {
        self.page
            .reload()
            .await
            .map_err(|e| SessionError::NavigationFailed(e.to_string()))?;

        match wait {
            WaitUntil::Load => Ok(()),
            WaitUntil::NetworkIdle => self.wait_for_network_idle().await,
        }
    }

    async fn set_request_interception(&self, enabled: bool) -> SessionResult<()> {
        if !enabled {
            if let Some(handle) = self.request_pump.lock().take() {
                handle.abort();
            }
            self.page
                .execute(fetch::DisableParams::default())
                .await
                .map_err(protocol_error)?;
            return Ok(());
        }

        if self.request_pump.lock().is_some() {
            return Ok(());
        }

        // Listener first so no paused request slips past before the pump exists
        let paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(protocol_error)?;
        self.page
            .execute(fetch::EnableParams::default())
            .await
            .map_err(protocol_error)?;

        let handle = tokio::spawn(pump_requests(
            self.page.clone(),
            self.registry.clone(),
            paused,
        ));
        *self.request_pump.lock() = Some(handle);
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
        self.page.clone().close().await.map_err(protocol_error)
    }
}

#[derive(Clone)]
struct ChromiumRequest {
    page: Page,
    request_id: fetch::RequestId,
    url: String,
}

#[async_trait]
impl InterceptedRequest for ChromiumRequest {
    fn url(&self) -> &str {
        &self.url
    }

    async fn continue_request(&self) -> SessionResult<()> {
        self.page
            .execute(ContinueRequestParams::new(self.request_id.clone()))
            .await
            .map_err(protocol_error)?;
        Ok(())
    }
}

struct ChromiumResponse {
    page: Page,
    request_id: network::RequestId,
    url: String,
}

#[async_trait]
impl ObservedResponse for ChromiumResponse {
    fn url(&self) -> &str {
        &self.url
    }

    async fn text(&self) -> SessionResult<String> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(self.request_id.clone()))
            .await
            .map_err(|e| SessionError::BodyUnavailable(e.to_string()))?;

        let body = &response.result;
        if body.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&body.body)
                .map_err(|e| SessionError::BodyUnavailable(e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(body.body.clone())
        }
    }
}

struct NetworkStreams {
    sent: EventStream<EventRequestWillBeSent>,
    received: EventStream<EventResponseReceived>,
    finished: EventStream<EventLoadingFinished>,
    failed: EventStream<EventLoadingFailed>,
}

/// Dispatch finished responses to response observers and track in-flight requests
async fn pump_network(
    page: Page,
    registry: Arc<ObserverRegistry>,
    activity: Arc<NetworkActivity>,
    streams: NetworkStreams,
) {
    let NetworkStreams {
        mut sent,
        mut received,
        mut finished,
        mut failed,
    } = streams;
    // request id -> response url, held until the body is complete
    let mut pending: HashMap<String, (network::RequestId, String)> = HashMap::new();

    loop {
        tokio::select! {
            Some(event) = sent.next() => {
                activity.started(event.request_id.inner());
            }
            Some(event) = received.next() => {
                pending.insert(
                    event.request_id.inner().clone(),
                    (event.request_id.clone(), event.response.url.clone()),
                );
            }
            Some(event) = finished.next() => {
                activity.ended(event.request_id.inner());
                let Some((request_id, url)) = pending.remove(event.request_id.inner()) else {
                    continue;
                };
                for observer in registry.response_observers() {
                    let response = ChromiumResponse {
                        page: page.clone(),
                        request_id: request_id.clone(),
                        url: url.clone(),
                    };
                    tokio::spawn(observer(Box::new(response)));
                }
            }
            Some(event) = failed.next() => {
                activity.ended(event.request_id.inner());
                pending.remove(event.request_id.inner());
            }
            else => break,
        }
    }
    debug!("Network event streams closed");
}

/// Hand paused requests to request observers, or continue them when none are registered
async fn pump_requests(
    page: Page,
    registry: Arc<ObserverRegistry>,
    mut paused: EventStream<EventRequestPaused>,
) {
    while let Some(event) = paused.next().await {
        let request = ChromiumRequest {
            page: page.clone(),
            request_id: event.request_id.clone(),
            url: event.request.url.clone(),
        };

        let observers = registry.request_observers();
        if observers.is_empty() {
            if let Err(e) = request.continue_request().await {
                warn!("Failed to continue unobserved request {}: {}", request.url, e);
            }
            continue;
        }

        for observer in observers {
            tokio::spawn(observer(Box::new(request.clone())));
        }
    }
    debug!("Request interception stream closed");
}

fn protocol_error(err: CdpError) -> SessionError {
    SessionError::Protocol(err.to_string())
}
