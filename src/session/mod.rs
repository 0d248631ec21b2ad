//! Browser session seam
//!
//! The engine drives a page it does not own through [`BrowserSession`]. The
//! production adapter is [`ChromiumSession`]; tests plug in an in-memory fake.

mod chromium;

pub use chromium::ChromiumSession;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Response body unavailable: {0}")]
    BodyUnavailable(String),

    #[error("Session closed")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// How long a reload waits before it is considered settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// The load event fired
    Load,
    /// No network traffic for a short quiet window after load
    #[default]
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    Request,
    Response,
}

/// An outgoing request paused by interception
#[async_trait]
pub trait InterceptedRequest: Send + Sync {
    fn url(&self) -> &str;

    /// Let the request proceed unmodified
    async fn continue_request(&self) -> SessionResult<()>;
}

/// A response seen on the wire
#[async_trait]
pub trait ObservedResponse: Send + Sync {
    fn url(&self) -> &str;

    async fn text(&self) -> SessionResult<String>;
}

pub type RequestObserver =
    Arc<dyn Fn(Box<dyn InterceptedRequest>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type ResponseObserver =
    Arc<dyn Fn(Box<dyn ObservedResponse>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Capabilities the engine needs from a live browser page
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Current page markup
    async fn content(&self) -> SessionResult<String>;

    async fn reload(&self, wait: WaitUntil) -> SessionResult<()>;

    async fn set_request_interception(&self, enabled: bool) -> SessionResult<()>;

    fn add_request_observer(&self, observer: RequestObserver);

    fn add_response_observer(&self, observer: ResponseObserver);

    fn remove_all_observers(&self, kind: ObserverKind);

    fn observer_count(&self, kind: ObserverKind) -> usize;

    async fn close(&self) -> SessionResult<()>;
}

/// Observer table shared by session adapters
///
/// Dispatch works on snapshots so the lock is never held while an observer runs.
#[derive(Default)]
pub struct ObserverRegistry {
    requests: Mutex<Vec<RequestObserver>>,
    responses: Mutex<Vec<ResponseObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request(&self, observer: RequestObserver) {
        self.requests.lock().push(observer);
    }

    pub fn add_response(&self, observer: ResponseObserver) {
        self.responses.lock().push(observer);
    }

    pub fn clear(&self, kind: ObserverKind) {
        match kind {
            ObserverKind::Request => self.requests.lock().clear(),
            ObserverKind::Response => self.responses.lock().clear(),
        }
    }

    pub fn count(&self, kind: ObserverKind) -> usize {
        match kind {
            ObserverKind::Request => self.requests.lock().len(),
            ObserverKind::Response => self.responses.lock().len(),
        }
    }

    pub fn request_observers(&self) -> Vec<RequestObserver> {
        self.requests.lock().clone()
    }

    pub fn response_observers(&self) -> Vec<ResponseObserver> {
        self.responses.lock().clone()
    }
}
