use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionError;

/// Where inside the capture a hook failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Request,
    Response,
    Reload,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::Request => write!(f, "request"),
            HookPhase::Response => write!(f, "response"),
            HookPhase::Reload => write!(f, "reload"),
        }
    }
}

/// Engine component named in a tagged [`ScrapeError::Scrape`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    NetworkCapture,
    DomExtractor,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::NetworkCapture => write!(f, "network-capture"),
            Component::DomExtractor => write!(f, "dom-extractor"),
        }
    }
}

/// Step of a strategy that was running when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capture,
    Normalize,
    ReadMarkup,
    Extract,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Capture => write!(f, "capture"),
            Phase::Normalize => write!(f, "normalize"),
            Phase::ReadMarkup => write!(f, "read-markup"),
            Phase::Extract => write!(f, "extract"),
        }
    }
}

/// Errors raised by the extraction engine
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error(
        "no space-types response within {}ms, likely not a supported rent page",
        .timeout.as_millis()
    )]
    CaptureTimeout { timeout: Duration },

    #[error("capture already in flight on this session ({observers} observers installed)")]
    CaptureInFlight { observers: usize },

    #[error("capture hook failed during {phase}: {reason}")]
    CaptureHookFailure { phase: HookPhase, reason: String },

    #[error("vendor payload could not be parsed: {0}")]
    PayloadParseFailure(String),

    #[error("address block {text:?} does not split into street / city, state zip")]
    AddressSplitFailure { text: String },

    #[error("invalid CSS selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("browser session error: {0}")]
    Session(#[from] SessionError),

    #[error("{component} failed during {phase} for {url}: {source}")]
    Scrape {
        component: Component,
        phase: Phase,
        url: String,
        #[source]
        source: Box<ScrapeError>,
    },
}

impl ScrapeError {
    /// Wrap `self` in the tagged error used at the component boundary
    pub fn tagged(self, component: Component, phase: Phase, url: &str) -> Self {
        ScrapeError::Scrape {
            component,
            phase,
            url: url.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any tagged wrappers
    pub fn root(&self) -> &ScrapeError {
        match self {
            ScrapeError::Scrape { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::PayloadParseFailure(err.to_string())
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
