//! Rent and availability extraction for self-storage facility websites
//!
//! Two strategies produce the same [`FacilityRecord`]:
//! - [`scrape_via_network`] reloads the page and captures the vendor
//!   `space-types` JSON from its traffic, racing a fixed timeout.
//! - [`scrape_via_dom`] parses the server-rendered markup and runs the row
//!   extractors over every unit fragment.
//!
//! The browser page is driven through the [`BrowserSession`] seam; diagnostics
//! go to a caller-supplied [`DiagnosticSink`].

mod capture;
pub mod diagnostics;
pub mod dom;
mod error;
pub mod model;
mod numbers;
mod payload;
pub mod session;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use capture::capture_payload;
pub use diagnostics::{Diagnostic, DiagnosticSink, NoopSink, TracingSink};
pub use dom::{extract_facility, extract_facility_at, scrape_via_dom, split_address};
pub use error::{Component, HookPhase, Phase, ScrapeError, ScrapeResult};
pub use model::{Dimensions, ExternalFacilityRecord, FacilityRecord, RentRecord};
pub use payload::{normalize_payload, normalize_payload_at, scrape_via_network};
pub use session::{BrowserSession, ChromiumSession, ObserverKind, SessionError, WaitUntil};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// Network capture race timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Give up on the capture after this long
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra wait after the reload settles for delayed async traffic
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Substring identifying the payload-carrying response url
    #[serde(default = "default_payload_marker")]
    pub payload_marker: String,
}

/// Facility-level CSS selectors for the DOM strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_phone_selector")]
    pub phone: String,

    #[serde(default = "default_address_selector")]
    pub address: String,

    #[serde(default = "default_facility_name_selector")]
    pub facility_name: String,

    /// One match per rentable unit
    #[serde(default = "default_unit_row_selector")]
    pub unit_row: String,
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_settle_delay_ms() -> u64 {
    5_000
}

fn default_payload_marker() -> String {
    "space-types".to_string()
}

fn default_phone_selector() -> String {
    r#"header a[href^="tel:"]"#.to_string()
}

fn default_address_selector() -> String {
    "footer .facility-address".to_string()
}

fn default_facility_name_selector() -> String {
    "footer .facility-name".to_string()
}

fn default_unit_row_selector() -> String {
    ".unit-row".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            payload_marker: default_payload_marker(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            phone: default_phone_selector(),
            address: default_address_selector(),
            facility_name: default_facility_name_selector(),
            unit_row: default_unit_row_selector(),
        }
    }
}

/// Load config from a YAML file, falling back to defaults when it does not exist
pub fn load_yaml_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}
