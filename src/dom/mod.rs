//! Server-rendered markup extraction
//!
//! Parses a facility page into its header/footer shell (name, phone, address)
//! and hands every unit fragment to the row extractors in document order.

mod dimensions;
pub mod rows;
mod text;

pub use dimensions::parse_dimensions;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::error::{Component, Phase, ScrapeError, ScrapeResult};
use crate::model::{ExternalFacilityRecord, FacilityRecord};
use crate::session::BrowserSession;
use crate::{Config, SelectorConfig};

use rows::scrape_rent_row;
use text::{block_text, first_match, first_text};

/// Street line plus city, state and zip split out of an address block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParts {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Split `"123 Main St\nAnytown, TX 12345"` into its parts
///
/// Returns `None` when any delimiter is missing.
pub fn split_address(text: &str) -> Option<AddressParts> {
    let mut lines = text.split('\n').map(str::trim).filter(|l| !l.is_empty());
    let street = lines.next()?;
    let locality = lines.next()?;

    let (city, state_zip) = locality.split_once(',')?;
    let mut state_zip = state_zip.split_whitespace();
    let state = state_zip.next()?;
    let zip = state_zip.next()?;

    Some(AddressParts {
        street: street.to_string(),
        city: city.trim().to_string(),
        state: state.to_string(),
        zip: zip.to_string(),
    })
}

struct FacilitySelectors {
    phone: Selector,
    address: Selector,
    name: Selector,
    unit_row: Selector,
}

impl FacilitySelectors {
    fn compile(config: &SelectorConfig) -> ScrapeResult<Self> {
        Ok(Self {
            phone: compile(&config.phone)?,
            address: compile(&config.address)?,
            name: compile(&config.facility_name)?,
            unit_row: compile(&config.unit_row)?,
        })
    }
}

fn compile(css: &str) -> ScrapeResult<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::InvalidSelector {
        selector: css.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Build a [`FacilityRecord`] from full page markup
///
/// When `external` is given its location fields are used verbatim and the
/// address block is not required to parse.
///
/// # Errors
/// [`ScrapeError::AddressSplitFailure`] when the address block does not split
/// and no `external` record is available.
pub fn extract_facility(
    html: &str,
    url: &str,
    external: Option<&ExternalFacilityRecord>,
    selectors: &SelectorConfig,
) -> ScrapeResult<FacilityRecord> {
    extract_facility_at(html, url, external, selectors, Utc::now())
}

/// [`extract_facility`] with an explicit capture timestamp
pub fn extract_facility_at(
    html: &str,
    url: &str,
    external: Option<&ExternalFacilityRecord>,
    selectors: &SelectorConfig,
    captured_at: DateTime<Utc>,
) -> ScrapeResult<FacilityRecord> {
    let selectors = FacilitySelectors::compile(selectors)?;
    let document = Html::parse_document(html);
    let root = document.root_element();

    let phone = first_text(root, &selectors.phone).filter(|p| !p.is_empty());
    let name = first_text(root, &selectors.name).unwrap_or_default();

    let address_text = first_match(root, &selectors.address)
        .map(block_text)
        .unwrap_or_default();
    let (address, city, state, zip) = match (external, split_address(&address_text)) {
        (Some(known), _) => (
            known.address.clone(),
            known.city.clone(),
            known.state.clone(),
            known.zip.clone(),
        ),
        (None, Some(parts)) => (parts.street, parts.city, parts.state, parts.zip),
        (None, None) => {
            return Err(ScrapeError::AddressSplitFailure {
                text: address_text.trim().to_string(),
            });
        }
    };

    let rents = root
        .select(&selectors.unit_row)
        .map(|fragment: ElementRef<'_>| scrape_rent_row(fragment, url, captured_at))
        .collect();

    Ok(FacilityRecord {
        name,
        address,
        city,
        state,
        zip,
        phone,
        website: url.to_string(),
        rents,
    })
}

/// Scrape a facility from the session's current markup
pub async fn scrape_via_dom(
    session: &dyn BrowserSession,
    url: &str,
    external: Option<&ExternalFacilityRecord>,
    config: &Config,
) -> ScrapeResult<FacilityRecord> {
    let html = session
        .content()
        .await
        .map_err(|e| {
            ScrapeError::from(e).tagged(Component::DomExtractor, Phase::ReadMarkup, url)
        })?;

    extract_facility(&html, url, external, &config.selectors)
        .map_err(|e| e.tagged(Component::DomExtractor, Phase::Extract, url))
}
