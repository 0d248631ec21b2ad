//! Vendor `space-types` payload normalization and the network strategy entry point

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::Config;
use crate::capture::capture_payload;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{Component, Phase, ScrapeError, ScrapeResult};
use crate::model::{Dimensions, FacilityRecord, RentRecord};
use crate::numbers::{json_decimal, json_integer};
use crate::session::BrowserSession;

/// Units with fewer than this many left are flagged as limited
const LIMITED_AVAILABILITY_THRESHOLD: i64 = 5;

#[derive(Debug, Deserialize)]
struct VendorPayload {
    #[serde(deserialize_with = "lenient_string")]
    facility_name: String,
    #[serde(deserialize_with = "lenient_string")]
    facility_address: String,
    #[serde(deserialize_with = "lenient_string")]
    facility_zipcode: String,
    #[serde(deserialize_with = "lenient_string")]
    facility_city: String,
    #[serde(deserialize_with = "lenient_string")]
    facility_state: String,
    #[serde(rename = "applicationData")]
    application_data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SpaceTypeGroup {
    data: Vec<SpaceUnit>,
}

#[derive(Debug, Deserialize)]
struct SpaceUnit {
    #[serde(default)]
    price: Option<Price>,
    size_category: SizeCategory,
    description: Localized,
    #[serde(default)]
    width: Option<Value>,
    #[serde(default)]
    length: Option<Value>,
    #[serde(default)]
    height: Option<Value>,
    #[serde(default)]
    available_count: Option<Value>,
    #[serde(default)]
    promos: Option<Vec<Option<Promo>>>,
    #[serde(default)]
    amenities: Option<Vec<Option<Amenity>>>,
}

#[derive(Debug, Deserialize)]
struct Price {
    #[serde(default)]
    web: Option<Value>,
    #[serde(default)]
    instore: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SizeCategory {
    label: Localized,
}

#[derive(Debug, Deserialize)]
struct Localized {
    #[serde(deserialize_with = "lenient_string")]
    en: String,
}

#[derive(Debug, Deserialize)]
struct Promo {
    #[serde(default)]
    description: Option<OptionalLocalized>,
}

#[derive(Debug, Deserialize)]
struct OptionalLocalized {
    #[serde(default)]
    en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Amenity {
    #[serde(default)]
    value: Option<String>,
}

/// Accept strings, numbers and null (as empty) where the vendor is inconsistent
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string, found {other}"
        ))),
    }
}

/// Keys in the order a JavaScript engine enumerates them: array-index keys
/// ascending, then every other key in document order
fn enumeration_order(map: &Map<String, Value>) -> Vec<&String> {
    let (mut ordered, named): (Vec<&String>, Vec<&String>) =
        map.keys().partition(|key| array_index(key).is_some());
    ordered.sort_by_key(|key| array_index(key));
    ordered.extend(named);
    ordered
}

/// `"7"` is an array index, `"07"`, `"+7"` and `"4294967295"` are not
fn array_index(key: &str) -> Option<u32> {
    let index: u32 = key.parse().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}

/// Map captured vendor JSON into a [`FacilityRecord`]
///
/// Only the first `applicationData` key, and its first group, is read. "First"
/// follows JavaScript key enumeration, so numeric keys sort ahead of named ones.
/// Any further keys are reported to `sink` as dropped.
pub fn normalize_payload(
    raw: &str,
    url: &str,
    sink: &dyn DiagnosticSink,
) -> ScrapeResult<FacilityRecord> {
    normalize_payload_at(raw, url, Utc::now(), sink)
}

/// [`normalize_payload`] with an explicit capture timestamp
pub fn normalize_payload_at(
    raw: &str,
    url: &str,
    captured_at: DateTime<Utc>,
    sink: &dyn DiagnosticSink,
) -> ScrapeResult<FacilityRecord> {
    let payload: VendorPayload = serde_json::from_str(raw)?;

    let mut keys = enumeration_order(&payload.application_data).into_iter();
    let Some(first_key) = keys.next() else {
        return Err(ScrapeError::PayloadParseFailure(
            "applicationData has no entries".to_string(),
        ));
    };
    let dropped: Vec<&str> = keys.map(String::as_str).collect();
    if !dropped.is_empty() {
        sink.record(Diagnostic::warn(format!(
            "applicationData: using {first_key:?}, ignoring {dropped:?}"
        )));
    }

    let groups: Vec<SpaceTypeGroup> =
        serde_json::from_value(payload.application_data[first_key].clone())?;
    let Some(group) = groups.into_iter().next() else {
        return Err(ScrapeError::PayloadParseFailure(format!(
            "applicationData[{first_key:?}] has no groups"
        )));
    };

    let rents = group
        .data
        .into_iter()
        .map(|unit| rent_from_unit(unit, url, captured_at))
        .collect();

    Ok(FacilityRecord {
        name: payload.facility_name,
        address: payload.facility_address,
        city: payload.facility_city,
        state: payload.facility_state,
        zip: payload.facility_zipcode,
        phone: None,
        website: url.to_string(),
        rents,
    })
}

fn rent_from_unit(unit: SpaceUnit, url: &str, captured_at: DateTime<Utc>) -> RentRecord {
    let decimal = |value: &Option<Value>| value.as_ref().and_then(json_decimal);
    let available_count = unit.available_count.as_ref().and_then(json_integer);

    let discounts = unit
        .promos
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|promo| promo.description.and_then(|d| d.en))
        .collect();

    let unit_amenities = unit
        .amenities
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|amenity| amenity.value)
        .collect();

    RentRecord {
        capture_date: captured_at,
        monthly_rent_online: unit.price.as_ref().and_then(|p| decimal(&p.web)),
        monthly_rent_in_person: unit.price.as_ref().and_then(|p| decimal(&p.instore)),
        unit_description_short: unit.size_category.label.en,
        unit_description_long: unit.description.en,
        // vendor stores the axes the other way round
        dimensions: Dimensions {
            length: decimal(&unit.width).unwrap_or_default(),
            width: decimal(&unit.length).unwrap_or_default(),
            height: decimal(&unit.height).filter(|h| *h != 0.0),
        },
        is_available: available_count.is_some_and(|n| n > 0),
        discounts,
        unit_amenities,
        source: url.to_string(),
        limited_availability: available_count.is_some_and(|n| n < LIMITED_AVAILABILITY_THRESHOLD),
        limited_availability_units_left: available_count
            .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
        limited_availability_text: None,
    }
}

/// Scrape a facility by capturing its `space-types` payload from page traffic
///
/// Every failure leaves as [`ScrapeError::Scrape`] tagged with the phase and url.
pub async fn scrape_via_network(
    session: &dyn BrowserSession,
    url: &str,
    config: &Config,
    sink: Arc<dyn DiagnosticSink>,
) -> ScrapeResult<FacilityRecord> {
    let raw = capture_payload(session, &config.capture, sink.clone())
        .await
        .map_err(|e| e.tagged(Component::NetworkCapture, Phase::Capture, url))?;

    normalize_payload(&raw, url, sink.as_ref())
        .map_err(|e| e.tagged(Component::NetworkCapture, Phase::Normalize, url))
}
