//! Canonical facility and rent records produced by both extraction strategies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit size in feet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: Option<f64>,
}

/// One rentable unit as advertised by the facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentRecord {
    pub capture_date: DateTime<Utc>,
    pub monthly_rent_online: Option<f64>,
    pub monthly_rent_in_person: Option<f64>,
    pub unit_description_short: String,
    pub unit_description_long: String,
    pub dimensions: Dimensions,
    pub is_available: bool,
    pub discounts: Vec<String>,
    pub unit_amenities: Vec<String>,
    pub source: String,
    pub limited_availability: bool,
    /// `Some(0)` means the site reported zero units; `None` means no count was given
    pub limited_availability_units_left: Option<u32>,
    pub limited_availability_text: Option<String>,
}

/// A scraped facility with its units in source order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub phone: Option<String>,
    pub website: String,
    pub rents: Vec<RentRecord>,
}

/// Known facility location supplied by the caller, preferred over parsed address text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalFacilityRecord {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}
