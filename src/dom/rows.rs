//! Row field extractors
//!
//! Each extractor reads one field group from a single unit fragment and holds no
//! state, so a markup change on the vendor side touches one function only.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};

use super::dimensions::parse_dimensions;
use super::text::{block_text, element_text, first_match, first_text};
use crate::model::{Dimensions, RentRecord};
use crate::numbers::{first_integer, parse_float_prefix};

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e:?}"))
}

static UNIT_DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector(".unit-description"));
static UNIT_MENU: Lazy<Selector> = Lazy::new(|| selector(".unit-menu"));
static STRUCK_PRICE: Lazy<Selector> = Lazy::new(|| selector("s"));
static PLAIN_PRICE: Lazy<Selector> = Lazy::new(|| selector("span"));
static UNITS_LEFT: Lazy<Selector> = Lazy::new(|| selector(".available-unit-count"));
static UNIT_HEADING: Lazy<Selector> = Lazy::new(|| selector("h4.primary-color"));
static DESCRIPTION_PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p.unit-description"));
static DISCOUNT_ALERT: Lazy<Selector> = Lazy::new(|| selector(".alert-warning"));
static RENT_ACTION: Lazy<Selector> = Lazy::new(|| selector(r#"button[data-kind="rent"]"#));

const RENT_NOW: &str = "Rent Now";

/// Limited-availability field group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitedAvailability {
    pub limited: bool,
    pub text: Option<String>,
    pub units_left: Option<u32>,
}

/// Naming, dimension and discount field group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscountsAndName {
    pub discounts: Vec<String>,
    pub unit_description_short: String,
    pub unit_description_long: String,
    pub dimensions: Dimensions,
}

/// Description lines in document order, empty lines dropped
pub fn scrape_unit_amenities(fragment: ElementRef<'_>) -> Vec<String> {
    fragment
        .select(&UNIT_DESCRIPTION)
        .flat_map(|el| {
            block_text(el)
                .split('\n')
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Online monthly rent; a struck-through price beats the plain one, 0 when absent
pub fn scrape_monthly_rent(fragment: ElementRef<'_>) -> f64 {
    let Some(menu) = first_match(fragment, &UNIT_MENU) else {
        return 0.0;
    };

    if let Some(struck) = first_match(menu, &STRUCK_PRICE) {
        return extract_price(&element_text(struck));
    }

    match first_match(menu, &PLAIN_PRICE) {
        Some(plain) => {
            let text = element_text(plain);
            if text.contains('$') {
                extract_price(&text)
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}

/// `"$1,234.50"` -> `1234.5`; anything unparsable -> `0`
pub fn extract_price(text: &str) -> f64 {
    let cleaned: String = text.trim().chars().filter(|c| *c != '$' && *c != ',').collect();
    parse_float_prefix(&cleaned).unwrap_or(0.0)
}

pub fn scrape_limited_availability(fragment: ElementRef<'_>) -> LimitedAvailability {
    match first_match(fragment, &UNITS_LEFT) {
        Some(marker) => {
            let text = element_text(marker);
            LimitedAvailability {
                limited: true,
                units_left: first_integer(&text),
                text: Some(text),
            }
        }
        None => LimitedAvailability::default(),
    }
}

pub fn scrape_discounts_and_name(fragment: ElementRef<'_>) -> DiscountsAndName {
    let unit_description_short = first_text(fragment, &UNIT_HEADING).unwrap_or_default();
    let unit_description_long = fragment
        .select(&DESCRIPTION_PARAGRAPH)
        .map(|el| element_text(el).trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let dimensions = parse_dimensions(&unit_description_short);

    let discounts = first_text(fragment, &DISCOUNT_ALERT)
        .filter(|d| !d.is_empty())
        .into_iter()
        .collect();

    DiscountsAndName {
        discounts,
        unit_description_short,
        unit_description_long,
        dimensions,
    }
}

/// Available only when the rent button reads exactly "Rent Now"
pub fn scrape_availability(fragment: ElementRef<'_>) -> bool {
    first_text(fragment, &RENT_ACTION).is_some_and(|label| label == RENT_NOW)
}

/// Assemble one [`RentRecord`] from a unit fragment
pub fn scrape_rent_row(
    fragment: ElementRef<'_>,
    url: &str,
    captured_at: DateTime<Utc>,
) -> RentRecord {
    let unit_amenities = scrape_unit_amenities(fragment);
    let monthly_rent_online = scrape_monthly_rent(fragment);
    let limited = scrape_limited_availability(fragment);
    let naming = scrape_discounts_and_name(fragment);
    let is_available = scrape_availability(fragment);

    RentRecord {
        capture_date: captured_at,
        monthly_rent_online: Some(monthly_rent_online),
        monthly_rent_in_person: None,
        unit_description_short: naming.unit_description_short,
        unit_description_long: naming.unit_description_long,
        dimensions: naming.dimensions,
        is_available,
        discounts: naming.discounts,
        unit_amenities,
        source: url.to_string(),
        limited_availability: limited.limited,
        limited_availability_units_left: limited.units_left,
        limited_availability_text: limited.text,
    }
}
