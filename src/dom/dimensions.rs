//! Unit size parsing from headings such as `10' x 20'` or `5 x 10 x 8`

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Dimensions;

static DIMENSIONS: Lazy<Regex> = Lazy::new(|| {
    let number = r"(\d+(?:\.\d+)?)";
    let unit = r#"\s*(?:'|’|ft\.?|feet|")?\s*"#;
    let sep = r"(?:x|×|by)";
    Regex::new(&format!(
        r"(?i){number}{unit}{sep}\s*{number}(?:{unit}{sep}\s*{number})?"
    ))
    .expect("DIMENSIONS regex")
});

/// Width, length and optional height from the first `W x L [x H]` in `text`
///
/// Text without a size pattern yields `Dimensions::default()`.
pub fn parse_dimensions(text: &str) -> Dimensions {
    let Some(caps) = DIMENSIONS.captures(text) else {
        return Dimensions::default();
    };
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());

    Dimensions {
        width: number(1).unwrap_or_default(),
        length: number(2).unwrap_or_default(),
        height: number(3),
    }
}
