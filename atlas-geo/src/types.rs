use serde::{Deserialize, Serialize};

/// A coordinate pair with an optional, lower-cased country.
///
/// Only the extractor builds these, so `country` is never an empty string
/// and both coordinates are finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    latlon: [f64; 2],
    country: Option<String>,
}

impl GeoRecord {
    pub(crate) fn new(latitude: f64, longitude: f64, country: Option<String>) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        Some(Self {
            latlon: [latitude, longitude],
            country,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latlon[0]
    }

    pub fn longitude(&self) -> f64 {
        self.latlon[1]
    }

    pub fn latlon(&self) -> [f64; 2] {
        self.latlon
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }
}

/// A [`GeoRecord`] with the listing it came from and a display name.
///
/// Serialized flat: `{latlon, country, link, name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub geo: GeoRecord,
    pub link: Option<String>,
    pub name: Option<String>,
}

impl From<GeoRecord> for EnrichedRecord {
    fn from(geo: GeoRecord) -> Self {
        Self {
            geo,
            link: None,
            name: None,
        }
    }
}

/// Lower-case and trim a country token. Blank and literal `null` become `None`.
pub(crate) fn normalize_country(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "null" {
        return None;
    }
    Some(lowered)
}
