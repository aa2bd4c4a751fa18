//! Recovery parser for coordinate lists in generated text.
//!
//! The expected shape is a JSON array of `{"latlon": [lat, lon], "country": ".."}`,
//! but model output is frequently fenced, escaped, truncated or otherwise
//! broken. [`ResponseExtractor`] runs an ordered list of [`ExtractionTier`]s
//! over the cleaned text and returns the first non-empty result.
use crate::types::{normalize_country, GeoRecord};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

/// How far (in characters) to look either side of a coordinate match for its country.
pub const COUNTRY_WINDOW: usize = 500;

static FENCE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid fence regex"));
static FENCE_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("valid fence regex"));
static LATLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)"latlon"\s*:\s*\[?\s*([+-]?\d+(?:\.\d+)?)\s*,\s*([+-]?\d+(?:\.\d+)?)\s*\]?"#,
    )
    .expect("valid latlon regex")
});
static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*([+-]?\d+(?:\.\d+)?)\s*,\s*([+-]?\d+(?:\.\d+)?)\s*\]")
        .expect("valid pair regex")
});
// Double-quoted, single-quoted or bare value.
static COUNTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)"country"\s*:\s*(?:"([^"'},\]]+)"|'([^"'},\]]+)'|([^"'},\]]+))"#,
    )
    .expect("valid country regex")
});

/// Records produced by one tier, plus candidates it had to drop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierOutput {
    pub records: Vec<GeoRecord>,
    /// Candidates whose coordinates could not be coerced to finite floats.
    pub skipped: usize,
}

/// One recovery strategy. A tier "applies" when it yields at least one record.
pub trait ExtractionTier: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, text: &str) -> TierOutput;
}

/// Outcome of [`ResponseExtractor::extract`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub records: Vec<GeoRecord>,
    /// Name of the tier that produced `records`, `None` when nothing matched.
    pub tier: Option<&'static str>,
    pub skipped: usize,
}

/// Full JSON parse of an array of objects with a two-element `latlon`.
#[derive(Debug, Default)]
pub struct StrictJson;

/// `"latlon"` followed by two numbers, brackets optional, anywhere in the text.
#[derive(Debug, Default)]
pub struct LatlonPattern;

/// Any `[number, number]` pair.
#[derive(Debug, Default)]
pub struct BracketPairs;

pub struct ResponseExtractor {
    tiers: Vec<Box<dyn ExtractionTier>>,
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::with_tiers(vec![
            Box::new(StrictJson),
            Box::new(LatlonPattern),
            Box::new(BracketPairs),
        ])
    }
}

impl ResponseExtractor {
    pub fn with_tiers(tiers: Vec<Box<dyn ExtractionTier>>) -> Self {
        Self { tiers }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Recover coordinate records from `raw`. Never fails; the worst case is
    /// an empty extraction.
    pub fn extract(&self, raw: &str) -> Extraction {
        let text = unwrap_payload(raw);
        let mut skipped = 0;
        for tier in &self.tiers {
            let out = tier.extract(&text);
            skipped += out.skipped;
            if !out.records.is_empty() {
                tracing::debug!(
                    tier = tier.name(),
                    records = out.records.len(),
                    skipped,
                    "geo.extract.matched"
                );
                return Extraction {
                    records: out.records,
                    tier: Some(tier.name()),
                    skipped,
                };
            }
        }
        tracing::debug!(skipped, "geo.extract.nothing");
        Extraction {
            records: Vec::new(),
            tier: None,
            skipped,
        }
    }
}

/// Strip code fences and, when the whole payload is a JSON string literal,
/// unescape it once.
pub fn unwrap_payload(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(m) = FENCE_OPEN_RE.find(text) {
        text = &text[m.end()..];
    }
    if let Some(m) = FENCE_CLOSE_RE.find(text) {
        text = &text[..m.start()];
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        if let Ok(inner) = serde_json::from_str::<String>(text) {
            return inner;
        }
    }
    text.to_string()
}

fn coerce(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn scalar_country(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => normalize_country(s),
        Value::Number(n) => normalize_country(&n.to_string()),
        Value::Bool(b) => normalize_country(&b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl ExtractionTier for StrictJson {
    fn name(&self) -> &'static str {
        "strict_json"
    }

    fn extract(&self, text: &str) -> TierOutput {
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) else {
            return TierOutput::default();
        };
        let mut out = TierOutput::default();
        for item in &items {
            let Some(obj) = item.as_object() else {
                continue;
            };
            let Some(pair) = obj.get("latlon").and_then(Value::as_array) else {
                continue;
            };
            if pair.len() != 2 {
                continue;
            }
            let record = match (coerce(&pair[0]), coerce(&pair[1])) {
                (Some(lat), Some(lon)) => {
                    GeoRecord::new(lat, lon, scalar_country(obj.get("country")))
                }
                _ => None,
            };
            match record {
                Some(r) => out.records.push(r),
                None => out.skipped += 1,
            }
        }
        out
    }
}

impl ExtractionTier for LatlonPattern {
    fn name(&self) -> &'static str {
        "latlon_pattern"
    }

    fn extract(&self, text: &str) -> TierOutput {
        pattern_records(&LATLON_RE, text)
    }
}

impl ExtractionTier for BracketPairs {
    fn name(&self) -> &'static str {
        "bracket_pairs"
    }

    fn extract(&self, text: &str) -> TierOutput {
        pattern_records(&PAIR_RE, text)
    }
}

fn pattern_records(re: &Regex, text: &str) -> TierOutput {
    let mut out = TierOutput::default();
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(lat), Some(lon)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let parsed = lat
            .as_str()
            .parse::<f64>()
            .ok()
            .zip(lon.as_str().parse::<f64>().ok());
        let record = parsed.and_then(|(lat, lon)| {
            GeoRecord::new(lat, lon, country_near(text, whole.start(), whole.end()))
        });
        match record {
            Some(r) => out.records.push(r),
            None => out.skipped += 1,
        }
    }
    out
}

fn country_value(caps: &Captures<'_>) -> Option<String> {
    let value = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    normalize_country(value.as_str())
}

/// Country for a match spanning `start..end`: the first `"country"` token
/// within the window after it, else the nearest within the window before it,
/// else the first anywhere in the text. The chosen token wins even when its
/// value is `null`. Looking backward takes the nearest token rather than the
/// first one in the window, so a record never borrows an earlier record's country.
fn country_near(text: &str, start: usize, end: usize) -> Option<String> {
    let forward = &text[end..advance(text, end, COUNTRY_WINDOW)];
    if let Some(caps) = COUNTRY_RE.captures(forward) {
        return country_value(&caps);
    }
    let backward = &text[retreat(text, start, COUNTRY_WINDOW)..start];
    if let Some(caps) = COUNTRY_RE.captures_iter(backward).last() {
        return country_value(&caps);
    }
    COUNTRY_RE.captures(text).and_then(|c| country_value(&c))
}

/// Byte offset `chars` characters after `from`, clamped to the end.
fn advance(text: &str, from: usize, chars: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(i, _)| from + i)
}

/// Byte offset `chars` characters before `to`, clamped to the start.
fn retreat(text: &str, to: usize, chars: usize) -> usize {
    if chars == 0 {
        return to;
    }
    text[..to]
        .char_indices()
        .rev()
        .nth(chars - 1)
        .map_or(0, |(i, _)| i)
}
