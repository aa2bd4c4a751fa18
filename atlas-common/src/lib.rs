//! Common types and utilities shared across Atlas crates.
//!
//! This crate defines the configuration schema, observability helpers, and
//! shared error types used throughout the Atlas workspace. It stays
//! dependency‑light so that every crate can depend on it.
//!
//! # Overview
//!
//! - [`AtlasConfig`]: Top‑level runtime configuration (loaded by `atlas-config`)
//! - [`CrawlerSettings`], [`BrowserSettings`], [`LlmSettings`],
//!   [`StoreSettings`], [`LoggingSettings`]: per‑subsystem sections
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`AtlasError`] and [`Result`]: Shared error handling
//!
//! # Examples
//!
//! Constructing a default configuration:
//!
//! ```rust
//! use atlas_common::AtlasConfig;
//!
//! let cfg = AtlasConfig::default();
//! assert_eq!(cfg.crawler.max_pages, 50);
//! assert_eq!(cfg.store.path.to_str(), Some("opportunities.json"));
//! ```
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod observability;

pub use observability::LogFormat;

/// Largest result cap accepted by the search and convert triggers.
pub const MAX_LIMIT: usize = 200;

/// Configuration for the whole discovery pipeline.
///
/// Every section has defaults, so an empty document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub version: Option<String>,
    pub crawler: CrawlerSettings,
    pub browser: BrowserSettings,
    pub llm: LlmSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

/// Where and how the listing site is paginated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Site origin, e.g. `https://www.idealist.org`.
    pub base_url: String,
    /// Path of the search page relative to `base_url`.
    pub search_path: String,
    /// Fixed query parameters added to every search URL.
    pub search_params: BTreeMap<String, String>,
    /// Query parameter that carries the free‑text location.
    pub location_param: String,
    /// Query parameter that carries the 1‑based page number.
    pub page_param: String,
    /// Hard safety cap on the number of pages visited per strategy.
    pub max_pages: u32,
    /// Bound for each "results or empty state" wait.
    pub wait_timeout_ms: u64,
    /// Bound for locating each location‑input candidate during fallback.
    pub input_timeout_ms: u64,
    /// Anchors pointing at opportunity detail pages.
    pub result_selector: String,
    /// Markers of the "no results" empty state. Any match stops the crawl.
    pub empty_selectors: Vec<String>,
    /// Ordered candidates for the location search box; first match wins.
    pub location_input_selectors: Vec<String>,
    /// Ordered candidates for autocomplete suggestion items.
    pub suggestion_selectors: Vec<String>,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.idealist.org".to_string(),
            search_path: "/en/volunteer".to_string(),
            search_params: BTreeMap::from([
                ("locale".to_string(), "en".to_string()),
                ("locationType".to_string(), "ONSITE".to_string()),
            ]),
            location_param: "location".to_string(),
            page_param: "page".to_string(),
            max_pages: 50,
            wait_timeout_ms: 5_000,
            input_timeout_ms: 6_000,
            result_selector: r#"a[href*="/volunteer-opportunity/"]"#.to_string(),
            empty_selectors: vec![
                "h4.sc-1oq5f4p-0.kwsGXs".to_string(),
                r#"[data-qa-id="search-results-hits-empty-clear-refinements"]"#.to_string(),
            ],
            location_input_selectors: vec![
                "#page-header-desktop-search-location".to_string(),
                r#"input[data-qa-id="location-input"]"#.to_string(),
                r#"input[placeholder*="Everywhere"]"#.to_string(),
                r#"input[title="Location"]"#.to_string(),
            ],
            suggestion_selectors: vec![
                r#"ul[role="listbox"] li"#.to_string(),
                r#"li[role="option"]"#.to_string(),
                ".react-autosuggest__suggestion".to_string(),
                ".sc-6f0rgt-0 li".to_string(),
            ],
        }
    }
}

impl CrawlerSettings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }
}

/// WebDriver connection and Chrome launch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// WebDriver endpoint (Chromedriver by default).
    pub webdriver_url: String,
    /// Run Chrome without a visible window.
    pub headless: bool,
    /// Window size as `(width, height)`.
    pub window_size: (u32, u32),
    pub user_agent: String,
    /// Disable image loading to speed up rendering.
    pub block_images: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            window_size: (1400, 900),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
            block_images: true,
        }
    }
}

/// Configuration for the text‑generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmSettings {
    Gemini {
        #[serde(default, skip_serializing)]
        api_key: Option<String>,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default = "default_gemini_base_url")]
        base_url: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    None,
}

pub fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

pub fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self::Gemini {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Location of the persisted opportunity archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("opportunities.json"),
        }
    }
}

/// Logging preferences, mapped onto [`observability::LogConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub app_name: String,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            app_name: "atlas".to_string(),
            dir: None,
            format: LogFormat::Text,
            stderr: false,
            filter: "info".to_string(),
        }
    }
}

/// Error types used across the Atlas system.
#[derive(thiserror::Error, Debug)]
pub enum AtlasError {
    /// A required input was missing or out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The browser automation backend could not be started.
    #[error("Browser driver unavailable: {0}")]
    DriverUnavailable(String),

    /// A bounded page wait elapsed without the expected content.
    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    /// Any other automation command failure.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// The text generator was unreachable or returned an error.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenient alias for results that use [`AtlasError`].
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Validate an optional result cap against `1..=MAX_LIMIT`.
///
/// ```
/// use atlas_common::validate_limit;
///
/// assert!(validate_limit(Some(5)).is_ok());
/// assert!(validate_limit(None).is_ok());
/// assert!(validate_limit(Some(0)).is_err());
/// assert!(validate_limit(Some(201)).is_err());
/// ```
pub fn validate_limit(limit: Option<usize>) -> Result<()> {
    match limit {
        Some(n) if n == 0 || n > MAX_LIMIT => Err(AtlasError::InvalidInput(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {n}"
        ))),
        _ => Ok(()),
    }
}
