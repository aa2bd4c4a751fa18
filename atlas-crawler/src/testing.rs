//! In-memory stand-ins for a browser session, for exercising the crawl state
//! machine without Chrome.
//!
//! A [`FakeSite`] resolves URLs by their query string: a URL carrying the
//! location parameter serves `direct_pages`, one with only a page parameter
//! serves `typed_pages` (what the site shows after the location box is
//! used), and anything else is the bare search page holding the location
//! input.
use anyhow::anyhow;
use async_trait::async_trait;
use atlas_common::{AtlasError, CrawlerSettings, Result};
use atlas_drivers::{BrowserLauncher, BrowserSession, Key};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub links: Vec<String>,
    /// Shows the "no results" marker.
    pub empty: bool,
    pub script_fails: bool,
    /// Anchor queries error out as well.
    pub query_fails: bool,
    pub load_fails: bool,
}

impl FakePage {
    pub fn with_links(links: Vec<String>) -> Self {
        Self {
            links,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self {
            empty: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeSite {
    pub direct_pages: Vec<FakePage>,
    pub typed_pages: Vec<FakePage>,
    /// Past the scripted pages, serve link-less pages instead of the empty state.
    pub endless: bool,
    /// Location-input selectors present on the bare page.
    pub input_selectors: Vec<String>,
    /// Where the site lands once a location is submitted.
    pub typed_url: String,
    pub arrow_keys_fail: bool,
    /// Suggestion selectors that have at least one item.
    pub suggestion_selectors: Vec<String>,
    location_param: String,
    page_param: String,
}

impl FakeSite {
    pub fn with_direct(direct_pages: Vec<FakePage>) -> Self {
        let settings = CrawlerSettings::default();
        Self {
            direct_pages,
            typed_pages: Vec::new(),
            endless: false,
            input_selectors: settings.location_input_selectors.clone(),
            typed_url: format!(
                "{}{}?locale=en&locationType=ONSITE&lat=35.68&lng=139.69",
                settings.base_url, settings.search_path
            ),
            arrow_keys_fail: false,
            suggestion_selectors: Vec::new(),
            location_param: settings.location_param,
            page_param: settings.page_param,
        }
    }

    fn resolve(&self, url: &str) -> Option<FakePage> {
        let parsed = Url::parse(url).ok()?;
        let mut has_location = false;
        let mut page = None;
        for (k, v) in parsed.query_pairs() {
            if k == self.location_param.as_str() {
                has_location = true;
            } else if k == self.page_param.as_str() {
                page = v.parse::<usize>().ok();
            }
        }
        let pages = match (has_location, page) {
            (true, _) => &self.direct_pages,
            (false, Some(_)) => &self.typed_pages,
            (false, None) => return None,
        };
        let index = page.unwrap_or(1).saturating_sub(1);
        Some(match pages.get(index) {
            Some(p) => p.clone(),
            None if self.endless => FakePage::default(),
            None => FakePage::empty(),
        })
    }
}

/// Everything the fake browser was asked to do.
#[derive(Debug, Clone, Default)]
pub struct FakeLog {
    pub launches: usize,
    pub visited: Vec<String>,
    pub typed: Vec<String>,
    pub keys: Vec<Key>,
    pub clicked: Vec<String>,
    pub closed: usize,
}

#[derive(Clone)]
pub struct FakeLauncher {
    site: FakeSite,
    log: Arc<Mutex<FakeLog>>,
    fail: bool,
}

fn lock(log: &Mutex<FakeLog>) -> MutexGuard<'_, FakeLog> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            log: Arc::default(),
            fail: false,
        }
    }

    /// A launcher whose browser never starts.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(FakeSite::with_direct(Vec::new()))
        }
    }

    pub fn log(&self) -> FakeLog {
        lock(&self.log).clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if self.fail {
            return Err(AtlasError::DriverUnavailable(
                "chromedriver not reachable".to_string(),
            ));
        }
        lock(&self.log).launches += 1;
        Ok(Box::new(FakeBrowser {
            site: self.site.clone(),
            log: Arc::clone(&self.log),
            current: String::new(),
        }))
    }
}

pub struct FakeBrowser {
    site: FakeSite,
    log: Arc<Mutex<FakeLog>>,
    current: String,
}

impl FakeBrowser {
    fn page(&self) -> Option<FakePage> {
        self.site.resolve(&self.current)
    }

    fn on_bare_page(&self) -> bool {
        self.page().is_none()
    }

    fn submit(&mut self) {
        if self.on_bare_page() {
            self.current = self.site.typed_url.clone();
        }
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn load_page(&mut self, url: &str) -> Result<()> {
        lock(&self.log).visited.push(url.to_string());
        if self.site.resolve(url).is_some_and(|p| p.load_fails) {
            self.current = "about:blank".to_string();
            return Err(AtlasError::Driver(anyhow!("net::ERR_CONNECTION_RESET")));
        }
        self.current = url.to_string();
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn wait_for(&mut self, _selectors: &[String], timeout: Duration) -> Result<()> {
        match self.page() {
            Some(p) if p.empty || !p.links.is_empty() => Ok(()),
            _ => Err(AtlasError::NavigationTimeout(timeout)),
        }
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        let page = self.page().unwrap_or_default();
        if selector.contains("volunteer-opportunity") {
            Ok(page.links.len())
        } else {
            Ok(usize::from(page.empty))
        }
    }

    async fn query_links(&mut self, _selector: &str) -> Result<Vec<String>> {
        let page = self.page().unwrap_or_default();
        if page.query_fails {
            return Err(AtlasError::Driver(anyhow!("stale element reference")));
        }
        Ok(page.links)
    }

    async fn execute_script(&mut self, _script: &str, _args: Vec<Value>) -> Result<Value> {
        let page = self.page().unwrap_or_default();
        if page.script_fails {
            return Err(AtlasError::Driver(anyhow!("javascript error")));
        }
        let mut seen = std::collections::HashSet::new();
        let unique: Vec<_> = page.links.into_iter().filter(|l| seen.insert(l.clone())).collect();
        Ok(json!(unique))
    }

    async fn find_element(
        &mut self,
        selectors: &[String],
        _timeout: Duration,
    ) -> Result<Option<String>> {
        if !self.on_bare_page() {
            return Ok(None);
        }
        Ok(selectors
            .iter()
            .find(|s| self.site.input_selectors.contains(*s))
            .cloned())
    }

    async fn clear(&mut self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn type_text(&mut self, _selector: &str, text: &str) -> Result<()> {
        lock(&self.log).typed.push(text.to_string());
        Ok(())
    }

    async fn press_key(&mut self, _selector: &str, key: Key) -> Result<()> {
        if key == Key::ArrowDown && self.site.arrow_keys_fail {
            return Err(AtlasError::Driver(anyhow!("element not interactable")));
        }
        lock(&self.log).keys.push(key);
        if key == Key::Enter {
            self.submit();
        }
        Ok(())
    }

    async fn click_first(&mut self, selector: &str) -> Result<bool> {
        if !self.site.suggestion_selectors.iter().any(|s| s == selector) {
            return Ok(false);
        }
        lock(&self.log).clicked.push(selector.to_string());
        self.submit();
        Ok(true)
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.log).closed += 1;
        Ok(())
    }
}
