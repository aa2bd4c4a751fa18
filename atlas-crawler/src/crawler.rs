use crate::urls;
use atlas_common::{validate_limit, AtlasError, CrawlerSettings, Result};
use atlas_drivers::{BrowserLauncher, BrowserSession, Key};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Collects the `href`s of every anchor matching `arguments[0]`, de-duplicated
/// in DOM order, in a single round trip.
pub const LINK_SCRIPT: &str = r#"
const anchors = Array.from(document.querySelectorAll(arguments[0]));
const seen = new Set();
const out = [];
for (const a of anchors) {
    const h = a.href;
    if (h && !seen.has(h)) {
        seen.add(h);
        out.push(h);
    }
}
return out;
"#;

/// Outcome of one crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The location as the caller supplied it.
    pub country: String,
    pub found: usize,
    /// Listing links in first-discovery order.
    pub links: Vec<String>,
}

/// Paginates the listing site for a location and collects detail-page links.
///
/// Each call to [`ListingCrawler::search`] launches its own browser session
/// and closes it on every exit path.
#[derive(Clone)]
pub struct ListingCrawler {
    launcher: Arc<dyn BrowserLauncher>,
    settings: CrawlerSettings,
}

/// Order-preserving, de-duplicating accumulator with an optional cap.
struct Collected {
    links: Vec<String>,
    seen: HashSet<String>,
    limit: Option<usize>,
}

impl Collected {
    fn new(limit: Option<usize>) -> Self {
        Self {
            links: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    fn full(&self) -> bool {
        self.limit.is_some_and(|cap| self.links.len() >= cap)
    }

    /// Returns how many links were new.
    fn absorb(&mut self, hrefs: Vec<String>) -> usize {
        let mut added = 0;
        for href in hrefs {
            if self.full() {
                break;
            }
            if self.seen.insert(href.clone()) {
                self.links.push(href);
                added += 1;
            }
        }
        added
    }
}

impl ListingCrawler {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, settings: CrawlerSettings) -> Self {
        Self { launcher, settings }
    }

    pub fn settings(&self) -> &CrawlerSettings {
        &self.settings
    }

    /// Crawl the listing pages for `location`.
    ///
    /// Fails with [`AtlasError::InvalidInput`] for a blank location or a limit
    /// outside `1..=200`, and with [`AtlasError::DriverUnavailable`] when no
    /// browser session can be started. Everything that goes wrong after the
    /// session is up is recovered and logged.
    pub async fn search(&self, location: &str, limit: Option<usize>) -> Result<SearchResult> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            return Err(AtlasError::InvalidInput(
                "location must not be empty".to_string(),
            ));
        }
        validate_limit(limit)?;
        let initial = urls::initial_search_url(&self.settings, trimmed)?;

        let mut session = self.launcher.launch().await?;
        let mut links = self.paginate(session.as_mut(), trimmed, initial, limit).await;
        if let Err(e) = session.close().await {
            warn!(target: "crawler", error = %e, "crawler.session.close_failed");
        }

        if let Some(cap) = limit {
            links.truncate(cap);
        }
        info!(target: "crawler", location = trimmed, found = links.len(), "crawler.search.done");
        Ok(SearchResult {
            country: location.to_string(),
            found: links.len(),
            links,
        })
    }

    async fn paginate(
        &self,
        session: &mut dyn BrowserSession,
        location: &str,
        initial: Url,
        limit: Option<usize>,
    ) -> Vec<String> {
        let mut collected = Collected::new(limit);
        let mut base = initial;
        let mut page: u32 = 1;
        let mut fallback_used = false;

        while page <= self.settings.max_pages {
            let page_url = urls::with_page(&base, &self.settings.page_param, page);
            if let Err(e) = session.load_page(page_url.as_str()).await {
                warn!(target: "crawler", page, url = %page_url, error = %e, "crawler.page.load_failed");
            }
            self.await_results(session).await;

            if self.empty_state(session).await {
                info!(target: "crawler", page, "crawler.page.empty_state");
                break;
            }

            let hrefs = self.page_links(session).await;
            let seen_on_page = hrefs.len();
            let added = collected.absorb(hrefs);
            debug!(
                target: "crawler",
                page,
                seen_on_page,
                added,
                total = collected.links.len(),
                "crawler.page.loaded"
            );
            if collected.full() {
                break;
            }

            page += 1;

            if page == 2 && collected.links.is_empty() && !fallback_used {
                fallback_used = true;
                if let Some(typed) = self.fallback_navigation(session, location).await {
                    info!(target: "crawler", url = %typed, "crawler.fallback.resumed");
                    base = typed;
                    page = 1;
                }
            }
        }

        if page > self.settings.max_pages {
            info!(target: "crawler", max_pages = self.settings.max_pages, "crawler.page_cap_reached");
        }
        collected.links
    }

    fn wait_selectors(&self) -> Vec<String> {
        let mut selectors = vec![self.settings.result_selector.clone()];
        selectors.extend(self.settings.empty_selectors.iter().cloned());
        selectors
    }

    /// Wait for results or the empty state. A timeout only means we look anyway.
    async fn await_results(&self, session: &mut dyn BrowserSession) {
        if let Err(e) = session
            .wait_for(&self.wait_selectors(), self.settings.wait_timeout())
            .await
        {
            debug!(target: "crawler", error = %e, "crawler.page.wait_elapsed");
        }
    }

    async fn empty_state(&self, session: &mut dyn BrowserSession) -> bool {
        for selector in &self.settings.empty_selectors {
            match session.count(selector).await {
                Ok(n) if n > 0 => return true,
                Ok(_) => {}
                Err(e) => debug!(target: "crawler", %selector, error = %e, "crawler.empty_check.failed"),
            }
        }
        false
    }

    /// Script first, anchor-by-anchor second, nothing on double failure.
    async fn page_links(&self, session: &mut dyn BrowserSession) -> Vec<String> {
        let selector = &self.settings.result_selector;
        match session
            .execute_script(LINK_SCRIPT, vec![json!(selector)])
            .await
        {
            Ok(Value::Array(items)) => {
                return items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) if !s.is_empty() => Some(s),
                        _ => None,
                    })
                    .collect();
            }
            Ok(other) => {
                debug!(target: "crawler", kind = ?other, "crawler.links.script_not_array");
            }
            Err(e) => {
                debug!(target: "crawler", error = %e, "crawler.links.script_failed");
            }
        }
        match session.query_links(selector).await {
            Ok(hrefs) => hrefs,
            Err(e) => {
                warn!(target: "crawler", error = %e, "crawler.links.query_failed");
                Vec::new()
            }
        }
    }

    /// Drive the location input on the bare search page and return the URL
    /// the site lands on. `None` keeps paginating the direct URL.
    async fn fallback_navigation(
        &self,
        session: &mut dyn BrowserSession,
        location: &str,
    ) -> Option<Url> {
        info!(target: "crawler", "crawler.fallback.start");
        let bare = urls::bare_search_url(&self.settings).ok()?;
        if let Err(e) = session.load_page(bare.as_str()).await {
            warn!(target: "crawler", error = %e, "crawler.fallback.load_failed");
            return None;
        }

        let input = match session
            .find_element(
                &self.settings.location_input_selectors,
                self.settings.input_timeout(),
            )
            .await
        {
            Ok(Some(selector)) => selector,
            Ok(None) => {
                info!(target: "crawler", "crawler.fallback.no_input");
                return None;
            }
            Err(e) => {
                warn!(target: "crawler", error = %e, "crawler.fallback.find_failed");
                return None;
            }
        };

        if let Err(e) = session.clear(&input).await {
            debug!(target: "crawler", error = %e, "crawler.fallback.clear_failed");
        }
        if let Err(e) = session.type_text(&input, location).await {
            warn!(target: "crawler", error = %e, "crawler.fallback.type_failed");
            return None;
        }
        self.pick_suggestion(session, &input).await;
        self.await_results(session).await;

        match session.current_url().await {
            Ok(current) => match Url::parse(&current) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(target: "crawler", %current, error = %e, "crawler.fallback.bad_url");
                    None
                }
            },
            Err(e) => {
                warn!(target: "crawler", error = %e, "crawler.fallback.url_failed");
                None
            }
        }
    }

    /// Arrow-down + enter, else click a suggestion, else plain enter.
    async fn pick_suggestion(&self, session: &mut dyn BrowserSession, input: &str) {
        let keyed = match session.press_key(input, Key::ArrowDown).await {
            Ok(()) => session.press_key(input, Key::Enter).await,
            Err(e) => Err(e),
        };
        let Err(e) = keyed else {
            return;
        };
        debug!(target: "crawler", error = %e, "crawler.fallback.keys_failed");

        for selector in &self.settings.suggestion_selectors {
            match session.click_first(selector).await {
                Ok(true) => {
                    debug!(target: "crawler", %selector, "crawler.fallback.suggestion_clicked");
                    return;
                }
                Ok(false) => {}
                Err(e) => debug!(target: "crawler", %selector, error = %e, "crawler.fallback.click_failed"),
            }
        }
        if let Err(e) = session.press_key(input, Key::Enter).await {
            warn!(target: "crawler", error = %e, "crawler.fallback.submit_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, FakePage, FakeSite};

    fn links(prefix: &str, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("https://www.idealist.org/en/volunteer-opportunity/{prefix}{i}-role-{i}"))
            .collect()
    }

    fn crawler(launcher: &FakeLauncher) -> ListingCrawler {
        ListingCrawler::new(Arc::new(launcher.clone()), CrawlerSettings::default())
    }

    #[tokio::test]
    async fn collects_across_pages_until_empty_state() {
        let site = FakeSite::with_direct(vec![
            FakePage::with_links(links("a", 3)),
            FakePage::with_links(links("b", 2)),
        ]);
        let launcher = FakeLauncher::new(site);
        let result = crawler(&launcher).search("Japan", None).await.unwrap();

        assert_eq!(result.found, 5);
        assert_eq!(result.links[0], links("a", 3)[0]);
        assert_eq!(result.links[3], links("b", 2)[0]);
        assert_eq!(result.country, "Japan");
        let log = launcher.log();
        assert_eq!(log.visited.len(), 3, "two result pages then the empty one");
        assert_eq!(log.closed, 1);
    }

    #[tokio::test]
    async fn limit_caps_links_even_when_pages_have_more() {
        let site = FakeSite::with_direct(vec![
            FakePage::with_links(links("a", 4)),
            FakePage::with_links(links("b", 4)),
        ]);
        let launcher = FakeLauncher::new(site);
        let result = crawler(&launcher).search("Japan", Some(5)).await.unwrap();

        assert_eq!(result.found, 5);
        assert_eq!(result.links.len(), 5);
        assert_eq!(launcher.log().visited.len(), 2, "stops as soon as the cap is met");
    }

    #[tokio::test]
    async fn immediate_empty_state_finds_nothing_without_paging() {
        let launcher = FakeLauncher::new(FakeSite::with_direct(vec![FakePage::empty()]));
        let result = crawler(&launcher).search("Atlantis", None).await.unwrap();

        assert_eq!(result.found, 0);
        assert!(result.links.is_empty());
        let log = launcher.log();
        assert_eq!(log.visited.len(), 1);
        assert!(log.typed.is_empty(), "empty marker stops before any fallback");
    }

    #[tokio::test]
    async fn duplicates_across_pages_keep_first_position() {
        let first = links("a", 3);
        let mut second = vec![first[1].clone()];
        second.extend(links("b", 1));
        let launcher = FakeLauncher::new(FakeSite::with_direct(vec![
            FakePage::with_links(first.clone()),
            FakePage::with_links(second),
        ]));
        let result = crawler(&launcher).search("Japan", None).await.unwrap();

        assert_eq!(result.found, 4);
        assert_eq!(&result.links[..3], &first[..]);
        assert_eq!(result.links[3], links("b", 1)[0]);
    }

    #[tokio::test]
    async fn zero_link_first_page_switches_to_typed_location_once() {
        let mut site = FakeSite::with_direct(vec![FakePage::with_links(vec![])]);
        site.endless = true;
        site.typed_pages = vec![FakePage::with_links(links("t", 2))];
        let launcher = FakeLauncher::new(site);
        let result = crawler(&launcher).search("Kyoto", None).await.unwrap();

        assert_eq!(result.links, links("t", 2));
        let log = launcher.log();
        assert_eq!(log.typed, vec!["Kyoto".to_string()]);
        assert_eq!(log.keys, vec![Key::ArrowDown, Key::Enter]);
        assert_eq!(log.closed, 1);
    }

    #[tokio::test]
    async fn fallback_happens_at_most_once() {
        let mut site = FakeSite::with_direct(vec![]);
        site.endless = true;
        site.typed_pages = vec![];
        let launcher = FakeLauncher::new(site);
        let settings = CrawlerSettings {
            max_pages: 4,
            ..CrawlerSettings::default()
        };
        let result = ListingCrawler::new(Arc::new(launcher.clone()), settings)
            .search("Atlantis", None)
            .await
            .unwrap();

        assert_eq!(result.found, 0);
        let log = launcher.log();
        assert_eq!(log.typed.len(), 1);
        // 1 direct page, the bare page, then 4 typed pages up to the cap.
        assert_eq!(log.visited.len(), 6);
    }

    #[tokio::test]
    async fn failing_arrow_keys_fall_back_to_clicking_a_suggestion() {
        let mut site = FakeSite::with_direct(vec![FakePage::with_links(vec![])]);
        site.arrow_keys_fail = true;
        site.suggestion_selectors = vec![r#"li[role="option"]"#.to_string()];
        site.typed_pages = vec![FakePage::with_links(links("t", 1))];
        let launcher = FakeLauncher::new(site);
        let result = crawler(&launcher).search("Osaka", None).await.unwrap();

        assert_eq!(result.found, 1);
        assert_eq!(launcher.log().clicked, vec![r#"li[role="option"]"#.to_string()]);
    }

    #[tokio::test]
    async fn no_suggestions_submits_with_enter() {
        let mut site = FakeSite::with_direct(vec![FakePage::with_links(vec![])]);
        site.arrow_keys_fail = true;
        site.typed_pages = vec![FakePage::with_links(links("t", 1))];
        let launcher = FakeLauncher::new(site);
        let result = crawler(&launcher).search("Osaka", None).await.unwrap();

        assert_eq!(result.found, 1);
        let log = launcher.log();
        assert!(log.clicked.is_empty());
        assert_eq!(log.keys.last(), Some(&Key::Enter));
    }

    #[tokio::test]
    async fn missing_location_input_keeps_paginating_the_direct_url() {
        let mut site = FakeSite::with_direct(vec![
            FakePage::with_links(vec![]),
            FakePage::with_links(links("late", 2)),
        ]);
        site.input_selectors.clear();
        let launcher = FakeLauncher::new(site);
        let result = crawler(&launcher).search("Lima", None).await.unwrap();

        assert_eq!(result.links, links("late", 2));
        assert!(launcher.log().typed.is_empty());
    }

    #[tokio::test]
    async fn script_failure_falls_back_to_anchor_queries() {
        let page = FakePage {
            script_fails: true,
            ..FakePage::with_links(links("s", 2))
        };
        let launcher = FakeLauncher::new(FakeSite::with_direct(vec![page]));
        let result = crawler(&launcher).search("Japan", None).await.unwrap();
        assert_eq!(result.links, links("s", 2));
    }

    #[tokio::test]
    async fn unreadable_page_counts_as_zero_links_and_crawl_continues() {
        let unreadable = FakePage {
            script_fails: true,
            query_fails: true,
            ..FakePage::with_links(links("b", 2))
        };
        let launcher = FakeLauncher::new(FakeSite::with_direct(vec![
            FakePage::with_links(links("a", 1)),
            unreadable,
            FakePage::with_links(links("c", 1)),
        ]));
        let result = crawler(&launcher).search("Japan", None).await.unwrap();

        assert_eq!(result.links, vec![links("a", 1)[0].clone(), links("c", 1)[0].clone()]);
        let log = launcher.log();
        assert_eq!(log.visited.len(), 4, "three pages then the empty one");
        assert_eq!(log.closed, 1);
    }

    #[tokio::test]
    async fn page_load_failure_is_treated_as_zero_links() {
        let broken = FakePage {
            load_fails: true,
            ..FakePage::with_links(vec![])
        };
        let launcher = FakeLauncher::new(FakeSite::with_direct(vec![
            FakePage::with_links(links("a", 1)),
            broken,
            FakePage::with_links(links("c", 1)),
        ]));
        let result = crawler(&launcher).search("Japan", None).await.unwrap();
        assert_eq!(result.found, 2);
    }

    #[tokio::test]
    async fn endless_site_is_bounded_by_max_pages() {
        let mut site = FakeSite::with_direct(vec![FakePage::with_links(links("a", 1))]);
        site.endless = true;
        let launcher = FakeLauncher::new(site);
        let settings = CrawlerSettings {
            max_pages: 7,
            ..CrawlerSettings::default()
        };
        let result = ListingCrawler::new(Arc::new(launcher.clone()), settings)
            .search("Japan", None)
            .await
            .unwrap();
        assert_eq!(result.found, 1);
        assert_eq!(launcher.log().visited.len(), 7);
    }

    #[tokio::test]
    async fn unavailable_driver_fails_fast() {
        let launcher = FakeLauncher::failing();
        let err = crawler(&launcher).search("Japan", None).await.unwrap_err();
        assert!(matches!(err, AtlasError::DriverUnavailable(_)));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_launch() {
        let launcher = FakeLauncher::new(FakeSite::with_direct(vec![]));
        let c = crawler(&launcher);
        assert!(matches!(
            c.search("   ", None).await,
            Err(AtlasError::InvalidInput(_))
        ));
        assert!(matches!(
            c.search("Japan", Some(0)).await,
            Err(AtlasError::InvalidInput(_))
        ));
        assert!(matches!(
            c.search("Japan", Some(201)).await,
            Err(AtlasError::InvalidInput(_))
        ));
        assert_eq!(launcher.log().launches, 0);
    }
}
