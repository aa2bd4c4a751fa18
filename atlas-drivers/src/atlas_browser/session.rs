use async_trait::async_trait;
use atlas_common::Result;
use serde_json::Value;
use std::time::Duration;

/// Keys the crawler needs to drive autocomplete widgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowDown,
    Enter,
}

/// Capability interface over one live browser session.
///
/// Elements are addressed by CSS selector rather than by handle so the
/// pagination state machine can run against an in-memory fake. Every
/// element operation acts on the first element matching the selector.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate the session to `url`.
    async fn load_page(&mut self, url: &str) -> Result<()>;

    /// URL the session is currently showing (after redirects/navigation).
    async fn current_url(&mut self) -> Result<String>;

    /// Block until any of `selectors` matches, or fail with
    /// [`AtlasError::NavigationTimeout`](atlas_common::AtlasError::NavigationTimeout)
    /// once `timeout` elapses.
    async fn wait_for(&mut self, selectors: &[String], timeout: Duration) -> Result<()>;

    /// Number of elements currently matching `selector`.
    async fn count(&mut self, selector: &str) -> Result<usize>;

    /// Absolute `href`s of the anchors matching `selector`, in DOM order.
    /// Individual elements that cannot be read are skipped.
    async fn query_links(&mut self, selector: &str) -> Result<Vec<String>>;

    /// Run a script in the page and return its JSON result.
    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// Try `selectors` in order, waiting up to `timeout` for each, and return
    /// the first one that matched.
    async fn find_element(
        &mut self,
        selectors: &[String],
        timeout: Duration,
    ) -> Result<Option<String>>;

    /// Empty a text input.
    async fn clear(&mut self, selector: &str) -> Result<()>;

    /// Type `text` into the element.
    async fn type_text(&mut self, selector: &str, text: &str) -> Result<()>;

    /// Send a single key press to the element.
    async fn press_key(&mut self, selector: &str, key: Key) -> Result<()>;

    /// Click the first element matching `selector`; `false` when none exists.
    async fn click_first(&mut self, selector: &str) -> Result<bool>;

    /// Tear the session down. Safe to call once per session on every exit path.
    async fn close(&mut self) -> Result<()>;
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a fresh session, or fail with
    /// [`AtlasError::DriverUnavailable`](atlas_common::AtlasError::DriverUnavailable).
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}
