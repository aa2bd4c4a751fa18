use crate::atlas_browser::{
    launch::{build_capabilities, LaunchProfile},
    session::{BrowserLauncher, BrowserSession, Key},
};
use anyhow::anyhow;
use async_trait::async_trait;
use atlas_common::{AtlasError, BrowserSettings, Result};
use fantoccini::{error::CmdError, Client, ClientBuilder, Locator};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

fn cmd_err(err: CmdError) -> AtlasError {
    AtlasError::Driver(anyhow::Error::from(err))
}

fn wd_key(key: Key) -> char {
    match key {
        Key::ArrowDown => char::from(fantoccini::key::Key::Down),
        Key::Enter => char::from(fantoccini::key::Key::Enter),
    }
}

/// Thin wrapper around a `fantoccini` WebDriver client.
///
/// The client is dropped on [`BrowserSession::close`]; any later command
/// fails with a driver error instead of panicking.
pub struct AtlasDriver {
    client: Option<Client>,
}

impl AtlasDriver {
    /// Connect to a running WebDriver service using one launch profile.
    pub async fn connect(settings: &BrowserSettings, profile: LaunchProfile) -> Result<Self> {
        let caps = build_capabilities(profile, settings, std::env::consts::OS);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&settings.webdriver_url)
            .await
            .map_err(|e| AtlasError::DriverUnavailable(e.to_string()))?;
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| AtlasError::Driver(anyhow!("browser session already closed")))
    }

    async fn first(&self, selector: &str) -> Result<fantoccini::elements::Element> {
        self.client()?
            .find(Locator::Css(selector))
            .await
            .map_err(cmd_err)
    }
}

#[async_trait]
impl BrowserSession for AtlasDriver {
    async fn load_page(&mut self, url: &str) -> Result<()> {
        debug!(%url, "browser.goto");
        self.client()?.goto(url).await.map_err(cmd_err)
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self.client()?.current_url().await.map_err(cmd_err)?;
        Ok(url.to_string())
    }

    async fn wait_for(&mut self, selectors: &[String], timeout: Duration) -> Result<()> {
        let joined = selectors.join(", ");
        match self
            .client()?
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(&joined))
            .await
        {
            Ok(_) => Ok(()),
            Err(CmdError::WaitTimeout) => Err(AtlasError::NavigationTimeout(timeout)),
            Err(e) => Err(cmd_err(e)),
        }
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        let found = self
            .client()?
            .find_all(Locator::Css(selector))
            .await
            .map_err(cmd_err)?;
        Ok(found.len())
    }

    async fn query_links(&mut self, selector: &str) -> Result<Vec<String>> {
        let anchors = self
            .client()?
            .find_all(Locator::Css(selector))
            .await
            .map_err(cmd_err)?;
        let mut hrefs = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            // `href` as a property is already resolved against the page URL.
            match anchor.prop("href").await {
                Ok(Some(href)) if !href.is_empty() => hrefs.push(href),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "browser.link.unreadable"),
            }
        }
        Ok(hrefs)
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.client()?.execute(script, args).await.map_err(cmd_err)
    }

    async fn find_element(
        &mut self,
        selectors: &[String],
        timeout: Duration,
    ) -> Result<Option<String>> {
        for selector in selectors {
            let found = self
                .client()?
                .wait()
                .at_most(timeout)
                .for_element(Locator::Css(selector))
                .await;
            match found {
                Ok(_) => return Ok(Some(selector.clone())),
                Err(CmdError::WaitTimeout) => continue,
                Err(e) => {
                    debug!(%selector, error = %e, "browser.find.failed");
                    continue;
                }
            }
        }
        Ok(None)
    }

    async fn clear(&mut self, selector: &str) -> Result<()> {
        let element = self.first(selector).await?;
        element.click().await.map_err(cmd_err)?;
        let select_all = format!("{}a", char::from(fantoccini::key::Key::Control));
        let keyboard = async {
            element.send_keys(&select_all).await?;
            element
                .send_keys(&char::from(fantoccini::key::Key::Delete).to_string())
                .await
        };
        if let Err(e) = keyboard.await {
            debug!(error = %e, "browser.clear.keyboard_failed");
            element.clear().await.map_err(cmd_err)?;
        }
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let element = self.first(selector).await?;
        element.send_keys(text).await.map_err(cmd_err)
    }

    async fn press_key(&mut self, selector: &str, key: Key) -> Result<()> {
        let element = self.first(selector).await?;
        element
            .send_keys(&wd_key(key).to_string())
            .await
            .map_err(cmd_err)
    }

    async fn click_first(&mut self, selector: &str) -> Result<bool> {
        let found = self
            .client()?
            .find_all(Locator::Css(selector))
            .await
            .map_err(cmd_err)?;
        match found.into_iter().next() {
            Some(element) => {
                element.click().await.map_err(cmd_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await.map_err(cmd_err)?;
            debug!("browser.closed");
        }
        Ok(())
    }
}

/// Launches Chrome through Chromedriver, trying each [`LaunchProfile`] in
/// turn until one connects.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let mut last_error = String::from("no launch profile attempted");
        for profile in LaunchProfile::ordered(self.settings.headless) {
            match AtlasDriver::connect(&self.settings, profile).await {
                Ok(driver) => {
                    info!(?profile, webdriver = %self.settings.webdriver_url, "browser.launched");
                    return Ok(Box::new(driver));
                }
                Err(e) => {
                    warn!(?profile, error = %e, "browser.launch.profile_failed");
                    last_error = match e {
                        AtlasError::DriverUnavailable(msg) => msg,
                        other => other.to_string(),
                    };
                }
            }
        }
        Err(AtlasError::DriverUnavailable(last_error))
    }
}
