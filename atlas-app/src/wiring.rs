use anyhow::{Context, Result};
use atlas_common::AtlasConfig;
use atlas_crawler::ListingCrawler;
use atlas_drivers::ChromeLauncher;
use atlas_llm::{ensure_llm_ready, traits::LlmClient};
use atlas_pipeline::GeocodingOrchestrator;
use atlas_store::OpportunityStore;
use std::sync::Arc;

/// Crawler backed by a real Chrome over WebDriver.
pub fn build_crawler(cfg: &AtlasConfig) -> ListingCrawler {
    let launcher = ChromeLauncher::new(cfg.browser.clone());
    ListingCrawler::new(Arc::new(launcher), cfg.crawler.clone())
}

pub fn build_llm(cfg: &AtlasConfig) -> Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    ensure_llm_ready(&cfg.llm).context("LLM client is not configured")
}

/// Everything `convert` needs. Fails early when the generator has no API key,
/// before any browser is launched.
pub fn build_orchestrator(cfg: &AtlasConfig) -> Result<GeocodingOrchestrator> {
    let llm = build_llm(cfg)?;
    let store = OpportunityStore::from_settings(&cfg.store);
    tracing::debug!(
        store = %store.path().display(),
        model = llm.model_name(),
        "app.orchestrator.ready"
    );
    Ok(GeocodingOrchestrator::new(build_crawler(cfg), llm, store))
}
