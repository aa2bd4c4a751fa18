//! Search URL construction.
use atlas_common::{AtlasError, CrawlerSettings, Result};
use url::Url;

/// The search page without a location: `base_url` + `search_path` + fixed params.
pub fn bare_search_url(settings: &CrawlerSettings) -> Result<Url> {
    let base = Url::parse(&settings.base_url).map_err(|e| {
        AtlasError::Config(format!("invalid crawler.base_url {:?}: {e}", settings.base_url))
    })?;
    let mut url = base.join(&settings.search_path).map_err(|e| {
        AtlasError::Config(format!(
            "invalid crawler.search_path {:?}: {e}",
            settings.search_path
        ))
    })?;
    if !settings.search_params.is_empty() {
        url.query_pairs_mut().extend_pairs(&settings.search_params);
    }
    Ok(url)
}

/// The direct search URL with the location embedded as a query parameter.
pub fn initial_search_url(settings: &CrawlerSettings, location: &str) -> Result<Url> {
    let mut url = bare_search_url(settings)?;
    url.query_pairs_mut()
        .append_pair(&settings.location_param, location);
    Ok(url)
}

/// `url` with `param` set to `page`, replacing any previous value.
pub fn with_page(url: &Url, param: &str, page: u32) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    out.query_pairs_mut()
        .clear()
        .extend_pairs(&kept)
        .append_pair(param, &page.to_string());
    out
}
