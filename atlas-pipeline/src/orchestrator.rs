use crate::prompts::{geocode_user_prompt, GEOCODE_SYSTEM_PROMPT};
use crate::warnings::{summarize, PipelineWarning};
use atlas_common::{validate_limit, AtlasError, Result};
use atlas_crawler::{ListingCrawler, SearchResult};
use atlas_geo::{attach, EnrichedRecord, ResponseExtractor};
use atlas_llm::traits::{GenerationOptions, LlmClient};
use atlas_store::OpportunityStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub country: String,
    pub limit: Option<usize>,
    /// Model for this request only; the client's configured model otherwise.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    /// Always `"ok"`: hard failures are returned as `Err` instead.
    pub status: String,
    pub country: String,
    pub limit: Option<usize>,
    pub search: SearchResult,
    /// Whether generation returned text.
    pub generation_called: bool,
    pub raw_text: Option<String>,
    /// `None` only when generation failed.
    pub locations: Option<Vec<EnrichedRecord>>,
    /// All warnings joined by `"; "`.
    pub error: Option<String>,
    pub warnings: Vec<PipelineWarning>,
}

/// Crawler → generator → extractor → link attachment → archive.
#[derive(Clone)]
pub struct GeocodingOrchestrator {
    crawler: ListingCrawler,
    llm: Arc<dyn LlmClient + Send + Sync>,
    store: OpportunityStore,
    extractor: Arc<ResponseExtractor>,
}

impl GeocodingOrchestrator {
    pub fn new(
        crawler: ListingCrawler,
        llm: Arc<dyn LlmClient + Send + Sync>,
        store: OpportunityStore,
    ) -> Self {
        Self {
            crawler,
            llm,
            store,
            extractor: Arc::new(ResponseExtractor::default()),
        }
    }

    pub fn with_extractor(mut self, extractor: ResponseExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn crawler(&self) -> &ListingCrawler {
        &self.crawler
    }

    pub fn store(&self) -> &OpportunityStore {
        &self.store
    }

    /// Geocode the listings for one country and append them to the archive.
    ///
    /// Errors only for a blank country, an out-of-range limit, or a crawl
    /// that could not start a browser.
    pub async fn convert(&self, request: ConvertRequest) -> Result<ConvertResponse> {
        let country = request.country.trim().to_string();
        if country.is_empty() {
            return Err(AtlasError::InvalidInput(
                "country must not be empty".to_string(),
            ));
        }
        validate_limit(request.limit)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("convert", %run_id, country = %country, limit = ?request.limit);
        self.run(country, request).instrument(span).await
    }

    async fn run(&self, country: String, request: ConvertRequest) -> Result<ConvertResponse> {
        let search = self.crawler.search(&country, request.limit).await?;
        let links = search.links.clone();
        let mut warnings = Vec::new();

        let mut response = ConvertResponse {
            status: "ok".to_string(),
            country: request.country.clone(),
            limit: request.limit,
            search,
            generation_called: false,
            raw_text: None,
            locations: None,
            error: None,
            warnings: Vec::new(),
        };

        if links.is_empty() {
            info!("pipeline.no_links");
            warnings.push(PipelineWarning::NoLinks);
            response.locations = Some(Vec::new());
            return Ok(finish(response, warnings));
        }

        let options = GenerationOptions::with_model(request.model.clone());
        let text = match self
            .llm
            .generate(
                &geocode_user_prompt(&links),
                Some(GEOCODE_SYSTEM_PROMPT),
                &options,
            )
            .await
        {
            Ok(reply) => reply.text,
            Err(e) => {
                warn!(error = %e, "pipeline.generation.failed");
                let message = match e {
                    AtlasError::Generation(msg) => msg,
                    other => other.to_string(),
                };
                warnings.push(PipelineWarning::GenerationFailed { message });
                return Ok(finish(response, warnings));
            }
        };
        response.generation_called = true;

        let extraction = self.extractor.extract(&text);
        info!(
            tier = extraction.tier.unwrap_or("none"),
            records = extraction.records.len(),
            links = links.len(),
            "pipeline.extracted"
        );
        if extraction.skipped > 0 {
            warnings.push(PipelineWarning::SkippedCandidates {
                count: extraction.skipped,
            });
        }

        let attachment = attach(extraction.records, &links);
        if attachment.records.len() != links.len() {
            warnings.push(PipelineWarning::CountMismatch {
                parsed: attachment.records.len(),
                links: links.len(),
            });
        }

        if !attachment.records.is_empty() {
            if let Err(e) = self
                .store
                .append(&country, attachment.records.clone())
                .await
            {
                warn!(error = %e, "pipeline.append.failed");
                warnings.push(PipelineWarning::AppendFailed {
                    message: e.to_string(),
                });
            }
        }

        response.raw_text = Some(text);
        response.locations = Some(attachment.records);
        Ok(finish(response, warnings))
    }
}

fn finish(mut response: ConvertResponse, warnings: Vec<PipelineWarning>) -> ConvertResponse {
    response.error = summarize(&warnings);
    response.warnings = warnings;
    info!(
        located = response.locations.as_ref().map_or(0, Vec::len),
        warnings = response.warnings.len(),
        "pipeline.convert.done"
    );
    response
}
