use serde::{Deserialize, Serialize};
use std::fmt;

/// A recoverable problem met during one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// The crawl found nothing, so generation was not attempted.
    NoLinks,
    GenerationFailed { message: String },
    /// Coordinate candidates the extractor had to drop.
    SkippedCandidates { count: usize },
    CountMismatch { parsed: usize, links: usize },
    AppendFailed { message: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLinks => write!(f, "No listing links found; generation skipped"),
            Self::GenerationFailed { message } => write!(f, "generation failed: {message}"),
            Self::SkippedCandidates { count } => {
                write!(f, "Skipped {count} malformed coordinate entries")
            }
            Self::CountMismatch { parsed, links } => {
                write!(f, "Parsed {parsed} entries but found {links} links")
            }
            Self::AppendFailed { message } => write!(f, "append_error: {message}"),
        }
    }
}

/// `None` when there is nothing to report, else every warning joined by `"; "`.
pub fn summarize(warnings: &[PipelineWarning]) -> Option<String> {
    if warnings.is_empty() {
        return None;
    }
    Some(
        warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    )
}
