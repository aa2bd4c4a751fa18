//! Display names from listing URLs, and positional link attachment.
use crate::types::EnrichedRecord;
use percent_encoding::percent_decode_str;
use url::Url;

/// Derive an upper-case display name from the slug in a listing URL.
///
/// The last path segment is `<id>-<slug>`; the slug's hyphens and
/// underscores become single spaces.
///
/// ```
/// use atlas_geo::naming::derive_name;
///
/// assert_eq!(
///     derive_name("https://x/opp/abc123-volunteer-pro-english").as_deref(),
///     Some("VOLUNTEER PRO ENGLISH")
/// );
/// assert_eq!(derive_name("https://x/opportunity/abc123"), None);
/// ```
pub fn derive_name(link: &str) -> Option<String> {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    if last.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(last).decode_utf8_lossy();
    let (_id, rest) = decoded.split_once('-')?;
    if rest.is_empty() {
        return None;
    }

    let slug = rest.replace('_', " ");
    let joined = if slug.contains('-') {
        slug.split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        slug.split_whitespace().collect::<Vec<_>>().join(" ")
    };
    let name = joined.trim().to_uppercase();
    (!name.is_empty()).then_some(name)
}

/// Result of zipping records with links.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub records: Vec<EnrichedRecord>,
    /// Records past the end of the link list (left without link or name).
    pub surplus_records: usize,
    /// Links past the end of the record list (ignored).
    pub surplus_links: usize,
}

/// Give `records[i]` the link `links[i]` and its derived name.
///
/// A `link` or `name` a record already carries is kept.
pub fn attach<R>(records: Vec<R>, links: &[String]) -> Attachment
where
    R: Into<EnrichedRecord>,
{
    let record_count = records.len();
    let out: Vec<EnrichedRecord> = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let mut record: EnrichedRecord = record.into();
            if let Some(link) = links.get(i) {
                if record.link.is_none() {
                    record.link = Some(link.clone());
                }
                if record.name.is_none() {
                    record.name = derive_name(link);
                }
            }
            record
        })
        .collect();

    let surplus_records = record_count.saturating_sub(links.len());
    let surplus_links = links.len().saturating_sub(record_count);
    if surplus_records > 0 {
        tracing::warn!(
            records = record_count,
            links = links.len(),
            "geo.attach.more_records_than_links"
        );
    }
    if surplus_links > 0 {
        tracing::warn!(
            records = record_count,
            links = links.len(),
            "geo.attach.more_links_than_records"
        );
    }

    Attachment {
        records: out,
        surplus_records,
        surplus_links,
    }
}
