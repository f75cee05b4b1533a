//! HTML metadata extraction
//!
//! Pulls the fields of a `ProcessedRecord` out of an HTML document:
//! - Title from the `<title>` tag
//! - Description from `<meta name="description">`, falling back to `og:description`
//! - Keywords from `<meta name="keywords">`, comma separated
//! - Timestamp from `article:published_time`, `<meta name="date">` or `<time datetime>`

use crate::model::ProcessedRecord;
use crate::processor::{ProcessError, Processor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;

/// Bytes inspected when deciding whether content is binary
const BINARY_SNIFF_LEN: usize = 1024;

/// Extracts page metadata from HTML documents
#[derive(Debug, Clone, Default)]
pub struct HtmlProcessor;

impl HtmlProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Processor for HtmlProcessor {
    async fn process(
        &self,
        cancel: &CancellationToken,
        content: &[u8],
    ) -> Result<ProcessedRecord, ProcessError> {
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        let html = decode(content)?;

        // Parsing is synchronous; run it off the async workers so a large
        // document cannot hold up cancellation.
        let parse = tokio::task::spawn_blocking(move || extract(&html, Utc::now()));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProcessError::Cancelled),
            joined = parse => match joined {
                Ok(result) => result,
                Err(e) => Err(ProcessError::Internal(e.to_string())),
            },
        }
    }
}

/// Decodes raw bytes as text, rejecting content that looks binary
fn decode(content: &[u8]) -> Result<String, ProcessError> {
    if content.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0) {
        return Err(ProcessError::InvalidEncoding(
            "content contains NUL bytes".to_string(),
        ));
    }

    Ok(String::from_utf8_lossy(content).into_owned())
}

/// Parses an HTML document and extracts its metadata
///
/// `fallback_time` is used when the document declares no timestamp.
pub(crate) fn extract(
    html: &str,
    fallback_time: DateTime<Utc>,
) -> Result<ProcessedRecord, ProcessError> {
    let document = Html::parse_document(html);
    let meta = MetaTags::collect(&document);

    let title = extract_title(&document).unwrap_or_default();
    let description = meta
        .description
        .or(meta.og_description)
        .unwrap_or_default();
    let keywords = meta
        .keywords
        .as_deref()
        .map(split_keywords)
        .unwrap_or_default();
    let timestamp = meta
        .published
        .or_else(|| extract_time_element(&document))
        .unwrap_or(fallback_time);

    let record = ProcessedRecord::new(title, description, keywords, timestamp);
    if record.is_empty() {
        return Err(ProcessError::NoData);
    }

    Ok(record)
}

/// The `<meta>` values we care about, first occurrence wins
#[derive(Debug, Default)]
struct MetaTags {
    description: Option<String>,
    og_description: Option<String>,
    keywords: Option<String>,
    published: Option<DateTime<Utc>>,
}

impl MetaTags {
    fn collect(document: &Html) -> Self {
        let mut tags = Self::default();

        let selector = match Selector::parse("meta[content]") {
            Ok(s) => s,
            Err(_) => return tags,
        };

        for element in document.select(&selector) {
            let attrs = element.value();
            let content = match attrs.attr("content") {
                Some(c) => c.trim(),
                None => continue,
            };
            let key = attrs
                .attr("name")
                .or_else(|| attrs.attr("property"))
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();

            match key.as_str() {
                "description" if tags.description.is_none() && !content.is_empty() => {
                    tags.description = Some(content.to_string());
                }
                "og:description" if tags.og_description.is_none() && !content.is_empty() => {
                    tags.og_description = Some(content.to_string());
                }
                "keywords" if tags.keywords.is_none() => {
                    tags.keywords = Some(content.to_string());
                }
                "article:published_time" | "date" if tags.published.is_none() => {
                    tags.published = parse_timestamp(content);
                }
                _ => {}
            }
        }

        tags
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_time_element(document: &Html) -> Option<DateTime<Utc>> {
    let selector = Selector::parse("time[datetime]").ok()?;

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("datetime"))
        .find_map(parse_timestamp)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Splits a comma separated keyword list, dropping empty entries
fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_extract_all_fields() {
        let html = r#"<html><head>
            <title> Rust News </title>
            <meta name="description" content="Weekly digest">
            <meta name="keywords" content="rust, async ,, tokio">
            <meta property="article:published_time" content="2024-05-06T07:08:09Z">
            </head><body></body></html>"#;

        let record = extract(html, fallback()).unwrap();
        assert_eq!(record.title, "Rust News");
        assert_eq!(record.description, "Weekly digest");
        assert_eq!(record.keywords, vec!["rust", "async", "tokio"]);
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
        );
        assert!(record.source.is_empty());
    }

    #[test]
    fn test_meta_name_is_case_insensitive() {
        let html = r#"<html><head><meta name="Description" content="Mixed case"></head></html>"#;
        let record = extract(html, fallback()).unwrap();
        assert_eq!(record.description, "Mixed case");
        assert!(record.title.is_empty());
    }

    #[test]
    fn test_og_description_fallback() {
        let html = r#"<html><head><title>T</title>
            <meta property="og:description" content="From OpenGraph"></head></html>"#;
        let record = extract(html, fallback()).unwrap();
        assert_eq!(record.description, "From OpenGraph");
    }

    #[test]
    fn test_time_element_and_fallback_timestamp() {
        let with_time = r#"<html><head><title>T</title></head>
            <body><time datetime="2023-02-03T04:05:06+02:00">x</time></body></html>"#;
        let record = extract(with_time, fallback()).unwrap();
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2023, 2, 3, 2, 5, 6).unwrap()
        );

        let without = r#"<html><head><title>T</title></head></html>"#;
        let record = extract(without, fallback()).unwrap();
        assert_eq!(record.timestamp, fallback());
    }

    #[test]
    fn test_no_data_is_an_error() {
        let html = r#"<html><head></head><body><p>just text</p></body></html>"#;
        assert_eq!(extract(html, fallback()), Err(ProcessError::NoData));
        assert_eq!(extract("", fallback()), Err(ProcessError::NoData));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let html = r#"<html><head><title>Same</title><meta name="keywords" content="a,b"></head></html>"#;
        assert_eq!(extract(html, fallback()), extract(html, fallback()));
    }

    #[test]
    fn test_decode_rejects_binary() {
        assert!(matches!(
            decode(&[0x89, b'P', b'N', b'G', 0, 0]),
            Err(ProcessError::InvalidEncoding(_))
        ));
        assert_eq!(decode(b"<title>ok</title>").unwrap(), "<title>ok</title>");
    }

    #[tokio::test]
    async fn test_process_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = HtmlProcessor::new()
            .process(&cancel, b"<title>T</title>")
            .await;
        assert_eq!(result, Err(ProcessError::Cancelled));
    }

    #[tokio::test]
    async fn test_process_extracts_record() {
        let cancel = CancellationToken::new();
        let record = HtmlProcessor::new()
            .process(&cancel, b"<html><head><title>Hello</title></head></html>")
            .await
            .unwrap();
        assert_eq!(record.title, "Hello");
    }
}
