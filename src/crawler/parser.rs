//! HTML parsing for subscriber counts and target metadata
//!
//! This module handles parsing page HTML to extract:
//! - The subscriber count shown next to a marker text
//! - Title, feed link, cover image, and description

use crate::config::SourceConfig;
use crate::storage::TargetMetadata;
use regex::Regex;
use scraper::{Html, Selector};

/// Pulls a subscriber count out of a page body
pub trait CountExtractor: Send + Sync {
    fn extract(&self, body: &str) -> Option<u64>;
}

/// Finds numbers immediately followed by a marker text
///
/// Matches both `12345subscribers` and `12,345 subscribers`. Candidates
/// outside `[min, max)` are discarded and the largest remaining one wins.
#[derive(Debug, Clone)]
pub struct MarkerCountExtractor {
    pattern: Regex,
    min_plausible: u64,
    max_plausible: u64,
}

impl MarkerCountExtractor {
    pub fn new(marker: &str, min_plausible: u64, max_plausible: u64) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"(\d[\d,]*)\s*{}", regex::escape(marker.trim())))?;
        Ok(Self {
            pattern,
            min_plausible,
            max_plausible,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, regex::Error> {
        Self::new(
            &config.count_marker,
            config.min_plausible_count,
            config.max_plausible_count,
        )
    }

    fn candidates<'a>(&'a self, text: &'a str) -> impl Iterator<Item = u64> + 'a {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| m.as_str().replace(',', "").parse::<u64>().ok())
            .filter(|n| *n >= self.min_plausible && *n < self.max_plausible)
    }
}

impl CountExtractor for MarkerCountExtractor {
    fn extract(&self, body: &str) -> Option<u64> {
        let text = visible_text(body);
        self.candidates(&text).max()
    }
}

/// Collapses the document's text nodes into one whitespace-separated string
fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::with_capacity(html.len() / 2);

    for fragment in document.root_element().text() {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(fragment);
    }

    text
}

/// Parses descriptive metadata from a target page
///
/// # Example
///
/// ```
/// use podrank::crawler::parse_metadata;
///
/// let html = r#"<html><head><title>Morning Show</title></head></html>"#;
/// let metadata = parse_metadata(html);
/// assert_eq!(metadata.title, Some("Morning Show".to_string()));
/// ```
pub fn parse_metadata(html: &str) -> TargetMetadata {
    let document = Html::parse_document(html);

    let title = meta_content(&document, "meta[property='og:title']")
        .or_else(|| first_text(&document, "title"));
    let feed_url = first_attr(&document, "link[type='application/rss+xml'][href]", "href");
    let cover_url = meta_content(&document, "meta[property='og:image']");
    let description = meta_content(&document, "meta[name='description']")
        .or_else(|| meta_content(&document, "meta[property='og:description']"));

    TargetMetadata {
        title,
        feed_url,
        cover_url,
        description,
    }
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    first_attr(document, selector, "content")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MarkerCountExtractor {
        MarkerCountExtractor::new("已订阅", 1_000, 100_000_000).unwrap()
    }

    #[test]
    fn test_extract_tight_count() {
        let html = r#"<html><body><div>12345已订阅</div></body></html>"#;
        assert_eq!(extractor().extract(html), Some(12_345));
    }

    #[test]
    fn test_extract_spaced_count_with_commas() {
        let html = r#"<html><body><span>1,234,567</span> <span>已订阅</span></body></html>"#;
        assert_eq!(extractor().extract(html), Some(1_234_567));
    }

    #[test]
    fn test_takes_largest_plausible_candidate() {
        let html = r#"<html><body>
            <p>2000已订阅</p>
            <p>54321 已订阅</p>
            <p>12 已订阅</p>
        </body></html>"#;
        assert_eq!(extractor().extract(html), Some(54_321));
    }

    #[test]
    fn test_rejects_implausible_counts() {
        let html = r#"<html><body><p>999已订阅</p><p>100000000已订阅</p></body></html>"#;
        assert_eq!(extractor().extract(html), None);
    }

    #[test]
    fn test_missing_marker() {
        let html = r#"<html><body><p>12345 listeners</p></body></html>"#;
        assert_eq!(extractor().extract(html), None);
    }

    #[test]
    fn test_marker_is_escaped() {
        let extractor = MarkerCountExtractor::new("subs (total)", 1_000, 1_000_000).unwrap();
        let html = r#"<html><body>4,200 subs (total)</body></html>"#;
        assert_eq!(extractor.extract(html), Some(4_200));
    }

    #[test]
    fn test_parse_metadata() {
        let html = r#"
            <html>
            <head>
                <title>Fallback Title</title>
                <meta property="og:title" content="Morning Show" />
                <meta property="og:image" content="https://cdn.example.com/cover.jpg" />
                <meta name="description" content="Daily news in ten minutes" />
                <link rel="alternate" type="application/rss+xml" href="https://feeds.example.com/abc.xml" />
            </head>
            <body></body>
            </html>
        "#;

        let metadata = parse_metadata(html);
        assert_eq!(metadata.title.as_deref(), Some("Morning Show"));
        assert_eq!(
            metadata.feed_url.as_deref(),
            Some("https://feeds.example.com/abc.xml")
        );
        assert_eq!(
            metadata.cover_url.as_deref(),
            Some("https://cdn.example.com/cover.jpg")
        );
        assert_eq!(
            metadata.description.as_deref(),
            Some("Daily news in ten minutes")
        );
    }

    #[test]
    fn test_parse_metadata_falls_back_to_title_tag() {
        let html = r#"<html><head><title>  Plain Title  </title></head></html>"#;
        let metadata = parse_metadata(html);
        assert_eq!(metadata.title.as_deref(), Some("Plain Title"));
        assert!(metadata.feed_url.is_none());
    }

    #[test]
    fn test_parse_metadata_empty_page() {
        assert!(parse_metadata("<html></html>").is_empty());
    }
}
