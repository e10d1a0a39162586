//! Single-target crawl execution
//!
//! One crawl unit fetches one target's page and extracts its count. Every
//! attempt goes through admission control and pacing first, carries a fresh
//! client identity, and tries the rendered page before the static one.
//! Failed attempts back off per the retry policy. The unit never returns an
//! error: exhausting the attempts yields [`CrawlOutcome::Failure`].

use crate::config::SourceConfig;
use crate::crawler::fetcher::{FetchError, PageFetcher, PageRenderer};
use crate::crawler::parser::CountExtractor;
use crate::storage::Target;
use crate::throttle::{AdmissionController, IdentityRotator, PacingPolicy, RetryPolicy};
use reqwest::header::HeaderMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Which page source produced a count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlSource {
    Rendered,
    Static,
}

/// Why a crawl unit gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Network-level failure
    Transport(String),
    /// Request or render exceeded its timeout
    Timeout,
    /// Upstream answered with a non-2xx status
    Status(u16),
    /// Page loaded but no plausible count was found
    ExtractionMiss,
    /// The unit panicked
    Panicked(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "transport error: {}", message),
            Self::Timeout => write!(f, "timeout"),
            Self::Status(status) => write!(f, "HTTP {}", status),
            Self::ExtractionMiss => write!(f, "no subscriber count on page"),
            Self::Panicked(message) => write!(f, "crawl unit panicked: {}", message),
        }
    }
}

impl From<FetchError> for FailureReason {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Timeout { .. } => Self::Timeout,
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Result of one crawl unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    Success {
        count: u64,
        attempts: u32,
        source: CrawlSource,
    },
    Failure {
        reason: FailureReason,
        attempts: u32,
    },
}

impl CrawlOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Runs crawl units with throttling, identity rotation, and retries
pub struct CrawlExecutor {
    source: SourceConfig,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn PageRenderer>>,
    extractor: Arc<dyn CountExtractor>,
    limiter: AdmissionController,
    pacing: PacingPolicy,
    identities: IdentityRotator,
    retry: RetryPolicy,
}

impl CrawlExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: SourceConfig,
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
        extractor: Arc<dyn CountExtractor>,
        limiter: AdmissionController,
        pacing: PacingPolicy,
        identities: IdentityRotator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            fetcher,
            renderer,
            extractor,
            limiter,
            pacing,
            identities,
            retry,
        }
    }

    pub fn limiter(&self) -> &AdmissionController {
        &self.limiter
    }

    pub fn page_url(&self, target: &Target) -> String {
        self.source.page_url_for(&target.external_id)
    }

    /// Crawls one target's subscriber count
    pub async fn crawl(&self, target: &Target) -> CrawlOutcome {
        let url = self.page_url(target);

        match self
            .with_retry(&target.external_id, |headers| self.attempt_count(&url, headers))
            .await
        {
            (Ok((count, source)), attempts) => {
                tracing::debug!(
                    external_id = %target.external_id,
                    count,
                    attempts,
                    ?source,
                    "Crawled subscriber count"
                );
                CrawlOutcome::Success {
                    count,
                    attempts,
                    source,
                }
            }
            (Err(reason), attempts) => {
                tracing::warn!(
                    external_id = %target.external_id,
                    attempts,
                    %reason,
                    "Giving up on target"
                );
                CrawlOutcome::Failure { reason, attempts }
            }
        }
    }

    /// Fetches a target's static page body with the same throttling and retries
    pub async fn fetch_body(&self, target: &Target) -> Result<String, FailureReason> {
        let url = self.page_url(target);
        let (result, _) = self
            .with_retry(&target.external_id, |headers| {
                self.attempt_static_body(&url, headers)
            })
            .await;
        result
    }

    /// Runs `attempt` until it succeeds or the retry budget is spent
    ///
    /// Returns the last result and the number of attempts made.
    async fn with_retry<T, F, Fut>(
        &self,
        label: &str,
        mut attempt: F,
    ) -> (Result<T, FailureReason>, u32)
    where
        F: FnMut(HeaderMap) -> Fut,
        Fut: Future<Output = Result<T, FailureReason>>,
    {
        let mut attempt_no = 1;

        loop {
            let waited = self.limiter.acquire().await;
            let paced = self.pacing.wait().await;
            tracing::trace!(
                external_id = label,
                attempt = attempt_no,
                waited_ms = waited.as_millis() as u64,
                paced_ms = paced.as_millis() as u64,
                "Admitted"
            );

            let result = attempt(self.identities.headers()).await;

            match result {
                Ok(value) => return (Ok(value), attempt_no),
                Err(reason) => {
                    if !self.retry.should_retry(attempt_no) {
                        return (Err(reason), attempt_no);
                    }

                    let delay = self.retry.delay(attempt_no);
                    match &reason {
                        FailureReason::ExtractionMiss => tracing::info!(
                            external_id = label,
                            attempt = attempt_no,
                            delay_ms = delay.as_millis() as u64,
                            "Count not found on page, retrying"
                        ),
                        _ => tracing::warn!(
                            external_id = label,
                            attempt = attempt_no,
                            delay_ms = delay.as_millis() as u64,
                            %reason,
                            "Fetch failed, retrying"
                        ),
                    }

                    tokio::time::sleep(delay).await;
                    attempt_no += 1;
                }
            }
        }
    }

    /// One attempt: rendered page first, then the static page
    async fn attempt_count(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<(u64, CrawlSource), FailureReason> {
        if let Some(renderer) = &self.renderer {
            match renderer.render_page(url, headers.clone()).await {
                Ok(html) => {
                    if let Some(count) = self.extractor.extract(&html) {
                        return Ok((count, CrawlSource::Rendered));
                    }
                    tracing::debug!(url, "Rendered page has no count, trying static page");
                }
                Err(e) => {
                    tracing::debug!(url, error = %e, "Render failed, trying static page");
                }
            }
        }

        let body = self.attempt_static_body(url, headers).await?;
        self.extractor
            .extract(&body)
            .map(|count| (count, CrawlSource::Static))
            .ok_or(FailureReason::ExtractionMiss)
    }

    async fn attempt_static_body(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<String, FailureReason> {
        let page = self.fetcher.fetch_page(url, headers).await?;
        if !page.is_success() {
            return Err(FailureReason::Status(page.status));
        }
        Ok(page.body)
    }
}
