//! Page fetching and rendering
//!
//! This module defines the two page sources the executor can use:
//! - [`PageFetcher`]: a plain HTTP GET returning status and body
//! - [`PageRenderer`]: a headless browser returning the rendered DOM
//!
//! Both are traits so tests and alternative backends can be swapped in.

use crate::config::{RenderConfig, SourceConfig};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Errors from a single fetch or render attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Render failed for {url}: {message}")]
    Render { url: String, message: String },
}

/// A fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// HTTP status code
    pub status: u16,
    /// Page body content
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain HTTP page source
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str, headers: HeaderMap) -> Result<FetchedPage, FetchError>;
}

/// Rendered page source
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_page(&self, url: &str, headers: HeaderMap) -> Result<String, FetchError>;
}

/// Builds an HTTP client for the page source
///
/// Identity headers are supplied per request, so the client carries none.
///
/// # Example
///
/// ```no_run
/// use podrank::config::SourceConfig;
/// use podrank::crawler::build_http_client;
///
/// let config = SourceConfig {
///     page_url: "https://podcasts.example.com/podcast/{id}".to_string(),
///     request_timeout_secs: 30,
///     count_marker: "subscribers".to_string(),
///     min_plausible_count: 1_000,
///     max_plausible_count: 100_000_000,
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`PageFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str, headers: HeaderMap) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify_error(url, e))?;

        Ok(FetchedPage { status, body })
    }
}

fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        FetchError::Network {
            url: url.to_string(),
            message: "Connection refused".to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// Renders pages by running an external headless-browser command
///
/// The command receives the page URL as its last argument and must print
/// the rendered HTML to stdout. The user agent is passed through the
/// `PODRANK_USER_AGENT` environment variable.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render_page(&self, url: &str, headers: HeaderMap) -> Result<String, FetchError> {
        let render_error = |message: String| FetchError::Render {
            url: url.to_string(),
            message,
        };

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(agent) = headers
            .get(reqwest::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        {
            command.env("PODRANK_USER_AGENT", agent);
        }

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(render_error(e.to_string())),
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(render_error(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> SourceConfig {
        SourceConfig {
            page_url: "https://podcasts.example.com/podcast/{id}".to_string(),
            request_timeout_secs: 5,
            count_marker: "subscribers".to_string(),
            min_plausible_count: 1_000,
            max_plausible_count: 100_000_000,
        }
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_test_config());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_passes_identity_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/podcast/abc"))
            .and(header("user-agent", "TestAgent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::from_config(&create_test_config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            "TestAgent/1.0".parse().unwrap(),
        );

        let page = fetcher
            .fetch_page(&format!("{}/podcast/abc", server.uri()), headers)
            .await
            .unwrap();
        assert!(page.is_success());
        assert_eq!(page.body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_fetch_reports_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::from_config(&create_test_config()).unwrap();
        let page = fetcher
            .fetch_page(&format!("{}/podcast/abc", server.uri()), HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(page.status, 503);
        assert!(!page.is_success());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let fetcher = HttpFetcher::from_config(&create_test_config()).unwrap();
        let result = fetcher
            .fetch_page("http://127.0.0.1:1/podcast/abc", HeaderMap::new())
            .await;
        assert!(matches!(result, Err(FetchError::Network { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_renderer_returns_stdout() {
        let renderer = CommandRenderer::from_config(&RenderConfig {
            command: "echo".to_string(),
            args: vec!["rendered".to_string()],
            timeout_secs: 5,
        });

        let html = renderer
            .render_page("https://podcasts.example.com/podcast/abc", HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(
            html.trim(),
            "rendered https://podcasts.example.com/podcast/abc"
        );
    }

    #[tokio::test]
    async fn test_fetch_times_out_on_slow_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>5,000 subscribers</p>")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = SourceConfig {
            request_timeout_secs: 1,
            ..create_test_config()
        };
        let fetcher = HttpFetcher::from_config(&config).unwrap();
        let result = fetcher
            .fetch_page(&format!("{}/podcast/abc", server.uri()), HeaderMap::new())
            .await;
        assert!(matches!(result, Err(FetchError::Timeout { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_renderer_times_out() {
        // The URL lands in $1 and is ignored by the script.
        let renderer = CommandRenderer::from_config(&RenderConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 5".to_string(), "render".to_string()],
            timeout_secs: 1,
        });

        let started = std::time::Instant::now();
        let result = renderer
            .render_page("https://podcasts.example.com/podcast/abc", HeaderMap::new())
            .await;

        assert!(matches!(result, Err(FetchError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_command_renderer_missing_binary() {
        let renderer = CommandRenderer::from_config(&RenderConfig {
            command: "/nonexistent/podrank-browser".to_string(),
            args: vec![],
            timeout_secs: 5,
        });

        let result = renderer
            .render_page("https://podcasts.example.com/podcast/abc", HeaderMap::new())
            .await;
        assert!(matches!(result, Err(FetchError::Render { .. })));
    }
}
