//! Client identity rotation
//!
//! Each outbound request carries a header set taken from one desktop browser
//! profile. Client hints are only sent for Chromium browsers, and always agree
//! with the profile's brand and platform.

use crate::config::{IdentityConfig, RotationStrategy};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Browser family of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chrome,
    Edge,
    Safari,
    Firefox,
    Other,
}

impl BrowserFamily {
    /// Chromium browsers send `sec-ch-ua*` client hints
    pub fn is_chromium(&self) -> bool {
        matches!(self, Self::Chrome | Self::Edge)
    }
}

/// Operating system a profile claims to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Unknown,
}

impl Platform {
    fn client_hint(&self) -> &'static str {
        match self {
            Self::Windows => "\"Windows\"",
            Self::MacOs => "\"macOS\"",
            Self::Linux => "\"Linux\"",
            Self::Unknown => "\"Unknown\"",
        }
    }
}

/// One client identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub user_agent: String,
    pub family: BrowserFamily,
    pub platform: Platform,
    /// Major browser version, when the user agent carries one
    pub major_version: Option<String>,
}

impl IdentityProfile {
    /// Builds a profile by reading family, platform and version from a user agent
    pub fn from_user_agent(user_agent: &str) -> Self {
        let family = if user_agent.contains("Edg/") {
            BrowserFamily::Edge
        } else if user_agent.contains("Firefox/") {
            BrowserFamily::Firefox
        } else if user_agent.contains("Chrome/") {
            BrowserFamily::Chrome
        } else if user_agent.contains("Safari/") {
            BrowserFamily::Safari
        } else {
            BrowserFamily::Other
        };

        let platform = if user_agent.contains("Windows") {
            Platform::Windows
        } else if user_agent.contains("Macintosh") || user_agent.contains("Mac OS X") {
            Platform::MacOs
        } else if user_agent.contains("Linux") || user_agent.contains("X11") {
            Platform::Linux
        } else {
            Platform::Unknown
        };

        let version_token = match family {
            BrowserFamily::Edge => "Edg/",
            BrowserFamily::Chrome => "Chrome/",
            BrowserFamily::Firefox => "Firefox/",
            BrowserFamily::Safari => "Version/",
            BrowserFamily::Other => "",
        };

        Self {
            user_agent: user_agent.to_string(),
            family,
            platform,
            major_version: major_version_after(user_agent, version_token),
        }
    }

    /// Builds the request headers for this profile
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        if self.family.is_chromium() {
            let version = self.major_version.as_deref().unwrap_or("120");
            let brand = match self.family {
                BrowserFamily::Edge => "Microsoft Edge",
                _ => "Google Chrome",
            };
            let sec_ch_ua = format!(
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"{v}\", \"{brand}\";v=\"{v}\"",
                v = version,
                brand = brand
            );

            if let Ok(value) = HeaderValue::from_str(&sec_ch_ua) {
                headers.insert(HeaderName::from_static("sec-ch-ua"), value);
            }
            headers.insert(
                HeaderName::from_static("sec-ch-ua-mobile"),
                HeaderValue::from_static("?0"),
            );
            headers.insert(
                HeaderName::from_static("sec-ch-ua-platform"),
                HeaderValue::from_static(self.platform.client_hint()),
            );
        }

        headers
    }
}

fn major_version_after(user_agent: &str, token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    let start = user_agent.find(token)? + token.len();
    let major: String = user_agent[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!major.is_empty()).then_some(major)
}

/// Rotates through a fixed pool of identity profiles
///
/// Clones share the round-robin position.
#[derive(Debug, Clone)]
pub struct IdentityRotator {
    profiles: Arc<Vec<IdentityProfile>>,
    strategy: RotationStrategy,
    cursor: Arc<AtomicUsize>,
}

impl IdentityRotator {
    /// Creates a rotator over the given user agents, or the built-in pool if empty
    pub fn new(user_agents: &[String], strategy: RotationStrategy) -> Self {
        let mut profiles: Vec<IdentityProfile> = user_agents
            .iter()
            .map(|ua| ua.trim())
            .filter(|ua| !ua.is_empty() && HeaderValue::from_str(ua).is_ok())
            .map(IdentityProfile::from_user_agent)
            .collect();

        if profiles.is_empty() {
            profiles = DEFAULT_USER_AGENTS
                .iter()
                .map(|ua| IdentityProfile::from_user_agent(ua))
                .collect();
        }

        Self {
            profiles: Arc::new(profiles),
            strategy,
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(&config.user_agents, config.strategy)
    }

    pub fn profiles(&self) -> &[IdentityProfile] {
        &self.profiles
    }

    /// Next profile in round-robin order
    pub fn next(&self) -> &IdentityProfile {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.profiles.len();
        &self.profiles[index]
    }

    /// Uniformly random profile
    pub fn random(&self) -> &IdentityProfile {
        let index = rand::rng().random_range(0..self.profiles.len());
        &self.profiles[index]
    }

    /// Headers for the next request according to the configured strategy
    pub fn headers(&self) -> HeaderMap {
        match self.strategy {
            RotationStrategy::Random => self.random().headers(),
            RotationStrategy::RoundRobin => self.next().headers(),
        }
    }
}
