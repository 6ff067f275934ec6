//! Browser-backed page fetcher for the marketplace listing pages.
//!
//! Uses chromiumoxide (CDP) with stealth evasion techniques so the session
//! resembles an ordinary desktop browser. One browser process and one tab
//! serve the whole run: pages share cookies and navigation history.

mod config;
#[cfg(feature = "browser")]
mod fetch;
mod stealth;

pub use config::{BrowserEngineConfig, DEFAULT_USER_AGENT};

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::config::{DelayConfig, MAX_DELAY_SECS};
use crate::error::FetchError;

#[cfg(feature = "browser")]
use chromiumoxide::{Browser, Page};

/// Source of rendered listing pages.
///
/// The crawler owns exactly one fetcher per run and drives it
/// sequentially; implementations may assume no concurrent calls.
#[async_trait]
pub trait PageFetcher: Send {
    /// Start the underlying session. Called once before the first fetch.
    async fn open(&mut self) -> Result<(), FetchError>;

    /// Navigate to `url` and return the rendered HTML.
    async fn fetch_page(&mut self, url: &str) -> Result<String, FetchError>;

    /// Reload the current page (after a manual challenge resolution).
    async fn refresh(&mut self) -> Result<String, FetchError>;

    /// Tear the session down. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Clamp a configured number of seconds into `0..=MAX_DELAY_SECS`.
/// NaN counts as zero.
fn bounded_secs(secs: f64) -> f64 {
    if secs.is_nan() {
        0.0
    } else {
        secs.clamp(0.0, MAX_DELAY_SECS)
    }
}

/// A configured pause as a `Duration`, never panicking on bad input.
pub fn pause(secs: f64) -> Duration {
    Duration::try_from_secs_f64(bounded_secs(secs)).unwrap_or(Duration::ZERO)
}

/// Pick a pause length uniformly from the configured bounds.
pub fn jitter(delay: &DelayConfig) -> Duration {
    let (min, max) = (bounded_secs(delay.min_secs), bounded_secs(delay.max_secs));
    let secs = if max > min {
        rand::rng().random_range(min..=max)
    } else {
        min
    };
    pause(secs)
}

/// Fetcher driving a real Chrome through the DevTools protocol.
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    pub(crate) config: BrowserEngineConfig,
    pub(crate) delay: DelayConfig,
    pub(crate) browser: Option<Browser>,
    pub(crate) page: Option<Page>,
    pub(crate) handler: Option<tokio::task::JoinHandle<()>>,
    pub(crate) remote: bool,
}

#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
    delay: DelayConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig, delay: DelayConfig) -> Self {
        Self { config, delay }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn open(&mut self) -> Result<(), FetchError> {
        let _ = (&self.config, &self.delay);
        Err(FetchError::Unavailable(
            "built without the `browser` feature; no page can be fetched".to_string(),
        ))
    }

    async fn fetch_page(&mut self, _url: &str) -> Result<String, FetchError> {
        self.open().await.map(|_| String::new())
    }

    async fn refresh(&mut self) -> Result<String, FetchError> {
        self.open().await.map(|_| String::new())
    }

    async fn close(&mut self) {}
}
