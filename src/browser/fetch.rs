//! chromiumoxide-backed fetcher: one Chrome process, one tab, many pages.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams, ReloadParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Handler, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stealth::combined_source;
use super::{jitter, pause, BrowserEngineConfig, BrowserFetcher, PageFetcher};
use crate::config::DelayConfig;
use crate::error::FetchError;

/// Well-known install locations, checked before `$PATH`.
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/opt/google/chrome/google-chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

const EXECUTABLE_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
];

/// Flags that hide the usual automation tells.
const LAUNCH_FLAGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--disable-sync",
    "--disable-translate",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--lang=it-IT",
];

const READY_STATE_SCRIPT: &str = "document.readyState";

/// Scroll halfway so lazily rendered result cards load.
const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight / 2);";

const READY_POLL: Duration = Duration::from_millis(250);

fn locate_chrome() -> Result<PathBuf, FetchError> {
    let installed = INSTALL_LOCATIONS.iter().map(PathBuf::from);
    let on_path = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .flat_map(|dir| EXECUTABLE_NAMES.iter().map(move |name| dir.join(name)));

    match installed.chain(on_path).find(|p| p.is_file()) {
        Some(path) => {
            info!("Using Chrome at {}", path.display());
            Ok(path)
        }
        None => Err(FetchError::Unavailable(
            "no Chrome or Chromium executable found; install one or set \
             browser.remote_url to a running DevTools endpoint"
                .to_string(),
        )),
    }
}

/// Poll `document.readyState` until the DOM is usable or `limit` passes.
async fn await_dom(page: &Page, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        match page.evaluate(READY_STATE_SCRIPT.to_string()).await {
            Ok(value) => {
                let state: String = value.into_value().unwrap_or_default();
                if state == "complete" || state == "interactive" {
                    debug!("DOM ready ({})", state);
                    return;
                }
            }
            Err(e) => debug!("readyState probe failed: {}", e),
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("DOM not ready after {}s, reading anyway", limit.as_secs());
            return;
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

/// Drive the CDP event stream until the connection drops.
fn drive(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("CDP handler stopped: {}", e);
                break;
            }
        }
    })
}

fn unavailable(context: &str) -> impl Fn(CdpError) -> FetchError + '_ {
    move |e| FetchError::Unavailable(format!("{}: {}", context, e))
}

impl BrowserFetcher {
    /// Nothing is launched until [`PageFetcher::open`].
    pub fn new(config: BrowserEngineConfig, delay: DelayConfig) -> Self {
        Self {
            config,
            delay,
            browser: None,
            page: None,
            handler: None,
            remote: false,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout)
    }

    async fn launch_local(&mut self) -> Result<Browser, FetchError> {
        let executable = locate_chrome()?;
        info!(
            "Starting Chrome ({})",
            if self.config.headless { "headless" } else { "windowed" }
        );

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .args(LAUNCH_FLAGS.iter().copied())
            .arg(format!("--window-size={}", self.config.window_size))
            .arg(format!("--user-agent={}", self.config.user_agent))
            .args(self.config.chrome_args.iter().map(String::as_str));
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        let config = builder
            .build()
            .map_err(|e| FetchError::Unavailable(format!("bad browser options: {}", e)))?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(unavailable("Chrome did not start"))?;
        self.handler = Some(drive(handler));
        Ok(browser)
    }

    /// Attach to a Chrome already listening for DevTools connections.
    async fn attach_remote(&mut self, endpoint: &str) -> Result<Browser, FetchError> {
        info!("Attaching to DevTools at {}", endpoint);
        let base = endpoint
            .replacen("ws://", "http://", 1)
            .replacen("wss://", "https://", 1);
        let discovery = format!("{}/json/version", base.trim_end_matches('/'));

        let unreachable_at = |e: reqwest::Error| {
            FetchError::Unavailable(format!("DevTools endpoint {}: {}", discovery, e))
        };
        let version: serde_json::Value = reqwest::Client::new()
            .get(&discovery)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(unreachable_at)?
            .json()
            .await
            .map_err(unreachable_at)?;

        let socket = version["webSocketDebuggerUrl"].as_str().ok_or_else(|| {
            FetchError::Unavailable(format!("{} has no webSocketDebuggerUrl", discovery))
        })?;
        let (browser, handler) = Browser::connect(socket)
            .await
            .map_err(unavailable("DevTools connection failed"))?;
        self.remote = true;
        self.handler = Some(drive(handler));
        Ok(browser)
    }

    /// Open the run's single tab with the user agent and stealth scripts
    /// installed before any marketplace document loads.
    async fn open_tab(&self, browser: &Browser) -> Result<Page, FetchError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(unavailable("could not open a tab"))?;

        page.execute(SetUserAgentOverrideParams::new(self.config.user_agent.clone()))
            .await
            .map_err(unavailable("user agent override failed"))?;

        if self.config.stealth {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(combined_source()))
                .await
                .map_err(unavailable("stealth script install failed"))?;
            debug!("Stealth scripts installed");
        }
        Ok(page)
    }

    fn tab(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Unavailable("browser session not open".to_string()))
    }

    /// Pace like a reader, nudge lazy content into view, then snapshot the
    /// DOM.
    async fn read_settled(&self, url: &str) -> Result<String, FetchError> {
        let page = self.tab()?;
        await_dom(page, self.timeout()).await;

        let dwell = jitter(&self.delay);
        debug!("Lingering {:.1}s on {}", dwell.as_secs_f64(), url);
        tokio::time::sleep(dwell).await;

        if let Err(e) = page.evaluate(SCROLL_SCRIPT.to_string()).await {
            debug!("Scroll failed on {}: {}", url, e);
        }
        tokio::time::sleep(pause(self.delay.settle_secs)).await;

        if let Some(ref selector) = self.config.wait_for_selector {
            match tokio::time::timeout(self.timeout(), page.find_element(selector.as_str())).await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("{} not present on {}: {}", selector, url, e),
                Err(_) => warn!("Gave up waiting for {} on {}", selector, url),
            }
        }

        page.content()
            .await
            .map_err(|e| FetchError::Content(e.to_string()))
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn open(&mut self) -> Result<(), FetchError> {
        if self.page.is_some() {
            return Ok(());
        }
        let browser = match self.config.remote_url.clone() {
            Some(endpoint) => self.attach_remote(&endpoint).await?,
            None => self.launch_local().await?,
        };
        let tab = self.open_tab(&browser).await;
        // Keep the browser even if the tab failed so close() can reap it.
        self.browser = Some(browser);
        self.page = Some(tab?);
        Ok(())
    }

    async fn fetch_page(&mut self, url: &str) -> Result<String, FetchError> {
        let page = self.tab()?;
        let navigation_failed = |reason: String| FetchError::Navigation {
            url: url.to_string(),
            reason,
        };

        debug!("Loading {}", url);
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(navigation_failed)?;

        match tokio::time::timeout(self.timeout(), page.execute(params)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(navigation_failed(e.to_string())),
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.config.timeout,
                })
            }
        }

        self.read_settled(url).await
    }

    async fn refresh(&mut self) -> Result<String, FetchError> {
        let page = self.tab()?;
        let url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| "the current page".to_string());

        info!("Reloading {}", url);
        page.execute(ReloadParams::default())
            .await
            .map_err(|e| FetchError::Navigation {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        self.read_settled(&url).await
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Tab close failed: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if self.remote {
                debug!("Leaving remote browser running");
            } else {
                if let Err(e) = browser.close().await {
                    warn!("Chrome did not exit cleanly: {}", e);
                }
                let _ = browser.wait().await;
                info!("Chrome closed");
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_flags_disable_automation_marker() {
        assert!(LAUNCH_FLAGS.contains(&"--disable-blink-features=AutomationControlled"));
    }

    #[tokio::test]
    async fn session_calls_fail_before_open() {
        let mut fetcher = BrowserFetcher::new(BrowserEngineConfig::default(), DelayConfig::default());
        assert!(matches!(
            fetcher.fetch_page("https://example.com").await,
            Err(FetchError::Unavailable(_))
        ));
        // Closing an unopened session is a no-op.
        fetcher.close().await;
    }

    #[test]
    fn install_locations_are_absolute() {
        assert!(INSTALL_LOCATIONS
            .iter()
            .all(|p| std::path::Path::new(p).is_absolute()));
    }
}
