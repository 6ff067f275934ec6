//! Browser session configuration.

use serde::{Deserialize, Serialize};

/// Default user agent presented to the marketplace.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Browser session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// No visible window. Defaults to true.
    /// Attended runs always open a visible window so a human can solve challenges.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Inject stealth evasion scripts into every document (default: true).
    #[serde(default = "default_stealth")]
    pub stealth: bool,

    /// Route all traffic through this proxy, e.g. `socks5://127.0.0.1:1080`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Seconds allowed for navigation and for each readiness wait.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// User agent override applied before the first navigation.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Window size passed to Chrome, as "width,height".
    #[serde(default = "default_window_size")]
    pub window_size: String,

    /// Wait for this CSS selector before reading the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<String>,

    /// Extra command-line flags appended after the built-in ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chrome_args: Vec<String>,

    /// DevTools endpoint of an already running Chrome, e.g.
    /// `ws://localhost:9222`. When set no local browser is launched and the
    /// remote one is left running at the end of the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            stealth: default_stealth(),
            proxy: None,
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            window_size: default_window_size(),
            wait_for_selector: None,
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_stealth() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_window_size() -> String {
    "1920,1080".to_string()
}
