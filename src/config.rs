//! Configuration loading and validation.
//!
//! Settings come from a TOML file when one is found and fall back to
//! built-in defaults for everything the file leaves out. Validation runs
//! before any browser is launched, so a bad category list never costs a
//! fetch.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::browser::BrowserEngineConfig;
use crate::error::ConfigError;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILENAME: &str = "bookscout.toml";

/// Default output file name.
pub const DEFAULT_OUTPUT: &str = "amazon_libri_multicat.csv";

/// Placeholder substituted with the page number in page URL templates.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Longest pause any delay setting may ask for, in seconds.
pub const MAX_DELAY_SECS: f64 = 600.0;

/// One category of the catalog to walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Label written to the `Category` column.
    pub name: String,
    /// URL of the first listing page.
    pub start_url: String,
    /// URL for pages 2.. with a `{page}` placeholder.
    pub page_url_template: String,
}

impl CategoryConfig {
    pub fn new(name: &str, start_url: &str, page_url_template: &str) -> Self {
        Self {
            name: name.to_string(),
            start_url: start_url.to_string(),
            page_url_template: page_url_template.to_string(),
        }
    }

    /// Listing URL for a 1-based page number.
    pub fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            self.start_url.clone()
        } else {
            self.page_url_template
                .replace(PAGE_PLACEHOLDER, &page.to_string())
        }
    }
}

/// Randomized pacing between page loads, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default = "default_delay_min")]
    pub min_secs: f64,
    #[serde(default = "default_delay_max")]
    pub max_secs: f64,
    /// Pause after scrolling so lazily rendered cards materialize.
    #[serde(default = "default_settle")]
    pub settle_secs: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_secs: default_delay_min(),
            max_secs: default_delay_max(),
            settle_secs: default_settle(),
        }
    }
}

fn default_delay_min() -> f64 {
    2.0
}

fn default_delay_max() -> f64 {
    4.0
}

fn default_settle() -> f64 {
    1.0
}

/// Localized markers used by the record extractor and challenge detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Words that introduce the author row ("di Mario Rossi", "by Jane Doe").
    #[serde(default = "default_author_markers")]
    pub author_markers: Vec<String>,
    /// Words identifying the review-count aria label.
    #[serde(default = "default_review_keywords")]
    pub review_keywords: Vec<String>,
    /// Lower-case phrases that identify a verification interstitial.
    #[serde(default = "default_challenge_phrases")]
    pub challenge_phrases: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            author_markers: default_author_markers(),
            review_keywords: default_review_keywords(),
            challenge_phrases: default_challenge_phrases(),
        }
    }
}

fn default_author_markers() -> Vec<String> {
    vec!["di".to_string(), "by".to_string()]
}

fn default_review_keywords() -> Vec<String> {
    ["valutazioni", "voti", "ratings", "reviews"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_challenge_phrases() -> Vec<String> {
    [
        "inserisci i caratteri",
        "enter the characters you see below",
        "type the characters you see in this image",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// CSV file receiving admitted entries.
    pub output: PathBuf,
    /// Hard cap on pages visited per category.
    pub pages_per_category: u32,
    /// Entries with fewer reviews are never admitted.
    pub min_review_count: u64,
    /// Pages up to this index tolerate an empty result list.
    pub grace_pages: u32,
    /// Page-level retries after a fetch failure (attended mode).
    pub fetch_retries: u32,
    /// Backoff unit between retries; attempt n waits n times this.
    pub retry_backoff_secs: u64,
    /// Seed the ledger with ids already present in the output file.
    pub seed_from_sink: bool,
    pub delay: DelayConfig,
    pub extract: ExtractConfig,
    pub browser: BrowserEngineConfig,
    pub categories: Vec<CategoryConfig>,
    /// Path the settings were loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            pages_per_category: 300,
            min_review_count: 60,
            grace_pages: 5,
            fetch_retries: 2,
            retry_backoff_secs: 5,
            seed_from_sink: true,
            delay: DelayConfig::default(),
            extract: ExtractConfig::default(),
            browser: BrowserEngineConfig::default(),
            categories: default_categories(),
            source_path: None,
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, or `bookscout.toml` in the
    /// working directory, or built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILENAME);
        if local.exists() {
            return Self::load_from_path(&local);
        }

        tracing::debug!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load settings from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        settings.source_path = Some(path.to_path_buf());
        tracing::debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Restrict the crawl to the named categories, keeping config order.
    pub fn retain_categories(&mut self, names: &[String]) -> Result<(), ConfigError> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.categories.iter().any(|c| &c.name == name) {
                return Err(ConfigError::UnknownCategory(name.clone()));
            }
        }
        self.categories.retain(|c| names.contains(&c.name));
        Ok(())
    }

    /// Check everything the crawler relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }

        let mut seen = HashSet::new();
        for (index, category) in self.categories.iter().enumerate() {
            let name = category.name.trim();
            if name.is_empty() {
                return Err(ConfigError::BlankCategoryName { index });
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateCategory(name.to_string()));
            }
            validate_url(name, "start_url", &category.start_url)?;
            if !category.page_url_template.contains(PAGE_PLACEHOLDER) {
                return Err(ConfigError::MissingPagePlaceholder(name.to_string()));
            }
            validate_url(name, "page_url_template", &category.page_url(2))?;
        }

        if self.pages_per_category == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pages_per_category",
                reason: "must be at least 1".to_string(),
            });
        }

        let delay = &self.delay;
        for (field, value) in [
            ("min_secs", delay.min_secs),
            ("max_secs", delay.max_secs),
            ("settle_secs", delay.settle_secs),
        ] {
            if !value.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: "delay",
                    reason: format!(
                        "{} ({}) must be between 0 and {} seconds",
                        field, value, MAX_DELAY_SECS
                    ),
                });
            }
        }
        if delay.min_secs > delay.max_secs {
            return Err(ConfigError::InvalidValue {
                key: "delay",
                reason: format!(
                    "min_secs ({}) is greater than max_secs ({})",
                    delay.min_secs, delay.max_secs
                ),
            });
        }

        if self.extract.author_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "extract.author_markers",
                reason: "at least one marker is required".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_url(name: &str, field: &'static str, raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        name: name.to_string(),
        field,
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https" | "file") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    Ok(())
}

/// Built-in category list: Italian-language books sorted by popularity.
pub fn default_categories() -> Vec<CategoryConfig> {
    const BASE: &str = "https://www.amazon.it/s?i=stripbooks&rh=n%3A411663031%2Cn%3A";
    [
        ("Politica", "508811031"),
        ("Società e scienze sociali", "508879031"),
        ("Storia", "508796031"),
        ("Diari, biografie, memorie", "508714031"),
        ("Arte, cinema e fotografia", "508758031"),
        ("Scienze, tecnologia, medicina", "508867031"),
    ]
    .into_iter()
    .map(|(name, node)| {
        let start = format!("{}{}&s=popularity-rank&dc", BASE, node);
        let template = format!("{}&page={}", start, PAGE_PLACEHOLDER);
        CategoryConfig::new(name, &start, &template)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.categories.len(), 6);
        assert_eq!(settings.min_review_count, 60);
        assert_eq!(settings.pages_per_category, 300);
    }

    #[test]
    fn page_url_uses_start_for_first_page() {
        let category = CategoryConfig::new(
            "Storia",
            "https://example.com/s?c=1",
            "https://example.com/s?c=1&page={page}",
        );
        assert_eq!(category.page_url(1), "https://example.com/s?c=1");
        assert_eq!(category.page_url(7), "https://example.com/s?c=1&page=7");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            min_review_count = 100

            [delay]
            max_secs = 6.5
            "#,
        )
        .unwrap();

        assert_eq!(settings.min_review_count, 100);
        assert_eq!(settings.delay.min_secs, 2.0);
        assert_eq!(settings.delay.max_secs, 6.5);
        assert_eq!(settings.categories.len(), 6);
        assert!(settings.browser.headless);
    }

    #[test]
    fn file_categories_replace_defaults() {
        let settings = Settings::from_toml(
            r#"
            [[categories]]
            name = "Gialli"
            start_url = "https://example.com/gialli"
            page_url_template = "https://example.com/gialli?page={page}"
            "#,
        )
        .unwrap();

        assert_eq!(settings.categories.len(), 1);
        assert_eq!(settings.categories[0].name, "Gialli");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_template_without_placeholder() {
        let mut settings = Settings::default();
        settings.categories[0].page_url_template = "https://example.com/list".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingPagePlaceholder(_))
        ));
    }

    #[test]
    fn rejects_duplicate_and_blank_names() {
        let mut settings = Settings::default();
        settings.categories[1].name = settings.categories[0].name.clone();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DuplicateCategory(_))
        ));

        let mut settings = Settings::default();
        settings.categories[2].name = "  ".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::BlankCategoryName { index: 2 })
        ));
    }

    #[test]
    fn rejects_bad_urls_and_empty_lists() {
        let mut settings = Settings::default();
        settings.categories[0].start_url = "not a url".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidUrl { field: "start_url", .. })
        ));

        let settings = Settings {
            categories: Vec::new(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::NoCategories)));
    }

    #[test]
    fn rejects_inverted_delay_bounds() {
        let mut settings = Settings::default();
        settings.delay.min_secs = 5.0;
        settings.delay.max_secs = 1.0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { key: "delay", .. })
        ));
    }

    #[test]
    fn rejects_non_finite_and_huge_delays() {
        for (min, max, settle) in [
            (f64::INFINITY, f64::INFINITY, 1.0),
            (1.0, f64::NAN, 1.0),
            (1.0, 2.0, 1e30),
            (-1.0, 2.0, 1.0),
        ] {
            let mut settings = Settings::default();
            settings.delay = DelayConfig {
                min_secs: min,
                max_secs: max,
                settle_secs: settle,
            };
            assert!(
                matches!(
                    settings.validate(),
                    Err(ConfigError::InvalidValue { key: "delay", .. })
                ),
                "accepted {} {} {}",
                min,
                max,
                settle
            );
        }
    }

    #[test]
    fn infinite_delay_in_toml_fails_validation() {
        let settings: Settings = toml::from_str(
            r#"
            [delay]
            min_secs = inf
            max_secs = inf
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn retain_categories_filters_and_rejects_unknown() {
        let mut settings = Settings::default();
        settings
            .retain_categories(&["Storia".to_string()])
            .unwrap();
        assert_eq!(settings.categories.len(), 1);

        let mut settings = Settings::default();
        assert!(matches!(
            settings.retain_categories(&["Cucina".to_string()]),
            Err(ConfigError::UnknownCategory(_))
        ));
    }

    #[test]
    fn round_trips_through_toml() {
        let settings = Settings::default();
        let rendered = settings.to_toml().unwrap();
        let parsed = Settings::from_toml(&rendered).unwrap();
        assert_eq!(parsed.categories, settings.categories);
        assert_eq!(parsed.delay, settings.delay);
    }
}
