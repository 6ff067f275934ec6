//! Category-by-category crawl orchestration.
//!
//! One browser session serves the whole run. Categories are walked in
//! configured order, pages in ascending order; every page's admitted
//! entries are appended to the sink before the next page is requested.
//! After the last category the sink is rewritten in output order.

mod stats;

pub use stats::{CategoryOutcome, CategoryReport, PageReport, RunSummary};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::browser::PageFetcher;
use crate::config::{CategoryConfig, Settings};
use crate::error::{CrawlError, FetchError};
use crate::scrape::{inspect_page, ChallengeDetector, Extractor, Ledger, PageVerdict};
use crate::sink::CsvSink;

/// Someone who can clear a verification challenge in the live browser.
#[async_trait]
pub trait ChallengeResolver: Send {
    /// Return once the operator reports the challenge solved.
    async fn resolve(&mut self, category: &str, page: u32, url: &str);
}

/// How the crawler reacts to challenges and fetch failures.
pub enum RunMode {
    /// Nobody is watching: a challenge or failed fetch abandons the
    /// category.
    Unattended,
    /// An operator solves challenges on request and failed fetches are
    /// retried.
    Attended(Box<dyn ChallengeResolver>),
}

impl RunMode {
    pub fn is_attended(&self) -> bool {
        matches!(self, RunMode::Attended(_))
    }
}

/// Progress notifications for a UI.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    CategoryStarted {
        name: String,
        index: usize,
        total: usize,
    },
    PageProcessed {
        category: String,
        report: PageReport,
    },
    Challenge {
        category: String,
        page: u32,
    },
    CategoryFinished(CategoryReport),
}

/// Page-walk limits taken from settings.
#[derive(Debug, Clone)]
struct CrawlLimits {
    pages_per_category: u32,
    grace_pages: u32,
    fetch_retries: u32,
    retry_backoff: Duration,
}

/// Why fetching a page produced no document.
enum FetchStop {
    Failed(FetchError),
    Interrupted,
}

/// Await `fut` unless the cancel flag is raised first. A dropped sender
/// never cancels.
async fn until_cancelled<T>(
    cancel: &mut watch::Receiver<bool>,
    fut: impl Future<Output = T>,
) -> Option<T> {
    if *cancel.borrow() {
        return None;
    }
    tokio::select! {
        out = fut => Some(out),
        _ = async {
            let raised = cancel.wait_for(|c| *c).await.is_ok();
            if !raised {
                std::future::pending::<()>().await;
            }
        } => None,
    }
}

pub struct Crawler<F> {
    fetcher: F,
    mode: RunMode,
    sink: CsvSink,
    categories: Vec<CategoryConfig>,
    limits: CrawlLimits,
    extractor: Extractor,
    detector: ChallengeDetector,
    ledger: Ledger,
    seed_from_sink: bool,
    cancel: watch::Receiver<bool>,
    events: Option<mpsc::Sender<CrawlEvent>>,
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(settings: &Settings, fetcher: F, mode: RunMode) -> Self {
        let (_never, cancel) = watch::channel(false);
        Self {
            fetcher,
            mode,
            sink: CsvSink::new(&settings.output),
            categories: settings.categories.clone(),
            limits: CrawlLimits {
                pages_per_category: settings.pages_per_category,
                grace_pages: settings.grace_pages,
                fetch_retries: settings.fetch_retries,
                retry_backoff: Duration::from_secs(settings.retry_backoff_secs),
            },
            extractor: Extractor::new(&settings.extract, settings.min_review_count),
            detector: ChallengeDetector::new(&settings.extract.challenge_phrases),
            ledger: Ledger::new(),
            seed_from_sink: settings.seed_from_sink,
            cancel,
            events: None,
        }
    }

    /// Stop at the next page boundary once `cancel` turns true.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    async fn emit(&self, event: CrawlEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event).await;
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run every category. The browser session is closed on every path
    /// out of this function.
    pub async fn run(&mut self) -> Result<RunSummary, CrawlError> {
        let mut summary = RunSummary::default();

        if self.seed_from_sink {
            let existing = self.sink.read_all()?;
            summary.seeded = self.ledger.seed(existing.iter().map(|e| e.item_id.as_str()));
            if summary.seeded > 0 {
                info!(
                    "Seeded {} known items from {}",
                    summary.seeded,
                    self.sink.path().display()
                );
            }
        }

        if let Err(e) = self.fetcher.open().await {
            self.fetcher.close().await;
            return Err(CrawlError::Browser(e));
        }

        let result = self.run_categories(&mut summary).await;
        self.fetcher.close().await;
        result?;

        summary.interrupted = self.cancelled();
        if summary.finished_categories() == 0 {
            info!("No category finished; leaving output unsorted");
        } else if self.sink.path().exists() {
            let rows = self.sink.normalize()?;
            info!(
                "Sorted {} rows in {}",
                rows,
                self.sink.path().display()
            );
            summary.sorted_rows = Some(rows);
        }

        Ok(summary)
    }

    async fn run_categories(&mut self, summary: &mut RunSummary) -> Result<(), CrawlError> {
        let categories = self.categories.clone();
        let total = categories.len();

        for (index, category) in categories.iter().enumerate() {
            if self.cancelled() {
                break;
            }
            info!("Category {}/{}: {}", index + 1, total, category.name);
            self.emit(CrawlEvent::CategoryStarted {
                name: category.name.clone(),
                index,
                total,
            })
            .await;

            let report = self.run_category(category).await?;
            info!(
                "{}: {} admitted from {} pages, {} ({})",
                report.name,
                report.admitted,
                report.pages,
                report.rejections(),
                report.outcome
            );
            self.emit(CrawlEvent::CategoryFinished(report.clone())).await;
            summary.categories.push(report);
        }
        Ok(())
    }

    /// Walk one category's pages. Only sink failures are returned as
    /// errors; everything else ends the category with an outcome.
    async fn run_category(&mut self, category: &CategoryConfig) -> Result<CategoryReport, CrawlError> {
        let mut report = CategoryReport::new(&category.name);

        for page in 1..=self.limits.pages_per_category {
            if self.cancelled() {
                report.outcome = CategoryOutcome::Interrupted { page };
                return Ok(report);
            }

            let url = category.page_url(page);
            let html = match self.fetch_with_policy(&url).await {
                Ok(html) => html,
                Err(FetchStop::Interrupted) => {
                    report.outcome = CategoryOutcome::Interrupted { page };
                    return Ok(report);
                }
                Err(FetchStop::Failed(e)) => {
                    warn!("{} page {}: {}", category.name, page, e);
                    report.outcome = CategoryOutcome::Abandoned {
                        page,
                        reason: e.to_string(),
                    };
                    return Ok(report);
                }
            };

            let mut verdict = self.inspect(&html, &category.name);

            if let PageVerdict::Challenged { marker } = &verdict {
                report.challenges += 1;
                warn!("{} page {}: challenge detected ({})", category.name, page, marker);
                self.emit(CrawlEvent::Challenge {
                    category: category.name.clone(),
                    page,
                })
                .await;

                match self.clear_challenge(&category.name, page, &url).await {
                    Ok(Some(verdict_after)) => verdict = verdict_after,
                    Ok(None) => {
                        report.outcome = CategoryOutcome::Interrupted { page };
                        return Ok(report);
                    }
                    Err(reason) => {
                        warn!("{} page {}: {}", category.name, page, reason);
                        report.outcome = CategoryOutcome::Abandoned { page, reason };
                        return Ok(report);
                    }
                }
            }

            let extraction = match verdict {
                PageVerdict::Listing(extraction) => extraction,
                PageVerdict::Challenged { .. } => {
                    report.outcome = CategoryOutcome::Abandoned {
                        page,
                        reason: "challenge not cleared".to_string(),
                    };
                    return Ok(report);
                }
            };

            self.sink.append(&extraction.entries)?;

            let page_report = PageReport::from_extraction(page, &extraction);
            info!("{} {}", category.name, page_report);
            report.record_page(&page_report);
            self.emit(CrawlEvent::PageProcessed {
                category: category.name.clone(),
                report: page_report,
            })
            .await;

            if extraction.blocks_found == 0 && page > self.limits.grace_pages {
                report.outcome = CategoryOutcome::Exhausted { last_page: page };
                return Ok(report);
            }
        }

        report.outcome = CategoryOutcome::PageCap;
        Ok(report)
    }

    fn inspect(&mut self, html: &str, category: &str) -> PageVerdict {
        inspect_page(html, category, &self.extractor, &self.detector, &mut self.ledger)
    }

    /// Fetch a page. Attended runs retry failures with linear backoff;
    /// unattended runs give up on the first failure.
    async fn fetch_with_policy(&mut self, url: &str) -> Result<String, FetchStop> {
        let retries = if self.mode.is_attended() {
            self.limits.fetch_retries
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            let fetched = until_cancelled(&mut self.cancel, self.fetcher.fetch_page(url)).await;
            let error = match fetched {
                None => return Err(FetchStop::Interrupted),
                Some(Ok(html)) => return Ok(html),
                Some(Err(e)) => e,
            };

            if attempt >= retries {
                return Err(FetchStop::Failed(error));
            }
            attempt += 1;
            let backoff = self.limits.retry_backoff.saturating_mul(attempt);
            warn!(
                "Fetch failed ({}); retry {}/{} in {}s",
                error,
                attempt,
                retries,
                backoff.as_secs()
            );
            if until_cancelled(&mut self.cancel, tokio::time::sleep(backoff))
                .await
                .is_none()
            {
                return Err(FetchStop::Interrupted);
            }
        }
    }

    /// Ask the operator to solve a challenge, then reload once.
    /// `Ok(None)` means the run was interrupted while waiting.
    async fn clear_challenge(
        &mut self,
        category: &str,
        page: u32,
        url: &str,
    ) -> Result<Option<PageVerdict>, String> {
        let resolver = match self.mode {
            RunMode::Unattended => return Err("challenge in unattended mode".to_string()),
            RunMode::Attended(ref mut resolver) => resolver,
        };

        if until_cancelled(&mut self.cancel, resolver.resolve(category, page, url))
            .await
            .is_none()
        {
            return Ok(None);
        }

        let html = match until_cancelled(&mut self.cancel, self.fetcher.refresh()).await {
            None => return Ok(None),
            Some(Ok(html)) => html,
            Some(Err(e)) => return Err(format!("reload after challenge failed: {}", e)),
        };

        let verdict = self.inspect(&html, category);
        if let PageVerdict::Challenged { .. } = verdict {
            return Err("still challenged after reload".to_string());
        }
        info!("Challenge cleared on {} page {}", category, page);
        Ok(Some(verdict))
    }
}
