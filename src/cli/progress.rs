//! Spinner showing crawl progress on a terminal.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use bookscout::crawl::{CategoryOutcome, CrawlEvent};

use super::icons::{info, success, warn};

const TICK: Duration = Duration::from_millis(120);

/// One spinner line, reused for every category.
#[derive(Clone)]
pub struct CrawlProgress {
    bar: ProgressBar,
}

impl CrawlProgress {
    /// Draw to stderr when it is a terminal, otherwise stay hidden.
    pub fn new() -> Self {
        let bar = if console::Term::stderr().is_term() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }

    /// Print above the spinner without tearing it.
    pub fn println(&self, message: impl AsRef<str>) {
        if self.bar.is_hidden() {
            eprintln!("{}", message.as_ref());
        } else {
            self.bar.println(message.as_ref());
        }
    }

    /// Stop redrawing while the operator types.
    pub fn pause(&self) {
        self.bar.disable_steady_tick();
    }

    pub fn resume(&self) {
        self.bar.enable_steady_tick(TICK);
    }

    pub fn handle(&self, event: &CrawlEvent) {
        match event {
            CrawlEvent::CategoryStarted { name, index, total } => {
                self.bar.set_prefix(format!("[{}/{}] {}", index + 1, total, name));
                self.bar.set_message("opening first page");
                self.resume();
            }
            CrawlEvent::PageProcessed { report, .. } => {
                self.bar.set_message(report.to_string());
            }
            CrawlEvent::Challenge { category, page } => {
                self.println(format!(
                    "{} Verification challenge on {} page {}",
                    warn(),
                    category,
                    page
                ));
            }
            CrawlEvent::CategoryFinished(report) => {
                let icon = match report.outcome {
                    CategoryOutcome::Abandoned { .. } | CategoryOutcome::Interrupted { .. } => {
                        warn()
                    }
                    _ => success(),
                };
                self.println(format!(
                    "{} {}: {} kept from {} pages, {} ({})",
                    icon,
                    report.name,
                    report.admitted,
                    report.pages,
                    report.rejections(),
                    report.outcome
                ));
            }
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// Drain `events` until the crawler drops its sender.
    pub fn spawn(self, mut events: mpsc::Receiver<CrawlEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.println(format!("{} Starting browser session", info()));
            while let Some(event) = events.recv().await {
                self.handle(&event);
            }
            self.finish();
        })
    }
}
