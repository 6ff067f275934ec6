//! Per-page, per-category and per-run counters.

use std::collections::BTreeMap;
use std::fmt;

use crate::scrape::PageExtraction;

/// Render skip counts as "few-reviews 3, duplicate 1", or "none".
fn describe_skips(skipped: &BTreeMap<&'static str, usize>) -> String {
    let parts: Vec<String> = skipped
        .iter()
        .filter(|(_, &count)| count > 0)
        .map(|(kind, count)| format!("{} {}", kind, count))
        .collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(", ")
    }
}

/// What happened on one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReport {
    pub page: u32,
    pub blocks_found: usize,
    pub admitted: usize,
    /// Skip counts keyed by [`crate::scrape::SkipReason::kind`].
    pub skipped: BTreeMap<&'static str, usize>,
}

impl PageReport {
    pub fn from_extraction(page: u32, extraction: &PageExtraction) -> Self {
        let mut skipped = BTreeMap::new();
        for reason in &extraction.skipped {
            *skipped.entry(reason.kind()).or_insert(0) += 1;
        }
        Self {
            page,
            blocks_found: extraction.blocks_found,
            admitted: extraction.entries.len(),
            skipped,
        }
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

impl fmt::Display for PageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page {}: {} cards, {} kept, skipped {}",
            self.page,
            self.blocks_found,
            self.admitted,
            describe_skips(&self.skipped)
        )
    }
}

/// Why a category stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    /// An empty page past the grace window ended the listing.
    Exhausted { last_page: u32 },
    /// Every page up to the per-category cap was processed.
    PageCap,
    /// A challenge or fetch failure ended the category early.
    Abandoned { page: u32, reason: String },
    /// The operator interrupted the run.
    Interrupted { page: u32 },
}

impl CategoryOutcome {
    pub fn is_finished(&self) -> bool {
        !matches!(self, CategoryOutcome::Interrupted { .. })
    }
}

impl fmt::Display for CategoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryOutcome::Exhausted { last_page } => {
                write!(f, "no more results after page {}", last_page)
            }
            CategoryOutcome::PageCap => write!(f, "page limit reached"),
            CategoryOutcome::Abandoned { page, reason } => {
                write!(f, "abandoned on page {}: {}", page, reason)
            }
            CategoryOutcome::Interrupted { page } => write!(f, "interrupted on page {}", page),
        }
    }
}

/// Totals for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    pub name: String,
    pub pages: usize,
    pub blocks_found: usize,
    pub admitted: usize,
    pub skipped: BTreeMap<&'static str, usize>,
    pub challenges: usize,
    pub outcome: CategoryOutcome,
}

impl CategoryReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pages: 0,
            blocks_found: 0,
            admitted: 0,
            skipped: BTreeMap::new(),
            challenges: 0,
            outcome: CategoryOutcome::PageCap,
        }
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    /// Skips and challenges in one line, for logs and summaries.
    pub fn rejections(&self) -> String {
        let mut line = format!("skipped {}", describe_skips(&self.skipped));
        if self.challenges > 0 {
            line.push_str(&format!("; {} challenge(s)", self.challenges));
        }
        line
    }

    pub fn record_page(&mut self, page: &PageReport) {
        self.pages += 1;
        self.blocks_found += page.blocks_found;
        self.admitted += page.admitted;
        for (&kind, count) in &page.skipped {
            *self.skipped.entry(kind).or_insert(0) += count;
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Ids pre-loaded from the existing output file.
    pub seeded: usize,
    pub categories: Vec<CategoryReport>,
    /// Rows in the output after the terminal sort, if it ran.
    pub sorted_rows: Option<usize>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn total_admitted(&self) -> usize {
        self.categories.iter().map(|c| c.admitted).sum()
    }

    pub fn total_pages(&self) -> usize {
        self.categories.iter().map(|c| c.pages).sum()
    }

    pub fn finished_categories(&self) -> usize {
        self.categories
            .iter()
            .filter(|c| c.outcome.is_finished())
            .count()
    }
}
