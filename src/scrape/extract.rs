//! Listing-page record extraction.
//!
//! A listing page holds one result card per item. Each card goes through
//! the same ordered rules: identifier and ledger short-circuit first, then
//! the cheap admission filters (author, review count), then the optional
//! fields. A card that fails any rule becomes a [`SkipReason`]; it never
//! aborts the rest of the page.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use scraper::html::Select;
use scraper::{ElementRef, Html, Selector};

use super::ledger::Ledger;
use crate::config::ExtractConfig;
use crate::models::{CatalogEntry, UNKNOWN_TITLE};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static RESULT_CARD: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[data-component-type="s-search-result"]"#));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("div.a-row"));
static ARIA_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[aria-label]"));
static INLINE_BADGE: LazyLock<Selector> = LazyLock::new(|| selector("span.s-underline-text"));
static COVER: LazyLock<Selector> = LazyLock::new(|| selector("img.s-image"));

static DATE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}\s+[A-Za-z]{3}\.?\s+\d{4})").expect("static regex is valid")
});

/// Lower-cased substrings that mark an author field naming several people.
const MULTI_AUTHOR_SEPARATORS: &[&str] = &[",", " and ", " e ", " et ", " & "];

/// Why a candidate block was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingId,
    AlreadySeen { id: String },
    MissingAuthor { id: String },
    MultipleAuthors { id: String, author: String },
    BelowThreshold { id: String, count: u64 },
    Malformed { id: Option<String>, reason: String },
}

impl SkipReason {
    /// Short stable label used in per-page counters.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::MissingId => "missing-id",
            SkipReason::AlreadySeen { .. } => "duplicate",
            SkipReason::MissingAuthor { .. } => "no-author",
            SkipReason::MultipleAuthors { .. } => "multi-author",
            SkipReason::BelowThreshold { .. } => "few-reviews",
            SkipReason::Malformed { .. } => "malformed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingId => write!(f, "card has no item id"),
            SkipReason::AlreadySeen { id } => write!(f, "{} already admitted", id),
            SkipReason::MissingAuthor { id } => write!(f, "{} has no parseable author", id),
            SkipReason::MultipleAuthors { id, author } => {
                write!(f, "{} has multiple authors ({})", id, author)
            }
            SkipReason::BelowThreshold { id, count } => {
                write!(f, "{} has only {} reviews", id, count)
            }
            SkipReason::Malformed { id, reason } => match id {
                Some(id) => write!(f, "{} is malformed: {}", id, reason),
                None => write!(f, "malformed card: {}", reason),
            },
        }
    }
}

/// Result of evaluating one candidate block.
pub type BlockOutcome = Result<CatalogEntry, SkipReason>;

/// Ways of locating the review-count label inside a card, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewLabelStrategy {
    /// Link whose aria-label names the review count ("128 valutazioni").
    AriaLabel,
    /// Underlined inline badge next to the star rating.
    InlineBadge,
}

impl ReviewLabelStrategy {
    pub const ORDER: [ReviewLabelStrategy; 2] =
        [ReviewLabelStrategy::AriaLabel, ReviewLabelStrategy::InlineBadge];

    fn locate(self, card: ElementRef<'_>, keywords: &[String]) -> Option<String> {
        match self {
            ReviewLabelStrategy::AriaLabel => card.select(&ARIA_LINK).find_map(|link| {
                let label = link.value().attr("aria-label")?;
                count_token(label, keywords).map(str::to_string)
            }),
            ReviewLabelStrategy::InlineBadge => card
                .select(&INLINE_BADGE)
                .next()
                .map(|badge| badge.text().collect::<String>()),
        }
    }

    /// A strategy succeeds only when its label carries at least one digit.
    fn accepts(label: &str) -> bool {
        label.chars().any(|c| c.is_ascii_digit())
    }
}

/// The whitespace token holding the count in a label that mentions one of
/// the keywords: the token before the keyword, or the one after it when the
/// keyword leads ("valutazioni: 128").
fn count_token<'a>(label: &'a str, keywords: &[String]) -> Option<&'a str> {
    let tokens: Vec<&str> = label.split_whitespace().collect();
    let position = tokens.iter().position(|token| {
        let token = token.to_lowercase();
        keywords.iter().any(|k| token.contains(k.as_str()))
    })?;
    match position.checked_sub(1) {
        Some(before) => tokens.get(before).copied(),
        None => tokens.get(position + 1).copied(),
    }
}

/// Parse a noisy count label by keeping only its digits. Unparseable or
/// empty labels count as zero.
pub fn parse_count(label: &str) -> u64 {
    let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// True when an author field names more than one contributor.
pub fn is_multiple_author(author: &str) -> bool {
    let lowered = author.to_lowercase();
    MULTI_AUTHOR_SEPARATORS
        .iter()
        .any(|sep| lowered.contains(sep))
}

/// First date-like label ("12 mar. 2024") in a card's text.
pub fn extract_date_label(text: &str) -> String {
    DATE_LABEL
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn normalized_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Card-level extraction rules for one run.
#[derive(Debug, Clone)]
pub struct Extractor {
    min_review_count: u64,
    author_marker: Regex,
    review_keywords: Vec<String>,
}

impl Extractor {
    pub fn new(config: &ExtractConfig, min_review_count: u64) -> Self {
        let markers: Vec<String> = config
            .author_markers
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(regex::escape)
            .collect();
        let pattern = format!(r"(?i)^(?:{})\s+", markers.join("|"));
        // Markers are escaped, so the pattern is always well formed.
        let author_marker = Regex::new(&pattern).unwrap_or_else(|_| {
            Regex::new(r"(?i)^(?:di|by)\s+").expect("static regex is valid")
        });

        Self {
            min_review_count,
            author_marker,
            review_keywords: config
                .review_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Lazily evaluate every result card of a parsed page. Admitted entries
    /// are registered in `ledger` as they are yielded.
    pub fn scan<'a>(
        &'a self,
        document: &'a Html,
        category: &'a str,
        ledger: &'a mut Ledger,
    ) -> PageScan<'a> {
        PageScan {
            blocks_found: document.select(&RESULT_CARD).count(),
            blocks: document.select(&RESULT_CARD),
            extractor: self,
            category,
            ledger,
        }
    }

    /// Evaluate every card of a parsed page and collect the outcomes.
    pub fn extract_document(
        &self,
        document: &Html,
        category: &str,
        ledger: &mut Ledger,
    ) -> PageExtraction {
        let scan = self.scan(document, category, ledger);
        let blocks_found = scan.blocks_found();

        let mut extraction = PageExtraction {
            blocks_found,
            entries: Vec::new(),
            skipped: Vec::new(),
        };
        for outcome in scan {
            match outcome {
                Ok(entry) => extraction.entries.push(entry),
                Err(reason) => extraction.skipped.push(reason),
            }
        }
        extraction
    }

    fn evaluate(&self, card: ElementRef<'_>, category: &str, ledger: &mut Ledger) -> BlockOutcome {
        let id = card
            .value()
            .attr("data-asin")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(SkipReason::MissingId)?;

        if ledger.contains(id) {
            return Err(SkipReason::AlreadySeen { id: id.to_string() });
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SkipReason::Malformed {
                id: Some(id.to_string()),
                reason: format!("item id {:?} contains whitespace", id),
            });
        }

        let author = self
            .author(card)
            .ok_or_else(|| SkipReason::MissingAuthor { id: id.to_string() })?;
        if is_multiple_author(&author) {
            return Err(SkipReason::MultipleAuthors {
                id: id.to_string(),
                author,
            });
        }

        let review_count = self.review_count(card);
        if review_count < self.min_review_count {
            return Err(SkipReason::BelowThreshold {
                id: id.to_string(),
                count: review_count,
            });
        }

        let title = card
            .select(&TITLE)
            .next()
            .map(normalized_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

        let cover_image_url = card
            .select(&COVER)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| src.trim().to_string())
            .unwrap_or_default();

        let publication_date_label = extract_date_label(&normalized_text(card));

        ledger.register(id);
        Ok(CatalogEntry {
            item_id: id.to_string(),
            cover_image_url,
            title,
            author,
            publication_date_label,
            review_count,
            category: category.to_string(),
        })
    }

    /// Author from the first row introduced by a "by" marker, with trailing
    /// qualifiers ("| 12 mar. 2024", "(Autore)") removed.
    fn author(&self, card: ElementRef<'_>) -> Option<String> {
        card.select(&ROW).find_map(|row| {
            let text = normalized_text(row);
            let marker = self.author_marker.find(&text)?;
            let rest = &text[marker.end()..];
            let author = rest
                .split('|')
                .next()
                .unwrap_or_default()
                .split('(')
                .next()
                .unwrap_or_default()
                .trim();
            Some(author.to_string())
        })
        .filter(|author| !author.is_empty())
    }

    fn review_count(&self, card: ElementRef<'_>) -> u64 {
        ReviewLabelStrategy::ORDER
            .iter()
            .filter_map(|strategy| strategy.locate(card, &self.review_keywords))
            .find(|label| ReviewLabelStrategy::accepts(label))
            .map(|label| parse_count(&label))
            .unwrap_or(0)
    }
}

/// Lazy, single-pass sequence of outcomes for one page's cards.
pub struct PageScan<'a> {
    blocks: Select<'a, 'static>,
    blocks_found: usize,
    extractor: &'a Extractor,
    category: &'a str,
    ledger: &'a mut Ledger,
}

impl PageScan<'_> {
    /// Number of candidate blocks on the page, admitted or not.
    pub fn blocks_found(&self) -> usize {
        self.blocks_found
    }
}

impl Iterator for PageScan<'_> {
    type Item = BlockOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        let card = self.blocks.next()?;
        Some(self.extractor.evaluate(card, self.category, self.ledger))
    }
}

/// Collected outcome of one listing page.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub blocks_found: usize,
    pub entries: Vec<CatalogEntry>,
    pub skipped: Vec<SkipReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str, author_row: &str, review_label: &str) -> String {
        format!(
            r#"<div data-component-type="s-search-result" data-asin="{id}">
                <img class="s-image" src="https://img.example/{id}.jpg">
                <h2><a><span>Il libro {id}</span></a></h2>
                <div class="a-row"><span>{author_row}</span><span> | </span><span>12 mar. 2024</span></div>
                <div class="a-row"><a aria-label="{review_label}" href="/dp"><span class="s-underline-text">{review_label}</span></a></div>
            </div>"#
        )
    }

    fn page(cards: &[String]) -> String {
        format!("<html><body><div class=\"s-main\">{}</div></body></html>", cards.join("\n"))
    }

    fn extractor() -> Extractor {
        Extractor::new(&ExtractConfig::default(), 60)
    }

    fn extract(html: &str, ledger: &mut Ledger) -> PageExtraction {
        extractor().extract_document(&Html::parse_document(html), "Storia", ledger)
    }

    #[test]
    fn admits_single_author_above_threshold() {
        let html = page(&[card("B001", "di Jane Doe", "128 valutazioni")]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);

        assert_eq!(result.blocks_found, 1);
        assert_eq!(result.entries.len(), 1);
        let entry = &result.entries[0];
        assert_eq!(entry.item_id, "B001");
        assert_eq!(entry.author, "Jane Doe");
        assert_eq!(entry.review_count, 128);
        assert_eq!(entry.title, "Il libro B001");
        assert_eq!(entry.cover_image_url, "https://img.example/B001.jpg");
        assert_eq!(entry.publication_date_label, "12 mar. 2024");
        assert_eq!(entry.category, "Storia");
        assert!(ledger.contains("B001"));
    }

    #[test]
    fn rejects_multiple_authors() {
        let html = page(&[card("B002", "di Jane Doe, John Smith", "128 valutazioni")]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);

        assert!(result.entries.is_empty());
        assert_eq!(result.skipped[0].kind(), "multi-author");
        assert!(!ledger.contains("B002"));
    }

    #[test]
    fn multi_author_separators() {
        assert!(is_multiple_author("Jane Doe, John Smith"));
        assert!(is_multiple_author("Jane Doe and John Smith"));
        assert!(is_multiple_author("Mario Rossi e Luigi Bianchi"));
        assert!(is_multiple_author("Pierre et Marie"));
        assert!(is_multiple_author("Jane Doe & John Smith"));
        assert!(!is_multiple_author("Umberto Eco"));
        assert!(!is_multiple_author("Elena Ferrante"));
    }

    #[test]
    fn rejects_missing_author() {
        let html = page(&[card("B003", "Copertina flessibile", "500 valutazioni")]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);
        assert_eq!(
            result.skipped,
            vec![SkipReason::MissingAuthor {
                id: "B003".to_string()
            }]
        );
    }

    #[test]
    fn strips_trailing_qualifiers_from_author() {
        let html = page(&[card("B004", "di Umberto Eco (Autore)", "2.345 valutazioni")]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);
        assert_eq!(result.entries[0].author, "Umberto Eco");
        assert_eq!(result.entries[0].review_count, 2345);
    }

    #[test]
    fn rejects_below_threshold() {
        let html = page(&[card("B005", "di Jane Doe", "59 valutazioni")]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);
        assert_eq!(
            result.skipped,
            vec![SkipReason::BelowThreshold {
                id: "B005".to_string(),
                count: 59
            }]
        );
    }

    #[test]
    fn duplicate_within_page_admitted_once() {
        let html = page(&[
            card("B006", "di Jane Doe", "100 valutazioni"),
            card("B006", "di Someone Else", "900 valutazioni"),
        ]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);

        assert_eq!(result.blocks_found, 2);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].review_count, 100);
        assert_eq!(result.skipped[0].kind(), "duplicate");
    }

    #[test]
    fn ledger_short_circuits_before_field_parsing() {
        // The card is otherwise unadmittable; the ledger verdict wins.
        let html = page(&[card("B007", "di A, B", "1 valutazioni")]);
        let mut ledger = Ledger::new();
        ledger.register("B007");
        let result = extract(&html, &mut ledger);
        assert_eq!(
            result.skipped,
            vec![SkipReason::AlreadySeen {
                id: "B007".to_string()
            }]
        );
    }

    #[test]
    fn missing_id_and_malformed_cards_do_not_abort_page() {
        let html = page(&[
            r#"<div data-component-type="s-search-result" data-asin=""></div>"#.to_string(),
            r#"<div data-component-type="s-search-result" data-asin="B 008"></div>"#.to_string(),
            card("B009", "di Jane Doe", "61 valutazioni"),
        ]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);

        assert_eq!(result.blocks_found, 3);
        assert_eq!(result.entries.len(), 1);
        let kinds: Vec<&str> = result.skipped.iter().map(SkipReason::kind).collect();
        assert_eq!(kinds, vec!["missing-id", "malformed"]);
        assert!(matches!(
            &result.skipped[1],
            SkipReason::Malformed { id: Some(id), .. } if id == "B 008"
        ));
        assert!(result.skipped[1].to_string().starts_with("B 008 is malformed"));
    }

    #[test]
    fn falls_back_to_inline_badge() {
        let html = page(&[r#"<div data-component-type="s-search-result" data-asin="B010">
                <h2>Titolo</h2>
                <div class="a-row">by Jane Doe</div>
                <a aria-label="4,5 su 5 stelle" href="/dp"></a>
                <span class="s-underline-text">(1.024)</span>
            </div>"#
            .to_string()]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);
        assert_eq!(result.entries[0].review_count, 1024);
        assert_eq!(result.entries[0].publication_date_label, "");
    }

    #[test]
    fn count_follows_a_leading_keyword() {
        let keywords = vec!["valutazioni".to_string()];
        assert_eq!(count_token("valutazioni: 1.024", &keywords), Some("1.024"));
        assert_eq!(count_token("4,5 su 5 stelle, 128 valutazioni", &keywords), Some("128"));
        assert_eq!(count_token("valutazioni", &keywords), None);
        assert_eq!(count_token("4,5 su 5 stelle", &keywords), None);
    }

    #[test]
    fn leading_keyword_label_is_accepted() {
        let html = page(&[r#"<div data-component-type="s-search-result" data-asin="B012">
                <div class="a-row">di Jane Doe</div>
                <a aria-label="valutazioni: 640" href="/dp"></a>
            </div>"#
            .to_string()]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);
        assert_eq!(result.entries[0].review_count, 640);
    }

    #[test]
    fn missing_title_uses_sentinel() {
        let html = page(&[r#"<div data-component-type="s-search-result" data-asin="B011">
                <div class="a-row">di Jane Doe</div>
                <a aria-label="300 voti" href="/dp"></a>
            </div>"#
            .to_string()]);
        let mut ledger = Ledger::new();
        let result = extract(&html, &mut ledger);
        assert_eq!(result.entries[0].title, UNKNOWN_TITLE);
        assert_eq!(result.entries[0].cover_image_url, "");
    }

    #[test]
    fn unparseable_count_is_zero() {
        assert_eq!(parse_count("nessuna"), 0);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("1.234"), 1234);
        assert_eq!(parse_count("99999999999999999999999"), 0);
    }

    #[test]
    fn scan_is_lazy_and_reports_block_count() {
        let html = page(&[
            card("C1", "di Jane Doe", "100 valutazioni"),
            card("C2", "di Jane Doe", "100 valutazioni"),
        ]);
        let document = Html::parse_document(&html);
        let mut ledger = Ledger::new();
        let extractor = extractor();
        let mut scan = extractor.scan(&document, "Storia", &mut ledger);

        assert_eq!(scan.blocks_found(), 2);
        assert!(scan.next().is_some_and(|o| o.is_ok()));
        drop(scan);
        // Only the consumed card was registered.
        assert!(ledger.contains("C1"));
        assert!(!ledger.contains("C2"));
    }

    #[test]
    fn empty_page_has_no_blocks() {
        let mut ledger = Ledger::new();
        let result = extract("<html><body></body></html>", &mut ledger);
        assert_eq!(result.blocks_found, 0);
        assert!(result.entries.is_empty());
    }
}
