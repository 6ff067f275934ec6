//! Turning fetched listing pages into catalog entries.

mod challenge;
mod extract;
mod ledger;

pub use challenge::{Challenge, ChallengeDetector};
pub use extract::{
    extract_date_label, is_multiple_author, parse_count, BlockOutcome, Extractor,
    PageExtraction, PageScan, ReviewLabelStrategy, SkipReason,
};
pub use ledger::Ledger;

use scraper::Html;

/// What a single fetched page turned out to be.
#[derive(Debug)]
pub enum PageVerdict {
    /// A verification interstitial replaced the listing.
    Challenged { marker: String },
    /// A listing (possibly empty) that was fully evaluated.
    Listing(PageExtraction),
}

/// Parse `html` once, check it for a challenge and, if clear, evaluate
/// its result cards. Synchronous so the parsed document never crosses an
/// await point.
pub fn inspect_page(
    html: &str,
    category: &str,
    extractor: &Extractor,
    detector: &ChallengeDetector,
    ledger: &mut Ledger,
) -> PageVerdict {
    let document = Html::parse_document(html);

    if let Challenge::Captcha { marker } = detector.detect_document(&document) {
        return PageVerdict::Challenged { marker };
    }

    PageVerdict::Listing(extractor.extract_document(&document, category, ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractConfig;

    #[test]
    fn challenged_page_touches_nothing() {
        let config = ExtractConfig::default();
        let extractor = Extractor::new(&config, 60);
        let detector = ChallengeDetector::new(&config.challenge_phrases);
        let mut ledger = Ledger::new();

        let html = r#"<html><body>
            <input id="captchacharacters">
            <div data-component-type="s-search-result" data-asin="B001">
                <div class="a-row">di Jane Doe</div>
                <a aria-label="500 valutazioni" href="/dp"></a>
            </div>
        </body></html>"#;

        let verdict = inspect_page(html, "Storia", &extractor, &detector, &mut ledger);
        assert!(matches!(verdict, PageVerdict::Challenged { .. }));
        assert!(ledger.is_empty());
    }

    #[test]
    fn clear_page_is_extracted() {
        let config = ExtractConfig::default();
        let extractor = Extractor::new(&config, 60);
        let detector = ChallengeDetector::new(&config.challenge_phrases);
        let mut ledger = Ledger::new();

        let html = r#"<html><body>
            <div data-component-type="s-search-result" data-asin="B001">
                <div class="a-row">di Jane Doe</div>
                <a aria-label="500 valutazioni" href="/dp"></a>
            </div>
        </body></html>"#;

        match inspect_page(html, "Storia", &extractor, &detector, &mut ledger) {
            PageVerdict::Listing(extraction) => {
                assert_eq!(extraction.blocks_found, 1);
                assert_eq!(extraction.entries.len(), 1);
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
        assert!(ledger.contains("B001"));
    }
}
