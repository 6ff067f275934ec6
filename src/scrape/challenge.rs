//! Bot-verification interstitial detection.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static CAPTCHA_INPUT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("input#captchacharacters").expect("static selector is valid")
});

/// Verdict on a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// The page carries real content.
    Clear,
    /// A verification puzzle replaced the content.
    Captcha { marker: String },
}

impl Challenge {
    pub fn is_challenged(&self) -> bool {
        matches!(self, Challenge::Captcha { .. })
    }
}

/// Detects verification pages by their input field or signature phrases.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    phrases: Vec<String>,
}

impl ChallengeDetector {
    pub fn new(phrases: &[String]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn detect(&self, html: &str) -> Challenge {
        let document = Html::parse_document(html);
        self.detect_document(&document)
    }

    pub fn detect_document(&self, document: &Html) -> Challenge {
        if document.select(&CAPTCHA_INPUT).next().is_some() {
            return Challenge::Captcha {
                marker: "input#captchacharacters".to_string(),
            };
        }

        let text = document.root_element().text().collect::<String>().to_lowercase();
        match self.phrases.iter().find(|p| text.contains(p.as_str())) {
            Some(phrase) => Challenge::Captcha {
                marker: phrase.clone(),
            },
            None => Challenge::Clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractConfig;

    fn detector() -> ChallengeDetector {
        ChallengeDetector::new(&ExtractConfig::default().challenge_phrases)
    }

    #[test]
    fn detects_captcha_input() {
        let html = r#"<html><body><form><input id="captchacharacters" name="field-keywords"></form></body></html>"#;
        assert_eq!(
            detector().detect(html),
            Challenge::Captcha {
                marker: "input#captchacharacters".to_string()
            }
        );
    }

    #[test]
    fn detects_signature_phrase_case_insensitively() {
        let html = "<html><body><h4>Inserisci i caratteri visualizzati nello spazio sottostante</h4></body></html>";
        assert!(detector().detect(html).is_challenged());
    }

    #[test]
    fn listing_page_is_clear() {
        let html = r#"<html><body><div data-component-type="s-search-result" data-asin="B001"></div></body></html>"#;
        assert_eq!(detector().detect(html), Challenge::Clear);
    }

    #[test]
    fn blank_phrases_are_ignored() {
        let detector = ChallengeDetector::new(&["   ".to_string()]);
        assert_eq!(detector.detect("<p>anything</p>"), Challenge::Clear);
    }
}
