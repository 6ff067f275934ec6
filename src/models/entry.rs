//! Catalog entry model and output ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Title written when a result card carries no readable heading.
pub const UNKNOWN_TITLE: &str = "N/D";

/// Output column order. Downstream consumers rely on these exact names.
pub const COLUMNS: [&str; 7] = [
    "ItemId",
    "CoverImageUrl",
    "Title",
    "Author",
    "PublicationDateLabel",
    "ReviewCount",
    "Category",
];

/// One admitted catalog item.
///
/// Field order matches [`COLUMNS`]; the csv serializer writes fields in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "ItemId")]
    pub item_id: String,
    #[serde(rename = "CoverImageUrl", default)]
    pub cover_image_url: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "PublicationDateLabel", default)]
    pub publication_date_label: String,
    #[serde(rename = "ReviewCount")]
    pub review_count: u64,
    #[serde(rename = "Category")]
    pub category: String,
}

impl CatalogEntry {
    /// Ordering used by the terminal normalization pass:
    /// category ascending, then review count descending.
    pub fn output_order(&self, other: &Self) -> Ordering {
        self.category
            .cmp(&other.category)
            .then_with(|| other.review_count.cmp(&self.review_count))
    }
}

/// Sort entries in place for the final output file. Stable, so entries
/// with equal keys keep their discovery order.
pub fn sort_for_output(entries: &mut [CatalogEntry]) {
    entries.sort_by(CatalogEntry::output_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, category: &str, reviews: u64) -> CatalogEntry {
        CatalogEntry {
            item_id: id.to_string(),
            cover_image_url: String::new(),
            title: format!("Title {}", id),
            author: "Jane Doe".to_string(),
            publication_date_label: String::new(),
            review_count: reviews,
            category: category.to_string(),
        }
    }

    #[test]
    fn sorts_by_category_then_reviews_descending() {
        let mut entries = vec![
            entry("A", "Storia", 70),
            entry("B", "Politica", 80),
            entry("C", "Storia", 900),
            entry("D", "Politica", 1200),
        ];
        sort_for_output(&mut entries);

        let ids: Vec<&str> = entries.iter().map(|e| e.item_id.as_str()).collect();
        assert_eq!(ids, vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut entries = vec![
            entry("first", "Storia", 100),
            entry("second", "Storia", 100),
        ];
        sort_for_output(&mut entries);
        assert_eq!(entries[0].item_id, "first");
        assert_eq!(entries[1].item_id, "second");
    }
}
