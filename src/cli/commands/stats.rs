//! Per-category summary of an output file.

use std::collections::BTreeMap;

use anyhow::Context;
use console::style;

use bookscout::config::Settings;
use bookscout::models::CatalogEntry;
use bookscout::sink::CsvSink;

use crate::cli::icons::{bullet, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CategoryStats {
    rows: usize,
    min_reviews: u64,
    max_reviews: u64,
}

fn summarize(entries: &[CatalogEntry], min_reviews: u64) -> BTreeMap<&str, CategoryStats> {
    let mut by_category: BTreeMap<&str, CategoryStats> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.review_count >= min_reviews) {
        by_category
            .entry(entry.category.as_str())
            .and_modify(|s| {
                s.rows += 1;
                s.min_reviews = s.min_reviews.min(entry.review_count);
                s.max_reviews = s.max_reviews.max(entry.review_count);
            })
            .or_insert(CategoryStats {
                rows: 1,
                min_reviews: entry.review_count,
                max_reviews: entry.review_count,
            });
    }
    by_category
}

pub fn cmd_stats(settings: &Settings, min_reviews: Option<u64>) -> anyhow::Result<()> {
    let sink = CsvSink::new(&settings.output);
    let entries = sink
        .read_all()
        .with_context(|| format!("Failed to read {}", sink.path().display()))?;

    if entries.is_empty() {
        println!("{} No rows in {}", warn(), sink.path().display());
        return Ok(());
    }

    let summary = summarize(&entries, min_reviews.unwrap_or(0));
    let width = summary.keys().map(|k| k.chars().count()).max().unwrap_or(0);

    println!("{}", style(sink.path().display()).bold());
    for (category, stats) in &summary {
        println!(
            "  {} {:<width$}  {:>6} rows  reviews {}..{}",
            bullet(),
            category,
            stats.rows,
            stats.min_reviews,
            stats.max_reviews,
            width = width
        );
    }
    let total: usize = summary.values().map(|s| s.rows).sum();
    println!("  {} {}", style("Total:").bold(), total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, category: &str, reviews: u64) -> CatalogEntry {
        CatalogEntry {
            item_id: id.to_string(),
            cover_image_url: String::new(),
            title: id.to_string(),
            author: "Jane Doe".to_string(),
            publication_date_label: String::new(),
            review_count: reviews,
            category: category.to_string(),
        }
    }

    #[test]
    fn groups_and_filters_by_reviews() {
        let entries = vec![
            entry("A", "Storia", 70),
            entry("B", "Storia", 900),
            entry("C", "Politica", 65),
            entry("D", "Politica", 10),
        ];

        let summary = summarize(&entries, 60);
        assert_eq!(summary.len(), 2);
        assert_eq!(
            summary["Storia"],
            CategoryStats {
                rows: 2,
                min_reviews: 70,
                max_reviews: 900
            }
        );
        assert_eq!(summary["Politica"].rows, 1);

        assert!(summarize(&entries, 1000).is_empty());
    }
}
