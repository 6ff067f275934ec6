//! The crawl command.

use anyhow::Context;
use console::style;
use tokio::sync::{mpsc, watch};

use bookscout::browser::BrowserFetcher;
use bookscout::config::Settings;
use bookscout::crawl::{CategoryOutcome, Crawler, RunMode, RunSummary};
use bookscout::sink::CsvSink;

use crate::cli::icons::{bullet, dim_arrow, info, success, warn};
use crate::cli::progress::CrawlProgress;
use crate::cli::prompt::TerminalResolver;
use crate::cli::CrawlArgs;

/// Fold command-line overrides into the loaded settings.
fn apply_overrides(settings: &mut Settings, args: &CrawlArgs) -> anyhow::Result<()> {
    if let Some(ref output) = args.output {
        settings.output = output.clone();
    }
    if let Some(pages) = args.pages {
        settings.pages_per_category = pages;
    }
    if let Some(min_reviews) = args.min_reviews {
        settings.min_review_count = min_reviews;
    }
    if args.headed {
        settings.browser.headless = false;
    }
    if args.attended && settings.browser.headless && settings.browser.remote_url.is_none() {
        tracing::info!("Attended run: opening a visible browser window");
        settings.browser.headless = false;
    }
    if args.fresh {
        settings.seed_from_sink = false;
    }
    settings.retain_categories(&args.categories)?;
    settings.validate()?;
    Ok(())
}

pub async fn cmd_crawl(mut settings: Settings, args: CrawlArgs) -> anyhow::Result<()> {
    apply_overrides(&mut settings, &args).context("Invalid configuration")?;

    let sink = CsvSink::new(&settings.output);
    if args.fresh && sink.remove()? {
        eprintln!(
            "{} Removed previous output {}",
            warn(),
            sink.path().display()
        );
    }

    eprintln!(
        "{} Crawling {} categor{} into {} ({})",
        info(),
        settings.categories.len(),
        if settings.categories.len() == 1 { "y" } else { "ies" },
        sink.path().display(),
        if args.attended { "attended" } else { "unattended" }
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Interrupted, stopping after the current page",
                warn()
            );
            let _ = cancel_tx.send(true);
        }
    });

    let progress = CrawlProgress::new();
    let (event_tx, event_rx) = mpsc::channel(64);
    let progress_task = progress.clone().spawn(event_rx);

    let mode = if args.attended {
        RunMode::Attended(Box::new(TerminalResolver::new(progress.clone())))
    } else {
        RunMode::Unattended
    };

    let fetcher = BrowserFetcher::new(settings.browser.clone(), settings.delay.clone());
    let mut crawler = Crawler::new(&settings, fetcher, mode)
        .with_cancel(cancel_rx)
        .with_events(event_tx);

    let result = crawler.run().await;
    drop(crawler);
    let _ = progress_task.await;

    let summary = result.context("Crawl failed")?;
    print_summary(&summary, &sink);
    Ok(())
}

fn print_summary(summary: &RunSummary, sink: &CsvSink) {
    let headline = if summary.interrupted {
        format!("{} Crawl interrupted", warn())
    } else {
        format!("{} Crawl complete", success())
    };
    eprintln!("{}", headline);

    if summary.seeded > 0 {
        eprintln!(
            "  {} {} items already in the output were skipped",
            dim_arrow(),
            summary.seeded
        );
    }
    for category in &summary.categories {
        let note = match category.outcome {
            CategoryOutcome::Abandoned { .. } | CategoryOutcome::Interrupted { .. } => {
                style(category.outcome.to_string()).yellow()
            }
            _ => style(category.outcome.to_string()).dim(),
        };
        eprintln!(
            "  {} {}: {} kept, {} pages, {}",
            bullet(),
            style(&category.name).bold(),
            category.admitted,
            category.pages,
            note
        );
        eprintln!("      {}", style(category.rejections()).dim());
    }
    eprintln!(
        "  {} {} new rows from {} pages",
        dim_arrow(),
        summary.total_admitted(),
        summary.total_pages()
    );
    match summary.sorted_rows {
        Some(rows) => eprintln!(
            "  {} {} sorted ({} rows)",
            dim_arrow(),
            sink.path().display(),
            rows
        ),
        None => eprintln!(
            "  {} {} left unsorted; run `bookscout sort` to finish it",
            dim_arrow(),
            sink.path().display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> CrawlArgs {
        CrawlArgs {
            attended: false,
            headed: false,
            fresh: false,
            output: None,
            pages: None,
            min_reviews: None,
            categories: Vec::new(),
        }
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = Settings::default();
        let mut args = args();
        args.output = Some(PathBuf::from("out/books.csv"));
        args.pages = Some(3);
        args.min_reviews = Some(500);
        args.categories = vec!["Storia".to_string()];

        apply_overrides(&mut settings, &args).unwrap();
        assert_eq!(settings.output, PathBuf::from("out/books.csv"));
        assert_eq!(settings.pages_per_category, 3);
        assert_eq!(settings.min_review_count, 500);
        assert_eq!(settings.categories.len(), 1);
        assert!(settings.browser.headless);
    }

    #[test]
    fn attended_opens_a_window_and_fresh_skips_seeding() {
        let mut settings = Settings::default();
        let mut args = args();
        args.attended = true;
        args.fresh = true;

        apply_overrides(&mut settings, &args).unwrap();
        assert!(!settings.browser.headless);
        assert!(!settings.seed_from_sink);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut settings = Settings::default();
        let mut args = args();
        args.categories = vec!["Cucina".to_string()];
        assert!(apply_overrides(&mut settings, &args).is_err());
    }

    #[test]
    fn zero_pages_fails_validation() {
        let mut settings = Settings::default();
        let mut args = args();
        args.pages = Some(0);
        assert!(apply_overrides(&mut settings, &args).is_err());
    }
}
