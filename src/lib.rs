//! bookscout - marketplace book catalog crawler.
//!
//! Walks paginated category listings in a real browser session, keeps the
//! single-author titles with enough reviews, and appends them to a CSV file
//! as it goes.

pub mod browser;
pub mod config;
pub mod crawl;
pub mod error;
pub mod models;
pub mod scrape;
pub mod sink;
