//! Stand-alone terminal sort of an output file.

use anyhow::Context;

use bookscout::config::Settings;
use bookscout::sink::CsvSink;

use crate::cli::icons::{error, success};

pub fn cmd_sort(settings: &Settings) -> anyhow::Result<()> {
    let sink = CsvSink::new(&settings.output);
    if !sink.path().exists() {
        eprintln!("{} No output file at {}", error(), sink.path().display());
        anyhow::bail!("nothing to sort");
    }

    let rows = sink
        .normalize()
        .with_context(|| format!("Failed to sort {}", sink.path().display()))?;
    eprintln!(
        "{} Sorted {} rows in {}",
        success(),
        rows,
        sink.path().display()
    );
    Ok(())
}
