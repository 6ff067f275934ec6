//! Configuration inspection commands.

use console::style;

use bookscout::config::Settings;

use crate::cli::icons::{bullet, dim_arrow, error, success};

fn source_label(settings: &Settings) -> String {
    settings
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string())
}

/// Print the effective settings as TOML.
pub fn cmd_config_show(settings: &Settings) -> anyhow::Result<()> {
    let rendered = settings.to_toml()?;
    println!("# source: {}", source_label(settings));
    print!("{}", rendered);
    Ok(())
}

/// Validate settings and list the categories that would be crawled.
pub fn cmd_config_check(settings: &Settings) -> anyhow::Result<()> {
    if let Err(e) = settings.validate() {
        eprintln!("{} Invalid configuration: {}", error(), e);
        eprintln!("  {} Source: {}", dim_arrow(), source_label(settings));
        return Err(e.into());
    }

    eprintln!("{} Configuration is valid", success());
    eprintln!("  {} Source: {}", dim_arrow(), source_label(settings));
    eprintln!("  {} Output: {}", dim_arrow(), settings.output.display());
    eprintln!(
        "  {} {} pages per category, at least {} reviews",
        dim_arrow(),
        settings.pages_per_category,
        settings.min_review_count
    );
    for category in &settings.categories {
        eprintln!("  {} {}", bullet(), style(&category.name).bold());
        eprintln!("      {}", style(&category.start_url).dim());
    }
    Ok(())
}
