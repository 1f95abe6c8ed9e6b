use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use console::style;
use tracing::info;

use super::EvaluateArgs;
use crate::core::config::Settings;
use crate::core::retrieval::{
    CorpusCategory, RetrievalService, RetrievalStrategy, StrategyComparison, compare_strategies,
};
use crate::core::store::Store;
use crate::core::terminal::{GuideSection, print_warn};
use crate::logging::init_tracing;

/// One query per line; blank lines and `#` comments are skipped.
pub(crate) fn parse_query_file(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn format_score(score: Option<f32>) -> String {
    score
        .map(|s| format!("{:.3}", s))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_comparison(comparison: &StrategyComparison, limit: usize) {
    for q in &comparison.queries {
        GuideSection::new(&q.query)
            .status(
                "plain",
                &format!(
                    "{} hits, top {}",
                    q.plain.len(),
                    format_score(q.plain.first().map(|d| d.score))
                ),
            )
            .status(
                "compressed",
                &format!(
                    "{} hits, top {}",
                    q.compressed.len(),
                    format_score(q.compressed.first().map(|d| d.score))
                ),
            )
            .status(
                "overlap",
                &format!("{} shared ({:.2})", q.shared(), q.overlap()),
            )
            .print();
    }

    let mut summary = GuideSection::new("Summary").status(
        "Queries",
        &format!("{} (limit {})", comparison.queries.len(), limit),
    );
    for strategy in [RetrievalStrategy::Plain, RetrievalStrategy::Compressed] {
        summary = summary.status(
            strategy.as_str(),
            &format!(
                "{} hits, {} empty, mean top {}",
                comparison.total_hits(strategy),
                comparison.misses(strategy),
                format_score(comparison.mean_top_score(strategy))
            ),
        );
    }
    summary
        .status("Mean overlap", &format_score(comparison.mean_overlap()))
        .print();

    for note in &comparison.notes {
        print_warn(note);
    }
    println!();
}

pub async fn run_evaluate(args: EvaluateArgs, config_path: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config_path)?;
    init_tracing(&settings.logging.level, true);

    let file = args
        .queries
        .as_deref()
        .ok_or_else(|| anyhow!("--queries is required"))?;
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let queries = parse_query_file(&raw);
    if queries.is_empty() {
        bail!("{} contains no queries", file.display());
    }

    let categories: BTreeSet<CorpusCategory> = match &args.categories {
        Some(raw) => raw
            .split(',')
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.parse::<CorpusCategory>())
            .collect::<Result<_>>()?,
        None => settings.retrieval.categories.iter().copied().collect(),
    };
    let limit = args.limit.unwrap_or(settings.retrieval.top_k).max(1);

    let store = Store::open(&settings.storage.database, settings.embeddings.dimensions).await?;
    let service = RetrievalService::from_settings(&settings, store);
    if !settings.rerank_enabled() {
        print_warn("No rerank key configured; compressed results follow similarity order.");
    }

    info!(queries = queries.len(), limit, "Comparing retrieval strategies");
    let comparison = compare_strategies(&service, &queries, &categories, limit).await;

    println!(
        "\n  {} {} queries against {}\n",
        style("●").cyan(),
        queries.len(),
        settings.storage.database.display()
    );
    print_comparison(&comparison, limit);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_file_skips_blanks_and_comments() {
        let raw = "# churn set\nwhy do trial users churn\n\n  checkout drop-off  \n#skip\n";
        assert_eq!(
            parse_query_file(raw),
            vec!["why do trial users churn", "checkout drop-off"]
        );
        assert!(parse_query_file("\n# only comments\n").is_empty());
    }

    #[test]
    fn missing_scores_render_as_na() {
        assert_eq!(format_score(None), "n/a");
        assert_eq!(format_score(Some(0.5)), "0.500");
    }
}
