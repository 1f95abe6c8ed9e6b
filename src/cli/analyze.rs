use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::AnalyzeArgs;
use crate::core::config::Settings;
use crate::core::orchestrator::{AnalysisEngine, JobEvent, JobState};
use crate::core::store::Store;
use crate::core::terminal::{print_event, print_warn};
use crate::logging::init_tracing;

fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['-', '_'], " "))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Untitled PRD".to_string())
}

pub async fn run_analyze(args: AnalyzeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut settings = Settings::load(config_path)?;
    init_tracing(&settings.logging.level, !args.verbose);

    if let Some(strategy) = &args.strategy {
        settings.retrieval.strategy = strategy.parse()?;
    }
    if args.no_web {
        settings.web_search.enabled = false;
    }

    let file = args
        .file
        .as_deref()
        .ok_or_else(|| anyhow!("--file is required"))?;
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let title = args.title.clone().unwrap_or_else(|| default_title(file));

    let store = Store::open(&settings.storage.database, settings.embeddings.dimensions).await?;
    let document = store.insert_document(&title, &content).await?;
    info!(document_id = %document.id, "Stored document for analysis");

    let engine = Arc::new(AnalysisEngine::from_settings(&settings, store));
    let mut handle = engine.start(document);
    let mut report = None;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                print_event(&event);
                if let JobEvent::FinalReport { content, .. } = event {
                    report = Some(content);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                print_warn("Interrupted, canceling analysis");
                handle.cancel();
            }
        }
    }

    let (job, _) = handle.finish().await?;
    match (job.state(), report) {
        (JobState::Completed, Some(content)) => {
            match &args.out {
                Some(out) => {
                    tokio::fs::write(out, &content)
                        .await
                        .with_context(|| format!("failed to write {}", out.display()))?;
                    eprintln!("Report written to {}", out.display());
                }
                None => println!("{}", content),
            }
            Ok(())
        }
        _ => Err(anyhow!(
            "analysis {}: {}",
            job.status().as_str(),
            job.error().unwrap_or("no report produced")
        )),
    }
}
