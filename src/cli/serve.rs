use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use console::style;
use tokio::sync::Mutex;
use tracing::info;

use super::parse_serve_flags;
use crate::core::config::Settings;
use crate::core::lifecycle::LifecycleManager;
use crate::core::orchestrator::AnalysisEngine;
use crate::core::store::Store;
use crate::core::terminal::{self, GuideSection, print_warn};
use crate::interfaces::web::auth::is_loopback;
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging::init_tracing;

pub async fn run_serve(args: &[String], config_path: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config_path)?;
    init_tracing(&settings.logging.level, false);

    let (host, port) = parse_serve_flags(
        args,
        2,
        settings.server.host.clone(),
        settings.server.port,
    );

    let store = Store::open(&settings.storage.database, settings.embeddings.dimensions).await?;
    let engine = Arc::new(AnalysisEngine::from_settings(&settings, store.clone()));

    let server = ApiServer::new(ApiServerConfig {
        store: store.clone(),
        engine,
        api_host: host.clone(),
        api_port: port,
    });

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(server)));
    lifecycle.start().await?;

    terminal::print_banner();
    terminal::print_link(
        "Stream",
        &format!("http://{}:{}/api/analysis/<document_id>", host, port),
    );
    GuideSection::new("Analysis API")
        .status("Health", &format!("http://{}:{}/api/health", host, port))
        .status("Retrieval", settings.retrieval.strategy.as_str())
        .status(
            "Corpus",
            &format!("{} ({} dims)", settings.embeddings.model, store.dimensions()),
        )
        .status(
            "Web search",
            if settings.web_search_enabled() {
                "enabled"
            } else {
                "disabled"
            },
        )
        .blank()
        .status(
            "Press Ctrl+C to stop the server.",
            &format!("{}", style("Ctrl+C").bold().yellow()),
        )
        .print();
    println!();

    if !store.has_any_api_tokens().await? && !is_loopback(&host) {
        print_warn("No API tokens exist; every request will be rejected. Run 'prd-review token create <name>'.");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    lifecycle.shutdown().await?;
    Ok(())
}
