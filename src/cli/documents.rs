use std::path::Path;

use anyhow::{Context, Result, anyhow};
use console::style;

use super::ContentArgs;
use crate::core::config::Settings;
use crate::core::llm::Embedder;
use crate::core::llm::providers::OpenAiEmbedder;
use crate::core::retrieval::CorpusCategory;
use crate::core::store::{NewChunk, Store};
use crate::core::terminal::{print_error, print_info, print_success};
use crate::logging::init_tracing;

async fn open_store(config_path: Option<&Path>) -> Result<(Settings, Store)> {
    let settings = Settings::load(config_path)?;
    init_tracing(&settings.logging.level, true);
    let store = Store::open(&settings.storage.database, settings.embeddings.dimensions).await?;
    Ok((settings, store))
}

async fn read_content(args: &ContentArgs) -> Result<(String, String)> {
    let title = args
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| anyhow!("--title is required"))?;
    let file = args
        .file
        .as_deref()
        .ok_or_else(|| anyhow!("--file is required"))?;
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    Ok((title, content))
}

pub async fn run_document_add(args: ContentArgs, config_path: Option<&Path>) -> Result<()> {
    let (title, content) = read_content(&args).await?;
    let (_, store) = open_store(config_path).await?;
    let document = store.insert_document(&title, &content).await?;
    print_success(&format!("Stored '{}'", document.title));
    println!("{}", document.id);
    Ok(())
}

pub async fn run_document_list(config_path: Option<&Path>) -> Result<()> {
    let (_, store) = open_store(config_path).await?;
    let documents = store.list_documents().await?;
    if documents.is_empty() {
        print_info("No documents stored yet. Add one with 'prd-review document add'.");
        return Ok(());
    }
    for (id, title) in documents {
        println!(
            "  {} {}  {}",
            style("→").cyan(),
            style(id).dim(),
            style(title).bold()
        );
    }
    Ok(())
}

pub async fn run_corpus_add(args: ContentArgs, config_path: Option<&Path>) -> Result<()> {
    let category: CorpusCategory = match args.category.as_deref() {
        Some(raw) => raw.parse()?,
        None => {
            print_error("Error: --category is required (research, analytics or prd).");
            return Ok(());
        }
    };
    let (title, content) = read_content(&args).await?;
    let (settings, store) = open_store(config_path).await?;

    let embedder = OpenAiEmbedder::from_settings(&settings);
    let embedding = embedder.embed(&content).await?;
    let chunk = NewChunk {
        source_id: uuid::Uuid::new_v4().to_string(),
        title,
        category,
        content,
    };
    let id = store.insert_chunk(&chunk, &embedding).await?;
    print_success(&format!(
        "Added '{}' to the {} corpus (chunk {})",
        chunk.title, chunk.category, id
    ));
    Ok(())
}
