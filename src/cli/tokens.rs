use std::path::Path;

use anyhow::Result;
use console::style;

use crate::core::config::Settings;
use crate::core::store::Store;
use crate::core::terminal::print_success;
use crate::logging::init_tracing;

pub(crate) fn parse_token_name(args: &[String], start: usize) -> Option<String> {
    let mut name = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--name" | "-n" => {
                if i + 1 < args.len() {
                    name = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" | "-c" => i += 2,
            other => {
                // First positional arg is the name.
                if name.is_none() && !other.starts_with('-') {
                    name = Some(other.to_string());
                }
                i += 1;
            }
        }
    }
    name
}

pub async fn run_token_command(args: &[String], config_path: Option<&Path>) -> Result<()> {
    let sub_cmd = args.get(2).map(String::as_str).unwrap_or("");

    match sub_cmd {
        "create" => {
            let Some(token_name) = parse_token_name(args, 3) else {
                println!("{}", style("Usage: prd-review token create <name>").bold());
                println!("  Example: prd-review token create dashboard");
                return Ok(());
            };
            let store = open_store(config_path).await?;
            let (token, _) = store.create_api_token(&token_name).await?;
            println!();
            print_success(&format!("API token '{}' created.", token_name));
            println!(
                "\n  {} {}\n",
                style("Token:").bold(),
                style(&token).green().bold()
            );
            println!(
                "  {} Save this token now. It will not be shown again.",
                style("⚠").yellow()
            );
            println!(
                "  {} Use it with: Authorization: Bearer {} or ?token={}\n",
                style("→").cyan(),
                token,
                token
            );
        }
        "list" | "ls" => {
            let store = open_store(config_path).await?;
            let tokens = store.list_api_tokens().await?;
            if tokens.is_empty() {
                println!(
                    "  {} No API tokens. The server admits loopback callers only.",
                    style("●").dim()
                );
            } else {
                println!("\n  {} API tokens:\n", style("●").cyan());
                for tk in &tokens {
                    let short_id = tk.id.get(..8).unwrap_or(&tk.id);
                    println!(
                        "  {} {} (id: {}…)  created: {}",
                        style("→").cyan(),
                        style(&tk.name).white().bold(),
                        style(short_id).dim(),
                        style(&tk.created_at).dim()
                    );
                }
                println!();
            }
        }
        _ => {
            println!("{}", style("Usage: prd-review token <command>").bold());
            println!("  • create <name>    Create a new API token");
            println!("  • list             List all API tokens");
        }
    }

    Ok(())
}

async fn open_store(config_path: Option<&Path>) -> Result<Store> {
    let settings = Settings::load(config_path)?;
    init_tracing(&settings.logging.level, true);
    Store::open(&settings.storage.database, settings.embeddings.dimensions).await
}
