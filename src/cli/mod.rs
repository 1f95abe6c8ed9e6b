mod analyze;
mod documents;
mod evaluate;
mod serve;
mod tokens;

use std::path::PathBuf;

use anyhow::Result;
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Review")
        .command("analyze", "Review a PRD file and print the report")
        .command("serve", "Start the streaming analysis API")
        .command("evaluate", "Compare plain and compressed retrieval over a query file")
        .print();

    GuideSection::new("Data")
        .command("document add", "Store a PRD and print its id")
        .command("document list", "List stored documents")
        .command("corpus add", "Embed a research or analytics note into the corpus")
        .command("token create", "Create an API token for the server")
        .command("token list", "List API tokens")
        .print();

    GuideSection::new("Options")
        .text("--config <path>   Settings file (default: $PRD_REVIEW_CONFIG or ./prd-review.toml)")
        .print();

    println!(
        "\n {} {} <command> [subcommand]\n",
        style("Usage:").bold(),
        style("prd-review").green()
    );
}

fn flag_value(args: &[String], i: usize) -> Option<String> {
    args.get(i + 1).cloned()
}

pub(crate) fn parse_config_flag(args: &[String], start: usize) -> Option<PathBuf> {
    let mut config = None;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if let Some(v) = flag_value(args, i) {
                    config = Some(PathBuf::from(v));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    config
}

pub(crate) fn parse_serve_flags(
    args: &[String],
    start: usize,
    mut host: String,
    mut port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if let Some(v) = flag_value(args, i) {
                    port = v.parse().unwrap_or(port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--host" => {
                if let Some(v) = flag_value(args, i) {
                    host = v;
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (host, port)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AnalyzeArgs {
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    pub strategy: Option<String>,
    pub out: Option<PathBuf>,
    pub no_web: bool,
    pub verbose: bool,
}

pub(crate) fn parse_analyze_args(args: &[String], start: usize) -> AnalyzeArgs {
    let mut parsed = AnalyzeArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--file" | "-f" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.file = Some(PathBuf::from(v));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--title" | "-t" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.title = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--strategy" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.strategy = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--out" | "-o" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.out = Some(PathBuf::from(v));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--no-web" => {
                parsed.no_web = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            "--config" | "-c" => i += 2,
            other => {
                // A bare path is accepted in place of --file.
                if parsed.file.is_none() && !other.starts_with('-') {
                    parsed.file = Some(PathBuf::from(other));
                }
                i += 1;
            }
        }
    }
    parsed
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EvaluateArgs {
    pub queries: Option<PathBuf>,
    pub limit: Option<usize>,
    /// Comma-separated categories; the configured filter when absent.
    pub categories: Option<String>,
}

pub(crate) fn parse_evaluate_args(args: &[String], start: usize) -> EvaluateArgs {
    let mut parsed = EvaluateArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--queries" | "-q" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.queries = Some(PathBuf::from(v));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--limit" | "-k" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.limit = v.parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--category" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.categories = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--config" | "-c" => i += 2,
            other => {
                if parsed.queries.is_none() && !other.starts_with('-') {
                    parsed.queries = Some(PathBuf::from(other));
                }
                i += 1;
            }
        }
    }
    parsed
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContentArgs {
    pub title: Option<String>,
    pub file: Option<PathBuf>,
    pub category: Option<String>,
}

/// Flags shared by `document add` and `corpus add`.
pub(crate) fn parse_content_args(args: &[String], start: usize) -> ContentArgs {
    let mut parsed = ContentArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--title" | "-t" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.title = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.file = Some(PathBuf::from(v));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--category" => {
                if let Some(v) = flag_value(args, i) {
                    parsed.category = Some(v);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = parse_config_flag(&args, 2);

    let Some(cmd) = args.get(1).map(String::as_str) else {
        print_help();
        return Ok(());
    };
    let sub_cmd = args.get(2).map(String::as_str).unwrap_or("");

    match cmd {
        "serve" => serve::run_serve(&args, config_path.as_deref()).await,
        "analyze" => {
            let parsed = parse_analyze_args(&args, 2);
            if parsed.file.is_none() {
                print_error("Error: --file is required for analyze.");
                print_help();
                return Ok(());
            }
            analyze::run_analyze(parsed, config_path.as_deref()).await
        }
        "evaluate" | "eval" => {
            let parsed = parse_evaluate_args(&args, 2);
            if parsed.queries.is_none() {
                print_error("Error: --queries <file> is required for evaluate.");
                GuideSection::new("prd-review evaluate")
                    .text("--queries <file>        One retrieval query per line")
                    .text("--limit <n>             Results per strategy (default: retrieval.top_k)")
                    .text("--category <a,b>        Category filter (default: retrieval.categories)")
                    .print();
                println!();
                return Ok(());
            }
            evaluate::run_evaluate(parsed, config_path.as_deref()).await
        }
        "document" | "documents" => match sub_cmd {
            "add" => {
                documents::run_document_add(parse_content_args(&args, 3), config_path.as_deref())
                    .await
            }
            "list" | "ls" => documents::run_document_list(config_path.as_deref()).await,
            _ => {
                GuideSection::new("prd-review document")
                    .command("add", "Store a PRD: --title <title> --file <path>")
                    .command("list", "List stored documents")
                    .print();
                println!();
                Ok(())
            }
        },
        "corpus" => match sub_cmd {
            "add" => {
                documents::run_corpus_add(parse_content_args(&args, 3), config_path.as_deref())
                    .await
            }
            _ => {
                GuideSection::new("prd-review corpus")
                    .command(
                        "add",
                        "--category research|analytics|prd --title <title> --file <path>",
                    )
                    .print();
                println!();
                Ok(())
            }
        },
        "token" | "tokens" => tokens::run_token_command(&args, config_path.as_deref()).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Ok(())
        }
    }
}
