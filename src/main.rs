//! Tome - 检索增强的命令行对话助手
//!
//! 入口：解析命令行、加载配置、初始化日志，然后进入对话循环或导入文档。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;

use tome::agent::create_agent_components;
use tome::config::{load_config, AppConfig};
use tome::llm::{EmbeddingProvider, OpenAiEmbedder};
use tome::observability;
use tome::retrieval::{create_vector_store, Ingestor};
use tome::ui::Console;
use tome::Session;

#[derive(Parser)]
#[command(name = "tome", about = "Retrieval-augmented chat over your documents", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Extra TOML config file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show tool calls, sentiment labels and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,

    /// Chunk, embed and upsert text files into the vector store
    Ingest {
        /// Files or directories (.txt / .md)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    cfg.app.verbose |= cli.verbose;
    observability::init(cfg.app.verbose);

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat(&cfg).await,
        Commands::Ingest { paths } => ingest(&cfg, &paths).await,
    }
}

async fn chat(cfg: &AppConfig) -> anyhow::Result<()> {
    let components = create_agent_components(cfg).context("Failed to create agent")?;
    let mut session = Session::new(components, cfg);
    let mut console = Console::stdout(cfg.app.verbose);
    console.welcome(&cfg.app.exit_keyword, &session.tool_names())?;

    let stdin = BufReader::new(tokio::io::stdin());
    session
        .run(stdin, &mut console)
        .await
        .context("Session aborted")?;
    Ok(())
}

async fn ingest(cfg: &AppConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::from_config(cfg));
    let store = create_vector_store(cfg).context("Failed to open vector store")?;
    let ingestor = Ingestor::new(embedder, store, &cfg.vector_store.text_field);

    for path in paths {
        let report = ingestor
            .ingest_path(path)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        println!(
            "{}: {} file(s), {} chunk(s) indexed",
            path.display(),
            report.files,
            report.chunks
        );
        for skipped in &report.skipped {
            println!("  skipped {}", skipped.display());
        }
    }
    Ok(())
}
