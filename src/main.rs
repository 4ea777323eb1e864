use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use rag_pipeline::config::Settings;
use rag_pipeline::llm::ChatCompletionModel;
use rag_pipeline::{AnswerStatus, QueryOptions, RagEngine};

#[derive(Parser, Debug)]
#[command(name = "rag")]
#[command(about = "Ask questions against the indexed document store")]
struct Cli {
    /// Settings file (defaults to ./rag.toml when present)
    #[arg(long, global = true, env = "RAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve context and generate a grounded answer
    Ask {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Cosine distance cut-off in [0, 2]
        #[arg(long)]
        max_distance: Option<f32>,

        #[arg(long)]
        max_context_chars: Option<usize>,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the ranked chunks a question retrieves
    Retrieve {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        max_distance: Option<f32>,
    },
    /// Check that the language model endpoint answers
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    rag_pipeline::init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Ask {
            question,
            top_k,
            max_distance,
            max_context_chars,
            json,
        } => {
            let engine = RagEngine::from_settings(&settings).await?;
            let defaults = engine.defaults();
            let options = QueryOptions {
                top_k: top_k.unwrap_or(defaults.top_k),
                max_distance: max_distance.unwrap_or(defaults.max_distance),
                max_context_chars: max_context_chars.unwrap_or(defaults.max_context_chars),
            };

            let answer = engine.ask_with(&question, &options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.text());
                if !answer.sources().is_empty() {
                    println!("\nSources:");
                    for id in answer.sources() {
                        println!("  {}", id);
                    }
                }
                if let Some(error) = answer.error() {
                    eprintln!("\nLanguage model error: {}", error);
                }
            }

            if answer.status() == AnswerStatus::LlmError {
                std::process::exit(2);
            }
        }
        Command::Retrieve {
            question,
            top_k,
            max_distance,
        } => {
            let engine = RagEngine::from_settings(&settings).await?;
            let defaults = engine.defaults();
            let context = engine
                .retrieve(
                    &question,
                    top_k.unwrap_or(defaults.top_k),
                    max_distance.unwrap_or(defaults.max_distance),
                )
                .await?;

            if context.is_empty() {
                println!("No chunk within the distance cut-off.");
            }
            for (rank, scored) in context.iter().enumerate() {
                let preview: String = scored.chunk.text.chars().take(120).collect();
                println!(
                    "{}. {} [{:.4}] {}#{}\n   {}",
                    rank + 1,
                    scored.chunk.id,
                    scored.distance,
                    scored.chunk.metadata.document,
                    scored.chunk.metadata.chunk_index,
                    preview
                );
            }
        }
        Command::Health => {
            let model = ChatCompletionModel::new(&settings.llm);
            let healthy = model.health_check().await.unwrap_or_else(|e| {
                tracing::error!("Health check failed: {}", e);
                false
            });

            println!(
                "{}",
                serde_json::json!({
                    "status": if healthy { "ok" } else { "unavailable" },
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "services": { "llm": healthy, "model": settings.llm.model }
                })
            );
            if !healthy {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
