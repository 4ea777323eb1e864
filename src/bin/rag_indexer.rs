use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use rag_pipeline::config::Settings;
use rag_pipeline::indexer::pipeline::IngestionPipeline;
use rag_pipeline::rag::{build_embedder, build_store};

#[derive(Parser, Debug)]
#[command(name = "rag-indexer")]
#[command(about = "Index documents into the RAG vector store")]
struct Args {
    /// Directory to recursively index
    #[arg(short, long)]
    dir: PathBuf,

    /// Settings file (defaults to ./rag.toml when present)
    #[arg(long, env = "RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Delete chunks of documents no longer present in the directory
    #[arg(long)]
    prune: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    rag_pipeline::init_tracing();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    if !args.dir.exists() {
        anyhow::bail!("Directory does not exist: {}", args.dir.display());
    }

    let embedder = build_embedder(&settings)?;
    let store = build_store(&settings).await?;
    let pipeline = IngestionPipeline::new(embedder, store, &settings.ingest)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let report = pipeline.ingest_dir(&args.dir, args.prune, Some(&pb)).await?;
    pb.finish_with_message("done");

    println!("\nIndexing complete!");
    println!("  Files indexed:   {}", report.files_indexed);
    println!("  Files empty:     {}", report.files_empty);
    println!("  Files failed:    {}", report.failed_files.len());
    println!("  Total chunks:    {}", report.total_chunks);
    if args.prune {
        println!("  Pruned chunks:   {}", report.pruned_chunks);
    }
    println!("  Store backend:   {:?}", settings.store.backend);

    if !report.failed_files.is_empty() {
        println!("\nFailed files:");
        for (path, err) in &report.failed_files {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}
