pub mod config;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod rag;

#[cfg(test)]
mod testing;

pub use error::{RagError, Result};
pub use models::{Answer, AnswerStatus, RetrievalResult};
pub use rag::{QueryOptions, RagEngine};

/// Installs the stderr log subscriber used by the binaries (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
