pub mod chunker;
pub mod cleaner;
pub mod extractor;
pub mod pipeline;
pub mod walker;
