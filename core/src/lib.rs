//! In-memory inverted index with incremental updates, a lazily rebuilt TF-IDF
//! cache and typo-tolerant multi-term matching.

pub mod config;
pub mod index;
pub mod matcher;
mod state;
pub mod tfidf;
pub mod tokenizer;
pub mod types;

pub use config::IndexConfig;
pub use index::{ControllerState, InvertedIndex};
pub use types::*;
