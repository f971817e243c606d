use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam::channel::bounded;
use local_search_core::tokenizer::{query_terms, tokenize, tokenize_fields};
use local_search_core::{
    Document, IndexConfig, InvertedIndex, MatchResult, PostingList, TfidfResult,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Index JSON/JSONL documents in memory and query them", long_about = None)]
struct Cli {
    /// Input path (file or directory)
    #[arg(long)]
    input: String,
    /// Optional JSON file with index settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Weight given to title occurrences
    #[arg(long, default_value_t = 2.0)]
    title_weight: f32,
    /// Seconds to wait for the index to build
    #[arg(long, default_value_t = 60)]
    build_timeout_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank documents that approximately match the query terms
    Search {
        /// Free-text query
        #[arg(long)]
        q: String,
        /// Maximum tolerated prefix distance, 0 = exact
        #[arg(long, default_value_t = 0.4)]
        prefix_threshold: f64,
        /// Maximum tolerated normalized edit distance, 0 = exact
        #[arg(long, default_value_t = 0.25)]
        block_threshold: f64,
        /// Number of results to print
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
    /// Show postings and TF-IDF scores of one term
    Lookup {
        /// Word to look up; it goes through the same tokenizer as the documents
        #[arg(long)]
        term: String,
    },
}

#[derive(Serialize)]
struct SearchResponse<'a> {
    query: &'a str,
    took_s: f64,
    total_hits: usize,
    results: &'a [MatchResult],
}

#[derive(Serialize)]
struct LookupResponse<'a> {
    term: &'a str,
    postings: PostingList,
    tfidf: Vec<TfidfResult>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => IndexConfig::from_json_file(path)?,
        None => IndexConfig::default(),
    };
    let documents = load_documents(Path::new(&cli.input), cli.title_weight)?;
    let index = InvertedIndex::with_config(config)?;
    build_index(&index, documents, Duration::from_secs(cli.build_timeout_secs))?;

    match cli.command {
        Commands::Search { q, prefix_threshold, block_threshold, k } => {
            let start = Instant::now();
            let terms = query_terms(&q);
            let results = index.find_matching_documents_approximately(
                &terms,
                prefix_threshold,
                block_threshold,
            );
            let top = &results[..results.len().min(k.max(1))];
            let response = SearchResponse {
                query: &q,
                took_s: start.elapsed().as_secs_f64(),
                total_hits: results.len(),
                results: top,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Lookup { term } => {
            let normalized = lookup_term(&term)?;
            let response = LookupResponse {
                postings: index.find_term(&normalized),
                tfidf: index.get_tfidf(&normalized),
                term: &normalized,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }
    Ok(())
}

/// Normalizes a lookup word the way document text is tokenized.
fn lookup_term(text: &str) -> Result<String> {
    let mut terms: Vec<String> = tokenize(text).into_iter().map(|(term, _)| term).collect();
    terms.dedup();
    match terms.as_slice() {
        [] => Ok(text.trim().to_lowercase()),
        [term] => Ok(term.clone()),
        _ => anyhow::bail!("lookup takes a single word, got {text:?}"),
    }
}

fn build_index(index: &InvertedIndex, documents: Vec<Document>, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let (tx, rx) = bounded(1);
    index.add_documents_with(documents, move || {
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout).context("index build did not finish in time")?;
    tracing::info!(
        num_docs = index.number_documents(),
        took_ms = start.elapsed().as_millis() as u64,
        "index built"
    );
    Ok(())
}

/// Reads every `.json`/`.jsonl` file under `input` into index documents.
fn load_documents(input: &Path, title_weight: f32) -> Result<Vec<Document>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        anyhow::bail!("input {} does not exist", input.display());
    }

    let mut docs = Vec::new();
    for file in files {
        let before = docs.len();
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut docs)?;
        } else {
            read_json(&file, &mut docs)?;
        }
        tracing::debug!(file = %file.display(), docs = docs.len() - before, "read input file");
    }
    tracing::info!(num_docs = docs.len(), "ingested documents");
    Ok(docs.into_iter().map(|doc| to_document(doc, title_weight)).collect())
}

fn read_jsonl(file: &Path, docs: &mut Vec<InputDoc>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), lineno + 1))?;
        docs.push(doc);
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<InputDoc>) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)
        .with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                docs.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => {
            docs.push(serde_json::from_value(json)?);
        }
        _ => {}
    }
    Ok(())
}

fn to_document(doc: InputDoc, title_weight: f32) -> Document {
    let tokens = tokenize_fields(&[(&doc.title, title_weight), (&doc.body, 1.0)]);
    Document::new(doc.id, tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_json_and_jsonl_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl = concat!(
            r#"{"id":"1","title":"Apple pie","body":"sweet apple"}"#,
            "\n\n",
            r#"{"id":"2","body":"apply sauce"}"#,
            "\n",
        );
        fs::write(dir.path().join("a.jsonl"), jsonl).unwrap();
        fs::write(dir.path().join("b.json"), r#"[{"id":"3","title":"Rust"}]"#).unwrap();
        fs::write(dir.path().join("ignored.txt"), "not json").unwrap();

        let docs = load_documents(dir.path(), 2.0).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        let apple = docs[0].tokens.iter().find(|t| t.content == "appl").unwrap();
        assert_eq!(apple.positions.len(), 2);
        assert_eq!(apple.positions[0].weight, 2.0);
    }

    #[test]
    fn lookup_normalizes_a_single_word() {
        assert_eq!(lookup_term("Apples").unwrap(), "appl");
        assert_eq!(lookup_term("the").unwrap(), "the");
        assert!(lookup_term("apple sauce").is_err());
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_documents(&dir.path().join("missing"), 1.0).is_err());
    }

    #[test]
    fn empty_documents_still_build() {
        let index = InvertedIndex::new().unwrap();
        build_index(&index, Vec::new(), Duration::from_secs(5)).unwrap();
        assert_eq!(index.number_documents(), 0);
    }
}
