use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type DocId = String;
pub type Term = String;

/// One occurrence of a term inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedPosition {
    pub position: u32,
    /// Importance of the occurrence, e.g. a title hit weighs more than a body hit.
    pub weight: f32,
}

impl WeightedPosition {
    pub fn new(position: u32, weight: f32) -> Self {
        Self { position, weight }
    }
}

/// A term together with every place it occurs in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub content: Term,
    pub positions: Vec<WeightedPosition>,
}

impl Token {
    pub fn new(content: impl Into<Term>, positions: Vec<WeightedPosition>) -> Self {
        Self { content: content.into(), positions }
    }
}

/// A caller-owned document. A document without any occurrence signals deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl Document {
    pub fn new(id: impl Into<DocId>, tokens: Vec<Token>) -> Self {
        Self { id: id.into(), tokens }
    }

    /// Document with no tokens; feeding it to the index removes `id`.
    pub fn empty(id: impl Into<DocId>) -> Self {
        Self { id: id.into(), tokens: Vec::new() }
    }

    pub fn has_content(&self) -> bool {
        self.tokens.iter().any(|t| !t.positions.is_empty())
    }

    /// Number of occurrences, i.e. the value stored in [`DocLength`].
    pub fn occurrences(&self) -> u32 {
        self.tokens.iter().map(|t| t.positions.len() as u32).sum()
    }
}

/// Weighted positions of one term in one document, in insertion order.
pub type Posting = Vec<WeightedPosition>;

/// Document id -> posting, for one term.
pub type PostingList = HashMap<DocId, Posting>;

/// Term -> posting list. The inverted index proper.
pub type Dictionary = HashMap<Term, PostingList>;

/// Document id -> number of occurrences in the document.
pub type DocLength = HashMap<DocId, u32>;

pub type TermSet = HashSet<Term>;

/// Relevance of one document for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfResult {
    pub doc_id: DocId,
    pub posting: Posting,
    pub score: f32,
}

/// Term -> results sorted by descending score.
pub type TfidfCache = HashMap<Term, Vec<TfidfResult>>;

/// A document returned by approximate matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: DocId,
    pub score: f32,
    pub positions: Vec<WeightedPosition>,
}
