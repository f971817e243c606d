use crate::types::{Term, TermSet, Token, WeightedPosition};
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Tokenize text into (term, position) using NFKD normalization with diacritics dropped, lowercase,
/// stopword removal, and stemming.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    tokenize_counted(text).0
}

/// Same as [`tokenize`], also returning the number of words seen, stopwords included.
fn tokenize_counted(text: &str) -> (Vec<(String, usize)>, usize) {
    let normalized =
        text.nfkd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase();
    let mut tokens = Vec::new();
    let mut words = 0;
    for (pos, mat) in RE.find_iter(&normalized).enumerate() {
        words = pos + 1;
        let token = mat.as_str();
        if is_stopword(token) {
            continue;
        }
        let stem = STEMMER.stem(token).to_string();
        tokens.push((stem, pos));
    }
    (tokens, words)
}

/// Tokenize several weighted fields of one document into index tokens.
///
/// Positions keep counting across fields, so the second field starts after
/// the last word of the first. Every term appears in exactly one token, in
/// order of first occurrence.
pub fn tokenize_fields(fields: &[(&str, f32)]) -> Vec<Token> {
    let mut order: Vec<Term> = Vec::new();
    let mut positions: HashMap<Term, Vec<WeightedPosition>> = HashMap::new();
    let mut offset = 0u32;
    for (text, weight) in fields {
        let (tokens, words) = tokenize_counted(text);
        for (term, pos) in tokens {
            let slot = positions.entry(term.clone()).or_insert_with(|| {
                order.push(term);
                Vec::new()
            });
            slot.push(WeightedPosition::new(offset + pos as u32, *weight));
        }
        offset += words as u32;
    }
    order
        .into_iter()
        .map(|term| {
            let hits = positions.remove(&term).unwrap_or_default();
            Token::new(term, hits)
        })
        .collect()
}

/// Distinct terms of a free-text query.
pub fn query_terms(text: &str) -> TermSet {
    tokenize(text).into_iter().map(|(term, _)| term).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn fields_share_a_position_counter() {
        let tokens = tokenize_fields(&[("Rust search", 2.0), ("search engine in rust", 1.0)]);
        let rust = tokens.iter().find(|t| t.content == "rust").unwrap();
        assert_eq!(rust.positions.len(), 2);
        assert_eq!(rust.positions[0], WeightedPosition::new(0, 2.0));
        assert_eq!(rust.positions[1], WeightedPosition::new(5, 1.0));
    }
}
