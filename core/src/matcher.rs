//! Typo-tolerant and prefix matching of query terms against the dictionary.
//!
//! Both thresholds are tolerances in `[0, 1]`: a dictionary term is accepted
//! when its prefix distance or its normalized edit distance to some query term
//! is at most the matching threshold. With both thresholds at zero only exact
//! matches survive.

use crate::types::{DocId, MatchResult, Term, TfidfResult, WeightedPosition};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

fn clamp_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() {
        0.0
    } else {
        threshold.clamp(0.0, 1.0)
    }
}

/// `1 - common_prefix / max_len`, measured in characters.
pub fn prefix_distance(query: &str, term: &str) -> f64 {
    let max_len = query.chars().count().max(term.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let common = query
        .chars()
        .zip(term.chars())
        .take_while(|(a, b)| a == b)
        .count();
    1.0 - common as f64 / max_len as f64
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Edit distance divided by the longer length, so always in `[0, 1]`.
pub fn block_distance(query: &str, term: &str) -> f64 {
    let max_len = query.chars().count().max(term.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    edit_distance(query, term) as f64 / max_len as f64
}

pub fn is_relevant_approximately(
    query: &str,
    term: &str,
    prefix_threshold: f64,
    block_threshold: f64,
) -> bool {
    if query == term {
        return true;
    }
    prefix_distance(query, term) <= clamp_threshold(prefix_threshold)
        || block_distance(query, term) <= clamp_threshold(block_threshold)
}

/// Dictionary terms accepted for at least one query term, each reported once.
pub fn matching_terms<'a, I>(
    dictionary_terms: I,
    query_terms: &HashSet<Term>,
    prefix_threshold: f64,
    block_threshold: f64,
) -> Vec<&'a Term>
where
    I: IntoIterator<Item = &'a Term>,
{
    dictionary_terms
        .into_iter()
        .filter(|term| {
            query_terms
                .iter()
                .any(|q| is_relevant_approximately(q, term, prefix_threshold, block_threshold))
        })
        .collect()
}

/// Sums the TF-IDF contributions of every matched term per document.
///
/// Each entry of `per_term` belongs to a distinct dictionary term, so a
/// document is credited once per matched term no matter how many query terms
/// hit it.
pub fn aggregate<'a, I>(per_term: I) -> Vec<MatchResult>
where
    I: IntoIterator<Item = &'a [TfidfResult]>,
{
    let mut scores: HashMap<&DocId, (f32, Vec<WeightedPosition>)> = HashMap::new();
    for results in per_term {
        for result in results {
            let entry = scores.entry(&result.doc_id).or_insert((0.0, Vec::new()));
            entry.0 += result.score;
            entry.1.extend_from_slice(&result.posting);
        }
    }
    let mut ranked: Vec<MatchResult> = scores
        .into_iter()
        .map(|(id, (score, positions))| MatchResult { id: id.clone(), score, positions })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("abc", "abd"), 1);
        assert_eq!(edit_distance("abc", "abcd"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn prefix_distance_is_relative_to_longer_term() {
        assert!((prefix_distance("appl", "apple") - 0.2).abs() < 1e-9);
        assert!((prefix_distance("apple", "appl") - 0.2).abs() < 1e-9);
        assert_eq!(prefix_distance("pie", "pie"), 0.0);
        assert_eq!(prefix_distance("xyz", "abc"), 1.0);
    }

    #[test]
    fn zero_thresholds_mean_exact_match() {
        assert!(is_relevant_approximately("apple", "apple", 0.0, 0.0));
        assert!(!is_relevant_approximately("appl", "apple", 0.0, 0.0));
        assert!(!is_relevant_approximately("aple", "apple", 0.0, 0.0));
        assert!(!is_relevant_approximately("appl", "apple", f64::NAN, -1.0));
    }

    #[test]
    fn either_threshold_accepts() {
        // typo in the middle: weak prefix, strong block similarity
        assert!(!is_relevant_approximately("aplpe", "apple", 0.5, 0.0));
        assert!(is_relevant_approximately("aplpe", "apple", 0.0, 0.5));
        // truncated word: prefix accepts
        assert!(is_relevant_approximately("appl", "apply", 0.25, 0.0));
    }

    #[test]
    fn matching_terms_reports_each_term_once() {
        let dictionary: Vec<Term> = vec!["apple".into(), "apply".into(), "sauce".into()];
        let query: HashSet<Term> = ["appl".to_string(), "apple".to_string()].into();
        let mut matched: Vec<&Term> = matching_terms(dictionary.iter(), &query, 0.3, 0.0);
        matched.sort();
        assert_eq!(matched, vec!["apple", "apply"]);
    }

    #[test]
    fn aggregate_sums_and_ranks() {
        let hit = |doc: &str, score: f32| TfidfResult {
            doc_id: doc.to_string(),
            posting: vec![WeightedPosition::new(0, 1.0)],
            score,
        };
        let first = vec![hit("b", 0.5), hit("a", 0.4)];
        let second = vec![hit("a", 0.3), hit("c", 0.1)];
        let ranked = aggregate([first.as_slice(), second.as_slice()]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ranked[0].positions.len(), 2);
    }
}
