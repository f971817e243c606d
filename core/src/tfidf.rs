use crate::types::{DocLength, Dictionary, PostingList, TermSet, TfidfCache, TfidfResult};
use std::cmp::Ordering;

/// Inverse document frequency of a term found in `df` of `num_docs` documents.
///
/// Smoothed: `1 + ln((1 + N) / (1 + df))`. Raw: `ln(N / df)`.
pub fn idf(df: usize, num_docs: usize, smoothed: bool) -> f32 {
    let n = num_docs as f32;
    let df = df.max(1) as f32;
    if smoothed {
        1.0 + ((1.0 + n) / (1.0 + df)).ln()
    } else {
        (n.max(df) / df).ln()
    }
}

/// Scores every document of one posting list and sorts them best first.
///
/// `tf` is the number of occurrences divided by the document length.
pub fn score_term(
    postings: &PostingList,
    doc_length: &DocLength,
    num_docs: usize,
    smoothed: bool,
) -> Vec<TfidfResult> {
    let idf = idf(postings.len(), num_docs, smoothed);
    let mut results: Vec<TfidfResult> = postings
        .iter()
        .map(|(doc_id, posting)| {
            let occurrences = posting.len() as f32;
            let length = doc_length.get(doc_id).copied().unwrap_or(0).max(1) as f32;
            TfidfResult {
                doc_id: doc_id.clone(),
                posting: posting.clone(),
                score: occurrences / length * idf,
            }
        })
        .collect();
    sort_results(&mut results);
    results
}

/// Descending by score, ascending by document id on ties.
pub(crate) fn sort_results(results: &mut [TfidfResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
}

/// Rebuilds `cache` against the current dictionary.
///
/// When the number of documents changed since the last build every idf is
/// stale, so all terms are recomputed. Otherwise only `terms_to_update` are,
/// and those that left the dictionary are evicted.
pub(crate) fn build_tfidf(
    cache: &mut TfidfCache,
    dictionary: &Dictionary,
    doc_length: &DocLength,
    terms_to_update: &TermSet,
    num_docs_at_last_build: usize,
    smoothed: bool,
) {
    let num_docs = doc_length.len();
    if num_docs != num_docs_at_last_build {
        cache.clear();
        for (term, postings) in dictionary {
            cache.insert(term.clone(), score_term(postings, doc_length, num_docs, smoothed));
        }
        return;
    }
    for term in terms_to_update {
        match dictionary.get(term) {
            Some(postings) => {
                cache.insert(term.clone(), score_term(postings, doc_length, num_docs, smoothed));
            }
            None => {
                cache.remove(term);
            }
        }
    }
}
