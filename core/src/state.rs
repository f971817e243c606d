//! Dictionary and document-length bookkeeping.
//!
//! Everything here is a plain function over the index's state variables. The
//! controller in [`crate::index`] is the only caller, and it guarantees a single
//! writer at a time.

use crate::types::{DocLength, Dictionary, Document, TermSet, Token};

/// What a batch of document mutations did to the state variables.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    /// Documents that existed and were removed because their new content is empty.
    pub deleted: u32,
    /// Whether the dictionary or the document lengths changed at all.
    pub changed: bool,
}

/// Appends every occurrence of `tokens` to the postings of `doc_id`.
///
/// Duplicate terms are merged into one posting. Tokens without positions are
/// skipped so that no empty posting is ever stored.
pub(crate) fn insert_tokens(
    dictionary: &mut Dictionary,
    doc_id: &str,
    tokens: &[Token],
    touched: &mut TermSet,
) {
    for token in tokens {
        if token.positions.is_empty() {
            continue;
        }
        dictionary
            .entry(token.content.clone())
            .or_default()
            .entry(doc_id.to_string())
            .or_default()
            .extend_from_slice(&token.positions);
        touched.insert(token.content.clone());
    }
}

/// Removes `doc_id` from every posting list and from `doc_length`, pruning
/// terms that no longer have any document. Returns whether the document existed.
pub(crate) fn remove_document(
    dictionary: &mut Dictionary,
    doc_length: &mut DocLength,
    doc_id: &str,
    touched: &mut TermSet,
) -> bool {
    if doc_length.remove(doc_id).is_none() {
        return false;
    }
    dictionary.retain(|term, postings| {
        if postings.remove(doc_id).is_some() {
            touched.insert(term.clone());
        }
        !postings.is_empty()
    });
    true
}

/// Applies `documents` in order with remove-then-insert semantics.
pub(crate) fn apply_documents(
    dictionary: &mut Dictionary,
    doc_length: &mut DocLength,
    documents: &[Document],
    touched: &mut TermSet,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for document in documents {
        let existed = remove_document(dictionary, doc_length, &document.id, touched);
        if document.has_content() {
            insert_tokens(dictionary, &document.id, &document.tokens, touched);
            doc_length.insert(document.id.clone(), document.occurrences());
            outcome.changed = true;
        } else if existed {
            outcome.deleted += 1;
            outcome.changed = true;
        }
    }
    outcome
}
