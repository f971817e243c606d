use criterion::{criterion_group, criterion_main, Criterion};
use crossbeam::channel::bounded;
use local_search_core::tokenizer::{query_terms, tokenize_fields};
use local_search_core::{Document, InvertedIndex};

const WORDS: &[&str] = &[
    "search", "index", "token", "posting", "ranking", "document", "rust", "memory", "cache",
    "query", "prefix", "distance", "worker", "thread", "score", "length", "term", "match",
    "apple", "sauce",
];

fn corpus(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            let title = format!("{} {}", WORDS[i % WORDS.len()], WORDS[(i * 7) % WORDS.len()]);
            let body: Vec<&str> = (0..40).map(|j| WORDS[(i * 3 + j * 11) % WORDS.len()]).collect();
            let tokens = tokenize_fields(&[(&title, 2.0), (&body.join(" "), 1.0)]);
            Document::new(format!("doc{i}"), tokens)
        })
        .collect()
}

fn build(index: &InvertedIndex, docs: Vec<Document>) {
    let (tx, rx) = bounded(1);
    index.add_documents_with(docs, move || {
        let _ = tx.send(());
    });
    let _ = rx.recv();
}

fn bench_build(c: &mut Criterion) {
    let docs = corpus(1_000);
    c.bench_function("add_and_build_1k", |b| {
        b.iter(|| {
            let index = InvertedIndex::new().expect("index");
            build(&index, docs.clone());
        })
    });
}

fn bench_approximate(c: &mut Criterion) {
    let index = InvertedIndex::new().expect("index");
    build(&index, corpus(1_000));
    let terms = query_terms("serch rankng");
    c.bench_function("approximate_match_1k", |b| {
        b.iter(|| index.find_matching_documents_approximately(&terms, 0.3, 0.3))
    });
}

criterion_group!(benches, bench_build, bench_approximate);
criterion_main!(benches);
