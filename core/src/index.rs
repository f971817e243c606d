//! The inverted index and the controller that serializes work onto its worker.
//!
//! Reads go against the last published [`Snapshot`] and never wait for the
//! worker. Mutations, TF-IDF builds and clears are queued on the controller,
//! which hands at most one job at a time to a dedicated background thread.
//! Pending clears run first, then pending document updates, then builds.

use crate::config::IndexConfig;
use crate::matcher;
use crate::state;
use crate::tfidf;
use crate::types::{
    DocId, DocLength, Dictionary, Document, MatchResult, PostingList, Term, TermSet, TfidfCache,
    TfidfResult,
};
use anyhow::{Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, ReentrantMutex, RwLock};
use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub type DoneCallback = Box<dyn FnOnce() + Send + 'static>;
pub type CountCallback = Box<dyn FnOnce(u32) + Send + 'static>;

/// Which job, if any, the worker is running.
///
/// A job keeps its state until the callbacks it owes have returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    UpdateInProgress,
    BuildInProgress,
    ClearInProgress,
}

/// Published, immutable view of the index.
#[derive(Clone)]
struct Snapshot {
    dictionary: Arc<Dictionary>,
    doc_length: Arc<DocLength>,
    tfidf_cache: Arc<TfidfCache>,
    /// True only while the cache agrees with `dictionary` and `doc_length`.
    is_built: bool,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            dictionary: Arc::default(),
            doc_length: Arc::default(),
            tfidf_cache: Arc::default(),
            is_built: true,
        }
    }
}

enum UpdateReply {
    None,
    Done(DoneCallback),
    Count(CountCallback),
}

impl UpdateReply {
    /// Turns the reply into a plain callback once the deleted count is known.
    fn into_done(self, deleted: u32) -> Option<DoneCallback> {
        match self {
            UpdateReply::None => None,
            UpdateReply::Done(cb) => Some(cb),
            UpdateReply::Count(cb) => Some(Box::new(move || cb(deleted))),
        }
    }
}

struct UpdateRequest {
    documents: Vec<Document>,
    reply: UpdateReply,
}

enum Work {
    Update { base: Snapshot, batches: Vec<Vec<Document>> },
    Build { base: Snapshot, terms_to_update: TermSet, num_docs_at_last_build: usize },
    Clear,
}

impl Work {
    fn label(&self) -> &'static str {
        match self {
            Work::Update { .. } => "update",
            Work::Build { .. } => "build",
            Work::Clear => "clear",
        }
    }

    fn run(self, smoothed_idf: bool) -> Outcome {
        match self {
            Work::Update { base, batches } => {
                let Snapshot { mut dictionary, mut doc_length, .. } = base;
                let dict = Arc::make_mut(&mut dictionary);
                let lengths = Arc::make_mut(&mut doc_length);
                let mut touched = TermSet::new();
                let mut deleted = Vec::with_capacity(batches.len());
                let mut changed = false;
                for batch in &batches {
                    let outcome = state::apply_documents(dict, lengths, batch, &mut touched);
                    deleted.push(outcome.deleted);
                    changed |= outcome.changed;
                }
                Outcome::Updated { dictionary, doc_length, touched, deleted, changed }
            }
            Work::Build { base, terms_to_update, num_docs_at_last_build } => {
                let Snapshot { dictionary, doc_length, mut tfidf_cache, .. } = base;
                tfidf::build_tfidf(
                    Arc::make_mut(&mut tfidf_cache),
                    &dictionary,
                    &doc_length,
                    &terms_to_update,
                    num_docs_at_last_build,
                    smoothed_idf,
                );
                Outcome::Built { tfidf_cache, num_docs: doc_length.len() }
            }
            Work::Clear => Outcome::Cleared,
        }
    }
}

enum Outcome {
    Updated {
        dictionary: Arc<Dictionary>,
        doc_length: Arc<DocLength>,
        touched: TermSet,
        /// Deleted count per batch, in batch order.
        deleted: Vec<u32>,
        changed: bool,
    },
    Built { tfidf_cache: Arc<TfidfCache>, num_docs: usize },
    Cleared,
}

struct Job {
    generation: u64,
    work: Work,
}

struct Controller {
    state: ControllerState,
    jobs: Option<Sender<Job>>,
    pending_updates: VecDeque<UpdateRequest>,
    build_requested: bool,
    build_waiters: Vec<DoneCallback>,
    clear_requested: bool,
    clear_waiters: Vec<DoneCallback>,
    /// Callbacks owned by the job currently on the worker.
    active_replies: Vec<UpdateReply>,
    active_waiters: Vec<DoneCallback>,
    terms_to_update: TermSet,
    num_docs_at_last_build: usize,
    /// Set while accepted updates have not been published yet.
    unpublished_updates: bool,
}

impl Controller {
    fn is_quiet(&self) -> bool {
        self.state == ControllerState::Idle
            && self.pending_updates.is_empty()
            && !self.build_requested
            && !self.clear_requested
    }

    /// Discards every update and build accepted so far; their callbacks now
    /// wait for the clear.
    fn supersede_pending(&mut self) {
        for request in self.pending_updates.drain(..) {
            if let Some(cb) = request.reply.into_done(0) {
                self.clear_waiters.push(cb);
            }
        }
        self.build_requested = false;
        self.clear_waiters.append(&mut self.build_waiters);
    }
}

struct Shared {
    config: IndexConfig,
    generation: AtomicU64,
    snapshot: RwLock<Snapshot>,
    controller: Mutex<Controller>,
    idle: Condvar,
    /// Held while callbacks run; `Drop` takes it so none runs past destruction.
    delivery: ReentrantMutex<()>,
}

impl Shared {
    fn snapshot(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn submit_update(&self, request: UpdateRequest) {
        self.submit(|ctl| {
            ctl.unpublished_updates = true;
            ctl.pending_updates.push_back(request);
        });
    }

    fn submit(&self, request: impl FnOnce(&mut Controller)) {
        let mut ctl = self.controller.lock();
        request(&mut ctl);
        self.dispatch(&mut ctl);
    }

    /// Starts the next job if the worker is free. The worker stays busy until
    /// the callbacks of its previous job have returned.
    fn dispatch(&self, ctl: &mut Controller) {
        if ctl.state != ControllerState::Idle {
            return;
        }
        let (state, work) = if ctl.clear_requested {
            ctl.clear_requested = false;
            ctl.active_waiters = mem::take(&mut ctl.clear_waiters);
            tracing::debug!(job = "clear", "dispatching job");
            (ControllerState::ClearInProgress, Work::Clear)
        } else if !ctl.pending_updates.is_empty() {
            let mut batches = Vec::with_capacity(ctl.pending_updates.len());
            for request in ctl.pending_updates.drain(..) {
                batches.push(request.documents);
                ctl.active_replies.push(request.reply);
            }
            let documents: usize = batches.iter().map(Vec::len).sum();
            tracing::debug!(job = "update", batches = batches.len(), documents, "dispatching job");
            (ControllerState::UpdateInProgress, Work::Update { base: self.snapshot(), batches })
        } else if ctl.build_requested {
            ctl.build_requested = false;
            ctl.active_waiters = mem::take(&mut ctl.build_waiters);
            let terms_to_update = mem::take(&mut ctl.terms_to_update);
            tracing::debug!(job = "build", terms = terms_to_update.len(), "dispatching job");
            let work = Work::Build {
                base: self.snapshot(),
                terms_to_update,
                num_docs_at_last_build: ctl.num_docs_at_last_build,
            };
            (ControllerState::BuildInProgress, work)
        } else {
            return;
        };

        let Some(jobs) = ctl.jobs.as_ref() else {
            return;
        };
        let job = Job { generation: self.generation.load(Ordering::SeqCst), work };
        if jobs.send(job).is_err() {
            tracing::warn!("inverted index worker is gone; dropping job");
            return;
        }
        ctl.state = state;
    }

    /// Publishes a finished job and returns the callbacks it owes.
    fn complete(&self, generation: u64, outcome: Outcome) -> Vec<DoneCallback> {
        let mut ctl = self.controller.lock();
        if !self.is_current(generation) {
            return Vec::new();
        }
        let mut callbacks = Vec::new();
        match outcome {
            Outcome::Updated { dictionary, doc_length, touched, deleted, changed } => {
                {
                    let mut snapshot = self.snapshot.write();
                    snapshot.dictionary = dictionary;
                    snapshot.doc_length = doc_length;
                    if changed {
                        snapshot.is_built = false;
                    }
                }
                ctl.terms_to_update.extend(touched);
                ctl.unpublished_updates = !ctl.pending_updates.is_empty();
                let replies = mem::take(&mut ctl.active_replies);
                for (reply, deleted) in replies.into_iter().zip(deleted) {
                    let Some(cb) = reply.into_done(deleted) else { continue };
                    if ctl.clear_requested {
                        ctl.clear_waiters.push(cb);
                    } else {
                        ctl.build_requested = true;
                        ctl.build_waiters.push(cb);
                    }
                }
            }
            Outcome::Built { tfidf_cache, num_docs } => {
                {
                    let mut snapshot = self.snapshot.write();
                    snapshot.tfidf_cache = tfidf_cache;
                    snapshot.is_built = true;
                }
                ctl.num_docs_at_last_build = num_docs;
                callbacks = mem::take(&mut ctl.active_waiters);
            }
            Outcome::Cleared => {
                *self.snapshot.write() = Snapshot::empty();
                ctl.terms_to_update.clear();
                ctl.num_docs_at_last_build = 0;
                ctl.unpublished_updates = !ctl.pending_updates.is_empty();
                callbacks = mem::take(&mut ctl.active_waiters);
            }
        }
        if callbacks.is_empty() {
            ctl.state = ControllerState::Idle;
            self.dispatch(&mut ctl);
            if ctl.is_quiet() {
                self.idle.notify_all();
            }
        }
        callbacks
    }

    fn finish_delivery(&self) {
        let mut ctl = self.controller.lock();
        ctl.state = ControllerState::Idle;
        self.dispatch(&mut ctl);
        if ctl.is_quiet() {
            self.idle.notify_all();
        }
    }
}

fn worker_loop(shared: Arc<Shared>, jobs: Receiver<Job>) {
    for job in jobs.iter() {
        if !shared.is_current(job.generation) {
            break;
        }
        let label = job.work.label();
        let started = Instant::now();
        let outcome = job.work.run(shared.config.smoothed_idf);
        let elapsed_us = started.elapsed().as_micros() as u64;
        tracing::debug!(job = label, elapsed_us, "job finished");
        let callbacks = shared.complete(job.generation, outcome);
        if callbacks.is_empty() {
            continue;
        }
        {
            let _delivery = shared.delivery.lock();
            for callback in callbacks {
                if !shared.is_current(job.generation) {
                    break;
                }
                callback();
            }
        }
        shared.finish_delivery();
    }
    tracing::debug!("inverted index worker exiting");
}

/// In-memory inverted index with TF-IDF scoring and approximate matching.
///
/// Mutating calls return immediately; their effect becomes visible to reads
/// once the worker publishes it. The `*_with` variants also rebuild the TF-IDF
/// cache and invoke the callback on the worker thread afterwards.
pub struct InvertedIndex {
    shared: Arc<Shared>,
}

impl InvertedIndex {
    pub fn new() -> Result<Self> {
        Self::with_config(IndexConfig::default())
    }

    pub fn with_config(config: IndexConfig) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let controller = Controller {
            state: ControllerState::Idle,
            jobs: Some(sender),
            pending_updates: VecDeque::new(),
            build_requested: false,
            build_waiters: Vec::new(),
            clear_requested: false,
            clear_waiters: Vec::new(),
            active_replies: Vec::new(),
            active_waiters: Vec::new(),
            terms_to_update: TermSet::new(),
            num_docs_at_last_build: 0,
            unpublished_updates: false,
        };
        let name = config.worker_thread_name.clone();
        let shared = Arc::new(Shared {
            config,
            generation: AtomicU64::new(0),
            snapshot: RwLock::new(Snapshot::empty()),
            controller: Mutex::new(controller),
            idle: Condvar::new(),
            delivery: ReentrantMutex::new(()),
        });
        let worker_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(worker_shared, receiver))
            .with_context(|| format!("spawning worker thread {name}"))?;
        Ok(Self { shared })
    }

    /// Documents and positions of `term`; empty when the term is unknown.
    pub fn find_term(&self, term: &str) -> PostingList {
        self.shared.snapshot().dictionary.get(term).cloned().unwrap_or_default()
    }

    /// Documents matching one or more of `terms` approximately, best first.
    ///
    /// A document's score is the sum of the TF-IDF scores of every dictionary
    /// term that matched. When the cache is stale the scores of matched terms
    /// are computed from the current dictionary instead.
    pub fn find_matching_documents_approximately(
        &self,
        terms: &HashSet<Term>,
        prefix_threshold: f64,
        block_threshold: f64,
    ) -> Vec<MatchResult> {
        if terms.is_empty() {
            return Vec::new();
        }
        let snap = self.shared.snapshot();
        let num_docs = snap.doc_length.len();
        let smoothed_idf = self.shared.config.smoothed_idf;
        let matched = matcher::matching_terms(
            snap.dictionary.keys(),
            terms,
            prefix_threshold,
            block_threshold,
        );
        let lists: Vec<Cow<'_, [TfidfResult]>> = matched
            .into_iter()
            .filter_map(|term| match snap.tfidf_cache.get(term) {
                Some(cached) if snap.is_built => Some(Cow::Borrowed(cached.as_slice())),
                _ => {
                    let postings = snap.dictionary.get(term)?;
                    let scored =
                        tfidf::score_term(postings, &snap.doc_length, num_docs, smoothed_idf);
                    Some(Cow::Owned(scored))
                }
            })
            .collect();
        matcher::aggregate(lists.iter().map(|list| &**list))
    }

    /// Adds or replaces documents without touching the TF-IDF cache.
    pub fn add_documents(&self, documents: Vec<Document>) {
        if documents.is_empty() {
            return;
        }
        self.shared.submit_update(UpdateRequest { documents, reply: UpdateReply::None });
    }

    /// Adds or replaces documents, rebuilds the cache, then calls `callback`.
    pub fn add_documents_with<F>(&self, documents: Vec<Document>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if documents.is_empty() {
            callback();
            return;
        }
        let reply = UpdateReply::Done(Box::new(callback));
        self.shared.submit_update(UpdateRequest { documents, reply });
    }

    /// Removes documents without touching the TF-IDF cache.
    ///
    /// Returns the number of ids requested, not the number found: the removal
    /// itself happens later on the worker.
    pub fn remove_documents<I>(&self, ids: I) -> u32
    where
        I: IntoIterator,
        I::Item: Into<DocId>,
    {
        let documents: Vec<Document> = ids.into_iter().map(Document::empty).collect();
        let requested = documents.len() as u32;
        if requested > 0 {
            self.shared.submit_update(UpdateRequest { documents, reply: UpdateReply::None });
        }
        requested
    }

    /// Removes documents, rebuilds the cache, then reports how many existed.
    pub fn remove_documents_with<I, F>(&self, ids: I, callback: F)
    where
        I: IntoIterator,
        I::Item: Into<DocId>,
        F: FnOnce(u32) + Send + 'static,
    {
        let documents: Vec<Document> = ids.into_iter().map(Document::empty).collect();
        self.update_documents(documents, callback);
    }

    /// Adds, replaces or (for documents without content) removes documents,
    /// rebuilds the cache, then reports how many documents were removed.
    pub fn update_documents<F>(&self, documents: Vec<Document>, callback: F)
    where
        F: FnOnce(u32) + Send + 'static,
    {
        if documents.is_empty() {
            callback(0);
            return;
        }
        let reply = UpdateReply::Count(Box::new(callback));
        self.shared.submit_update(UpdateRequest { documents, reply });
    }

    /// TF-IDF results of `term` from the cache, best first.
    pub fn get_tfidf(&self, term: &str) -> Vec<TfidfResult> {
        self.shared.snapshot().tfidf_cache.get(term).cloned().unwrap_or_default()
    }

    pub fn build_inverted_index(&self) {
        self.shared.submit(|ctl| ctl.build_requested = true);
    }

    pub fn build_inverted_index_with<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(|ctl| {
            ctl.build_requested = true;
            ctl.build_waiters.push(Box::new(callback));
        });
    }

    /// Drops every document and cached score. Supersedes updates and builds
    /// requested before it.
    pub fn clear_inverted_index(&self) {
        self.shared.submit(|ctl| {
            ctl.supersede_pending();
            ctl.clear_requested = true;
        });
    }

    pub fn clear_inverted_index_with<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.submit(|ctl| {
            ctl.supersede_pending();
            ctl.clear_requested = true;
            ctl.clear_waiters.push(Box::new(callback));
        });
    }

    /// Whether the TF-IDF cache reflects every document change accepted so far,
    /// including changes still queued for the worker.
    pub fn is_inverted_index_built(&self) -> bool {
        let ctl = self.shared.controller.lock();
        !ctl.unpublished_updates && self.shared.snapshot.read().is_built
    }

    pub fn number_documents(&self) -> usize {
        self.shared.snapshot.read().doc_length.len()
    }

    pub fn state(&self) -> ControllerState {
        self.shared.controller.lock().state
    }

    /// Blocks until no job is running or queued and every callback has returned.
    ///
    /// Must not be called from inside a callback of the same index.
    pub fn wait_idle(&self) {
        let mut ctl = self.shared.controller.lock();
        while !ctl.is_quiet() {
            self.shared.idle.wait(&mut ctl);
        }
    }
}

impl Drop for InvertedIndex {
    fn drop(&mut self) {
        {
            let mut ctl = self.shared.controller.lock();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            ctl.jobs = None;
            ctl.pending_updates.clear();
            ctl.build_waiters.clear();
            ctl.clear_waiters.clear();
            ctl.active_replies.clear();
            ctl.active_waiters.clear();
        }
        // Wait out a callback that is already running on the worker.
        let _delivery = self.shared.delivery.lock();
    }
}
