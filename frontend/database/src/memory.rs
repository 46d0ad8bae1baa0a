//! An in-memory document store.
//!
//! Used by the binary when no external store is configured and as the store fake in tests: errors
//! may be injected, conditional writes may be forced to fail, and callers may check whether every
//! change feed has caught up with the latest commit.

use crate::{Document, DocumentClient, DocumentIterator, Error, Page, Result};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

#[derive(Clone)]
pub struct MemoryClient<D> {
    state: Arc<Mutex<State<D>>>,
}

struct State<D> {
    documents: HashMap<String, Entry<D>>,

    /// The sequence number of the most recent commit.
    lsn: u64,

    error: Option<Error>,
    precondition_failures: usize,

    /// The positions of every change feed handed out.
    feeds: Vec<Arc<AtomicU64>>,
}

struct Entry<D> {
    document: D,
    lsn: u64,
}

struct ListIterator<D> {
    state: Arc<Mutex<State<D>>>,
    partition: Option<String>,
    prefix: String,
    offset: usize,
    done: bool,
}

struct ChangeFeed<D> {
    state: Arc<Mutex<State<D>>>,
    position: Arc<AtomicU64>,
}

// === impl MemoryClient ===

impl<D: Document> Default for MemoryClient<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> MemoryClient<D> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                documents: HashMap::new(),
                lsn: 0,
                error: None,
                precondition_failures: 0,
                feeds: Vec::new(),
            })),
        }
    }

    /// Fails every subsequent call with `error` until it is cleared.
    pub fn set_error(&self, error: Option<Error>) {
        self.state.lock().error = error;
    }

    /// Fails the next `n` conditional replaces as if a concurrent writer had won.
    pub fn fail_preconditions(&self, n: usize) {
        self.state.lock().precondition_failures = n;
    }

    /// Returns true if every change feed has yielded the most recent commit.
    pub fn all_iterators_consumed(&self) -> bool {
        let state = self.state.lock();
        state
            .feeds
            .iter()
            .all(|position| position.load(Ordering::Acquire) >= state.lsn)
    }

    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all stored documents, ordered by key.
    pub fn documents(&self) -> Vec<D> {
        let state = self.state.lock();
        let mut docs = state
            .documents
            .values()
            .map(|e| e.document.clone())
            .collect::<Vec<_>>();
        docs.sort_by(|a, b| a.key().cmp(b.key()));
        docs
    }
}

#[async_trait::async_trait]
impl<D: Document> DocumentClient<D> for MemoryClient<D> {
    async fn get(&self, key: &str) -> Result<D> {
        let state = self.state.lock();
        state.check()?;
        state
            .documents
            .get(key)
            .map(|e| e.document.clone())
            .ok_or(Error::NotFound)
    }

    async fn create(&self, mut doc: D) -> Result<D> {
        let mut state = self.state.lock();
        state.check()?;
        if state.documents.contains_key(doc.key()) {
            return Err(Error::Conflict);
        }
        state.commit(&mut doc);
        Ok(doc)
    }

    async fn replace(&self, mut doc: D) -> Result<D> {
        let mut state = self.state.lock();
        state.check()?;
        let current = state.documents.get(doc.key()).ok_or(Error::NotFound)?;
        if let Some(etag) = doc.etag() {
            if current.document.etag() != Some(etag) {
                return Err(Error::PreconditionFailed);
            }
            if state.precondition_failures > 0 {
                state.precondition_failures -= 1;
                return Err(Error::PreconditionFailed);
            }
        }
        state.commit(&mut doc);
        Ok(doc)
    }

    async fn delete(&self, doc: &D) -> Result<()> {
        let mut state = self.state.lock();
        state.check()?;
        let current = state.documents.get(doc.key()).ok_or(Error::NotFound)?;
        if doc.etag().is_some() && current.document.etag() != doc.etag() {
            return Err(Error::PreconditionFailed);
        }
        state.documents.remove(doc.key());
        Ok(())
    }

    fn list(&self, continuation: Option<String>) -> Box<dyn DocumentIterator<D>> {
        Box::new(ListIterator::new(self.state.clone(), None, "", continuation))
    }

    fn list_by_prefix(
        &self,
        partition: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Box<dyn DocumentIterator<D>> {
        Box::new(ListIterator::new(
            self.state.clone(),
            Some(partition.to_string()),
            prefix,
            continuation,
        ))
    }

    fn change_feed(&self) -> Box<dyn DocumentIterator<D>> {
        let position = Arc::new(AtomicU64::new(0));
        self.state.lock().feeds.push(position.clone());
        Box::new(ChangeFeed {
            state: self.state.clone(),
            position,
        })
    }
}

// === impl State ===

impl<D: Document> State<D> {
    fn check(&self) -> Result<()> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn commit(&mut self, doc: &mut D) {
        self.lsn += 1;
        doc.set_etag(Some(format!("\"{:016x}\"", self.lsn)));
        self.documents.insert(
            doc.key().to_string(),
            Entry {
                document: doc.clone(),
                lsn: self.lsn,
            },
        );
    }
}

// === impl ListIterator ===

impl<D> ListIterator<D> {
    fn new(
        state: Arc<Mutex<State<D>>>,
        partition: Option<String>,
        prefix: &str,
        continuation: Option<String>,
    ) -> Self {
        Self {
            state,
            partition,
            prefix: prefix.to_string(),
            offset: continuation.and_then(|c| c.parse().ok()).unwrap_or(0),
            done: false,
        }
    }
}

#[async_trait::async_trait]
impl<D: Document> DocumentIterator<D> for ListIterator<D> {
    async fn next(&mut self, max_items: Option<usize>) -> Result<Option<Page<D>>> {
        if self.done {
            return Ok(None);
        }

        let state = self.state.lock();
        state.check()?;
        let mut docs = state
            .documents
            .values()
            .map(|e| &e.document)
            .filter(|d| d.key().starts_with(&self.prefix))
            .filter(|d| {
                self.partition
                    .as_deref()
                    .map_or(true, |p| d.partition_key() == p)
            })
            .collect::<Vec<_>>();
        docs.sort_by(|a, b| a.key().cmp(b.key()));

        let documents = docs
            .into_iter()
            .skip(self.offset)
            .take(max_items.unwrap_or(usize::MAX))
            .cloned()
            .collect::<Vec<_>>();
        if documents.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.offset += documents.len();
        Ok(Some(Page { documents }))
    }

    fn continuation(&self) -> Option<String> {
        (!self.done).then(|| self.offset.to_string())
    }
}

// === impl ChangeFeed ===

#[async_trait::async_trait]
impl<D: Document> DocumentIterator<D> for ChangeFeed<D> {
    async fn next(&mut self, max_items: Option<usize>) -> Result<Option<Page<D>>> {
        let state = self.state.lock();
        state.check()?;

        let position = self.position.load(Ordering::Acquire);
        let mut changed = state
            .documents
            .values()
            .filter(|e| e.lsn > position)
            .collect::<Vec<_>>();
        changed.sort_by_key(|e| e.lsn);
        changed.truncate(max_items.unwrap_or(usize::MAX));

        let Some(last) = changed.last() else {
            // Deletes don't appear in the feed, so catch up with the latest commit.
            self.position.store(state.lsn, Ordering::Release);
            return Ok(None);
        };
        self.position.store(last.lsn, Ordering::Release);
        Ok(Some(Page {
            documents: changed.into_iter().map(|e| e.document.clone()).collect(),
        }))
    }

    fn continuation(&self) -> Option<String> {
        Some(self.position.load(Ordering::Acquire).to_string())
    }
}
