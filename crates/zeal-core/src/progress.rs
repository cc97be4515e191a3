//! Fan-out of docset install progress to any number of subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// One progress update for a docset install.
///
/// `received` stays strictly below `total` until the docset is fully
/// installed and reindexed; the final event carries `received == total`.
/// A failed install is terminal too: `error` is set and subscribers should
/// stop waiting for the docset.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "RepoId")]
    pub repo_id: String,
    #[serde(rename = "Docset")]
    pub docset: String,
    #[serde(rename = "Received")]
    pub received: u64,
    #[serde(rename = "Total")]
    pub total: u64,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(repo_id: &str, docset: &str, received: u64, total: u64) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            docset: docset.to_string(),
            received,
            total,
            error: None,
        }
    }

    /// Terminal event for a failed install.
    #[must_use]
    pub fn failed(repo_id: &str, docset: &str, total: u64, error: String) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            docset: docset.to_string(),
            received: total,
            total,
            error: Some(error),
        }
    }
}

type Handler = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Subscriber registry for install progress.
#[derive(Default)]
pub struct ProgressHandlers {
    handlers: RwLock<HashMap<usize, Handler>>,
    next_id: AtomicUsize,
}

impl ProgressHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and returns its id for [`Self::remove`].
    pub fn add(&self, handler: Handler) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().insert(id, handler);
        id
    }

    pub fn remove(&self, id: usize) {
        self.handlers.write().remove(&id);
    }

    /// Delivers an event to every current subscriber.
    pub fn broadcast(&self, event: &ProgressEvent) {
        for handler in self.handlers.read().values() {
            handler(event);
        }
    }
}
