//! Rolling question history
//!
//! The pipeline only depends on the `HistoryStore` contract, so the in-memory
//! store here and the SQLite store in [`crate::store`] are interchangeable.

use crate::error::Result;
use crate::types::HistoryItem;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Capacity-bounded, append-only log of produced questions (oldest first)
#[async_trait]
pub trait HistoryStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Current capacity
    async fn limit(&self) -> usize;

    /// Set capacity to `max(1, limit)` and drop the oldest items beyond it
    async fn set_limit(&self, limit: usize) -> Result<()>;

    /// Replace contents with the newest `limit` items of `items`
    async fn seed(&self, items: Vec<HistoryItem>) -> Result<()>;

    /// Append, evicting from the front when over capacity
    async fn add(&self, item: HistoryItem) -> Result<()>;

    /// Independent snapshot, oldest first
    async fn get_all(&self) -> Result<Vec<HistoryItem>>;

    async fn len(&self) -> Result<usize> {
        Ok(self.get_all().await?.len())
    }
}

#[derive(Debug)]
struct Inner {
    limit: usize,
    items: VecDeque<HistoryItem>,
}

impl Inner {
    fn truncate_front(&mut self) -> usize {
        let excess = self.items.len().saturating_sub(self.limit);
        self.items.drain(..excess);
        excess
    }
}

/// Process-local history store
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryHistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                limit: limit.max(1),
                items: VecDeque::new(),
            }),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn limit(&self) -> usize {
        self.inner.read().await.limit
    }

    async fn set_limit(&self, limit: usize) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.limit = limit.max(1);
        let evicted = inner.truncate_front();
        if evicted > 0 {
            tracing::debug!("History limit {} evicted {} items", inner.limit, evicted);
        }
        Ok(())
    }

    async fn seed(&self, items: Vec<HistoryItem>) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.items = items.into();
        inner.truncate_front();
        Ok(())
    }

    async fn add(&self, item: HistoryItem) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.items.push_back(item);
        inner.truncate_front();
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<HistoryItem>> {
        Ok(self.inner.read().await.items.iter().cloned().collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.read().await.items.len())
    }
}
