//! Query cache with post-mutation invalidation.
//!
//! # Design
//! Gateways stay stateless; whatever a consumer chooses to remember lives
//! here. A successful mutation drops every cached value it could have made
//! wrong: any write touches the entry listing, while only create and delete
//! change the counts reported by `/metrics`. Nothing is patched in place,
//! the next read simply goes back to the server.

use std::collections::HashMap;

use tracing::debug;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::http::Transport;
use crate::types::{DataEntry, DataEntryCreate, DataEntryUpdate, Metrics, Pagination};

/// A successful write against the data-entry collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    CreateEntry,
    UpdateEntry,
    DeleteEntry,
}

impl Mutation {
    pub fn invalidates_entries(self) -> bool {
        true
    }

    pub fn invalidates_metrics(self) -> bool {
        matches!(self, Mutation::CreateEntry | Mutation::DeleteEntry)
    }
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<Pagination, Vec<DataEntry>>,
    metrics: Option<Metrics>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, page: Pagination) -> Option<&[DataEntry]> {
        self.entries.get(&page).map(Vec::as_slice)
    }

    pub fn store_entries(&mut self, page: Pagination, entries: Vec<DataEntry>) {
        self.entries.insert(page, entries);
    }

    pub fn metrics(&self) -> Option<Metrics> {
        self.metrics
    }

    pub fn store_metrics(&mut self, metrics: Metrics) {
        self.metrics = Some(metrics);
    }

    /// Forget everything `mutation` may have made stale.
    pub fn apply(&mut self, mutation: Mutation) {
        if mutation.invalidates_entries() && !self.entries.is_empty() {
            debug!(?mutation, pages = self.entries.len(), "invalidating cached entry listings");
            self.entries.clear();
        }
        if mutation.invalidates_metrics() && self.metrics.take().is_some() {
            debug!(?mutation, "invalidating cached metrics");
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.metrics = None;
    }
}

/// `ApiClient` plus a `QueryCache` kept coherent with the client's own
/// mutations.
pub struct CachingClient<T> {
    client: ApiClient<T>,
    cache: QueryCache,
}

impl<T: Transport> CachingClient<T> {
    pub fn new(client: ApiClient<T>) -> Self {
        Self {
            client,
            cache: QueryCache::new(),
        }
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn entries(&mut self, page: Pagination) -> Result<Vec<DataEntry>, ApiError> {
        if let Some(cached) = self.cache.entries(page) {
            return Ok(cached.to_vec());
        }
        let fresh = self.client.list_data_entries(page)?;
        self.cache.store_entries(page, fresh.clone());
        Ok(fresh)
    }

    pub fn metrics(&mut self) -> Result<Metrics, ApiError> {
        if let Some(cached) = self.cache.metrics() {
            return Ok(cached);
        }
        let fresh = self.client.get_metrics()?;
        self.cache.store_metrics(fresh);
        Ok(fresh)
    }

    pub fn create_entry(&mut self, input: &DataEntryCreate) -> Result<DataEntry, ApiError> {
        let created = self.client.create_data_entry(input)?;
        self.cache.apply(Mutation::CreateEntry);
        Ok(created)
    }

    pub fn update_entry(&mut self, id: &str, input: &DataEntryUpdate) -> Result<DataEntry, ApiError> {
        let updated = self.client.update_data_entry(id, input)?;
        self.cache.apply(Mutation::UpdateEntry);
        Ok(updated)
    }

    pub fn delete_entry(&mut self, id: &str) -> Result<(), ApiError> {
        self.client.delete_data_entry(id)?;
        self.cache.apply(Mutation::DeleteEntry);
        Ok(())
    }

    /// Manual refresh: drop everything and let the next reads refetch.
    pub fn refresh(&mut self) {
        self.cache.clear();
    }
}
