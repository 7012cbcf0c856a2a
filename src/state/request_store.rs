use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{LiftClubError, Result};
use crate::models::LiftClubRequest;

/// Storage for club requests, one lock per request.
///
/// Requests are never removed; decided ones stay for audit and analytics.
pub struct RequestStore {
    requests: DashMap<Uuid, Arc<Mutex<LiftClubRequest>>>,
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStore {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }

    pub fn restore(requests: Vec<LiftClubRequest>) -> Self {
        let store = Self::new();
        for request in requests {
            store.insert(request);
        }
        store
    }

    pub fn insert(&self, request: LiftClubRequest) {
        self.requests
            .insert(request.id, Arc::new(Mutex::new(request)));
    }

    /// Handle to a single request's lock
    pub fn entry(&self, request_id: Uuid) -> Result<Arc<Mutex<LiftClubRequest>>> {
        self.requests
            .get(&request_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| LiftClubError::not_found("Request", request_id))
    }

    pub fn get(&self, request_id: Uuid) -> Result<LiftClubRequest> {
        let entry = self.entry(request_id)?;
        let request = entry.lock();
        Ok(request.clone())
    }

    /// Copy of every request, each read under its own lock
    pub fn snapshot(&self) -> Vec<LiftClubRequest> {
        let entries: Vec<_> = self.requests.iter().map(|r| r.value().clone()).collect();
        entries.into_iter().map(|e| e.lock().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Shared request store type
pub type SharedRequestStore = Arc<RequestStore>;

pub fn create_shared_request_store(store: RequestStore) -> SharedRequestStore {
    Arc::new(store)
}
