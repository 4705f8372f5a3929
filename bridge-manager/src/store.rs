//! Tenant record store trait and implementations.

use crate::error::{StoreError, StoreResult};
use crate::model::{Phase, TenantRecord};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Trait for storing tenant records.
///
/// # Implementation Notes
///
/// - `insert` assigns version 1 and enforces name uniqueness per
///   (customer, parent bridge, name) atomically with the write
/// - `update` succeeds only if the record's version matches the stored one,
///   and bumps it
/// - Listings are ordered by submission time
pub trait RecordStore: Send + Sync {
    /// Store a new record.
    fn insert(&self, record: TenantRecord) -> StoreResult<TenantRecord>;

    /// Get a record by id.
    fn get(&self, id: &str) -> Option<TenantRecord>;

    /// Replace a record, guarded by its version.
    fn update(&self, record: TenantRecord) -> StoreResult<TenantRecord>;

    /// Remove a record.
    fn remove(&self, id: &str) -> StoreResult<TenantRecord>;

    /// Find a record by name within a customer and parent bridge.
    ///
    /// `bridge_id` is `None` for bridges.
    fn find_by_name(
        &self,
        customer_id: &str,
        bridge_id: Option<&str>,
        name: &str,
    ) -> Option<TenantRecord>;

    /// All records of a customer.
    fn list_by_customer(&self, customer_id: &str) -> Vec<TenantRecord>;

    /// All processors of a bridge.
    fn list_by_bridge(&self, bridge_id: &str) -> Vec<TenantRecord>;

    /// All records in any of `phases`.
    fn list_by_phase(&self, phases: &[Phase]) -> Vec<TenantRecord>;

    /// Number of stored records.
    fn count(&self) -> usize;
}

/// In-memory record store for tests and single-replica deployments.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, TenantRecord>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, filter: impl Fn(&TenantRecord) -> bool) -> Vec<TenantRecord> {
        let mut records: Vec<TenantRecord> = self
            .records
            .read()
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }
}

fn same_scope(a: &TenantRecord, customer_id: &str, bridge_id: Option<&str>, name: &str) -> bool {
    a.customer_id == customer_id && a.bridge_id.as_deref() == bridge_id && a.name == name
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, mut record: TenantRecord) -> StoreResult<TenantRecord> {
        let mut records = self.records.write();

        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        if records.values().any(|r| {
            same_scope(
                r,
                &record.customer_id,
                record.bridge_id.as_deref(),
                &record.name,
            )
        }) {
            return Err(StoreError::DuplicateName { name: record.name });
        }

        record.version = 1;
        records.insert(record.id.clone(), record.clone());
        tracing::debug!(id = %record.id, kind = %record.kind, "Record stored");
        Ok(record)
    }

    fn get(&self, id: &str) -> Option<TenantRecord> {
        self.records.read().get(id).cloned()
    }

    fn update(&self, mut record: TenantRecord) -> StoreResult<TenantRecord> {
        let mut records = self.records.write();

        let stored = records
            .get(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict {
                id: record.id,
                expected: record.version,
                found: stored.version,
            });
        }

        record.version += 1;
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn remove(&self, id: &str) -> StoreResult<TenantRecord> {
        self.records
            .write()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn find_by_name(
        &self,
        customer_id: &str,
        bridge_id: Option<&str>,
        name: &str,
    ) -> Option<TenantRecord> {
        self.records
            .read()
            .values()
            .find(|r| same_scope(r, customer_id, bridge_id, name))
            .cloned()
    }

    fn list_by_customer(&self, customer_id: &str) -> Vec<TenantRecord> {
        self.collect(|r| r.customer_id == customer_id)
    }

    fn list_by_bridge(&self, bridge_id: &str) -> Vec<TenantRecord> {
        self.collect(|r| r.bridge_id.as_deref() == Some(bridge_id))
    }

    fn list_by_phase(&self, phases: &[Phase]) -> Vec<TenantRecord> {
        self.collect(|r| phases.contains(&r.phase))
    }

    fn count(&self) -> usize {
        self.records.read().len()
    }
}
