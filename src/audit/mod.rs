//! Audit trail of processed requests
//!
//! Every coordinator run is recorded with a hash of its plan so a record can
//! be checked for tampering later. The log is bounded: once full, the oldest
//! record is evicted on each insert.

use crate::models::{ExecutionPlan, QueryClassification, StructuredResponse};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// One processed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub query: String,
    pub classification: QueryClassification,
    pub plan: ExecutionPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<StructuredResponse>,
    pub knowledge_consulted: bool,
    pub plan_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        query: String,
        classification: QueryClassification,
        plan: ExecutionPlan,
        response: Option<StructuredResponse>,
        knowledge_consulted: bool,
    ) -> Self {
        let plan_hash = compute_plan_hash(&plan);
        Self {
            audit_id: Uuid::new_v4(),
            query,
            classification,
            plan,
            response,
            knowledge_consulted,
            plan_hash,
            created_at: Utc::now(),
        }
    }
}

/// Records kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Default)]
struct AuditStore {
    records: HashMap<Uuid, AuditRecord>,
    /// Insertion order, oldest first.
    order: VecDeque<Uuid>,
}

/// Audit trail storage
pub struct AuditLog {
    store: Arc<RwLock<AuditStore>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(AuditStore::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a record, evicting the oldest ones beyond capacity
    pub async fn record(&self, record: AuditRecord) -> Result<Uuid> {
        let audit_id = record.audit_id;
        let mut store = self.store.write().await;

        if store.records.insert(audit_id, record).is_none() {
            store.order.push_back(audit_id);
        }

        while store.order.len() > self.capacity {
            if let Some(evicted) = store.order.pop_front() {
                store.records.remove(&evicted);
                debug!(audit_id = %evicted, "Evicted oldest audit record");
            }
        }

        Ok(audit_id)
    }

    /// Retrieve a record by audit ID
    pub async fn get(&self, audit_id: Uuid) -> Result<Option<AuditRecord>> {
        let store = self.store.read().await;
        Ok(store.records.get(&audit_id).cloned())
    }

    /// Most recent records, newest first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let store = self.store.read().await;

        Ok(store
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| store.records.get(id).cloned())
            .collect())
    }

    pub async fn count(&self) -> usize {
        self.store.read().await.records.len()
    }

    /// Verify a record's integrity via hash
    pub async fn verify_integrity(&self, audit_id: Uuid) -> Result<bool> {
        let store = self.store.read().await;

        if let Some(record) = store.records.get(&audit_id) {
            Ok(compute_plan_hash(&record.plan) == record.plan_hash)
        } else {
            Ok(false)
        }
    }

    #[cfg(test)]
    async fn tamper(&self, audit_id: Uuid, plan: ExecutionPlan) {
        if let Some(record) = self.store.write().await.records.get_mut(&audit_id) {
            record.plan = plan;
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of the plan's JSON form
/// Uses zero-copy streaming serialization into hasher
pub fn compute_plan_hash(plan: &ExecutionPlan) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), plan).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RequestClassifier;
    use crate::models::{QualityTier, Symbol};

    fn record_for(query: &str) -> AuditRecord {
        AuditRecord::new(
            query.to_string(),
            RequestClassifier::classify(query),
            ExecutionPlan::default(),
            None,
            false,
        )
    }

    #[test]
    fn test_plan_hash_is_stable_and_sensitive() {
        let plan = ExecutionPlan::default();
        let hash = compute_plan_hash(&plan);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_plan_hash(&plan));

        let other = ExecutionPlan {
            symbol: Some(Symbol::EurUsd),
            ..ExecutionPlan::default()
        };
        assert_ne!(hash, compute_plan_hash(&other));
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let log = AuditLog::new();
        let id = log.record(record_for("EURUSD backtest")).await.unwrap();

        let stored = log.get(id).await.unwrap().unwrap();
        assert_eq!(stored.query, "EURUSD backtest");
        assert!(log.verify_integrity(id).await.unwrap());
        assert!(log.get(Uuid::new_v4()).await.unwrap().is_none());
        assert!(!log.verify_integrity(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_tampering_breaks_integrity() {
        let log = AuditLog::new();
        let id = log.record(record_for("order blocks")).await.unwrap();

        log.tamper(
            id,
            ExecutionPlan {
                quality_requirements: QualityTier::BroadCoverage,
                ..ExecutionPlan::default()
            },
        )
        .await;

        assert!(!log.verify_integrity(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let log = AuditLog::new();
        let first = log.record(record_for("a")).await.unwrap();
        let second = log.record(record_for("b")).await.unwrap();

        let ids = |records: Vec<AuditRecord>| -> Vec<Uuid> {
            records.into_iter().map(|r| r.audit_id).collect()
        };
        assert_eq!(ids(log.list_recent(10).await.unwrap()), vec![second, first]);
        assert_eq!(ids(log.list_recent(1).await.unwrap()), vec![second]);
        assert_eq!(log.count().await, 2);
    }

    #[tokio::test]
    async fn test_full_log_evicts_oldest() {
        let log = AuditLog::with_capacity(3);

        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(log.record(record_for(&format!("run {}", i))).await.unwrap());
        }

        assert_eq!(log.count().await, 3);
        assert!(log.get(ids[0]).await.unwrap().is_none());
        assert!(log.get(ids[4]).await.unwrap().is_none());

        let newest = log.get(ids[7]).await.unwrap().unwrap();
        assert_eq!(newest.query, "run 7");
        assert!(log.verify_integrity(ids[5]).await.unwrap());
        assert_eq!(log.list_recent(10).await.unwrap().len(), 3);
    }

    #[test]
    fn test_capacity_is_at_least_one() {
        assert_eq!(AuditLog::with_capacity(0).capacity(), 1);
        assert_eq!(AuditLog::new().capacity(), DEFAULT_CAPACITY);
    }
}
