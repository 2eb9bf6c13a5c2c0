use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::errors::ImporterError;
use crate::models::{JobId, JobRecord, JobStatus};

/// Point-in-time count of jobs per status. Statuses with no jobs are absent.
pub type JobStats = BTreeMap<JobStatus, usize>;

/// In-memory store of job records.
///
/// The map lock only guards insertion, removal and iteration; every record
/// has its own lock for field updates, so updating one job never blocks
/// readers of another.
pub struct JobRepository {
    records: RwLock<HashMap<JobId, Arc<RwLock<JobRecord>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for JobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert a new record for `id`, letting `populate` set its initial fields.
    ///
    /// Fails with `Conflict` if `id` is already known; the existing record is
    /// left untouched.
    pub fn store<F>(&self, id: &JobId, populate: F) -> Result<(), ImporterError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut record = JobRecord::new(id.clone());
        populate(&mut record);
        // The key always matches the record.
        record.id = id.clone();

        let mut records = self.records.write();
        if records.contains_key(id) {
            return Err(ImporterError::Conflict(format!(
                "job {} already exists",
                id
            )));
        }
        records.insert(id.clone(), Arc::new(RwLock::new(record)));
        Ok(())
    }

    /// Apply `mutate` to the record for `id` under that record's lock.
    pub fn update<F>(&self, id: &JobId, mutate: F) -> Result<(), ImporterError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let entry = self
            .records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ImporterError::NotFound(format!("job {}", id)))?;

        let mut record = entry.write();
        mutate(&mut record);
        Ok(())
    }

    /// Delete the record for `id`. Returns whether it existed.
    pub fn remove(&self, id: &JobId) -> bool {
        self.records.write().remove(id).is_some()
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        let entry = self.records.read().get(id).cloned()?;
        let record = entry.read().clone();
        Some(record)
    }

    /// Copy of every record, newest first.
    pub fn snapshot(&self) -> Vec<JobRecord> {
        let entries: Vec<_> = self.records.read().values().cloned().collect();
        let mut records: Vec<JobRecord> = entries.iter().map(|e| e.read().clone()).collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        records
    }

    pub fn stats(&self) -> JobStats {
        let records = self.records.read();
        let mut stats = JobStats::new();
        for entry in records.values() {
            *stats.entry(entry.read().status).or_insert(0) += 1;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Remove terminal records that stopped more than `retention` ago.
    /// Returns how many were removed.
    pub fn purge_stopped(&self, retention: std::time::Duration) -> usize {
        let retention = match chrono::Duration::from_std(retention) {
            Ok(retention) => retention,
            Err(_) => return 0,
        };
        let cutoff = self.now() - retention;

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, entry| {
            let record = entry.read();
            let expired = record.status.is_terminal()
                && record.stopped_at.is_some_and(|stopped| stopped < cutoff);
            !expired
        });
        before - records.len()
    }
}
