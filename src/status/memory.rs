use super::store::{ClaimOutcome, ProcessingStatus, StatusFuture, StatusRecord, StatusStore};
use crate::types::Height;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process status store. Every operation takes the single lock, which makes
/// claims atomic across workers.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    rows: Mutex<HashMap<Height, StatusRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row directly, bypassing the claim protocol.
    pub fn insert(&self, height: Height, record: StatusRecord) {
        self.rows.lock().unwrap().insert(height, record);
    }

    pub fn status(&self, height: Height) -> Option<ProcessingStatus> {
        self.rows.lock().unwrap().get(&height).map(|row| row.status)
    }

    pub fn record(&self, height: Height) -> Option<StatusRecord> {
        self.rows.lock().unwrap().get(&height).cloned()
    }

    /// Heights still held in `Processing`, sorted ascending. After a crash
    /// these are the claims nothing will finish.
    pub fn processing_heights(&self) -> Vec<Height> {
        let mut heights: Vec<Height> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, row)| row.status == ProcessingStatus::Processing)
            .map(|(height, _)| *height)
            .collect();
        heights.sort_unstable();
        heights
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusStore for MemoryStatusStore {
    fn get_status(&self, height: Height) -> StatusFuture<'_, Option<StatusRecord>> {
        let record = self.record(height);
        Box::pin(async move { Ok(record) })
    }

    fn claim_processing(&self, height: Height) -> StatusFuture<'_, ClaimOutcome> {
        let outcome = {
            let mut rows = self.rows.lock().unwrap();
            match rows.get(&height) {
                Some(existing) => ClaimOutcome::Exists(existing.clone()),
                None => {
                    rows.insert(height, StatusRecord::new(ProcessingStatus::Processing));
                    ClaimOutcome::Created
                }
            }
        };
        Box::pin(async move { Ok(outcome) })
    }

    fn reclaim_errored(&self, height: Height) -> StatusFuture<'_, bool> {
        let reclaimed = {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(&height) {
                Some(row)
                    if matches!(
                        row.status,
                        ProcessingStatus::Errored | ProcessingStatus::Unprocessed
                    ) =>
                {
                    *row = StatusRecord::new(ProcessingStatus::Processing);
                    true
                }
                _ => false,
            }
        };
        Box::pin(async move { Ok(reclaimed) })
    }

    fn mark_processed(&self, height: Height) -> StatusFuture<'_, ()> {
        self.insert(height, StatusRecord::new(ProcessingStatus::Processed));
        Box::pin(async { Ok(()) })
    }

    fn mark_errored<'a>(&'a self, height: Height, message: &'a str) -> StatusFuture<'a, ()> {
        self.insert(height, StatusRecord::errored(message));
        Box::pin(async { Ok(()) })
    }

    fn latest_processed_block(&self) -> StatusFuture<'_, Option<DateTime<Utc>>> {
        let latest = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|row| row.status == ProcessingStatus::Processed)
            .map(|row| row.updated_at)
            .max();
        Box::pin(async move { Ok(latest) })
    }
}
