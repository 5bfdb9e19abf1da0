use foldwatch_types::WorkUnit;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Samples kept per (client, project) pair.
const MAX_SAMPLES: usize = 300;

/// Benchmark identity: one rolling sample set per client per project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenchmarkKey {
    pub client_name: String,
    pub client_path: String,
    pub project: u32,
}

impl BenchmarkKey {
    pub fn for_unit(unit: &WorkUnit) -> Self {
        Self {
            client_name: unit.client_name.clone(),
            client_path: unit.client_path.clone(),
            project: unit.project.project,
        }
    }

    fn same_client(&self, name: &str, path: &str) -> bool {
        self.client_name == name && self.client_path == path
    }
}

/// Rolling frame-duration statistics for one benchmark key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub key: BenchmarkKey,
    /// Observed frame durations in seconds, oldest first, bounded.
    samples: VecDeque<i64>,
}

impl BenchmarkRecord {
    fn new(key: BenchmarkKey) -> Self {
        Self {
            key,
            samples: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    fn push(&mut self, duration_secs: i64) {
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(duration_secs);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Fastest observed frame, seconds.
    pub fn minimum_secs(&self) -> Option<i64> {
        self.samples.iter().copied().min()
    }

    /// Mean frame duration, seconds.
    pub fn average_secs(&self) -> Option<i64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: i64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as i64)
    }
}

/// Rolling per-project frame-time statistics across all clients.
///
/// Interior locking: single writer at a time is sufficient, and reads from
/// concurrent poll tasks never block each other. The status engine only
/// reads; aggregation output is the only writer.
#[derive(Debug, Default)]
pub struct BenchmarkTracker {
    records: RwLock<HashMap<BenchmarkKey, BenchmarkRecord>>,
}

impl BenchmarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record newly observed frames for a key. Only the frames beyond
    /// `previous_count` contribute samples; a poll that saw no new frames
    /// leaves the record untouched.
    pub fn record_frames(
        &self,
        key: BenchmarkKey,
        previous_count: u32,
        new_count: u32,
        durations_secs: &[i64],
    ) {
        if new_count <= previous_count {
            return;
        }

        let new_frames = (new_count - previous_count) as usize;
        let fresh = &durations_secs[durations_secs.len().saturating_sub(new_frames)..];
        if fresh.is_empty() {
            return;
        }

        let mut records = self.records.write().unwrap_or_else(|err| err.into_inner());
        let record = records
            .entry(key.clone())
            .or_insert_with(|| BenchmarkRecord::new(key));
        for duration in fresh {
            if *duration > 0 {
                record.push(*duration);
            }
        }
    }

    /// Benchmark for a work unit's (client, project) pair, if any samples
    /// have been recorded.
    pub fn benchmark(&self, unit: &WorkUnit) -> Option<BenchmarkRecord> {
        let records = self.records.read().unwrap_or_else(|err| err.into_inner());
        records.get(&BenchmarkKey::for_unit(unit)).cloned()
    }

    pub fn get(&self, key: &BenchmarkKey) -> Option<BenchmarkRecord> {
        let records = self.records.read().unwrap_or_else(|err| err.into_inner());
        records.get(key).cloned()
    }

    /// Remove all samples for one client.
    pub fn delete_client(&self, client_name: &str, client_path: &str) {
        let mut records = self.records.write().unwrap_or_else(|err| err.into_inner());
        records.retain(|key, _| !key.same_client(client_name, client_path));
    }

    /// Remove one project's samples.
    pub fn delete_project(&self, key: &BenchmarkKey) -> bool {
        let mut records = self.records.write().unwrap_or_else(|err| err.into_inner());
        records.remove(key).is_some()
    }

    /// Distinct projects with at least one sample, ascending.
    pub fn projects(&self) -> Vec<u32> {
        let records = self.records.read().unwrap_or_else(|err| err.into_inner());
        let mut projects: Vec<u32> = records.keys().map(|key| key.project).collect();
        projects.sort_unstable();
        projects.dedup();
        projects
    }

    /// Stable enumeration of all records for charting and display.
    pub fn snapshot(&self) -> Vec<BenchmarkRecord> {
        let records = self.records.read().unwrap_or_else(|err| err.into_inner());
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| {
            (&a.key.client_name, &a.key.client_path, a.key.project).cmp(&(
                &b.key.client_name,
                &b.key.client_path,
                b.key.project,
            ))
        });
        all
    }
}
