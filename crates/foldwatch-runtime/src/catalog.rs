use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use foldwatch_types::Protein;
use tracing::{debug, warn};

/// Where protein metadata comes from; the wire side is the implementor's
/// business.
pub trait ProteinSource: Send + Sync {
    /// `Ok(None)` means the source answered and does not know the project.
    fn fetch(&self, project: u32) -> Result<Option<Protein>>;
}

const NEGATIVE_CACHE_HOURS: i64 = 24;

/// Cache over a [`ProteinSource`] with refresh-on-miss.
///
/// Unknown projects are remembered for a day so that every poll of a client
/// folding an unlisted project does not re-query the source.
pub struct ProteinCatalog {
    source: Box<dyn ProteinSource>,
    state: RwLock<CatalogState>,
}

#[derive(Default)]
struct CatalogState {
    proteins: HashMap<u32, Protein>,
    missing_since: HashMap<u32, DateTime<Utc>>,
}

impl ProteinCatalog {
    pub fn new(source: Box<dyn ProteinSource>) -> Self {
        Self {
            source,
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub fn get(&self, project: u32) -> Option<Protein> {
        let now = Utc::now();
        {
            let state = self.state.read().unwrap_or_else(|err| err.into_inner());
            if let Some(protein) = state.proteins.get(&project) {
                return Some(protein.clone());
            }
            if let Some(since) = state.missing_since.get(&project) {
                if now - *since < Duration::hours(NEGATIVE_CACHE_HOURS) {
                    return None;
                }
            }
        }

        match self.source.fetch(project) {
            Ok(Some(protein)) => {
                let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
                state.missing_since.remove(&project);
                state.proteins.insert(project, protein.clone());
                Some(protein)
            }
            Ok(None) => {
                debug!(project, "protein source does not know this project");
                self.record_miss(project, now);
                None
            }
            Err(err) => {
                warn!(project, error = %err, "protein fetch failed");
                self.record_miss(project, now);
                None
            }
        }
    }

    /// Seed the cache directly, bypassing the source.
    pub fn insert(&self, protein: Protein) {
        let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
        state.missing_since.remove(&protein.project);
        state.proteins.insert(protein.project, protein);
    }

    fn record_miss(&self, project: u32, when: DateTime<Utc>) {
        let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
        state.missing_since.insert(project, when);
    }
}
