use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::channel;

use anyhow::{Context, Result};
use foldwatch_engine::BenchmarkTracker;
use foldwatch_history::HistoryDatabase;
use foldwatch_runtime::{
    ClientRegistry, Config, FileBackend, ProteinCatalog, ProteinSource, RegistryServices,
};
use foldwatch_types::{ClientDescriptor, Protein};
use tracing::warn;

/// One-shot runtime assembly for CLI commands: config, history store,
/// protein catalog, and a registry populated with the configured clients.
pub struct RuntimeContext {
    pub registry: Arc<ClientRegistry>,
    pub tracker: Arc<BenchmarkTracker>,
}

impl RuntimeContext {
    pub fn build(data_dir: &Path) -> Result<Self> {
        let config = Config::load_from(&data_dir.join("config.toml"))?;
        let tracker = Arc::new(BenchmarkTracker::new());
        let history = Arc::new(HistoryDatabase::open(data_dir.join("history.db"))?);
        let catalog = Arc::new(ProteinCatalog::new(Box::new(JsonProteinSource::load(
            &data_dir.join("proteins.json"),
        )?)));

        // One-shot commands drain no events; coordinators tolerate the
        // dropped receiver.
        let (events_tx, _events_rx) = channel();
        let registry = Arc::new(ClientRegistry::new(RegistryServices {
            tracker: tracker.clone(),
            history,
            catalog,
            events: events_tx,
            allow_running_async: config.allow_running_async,
        }));

        for identity in &config.clients {
            match &identity.descriptor {
                ClientDescriptor::Path { log_root } => {
                    registry.add(identity.clone(), Box::new(FileBackend::new(log_root)))?;
                }
                ClientDescriptor::Network { .. } => {
                    warn!(
                        client = %identity.name,
                        "network clients need a live transport; skipped in one-shot mode"
                    );
                }
            }
        }

        Ok(Self { registry, tracker })
    }
}

/// Protein metadata seeded from a local JSON file. A missing file is an
/// empty catalog, not an error.
pub struct JsonProteinSource {
    proteins: HashMap<u32, Protein>,
}

impl JsonProteinSource {
    pub fn load(path: &Path) -> Result<Self> {
        let proteins = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let list: Vec<Protein> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            list.into_iter().map(|p| (p.project, p)).collect()
        } else {
            HashMap::new()
        };
        Ok(Self { proteins })
    }
}

impl ProteinSource for JsonProteinSource {
    fn fetch(&self, project: u32) -> Result<Option<Protein>> {
        Ok(self.proteins.get(&project).cloned())
    }
}
