use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock};

use anyhow::{Result, bail};
use foldwatch_engine::BenchmarkTracker;
use foldwatch_history::HistoryDatabase;
use foldwatch_types::ClientIdentity;
use tracing::info;

use crate::catalog::ProteinCatalog;
use crate::coordinator::{RetrievalBackend, RetrievalCoordinator};
use crate::events::ClientEvent;

/// Shared collaborators handed to every coordinator the registry builds.
#[derive(Clone)]
pub struct RegistryServices {
    pub tracker: Arc<BenchmarkTracker>,
    pub history: Arc<HistoryDatabase>,
    pub catalog: Arc<ProteinCatalog>,
    pub events: Sender<ClientEvent>,
    pub allow_running_async: bool,
}

#[derive(Clone)]
pub struct ClientHandle {
    pub coordinator: Arc<RetrievalCoordinator>,
}

impl ClientHandle {
    pub fn identity(&self) -> ClientIdentity {
        self.coordinator.identity()
    }
}

/// Set of monitored clients, keyed by their unique names.
///
/// Mutations validate synchronously and either complete or leave the
/// registry untouched; renames are a remove-and-reinsert under one write
/// lock so no reader ever sees a half-renamed client.
pub struct ClientRegistry {
    services: RegistryServices,
    clients: RwLock<HashMap<String, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new(services: RegistryServices) -> Self {
        Self {
            services,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(
        &self,
        identity: ClientIdentity,
        backend: Box<dyn RetrievalBackend>,
    ) -> Result<ClientHandle> {
        identity.validate()?;

        let handle = {
            let mut clients = self.clients.write().unwrap_or_else(|err| err.into_inner());
            if clients.contains_key(&identity.name) {
                bail!("a client named '{}' already exists", identity.name);
            }

            let coordinator = Arc::new(RetrievalCoordinator::new(
                identity.clone(),
                backend,
                self.services.tracker.clone(),
                self.services.history.clone(),
                self.services.catalog.clone(),
                self.services.events.clone(),
                self.services.allow_running_async,
            ));
            let handle = ClientHandle { coordinator };
            clients.insert(identity.name.clone(), handle.clone());
            handle
        };

        info!(client = %identity.name, "client added");
        let _ = self.services.events.send(ClientEvent::Invalidated {
            client: Some(identity.name),
        });
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<ClientHandle> {
        self.clients
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(name)
            .cloned()
    }

    pub fn handles(&self) -> Vec<ClientHandle> {
        self.clients
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Configured identities, sorted by name.
    pub fn list(&self) -> Vec<ClientIdentity> {
        let mut identities: Vec<ClientIdentity> = self
            .clients
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .values()
            .map(|handle| handle.identity())
            .collect();
        identities.sort_by(|a, b| a.name.cmp(&b.name));
        identities
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = self
            .clients
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .remove(name)
            .is_some();
        if removed {
            info!(client = name, "client removed");
            let _ = self.services.events.send(ClientEvent::Invalidated {
                client: Some(name.to_string()),
            });
        }
        removed
    }

    /// Replace the settings of the client registered as `name`. The new
    /// identity may carry a different name, which re-keys the entry.
    pub fn edit(&self, name: &str, identity: ClientIdentity) -> Result<()> {
        identity.validate()?;

        {
            let mut clients = self.clients.write().unwrap_or_else(|err| err.into_inner());
            if identity.name != name && clients.contains_key(&identity.name) {
                bail!("a client named '{}' already exists", identity.name);
            }
            let Some(handle) = clients.remove(name) else {
                bail!("no client named '{name}'");
            };

            handle.coordinator.set_identity(identity.clone());
            clients.insert(identity.name.clone(), handle);
        }

        info!(from = name, to = %identity.name, "client settings updated");
        // The old name may still be on screen somewhere; invalidate broadly.
        let client = (identity.name == name).then(|| identity.name.clone());
        let _ = self
            .services
            .events
            .send(ClientEvent::Invalidated { client });
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let Some(handle) = self.get(old) else {
            bail!("no client named '{old}'");
        };
        let mut identity = handle.identity();
        identity.name = new.to_string();
        self.edit(old, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::PollArtifacts;
    use foldwatch_types::ClientDescriptor;
    use std::sync::mpsc::{Receiver, channel};

    struct IdleBackend;

    impl RetrievalBackend for IdleBackend {
        fn fetch(&mut self) -> Result<PollArtifacts> {
            Ok(PollArtifacts::default())
        }
    }

    struct EmptySource;

    impl crate::catalog::ProteinSource for EmptySource {
        fn fetch(&self, _project: u32) -> Result<Option<foldwatch_types::Protein>> {
            Ok(None)
        }
    }

    fn registry() -> (ClientRegistry, Receiver<ClientEvent>) {
        let (tx, rx) = channel();
        let services = RegistryServices {
            tracker: Arc::new(BenchmarkTracker::new()),
            history: Arc::new(HistoryDatabase::open_in_memory().unwrap()),
            catalog: Arc::new(ProteinCatalog::new(Box::new(EmptySource))),
            events: tx,
            allow_running_async: false,
        };
        (ClientRegistry::new(services), rx)
    }

    fn identity(name: &str) -> ClientIdentity {
        ClientIdentity {
            name: name.to_string(),
            descriptor: ClientDescriptor::Path {
                log_root: "/var/lib/fah".to_string(),
            },
            clock_offset_minutes: 0,
            ignore_utc_offset: false,
        }
    }

    #[test]
    fn test_add_list_remove() {
        let (registry, rx) = registry();

        registry.add(identity("beta"), Box::new(IdleBackend)).unwrap();
        registry.add(identity("alpha"), Box::new(IdleBackend)).unwrap();

        let names: Vec<String> = registry.list().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(registry.remove("alpha"));
        assert!(!registry.remove("alpha"));
        assert_eq!(registry.list().len(), 1);

        let invalidations = rx
            .try_iter()
            .filter(|e| matches!(e, ClientEvent::Invalidated { .. }))
            .count();
        assert_eq!(invalidations, 3);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (registry, _rx) = registry();
        registry.add(identity("rig"), Box::new(IdleBackend)).unwrap();
        assert!(registry.add(identity("rig"), Box::new(IdleBackend)).is_err());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_invalid_settings_leave_registry_untouched() {
        let (registry, _rx) = registry();

        let mut bad = identity("bad/name");
        assert!(registry.add(bad.clone(), Box::new(IdleBackend)).is_err());

        bad.name = String::new();
        assert!(registry.add(bad, Box::new(IdleBackend)).is_err());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_rename_rekeys_atomically() {
        let (registry, _rx) = registry();
        registry.add(identity("old"), Box::new(IdleBackend)).unwrap();

        registry.rename("old", "new").unwrap();
        assert!(registry.get("old").is_none());
        let renamed = registry.get("new").expect("renamed client");
        assert_eq!(renamed.identity().name, "new");
    }

    #[test]
    fn test_rename_onto_existing_name_fails() {
        let (registry, _rx) = registry();
        registry.add(identity("a"), Box::new(IdleBackend)).unwrap();
        registry.add(identity("b"), Box::new(IdleBackend)).unwrap();

        assert!(registry.rename("a", "b").is_err());
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_some());
    }
}
