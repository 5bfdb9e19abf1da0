// Runtime wiring: registry of monitored clients, per-client retrieval
// pipeline, and the periodic sweep that drives it. All cross-module
// collaborators arrive by injection; nothing in here is a global.

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod registry;
pub mod sweep;
pub mod transport;

pub use catalog::{ProteinCatalog, ProteinSource};
pub use config::{Config, resolve_data_path};
pub use coordinator::{
    ClientState, ConnectedBackend, FileBackend, PollArtifacts, RetrievalBackend,
    RetrievalCoordinator,
};
pub use events::ClientEvent;
pub use registry::{ClientHandle, ClientRegistry, RegistryServices};
pub use sweep::{SweepScheduler, sweep_once};
pub use transport::Transport;
