/// Notifications fanned out on the runtime event channel.
///
/// Consumers hold the receiving end of an mpsc channel; there is no
/// subscription registry and no callback re-entry into the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// One client finished a poll; its slot state is fresh.
    RetrievalFinished { client: String },
    /// The set of work units on a client changed, not just their progress.
    SlotsChanged { client: String },
    /// Cached per-client data is stale; `None` means all clients.
    Invalidated { client: Option<String> },
}
