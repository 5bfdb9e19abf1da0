use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use foldwatch_engine::{
    AggregationContext, BenchmarkKey, BenchmarkTracker, SlotUnits, aggregate, determine,
};
use foldwatch_history::HistoryDatabase;
use foldwatch_logs::{classify_text, partition_runs};
use foldwatch_types::{
    ClientIdentity, ClientMessage, QueueSnapshot, SlotKind, SlotStatus, StatusSnapshot,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::catalog::ProteinCatalog;
use crate::events::ClientEvent;
use crate::transport::Transport;

/// Everything one poll needs, fetched as a unit. A backend either produces
/// all of it or the poll is abandoned with prior state intact.
#[derive(Debug, Clone, Default)]
pub struct PollArtifacts {
    pub log_text: String,
    pub queue: QueueSnapshot,
    /// Status as reported by the client itself, before heuristics.
    pub reported_status: SlotStatus,
    pub slot_kind: SlotKind,
    /// Client machine's UTC offset, applied to log time-of-day values.
    pub utc_offset_secs: i64,
    /// Set when the backend saw a slot-composition signal since last fetch.
    pub slots_changed: bool,
}

pub trait RetrievalBackend: Send {
    fn fetch(&mut self) -> Result<PollArtifacts>;

    /// Drop any held connection. Called on abort; the next fetch reconnects.
    fn close(&mut self) {}
}

/// Result of the last completed poll for one client.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub slots: SlotUnits,
    pub status: SlotStatus,
}

/// Drives the poll pipeline for one client: fetch, aggregate, benchmark,
/// status, archive, notify.
///
/// `retrieve` is single-flight: a poll that finds another in progress
/// returns immediately instead of queueing. Failures never clobber the
/// previous poll's state.
pub struct RetrievalCoordinator {
    identity: Mutex<ClientIdentity>,
    backend: Mutex<Box<dyn RetrievalBackend>>,
    tracker: Arc<BenchmarkTracker>,
    history: Arc<HistoryDatabase>,
    catalog: Arc<ProteinCatalog>,
    events: Sender<ClientEvent>,
    allow_running_async: bool,
    in_progress: AtomicBool,
    abort: AtomicBool,
    state: Mutex<Option<ClientState>>,
}

struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RetrievalCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: ClientIdentity,
        backend: Box<dyn RetrievalBackend>,
        tracker: Arc<BenchmarkTracker>,
        history: Arc<HistoryDatabase>,
        catalog: Arc<ProteinCatalog>,
        events: Sender<ClientEvent>,
        allow_running_async: bool,
    ) -> Self {
        Self {
            identity: Mutex::new(identity),
            backend: Mutex::new(backend),
            tracker,
            history,
            catalog,
            events,
            allow_running_async,
            in_progress: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            state: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> ClientIdentity {
        self.identity
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub(crate) fn set_identity(&self, identity: ClientIdentity) {
        *self.identity.lock().unwrap_or_else(|err| err.into_inner()) = identity;
    }

    pub fn state(&self) -> Option<ClientState> {
        self.state
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Request that a poll in progress stop at its next safe point, and drop
    /// the backend's connection. When a fetch holds the backend the close is
    /// deferred to the poll's next abort check instead of blocking here.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Release);
        match self.backend.try_lock() {
            Ok(mut backend) => backend.close(),
            Err(std::sync::TryLockError::Poisoned(err)) => err.into_inner().close(),
            Err(std::sync::TryLockError::WouldBlock) => {}
        }
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    fn close_backend(&self) {
        self.backend
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .close();
    }

    /// Run one poll. Returns immediately when one is already in progress.
    /// Errors are logged here, not propagated; the retrieval boundary is
    /// where the runtime absorbs per-client failures.
    pub fn retrieve(&self) {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(client = %self.identity().name, "retrieval already in progress");
            return;
        }
        let _guard = InProgressGuard(&self.in_progress);
        self.abort.store(false, Ordering::Release);

        if let Err(err) = self.poll() {
            warn!(
                client = %self.identity().name,
                error = %err,
                "retrieval failed; keeping previous state"
            );
        }
    }

    fn poll(&self) -> Result<()> {
        let identity = self.identity();
        let artifacts = {
            let mut backend = self.backend.lock().unwrap_or_else(|err| err.into_inner());
            backend.fetch().context("fetching poll artifacts")?
        };
        if self.aborted() {
            debug!(client = %identity.name, "retrieval aborted after fetch");
            self.close_backend();
            return Ok(());
        }

        let capture_time = Utc::now();
        let runs = partition_runs(classify_text(&artifacts.log_text));
        let Some(run) = runs.last() else {
            debug!(client = %identity.name, "log is empty; nothing to aggregate");
            return Ok(());
        };

        let ctx = AggregationContext {
            client_name: identity.name.clone(),
            client_path: identity.path_string(),
            capture_time,
        };
        let slots = aggregate(run, &artifacts.queue, &ctx);
        for warning in &slots.warnings {
            warn!(client = %identity.name, "{warning}");
        }
        if self.aborted() {
            debug!(client = %identity.name, "retrieval aborted after aggregation");
            self.close_backend();
            return Ok(());
        }

        let previous = self.state();
        self.update_benchmarks(&slots, previous.as_ref());
        let status = self.determine_status(&slots, &artifacts, &identity, capture_time);
        self.archive_terminal_units(&slots);

        let composition_changed = match &previous {
            Some(prev) => slots.composition_differs(&prev.slots),
            None => !slots.units.is_empty(),
        };

        *self.state.lock().unwrap_or_else(|err| err.into_inner()) =
            Some(ClientState { slots, status });

        if artifacts.slots_changed || composition_changed {
            let _ = self.events.send(ClientEvent::SlotsChanged {
                client: identity.name.clone(),
            });
        }
        let _ = self.events.send(ClientEvent::RetrievalFinished {
            client: identity.name,
        });
        Ok(())
    }

    fn update_benchmarks(&self, slots: &SlotUnits, previous: Option<&ClientState>) {
        for (index, unit) in &slots.units {
            let previous_count = previous
                .and_then(|prev| prev.slots.units.get(index))
                .filter(|prev_unit| prev_unit.same_unit(unit))
                .map(|prev_unit| prev_unit.frames_completed())
                .unwrap_or(0);

            let durations: Vec<i64> = unit
                .frames
                .values()
                .filter_map(|f| f.duration.map(|d| d.num_seconds()))
                .collect();

            self.tracker.record_frames(
                BenchmarkKey::for_unit(unit),
                previous_count,
                unit.frames_completed(),
                &durations,
            );
        }
    }

    fn determine_status(
        &self,
        slots: &SlotUnits,
        artifacts: &PollArtifacts,
        identity: &ClientIdentity,
        capture_time: chrono::DateTime<Utc>,
    ) -> SlotStatus {
        let mut snapshot = StatusSnapshot::new(capture_time, artifacts.slot_kind);
        snapshot.reported_status = artifacts.reported_status;
        snapshot.clock_offset_minutes = identity.clock_offset_minutes;
        snapshot.ignore_utc_offset = identity.ignore_utc_offset;
        snapshot.utc_offset_secs = artifacts.utc_offset_secs;
        snapshot.allow_running_async = self.allow_running_async;

        if let Some(unit) = slots.current_unit() {
            snapshot.unit_start_time = unit.unit_start;
            snapshot.last_frame_time = unit.last_frame().map(|f| f.timestamp);
            snapshot.last_progress_time = snapshot.last_frame_time.or(unit.unit_start);
            snapshot.frame_time_secs = unit.frame_time_secs();
            snapshot.benchmark_average_secs = self
                .tracker
                .benchmark(unit)
                .and_then(|record| record.average_secs());
        }

        let status = determine(&snapshot);
        if status == SlotStatus::Unknown {
            error!(client = %identity.name, "slot status could not be determined");
        }
        status
    }

    fn archive_terminal_units(&self, slots: &SlotUnits) {
        for unit in slots.units.values() {
            if !unit.result.is_terminal() {
                continue;
            }
            let protein = self.catalog.get(unit.project.project);
            match self.history.insert(unit, protein.as_ref()) {
                Ok(true) => {
                    info!(client = %unit.client_name, project = %unit.project, "work unit archived");
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        client = %unit.client_name,
                        project = %unit.project,
                        error = %err,
                        "history insert failed"
                    );
                }
            }
        }
    }
}

/// Backend for a client reachable over its control connection.
///
/// Connects lazily: a failed connect surfaces as a poll error and the next
/// poll retries. Between polls the transport pushes incremental updates
/// which are drained and folded into the running log/queue picture.
pub struct ConnectedBackend {
    host: String,
    port: u16,
    password: Option<String>,
    transport: Box<dyn Transport>,
    slot_kind: SlotKind,
    utc_offset_secs: i64,
    log_text: String,
    queue: QueueSnapshot,
    slots_changed: bool,
}

impl ConnectedBackend {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: Option<String>,
        transport: Box<dyn Transport>,
        slot_kind: SlotKind,
        utc_offset_secs: i64,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            password,
            transport,
            slot_kind,
            utc_offset_secs,
            log_text: String::new(),
            queue: QueueSnapshot::default(),
            slots_changed: false,
        }
    }

    fn drain(&mut self) {
        loop {
            let message = match self.transport.messages().try_recv() {
                Ok(message) => message,
                Err(_) => break,
            };
            match message {
                ClientMessage::LogRestart { text } => self.log_text = text,
                ClientMessage::LogUpdate { text } => self.log_text.push_str(&text),
                ClientMessage::QueueUpdate { queue } => self.queue = queue,
                ClientMessage::SlotList => self.slots_changed = true,
                ClientMessage::Options => {}
                ClientMessage::ConnectedChanged { connected } => {
                    self.slots_changed = true;
                    if !connected {
                        self.transport.close();
                    }
                }
            }
        }
    }
}

impl RetrievalBackend for ConnectedBackend {
    fn fetch(&mut self) -> Result<PollArtifacts> {
        if !self.transport.is_connected() {
            self.transport
                .connect(&self.host, self.port, self.password.as_deref())
                .with_context(|| format!("connecting to {}:{}", self.host, self.port))?;
            self.transport
                .send_command("updates")
                .context("requesting update stream")?;
        }
        self.drain();

        // The control connection reports no health beyond the queue itself;
        // a running entry engages the timing heuristics downstream.
        let reported_status = if self.queue.running_index().is_some() {
            SlotStatus::Running
        } else {
            SlotStatus::Unknown
        };

        Ok(PollArtifacts {
            log_text: self.log_text.clone(),
            queue: self.queue.clone(),
            reported_status,
            slot_kind: self.slot_kind,
            utc_offset_secs: self.utc_offset_secs,
            slots_changed: std::mem::take(&mut self.slots_changed),
        })
    }

    fn close(&mut self) {
        self.transport.close();
    }
}

/// Backend for a client observed through its on-disk artifacts: the log
/// file, a queue snapshot, and an optional status sidecar.
pub struct FileBackend {
    log_path: PathBuf,
    queue_path: PathBuf,
    status_path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct StatusFile {
    #[serde(default)]
    reported_status: SlotStatus,
    #[serde(default)]
    slot_kind: SlotKind,
    #[serde(default)]
    utc_offset_secs: i64,
}

impl FileBackend {
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        let root = log_root.into();
        Self {
            log_path: root.join("log.txt"),
            queue_path: root.join("queue.json"),
            status_path: root.join("status.json"),
        }
    }
}

impl RetrievalBackend for FileBackend {
    fn fetch(&mut self) -> Result<PollArtifacts> {
        let log_text = std::fs::read_to_string(&self.log_path)
            .with_context(|| format!("reading log {}", self.log_path.display()))?;

        let queue_text = std::fs::read_to_string(&self.queue_path)
            .with_context(|| format!("reading queue snapshot {}", self.queue_path.display()))?;
        let queue: QueueSnapshot =
            serde_json::from_str(&queue_text).context("parsing queue snapshot")?;

        let status = if self.status_path.exists() {
            let status_text = std::fs::read_to_string(&self.status_path)
                .with_context(|| format!("reading status file {}", self.status_path.display()))?;
            serde_json::from_str(&status_text).context("parsing status file")?
        } else {
            StatusFile::default()
        };

        Ok(PollArtifacts {
            log_text,
            queue,
            reported_status: status.reported_status,
            slot_kind: status.slot_kind,
            utc_offset_secs: status.utc_offset_secs,
            slots_changed: false,
        })
    }
}
