use std::collections::VecDeque;
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::registry::ClientRegistry;

enum SweepCommand {
    SweepNow,
    Shutdown,
}

/// Periodic full-sweep driver.
///
/// One dedicated scheduler thread ticks on `recv_timeout`; each sweep fans
/// the registered clients out over a bounded pool of worker threads. A
/// client whose previous poll is still running is skipped by the
/// coordinator's single-flight check, so a slow client never stalls a sweep
/// and never accumulates queued polls.
pub struct SweepScheduler {
    tx: Sender<SweepCommand>,
    handle: Option<JoinHandle<()>>,
}

impl SweepScheduler {
    pub fn start(registry: Arc<ClientRegistry>, interval: Duration, workers: usize) -> Result<Self> {
        let (tx, rx) = channel();

        let handle = std::thread::Builder::new()
            .name("sweep-scheduler".to_string())
            .spawn(move || {
                loop {
                    match rx.recv_timeout(interval) {
                        Ok(SweepCommand::SweepNow) | Err(RecvTimeoutError::Timeout) => {
                            sweep_once(&registry, workers);
                        }
                        Ok(SweepCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Queue an immediate sweep ahead of the next tick.
    pub fn sweep_now(&self) {
        let _ = self.tx.send(SweepCommand::SweepNow);
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(SweepCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Poll every registered client once, at most `workers` in parallel.
pub fn sweep_once(registry: &ClientRegistry, workers: usize) {
    let handles = registry.handles();
    if handles.is_empty() {
        return;
    }

    let total = handles.len();
    let worker_count = workers.clamp(1, total);
    let queue = Mutex::new(VecDeque::from(handles));

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| {
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(|err| err.into_inner())
                        .pop_front();
                    let Some(handle) = next else { break };
                    handle.coordinator.retrieve();
                }
            });
        }
    });

    debug!(clients = total, workers = worker_count, "sweep finished");
}
