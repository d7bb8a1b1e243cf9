//! Hot-reloaded policy snapshots.
//!
//! [`ReloadManager`] owns the published [`PolicySet`]. Readers load the
//! current snapshot through an `ArcSwap` and never block; a reload builds
//! the next snapshot off to the side and swaps the pointer only once the
//! build has succeeded. A failed reload leaves the old snapshot in place.
//!
//! # Example
//!
//! ```ignore
//! use exitlist::{FileSource, Loader, ReloadManager};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(ReloadManager::start(
//!     Loader::default(),
//!     Box::new(FileSource::new("data/exit-policies")),
//! )?);
//! let handle = manager.spawn_worker()?;
//!
//! // On every reload event
//! handle.trigger();
//!
//! // Hot path
//! let fingerprint = manager.current().is_tor("1.2.3.4").map(str::to_string);
//! ```

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};
use crate::loader::{LoadMode, Loader};
use crate::policyset::PolicySet;
use crate::source::{FeedFetch, FeedSource};

/// Where the manager is in its reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReloadState {
    /// Serving; no reload running
    Idle = 0,
    /// Fetching and building the next snapshot
    Loading = 1,
    /// New snapshot swapped in, cycle finishing
    Published = 2,
}

impl ReloadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReloadState::Loading,
            2 => ReloadState::Published,
            _ => ReloadState::Idle,
        }
    }
}

/// ReloadManager publishes policy snapshots to concurrent readers.
pub struct ReloadManager {
    /// The published snapshot, wrapped in ArcSwap for atomic replacement.
    current: ArcSwap<PolicySet>,
    loader: Loader,
    /// Feed source; the lock also makes reloads single-writer.
    source: Mutex<Box<dyn FeedSource>>,
    state: AtomicU8,
    /// Number of snapshots published after the initial one.
    generation: AtomicU64,
}

impl ReloadManager {
    /// Perform the initial load synchronously and start serving it.
    ///
    /// Unlike later reloads, a failure here is returned to the caller:
    /// there is no previous snapshot to fall back to.
    pub fn start(loader: Loader, mut source: Box<dyn FeedSource>) -> Result<Self> {
        let data = match source.fetch()? {
            FeedFetch::Data(data) => data,
            FeedFetch::NotModified => return Err(Error::NotInitialized),
        };
        let set = loader.load(&data[..], LoadMode::Full)?;
        log::info!("Loaded {} relays from {}", set.len(), source.describe());
        Ok(Self::with_snapshot(set, loader, source))
    }

    /// Start serving an already-built snapshot.
    pub fn with_snapshot(set: PolicySet, loader: Loader, source: Box<dyn FeedSource>) -> Self {
        Self {
            current: ArcSwap::from_pointee(set),
            loader,
            source: Mutex::new(source),
            state: AtomicU8::new(ReloadState::Idle as u8),
            generation: AtomicU64::new(0),
        }
    }

    /// Borrow the current snapshot for a short read.
    pub fn current(&self) -> Guard<Arc<PolicySet>> {
        self.current.load()
    }

    /// Take an owned reference to the current snapshot.
    pub fn snapshot(&self) -> Arc<PolicySet> {
        self.current.load_full()
    }

    pub fn state(&self) -> ReloadState {
        ReloadState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Run one incremental reload cycle.
    ///
    /// Returns `Ok(true)` when a new snapshot was published and `Ok(false)`
    /// when the source reported no change. On error the previous snapshot
    /// stays published.
    pub fn reload(&self) -> Result<bool> {
        self.run_cycle(true)
    }

    /// Run one reload cycle that discards all carried-forward state.
    pub fn reload_full(&self) -> Result<bool> {
        self.run_cycle(false)
    }

    fn run_cycle(&self, incremental: bool) -> Result<bool> {
        let mut source = self.source.lock();
        self.set_state(ReloadState::Loading);

        let result = self.build_next(source.as_mut(), incremental);
        let outcome = match result {
            Ok(Some(set)) => {
                let relays = set.len();
                self.current.store(Arc::new(set));
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                self.set_state(ReloadState::Published);
                log::info!(
                    "Exit list reloaded from {}: {} relays (generation {})",
                    source.describe(),
                    relays,
                    generation
                );
                Ok(true)
            }
            Ok(None) => {
                log::warn!("Feed {} not modified, skipping cycle", source.describe());
                Ok(false)
            }
            Err(e) => {
                log::error!(
                    "Reload from {} failed, keeping generation {}: {}",
                    source.describe(),
                    self.generation(),
                    e
                );
                Err(e)
            }
        };

        self.set_state(ReloadState::Idle);
        outcome
    }

    fn build_next(
        &self,
        source: &mut dyn FeedSource,
        incremental: bool,
    ) -> Result<Option<PolicySet>> {
        let data = match source.fetch()? {
            FeedFetch::Data(data) => data,
            FeedFetch::NotModified => return Ok(None),
        };

        let previous = self.current.load_full();
        let mode = if incremental {
            LoadMode::Incremental(previous.as_ref())
        } else {
            LoadMode::Full
        };
        self.loader.load(&data[..], mode).map(Some)
    }

    fn set_state(&self, state: ReloadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Start a background thread that runs one reload per trigger.
    ///
    /// Triggers arriving while a reload is queued are coalesced into it.
    pub fn spawn_worker(self: &Arc<Self>) -> Result<ReloadHandle> {
        let (tx, rx) = mpsc::sync_channel::<()>(1);
        let manager = Arc::clone(self);

        let worker = thread::Builder::new()
            .name("exitlist-reload".to_string())
            .spawn(move || {
                while rx.recv().is_ok() {
                    // Failures are logged by the cycle and the old snapshot stays.
                    let _ = manager.reload();
                }
                log::debug!("Reload worker stopped");
            })?;

        Ok(ReloadHandle {
            trigger: Some(tx),
            worker: Some(worker),
        })
    }
}

/// ReloadHandle requests reloads from a worker started by
/// [`ReloadManager::spawn_worker`].
pub struct ReloadHandle {
    trigger: Option<SyncSender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ReloadHandle {
    /// Ask for a reload. Returns `false` once the worker is gone.
    pub fn trigger(&self) -> bool {
        match self.trigger.as_ref().map(|tx| tx.try_send(())) {
            Some(Ok(())) | Some(Err(TrySendError::Full(()))) => true,
            Some(Err(TrySendError::Disconnected(()))) | None => false,
        }
    }

    /// Stop the worker after any queued reload finishes.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.trigger.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Reload worker panicked");
            }
        }
    }
}

impl Drop for ReloadHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
