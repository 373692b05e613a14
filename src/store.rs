use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::state::WatchState;

/// Quiet period between flush checks; mutation bursts inside one interval
/// coalesce into a single write.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

fn load_state(path: &Path) -> WatchState {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(state) => {
                info!("loaded state from {}", path.display());
                state
            }
            Err(e) => {
                warn!("corrupt state file {}: {e}, starting empty", path.display());
                WatchState::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no state file at {}, starting empty", path.display());
            WatchState::default()
        }
        Err(e) => {
            warn!("cannot read state file {}: {e}, starting empty", path.display());
            WatchState::default()
        }
    }
}

fn write_state(path: &Path, state: &WatchState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("failed to serialize state")?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

/// Owner of the process-wide state plus its on-disk mirror.
///
/// Mutations go through [`mutate`](Self::mutate), which marks the store
/// dirty; a flusher ticking at [`FLUSH_INTERVAL`] writes at most once per
/// quiet period. A write failure is logged and the process keeps running
/// on in-memory state.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<WatchState>,
    dirty: AtomicBool,
}

impl StateStore {
    /// Load from `path`, falling back to an empty default on a missing or
    /// corrupt file.
    pub fn open(path: PathBuf) -> Self {
        let state = load_state(&path);
        Self {
            path,
            state: Mutex::new(state),
            dirty: AtomicBool::new(false),
        }
    }

    /// Read-only access.
    pub async fn with<R>(&self, f: impl FnOnce(&WatchState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Mutate and schedule a flush.
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut WatchState) -> R) -> R {
        let mut state = self.state.lock().await;
        let result = f(&mut state);
        self.dirty.store(true, Ordering::Release);
        result
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Write if anything changed since the last flush.
    pub async fn flush_if_dirty(&self) {
        if self.dirty.swap(false, Ordering::AcqRel) {
            let state = self.state.lock().await;
            if let Err(e) = write_state(&self.path, &state) {
                warn!("state flush failed: {e:#}");
            }
        }
    }

    /// Unconditional write, used on shutdown.
    pub async fn flush(&self) -> Result<()> {
        self.dirty.store(false, Ordering::Release);
        let state = self.state.lock().await;
        write_state(&self.path, &state)
    }
}
