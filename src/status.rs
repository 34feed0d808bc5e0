//! Process-wide instrument status shared by every connection.

use crate::abort::AbortFlag;
use crate::error::{AppResult, LiricError};
use crate::network::protocol::CommandKind;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// The non-interrupt command currently executing, if any.
#[derive(Debug, Clone)]
pub struct ActiveCommand {
    /// Client-supplied command id.
    pub id: String,
    /// Command type.
    pub kind: CommandKind,
    /// When the command was dispatched.
    pub started: DateTime<Utc>,
    abort: AbortFlag,
    token: u64,
}

impl ActiveCommand {
    /// Asks the owning connection to stop at its next checkpoint.
    pub fn request_abort(&self) {
        self.abort.request();
    }
}

/// Current command, config id and last CONFIG details.
#[derive(Debug, Default)]
pub struct LiricStatus {
    current: Mutex<Option<ActiveCommand>>,
    next_token: AtomicU64,
    config_id: AtomicU64,
    config_name: Mutex<Option<String>>,
    coadd_exposure_length: AtomicU32,
}

impl LiricStatus {
    /// No current command and a zero config id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a command as current until the returned guard drops.
    pub fn begin_command(
        self: &Arc<Self>,
        id: &str,
        kind: CommandKind,
        abort: AbortFlag,
    ) -> CurrentCommandGuard {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let active = ActiveCommand {
            id: id.to_string(),
            kind,
            started: Utc::now(),
            abort,
            token,
        };
        if let Some(previous) = lock(&self.current).replace(active) {
            warn!(
                previous_id = %previous.id,
                previous = %previous.kind,
                "Replacing current command that is still running"
            );
        }
        debug!(id, command = %kind, "Current command set");
        CurrentCommandGuard {
            status: Arc::clone(self),
            token,
        }
    }

    /// Snapshot of the current command slot.
    pub fn current_command(&self) -> Option<ActiveCommand> {
        lock(&self.current).clone()
    }

    /// Value of the config id counter as of the last CONFIG.
    pub fn config_id(&self) -> u64 {
        self.config_id.load(Ordering::SeqCst)
    }

    /// Bumps the CONFIG counter, persisting it to `file` when one is configured.
    pub async fn increment_config_id(&self, file: Option<&Path>) -> AppResult<u64> {
        let Some(path) = file else {
            return Ok(self.config_id.fetch_add(1, Ordering::SeqCst) + 1);
        };
        let current = match tokio::fs::read_to_string(path).await {
            Ok(text) => text.trim().parse::<u64>().map_err(|e| {
                LiricError::Configuration(format!(
                    "config id file {} holds '{}': {e}",
                    path.display(),
                    text.trim()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let next = current + 1;
        tokio::fs::write(path, format!("{next}\n")).await?;
        self.config_id.store(next, Ordering::SeqCst);
        Ok(next)
    }

    /// Name of the last applied configuration.
    pub fn config_name(&self) -> Option<String> {
        lock(&self.config_name).clone()
    }

    /// Records the configuration just applied.
    pub fn set_config_name(&self, name: &str) {
        *lock(&self.config_name) = Some(name.to_string());
    }

    /// Coadd exposure length in ms set by the last CONFIG, or 0 if none has run.
    pub fn coadd_exposure_length(&self) -> u32 {
        self.coadd_exposure_length.load(Ordering::SeqCst)
    }

    /// Records the coadd length just configured.
    pub fn set_coadd_exposure_length(&self, length_ms: u32) {
        self.coadd_exposure_length.store(length_ms, Ordering::SeqCst);
    }
}

/// Clears the current command slot on drop, unless another command has since replaced it.
#[must_use]
#[derive(Debug)]
pub struct CurrentCommandGuard {
    status: Arc<LiricStatus>,
    token: u64,
}

impl Drop for CurrentCommandGuard {
    fn drop(&mut self) {
        let mut slot = lock(&self.status.current);
        if slot.as_ref().is_some_and(|active| active.token == self.token) {
            *slot = None;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
