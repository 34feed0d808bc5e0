//! The process-wide coordinator.
//!
//! [`Liric`] owns the settings, the command registry and the shared status. It also owns the
//! two signals that end the process: closing the server (the accept loop stops taking
//! connections) and the exit code channel the binary waits on.
use crate::config::Settings;
use crate::error::{AppResult, LiricError};
use crate::network::session::ConnectionClosed;
use crate::registry::CommandRegistry;
use crate::status::LiricStatus;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// The coordinator: current settings, handler table, shared status and server shutdown.
pub struct Liric {
    config_path: Option<PathBuf>,
    settings: RwLock<Arc<Settings>>,
    registry: RwLock<Arc<CommandRegistry>>,
    status: Arc<LiricStatus>,
    shutdown: watch::Sender<bool>,
    exit_tx: mpsc::UnboundedSender<i32>,
}

impl Liric {
    /// Builds the coordinator and the receiver that yields the process exit code.
    ///
    /// `config_path` is where REDATUM reloads settings from; `None` disables reloading.
    pub fn new(
        settings: Settings,
        config_path: Option<PathBuf>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<i32>) {
        let registry = CommandRegistry::from_settings(&settings);
        let (shutdown, _) = watch::channel(false);
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let liric = Arc::new(Self {
            config_path,
            settings: RwLock::new(Arc::new(settings)),
            registry: RwLock::new(Arc::new(registry)),
            status: Arc::new(LiricStatus::new()),
            shutdown,
            exit_tx,
        });
        (liric, exit_rx)
    }

    /// Loads settings from `path` and builds the coordinator around them.
    pub fn load(path: &Path) -> AppResult<(Arc<Self>, mpsc::UnboundedReceiver<i32>)> {
        let settings = Settings::load(path)?;
        Ok(Self::new(settings, Some(path.to_path_buf())))
    }

    /// Current settings. Commands keep the snapshot they started with.
    pub fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current handler table. Replaced wholesale by [`Liric::reinit`].
    pub fn registry(&self) -> Arc<CommandRegistry> {
        Arc::clone(&self.registry.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Process status shared by every connection.
    pub fn status(&self) -> &Arc<LiricStatus> {
        &self.status
    }

    /// Reloads settings and rebuilds the registry. On failure the previous settings stay.
    pub async fn reinit(&self) -> AppResult<()> {
        let path = self.config_path.clone().ok_or_else(|| {
            LiricError::Configuration("no configuration file to reload from".to_string())
        })?;
        let reloaded = tokio::task::spawn_blocking({
            let path = path.clone();
            move || Settings::load(&path)
        })
        .await
        .map_err(|e| LiricError::Configuration(format!("settings reload did not finish: {e}")))?;
        let settings = match reloaded {
            Ok(settings) => settings,
            Err(e) => {
                error!(path = %path.display(), "Reinitialisation failed, keeping settings: {e}");
                return Err(e);
            }
        };

        let registry = CommandRegistry::from_settings(&settings);
        *self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(registry);
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
        info!(path = %path.display(), "Settings reloaded");
        Ok(())
    }

    /// Stops the server accepting new connections. Connections in progress finish normally.
    pub fn close_server(&self) {
        info!("Closing command server");
        self.shutdown.send_replace(true);
    }

    /// Turns true once [`Liric::close_server`] has been called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Whether the server has been asked to stop accepting.
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Exits with `code` once `connection` has sent its completion and closed.
    pub fn quit_after(&self, connection: ConnectionClosed, code: i32) {
        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            connection.wait().await;
            info!(code, "Connection closed, exiting");
            if exit_tx.send(code).is_err() {
                warn!(code, "Nobody is waiting for the exit code");
            }
        });
    }
}
