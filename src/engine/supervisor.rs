//! Lifecycle supervision for the external proxy engine process
//!
//! Owns the engine child process and drives it through an explicit state
//! machine: stopped -> starting -> running, with degraded as the bounded
//! restart path when the process dies underneath us.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::EngineSettings;
use crate::engine::EngineControl;
use crate::error::{PoolError, Result};
use crate::sources::RenderedConfig;

/// Engine process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Stopped,
    Starting,
    Running,
    /// Process died while supervised; restarts may still bring it back
    Degraded,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Stopped => "stopped",
            EngineStatus::Starting => "starting",
            EngineStatus::Running => "running",
            EngineStatus::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct EngineSupervisor {
    settings: EngineSettings,
    control: EngineControl,
    status_tx: watch::Sender<EngineStatus>,
    child: Mutex<Option<Child>>,
    /// Fingerprint of the configuration the running engine was started with
    fingerprint: parking_lot::RwLock<Option<String>>,
    config_path: parking_lot::RwLock<Option<PathBuf>>,
    restart_count: AtomicU32,
    shutting_down: AtomicBool,
    /// Serializes apply_config against concurrent reload attempts
    reload_lock: Mutex<()>,
    last_error: parking_lot::RwLock<Option<String>>,
}

impl EngineSupervisor {
    pub fn new(settings: EngineSettings) -> Result<Self> {
        let control = EngineControl::new(settings.api_base())?;
        let (status_tx, _) = watch::channel(EngineStatus::Stopped);
        Ok(Self {
            settings,
            control,
            status_tx,
            child: Mutex::new(None),
            fingerprint: parking_lot::RwLock::new(None),
            config_path: parking_lot::RwLock::new(None),
            restart_count: AtomicU32::new(0),
            shutting_down: AtomicBool::new(false),
            reload_lock: Mutex::new(()),
            last_error: parking_lot::RwLock::new(None),
        })
    }

    pub fn status(&self) -> EngineStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    pub fn control(&self) -> &EngineControl {
        &self.control
    }

    /// Fingerprint of the configuration currently loaded, if any
    pub fn fingerprint(&self) -> Option<String> {
        self.fingerprint.read().clone()
    }

    #[cfg(test)]
    pub(crate) fn set_fingerprint(&self, fingerprint: &str) {
        *self.fingerprint.write() = Some(fingerprint.to_string());
    }

    #[cfg(test)]
    fn set_config_path(&self, path: PathBuf) {
        *self.config_path.write() = Some(path);
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_status(&self, status: EngineStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            debug!(from = %previous, to = %status, "engine status changed");
        }
    }

    /// Write the configuration, spawn the engine and wait until its control
    /// API answers
    pub async fn start(&self, config: &RenderedConfig) -> Result<()> {
        if self.status() == EngineStatus::Running {
            return Ok(());
        }
        self.shutting_down.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Starting);

        let path = match self.write_config(config).await {
            Ok(path) => path,
            Err(e) => {
                self.set_status(EngineStatus::Stopped);
                return Err(e);
            }
        };

        if let Err(e) = self.spawn_and_wait(&path).await {
            self.set_status(EngineStatus::Stopped);
            *self.last_error.write() = Some(e.to_string());
            return Err(e);
        }

        *self.fingerprint.write() = Some(config.fingerprint.clone());
        *self.config_path.write() = Some(path);
        self.set_status(EngineStatus::Running);
        info!(port = self.settings.api_port, "engine running");
        Ok(())
    }

    async fn write_config(&self, config: &RenderedConfig) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.settings.config_dir).await?;
        let path = self.settings.config_dir.join("config.yaml");
        tokio::fs::write(&path, &config.document).await?;
        Ok(path)
    }

    async fn spawn_and_wait(&self, config_path: &PathBuf) -> Result<()> {
        let mut command = Command::new(&self.settings.binary);
        command
            .arg("-f")
            .arg(config_path)
            .arg("-d")
            .arg(&self.settings.config_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            PoolError::EngineStartup(format!(
                "failed to spawn {}: {e}",
                self.settings.binary.display()
            ))
        })?;
        *self.child.lock().await = Some(child);

        let deadline = Instant::now() + self.settings.startup_timeout();
        loop {
            if self.control.is_reachable().await {
                return Ok(());
            }

            // The process exiting during startup is a hard failure.
            let mut guard = self.child.lock().await;
            if let Some(child) = guard.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    *guard = None;
                    return Err(PoolError::EngineStartup(format!(
                        "engine exited during startup with {status}"
                    )));
                }
            }
            drop(guard);

            if Instant::now() >= deadline {
                self.kill_child().await;
                return Err(PoolError::EngineStartup(format!(
                    "control API not reachable within {}s",
                    self.settings.startup_timeout().as_secs()
                )));
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }

    /// Load a new configuration, preferring a hot reload over a full restart
    ///
    /// Returns `Ok(false)` when the fingerprint is unchanged and nothing was
    /// done.
    pub async fn apply_config(&self, config: &RenderedConfig) -> Result<bool> {
        let _guard = self.reload_lock.lock().await;

        if self.fingerprint().as_deref() == Some(config.fingerprint.as_str()) {
            debug!("configuration unchanged, skipping reload");
            return Ok(false);
        }

        let path = self.write_config(config).await?;

        if self.status() == EngineStatus::Running && self.control.reload(&path).await.is_ok() {
            *self.fingerprint.write() = Some(config.fingerprint.clone());
            *self.config_path.write() = Some(path);
            info!("configuration hot-reloaded");
            return Ok(true);
        }

        // Hot reload unavailable: restart on the new configuration.
        warn!("hot reload failed, restarting engine");
        self.stop_process().await;
        self.set_status(EngineStatus::Starting);
        match self.spawn_and_wait(&path).await {
            Ok(()) => {
                *self.fingerprint.write() = Some(config.fingerprint.clone());
                *self.config_path.write() = Some(path);
                self.set_status(EngineStatus::Running);
                Ok(true)
            }
            Err(e) => {
                self.set_status(EngineStatus::Stopped);
                *self.last_error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Watch the child and restart it, up to the configured budget, when it
    /// dies without being asked to stop
    pub async fn run_liveness_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.liveness_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.shutting_down.load(Ordering::SeqCst) {
                        continue;
                    }
                    if self.status() != EngineStatus::Running {
                        continue;
                    }
                    if self.child_alive().await {
                        continue;
                    }

                    warn!("engine process died");
                    self.set_status(EngineStatus::Degraded);
                    self.try_restart().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("liveness loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn child_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    warn!(%status, "engine exited");
                    *guard = None;
                    false
                }
                Err(e) => {
                    warn!(error = %e, "could not poll engine process");
                    false
                }
            },
            None => false,
        }
    }

    /// Restart after an unexpected exit
    ///
    /// The attempt budget is per crash incident; `restart_count` stays
    /// lifetime-cumulative for stats only.
    async fn try_restart(&self) {
        let path = match self.config_path.read().clone() {
            Some(path) => path,
            None => {
                *self.last_error.write() = Some("no configuration to restart with".to_string());
                return;
            }
        };

        let mut attempt = 0u32;
        while !self.shutting_down.load(Ordering::SeqCst) {
            attempt += 1;
            if attempt > self.settings.max_restarts {
                let err = PoolError::EngineCrash {
                    attempts: self.settings.max_restarts,
                };
                error!(%err, "restart budget exhausted");
                *self.last_error.write() = Some(err.to_string());
                return;
            }
            self.restart_count.fetch_add(1, Ordering::SeqCst);

            let backoff = self.settings.restart_backoff() * attempt;
            warn!(attempt, backoff_secs = backoff.as_secs(), "restarting engine");
            tokio::time::sleep(backoff).await;

            match self.spawn_and_wait(&path).await {
                Ok(()) => {
                    self.set_status(EngineStatus::Running);
                    info!(attempt, "engine restarted");
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "restart attempt failed");
                    *self.last_error.write() = Some(e.to_string());
                }
            }
        }
    }

    /// Stop the engine for good; terminal until the next `start`
    pub async fn stop(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.stop_process().await;
        self.set_status(EngineStatus::Stopped);
        info!("engine stopped");
    }

    async fn stop_process(&self) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

            match tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await {
                Ok(_) => return,
                Err(_) => warn!("engine ignored SIGTERM, killing"),
            }
        }

        if let Err(e) = child.kill().await {
            warn!(error = %e, "failed to kill engine process");
        }
    }

    async fn kill_child(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.kill().await;
        }
    }
}

impl std::fmt::Debug for EngineSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSupervisor")
            .field("status", &self.status())
            .field("restart_count", &self.restart_count())
            .finish()
    }
}
