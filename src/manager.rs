/// Public API for hosting objects from async code.
///
/// Every host lives on one dedicated apartment thread; the methods here post
/// commands to it and, where a result is needed, await the reply.
use std::sync::mpsc as std_mpsc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use axhost_core::{HostEvent, PersistedStateExt};
use axhost_domain::{
    ActivationLevel, HostConfig, HostId, PersistedState, PropertyValue, Rect, WindowHandle,
    WindowOwnership,
};
use tokio::sync::{mpsc, oneshot};

use crate::apartment_thread::{self, Command};
use crate::backend::Backend;
use crate::config::ManagerConfig;

/// A host event tagged with the host that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerEvent {
    pub host_id: HostId,
    pub event: HostEvent,
}

/// What to build when creating a host.
#[derive(Debug, Clone)]
pub struct CreateHostRequest {
    pub parent: WindowHandle,
    pub bounds: Rect,
    pub config: HostConfig,
    /// Previously captured state to load into the object.
    pub state: Option<PersistedState>,
    /// Level to bring the object to once created.
    pub activate: ActivationLevel,
}

impl CreateHostRequest {
    pub fn new(parent: WindowHandle, class_id: impl Into<String>) -> Self {
        Self {
            parent,
            bounds: Rect::new(0, 0, 75, 23),
            config: HostConfig {
                class_id: Some(class_id.into()),
                ..HostConfig::default()
            },
            state: None,
            activate: ActivationLevel::InPlace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostStatus {
    pub level: ActivationLevel,
    pub ownership: WindowOwnership,
    pub handle: Option<WindowHandle>,
    pub bounds: Rect,
    pub dirty: bool,
}

/// Owns the apartment thread. Dropping the manager shuts it down and
/// closes every remaining host.
pub struct AxHostManager {
    cmd_tx: std_mpsc::Sender<Command>,
}

impl AxHostManager {
    /// Spawns the apartment thread and builds its backend there.
    pub fn spawn<B, F>(config: &ManagerConfig, make_backend: F) -> Result<Self>
    where
        B: Backend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);
        let poll_interval = config.poll_interval();

        thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || match make_backend() {
                Ok(backend) => {
                    let _ = ready_tx.send(Ok(()));
                    apartment_thread::run(backend, poll_interval, cmd_rx);
                }
                Err(e) => {
                    tracing::error!(error = %e, "apartment backend failed to start");
                    let _ = ready_tx.send(Err(format!("{e:#}")));
                }
            })
            .context("failed to spawn apartment thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("apartment thread exited during startup"))?
            .map_err(|e| anyhow!("{e}"))?;

        tracing::info!(thread = %config.thread_name, "apartment thread started");
        Ok(Self { cmd_tx })
    }

    /// Spawns the apartment thread on the platform's OLE implementation.
    pub fn native(config: &ManagerConfig) -> Result<Self> {
        #[cfg(windows)]
        {
            Self::spawn(config, crate::backend::ComBackend::new)
        }
        #[cfg(not(windows))]
        {
            let _ = config;
            axhost_com::OleApartment::new()?;
            anyhow::bail!("no native backend for this platform")
        }
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("apartment thread is not running"))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, String>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(build(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("apartment thread dropped reply channel"))?
            .map_err(|e| anyhow!("{e}"))
    }

    /// Creates a host, loads any given state and activates the object.
    pub async fn create_host(
        &self,
        request: CreateHostRequest,
        events: mpsc::UnboundedSender<ManagerEvent>,
    ) -> Result<HostId> {
        self.request(|reply| Command::CreateHost {
            parent: request.parent,
            bounds: request.bounds,
            config: request.config,
            state: request.state,
            activate: request.activate,
            events,
            reply,
        })
        .await
    }

    pub async fn transition(&self, host_id: HostId, level: ActivationLevel) -> Result<()> {
        self.request(|reply| Command::Transition {
            host_id,
            level,
            reply,
        })
        .await
    }

    pub fn set_bounds(&self, host_id: HostId, bounds: Rect) -> Result<()> {
        self.send(Command::SetBounds { host_id, bounds })
    }

    pub fn show(&self, host_id: HostId) -> Result<()> {
        self.send(Command::SetVisible {
            host_id,
            visible: true,
        })
    }

    pub fn hide(&self, host_id: HostId) -> Result<()> {
        self.send(Command::SetVisible {
            host_id,
            visible: false,
        })
    }

    /// Current persisted state of the object, `None` when nothing can be
    /// captured yet.
    pub async fn snapshot(&self, host_id: HostId) -> Result<Option<PersistedState>> {
        self.request(|reply| Command::Snapshot { host_id, reply })
            .await
    }

    /// [`snapshot`](Self::snapshot) in its base64 text form.
    pub async fn snapshot_text(&self, host_id: HostId) -> Result<Option<String>> {
        self.snapshot(host_id)
            .await?
            .map(|state| state.to_base64())
            .transpose()
            .context("snapshot does not fit the text form")
    }

    pub async fn restore(&self, host_id: HostId, state: PersistedState) -> Result<()> {
        self.request(|reply| Command::Restore {
            host_id,
            state,
            reply,
        })
        .await
    }

    pub async fn restore_text(&self, host_id: HostId, text: &str) -> Result<()> {
        let state = PersistedState::from_base64(text).context("malformed snapshot text")?;
        self.restore(host_id, state).await
    }

    pub async fn property(&self, host_id: HostId, name: &str) -> Result<Option<PropertyValue>> {
        self.request(|reply| Command::GetProperty {
            host_id,
            name: name.to_string(),
            reply,
        })
        .await
    }

    /// Returns whether the object accepted the value.
    pub async fn set_property(
        &self,
        host_id: HostId,
        name: &str,
        value: PropertyValue,
    ) -> Result<bool> {
        self.request(|reply| Command::SetProperty {
            host_id,
            name: name.to_string(),
            value,
            reply,
        })
        .await
    }

    pub async fn status(&self, host_id: HostId) -> Result<HostStatus> {
        self.request(|reply| Command::Status { host_id, reply })
            .await
    }

    pub async fn close_host(&self, host_id: HostId) -> Result<()> {
        self.request(|reply| Command::CloseHost { host_id, reply })
            .await
    }
}

impl Drop for AxHostManager {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}
