//! The dedicated apartment thread.
//!
//! Owns every host and its backend. Work arrives as [`Command`]s from the
//! async side; between commands the thread pumps window messages so the
//! hosted objects stay responsive.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use anyhow::Result;
use axhost_com::PumpStatus;
use axhost_core::AxHost;
use axhost_domain::{
    ActivationLevel, HostConfig, HostId, PersistedState, PropertyValue, Rect, WindowHandle,
};
use tokio::sync::{mpsc, oneshot};

use crate::backend::Backend;
use crate::manager::{HostStatus, ManagerEvent};

type Reply<T> = oneshot::Sender<Result<T, String>>;

pub enum Command {
    CreateHost {
        parent: WindowHandle,
        bounds: Rect,
        config: HostConfig,
        state: Option<PersistedState>,
        activate: ActivationLevel,
        events: mpsc::UnboundedSender<ManagerEvent>,
        reply: Reply<HostId>,
    },
    Transition {
        host_id: HostId,
        level: ActivationLevel,
        reply: Reply<()>,
    },
    SetBounds {
        host_id: HostId,
        bounds: Rect,
    },
    SetVisible {
        host_id: HostId,
        visible: bool,
    },
    Snapshot {
        host_id: HostId,
        reply: Reply<Option<PersistedState>>,
    },
    Restore {
        host_id: HostId,
        state: PersistedState,
        reply: Reply<()>,
    },
    GetProperty {
        host_id: HostId,
        name: String,
        reply: Reply<Option<PropertyValue>>,
    },
    SetProperty {
        host_id: HostId,
        name: String,
        value: PropertyValue,
        reply: Reply<bool>,
    },
    Status {
        host_id: HostId,
        reply: Reply<HostStatus>,
    },
    CloseHost {
        host_id: HostId,
        reply: Reply<()>,
    },
    Shutdown,
}

struct HostEntry {
    host: Rc<AxHost>,
    widget_name: String,
}

struct ApartmentState<B: Backend> {
    backend: B,
    hosts: HashMap<HostId, HostEntry>,
    next_widget: u32,
}

/// Entry point of the apartment thread.
pub fn run<B: Backend>(backend: B, poll_interval: Duration, cmd_rx: std_mpsc::Receiver<Command>) {
    let mut state = ApartmentState {
        backend,
        hosts: HashMap::new(),
        next_widget: 0,
    };

    loop {
        if state.backend.pump(poll_interval) == PumpStatus::Quit {
            tracing::info!("apartment received quit message");
            break;
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(Command::Shutdown) => {
                    tracing::info!("apartment thread shutting down");
                    state.close_all();
                    return;
                }
                Ok(cmd) => state.handle(cmd),
                Err(std_mpsc::TryRecvError::Empty) => break,
                Err(std_mpsc::TryRecvError::Disconnected) => {
                    tracing::info!("command channel disconnected, shutting down");
                    state.close_all();
                    return;
                }
            }
        }
    }

    state.close_all();
}

impl<B: Backend> ApartmentState<B> {
    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::CreateHost {
                parent,
                bounds,
                config,
                state,
                activate,
                events,
                reply,
            } => {
                let result = self.create_host(parent, bounds, config, state, activate, events);
                let _ = reply.send(result.map_err(|e| format!("{e:#}")));
            }
            Command::Transition {
                host_id,
                level,
                reply,
            } => {
                let result = self.with_host(host_id, |host| Ok(host.transition_to(level)?));
                let _ = reply.send(result);
            }
            Command::SetBounds { host_id, bounds } => {
                if let Some(entry) = self.hosts.get(&host_id) {
                    entry.host.set_bounds(bounds);
                }
            }
            Command::SetVisible { host_id, visible } => {
                let result = self.with_host(host_id, |host| Ok(host.set_visible(visible)?));
                if let Err(e) = result {
                    tracing::warn!(%host_id, visible, error = %e, "changing visibility failed");
                }
            }
            Command::Snapshot { host_id, reply } => {
                let result = self.with_host(host_id, |host| Ok(host.snapshot()));
                let _ = reply.send(result);
            }
            Command::Restore {
                host_id,
                state,
                reply,
            } => {
                let result = self.with_host(host_id, |host| Ok(host.restore(state)?));
                let _ = reply.send(result);
            }
            Command::GetProperty {
                host_id,
                name,
                reply,
            } => {
                let result = self.with_host(host_id, |host| Ok(host.property_value(&name)?));
                let _ = reply.send(result);
            }
            Command::SetProperty {
                host_id,
                name,
                value,
                reply,
            } => {
                let result =
                    self.with_host(host_id, |host| Ok(host.set_property_value(&name, value)?));
                let _ = reply.send(result);
            }
            Command::Status { host_id, reply } => {
                let result = self.with_host(host_id, |host| {
                    Ok(HostStatus {
                        level: host.level(),
                        ownership: host.ownership(),
                        handle: host.handle(),
                        bounds: host.bounds(),
                        dirty: host.is_dirty(),
                    })
                });
                let _ = reply.send(result);
            }
            Command::CloseHost { host_id, reply } => {
                let result = self.close_host(host_id);
                let _ = reply.send(result.map_err(|e| format!("{e:#}")));
            }
            Command::Shutdown => {}
        }
    }

    fn with_host<T>(
        &self,
        host_id: HostId,
        f: impl FnOnce(&AxHost) -> Result<T>,
    ) -> Result<T, String> {
        let entry = self
            .hosts
            .get(&host_id)
            .ok_or_else(|| format!("unknown host: {host_id}"))?;
        f(&entry.host).map_err(|e| format!("{e:#}"))
    }

    fn create_host(
        &mut self,
        parent: WindowHandle,
        bounds: Rect,
        config: HostConfig,
        state: Option<PersistedState>,
        activate: ActivationLevel,
        events: mpsc::UnboundedSender<ManagerEvent>,
    ) -> Result<HostId> {
        let class_id = config
            .class_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("host configuration has no class id"))?;

        self.next_widget += 1;
        let widget_name = format!("axHost{}", self.next_widget);
        let factory = self.backend.factory(&class_id)?;
        let widget = self.backend.widget(&widget_name, parent, bounds)?;
        let host = match AxHost::new(self.backend.context(), config, factory, widget) {
            Ok(host) => Rc::new(host),
            Err(e) => {
                self.backend.release_widget(&widget_name);
                return Err(e.into());
            }
        };
        let host_id = host.id();

        host.subscribe(move |event| {
            let _ = events.send(ManagerEvent {
                host_id,
                event: event.clone(),
            });
        });
        self.backend.route_messages(&widget_name, Rc::downgrade(&host));

        if let Err(e) = Self::activate(&host, bounds, state, activate) {
            tracing::warn!(%host_id, error = %e, "host activation failed, tearing down");
            if let Err(close_err) = host.close() {
                tracing::debug!(%host_id, error = %close_err, "close after failed activation");
            }
            self.backend.release_widget(&widget_name);
            return Err(e);
        }

        tracing::info!(%host_id, class_id = %class_id, level = ?host.level(), "host ready");
        self.hosts.insert(host_id, HostEntry { host, widget_name });
        Ok(host_id)
    }

    fn activate(
        host: &AxHost,
        bounds: Rect,
        state: Option<PersistedState>,
        activate: ActivationLevel,
    ) -> Result<()> {
        if let Some(state) = state {
            host.restore(state)?;
        }
        host.place(bounds);
        if activate >= ActivationLevel::InPlace {
            host.create_handle()?;
        }
        host.transition_to(activate)?;
        Ok(())
    }

    fn close_host(&mut self, host_id: HostId) -> Result<()> {
        let entry = self
            .hosts
            .remove(&host_id)
            .ok_or_else(|| anyhow::anyhow!("unknown host: {host_id}"))?;
        tracing::info!(%host_id, "closing host");
        let result = entry.host.close();
        self.backend.release_widget(&entry.widget_name);
        Ok(result?)
    }

    fn close_all(&mut self) {
        let ids: Vec<HostId> = self.hosts.keys().copied().collect();
        for host_id in ids {
            if let Err(e) = self.close_host(host_id) {
                tracing::warn!(%host_id, error = %e, "closing host during shutdown failed");
            }
        }
    }
}
