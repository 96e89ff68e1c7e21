//! Hosts ActiveX controls on a dedicated apartment thread and drives them
//! from async code.
//!
//! [`AxHostManager`] owns the thread; the hosting engine itself lives in
//! `axhost-core` and the Windows binding in `axhost-com`.

mod apartment_thread;
pub mod backend;
pub mod config;
mod manager;
pub mod telemetry;

pub use backend::Backend;
pub use config::ManagerConfig;
pub use manager::{AxHostManager, CreateHostRequest, HostStatus, ManagerEvent};

pub use axhost_com::PumpStatus;
pub use axhost_core::{AxHost, HostEvent, PersistedStateExt};
pub use axhost_domain as domain;
