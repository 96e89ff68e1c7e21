//! Hosting engine for ActiveX-style embedded objects.
//!
//! An [`AxHost`] owns one hosted object and walks it up and down the
//! activation ladder, decides who owns the visible window, answers the
//! object's callbacks through a client site, captures and restores its
//! persisted state, and reflects its properties. Everything runs on one
//! single-threaded apartment; see [`apartment`].

mod ambient;
pub mod apartment;
pub mod container;
pub mod context;
pub mod error;
mod host;
mod lifecycle;
pub mod object;
pub mod persistence;
pub mod properties;
pub mod site;
pub mod units;
pub mod widget;
mod window;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use container::{ContainerRegistry, ExtenderProxy};
pub use context::HostContext;
pub use error::{HostError, ObjectError, ObjectResult, Result, WireError};
pub use host::{AxHost, HostEvent};
pub use object::{HostedObject, ObjectEventSink, ObjectFactory};
pub use persistence::wire::PersistedStateExt;
pub use properties::{PropertyFilter, PropertyMetadata, ReflectedProperty};
pub use site::ClientSite;
pub use units::Dpi;
pub use widget::{ServiceProvider, WidgetBase, WindowMessage, WindowSystem};
