//! Windows COM binding for the hosting engine.
//!
//! Wraps real OLE objects behind the core's object traits and supplies the
//! native window system, widget and apartment the core runs on.

/// Outcome of one round of the apartment's message pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    Continue,
    Quit,
}

#[cfg(windows)]
mod apartment;
#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod event_sink;
#[cfg(windows)]
mod factory;
#[cfg(windows)]
mod object;
#[cfg(windows)]
mod property_bag;
#[cfg(windows)]
mod site;
#[cfg(windows)]
mod stream;
#[cfg(windows)]
mod win32;

#[cfg(windows)]
pub use apartment::OleApartment;
#[cfg(windows)]
pub use factory::ComObjectFactory;
#[cfg(windows)]
pub use object::ComObject;
#[cfg(windows)]
pub use site::OleSite;
#[cfg(windows)]
pub use win32::{SystemLocale, Win32Widget, Win32Windows};

#[cfg(not(windows))]
mod stub;
#[cfg(not(windows))]
pub use stub::OleApartment;

#[cfg(windows)]
pub(crate) fn object_error(error: windows::core::Error) -> axhost_core::ObjectError {
    axhost_core::ObjectError::new(error.code().0, error.message())
}
