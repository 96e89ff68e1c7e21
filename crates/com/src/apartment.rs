use std::time::Duration;

use anyhow::Context;
use axhost_core::apartment::{enter_sta, StaGuard};
use windows::Win32::System::Ole::{OleInitialize, OleUninitialize};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, MsgWaitForMultipleObjects, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    QS_ALLINPUT, WM_QUIT,
};

use crate::PumpStatus;

/// OLE initialized on the current thread for as long as the value lives.
pub struct OleApartment {
    _sta: StaGuard,
}

impl OleApartment {
    pub fn new() -> anyhow::Result<Self> {
        unsafe { OleInitialize(None) }.context("OleInitialize failed")?;
        tracing::debug!("OLE apartment initialized");
        Ok(Self { _sta: enter_sta() })
    }

    /// Waits up to `timeout` for input, then dispatches everything queued.
    pub fn pump(&self, timeout: Duration) -> PumpStatus {
        unsafe {
            let _ = MsgWaitForMultipleObjects(None, false, timeout.as_millis() as u32, QS_ALLINPUT);
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    return PumpStatus::Quit;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        PumpStatus::Continue
    }
}

impl Drop for OleApartment {
    fn drop(&mut self) {
        unsafe { OleUninitialize() };
        tracing::debug!("OLE apartment released");
    }
}
