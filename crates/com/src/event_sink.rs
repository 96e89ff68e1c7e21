//! IDispatch sink for an object's default source interface.
//!
//! Every invocation is forwarded as an [`ObjectEvent`] to the core's
//! notification sink; the sink lives on the apartment thread with the host.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use axhost_core::ObjectEventSink;
use axhost_domain::ObjectEvent;
use windows::core::{implement, Error, GUID};
use windows::Win32::Foundation::{E_FAIL, E_NOTIMPL};
use windows::Win32::System::Com::{
    DISPATCH_FLAGS, DISPPARAMS, EXCEPINFO, IDispatch, IDispatch_Impl, ITypeInfo,
};
use windows::Win32::System::Variant::VARIANT;

use crate::dispatch::{self, DISP_E_UNKNOWNNAME};

#[implement(IDispatch)]
pub struct EventSink {
    label: String,
    target: Rc<dyn ObjectEventSink>,
}

impl EventSink {
    pub fn new(label: String, target: Rc<dyn ObjectEventSink>) -> Self {
        Self { label, target }
    }
}

impl IDispatch_Impl for EventSink_Impl {
    fn GetTypeInfoCount(&self) -> windows::core::Result<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> windows::core::Result<ITypeInfo> {
        Err(Error::from(E_NOTIMPL))
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        _rgsznames: *const windows::core::PCWSTR,
        _cnames: u32,
        _lcid: u32,
        _rgdispid: *mut i32,
    ) -> windows::core::Result<()> {
        Err(Error::from(DISP_E_UNKNOWNNAME))
    }

    fn Invoke(
        &self,
        dispidmember: i32,
        _riid: *const GUID,
        _lcid: u32,
        _wflags: DISPATCH_FLAGS,
        pdispparams: *const DISPPARAMS,
        _pvarresult: *mut VARIANT,
        _pexcepinfo: *mut EXCEPINFO,
        _puargerr: *mut u32,
    ) -> windows::core::Result<()> {
        catch_unwind_com("EventSink::Invoke", || {
            let args = unsafe { dispatch::arguments(pdispparams) };
            tracing::trace!(object = %self.label, dispid = dispidmember, args = args.len(), "object event");
            self.target.on_event(ObjectEvent {
                dispid: dispidmember,
                args,
            });
            Ok(())
        })
    }
}

/// Runs a COM callback body, turning a panic into `E_FAIL`.
pub fn catch_unwind_com<T>(
    context: &'static str,
    f: impl FnOnce() -> windows::core::Result<T>,
) -> windows::core::Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(context, "panic prevented from crossing COM callback boundary");
            Err(Error::from(E_FAIL))
        }
    }
}
