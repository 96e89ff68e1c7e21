//! `IPropertyBag` over the core's name/value bag.

use std::cell::RefCell;

use axhost_domain::PropertyBag;
use windows::core::{implement, Error, Ref, PCWSTR};
use windows::Win32::Foundation::E_INVALIDARG;
use windows::Win32::System::Com::StructuredStorage::{IErrorLog, IPropertyBag, IPropertyBag_Impl};
use windows::Win32::System::Variant::VARIANT;

use crate::dispatch::{from_variant, to_variant};

#[implement(IPropertyBag)]
pub struct MemoryPropertyBag {
    bag: RefCell<PropertyBag>,
}

impl MemoryPropertyBag {
    pub fn new(bag: PropertyBag) -> Self {
        Self {
            bag: RefCell::new(bag),
        }
    }

    pub fn snapshot(&self) -> PropertyBag {
        self.bag.borrow().clone()
    }
}

fn property_name(name: &PCWSTR) -> windows::core::Result<String> {
    unsafe { name.to_string() }.map_err(|_| Error::from(E_INVALIDARG))
}

impl IPropertyBag_Impl for MemoryPropertyBag_Impl {
    fn Read(
        &self,
        pszpropname: &PCWSTR,
        pvar: *mut VARIANT,
        _perrorlog: Ref<'_, IErrorLog>,
    ) -> windows::core::Result<()> {
        let name = property_name(pszpropname)?;
        let value = self
            .bag
            .borrow()
            .read(&name)
            .cloned()
            .ok_or_else(|| Error::from(E_INVALIDARG))?;
        if !pvar.is_null() {
            unsafe { *pvar = to_variant(&value) };
        }
        Ok(())
    }

    fn Write(&self, pszpropname: &PCWSTR, pvar: *const VARIANT) -> windows::core::Result<()> {
        let name = property_name(pszpropname)?;
        if pvar.is_null() {
            return Err(Error::from(E_INVALIDARG));
        }
        let value = from_variant(unsafe { &*pvar }).ok_or_else(|| Error::from(E_INVALIDARG))?;
        self.bag.borrow_mut().write(&name, value);
        Ok(())
    }
}
