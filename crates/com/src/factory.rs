use std::rc::Rc;

use axhost_core::error::ObjectResult;
use axhost_core::{HostContext, HostedObject, ObjectFactory};
use windows::core::{IUnknown, BSTR, GUID, HSTRING};
use windows::Win32::Foundation::E_NOINTERFACE;
use windows::Win32::System::Com::{
    CLSIDFromString, CoCreateInstance, CoGetClassObject, CLSCTX_INPROC_SERVER,
};
use windows::Win32::System::Ole::IClassFactory2;

use crate::object::ComObject;
use crate::object_error;

/// Creates in-process objects of one registered class.
pub struct ComObjectFactory {
    class_id: String,
    clsid: GUID,
    context: Rc<HostContext>,
}

impl ComObjectFactory {
    /// `class_id` is either a braced CLSID or a ProgID.
    pub fn new(class_id: &str, context: Rc<HostContext>) -> ObjectResult<Self> {
        let clsid = unsafe { CLSIDFromString(&HSTRING::from(class_id)) }.map_err(object_error)?;
        tracing::debug!(class_id, ?clsid, "resolved object class");
        Ok(Self {
            class_id: class_id.to_string(),
            clsid,
            context,
        })
    }

    fn wrap(&self, unknown: IUnknown) -> ObjectResult<Rc<dyn HostedObject>> {
        let object = ComObject::new(unknown, self.class_id.clone(), self.context.clone())?;
        Ok(Rc::new(object))
    }

    unsafe fn class_factory(&self) -> ObjectResult<IClassFactory2> {
        CoGetClassObject(&self.clsid, CLSCTX_INPROC_SERVER, None).map_err(object_error)
    }
}

impl ObjectFactory for ComObjectFactory {
    fn class_id(&self) -> &str {
        &self.class_id
    }

    fn create(&self) -> ObjectResult<Rc<dyn HostedObject>> {
        let unknown: IUnknown =
            unsafe { CoCreateInstance(&self.clsid, None, CLSCTX_INPROC_SERVER) }
                .map_err(object_error)?;
        tracing::info!(class_id = %self.class_id, "created object");
        self.wrap(unknown)
    }

    fn create_licensed(&self, license_key: &str) -> ObjectResult<Rc<dyn HostedObject>> {
        let unknown: IUnknown = unsafe {
            let factory = self.class_factory()?;
            factory
                .CreateInstanceLic(None, None, &BSTR::from(license_key))
                .map_err(object_error)?
        };
        tracing::info!(class_id = %self.class_id, "created object with runtime license");
        self.wrap(unknown)
    }

    fn request_license_key(&self) -> ObjectResult<Option<String>> {
        unsafe {
            let factory = match self.class_factory() {
                Ok(factory) => factory,
                Err(e) if e.code() == E_NOINTERFACE.0 => return Ok(None),
                Err(e) => return Err(e),
            };
            let info = factory.GetLicInfo().map_err(object_error)?;
            if !info.fRuntimeKeyAvail.as_bool() {
                return Ok(None);
            }
            let key = factory.RequestLicKey(0).map_err(object_error)?;
            Ok(Some(key.to_string()))
        }
    }
}
