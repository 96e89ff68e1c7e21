//! A COM object seen through the host's [`HostedObject`] contract.
//!
//! Every optional interface is queried once when the object is wrapped;
//! the capability accessors hand out the cached wrappers.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::rc::Rc;

use axhost_core::error::{ObjectError, ObjectResult};
use axhost_core::object::{
    Automation, DirtyState, PerPropertyBrowsing, PersistPropertyBag, PersistStorage,
    PersistStream, PersistStreamInit, PredefinedValue, PropertyInfo, PropertyPages,
    QuickActivateReply, QuickActivateRequest,
};
use axhost_core::{ClientSite, HostContext, HostedObject, ObjectEventSink};
use axhost_domain::{MiscStatus, PropertyBag, PropertyValue, Rect, Size, Verb, WindowHandle};
use windows::core::{Interface, IUnknown, BSTR, GUID, HRESULT, HSTRING, PCWSTR};
use windows::Win32::Foundation::{S_FALSE, S_OK, SIZE};
use windows::Win32::System::Com::StructuredStorage::{
    IPersistPropertyBag, IPersistStorage, IPropertyBag, ILockBytes, IStorage,
};
use windows::Win32::System::Com::{
    CoTaskMemFree, IConnectionPoint, IConnectionPointContainer, IDispatch, IPersistStream,
    ITypeInfo, DVASPECT_CONTENT, FUNCFLAG_FHIDDEN, FUNCFLAG_FNONBROWSABLE, INVOKE_PROPERTYGET,
    INVOKE_PROPERTYPUT, INVOKE_PROPERTYPUTREF, STGC_DEFAULT, VARFLAG_FHIDDEN,
    VARFLAG_FNONBROWSABLE, VARFLAG_FREADONLY,
};
use windows::Win32::System::Ole::{
    IFont, IOleClientSite, IOleControl, IOleInPlaceObject, IOleObject, IPerPropertyBrowsing,
    IPersistStreamInit, IProvideClassInfo2, IQuickActivate, ISpecifyPropertyPages,
    OleCreatePropertyFrameIndirect, CADWORD, CALPOLESTR, OCPFIPARAMS, OLECLOSE_NOSAVE,
    QACONTAINER, QACONTROL,
};

use crate::dispatch;
use crate::event_sink::EventSink;
use crate::property_bag::MemoryPropertyBag;
use crate::site::{create_font, OleSite};
use crate::stream::{
    empty_stream, new_storage, storage_from_bytes, storage_to_bytes, stream_from_bytes,
    stream_to_bytes,
};
use crate::win32::{hwnd, handle_of, to_rect};
use crate::object_error;

const GUIDKIND_DEFAULT_SOURCE_DISP_IID: u32 = 1;

pub struct ComObject {
    label: String,
    unknown: IUnknown,
    ole_object: IOleObject,
    control: Option<IOleControl>,
    context: Rc<HostContext>,
    site: RefCell<Option<IOleClientSite>>,
    connections: RefCell<HashMap<u32, IConnectionPoint>>,
    stream_init: Option<StreamInitPersistence>,
    stream: Option<StreamPersistence>,
    storage: Option<StoragePersistence>,
    property_bag: Option<PropertyBagPersistence>,
    automation: Option<DispatchAutomation>,
    browsing: Option<PropertyBrowsing>,
    pages: Option<SpecifiedPages>,
}

impl ComObject {
    pub fn new(unknown: IUnknown, label: String, context: Rc<HostContext>) -> ObjectResult<Self> {
        let ole_object: IOleObject = unknown.cast().map_err(object_error)?;
        let object = Self {
            control: unknown.cast().ok(),
            stream_init: unknown.cast().ok().map(StreamInitPersistence),
            stream: unknown.cast().ok().map(StreamPersistence),
            storage: unknown.cast().ok().map(|persist| StoragePersistence {
                persist,
                storage: RefCell::new(None),
            }),
            property_bag: unknown.cast().ok().map(PropertyBagPersistence),
            automation: unknown.cast().ok().map(DispatchAutomation),
            browsing: unknown.cast().ok().map(PropertyBrowsing),
            pages: unknown.cast().ok().map(|specify| SpecifiedPages {
                specify,
                unknown: unknown.clone(),
                locale: context.locale_id(),
            }),
            label,
            unknown,
            ole_object,
            context,
            site: RefCell::new(None),
            connections: RefCell::new(HashMap::new()),
        };
        tracing::debug!(
            object = %object.label,
            stream_init = object.stream_init.is_some(),
            stream = object.stream.is_some(),
            storage = object.storage.is_some(),
            property_bag = object.property_bag.is_some(),
            automation = object.automation.is_some(),
            "wrapped object"
        );
        Ok(object)
    }

    fn in_place(&self) -> ObjectResult<IOleInPlaceObject> {
        self.unknown.cast().map_err(object_error)
    }

    fn source_interface(&self) -> ObjectResult<GUID> {
        let class_info: IProvideClassInfo2 = self.unknown.cast().map_err(object_error)?;
        unsafe { class_info.GetGUID(GUIDKIND_DEFAULT_SOURCE_DISP_IID) }.map_err(object_error)
    }

    fn source_connection_point(&self) -> ObjectResult<IConnectionPoint> {
        let source = self.source_interface()?;
        let container: IConnectionPointContainer = self.unknown.cast().map_err(object_error)?;
        unsafe { container.FindConnectionPoint(&source) }.map_err(object_error)
    }

    /// Tracks a connection the object made on its own so it can be undone.
    fn remember_connection(&self, cookie: u32) {
        match self.source_connection_point() {
            Ok(point) => {
                self.connections.borrow_mut().insert(cookie, point);
            }
            Err(err) => {
                tracing::debug!(object = %self.label, cookie, error = %err, "connection point for quick activation not found");
            }
        }
    }
}

const QACONTAINER_USERMODE: u32 = 0x0004;
const QACONTAINER_UIDEAD: u32 = 0x0010;
const QACONTAINER_AUTOCLIP: u32 = 0x0020;
const QACONTAINER_MESSAGEREFLECT: u32 = 0x0040;
const QACONTAINER_SUPPORTSMNEMONICS: u32 = 0x0080;

fn ambient_flags(request: &QuickActivateRequest) -> u32 {
    flag_bits([
        (request.user_mode, QACONTAINER_USERMODE),
        (request.ui_dead, QACONTAINER_UIDEAD),
        (request.auto_clip, QACONTAINER_AUTOCLIP),
        (request.message_reflect, QACONTAINER_MESSAGEREFLECT),
        (request.supports_mnemonics, QACONTAINER_SUPPORTSMNEMONICS),
    ])
}

fn flag_bits<const N: usize>(flags: [(bool, u32); N]) -> u32 {
    flags
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |bits, (_, flag)| bits | flag)
}

/// Drops the references the container struct was holding.
fn release_container(mut container: QACONTAINER) {
    unsafe {
        ManuallyDrop::drop(&mut container.pClientSite);
        ManuallyDrop::drop(&mut container.pPropertyNotifySink);
        ManuallyDrop::drop(&mut container.pUnkEventSink);
        ManuallyDrop::drop(&mut container.pFont);
        ManuallyDrop::drop(&mut container.pOleControlSite);
    }
}

impl HostedObject for ComObject {
    fn misc_status(&self) -> MiscStatus {
        match unsafe { self.ole_object.GetMiscStatus(DVASPECT_CONTENT) } {
            Ok(status) => MiscStatus(status.0 as u32),
            Err(e) => {
                tracing::debug!(object = %self.label, ?e, "misc status unavailable");
                MiscStatus::default()
            }
        }
    }

    fn quick_activate(&self, request: &QuickActivateRequest) -> ObjectResult<QuickActivateReply> {
        let Ok(quick) = self.unknown.cast::<IQuickActivate>() else {
            return Err(ObjectError::not_implemented());
        };
        let client_site: IOleClientSite =
            OleSite::new(request.site.clone(), self.context.clone()).into();
        let event_sink: IDispatch =
            EventSink::new(self.label.clone(), request.events.clone()).into();
        let font: Option<IFont> = request
            .font
            .as_ref()
            .map(|font| create_font(font).and_then(|font| font.cast()))
            .transpose()
            .map_err(object_error)?;

        let container = QACONTAINER {
            cbSize: std::mem::size_of::<QACONTAINER>() as u32,
            pClientSite: ManuallyDrop::new(Some(client_site.clone())),
            pPropertyNotifySink: ManuallyDrop::new(client_site.cast().ok()),
            pUnkEventSink: ManuallyDrop::new(event_sink.cast().ok()),
            dwAmbientFlags: ambient_flags(request),
            colorFore: request.fore_color.0,
            colorBack: request.back_color.0,
            pFont: ManuallyDrop::new(font),
            lcid: request.locale as _,
            pOleControlSite: ManuallyDrop::new(client_site.cast().ok()),
            ..Default::default()
        };
        let mut control = QACONTROL {
            cbSize: std::mem::size_of::<QACONTROL>() as u32,
            ..Default::default()
        };
        let outcome = unsafe { quick.QuickActivate(&container, &mut control) };
        release_container(container);
        outcome.map_err(object_error)?;

        *self.site.borrow_mut() = Some(client_site);
        let event_cookie = (control.dwEventCookie != 0).then_some(control.dwEventCookie);
        if let Some(cookie) = event_cookie {
            self.remember_connection(cookie);
        }
        tracing::debug!(
            object = %self.label,
            misc_status = control.dwMiscStatus,
            event_cookie = control.dwEventCookie,
            "quick activated"
        );
        Ok(QuickActivateReply {
            misc_status: MiscStatus(control.dwMiscStatus),
            event_cookie,
        })
    }

    fn set_client_site(&self, site: Option<Rc<dyn ClientSite>>) -> ObjectResult<()> {
        match site {
            Some(site) => {
                let client_site: IOleClientSite = OleSite::new(site, self.context.clone()).into();
                unsafe { self.ole_object.SetClientSite(&client_site) }.map_err(object_error)?;
                *self.site.borrow_mut() = Some(client_site);
            }
            None => {
                let previous = self.site.borrow_mut().take();
                unsafe { self.ole_object.SetClientSite(None) }.map_err(object_error)?;
                drop(previous);
            }
        }
        Ok(())
    }

    fn do_verb(&self, verb: Verb, parent: WindowHandle, bounds: Rect) -> ObjectResult<()> {
        let site = self.site.borrow().clone();
        let rect = to_rect(bounds);
        unsafe {
            self.ole_object.DoVerb(
                verb.id(),
                core::ptr::null(),
                site.as_ref(),
                0,
                hwnd(parent),
                &rect,
            )
        }
        .map_err(object_error)
    }

    fn in_place_deactivate(&self) -> ObjectResult<()> {
        unsafe { self.in_place()?.InPlaceDeactivate() }.map_err(object_error)
    }

    fn ui_deactivate(&self) -> ObjectResult<()> {
        unsafe { self.in_place()?.UIDeactivate() }.map_err(object_error)
    }

    fn window(&self) -> ObjectResult<WindowHandle> {
        let window = unsafe { self.in_place()?.GetWindow() }.map_err(object_error)?;
        Ok(handle_of(window))
    }

    fn set_object_rects(&self, position: Rect, clip: Rect) -> ObjectResult<()> {
        let (position, clip) = (to_rect(position), to_rect(clip));
        unsafe { self.in_place()?.SetObjectRects(&position, &clip) }.map_err(object_error)
    }

    fn extent(&self) -> ObjectResult<Size> {
        let size = unsafe { self.ole_object.GetExtent(DVASPECT_CONTENT) }.map_err(object_error)?;
        Ok(Size::new(size.cx, size.cy))
    }

    fn set_extent(&self, extent: Size) -> ObjectResult<()> {
        let size = SIZE {
            cx: extent.width,
            cy: extent.height,
        };
        unsafe { self.ole_object.SetExtent(DVASPECT_CONTENT, &size) }.map_err(object_error)
    }

    fn freeze_events(&self, freeze: bool) -> ObjectResult<()> {
        match &self.control {
            Some(control) => unsafe { control.FreezeEvents(freeze) }.map_err(object_error),
            None => Err(ObjectError::no_interface()),
        }
    }

    fn on_ambient_property_change(&self, dispid: i32) -> ObjectResult<()> {
        match &self.control {
            Some(control) => {
                unsafe { control.OnAmbientPropertyChange(dispid) }.map_err(object_error)
            }
            None => Err(ObjectError::no_interface()),
        }
    }

    fn advise(&self, sink: Rc<dyn ObjectEventSink>) -> ObjectResult<u32> {
        let point = self.source_connection_point()?;
        let dispatch: IDispatch = EventSink::new(self.label.clone(), sink).into();
        let cookie = unsafe { point.Advise(&dispatch) }.map_err(object_error)?;
        self.connections.borrow_mut().insert(cookie, point);
        tracing::debug!(object = %self.label, cookie, "event sink connected");
        Ok(cookie)
    }

    fn unadvise(&self, cookie: u32) -> ObjectResult<()> {
        let point = self.connections.borrow_mut().remove(&cookie);
        match point {
            Some(point) => unsafe { point.Unadvise(cookie) }.map_err(object_error),
            None => Err(ObjectError::failed(format!("unknown connection {cookie}"))),
        }
    }

    fn close(&self) -> ObjectResult<()> {
        unsafe { self.ole_object.Close(OLECLOSE_NOSAVE) }.map_err(object_error)
    }

    fn persist_stream_init(&self) -> Option<&dyn PersistStreamInit> {
        self.stream_init.as_ref().map(|p| p as &dyn PersistStreamInit)
    }

    fn persist_stream(&self) -> Option<&dyn PersistStream> {
        self.stream.as_ref().map(|p| p as &dyn PersistStream)
    }

    fn persist_storage(&self) -> Option<&dyn PersistStorage> {
        self.storage.as_ref().map(|p| p as &dyn PersistStorage)
    }

    fn persist_property_bag(&self) -> Option<&dyn PersistPropertyBag> {
        self.property_bag.as_ref().map(|p| p as &dyn PersistPropertyBag)
    }

    fn automation(&self) -> Option<&dyn Automation> {
        self.automation.as_ref().map(|p| p as &dyn Automation)
    }

    fn per_property_browsing(&self) -> Option<&dyn PerPropertyBrowsing> {
        self.browsing.as_ref().map(|p| p as &dyn PerPropertyBrowsing)
    }

    fn property_pages(&self) -> Option<&dyn PropertyPages> {
        self.pages.as_ref().map(|p| p as &dyn PropertyPages)
    }
}

fn dirty_state(hr: HRESULT) -> DirtyState {
    if hr == S_OK {
        DirtyState::Dirty
    } else if hr == S_FALSE {
        DirtyState::Clean
    } else {
        DirtyState::Indeterminate
    }
}

struct StreamInitPersistence(IPersistStreamInit);

impl PersistStreamInit for StreamInitPersistence {
    fn is_dirty(&self) -> DirtyState {
        dirty_state(unsafe { self.0.IsDirty() })
    }

    fn init_new(&self) -> ObjectResult<()> {
        unsafe { self.0.InitNew() }.map_err(object_error)
    }

    fn load(&self, data: &[u8]) -> ObjectResult<()> {
        unsafe {
            let stream = stream_from_bytes(data).map_err(object_error)?;
            self.0.Load(&stream).map_err(object_error)
        }
    }

    fn save(&self, clear_dirty: bool) -> ObjectResult<Vec<u8>> {
        unsafe {
            let stream = empty_stream().map_err(object_error)?;
            self.0.Save(&stream, clear_dirty).map_err(object_error)?;
            stream_to_bytes(&stream).map_err(object_error)
        }
    }
}

struct StreamPersistence(IPersistStream);

impl PersistStream for StreamPersistence {
    fn is_dirty(&self) -> DirtyState {
        dirty_state(unsafe { self.0.IsDirty() })
    }

    fn load(&self, data: &[u8]) -> ObjectResult<()> {
        unsafe {
            let stream = stream_from_bytes(data).map_err(object_error)?;
            self.0.Load(&stream).map_err(object_error)
        }
    }

    fn save(&self, clear_dirty: bool) -> ObjectResult<Vec<u8>> {
        unsafe {
            let stream = empty_stream().map_err(object_error)?;
            self.0.Save(&stream, clear_dirty).map_err(object_error)?;
            stream_to_bytes(&stream).map_err(object_error)
        }
    }
}

/// The object keeps using the storage it was initialized or loaded with,
/// so it stays alive alongside the object.
struct StoragePersistence {
    persist: IPersistStorage,
    storage: RefCell<Option<(ILockBytes, IStorage)>>,
}

impl PersistStorage for StoragePersistence {
    fn is_dirty(&self) -> DirtyState {
        dirty_state(unsafe { self.persist.IsDirty() })
    }

    fn init_new(&self) -> ObjectResult<()> {
        unsafe {
            let (bytes, storage) = new_storage().map_err(object_error)?;
            self.persist.InitNew(&storage).map_err(object_error)?;
            *self.storage.borrow_mut() = Some((bytes, storage));
        }
        Ok(())
    }

    fn load(&self, data: &[u8]) -> ObjectResult<()> {
        unsafe {
            let (bytes, storage) = storage_from_bytes(data).map_err(object_error)?;
            self.persist.Load(&storage).map_err(object_error)?;
            *self.storage.borrow_mut() = Some((bytes, storage));
        }
        Ok(())
    }

    fn save(&self) -> ObjectResult<Vec<u8>> {
        unsafe {
            let (bytes, storage) = new_storage().map_err(object_error)?;
            self.persist.Save(&storage, false).map_err(object_error)?;
            self.persist.SaveCompleted(None).map_err(object_error)?;
            storage.Commit(STGC_DEFAULT).map_err(object_error)?;
            storage_to_bytes(&bytes).map_err(object_error)
        }
    }
}

struct PropertyBagPersistence(IPersistPropertyBag);

impl PersistPropertyBag for PropertyBagPersistence {
    fn init_new(&self) -> ObjectResult<()> {
        unsafe { self.0.InitNew() }.map_err(object_error)
    }

    fn load(&self, bag: &PropertyBag) -> ObjectResult<()> {
        let bag: IPropertyBag = MemoryPropertyBag::new(bag.clone()).into();
        unsafe { self.0.Load(&bag, None) }.map_err(object_error)
    }

    fn save(&self, bag: &mut PropertyBag, clear_dirty: bool, save_all: bool) -> ObjectResult<()> {
        let memory = windows_core::ComObject::new(MemoryPropertyBag::new(bag.clone()));
        let com_bag: IPropertyBag = memory.to_interface();
        unsafe { self.0.Save(&com_bag, clear_dirty, save_all) }.map_err(object_error)?;
        *bag = memory.snapshot();
        Ok(())
    }
}

struct DispatchAutomation(IDispatch);

impl DispatchAutomation {
    unsafe fn name_of(info: &ITypeInfo, memid: i32) -> Option<(String, Option<String>)> {
        let mut name = BSTR::new();
        let mut doc = BSTR::new();
        info.GetDocumentation(
            memid,
            Some(&mut name as *mut BSTR),
            Some(&mut doc as *mut BSTR),
            core::ptr::null_mut(),
            None,
        )
        .ok()?;
        let doc = (!doc.is_empty()).then(|| doc.to_string());
        Some((name.to_string(), doc))
    }
}

impl Automation for DispatchAutomation {
    fn properties(&self) -> ObjectResult<Vec<PropertyInfo>> {
        let mut found: BTreeMap<i32, PropertyInfo> = BTreeMap::new();
        unsafe {
            let info = self.0.GetTypeInfo(0, 0).map_err(object_error)?;
            let attr = info.GetTypeAttr().map_err(object_error)?;
            let (funcs, vars) = ((*attr).cFuncs, (*attr).cVars);
            info.ReleaseTypeAttr(attr);

            for index in 0..u32::from(funcs) {
                let Ok(desc) = info.GetFuncDesc(index) else {
                    continue;
                };
                let (memid, kind, flags) = ((*desc).memid, (*desc).invkind, (*desc).wFuncFlags);
                info.ReleaseFuncDesc(desc);
                let getter = kind == INVOKE_PROPERTYGET;
                if !getter && kind != INVOKE_PROPERTYPUT && kind != INVOKE_PROPERTYPUTREF {
                    continue;
                }
                let Some((name, description)) = Self::name_of(&info, memid) else {
                    continue;
                };
                let hidden = flags.0 & (FUNCFLAG_FHIDDEN.0 | FUNCFLAG_FNONBROWSABLE.0) != 0;
                let entry = found.entry(memid).or_insert_with(|| PropertyInfo {
                    readable: false,
                    writable: false,
                    description,
                    ..PropertyInfo::new(memid, name)
                });
                if getter {
                    entry.readable = true;
                } else {
                    entry.writable = true;
                }
                entry.browsable &= !hidden;
            }

            for index in 0..u32::from(vars) {
                let Ok(desc) = info.GetVarDesc(index) else {
                    continue;
                };
                let (memid, flags) = ((*desc).memid, (*desc).wVarFlags);
                info.ReleaseVarDesc(desc);
                let Some((name, description)) = Self::name_of(&info, memid) else {
                    continue;
                };
                found.insert(
                    memid,
                    PropertyInfo {
                        writable: flags.0 & VARFLAG_FREADONLY.0 == 0,
                        browsable: flags.0 & (VARFLAG_FHIDDEN.0 | VARFLAG_FNONBROWSABLE.0) == 0,
                        description,
                        ..PropertyInfo::new(memid, name)
                    },
                );
            }
        }
        Ok(found.into_values().collect())
    }

    fn get_property(&self, dispid: i32) -> ObjectResult<PropertyValue> {
        unsafe { dispatch::get_property(&self.0, dispid) }
    }

    fn set_property(&self, dispid: i32, value: &PropertyValue) -> ObjectResult<()> {
        unsafe { dispatch::put_property(&self.0, dispid, value) }.map_err(object_error)
    }
}

struct PropertyBrowsing(IPerPropertyBrowsing);

impl PerPropertyBrowsing for PropertyBrowsing {
    fn display_string(&self, dispid: i32) -> ObjectResult<Option<String>> {
        let text = unsafe { self.0.GetDisplayString(dispid) }.map_err(object_error)?;
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn map_to_property_page(&self, dispid: i32) -> ObjectResult<Option<String>> {
        let page = unsafe { self.0.MapPropertyToPage(dispid) }.map_err(object_error)?;
        Ok((page != GUID::zeroed()).then(|| format!("{{{page:?}}}")))
    }

    fn predefined_strings(&self, dispid: i32) -> ObjectResult<Vec<PredefinedValue>> {
        let mut strings = CALPOLESTR::default();
        let mut cookies = CADWORD::default();
        unsafe {
            self.0
                .GetPredefinedStrings(dispid, &mut strings, &mut cookies)
                .map_err(object_error)?;
            let count = strings.cElems.min(cookies.cElems) as usize;
            let mut values = Vec::with_capacity(count);
            for index in 0..count {
                let text = *strings.pElems.add(index);
                values.push(PredefinedValue {
                    display: text.to_string().unwrap_or_default(),
                    cookie: *cookies.pElems.add(index) as i32,
                });
            }
            for index in 0..strings.cElems as usize {
                CoTaskMemFree(Some((*strings.pElems.add(index)).0 as *const c_void));
            }
            CoTaskMemFree(Some(strings.pElems as *const c_void));
            CoTaskMemFree(Some(cookies.pElems as *const c_void));
            Ok(values)
        }
    }

    fn predefined_value(&self, dispid: i32, cookie: i32) -> ObjectResult<PropertyValue> {
        let variant =
            unsafe { self.0.GetPredefinedValue(dispid, cookie as u32) }.map_err(object_error)?;
        Ok(dispatch::from_variant(&variant).unwrap_or(PropertyValue::Empty))
    }
}

struct SpecifiedPages {
    specify: ISpecifyPropertyPages,
    unknown: IUnknown,
    locale: u32,
}

impl SpecifiedPages {
    unsafe fn page_guids(&self) -> ObjectResult<Vec<GUID>> {
        let pages = self.specify.GetPages().map_err(object_error)?;
        let guids = (0..pages.cElems as usize)
            .map(|index| *pages.pElems.add(index))
            .collect();
        CoTaskMemFree(Some(pages.pElems as *const c_void));
        Ok(guids)
    }
}

impl PropertyPages for SpecifiedPages {
    fn page_ids(&self) -> ObjectResult<Vec<String>> {
        let guids = unsafe { self.page_guids() }?;
        Ok(guids.iter().map(|guid| format!("{{{guid:?}}}")).collect())
    }

    fn show(&self, parent: WindowHandle, caption: &str, dispid: Option<i32>) -> ObjectResult<()> {
        unsafe {
            let mut guids = self.page_guids()?;
            let mut objects = [Some(self.unknown.clone())];
            let caption = HSTRING::from(caption);
            let params = OCPFIPARAMS {
                cbStructSize: std::mem::size_of::<OCPFIPARAMS>() as u32,
                hWndOwner: hwnd(parent),
                x: 0,
                y: 0,
                lpszCaption: PCWSTR(caption.as_ptr()),
                cObjects: 1,
                lplpUnk: objects.as_mut_ptr(),
                cPages: guids.len() as u32,
                lpPages: guids.as_mut_ptr(),
                lcid: self.locale,
                dispidInitialProperty: dispid.unwrap_or(0),
            };
            OleCreatePropertyFrameIndirect(&params).map_err(object_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_ambients_map_to_container_flags() {
        let bits = flag_bits([
            (true, QACONTAINER_USERMODE),
            (false, QACONTAINER_UIDEAD),
            (true, QACONTAINER_AUTOCLIP),
            (true, QACONTAINER_MESSAGEREFLECT),
            (false, QACONTAINER_SUPPORTSMNEMONICS),
        ]);
        assert_eq!(bits, 0x0064);
        assert_eq!(flag_bits([(false, QACONTAINER_USERMODE)]), 0);
    }

    #[test]
    fn dirty_answers_keep_the_conservative_reading() {
        assert_eq!(dirty_state(S_OK), DirtyState::Dirty);
        assert_eq!(dirty_state(S_FALSE), DirtyState::Clean);
        assert_eq!(
            dirty_state(windows::Win32::Foundation::E_UNEXPECTED),
            DirtyState::Indeterminate
        );
    }
}
