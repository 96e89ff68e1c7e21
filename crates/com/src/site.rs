//! OLE container side of a hosted object.
//!
//! Implements the client site, in-place site, frame, control site and
//! property-change sink the object talks to, plus the ambient-property
//! dispatch. Every call is delegated to the core's [`ClientSite`]; the COM
//! layer only translates types.

use std::mem::ManuallyDrop;
use std::rc::Rc;

use axhost_core::site::ClientSite;
use axhost_core::units::TransformDirection;
use axhost_core::{ExtenderProxy, HostContext};
use axhost_domain::{AmbientValue, FontDescriptor, Point};
use windows::core::{implement, Error, IUnknownImpl, Interface, OutRef, Ref, BOOL, GUID, PCWSTR};
use windows::Win32::Foundation::{
    E_INVALIDARG, E_NOINTERFACE, E_NOTIMPL, HWND, POINTL, RECT, SIZE, S_FALSE,
};
use windows::Win32::System::Com::{
    DISPATCH_FLAGS, DISPATCH_PROPERTYGET, DISPPARAMS, EXCEPINFO, IDispatch, IDispatch_Impl,
    IMoniker, ITypeInfo, CY,
};
use windows::Win32::System::Ole::{
    IFontDisp, IOleClientSite, IOleClientSite_Impl, IOleContainer, IOleControlSite,
    IOleControlSite_Impl, IOleInPlaceActiveObject, IOleInPlaceFrame, IOleInPlaceFrame_Impl,
    IOleInPlaceSite, IOleInPlaceSite_Impl, IOleInPlaceUIWindow, IOleInPlaceUIWindow_Impl,
    IOleWindow_Impl, IPropertyNotifySink, IPropertyNotifySink_Impl, OleCreateFontIndirect,
    FONTDESC, KEYMODIFIERS, OLEGETMONIKER, OLEINPLACEFRAMEINFO, OLEMENUGROUPWIDTHS, OLEWHICHMK,
    POINTF, XFORMCOORDS, XFORMCOORDS_CONTAINERTOHIMETRIC, XFORMCOORDS_HIMETRICTOCONTAINER,
};
use windows::Win32::System::Variant::{VARIANT, VT_DISPATCH};
use windows::Win32::UI::WindowsAndMessaging::{HACCEL, HMENU, MSG};

use crate::dispatch::{to_variant, DISP_E_UNKNOWNNAME};
use crate::event_sink::catch_unwind_com;
use crate::win32::{hwnd, rect_from, to_rect};

const INPLACE_E_NOTOOLSPACE: windows::core::HRESULT =
    windows::core::HRESULT(0x8004_01A1u32 as i32);
const DISPID_UNKNOWN: i32 = -1;

#[implement(
    IOleClientSite,
    IOleInPlaceSite,
    IOleInPlaceFrame,
    IOleControlSite,
    IPropertyNotifySink,
    IDispatch
)]
pub struct OleSite {
    site: Rc<dyn ClientSite>,
    context: Rc<HostContext>,
}

impl OleSite {
    pub fn new(site: Rc<dyn ClientSite>, context: Rc<HostContext>) -> Self {
        Self { site, context }
    }
}

fn com_error(err: axhost_core::ObjectError) -> Error {
    Error::new(windows::core::HRESULT(err.code()), err.message())
}

fn result(outcome: axhost_core::ObjectResult<()>) -> windows::core::Result<()> {
    outcome.map_err(com_error)
}

fn not_implemented<T>() -> windows::core::Result<T> {
    Err(Error::from(E_NOTIMPL))
}

// ---- IOleClientSite ----

impl IOleClientSite_Impl for OleSite_Impl {
    fn SaveObject(&self) -> windows::core::Result<()> {
        Ok(())
    }

    fn GetMoniker(
        &self,
        _dwassign: &OLEGETMONIKER,
        _dwwhichmoniker: &OLEWHICHMK,
    ) -> windows::core::Result<IMoniker> {
        not_implemented()
    }

    fn GetContainer(&self) -> windows::core::Result<IOleContainer> {
        Err(Error::from(E_NOINTERFACE))
    }

    fn ShowObject(&self) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::ShowObject", || result(self.site.show_object()))
    }

    fn OnShowWindow(&self, fshow: BOOL) -> windows::core::Result<()> {
        self.site.on_show_window(fshow.as_bool());
        Ok(())
    }

    fn RequestNewObjectLayout(&self) -> windows::core::Result<()> {
        not_implemented()
    }
}

// ---- IOleWindow (base of IOleInPlaceSite and IOleInPlaceFrame) ----

impl IOleWindow_Impl for OleSite_Impl {
    fn GetWindow(&self) -> windows::core::Result<HWND> {
        Ok(hwnd(self.site.window()))
    }

    fn ContextSensitiveHelp(&self, _fentermode: BOOL) -> windows::core::Result<()> {
        not_implemented()
    }
}

// ---- IOleInPlaceSite ----

impl IOleInPlaceSite_Impl for OleSite_Impl {
    fn CanInPlaceActivate(&self) -> windows::core::Result<()> {
        if self.site.can_in_place_activate() {
            Ok(())
        } else {
            Err(Error::from(S_FALSE))
        }
    }

    fn OnInPlaceActivate(&self) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::OnInPlaceActivate", || {
            self.site.on_in_place_activate();
            Ok(())
        })
    }

    fn OnUIActivate(&self) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::OnUIActivate", || {
            self.site.on_ui_activate();
            Ok(())
        })
    }

    fn GetWindowContext(
        &self,
        ppframe: OutRef<'_, IOleInPlaceFrame>,
        ppdoc: OutRef<'_, IOleInPlaceUIWindow>,
        lprcposrect: *mut RECT,
        lprccliprect: *mut RECT,
        lpframeinfo: *mut OLEINPLACEFRAMEINFO,
    ) -> windows::core::Result<()> {
        let context = self.site.window_context().map_err(com_error)?;
        unsafe {
            if !ppframe.is_null() {
                let this: IOleInPlaceFrame = self.to_interface();
                ppframe.write(Some(this))?;
            }
            if !ppdoc.is_null() {
                ppdoc.write(None)?;
            }
            if !lprcposrect.is_null() {
                *lprcposrect = to_rect(context.position);
            }
            if !lprccliprect.is_null() {
                *lprccliprect = to_rect(context.clip);
            }
            if !lpframeinfo.is_null() {
                let info = &mut *lpframeinfo;
                info.fMDIApp = BOOL(0);
                info.hwndFrame = hwnd(self.site.window());
                info.haccel = HACCEL(core::ptr::null_mut());
                info.cAccelEntries = 0;
            }
        }
        Ok(())
    }

    fn Scroll(&self, _scrollextant: &SIZE) -> windows::core::Result<()> {
        not_implemented()
    }

    fn OnUIDeactivate(&self, _fundoable: BOOL) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::OnUIDeactivate", || {
            self.site.on_ui_deactivate();
            Ok(())
        })
    }

    fn OnInPlaceDeactivate(&self) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::OnInPlaceDeactivate", || {
            self.site.on_in_place_deactivate();
            Ok(())
        })
    }

    fn DiscardUndoState(&self) -> windows::core::Result<()> {
        not_implemented()
    }

    fn DeactivateAndUndo(&self) -> windows::core::Result<()> {
        not_implemented()
    }

    fn OnPosRectChange(&self, lprcposrect: *const RECT) -> windows::core::Result<()> {
        if lprcposrect.is_null() {
            return Err(Error::from(E_INVALIDARG));
        }
        let position = rect_from(unsafe { &*lprcposrect });
        catch_unwind_com("OleSite::OnPosRectChange", || {
            result(self.site.on_pos_rect_change(position))
        })
    }
}

// ---- IOleInPlaceUIWindow (base of IOleInPlaceFrame) ----

impl IOleInPlaceUIWindow_Impl for OleSite_Impl {
    fn GetBorder(&self) -> windows::core::Result<RECT> {
        Err(Error::from(INPLACE_E_NOTOOLSPACE))
    }

    fn RequestBorderSpace(&self, _pborderwidths: *const RECT) -> windows::core::Result<()> {
        Err(Error::from(INPLACE_E_NOTOOLSPACE))
    }

    fn SetBorderSpace(&self, _pborderwidths: *const RECT) -> windows::core::Result<()> {
        Ok(())
    }

    fn SetActiveObject(
        &self,
        _pactiveobject: Ref<'_, IOleInPlaceActiveObject>,
        _pszobjname: &PCWSTR,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

// ---- IOleInPlaceFrame ----

impl IOleInPlaceFrame_Impl for OleSite_Impl {
    fn InsertMenus(
        &self,
        _hmenushared: HMENU,
        _lpmenuwidths: *mut OLEMENUGROUPWIDTHS,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn SetMenu(
        &self,
        _hmenushared: HMENU,
        _holemenu: isize,
        _hwndactiveobject: HWND,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn RemoveMenus(&self, _hmenushared: HMENU) -> windows::core::Result<()> {
        Ok(())
    }

    fn SetStatusText(&self, _pszstatustext: &PCWSTR) -> windows::core::Result<()> {
        Ok(())
    }

    fn EnableModeless(&self, _fenable: BOOL) -> windows::core::Result<()> {
        Ok(())
    }

    fn TranslateAccelerator(&self, _lpmsg: *const MSG, _wid: u16) -> windows::core::Result<()> {
        Err(Error::from(S_FALSE))
    }
}

// ---- IOleControlSite ----

impl IOleControlSite_Impl for OleSite_Impl {
    fn OnControlInfoChanged(&self) -> windows::core::Result<()> {
        self.site.on_control_info_changed();
        Ok(())
    }

    fn LockInPlaceActive(&self, flock: BOOL) -> windows::core::Result<()> {
        self.site.lock_in_place_active(flock.as_bool());
        Ok(())
    }

    fn GetExtendedControl(&self) -> windows::core::Result<IDispatch> {
        let proxy = self
            .site
            .extended_control()
            .ok_or_else(|| Error::from(E_NOTIMPL))?;
        Ok(ExtenderDispatch::new(proxy, self.context.clone()).into())
    }

    fn TransformCoords(
        &self,
        pptlhimetric: *mut POINTL,
        pptfcontainer: *mut POINTF,
        dwflags: XFORMCOORDS,
    ) -> windows::core::Result<()> {
        if pptlhimetric.is_null() || pptfcontainer.is_null() {
            return Err(Error::from(E_INVALIDARG));
        }
        unsafe {
            if dwflags.0 & XFORMCOORDS_HIMETRICTOCONTAINER.0 != 0 {
                let himetric = &*pptlhimetric;
                let point = self.site.transform_coords(
                    Point {
                        x: himetric.x,
                        y: himetric.y,
                    },
                    TransformDirection::HimetricToContainer,
                );
                *pptfcontainer = POINTF {
                    x: point.x as f32,
                    y: point.y as f32,
                };
            } else if dwflags.0 & XFORMCOORDS_CONTAINERTOHIMETRIC.0 != 0 {
                let container = &*pptfcontainer;
                let point = self.site.transform_coords(
                    Point {
                        x: container.x as i32,
                        y: container.y as i32,
                    },
                    TransformDirection::ContainerToHimetric,
                );
                *pptlhimetric = POINTL {
                    x: point.x,
                    y: point.y,
                };
            } else {
                return Err(Error::from(E_INVALIDARG));
            }
        }
        Ok(())
    }

    fn TranslateAccelerator(
        &self,
        _pmsg: *const MSG,
        _grfmodifiers: KEYMODIFIERS,
    ) -> windows::core::Result<()> {
        Err(Error::from(S_FALSE))
    }

    fn OnFocus(&self, fgotfocus: BOOL) -> windows::core::Result<()> {
        self.site.on_focus(fgotfocus.as_bool());
        Ok(())
    }

    fn ShowPropertyFrame(&self) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::ShowPropertyFrame", || {
            result(self.site.show_property_frame())
        })
    }
}

// ---- IPropertyNotifySink ----

fn notified_dispid(dispid: i32) -> Option<i32> {
    (dispid != DISPID_UNKNOWN).then_some(dispid)
}

impl IPropertyNotifySink_Impl for OleSite_Impl {
    fn OnChanged(&self, dispid: i32) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::OnChanged", || {
            self.site.on_changed(notified_dispid(dispid));
            Ok(())
        })
    }

    fn OnRequestEdit(&self, dispid: i32) -> windows::core::Result<()> {
        if self.site.on_request_edit(notified_dispid(dispid)) {
            Ok(())
        } else {
            Err(Error::from(S_FALSE))
        }
    }
}

// ---- IDispatch (ambient properties) ----

impl IDispatch_Impl for OleSite_Impl {
    fn GetTypeInfoCount(&self) -> windows::core::Result<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> windows::core::Result<ITypeInfo> {
        not_implemented()
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        _rgsznames: *const PCWSTR,
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
        wflags: DISPATCH_FLAGS,
        _pdispparams: *const DISPPARAMS,
        pvarresult: *mut VARIANT,
        _pexcepinfo: *mut EXCEPINFO,
        _puargerr: *mut u32,
    ) -> windows::core::Result<()> {
        catch_unwind_com("OleSite::Invoke", || {
            if wflags.0 & DISPATCH_PROPERTYGET.0 == 0 {
                return Err(Error::from(E_NOTIMPL));
            }
            let value = self
                .site
                .ambient_property(dispidmember)
                .map_err(com_error)?;
            if !pvarresult.is_null() {
                unsafe { *pvarresult = ambient_variant(&value)? };
            }
            Ok(())
        })
    }
}

fn ambient_variant(value: &AmbientValue) -> windows::core::Result<VARIANT> {
    use axhost_domain::PropertyValue;
    let converted = match value {
        AmbientValue::Bool(value) => PropertyValue::Bool(*value),
        AmbientValue::Color(color) => PropertyValue::Color(*color),
        AmbientValue::Locale(locale) => PropertyValue::I32(*locale as i32),
        AmbientValue::Text(text) => PropertyValue::String(text.clone()),
        AmbientValue::Font(font) => return font_variant(font),
    };
    Ok(to_variant(&converted))
}

pub(crate) fn create_font(font: &FontDescriptor) -> windows::core::Result<IFontDisp> {
    let mut name: Vec<u16> = font.name.encode_utf16().chain(std::iter::once(0)).collect();
    let description = FONTDESC {
        cbSizeofstruct: std::mem::size_of::<FONTDESC>() as u32,
        lpstrName: windows::core::PWSTR(name.as_mut_ptr()),
        cySize: CY {
            int64: (f64::from(font.size_points) * 10_000.0) as i64,
        },
        sWeight: font.weight,
        sCharset: font.charset,
        fItalic: font.italic.into(),
        fUnderline: font.underline.into(),
        fStrikethrough: font.strikethrough.into(),
    };
    unsafe { OleCreateFontIndirect(&description) }
}

fn font_variant(font: &FontDescriptor) -> windows::core::Result<VARIANT> {
    let dispatch: IDispatch = create_font(font)?.cast()?;
    let mut variant = VARIANT::default();
    unsafe {
        let inner = &mut *variant.Anonymous.Anonymous;
        inner.vt = VT_DISPATCH;
        inner.Anonymous.pdispVal = ManuallyDrop::new(Some(dispatch));
    }
    Ok(variant)
}

const EXTENDER_PROPERTIES: [&str; 8] = [
    "Name", "Left", "Top", "Width", "Height", "Visible", "Enabled", "TabIndex",
];

/// Extender object handed out by `GetExtendedControl`.
#[implement(IDispatch)]
struct ExtenderDispatch {
    proxy: ExtenderProxy,
    context: Rc<HostContext>,
}

impl ExtenderDispatch {
    fn new(proxy: ExtenderProxy, context: Rc<HostContext>) -> Self {
        Self { proxy, context }
    }
}

impl IDispatch_Impl for ExtenderDispatch_Impl {
    fn GetTypeInfoCount(&self) -> windows::core::Result<u32> {
        Ok(0)
    }

    fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> windows::core::Result<ITypeInfo> {
        not_implemented()
    }

    fn GetIDsOfNames(
        &self,
        _riid: *const GUID,
        rgsznames: *const PCWSTR,
        cnames: u32,
        _lcid: u32,
        rgdispid: *mut i32,
    ) -> windows::core::Result<()> {
        if rgsznames.is_null() || rgdispid.is_null() || cnames == 0 {
            return Err(Error::from(E_INVALIDARG));
        }
        let name = unsafe { (*rgsznames).to_string() }.map_err(|_| Error::from(E_INVALIDARG))?;
        let index = EXTENDER_PROPERTIES
            .iter()
            .position(|known| known.eq_ignore_ascii_case(&name))
            .ok_or_else(|| Error::from(DISP_E_UNKNOWNNAME))?;
        unsafe { *rgdispid = index as i32 + 1 };
        Ok(())
    }

    fn Invoke(
        &self,
        dispidmember: i32,
        _riid: *const GUID,
        _lcid: u32,
        _wflags: DISPATCH_FLAGS,
        _pdispparams: *const DISPPARAMS,
        pvarresult: *mut VARIANT,
        _pexcepinfo: *mut EXCEPINFO,
        _puargerr: *mut u32,
    ) -> windows::core::Result<()> {
        let name = usize::try_from(dispidmember - 1)
            .ok()
            .and_then(|index| EXTENDER_PROPERTIES.get(index))
            .ok_or_else(|| Error::from(DISP_E_UNKNOWNNAME))?;
        let value = self
            .proxy
            .property(&self.context, name)
            .ok_or_else(|| Error::from(DISP_E_UNKNOWNNAME))?;
        if !pvarresult.is_null() {
            unsafe { *pvarresult = to_variant(&value) };
        }
        Ok(())
    }
}
