//! Native windows behind the core's window-system and widget traits.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use axhost_core::error::ObjectResult;
use axhost_core::units::Dpi;
use axhost_core::widget::{LocaleProvider, WindowStyle};
use axhost_core::{WidgetBase, WindowMessage, WindowSystem};
use axhost_domain::{FontDescriptor, OleColor, Rect, RightToLeft, WindowHandle};
use windows::core::{w, HSTRING, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
use windows::Win32::Globalization::GetUserDefaultLCID;
use windows::Win32::Graphics::Gdi::{
    GetDC, GetDeviceCaps, GetStockObject, MapWindowPoints, ReleaseDC, HBRUSH, LOGPIXELSX,
    LOGPIXELSY, WHITE_BRUSH,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::SetFocus;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::object_error;

const HOST_WINDOW_CLASS: PCWSTR = w!("AxHostWindow");

pub fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut _)
}

pub fn handle_of(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

pub fn to_rect(rect: Rect) -> RECT {
    RECT {
        left: rect.x,
        top: rect.y,
        right: rect.x + rect.width,
        bottom: rect.y + rect.height,
    }
}

pub fn rect_from(rect: &RECT) -> Rect {
    Rect::new(
        rect.left,
        rect.top,
        rect.right - rect.left,
        rect.bottom - rect.top,
    )
}

/// User32/GDI primitives for the apartment thread.
#[derive(Default)]
pub struct Win32Windows {
    parking: Cell<Option<WindowHandle>>,
}

impl Win32Windows {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn parking_window(&self) -> Option<HWND> {
        if let Some(handle) = self.parking.get() {
            return Some(hwnd(handle));
        }
        let created = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                w!("STATIC"),
                w!("AxHostParking"),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                Some(HWND_MESSAGE),
                None,
                None,
                None,
            )
        };
        match created {
            Ok(parking) => {
                self.parking.set(Some(handle_of(parking)));
                Some(parking)
            }
            Err(e) => {
                tracing::error!(?e, "creating parking window failed");
                None
            }
        }
    }
}

impl Drop for Win32Windows {
    fn drop(&mut self) {
        if let Some(handle) = self.parking.take() {
            let _ = unsafe { DestroyWindow(hwnd(handle)) };
        }
    }
}

impl WindowSystem for Win32Windows {
    fn register_message(&self, name: &str) -> u32 {
        unsafe { RegisterWindowMessageW(&HSTRING::from(name)) }
    }

    fn window_proc(&self, handle: WindowHandle) -> usize {
        unsafe { GetWindowLongPtrW(hwnd(handle), GWLP_WNDPROC) as usize }
    }

    fn set_window_proc(&self, handle: WindowHandle, proc_: usize) -> usize {
        unsafe { SetWindowLongPtrW(hwnd(handle), GWLP_WNDPROC, proc_ as isize) as usize }
    }

    fn send_message(&self, handle: WindowHandle, message: u32, wparam: usize, lparam: isize) -> isize {
        unsafe {
            SendMessageW(
                hwnd(handle),
                message,
                Some(WPARAM(wparam)),
                Some(LPARAM(lparam)),
            )
            .0
        }
    }

    fn call_window_proc(&self, message: &WindowMessage) -> isize {
        unsafe {
            let installed = GetWindowLongPtrW(hwnd(message.handle), GWLP_WNDPROC);
            call_proc(installed as usize, message)
        }
    }

    fn park(&self, handle: WindowHandle) {
        if let Some(parking) = self.parking_window() {
            if let Err(e) = unsafe { SetParent(hwnd(handle), Some(parking)) } {
                tracing::warn!(?e, handle = handle.0, "parking object window failed");
            }
        }
    }

    fn screen_dpi(&self) -> Option<Dpi> {
        unsafe {
            let hdc = GetDC(None);
            if hdc.is_invalid() {
                return None;
            }
            let dpi = Dpi::new(
                GetDeviceCaps(Some(hdc), LOGPIXELSX),
                GetDeviceCaps(Some(hdc), LOGPIXELSY),
            );
            ReleaseDC(None, hdc);
            Some(dpi)
        }
    }
}

unsafe fn call_proc(proc_: usize, message: &WindowMessage) -> isize {
    let (window, wparam, lparam) = (
        hwnd(message.handle),
        WPARAM(message.wparam),
        LPARAM(message.lparam),
    );
    if proc_ == 0 {
        return DefWindowProcW(window, message.message, wparam, lparam).0;
    }
    let proc_: WNDPROC = std::mem::transmute::<usize, WNDPROC>(proc_);
    CallWindowProcW(proc_, window, message.message, wparam, lparam).0
}

/// Locale of the interactive user.
pub struct SystemLocale;

impl LocaleProvider for SystemLocale {
    fn locale_id(&self) -> u32 {
        unsafe { GetUserDefaultLCID() }
    }
}

type MessageHandler = Rc<dyn Fn(&WindowMessage) -> isize>;

thread_local! {
    static WIDGETS: RefCell<HashMap<isize, Weak<Win32Widget>>> = RefCell::new(HashMap::new());
    static CLASS_REGISTERED: Cell<bool> = const { Cell::new(false) };
}

/// Child window of a native parent that a host is layered on.
///
/// Messages for the widget's window, whether created here or taken over
/// from an object, go to the handler installed with
/// [`set_message_handler`](Self::set_message_handler).
pub struct Win32Widget {
    name: String,
    parent: WindowHandle,
    handle: Cell<Option<WindowHandle>>,
    owns_handle: Cell<bool>,
    saved_proc: Cell<usize>,
    bounds: Cell<Rect>,
    visible: Cell<bool>,
    handler: RefCell<Option<MessageHandler>>,
    weak_self: Weak<Self>,
}

impl Win32Widget {
    pub fn new(name: &str, parent: WindowHandle, bounds: Rect) -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            name: name.to_string(),
            parent,
            handle: Cell::new(None),
            owns_handle: Cell::new(false),
            saved_proc: Cell::new(0),
            bounds: Cell::new(bounds),
            visible: Cell::new(true),
            handler: RefCell::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn set_message_handler(&self, handler: impl Fn(&WindowMessage) -> isize + 'static) {
        *self.handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn clear_message_handler(&self) {
        self.handler.borrow_mut().take();
    }

    fn track(&self, handle: WindowHandle) {
        WIDGETS.with(|widgets| {
            widgets
                .borrow_mut()
                .insert(handle.0, self.weak_self.clone());
        });
    }

    fn untrack(&self, handle: WindowHandle) {
        WIDGETS.with(|widgets| {
            widgets.borrow_mut().remove(&handle.0);
        });
    }

    fn dispatch(&self, message: &WindowMessage) -> isize {
        let handler = self.handler.borrow().clone();
        match handler {
            Some(handler) => handler(message),
            None => self.default_window_proc(message),
        }
    }
}

impl Drop for Win32Widget {
    fn drop(&mut self) {
        self.release_handle();
        self.destroy_native_handle();
    }
}

impl WidgetBase for Win32Widget {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn handle(&self) -> Option<WindowHandle> {
        self.handle.get()
    }

    fn create_native_handle(&self, style: WindowStyle) -> ObjectResult<WindowHandle> {
        register_host_window_class();
        let bounds = self.bounds.get();
        let mut window_style = WS_CHILD | WS_CLIPCHILDREN | WS_CLIPSIBLINGS;
        if style.visible {
            window_style |= WS_VISIBLE;
        }
        let created = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                HOST_WINDOW_CLASS,
                w!(""),
                window_style,
                bounds.x,
                bounds.y,
                bounds.width,
                bounds.height,
                Some(hwnd(self.parent)),
                None,
                None,
                None,
            )
        }
        .map_err(object_error)?;
        let handle = handle_of(created);
        self.handle.set(Some(handle));
        self.owns_handle.set(true);
        self.saved_proc.set(0);
        self.track(handle);
        Ok(handle)
    }

    fn destroy_native_handle(&self) {
        if !self.owns_handle.get() {
            return;
        }
        if let Some(handle) = self.handle.take() {
            self.owns_handle.set(false);
            self.untrack(handle);
            if let Err(e) = unsafe { DestroyWindow(hwnd(handle)) } {
                tracing::debug!(?e, handle = handle.0, "host window already gone");
            }
        }
    }

    fn assign_handle(&self, handle: WindowHandle) {
        let previous = unsafe {
            SetWindowLongPtrW(hwnd(handle), GWLP_WNDPROC, host_wndproc as usize as isize)
        };
        self.saved_proc.set(previous as usize);
        self.handle.set(Some(handle));
        self.owns_handle.set(false);
        self.track(handle);
    }

    fn release_handle(&self) {
        if self.owns_handle.get() {
            return;
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.untrack(handle);
        unsafe {
            if IsWindow(Some(hwnd(handle))).as_bool() {
                SetWindowLongPtrW(hwnd(handle), GWLP_WNDPROC, self.saved_proc.get() as isize);
            }
        }
        self.saved_proc.set(0);
    }

    fn bounds(&self) -> Rect {
        self.bounds.get()
    }

    fn set_bounds_core(&self, bounds: Rect) {
        self.bounds.set(bounds);
        if let Some(handle) = self.handle.get() {
            let _ = unsafe {
                MoveWindow(
                    hwnd(handle),
                    bounds.x,
                    bounds.y,
                    bounds.width,
                    bounds.height,
                    true,
                )
            };
        }
    }

    fn update_bounds(&self) {
        let Some(handle) = self.handle.get() else {
            return;
        };
        unsafe {
            let mut rect = RECT::default();
            if GetWindowRect(hwnd(handle), &mut rect).is_err() {
                return;
            }
            let mut corners = [
                POINT {
                    x: rect.left,
                    y: rect.top,
                },
                POINT {
                    x: rect.right,
                    y: rect.bottom,
                },
            ];
            MapWindowPoints(None, Some(hwnd(self.parent)), &mut corners);
            self.bounds.set(Rect::new(
                corners[0].x,
                corners[0].y,
                corners[1].x - corners[0].x,
                corners[1].y - corners[0].y,
            ));
        }
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn set_visible_state(&self, visible: bool) {
        self.visible.set(visible);
        if let Some(handle) = self.handle.get() {
            let command = if visible { SW_SHOW } else { SW_HIDE };
            let _ = unsafe { ShowWindow(hwnd(handle), command) };
        }
    }

    fn has_parent(&self) -> bool {
        !self.parent.is_null()
    }

    fn parent_handle(&self) -> WindowHandle {
        self.parent
    }

    fn parent_visible(&self) -> bool {
        !self.parent.is_null() && unsafe { IsWindowVisible(hwnd(self.parent)) }.as_bool()
    }

    fn ambient_font(&self) -> Option<FontDescriptor> {
        None
    }

    fn ambient_back_color(&self) -> Option<OleColor> {
        None
    }

    fn ambient_fore_color(&self) -> Option<OleColor> {
        None
    }

    fn right_to_left_chain(&self) -> Vec<RightToLeft> {
        vec![RightToLeft::Inherit]
    }

    fn focus(&self) -> bool {
        match self.handle.get() {
            Some(handle) => unsafe { SetFocus(Some(hwnd(handle))) }.is_ok(),
            None => false,
        }
    }

    fn default_window_proc(&self, message: &WindowMessage) -> isize {
        unsafe { call_proc(self.saved_proc.get(), message) }
    }

    fn base_window_proc(&self, message: &WindowMessage) -> isize {
        self.default_window_proc(message)
    }
}

fn register_host_window_class() {
    if CLASS_REGISTERED.with(Cell::get) {
        return;
    }
    unsafe {
        let wc = WNDCLASSEXW {
            cbSize: core::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(host_wndproc),
            hInstance: GetModuleHandleW(None).unwrap_or_default().into(),
            lpszClassName: HOST_WINDOW_CLASS,
            hbrBackground: HBRUSH(GetStockObject(WHITE_BRUSH).0),
            ..Default::default()
        };
        if RegisterClassExW(&wc) == 0 {
            tracing::error!("registering the host window class failed");
            return;
        }
    }
    CLASS_REGISTERED.with(|registered| registered.set(true));
}

unsafe extern "system" fn host_wndproc(
    window: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let widget = WIDGETS.with(|widgets| {
        widgets
            .borrow()
            .get(&(window.0 as isize))
            .and_then(Weak::upgrade)
    });
    let message = WindowMessage::new(handle_of(window), msg).with_params(wparam.0, lparam.0);
    match widget {
        Some(widget) => LRESULT(widget.dispatch(&message)),
        None => DefWindowProcW(window, msg, wparam, lparam),
    }
}
