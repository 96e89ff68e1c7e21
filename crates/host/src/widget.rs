//! Collaborators the host extends: the windowed widget it is built on, the
//! native window system and the design-time services.

use std::rc::Rc;

use axhost_domain::{FontDescriptor, HostId, OleColor, Rect, RightToLeft, WindowHandle};

use crate::error::ObjectResult;
use crate::units::Dpi;

pub const WM_SETFOCUS: u32 = 0x0007;
pub const WM_KILLFOCUS: u32 = 0x0008;
pub const WM_DESTROY: u32 = 0x0002;
pub const WM_HELP: u32 = 0x0053;
pub const WM_CONTEXTMENU: u32 = 0x007B;
pub const WM_NCDESTROY: u32 = 0x0082;
pub const WM_KEYFIRST: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_KEYLAST: u32 = 0x0109;
pub const WM_COMMAND: u32 = 0x0111;
pub const WM_MOUSEFIRST: u32 = 0x0200;
pub const WM_MOUSELAST: u32 = 0x020E;

/// Name of the message used to verify the window procedure chain.
pub const SUBCLASS_CHECK_MESSAGE: &str = "AxHostSubclassCheck";
/// Answer the host's window procedure gives to [`SUBCLASS_CHECK_MESSAGE`].
pub const SUBCLASS_CHECK_SENTINEL: isize = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMessage {
    pub handle: WindowHandle,
    pub message: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl WindowMessage {
    pub fn new(handle: WindowHandle, message: u32) -> Self {
        Self {
            handle,
            message,
            wparam: 0,
            lparam: 0,
        }
    }

    pub fn with_params(mut self, wparam: usize, lparam: isize) -> Self {
        self.wparam = wparam;
        self.lparam = lparam;
        self
    }

    pub fn is_mouse(&self) -> bool {
        (WM_MOUSEFIRST..=WM_MOUSELAST).contains(&self.message)
    }

    pub fn is_keyboard(&self) -> bool {
        (WM_KEYFIRST..=WM_KEYLAST).contains(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowStyle {
    pub visible: bool,
}

/// The generic windowed widget the host is layered on.
///
/// Implementations own the native handle bookkeeping: `assign_handle` routes
/// an existing window's messages to the host, `create_native_handle` builds a
/// window owned by the widget itself.
pub trait WidgetBase {
    fn name(&self) -> String;

    fn handle(&self) -> Option<WindowHandle>;
    fn create_native_handle(&self, style: WindowStyle) -> ObjectResult<WindowHandle>;
    fn destroy_native_handle(&self);
    fn assign_handle(&self, handle: WindowHandle);
    fn release_handle(&self);

    fn bounds(&self) -> Rect;
    /// Moves the widget (and its native window, if any) without notifying the host.
    fn set_bounds_core(&self, bounds: Rect);
    /// Re-reads the bounds from the native window.
    fn update_bounds(&self);

    fn is_visible(&self) -> bool;
    fn set_visible_state(&self, visible: bool);
    fn is_enabled(&self) -> bool {
        true
    }
    fn tab_index(&self) -> i32 {
        0
    }

    fn has_parent(&self) -> bool;
    fn parent_handle(&self) -> WindowHandle;
    fn parent_visible(&self) -> bool;

    /// Ambient values inherited from the logical parent.
    fn ambient_font(&self) -> Option<FontDescriptor>;
    fn ambient_back_color(&self) -> Option<OleColor>;
    fn ambient_fore_color(&self) -> Option<OleColor>;
    /// The widget's own setting first, followed by each ancestor's.
    fn right_to_left_chain(&self) -> Vec<RightToLeft>;

    fn focus(&self) -> bool;

    /// Passes the message to the window procedure the host subclassed.
    fn default_window_proc(&self, message: &WindowMessage) -> isize;
    /// The widget's own handling of the message.
    fn base_window_proc(&self, message: &WindowMessage) -> isize;
}

/// Native window primitives the ownership manager needs.
pub trait WindowSystem {
    fn register_message(&self, name: &str) -> u32;
    fn window_proc(&self, handle: WindowHandle) -> usize;
    /// Installs `proc` and returns the previous procedure.
    fn set_window_proc(&self, handle: WindowHandle, proc: usize) -> usize;
    fn send_message(&self, handle: WindowHandle, message: u32, wparam: usize, lparam: isize)
        -> isize;
    /// Invokes whatever procedure is currently installed on the window.
    fn call_window_proc(&self, message: &WindowMessage) -> isize;
    /// Reparents `handle` under the neutral parking window.
    fn park(&self, handle: WindowHandle);
    fn screen_dpi(&self) -> Option<Dpi>;
}

pub trait LocaleProvider {
    fn locale_id(&self) -> u32;
}

/// Fixed locale, used when nothing better is available.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocale(pub u32);

impl LocaleProvider for FixedLocale {
    fn locale_id(&self) -> u32 {
        self.0
    }
}

pub trait SelectionService {
    fn select(&self, host: HostId);
    fn is_selected(&self, host: HostId) -> bool;
}

pub trait ComponentChangeService {
    fn on_component_changing(&self, host: HostId, dispid: Option<i32>);
    fn on_component_changed(&self, host: HostId, dispid: Option<i32>);
}

/// Design-time service locator. Every service is optional.
pub trait ServiceProvider {
    fn selection_service(&self) -> Option<Rc<dyn SelectionService>> {
        None
    }

    fn component_change_service(&self) -> Option<Rc<dyn ComponentChangeService>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_classification() {
        let mouse = WindowMessage::new(WindowHandle(1), 0x0201);
        assert!(mouse.is_mouse());
        assert!(!mouse.is_keyboard());
        let key = WindowMessage::new(WindowHandle(1), WM_KEYUP).with_params(0x41, 0);
        assert!(key.is_keyboard());
        assert_eq!(key.wparam, 0x41);
    }
}
