//! Collaborators the apartment thread builds hosts from.

use std::rc::{Rc, Weak};
use std::time::Duration;

use anyhow::Result;
use axhost_com::PumpStatus;
use axhost_core::{AxHost, HostContext, ObjectFactory, WidgetBase};
use axhost_domain::{Rect, WindowHandle};

/// Everything platform specific the apartment thread needs.
///
/// A backend is created on the apartment thread and never leaves it.
pub trait Backend {
    fn context(&self) -> Rc<HostContext>;
    fn factory(&self, class_id: &str) -> Result<Box<dyn ObjectFactory>>;
    fn widget(&self, name: &str, parent: WindowHandle, bounds: Rect)
        -> Result<Rc<dyn WidgetBase>>;

    /// Starts delivering the widget's window messages to `host`.
    fn route_messages(&self, _name: &str, _host: Weak<AxHost>) {}

    /// Forgets a widget whose host was closed.
    fn release_widget(&self, _name: &str) {}

    /// Runs the thread's message loop for at most `timeout`.
    fn pump(&self, timeout: Duration) -> PumpStatus;
}

#[cfg(windows)]
pub use native::ComBackend;

#[cfg(windows)]
mod native {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use anyhow::Context;
    use axhost_com::{ComObjectFactory, OleApartment, SystemLocale, Win32Widget, Win32Windows};

    use super::*;

    pub struct ComBackend {
        context: Rc<HostContext>,
        widgets: RefCell<HashMap<String, Rc<Win32Widget>>>,
        apartment: OleApartment,
    }

    impl ComBackend {
        pub fn new() -> Result<Self> {
            let apartment = OleApartment::new()?;
            let context = HostContext::new(Win32Windows::new(), Box::new(SystemLocale));
            Ok(Self {
                context,
                widgets: RefCell::new(HashMap::new()),
                apartment,
            })
        }
    }

    impl Backend for ComBackend {
        fn context(&self) -> Rc<HostContext> {
            self.context.clone()
        }

        fn factory(&self, class_id: &str) -> Result<Box<dyn ObjectFactory>> {
            let factory = ComObjectFactory::new(class_id, self.context.clone())
                .with_context(|| format!("unknown object class {class_id}"))?;
            Ok(Box::new(factory))
        }

        fn widget(
            &self,
            name: &str,
            parent: WindowHandle,
            bounds: Rect,
        ) -> Result<Rc<dyn WidgetBase>> {
            let widget = Win32Widget::new(name, parent, bounds);
            self.widgets
                .borrow_mut()
                .insert(name.to_string(), widget.clone());
            Ok(widget)
        }

        fn route_messages(&self, name: &str, host: Weak<AxHost>) {
            let widget = self.widgets.borrow().get(name).cloned();
            if let Some(widget) = widget {
                let fallback = Rc::downgrade(&widget);
                widget.set_message_handler(move |message| match host.upgrade() {
                    Some(host) => host.handle_message(message),
                    None => fallback
                        .upgrade()
                        .map(|widget| widget.default_window_proc(message))
                        .unwrap_or(0),
                });
            }
        }

        fn release_widget(&self, name: &str) {
            if let Some(widget) = self.widgets.borrow_mut().remove(name) {
                widget.clear_message_handler();
            }
        }

        fn pump(&self, timeout: Duration) -> PumpStatus {
            self.apartment.pump(timeout)
        }
    }
}
