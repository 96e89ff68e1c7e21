use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use axhost_domain::{ControlId, FontDescriptor};

use crate::container::ContainerRegistry;
use crate::units::Dpi;
use crate::widget::{LocaleProvider, WindowSystem, SUBCLASS_CHECK_MESSAGE};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FontKey {
    name: String,
    size_bits: u32,
    weight: i16,
    italic: bool,
    underline: bool,
    strikethrough: bool,
    charset: i16,
}

impl From<&FontDescriptor> for FontKey {
    fn from(font: &FontDescriptor) -> Self {
        Self {
            name: font.name.to_lowercase(),
            size_bits: font.size_points.to_bits(),
            weight: font.weight,
            italic: font.italic,
            underline: font.underline,
            strikethrough: font.strikethrough,
            charset: font.charset,
        }
    }
}

/// Interns ambient font descriptors by font identity.
#[derive(Debug, Default)]
pub struct FontCache {
    entries: RefCell<HashMap<FontKey, Rc<FontDescriptor>>>,
}

impl FontCache {
    pub fn intern(&self, font: &FontDescriptor) -> Rc<FontDescriptor> {
        let key = FontKey::from(font);
        self.entries
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| Rc::new(font.clone()))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Apartment-wide state shared by every host created on one thread.
///
/// Replaces process globals: the screen DPI and font caches are filled
/// lazily and can be invalidated, and the container registry lives here.
pub struct HostContext {
    windows: Rc<dyn WindowSystem>,
    locale: Box<dyn LocaleProvider>,
    dpi: Cell<Option<Dpi>>,
    fonts: FontCache,
    subclass_message: Cell<Option<u32>>,
    containers: ContainerRegistry,
    next_control: Cell<u64>,
    live_hosts: Cell<usize>,
    leaked_hosts: Cell<usize>,
}

impl HostContext {
    pub fn new(windows: Rc<dyn WindowSystem>, locale: Box<dyn LocaleProvider>) -> Rc<Self> {
        Rc::new(Self {
            windows,
            locale,
            dpi: Cell::new(None),
            fonts: FontCache::default(),
            subclass_message: Cell::new(None),
            containers: ContainerRegistry::default(),
            next_control: Cell::new(1),
            live_hosts: Cell::new(0),
            leaked_hosts: Cell::new(0),
        })
    }

    pub fn windows(&self) -> &dyn WindowSystem {
        self.windows.as_ref()
    }

    pub fn dpi(&self) -> Dpi {
        if let Some(dpi) = self.dpi.get() {
            return dpi;
        }
        self.refresh_dpi()
    }

    pub fn refresh_dpi(&self) -> Dpi {
        let dpi = self.windows.screen_dpi().unwrap_or_else(|| {
            tracing::warn!("screen DPI unavailable, assuming 96");
            Dpi::DEFAULT
        });
        self.dpi.set(Some(dpi));
        dpi
    }

    pub fn locale_id(&self) -> u32 {
        self.locale.locale_id()
    }

    pub fn fonts(&self) -> &FontCache {
        &self.fonts
    }

    pub fn subclass_check_message(&self) -> u32 {
        if let Some(message) = self.subclass_message.get() {
            return message;
        }
        let message = self.windows.register_message(SUBCLASS_CHECK_MESSAGE);
        self.subclass_message.set(Some(message));
        message
    }

    pub fn containers(&self) -> &ContainerRegistry {
        &self.containers
    }

    pub fn allocate_control_id(&self) -> ControlId {
        let id = self.next_control.get();
        self.next_control.set(id + 1);
        ControlId(id)
    }

    pub fn live_hosts(&self) -> usize {
        self.live_hosts.get()
    }

    /// Hosts that were dropped without being closed.
    pub fn leaked_hosts(&self) -> usize {
        self.leaked_hosts.get()
    }

    pub(crate) fn host_created(&self) {
        self.live_hosts.set(self.live_hosts.get() + 1);
    }

    pub(crate) fn host_released(&self, leaked: bool) {
        self.live_hosts.set(self.live_hosts.get().saturating_sub(1));
        if leaked {
            self.leaked_hosts.set(self.leaked_hosts.get() + 1);
        }
    }

    /// Drops cached DPI and fonts so the next use re-reads them.
    pub fn reset_caches(&self) {
        self.dpi.set(None);
        self.fonts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWindows;
    use crate::widget::FixedLocale;

    #[test]
    fn dpi_is_read_once_until_refreshed() {
        let windows = MockWindows::new();
        windows.set_dpi(Some(Dpi::new(120, 120)));
        let context = HostContext::new(windows.clone(), Box::new(FixedLocale(1033)));

        assert_eq!(context.dpi(), Dpi::new(120, 120));
        windows.set_dpi(Some(Dpi::new(144, 144)));
        assert_eq!(context.dpi(), Dpi::new(120, 120));
        assert_eq!(context.refresh_dpi(), Dpi::new(144, 144));
        assert_eq!(windows.dpi_queries(), 2);

        windows.set_dpi(None);
        context.reset_caches();
        assert_eq!(context.dpi(), Dpi::DEFAULT);
    }

    #[test]
    fn fonts_are_interned_by_identity() {
        let context = HostContext::new(MockWindows::new(), Box::new(FixedLocale(1033)));
        let first = context.fonts().intern(&FontDescriptor::new("Segoe UI", 9.0));
        let second = context.fonts().intern(&FontDescriptor::new("segoe ui", 9.0));
        assert!(Rc::ptr_eq(&first, &second));

        let mut bold = FontDescriptor::new("Segoe UI", 9.0);
        bold.weight = 700;
        context.fonts().intern(&bold);
        assert_eq!(context.fonts().len(), 2);
    }

    #[test]
    fn subclass_message_is_registered_once() {
        let windows = MockWindows::new();
        let context = HostContext::new(windows.clone(), Box::new(FixedLocale(1033)));
        let first = context.subclass_check_message();
        assert_eq!(context.subclass_check_message(), first);
        assert_eq!(windows.registered_messages(), vec![SUBCLASS_CHECK_MESSAGE.to_string()]);
    }
}
