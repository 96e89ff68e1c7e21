//! Container registry: which hosts live in which top-level surface, which of
//! them is active and which single one holds UI activation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use axhost_domain::{ContainerId, ControlId, PropertyValue};

use crate::context::HostContext;
use crate::host::HostInner;
use crate::widget::WidgetBase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyKey {
    index: u32,
    generation: u32,
}

/// Extender object the container exposes for one control.
///
/// Holds only an index into the container's proxy table; it stops resolving
/// once the control is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtenderProxy {
    container: ContainerId,
    key: ProxyKey,
}

impl ExtenderProxy {
    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn control(&self, context: &HostContext) -> Option<ControlId> {
        context.containers().resolve(self)
    }

    pub fn is_alive(&self, context: &HostContext) -> bool {
        self.control(context).is_some()
    }

    /// Reads an extender property. Positions and sizes are reported in twips.
    pub fn property(&self, context: &HostContext, name: &str) -> Option<PropertyValue> {
        let widget = context.containers().resolve_widget(self)?;
        let dpi = context.dpi();
        let bounds = widget.bounds();
        let value = match name.to_ascii_lowercase().as_str() {
            "name" => PropertyValue::String(widget.name()),
            "left" => PropertyValue::I32(dpi.x_to_twips(bounds.x)),
            "top" => PropertyValue::I32(dpi.y_to_twips(bounds.y)),
            "width" => PropertyValue::I32(dpi.x_to_twips(bounds.width)),
            "height" => PropertyValue::I32(dpi.y_to_twips(bounds.height)),
            "visible" => PropertyValue::Bool(widget.is_visible()),
            "enabled" => PropertyValue::Bool(widget.is_enabled()),
            "tabindex" => PropertyValue::I32(widget.tab_index()),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Default)]
struct ProxySlot {
    generation: u32,
    control: Option<ControlId>,
}

#[derive(Debug, Default)]
struct ProxyArena {
    slots: Vec<ProxySlot>,
    free: Vec<u32>,
    by_control: HashMap<ControlId, ProxyKey>,
}

impl ProxyArena {
    fn get_or_insert(&mut self, control: ControlId) -> ProxyKey {
        if let Some(key) = self.by_control.get(&control) {
            return *key;
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(ProxySlot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.control = Some(control);
        let key = ProxyKey {
            index,
            generation: slot.generation,
        };
        self.by_control.insert(control, key);
        key
    }

    fn evict(&mut self, control: ControlId) {
        let Some(key) = self.by_control.remove(&control) else {
            return;
        };
        let slot = &mut self.slots[key.index as usize];
        slot.control = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
    }

    fn resolve(&self, key: ProxyKey) -> Option<ControlId> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.control
    }

    fn len(&self) -> usize {
        self.by_control.len()
    }
}

struct Member {
    widget: Weak<dyn WidgetBase>,
    host: Option<Weak<HostInner>>,
}

#[derive(Default)]
struct Container {
    members: HashMap<ControlId, Member>,
    ui_active: Option<ControlId>,
    active: Option<ControlId>,
    proxies: ProxyArena,
}

#[derive(Default)]
pub struct ContainerRegistry {
    containers: RefCell<HashMap<ContainerId, Container>>,
}

impl ContainerRegistry {
    /// Registers a plain sibling control so hosted objects can look it up.
    pub fn add_control(&self, container: ContainerId, control: ControlId, widget: &Rc<dyn WidgetBase>) {
        self.insert(
            container,
            control,
            Member {
                widget: Rc::downgrade(widget),
                host: None,
            },
        );
    }

    pub(crate) fn add_host(
        &self,
        container: ContainerId,
        control: ControlId,
        widget: &Rc<dyn WidgetBase>,
        host: Weak<HostInner>,
    ) {
        self.insert(
            container,
            control,
            Member {
                widget: Rc::downgrade(widget),
                host: Some(host),
            },
        );
    }

    fn insert(&self, container: ContainerId, control: ControlId, member: Member) {
        let mut containers = self.containers.borrow_mut();
        containers
            .entry(container)
            .or_default()
            .members
            .insert(control, member);
        tracing::trace!(container = container.0, control = control.0, "control added to container");
    }

    /// Removes a control, evicting its proxy and vacating any slot it held.
    pub fn remove_control(&self, container: ContainerId, control: ControlId) {
        let mut containers = self.containers.borrow_mut();
        let Some(entry) = containers.get_mut(&container) else {
            return;
        };
        entry.members.remove(&control);
        entry.proxies.evict(control);
        if entry.ui_active == Some(control) {
            entry.ui_active = None;
        }
        if entry.active == Some(control) {
            entry.active = None;
        }
        if entry.members.is_empty() {
            containers.remove(&container);
        }
    }

    pub fn members(&self, container: ContainerId) -> Vec<ControlId> {
        let containers = self.containers.borrow();
        let mut members: Vec<ControlId> = containers
            .get(&container)
            .map(|entry| entry.members.keys().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn hosts(&self, container: ContainerId) -> Vec<ControlId> {
        let containers = self.containers.borrow();
        let mut hosts: Vec<ControlId> = containers
            .get(&container)
            .map(|entry| {
                entry
                    .members
                    .iter()
                    .filter(|(_, member)| member.host.is_some())
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();
        hosts.sort();
        hosts
    }

    pub fn ui_active(&self, container: ContainerId) -> Option<ControlId> {
        self.containers
            .borrow()
            .get(&container)
            .and_then(|entry| entry.ui_active)
    }

    pub fn active(&self, container: ContainerId) -> Option<ControlId> {
        self.containers
            .borrow()
            .get(&container)
            .and_then(|entry| entry.active)
    }

    /// Installs `control` as the UI-active object of its container.
    ///
    /// A previous holder is driven back to in-place activation first and only
    /// then is the slot handed over.
    pub(crate) fn on_ui_activate(&self, container: ContainerId, control: ControlId) {
        let previous = {
            let containers = self.containers.borrow();
            containers.get(&container).and_then(|entry| {
                let holder = entry.ui_active.filter(|holder| *holder != control)?;
                let host = entry.members.get(&holder)?.host.as_ref()?.upgrade();
                Some((holder, host))
            })
        };

        if let Some((holder, host)) = previous {
            tracing::debug!(
                container = container.0,
                previous = holder.0,
                next = control.0,
                "handing over UI activation"
            );
            if let Some(host) = host {
                host.yield_ui_activation();
            }
            let mut containers = self.containers.borrow_mut();
            if let Some(entry) = containers.get_mut(&container) {
                if entry.ui_active == Some(holder) {
                    tracing::warn!(previous = holder.0, "previous UI-active object did not deactivate");
                    entry.ui_active = None;
                }
            }
        }

        let mut containers = self.containers.borrow_mut();
        let entry = containers.entry(container).or_default();
        entry.ui_active = Some(control);
        entry.active = Some(control);
    }

    pub(crate) fn on_ui_deactivate(&self, container: ContainerId, control: ControlId) {
        let mut containers = self.containers.borrow_mut();
        if let Some(entry) = containers.get_mut(&container) {
            if entry.ui_active == Some(control) {
                entry.ui_active = None;
            }
        }
    }

    pub(crate) fn on_in_place_activate(&self, container: ContainerId, control: ControlId) {
        let mut containers = self.containers.borrow_mut();
        if let Some(entry) = containers.get_mut(&container) {
            entry.active = Some(control);
        }
    }

    pub(crate) fn on_in_place_deactivate(&self, container: ContainerId, control: ControlId) {
        let mut containers = self.containers.borrow_mut();
        if let Some(entry) = containers.get_mut(&container) {
            if entry.ui_active == Some(control) {
                entry.ui_active = None;
            }
            if entry.active == Some(control) {
                entry.active = None;
            }
        }
    }

    /// The extender proxy for a member control, created on first use.
    pub fn proxy_for(&self, container: ContainerId, control: ControlId) -> Option<ExtenderProxy> {
        let mut containers = self.containers.borrow_mut();
        let entry = containers.get_mut(&container)?;
        if !entry.members.contains_key(&control) {
            return None;
        }
        let key = entry.proxies.get_or_insert(control);
        Some(ExtenderProxy { container, key })
    }

    /// Looks up a sibling's proxy by control name, case-insensitively.
    pub fn find_proxy(&self, container: ContainerId, name: &str) -> Option<ExtenderProxy> {
        let control = {
            let containers = self.containers.borrow();
            let entry = containers.get(&container)?;
            entry.members.iter().find_map(|(id, member)| {
                let widget = member.widget.upgrade()?;
                widget.name().eq_ignore_ascii_case(name).then_some(*id)
            })?
        };
        self.proxy_for(container, control)
    }

    pub fn proxy_count(&self, container: ContainerId) -> usize {
        self.containers
            .borrow()
            .get(&container)
            .map(|entry| entry.proxies.len())
            .unwrap_or(0)
    }

    fn resolve(&self, proxy: &ExtenderProxy) -> Option<ControlId> {
        self.containers
            .borrow()
            .get(&proxy.container)?
            .proxies
            .resolve(proxy.key)
    }

    fn resolve_widget(&self, proxy: &ExtenderProxy) -> Option<Rc<dyn WidgetBase>> {
        let containers = self.containers.borrow();
        let entry = containers.get(&proxy.container)?;
        let control = entry.proxies.resolve(proxy.key)?;
        entry.members.get(&control)?.widget.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockWidget, MockWindows};
    use crate::units::Dpi;
    use crate::widget::FixedLocale;
    use axhost_domain::Rect;

    fn context() -> (Rc<MockWindows>, Rc<HostContext>) {
        let windows = MockWindows::new();
        windows.set_dpi(Some(Dpi::new(96, 96)));
        let context = HostContext::new(windows.clone(), Box::new(FixedLocale(1033)));
        (windows, context)
    }

    #[test]
    fn proxies_are_cached_per_control_and_evicted_on_removal() {
        let (windows, context) = context();
        let registry = context.containers();
        let widget: Rc<dyn WidgetBase> = MockWidget::new("label1", windows.clone());
        let form = ContainerId(1);
        registry.add_control(form, ControlId(7), &widget);

        let proxy = registry.proxy_for(form, ControlId(7)).expect("proxy");
        assert_eq!(registry.proxy_for(form, ControlId(7)), Some(proxy));
        assert_eq!(registry.proxy_count(form), 1);
        assert_eq!(proxy.control(&context), Some(ControlId(7)));

        registry.remove_control(form, ControlId(7));
        assert!(!proxy.is_alive(&context));
        assert_eq!(proxy.property(&context, "Name"), None);
        assert_eq!(registry.proxy_for(form, ControlId(7)), None);
    }

    #[test]
    fn reused_slot_does_not_resurrect_stale_proxy() {
        let (windows, context) = context();
        let registry = context.containers();
        let first: Rc<dyn WidgetBase> = MockWidget::new("a", windows.clone());
        let second: Rc<dyn WidgetBase> = MockWidget::new("b", windows.clone());
        let keeper: Rc<dyn WidgetBase> = MockWidget::new("keeper", windows.clone());
        let form = ContainerId(1);
        registry.add_control(form, ControlId(100), &keeper);
        registry.add_control(form, ControlId(1), &first);
        let stale = registry.proxy_for(form, ControlId(1)).expect("proxy");
        registry.remove_control(form, ControlId(1));

        registry.add_control(form, ControlId(2), &second);
        let fresh = registry.proxy_for(form, ControlId(2)).expect("proxy");
        assert_ne!(stale, fresh);
        assert_eq!(stale.control(&context), None);
        assert_eq!(fresh.control(&context), Some(ControlId(2)));
    }

    #[test]
    fn extender_properties_use_twips() {
        let (windows, context) = context();
        let registry = context.containers();
        let widget = MockWidget::new("button1", windows.clone());
        widget.set_bounds_silently(Rect::new(10, 20, 96, 48));
        let widget: Rc<dyn WidgetBase> = widget;
        let form = ContainerId(3);
        registry.add_control(form, ControlId(1), &widget);

        let proxy = registry.find_proxy(form, "BUTTON1").expect("found by name");
        assert_eq!(proxy.property(&context, "Left"), Some(PropertyValue::I32(150)));
        assert_eq!(proxy.property(&context, "width"), Some(PropertyValue::I32(1440)));
        assert_eq!(proxy.property(&context, "Height"), Some(PropertyValue::I32(720)));
        assert_eq!(
            proxy.property(&context, "Name"),
            Some(PropertyValue::String("button1".into()))
        );
        assert_eq!(proxy.property(&context, "Bogus"), None);
        assert!(registry.find_proxy(form, "missing").is_none());
    }
}
