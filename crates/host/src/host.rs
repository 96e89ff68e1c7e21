//! The host wrapper: one hosted object, its site and the widget it shows in.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use axhost_domain::{
    ActivationLevel, ContainerId, ControlId, HostConfig, HostId, Mechanism, MiscStatus,
    ObjectEvent, PersistedState, PropertyValue, Rect, WindowHandle, WindowOwnership,
};

use crate::apartment;
use crate::container::ExtenderProxy;
use crate::context::HostContext;
use crate::error::{HostError, Result};
use crate::object::{HostedObject, ObjectEventSink, ObjectFactory};
use crate::persistence::PersistenceSupport;
use crate::properties::{PropertyCache, PropertyFilter, PropertyMetadata, ReflectedProperty};
use crate::site::{ClientSite, SiteAdapter};
use crate::widget::{ServiceProvider, WidgetBase, WindowMessage};

/// Notifications a host raises to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    LevelChanged {
        from: ActivationLevel,
        to: ActivationLevel,
    },
    HandleCreated(WindowHandle),
    HandleDestroyed(WindowHandle),
    PropertyChanged {
        dispid: Option<i32>,
    },
    Object(ObjectEvent),
}

type Observer = Rc<dyn Fn(&HostEvent)>;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HostFlags {
    pub in_transition: bool,
    pub own_window: bool,
    pub faking_window: bool,
    pub need_own_window: bool,
    pub manual_update: bool,
    pub setting_bounds: bool,
    pub state_set: bool,
    pub explicit_size: bool,
    pub value_changed: bool,
    pub processing_key_up: bool,
    pub closed: bool,
}

pub(crate) struct LoadedObject {
    pub object: Rc<dyn HostedObject>,
    pub misc: MiscStatus,
    pub support: PersistenceSupport,
}

pub(crate) struct HostInner {
    pub(crate) id: HostId,
    pub(crate) control_id: ControlId,
    pub(crate) config: HostConfig,
    pub(crate) context: Rc<HostContext>,
    pub(crate) factory: Box<dyn ObjectFactory>,
    pub(crate) widget: Rc<dyn WidgetBase>,
    pub(crate) services: RefCell<Option<Rc<dyn ServiceProvider>>>,
    pub(crate) container: Cell<Option<ContainerId>>,
    pub(crate) level: Cell<ActivationLevel>,
    pub(crate) flags: Cell<HostFlags>,
    pub(crate) object: RefCell<Option<LoadedObject>>,
    pub(crate) site: RefCell<Option<Rc<SiteAdapter>>>,
    pub(crate) persisted: RefCell<Option<PersistedState>>,
    pub(crate) mechanism: Cell<Option<Mechanism>>,
    pub(crate) freeze_count: Cell<u32>,
    pub(crate) license_key: RefCell<Option<String>>,
    pub(crate) event_cookie: Cell<Option<u32>>,
    pub(crate) wndproc: Cell<usize>,
    pub(crate) focus_target: Cell<WindowHandle>,
    pub(crate) change_nesting: Cell<u32>,
    pub(crate) properties: PropertyCache,
    observers: RefCell<Vec<Observer>>,
    pub(crate) weak_self: Weak<HostInner>,
}

impl HostInner {
    pub(crate) fn flags(&self) -> HostFlags {
        self.flags.get()
    }

    pub(crate) fn update_flags(&self, edit: impl FnOnce(&mut HostFlags)) {
        let mut flags = self.flags.get();
        edit(&mut flags);
        self.flags.set(flags);
    }

    /// The hosted object, cloned out so no borrow is held while calling it.
    pub(crate) fn hosted(&self) -> Option<Rc<dyn HostedObject>> {
        self.object.borrow().as_ref().map(|loaded| loaded.object.clone())
    }

    pub(crate) fn support(&self) -> PersistenceSupport {
        self.object
            .borrow()
            .as_ref()
            .map(|loaded| loaded.support)
            .unwrap_or_default()
    }

    pub(crate) fn misc_status(&self) -> MiscStatus {
        self.object
            .borrow()
            .as_ref()
            .map(|loaded| loaded.misc)
            .unwrap_or_default()
    }

    pub(crate) fn client_site(&self) -> Option<Rc<dyn ClientSite>> {
        self.site
            .borrow()
            .as_ref()
            .map(|site| site.clone() as Rc<dyn ClientSite>)
    }

    pub(crate) fn services(&self) -> Option<Rc<dyn ServiceProvider>> {
        self.services.borrow().clone()
    }

    pub(crate) fn set_level(&self, to: ActivationLevel) {
        let from = self.level.replace(to);
        if from != to {
            tracing::debug!(host_id = %self.id, %from, %to, "activation level changed");
            self.emit(HostEvent::LevelChanged { from, to });
        }
    }

    pub(crate) fn can_ui_activate(&self) -> bool {
        self.config.user_mode || self.config.edit_mode_override
    }

    pub(crate) fn emit(&self, event: HostEvent) {
        let observers: Vec<Observer> = self.observers.borrow().clone();
        for observer in observers {
            observer(&event);
        }
    }

    pub(crate) fn event_forwarder(&self) -> Rc<dyn ObjectEventSink> {
        Rc::new(EventForwarder {
            host: self.weak_self.clone(),
        })
    }

    fn join_container(&self, container: ContainerId) {
        if let Some(previous) = self.container.get() {
            if previous == container {
                return;
            }
            self.context
                .containers()
                .remove_control(previous, self.control_id);
        }
        self.context.containers().add_host(
            container,
            self.control_id,
            &self.widget,
            self.weak_self.clone(),
        );
        self.container.set(Some(container));
    }

    fn leave_container(&self) {
        if let Some(container) = self.container.take() {
            self.context
                .containers()
                .remove_control(container, self.control_id);
        }
    }

    fn teardown(&self) -> Result<()> {
        let result = self.transition_to(ActivationLevel::Passive);
        self.leave_container();
        self.update_flags(|flags| flags.closed = true);
        self.observers.borrow_mut().clear();
        result
    }
}

struct EventForwarder {
    host: Weak<HostInner>,
}

impl ObjectEventSink for EventForwarder {
    fn on_event(&self, event: ObjectEvent) {
        if let Some(host) = self.host.upgrade() {
            tracing::trace!(host_id = %host.id, dispid = event.dispid, "object event");
            host.emit(HostEvent::Object(event));
        }
    }
}

/// Wraps one hosted object and presents it as a windowed widget.
///
/// Hosts are confined to the thread that created them and must be
/// [closed](AxHost::close) before they are dropped.
pub struct AxHost {
    inner: Rc<HostInner>,
}

impl AxHost {
    pub fn new(
        context: Rc<HostContext>,
        config: HostConfig,
        factory: Box<dyn ObjectFactory>,
        widget: Rc<dyn WidgetBase>,
    ) -> Result<Self> {
        if !apartment::is_sta() {
            return Err(HostError::NotSingleThreadedApartment);
        }

        let control_id = context.allocate_control_id();
        let license_key = config.license_key.clone().filter(|key| !key.is_empty());
        let inner = Rc::new_cyclic(|weak_self| HostInner {
            id: HostId::new(),
            control_id,
            config,
            context: context.clone(),
            factory,
            widget,
            services: RefCell::new(None),
            container: Cell::new(None),
            level: Cell::new(ActivationLevel::Passive),
            flags: Cell::new(HostFlags::default()),
            object: RefCell::new(None),
            site: RefCell::new(None),
            persisted: RefCell::new(None),
            mechanism: Cell::new(None),
            freeze_count: Cell::new(0),
            license_key: RefCell::new(license_key),
            event_cookie: Cell::new(None),
            wndproc: Cell::new(0),
            focus_target: Cell::new(WindowHandle::NULL),
            change_nesting: Cell::new(0),
            properties: PropertyCache::default(),
            observers: RefCell::new(Vec::new()),
            weak_self: weak_self.clone(),
        });
        context.host_created();
        tracing::debug!(
            host_id = %inner.id,
            class_id = inner.factory.class_id(),
            user_mode = inner.config.user_mode,
            "host created"
        );
        Ok(Self { inner })
    }

    pub fn id(&self) -> HostId {
        self.inner.id
    }

    pub fn control_id(&self) -> ControlId {
        self.inner.control_id
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &Rc<HostContext> {
        &self.inner.context
    }

    pub fn level(&self) -> ActivationLevel {
        self.inner.level.get()
    }

    pub fn ownership(&self) -> WindowOwnership {
        self.inner.ownership()
    }

    pub fn handle(&self) -> Option<WindowHandle> {
        self.inner.widget.handle()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.flags().closed
    }

    /// True once a resubclass repair forced bounds to be pushed by hand.
    pub fn manual_update(&self) -> bool {
        self.inner.flags().manual_update
    }

    /// Window that most recently received focus from the host, while a
    /// focus-lost message is being processed.
    pub fn focus_target(&self) -> WindowHandle {
        self.inner.focus_target.get()
    }

    pub fn object(&self) -> Option<Rc<dyn HostedObject>> {
        self.inner.hosted()
    }

    pub fn site(&self) -> Option<Rc<dyn ClientSite>> {
        self.inner.client_site()
    }

    pub fn set_services(&self, services: Option<Rc<dyn ServiceProvider>>) {
        *self.inner.services.borrow_mut() = services;
    }

    pub fn subscribe(&self, observer: impl Fn(&HostEvent) + 'static) {
        self.inner.observers.borrow_mut().push(Rc::new(observer));
    }

    pub fn join_container(&self, container: ContainerId) {
        self.inner.join_container(container);
    }

    pub fn leave_container(&self) {
        self.inner.leave_container();
    }

    pub fn container(&self) -> Option<ContainerId> {
        self.inner.container.get()
    }

    pub fn extender(&self) -> Option<ExtenderProxy> {
        let container = self.inner.container.get()?;
        self.inner
            .context
            .containers()
            .proxy_for(container, self.inner.control_id)
    }

    pub fn transition_to(&self, target: ActivationLevel) -> Result<()> {
        self.inner.transition_to(target)
    }

    pub fn create_handle(&self) -> Result<()> {
        self.inner.create_handle()
    }

    pub fn set_visible(&self, visible: bool) -> Result<()> {
        self.inner.set_visible(visible)
    }

    pub fn bounds(&self) -> Rect {
        self.inner.widget.bounds()
    }

    pub fn set_bounds(&self, bounds: Rect) {
        self.inner.update_flags(|flags| flags.explicit_size = true);
        self.inner.set_bounds(bounds);
    }

    /// Initial placement. Unlike [`set_bounds`](Self::set_bounds) a default
    /// size stays open to the object's natural size.
    pub fn place(&self, bounds: Rect) {
        self.inner.set_bounds(bounds);
    }

    pub fn handle_message(&self, message: &WindowMessage) -> isize {
        self.inner.handle_message(message)
    }

    pub fn attach_window(&self, handle: WindowHandle) {
        self.inner.attach_window(handle);
    }

    pub fn destroy_fake_window(&self) {
        self.inner.destroy_fake_window();
    }

    pub fn check_subclassing(&self) -> bool {
        self.inner.check_subclassing()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    pub fn snapshot(&self) -> Option<PersistedState> {
        self.inner.snapshot()
    }

    pub fn restore(&self, state: PersistedState) -> Result<()> {
        self.inner.restore(state)
    }

    pub fn license_key(&self) -> Option<String> {
        self.inner.license_key.borrow().clone()
    }

    pub fn properties(&self, filter: &PropertyFilter) -> Rc<[ReflectedProperty]> {
        self.inner.properties(filter)
    }

    pub fn refresh_properties(&self) {
        self.inner.refresh_properties();
    }

    pub fn property_value(&self, name: &str) -> Result<Option<PropertyValue>> {
        self.inner.property_value(name)
    }

    pub fn set_property_value(&self, name: &str, value: PropertyValue) -> Result<bool> {
        self.inner.set_property_value(name, value)
    }

    /// Display text, property page and predefined values of one property.
    /// Looked up once and cached until the object reports the property changed.
    pub fn property_metadata(&self, name: &str) -> Result<Rc<PropertyMetadata>> {
        self.inner.property_metadata(name)
    }

    pub fn predefined_value(&self, name: &str, display: &str) -> Result<Option<PropertyValue>> {
        self.inner.predefined_value(name, display)
    }

    pub fn has_property_pages(&self) -> bool {
        self.inner.has_property_pages()
    }

    pub fn show_property_pages(&self, dispid: Option<i32>) -> Result<()> {
        self.inner.show_property_pages(dispid)
    }

    /// Releases the hosted object and leaves the container.
    pub fn close(&self) -> Result<()> {
        if self.inner.flags().closed {
            return Ok(());
        }
        let result = self.inner.teardown();
        self.inner.context.host_released(false);
        tracing::debug!(host_id = %self.inner.id, "host closed");
        result
    }
}

impl Drop for AxHost {
    fn drop(&mut self) {
        if self.inner.flags().closed {
            return;
        }
        tracing::warn!(
            host_id = %self.inner.id,
            level = %self.inner.level.get(),
            "host dropped without close, releasing on the owning thread"
        );
        if let Err(err) = self.inner.teardown() {
            tracing::warn!(host_id = %self.inner.id, error = %err, "teardown of leaked host failed");
        }
        self.inner.context.host_released(true);
    }
}

impl std::fmt::Debug for AxHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxHost")
            .field("id", &self.inner.id)
            .field("level", &self.inner.level.get())
            .field("ownership", &self.inner.ownership())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use axhost_domain::HostConfig;

    use super::AxHost;
    use crate::context::HostContext;
    use crate::error::HostError;
    use crate::testing::{MockFactory, MockObject, MockWidget, MockWindows};
    use crate::widget::FixedLocale;

    #[test]
    fn hosts_refuse_threads_outside_the_apartment() {
        let windows = MockWindows::new();
        let context = HostContext::new(windows.clone(), Box::new(FixedLocale(1033)));
        let widget = MockWidget::new("axHost1", windows);
        let factory = MockFactory::new(Rc::new(MockObject::new()));

        let result = AxHost::new(context.clone(), HostConfig::default(), Box::new(factory), widget);
        assert!(matches!(result, Err(HostError::NotSingleThreadedApartment)));
        assert_eq!(context.leaked_hosts(), 0);
    }
}
