//! In-memory collaborators that record every call, for tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use axhost_domain::{
    FontDescriptor, HostConfig, HostId, MiscStatus, ObjectEvent, OleColor, PropertyBag,
    PropertyValue, Rect, RightToLeft, Size, Verb, WindowHandle,
};

use crate::apartment::{self, StaGuard};
use crate::context::HostContext;
use crate::error::{ObjectError, ObjectResult, CLASS_E_NOTLICENSED, DISP_E_MEMBERNOTFOUND};
use crate::host::AxHost;
use crate::object::{
    Automation, CategorizeProperties, DirtyState, HostedObject, ObjectEventSink, ObjectFactory,
    PerPropertyBrowsing, PersistPropertyBag, PersistStorage, PersistStream, PersistStreamInit,
    PredefinedValue, PropertyInfo, PropertyPages, QuickActivateReply, QuickActivateRequest,
};
use crate::site::ClientSite;
use crate::units::Dpi;
use crate::widget::{
    ComponentChangeService, FixedLocale, SelectionService, ServiceProvider, WidgetBase,
    WindowMessage, WindowStyle, WindowSystem,
};

/// Window procedure the host installs when it subclasses a window.
pub const HOST_PROC: usize = 0x1000;
/// Window procedure of windows created by a mock object.
pub const OBJECT_PROC: usize = 0x2000;
const HOSTILE_PROC: usize = 0x3000;
const FORWARDING_PROC: usize = 0x4000;
const FIRST_REGISTERED_MESSAGE: u32 = 0xC000;

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    proc_: usize,
    host_created: bool,
    alive: bool,
    forwards: bool,
}

#[derive(Debug)]
pub struct MockWindows {
    dpi: Cell<Option<Dpi>>,
    dpi_queries: Cell<usize>,
    registered: RefCell<Vec<String>>,
    windows: RefCell<HashMap<WindowHandle, WindowRecord>>,
    next_handle: Cell<isize>,
    parked: RefCell<Vec<WindowHandle>>,
    forwarded: RefCell<Vec<u32>>,
}

impl MockWindows {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            dpi: Cell::new(Some(Dpi::DEFAULT)),
            dpi_queries: Cell::new(0),
            registered: RefCell::new(Vec::new()),
            windows: RefCell::new(HashMap::new()),
            next_handle: Cell::new(0x100),
            parked: RefCell::new(Vec::new()),
            forwarded: RefCell::new(Vec::new()),
        })
    }

    pub fn set_dpi(&self, dpi: Option<Dpi>) {
        self.dpi.set(dpi);
    }

    pub fn dpi_queries(&self) -> usize {
        self.dpi_queries.get()
    }

    pub fn registered_messages(&self) -> Vec<String> {
        self.registered.borrow().clone()
    }

    pub fn create_window(&self, host_created: bool) -> WindowHandle {
        let handle = WindowHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 4);
        self.windows.borrow_mut().insert(
            handle,
            WindowRecord {
                proc_: if host_created { HOST_PROC } else { OBJECT_PROC },
                host_created,
                alive: true,
                forwards: false,
            },
        );
        handle
    }

    pub fn destroy_window(&self, handle: WindowHandle) {
        if let Some(record) = self.windows.borrow_mut().get_mut(&handle) {
            record.alive = false;
        }
    }

    pub fn is_alive(&self, handle: WindowHandle) -> bool {
        self.record(handle).is_some_and(|record| record.alive)
    }

    pub fn is_host_created(&self, handle: WindowHandle) -> bool {
        self.record(handle).is_some_and(|record| record.host_created)
    }

    pub fn window_proc_of(&self, handle: WindowHandle) -> usize {
        self.record(handle).map_or(0, |record| record.proc_)
    }

    /// Replaces the window procedure with one that swallows every message.
    pub fn hostile_subclass(&self, handle: WindowHandle) {
        self.replace_proc(handle, HOSTILE_PROC, false);
    }

    /// Replaces the window procedure with one that forwards to the previous one.
    pub fn forwarding_subclass(&self, handle: WindowHandle) {
        self.replace_proc(handle, FORWARDING_PROC, true);
    }

    pub fn parked(&self) -> Vec<WindowHandle> {
        self.parked.borrow().clone()
    }

    /// Messages passed on to the installed window procedure.
    pub fn forwarded(&self) -> Vec<u32> {
        self.forwarded.borrow().clone()
    }

    fn record(&self, handle: WindowHandle) -> Option<WindowRecord> {
        self.windows.borrow().get(&handle).copied()
    }

    fn replace_proc(&self, handle: WindowHandle, proc_: usize, forwards: bool) {
        if let Some(record) = self.windows.borrow_mut().get_mut(&handle) {
            record.proc_ = proc_;
            record.forwards = forwards;
        }
    }
}

impl WindowSystem for MockWindows {
    fn register_message(&self, name: &str) -> u32 {
        let mut registered = self.registered.borrow_mut();
        let index = match registered.iter().position(|known| known == name) {
            Some(index) => index,
            None => {
                registered.push(name.to_string());
                registered.len() - 1
            }
        };
        FIRST_REGISTERED_MESSAGE + index as u32
    }

    fn window_proc(&self, handle: WindowHandle) -> usize {
        self.window_proc_of(handle)
    }

    fn set_window_proc(&self, handle: WindowHandle, proc_: usize) -> usize {
        let mut windows = self.windows.borrow_mut();
        match windows.get_mut(&handle) {
            Some(record) if record.alive => {
                let previous = record.proc_;
                record.proc_ = proc_;
                record.forwards = false;
                previous
            }
            _ => 0,
        }
    }

    fn send_message(&self, handle: WindowHandle, message: u32, _wparam: usize, _lparam: isize) -> isize {
        let Some(record) = self.record(handle) else {
            return 0;
        };
        let reaches_host = record.proc_ == HOST_PROC || record.forwards;
        if message >= FIRST_REGISTERED_MESSAGE && record.alive && reaches_host {
            crate::widget::SUBCLASS_CHECK_SENTINEL
        } else {
            0
        }
    }

    fn call_window_proc(&self, message: &WindowMessage) -> isize {
        self.forwarded.borrow_mut().push(message.message);
        0
    }

    fn park(&self, handle: WindowHandle) {
        self.parked.borrow_mut().push(handle);
    }

    fn screen_dpi(&self) -> Option<Dpi> {
        self.dpi_queries.set(self.dpi_queries.get() + 1);
        self.dpi.get()
    }
}

pub struct MockWidget {
    name: String,
    windows: Rc<MockWindows>,
    handle: Cell<Option<WindowHandle>>,
    owns_handle: Cell<bool>,
    saved_proc: Cell<usize>,
    bounds: Cell<Rect>,
    visible: Cell<bool>,
    has_parent: Cell<bool>,
    parent_visible: Cell<bool>,
    font: RefCell<Option<FontDescriptor>>,
    back_color: Cell<Option<OleColor>>,
    fore_color: Cell<Option<OleColor>>,
    right_to_left: RefCell<Vec<RightToLeft>>,
    set_bounds_core_calls: Cell<usize>,
    update_bounds_calls: Cell<usize>,
    default_messages: RefCell<Vec<u32>>,
    base_messages: RefCell<Vec<u32>>,
}

impl MockWidget {
    pub const PARENT: WindowHandle = WindowHandle(0x10);

    pub fn new(name: &str, windows: Rc<MockWindows>) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            windows,
            handle: Cell::new(None),
            owns_handle: Cell::new(false),
            saved_proc: Cell::new(0),
            bounds: Cell::new(Rect::new(0, 0, 75, 23)),
            visible: Cell::new(true),
            has_parent: Cell::new(true),
            parent_visible: Cell::new(true),
            font: RefCell::new(None),
            back_color: Cell::new(None),
            fore_color: Cell::new(None),
            right_to_left: RefCell::new(Vec::new()),
            set_bounds_core_calls: Cell::new(0),
            update_bounds_calls: Cell::new(0),
            default_messages: RefCell::new(Vec::new()),
            base_messages: RefCell::new(Vec::new()),
        })
    }

    pub fn set_bounds_silently(&self, bounds: Rect) {
        self.bounds.set(bounds);
    }

    pub fn is_visible_flag(&self) -> bool {
        self.visible.get()
    }

    pub fn set_visible_flag(&self, visible: bool) {
        self.visible.set(visible);
    }

    pub fn set_parent(&self, has_parent: bool, parent_visible: bool) {
        self.has_parent.set(has_parent);
        self.parent_visible.set(parent_visible);
    }

    pub fn set_ambient_font(&self, font: Option<FontDescriptor>) {
        *self.font.borrow_mut() = font;
    }

    pub fn set_ambient_colors(&self, back: Option<OleColor>, fore: Option<OleColor>) {
        self.back_color.set(back);
        self.fore_color.set(fore);
    }

    pub fn set_right_to_left_chain(&self, chain: Vec<RightToLeft>) {
        *self.right_to_left.borrow_mut() = chain;
    }

    pub fn set_bounds_core_calls(&self) -> usize {
        self.set_bounds_core_calls.get()
    }

    pub fn update_bounds_calls(&self) -> usize {
        self.update_bounds_calls.get()
    }

    pub fn default_messages(&self) -> Vec<u32> {
        self.default_messages.borrow().clone()
    }

    pub fn base_messages(&self) -> Vec<u32> {
        self.base_messages.borrow().clone()
    }
}

impl WidgetBase for MockWidget {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn handle(&self) -> Option<WindowHandle> {
        self.handle.get()
    }

    fn create_native_handle(&self, _style: WindowStyle) -> ObjectResult<WindowHandle> {
        let handle = self.windows.create_window(true);
        self.handle.set(Some(handle));
        self.owns_handle.set(true);
        Ok(handle)
    }

    fn destroy_native_handle(&self) {
        if let Some(handle) = self.handle.get() {
            if self.owns_handle.get() {
                self.windows.destroy_window(handle);
                self.handle.set(None);
                self.owns_handle.set(false);
            }
        }
    }

    fn assign_handle(&self, handle: WindowHandle) {
        let previous = self.windows.set_window_proc(handle, HOST_PROC);
        self.saved_proc.set(previous);
        self.handle.set(Some(handle));
        self.owns_handle.set(false);
    }

    fn release_handle(&self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !self.owns_handle.get() && self.windows.is_alive(handle) {
            self.windows.set_window_proc(handle, self.saved_proc.get());
        }
        self.owns_handle.set(false);
    }

    fn bounds(&self) -> Rect {
        self.bounds.get()
    }

    fn set_bounds_core(&self, bounds: Rect) {
        self.set_bounds_core_calls.set(self.set_bounds_core_calls.get() + 1);
        self.bounds.set(bounds);
    }

    fn update_bounds(&self) {
        self.update_bounds_calls.set(self.update_bounds_calls.get() + 1);
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn set_visible_state(&self, visible: bool) {
        self.visible.set(visible);
    }

    fn has_parent(&self) -> bool {
        self.has_parent.get()
    }

    fn parent_handle(&self) -> WindowHandle {
        if self.has_parent.get() {
            Self::PARENT
        } else {
            WindowHandle::NULL
        }
    }

    fn parent_visible(&self) -> bool {
        self.parent_visible.get()
    }

    fn ambient_font(&self) -> Option<FontDescriptor> {
        self.font.borrow().clone()
    }

    fn ambient_back_color(&self) -> Option<OleColor> {
        self.back_color.get()
    }

    fn ambient_fore_color(&self) -> Option<OleColor> {
        self.fore_color.get()
    }

    fn right_to_left_chain(&self) -> Vec<RightToLeft> {
        self.right_to_left.borrow().clone()
    }

    fn focus(&self) -> bool {
        true
    }

    fn default_window_proc(&self, message: &WindowMessage) -> isize {
        self.default_messages.borrow_mut().push(message.message);
        0
    }

    fn base_window_proc(&self, message: &WindowMessage) -> isize {
        self.base_messages.borrow_mut().push(message.message);
        0
    }
}

/// Persistence protocols a [`MockObject`] answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockPersistence {
    pub stream_init: bool,
    pub stream: bool,
    pub storage: bool,
    pub property_bag: bool,
}

impl MockPersistence {
    pub fn none() -> Self {
        Self {
            stream_init: false,
            stream: false,
            storage: false,
            property_bag: false,
        }
    }

    pub fn all() -> Self {
        Self {
            stream_init: true,
            stream: true,
            storage: true,
            property_bag: true,
        }
    }

    pub fn stream_init_only() -> Self {
        Self {
            stream_init: true,
            ..Self::none()
        }
    }

    pub fn stream_only() -> Self {
        Self {
            stream: true,
            ..Self::none()
        }
    }

    pub fn storage_only() -> Self {
        Self {
            storage: true,
            ..Self::none()
        }
    }

    pub fn bag_only() -> Self {
        Self {
            property_bag: true,
            ..Self::none()
        }
    }
}

impl Default for MockPersistence {
    fn default() -> Self {
        Self::stream_init_only()
    }
}

/// Scriptable hosted object.
///
/// By default it behaves like a well-mannered control: it reports its
/// activation through the site, creates its window when shown and destroys
/// it when deactivated.
pub struct MockObject {
    label: String,
    misc: MiscStatus,
    quick: bool,
    persistence: MockPersistence,
    callbacks: bool,
    deactivate_on_ui_activate: bool,
    deactivate_on_hide: bool,
    notify_on_read: bool,
    failures: HashMap<String, ObjectError>,
    categories: HashMap<i32, i32>,
    category_names: HashMap<i32, String>,
    predefined: HashMap<i32, Vec<(String, PropertyValue)>>,
    pages_by_property: HashMap<i32, String>,
    pages: Vec<String>,
    windows: RefCell<Option<Rc<MockWindows>>>,
    calls: RefCell<Vec<String>>,
    verbs: RefCell<Vec<Verb>>,
    site: RefCell<Option<Rc<dyn ClientSite>>>,
    site_assignments: Cell<usize>,
    window: Cell<Option<WindowHandle>>,
    in_place: Cell<bool>,
    ui_active: Cell<bool>,
    extent: Cell<Size>,
    data: RefCell<Vec<u8>>,
    dirty: Cell<DirtyState>,
    bag: RefCell<PropertyBag>,
    freeze: Cell<i32>,
    sinks: RefCell<Vec<(u32, Rc<dyn ObjectEventSink>)>>,
    next_cookie: Cell<u32>,
    properties: RefCell<Vec<(PropertyInfo, PropertyValue)>>,
}

impl MockObject {
    pub fn new() -> Self {
        Self {
            label: "mock".to_string(),
            misc: MiscStatus::default(),
            quick: false,
            persistence: MockPersistence::default(),
            callbacks: true,
            deactivate_on_ui_activate: false,
            deactivate_on_hide: false,
            notify_on_read: false,
            failures: HashMap::new(),
            categories: HashMap::new(),
            category_names: HashMap::new(),
            predefined: HashMap::new(),
            pages_by_property: HashMap::new(),
            pages: Vec::new(),
            windows: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
            verbs: RefCell::new(Vec::new()),
            site: RefCell::new(None),
            site_assignments: Cell::new(0),
            window: Cell::new(None),
            in_place: Cell::new(false),
            ui_active: Cell::new(false),
            extent: Cell::new(Dpi::DEFAULT.size_to_himetric(Size::new(75, 23))),
            data: RefCell::new(Vec::new()),
            dirty: Cell::new(DirtyState::Clean),
            bag: RefCell::new(PropertyBag::new()),
            freeze: Cell::new(0),
            sinks: RefCell::new(Vec::new()),
            next_cookie: Cell::new(1),
            properties: RefCell::new(Vec::new()),
        }
    }

    pub fn labelled(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn supporting_quick_activation(mut self) -> Self {
        self.quick = true;
        self
    }

    /// Makes `method` answer `error` from now on.
    pub fn failing(mut self, method: &str, error: ObjectError) -> Self {
        self.failures.insert(method.to_string(), error);
        self
    }

    pub fn with_misc_status(mut self, misc: MiscStatus) -> Self {
        self.misc = misc;
        self
    }

    pub fn with_persistence(mut self, persistence: MockPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// UI activation makes the object leave in-place activation instead.
    pub fn deactivating_on_ui_activate(mut self) -> Self {
        self.deactivate_on_ui_activate = true;
        self
    }

    /// The hide verb makes the object leave in-place activation and drop its window.
    pub fn deactivating_on_hide(mut self) -> Self {
        self.deactivate_on_hide = true;
        self
    }

    /// The object never reports its activation changes to the site.
    pub fn without_callbacks(mut self) -> Self {
        self.callbacks = false;
        self
    }

    /// Reading a property raises a change notification.
    pub fn notifying_on_read(mut self) -> Self {
        self.notify_on_read = true;
        self
    }

    /// Natural size in pixels at 96 DPI.
    pub fn with_natural_size(self, size: Size) -> Self {
        self.extent.set(Dpi::DEFAULT.size_to_himetric(size));
        self
    }

    pub fn with_property(self, info: PropertyInfo, value: PropertyValue) -> Self {
        self.properties.borrow_mut().push((info, value));
        self
    }

    pub fn with_category(mut self, dispid: i32, category: i32) -> Self {
        self.categories.insert(dispid, category);
        self
    }

    pub fn with_category_name(mut self, category: i32, name: &str) -> Self {
        self.category_names.insert(category, name.to_string());
        self
    }

    pub fn with_predefined(mut self, dispid: i32, values: Vec<(&str, PropertyValue)>) -> Self {
        let values = values
            .into_iter()
            .map(|(display, value)| (display.to_string(), value))
            .collect();
        self.predefined.insert(dispid, values);
        self
    }

    pub fn with_property_page(mut self, dispid: i32, page: &str) -> Self {
        self.pages_by_property.insert(dispid, page.to_string());
        self
    }

    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        self.pages = pages;
        self
    }

    pub fn attach_windows(&self, windows: Rc<MockWindows>) {
        *self.windows.borrow_mut() = Some(windows);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.calls.borrow().iter().filter(|call| *call == name).count()
    }

    pub fn verb_count(&self, verb: Verb) -> usize {
        self.verbs.borrow().iter().filter(|seen| **seen == verb).count()
    }

    /// Number of times a site was handed over with `set_client_site`.
    pub fn site_assignments(&self) -> usize {
        self.site_assignments.get()
    }

    pub fn site(&self) -> Option<Rc<dyn ClientSite>> {
        self.site.borrow().clone()
    }

    pub fn current_window(&self) -> Option<WindowHandle> {
        self.window.get()
    }

    pub fn extent_pixels(&self) -> Size {
        Dpi::DEFAULT.size_from_himetric(self.extent.get())
    }

    pub fn set_data(&self, data: Vec<u8>) {
        *self.data.borrow_mut() = data;
        self.dirty.set(DirtyState::Dirty);
    }

    pub fn data(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    pub fn set_dirty(&self, dirty: DirtyState) {
        self.dirty.set(dirty);
    }

    pub fn bag_write(&self, name: &str, value: PropertyValue) {
        self.bag.borrow_mut().write(name, value);
    }

    pub fn freeze_depth(&self) -> i32 {
        self.freeze.get()
    }

    pub fn event_sinks(&self) -> usize {
        self.sinks.borrow().len()
    }

    /// Raises an outgoing event to every connected sink.
    pub fn fire_event(&self, event: ObjectEvent) {
        let sinks: Vec<Rc<dyn ObjectEventSink>> =
            self.sinks.borrow().iter().map(|(_, sink)| sink.clone()).collect();
        for sink in sinks {
            sink.on_event(event.clone());
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    fn check(&self, method: &str) -> ObjectResult<()> {
        match self.failures.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn activate_in_place(&self) -> ObjectResult<()> {
        if self.in_place.get() {
            return Ok(());
        }
        let windows = self
            .windows
            .borrow()
            .clone()
            .ok_or_else(|| ObjectError::failed("no window system"))?;
        self.window.set(Some(windows.create_window(false)));
        self.in_place.set(true);
        if self.callbacks {
            if let Some(site) = self.site() {
                site.on_in_place_activate();
                site.show_object()?;
            }
        }
        Ok(())
    }

    fn deactivate_in_place(&self) {
        if !self.in_place.get() {
            return;
        }
        self.in_place.set(false);
        self.ui_active.set(false);
        if self.callbacks {
            if let Some(site) = self.site() {
                site.on_in_place_deactivate();
            }
        }
        if let Some(handle) = self.window.take() {
            if let Some(windows) = self.windows.borrow().clone() {
                windows.destroy_window(handle);
            }
        }
    }

    fn stream_load(&self, data: &[u8]) -> ObjectResult<()> {
        self.record("load");
        self.check("load")?;
        *self.data.borrow_mut() = data.to_vec();
        self.dirty.set(DirtyState::Clean);
        Ok(())
    }

    fn stream_save(&self, clear_dirty: bool) -> ObjectResult<Vec<u8>> {
        self.record("save");
        self.check("save")?;
        if clear_dirty {
            self.dirty.set(DirtyState::Clean);
        }
        Ok(self.data.borrow().clone())
    }

    fn stream_init_new(&self) -> ObjectResult<()> {
        self.record("init_new");
        self.check("init_new")?;
        self.data.borrow_mut().clear();
        self.dirty.set(DirtyState::Clean);
        Ok(())
    }
}

impl Default for MockObject {
    fn default() -> Self {
        Self::new()
    }
}

impl HostedObject for MockObject {
    fn misc_status(&self) -> MiscStatus {
        self.misc
    }

    fn quick_activate(&self, request: &QuickActivateRequest) -> ObjectResult<QuickActivateReply> {
        if !self.quick {
            return Err(ObjectError::not_implemented());
        }
        self.record("quick_activate");
        self.check("quick_activate")?;
        *self.site.borrow_mut() = Some(request.site.clone());
        Ok(QuickActivateReply {
            misc_status: self.misc,
            event_cookie: None,
        })
    }

    fn set_client_site(&self, site: Option<Rc<dyn ClientSite>>) -> ObjectResult<()> {
        match &site {
            Some(_) => {
                self.record("set_client_site");
                self.check("set_client_site")?;
                self.site_assignments.set(self.site_assignments.get() + 1);
            }
            None => self.record("clear_client_site"),
        }
        *self.site.borrow_mut() = site;
        Ok(())
    }

    fn do_verb(&self, verb: Verb, _parent: WindowHandle, _bounds: Rect) -> ObjectResult<()> {
        self.verbs.borrow_mut().push(verb);
        self.record(format!("do_verb({verb:?})"));
        self.check("do_verb")?;
        match verb {
            Verb::Show | Verb::Primary | Verb::InPlaceActivate => self.activate_in_place(),
            Verb::UiActivate => {
                if self.deactivate_on_ui_activate {
                    self.deactivate_in_place();
                    return Ok(());
                }
                self.activate_in_place()?;
                if !self.ui_active.replace(true) && self.callbacks {
                    if let Some(site) = self.site() {
                        site.on_ui_activate();
                    }
                }
                Ok(())
            }
            Verb::Hide => {
                if self.deactivate_on_hide {
                    self.deactivate_in_place();
                }
                Ok(())
            }
            Verb::Open | Verb::Properties => Ok(()),
        }
    }

    fn in_place_deactivate(&self) -> ObjectResult<()> {
        self.record("in_place_deactivate");
        self.check("in_place_deactivate")?;
        self.deactivate_in_place();
        Ok(())
    }

    fn ui_deactivate(&self) -> ObjectResult<()> {
        self.record("ui_deactivate");
        self.check("ui_deactivate")?;
        if self.ui_active.replace(false) && self.callbacks {
            if let Some(site) = self.site() {
                site.on_ui_deactivate();
            }
        }
        Ok(())
    }

    fn window(&self) -> ObjectResult<WindowHandle> {
        self.window
            .get()
            .ok_or_else(|| ObjectError::failed("object has no window"))
    }

    fn set_object_rects(&self, _position: Rect, _clip: Rect) -> ObjectResult<()> {
        self.record("set_object_rects");
        self.check("set_object_rects")
    }

    fn extent(&self) -> ObjectResult<Size> {
        Ok(self.extent.get())
    }

    fn set_extent(&self, extent: Size) -> ObjectResult<()> {
        self.record("set_extent");
        self.check("set_extent")?;
        self.extent.set(extent);
        Ok(())
    }

    fn freeze_events(&self, freeze: bool) -> ObjectResult<()> {
        self.record(format!("freeze_events({freeze})"));
        let delta = if freeze { 1 } else { -1 };
        self.freeze.set(self.freeze.get() + delta);
        Ok(())
    }

    fn on_ambient_property_change(&self, dispid: i32) -> ObjectResult<()> {
        self.record(format!("ambient_changed({dispid})"));
        Ok(())
    }

    fn advise(&self, sink: Rc<dyn ObjectEventSink>) -> ObjectResult<u32> {
        self.record("advise");
        self.check("advise")?;
        let cookie = self.next_cookie.get();
        self.next_cookie.set(cookie + 1);
        self.sinks.borrow_mut().push((cookie, sink));
        Ok(cookie)
    }

    fn unadvise(&self, cookie: u32) -> ObjectResult<()> {
        self.record("unadvise");
        self.sinks.borrow_mut().retain(|(known, _)| *known != cookie);
        Ok(())
    }

    fn close(&self) -> ObjectResult<()> {
        self.record("close");
        Ok(())
    }

    fn persist_stream_init(&self) -> Option<&dyn PersistStreamInit> {
        self.persistence
            .stream_init
            .then_some(self as &dyn PersistStreamInit)
    }

    fn persist_stream(&self) -> Option<&dyn PersistStream> {
        self.persistence.stream.then_some(self as &dyn PersistStream)
    }

    fn persist_storage(&self) -> Option<&dyn PersistStorage> {
        self.persistence.storage.then_some(self as &dyn PersistStorage)
    }

    fn persist_property_bag(&self) -> Option<&dyn PersistPropertyBag> {
        self.persistence
            .property_bag
            .then_some(self as &dyn PersistPropertyBag)
    }

    fn automation(&self) -> Option<&dyn Automation> {
        (!self.properties.borrow().is_empty()).then_some(self as &dyn Automation)
    }

    fn categorize_properties(&self) -> Option<&dyn CategorizeProperties> {
        (!self.categories.is_empty()).then_some(self as &dyn CategorizeProperties)
    }

    fn per_property_browsing(&self) -> Option<&dyn PerPropertyBrowsing> {
        (!self.predefined.is_empty() || !self.pages_by_property.is_empty())
            .then_some(self as &dyn PerPropertyBrowsing)
    }

    fn property_pages(&self) -> Option<&dyn PropertyPages> {
        (!self.pages.is_empty()).then_some(self as &dyn PropertyPages)
    }
}

impl PersistStreamInit for MockObject {
    fn is_dirty(&self) -> DirtyState {
        self.dirty.get()
    }

    fn init_new(&self) -> ObjectResult<()> {
        self.stream_init_new()
    }

    fn load(&self, data: &[u8]) -> ObjectResult<()> {
        self.stream_load(data)
    }

    fn save(&self, clear_dirty: bool) -> ObjectResult<Vec<u8>> {
        self.stream_save(clear_dirty)
    }
}

impl PersistStream for MockObject {
    fn is_dirty(&self) -> DirtyState {
        self.dirty.get()
    }

    fn load(&self, data: &[u8]) -> ObjectResult<()> {
        self.stream_load(data)
    }

    fn save(&self, clear_dirty: bool) -> ObjectResult<Vec<u8>> {
        self.stream_save(clear_dirty)
    }
}

impl PersistStorage for MockObject {
    fn is_dirty(&self) -> DirtyState {
        self.dirty.get()
    }

    fn init_new(&self) -> ObjectResult<()> {
        self.stream_init_new()
    }

    fn load(&self, data: &[u8]) -> ObjectResult<()> {
        self.stream_load(data)
    }

    fn save(&self) -> ObjectResult<Vec<u8>> {
        self.stream_save(true)
    }
}

impl PersistPropertyBag for MockObject {
    fn init_new(&self) -> ObjectResult<()> {
        self.record("init_new");
        self.check("init_new")?;
        *self.bag.borrow_mut() = PropertyBag::new();
        Ok(())
    }

    fn load(&self, bag: &PropertyBag) -> ObjectResult<()> {
        self.record("load_bag");
        self.check("load_bag")?;
        *self.bag.borrow_mut() = bag.clone();
        Ok(())
    }

    fn save(&self, bag: &mut PropertyBag, _clear_dirty: bool, _save_all: bool) -> ObjectResult<()> {
        self.record("save_bag");
        self.check("save_bag")?;
        for (name, value) in self.bag.borrow().iter() {
            bag.write(name, value.clone());
        }
        Ok(())
    }
}

impl Automation for MockObject {
    fn properties(&self) -> ObjectResult<Vec<PropertyInfo>> {
        Ok(self
            .properties
            .borrow()
            .iter()
            .map(|(info, _)| info.clone())
            .collect())
    }

    fn get_property(&self, dispid: i32) -> ObjectResult<PropertyValue> {
        self.record("get_property");
        let value = self
            .properties
            .borrow()
            .iter()
            .find(|(info, _)| info.dispid == dispid)
            .map(|(_, value)| value.clone());
        if self.notify_on_read {
            if let Some(site) = self.site() {
                site.on_changed(Some(dispid));
            }
        }
        value.ok_or_else(|| ObjectError::new(DISP_E_MEMBERNOTFOUND, format!("dispid {dispid}")))
    }

    fn set_property(&self, dispid: i32, value: &PropertyValue) -> ObjectResult<()> {
        self.record("set_property");
        self.check("set_property")?;
        let mut properties = self.properties.borrow_mut();
        let entry = properties
            .iter_mut()
            .find(|(info, _)| info.dispid == dispid)
            .ok_or_else(|| ObjectError::new(DISP_E_MEMBERNOTFOUND, format!("dispid {dispid}")))?;
        entry.1 = value.clone();
        Ok(())
    }
}

impl CategorizeProperties for MockObject {
    fn map_property_to_category(&self, dispid: i32) -> ObjectResult<i32> {
        self.categories
            .get(&dispid)
            .copied()
            .ok_or_else(ObjectError::not_implemented)
    }

    fn category_name(&self, category: i32, _locale: u32) -> ObjectResult<String> {
        self.record("category_name");
        self.category_names
            .get(&category)
            .cloned()
            .ok_or_else(|| ObjectError::failed(format!("category {category}")))
    }
}

impl PerPropertyBrowsing for MockObject {
    fn display_string(&self, _dispid: i32) -> ObjectResult<Option<String>> {
        Ok(None)
    }

    fn map_to_property_page(&self, dispid: i32) -> ObjectResult<Option<String>> {
        Ok(self.pages_by_property.get(&dispid).cloned())
    }

    fn predefined_strings(&self, dispid: i32) -> ObjectResult<Vec<PredefinedValue>> {
        Ok(self
            .predefined
            .get(&dispid)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .map(|(cookie, (display, _))| PredefinedValue {
                        display: display.clone(),
                        cookie: cookie as i32,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn predefined_value(&self, dispid: i32, cookie: i32) -> ObjectResult<PropertyValue> {
        self.predefined
            .get(&dispid)
            .and_then(|values| values.get(usize::try_from(cookie).ok()?))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| ObjectError::failed(format!("cookie {cookie}")))
    }
}

impl PropertyPages for MockObject {
    fn page_ids(&self) -> ObjectResult<Vec<String>> {
        Ok(self.pages.clone())
    }

    fn show(&self, _parent: WindowHandle, _caption: &str, _dispid: Option<i32>) -> ObjectResult<()> {
        self.record("show_pages");
        self.check("show_pages")
    }
}

/// Hands out one shared [`MockObject`] and counts the requests.
pub struct MockFactory {
    object: Rc<MockObject>,
    creations: Rc<Cell<usize>>,
    required_license: Rc<RefCell<Option<String>>>,
}

impl MockFactory {
    pub const CLASS_ID: &'static str = "{6E3B7A40-0000-4D1B-9C55-4D6F636B4F62}";

    pub fn new(object: Rc<MockObject>) -> Self {
        Self {
            object,
            creations: Rc::new(Cell::new(0)),
            required_license: Rc::new(RefCell::new(None)),
        }
    }

    pub fn creations(&self) -> usize {
        self.creations.get()
    }

    fn not_licensed() -> ObjectError {
        ObjectError::new(CLASS_E_NOTLICENSED, "class is not licensed")
    }
}

impl ObjectFactory for MockFactory {
    fn class_id(&self) -> &str {
        Self::CLASS_ID
    }

    fn create(&self) -> ObjectResult<Rc<dyn HostedObject>> {
        self.creations.set(self.creations.get() + 1);
        if self.required_license.borrow().is_some() {
            return Err(Self::not_licensed());
        }
        Ok(self.object.clone())
    }

    fn create_licensed(&self, license_key: &str) -> ObjectResult<Rc<dyn HostedObject>> {
        self.creations.set(self.creations.get() + 1);
        match self.required_license.borrow().as_deref() {
            Some(required) if required != license_key => Err(Self::not_licensed()),
            _ => Ok(self.object.clone()),
        }
    }

    fn request_license_key(&self) -> ObjectResult<Option<String>> {
        Ok(self.required_license.borrow().clone())
    }
}

/// Design-time services that remember what they were told.
#[derive(Default)]
pub struct MockServices {
    selection: Rc<MockSelection>,
    changes: Rc<MockChanges>,
}

#[derive(Default)]
struct MockSelection {
    selected: RefCell<Vec<HostId>>,
}

#[derive(Default)]
struct MockChanges {
    changing: RefCell<Vec<(HostId, Option<i32>)>>,
    changed: RefCell<Vec<(HostId, Option<i32>)>>,
}

impl MockServices {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn selected(&self) -> Vec<HostId> {
        self.selection.selected.borrow().clone()
    }

    /// Completed component changes, in order.
    pub fn changes(&self) -> Vec<(HostId, Option<i32>)> {
        self.changes.changed.borrow().clone()
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.changing.borrow().len() - self.changes.changed.borrow().len()
    }
}

impl ServiceProvider for MockServices {
    fn selection_service(&self) -> Option<Rc<dyn SelectionService>> {
        Some(self.selection.clone())
    }

    fn component_change_service(&self) -> Option<Rc<dyn ComponentChangeService>> {
        Some(self.changes.clone())
    }
}

impl SelectionService for MockSelection {
    fn select(&self, host: HostId) {
        self.selected.borrow_mut().push(host);
    }

    fn is_selected(&self, host: HostId) -> bool {
        self.selected.borrow().contains(&host)
    }
}

impl ComponentChangeService for MockChanges {
    fn on_component_changing(&self, host: HostId, dispid: Option<i32>) {
        self.changing.borrow_mut().push((host, dispid));
    }

    fn on_component_changed(&self, host: HostId, dispid: Option<i32>) {
        self.changed.borrow_mut().push((host, dispid));
    }
}

/// One apartment with a context, a widget and a primary mock object.
pub struct Fixture {
    windows: Rc<MockWindows>,
    context: Rc<HostContext>,
    widget: Rc<MockWidget>,
    object: Rc<MockObject>,
    creations: Rc<Cell<usize>>,
    required_license: Rc<RefCell<Option<String>>>,
    widgets: Cell<usize>,
    _sta: StaGuard,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_object(MockObject::new())
    }

    pub fn with_object(object: MockObject) -> Self {
        let sta = apartment::enter_sta();
        let windows = MockWindows::new();
        windows.set_dpi(Some(Dpi::DEFAULT));
        let context = HostContext::new(windows.clone(), Box::new(FixedLocale(1033)));
        let widget = MockWidget::new("axHost1", windows.clone());
        let object = Rc::new(object);
        object.attach_windows(windows.clone());
        Self {
            windows,
            context,
            widget,
            object,
            creations: Rc::new(Cell::new(0)),
            required_license: Rc::new(RefCell::new(None)),
            widgets: Cell::new(1),
            _sta: sta,
        }
    }

    /// Host for the primary object on the primary widget.
    pub fn host(&self, config: HostConfig) -> AxHost {
        self.build(self.object.clone(), self.widget.clone(), config)
    }

    /// Host for another object on a fresh widget.
    pub fn host_for(&self, object: Rc<MockObject>, config: HostConfig) -> AxHost {
        let count = self.widgets.get() + 1;
        self.widgets.set(count);
        let widget = MockWidget::new(&format!("axHost{count}"), self.windows.clone());
        self.build(object, widget, config)
    }

    fn build(&self, object: Rc<MockObject>, widget: Rc<MockWidget>, config: HostConfig) -> AxHost {
        let factory = MockFactory {
            object,
            creations: self.creations.clone(),
            required_license: self.required_license.clone(),
        };
        AxHost::new(self.context.clone(), config, Box::new(factory), widget)
            .expect("fixture runs inside the apartment")
    }

    pub fn add_object(&self, object: MockObject) -> Rc<MockObject> {
        let object = Rc::new(object);
        object.attach_windows(self.windows.clone());
        object
    }

    pub fn object(&self) -> Rc<MockObject> {
        self.object.clone()
    }

    pub fn widget(&self) -> Rc<MockWidget> {
        self.widget.clone()
    }

    pub fn windows(&self) -> Rc<MockWindows> {
        self.windows.clone()
    }

    pub fn context(&self) -> Rc<HostContext> {
        self.context.clone()
    }

    pub fn factory_creations(&self) -> usize {
        self.creations.get()
    }

    pub fn require_license(&self, key: &str) {
        *self.required_license.borrow_mut() = Some(key.to_string());
    }

    /// True when the primary widget shows a window supplied by the object.
    pub fn widget_holds_object_window(&self) -> bool {
        self.widget
            .handle()
            .is_some_and(|handle| !self.windows.is_host_created(handle))
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
