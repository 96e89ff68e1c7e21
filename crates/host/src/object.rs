//! The hosted object as the host sees it, and the optional capabilities it
//! may expose.
//!
//! A binding implements [`HostedObject`] once per object and answers the
//! capability accessors (`persist_stream_init`, `automation`, ...) with
//! `Some` for every protocol the object speaks. The host probes them once
//! and caches the outcome.

use std::rc::Rc;

use axhost_domain::{
    FontDescriptor, MiscStatus, ObjectEvent, OleColor, PropertyBag, PropertyValue, Rect, Size,
    Verb, WindowHandle,
};

use crate::error::ObjectResult;
use crate::site::ClientSite;

/// Answer of a persistence interface's dirty query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    Dirty,
    Clean,
    /// The query failed or answered something other than yes/no.
    Indeterminate,
}

pub trait PersistStreamInit {
    fn is_dirty(&self) -> DirtyState;
    fn init_new(&self) -> ObjectResult<()>;
    fn load(&self, data: &[u8]) -> ObjectResult<()>;
    fn save(&self, clear_dirty: bool) -> ObjectResult<Vec<u8>>;
}

pub trait PersistStream {
    fn is_dirty(&self) -> DirtyState;
    fn load(&self, data: &[u8]) -> ObjectResult<()>;
    fn save(&self, clear_dirty: bool) -> ObjectResult<Vec<u8>>;
}

/// Structured storage flattened to its serialized bytes.
pub trait PersistStorage {
    fn is_dirty(&self) -> DirtyState;
    fn init_new(&self) -> ObjectResult<()>;
    fn load(&self, data: &[u8]) -> ObjectResult<()>;
    fn save(&self) -> ObjectResult<Vec<u8>>;
}

pub trait PersistPropertyBag {
    fn init_new(&self) -> ObjectResult<()>;
    fn load(&self, bag: &PropertyBag) -> ObjectResult<()>;
    fn save(&self, bag: &mut PropertyBag, clear_dirty: bool, save_all: bool) -> ObjectResult<()>;
}

/// One automation property as described by the object's type information.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub dispid: i32,
    pub name: String,
    pub readable: bool,
    pub writable: bool,
    pub browsable: bool,
    pub description: Option<String>,
}

impl PropertyInfo {
    pub fn new(dispid: i32, name: impl Into<String>) -> Self {
        Self {
            dispid,
            name: name.into(),
            readable: true,
            writable: true,
            browsable: true,
            description: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }
}

/// Late-bound property access (IDispatch plus its type information).
pub trait Automation {
    fn properties(&self) -> ObjectResult<Vec<PropertyInfo>>;
    fn get_property(&self, dispid: i32) -> ObjectResult<PropertyValue>;
    fn set_property(&self, dispid: i32, value: &PropertyValue) -> ObjectResult<()>;
}

/// Object-defined property categories.
pub trait CategorizeProperties {
    fn map_property_to_category(&self, dispid: i32) -> ObjectResult<i32>;
    fn category_name(&self, category: i32, locale: u32) -> ObjectResult<String>;
}

/// A predefined value the object offers for an enumerated property.
#[derive(Debug, Clone, PartialEq)]
pub struct PredefinedValue {
    pub display: String,
    pub cookie: i32,
}

pub trait PerPropertyBrowsing {
    fn display_string(&self, dispid: i32) -> ObjectResult<Option<String>>;
    /// Class id of the property page that edits the property, if any.
    fn map_to_property_page(&self, dispid: i32) -> ObjectResult<Option<String>>;
    fn predefined_strings(&self, dispid: i32) -> ObjectResult<Vec<PredefinedValue>>;
    fn predefined_value(&self, dispid: i32, cookie: i32) -> ObjectResult<PropertyValue>;
}

pub trait PropertyPages {
    fn page_ids(&self) -> ObjectResult<Vec<String>>;
    fn show(&self, parent: WindowHandle, caption: &str, dispid: Option<i32>) -> ObjectResult<()>;
}

/// Ambient context handed to the object by quick activation.
#[derive(Clone)]
pub struct QuickActivateRequest {
    pub site: Rc<dyn ClientSite>,
    pub events: Rc<dyn ObjectEventSink>,
    pub user_mode: bool,
    pub ui_dead: bool,
    pub auto_clip: bool,
    pub message_reflect: bool,
    pub supports_mnemonics: bool,
    pub back_color: OleColor,
    pub fore_color: OleColor,
    pub font: Option<FontDescriptor>,
    pub locale: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickActivateReply {
    pub misc_status: MiscStatus,
    /// Connection cookie, when the object connected the event sink itself.
    pub event_cookie: Option<u32>,
}

/// Receives the object's outgoing events.
pub trait ObjectEventSink {
    fn on_event(&self, event: ObjectEvent);
}

/// The foreign object being hosted.
///
/// Every method may call back into the site it was given; implementations
/// must not hold interior borrows across those calls.
pub trait HostedObject {
    fn misc_status(&self) -> MiscStatus;

    /// Single-call activation. Objects that do not support it answer `E_NOTIMPL`.
    fn quick_activate(&self, request: &QuickActivateRequest) -> ObjectResult<QuickActivateReply>;

    fn set_client_site(&self, site: Option<Rc<dyn ClientSite>>) -> ObjectResult<()>;
    fn do_verb(&self, verb: Verb, parent: WindowHandle, bounds: Rect) -> ObjectResult<()>;
    fn in_place_deactivate(&self) -> ObjectResult<()>;
    fn ui_deactivate(&self) -> ObjectResult<()>;
    /// The object's in-place window. Windowless objects answer an error.
    fn window(&self) -> ObjectResult<WindowHandle>;
    fn set_object_rects(&self, position: Rect, clip: Rect) -> ObjectResult<()>;

    /// Extent in HIMETRIC.
    fn extent(&self) -> ObjectResult<Size>;
    fn set_extent(&self, extent: Size) -> ObjectResult<()>;

    fn freeze_events(&self, freeze: bool) -> ObjectResult<()>;
    fn on_ambient_property_change(&self, dispid: i32) -> ObjectResult<()>;

    fn advise(&self, sink: Rc<dyn ObjectEventSink>) -> ObjectResult<u32>;
    fn unadvise(&self, cookie: u32) -> ObjectResult<()>;

    fn close(&self) -> ObjectResult<()>;

    fn persist_stream_init(&self) -> Option<&dyn PersistStreamInit> {
        None
    }

    fn persist_stream(&self) -> Option<&dyn PersistStream> {
        None
    }

    fn persist_storage(&self) -> Option<&dyn PersistStorage> {
        None
    }

    fn persist_property_bag(&self) -> Option<&dyn PersistPropertyBag> {
        None
    }

    fn automation(&self) -> Option<&dyn Automation> {
        None
    }

    fn categorize_properties(&self) -> Option<&dyn CategorizeProperties> {
        None
    }

    fn per_property_browsing(&self) -> Option<&dyn PerPropertyBrowsing> {
        None
    }

    fn property_pages(&self) -> Option<&dyn PropertyPages> {
        None
    }
}

/// Creates hosted objects of one class.
pub trait ObjectFactory {
    fn class_id(&self) -> &str;
    fn create(&self) -> ObjectResult<Rc<dyn HostedObject>>;
    fn create_licensed(&self, license_key: &str) -> ObjectResult<Rc<dyn HostedObject>>;
    /// Requests a runtime license key from the class. `None` when the class
    /// is not licensed or the machine license already covers runtime use.
    fn request_license_key(&self) -> ObjectResult<Option<String>>;
}
