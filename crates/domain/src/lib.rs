use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(Uuid);

impl HostId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a top-level container surface (a form, a dialog, a pane).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

/// Identity of any control living in a container, hosted object or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlId(pub u64);

/// Native window handle. Zero means "no window".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub const NULL: WindowHandle = WindowHandle(0);

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn location(&self) -> Point {
        Point {
            x: self.x,
            y: self.y,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn with_size(&self, size: Size) -> Self {
        Self::new(self.x, self.y, size.width, size.height)
    }
}

/// Step of the activation ladder a hosted object currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivationLevel {
    Passive,
    Loaded,
    Running,
    InPlace,
    UiActive,
}

impl ActivationLevel {
    pub const ALL: [ActivationLevel; 5] = [
        Self::Passive,
        Self::Loaded,
        Self::Running,
        Self::InPlace,
        Self::UiActive,
    ];

    pub fn up(self) -> Option<Self> {
        match self {
            Self::Passive => Some(Self::Loaded),
            Self::Loaded => Some(Self::Running),
            Self::Running => Some(Self::InPlace),
            Self::InPlace => Some(Self::UiActive),
            Self::UiActive => None,
        }
    }

    pub fn down(self) -> Option<Self> {
        match self {
            Self::Passive => None,
            Self::Loaded => Some(Self::Passive),
            Self::Running => Some(Self::Loaded),
            Self::InPlace => Some(Self::Running),
            Self::UiActive => Some(Self::InPlace),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "passive",
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::InPlace => "in_place",
            Self::UiActive => "ui_active",
        }
    }
}

impl fmt::Display for ActivationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who provides the native window the host displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowOwnership {
    /// The object is invisible at runtime; the host's own window is used directly.
    HostOwnsWindow,
    /// The object supplies its in-place window and the host subclasses it.
    ObjectOwnsWindow,
    /// The object refused to supply a window while hidden; the host shows a placeholder.
    HostFakesWindow,
}

/// Persistence protocol a captured state was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mechanism {
    ByteStream,
    InitializedByteStream,
    StructuredStorage,
    PropertyBag,
}

impl Mechanism {
    pub fn tag(&self) -> i32 {
        match self {
            Self::ByteStream => 0,
            Self::InitializedByteStream => 1,
            Self::StructuredStorage => 2,
            Self::PropertyBag => 3,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::ByteStream),
            1 => Some(Self::InitializedByteStream),
            2 => Some(Self::StructuredStorage),
            3 => Some(Self::PropertyBag),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByteStream => "byte_stream",
            Self::InitializedByteStream => "initialized_byte_stream",
            Self::StructuredStorage => "structured_storage",
            Self::PropertyBag => "property_bag",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum PropertyValue {
    Empty,
    Bool(bool),
    I32(i32),
    F64(f64),
    String(String),
    Color(OleColor),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

/// Name/value pairs captured through the property-bag persistence protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyBag {
    values: BTreeMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn write(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Durable state of a hosted object. Built once and never mutated; a new
/// snapshot replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    mechanism: Mechanism,
    version: i32,
    manual_update: bool,
    license_key: Option<String>,
    payload: Vec<u8>,
    property_bag: Option<PropertyBag>,
}

impl PersistedState {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(mechanism: Mechanism, payload: Vec<u8>) -> Self {
        Self {
            mechanism,
            version: Self::CURRENT_VERSION,
            manual_update: false,
            license_key: None,
            payload,
            property_bag: None,
        }
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn with_manual_update(mut self, manual_update: bool) -> Self {
        self.manual_update = manual_update;
        self
    }

    pub fn with_license_key(mut self, license_key: Option<String>) -> Self {
        self.license_key = license_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_property_bag(mut self, bag: Option<PropertyBag>) -> Self {
        self.property_bag = bag;
        self
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn manual_update(&self) -> bool {
        self.manual_update
    }

    pub fn license_key(&self) -> Option<&str> {
        self.license_key.as_deref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn property_bag(&self) -> Option<&PropertyBag> {
        self.property_bag.as_ref()
    }
}

/// Capability bits an object reports about itself (OLEMISC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MiscStatus(pub u32);

impl MiscStatus {
    pub const RECOMPOSE_ON_RESIZE: u32 = 0x1;
    pub const INSIDE_OUT: u32 = 0x80;
    pub const ACTIVATE_WHEN_VISIBLE: u32 = 0x100;
    pub const INVISIBLE_AT_RUNTIME: u32 = 0x400;
    pub const ACTS_LIKE_BUTTON: u32 = 0x1000;
    pub const SET_CLIENT_SITE_FIRST: u32 = 0x20000;
    pub const SIMPLE_FRAME: u32 = 0x10000;

    pub fn contains(&self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub fn invisible_at_runtime(&self) -> bool {
        self.contains(Self::INVISIBLE_AT_RUNTIME)
    }

    pub fn set_client_site_first(&self) -> bool {
        self.contains(Self::SET_CLIENT_SITE_FIRST)
    }

    pub fn simple_frame(&self) -> bool {
        self.contains(Self::SIMPLE_FRAME)
    }
}

/// Verbs understood by every in-place capable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verb {
    Primary,
    Show,
    Open,
    Hide,
    UiActivate,
    InPlaceActivate,
    Properties,
}

impl Verb {
    pub fn id(&self) -> i32 {
        match self {
            Self::Primary => 0,
            Self::Show => -1,
            Self::Open => -2,
            Self::Hide => -3,
            Self::UiActivate => -4,
            Self::InPlaceActivate => -5,
            Self::Properties => -7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OleColor(pub u32);

impl OleColor {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(u32::from(r) | (u32::from(g) << 8) | (u32::from(b) << 16))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontDescriptor {
    pub name: String,
    pub size_points: f32,
    pub weight: i16,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub charset: i16,
}

impl FontDescriptor {
    pub fn new(name: impl Into<String>, size_points: f32) -> Self {
        Self {
            name: name.into(),
            size_points,
            weight: 400,
            italic: false,
            underline: false,
            strikethrough: false,
            charset: 1,
        }
    }

    pub fn bold(&self) -> bool {
        self.weight >= 700
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RightToLeft {
    No,
    Yes,
    Inherit,
}

/// Ambient properties the site answers, keyed by their dispatch id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AmbientId {
    BackColor,
    DisplayName,
    Font,
    ForeColor,
    LocaleId,
    MessageReflect,
    UserMode,
    UiDead,
    ShowGrabHandles,
    ShowHatching,
    DisplayAsDefault,
    SupportsMnemonics,
    AutoClip,
    RightToLeft,
}

impl AmbientId {
    pub fn dispid(&self) -> i32 {
        match self {
            Self::BackColor => -701,
            Self::DisplayName => -702,
            Self::Font => -703,
            Self::ForeColor => -704,
            Self::LocaleId => -705,
            Self::MessageReflect => -706,
            Self::UserMode => -709,
            Self::UiDead => -710,
            Self::ShowGrabHandles => -711,
            Self::ShowHatching => -712,
            Self::DisplayAsDefault => -713,
            Self::SupportsMnemonics => -714,
            Self::AutoClip => -715,
            Self::RightToLeft => -732,
        }
    }

    pub fn from_dispid(dispid: i32) -> Option<Self> {
        match dispid {
            -701 => Some(Self::BackColor),
            -702 => Some(Self::DisplayName),
            -703 => Some(Self::Font),
            -704 => Some(Self::ForeColor),
            -705 => Some(Self::LocaleId),
            -706 => Some(Self::MessageReflect),
            -709 => Some(Self::UserMode),
            -710 => Some(Self::UiDead),
            -711 => Some(Self::ShowGrabHandles),
            -712 => Some(Self::ShowHatching),
            -713 => Some(Self::DisplayAsDefault),
            -714 => Some(Self::SupportsMnemonics),
            -715 => Some(Self::AutoClip),
            -732 => Some(Self::RightToLeft),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum AmbientValue {
    Bool(bool),
    Color(OleColor),
    Font(FontDescriptor),
    Locale(u32),
    Text(String),
}

/// Per-host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    pub class_id: Option<String>,
    pub user_mode: bool,
    pub edit_mode_override: bool,
    pub default_size: Size,
    pub license_key: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            class_id: None,
            user_mode: true,
            edit_mode_override: false,
            default_size: Size::new(75, 23),
            license_key: None,
        }
    }
}

/// An outgoing event raised by a running object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEvent {
    pub dispid: i32,
    pub args: Vec<PropertyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_levels_are_totally_ordered() {
        for pair in ActivationLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].up(), Some(pair[1]));
            assert_eq!(pair[1].down(), Some(pair[0]));
        }
        assert_eq!(ActivationLevel::Passive.down(), None);
        assert_eq!(ActivationLevel::UiActive.up(), None);
    }

    #[test]
    fn mechanism_tags_are_stable() {
        for mechanism in [
            Mechanism::ByteStream,
            Mechanism::InitializedByteStream,
            Mechanism::StructuredStorage,
            Mechanism::PropertyBag,
        ] {
            assert_eq!(Mechanism::from_tag(mechanism.tag()), Some(mechanism));
        }
        assert_eq!(Mechanism::from_tag(-1), None);
    }

    #[test]
    fn empty_license_key_is_dropped() {
        let state = PersistedState::new(Mechanism::ByteStream, vec![1, 2])
            .with_license_key(Some(String::new()));
        assert_eq!(state.license_key(), None);
    }

    #[test]
    fn host_config_fills_missing_fields() {
        let config: HostConfig =
            serde_json::from_str(r#"{"userMode": false}"#).expect("parse config");
        assert!(!config.user_mode);
        assert_eq!(config.default_size, Size::new(75, 23));
        assert_eq!(config.license_key, None);
    }

    #[test]
    fn ambient_dispids_round_trip() {
        for id in [AmbientId::UserMode, AmbientId::RightToLeft, AmbientId::Font] {
            assert_eq!(AmbientId::from_dispid(id.dispid()), Some(id));
        }
        assert_eq!(AmbientId::from_dispid(-1), None);
    }
}
