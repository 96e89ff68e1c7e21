//! Reflects the hosted object's automation properties as host properties.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use axhost_domain::{ActivationLevel, PropertyValue};

use crate::error::{HostError, ObjectError, Result, DISP_E_MEMBERNOTFOUND};
use crate::host::{HostEvent, HostInner};
use crate::object::{HostedObject, PredefinedValue};

/// Well-known category names, indexed by the negated category code.
const CATEGORY_NAMES: [Option<&str>; 12] = [
    None,
    Some("Default"),
    Some("Default"),
    Some("Font"),
    Some("Layout"),
    Some("Appearance"),
    Some("Behavior"),
    Some("Data"),
    Some("List"),
    Some("Text"),
    Some("Scale"),
    Some("DDE"),
];

fn well_known_category(code: i32) -> Option<&'static str> {
    if code >= 0 {
        return None;
    }
    let index = usize::try_from(code.unsigned_abs()).ok()?;
    CATEGORY_NAMES.get(index).copied().flatten()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyFilter {
    pub browsable_only: bool,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedProperty {
    pub dispid: i32,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub read_only: bool,
    pub browsable: bool,
}

/// Converter and editor hints for one property.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMetadata {
    pub display: Option<String>,
    /// Class id of the property page that edits the property.
    pub page: Option<String>,
    pub predefined: Vec<PredefinedValue>,
}

#[derive(Default)]
pub(crate) struct PropertyCache {
    snapshot: RefCell<Option<(PropertyFilter, Rc<[ReflectedProperty]>)>>,
    categories: RefCell<HashMap<i32, Option<String>>>,
    metadata: RefCell<HashMap<i32, Rc<PropertyMetadata>>>,
}

impl PropertyCache {
    pub(crate) fn invalidate(&self) {
        self.snapshot.borrow_mut().take();
        self.categories.borrow_mut().clear();
        self.metadata.borrow_mut().clear();
    }

    fn invalidate_metadata(&self, dispid: i32) {
        self.metadata.borrow_mut().remove(&dispid);
    }

    fn cached(&self, filter: &PropertyFilter) -> Option<Rc<[ReflectedProperty]>> {
        self.snapshot
            .borrow()
            .as_ref()
            .filter(|(cached, _)| cached == filter)
            .map(|(_, properties)| properties.clone())
    }
}

impl HostInner {
    /// Whether property reads and writes may reach the object right now.
    pub(crate) fn can_access_properties(&self) -> bool {
        let level = self.level.get();
        let own_window = self.flags().own_window;
        (own_window
            && (level > ActivationLevel::Running
                || (self.config.user_mode && level >= ActivationLevel::Running)))
            || level >= ActivationLevel::InPlace
    }

    pub(crate) fn properties(&self, filter: &PropertyFilter) -> Rc<[ReflectedProperty]> {
        if let Some(cached) = self.properties.cached(filter) {
            return cached;
        }
        let properties: Rc<[ReflectedProperty]> = self.reflect(filter).into();
        *self.properties.snapshot.borrow_mut() = Some((filter.clone(), properties.clone()));
        properties
    }

    fn reflect(&self, filter: &PropertyFilter) -> Vec<ReflectedProperty> {
        let Some(object) = self.hosted() else {
            return Vec::new();
        };
        let Some(automation) = object.automation() else {
            return Vec::new();
        };
        let infos = match automation.properties() {
            Ok(infos) => infos,
            Err(err) => {
                tracing::warn!(host_id = %self.id, error = %err, "reading type information failed");
                return Vec::new();
            }
        };

        let reflected: Vec<ReflectedProperty> = infos
            .into_iter()
            .filter(|info| info.readable)
            .map(|info| ReflectedProperty {
                category: self.category_of(object.as_ref(), info.dispid),
                dispid: info.dispid,
                name: info.name,
                description: info.description,
                read_only: !info.writable,
                browsable: info.browsable,
            })
            .filter(|property| !filter.browsable_only || property.browsable)
            .filter(|property| match &filter.category {
                Some(wanted) => property.category.as_deref() == Some(wanted.as_str()),
                None => true,
            })
            .collect();
        tracing::debug!(host_id = %self.id, count = reflected.len(), "reflected object properties");
        reflected
    }

    fn category_of(&self, object: &dyn HostedObject, dispid: i32) -> Option<String> {
        let categorize = object.categorize_properties()?;
        let code = categorize.map_property_to_category(dispid).ok()?;
        if let Some(name) = well_known_category(code) {
            return Some(name.to_string());
        }
        if let Some(name) = self.properties.categories.borrow().get(&code) {
            return name.clone();
        }
        let name = categorize
            .category_name(code, self.context.locale_id())
            .map_err(|err| {
                tracing::debug!(host_id = %self.id, code, error = %err, "object has no name for category");
            })
            .ok();
        self.properties
            .categories
            .borrow_mut()
            .insert(code, name.clone());
        name
    }

    pub(crate) fn refresh_properties(&self) {
        self.properties.invalidate();
        tracing::debug!(host_id = %self.id, "property cache invalidated");
    }

    fn find_property(&self, name: &str) -> Result<ReflectedProperty> {
        self.properties(&PropertyFilter::default())
            .iter()
            .find(|property| property.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| {
                HostError::object(
                    "property lookup",
                    ObjectError::new(DISP_E_MEMBERNOTFOUND, name.to_string()),
                )
            })
    }

    /// Reads a property. `None` while the object is not active enough to ask.
    pub(crate) fn property_value(&self, name: &str) -> Result<Option<PropertyValue>> {
        let property = self.find_property(name)?;
        if !self.can_access_properties() {
            return Ok(None);
        }
        let Some(object) = self.hosted() else {
            return Ok(None);
        };
        let Some(automation) = object.automation() else {
            return Ok(None);
        };
        self.change_nesting.set(self.change_nesting.get() + 1);
        let value = automation.get_property(property.dispid);
        self.change_nesting.set(self.change_nesting.get() - 1);
        value
            .map(Some)
            .map_err(|err| HostError::object("property get", err))
    }

    /// Writes a property. Returns false when the object cannot be reached.
    pub(crate) fn set_property_value(&self, name: &str, value: PropertyValue) -> Result<bool> {
        let property = self.find_property(name)?;
        if property.read_only {
            return Err(HostError::object(
                "property set",
                ObjectError::failed(format!("{} is read-only", property.name)),
            ));
        }
        if !self.can_access_properties() {
            tracing::debug!(host_id = %self.id, property = %property.name, "object not active, property write ignored");
            return Ok(false);
        }
        let Some(object) = self.hosted() else {
            return Ok(false);
        };
        let Some(automation) = object.automation() else {
            return Ok(false);
        };
        automation
            .set_property(property.dispid, &value)
            .map_err(|err| HostError::object("property set", err))?;
        Ok(true)
    }

    pub(crate) fn property_metadata(&self, name: &str) -> Result<Rc<PropertyMetadata>> {
        let property = self.find_property(name)?;
        if let Some(cached) = self.properties.metadata.borrow().get(&property.dispid) {
            return Ok(cached.clone());
        }
        let metadata = Rc::new(self.browse(property.dispid));
        self.properties
            .metadata
            .borrow_mut()
            .insert(property.dispid, metadata.clone());
        Ok(metadata)
    }

    fn browse(&self, dispid: i32) -> PropertyMetadata {
        let Some(object) = self.hosted() else {
            return PropertyMetadata::default();
        };
        let Some(browsing) = object.per_property_browsing() else {
            return PropertyMetadata::default();
        };
        PropertyMetadata {
            display: browsing.display_string(dispid).ok().flatten(),
            page: browsing.map_to_property_page(dispid).ok().flatten(),
            predefined: browsing.predefined_strings(dispid).unwrap_or_default(),
        }
    }

    /// Resolves a predefined display value offered by the object.
    pub(crate) fn predefined_value(&self, name: &str, display: &str) -> Result<Option<PropertyValue>> {
        let property = self.find_property(name)?;
        let metadata = self.property_metadata(name)?;
        let Some(choice) = metadata.predefined.iter().find(|value| value.display == display) else {
            return Ok(None);
        };
        let Some(object) = self.hosted() else {
            return Ok(None);
        };
        let Some(browsing) = object.per_property_browsing() else {
            return Ok(None);
        };
        browsing
            .predefined_value(property.dispid, choice.cookie)
            .map(Some)
            .map_err(|err| HostError::object("predefined value", err))
    }

    pub(crate) fn has_property_pages(&self) -> bool {
        if self.level.get() < ActivationLevel::Running {
            return false;
        }
        self.hosted()
            .and_then(|object| object.property_pages().map(|pages| pages.page_ids()))
            .and_then(|ids| ids.ok())
            .is_some_and(|ids| !ids.is_empty())
    }

    pub(crate) fn show_property_pages(&self, dispid: Option<i32>) -> Result<()> {
        if !self.has_property_pages() {
            tracing::debug!(host_id = %self.id, "object has no property pages to show");
            return Ok(());
        }
        let Some(object) = self.hosted() else {
            return Ok(());
        };
        let Some(pages) = object.property_pages() else {
            return Ok(());
        };
        let changes = (!self.config.user_mode)
            .then(|| self.services().and_then(|s| s.component_change_service()))
            .flatten();
        if let Some(changes) = &changes {
            changes.on_component_changing(self.id, None);
        }
        pages
            .show(self.widget.parent_handle(), &self.widget.name(), dispid)
            .map_err(|err| HostError::object("show property pages", err))?;
        if let Some(changes) = &changes {
            changes.on_component_changed(self.id, None);
        }
        self.properties.invalidate();
        Ok(())
    }

    /// Change notification from the object (`OnChanged`).
    pub(crate) fn object_property_changed(&self, dispid: Option<i32>) {
        if self.change_nesting.get() > 0 {
            tracing::trace!(host_id = %self.id, ?dispid, "nested change notification suppressed");
            return;
        }
        self.change_nesting.set(self.change_nesting.get() + 1);
        self.update_flags(|flags| flags.value_changed = true);
        match dispid {
            Some(dispid) => self.properties.invalidate_metadata(dispid),
            None if !self.config.user_mode => self.properties.invalidate(),
            None => {}
        }
        if !self.config.user_mode {
            if let Some(changes) = self.services().and_then(|s| s.component_change_service()) {
                changes.on_component_changing(self.id, dispid);
                changes.on_component_changed(self.id, dispid);
            }
        }
        self.emit(HostEvent::PropertyChanged { dispid });
        self.change_nesting.set(self.change_nesting.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use axhost_domain::{ActivationLevel, HostConfig, MiscStatus, PropertyValue};

    use super::*;
    use crate::host::HostEvent;
    use crate::object::PropertyInfo;
    use crate::testing::{Fixture, MockObject, MockServices};

    fn catalog() -> MockObject {
        MockObject::new()
            .with_property(PropertyInfo::new(1, "Caption"), PropertyValue::String("OK".into()))
            .with_property(PropertyInfo::new(2, "Count").read_only(), PropertyValue::I32(3))
            .with_property(PropertyInfo::new(3, "Secret").write_only(), PropertyValue::Empty)
            .with_property(
                PropertyInfo {
                    browsable: false,
                    ..PropertyInfo::new(4, "Internal")
                },
                PropertyValue::Bool(true),
            )
            .with_category(1, -9)
            .with_category(2, 40)
            .with_category_name(40, "Counters")
    }

    #[test]
    fn category_table_covers_well_known_codes() {
        assert_eq!(well_known_category(-3), Some("Font"));
        assert_eq!(well_known_category(-11), Some("DDE"));
        assert_eq!(well_known_category(-12), None);
        assert_eq!(well_known_category(0), None);
        assert_eq!(well_known_category(5), None);
    }

    #[test]
    fn unreadable_properties_are_not_reflected() {
        let fixture = Fixture::with_object(catalog());
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Loaded).expect("load");

        let all = host.properties(&PropertyFilter::default());
        let names: Vec<&str> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Caption", "Count", "Internal"]);
        assert_eq!(all[0].category.as_deref(), Some("Text"));
        assert_eq!(all[1].category.as_deref(), Some("Counters"));
        assert!(all[1].read_only);

        let browsable = host.properties(&PropertyFilter {
            browsable_only: true,
            category: None,
        });
        assert_eq!(browsable.len(), 2);
        host.close().expect("close");
    }

    #[test]
    fn snapshot_is_reused_until_refresh_or_filter_change() {
        let fixture = Fixture::with_object(catalog());
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Loaded).expect("load");

        let first = host.properties(&PropertyFilter::default());
        let second = host.properties(&PropertyFilter::default());
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(fixture.object().calls_named("category_name"), 1);

        let text = host.properties(&PropertyFilter {
            browsable_only: false,
            category: Some("Text".into()),
        });
        assert_eq!(text.len(), 1);
        assert!(!Rc::ptr_eq(&first, &host.properties(&PropertyFilter::default())));

        let before = host.properties(&PropertyFilter::default());
        host.refresh_properties();
        assert!(!Rc::ptr_eq(&before, &host.properties(&PropertyFilter::default())));
        host.close().expect("close");
    }

    #[test]
    fn access_depends_on_activation_level() {
        let fixture = Fixture::with_object(catalog());
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        assert_eq!(host.property_value("caption").expect("read"), None);
        assert!(!host
            .set_property_value("Caption", PropertyValue::String("x".into()))
            .expect("write"));

        host.transition_to(ActivationLevel::InPlace).expect("in place");
        assert_eq!(
            host.property_value("Caption").expect("read"),
            Some(PropertyValue::String("OK".into()))
        );
        assert!(host
            .set_property_value("Caption", PropertyValue::String("Go".into()))
            .expect("write"));
        assert_eq!(
            host.property_value("Caption").expect("read"),
            Some(PropertyValue::String("Go".into()))
        );
        assert!(host.set_property_value("Count", PropertyValue::I32(1)).is_err());
        assert!(host.property_value("Missing").is_err());
        host.close().expect("close");
    }

    #[test]
    fn invisible_objects_are_accessible_once_running_in_user_mode() {
        let fixture = Fixture::with_object(
            catalog().with_misc_status(MiscStatus(MiscStatus::INVISIBLE_AT_RUNTIME)),
        );
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        assert_eq!(host.property_value("Count").expect("read"), Some(PropertyValue::I32(3)));
        host.close().expect("close");
    }

    #[test]
    fn predefined_values_come_from_the_object() {
        let fixture = Fixture::with_object(
            catalog()
                .with_predefined(1, vec![("Yes", PropertyValue::Bool(true)), ("No", PropertyValue::Bool(false))])
                .with_property_page(1, "{PAGE-CLSID}"),
        );
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Loaded).expect("load");

        let metadata = host.property_metadata("Caption").expect("metadata");
        let displays: Vec<&str> = metadata.predefined.iter().map(|v| v.display.as_str()).collect();
        assert_eq!(displays, vec!["Yes", "No"]);
        assert_eq!(metadata.page.as_deref(), Some("{PAGE-CLSID}"));
        assert!(Rc::ptr_eq(&metadata, &host.property_metadata("Caption").expect("cached")));

        assert_eq!(
            host.predefined_value("Caption", "No").expect("value"),
            Some(PropertyValue::Bool(false))
        );
        assert_eq!(host.predefined_value("Caption", "Maybe").expect("value"), None);
        host.close().expect("close");
    }

    #[test]
    fn change_notifications_are_not_reentrant() {
        let fixture = Fixture::with_object(catalog().notifying_on_read());
        let host = Rc::new(fixture.host(HostConfig::default()));
        host.transition_to(ActivationLevel::InPlace).expect("in place");

        let changes = Rc::new(std::cell::Cell::new(0));
        let seen = changes.clone();
        host.subscribe(move |event| {
            if matches!(event, HostEvent::PropertyChanged { .. }) {
                seen.set(seen.get() + 1);
            }
        });

        host.property_value("Caption").expect("read");
        assert_eq!(changes.get(), 0);

        host.site().expect("site").on_changed(Some(1));
        assert_eq!(changes.get(), 1);
        host.close().expect("close");
    }

    #[test]
    fn design_mode_changes_reach_the_component_change_service() {
        let fixture = Fixture::with_object(catalog());
        let host = fixture.host(HostConfig {
            user_mode: false,
            ..HostConfig::default()
        });
        let services = MockServices::new();
        host.set_services(Some(services.clone()));
        host.transition_to(ActivationLevel::Running).expect("run");

        host.site().expect("site").on_changed(Some(2));
        assert_eq!(services.changes(), vec![(host.id(), Some(2))]);

        let user = Fixture::with_object(catalog());
        let runtime_host = user.host(HostConfig::default());
        let runtime_services = MockServices::new();
        runtime_host.set_services(Some(runtime_services.clone()));
        runtime_host.transition_to(ActivationLevel::Running).expect("run");
        runtime_host.site().expect("site").on_changed(Some(2));
        assert!(runtime_services.changes().is_empty());
        host.close().expect("close");
        runtime_host.close().expect("close");
    }

    #[test]
    fn property_pages_require_a_running_object() {
        let fixture = Fixture::with_object(MockObject::new().with_pages(vec!["{PAGE}".into()]));
        let host = fixture.host(HostConfig::default());
        assert!(!host.has_property_pages());
        host.show_property_pages(None).expect("no-op");
        assert_eq!(fixture.object().calls_named("show_pages"), 0);

        host.transition_to(ActivationLevel::Running).expect("run");
        assert!(host.has_property_pages());
        host.site().expect("site").show_property_frame().expect("frame");
        assert_eq!(fixture.object().calls_named("show_pages"), 1);
        host.close().expect("close");
    }
}
