//! The callback surface a hosted object uses to talk to its environment.

use std::rc::{Rc, Weak};

use axhost_domain::{AmbientId, AmbientValue, Point, Rect, WindowHandle};

use crate::container::ExtenderProxy;
use crate::error::{ObjectError, ObjectResult, DISP_E_MEMBERNOTFOUND};
use crate::host::HostInner;
use crate::units::TransformDirection;

/// Position and clip rectangles reported by `GetWindowContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowContext {
    pub position: Rect,
    pub clip: Rect,
}

/// Services a hosted object may request from its site.
///
/// Activation callbacks are informational: they report what the object has
/// already done and never drive transitions of their own.
pub trait ClientSite {
    fn window(&self) -> WindowHandle;
    fn window_context(&self) -> ObjectResult<WindowContext>;
    fn can_in_place_activate(&self) -> bool;

    fn on_in_place_activate(&self);
    fn on_ui_activate(&self);
    fn on_ui_deactivate(&self);
    fn on_in_place_deactivate(&self);
    fn show_object(&self) -> ObjectResult<()>;
    fn on_show_window(&self, show: bool);
    fn on_pos_rect_change(&self, position: Rect) -> ObjectResult<()>;

    fn ambient_property(&self, dispid: i32) -> ObjectResult<AmbientValue>;
    fn transform_coords(&self, value: Point, direction: TransformDirection) -> Point;

    fn on_control_info_changed(&self);
    fn lock_in_place_active(&self, lock: bool);
    fn on_focus(&self, got_focus: bool);
    fn show_property_frame(&self) -> ObjectResult<()>;

    fn on_changed(&self, dispid: Option<i32>);
    fn on_request_edit(&self, dispid: Option<i32>) -> bool;

    fn extended_control(&self) -> Option<ExtenderProxy>;
    fn find_sibling(&self, name: &str) -> Option<ExtenderProxy>;
}

/// Site handed to the object. Holds the host weakly: callbacks arriving after
/// the host is gone are answered with neutral defaults.
pub struct SiteAdapter {
    host: Weak<HostInner>,
}

impl SiteAdapter {
    pub(crate) fn new(host: Weak<HostInner>) -> Rc<Self> {
        Rc::new(Self { host })
    }

    fn host(&self) -> Option<Rc<HostInner>> {
        let host = self.host.upgrade();
        if host.is_none() {
            tracing::trace!("site callback after host release");
        }
        host
    }
}

impl ClientSite for SiteAdapter {
    fn window(&self) -> WindowHandle {
        self.host()
            .map(|host| host.widget.parent_handle())
            .unwrap_or(WindowHandle::NULL)
    }

    fn window_context(&self) -> ObjectResult<WindowContext> {
        let host = self.host().ok_or_else(|| ObjectError::failed("host released"))?;
        let position = host.widget.bounds();
        Ok(WindowContext {
            position,
            clip: position,
        })
    }

    fn can_in_place_activate(&self) -> bool {
        self.host().is_some()
    }

    fn on_in_place_activate(&self) {
        if let Some(host) = self.host() {
            host.object_in_place_activated();
        }
    }

    fn on_ui_activate(&self) {
        if let Some(host) = self.host() {
            host.object_ui_activated();
        }
    }

    fn on_ui_deactivate(&self) {
        if let Some(host) = self.host() {
            host.object_ui_deactivated();
        }
    }

    fn on_in_place_deactivate(&self) {
        if let Some(host) = self.host() {
            host.object_in_place_deactivated();
        }
    }

    fn show_object(&self) -> ObjectResult<()> {
        match self.host() {
            Some(host) => host.show_object(),
            None => Ok(()),
        }
    }

    fn on_show_window(&self, _show: bool) {}

    fn on_pos_rect_change(&self, position: Rect) -> ObjectResult<()> {
        match self.host() {
            Some(host) => host.object_pos_rect_changed(position),
            None => Ok(()),
        }
    }

    fn ambient_property(&self, dispid: i32) -> ObjectResult<AmbientValue> {
        let not_found = || ObjectError::new(DISP_E_MEMBERNOTFOUND, format!("ambient {dispid}"));
        let host = self.host().ok_or_else(not_found)?;
        let id = AmbientId::from_dispid(dispid).ok_or_else(not_found)?;
        host.ambient_property(id).ok_or_else(not_found)
    }

    fn transform_coords(&self, value: Point, direction: TransformDirection) -> Point {
        let Some(host) = self.host() else {
            return value;
        };
        let dpi = host.context.dpi();
        match direction {
            TransformDirection::HimetricToContainer => dpi.point_from_himetric(value),
            TransformDirection::ContainerToHimetric => dpi.point_to_himetric(value),
        }
    }

    fn on_control_info_changed(&self) {}

    fn lock_in_place_active(&self, _lock: bool) {}

    fn on_focus(&self, _got_focus: bool) {}

    fn show_property_frame(&self) -> ObjectResult<()> {
        let Some(host) = self.host() else {
            return Ok(());
        };
        if !host.has_property_pages() {
            return Ok(());
        }
        host.show_property_pages(None)
            .map_err(|err| ObjectError::failed(err.to_string()))
    }

    fn on_changed(&self, dispid: Option<i32>) {
        if let Some(host) = self.host() {
            host.object_property_changed(dispid);
        }
    }

    fn on_request_edit(&self, _dispid: Option<i32>) -> bool {
        true
    }

    fn extended_control(&self) -> Option<ExtenderProxy> {
        let host = self.host()?;
        let container = host.container.get()?;
        host.context
            .containers()
            .proxy_for(container, host.control_id)
    }

    fn find_sibling(&self, name: &str) -> Option<ExtenderProxy> {
        let host = self.host()?;
        let container = host.container.get()?;
        host.context.containers().find_proxy(container, name)
    }
}

#[cfg(test)]
mod tests {
    use axhost_domain::{ActivationLevel, ContainerId, HostConfig, PropertyValue};

    use crate::testing::{Fixture, MockObject};

    #[test]
    fn property_frame_opens_the_object_pages() {
        let fixture = Fixture::with_object(
            MockObject::new().with_pages(vec!["{0BE35203-8F91-11CE-9DE3-00AA004BB851}".into()]),
        );
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");

        host.site().expect("site").show_property_frame().expect("frame");
        assert_eq!(fixture.object().calls_named("show_pages"), 1);
        host.close().expect("close");
    }

    #[test]
    fn property_frame_without_pages_is_a_no_op() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");

        host.site().expect("site").show_property_frame().expect("frame");
        assert_eq!(fixture.object().calls_named("show_pages"), 0);
        host.close().expect("close");
    }

    #[test]
    fn extended_control_needs_a_container() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        let site = host.site().expect("site");
        assert!(site.extended_control().is_none());

        host.join_container(ContainerId(3));
        let context = fixture.context();
        let proxy = site.extended_control().expect("proxy");
        assert_eq!(proxy.container(), ContainerId(3));
        assert_eq!(proxy.control(&context), Some(host.control_id()));
        assert_eq!(
            proxy.property(&context, "Name"),
            Some(PropertyValue::String("axHost1".into()))
        );
        host.close().expect("close");
    }

    #[test]
    fn siblings_are_found_by_name_within_the_container() {
        let fixture = Fixture::new();
        let first = fixture.host(HostConfig::default());
        let second = fixture.host_for(fixture.add_object(MockObject::new()), HostConfig::default());
        first.join_container(ContainerId(4));
        second.join_container(ContainerId(4));
        first.transition_to(ActivationLevel::Running).expect("run");

        let context = fixture.context();
        let site = first.site().expect("site");
        let sibling = site.find_sibling("AXHOST2").expect("sibling");
        assert_eq!(sibling.control(&context), Some(second.control_id()));
        assert!(site.find_sibling("missing").is_none());

        second.leave_container();
        assert!(site.find_sibling("axHost2").is_none());
        first.close().expect("close");
        second.close().expect("close");
    }
}
