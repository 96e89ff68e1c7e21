//! Window ownership: whose native window the host shows, and keeping the
//! message chain intact when the object replaces the window procedure.

use axhost_domain::{ActivationLevel, Rect, Size, Verb, WindowHandle, WindowOwnership};

use crate::error::{HostError, ObjectResult, Result};
use crate::host::{HostEvent, HostInner};
use crate::widget::{
    WindowMessage, WindowStyle, SUBCLASS_CHECK_SENTINEL, WM_COMMAND, WM_CONTEXTMENU,
    WM_DESTROY, WM_HELP, WM_KEYUP, WM_KILLFOCUS, WM_NCDESTROY,
};

impl HostInner {
    pub(crate) fn ownership(&self) -> WindowOwnership {
        let flags = self.flags();
        if flags.own_window {
            WindowOwnership::HostOwnsWindow
        } else if flags.faking_window {
            WindowOwnership::HostFakesWindow
        } else {
            WindowOwnership::ObjectOwnsWindow
        }
    }

    pub(crate) fn create_handle(&self) -> Result<()> {
        if self.widget.handle().is_some() {
            return Ok(());
        }
        self.transition_to(ActivationLevel::Running)?;

        let flags = self.flags();
        if flags.own_window {
            self.widget.set_visible_state(false);
            let handle = self
                .widget
                .create_native_handle(WindowStyle { visible: false })
                .map_err(|err| HostError::NoWindowHandle(Some(err)))?;
            tracing::debug!(host_id = %self.id, handle = handle.0, "created host-owned window");
            self.emit(HostEvent::HandleCreated(handle));
        } else if flags.need_own_window {
            self.create_fake_window()?;
        } else {
            self.transition_to(ActivationLevel::InPlace)?;
            if self.flags().need_own_window && self.widget.handle().is_none() {
                self.create_fake_window()?;
            }
        }
        Ok(())
    }

    fn create_fake_window(&self) -> Result<()> {
        self.update_flags(|flags| {
            flags.need_own_window = false;
            flags.faking_window = true;
        });
        let style = WindowStyle {
            visible: self.widget.is_visible(),
        };
        match self.widget.create_native_handle(style) {
            Ok(handle) => {
                tracing::debug!(host_id = %self.id, handle = handle.0, "created placeholder window");
                self.emit(HostEvent::HandleCreated(handle));
                Ok(())
            }
            Err(err) => {
                self.update_flags(|flags| flags.faking_window = false);
                Err(HostError::NoWindowHandle(Some(err)))
            }
        }
    }

    /// Takes over the object's in-place window.
    pub(crate) fn attach_window(&self, handle: WindowHandle) {
        if self.flags().faking_window {
            self.destroy_fake_window();
        }
        let requested = self.widget.bounds().size();
        self.widget.assign_handle(handle);
        self.widget.update_bounds();

        if let Some(natural) = self.object_extent_pixels() {
            let location = self.widget.bounds();
            if requested.width < natural.width || requested.height < natural.height {
                self.set_bounds(location.with_size(natural));
            } else {
                let accepted = self.set_extent(requested);
                if accepted != requested {
                    self.set_bounds(location.with_size(accepted));
                }
            }
        }

        self.wndproc.set(self.context.windows().window_proc(handle));
        tracing::debug!(host_id = %self.id, handle = handle.0, "attached object window");
        self.emit(HostEvent::HandleCreated(handle));
    }

    pub(crate) fn detach_window(&self) {
        if let Some(handle) = self.widget.handle() {
            self.emit(HostEvent::HandleDestroyed(handle));
            self.widget.release_handle();
            tracing::debug!(host_id = %self.id, handle = handle.0, "detached object window");
        }
        self.wndproc.set(0);
    }

    pub(crate) fn destroy_fake_window(&self) {
        if !self.flags().faking_window {
            return;
        }
        // Cleared first: the destroy message must not see a placeholder.
        self.update_flags(|flags| flags.faking_window = false);
        self.widget.destroy_native_handle();
        tracing::debug!(host_id = %self.id, "destroyed placeholder window");
    }

    pub(crate) fn show_object(&self) -> ObjectResult<()> {
        let flags = self.flags();
        if flags.own_window {
            return Ok(());
        }
        if flags.faking_window {
            self.destroy_fake_window();
        }
        if self.level.get() < ActivationLevel::Running {
            return Ok(());
        }
        let Some(object) = self.hosted() else {
            return Ok(());
        };
        match object.window() {
            Ok(handle) if !handle.is_null() => {
                if self.widget.handle() != Some(handle) {
                    self.detach_window();
                    self.attach_window(handle);
                }
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::debug!(host_id = %self.id, error = %err, "object has no in-place window");
                Err(err)
            }
        }
    }

    pub(crate) fn ensure_window_present(&self) -> Result<()> {
        if self.widget.handle().is_none() {
            if let Some(site) = self.client_site() {
                if let Err(err) = site.show_object() {
                    tracing::trace!(host_id = %self.id, error = %err, "show object failed");
                }
            }
        }
        if self.widget.handle().is_some() || !self.widget.has_parent() {
            return Ok(());
        }
        tracing::error!(host_id = %self.id, "object refused to supply a window");
        Err(HostError::NoWindowHandle(None))
    }

    /// Verifies the object still forwards to the host's window procedure and
    /// repairs the chain if it does not. Returns false after a repair.
    pub(crate) fn check_subclassing(&self) -> bool {
        let Some(handle) = self.widget.handle() else {
            return true;
        };
        let wndproc = self.wndproc.get();
        if wndproc == 0 {
            return true;
        }
        let windows = self.context.windows();
        let current = windows.window_proc(handle);
        if current == wndproc {
            return true;
        }

        let message = self.context.subclass_check_message();
        if windows.send_message(handle, message, 0, 0) == SUBCLASS_CHECK_SENTINEL {
            self.wndproc.set(current);
            return true;
        }

        tracing::warn!(
            host_id = %self.id,
            handle = handle.0,
            "object replaced the window procedure without forwarding, resubclassing"
        );
        self.widget.release_handle();
        windows.set_window_proc(handle, current);
        self.widget.assign_handle(handle);
        self.wndproc.set(windows.window_proc(handle));
        self.update_flags(|flags| flags.manual_update = true);
        false
    }

    pub(crate) fn object_extent_pixels(&self) -> Option<Size> {
        let object = self.hosted()?;
        let extent = object.extent().ok()?;
        Some(self.context.dpi().size_from_himetric(extent))
    }

    /// Pushes a pixel size to the object and returns the size it settled on.
    pub(crate) fn set_extent(&self, size: Size) -> Size {
        let Some(object) = self.hosted() else {
            return size;
        };
        let himetric = self.context.dpi().size_to_himetric(size);
        if let Err(err) = object.set_extent(himetric) {
            tracing::debug!(host_id = %self.id, error = %err, "object rejected extent");
            if let Ok(current) = object.extent() {
                let _ = object.set_extent(current);
            }
        }
        self.object_extent_pixels().unwrap_or(size)
    }

    fn set_object_rects(&self, bounds: Rect) {
        if self.level.get() < ActivationLevel::InPlace {
            return;
        }
        let Some(object) = self.hosted() else {
            return;
        };
        if let Err(err) = object.set_object_rects(bounds, bounds) {
            tracing::debug!(host_id = %self.id, error = %err, "setting object rects failed");
        }
    }

    pub(crate) fn set_bounds(&self, requested: Rect) {
        if self.flags().setting_bounds {
            return;
        }
        self.update_flags(|flags| flags.setting_bounds = true);
        self.apply_bounds(requested);
        self.update_flags(|flags| flags.setting_bounds = false);
    }

    fn apply_bounds(&self, requested: Rect) {
        let mut bounds = requested;
        if self.flags().faking_window {
            self.widget.set_bounds_core(bounds);
            return;
        }
        let old = self.widget.bounds();
        if old == bounds {
            return;
        }
        if self.widget.handle().is_none() {
            self.widget.set_bounds_core(bounds);
            return;
        }
        if self.level.get() > ActivationLevel::Running {
            self.check_subclassing();
            if bounds.size() != old.size() {
                bounds = bounds.with_size(self.set_extent(bounds.size()));
            }
        }
        if self.flags().manual_update {
            self.set_object_rects(bounds);
            self.check_subclassing();
            self.widget.update_bounds();
        } else {
            self.set_object_rects(bounds);
            self.widget.set_bounds_core(bounds);
        }
    }

    pub(crate) fn object_pos_rect_changed(&self, position: Rect) -> ObjectResult<()> {
        let object = match self.hosted() {
            Some(object) if self.level.get() >= ActivationLevel::InPlace => object,
            _ => return Ok(()),
        };
        object.set_object_rects(position, position)?;
        self.update_flags(|flags| flags.value_changed = true);
        Ok(())
    }

    pub(crate) fn handle_message(&self, message: &WindowMessage) -> isize {
        if message.message == self.context.subclass_check_message() {
            return SUBCLASS_CHECK_SENTINEL;
        }
        match message.message {
            WM_DESTROY => self.on_destroy(message),
            WM_NCDESTROY => self.detach_and_forward(message),
            WM_KILLFOCUS => {
                self.focus_target.set(WindowHandle(message.wparam as isize));
                let result = self.widget.base_window_proc(message);
                self.focus_target.set(WindowHandle::NULL);
                result
            }
            WM_HELP => {
                self.widget.base_window_proc(message);
                self.widget.default_window_proc(message)
            }
            WM_KEYUP => {
                if self.flags().processing_key_up {
                    return 0;
                }
                self.update_flags(|flags| flags.processing_key_up = true);
                let result = self.widget.default_window_proc(message);
                self.update_flags(|flags| flags.processing_key_up = false);
                result
            }
            WM_COMMAND | WM_CONTEXTMENU => self.widget.default_window_proc(message),
            _ if message.is_mouse() || message.is_keyboard() => {
                self.widget.default_window_proc(message)
            }
            _ => self.widget.base_window_proc(message),
        }
    }

    fn on_destroy(&self, message: &WindowMessage) -> isize {
        if self.level.get() >= ActivationLevel::InPlace {
            if let Some(object) = self.hosted() {
                if let Ok(handle) = object.window() {
                    if !handle.is_null() {
                        self.context.windows().park(handle);
                    }
                }
            }
        }
        let visible = self.widget.is_visible();
        if let Err(err) = self.transition_to(ActivationLevel::Running) {
            tracing::warn!(host_id = %self.id, error = %err, "deactivation on window destroy failed");
        }
        let result = self.detach_and_forward(message);
        if visible != self.widget.is_visible() {
            self.widget.set_visible_state(visible);
        }
        result
    }

    fn detach_and_forward(&self, message: &WindowMessage) -> isize {
        let flags = self.flags();
        if flags.own_window || flags.faking_window || self.wndproc.get() == 0 {
            return self.widget.base_window_proc(message);
        }
        self.detach_window();
        self.context.windows().call_window_proc(message)
    }

    pub(crate) fn set_visible(&self, visible: bool) -> Result<()> {
        let was_visible = self.widget.is_visible();
        if was_visible != visible
            && (self.widget.handle().is_some() || visible)
            && self.widget.has_parent()
            && self.widget.parent_visible()
            && !self.flags().own_window
        {
            if self.level.get() < ActivationLevel::Running {
                self.transition_to(ActivationLevel::Running)?;
            }
            if visible {
                if self.flags().faking_window {
                    self.destroy_fake_window();
                }
                if self.widget.handle().is_none() {
                    self.set_extent(self.widget.bounds().size());
                    if let Err(err) = self.in_place_activate() {
                        tracing::debug!(host_id = %self.id, error = %err, "in-place show failed, using show verb");
                        self.make_visible_with_show()?;
                    }
                } else {
                    self.make_visible_with_show()?;
                }
                if self.level.get() < ActivationLevel::InPlace {
                    self.set_level(ActivationLevel::InPlace);
                }
            } else if self.level.get() >= ActivationLevel::InPlace {
                self.hide_object()?;
            }
        }
        if !visible {
            self.update_flags(|flags| flags.need_own_window = false);
        }
        if !self.flags().own_window {
            self.widget.set_visible_state(visible);
        }
        Ok(())
    }

    fn make_visible_with_show(&self) -> Result<()> {
        let object = self
            .hosted()
            .ok_or(HostError::NoWindowHandle(None))?;
        object
            .do_verb(Verb::Show, self.widget.parent_handle(), self.widget.bounds())
            .map_err(|err| HostError::NoWindowHandle(Some(err)))?;
        self.ensure_window_present()
    }
}

#[cfg(test)]
mod tests {
    use axhost_domain::{ActivationLevel, HostConfig, MiscStatus, Rect, Size, WindowOwnership};

    use crate::host::HostEvent;
    use crate::testing::{Fixture, MockObject, HOST_PROC};
    use crate::widget::{WindowMessage, WM_DESTROY, WM_KILLFOCUS};

    #[test]
    fn attach_fires_handle_created_once() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        let created = std::rc::Rc::new(std::cell::Cell::new(0));
        let seen = created.clone();
        host.subscribe(move |event| {
            if matches!(event, HostEvent::HandleCreated(_)) {
                seen.set(seen.get() + 1);
            }
        });

        host.create_handle().expect("create handle");
        assert_eq!(created.get(), 1);
        assert_eq!(host.level(), ActivationLevel::InPlace);
        assert_eq!(host.ownership(), WindowOwnership::ObjectOwnsWindow);
        let handle = host.handle().expect("handle");
        assert_eq!(Some(handle), fixture.object().current_window());
        assert_eq!(fixture.windows().window_proc_of(handle), HOST_PROC);
        host.close().expect("close");
    }

    #[test]
    fn invisible_at_runtime_objects_use_the_host_window() {
        let fixture = Fixture::with_object(
            MockObject::new().with_misc_status(MiscStatus(MiscStatus::INVISIBLE_AT_RUNTIME)),
        );
        let host = fixture.host(HostConfig::default());
        host.create_handle().expect("create handle");

        assert_eq!(host.ownership(), WindowOwnership::HostOwnsWindow);
        let handle = host.handle().expect("handle");
        assert!(fixture.windows().is_host_created(handle));
        assert!(!fixture.widget().is_visible_flag());

        host.transition_to(ActivationLevel::InPlace).expect("in place");
        assert_eq!(fixture.object().verb_count(axhost_domain::Verb::Show), 0);
        host.close().expect("close");
    }

    #[test]
    fn host_size_wins_unless_smaller_than_the_object() {
        let fixture = Fixture::with_object(MockObject::new().with_natural_size(Size::new(120, 40)));
        fixture.widget().set_bounds_silently(Rect::new(0, 0, 60, 80));
        let host = fixture.host(HostConfig::default());
        host.create_handle().expect("create handle");
        assert_eq!(host.bounds().size(), Size::new(120, 40));

        let fixture = Fixture::with_object(MockObject::new().with_natural_size(Size::new(50, 20)));
        fixture.widget().set_bounds_silently(Rect::new(0, 0, 200, 100));
        let host2 = fixture.host(HostConfig::default());
        host2.create_handle().expect("create handle");
        assert_eq!(host2.bounds().size(), Size::new(200, 100));
        assert_eq!(fixture.object().extent_pixels(), Size::new(200, 100));
        host.close().expect("close");
        host2.close().expect("close");
    }

    #[test]
    fn default_sized_host_adopts_natural_size() {
        let fixture = Fixture::with_object(MockObject::new().with_natural_size(Size::new(90, 30)));
        fixture.widget().set_bounds_silently(Rect::new(0, 0, 75, 23));
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::InPlace).expect("in place");
        assert_eq!(host.bounds().size(), Size::new(90, 30));
        host.close().expect("close");
    }

    #[test]
    fn placement_leaves_the_natural_size_open() {
        let fixture = Fixture::with_object(MockObject::new().with_natural_size(Size::new(90, 30)));
        let host = fixture.host(HostConfig::default());
        host.place(Rect::new(12, 8, 75, 23));
        host.transition_to(ActivationLevel::InPlace).expect("in place");
        assert_eq!(host.bounds(), Rect::new(12, 8, 90, 30));
        host.close().expect("close");

        let fixture = Fixture::with_object(MockObject::new().with_natural_size(Size::new(90, 30)));
        let host = fixture.host(HostConfig::default());
        host.set_bounds(Rect::new(12, 8, 75, 23));
        host.transition_to(ActivationLevel::InPlace).expect("in place");
        assert_eq!(host.bounds(), Rect::new(12, 8, 75, 23));
        host.close().expect("close");
    }

    #[test]
    fn hostile_subclass_is_repaired_and_switches_to_manual_updates() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.create_handle().expect("create handle");
        let handle = host.handle().expect("handle");

        assert!(host.check_subclassing());
        assert!(!host.manual_update());

        fixture.windows().hostile_subclass(handle);
        assert!(!host.check_subclassing());
        assert!(host.manual_update());
        assert_eq!(fixture.windows().window_proc_of(handle), HOST_PROC);
        assert!(host.check_subclassing(), "repair is idempotent");

        let rects_before = fixture.object().calls_named("set_object_rects");
        let core_before = fixture.widget().set_bounds_core_calls();
        host.set_bounds(Rect::new(5, 5, 140, 60));
        assert_eq!(fixture.object().calls_named("set_object_rects"), rects_before + 1);
        assert_eq!(fixture.widget().set_bounds_core_calls(), core_before);
        assert!(fixture.widget().update_bounds_calls() > 0);
        host.close().expect("close");
    }

    #[test]
    fn forwarding_subclass_is_accepted() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.create_handle().expect("create handle");
        let handle = host.handle().expect("handle");

        fixture.windows().forwarding_subclass(handle);
        assert!(host.check_subclassing());
        assert!(!host.manual_update());

        let core_before = fixture.widget().set_bounds_core_calls();
        host.set_bounds(Rect::new(1, 2, 100, 50));
        assert_eq!(fixture.widget().set_bounds_core_calls(), core_before + 1);
        host.close().expect("close");
    }

    #[test]
    fn hidden_object_that_drops_its_window_gets_a_placeholder() {
        let fixture = Fixture::with_object(MockObject::new().deactivating_on_hide());
        fixture.widget().set_visible_flag(false);
        let host = fixture.host(HostConfig::default());

        host.create_handle().expect("create handle");
        assert_eq!(host.level(), ActivationLevel::InPlace);
        assert_eq!(host.ownership(), WindowOwnership::HostFakesWindow);
        let placeholder = host.handle().expect("placeholder");
        assert!(fixture.windows().is_host_created(placeholder));

        host.set_visible(true).expect("show");
        assert_ne!(host.ownership(), WindowOwnership::HostFakesWindow);
        assert!(!fixture.windows().is_alive(placeholder));
        let handle = host.handle().expect("real window");
        assert!(!fixture.windows().is_host_created(handle));
        host.close().expect("close");
    }

    #[test]
    fn destroy_parks_the_object_window_and_deactivates() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.create_handle().expect("create handle");
        let handle = host.handle().expect("handle");

        host.handle_message(&WindowMessage::new(handle, WM_DESTROY));
        assert_eq!(fixture.windows().parked(), vec![handle]);
        assert_eq!(host.level(), ActivationLevel::Running);
        assert!(host.handle().is_none());
        host.close().expect("close");
    }

    #[test]
    fn messages_are_routed_to_the_object_or_the_base() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.create_handle().expect("create handle");
        let handle = host.handle().expect("handle");
        let check = fixture.context().subclass_check_message();

        assert_eq!(host.handle_message(&WindowMessage::new(handle, check)), 123);
        host.handle_message(&WindowMessage::new(handle, 0x0201));
        host.handle_message(&WindowMessage::new(handle, 0x0100));
        host.handle_message(&WindowMessage::new(handle, 0x000F));
        host.handle_message(&WindowMessage::new(handle, WM_KILLFOCUS).with_params(77, 0));

        let widget = fixture.widget();
        assert_eq!(widget.default_messages(), vec![0x0201, 0x0100]);
        assert_eq!(widget.base_messages(), vec![0x000F, WM_KILLFOCUS]);
        assert_eq!(host.focus_target(), axhost_domain::WindowHandle::NULL);
        host.close().expect("close");
    }
}
