//! Activation ladder: Passive, Loaded, Running, InPlace, UiActive.
//!
//! Transitions move one level at a time. The object's site callbacks may move
//! the level while a step runs; after every step the observed level must be
//! the expected one (or unchanged, in which case the host records the step
//! itself). Anything else is a broken contract and aborts the transition.

use std::rc::Rc;

use axhost_domain::{ActivationLevel, MiscStatus, Verb};

use crate::error::{HostError, ObjectError, Result, E_NOTIMPL};
use crate::host::{HostInner, LoadedObject};
use crate::object::HostedObject;
use crate::persistence::PersistenceSupport;
use crate::site::SiteAdapter;

struct TransitionGuard<'a> {
    host: &'a HostInner,
}

impl<'a> TransitionGuard<'a> {
    fn enter(host: &'a HostInner) -> Self {
        host.update_flags(|flags| flags.in_transition = true);
        Self { host }
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.host
            .update_flags(|flags| flags.in_transition = false);
    }
}

impl HostInner {
    pub(crate) fn transition_to(&self, target: ActivationLevel) -> Result<()> {
        let flags = self.flags();
        if flags.in_transition {
            tracing::trace!(host_id = %self.id, %target, "transition requested while one is in progress");
            return Ok(());
        }
        if flags.closed && target > ActivationLevel::Passive {
            return Err(HostError::Closed);
        }
        if target == ActivationLevel::UiActive
            && self.level.get() < target
            && !self.can_ui_activate()
        {
            return Err(HostError::UiActivationDenied);
        }

        let _guard = TransitionGuard::enter(self);
        loop {
            let current = self.level.get();
            if current == target {
                return Ok(());
            }
            if current < target {
                self.step_up(current)?;
            } else {
                self.step_down(current)?;
            }
        }
    }

    fn step_up(&self, from: ActivationLevel) -> Result<()> {
        let Some(expected) = from.up() else {
            return Ok(());
        };
        tracing::debug!(host_id = %self.id, %from, to = %expected, "stepping up");
        match from {
            ActivationLevel::Passive => self.create_object()?,
            ActivationLevel::Loaded => self.activate_object()?,
            ActivationLevel::Running => self.in_place_activate_step()?,
            ActivationLevel::InPlace => self.ui_activate_step()?,
            ActivationLevel::UiActive => {}
        }
        self.finish_step(from, expected)?;
        if expected == ActivationLevel::UiActive {
            self.claim_ui_activation();
        }
        Ok(())
    }

    fn step_down(&self, from: ActivationLevel) -> Result<()> {
        let Some(expected) = from.down() else {
            return Ok(());
        };
        tracing::debug!(host_id = %self.id, %from, to = %expected, "stepping down");
        match from {
            ActivationLevel::UiActive => self.ui_deactivate_step(),
            ActivationLevel::InPlace => self.in_place_deactivate_step(),
            ActivationLevel::Running => self.deactivate_object(),
            ActivationLevel::Loaded => self.release_object(),
            ActivationLevel::Passive => {}
        }
        self.finish_step(from, expected)
    }

    fn finish_step(&self, from: ActivationLevel, expected: ActivationLevel) -> Result<()> {
        let observed = self.level.get();
        if observed == expected {
            return Ok(());
        }
        if observed == from {
            self.set_level(expected);
            return Ok(());
        }
        tracing::error!(
            host_id = %self.id,
            %from,
            %expected,
            %observed,
            "activation step ended at an unexpected level"
        );
        Err(HostError::InvalidTransition {
            from,
            expected,
            observed,
        })
    }

    fn require_object(&self) -> Result<Rc<dyn HostedObject>> {
        self.hosted()
            .ok_or_else(|| HostError::object("object access", ObjectError::failed("no hosted object")))
    }

    fn resolve_license_key(&self) -> Result<Option<String>> {
        if let Some(key) = self.license_key.borrow().clone() {
            return Ok(Some(key));
        }
        if self.config.user_mode {
            return Ok(None);
        }
        match self.factory.request_license_key() {
            Ok(Some(key)) => {
                tracing::debug!(host_id = %self.id, "obtained runtime license key from class");
                *self.license_key.borrow_mut() = Some(key.clone());
                Ok(Some(key))
            }
            Ok(None) => Ok(None),
            Err(err) if err.is_not_licensed() => Err(HostError::Licensing {
                class_id: self.factory.class_id().to_string(),
                source: err,
            }),
            Err(err) => {
                tracing::warn!(host_id = %self.id, error = %err, "license key request failed");
                Ok(None)
            }
        }
    }

    fn create_object(&self) -> Result<()> {
        let license = self.resolve_license_key()?;
        let created = match license.as_deref() {
            Some(key) => self.factory.create_licensed(key),
            None => self.factory.create(),
        };
        let object = created.map_err(|err| {
            if err.is_not_licensed() {
                tracing::error!(class_id = self.factory.class_id(), "class is not licensed");
                HostError::Licensing {
                    class_id: self.factory.class_id().to_string(),
                    source: err,
                }
            } else {
                HostError::object("create instance", err)
            }
        })?;

        let misc = object.misc_status();
        let support = PersistenceSupport::probe(object.as_ref());
        *self.object.borrow_mut() = Some(LoadedObject {
            object,
            misc,
            support,
        });
        self.apply_misc_status(misc);
        *self.site.borrow_mut() = Some(SiteAdapter::new(self.weak_self.clone()));
        tracing::debug!(
            host_id = %self.id,
            class_id = self.factory.class_id(),
            licensed = license.is_some(),
            persistence = ?support.primary,
            "hosted object created"
        );
        Ok(())
    }

    fn apply_misc_status(&self, misc: MiscStatus) {
        if let Some(loaded) = self.object.borrow_mut().as_mut() {
            loaded.misc = misc;
        }
        let own_window = misc.invisible_at_runtime() && self.config.user_mode;
        self.update_flags(|flags| flags.own_window = own_window);
    }

    fn activate_object(&self) -> Result<()> {
        if !self.quick_activate()? {
            self.slow_activate()?;
        }
        if self.config.user_mode {
            self.start_events();
        }
        Ok(())
    }

    fn quick_activate(&self) -> Result<bool> {
        let object = self.require_object()?;
        let Some(site) = self.client_site() else {
            return Ok(false);
        };
        let request = self.quick_activate_request(site, self.event_forwarder());
        match object.quick_activate(&request) {
            Ok(reply) => {
                self.apply_misc_status(reply.misc_status);
                if let Some(cookie) = reply.event_cookie {
                    self.event_cookie.set(Some(cookie));
                }
                tracing::debug!(host_id = %self.id, "quick activation succeeded");
                self.depersist()?;
                Ok(true)
            }
            Err(err) if err.code() == E_NOTIMPL => {
                tracing::debug!(host_id = %self.id, "quick activation unsupported");
                Ok(false)
            }
            Err(err) => {
                tracing::warn!(
                    host_id = %self.id,
                    hresult = err.code(),
                    error = %err,
                    "quick activation failed, falling back to slow activation"
                );
                if let Err(err) = object.set_client_site(None) {
                    tracing::debug!(host_id = %self.id, error = %err, "clearing client site failed");
                }
                Ok(false)
            }
        }
    }

    fn slow_activate(&self) -> Result<()> {
        let site_first = self.misc_status().set_client_site_first();
        if site_first {
            self.set_client_site()?;
        }
        self.depersist()?;
        if !site_first {
            self.set_client_site()?;
        }
        Ok(())
    }

    fn set_client_site(&self) -> Result<()> {
        let object = self.require_object()?;
        let site = self.client_site();
        object
            .set_client_site(site)
            .map_err(|err| HostError::object("set client site", err))
    }

    fn start_events(&self) {
        if self.event_cookie.get().is_some() {
            return;
        }
        let Some(object) = self.hosted() else {
            return;
        };
        match object.advise(self.event_forwarder()) {
            Ok(cookie) => {
                tracing::debug!(host_id = %self.id, cookie, "connected event sink");
                self.event_cookie.set(Some(cookie));
            }
            Err(err) => {
                tracing::debug!(host_id = %self.id, error = %err, "object exposes no event source");
            }
        }
    }

    pub(crate) fn stop_events(&self) {
        let Some(cookie) = self.event_cookie.take() else {
            return;
        };
        let Some(object) = self.hosted() else {
            return;
        };
        if let Err(err) = object.unadvise(cookie) {
            tracing::warn!(host_id = %self.id, cookie, error = %err, "disconnecting event sink failed");
        }
    }

    fn in_place_activate_step(&self) -> Result<()> {
        if self.flags().own_window {
            tracing::debug!(host_id = %self.id, "host owns the window, skipping in-place activation");
            return Ok(());
        }
        self.in_place_activate()?;
        if !self.widget.is_visible() && self.widget.parent_visible() {
            self.hide_object()?;
        } else {
            self.adopt_natural_size();
        }
        Ok(())
    }

    /// Shows the object in place and makes sure a window came out of it.
    pub(crate) fn in_place_activate(&self) -> Result<()> {
        let object = self.require_object()?;
        object
            .do_verb(Verb::Show, self.widget.parent_handle(), self.widget.bounds())
            .map_err(|err| {
                tracing::warn!(host_id = %self.id, error = %err, "show verb failed");
                HostError::object("show verb", err)
            })?;
        self.ensure_window_present()
    }

    fn adopt_natural_size(&self) {
        let flags = self.flags();
        if flags.state_set || flags.explicit_size {
            return;
        }
        let bounds = self.widget.bounds();
        if bounds.size() != self.config.default_size {
            return;
        }
        if let Some(natural) = self.object_extent_pixels() {
            if natural != bounds.size() {
                tracing::debug!(
                    host_id = %self.id,
                    width = natural.width,
                    height = natural.height,
                    "adopting the object's natural size"
                );
                self.set_bounds(bounds.with_size(natural));
            }
        }
    }

    pub(crate) fn hide_object(&self) -> Result<()> {
        let object = self.require_object()?;
        let result = object
            .do_verb(Verb::Hide, self.widget.parent_handle(), self.widget.bounds())
            .map_err(|err| HostError::object("hide verb", err));
        if self.level.get() < ActivationLevel::InPlace {
            tracing::debug!(host_id = %self.id, "object left in-place activation on hide");
            self.update_flags(|flags| flags.need_own_window = true);
            self.set_level(ActivationLevel::InPlace);
        }
        result
    }

    fn ui_activate_step(&self) -> Result<()> {
        if !self.can_ui_activate() {
            return Err(HostError::UiActivationDenied);
        }
        let object = self.require_object()?;
        object
            .do_verb(Verb::UiActivate, self.widget.parent_handle(), self.widget.bounds())
            .map_err(|err| HostError::object("UI-activate verb", err))
    }

    /// Makes sure the container records this host as UI-active even when the
    /// object never reported its activation.
    fn claim_ui_activation(&self) {
        let Some(container) = self.container.get() else {
            return;
        };
        let registry = self.context.containers();
        if registry.ui_active(container) != Some(self.control_id) {
            registry.on_ui_activate(container, self.control_id);
        }
    }

    fn ui_deactivate_step(&self) {
        if let Some(object) = self.hosted() {
            if let Err(err) = object.ui_deactivate() {
                tracing::warn!(host_id = %self.id, error = %err, "UI deactivation failed");
            }
        }
        if let Some(container) = self.container.get() {
            self.context
                .containers()
                .on_ui_deactivate(container, self.control_id);
        }
    }

    fn in_place_deactivate_step(&self) {
        let flags = self.flags();
        if flags.faking_window {
            self.destroy_fake_window();
        } else if !flags.own_window {
            if let Some(object) = self.hosted() {
                if let Err(err) = object.in_place_deactivate() {
                    tracing::warn!(host_id = %self.id, error = %err, "in-place deactivation failed");
                }
            }
            if self.wndproc.get() != 0 {
                self.detach_window();
            }
        }
        if let Some(container) = self.container.get() {
            self.context
                .containers()
                .on_in_place_deactivate(container, self.control_id);
        }
    }

    fn deactivate_object(&self) {
        self.stop_events();
        if let Some(object) = self.hosted() {
            if let Err(err) = object.set_client_site(None) {
                tracing::warn!(host_id = %self.id, error = %err, "releasing client site failed");
            }
        }
    }

    fn release_object(&self) {
        self.change_nesting.set(self.change_nesting.get() + 1);
        let loaded = self.object.borrow_mut().take();
        if let Some(loaded) = loaded {
            if let Err(err) = loaded.object.close() {
                tracing::debug!(host_id = %self.id, error = %err, "object close failed");
            }
        }
        self.site.borrow_mut().take();
        self.mechanism.set(None);
        self.freeze_count.set(0);
        self.event_cookie.set(None);
        self.wndproc.set(0);
        self.properties.invalidate();
        self.update_flags(|flags| {
            flags.own_window = false;
            flags.need_own_window = false;
            flags.value_changed = false;
        });
        self.change_nesting.set(self.change_nesting.get() - 1);
        tracing::debug!(host_id = %self.id, "hosted object released");
    }

    /// Gives up UI activation because another host in the container takes it.
    pub(crate) fn yield_ui_activation(&self) {
        if self.level.get() != ActivationLevel::UiActive {
            return;
        }
        if let Some(object) = self.hosted() {
            if let Err(err) = object.ui_deactivate() {
                tracing::warn!(host_id = %self.id, error = %err, "UI deactivation on hand-over failed");
            }
        }
        if self.level.get() == ActivationLevel::UiActive {
            self.object_ui_deactivated();
        }
    }

    pub(crate) fn object_in_place_activated(&self) {
        self.set_level(ActivationLevel::InPlace);
        if let Some(container) = self.container.get() {
            self.context
                .containers()
                .on_in_place_activate(container, self.control_id);
        }
    }

    pub(crate) fn object_ui_activated(&self) {
        if let Some(container) = self.container.get() {
            self.context
                .containers()
                .on_ui_activate(container, self.control_id);
        }
        self.set_level(ActivationLevel::UiActive);
        if !self.config.user_mode {
            if let Some(selection) = self.services().and_then(|s| s.selection_service()) {
                selection.select(self.id);
            }
        }
    }

    pub(crate) fn object_ui_deactivated(&self) {
        if let Some(container) = self.container.get() {
            self.context
                .containers()
                .on_ui_deactivate(container, self.control_id);
        }
        if self.level.get() > ActivationLevel::InPlace {
            self.set_level(ActivationLevel::InPlace);
        }
    }

    pub(crate) fn object_in_place_deactivated(&self) {
        if self.level.get() == ActivationLevel::UiActive {
            self.object_ui_deactivated();
        }
        if let Some(container) = self.container.get() {
            self.context
                .containers()
                .on_in_place_deactivate(container, self.control_id);
        }
        let flags = self.flags();
        if !flags.own_window && !flags.faking_window {
            self.detach_window();
        }
        self.set_level(ActivationLevel::Running);
    }
}

#[cfg(test)]
mod tests {
    use axhost_domain::{
        ActivationLevel, ContainerId, HostConfig, MiscStatus, Verb, WindowOwnership,
    };
    use proptest::prelude::*;

    use crate::error::{HostError, ObjectError, CLASS_E_NOTLICENSED, E_FAIL};
    use crate::host::HostEvent;
    use crate::testing::{Fixture, MockObject};

    #[test]
    fn failing_show_verb_stops_in_place_activation() {
        let fixture = Fixture::with_object(
            MockObject::new().failing("do_verb", ObjectError::new(E_FAIL, "cannot show")),
        );
        fixture.widget().set_parent(false, false);
        let host = fixture.host(HostConfig::default());

        let err = host
            .transition_to(ActivationLevel::InPlace)
            .expect_err("show verb failure surfaces");
        assert!(matches!(
            err,
            HostError::Object {
                operation: "show verb",
                ..
            }
        ));
        assert_eq!(host.level(), ActivationLevel::Running);
        assert_eq!(host.handle(), None);
        host.close().expect("close");
    }

    #[test]
    fn climbing_to_ui_active_runs_each_step_once() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());

        host.transition_to(ActivationLevel::UiActive).expect("ui activate");

        let object = fixture.object();
        assert_eq!(host.level(), ActivationLevel::UiActive);
        assert_eq!(fixture.factory_creations(), 1);
        assert_eq!(object.site_assignments(), 1);
        assert_eq!(object.verb_count(Verb::Show), 1);
        assert_eq!(object.verb_count(Verb::UiActivate), 1);
        host.close().expect("close");
    }

    #[test]
    fn repeated_transition_is_a_no_op() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());

        host.transition_to(ActivationLevel::InPlace).expect("first");
        host.transition_to(ActivationLevel::InPlace).expect("second");

        assert_eq!(fixture.factory_creations(), 1);
        assert_eq!(fixture.object().verb_count(Verb::Show), 1);
        host.close().expect("close");
    }

    #[test]
    fn descending_releases_everything_in_order() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::UiActive).expect("up");
        host.transition_to(ActivationLevel::Passive).expect("down");

        let object = fixture.object();
        assert_eq!(host.level(), ActivationLevel::Passive);
        assert!(host.object().is_none());
        assert_eq!(object.calls_named("ui_deactivate"), 1);
        assert_eq!(object.calls_named("in_place_deactivate"), 1);
        assert_eq!(object.calls_named("unadvise"), 1);
        assert_eq!(object.calls_named("close"), 1);
        let last = object.calls();
        let unadvise = last.iter().position(|c| c == "unadvise").expect("unadvise");
        let close = last.iter().position(|c| c == "close").expect("close");
        assert!(unadvise < close);
        host.close().expect("close");
    }

    #[test]
    fn quick_activation_skips_explicit_site_assignment() {
        let fixture = Fixture::with_object(MockObject::new().supporting_quick_activation());
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");

        let object = fixture.object();
        assert_eq!(object.calls_named("quick_activate"), 1);
        assert_eq!(object.site_assignments(), 0);
        assert_eq!(object.calls_named("init_new"), 1);
        host.close().expect("close");
    }

    #[test]
    fn failing_quick_activation_falls_back() {
        let fixture = Fixture::with_object(
            MockObject::new()
                .supporting_quick_activation()
                .failing("quick_activate", ObjectError::new(E_FAIL, "boom")),
        );
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");

        assert_eq!(host.level(), ActivationLevel::Running);
        assert_eq!(fixture.object().site_assignments(), 1);
        host.close().expect("close");
    }

    #[test]
    fn site_first_objects_get_their_site_before_depersisting() {
        let fixture = Fixture::with_object(
            MockObject::new().with_misc_status(MiscStatus(MiscStatus::SET_CLIENT_SITE_FIRST)),
        );
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");

        let calls = fixture.object().calls();
        let site = calls.iter().position(|c| c == "set_client_site").expect("site");
        let init = calls.iter().position(|c| c == "init_new").expect("init");
        assert!(site < init);

        let fixture = Fixture::new();
        let host2 = fixture.host(HostConfig::default());
        host2.transition_to(ActivationLevel::Running).expect("run");
        let calls = fixture.object().calls();
        let site = calls.iter().position(|c| c == "set_client_site").expect("site");
        let init = calls.iter().position(|c| c == "init_new").expect("init");
        assert!(init < site);
        host.close().expect("close");
        host2.close().expect("close");
    }

    #[test]
    fn design_mode_refuses_ui_activation() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig {
            user_mode: false,
            ..HostConfig::default()
        });
        let err = host
            .transition_to(ActivationLevel::UiActive)
            .expect_err("denied");
        assert!(matches!(err, HostError::UiActivationDenied));
        assert_eq!(host.level(), ActivationLevel::Passive);

        let fixture = Fixture::new();
        let host2 = fixture.host(HostConfig {
            user_mode: false,
            edit_mode_override: true,
            ..HostConfig::default()
        });
        host2.transition_to(ActivationLevel::UiActive).expect("override");
        host.close().expect("close");
        host2.close().expect("close");
    }

    #[test]
    fn unlicensed_creation_is_a_licensing_error() {
        let fixture = Fixture::with_object(MockObject::new());
        fixture.require_license("secret");
        let host = fixture.host(HostConfig::default());

        let err = host
            .transition_to(ActivationLevel::Loaded)
            .expect_err("not licensed");
        match err {
            HostError::Licensing { source, .. } => assert_eq!(source.code(), CLASS_E_NOTLICENSED),
            other => panic!("unexpected error {other:?}"),
        }
        host.close().expect("close");
    }

    #[test]
    fn design_mode_requests_a_license_key() {
        let fixture = Fixture::new();
        fixture.require_license("secret");
        let host = fixture.host(HostConfig {
            user_mode: false,
            ..HostConfig::default()
        });
        host.transition_to(ActivationLevel::Loaded).expect("licensed");
        assert_eq!(host.license_key().as_deref(), Some("secret"));
        host.close().expect("close");
    }

    #[test]
    fn object_dropping_level_mid_step_is_fatal() {
        let fixture = Fixture::with_object(MockObject::new().deactivating_on_ui_activate());
        let host = fixture.host(HostConfig::default());

        let err = host
            .transition_to(ActivationLevel::UiActive)
            .expect_err("contract violation");
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            HostError::InvalidTransition {
                from: ActivationLevel::InPlace,
                expected: ActivationLevel::UiActive,
                observed: ActivationLevel::Running,
            }
        ));
        host.close().expect("close");
    }

    #[test]
    fn silent_objects_still_reach_the_target() {
        let fixture = Fixture::with_object(MockObject::new().without_callbacks());
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::UiActive).expect("ui active");
        assert_eq!(host.level(), ActivationLevel::UiActive);
        host.close().expect("close");
    }

    #[test]
    fn reentrant_transition_from_callback_is_ignored() {
        let fixture = Fixture::new();
        let host = std::rc::Rc::new(fixture.host(HostConfig::default()));
        let weak = std::rc::Rc::downgrade(&host);
        host.subscribe(move |event| {
            if let HostEvent::LevelChanged { to: ActivationLevel::InPlace, .. } = event {
                if let Some(host) = weak.upgrade() {
                    host.transition_to(ActivationLevel::Passive).expect("ignored");
                }
            }
        });
        host.transition_to(ActivationLevel::UiActive).expect("ui active");
        assert_eq!(host.level(), ActivationLevel::UiActive);
        host.close().expect("close");
    }

    #[test]
    fn ui_activation_is_handed_over_within_a_container() {
        let fixture = Fixture::new();
        let first = fixture.host(HostConfig::default());
        let second_object = fixture.add_object(MockObject::new().labelled("second"));
        let second = fixture.host_for(second_object.clone(), HostConfig::default());
        let form = ContainerId(9);
        first.join_container(form);
        second.join_container(form);

        first.transition_to(ActivationLevel::UiActive).expect("first");
        let context = fixture.context();
        let registry = context.containers();
        assert_eq!(registry.ui_active(form), Some(first.control_id()));

        let first_level = std::rc::Rc::new(std::cell::Cell::new(None));
        {
            let first_object = fixture.object();
            let seen = first_level.clone();
            second.subscribe(move |event| {
                if let HostEvent::LevelChanged { to: ActivationLevel::UiActive, .. } = event {
                    seen.set(Some(first_object.calls_named("ui_deactivate")));
                }
            });
        }

        second.transition_to(ActivationLevel::UiActive).expect("second");
        assert_eq!(first_level.get(), Some(1));
        assert_eq!(first.level(), ActivationLevel::InPlace);
        assert_eq!(second.level(), ActivationLevel::UiActive);
        assert_eq!(registry.ui_active(form), Some(second.control_id()));

        first.close().expect("close");
        second.close().expect("close");
        assert_eq!(registry.ui_active(form), None);
    }

    fn level_strategy() -> impl Strategy<Value = ActivationLevel> {
        prop::sample::select(ActivationLevel::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn transitions_land_exactly_on_target(targets in prop::collection::vec(level_strategy(), 1..12)) {
            let fixture = Fixture::new();
            let host = fixture.host(HostConfig::default());
            for target in targets {
                host.transition_to(target).expect("transition");
                prop_assert_eq!(host.level(), target);
                if fixture.widget_holds_object_window() {
                    prop_assert_ne!(host.ownership(), WindowOwnership::HostFakesWindow);
                }
            }
            host.close().expect("close");
            prop_assert_eq!(fixture.context().leaked_hosts(), 0);
        }
    }
}
