use std::rc::Rc;

use axhost_domain::{AmbientId, AmbientValue, OleColor, RightToLeft};

use crate::host::HostInner;
use crate::object::{ObjectEventSink, QuickActivateRequest};
use crate::site::ClientSite;

const DEFAULT_BACK_COLOR: OleColor = OleColor(0x00F0_F0F0);
const DEFAULT_FORE_COLOR: OleColor = OleColor(0);

impl HostInner {
    pub(crate) fn ambient_property(&self, id: AmbientId) -> Option<AmbientValue> {
        tracing::trace!(host_id = %self.id, ambient = ?id, "ambient property requested");
        match id {
            AmbientId::UserMode => Some(AmbientValue::Bool(self.config.user_mode)),
            AmbientId::AutoClip | AmbientId::MessageReflect => Some(AmbientValue::Bool(true)),
            AmbientId::UiDead
            | AmbientId::DisplayAsDefault
            | AmbientId::ShowGrabHandles
            | AmbientId::ShowHatching
            | AmbientId::SupportsMnemonics => Some(AmbientValue::Bool(false)),
            AmbientId::Font => self.widget.ambient_font().map(|font| {
                let interned = self.context.fonts().intern(&font);
                AmbientValue::Font((*interned).clone())
            }),
            AmbientId::BackColor => self.widget.ambient_back_color().map(AmbientValue::Color),
            AmbientId::ForeColor => self.widget.ambient_fore_color().map(AmbientValue::Color),
            AmbientId::DisplayName => Some(AmbientValue::Text(self.widget.name())),
            AmbientId::LocaleId => Some(AmbientValue::Locale(self.context.locale_id())),
            AmbientId::RightToLeft => self
                .widget
                .right_to_left_chain()
                .into_iter()
                .find_map(|setting| match setting {
                    RightToLeft::Yes => Some(true),
                    RightToLeft::No => Some(false),
                    RightToLeft::Inherit => None,
                })
                .map(AmbientValue::Bool),
        }
    }

    pub(crate) fn quick_activate_request(
        &self,
        site: Rc<dyn ClientSite>,
        events: Rc<dyn ObjectEventSink>,
    ) -> QuickActivateRequest {
        QuickActivateRequest {
            site,
            events,
            user_mode: self.config.user_mode,
            ui_dead: false,
            auto_clip: true,
            message_reflect: true,
            supports_mnemonics: false,
            back_color: self.widget.ambient_back_color().unwrap_or(DEFAULT_BACK_COLOR),
            fore_color: self.widget.ambient_fore_color().unwrap_or(DEFAULT_FORE_COLOR),
            font: self
                .widget
                .ambient_font()
                .map(|font| (*self.context.fonts().intern(&font)).clone()),
            locale: self.context.locale_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use axhost_domain::{
        ActivationLevel, AmbientId, AmbientValue, FontDescriptor, HostConfig, OleColor,
        RightToLeft,
    };

    use crate::error::DISP_E_MEMBERNOTFOUND;
    use crate::testing::Fixture;

    #[test]
    fn ambient_properties_come_from_the_widget_and_context() {
        let fixture = Fixture::new();
        let widget = fixture.widget();
        widget.set_ambient_colors(Some(OleColor::from_rgb(10, 20, 30)), None);
        widget.set_right_to_left_chain(vec![RightToLeft::Inherit, RightToLeft::Yes]);
        let host = fixture.host(HostConfig {
            user_mode: false,
            ..HostConfig::default()
        });
        host.transition_to(ActivationLevel::Running).expect("run");
        let site = host.site().expect("site");

        let query = |id: AmbientId| site.ambient_property(id.dispid());
        assert_eq!(query(AmbientId::UserMode).ok(), Some(AmbientValue::Bool(false)));
        assert_eq!(query(AmbientId::LocaleId).ok(), Some(AmbientValue::Locale(1033)));
        assert_eq!(
            query(AmbientId::DisplayName).ok(),
            Some(AmbientValue::Text("axHost1".into()))
        );
        assert_eq!(
            query(AmbientId::BackColor).ok(),
            Some(AmbientValue::Color(OleColor::from_rgb(10, 20, 30)))
        );
        assert_eq!(query(AmbientId::RightToLeft).ok(), Some(AmbientValue::Bool(true)));
        assert_eq!(
            query(AmbientId::ForeColor).map_err(|err| err.code()),
            Err(DISP_E_MEMBERNOTFOUND)
        );
        assert_eq!(
            site.ambient_property(12345).map_err(|err| err.code()),
            Err(DISP_E_MEMBERNOTFOUND)
        );
        host.close().expect("close");
    }

    #[test]
    fn ambient_fonts_are_shared_through_the_context() {
        let fixture = Fixture::new();
        fixture
            .widget()
            .set_ambient_font(Some(FontDescriptor::new("Tahoma", 8.0)));
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        let site = host.site().expect("site");

        let first = site.ambient_property(AmbientId::Font.dispid()).expect("font");
        let second = site.ambient_property(AmbientId::Font.dispid()).expect("font");
        assert_eq!(first, second);
        assert_eq!(fixture.context().fonts().len(), 1);
        host.close().expect("close");
    }
}
