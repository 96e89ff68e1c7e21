use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Result};
use axhost::domain::{
    ActivationLevel, PropertyValue, Rect, WindowHandle, WindowOwnership,
};
use axhost::{AxHostManager, Backend, CreateHostRequest, HostEvent, ManagerConfig, PumpStatus};
use axhost_core::apartment::{enter_sta, StaGuard};
use axhost_core::object::PropertyInfo;
use axhost_core::testing::{MockFactory, MockObject, MockPersistence, MockWidget, MockWindows};
use axhost_core::units::Dpi;
use axhost_core::widget::FixedLocale;
use axhost_core::{HostContext, ObjectFactory, WidgetBase};
use tokio::sync::mpsc;

struct MockBackend {
    windows: Rc<MockWindows>,
    context: Rc<HostContext>,
    _sta: StaGuard,
}

impl MockBackend {
    fn new() -> Result<Self> {
        let sta = enter_sta();
        let windows = MockWindows::new();
        windows.set_dpi(Some(Dpi::DEFAULT));
        let context = HostContext::new(windows.clone(), Box::new(FixedLocale(1033)));
        Ok(Self {
            windows,
            context,
            _sta: sta,
        })
    }
}

impl Backend for MockBackend {
    fn context(&self) -> Rc<HostContext> {
        self.context.clone()
    }

    fn factory(&self, class_id: &str) -> Result<Box<dyn ObjectFactory>> {
        if class_id != MockFactory::CLASS_ID {
            bail!("class {class_id} is not registered");
        }
        let object = Rc::new(
            MockObject::new()
                .with_persistence(MockPersistence::stream_init_only())
                .with_property(
                    PropertyInfo::new(1, "Caption"),
                    PropertyValue::String("hello".into()),
                ),
        );
        object.attach_windows(self.windows.clone());
        Ok(Box::new(MockFactory::new(object)))
    }

    fn widget(
        &self,
        name: &str,
        _parent: WindowHandle,
        _bounds: Rect,
    ) -> Result<Rc<dyn WidgetBase>> {
        Ok(MockWidget::new(name, self.windows.clone()))
    }

    fn pump(&self, timeout: Duration) -> PumpStatus {
        std::thread::sleep(timeout);
        PumpStatus::Continue
    }
}

fn test_config() -> ManagerConfig {
    ManagerConfig {
        thread_name: "axhost-test-sta".to_string(),
        poll_interval_ms: 2,
        ..ManagerConfig::default()
    }
}

fn manager() -> AxHostManager {
    AxHostManager::spawn(&test_config(), MockBackend::new).expect("spawn manager")
}

fn request() -> CreateHostRequest {
    CreateHostRequest::new(WindowHandle(0x10), MockFactory::CLASS_ID)
}

#[tokio::test]
async fn created_hosts_are_activated_in_place() {
    let manager = manager();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let host_id = manager
        .create_host(request(), events_tx)
        .await
        .expect("create host");

    let status = manager.status(host_id).await.expect("status");
    assert_eq!(status.level, ActivationLevel::InPlace);
    assert_eq!(status.ownership, WindowOwnership::ObjectOwnsWindow);
    assert!(status.handle.is_some());

    let mut levels = Vec::new();
    let mut handles = 0;
    while let Ok(event) = events_rx.try_recv() {
        assert_eq!(event.host_id, host_id);
        match event.event {
            HostEvent::LevelChanged { to, .. } => levels.push(to),
            HostEvent::HandleCreated(_) => handles += 1,
            _ => {}
        }
    }
    assert_eq!(
        levels,
        vec![
            ActivationLevel::Loaded,
            ActivationLevel::Running,
            ActivationLevel::InPlace
        ]
    );
    assert_eq!(handles, 1);

    manager.close_host(host_id).await.expect("close");
}

#[tokio::test]
async fn transitions_step_back_down() {
    let manager = manager();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let host_id = manager
        .create_host(request(), events_tx)
        .await
        .expect("create host");

    manager
        .transition(host_id, ActivationLevel::Loaded)
        .await
        .expect("transition");
    let status = manager.status(host_id).await.expect("status");
    assert_eq!(status.level, ActivationLevel::Loaded);

    manager.close_host(host_id).await.expect("close");
}

#[tokio::test]
async fn properties_are_read_and_written_on_the_apartment_thread() {
    let manager = manager();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let host_id = manager
        .create_host(request(), events_tx)
        .await
        .expect("create host");

    let caption = manager.property(host_id, "Caption").await.expect("read");
    assert_eq!(caption, Some(PropertyValue::String("hello".into())));

    let accepted = manager
        .set_property(host_id, "Caption", PropertyValue::String("bye".into()))
        .await
        .expect("write");
    assert!(accepted);
    let caption = manager.property(host_id, "Caption").await.expect("read");
    assert_eq!(caption, Some(PropertyValue::String("bye".into())));

    assert!(manager.property(host_id, "Missing").await.is_err());
    manager.close_host(host_id).await.expect("close");
}

#[tokio::test]
async fn snapshot_text_can_be_restored() {
    let manager = manager();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let host_id = manager
        .create_host(request(), events_tx)
        .await
        .expect("create host");

    let text = manager
        .snapshot_text(host_id)
        .await
        .expect("snapshot")
        .expect("running objects have state");
    manager
        .restore_text(host_id, &text)
        .await
        .expect("restore");

    let err = manager
        .restore_text(host_id, "not base64!")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("malformed snapshot text"));

    manager.close_host(host_id).await.expect("close");
}

#[tokio::test]
async fn new_hosts_can_start_from_saved_state() {
    let manager = manager();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let first = manager
        .create_host(request(), events_tx.clone())
        .await
        .expect("create host");
    let state = manager
        .snapshot(first)
        .await
        .expect("snapshot")
        .expect("state");

    let second = manager
        .create_host(
            CreateHostRequest {
                state: Some(state),
                activate: ActivationLevel::Running,
                ..request()
            },
            events_tx,
        )
        .await
        .expect("create from state");
    assert_ne!(first, second);
    let status = manager.status(second).await.expect("status");
    assert_eq!(status.level, ActivationLevel::Running);

    manager.close_host(first).await.expect("close");
    manager.close_host(second).await.expect("close");
}

#[tokio::test]
async fn unknown_classes_and_hosts_are_reported() {
    let manager = manager();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();

    let err = manager
        .create_host(
            CreateHostRequest::new(WindowHandle(0x10), "{00000000-0000-0000-0000-000000000000}"),
            events_tx,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("is not registered"));

    let missing = axhost::domain::HostId::new();
    let err = manager.status(missing).await.unwrap_err();
    assert!(err.to_string().contains("unknown host"));
    assert!(manager.close_host(missing).await.is_err());
}

#[tokio::test]
async fn bounds_and_visibility_commands_are_ordered_with_requests() {
    let manager = manager();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let host_id = manager
        .create_host(request(), events_tx)
        .await
        .expect("create host");

    manager
        .set_bounds(host_id, Rect::new(10, 20, 200, 100))
        .expect("set bounds");
    manager.hide(host_id).expect("hide");
    manager.show(host_id).expect("show");

    let status = manager.status(host_id).await.expect("status");
    assert_eq!(status.bounds, Rect::new(10, 20, 200, 100));
    manager.close_host(host_id).await.expect("close");
}

#[tokio::test]
async fn closed_hosts_are_forgotten() {
    let manager = manager();
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let host_id = manager
        .create_host(request(), events_tx)
        .await
        .expect("create host");

    manager.close_host(host_id).await.expect("close");
    assert!(manager.status(host_id).await.is_err());
}

#[test]
fn backend_startup_failures_surface_from_spawn() {
    let result = AxHostManager::spawn(&test_config(), || -> Result<MockBackend> {
        bail!("no apartment today")
    });
    let err = result.err().expect("spawn must fail");
    assert!(err.to_string().contains("no apartment today"));
}

#[cfg(not(windows))]
#[test]
fn native_backend_requires_windows() {
    let err = AxHostManager::native(&test_config()).err().expect("unsupported");
    assert!(err.to_string().contains("only supported on Windows"));
}
