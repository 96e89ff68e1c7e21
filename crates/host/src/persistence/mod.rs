//! Capturing and restoring the object's durable state.

pub mod wire;

use axhost_domain::{ActivationLevel, Mechanism, PersistedState, PropertyBag};

use crate::error::{HostError, ObjectResult, Result};
use crate::host::HostInner;
use crate::object::{DirtyState, HostedObject};

/// Persistence protocol the object speaks, probed once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceProtocol {
    #[default]
    Unsupported,
    ByteStream,
    InitializedByteStream,
    StructuredStorage,
    PropertyBag,
}

impl PersistenceProtocol {
    pub fn mechanism(self) -> Option<Mechanism> {
        match self {
            Self::Unsupported => None,
            Self::ByteStream => Some(Mechanism::ByteStream),
            Self::InitializedByteStream => Some(Mechanism::InitializedByteStream),
            Self::StructuredStorage => Some(Mechanism::StructuredStorage),
            Self::PropertyBag => Some(Mechanism::PropertyBag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PersistenceSupport {
    pub primary: PersistenceProtocol,
    /// The object also accepts a property bag alongside its primary protocol.
    pub property_bag: bool,
}

impl PersistenceSupport {
    /// Preference order: initialized stream, stream, storage, then bag only.
    pub fn probe(object: &dyn HostedObject) -> Self {
        let property_bag = object.persist_property_bag().is_some();
        let primary = if object.persist_stream_init().is_some() {
            PersistenceProtocol::InitializedByteStream
        } else if object.persist_stream().is_some() {
            PersistenceProtocol::ByteStream
        } else if object.persist_storage().is_some() {
            PersistenceProtocol::StructuredStorage
        } else if property_bag {
            PersistenceProtocol::PropertyBag
        } else {
            PersistenceProtocol::Unsupported
        };
        Self {
            primary,
            property_bag,
        }
    }
}

/// Holds the object's outgoing notifications frozen while alive.
struct FreezeGuard<'a> {
    host: &'a HostInner,
}

impl<'a> FreezeGuard<'a> {
    fn new(host: &'a HostInner) -> Self {
        if let Some(object) = host.hosted() {
            if let Err(err) = object.freeze_events(true) {
                tracing::trace!(host_id = %host.id, error = %err, "freeze events failed");
            }
        }
        host.freeze_count.set(host.freeze_count.get() + 1);
        Self { host }
    }
}

impl Drop for FreezeGuard<'_> {
    fn drop(&mut self) {
        let host = self.host;
        host.freeze_count
            .set(host.freeze_count.get().saturating_sub(1));
        if let Some(object) = host.hosted() {
            if let Err(err) = object.freeze_events(false) {
                tracing::trace!(host_id = %host.id, error = %err, "unfreeze events failed");
            }
        }
    }
}

fn is_dirty_answer(state: DirtyState) -> bool {
    // Objects are known to answer "clean" when they are not; only an
    // explicit clean answer is believed.
    !matches!(state, DirtyState::Clean)
}

impl HostInner {
    /// Loads the pending state into the object or lets it initialize itself.
    pub(crate) fn depersist(&self) -> Result<()> {
        let _freeze = FreezeGuard::new(self);
        let state = self.persisted.borrow().clone();
        match state {
            None => self.init_new(),
            Some(state) => self.load_state(&state),
        }
    }

    fn init_new(&self) -> Result<()> {
        let object = self
            .hosted()
            .ok_or(HostError::NoPersistenceInterface)?;
        let support = self.support();
        let result: ObjectResult<()> = match support.primary {
            PersistenceProtocol::InitializedByteStream => object
                .persist_stream_init()
                .map_or(Ok(()), |persist| persist.init_new()),
            PersistenceProtocol::ByteStream => Ok(()),
            PersistenceProtocol::StructuredStorage => object
                .persist_storage()
                .map_or(Ok(()), |persist| persist.init_new()),
            PersistenceProtocol::PropertyBag => object
                .persist_property_bag()
                .map_or(Ok(()), |persist| persist.init_new()),
            PersistenceProtocol::Unsupported => {
                tracing::error!(host_id = %self.id, "object implements no persistence interface");
                return Err(HostError::NoPersistenceInterface);
            }
        };
        if let Err(err) = result {
            tracing::debug!(host_id = %self.id, error = %err, "object failed to initialize itself");
        }
        self.mechanism.set(support.primary.mechanism());
        Ok(())
    }

    fn load_state(&self, state: &PersistedState) -> Result<()> {
        let Some(object) = self.hosted() else {
            return Err(HostError::NoPersistenceInterface);
        };
        let requested = state.mechanism();
        let loaded = match requested {
            Mechanism::InitializedByteStream => match object.persist_stream_init() {
                Some(persist) => Some(persist.load(state.payload()).map(|_| requested)),
                None => {
                    tracing::debug!(host_id = %self.id, "loading initialized stream state as a plain stream");
                    load_stream(object.as_ref(), state.payload())
                }
            },
            Mechanism::ByteStream => load_stream(object.as_ref(), state.payload()),
            Mechanism::StructuredStorage => object.persist_storage().map(|persist| {
                if state.payload().is_empty() {
                    persist.init_new().map(|_| requested)
                } else {
                    persist.load(state.payload()).map(|_| requested)
                }
            }),
            Mechanism::PropertyBag => match (object.persist_property_bag(), state.property_bag()) {
                (Some(persist), Some(bag)) => Some(persist.load(bag).map(|_| requested)),
                _ => None,
            },
        };

        match loaded {
            Some(Ok(mechanism)) => {
                self.mechanism.set(Some(mechanism));
                if requested != Mechanism::PropertyBag {
                    self.load_property_bag(object.as_ref(), state);
                }
                tracing::debug!(host_id = %self.id, %mechanism, "restored persisted state");
                Ok(())
            }
            Some(Err(err)) => {
                tracing::warn!(
                    host_id = %self.id,
                    mechanism = %requested,
                    hresult = err.code(),
                    error = %err,
                    "object failed to load persisted state, initializing instead"
                );
                self.discard_rejected_state();
                self.init_new()
            }
            None => {
                tracing::warn!(
                    host_id = %self.id,
                    mechanism = %requested,
                    "object does not support the persisted mechanism, initializing instead"
                );
                self.discard_rejected_state();
                self.init_new()
            }
        }
    }

    /// The object never took the stored state, so the next snapshot has to
    /// come from the object itself.
    fn discard_rejected_state(&self) {
        self.persisted.borrow_mut().take();
        self.update_flags(|flags| flags.value_changed = true);
    }

    fn load_property_bag(&self, object: &dyn HostedObject, state: &PersistedState) {
        let (Some(persist), Some(bag)) = (object.persist_property_bag(), state.property_bag()) else {
            return;
        };
        if let Err(err) = persist.load(bag) {
            tracing::warn!(host_id = %self.id, error = %err, "object failed to load property bag");
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        if self.level.get() < ActivationLevel::Running {
            return false;
        }
        if self.flags().value_changed {
            return true;
        }
        let Some(object) = self.hosted() else {
            return false;
        };
        let answer = match self.mechanism.get() {
            Some(Mechanism::InitializedByteStream) => object
                .persist_stream_init()
                .map(|persist| persist.is_dirty()),
            Some(Mechanism::ByteStream) => object.persist_stream().map(|persist| persist.is_dirty()),
            Some(Mechanism::StructuredStorage) => {
                object.persist_storage().map(|persist| persist.is_dirty())
            }
            Some(Mechanism::PropertyBag) | None => None,
        };
        answer.map_or(true, is_dirty_answer)
    }

    pub(crate) fn snapshot(&self) -> Option<PersistedState> {
        let cached = self.persisted.borrow().clone();
        if cached.is_some() && !self.is_dirty() {
            return cached;
        }
        match self.capture_state() {
            Some(state) => {
                *self.persisted.borrow_mut() = Some(state.clone());
                self.update_flags(|flags| flags.value_changed = false);
                Some(state)
            }
            None => cached,
        }
    }

    fn capture_state(&self) -> Option<PersistedState> {
        if self.level.get() < ActivationLevel::Running {
            return None;
        }
        let object = self.hosted()?;
        self.change_nesting.set(self.change_nesting.get() + 1);
        let captured = self.capture_with(object.as_ref());
        self.change_nesting.set(self.change_nesting.get() - 1);

        match captured {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(host_id = %self.id, hresult = err.code(), error = %err, "capturing state failed");
                None
            }
        }
    }

    fn capture_with(&self, object: &dyn HostedObject) -> ObjectResult<Option<PersistedState>> {
        let Some(mechanism) = self.mechanism.get() else {
            tracing::debug!(host_id = %self.id, "persistence mechanism unknown, nothing to capture");
            return Ok(None);
        };

        let bag = match object.persist_property_bag() {
            Some(persist) if self.support().property_bag => {
                let mut bag = PropertyBag::new();
                match persist.save(&mut bag, true, true) {
                    Ok(()) => Some(bag),
                    Err(err) => {
                        tracing::warn!(host_id = %self.id, error = %err, "saving property bag failed");
                        None
                    }
                }
            }
            _ => None,
        };

        let payload = match mechanism {
            Mechanism::InitializedByteStream => match object.persist_stream_init() {
                Some(persist) => persist.save(true)?,
                None => return Ok(None),
            },
            Mechanism::ByteStream => match object.persist_stream() {
                Some(persist) => persist.save(true)?,
                None => match object.persist_stream_init() {
                    Some(persist) => persist.save(true)?,
                    None => return Ok(None),
                },
            },
            Mechanism::StructuredStorage => match object.persist_storage() {
                Some(persist) => persist.save()?,
                None => return Ok(None),
            },
            Mechanism::PropertyBag => {
                if bag.is_none() {
                    return Ok(None);
                }
                Vec::new()
            }
        };

        let state = PersistedState::new(mechanism, payload)
            .with_manual_update(self.flags().manual_update)
            .with_license_key(self.license_key.borrow().clone())
            .with_property_bag(bag);
        tracing::debug!(host_id = %self.id, %mechanism, bytes = state.payload().len(), "captured state");
        Ok(Some(state))
    }

    pub(crate) fn restore(&self, state: PersistedState) -> Result<()> {
        if self.flags().closed {
            return Err(HostError::Closed);
        }
        let manual_update = state.manual_update();
        if let Some(key) = state.license_key() {
            *self.license_key.borrow_mut() = Some(key.to_string());
        }
        *self.persisted.borrow_mut() = Some(state);
        self.update_flags(|flags| {
            flags.state_set = true;
            flags.manual_update = manual_update;
        });
        if self.level.get() >= ActivationLevel::Running {
            self.depersist()
        } else {
            tracing::debug!(host_id = %self.id, "state stored until the object runs");
            Ok(())
        }
    }
}

fn load_stream(object: &dyn HostedObject, payload: &[u8]) -> Option<ObjectResult<Mechanism>> {
    if let Some(persist) = object.persist_stream() {
        return Some(persist.load(payload).map(|_| Mechanism::ByteStream));
    }
    object
        .persist_stream_init()
        .map(|persist| persist.load(payload).map(|_| Mechanism::InitializedByteStream))
}

#[cfg(test)]
mod tests {
    use axhost_domain::{ActivationLevel, HostConfig, Mechanism, PersistedState, PropertyValue};

    use super::*;
    use crate::error::{HostError, ObjectError, E_FAIL};
    use crate::persistence::wire::PersistedStateExt;
    use crate::testing::{Fixture, MockObject, MockPersistence};

    #[test]
    fn probe_prefers_initialized_stream() {
        let object = MockObject::new().with_persistence(MockPersistence::all());
        let support = PersistenceSupport::probe(&object);
        assert_eq!(support.primary, PersistenceProtocol::InitializedByteStream);
        assert!(support.property_bag);

        let object = MockObject::new().with_persistence(MockPersistence::storage_only());
        assert_eq!(
            PersistenceSupport::probe(&object).primary,
            PersistenceProtocol::StructuredStorage
        );

        let object = MockObject::new().with_persistence(MockPersistence::bag_only());
        assert_eq!(
            PersistenceSupport::probe(&object).primary,
            PersistenceProtocol::PropertyBag
        );
    }

    #[test]
    fn snapshot_round_trips_through_a_fresh_host() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        fixture.object().set_data(b"caption=hello".to_vec());
        let first = host.snapshot().expect("snapshot");
        let bytes = first.save().expect("save");

        let fixture2 = Fixture::new();
        let host2 = fixture2.host(HostConfig::default());
        host2.transition_to(ActivationLevel::Loaded).expect("load");
        host2
            .restore(PersistedState::load(&bytes).expect("decode"))
            .expect("restore");
        host2.transition_to(ActivationLevel::Running).expect("run");
        assert_eq!(fixture2.object().data(), b"caption=hello".to_vec());

        let second = host2.snapshot().expect("snapshot");
        assert_eq!(second.save().expect("save"), bytes);
        host.close().expect("close");
        host2.close().expect("close");
    }

    #[test]
    fn clean_objects_return_the_cached_snapshot() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");

        let first = host.snapshot().expect("snapshot");
        let saves = fixture.object().calls_named("save");
        let again = host.snapshot().expect("snapshot");
        assert_eq!(first, again);
        assert_eq!(fixture.object().calls_named("save"), saves);
        host.close().expect("close");
    }

    #[test]
    fn indeterminate_dirty_answers_count_as_dirty() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        host.snapshot().expect("snapshot");

        fixture.object().set_dirty(DirtyState::Indeterminate);
        assert!(host.is_dirty());
        let saves = fixture.object().calls_named("save");
        host.snapshot().expect("snapshot");
        assert_eq!(fixture.object().calls_named("save"), saves + 1);
        host.close().expect("close");
    }

    #[test]
    fn changed_property_marks_the_host_dirty() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        host.snapshot().expect("snapshot");
        assert!(!host.is_dirty());

        host.site().expect("site").on_changed(Some(3));
        assert!(host.is_dirty());
        host.snapshot().expect("snapshot");
        assert!(!host.is_dirty());
        host.close().expect("close");
    }

    #[test]
    fn mismatched_state_falls_back_to_self_initialization() {
        let fixture = Fixture::with_object(MockObject::new().with_persistence(MockPersistence::stream_init_only()));
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        let inits = fixture.object().calls_named("init_new");

        host.restore(PersistedState::new(Mechanism::StructuredStorage, vec![1, 2, 3]))
            .expect("restore tolerated");
        assert_eq!(fixture.object().calls_named("init_new"), inits + 1);
        assert_eq!(fixture.object().calls_named("load"), 0);
        assert_eq!(host.level(), ActivationLevel::Running);
        host.close().expect("close");
    }

    #[test]
    fn snapshot_after_rejected_state_comes_from_the_object() {
        let fixture = Fixture::with_object(MockObject::new().with_persistence(MockPersistence::stream_init_only()));
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");

        host.restore(PersistedState::new(Mechanism::StructuredStorage, vec![1, 2, 3]))
            .expect("restore tolerated");
        assert!(host.is_dirty());
        fixture.object().set_data(b"own".to_vec());

        let state = host.snapshot().expect("snapshot");
        assert_eq!(state.mechanism(), Mechanism::InitializedByteStream);
        assert_eq!(state.payload(), b"own");
        assert!(!host.is_dirty());
        host.close().expect("close");
    }

    #[test]
    fn failing_load_falls_back_to_self_initialization() {
        let fixture = Fixture::with_object(
            MockObject::new().failing("load", ObjectError::new(E_FAIL, "corrupt")),
        );
        let host = fixture.host(HostConfig::default());
        host.restore(PersistedState::new(Mechanism::InitializedByteStream, vec![9]))
            .expect("stored");
        host.transition_to(ActivationLevel::Running).expect("run survives bad state");
        assert_eq!(fixture.object().calls_named("init_new"), 1);
        host.close().expect("close");
    }

    #[test]
    fn restore_freezes_events_for_its_duration() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        host.restore(PersistedState::new(Mechanism::InitializedByteStream, vec![4, 2]))
            .expect("restore");

        let calls = fixture.object().calls();
        let freeze = calls.iter().rposition(|c| c == "freeze_events(true)").expect("freeze");
        let load = calls.iter().rposition(|c| c == "load").expect("load");
        let thaw = calls.iter().rposition(|c| c == "freeze_events(false)").expect("thaw");
        assert!(freeze < load && load < thaw);
        assert_eq!(fixture.object().freeze_depth(), 0);
        host.close().expect("close");
    }

    #[test]
    fn objects_without_persistence_are_fatal() {
        let fixture = Fixture::with_object(MockObject::new().with_persistence(MockPersistence::none()));
        let host = fixture.host(HostConfig::default());
        let err = host
            .transition_to(ActivationLevel::Running)
            .expect_err("no persistence");
        assert!(matches!(err, HostError::NoPersistenceInterface));
        assert!(err.is_fatal());
        host.close().expect("close");
    }

    #[test]
    fn property_bag_travels_with_the_stream() {
        let fixture = Fixture::with_object(MockObject::new().with_persistence(MockPersistence::all()));
        let host = fixture.host(HostConfig::default());
        host.transition_to(ActivationLevel::Running).expect("run");
        fixture
            .object()
            .bag_write("Caption", PropertyValue::String("OK".into()));

        let state = host.snapshot().expect("snapshot");
        assert_eq!(state.mechanism(), Mechanism::InitializedByteStream);
        let bag = state.property_bag().expect("bag");
        assert_eq!(bag.read("Caption"), Some(&PropertyValue::String("OK".into())));
        host.close().expect("close");
    }

    #[test]
    fn restored_state_carries_license_and_manual_update() {
        let fixture = Fixture::new();
        let host = fixture.host(HostConfig::default());
        let state = PersistedState::new(Mechanism::InitializedByteStream, vec![])
            .with_manual_update(true)
            .with_license_key(Some("key-1".into()));
        host.restore(state).expect("restore");
        assert!(host.manual_update());
        assert_eq!(host.license_key().as_deref(), Some("key-1"));
        host.close().expect("close");
    }
}
