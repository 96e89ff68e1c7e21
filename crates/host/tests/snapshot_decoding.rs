use axhost_core::{PersistedStateExt, WireError};
use axhost_domain::{Mechanism, PersistedState, PropertyBag, PropertyValue};
use proptest::prelude::*;

fn mechanism() -> impl Strategy<Value = Mechanism> {
    prop_oneof![
        Just(Mechanism::ByteStream),
        Just(Mechanism::InitializedByteStream),
        Just(Mechanism::StructuredStorage),
    ]
}

fn mandatory_len(license: &str, payload: &[u8]) -> usize {
    4 + 4 + 1 + 4 + license.encode_utf16().count() * 2 + 4 + 4 + payload.len()
}

proptest! {
    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = PersistedState::load(&data);
    }

    #[test]
    fn cutting_the_mandatory_prefix_is_an_error(
        mechanism in mechanism(),
        license in "[a-zA-Z0-9]{0,12}",
        payload in proptest::collection::vec(any::<u8>(), 0..64),
        cut in 0usize..1000,
    ) {
        let state = PersistedState::new(mechanism, payload.clone())
            .with_license_key(Some(license.clone()));
        let bytes = state.save().expect("save");
        let cut = cut % mandatory_len(&license, &payload);
        prop_assert!(PersistedState::load(&bytes[..cut]).is_err());
    }
}

#[test]
fn trailing_bag_survives_text_form() {
    let mut bag = PropertyBag::new();
    bag.write("Caption", PropertyValue::String("Ok".into()));
    bag.write("Enabled", PropertyValue::Bool(true));
    let state = PersistedState::new(Mechanism::StructuredStorage, vec![0xD0, 0xCF])
        .with_manual_update(true)
        .with_property_bag(Some(bag.clone()));

    let restored = PersistedState::from_base64(&state.to_base64().expect("encode")).expect("decode");
    assert_eq!(restored.mechanism(), Mechanism::StructuredStorage);
    assert!(restored.manual_update());
    assert_eq!(restored.property_bag(), Some(&bag));
}

#[test]
fn garbage_text_is_rejected() {
    assert!(matches!(
        PersistedState::from_base64("%%%"),
        Err(WireError::InvalidBase64)
    ));
}
