//! Flat binary record for [`PersistedState`].
//!
//! All integers are little-endian `i32`. Fields in order: mechanism tag,
//! format version, manual-update flag (one byte), license length in UTF-16
//! units followed by the units, reserved skip-block count followed by that
//! many `(length, bytes)` blocks, payload length followed by the payload.
//! Trailing `(field id, length, bytes)` sections may follow; field 7 holds
//! the property bag as JSON and unknown fields are skipped.

use axhost_domain::{Mechanism, PersistedState, PropertyBag};
use base64::Engine as _;
use bytes::{Buf, BufMut, BytesMut};

use crate::error::WireError;

const PROPERTY_BAG_FIELD: i32 = 7;

pub trait PersistedStateExt: Sized {
    fn save(&self) -> Result<Vec<u8>, WireError>;
    fn load(data: &[u8]) -> Result<Self, WireError>;
    fn to_base64(&self) -> Result<String, WireError>;
    fn from_base64(text: &str) -> Result<Self, WireError>;
}

impl PersistedStateExt for PersistedState {
    fn save(&self) -> Result<Vec<u8>, WireError> {
        let mut out = BytesMut::with_capacity(32 + self.payload().len());
        out.put_i32_le(self.mechanism().tag());
        out.put_i32_le(self.version());
        out.put_u8(u8::from(self.manual_update()));

        let license: Vec<u16> = self
            .license_key()
            .map(|key| key.encode_utf16().collect())
            .unwrap_or_default();
        out.put_i32_le(length_field(license.len())?);
        for unit in license {
            out.put_u16_le(unit);
        }

        out.put_i32_le(0);
        out.put_i32_le(length_field(self.payload().len())?);
        out.put_slice(self.payload());

        if let Some(bag) = self.property_bag() {
            match serde_json::to_vec(bag) {
                Ok(json) => {
                    out.put_i32_le(PROPERTY_BAG_FIELD);
                    out.put_i32_le(length_field(json.len())?);
                    out.put_slice(&json);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "property bag could not be encoded, omitting it");
                }
            }
        }
        Ok(out.to_vec())
    }

    fn load(data: &[u8]) -> Result<Self, WireError> {
        let mut buf = data;
        let tag = read_i32(&mut buf)?;
        let mechanism = Mechanism::from_tag(tag).ok_or(WireError::UnknownMechanism(tag))?;
        let version = read_i32(&mut buf)?;
        if version < PersistedState::CURRENT_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        ensure(&buf, 1)?;
        let manual_update = buf.get_u8() != 0;

        let license_units = read_len(&mut buf)?;
        ensure(&buf, license_units * 2)?;
        let units: Vec<u16> = (0..license_units).map(|_| buf.get_u16_le()).collect();
        let license = String::from_utf16(&units).map_err(|_| WireError::InvalidLicense)?;

        let skip_blocks = read_len(&mut buf)?;
        for _ in 0..skip_blocks {
            let len = read_len(&mut buf)?;
            ensure(&buf, len)?;
            buf.advance(len);
        }

        let payload_len = read_len(&mut buf)?;
        ensure(&buf, payload_len)?;
        let payload = buf[..payload_len].to_vec();
        buf.advance(payload_len);

        let mut bag = None;
        while buf.has_remaining() {
            let field = read_i32(&mut buf)?;
            let len = read_len(&mut buf)?;
            ensure(&buf, len)?;
            if field == PROPERTY_BAG_FIELD {
                let parsed: PropertyBag = serde_json::from_slice(&buf[..len])
                    .map_err(|err| WireError::InvalidPropertyBag(err.to_string()))?;
                bag = Some(parsed);
            } else {
                tracing::debug!(field, len, "skipping unknown persisted state field");
            }
            buf.advance(len);
        }

        Ok(PersistedState::new(mechanism, payload)
            .with_version(version)
            .with_manual_update(manual_update)
            .with_license_key(Some(license))
            .with_property_bag(bag))
    }

    fn to_base64(&self) -> Result<String, WireError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.save()?))
    }

    fn from_base64(text: &str) -> Result<Self, WireError> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|_| WireError::InvalidBase64)?;
        Self::load(&data)
    }
}

fn ensure(buf: &&[u8], needed: usize) -> Result<(), WireError> {
    if buf.remaining() < needed {
        return Err(WireError::Truncated {
            needed: needed - buf.remaining(),
        });
    }
    Ok(())
}

fn read_i32(buf: &mut &[u8]) -> Result<i32, WireError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32_le())
}

fn length_field(len: usize) -> Result<i32, WireError> {
    i32::try_from(len).map_err(|_| WireError::TooLong(len))
}

fn read_len(buf: &mut &[u8]) -> Result<usize, WireError> {
    let len = read_i32(buf)?;
    usize::try_from(len).map_err(|_| WireError::NegativeLength(len))
}

#[cfg(test)]
mod tests {
    use axhost_domain::PropertyValue;
    use proptest::prelude::*;

    use super::*;

    fn sample() -> PersistedState {
        PersistedState::new(Mechanism::InitializedByteStream, vec![0xDE, 0xAD, 0xBE, 0xEF])
            .with_manual_update(true)
            .with_license_key(Some("Lic-Ø1".into()))
    }

    #[test]
    fn layout_matches_the_documented_record() {
        let bytes = PersistedState::new(Mechanism::StructuredStorage, vec![9, 8])
            .with_license_key(Some("ab".into()))
            .save()
            .expect("save");
        let expected: Vec<u8> = [
            &2i32.to_le_bytes()[..],
            &1i32.to_le_bytes(),
            &[0u8],
            &2i32.to_le_bytes(),
            &[b'a', 0, b'b', 0],
            &0i32.to_le_bytes(),
            &2i32.to_le_bytes(),
            &[9, 8],
        ]
        .concat();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn saved_state_loads_back_identically() {
        let state = sample();
        let bytes = state.save().expect("save");
        let loaded = PersistedState::load(&bytes).expect("load");
        assert_eq!(loaded, state);
        assert_eq!(loaded.save().expect("save"), bytes);
    }

    #[test]
    fn empty_license_means_no_license() {
        let state = PersistedState::new(Mechanism::ByteStream, vec![]);
        let loaded = PersistedState::load(&state.save().expect("save")).expect("load");
        assert_eq!(loaded.license_key(), None);
    }

    #[test]
    fn skip_blocks_are_ignored() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.push(0x55);

        let loaded = PersistedState::load(&bytes).expect("load");
        assert_eq!(loaded.mechanism(), Mechanism::ByteStream);
        assert_eq!(loaded.version(), 1);
        assert!(!loaded.manual_update());
        assert_eq!(loaded.license_key(), None);
        assert_eq!(loaded.payload(), &[0x55]);
        assert_eq!(loaded.property_bag(), None);
    }

    #[test]
    fn partial_trailing_sections_are_rejected() {
        let mut bytes = sample().save().expect("save");
        bytes.extend_from_slice(&[7, 0]);
        assert_eq!(
            PersistedState::load(&bytes),
            Err(WireError::Truncated { needed: 2 })
        );
    }

    #[test]
    fn unknown_trailing_fields_are_skipped() {
        let mut bytes = sample().save().expect("save");
        bytes.extend_from_slice(&42i32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(PersistedState::load(&bytes).expect("load"), sample());
    }

    #[test]
    fn oversized_lengths_do_not_fit_the_record() {
        assert_eq!(length_field(i32::MAX as usize), Ok(i32::MAX));
        assert_eq!(
            length_field(i32::MAX as usize + 1),
            Err(WireError::TooLong(i32::MAX as usize + 1))
        );
    }

    #[test]
    fn newer_versions_are_accepted_and_preserved() {
        let state = sample().with_version(4);
        let loaded = PersistedState::load(&state.save().expect("save")).expect("load");
        assert_eq!(loaded.version(), 4);
    }

    #[test]
    fn malformed_records_are_rejected() {
        let bytes = sample().save().expect("save");
        assert!(matches!(
            PersistedState::load(&bytes[..bytes.len() - 1]),
            Err(WireError::Truncated { needed: 1 })
        ));

        let mut bad_tag = bytes.clone();
        bad_tag[..4].copy_from_slice(&9i32.to_le_bytes());
        assert_eq!(PersistedState::load(&bad_tag), Err(WireError::UnknownMechanism(9)));

        let mut old = bytes.clone();
        old[4..8].copy_from_slice(&0i32.to_le_bytes());
        assert_eq!(PersistedState::load(&old), Err(WireError::UnsupportedVersion(0)));

        let mut negative = bytes;
        negative[9..13].copy_from_slice(&(-3i32).to_le_bytes());
        assert_eq!(PersistedState::load(&negative), Err(WireError::NegativeLength(-3)));
    }

    #[test]
    fn property_bag_rides_in_field_seven() {
        let mut bag = PropertyBag::new();
        bag.write("Caption", PropertyValue::String("Go".into()));
        bag.write("Enabled", PropertyValue::Bool(true));
        let state = sample().with_property_bag(Some(bag.clone()));

        let loaded = PersistedState::load(&state.save().expect("save")).expect("load");
        assert_eq!(loaded.property_bag(), Some(&bag));

        let plain = PersistedState::load(&sample().save().expect("save")).expect("load");
        assert_eq!(plain.property_bag(), None);
    }

    #[test]
    fn base64_text_form() {
        let state = sample();
        let text = state.to_base64().expect("encode");
        assert_eq!(PersistedState::from_base64(&format!(" {text}\n")).expect("decode"), state);
        assert_eq!(PersistedState::from_base64("not base64!"), Err(WireError::InvalidBase64));
    }

    proptest! {
        #[test]
        fn decoding_arbitrary_bytes_never_panics(data in prop::collection::vec(any::<u8>(), 0..96)) {
            let _ = PersistedState::load(&data);
        }

        #[test]
        fn arbitrary_states_survive_the_record(
            tag in 0i32..4,
            manual in any::<bool>(),
            license in "[a-zA-Z0-9-]{0,12}",
            payload in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let state = PersistedState::new(Mechanism::from_tag(tag).expect("tag"), payload)
                .with_manual_update(manual)
                .with_license_key(Some(license));
            prop_assert_eq!(PersistedState::load(&state.save().expect("save")).expect("load"), state);
        }
    }
}
