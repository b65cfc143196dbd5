//! Property tests for BLTE decoding

#![allow(clippy::expect_used, clippy::unwrap_used)]

use cascade_crypto::KeyStore;
use cascade_formats::blte::{self, BlteBuilder, BlteError};
use proptest::prelude::*;

fn chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8)
}

proptest! {
    #[test]
    fn stored_chunks_concatenate(chunks in chunks()) {
        let payload = chunks
            .iter()
            .fold(BlteBuilder::new(), |builder, chunk| builder.add_stored(chunk))
            .build();

        let decoded = blte::decode(&payload, &KeyStore::empty()).expect("Operation should succeed");
        prop_assert_eq!(decoded, chunks.concat());
    }

    #[test]
    fn deflate_chunks_round_trip(chunks in chunks()) {
        let mut builder = BlteBuilder::new();
        for chunk in &chunks {
            builder = builder.add_deflate(chunk).expect("Operation should succeed");
        }

        let decoded = blte::decode(&builder.build(), &KeyStore::empty())
            .expect("Operation should succeed");
        prop_assert_eq!(decoded, chunks.concat());
    }

    #[test]
    fn truncated_payload_fails_softly(chunks in chunks(), cut in 1usize..64) {
        let payload = chunks
            .iter()
            .fold(BlteBuilder::new(), |builder, chunk| builder.add_stored(chunk))
            .build();
        let cut = cut.min(payload.len() - 8);

        let result = blte::decode(&payload[..payload.len() - cut], &KeyStore::empty());
        let err = result.expect_err("Truncated payload must not decode");
        prop_assert!(err.is_soft());
        let is_truncated = matches!(err, BlteError::Truncated { .. });
        prop_assert!(is_truncated);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut payload = b"BLTE".to_vec();
        payload.extend_from_slice(&data);
        let _ = blte::decode(&payload, &KeyStore::empty());
    }
}
