use proptest::prelude::*;
use uspkg::container::Container;
use uspkg::crypto::{decrypt, derive_key, encrypt, encrypt_with_iv};
use uspkg::hash::{digest, digest_reader};
use uspkg::metadata::{is_valid_title, MAX_TITLE_LEN};

proptest! {
    #[test]
    fn key_derivation_is_deterministic(id in ".{0,64}") {
        prop_assert_eq!(derive_key(&id), derive_key(&id));
        let expected = digest(id.as_bytes());
        prop_assert_eq!(&derive_key(&id)[..], expected.as_bytes());
    }

    #[test]
    fn distinct_ids_give_distinct_keys(a in "[a-f0-9-]{1,36}", b in "[a-f0-9-]{1,36}") {
        prop_assume!(a != b);
        prop_assert_ne!(derive_key(&a), derive_key(&b));
    }

    #[test]
    fn cipher_round_trip(id in ".{1,40}", data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let key = derive_key(&id);
        let (ct, iv) = encrypt(&key, &data);
        prop_assert_eq!(ct.len(), data.len());
        prop_assert_eq!(decrypt(&key, &iv, &ct), data);
    }

    #[test]
    fn cipher_is_a_stream(data in proptest::collection::vec(any::<u8>(), 1..512), cut in 0usize..512) {
        // A prefix of the plaintext encrypts to a prefix of the ciphertext.
        let key = derive_key("stream");
        let iv = [7u8; 16];
        let cut = cut.min(data.len());
        let whole = encrypt_with_iv(&key, &iv, &data);
        let prefix = encrypt_with_iv(&key, &iv, &data[..cut]);
        prop_assert_eq!(&whole[..cut], &prefix[..]);
    }

    #[test]
    fn streamed_digest_matches_buffer(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
        prop_assert_eq!(digest_reader(&data[..]).unwrap(), digest(&data));
    }

    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = Container::decode(&bytes);
    }

    #[test]
    fn title_validity_counts_characters(title in "\\PC{0,120}") {
        let n = title.chars().count();
        prop_assert_eq!(is_valid_title(&title), (1..=MAX_TITLE_LEN).contains(&n));
    }
}
