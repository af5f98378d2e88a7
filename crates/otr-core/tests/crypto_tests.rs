// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

use otr_core::crypto::{
    aes_ctr, aes_ctr_zero, constant_time_eq, hmac_sha1, hmac_sha256, hmac_sha256_160, sha1,
    sha256, sha1_prefixed, sha256_prefixed,
};

#[test]
fn sha1_matches_known_vector() {
    assert_eq!(
        sha1(b"abc").to_vec(),
        hex::decode("a9993e364706816aba3e25717850c26c9cd0d89d").unwrap()
    );
}

#[test]
fn sha256_matches_known_vector() {
    assert_eq!(
        sha256(b"abc").to_vec(),
        hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad").unwrap()
    );
}

#[test]
fn prefixed_hashes_differ_per_domain_byte() {
    assert_ne!(sha1_prefixed(0x01, b"s"), sha1_prefixed(0x02, b"s"));
    assert_ne!(sha256_prefixed(0x00, b"s"), sha256_prefixed(0x01, b"s"));
    // The prefix is equivalent to prepending one byte.
    assert_eq!(sha256_prefixed(0x61, b"bc"), sha256(b"abc"));
}

#[test]
fn hmac_sha1_matches_rfc2202_vector() {
    let key = [0x0b; 20];
    assert_eq!(
        hmac_sha1(&key, b"Hi There").to_vec(),
        hex::decode("b617318655057264e28bc0b6fb378c8ef146be00").unwrap()
    );
}

#[test]
fn hmac_sha256_matches_rfc4231_vector() {
    let key = [0x0b; 20];
    assert_eq!(
        hmac_sha256(&key, b"Hi There").to_vec(),
        hex::decode("b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7")
            .unwrap()
    );
}

#[test]
fn truncated_hmac_is_a_prefix_of_the_full_tag() {
    let key = [0x42; 32];
    let full = hmac_sha256(&key, b"payload");
    let truncated = hmac_sha256_160(&key, b"payload");
    assert_eq!(&full[..20], &truncated[..]);
}

#[test]
fn aes_ctr_round_trips() {
    let key = [0x11; 16];
    let ctr = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09];
    let plaintext = b"attack at dawn, but quietly".to_vec();

    let ciphertext = aes_ctr(&key, &ctr, &plaintext);
    assert_ne!(ciphertext, plaintext);
    assert_eq!(aes_ctr(&key, &ctr, &ciphertext), plaintext);
}

#[test]
fn aes_ctr_depends_on_the_counter_half() {
    let key = [0x11; 16];
    let a = aes_ctr(&key, &[0, 0, 0, 0, 0, 0, 0, 1], b"same plaintext");
    let b = aes_ctr(&key, &[0, 0, 0, 0, 0, 0, 0, 2], b"same plaintext");
    assert_ne!(a, b);
}

#[test]
fn aes_ctr_zero_is_the_zero_counter_case() {
    let key = [0x3c; 16];
    assert_eq!(
        aes_ctr_zero(&key, b"blob"),
        aes_ctr(&key, &[0u8; 8], b"blob")
    );
}

#[test]
fn constant_time_eq_semantics() {
    assert!(constant_time_eq(b"abc", b"abc"));
    assert!(!constant_time_eq(b"abc", b"abd"));
    assert!(!constant_time_eq(b"abc", b"abcd"));
    assert!(constant_time_eq(b"", b""));
}
