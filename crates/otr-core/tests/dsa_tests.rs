// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

use num_bigint::BigUint;

use otr_core::crypto::sha256;
use otr_core::dh::{GENERATOR, MODULUS, ORDER};
use otr_core::dsa::{PrivateKey, PublicKey};
use otr_core::encoding::Decoder;
use otr_core::rand::{FixedRandom, SeededRandom};
use otr_core::types::OtrError;

/// A deterministic test key over the DH group's own parameters; the
/// signature scheme is parameter-agnostic.
fn test_key(x: u64) -> PrivateKey {
    PrivateKey::from_components(
        MODULUS.clone(),
        ORDER.clone(),
        GENERATOR.clone(),
        BigUint::from(x),
    )
    .unwrap()
}

#[test]
fn sign_verify_round_trip() {
    let key = test_key(0xA11CE);
    let digest = sha256(b"authenticated key exchange transcript");

    let mut rand = SeededRandom::new([3u8; 32]);
    let sig = key.sign(&mut rand, &digest).unwrap();
    assert_eq!(sig.len(), key.public().signature_length());
    key.public().verify(&digest, &sig).unwrap();
}

#[test]
fn corrupted_signature_is_rejected() {
    let key = test_key(0xA11CE);
    let digest = sha256(b"transcript");

    let mut rand = SeededRandom::new([4u8; 32]);
    let mut sig = key.sign(&mut rand, &digest).unwrap();
    sig[7] ^= 0x01;
    assert_eq!(
        key.public().verify(&digest, &sig).unwrap_err(),
        OtrError::InvalidSignature
    );
}

#[test]
fn signature_does_not_transfer_to_another_digest() {
    let key = test_key(0xA11CE);
    let mut rand = SeededRandom::new([5u8; 32]);
    let sig = key.sign(&mut rand, &sha256(b"one")).unwrap();
    assert_eq!(
        key.public().verify(&sha256(b"two"), &sig).unwrap_err(),
        OtrError::InvalidSignature
    );
}

#[test]
fn wrong_key_does_not_verify() {
    let alice = test_key(0xA11CE);
    let bob = test_key(0xB0B);
    let digest = sha256(b"transcript");

    let mut rand = SeededRandom::new([6u8; 32]);
    let sig = alice.sign(&mut rand, &digest).unwrap();
    assert!(bob.public().verify(&digest, &sig).is_err());
}

#[test]
fn wrong_length_signature_is_rejected() {
    let key = test_key(0xA11CE);
    assert_eq!(
        key.public().verify(&sha256(b"x"), &[0u8; 40]).unwrap_err(),
        OtrError::InvalidSignature
    );
}

#[test]
fn public_key_serialization_round_trips() {
    let key = test_key(0xA11CE);
    let mut ser = Vec::new();
    key.public().serialize(&mut ser);

    let parsed = PublicKey::parse(&mut Decoder::new(&ser)).unwrap();
    assert_eq!(&parsed, key.public());
}

#[test]
fn private_key_serialization_round_trips() {
    let key = test_key(0xA11CE);
    let mut ser = Vec::new();
    key.serialize(&mut ser);

    let parsed = PrivateKey::parse(&mut Decoder::new(&ser)).unwrap();
    let digest = sha256(b"round trip");
    let mut rand = SeededRandom::new([7u8; 32]);
    let sig = parsed.sign(&mut rand, &digest).unwrap();
    key.public().verify(&digest, &sig).unwrap();
}

#[test]
fn parse_rejects_wrong_key_type() {
    let mut ser = Vec::new();
    test_key(0xA11CE).public().serialize(&mut ser);
    ser[1] = 0x01;
    assert_eq!(
        PublicKey::parse(&mut Decoder::new(&ser)).unwrap_err(),
        OtrError::InvalidPublicKey
    );
}

#[test]
fn fingerprint_is_stable_and_key_specific() {
    let alice = test_key(0xA11CE);
    let bob = test_key(0xB0B);

    let fp = alice.public().fingerprint();
    assert_eq!(fp.len(), 20);
    assert_eq!(fp, alice.public().fingerprint());
    assert_ne!(fp, bob.public().fingerprint());
}

#[test]
fn sign_reports_exhausted_randomness() {
    let key = test_key(0xA11CE);
    let mut rand = FixedRandom::new(vec![0xAB, 0xCD]);
    assert_eq!(
        key.sign(&mut rand, &sha256(b"x")).unwrap_err(),
        OtrError::ShortRandomRead
    );
}
