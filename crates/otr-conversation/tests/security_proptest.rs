// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! Randomized property-based tests.
//!
//! The conversation-level cases are capped at a handful of iterations: each
//! one pays for a full 1536-bit AKE.

use num_bigint::BigUint;
use otr_conversation::{Conversation, Policies};
use otr_core::dh::{GENERATOR, MODULUS, ORDER};
use otr_core::dsa;
use otr_core::encoding::{mpi_bytes, Decoder};
use otr_core::rand::SeededRandom;
use proptest::prelude::*;

fn test_key(x: u64) -> dsa::PrivateKey {
    dsa::PrivateKey::from_components(
        MODULUS.clone(),
        ORDER.clone(),
        GENERATOR.clone(),
        BigUint::from(x),
    )
    .unwrap()
}

fn conversation(seed: [u8; 32], x: u64) -> Conversation {
    let mut c = Conversation::new(test_key(x), Box::new(SeededRandom::new(seed)));
    c.add_policy(Policies::ALLOW_V3);
    c
}

fn establish(a: &mut Conversation, b: &mut Conversation) {
    let mut to_b = a.start_ake();
    let mut to_a: Vec<Vec<u8>> = Vec::new();
    while !to_b.is_empty() || !to_a.is_empty() {
        let mut next = Vec::new();
        for m in to_b.drain(..) {
            next.extend(b.receive(&m).unwrap().1);
        }
        to_a.extend(next);
        let mut next = Vec::new();
        for m in to_a.drain(..) {
            next.extend(a.receive(&m).unwrap().1);
        }
        to_b.extend(next);
    }
}

proptest! {
    #[test]
    fn mpi_encoding_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let value = BigUint::from_bytes_be(&bytes);
        let encoded = mpi_bytes(&value);
        let decoded = Decoder::new(&encoded).read_mpi().unwrap();
        prop_assert_eq!(decoded, value);
        // Canonical form: no leading zero bytes survive.
        if encoded.len() > 4 {
            prop_assert_ne!(encoded[4], 0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn arbitrary_plaintext_survives_the_channel(
        message in proptest::collection::vec(any::<u8>(), 1..512),
        fragment_size in prop_oneof![Just(0usize), 64usize..512],
        seed_a in any::<u8>(),
        seed_b in any::<u8>(),
    ) {
        // The payload split logic reserves NUL as the message/TLV separator.
        let message: Vec<u8> = message.into_iter().map(|b| b.max(1)).collect();

        let mut alice = conversation([seed_a; 32], 0xA11CE);
        let mut bob = conversation([seed_b.wrapping_add(1); 32], 0xB0B);
        alice.set_fragment_size(fragment_size);
        bob.set_fragment_size(fragment_size);
        establish(&mut alice, &mut bob);
        prop_assert!(alice.is_encrypted() && bob.is_encrypted());
        prop_assert_eq!(alice.ssid(), bob.ssid());

        let out = alice.send(&message).unwrap();
        if fragment_size > 0 {
            prop_assert!(out.iter().all(|f| f.len() <= fragment_size));
        }

        let mut received = Vec::new();
        for m in &out {
            let (plain, _) = bob.receive(m).unwrap();
            received.extend(plain);
        }
        prop_assert_eq!(received, vec![message]);
    }
}
