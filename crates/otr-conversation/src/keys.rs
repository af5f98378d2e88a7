// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The key-management context shared by the AKE and the data-message engine.
//!
//! Both parties hold two DH key pairs at all times: the one last
//! acknowledged by the peer and a fresh one advertised in every outbound
//! data message. Received messages referring to new key IDs advance the
//! window, retiring the oldest pair. MAC keys of retired pairs queue up for
//! disclosure in the next outbound message, which is what makes old
//! transcripts forgeable and therefore deniable.

use num_bigint::BigUint;
use tracing::debug;

use otr_core::crypto::{sha1, sha1_prefixed, sha256_prefixed};
use otr_core::dh;
use otr_core::encoding::mpi_bytes;
use otr_core::rand::RandomSource;
use otr_core::types::{
    AesKey, MacKey, OtrError, OtrResult, AES_KEY_LENGTH, DH_PRIVATE_BYTES, EXTRA_KEY_LENGTH,
};

/// A DH key pair over the shared 1536-bit group; the private half is wiped
/// on drop.
pub(crate) struct DhKeyPair {
    pub private: BigUint,
    pub public: BigUint,
}

impl DhKeyPair {
    pub fn generate(rand: &mut dyn RandomSource) -> OtrResult<Self> {
        let private = dh::random_exponent(rand, DH_PRIVATE_BYTES)?;
        let public = dh::power_of_generator(&private);
        Ok(Self { private, public })
    }
}

impl Drop for DhKeyPair {
    fn drop(&mut self) {
        dh::wipe(&mut self.private);
    }
}

/// The session keys derived for one (our key, their key) pair.
#[derive(Debug)]
pub(crate) struct SessionKeys {
    pub sending_aes: AesKey,
    pub receiving_aes: AesKey,
    pub sending_mac: MacKey,
    pub receiving_mac: MacKey,
    pub extra_key: [u8; EXTRA_KEY_LENGTH],
}

/// Derives session keys from our private half and both public halves.
///
/// The party with the lexicographically greater public value is "high" and
/// keys its sending direction with `0x01`, the other with `0x02`; MAC keys
/// are the SHA-1 of the corresponding AES key, and the extra symmetric key
/// hangs off the `0xFF` domain byte.
pub(crate) fn calculate_session_keys(
    our_private: &BigUint,
    our_public: &BigUint,
    their_public: &BigUint,
) -> SessionKeys {
    let s = their_public.modpow(our_private, &dh::MODULUS);
    let secbytes = mpi_bytes(&s);

    let (send_byte, recv_byte) = if our_public > their_public {
        (0x01, 0x02)
    } else {
        (0x02, 0x01)
    };

    let mut sending_aes = [0u8; AES_KEY_LENGTH];
    sending_aes.copy_from_slice(&sha1_prefixed(send_byte, &secbytes)[..AES_KEY_LENGTH]);
    let mut receiving_aes = [0u8; AES_KEY_LENGTH];
    receiving_aes.copy_from_slice(&sha1_prefixed(recv_byte, &secbytes)[..AES_KEY_LENGTH]);

    SessionKeys {
        sending_mac: MacKey(sha1(&sending_aes)),
        receiving_mac: MacKey(sha1(&receiving_aes)),
        extra_key: sha256_prefixed(0xFF, &secbytes),
        sending_aes: AesKey(sending_aes),
        receiving_aes: AesKey(receiving_aes),
    }
}

struct CounterEntry {
    /// Our key ID of the pair this counter belongs to.
    our_key_id: u32,
    /// The peer's key ID of the pair this counter belongs to.
    their_key_id: u32,
    /// Highest counter accepted from the peer for this pair.
    value: u64,
}

struct MacKeyUsage {
    /// Our key ID of the pair the MAC key was derived from.
    our_key_id: u32,
    /// The peer's key ID of the pair the MAC key was derived from.
    their_key_id: u32,
    /// The receiving MAC key that authenticated at least one message.
    receiving_mac: MacKey,
}

/// Rolling key state of an encrypted conversation.
#[derive(Default)]
pub(crate) struct KeyManagementContext {
    /// ID of our most recently advertised DH public key.
    pub our_key_id: u32,
    /// ID of the peer's most recent DH public key we have seen.
    pub their_key_id: u32,
    /// Our newest DH pair, advertised in every outbound data message.
    pub our_current: Option<DhKeyPair>,
    /// Our last peer-acknowledged DH pair; keys outbound messages.
    pub our_previous: Option<DhKeyPair>,
    /// The peer's newest advertised DH public key.
    pub their_current_pub: Option<BigUint>,
    /// The peer's prior DH public key, kept for in-flight messages.
    pub their_previous_pub: Option<BigUint>,
    /// Monotonic counter stamped on outbound data messages.
    pub our_counter: u64,
    /// Highest accepted inbound counter per key-ID pair.
    counter_history: Vec<CounterEntry>,
    /// Receiving MAC keys exercised in the current window, awaiting
    /// retirement.
    mac_key_history: Vec<MacKeyUsage>,
    /// Retired MAC keys queued for disclosure in the next outbound message.
    old_mac_keys: Vec<MacKey>,
}

impl KeyManagementContext {
    /// Installs the result of a completed AKE: the handshake pair becomes
    /// our *previous* key (the only one the peer knows), a fresh pair is
    /// generated as *current*, and counters restart.
    pub fn install(
        &mut self,
        ake_pair: DhKeyPair,
        their_pub: BigUint,
        their_key_id: u32,
        rand: &mut dyn RandomSource,
    ) -> OtrResult<()> {
        let fresh = DhKeyPair::generate(rand)?;
        self.our_key_id = 2;
        self.their_key_id = their_key_id;
        self.our_previous = Some(ake_pair);
        self.our_current = Some(fresh);
        self.their_current_pub = Some(their_pub);
        self.their_previous_pub = None;
        self.our_counter = 1;
        self.counter_history.clear();
        self.mac_key_history.clear();
        self.old_mac_keys.clear();
        debug!(our_key_id = self.our_key_id, their_key_id, "installed fresh session keys");
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.our_previous.is_some() && self.their_current_pub.is_some()
    }

    /// Keys for the next outbound data message: our previous (acknowledged)
    /// pair against their newest public key.
    pub fn sending_keys(&self) -> OtrResult<SessionKeys> {
        let ours = self
            .our_previous
            .as_ref()
            .ok_or(OtrError::EncryptedMessageWithNoSecureChannel)?;
        let theirs = self
            .their_current_pub
            .as_ref()
            .ok_or(OtrError::EncryptedMessageWithNoSecureChannel)?;
        Ok(calculate_session_keys(&ours.private, &ours.public, theirs))
    }

    /// Keys for a received data message naming `(recipient_key_id,
    /// sender_key_id)`; both IDs must fall in the current window.
    pub fn receiving_keys(
        &self,
        recipient_key_id: u32,
        sender_key_id: u32,
    ) -> OtrResult<SessionKeys> {
        let ours = if recipient_key_id == self.our_key_id {
            self.our_current.as_ref()
        } else if recipient_key_id + 1 == self.our_key_id {
            self.our_previous.as_ref()
        } else {
            None
        }
        .ok_or(OtrError::UnexpectedOurKeyId(recipient_key_id))?;

        let theirs = if sender_key_id == self.their_key_id {
            self.their_current_pub.as_ref()
        } else if sender_key_id + 1 == self.their_key_id {
            self.their_previous_pub.as_ref()
        } else {
            None
        }
        .ok_or(OtrError::UnexpectedTheirKeyId(sender_key_id))?;

        Ok(calculate_session_keys(&ours.private, &ours.public, theirs))
    }

    /// Enforces that `counter` strictly exceeds the last accepted value for
    /// this key-ID pair. Validation is separate from [`Self::commit_counter`]
    /// so a message that later fails its MAC cannot burn the counter.
    pub fn validate_counter(
        &self,
        sender_key_id: u32,
        recipient_key_id: u32,
        counter: u64,
    ) -> OtrResult<()> {
        let stored = self
            .counter_history
            .iter()
            .find(|e| e.our_key_id == recipient_key_id && e.their_key_id == sender_key_id)
            .map(|e| e.value)
            .unwrap_or(0);
        if counter <= stored {
            return Err(OtrError::CounterRegressed);
        }
        Ok(())
    }

    /// Records an accepted counter for its key-ID pair.
    pub fn commit_counter(&mut self, sender_key_id: u32, recipient_key_id: u32, counter: u64) {
        let entry = self
            .counter_history
            .iter_mut()
            .find(|e| e.our_key_id == recipient_key_id && e.their_key_id == sender_key_id);
        match entry {
            Some(e) => e.value = counter,
            None => self.counter_history.push(CounterEntry {
                our_key_id: recipient_key_id,
                their_key_id: sender_key_id,
                value: counter,
            }),
        }
    }

    /// Remembers that a receiving MAC key was exercised, so it can be
    /// disclosed once its key pair retires.
    pub fn register_used_mac_key(
        &mut self,
        recipient_key_id: u32,
        sender_key_id: u32,
        receiving_mac: MacKey,
    ) {
        let seen = self
            .mac_key_history
            .iter()
            .any(|e| e.our_key_id == recipient_key_id && e.their_key_id == sender_key_id);
        if !seen {
            self.mac_key_history.push(MacKeyUsage {
                our_key_id: recipient_key_id,
                their_key_id: sender_key_id,
                receiving_mac,
            });
        }
    }

    /// The peer acknowledged our current key: generate a successor and slide
    /// our window forward.
    pub fn rotate_our_keys(&mut self, rand: &mut dyn RandomSource) -> OtrResult<()> {
        let fresh = DhKeyPair::generate(rand)?;
        self.our_previous = self.our_current.take();
        self.our_current = Some(fresh);
        self.our_key_id += 1;
        debug!(our_key_id = self.our_key_id, "rotated our DH keys");
        self.retire_out_of_window();
        Ok(())
    }

    /// The peer advertised a successor public key: slide their window.
    pub fn rotate_their_key(&mut self, new_public: BigUint) {
        self.their_previous_pub = self.their_current_pub.take();
        self.their_current_pub = Some(new_public);
        self.their_key_id += 1;
        debug!(their_key_id = self.their_key_id, "rotated their DH key");
        self.retire_out_of_window();
    }

    fn retire_out_of_window(&mut self) {
        let (our_id, their_id) = (self.our_key_id, self.their_key_id);
        let mut i = 0;
        while i < self.mac_key_history.len() {
            let e = &self.mac_key_history[i];
            if e.our_key_id + 1 < our_id || e.their_key_id + 1 < their_id {
                let retired = self.mac_key_history.remove(i);
                self.old_mac_keys.push(retired.receiving_mac);
            } else {
                i += 1;
            }
        }
        self.counter_history
            .retain(|e| e.our_key_id + 1 >= our_id && e.their_key_id + 1 >= their_id);
    }

    /// Drains the disclosure queue into the next outbound data message.
    pub fn drain_old_mac_keys(&mut self) -> Vec<MacKey> {
        std::mem::take(&mut self.old_mac_keys)
    }

    /// Destroys all session material; drop impls zero the secrets.
    pub fn wipe(&mut self) {
        *self = KeyManagementContext::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otr_core::rand::SeededRandom;

    fn pair(rand_seed: u8) -> DhKeyPair {
        let mut rand = SeededRandom::new([rand_seed; 32]);
        DhKeyPair::generate(&mut rand).unwrap()
    }

    #[test]
    fn session_keys_are_symmetric() {
        let alice = pair(1);
        let bob = pair(2);

        let a = calculate_session_keys(&alice.private, &alice.public, &bob.public);
        let b = calculate_session_keys(&bob.private, &bob.public, &alice.public);

        assert_eq!(a.sending_aes.0, b.receiving_aes.0);
        assert_eq!(a.receiving_aes.0, b.sending_aes.0);
        assert_eq!(a.sending_mac, b.receiving_mac);
        assert_eq!(a.receiving_mac, b.sending_mac);
        assert_eq!(a.extra_key, b.extra_key);
    }

    #[test]
    fn directions_never_share_a_key() {
        let alice = pair(1);
        let bob = pair(2);
        let keys = calculate_session_keys(&alice.private, &alice.public, &bob.public);
        assert_ne!(keys.sending_aes.0, keys.receiving_aes.0);
    }

    #[test]
    fn counters_must_strictly_increase() {
        let mut ctx = KeyManagementContext::default();
        assert!(ctx.validate_counter(1, 1, 0).is_err());
        ctx.validate_counter(1, 1, 1).unwrap();
        ctx.commit_counter(1, 1, 1);
        assert_eq!(
            ctx.validate_counter(1, 1, 1).unwrap_err(),
            OtrError::CounterRegressed
        );
        ctx.validate_counter(1, 1, 5).unwrap();
        ctx.commit_counter(1, 1, 5);
        assert_eq!(
            ctx.validate_counter(1, 1, 4).unwrap_err(),
            OtrError::CounterRegressed
        );
        // A different key pair tracks its own counter stream.
        ctx.validate_counter(2, 1, 1).unwrap();
    }

    #[test]
    fn validation_alone_does_not_burn_the_counter() {
        let mut ctx = KeyManagementContext::default();
        ctx.validate_counter(1, 1, 3).unwrap();
        // Nothing committed: the same counter is still acceptable.
        ctx.validate_counter(1, 1, 3).unwrap();
        ctx.commit_counter(1, 1, 3);
        assert!(ctx.validate_counter(1, 1, 3).is_err());
    }

    #[test]
    fn install_resets_the_window() {
        let mut rand = SeededRandom::new([3u8; 32]);
        let mut ctx = KeyManagementContext::default();
        let ake_pair = DhKeyPair::generate(&mut rand).unwrap();
        let their_pub = pair(4).public.clone();

        ctx.install(ake_pair, their_pub, 1, &mut rand).unwrap();
        assert!(ctx.is_installed());
        assert_eq!(ctx.our_key_id, 2);
        assert_eq!(ctx.their_key_id, 1);
        assert_eq!(ctx.our_counter, 1);
        assert!(ctx.sending_keys().is_ok());
    }

    #[test]
    fn receiving_keys_reject_ids_outside_the_window() {
        let mut rand = SeededRandom::new([5u8; 32]);
        let mut ctx = KeyManagementContext::default();
        let ake_pair = DhKeyPair::generate(&mut rand).unwrap();
        ctx.install(ake_pair, pair(6).public.clone(), 1, &mut rand).unwrap();

        ctx.receiving_keys(1, 1).unwrap();
        ctx.receiving_keys(2, 1).unwrap();
        assert_eq!(
            ctx.receiving_keys(7, 1).unwrap_err(),
            OtrError::UnexpectedOurKeyId(7)
        );
        assert_eq!(
            ctx.receiving_keys(1, 9).unwrap_err(),
            OtrError::UnexpectedTheirKeyId(9)
        );
    }

    #[test]
    fn retired_mac_keys_reach_the_disclosure_queue() {
        let mut rand = SeededRandom::new([7u8; 32]);
        let mut ctx = KeyManagementContext::default();
        let ake_pair = DhKeyPair::generate(&mut rand).unwrap();
        ctx.install(ake_pair, pair(8).public.clone(), 1, &mut rand).unwrap();

        ctx.register_used_mac_key(1, 1, MacKey([0x11; 20]));
        assert!(ctx.drain_old_mac_keys().is_empty());

        // One rotation slides the window to {3, 2}; key id 1 falls out and
        // its MAC key becomes eligible for disclosure.
        ctx.rotate_our_keys(&mut rand).unwrap();

        let revealed = ctx.drain_old_mac_keys();
        assert_eq!(revealed, vec![MacKey([0x11; 20])]);
        // Draining is destructive.
        assert!(ctx.drain_old_mac_keys().is_empty());
    }

    #[test]
    fn wipe_clears_the_session() {
        let mut rand = SeededRandom::new([9u8; 32]);
        let mut ctx = KeyManagementContext::default();
        let ake_pair = DhKeyPair::generate(&mut rand).unwrap();
        ctx.install(ake_pair, pair(10).public.clone(), 1, &mut rand).unwrap();

        ctx.wipe();
        assert!(!ctx.is_installed());
        assert!(ctx.sending_keys().is_err());
        assert_eq!(ctx.our_counter, 0);
    }
}
