// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The four-message SIGMA-style authenticated key exchange.
//!
//! DH-Commit and DH-Key establish a shared secret under a commitment, so
//! neither side can grind its public half; Reveal-Signature and Signature
//! open the commitment and authenticate both long-term DSA keys inside the
//! freshly keyed channel. A completed exchange installs the session into the
//! key-management context and flips the conversation to `Encrypted`.

use num_bigint::BigUint;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use otr_core::crypto::{
    aes_ctr_zero, constant_time_eq, hmac_sha256, hmac_sha256_160, sha256, sha256_prefixed,
};
use otr_core::dh;
use otr_core::dsa;
use otr_core::encoding::{append_data, append_word, mpi_bytes, Decoder};
use otr_core::types::{
    AesKey, OtrError, OtrResult, AKE_MAC_LENGTH, REVEAL_KEY_LENGTH, SSID_LENGTH,
};

use crate::conversation::{Conversation, MsgState};
use crate::events::{OtrEvent, SecurityChange};
use crate::keys::DhKeyPair;
use crate::message::{MSG_TYPE_DH_COMMIT, MSG_TYPE_DH_KEY, MSG_TYPE_REVEAL_SIG, MSG_TYPE_SIG};

/// The key ID both sides assign to their handshake DH key.
const INITIAL_KEY_ID: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum AkeState {
    #[default]
    None,
    AwaitingDhKey,
    AwaitingRevealSig,
    AwaitingSig,
}

/// Secrets of the AKE key schedule, all derived from `SHA-256(b ‖ MPI(s))`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct AkeKeys {
    /// Session identifier shown to users as a short authentication string.
    pub ssid: [u8; SSID_LENGTH],
    /// AES key for the initiator's encrypted signature blob.
    pub c: AesKey,
    /// AES key for the responder's encrypted signature blob.
    pub cp: AesKey,
    /// MAC key over the initiator's signed transcript.
    pub m1: [u8; 32],
    /// MAC key over the initiator's encrypted signature.
    pub m2: [u8; 32],
    /// MAC key over the responder's signed transcript.
    pub m1p: [u8; 32],
    /// MAC key over the responder's encrypted signature.
    pub m2p: [u8; 32],
}

fn calculate_ake_keys(s: &BigUint) -> AkeKeys {
    let secbytes = mpi_bytes(s);

    let h_ssid = sha256_prefixed(0x00, &secbytes);
    let mut ssid = [0u8; SSID_LENGTH];
    ssid.copy_from_slice(&h_ssid[..SSID_LENGTH]);

    let h_c = sha256_prefixed(0x01, &secbytes);
    let mut c = [0u8; 16];
    c.copy_from_slice(&h_c[..16]);
    let mut cp = [0u8; 16];
    cp.copy_from_slice(&h_c[16..]);

    AkeKeys {
        ssid,
        c: AesKey(c),
        cp: AesKey(cp),
        m1: sha256_prefixed(0x02, &secbytes),
        m2: sha256_prefixed(0x03, &secbytes),
        m1p: sha256_prefixed(0x04, &secbytes),
        m2p: sha256_prefixed(0x05, &secbytes),
    }
}

/// In-flight AKE state.
#[derive(Default)]
pub(crate) struct Ake {
    /// Current protocol step; gates which inbound messages are acted on.
    pub state: AkeState,
    /// The 128-bit commitment key, revealed in message three.
    r: [u8; REVEAL_KEY_LENGTH],
    /// Our ephemeral DH pair for this exchange.
    our_dh: Option<DhKeyPair>,
    /// The peer's DH public half once known.
    their_pub: Option<BigUint>,
    /// Our own encrypted commitment, kept for the collision tie-break and
    /// re-sends.
    our_encrypted_gx: Vec<u8>,
    /// The hash of our committed `gx`, compared numerically on collision.
    our_hashed_gx: [u8; 32],
    /// The peer's encrypted commitment awaiting its reveal.
    their_encrypted_gx: Vec<u8>,
    /// The peer's commit hash, checked against the revealed `gx`.
    their_hashed_gx: [u8; 32],
    /// The derived key schedule, held between Reveal-Signature and
    /// Signature.
    keys: Option<AkeKeys>,
    /// Cached Reveal-Signature for retransmission on a duplicate DH-Key.
    reveal_sig_msg: Vec<u8>,
}

impl Ake {
    pub fn state(&self) -> AkeState {
        self.state
    }

    /// Aborts the exchange and scrubs every secret it accumulated.
    pub fn reset(&mut self) {
        self.state = AkeState::None;
        self.r.zeroize();
        self.our_dh = None;
        self.their_pub = None;
        self.our_encrypted_gx.clear();
        self.our_hashed_gx = [0u8; 32];
        self.their_encrypted_gx.clear();
        self.their_hashed_gx = [0u8; 32];
        self.keys = None;
        self.reveal_sig_msg.clear();
    }
}

impl Conversation {
    /// Builds a DH-Commit message and enters `AwaitingDhKey`.
    pub(crate) fn dh_commit_message(&mut self) -> OtrResult<Vec<u8>> {
        let mut r = [0u8; REVEAL_KEY_LENGTH];
        self.rand.fill_bytes(&mut r)?;
        let pair = DhKeyPair::generate(self.rand.as_mut())?;

        let gx_mpi = mpi_bytes(&pair.public);
        self.ake.reset();
        self.ake.r = r;
        self.ake.our_encrypted_gx = aes_ctr_zero(&r, &gx_mpi);
        self.ake.our_hashed_gx = sha256(&gx_mpi);
        self.ake.our_dh = Some(pair);
        self.ake.state = AkeState::AwaitingDhKey;
        debug!("sending DH-Commit, awaiting DH-Key");

        self.serialize_dh_commit()
    }

    fn serialize_dh_commit(&mut self) -> OtrResult<Vec<u8>> {
        let mut msg = self.message_header(MSG_TYPE_DH_COMMIT)?;
        append_data(&mut msg, &self.ake.our_encrypted_gx);
        append_data(&mut msg, &self.ake.our_hashed_gx);
        Ok(msg)
    }

    fn dh_key_message(&mut self) -> OtrResult<Vec<u8>> {
        let public = self
            .ake
            .our_dh
            .as_ref()
            .map(|p| p.public.clone())
            .ok_or(OtrError::InvalidOtrMessage)?;
        let mut msg = self.message_header(MSG_TYPE_DH_KEY)?;
        otr_core::encoding::append_mpi(&mut msg, &public);
        Ok(msg)
    }

    pub(crate) fn process_dh_commit(&mut self, body: &[u8]) -> OtrResult<Option<Vec<u8>>> {
        let mut dec = Decoder::new(body);
        let encrypted_gx = dec.read_data()?.to_vec();
        let hashed_gx = dec.read_data()?;
        if hashed_gx.len() != 32 {
            return Err(OtrError::InvalidOtrMessage);
        }

        if self.ake.state() == AkeState::AwaitingDhKey {
            // Both sides committed at once: the numerically larger hash
            // keeps initiating, the other adopts the peer's commit.
            let ours = BigUint::from_bytes_be(&self.ake.our_hashed_gx);
            let theirs = BigUint::from_bytes_be(hashed_gx);
            if ours > theirs {
                debug!("DH-Commit collision, our commitment wins");
                return Ok(Some(self.serialize_dh_commit()?));
            }
            debug!("DH-Commit collision, adopting the peer's commitment");
        }

        self.ake.their_encrypted_gx = encrypted_gx;
        self.ake.their_hashed_gx.copy_from_slice(hashed_gx);
        if self.ake.our_dh.is_none() {
            self.ake.our_dh = Some(DhKeyPair::generate(self.rand.as_mut())?);
        }
        self.ake.state = AkeState::AwaitingRevealSig;
        debug!("received DH-Commit, awaiting Reveal-Signature");
        Ok(Some(self.dh_key_message()?))
    }

    pub(crate) fn process_dh_key(&mut self, body: &[u8]) -> OtrResult<Option<Vec<u8>>> {
        let mut dec = Decoder::new(body);
        let gy = dec.read_mpi()?;
        dh::verify_group_element("gy", &gy)?;

        match self.ake.state() {
            AkeState::AwaitingDhKey => {
                self.ake.their_pub = Some(gy);
                let msg = self.reveal_sig_message()?;
                self.ake.reveal_sig_msg = msg.clone();
                self.ake.state = AkeState::AwaitingSig;
                debug!("received DH-Key, awaiting Signature");
                Ok(Some(msg))
            }
            AkeState::AwaitingSig => {
                // Retransmitted DH-Key: answer a matching gy with the cached
                // Reveal-Signature, ignore anything else.
                if self.ake.their_pub.as_ref() == Some(&gy) {
                    Ok(Some(self.ake.reveal_sig_msg.clone()))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    fn reveal_sig_message(&mut self) -> OtrResult<Vec<u8>> {
        let (gx, x) = {
            let pair = self.ake.our_dh.as_ref().ok_or(OtrError::InvalidOtrMessage)?;
            (pair.public.clone(), pair.private.clone())
        };
        let gy = self
            .ake
            .their_pub
            .clone()
            .ok_or(OtrError::InvalidOtrMessage)?;

        let s = gy.modpow(&x, &dh::MODULUS);
        let keys = calculate_ake_keys(&s);

        let encrypted_sig =
            self.encrypted_signature(&keys.c, &keys.m1, &mpi_bytes(&gx), &mpi_bytes(&gy))?;
        let mac = hmac_sha256_160(&keys.m2, &with_data_prefix(&encrypted_sig));

        let mut msg = self.message_header(MSG_TYPE_REVEAL_SIG)?;
        append_data(&mut msg, &self.ake.r);
        append_data(&mut msg, &encrypted_sig);
        msg.extend_from_slice(&mac);

        self.ake.keys = Some(keys);
        Ok(msg)
    }

    /// Builds `AES_key(X)` where `X = pub ‖ keyid ‖ sig(MAC_m1(first ‖
    /// second ‖ pub ‖ keyid))`; each side lists its own DH public first.
    fn encrypted_signature(
        &mut self,
        key: &AesKey,
        m1: &[u8; 32],
        first_mpi: &[u8],
        second_mpi: &[u8],
    ) -> OtrResult<Vec<u8>> {
        let mut pub_ser = Vec::new();
        self.our_key.public().serialize(&mut pub_ser);

        let mut verify_data = Vec::new();
        verify_data.extend_from_slice(first_mpi);
        verify_data.extend_from_slice(second_mpi);
        verify_data.extend_from_slice(&pub_ser);
        append_word(&mut verify_data, INITIAL_KEY_ID);

        let mb = hmac_sha256(m1, &verify_data);
        let sig = self.our_key.sign(self.rand.as_mut(), &mb)?;

        let mut x = pub_ser;
        append_word(&mut x, INITIAL_KEY_ID);
        x.extend_from_slice(&sig);

        Ok(aes_ctr_zero(&key.0, &x))
    }

    /// Checks the MAC on an encrypted signature blob, decrypts it, and
    /// verifies the long-term signature inside. Returns the peer's key and
    /// the key ID it advertised.
    fn verify_encrypted_signature(
        &self,
        encrypted_sig: &[u8],
        mac: &[u8],
        key: &AesKey,
        m1: &[u8; 32],
        m2: &[u8; 32],
        first_mpi: &[u8],
        second_mpi: &[u8],
    ) -> OtrResult<(dsa::PublicKey, u32)> {
        let expected = hmac_sha256_160(m2, &with_data_prefix(encrypted_sig));
        if !constant_time_eq(&expected, mac) {
            return Err(OtrError::MacMismatch);
        }

        let x = aes_ctr_zero(&key.0, encrypted_sig);
        let mut dec = Decoder::new(&x);
        let their_key = dsa::PublicKey::parse(&mut dec)?;
        let key_id = dec.read_word()?;
        let sig = dec.remaining();
        if sig.len() != their_key.signature_length() {
            return Err(OtrError::InvalidSignature);
        }

        let mut pub_ser = Vec::new();
        their_key.serialize(&mut pub_ser);
        let mut verify_data = Vec::new();
        verify_data.extend_from_slice(first_mpi);
        verify_data.extend_from_slice(second_mpi);
        verify_data.extend_from_slice(&pub_ser);
        append_word(&mut verify_data, key_id);

        let expected_m = hmac_sha256(m1, &verify_data);
        their_key.verify(&expected_m, sig)?;
        Ok((their_key, key_id))
    }

    pub(crate) fn process_reveal_sig(&mut self, body: &[u8]) -> OtrResult<Option<Vec<u8>>> {
        if self.ake.state() != AkeState::AwaitingRevealSig {
            return Ok(None);
        }

        let mut dec = Decoder::new(body);
        let r = dec.read_data()?;
        if r.len() != REVEAL_KEY_LENGTH {
            return Err(OtrError::InvalidOtrMessage);
        }
        let encrypted_sig = dec.read_data()?.to_vec();
        let mac = dec.read_bytes(AKE_MAC_LENGTH)?.to_vec();

        let mut reveal_key = [0u8; REVEAL_KEY_LENGTH];
        reveal_key.copy_from_slice(r);
        let gx_mpi = aes_ctr_zero(&reveal_key, &self.ake.their_encrypted_gx);
        if !constant_time_eq(&sha256(&gx_mpi), &self.ake.their_hashed_gx) {
            return Err(OtrError::CommitHashMismatch);
        }
        let gx = Decoder::new(&gx_mpi).read_mpi()?;
        dh::verify_group_element("gx", &gx)?;

        let (gy, y) = {
            let pair = self.ake.our_dh.as_ref().ok_or(OtrError::InvalidOtrMessage)?;
            (pair.public.clone(), pair.private.clone())
        };
        let s = gx.modpow(&y, &dh::MODULUS);
        let keys = calculate_ake_keys(&s);

        let (gx_enc, gy_enc) = (mpi_bytes(&gx), mpi_bytes(&gy));
        let (their_key, their_key_id) = self.verify_encrypted_signature(
            &encrypted_sig,
            &mac,
            &keys.c,
            &keys.m1,
            &keys.m2,
            &gx_enc,
            &gy_enc,
        )?;

        // Our own Signature message, keyed with the primed half of the
        // schedule, our gy listed first.
        let our_encrypted_sig = self.encrypted_signature(&keys.cp, &keys.m1p, &gy_enc, &gx_enc)?;
        let our_mac = hmac_sha256_160(&keys.m2p, &with_data_prefix(&our_encrypted_sig));
        let mut msg = self.message_header(MSG_TYPE_SIG)?;
        append_data(&mut msg, &our_encrypted_sig);
        msg.extend_from_slice(&our_mac);

        self.complete_ake(keys, their_key, gx, their_key_id)?;
        Ok(Some(msg))
    }

    pub(crate) fn process_signature(&mut self, body: &[u8]) -> OtrResult<Option<Vec<u8>>> {
        if self.ake.state() != AkeState::AwaitingSig {
            return Ok(None);
        }

        let mut dec = Decoder::new(body);
        let encrypted_sig = dec.read_data()?.to_vec();
        let mac = dec.read_bytes(AKE_MAC_LENGTH)?.to_vec();

        let keys = self.ake.keys.take().ok_or(OtrError::InvalidOtrMessage)?;
        let gx = self
            .ake
            .our_dh
            .as_ref()
            .map(|p| p.public.clone())
            .ok_or(OtrError::InvalidOtrMessage)?;
        let gy = self
            .ake
            .their_pub
            .clone()
            .ok_or(OtrError::InvalidOtrMessage)?;

        let (gx_enc, gy_enc) = (mpi_bytes(&gx), mpi_bytes(&gy));
        let (their_key, their_key_id) = self.verify_encrypted_signature(
            &encrypted_sig,
            &mac,
            &keys.cp,
            &keys.m1p,
            &keys.m2p,
            &gy_enc,
            &gx_enc,
        )?;

        self.complete_ake(keys, their_key, gy, their_key_id)?;
        Ok(None)
    }

    /// Installs the negotiated session and flips the conversation to
    /// `Encrypted`.
    fn complete_ake(
        &mut self,
        keys: AkeKeys,
        their_key: dsa::PublicKey,
        their_dh_pub: BigUint,
        their_key_id: u32,
    ) -> OtrResult<()> {
        let our_pair = self.ake.our_dh.take().ok_or(OtrError::InvalidOtrMessage)?;
        self.keys
            .install(our_pair, their_dh_pub, their_key_id, self.rand.as_mut())?;
        self.ssid = keys.ssid;
        self.their_key = Some(their_key);
        self.ake.reset();
        self.msg_state = MsgState::Encrypted;
        self.events.push(OtrEvent::Security(SecurityChange::NewKeys));
        debug!("AKE complete, conversation is encrypted");
        Ok(())
    }
}

/// The AKE MACs cover the encrypted blob *with* its length prefix.
fn with_data_prefix(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    append_data(&mut out, data);
    out
}
