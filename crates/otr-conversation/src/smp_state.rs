// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The five-state SMP machine.
//!
//! Incoming rounds are matched exhaustively against the current state: the
//! expected message advances the round, anything else answers with an abort
//! TLV and a reset to `Expect1`. A failed proof is a cheat and additionally
//! tears down the round; a clean inequality at the end is a plain failure.
//! Neither ever disturbs the encrypted data channel.

use num_bigint::BigUint;
use tracing::debug;

use otr_core::crypto::sha256;
use otr_core::dh;
use otr_core::tlv::{self, Tlv};
use otr_core::types::{OtrError, OtrResult, FINGERPRINT_LENGTH};

use crate::conversation::{Conversation, MsgState};
use crate::events::{OtrEvent, SecurityChange, SmpEvent};
use crate::smp::{
    check_smp4, generate_smp1, generate_smp2, generate_smp3, generate_smp4, verify_smp1,
    verify_smp2, verify_smp3, verify_smp4, Smp1, Smp1State, Smp2, Smp2State, Smp3, Smp3State,
    Smp4,
};

/// Where the local side stands in the current SMP round.
#[derive(Default)]
pub(crate) enum SmpState {
    #[default]
    Expect1,
    /// Message 1 arrived; the host still owes us the shared secret.
    WaitingForSecret(Box<Smp1>),
    Expect2,
    Expect3,
    Expect4,
}

/// A parsed in-band SMP message.
pub(crate) enum SmpMessage {
    One(Smp1),
    Two(Smp2),
    Three(Smp3),
    Four(Smp4),
    Abort,
}

/// The SMP sub-context owned by a conversation.
#[derive(Default)]
pub(crate) struct Smp {
    pub state: SmpState,
    /// The locally derived secret integer, kept across rounds.
    pub secret: Option<BigUint>,
    pub s1: Option<Smp1State>,
    pub s2: Option<Smp2State>,
    pub s3: Option<Smp3State>,
    /// The question delivered with the peer's message 1, if any.
    pub question: Option<String>,
}

impl Smp {
    /// Resets the round, wiping all scratch exponents.
    pub fn reset(&mut self) {
        self.state = SmpState::Expect1;
        self.s1 = None;
        self.s2 = None;
        self.s3 = None;
        if let Some(secret) = self.secret.as_mut() {
            dh::wipe(secret);
        }
        self.secret = None;
        self.question = None;
    }
}

fn abort_tlv() -> Tlv {
    Tlv::empty(tlv::TLV_SMP_ABORT)
}

impl Conversation {
    /// Parses and dispatches one SMP TLV, returning an optional reply TLV.
    pub(crate) fn process_smp_tlv(&mut self, t: &Tlv) -> OtrResult<Option<Tlv>> {
        let msg = match t.typ {
            tlv::TLV_SMP_MESSAGE_1 | tlv::TLV_SMP_MESSAGE_1_WITH_QUESTION => {
                SmpMessage::One(Smp1::from_tlv(t)?)
            }
            tlv::TLV_SMP_MESSAGE_2 => SmpMessage::Two(Smp2::from_tlv(t)?),
            tlv::TLV_SMP_MESSAGE_3 => SmpMessage::Three(Smp3::from_tlv(t)?),
            tlv::TLV_SMP_MESSAGE_4 => SmpMessage::Four(Smp4::from_tlv(t)?),
            _ => SmpMessage::Abort,
        };
        self.receive_smp(msg)
    }

    pub(crate) fn receive_smp(&mut self, msg: SmpMessage) -> OtrResult<Option<Tlv>> {
        let state = std::mem::take(&mut self.smp.state);
        match (state, msg) {
            (SmpState::Expect1, SmpMessage::One(m)) => self.receive_smp1(m),
            (SmpState::Expect2, SmpMessage::Two(m)) => self.receive_smp2(m),
            (SmpState::Expect3, SmpMessage::Three(m)) => self.receive_smp3(m),
            (SmpState::Expect4, SmpMessage::Four(m)) => self.receive_smp4(m),
            (_, SmpMessage::Abort) => {
                debug!("peer aborted SMP");
                self.smp.reset();
                self.events.push(OtrEvent::smp(SmpEvent::Abort, 0));
                Ok(None)
            }
            (_, _) => {
                debug!("unexpected SMP message, aborting round");
                self.smp.reset();
                self.events.push(OtrEvent::smp(SmpEvent::Error, 0));
                Ok(Some(abort_tlv()))
            }
        }
    }

    fn smp_cheated(&mut self, err: OtrError) -> OtrResult<Option<Tlv>> {
        self.smp.reset();
        self.events.push(OtrEvent::smp(SmpEvent::Cheated, 0));
        Err(err)
    }

    fn receive_smp1(&mut self, m: Smp1) -> OtrResult<Option<Tlv>> {
        if let Err(e) = verify_smp1(&m) {
            return self.smp_cheated(e);
        }
        self.smp.question = m.question.clone();

        match self.smp.secret.clone() {
            Some(secret) => {
                // The host supplied the secret up front; answer immediately.
                self.smp.state = SmpState::WaitingForSecret(Box::new(m));
                self.continue_smp1(&secret).map(Some)
            }
            None => {
                let event = match &m.question {
                    Some(q) => OtrEvent::smp_with_question(SmpEvent::AskForAnswer, 25, q),
                    None => OtrEvent::smp(SmpEvent::AskForSecret, 25),
                };
                self.smp.state = SmpState::WaitingForSecret(Box::new(m));
                self.events.push(event);
                self.events
                    .push(OtrEvent::Security(SecurityChange::SmpSecretNeeded));
                Ok(None)
            }
        }
    }

    /// Answers a pending message 1 once the secret is known. On a short
    /// random read the state is left waiting so the host can retry.
    fn continue_smp1(&mut self, secret: &BigUint) -> OtrResult<Tlv> {
        let SmpState::WaitingForSecret(m) = std::mem::take(&mut self.smp.state) else {
            return Err(OtrError::CannotAuthenticate);
        };

        match generate_smp2(self.rand.as_mut(), secret, &m) {
            Ok(s2) => {
                let reply = s2.msg.to_tlv();
                self.smp.s2 = Some(s2);
                self.smp.state = SmpState::Expect3;
                self.events.push(OtrEvent::smp(SmpEvent::InProgress, 60));
                debug!("SMP advanced to expect3");
                Ok(reply)
            }
            Err(e) => {
                self.smp.state = SmpState::WaitingForSecret(m);
                Err(e)
            }
        }
    }

    fn receive_smp2(&mut self, m: Smp2) -> OtrResult<Option<Tlv>> {
        let Some(s1) = self.smp.s1.take() else {
            self.smp.reset();
            self.events.push(OtrEvent::smp(SmpEvent::Error, 0));
            return Ok(Some(abort_tlv()));
        };
        if let Err(e) = verify_smp2(&s1, &m) {
            return self.smp_cheated(e);
        }
        let Some(secret) = self.smp.secret.clone() else {
            return self.smp_cheated(OtrError::CannotAuthenticate);
        };

        match generate_smp3(self.rand.as_mut(), &secret, &s1, &m) {
            Ok(s3) => {
                let reply = s3.msg.to_tlv();
                self.smp.s1 = Some(s1);
                self.smp.s3 = Some(s3);
                self.smp.state = SmpState::Expect4;
                self.events.push(OtrEvent::smp(SmpEvent::InProgress, 60));
                debug!("SMP advanced to expect4");
                Ok(Some(reply))
            }
            Err(e) => {
                self.smp.s1 = Some(s1);
                self.smp.state = SmpState::Expect2;
                Err(e)
            }
        }
    }

    fn receive_smp3(&mut self, m: Smp3) -> OtrResult<Option<Tlv>> {
        let Some(s2) = self.smp.s2.take() else {
            self.smp.reset();
            self.events.push(OtrEvent::smp(SmpEvent::Error, 0));
            return Ok(Some(abort_tlv()));
        };
        if let Err(e) = verify_smp3(&s2, &m) {
            return self.smp_cheated(e);
        }

        match generate_smp4(self.rand.as_mut(), &s2, &m) {
            Ok((msg4, matched)) => {
                self.smp.reset();
                if matched {
                    self.events.push(OtrEvent::smp(SmpEvent::Success, 100));
                    self.events
                        .push(OtrEvent::Security(SecurityChange::SmpComplete));
                    debug!("SMP completed successfully");
                    Ok(Some(msg4.to_tlv()))
                } else {
                    self.events.push(OtrEvent::smp(SmpEvent::Failure, 100));
                    self.events
                        .push(OtrEvent::Security(SecurityChange::SmpFailed));
                    Err(OtrError::SmpProtocolFailed)
                }
            }
            Err(e) => {
                self.smp.s2 = Some(s2);
                self.smp.state = SmpState::Expect3;
                Err(e)
            }
        }
    }

    fn receive_smp4(&mut self, m: Smp4) -> OtrResult<Option<Tlv>> {
        let (Some(s1), Some(s3)) = (self.smp.s1.take(), self.smp.s3.take()) else {
            self.smp.reset();
            self.events.push(OtrEvent::smp(SmpEvent::Error, 0));
            return Ok(Some(abort_tlv()));
        };
        if let Err(e) = verify_smp4(&s3, &m) {
            return self.smp_cheated(e);
        }

        let matched = check_smp4(&s1, &s3, &m);
        self.smp.reset();
        if matched {
            self.events.push(OtrEvent::smp(SmpEvent::Success, 100));
            self.events
                .push(OtrEvent::Security(SecurityChange::SmpComplete));
            debug!("SMP completed successfully");
            Ok(None)
        } else {
            self.events.push(OtrEvent::smp(SmpEvent::Failure, 100));
            self.events
                .push(OtrEvent::Security(SecurityChange::SmpFailed));
            Err(OtrError::SmpProtocolFailed)
        }
    }

    /// Starts (or answers) an SMP authentication with the given shared
    /// secret. Returns the wire messages to hand to the transport.
    pub fn authenticate(&mut self, secret: &[u8]) -> OtrResult<Vec<Vec<u8>>> {
        self.do_authenticate(None, secret)
    }

    /// Like [`Conversation::authenticate`], with a human-readable question
    /// shown to the peer.
    pub fn authenticate_with_question(
        &mut self,
        question: &str,
        secret: &[u8],
    ) -> OtrResult<Vec<Vec<u8>>> {
        self.do_authenticate(Some(question), secret)
    }

    fn do_authenticate(&mut self, question: Option<&str>, secret: &[u8]) -> OtrResult<Vec<Vec<u8>>> {
        if self.msg_state != MsgState::Encrypted {
            return Err(OtrError::CannotAuthenticate);
        }
        let our_fp = self.our_key.public().fingerprint();
        let their_fp = self
            .their_key
            .as_ref()
            .ok_or(OtrError::CannotAuthenticate)?
            .fingerprint();

        let mut tlvs: Vec<Tlv> = Vec::new();
        if matches!(self.smp.state, SmpState::WaitingForSecret(_)) {
            // We are the responder; the peer's fingerprint leads.
            let y = self.smp_secret(&their_fp, &our_fp, secret);
            self.smp.secret = Some(y.clone());
            tlvs.push(self.continue_smp1(&y)?);
        } else {
            if !matches!(self.smp.state, SmpState::Expect1) {
                // A round is already in flight; abort it before starting
                // over.
                self.smp.reset();
                tlvs.push(abort_tlv());
            }
            let x = self.smp_secret(&our_fp, &their_fp, secret);
            self.smp.secret = Some(x);
            let s1 = generate_smp1(self.rand.as_mut(), question)?;
            tlvs.push(s1.msg.to_tlv());
            self.smp.s1 = Some(s1);
            self.smp.state = SmpState::Expect2;
            debug!("initiated SMP, awaiting message 2");
        }

        let msg = self.gen_data_msg(b"", tlvs, 0)?;
        Ok(self.encode(&msg))
    }

    /// Cancels any SMP round in progress and notifies the peer.
    pub fn abort_authentication(&mut self) -> OtrResult<Vec<Vec<u8>>> {
        if self.msg_state != MsgState::Encrypted {
            return Err(OtrError::CannotAuthenticate);
        }
        self.smp.reset();
        let msg = self.gen_data_msg(b"", vec![abort_tlv()], 0)?;
        Ok(self.encode(&msg))
    }

    /// The question carried by the peer's pending authentication request,
    /// if it had one.
    pub fn smp_question(&self) -> Option<&str> {
        self.smp.question.as_deref()
    }

    /// `SHA-256(0x01 ‖ initiator fp ‖ responder fp ‖ ssid ‖ secret)` as the
    /// SMP secret integer.
    fn smp_secret(
        &self,
        initiator_fp: &[u8; FINGERPRINT_LENGTH],
        responder_fp: &[u8; FINGERPRINT_LENGTH],
        user_secret: &[u8],
    ) -> BigUint {
        let mut buf = Vec::with_capacity(1 + 2 * FINGERPRINT_LENGTH + 8 + user_secret.len());
        buf.push(0x01);
        buf.extend_from_slice(initiator_fp);
        buf.extend_from_slice(responder_fp);
        buf.extend_from_slice(&self.ssid);
        buf.extend_from_slice(user_secret);
        BigUint::from_bytes_be(&sha256(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smp::{generate_smp1, generate_smp2, generate_smp3};
    use num_bigint::BigUint;
    use otr_core::dh::{GENERATOR, MODULUS, ORDER};
    use otr_core::dsa;
    use otr_core::rand::{FixedRandom, SeededRandom};

    fn rand(seed: u8) -> SeededRandom {
        SeededRandom::new([seed; 32])
    }

    fn conversation(seed: u8) -> Conversation {
        let key = dsa::PrivateKey::from_components(
            MODULUS.clone(),
            ORDER.clone(),
            GENERATOR.clone(),
            BigUint::from(0xB0Bu32),
        )
        .unwrap();
        Conversation::new(key, Box::new(rand(seed)))
    }

    fn secret(tag: u8) -> BigUint {
        BigUint::from_bytes_be(&[tag; 32])
    }

    fn fixture_msg1(question: Option<&str>) -> (crate::smp::Smp1State, Smp1) {
        let s1 = generate_smp1(&mut rand(0x11), question).unwrap();
        let msg = s1.msg.clone();
        (s1, msg)
    }

    #[test]
    fn expect1_goes_to_waiting_for_secret_on_message1() {
        let mut c = conversation(1);
        let (_, msg) = fixture_msg1(None);

        let reply = c.receive_smp(SmpMessage::One(msg)).unwrap();
        assert!(reply.is_none());
        assert!(matches!(c.smp.state, SmpState::WaitingForSecret(_)));
        assert!(c
            .take_events()
            .contains(&OtrEvent::smp(SmpEvent::AskForSecret, 25)));
    }

    #[test]
    fn message1_with_question_asks_for_the_answer() {
        let mut c = conversation(1);
        let (_, msg) = fixture_msg1(Some("What's the clue?"));

        c.receive_smp(SmpMessage::One(msg)).unwrap();
        assert_eq!(c.smp_question(), Some("What's the clue?"));
        assert!(c.take_events().contains(&OtrEvent::smp_with_question(
            SmpEvent::AskForAnswer,
            25,
            "What's the clue?"
        )));
    }

    #[test]
    fn presupplied_secret_answers_message1_immediately() {
        let mut c = conversation(1);
        c.smp.secret = Some(secret(0x5A));
        let (_, msg) = fixture_msg1(None);

        let reply = c.receive_smp(SmpMessage::One(msg)).unwrap().unwrap();
        assert_eq!(reply.typ, otr_core::tlv::TLV_SMP_MESSAGE_2);
        assert!(matches!(c.smp.state, SmpState::Expect3));
        assert!(c
            .take_events()
            .contains(&OtrEvent::smp(SmpEvent::InProgress, 60)));
    }

    #[test]
    fn invalid_g2a_is_cheating() {
        let mut c = conversation(1);
        let (_, mut msg) = fixture_msg1(None);
        msg.g2a = BigUint::from(1u32);

        let err = c.receive_smp(SmpMessage::One(msg)).unwrap_err();
        assert_eq!(err, OtrError::InvalidGroupElement("g2a"));
        assert_eq!(err.to_string(), "g2a is an invalid group element");
        assert!(c.take_events().contains(&OtrEvent::smp(SmpEvent::Cheated, 0)));
        assert!(matches!(c.smp.state, SmpState::Expect1));
    }

    #[test]
    fn expect3_success_sends_message4() {
        let x = secret(0x5A);
        let (s1, msg1) = fixture_msg1(None);
        let s2 = generate_smp2(&mut rand(0x22), &x, &msg1).unwrap();
        let s3 = generate_smp3(&mut rand(0x33), &x, &s1, &s2.msg).unwrap();

        let mut c = conversation(2);
        c.smp.s2 = Some(s2);
        c.smp.state = SmpState::Expect3;

        let reply = c.receive_smp(SmpMessage::Three(s3.msg.clone())).unwrap();
        assert_eq!(reply.unwrap().typ, otr_core::tlv::TLV_SMP_MESSAGE_4);
        assert!(matches!(c.smp.state, SmpState::Expect1));

        let events = c.take_events();
        assert!(events.contains(&OtrEvent::smp(SmpEvent::Success, 100)));
        assert!(events.contains(&OtrEvent::Security(SecurityChange::SmpComplete)));
    }

    #[test]
    fn expect3_with_corrupted_scratch_fails_the_protocol() {
        let x = secret(0x5A);
        let (s1, msg1) = fixture_msg1(None);
        let mut s2 = generate_smp2(&mut rand(0x22), &x, &msg1).unwrap();
        let s3 = generate_smp3(&mut rand(0x33), &x, &s1, &s2.msg).unwrap();

        s2.b3 -= 1u32;

        let mut c = conversation(2);
        c.smp.s2 = Some(s2);
        c.smp.state = SmpState::Expect3;

        let err = c.receive_smp(SmpMessage::Three(s3.msg.clone())).unwrap_err();
        assert_eq!(err, OtrError::SmpProtocolFailed);
        assert_eq!(err.to_string(), "protocol failed: x != y");

        let events = c.take_events();
        assert!(events.contains(&OtrEvent::smp(SmpEvent::Failure, 100)));
        assert!(events.contains(&OtrEvent::Security(SecurityChange::SmpFailed)));
        assert!(matches!(c.smp.state, SmpState::Expect1));
    }

    #[test]
    fn unexpected_message_aborts_and_resets() {
        let mut c = conversation(3);
        c.smp.state = SmpState::Expect3;
        let (_, msg) = fixture_msg1(None);

        let reply = c.receive_smp(SmpMessage::One(msg)).unwrap();
        assert_eq!(reply.unwrap().typ, otr_core::tlv::TLV_SMP_ABORT);
        assert!(matches!(c.smp.state, SmpState::Expect1));
        assert!(c.take_events().contains(&OtrEvent::smp(SmpEvent::Error, 0)));
    }

    #[test]
    fn abort_resets_quietly() {
        let mut c = conversation(3);
        c.smp.state = SmpState::Expect2;

        let reply = c.receive_smp(SmpMessage::Abort).unwrap();
        assert!(reply.is_none());
        assert!(matches!(c.smp.state, SmpState::Expect1));
        assert!(c.take_events().contains(&OtrEvent::smp(SmpEvent::Abort, 0)));
    }

    #[test]
    fn short_randomness_leaves_the_round_waiting() {
        let mut c = conversation(4);
        c.smp.secret = Some(secret(0x5A));
        c.rand = Box::new(FixedRandom::new(vec![0xAB; 4]));
        let (_, msg) = fixture_msg1(None);

        let err = c.receive_smp(SmpMessage::One(msg)).unwrap_err();
        assert_eq!(err, OtrError::ShortRandomRead);
        assert!(matches!(c.smp.state, SmpState::WaitingForSecret(_)));
    }

    #[test]
    fn authenticate_requires_an_encrypted_channel() {
        let mut c = conversation(5);
        assert_eq!(
            c.authenticate(b"secret").unwrap_err(),
            OtrError::CannotAuthenticate
        );
    }
}
