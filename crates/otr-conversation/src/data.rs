// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The data-message engine.
//!
//! Outbound: plaintext and TLVs are padded, encrypted under AES-128-CTR with
//! the per-pair counter as the upper nonce half, authenticated with
//! HMAC-SHA1, and the retired MAC keys queued for disclosure ride along.
//! Inbound runs the reverse path and performs the ratchet advance: a message
//! acknowledging our newest key triggers generation of a successor, and a
//! freshly advertised peer key slides their window.

use num_bigint::BigUint;
use tracing::debug;

use otr_core::crypto::{aes_ctr, constant_time_eq, hmac_sha1};
use otr_core::dh;
use otr_core::encoding::{append_data, append_mpi, append_word, Decoder};
use otr_core::tlv::{self, Tlv};
use otr_core::types::{
    MacKey, OtrError, OtrResult, COUNTER_LENGTH, DATA_MAC_LENGTH, EXTRA_KEY_LENGTH,
    MAC_KEY_LENGTH,
};

use crate::conversation::{Conversation, MsgState};
use crate::events::{OtrEvent, SecurityChange};
use crate::message::MSG_TYPE_DATA;

/// The peer asks receivers not to surface errors for this message if it
/// cannot be decrypted.
pub(crate) const FLAG_IGNORE_UNREADABLE: u8 = 0x01;

/// Encrypted payloads are padded to this granule with a type-0 TLV.
const PADDING_GRANULARITY: usize = 256;

/// A parsed data message.
pub(crate) struct DataMsg {
    pub flags: u8,
    pub sender_key_id: u32,
    pub recipient_key_id: u32,
    /// The sender's next DH public key.
    pub y: BigUint,
    pub top_half_ctr: [u8; COUNTER_LENGTH],
    pub encrypted: Vec<u8>,
    pub mac: [u8; DATA_MAC_LENGTH],
    pub revealed_mac_keys: Vec<MacKey>,
}

impl DataMsg {
    /// Parses a message body, returning the parsed form and the length of
    /// the MAC-covered region within `body`.
    fn parse(body: &[u8]) -> OtrResult<(DataMsg, usize)> {
        let mut dec = Decoder::new(body);
        let flags = dec.read_byte()?;
        let sender_key_id = dec.read_word()?;
        let recipient_key_id = dec.read_word()?;
        let y = dec.read_mpi()?;
        let mut top_half_ctr = [0u8; COUNTER_LENGTH];
        top_half_ctr.copy_from_slice(dec.read_bytes(COUNTER_LENGTH)?);
        let encrypted = dec.read_data()?.to_vec();
        let authenticated_len = dec.offset();

        let mut mac = [0u8; DATA_MAC_LENGTH];
        mac.copy_from_slice(dec.read_bytes(DATA_MAC_LENGTH)?);

        let revealed = dec.read_data()?;
        if revealed.len() % MAC_KEY_LENGTH != 0 {
            return Err(OtrError::ShortMessage);
        }
        let revealed_mac_keys = revealed
            .chunks_exact(MAC_KEY_LENGTH)
            .map(|chunk| {
                let mut key = [0u8; MAC_KEY_LENGTH];
                key.copy_from_slice(chunk);
                MacKey(key)
            })
            .collect();

        Ok((
            DataMsg {
                flags,
                sender_key_id,
                recipient_key_id,
                y,
                top_half_ctr,
                encrypted,
                mac,
                revealed_mac_keys,
            },
            authenticated_len,
        ))
    }
}

/// The decrypted payload: human-readable part, NUL, TLV records.
#[derive(Debug)]
pub(crate) struct PlainDataMsg {
    pub message: Vec<u8>,
    pub tlvs: Vec<Tlv>,
}

impl PlainDataMsg {
    fn serialize(&self) -> Vec<u8> {
        let mut out = self.message.clone();
        out.push(0x00);
        for t in &self.tlvs {
            t.serialize(&mut out);
        }
        out
    }

    fn parse(data: &[u8]) -> OtrResult<PlainDataMsg> {
        let (message, rest) = match data.iter().position(|&b| b == 0x00) {
            Some(idx) => (data[..idx].to_vec(), &data[idx + 1..]),
            None => (data.to_vec(), &data[data.len()..]),
        };
        let tlvs = Tlv::parse_all(rest).map_err(|_| OtrError::CorruptDataMessage)?;
        Ok(PlainDataMsg { message, tlvs })
    }
}

/// Sizes a type-0 padding TLV so the payload lands on the next granule.
fn padding_tlv(unpadded_len: usize) -> Tlv {
    let with_header = unpadded_len + 4;
    let pad = (PADDING_GRANULARITY - (with_header % PADDING_GRANULARITY)) % PADDING_GRANULARITY;
    Tlv::new(tlv::TLV_PADDING, vec![0u8; pad])
}

impl Conversation {
    /// Builds one outbound data message carrying `plain` and `tlvs`.
    pub(crate) fn gen_data_msg(
        &mut self,
        plain: &[u8],
        mut tlvs: Vec<Tlv>,
        flags: u8,
    ) -> OtrResult<Vec<u8>> {
        let keys = self.keys.sending_keys()?;

        let mut unpadded = 0;
        for t in &tlvs {
            unpadded += 4 + t.value.len();
        }
        unpadded += plain.len() + 1;
        tlvs.push(padding_tlv(unpadded));

        let payload = PlainDataMsg {
            message: plain.to_vec(),
            tlvs,
        }
        .serialize();

        let top_half_ctr = self.keys.our_counter.to_be_bytes();
        let encrypted = aes_ctr(&keys.sending_aes.0, &top_half_ctr, &payload);
        self.keys.our_counter += 1;

        let sender_key_id = self.keys.our_key_id - 1;
        let recipient_key_id = self.keys.their_key_id;
        let advertised = self
            .keys
            .our_current
            .as_ref()
            .ok_or(OtrError::EncryptedMessageWithNoSecureChannel)?
            .public
            .clone();

        let mut msg = self.message_header(MSG_TYPE_DATA)?;
        msg.push(flags);
        append_word(&mut msg, sender_key_id);
        append_word(&mut msg, recipient_key_id);
        append_mpi(&mut msg, &advertised);
        msg.extend_from_slice(&top_half_ctr);
        append_data(&mut msg, &encrypted);

        let mac = hmac_sha1(&keys.sending_mac.0, &msg);
        msg.extend_from_slice(&mac);

        let revealed = self.keys.drain_old_mac_keys();
        let mut revealed_bytes = Vec::with_capacity(revealed.len() * MAC_KEY_LENGTH);
        for key in &revealed {
            revealed_bytes.extend_from_slice(&key.0);
        }
        append_data(&mut msg, &revealed_bytes);

        Ok(msg)
    }

    /// Processes a received data message; `full` is the complete wire
    /// message (the MAC covers the header), `body` the part after the
    /// header.
    pub(crate) fn process_data_message(
        &mut self,
        full: &[u8],
        body: &[u8],
    ) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        let header_len = full.len() - body.len();
        let (msg, authenticated_len) = DataMsg::parse(body)?;
        dh::verify_group_element("y", &msg.y)?;

        let keys = self
            .keys
            .receiving_keys(msg.recipient_key_id, msg.sender_key_id)?;

        let counter = u64::from_be_bytes(msg.top_half_ctr);
        self.keys
            .validate_counter(msg.sender_key_id, msg.recipient_key_id, counter)?;

        let expected_mac = hmac_sha1(&keys.receiving_mac.0, &full[..header_len + authenticated_len]);
        if !constant_time_eq(&expected_mac, &msg.mac) {
            if msg.flags & FLAG_IGNORE_UNREADABLE != 0 {
                return Ok((None, Vec::new()));
            }
            return Err(OtrError::MacMismatch);
        }
        self.keys
            .commit_counter(msg.sender_key_id, msg.recipient_key_id, counter);

        let decrypted = aes_ctr(&keys.receiving_aes.0, &msg.top_half_ctr, &msg.encrypted);
        let payload = PlainDataMsg::parse(&decrypted)?;
        if !msg.revealed_mac_keys.is_empty() {
            debug!(
                count = msg.revealed_mac_keys.len(),
                "peer disclosed retired MAC keys"
            );
        }

        self.keys.register_used_mac_key(
            msg.recipient_key_id,
            msg.sender_key_id,
            keys.receiving_mac.clone(),
        );
        if msg.sender_key_id == self.keys.their_key_id {
            self.keys.rotate_their_key(msg.y.clone());
        }
        if msg.recipient_key_id == self.keys.our_key_id {
            self.keys.rotate_our_keys(self.rand.as_mut())?;
        }

        let reply_tlvs = self.process_tlvs(&payload.tlvs, &keys.extra_key)?;

        let mut to_send = Vec::new();
        if !reply_tlvs.is_empty() && self.msg_state == MsgState::Encrypted {
            let reply = self.gen_data_msg(b"", reply_tlvs, FLAG_IGNORE_UNREADABLE)?;
            to_send.extend(self.encode(&reply));
        }

        let plain = if payload.message.is_empty() {
            None
        } else {
            Some(payload.message)
        };
        Ok((plain, to_send))
    }

    /// Dispatches the in-band TLV records of a decrypted payload.
    fn process_tlvs(
        &mut self,
        tlvs: &[Tlv],
        extra_key: &[u8; EXTRA_KEY_LENGTH],
    ) -> OtrResult<Vec<Tlv>> {
        let mut replies = Vec::new();
        for t in tlvs {
            match t.typ {
                tlv::TLV_PADDING => {}
                tlv::TLV_DISCONNECTED => {
                    debug!("peer disconnected");
                    self.msg_state = MsgState::Finished;
                    self.keys.wipe();
                    self.smp.reset();
                    self.events
                        .push(OtrEvent::Security(SecurityChange::ConversationEnded));
                }
                tlv::TLV_SMP_MESSAGE_1
                | tlv::TLV_SMP_MESSAGE_2
                | tlv::TLV_SMP_MESSAGE_3
                | tlv::TLV_SMP_MESSAGE_4
                | tlv::TLV_SMP_ABORT
                | tlv::TLV_SMP_MESSAGE_1_WITH_QUESTION => {
                    if let Some(reply) = self.process_smp_tlv(t)? {
                        replies.push(reply);
                    }
                }
                tlv::TLV_EXTRA_SYMMETRIC_KEY => {
                    let mut dec = Decoder::new(&t.value);
                    let usage = dec.read_word().map_err(|_| OtrError::CorruptDataMessage)?;
                    self.events.push(OtrEvent::ExtraSymmetricKey {
                        usage,
                        usage_data: dec.remaining().to_vec(),
                        key: extra_key.to_vec(),
                    });
                }
                _ if !t.value.is_empty() => return Err(OtrError::CorruptDataMessage),
                _ => {}
            }
        }
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_lands_payloads_on_the_granule() {
        for unpadded in [1, 100, 251, 252, 256, 1000] {
            let tlv = padding_tlv(unpadded);
            assert_eq!(tlv.typ, tlv::TLV_PADDING);
            assert_eq!((unpadded + 4 + tlv.value.len()) % PADDING_GRANULARITY, 0);
        }
    }

    #[test]
    fn plain_payload_round_trips() {
        let payload = PlainDataMsg {
            message: b"hello".to_vec(),
            tlvs: vec![Tlv::new(tlv::TLV_PADDING, vec![0u8; 3])],
        };
        let parsed = PlainDataMsg::parse(&payload.serialize()).unwrap();
        assert_eq!(parsed.message, b"hello");
        assert_eq!(parsed.tlvs, payload.tlvs);
    }

    #[test]
    fn payload_without_nul_is_all_message() {
        let parsed = PlainDataMsg::parse(b"just text").unwrap();
        assert_eq!(parsed.message, b"just text");
        assert!(parsed.tlvs.is_empty());
    }

    #[test]
    fn garbled_tlv_section_is_corrupt() {
        // NUL, then a TLV claiming four bytes with one present.
        let raw = [b'h', b'i', 0x00, 0x00, 0x09, 0x00, 0x04, 0xAA];
        assert_eq!(
            PlainDataMsg::parse(&raw).unwrap_err(),
            OtrError::CorruptDataMessage
        );
    }
}
