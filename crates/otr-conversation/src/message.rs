// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The outer envelope: recognizing the shapes a transport message can take
//! (armored binary, query, whitespace-tagged plaintext, error report, bare
//! plaintext), the version/instance-tag header, and base64 armor.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use otr_core::encoding::{append_short, append_word, Decoder};
use otr_core::types::{OtrError, OtrResult};

use crate::conversation::{Conversation, MsgState};
use crate::events::{MessageEvent, OtrEvent};
use crate::fragment::fragment;
use crate::version::{Version, MIN_INSTANCE_TAG, WHITESPACE_TAG_BASE};

pub(crate) const MSG_TYPE_DH_COMMIT: u8 = 0x02;
pub(crate) const MSG_TYPE_DATA: u8 = 0x03;
pub(crate) const MSG_TYPE_DH_KEY: u8 = 0x0A;
pub(crate) const MSG_TYPE_REVEAL_SIG: u8 = 0x11;
pub(crate) const MSG_TYPE_SIG: u8 = 0x12;
pub(crate) const MSG_TYPE_ERROR: u8 = 0xFF;

/// Query message soliciting an OTR version 2 conversation.
pub const QUERY_MESSAGE_V2: &str = "?OTRv2?";
/// Query message soliciting an OTR version 3 conversation.
pub const QUERY_MESSAGE_V3: &str = "?OTRv3?";
/// Prefix of human-readable OTR error reports.
pub const ERROR_PREFIX: &str = "?OTR Error:";

const MSG_PREFIX: &[u8] = b"?OTR:";
const QUERY_PREFIX: &[u8] = b"?OTR";

impl Conversation {
    /// Armors one binary message and splits it per the fragment size.
    pub(crate) fn encode(&self, msg: &[u8]) -> Vec<Vec<u8>> {
        let mut armored = MSG_PREFIX.to_vec();
        armored.extend_from_slice(BASE64.encode(msg).as_bytes());
        armored.push(b'.');
        fragment(armored, self.fragment_size)
    }

    /// Writes the binary header: version word, message type, and for v3 the
    /// sender/receiver instance tags.
    pub(crate) fn message_header(&mut self, msg_type: u8) -> OtrResult<Vec<u8>> {
        let version = self.version.ok_or(OtrError::InvalidOtrMessage)?;
        let mut out = Vec::new();
        append_short(&mut out, version.protocol_number());
        out.push(msg_type);
        if version.has_instance_tags() {
            let ours = self.ensure_instance_tag()?;
            append_word(&mut out, ours);
            append_word(&mut out, self.their_instance_tag);
        }
        Ok(out)
    }

    fn ensure_instance_tag(&mut self) -> OtrResult<u32> {
        while self.our_instance_tag < MIN_INSTANCE_TAG {
            let mut buf = [0u8; 4];
            self.rand.fill_bytes(&mut buf)?;
            self.our_instance_tag = u32::from_be_bytes(buf);
        }
        Ok(self.our_instance_tag)
    }

    /// The query message advertising every allowed version, if any.
    pub(crate) fn query_message(&self) -> Option<Vec<u8>> {
        let mut versions = String::new();
        if self.policies.allows(Version::V2) {
            versions.push(Version::V2.query_char());
        }
        if self.policies.allows(Version::V3) {
            versions.push(Version::V3.query_char());
        }
        if versions.is_empty() {
            return None;
        }
        Some(format!("?OTRv{versions}?").into_bytes())
    }

    /// The whitespace tag for every allowed version, appended to outbound
    /// plaintext under `SEND_WHITESPACE_TAG`.
    pub(crate) fn whitespace_tag(&self) -> Vec<u8> {
        let mut tag = WHITESPACE_TAG_BASE.to_vec();
        if self.policies.allows(Version::V2) {
            tag.extend_from_slice(Version::V2.whitespace_tag());
        }
        if self.policies.allows(Version::V3) {
            tag.extend_from_slice(Version::V3.whitespace_tag());
        }
        tag
    }

    /// Dispatches one complete (defragmented) transport message.
    pub(crate) fn process_unfragmented(
        &mut self,
        msg: &[u8],
    ) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        if let Some(armored) = msg.strip_prefix(MSG_PREFIX) {
            let body = armored.strip_suffix(b".").unwrap_or(armored);
            let decoded = BASE64
                .decode(body)
                .map_err(|_| OtrError::InvalidOtrMessage)?;
            return self.process_encoded(&decoded);
        }
        if let Some(rest) = msg.strip_prefix(ERROR_PREFIX.as_bytes()) {
            return self.process_error_message(rest);
        }
        if is_query(msg) {
            let to_send = self.process_query(msg)?;
            return Ok((None, to_send));
        }
        if msg.first() == Some(&0x00) {
            // Raw binary without armor, as some transports deliver it.
            return self.process_encoded(msg);
        }
        self.process_plaintext(msg)
    }

    /// Parses the header of a binary message and dispatches on its type.
    pub(crate) fn process_encoded(
        &mut self,
        msg: &[u8],
    ) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        if msg.len() < 3 {
            return Err(OtrError::InvalidOtrMessage);
        }

        let proto = u16::from_be_bytes([msg[0], msg[1]]);
        let version = Version::from_protocol_number(proto).ok_or(OtrError::WrongProtocolVersion)?;
        match self.version {
            Some(current) if current != version => return Err(OtrError::WrongProtocolVersion),
            Some(_) => {}
            None => {
                if !self.policies.allows(version) {
                    return Err(OtrError::WrongProtocolVersion);
                }
                self.version = Some(version);
            }
        }

        let msg_type = msg[2];
        let header_len = version.header_length();
        if msg.len() < header_len {
            return Err(OtrError::InvalidOtrMessage);
        }
        if version.has_instance_tags() {
            let mut dec = Decoder::new(&msg[3..header_len]);
            let sender_tag = dec.read_word()?;
            let receiver_tag = dec.read_word()?;
            if sender_tag < MIN_INSTANCE_TAG {
                return Ok((None, Vec::new()));
            }
            if receiver_tag != 0 && receiver_tag != self.our_instance_tag {
                return Ok((None, Vec::new()));
            }
            self.their_instance_tag = sender_tag;
        }

        let body = &msg[header_len..];
        let mut plain = None;
        let mut to_send: Vec<Vec<u8>> = Vec::new();

        match msg_type {
            MSG_TYPE_DH_COMMIT => match self.process_dh_commit(body) {
                Ok(out) => to_send.extend(out.map(|m| self.encode(&m)).unwrap_or_default()),
                Err(e) => return self.fail_ake(e),
            },
            MSG_TYPE_DH_KEY => match self.process_dh_key(body) {
                Ok(out) => to_send.extend(out.map(|m| self.encode(&m)).unwrap_or_default()),
                Err(e) => return self.fail_ake(e),
            },
            MSG_TYPE_REVEAL_SIG => match self.process_reveal_sig(body) {
                Ok(out) => to_send.extend(out.map(|m| self.encode(&m)).unwrap_or_default()),
                Err(e) => return self.fail_ake(e),
            },
            MSG_TYPE_SIG => match self.process_signature(body) {
                Ok(out) => to_send.extend(out.map(|m| self.encode(&m)).unwrap_or_default()),
                Err(e) => return self.fail_ake(e),
            },
            MSG_TYPE_DATA => {
                if self.msg_state != MsgState::Encrypted {
                    return Err(OtrError::EncryptedMessageWithNoSecureChannel);
                }
                let (p, out) = self.process_data_message(msg, body)?;
                plain = p;
                to_send.extend(out);
            }
            MSG_TYPE_ERROR => {
                let (_, out) = self.process_error_message(body)?;
                to_send.extend(out);
            }
            _ => return Err(OtrError::InvalidOtrMessage),
        }

        // A completed AKE flushes plaintext queued under REQUIRE_ENCRYPTION.
        if self.msg_state == MsgState::Encrypted && !self.queued_plaintext.is_empty() {
            let queued = std::mem::take(&mut self.queued_plaintext);
            for m in &queued {
                let data_msg = self.gen_data_msg(m.as_ref(), Vec::new(), 0)?;
                to_send.extend(self.encode(&data_msg));
            }
        }

        Ok((plain, to_send))
    }

    /// AKE failures abort the exchange but never disturb the message state.
    fn fail_ake(&mut self, e: OtrError) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        debug!(error = %e, "AKE aborted");
        self.ake.reset();
        Err(e)
    }

    fn process_query(&mut self, msg: &[u8]) -> OtrResult<Vec<Vec<u8>>> {
        let advertised = parse_query_versions(msg);
        let Some(best) = best_common_version(&advertised, self.policies) else {
            debug!("query advertises no allowed version, ignoring");
            return Ok(Vec::new());
        };
        self.version = Some(best);
        let commit = self.dh_commit_message()?;
        Ok(self.encode(&commit))
    }

    fn process_error_message(
        &mut self,
        body: &[u8],
    ) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        self.events.push(OtrEvent::Message {
            event: MessageEvent::ReceivedErrorMessage,
            message: body.strip_prefix(b" ").unwrap_or(body).to_vec(),
        });
        let mut to_send = Vec::new();
        if self.policies.has(crate::Policies::ERROR_START_AKE) {
            if let Some(query) = self.query_message() {
                to_send.push(query);
            }
        }
        Ok((None, to_send))
    }

    fn process_plaintext(&mut self, msg: &[u8]) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        if let Some(idx) = find_subslice(msg, &WHITESPACE_TAG_BASE) {
            return self.process_whitespace_tag(msg, idx);
        }
        if self.policies.has(crate::Policies::REQUIRE_ENCRYPTION)
            || self.msg_state != MsgState::Plaintext
        {
            self.events.push(OtrEvent::Message {
                event: MessageEvent::ReceivedUnencrypted,
                message: msg.to_vec(),
            });
        }
        Ok((Some(msg.to_vec()), Vec::new()))
    }

    fn process_whitespace_tag(
        &mut self,
        msg: &[u8],
        idx: usize,
    ) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        let mut advertised = Vec::new();
        let mut end = idx + WHITESPACE_TAG_BASE.len();
        while msg.len() >= end + 8 && msg[end..end + 8].iter().all(|&b| b == 0x20 || b == 0x09) {
            let word: &[u8] = &msg[end..end + 8];
            if word == Version::V2.whitespace_tag() {
                advertised.push(Version::V2);
            } else if word == Version::V3.whitespace_tag() {
                advertised.push(Version::V3);
            }
            end += 8;
        }

        if !self.policies.has(crate::Policies::WHITESPACE_START_AKE) {
            return Err(OtrError::InvalidOtrMessage);
        }
        let Some(best) = best_common_version(&advertised, self.policies) else {
            return Err(OtrError::InvalidVersion);
        };

        let mut plain = msg[..idx].to_vec();
        plain.extend_from_slice(&msg[end..]);
        let plain = if plain.is_empty() { None } else { Some(plain) };

        debug!(version = ?best, "whitespace tag triggered AKE");
        self.version = Some(best);
        let commit = self.dh_commit_message()?;
        Ok((plain, self.encode(&commit)))
    }
}

fn is_query(msg: &[u8]) -> bool {
    msg.starts_with(QUERY_PREFIX) && matches!(msg.get(4), Some(b'?') | Some(b'v'))
}

/// Extracts the versions named by a query message (`?OTR?`, `?OTRv23?`,
/// `?OTR?v2?`, ...).
fn parse_query_versions(msg: &[u8]) -> Vec<Version> {
    let mut versions = Vec::new();
    let mut rest = &msg[QUERY_PREFIX.len()..];
    // A bare "?" advertises only OTR version 1, which is not negotiable.
    if rest.first() == Some(&b'?') {
        rest = &rest[1..];
    }
    if rest.first() == Some(&b'v') {
        for &b in &rest[1..] {
            match b {
                b'2' => versions.push(Version::V2),
                b'3' => versions.push(Version::V3),
                b'?' => break,
                _ => {}
            }
        }
    }
    versions
}

fn best_common_version(advertised: &[Version], policies: crate::Policies) -> Option<Version> {
    advertised
        .iter()
        .copied()
        .filter(|v| policies.allows(*v))
        .max()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Policies;

    #[test]
    fn query_version_parsing() {
        assert_eq!(parse_query_versions(b"?OTRv3?"), vec![Version::V3]);
        assert_eq!(
            parse_query_versions(b"?OTRv23?"),
            vec![Version::V2, Version::V3]
        );
        assert_eq!(parse_query_versions(b"?OTR?"), vec![]);
        assert_eq!(parse_query_versions(b"?OTR?v2?"), vec![Version::V2]);
    }

    #[test]
    fn best_common_version_prefers_v3() {
        let policies = Policies::ALLOW_V2 | Policies::ALLOW_V3;
        assert_eq!(
            best_common_version(&[Version::V2, Version::V3], policies),
            Some(Version::V3)
        );
        assert_eq!(
            best_common_version(&[Version::V2], Policies::ALLOW_V3),
            None
        );
    }

    #[test]
    fn query_detection_rejects_plaintext() {
        assert!(is_query(b"?OTRv3?"));
        assert!(is_query(b"?OTR?"));
        assert!(!is_query(b"?OTR: not a query"));
        assert!(!is_query(b"hello"));
    }
}
