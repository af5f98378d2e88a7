// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The conversation façade and the outer message-state machine.

use tracing::debug;

use otr_core::dsa;
use otr_core::rand::RandomSource;
use otr_core::tlv::{self, Tlv};
use otr_core::types::{OtrResult, SecretBytes, FINGERPRINT_LENGTH, SSID_LENGTH};

use crate::ake::Ake;
use crate::data::FLAG_IGNORE_UNREADABLE;
use crate::events::{MessageEvent, OtrEvent};
use crate::fragment::{Assembler, FRAGMENT_PREFIX};
use crate::keys::KeyManagementContext;
use crate::policy::Policies;
use crate::smp_state::Smp;
use crate::version::Version;

/// Whether outbound plaintext is sent in the clear, encrypted, or refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MsgState {
    #[default]
    Plaintext,
    Encrypted,
    /// The peer ended the secure conversation; sends are refused until the
    /// host acknowledges with [`Conversation::end`].
    Finished,
}

/// One end of an OTR conversation.
///
/// Feed inbound transport bytes to [`receive`](Conversation::receive), wrap
/// outbound plaintext with [`send`](Conversation::send), and move whatever
/// either returns to the peer. Protocol events accumulate internally and are
/// drained with [`take_events`](Conversation::take_events).
pub struct Conversation {
    pub(crate) version: Option<Version>,
    pub(crate) policies: Policies,
    pub(crate) msg_state: MsgState,
    pub(crate) ake: Ake,
    pub(crate) keys: KeyManagementContext,
    pub(crate) smp: Smp,
    pub(crate) our_key: dsa::PrivateKey,
    pub(crate) their_key: Option<dsa::PublicKey>,
    pub(crate) ssid: [u8; SSID_LENGTH],
    pub(crate) our_instance_tag: u32,
    pub(crate) their_instance_tag: u32,
    pub(crate) fragment_size: usize,
    pub(crate) assembler: Assembler,
    pub(crate) rand: Box<dyn RandomSource>,
    pub(crate) events: Vec<OtrEvent>,
    /// Plaintext held back under `REQUIRE_ENCRYPTION` until the AKE lands.
    pub(crate) queued_plaintext: Vec<SecretBytes>,
}

impl Conversation {
    /// Creates a conversation around the host's long-term key and a
    /// randomness source. Policies start empty: add at least one `ALLOW_V*`
    /// flag before expecting any negotiation.
    pub fn new(our_key: dsa::PrivateKey, rand: Box<dyn RandomSource>) -> Self {
        Self {
            version: None,
            policies: Policies::new(),
            msg_state: MsgState::Plaintext,
            ake: Ake::default(),
            keys: KeyManagementContext::default(),
            smp: Smp::default(),
            our_key,
            their_key: None,
            ssid: [0u8; SSID_LENGTH],
            our_instance_tag: 0,
            their_instance_tag: 0,
            fragment_size: 0,
            assembler: Assembler::default(),
            rand,
            events: Vec::new(),
            queued_plaintext: Vec::new(),
        }
    }

    pub fn set_policies(&mut self, policies: Policies) {
        self.policies = policies;
    }

    pub fn add_policy(&mut self, policy: Policies) {
        self.policies.add(policy);
    }

    pub fn policies(&self) -> Policies {
        self.policies
    }

    /// Maximum transport message size; zero disables fragmentation.
    pub fn set_fragment_size(&mut self, size: usize) {
        self.fragment_size = size;
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn msg_state(&self) -> MsgState {
        self.msg_state
    }

    pub fn is_encrypted(&self) -> bool {
        self.msg_state == MsgState::Encrypted
    }

    /// The 8-byte session identifier derived by the last completed AKE.
    pub fn ssid(&self) -> [u8; SSID_LENGTH] {
        self.ssid
    }

    pub fn our_fingerprint(&self) -> [u8; FINGERPRINT_LENGTH] {
        self.our_key.public().fingerprint()
    }

    /// The peer's fingerprint, once an AKE has authenticated them.
    pub fn their_fingerprint(&self) -> Option<[u8; FINGERPRINT_LENGTH]> {
        self.their_key.as_ref().map(|k| k.fingerprint())
    }

    /// Drains the pending protocol events.
    pub fn take_events(&mut self) -> Vec<OtrEvent> {
        std::mem::take(&mut self.events)
    }

    /// Processes one inbound transport message. Returns the decrypted
    /// plaintext, if the message carried any, and the messages to send
    /// back.
    pub fn receive(&mut self, message: &[u8]) -> OtrResult<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
        if message.starts_with(FRAGMENT_PREFIX) {
            return match self.assembler.receive(message)? {
                Some(complete) => self.process_unfragmented(&complete),
                None => Ok((None, Vec::new())),
            };
        }
        self.process_unfragmented(message)
    }

    /// Wraps one outbound plaintext according to the message state.
    pub fn send(&mut self, message: &[u8]) -> OtrResult<Vec<Vec<u8>>> {
        match self.msg_state {
            MsgState::Plaintext => {
                if self.policies.has(Policies::REQUIRE_ENCRYPTION) {
                    debug!("queueing plaintext until the channel is encrypted");
                    self.queued_plaintext.push(SecretBytes::from_slice(message));
                    self.events.push(OtrEvent::Message {
                        event: MessageEvent::EncryptionRequired,
                        message: message.to_vec(),
                    });
                    return Ok(self.start_ake());
                }
                let mut out = message.to_vec();
                if self.policies.has(Policies::SEND_WHITESPACE_TAG)
                    && self.policies.allows_any_version()
                {
                    out.extend_from_slice(&self.whitespace_tag());
                }
                Ok(vec![out])
            }
            MsgState::Encrypted => {
                let msg = self.gen_data_msg(message, Vec::new(), 0)?;
                Ok(self.encode(&msg))
            }
            MsgState::Finished => {
                self.events.push(OtrEvent::Message {
                    event: MessageEvent::ConnectionEnded,
                    message: message.to_vec(),
                });
                Ok(Vec::new())
            }
        }
    }

    /// Terminates the secure channel.
    ///
    /// In `Encrypted` state this produces a final data message carrying a
    /// disconnect TLV; in every state the conversation returns to
    /// `Plaintext` with all session material wiped.
    pub fn end(&mut self) -> Vec<Vec<u8>> {
        let to_send = match self.msg_state {
            MsgState::Plaintext => Vec::new(),
            MsgState::Finished => Vec::new(),
            MsgState::Encrypted => {
                let disconnect = vec![Tlv::empty(tlv::TLV_DISCONNECTED)];
                match self.gen_data_msg(b"", disconnect, FLAG_IGNORE_UNREADABLE) {
                    Ok(msg) => self.encode(&msg),
                    Err(_) => Vec::new(),
                }
            }
        };
        self.msg_state = MsgState::Plaintext;
        self.keys.wipe();
        self.smp.reset();
        self.ake.reset();
        debug!("conversation ended locally");
        to_send
    }

    /// Solicits an AKE by emitting a query message for the allowed
    /// versions; empty if the policy allows none.
    pub fn start_ake(&mut self) -> Vec<Vec<u8>> {
        match self.query_message() {
            Some(query) => vec![query],
            None => Vec::new(),
        }
    }
}
