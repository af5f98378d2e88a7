// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! Type-Length-Value records carried inside decrypted data-message payloads.

use crate::encoding::{append_short, Decoder};
use crate::types::OtrResult;

pub const TLV_PADDING: u16 = 0;
pub const TLV_DISCONNECTED: u16 = 1;
pub const TLV_SMP_MESSAGE_1: u16 = 2;
pub const TLV_SMP_MESSAGE_2: u16 = 3;
pub const TLV_SMP_MESSAGE_3: u16 = 4;
pub const TLV_SMP_MESSAGE_4: u16 = 5;
pub const TLV_SMP_ABORT: u16 = 6;
pub const TLV_SMP_MESSAGE_1_WITH_QUESTION: u16 = 7;
pub const TLV_EXTRA_SYMMETRIC_KEY: u16 = 8;

/// One Type-Length-Value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub typ: u16,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(typ: u16, value: Vec<u8>) -> Self {
        Self { typ, value }
    }

    /// An empty-bodied record, as used by disconnect and abort.
    pub fn empty(typ: u16) -> Self {
        Self::new(typ, Vec::new())
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        append_short(out, self.typ);
        append_short(out, self.value.len() as u16);
        out.extend_from_slice(&self.value);
    }

    /// Parses records until the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::types::OtrError::ShortMessage`] when a record claims
    /// more bytes than remain.
    pub fn parse_all(data: &[u8]) -> OtrResult<Vec<Tlv>> {
        let mut dec = Decoder::new(data);
        let mut out = Vec::new();
        while !dec.is_empty() {
            let typ = dec.read_short()?;
            let len = dec.read_short()? as usize;
            let value = dec.read_bytes(len)?.to_vec();
            out.push(Tlv { typ, value });
        }
        Ok(out)
    }
}
