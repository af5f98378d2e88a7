// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! OTR wire primitives.
//!
//! The OTR binary format is built from three shapes: big-endian 16/32-bit
//! words, `DATA` fields (a 32-bit length followed by that many bytes), and
//! `MPI` fields (a `DATA` holding the minimal big-endian representation of an
//! unsigned big integer, no leading zeros).

use num_bigint::BigUint;
use num_traits::Zero;

use crate::types::{OtrError, OtrResult};

pub fn append_short(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn append_word(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Appends a length-prefixed `DATA` field.
pub fn append_data(out: &mut Vec<u8>, data: &[u8]) {
    append_word(out, data.len() as u32);
    out.extend_from_slice(data);
}

/// Appends an `MPI`: the minimal big-endian encoding of `n` behind a 32-bit
/// length. Zero encodes as a zero-length body.
pub fn append_mpi(out: &mut Vec<u8>, n: &BigUint) {
    if n.is_zero() {
        append_word(out, 0);
        return;
    }
    let bytes = n.to_bytes_be();
    append_word(out, bytes.len() as u32);
    out.extend_from_slice(&bytes);
}

pub fn append_mpis(out: &mut Vec<u8>, mpis: &[&BigUint]) {
    for mpi in mpis {
        append_mpi(out, mpi);
    }
}

/// Returns the standalone MPI encoding of `n`.
///
/// OTR hashes this exact representation in several places (the AKE commit
/// hash, the session-key derivation, every SMP Fiat–Shamir hash), so it is
/// worth having as a single allocation.
pub fn mpi_bytes(n: &BigUint) -> Vec<u8> {
    let mut out = Vec::new();
    append_mpi(&mut out, n);
    out
}

/// Cursor over a received message body.
///
/// Every extractor checks the remaining length and fails with
/// [`OtrError::ShortMessage`] instead of panicking; parsed slices borrow from
/// the input.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub fn read_bytes(&mut self, n: usize) -> OtrResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(OtrError::ShortMessage);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_byte(&mut self) -> OtrResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_short(&mut self) -> OtrResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_word(&mut self) -> OtrResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a `DATA` field, returning its body.
    pub fn read_data(&mut self) -> OtrResult<&'a [u8]> {
        let len = self.read_word()? as usize;
        self.read_bytes(len)
    }

    pub fn read_mpi(&mut self) -> OtrResult<BigUint> {
        Ok(BigUint::from_bytes_be(self.read_data()?))
    }

    pub fn read_mpis(&mut self, count: usize) -> OtrResult<Vec<BigUint>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_mpi()?);
        }
        Ok(out)
    }
}
