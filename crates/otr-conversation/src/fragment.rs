// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! Outer-envelope fragmentation.
//!
//! Transports with small message limits receive encoded messages chopped
//! into `?OTR,kkkkk,nnnnn,chunk,` pieces with fixed five-digit, 1-indexed
//! counters. Reassembly is strictly sequential: any out-of-order piece
//! resets the buffer.

use otr_core::types::OtrResult;

pub(crate) const FRAGMENT_PREFIX: &[u8] = b"?OTR,";

/// `"?OTR," + "kkkkk," + "nnnnn," + trailing ","`.
const FRAGMENT_OVERHEAD: usize = 18;

/// Splits `msg` into transport-sized pieces; a zero `fragment_size` or a
/// small message passes through untouched.
pub(crate) fn fragment(msg: Vec<u8>, fragment_size: usize) -> Vec<Vec<u8>> {
    if fragment_size == 0 || msg.len() <= fragment_size {
        return vec![msg];
    }

    let payload = fragment_size.saturating_sub(FRAGMENT_OVERHEAD).max(1);
    let total = msg.len().div_ceil(payload);
    let mut out = Vec::with_capacity(total);
    for (i, chunk) in msg.chunks(payload).enumerate() {
        let mut piece = format!("?OTR,{:05},{:05},", i + 1, total).into_bytes();
        piece.extend_from_slice(chunk);
        piece.push(b',');
        out.push(piece);
    }
    out
}

/// Sequential reassembly buffer for inbound fragments.
#[derive(Default)]
pub(crate) struct Assembler {
    next: usize,
    total: usize,
    buf: Vec<u8>,
}

impl Assembler {
    fn reset(&mut self) {
        self.next = 0;
        self.total = 0;
        self.buf.clear();
    }

    /// Feeds one fragment; returns the reassembled message when the final
    /// piece arrives. Malformed or out-of-sequence fragments drop the
    /// buffer silently, as the reference implementation does.
    pub fn receive(&mut self, msg: &[u8]) -> OtrResult<Option<Vec<u8>>> {
        let Some((k, n, piece)) = parse_fragment(msg) else {
            self.reset();
            return Ok(None);
        };

        if k == 1 {
            self.reset();
            self.next = 1;
            self.total = n;
            self.buf.extend_from_slice(piece);
        } else if k == self.next + 1 && n == self.total {
            self.next = k;
            self.buf.extend_from_slice(piece);
        } else {
            self.reset();
            return Ok(None);
        }

        if self.next == self.total {
            let complete = std::mem::take(&mut self.buf);
            self.reset();
            return Ok(Some(complete));
        }
        Ok(None)
    }
}

fn parse_fragment(msg: &[u8]) -> Option<(usize, usize, &[u8])> {
    let rest = msg.strip_prefix(FRAGMENT_PREFIX)?;
    let comma1 = rest.iter().position(|&b| b == b',')?;
    let (k_str, rest) = rest.split_at(comma1);
    let rest = &rest[1..];
    let comma2 = rest.iter().position(|&b| b == b',')?;
    let (n_str, rest) = rest.split_at(comma2);
    let piece = rest[1..].strip_suffix(b",")?;

    let k: usize = std::str::from_utf8(k_str).ok()?.parse().ok()?;
    let n: usize = std::str::from_utf8(n_str).ok()?.parse().ok()?;
    if k == 0 || n == 0 || k > n {
        return None;
    }
    Some((k, n, piece))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_pass_through() {
        let frags = fragment(b"?OTR:abc.".to_vec(), 64);
        assert_eq!(frags, vec![b"?OTR:abc.".to_vec()]);
    }

    #[test]
    fn fragments_carry_five_digit_indices() {
        let encoded = b"?OTR:b25lIHR3byB0aHJlZQ==.".to_vec();
        let frags = fragment(encoded, 22);

        let expected: Vec<&[u8]> = vec![
            b"?OTR,00001,00007,?OTR,",
            b"?OTR,00002,00007,:b25,",
            b"?OTR,00003,00007,lIHR,",
            b"?OTR,00004,00007,3byB,",
            b"?OTR,00005,00007,0aHJ,",
            b"?OTR,00006,00007,lZQ=,",
            b"?OTR,00007,00007,=.,",
        ];
        assert_eq!(frags.len(), expected.len());
        for (got, want) in frags.iter().zip(expected) {
            assert_eq!(got.as_slice(), want);
        }
    }

    #[test]
    fn reassembly_round_trips() {
        let encoded = b"?OTR:b25lIHR3byB0aHJlZQ==.".to_vec();
        let frags = fragment(encoded.clone(), 22);

        let mut asm = Assembler::default();
        for frag in &frags[..frags.len() - 1] {
            assert_eq!(asm.receive(frag).unwrap(), None);
        }
        let complete = asm.receive(frags.last().unwrap()).unwrap();
        assert_eq!(complete, Some(encoded));
    }

    #[test]
    fn out_of_sequence_fragment_resets_buffer() {
        let frags = fragment(b"?OTR:b25lIHR3byB0aHJlZQ==.".to_vec(), 22);

        let mut asm = Assembler::default();
        assert_eq!(asm.receive(&frags[0]).unwrap(), None);
        // Skipping fragment two drops everything collected so far.
        assert_eq!(asm.receive(&frags[2]).unwrap(), None);
        assert_eq!(asm.receive(&frags[1]).unwrap(), None);
    }
}
