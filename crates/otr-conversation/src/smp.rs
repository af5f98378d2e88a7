// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! Socialist Millionaires' Protocol round math.
//!
//! Four messages decide whether both parties know the same secret without
//! revealing it. Every exponent travels with a non-interactive
//! zero-knowledge proof (discrete-log knowledge or equality of discrete
//! logs), Fiat–Shamir hashed with a per-position domain byte `0x01..0x08`.
//! Group elements live in the shared 1536-bit group; proof responses are
//! reduced modulo the subgroup order.
//!
//! The state machine that sequences these rounds is in `smp_state`; this
//! module only generates and verifies individual messages.

use num_bigint::BigUint;

use otr_core::crypto::{constant_time_eq, sha256_prefixed, sha256_prefixed2};
use otr_core::dh::{
    self, div_mod, mul_mod, power_of_generator, random_exponent, sub_mul_mod, verify_group_element,
    MODULUS, ORDER,
};
use otr_core::encoding::{append_mpi, append_word, mpi_bytes, Decoder};
use otr_core::rand::RandomSource;
use otr_core::tlv::{self, Tlv};
use otr_core::types::{OtrError, OtrResult, SMP_EXPONENT_BYTES};

/// Message 1: the initiator's exponent commitments.
#[derive(Debug, Clone)]
pub(crate) struct Smp1 {
    pub g2a: BigUint,
    pub c2: BigUint,
    pub d2: BigUint,
    pub g3a: BigUint,
    pub c3: BigUint,
    pub d3: BigUint,
    pub question: Option<String>,
}

/// Message 2: the responder's commitments and blinded secret.
#[derive(Debug, Clone)]
pub(crate) struct Smp2 {
    pub g2b: BigUint,
    pub c2: BigUint,
    pub d2: BigUint,
    pub g3b: BigUint,
    pub c3: BigUint,
    pub d3: BigUint,
    pub pb: BigUint,
    pub qb: BigUint,
    pub cp: BigUint,
    pub d5: BigUint,
    pub d6: BigUint,
}

/// Message 3: the initiator's blinded secret and the first half of the
/// equality test.
#[derive(Debug, Clone)]
pub(crate) struct Smp3 {
    pub pa: BigUint,
    pub qa: BigUint,
    pub cp: BigUint,
    pub d5: BigUint,
    pub d6: BigUint,
    pub ra: BigUint,
    pub cr: BigUint,
    pub d7: BigUint,
}

/// Message 4: the responder's half of the equality test.
#[derive(Debug, Clone)]
pub(crate) struct Smp4 {
    pub rb: BigUint,
    pub cr: BigUint,
    pub d7: BigUint,
}

/// Initiator scratch kept between message 1 and message 3.
#[derive(Debug)]
pub(crate) struct Smp1State {
    pub a2: BigUint,
    pub a3: BigUint,
    pub msg: Smp1,
}

/// Responder scratch kept between message 2 and message 3.
pub(crate) struct Smp2State {
    pub b3: BigUint,
    pub g3a: BigUint,
    pub g2: BigUint,
    pub g3: BigUint,
    pub pb: BigUint,
    pub qb: BigUint,
    pub msg: Smp2,
}

/// Initiator scratch kept between message 3 and message 4.
pub(crate) struct Smp3State {
    pub g3b: BigUint,
    pub pa_pb: BigUint,
    pub qa_qb: BigUint,
    pub msg: Smp3,
}

impl Drop for Smp1State {
    fn drop(&mut self) {
        dh::wipe(&mut self.a2);
        dh::wipe(&mut self.a3);
    }
}

impl Drop for Smp2State {
    fn drop(&mut self) {
        dh::wipe(&mut self.b3);
    }
}

/// `SHA-256(prefix ‖ MPI(v))` as an integer.
fn hash_mpi(prefix: u8, v: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&sha256_prefixed(prefix, &mpi_bytes(v)))
}

/// `SHA-256(prefix ‖ MPI(a) ‖ MPI(b))` as an integer.
fn hash_mpi2(prefix: u8, a: &BigUint, b: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&sha256_prefixed2(prefix, &mpi_bytes(a), &mpi_bytes(b)))
}

/// Constant-time comparison of a claimed proof hash against the recomputed
/// one.
fn zkp_matches(expected: &BigUint, claimed: &BigUint) -> bool {
    constant_time_eq(&expected.to_bytes_be(), &claimed.to_bytes_be())
}

fn random_smp_exponent(rand: &mut dyn RandomSource) -> OtrResult<BigUint> {
    random_exponent(rand, SMP_EXPONENT_BYTES)
}

pub(crate) fn generate_smp1(
    rand: &mut dyn RandomSource,
    question: Option<&str>,
) -> OtrResult<Smp1State> {
    let a2 = random_smp_exponent(rand)?;
    let a3 = random_smp_exponent(rand)?;
    let r2 = random_smp_exponent(rand)?;
    let r3 = random_smp_exponent(rand)?;

    let g2a = power_of_generator(&a2);
    let g3a = power_of_generator(&a3);

    let c2 = hash_mpi(0x01, &power_of_generator(&r2));
    let d2 = sub_mul_mod(&r2, &a2, &c2, &ORDER);
    let c3 = hash_mpi(0x02, &power_of_generator(&r3));
    let d3 = sub_mul_mod(&r3, &a3, &c3, &ORDER);

    let msg = Smp1 {
        g2a,
        c2,
        d2,
        g3a,
        c3,
        d3,
        question: question.map(str::to_string),
    };
    Ok(Smp1State { a2, a3, msg })
}

pub(crate) fn verify_smp1(msg: &Smp1) -> OtrResult<()> {
    verify_group_element("g2a", &msg.g2a)?;
    verify_group_element("g3a", &msg.g3a)?;

    let commit2 = mul_mod(
        &power_of_generator(&msg.d2),
        &msg.g2a.modpow(&msg.c2, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi(0x01, &commit2), &msg.c2) {
        return Err(OtrError::InvalidZeroKnowledgeProof("c2"));
    }

    let commit3 = mul_mod(
        &power_of_generator(&msg.d3),
        &msg.g3a.modpow(&msg.c3, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi(0x02, &commit3), &msg.c3) {
        return Err(OtrError::InvalidZeroKnowledgeProof("c3"));
    }
    Ok(())
}

/// Builds message 2 from the responder's secret `y` and a verified
/// message 1.
pub(crate) fn generate_smp2(
    rand: &mut dyn RandomSource,
    y: &BigUint,
    msg1: &Smp1,
) -> OtrResult<Smp2State> {
    let b2 = random_smp_exponent(rand)?;
    let b3 = random_smp_exponent(rand)?;
    let r2 = random_smp_exponent(rand)?;
    let r3 = random_smp_exponent(rand)?;
    let r4 = random_smp_exponent(rand)?;
    let r5 = random_smp_exponent(rand)?;
    let r6 = random_smp_exponent(rand)?;

    let g2b = power_of_generator(&b2);
    let g3b = power_of_generator(&b3);
    let c2 = hash_mpi(0x03, &power_of_generator(&r2));
    let d2 = sub_mul_mod(&r2, &b2, &c2, &ORDER);
    let c3 = hash_mpi(0x04, &power_of_generator(&r3));
    let d3 = sub_mul_mod(&r3, &b3, &c3, &ORDER);

    let g2 = msg1.g2a.modpow(&b2, &MODULUS);
    let g3 = msg1.g3a.modpow(&b3, &MODULUS);

    let pb = g3.modpow(&r4, &MODULUS);
    let qb = mul_mod(&power_of_generator(&r4), &g2.modpow(y, &MODULUS), &MODULUS);

    let cp = hash_mpi2(
        0x05,
        &g3.modpow(&r5, &MODULUS),
        &mul_mod(&power_of_generator(&r5), &g2.modpow(&r6, &MODULUS), &MODULUS),
    );
    let d5 = sub_mul_mod(&r5, &r4, &cp, &ORDER);
    let d6 = sub_mul_mod(&r6, y, &cp, &ORDER);

    let msg = Smp2 {
        g2b,
        c2,
        d2,
        g3b,
        c3,
        d3,
        pb: pb.clone(),
        qb: qb.clone(),
        cp,
        d5,
        d6,
    };
    Ok(Smp2State {
        b3,
        g3a: msg1.g3a.clone(),
        g2,
        g3,
        pb,
        qb,
        msg,
    })
}

pub(crate) fn verify_smp2(s1: &Smp1State, msg: &Smp2) -> OtrResult<()> {
    verify_group_element("g2b", &msg.g2b)?;
    verify_group_element("g3b", &msg.g3b)?;
    verify_group_element("Pb", &msg.pb)?;
    verify_group_element("Qb", &msg.qb)?;

    let commit2 = mul_mod(
        &power_of_generator(&msg.d2),
        &msg.g2b.modpow(&msg.c2, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi(0x03, &commit2), &msg.c2) {
        return Err(OtrError::InvalidZeroKnowledgeProof("c2"));
    }

    let commit3 = mul_mod(
        &power_of_generator(&msg.d3),
        &msg.g3b.modpow(&msg.c3, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi(0x04, &commit3), &msg.c3) {
        return Err(OtrError::InvalidZeroKnowledgeProof("c3"));
    }

    let g2 = msg.g2b.modpow(&s1.a2, &MODULUS);
    let g3 = msg.g3b.modpow(&s1.a3, &MODULUS);

    let left = mul_mod(
        &g3.modpow(&msg.d5, &MODULUS),
        &msg.pb.modpow(&msg.cp, &MODULUS),
        &MODULUS,
    );
    let right = mul_mod(
        &mul_mod(&power_of_generator(&msg.d5), &g2.modpow(&msg.d6, &MODULUS), &MODULUS),
        &msg.qb.modpow(&msg.cp, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi2(0x05, &left, &right), &msg.cp) {
        return Err(OtrError::InvalidZeroKnowledgeProof("cP"));
    }
    Ok(())
}

/// Builds message 3 from the initiator's secret `x`, its message-1 scratch,
/// and a verified message 2.
pub(crate) fn generate_smp3(
    rand: &mut dyn RandomSource,
    x: &BigUint,
    s1: &Smp1State,
    msg2: &Smp2,
) -> OtrResult<Smp3State> {
    let r4 = random_smp_exponent(rand)?;
    let r5 = random_smp_exponent(rand)?;
    let r6 = random_smp_exponent(rand)?;
    let r7 = random_smp_exponent(rand)?;

    let g2 = msg2.g2b.modpow(&s1.a2, &MODULUS);
    let g3 = msg2.g3b.modpow(&s1.a3, &MODULUS);

    let pa = g3.modpow(&r4, &MODULUS);
    let qa = mul_mod(&power_of_generator(&r4), &g2.modpow(x, &MODULUS), &MODULUS);

    let cp = hash_mpi2(
        0x06,
        &g3.modpow(&r5, &MODULUS),
        &mul_mod(&power_of_generator(&r5), &g2.modpow(&r6, &MODULUS), &MODULUS),
    );
    let d5 = sub_mul_mod(&r5, &r4, &cp, &ORDER);
    let d6 = sub_mul_mod(&r6, x, &cp, &ORDER);

    let qa_qb = div_mod(&qa, &msg2.qb, &MODULUS)?;
    let ra = qa_qb.modpow(&s1.a3, &MODULUS);
    let cr = hash_mpi2(
        0x07,
        &power_of_generator(&r7),
        &qa_qb.modpow(&r7, &MODULUS),
    );
    let d7 = sub_mul_mod(&r7, &s1.a3, &cr, &ORDER);

    let pa_pb = div_mod(&pa, &msg2.pb, &MODULUS)?;

    let msg = Smp3 {
        pa,
        qa,
        cp,
        d5,
        d6,
        ra,
        cr,
        d7,
    };
    Ok(Smp3State {
        g3b: msg2.g3b.clone(),
        pa_pb,
        qa_qb,
        msg,
    })
}

pub(crate) fn verify_smp3(s2: &Smp2State, msg: &Smp3) -> OtrResult<()> {
    verify_group_element("Pa", &msg.pa)?;
    verify_group_element("Qa", &msg.qa)?;
    verify_group_element("Ra", &msg.ra)?;

    let left = mul_mod(
        &s2.g3.modpow(&msg.d5, &MODULUS),
        &msg.pa.modpow(&msg.cp, &MODULUS),
        &MODULUS,
    );
    let right = mul_mod(
        &mul_mod(
            &power_of_generator(&msg.d5),
            &s2.g2.modpow(&msg.d6, &MODULUS),
            &MODULUS,
        ),
        &msg.qa.modpow(&msg.cp, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi2(0x06, &left, &right), &msg.cp) {
        return Err(OtrError::InvalidZeroKnowledgeProof("cP"));
    }

    let qa_qb = div_mod(&msg.qa, &s2.qb, &MODULUS)?;
    let left = mul_mod(
        &power_of_generator(&msg.d7),
        &s2.g3a.modpow(&msg.cr, &MODULUS),
        &MODULUS,
    );
    let right = mul_mod(
        &qa_qb.modpow(&msg.d7, &MODULUS),
        &msg.ra.modpow(&msg.cr, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi2(0x07, &left, &right), &msg.cr) {
        return Err(OtrError::InvalidZeroKnowledgeProof("cR"));
    }
    Ok(())
}

/// Builds message 4 and runs the responder's half of the equality test.
pub(crate) fn generate_smp4(
    rand: &mut dyn RandomSource,
    s2: &Smp2State,
    msg3: &Smp3,
) -> OtrResult<(Smp4, bool)> {
    let r7 = random_smp_exponent(rand)?;

    let qa_qb = div_mod(&msg3.qa, &s2.qb, &MODULUS)?;
    let rb = qa_qb.modpow(&s2.b3, &MODULUS);
    let cr = hash_mpi2(
        0x08,
        &power_of_generator(&r7),
        &qa_qb.modpow(&r7, &MODULUS),
    );
    let d7 = sub_mul_mod(&r7, &s2.b3, &cr, &ORDER);

    let rab = msg3.ra.modpow(&s2.b3, &MODULUS);
    let pa_pb = div_mod(&msg3.pa, &s2.pb, &MODULUS)?;
    let matched = rab == pa_pb;

    Ok((Smp4 { rb, cr, d7 }, matched))
}

pub(crate) fn verify_smp4(s3: &Smp3State, msg: &Smp4) -> OtrResult<()> {
    verify_group_element("Rb", &msg.rb)?;

    let left = mul_mod(
        &power_of_generator(&msg.d7),
        &s3.g3b.modpow(&msg.cr, &MODULUS),
        &MODULUS,
    );
    let right = mul_mod(
        &s3.qa_qb.modpow(&msg.d7, &MODULUS),
        &msg.rb.modpow(&msg.cr, &MODULUS),
        &MODULUS,
    );
    if !zkp_matches(&hash_mpi2(0x08, &left, &right), &msg.cr) {
        return Err(OtrError::InvalidZeroKnowledgeProof("cR"));
    }
    Ok(())
}

/// The initiator's half of the equality test.
pub(crate) fn check_smp4(s1: &Smp1State, s3: &Smp3State, msg: &Smp4) -> bool {
    let rab = msg.rb.modpow(&s1.a3, &MODULUS);
    rab == s3.pa_pb
}

fn serialize_mpis(out: &mut Vec<u8>, mpis: &[&BigUint]) {
    append_word(out, mpis.len() as u32);
    for mpi in mpis {
        append_mpi(out, mpi);
    }
}

fn parse_mpis(dec: &mut Decoder, count: usize) -> OtrResult<Vec<BigUint>> {
    let declared = dec.read_word().map_err(|_| OtrError::CorruptDataMessage)? as usize;
    if declared != count {
        return Err(OtrError::CorruptDataMessage);
    }
    dec.read_mpis(count).map_err(|_| OtrError::CorruptDataMessage)
}

impl Smp1 {
    pub fn to_tlv(&self) -> Tlv {
        let mut value = Vec::new();
        let typ = match &self.question {
            Some(q) => {
                value.extend_from_slice(q.as_bytes());
                value.push(0x00);
                tlv::TLV_SMP_MESSAGE_1_WITH_QUESTION
            }
            None => tlv::TLV_SMP_MESSAGE_1,
        };
        serialize_mpis(
            &mut value,
            &[&self.g2a, &self.c2, &self.d2, &self.g3a, &self.c3, &self.d3],
        );
        Tlv::new(typ, value)
    }

    pub fn from_tlv(t: &Tlv) -> OtrResult<Smp1> {
        let (question, body) = if t.typ == tlv::TLV_SMP_MESSAGE_1_WITH_QUESTION {
            let nul = t
                .value
                .iter()
                .position(|&b| b == 0x00)
                .ok_or(OtrError::CorruptDataMessage)?;
            let question = String::from_utf8_lossy(&t.value[..nul]).into_owned();
            (Some(question), &t.value[nul + 1..])
        } else {
            (None, &t.value[..])
        };

        let mut dec = Decoder::new(body);
        let mut mpis = parse_mpis(&mut dec, 6)?;
        let d3 = mpis.pop().unwrap_or_default();
        let c3 = mpis.pop().unwrap_or_default();
        let g3a = mpis.pop().unwrap_or_default();
        let d2 = mpis.pop().unwrap_or_default();
        let c2 = mpis.pop().unwrap_or_default();
        let g2a = mpis.pop().unwrap_or_default();
        Ok(Smp1 {
            g2a,
            c2,
            d2,
            g3a,
            c3,
            d3,
            question,
        })
    }
}

impl Smp2 {
    pub fn to_tlv(&self) -> Tlv {
        let mut value = Vec::new();
        serialize_mpis(
            &mut value,
            &[
                &self.g2b, &self.c2, &self.d2, &self.g3b, &self.c3, &self.d3, &self.pb, &self.qb,
                &self.cp, &self.d5, &self.d6,
            ],
        );
        Tlv::new(tlv::TLV_SMP_MESSAGE_2, value)
    }

    pub fn from_tlv(t: &Tlv) -> OtrResult<Smp2> {
        let mut dec = Decoder::new(&t.value);
        let mut m = parse_mpis(&mut dec, 11)?;
        let d6 = m.pop().unwrap_or_default();
        let d5 = m.pop().unwrap_or_default();
        let cp = m.pop().unwrap_or_default();
        let qb = m.pop().unwrap_or_default();
        let pb = m.pop().unwrap_or_default();
        let d3 = m.pop().unwrap_or_default();
        let c3 = m.pop().unwrap_or_default();
        let g3b = m.pop().unwrap_or_default();
        let d2 = m.pop().unwrap_or_default();
        let c2 = m.pop().unwrap_or_default();
        let g2b = m.pop().unwrap_or_default();
        Ok(Smp2 {
            g2b,
            c2,
            d2,
            g3b,
            c3,
            d3,
            pb,
            qb,
            cp,
            d5,
            d6,
        })
    }
}

impl Smp3 {
    pub fn to_tlv(&self) -> Tlv {
        let mut value = Vec::new();
        serialize_mpis(
            &mut value,
            &[
                &self.pa, &self.qa, &self.cp, &self.d5, &self.d6, &self.ra, &self.cr, &self.d7,
            ],
        );
        Tlv::new(tlv::TLV_SMP_MESSAGE_3, value)
    }

    pub fn from_tlv(t: &Tlv) -> OtrResult<Smp3> {
        let mut dec = Decoder::new(&t.value);
        let mut m = parse_mpis(&mut dec, 8)?;
        let d7 = m.pop().unwrap_or_default();
        let cr = m.pop().unwrap_or_default();
        let ra = m.pop().unwrap_or_default();
        let d6 = m.pop().unwrap_or_default();
        let d5 = m.pop().unwrap_or_default();
        let cp = m.pop().unwrap_or_default();
        let qa = m.pop().unwrap_or_default();
        let pa = m.pop().unwrap_or_default();
        Ok(Smp3 {
            pa,
            qa,
            cp,
            d5,
            d6,
            ra,
            cr,
            d7,
        })
    }
}

impl Smp4 {
    pub fn to_tlv(&self) -> Tlv {
        let mut value = Vec::new();
        serialize_mpis(&mut value, &[&self.rb, &self.cr, &self.d7]);
        Tlv::new(tlv::TLV_SMP_MESSAGE_4, value)
    }

    pub fn from_tlv(t: &Tlv) -> OtrResult<Smp4> {
        let mut dec = Decoder::new(&t.value);
        let mut m = parse_mpis(&mut dec, 3)?;
        let d7 = m.pop().unwrap_or_default();
        let cr = m.pop().unwrap_or_default();
        let rb = m.pop().unwrap_or_default();
        Ok(Smp4 { rb, cr, d7 })
    }
}
