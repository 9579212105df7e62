// SPDX-License-Identifier: LGPL-3.0-only

use std::rc::Rc;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use once_cell::sync::Lazy;

use crate::{
    crypto::{CryptoError, DH, SHA256},
    encoding::{Fingerprint, OTRDecoder, OTREncoder, SSID, TLV},
    host::RandomSource,
    OTRError,
};

/// TLV for initiating SMP.
pub const TLV_TYPE_SMP_MESSAGE_1: u16 = 2;
pub const TLV_TYPE_SMP_MESSAGE_2: u16 = 3;
pub const TLV_TYPE_SMP_MESSAGE_3: u16 = 4;
pub const TLV_TYPE_SMP_MESSAGE_4: u16 = 5;
pub const TLV_TYPE_SMP_ABORT: u16 = 6;

/// TLV similar to message 1 but includes a user-specified question (null-terminated) in the
/// payload.
pub const TLV_TYPE_SMP_MESSAGE_1Q: u16 = 7;

/// The order of the subgroup generated by g1: q = (p - 1) / 2. The D values of the
/// zero-knowledge proofs are calculated modulo this order, while the random exponents themselves
/// are 1536-bit numbers.
static ORDER: Lazy<BigUint> = Lazy::new(|| (&*DH::MODULUS - 1u8) >> 1u8);

const RANDOM_EXPONENT_LEN: usize = 192;

pub fn is_smp_tlv(tlv: &TLV) -> bool {
    tlv.0 >= TLV_TYPE_SMP_MESSAGE_1 && tlv.0 <= TLV_TYPE_SMP_MESSAGE_1Q
}

/// SMPEvent is the outcome of processing one SMP record, for the host to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SMPEvent {
    None,
    /// The other party initiated authentication; our secret is needed to continue.
    SecretNeeded,
    /// The protocol completed and established equality of both secrets.
    Completed,
    /// The protocol established inequality of the secrets, the other party cheated, or the
    /// exchange was aborted mid-run.
    Failed,
}

pub struct SMPContext {
    rand: Rc<dyn RandomSource>,
    ssid: SSID,
    our_fingerprint: Fingerprint,
    their_fingerprint: Fingerprint,
    state: SMPState,
}

impl SMPContext {
    pub fn new(
        rand: Rc<dyn RandomSource>,
        ssid: SSID,
        our_fingerprint: Fingerprint,
        their_fingerprint: Fingerprint,
    ) -> SMPContext {
        SMPContext {
            rand,
            ssid,
            our_fingerprint,
            their_fingerprint,
            state: SMPState::Expect1,
        }
    }

    /// question produces the challenge of a pending peer-initiated exchange, if any.
    pub fn question(&self) -> Option<String> {
        match &self.state {
            SMPState::AwaitingUserSecret { question, .. } => {
                Some(String::from_utf8_lossy(question).into_owned())
            }
            _ => None,
        }
    }

    /// awaiting_secret indicates that the other party initiated and progress is held until the
    /// host supplies the matching secret.
    pub fn awaiting_secret(&self) -> bool {
        matches!(self.state, SMPState::AwaitingUserSecret { .. })
    }

    /// initiate starts the initiator flow of the protocol with an optional question.
    pub fn initiate(&mut self, question: &[u8], secret: &[u8]) -> Result<TLV, OTRError> {
        match self.state {
            SMPState::Expect1 => {}
            _ => return Err(OTRError::SMPInProgress),
        }
        let g1 = DH::generator();
        let x = compute_secret(
            &self.our_fingerprint,
            &self.their_fingerprint,
            &self.ssid,
            secret,
        );
        let a2 = random_exponent(&*self.rand)?;
        let a3 = random_exponent(&*self.rand)?;
        let r2 = random_exponent(&*self.rand)?;
        let r3 = random_exponent(&*self.rand)?;
        let g2a = g1.modpow(&a2, &DH::MODULUS);
        let g3a = g1.modpow(&a3, &DH::MODULUS);
        let c2 = hash1(1, &g1.modpow(&r2, &DH::MODULUS));
        let d2 = sub_order(&r2, &(&a2 * &c2));
        let c3 = hash1(2, &g1.modpow(&r3, &DH::MODULUS));
        let d3 = sub_order(&r3, &(&a3 * &c3));
        let mut encoder = OTREncoder::new();
        let typ = if question.is_empty() {
            TLV_TYPE_SMP_MESSAGE_1
        } else {
            encoder.write_bytes_null_terminated(question);
            TLV_TYPE_SMP_MESSAGE_1Q
        };
        let payload = encoder
            .write_mpi_sequence(&[&g2a, &c2, &d2, &g3a, &c3, &d3])
            .to_vec();
        log::debug!("SMP initiated, awaiting the other party's reply.");
        self.state = SMPState::Expect2 { x, a2, a3 };
        Ok(TLV(typ, payload))
    }

    /// respond continues a pending peer-initiated exchange with the host-supplied secret.
    pub fn respond(&mut self, secret: &[u8]) -> Result<TLV, OTRError> {
        let (g2a, g3a) = match &self.state {
            SMPState::AwaitingUserSecret { g2a, g3a, .. } => (g2a.clone(), g3a.clone()),
            _ => return Err(OTRError::SMPSecretUnexpected),
        };
        let g1 = DH::generator();
        // The initiator's fingerprint leads in the shared-secret derivation.
        let y = compute_secret(
            &self.their_fingerprint,
            &self.our_fingerprint,
            &self.ssid,
            secret,
        );
        let b2 = random_exponent(&*self.rand)?;
        let b3 = random_exponent(&*self.rand)?;
        let r2 = random_exponent(&*self.rand)?;
        let r3 = random_exponent(&*self.rand)?;
        let r4 = random_exponent(&*self.rand)?;
        let r5 = random_exponent(&*self.rand)?;
        let r6 = random_exponent(&*self.rand)?;
        let g2b = g1.modpow(&b2, &DH::MODULUS);
        let g3b = g1.modpow(&b3, &DH::MODULUS);
        let c2 = hash1(3, &g1.modpow(&r2, &DH::MODULUS));
        let d2 = sub_order(&r2, &(&b2 * &c2));
        let c3 = hash1(4, &g1.modpow(&r3, &DH::MODULUS));
        let d3 = sub_order(&r3, &(&b3 * &c3));
        let g2 = g2a.modpow(&b2, &DH::MODULUS);
        let g3 = g3a.modpow(&b3, &DH::MODULUS);
        let pb = g3.modpow(&r4, &DH::MODULUS);
        let qb = mulmod(&g1.modpow(&r4, &DH::MODULUS), &g2.modpow(&y, &DH::MODULUS));
        let cp = hash2(
            5,
            &g3.modpow(&r5, &DH::MODULUS),
            &mulmod(&g1.modpow(&r5, &DH::MODULUS), &g2.modpow(&r6, &DH::MODULUS)),
        );
        let d5 = sub_order(&r5, &(&r4 * &cp));
        let d6 = sub_order(&r6, &(&y * &cp));
        let payload = OTREncoder::new()
            .write_mpi_sequence(&[&g2b, &c2, &d2, &g3b, &c3, &d3, &pb, &qb, &cp, &d5, &d6])
            .to_vec();
        log::debug!("SMP secret supplied, continuing the exchange.");
        self.state = SMPState::Expect3 {
            g3a,
            g2,
            g3,
            b3,
            pb,
            qb,
        };
        Ok(TLV(TLV_TYPE_SMP_MESSAGE_2, payload))
    }

    /// handle processes one received SMP record, producing the reply to transmit (if any) and the
    /// event to surface to the host. Messages arriving out of state, and proofs that fail
    /// verification, abort the exchange: the reply is an abort record and the state resets.
    pub fn handle(&mut self, tlv: &TLV) -> Result<(Option<TLV>, SMPEvent), OTRError> {
        match tlv.0 {
            TLV_TYPE_SMP_ABORT => {
                let active = !matches!(self.state, SMPState::Expect1);
                self.state = SMPState::Expect1;
                Ok((None, if active { SMPEvent::Failed } else { SMPEvent::None }))
            }
            TLV_TYPE_SMP_MESSAGE_1 | TLV_TYPE_SMP_MESSAGE_1Q => self.handle_message1(tlv),
            TLV_TYPE_SMP_MESSAGE_2 => self.handle_message2(tlv),
            TLV_TYPE_SMP_MESSAGE_3 => self.handle_message3(tlv),
            TLV_TYPE_SMP_MESSAGE_4 => self.handle_message4(tlv),
            _ => Ok((None, SMPEvent::None)),
        }
    }

    fn handle_message1(&mut self, tlv: &TLV) -> Result<(Option<TLV>, SMPEvent), OTRError> {
        if !matches!(self.state, SMPState::Expect1) {
            return Ok(self.protocol_abort());
        }
        match Self::process_message1(tlv) {
            Ok((g2a, g3a, question)) => {
                self.state = SMPState::AwaitingUserSecret { g2a, g3a, question };
                Ok((None, SMPEvent::SecretNeeded))
            }
            Err(SMPFault::Randomness) => Err(OTRError::RandomnessFailure),
            Err(SMPFault::Violation) => Ok(self.protocol_abort()),
        }
    }

    fn process_message1(tlv: &TLV) -> Result<(BigUint, BigUint, Vec<u8>), SMPFault> {
        let g1 = DH::generator();
        let mut decoder = OTRDecoder::new(&tlv.1);
        let question = if tlv.0 == TLV_TYPE_SMP_MESSAGE_1Q {
            decoder.read_bytes_null_terminated()
        } else {
            Vec::new()
        };
        let mut mpis = decoder.read_mpi_sequence().or(Err(SMPFault::Violation))?;
        if mpis.len() != 6 {
            return Err(SMPFault::Violation);
        }
        let d3 = mpis.pop().expect("BUG: element count verified above");
        let c3 = mpis.pop().expect("BUG: element count verified above");
        let g3a = mpis.pop().expect("BUG: element count verified above");
        let d2 = mpis.pop().expect("BUG: element count verified above");
        let c2 = mpis.pop().expect("BUG: element count verified above");
        let g2a = mpis.pop().expect("BUG: element count verified above");
        DH::verify_public_key(&g2a)?;
        DH::verify_public_key(&g3a)?;
        // Verify the knowledge proofs for the exponents of g2a and g3a.
        let expected_c2 = hash1(
            1,
            &mulmod(
                &g1.modpow(&d2, &DH::MODULUS),
                &g2a.modpow(&c2, &DH::MODULUS),
            ),
        );
        verify(&expected_c2, &c2)?;
        let expected_c3 = hash1(
            2,
            &mulmod(
                &g1.modpow(&d3, &DH::MODULUS),
                &g3a.modpow(&c3, &DH::MODULUS),
            ),
        );
        verify(&expected_c3, &c3)?;
        Ok((g2a, g3a, question))
    }

    fn handle_message2(&mut self, tlv: &TLV) -> Result<(Option<TLV>, SMPEvent), OTRError> {
        let (x, a2, a3) = match &self.state {
            SMPState::Expect2 { x, a2, a3 } => (x.clone(), a2.clone(), a3.clone()),
            _ => return Ok(self.protocol_abort()),
        };
        match Self::process_message2(&*self.rand, &x, &a2, &a3, tlv) {
            Ok((reply, next_state)) => {
                self.state = next_state;
                Ok((Some(reply), SMPEvent::None))
            }
            Err(SMPFault::Randomness) => Err(OTRError::RandomnessFailure),
            Err(SMPFault::Violation) => Ok(self.protocol_abort()),
        }
    }

    fn process_message2(
        rand: &dyn RandomSource,
        x: &BigUint,
        a2: &BigUint,
        a3: &BigUint,
        tlv: &TLV,
    ) -> Result<(TLV, SMPState), SMPFault> {
        let g1 = DH::generator();
        let mut mpis = OTRDecoder::new(&tlv.1)
            .read_mpi_sequence()
            .or(Err(SMPFault::Violation))?;
        if mpis.len() != 11 {
            return Err(SMPFault::Violation);
        }
        let d6 = mpis.pop().expect("BUG: element count verified above");
        let d5 = mpis.pop().expect("BUG: element count verified above");
        let cp = mpis.pop().expect("BUG: element count verified above");
        let qb = mpis.pop().expect("BUG: element count verified above");
        let pb = mpis.pop().expect("BUG: element count verified above");
        let d3 = mpis.pop().expect("BUG: element count verified above");
        let c3 = mpis.pop().expect("BUG: element count verified above");
        let g3b = mpis.pop().expect("BUG: element count verified above");
        let d2 = mpis.pop().expect("BUG: element count verified above");
        let c2 = mpis.pop().expect("BUG: element count verified above");
        let g2b = mpis.pop().expect("BUG: element count verified above");
        DH::verify_public_key(&g2b)?;
        DH::verify_public_key(&g3b)?;
        DH::verify_public_key(&pb)?;
        DH::verify_public_key(&qb)?;
        let expected_c2 = hash1(
            3,
            &mulmod(
                &g1.modpow(&d2, &DH::MODULUS),
                &g2b.modpow(&c2, &DH::MODULUS),
            ),
        );
        verify(&expected_c2, &c2)?;
        let expected_c3 = hash1(
            4,
            &mulmod(
                &g1.modpow(&d3, &DH::MODULUS),
                &g3b.modpow(&c3, &DH::MODULUS),
            ),
        );
        verify(&expected_c3, &c3)?;
        let g2 = g2b.modpow(a2, &DH::MODULUS);
        let g3 = g3b.modpow(a3, &DH::MODULUS);
        // Verify the proof that Pb and Qb were constructed from the same exponent and the
        // responder's secret.
        let expected_cp = hash2(
            5,
            &mulmod(&g3.modpow(&d5, &DH::MODULUS), &pb.modpow(&cp, &DH::MODULUS)),
            &mulmod3(
                &g1.modpow(&d5, &DH::MODULUS),
                &g2.modpow(&d6, &DH::MODULUS),
                &qb.modpow(&cp, &DH::MODULUS),
            ),
        );
        verify(&expected_cp, &cp)?;
        let r4 = random_exponent_fault(rand)?;
        let r5 = random_exponent_fault(rand)?;
        let r6 = random_exponent_fault(rand)?;
        let r7 = random_exponent_fault(rand)?;
        let pa = g3.modpow(&r4, &DH::MODULUS);
        let qa = mulmod(&g1.modpow(&r4, &DH::MODULUS), &g2.modpow(x, &DH::MODULUS));
        let cp_a = hash2(
            6,
            &g3.modpow(&r5, &DH::MODULUS),
            &mulmod(&g1.modpow(&r5, &DH::MODULUS), &g2.modpow(&r6, &DH::MODULUS)),
        );
        let d5_a = sub_order(&r5, &(&r4 * &cp_a));
        let d6_a = sub_order(&r6, &(x * &cp_a));
        let qa_over_qb = mulmod(&qa, &invert(&qb));
        let ra = qa_over_qb.modpow(a3, &DH::MODULUS);
        let cr = hash2(
            7,
            &g1.modpow(&r7, &DH::MODULUS),
            &qa_over_qb.modpow(&r7, &DH::MODULUS),
        );
        let d7 = sub_order(&r7, &(a3 * &cr));
        let payload = OTREncoder::new()
            .write_mpi_sequence(&[&pa, &qa, &cp_a, &d5_a, &d6_a, &ra, &cr, &d7])
            .to_vec();
        let pa_over_pb = mulmod(&pa, &invert(&pb));
        Ok((
            TLV(TLV_TYPE_SMP_MESSAGE_3, payload),
            SMPState::Expect4 {
                g3b,
                pa_over_pb,
                qa_over_qb,
                a3: a3.clone(),
            },
        ))
    }

    fn handle_message3(&mut self, tlv: &TLV) -> Result<(Option<TLV>, SMPEvent), OTRError> {
        let (g3a, g2, g3, b3, pb, qb) = match &self.state {
            SMPState::Expect3 {
                g3a,
                g2,
                g3,
                b3,
                pb,
                qb,
            } => (
                g3a.clone(),
                g2.clone(),
                g3.clone(),
                b3.clone(),
                pb.clone(),
                qb.clone(),
            ),
            _ => return Ok(self.protocol_abort()),
        };
        let result = Self::process_message3(&*self.rand, &g3a, &g2, &g3, &b3, &pb, &qb, tlv);
        self.state = SMPState::Expect1;
        match result {
            Ok((reply, success)) => {
                let event = if success {
                    log::info!("SMP exchange completed: secrets are equal.");
                    SMPEvent::Completed
                } else {
                    log::info!("SMP exchange completed: secrets differ.");
                    SMPEvent::Failed
                };
                Ok((Some(reply), event))
            }
            Err(SMPFault::Randomness) => Err(OTRError::RandomnessFailure),
            Err(SMPFault::Violation) => Ok(self.protocol_abort()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_message3(
        rand: &dyn RandomSource,
        g3a: &BigUint,
        g2: &BigUint,
        g3: &BigUint,
        b3: &BigUint,
        pb: &BigUint,
        qb: &BigUint,
        tlv: &TLV,
    ) -> Result<(TLV, bool), SMPFault> {
        let g1 = DH::generator();
        let mut mpis = OTRDecoder::new(&tlv.1)
            .read_mpi_sequence()
            .or(Err(SMPFault::Violation))?;
        if mpis.len() != 8 {
            return Err(SMPFault::Violation);
        }
        let d7 = mpis.pop().expect("BUG: element count verified above");
        let cr = mpis.pop().expect("BUG: element count verified above");
        let ra = mpis.pop().expect("BUG: element count verified above");
        let d6 = mpis.pop().expect("BUG: element count verified above");
        let d5 = mpis.pop().expect("BUG: element count verified above");
        let cp = mpis.pop().expect("BUG: element count verified above");
        let qa = mpis.pop().expect("BUG: element count verified above");
        let pa = mpis.pop().expect("BUG: element count verified above");
        DH::verify_public_key(&pa)?;
        DH::verify_public_key(&qa)?;
        DH::verify_public_key(&ra)?;
        let expected_cp = hash2(
            6,
            &mulmod(&g3.modpow(&d5, &DH::MODULUS), &pa.modpow(&cp, &DH::MODULUS)),
            &mulmod3(
                &g1.modpow(&d5, &DH::MODULUS),
                &g2.modpow(&d6, &DH::MODULUS),
                &qa.modpow(&cp, &DH::MODULUS),
            ),
        );
        verify(&expected_cp, &cp)?;
        let qa_over_qb = mulmod(&qa, &invert(qb));
        let expected_cr = hash2(
            7,
            &mulmod(
                &g1.modpow(&d7, &DH::MODULUS),
                &g3a.modpow(&cr, &DH::MODULUS),
            ),
            &mulmod(
                &qa_over_qb.modpow(&d7, &DH::MODULUS),
                &ra.modpow(&cr, &DH::MODULUS),
            ),
        );
        verify(&expected_cr, &cr)?;
        let r7 = random_exponent_fault(rand)?;
        let rb = qa_over_qb.modpow(b3, &DH::MODULUS);
        let cr_b = hash2(
            8,
            &g1.modpow(&r7, &DH::MODULUS),
            &qa_over_qb.modpow(&r7, &DH::MODULUS),
        );
        let d7_b = sub_order(&r7, &(b3 * &cr_b));
        let payload = OTREncoder::new()
            .write_mpi_sequence(&[&rb, &cr_b, &d7_b])
            .to_vec();
        // The equality test: Rab must match Pa / Pb.
        let rab = ra.modpow(b3, &DH::MODULUS);
        let pa_over_pb = mulmod(&pa, &invert(pb));
        Ok((TLV(TLV_TYPE_SMP_MESSAGE_4, payload), rab == pa_over_pb))
    }

    fn handle_message4(&mut self, tlv: &TLV) -> Result<(Option<TLV>, SMPEvent), OTRError> {
        let (g3b, pa_over_pb, qa_over_qb, a3) = match &self.state {
            SMPState::Expect4 {
                g3b,
                pa_over_pb,
                qa_over_qb,
                a3,
            } => (
                g3b.clone(),
                pa_over_pb.clone(),
                qa_over_qb.clone(),
                a3.clone(),
            ),
            _ => return Ok(self.protocol_abort()),
        };
        let result = Self::process_message4(&g3b, &pa_over_pb, &qa_over_qb, &a3, tlv);
        self.state = SMPState::Expect1;
        match result {
            Ok(success) => {
                let event = if success {
                    log::info!("SMP exchange completed: secrets are equal.");
                    SMPEvent::Completed
                } else {
                    log::info!("SMP exchange completed: secrets differ.");
                    SMPEvent::Failed
                };
                Ok((None, event))
            }
            Err(SMPFault::Randomness) => Err(OTRError::RandomnessFailure),
            Err(SMPFault::Violation) => Ok(self.protocol_abort()),
        }
    }

    fn process_message4(
        g3b: &BigUint,
        pa_over_pb: &BigUint,
        qa_over_qb: &BigUint,
        a3: &BigUint,
        tlv: &TLV,
    ) -> Result<bool, SMPFault> {
        let g1 = DH::generator();
        let mut mpis = OTRDecoder::new(&tlv.1)
            .read_mpi_sequence()
            .or(Err(SMPFault::Violation))?;
        if mpis.len() != 3 {
            return Err(SMPFault::Violation);
        }
        let d7 = mpis.pop().expect("BUG: element count verified above");
        let cr = mpis.pop().expect("BUG: element count verified above");
        let rb = mpis.pop().expect("BUG: element count verified above");
        DH::verify_public_key(&rb)?;
        let expected_cr = hash2(
            8,
            &mulmod(
                &g1.modpow(&d7, &DH::MODULUS),
                &g3b.modpow(&cr, &DH::MODULUS),
            ),
            &mulmod(
                &qa_over_qb.modpow(&d7, &DH::MODULUS),
                &rb.modpow(&cr, &DH::MODULUS),
            ),
        );
        verify(&expected_cr, &cr)?;
        let rab = rb.modpow(a3, &DH::MODULUS);
        Ok(&rab == pa_over_pb)
    }

    /// protocol_abort indiscriminately resets the state and produces an abort record for the
    /// other party.
    fn protocol_abort(&mut self) -> (Option<TLV>, SMPEvent) {
        let active = !matches!(self.state, SMPState::Expect1);
        self.state = SMPState::Expect1;
        log::info!("SMP exchange aborted.");
        (
            Some(TLV(TLV_TYPE_SMP_ABORT, Vec::new())),
            if active { SMPEvent::Failed } else { SMPEvent::None },
        )
    }
}

/// The shared secret under test: SHA256 over the protocol version byte, the initiator's and
/// responder's fingerprints, the session identifier and the user-supplied secret, concatenated.
fn compute_secret(
    initiator: &Fingerprint,
    responder: &Fingerprint,
    ssid: &SSID,
    secret: &[u8],
) -> BigUint {
    let mut buffer = vec![1u8];
    buffer.extend_from_slice(initiator);
    buffer.extend_from_slice(responder);
    buffer.extend_from_slice(ssid);
    buffer.extend_from_slice(secret);
    BigUint::from_bytes_be(&SHA256::digest(&buffer))
}

fn hash1(version: u8, mpi: &BigUint) -> BigUint {
    let data = OTREncoder::new().write_mpi(mpi).to_vec();
    BigUint::from_bytes_be(&SHA256::digest_with_prefix(version, &data))
}

fn hash2(version: u8, mpi1: &BigUint, mpi2: &BigUint) -> BigUint {
    let data = OTREncoder::new().write_mpi(mpi1).write_mpi(mpi2).to_vec();
    BigUint::from_bytes_be(&SHA256::digest_with_prefix(version, &data))
}

fn mulmod(v1: &BigUint, v2: &BigUint) -> BigUint {
    (v1 * v2) % &*DH::MODULUS
}

fn mulmod3(v1: &BigUint, v2: &BigUint, v3: &BigUint) -> BigUint {
    (v1 * v2 * v3) % &*DH::MODULUS
}

/// invert computes the multiplicative inverse modulo the (prime) group modulus.
fn invert(v: &BigUint) -> BigUint {
    v.modpow(&DH::MODULUS_MINUS_TWO, &DH::MODULUS)
}

/// sub_order computes `r - product` modulo the subgroup order, i.e. in the exponent group.
fn sub_order(r: &BigUint, product: &BigUint) -> BigUint {
    let order = BigInt::from((*ORDER).clone());
    let d = (BigInt::from(r.clone()) - BigInt::from(product.clone())).mod_floor(&order);
    d.to_biguint()
        .expect("BUG: mod_floor of a positive modulus is non-negative")
}

fn random_exponent(rand: &dyn RandomSource) -> Result<BigUint, OTRError> {
    let mut bytes = [0u8; RANDOM_EXPONENT_LEN];
    rand.fill(&mut bytes).map_err(OTRError::from)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn random_exponent_fault(rand: &dyn RandomSource) -> Result<BigUint, SMPFault> {
    let mut bytes = [0u8; RANDOM_EXPONENT_LEN];
    rand.fill(&mut bytes)
        .or(Err(SMPFault::Randomness))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn verify(expected: &BigUint, actual: &BigUint) -> Result<(), SMPFault> {
    if expected == actual {
        Ok(())
    } else {
        Err(SMPFault::Violation)
    }
}

enum SMPFault {
    Violation,
    Randomness,
}

impl From<CryptoError> for SMPFault {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::RandomnessFailure => SMPFault::Randomness,
            CryptoError::VerificationFailure(_) => SMPFault::Violation,
        }
    }
}

enum SMPState {
    Expect1,
    /// The other party initiated; the verified commitment is held until the host supplies the
    /// secret.
    AwaitingUserSecret {
        g2a: BigUint,
        g3a: BigUint,
        question: Vec<u8>,
    },
    Expect2 {
        x: BigUint,
        a2: BigUint,
        a3: BigUint,
    },
    Expect3 {
        g3a: BigUint,
        g2: BigUint,
        g3: BigUint,
        b3: BigUint,
        pb: BigUint,
        qb: BigUint,
    },
    Expect4 {
        g3b: BigUint,
        pa_over_pb: BigUint,
        qa_over_qb: BigUint,
        a3: BigUint,
    },
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::{is_smp_tlv, SMPContext, SMPEvent, TLV_TYPE_SMP_ABORT, TLV_TYPE_SMP_MESSAGE_1};
    use crate::encoding::TLV;
    use crate::host::testing::TestRandom;

    fn contexts(seed: u64) -> (SMPContext, SMPContext) {
        let ssid = [7u8; 8];
        let alice_fp = [0xaau8; 20];
        let bob_fp = [0xbbu8; 20];
        let alice = SMPContext::new(Rc::new(TestRandom::new(seed)), ssid, alice_fp, bob_fp);
        let bob = SMPContext::new(Rc::new(TestRandom::new(seed + 1)), ssid, bob_fp, alice_fp);
        (alice, bob)
    }

    fn run_exchange(
        alice: &mut SMPContext,
        bob: &mut SMPContext,
        alice_secret: &[u8],
        bob_secret: &[u8],
    ) -> (SMPEvent, SMPEvent) {
        let msg1 = alice.initiate(b"", alice_secret).unwrap();
        let (reply, event) = bob.handle(&msg1).unwrap();
        assert!(reply.is_none());
        assert_eq!(SMPEvent::SecretNeeded, event);
        let msg2 = bob.respond(bob_secret).unwrap();
        let (msg3, event) = alice.handle(&msg2).unwrap();
        assert_eq!(SMPEvent::None, event);
        let (msg4, bob_outcome) = bob.handle(&msg3.unwrap()).unwrap();
        let (reply, alice_outcome) = alice.handle(&msg4.unwrap()).unwrap();
        assert!(reply.is_none());
        (alice_outcome, bob_outcome)
    }

    #[test]
    fn smp_succeeds_on_equal_secrets() {
        let (mut alice, mut bob) = contexts(1000);
        let (alice_outcome, bob_outcome) =
            run_exchange(&mut alice, &mut bob, b"hunter2", b"hunter2");
        assert_eq!(SMPEvent::Completed, alice_outcome);
        assert_eq!(SMPEvent::Completed, bob_outcome);
    }

    #[test]
    fn smp_fails_on_differing_secrets() {
        let (mut alice, mut bob) = contexts(2000);
        let (alice_outcome, bob_outcome) =
            run_exchange(&mut alice, &mut bob, b"hunter2", b"*******");
        assert_eq!(SMPEvent::Failed, alice_outcome);
        assert_eq!(SMPEvent::Failed, bob_outcome);
    }

    #[test]
    fn smp_reusable_after_completion() {
        let (mut alice, mut bob) = contexts(3000);
        run_exchange(&mut alice, &mut bob, b"first", b"first");
        let (alice_outcome, bob_outcome) =
            run_exchange(&mut alice, &mut bob, b"second", b"second");
        assert_eq!(SMPEvent::Completed, alice_outcome);
        assert_eq!(SMPEvent::Completed, bob_outcome);
    }

    #[test]
    fn smp_question_buffered_for_host() {
        let (mut alice, mut bob) = contexts(4000);
        let msg1 = alice.initiate(b"first pet's name?", b"rex").unwrap();
        assert!(alice.question().is_none());
        let (_, event) = bob.handle(&msg1).unwrap();
        assert_eq!(SMPEvent::SecretNeeded, event);
        assert!(bob.awaiting_secret());
        assert_eq!("first pet's name?", bob.question().unwrap());
    }

    #[test]
    fn smp_out_of_state_message_aborts() {
        let (mut alice, mut bob) = contexts(5000);
        let msg1 = alice.initiate(b"", b"secret").unwrap();
        bob.handle(&msg1).unwrap();
        // a second initiation arrives while the first is still pending a secret.
        let (reply, event) = bob.handle(&msg1).unwrap();
        assert_eq!(TLV_TYPE_SMP_ABORT, reply.unwrap().0);
        assert_eq!(SMPEvent::Failed, event);
        assert!(!bob.awaiting_secret());
    }

    #[test]
    fn smp_abort_resets_pending_state() {
        let (mut alice, mut bob) = contexts(6000);
        let msg1 = alice.initiate(b"", b"secret").unwrap();
        bob.handle(&msg1).unwrap();
        let (reply, event) = bob.handle(&TLV(TLV_TYPE_SMP_ABORT, Vec::new())).unwrap();
        assert!(reply.is_none());
        assert_eq!(SMPEvent::Failed, event);
        // the responder can start over afterwards.
        assert!(bob.initiate(b"", b"secret").is_ok());
    }

    #[test]
    fn smp_initiate_rejected_while_in_progress() {
        let (mut alice, _) = contexts(7000);
        alice.initiate(b"", b"secret").unwrap();
        assert!(alice.initiate(b"", b"secret").is_err());
    }

    #[test]
    fn smp_corrupted_first_message_aborts() {
        let (mut alice, mut bob) = contexts(8000);
        let mut msg1 = alice.initiate(b"", b"secret").unwrap();
        // strip one MPI off the sequence.
        msg1.1.truncate(msg1.1.len() / 2);
        let (reply, event) = bob.handle(&msg1).unwrap();
        assert_eq!(TLV_TYPE_SMP_ABORT, reply.unwrap().0);
        assert_eq!(SMPEvent::None, event);
    }

    #[test]
    fn smp_tlv_recognition() {
        assert!(is_smp_tlv(&TLV(TLV_TYPE_SMP_MESSAGE_1, Vec::new())));
        assert!(is_smp_tlv(&TLV(6, Vec::new())));
        assert!(is_smp_tlv(&TLV(7, Vec::new())));
        assert!(!is_smp_tlv(&TLV(0, Vec::new())));
        assert!(!is_smp_tlv(&TLV(1, Vec::new())));
        assert!(!is_smp_tlv(&TLV(8, Vec::new())));
    }
}
