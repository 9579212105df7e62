// SPDX-License-Identifier: LGPL-3.0-only

use std::convert::TryInto;
use std::rc::Rc;

use num_bigint::BigUint;

use crate::{
    crypto::{constant, CryptoError, AES128, DH, DSA, OTR::AKESecrets, SHA256},
    encoding::{OTRDecoder, OTREncodable, OTREncoder, MAC, SSID},
    host::RandomSource,
    messages::EncodedMessageType,
    utils, OTRError, Version,
};

/// The initial keyid of the DH key that each party contributes during the key exchange.
const KEYID_INITIAL: u32 = 1;

pub struct AKEContext {
    version: Version,
    state: AKEState,
}

impl AKEContext {
    pub fn new() -> Self {
        Self {
            version: Version::V3,
            state: AKEState::None,
        }
    }

    pub fn version(&self) -> Version {
        self.version.clone()
    }

    pub fn status(&self) -> AKEStatus {
        match self.state {
            AKEState::None => AKEStatus::None,
            AKEState::AwaitingDHKey(_) => AKEStatus::AwaitingDHKey,
            AKEState::AwaitingRevealSignature(_) => AKEStatus::AwaitingRevealSignature,
            AKEState::AwaitingSignature(_) => AKEStatus::AwaitingSignature,
        }
    }

    /// initiate starts a fresh key exchange for the specified protocol version by producing a
    /// DH-Commit message.
    pub fn initiate(
        &mut self,
        rand: &dyn RandomSource,
        version: Version,
    ) -> Result<EncodedMessageType, AKEError> {
        log::info!("Initiating AKE.");
        let keypair = DH::Keypair::generate(rand).map_err(AKEError::CryptographicViolation)?;
        let r = AES128::Key::generate(rand).map_err(AKEError::CryptographicViolation)?;
        let gxmpi = OTREncoder::new().write_mpi(&keypair.public).to_vec();
        let gx_encrypted = r.encrypt(&[0; 16], &gxmpi);
        let gx_hashed = SHA256::digest(&gxmpi).to_vec();
        // Send D-H Commit message and await D-H Key message.
        self.version = version;
        self.state = AKEState::AwaitingDHKey(AwaitingDHKey {
            our_dh_keypair: Rc::new(keypair),
            r,
        });
        Ok(EncodedMessageType::DHCommit(DHCommitMessage {
            gx_encrypted,
            gx_hashed,
        }))
    }

    pub fn handle_dhcommit(
        &mut self,
        rand: &dyn RandomSource,
        version: Version,
        msg: DHCommitMessage,
    ) -> Result<EncodedMessageType, AKEError> {
        let (result, transition) = match &self.state {
            AKEState::None => Self::handle_dhcommit_from_initial(rand, msg)?,
            AKEState::AwaitingDHKey(state) => {
                // This is the trickiest transition in the whole protocol. It indicates that you
                // have already sent a D-H Commit message to your correspondent, but that he either
                // didn't receive it, or just didn't receive it yet, and has sent you one as well.
                // The symmetry will be broken by comparing the hashed gx you sent in your
                // D-H Commit Message with the one you received, considered as 32-byte unsigned
                // big-endian values.
                let gxmpi = OTREncoder::new()
                    .write_mpi(&state.our_dh_keypair.public)
                    .to_vec();
                let our_gxmpi_hashed = SHA256::digest(&gxmpi);
                let our_hash = BigUint::from_bytes_be(&our_gxmpi_hashed);
                let their_hash = BigUint::from_bytes_be(&msg.gx_hashed);
                if our_hash > their_hash {
                    // Ignore the incoming D-H Commit message, but resend your D-H Commit message.
                    let our_gx_encrypted = state.r.encrypt(&[0u8; 16], &gxmpi);
                    let dhcommit = EncodedMessageType::DHCommit(DHCommitMessage {
                        gx_encrypted: our_gx_encrypted,
                        gx_hashed: Vec::from(our_gxmpi_hashed),
                    });
                    (dhcommit, None)
                } else {
                    // Forget your old gx value that you sent (encrypted) earlier, and pretend you
                    // are in AUTHSTATE_NONE; i.e. reply with a D-H Key Message, and transition
                    // authstate to AUTHSTATE_AWAITING_REVEALSIG.
                    Self::handle_dhcommit_from_initial(rand, msg)?
                }
            }
            AKEState::AwaitingRevealSignature(state) => {
                // Retransmit your D-H Key Message (the same one as you sent when you entered
                // AUTHSTATE_AWAITING_REVEALSIG). Forget the old D-H Commit message, and use this
                // new one instead.
                // There are a number of reasons this might happen, including:
                // - Your correspondent simply started a new AKE.
                // - Your correspondent resent his D-H Commit message, as specified above.
                // - On some networks, like AIM, if your correspondent is logged in multiple times,
                //   each of his clients will send a D-H Commit Message in response to a
                //   Query Message; resending the same D-H Key Message in response to each of those
                //   messages will prevent compounded confusion, since each of his clients will see
                //   each of the D-H Key Messages you send. [And the problem gets even worse if you
                //   are each logged in multiple times.]
                let dhkey = EncodedMessageType::DHKey(DHKeyMessage {
                    gy: state.our_dh_keypair.public.clone(),
                });
                (
                    dhkey,
                    Some(AKEState::AwaitingRevealSignature(AwaitingRevealSignature {
                        our_dh_keypair: Rc::clone(&state.our_dh_keypair),
                        gx_encrypted: msg.gx_encrypted,
                        gx_hashed: msg.gx_hashed,
                    })),
                )
            }
            AKEState::AwaitingSignature(_) => {
                // Reply with a new D-H Key message, and transition authstate to
                // AUTHSTATE_AWAITING_REVEALSIG.
                Self::handle_dhcommit_from_initial(rand, msg)?
            }
        };
        if let Some(next) = transition {
            self.version = version;
            self.state = next;
        }
        Ok(result)
    }

    fn handle_dhcommit_from_initial(
        rand: &dyn RandomSource,
        msg: DHCommitMessage,
    ) -> Result<(EncodedMessageType, Option<AKEState>), AKEError> {
        // Reply with a D-H Key Message, and transition authstate to AUTHSTATE_AWAITING_REVEALSIG.
        let keypair = DH::Keypair::generate(rand).map_err(AKEError::CryptographicViolation)?;
        let dhkey = EncodedMessageType::DHKey(DHKeyMessage {
            gy: keypair.public.clone(),
        });
        Ok((
            dhkey,
            Some(AKEState::AwaitingRevealSignature(AwaitingRevealSignature {
                our_dh_keypair: Rc::new(keypair),
                gx_encrypted: msg.gx_encrypted,
                gx_hashed: msg.gx_hashed,
            })),
        ))
    }

    pub fn handle_dhkey(
        &mut self,
        rand: &dyn RandomSource,
        our_longterm_keypair: &DSA::Keypair,
        msg: DHKeyMessage,
    ) -> Result<EncodedMessageType, AKEError> {
        let (result, transition) = match &self.state {
            AKEState::None | AKEState::AwaitingRevealSignature(_) => {
                // Ignore the message.
                return Err(AKEError::MessageIgnored);
            }
            AKEState::AwaitingDHKey(state) => {
                match Self::generate_reveal_signature(rand, our_longterm_keypair, state, &msg.gy) {
                    Ok((reveal_sig_message, s)) => (
                        Ok(EncodedMessageType::RevealSignature(
                            reveal_sig_message.clone(),
                        )),
                        Some(AKEState::AwaitingSignature(AwaitingSignature {
                            our_dh_keypair: Rc::clone(&state.our_dh_keypair),
                            gy: msg.gy,
                            s,
                            previous_message: reveal_sig_message,
                        })),
                    ),
                    // A wire-level failure abandons the exchange in progress.
                    Err(error) => (Err(error), Some(AKEState::None)),
                }
            }
            AKEState::AwaitingSignature(state) => {
                if state.gy != msg.gy {
                    // Ignore the message.
                    return Err(AKEError::MessageIgnored);
                }
                (
                    Ok(EncodedMessageType::RevealSignature(
                        state.previous_message.clone(),
                    )),
                    None,
                )
            }
        };
        if let Some(next) = transition {
            self.state = next;
        }
        result
    }

    fn generate_reveal_signature(
        rand: &dyn RandomSource,
        our_longterm_keypair: &DSA::Keypair,
        state: &AwaitingDHKey,
        gy: &BigUint,
    ) -> Result<(RevealSignatureMessage, DH::SharedSecret), AKEError> {
        DH::verify_public_key(gy).map_err(AKEError::CryptographicViolation)?;
        // Reply with a Reveal Signature Message and transition authstate to
        // AUTHSTATE_AWAITING_SIG.
        let s = state.our_dh_keypair.generate_shared_secret(gy);
        let secrets = AKESecrets::derive(&OTREncoder::new().write_mpi(&s).to_vec());
        let pub_b = our_longterm_keypair.public_key();
        let m_b = SHA256::hmac(
            &secrets.m1,
            &OTREncoder::new()
                .write_mpi(&state.our_dh_keypair.public)
                .write_mpi(gy)
                .write_public_key(&pub_b)
                .write_int(KEYID_INITIAL)
                .to_vec(),
        );
        // "This is the signature, using the private part of the key pubB, of the 32-byte MB
        //  (taken modulo q instead of being truncated (as described in FIPS-186), and not
        //  hashed again)."
        let sig_b = our_longterm_keypair
            .sign(rand, &m_b)
            .map_err(AKEError::CryptographicViolation)?;
        log::trace!("M_B: {:?}", &m_b);
        let x_b = OTREncoder::new()
            .write_public_key(&pub_b)
            .write_int(KEYID_INITIAL)
            .write_signature(&sig_b)
            .to_vec();
        let enc_b = secrets.c.encrypt(&[0; 16], &x_b);
        let mac_enc_b = SHA256::hmac160(
            &secrets.m2,
            &OTREncoder::new().write_data(&enc_b).to_vec(),
        );
        Ok((
            RevealSignatureMessage {
                key: state.r.clone(),
                signature_encrypted: enc_b,
                signature_mac: mac_enc_b,
            },
            s,
        ))
    }

    pub fn handle_reveal_signature(
        &mut self,
        rand: &dyn RandomSource,
        our_longterm_keypair: &DSA::Keypair,
        msg: RevealSignatureMessage,
    ) -> Result<(CryptographicMaterial, EncodedMessageType), AKEError> {
        let state = match &self.state {
            AKEState::None | AKEState::AwaitingDHKey(_) | AKEState::AwaitingSignature(_) => {
                // Ignore the message.
                return Err(AKEError::MessageIgnored);
            }
            AKEState::AwaitingRevealSignature(state) => AwaitingRevealSignature {
                our_dh_keypair: Rc::clone(&state.our_dh_keypair),
                gx_encrypted: state.gx_encrypted.clone(),
                gx_hashed: state.gx_hashed.clone(),
            },
        };
        // Any failure from here on abandons the exchange in progress: the sub-state returns to
        // the initial state while an already established encrypted session, if any, is unaffected.
        self.state = AKEState::None;
        log::debug!("start: handling RevealSignatureMessage");
        // Use the received value of r to decrypt the value of gx received in the D-H Commit
        // Message, and verify the hash therein. Decrypt the encrypted signature, and verify the
        // signature and the MACs. If everything checks out:
        // - Reply with a Signature Message.
        // - Transition authstate to AUTHSTATE_NONE.
        // - Transition msgstate to MSGSTATE_ENCRYPTED.
        let gxmpi = msg.key.decrypt(&[0; 16], &state.gx_encrypted);
        let gxmpihash = SHA256::digest(&gxmpi);
        constant::verify(&gxmpihash, &state.gx_hashed).or(Err(AKEError::CryptographicViolation(
            CryptoError::VerificationFailure("gx corrupt after decryption"),
        )))?;
        log::debug!("gxmpi verified: correct");

        // Acquire and verify the g^x value committed to earlier.
        let mut gxdecoder = OTRDecoder::new(&gxmpi);
        let gx = gxdecoder.read_mpi().or(Err(AKEError::CryptographicViolation(
            CryptoError::VerificationFailure("gx corrupt after decryption"),
        )))?;
        gxdecoder.done().or(Err(AKEError::CryptographicViolation(
            CryptoError::VerificationFailure("gx corrupt after decryption"),
        )))?;
        DH::verify_public_key(&gx).map_err(AKEError::CryptographicViolation)?;
        log::debug!("gx verified: correct");

        // Validate the encrypted signature using the MAC based on m2, ensuring the signature
        // content is unchanged.
        let s = state.our_dh_keypair.generate_shared_secret(&gx);
        let secrets = AKESecrets::derive(&OTREncoder::new().write_mpi(&s).to_vec());
        let expected_signature_mac = SHA256::hmac160(
            &secrets.m2,
            &OTREncoder::new()
                .write_data(&msg.signature_encrypted)
                .to_vec(),
        );
        constant::verify(&expected_signature_mac, &msg.signature_mac)
            .map_err(AKEError::CryptographicViolation)?;
        log::debug!("signature MAC verified: correct");

        // Acquire the peer's identity material from the encrypted x_b.
        let x_b = secrets.c.decrypt(&[0; 16], &msg.signature_encrypted);
        let mut decoder = OTRDecoder::new(&x_b);
        let pub_b = decoder.read_public_key().or(Err(AKEError::DataProcessing(
            "Failed to read public key from X_B",
        )))?;
        let keyid_b = decoder.read_int().or(Err(AKEError::DataProcessing(
            "Failed to read keyid from X_B",
        )))?;
        utils::u32::verify_nonzero(
            keyid_b,
            AKEError::DataProcessing("keyid_b is zero, must be non-zero value"),
        )?;
        let sig_b = decoder.read_signature().or(Err(AKEError::DataProcessing(
            "Failed to read signature from X_B",
        )))?;
        decoder
            .done()
            .or(Err(AKEError::DataProcessing("data left over in buffer")))?;
        // Reconstruct and verify m_b against the peer's signature, to ensure the identity
        // material is unchanged.
        let m_b = SHA256::hmac(
            &secrets.m1,
            &OTREncoder::new()
                .write_mpi(&gx)
                .write_mpi(&state.our_dh_keypair.public)
                .write_public_key(&pub_b)
                .write_int(keyid_b)
                .to_vec(),
        );
        pub_b
            .verify(&sig_b, &m_b)
            .map_err(AKEError::CryptographicViolation)?;
        log::debug!("M_B verified: correct");

        let pub_a = our_longterm_keypair.public_key();
        let m_a = SHA256::hmac(
            &secrets.m1p,
            &OTREncoder::new()
                .write_mpi(&state.our_dh_keypair.public)
                .write_mpi(&gx)
                .write_public_key(&pub_a)
                .write_int(KEYID_INITIAL)
                .to_vec(),
        );
        let sig_m_a = our_longterm_keypair
            .sign(rand, &m_a)
            .map_err(AKEError::CryptographicViolation)?;
        let x_a = OTREncoder::new()
            .write_public_key(&pub_a)
            .write_int(KEYID_INITIAL)
            .write_signature(&sig_m_a)
            .to_vec();
        let encrypted_signature = secrets.cp.encrypt(&[0; 16], &x_a);
        let encrypted_mac = SHA256::hmac160(
            &secrets.m2p,
            &OTREncoder::new().write_data(&encrypted_signature).to_vec(),
        );
        log::debug!("Signature encrypted and MAC'd");
        Ok((
            CryptographicMaterial {
                version: self.version.clone(),
                ssid: secrets.ssid,
                our_dh: (*state.our_dh_keypair).clone(),
                their_dh: gx,
                their_dsa: pub_b,
            },
            EncodedMessageType::Signature(SignatureMessage {
                signature_encrypted: encrypted_signature,
                signature_mac: encrypted_mac,
            }),
        ))
    }

    pub fn handle_signature(
        &mut self,
        msg: SignatureMessage,
    ) -> Result<CryptographicMaterial, AKEError> {
        let state = match &self.state {
            AKEState::None | AKEState::AwaitingDHKey(_) | AKEState::AwaitingRevealSignature(_) => {
                // Ignore the message.
                return Err(AKEError::MessageIgnored);
            }
            AKEState::AwaitingSignature(state) => AwaitingSignature {
                our_dh_keypair: Rc::clone(&state.our_dh_keypair),
                gy: state.gy.clone(),
                s: state.s.clone(),
                previous_message: state.previous_message.clone(),
            },
        };
        self.state = AKEState::None;
        log::debug!("Start handling SignatureMessage.");
        // Decrypt the encrypted signature, and verify the signature and the MACs. If everything
        // checks out:
        // - Transition authstate to AUTHSTATE_NONE.
        // - Transition msgstate to MSGSTATE_ENCRYPTED.
        let secrets = AKESecrets::derive(&OTREncoder::new().write_mpi(&state.s).to_vec());
        let mac = SHA256::hmac160(
            &secrets.m2p,
            &OTREncoder::new()
                .write_data(&msg.signature_encrypted)
                .to_vec(),
        );
        constant::verify(&msg.signature_mac, &mac).map_err(AKEError::CryptographicViolation)?;
        log::debug!("Signature MAC verified.");
        let x_a = secrets.cp.decrypt(&[0; 16], &msg.signature_encrypted);
        let mut decoder = OTRDecoder::new(&x_a);
        let pub_a = decoder.read_public_key().or(Err(AKEError::DataProcessing(
            "Failed to read public key from X_A",
        )))?;
        let keyid_a = decoder.read_int().or(Err(AKEError::DataProcessing(
            "Failed to read keyid from X_A",
        )))?;
        utils::u32::verify_nonzero(
            keyid_a,
            AKEError::DataProcessing("keyid_a is zero, must be a non-zero value"),
        )?;
        let sig_m_a = decoder.read_signature().or(Err(AKEError::DataProcessing(
            "Failed to read signature from X_A",
        )))?;
        decoder
            .done()
            .or(Err(AKEError::DataProcessing("data left over in buffer")))?;
        let m_a = SHA256::hmac(
            &secrets.m1p,
            &OTREncoder::new()
                .write_mpi(&state.gy)
                .write_mpi(&state.our_dh_keypair.public)
                .write_public_key(&pub_a)
                .write_int(keyid_a)
                .to_vec(),
        );
        pub_a
            .verify(&sig_m_a, &m_a)
            .map_err(AKEError::CryptographicViolation)?;
        log::debug!("M_A signature verified.");
        Ok(CryptographicMaterial {
            version: self.version.clone(),
            ssid: secrets.ssid,
            our_dh: (*state.our_dh_keypair).clone(),
            their_dh: state.gy.clone(),
            their_dsa: pub_a,
        })
    }
}

/// `CryptographicMaterial` contains the cryptographic material acquired during the AKE.
///
/// The AKE always uses keyid 1 for both parties, so no point in including these.
pub struct CryptographicMaterial {
    pub version: Version,
    pub ssid: SSID,
    pub our_dh: DH::Keypair,
    pub their_dh: BigUint,
    pub their_dsa: DSA::PublicKey,
}

/// `AKEStatus` is the name of the current AKE sub-state, without its internal data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AKEStatus {
    None,
    AwaitingDHKey,
    AwaitingRevealSignature,
    AwaitingSignature,
}

/// `AKEState` represents available/recognized AKE states.
enum AKEState {
    /// None indicates no AKE is in progress.
    None,
    /// AwaitingDHKey state contains data as present/needed upon transitioning to this state.
    AwaitingDHKey(AwaitingDHKey),
    /// AwaitingRevealSignature state contains data up to transitioning to this state.
    AwaitingRevealSignature(AwaitingRevealSignature),
    /// AwaitingSignature contains data up to transitioning to this state.
    AwaitingSignature(AwaitingSignature),
}

struct AwaitingDHKey {
    r: AES128::Key,
    our_dh_keypair: Rc<DH::Keypair>,
}

struct AwaitingRevealSignature {
    our_dh_keypair: Rc<DH::Keypair>,
    gx_encrypted: Vec<u8>,
    gx_hashed: Vec<u8>,
}

struct AwaitingSignature {
    our_dh_keypair: Rc<DH::Keypair>,
    gy: BigUint,
    s: DH::SharedSecret,
    previous_message: RevealSignatureMessage,
}

/// `AKEError` contains the variants of errors produced during AKE.
#[derive(Debug, PartialEq, Eq)]
pub enum AKEError {
    /// AKE message processing produced an error due to a cryptographic violation.
    CryptographicViolation(CryptoError),
    /// AKE message ignored due to it arriving in violation of protocol.
    MessageIgnored,
    /// AKE message input is incomplete or otherwise non-conforming. Errors were encountered
    /// while reading out message components.
    DataProcessing(&'static str),
}

pub struct DHCommitMessage {
    pub gx_encrypted: Vec<u8>,
    pub gx_hashed: Vec<u8>,
}

impl DHCommitMessage {
    pub fn decode(decoder: &mut OTRDecoder) -> Result<DHCommitMessage, OTRError> {
        Ok(DHCommitMessage {
            gx_encrypted: decoder.read_data()?,
            gx_hashed: decoder.read_data()?,
        })
    }
}

impl OTREncodable for DHCommitMessage {
    fn encode(&self, encoder: &mut OTREncoder) {
        encoder
            .write_data(&self.gx_encrypted)
            .write_data(&self.gx_hashed);
    }
}

pub struct DHKeyMessage {
    pub gy: BigUint,
}

impl DHKeyMessage {
    pub fn decode(decoder: &mut OTRDecoder) -> Result<DHKeyMessage, OTRError> {
        Ok(DHKeyMessage {
            gy: decoder.read_mpi()?,
        })
    }
}

impl OTREncodable for DHKeyMessage {
    fn encode(&self, encoder: &mut OTREncoder) {
        encoder.write_mpi(&self.gy);
    }
}

#[derive(Clone)]
pub struct RevealSignatureMessage {
    pub key: AES128::Key,
    pub signature_encrypted: Vec<u8>,
    pub signature_mac: MAC,
}

impl RevealSignatureMessage {
    pub fn decode(decoder: &mut OTRDecoder) -> Result<RevealSignatureMessage, OTRError> {
        Ok(RevealSignatureMessage {
            key: AES128::Key(decoder.read_data()?.try_into().or(Err(
                OTRError::ProtocolViolation("Invalid format for 128-bit AES key."),
            ))?),
            signature_encrypted: decoder.read_data()?,
            signature_mac: decoder.read_mac()?,
        })
    }
}

impl OTREncodable for RevealSignatureMessage {
    fn encode(&self, encoder: &mut OTREncoder) {
        encoder
            .write_data(&self.key.0)
            .write_data(&self.signature_encrypted)
            .write_mac(&self.signature_mac);
    }
}

#[derive(Clone)]
pub struct SignatureMessage {
    pub signature_encrypted: Vec<u8>,
    pub signature_mac: MAC,
}

impl SignatureMessage {
    pub fn decode(decoder: &mut OTRDecoder) -> Result<SignatureMessage, OTRError> {
        Ok(SignatureMessage {
            signature_encrypted: decoder.read_data()?,
            signature_mac: decoder.read_mac()?,
        })
    }
}

impl OTREncodable for SignatureMessage {
    fn encode(&self, encoder: &mut OTREncoder) {
        encoder
            .write_data(&self.signature_encrypted)
            .write_mac(&self.signature_mac);
    }
}
