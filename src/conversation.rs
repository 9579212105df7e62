// SPDX-License-Identifier: LGPL-3.0-only

use std::rc::Rc;

use crate::{
    ake::{AKEContext, AKEError, AKEStatus, CryptographicMaterial},
    crypto::DSA,
    encoding::{MessageFlags, OTREncoder, SSID, TLV_TYPE_DISCONNECT, TLV_TYPE_PADDING},
    fragment::{self, Assembler, FragmentError},
    host::RandomSource,
    instancetag::{self, InstanceTag, INSTANCE_ZERO},
    messages::{self, DataMessage, EncodedMessage, EncodedMessageType, MessageType},
    protocol::{self, ProtocolState},
    smp::{self, SMPEvent},
    OTRError, Policy, ProtocolStatus, SecurityChange, Version,
};

/// Conversation is the per-correspondent protocol engine. It turns plaintext into an encrypted,
/// authenticated and deniable message stream and back again, negotiating protocol version 2 or 3
/// with the other party. All methods are synchronous; outgoing messages are returned to the
/// caller, in the order in which the other party must observe them.
pub struct Conversation {
    policy: Policy,
    rand: Rc<dyn RandomSource>,
    our_longterm: Option<Rc<DSA::Keypair>>,
    their_longterm: Option<DSA::PublicKey>,
    our_tag: InstanceTag,
    their_tag: InstanceTag,
    state: Box<dyn ProtocolState>,
    ake: AKEContext,
    assembler: Assembler,
    fragment_size: usize,
    /// messages stored for retransmission once the secure session is established.
    pending: Vec<Vec<u8>>,
    /// whether the whitespace tag was attached since last entering the plaintext state.
    tagged: bool,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation").finish_non_exhaustive()
    }
}

/// Received is the result of processing one incoming transport payload.
#[derive(Debug)]
pub struct Received {
    /// The human-readable content carried in the payload, if any.
    pub plaintext: Option<Vec<u8>>,
    /// Whether the returned plaintext was carried inside the encrypted channel.
    pub encrypted: bool,
    /// The change in the security state of the conversation, if any.
    pub change: SecurityChange,
    /// Replies that must be transmitted to the other party, in order.
    pub to_send: Vec<Vec<u8>>,
}

impl Received {
    fn none() -> Received {
        Received {
            plaintext: None,
            encrypted: false,
            change: SecurityChange::NoChange,
            to_send: Vec::new(),
        }
    }
}

impl Conversation {
    /// new creates a conversation in the plaintext state. The random source is the only
    /// dependency that must be present up front: it immediately provides the instance tag, and
    /// every subsequent key exchange draws from it.
    pub fn new(rand: Rc<dyn RandomSource>) -> Result<Conversation, OTRError> {
        let our_tag = instancetag::random_tag(&*rand)?;
        Ok(Conversation {
            policy: Policy::ALLOW_V2 | Policy::ALLOW_V3,
            rand,
            our_longterm: None,
            their_longterm: None,
            our_tag,
            their_tag: INSTANCE_ZERO,
            state: protocol::new_state(),
            ake: AKEContext::new(),
            assembler: Assembler::new(),
            fragment_size: 0,
            pending: Vec::new(),
            tagged: false,
        })
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = policy;
    }

    /// set_keypair supplies the long-term DSA keypair. Generation and storage of the keypair are
    /// the host's concern.
    pub fn set_keypair(&mut self, keypair: DSA::Keypair) {
        self.our_longterm = Some(Rc::new(keypair));
    }

    /// set_their_public_key presets the known long-term public key of the other party. The key
    /// learned during the key exchange replaces it; the trust decision remains with the host.
    pub fn set_their_public_key(&mut self, public_key: DSA::PublicKey) {
        self.their_longterm = Some(public_key);
    }

    /// set_fragment_size bounds the size of transmitted messages. Zero disables fragmentation.
    pub fn set_fragment_size(&mut self, size: usize) {
        self.fragment_size = size;
    }

    pub fn status(&self) -> ProtocolStatus {
        self.state.status()
    }

    pub fn is_encrypted(&self) -> bool {
        self.state.status() == ProtocolStatus::Encrypted
    }

    /// ssid is the secure session identifier of the active encrypted session, for the host to
    /// display in trust decisions.
    pub fn ssid(&self) -> Option<SSID> {
        self.state.ssid()
    }

    pub fn ake_status(&self) -> AKEStatus {
        self.ake.status()
    }

    pub fn our_instance_tag(&self) -> InstanceTag {
        self.our_tag
    }

    pub fn their_public_key(&self) -> Option<&DSA::PublicKey> {
        self.their_longterm.as_ref()
    }

    /// smp_question produces the challenge question of a pending peer-initiated SMP exchange.
    pub fn smp_question(&self) -> Option<String> {
        self.state.smp_question()
    }

    /// receive processes one payload from the transport: a fragment, an OTR-encoded message, a
    /// query or whitespace-tagged message, an OTR error, or plain text.
    pub fn receive(&mut self, message: &[u8]) -> Result<Received, OTRError> {
        if fragment::match_fragment(message) {
            let fragment = fragment::parse(message)
                .or(Err(OTRError::ProtocolViolation("Illegal or unsupported fragment.")))?;
            if fragment.receiver != INSTANCE_ZERO && fragment.receiver != self.our_tag {
                return Err(OTRError::MessageForOtherInstance);
            }
            return match self.assembler.assemble(fragment) {
                Ok(assembled) => self.receive(&assembled),
                // More fragments are needed, or the partial state was discarded. Either way the
                // other party is still in the process of transmitting.
                Err(FragmentError::IncompleteResult) | Err(FragmentError::UnexpectedFragment) => {
                    Ok(Received::none())
                }
                Err(FragmentError::InvalidFormat) | Err(FragmentError::InvalidData) => Err(
                    OTRError::ProtocolViolation("Fragment with invalid format or data."),
                ),
            };
        }
        match messages::parse(message)? {
            MessageType::Error(content) => {
                log::warn!(
                    "OTR error from the other party: {}",
                    String::from_utf8_lossy(&content)
                );
                if self.policy.contains(Policy::ERROR_START_AKE)
                    && !self.allowed_versions().is_empty()
                {
                    let mut received = Received::none();
                    received.to_send.push(messages::serialize_message(&MessageType::Query(
                        self.allowed_versions(),
                    )));
                    Ok(received)
                } else {
                    Err(OTRError::ErrorMessage(content))
                }
            }
            MessageType::Plaintext(content) => {
                if self.state.status() != ProtocolStatus::Plaintext
                    || self.policy.contains(Policy::REQUIRE_ENCRYPTION)
                {
                    log::warn!("plaintext message received while encryption is expected");
                }
                let mut received = Received::none();
                received.plaintext = Some(content);
                Ok(received)
            }
            MessageType::Tagged(versions, content) => {
                let mut received = Received::none();
                received.plaintext = Some(content);
                if self.policy.contains(Policy::WHITESPACE_START_AKE)
                    && self.state.status() == ProtocolStatus::Plaintext
                {
                    if let Some(version) = self.select_version(&versions) {
                        received.to_send = self.initiate(version)?;
                    }
                }
                Ok(received)
            }
            MessageType::Query(versions) => {
                let mut received = Received::none();
                if let Some(version) = self.select_version(&versions) {
                    received.to_send = self.initiate(version)?;
                }
                // without a mutually acceptable version, no key exchange is started.
                Ok(received)
            }
            MessageType::Encoded(encoded) => self.handle_encoded_message(encoded),
        }
    }

    /// send prepares an outgoing message according to the message-state.
    pub fn send(&mut self, content: &[u8]) -> Result<Vec<Vec<u8>>, OTRError> {
        match self.state.status() {
            ProtocolStatus::Plaintext => {
                if self.policy.contains(Policy::REQUIRE_ENCRYPTION) {
                    // OTR-spec: "If REQUIRE_ENCRYPTION is set: Store the plaintext message for
                    // possible retransmission, and send a Query Message."
                    if self.allowed_versions().is_empty() {
                        return Err(OTRError::NoAcceptableVersion);
                    }
                    self.pending.push(content.to_vec());
                    Ok(vec![messages::serialize_message(&MessageType::Query(
                        self.allowed_versions(),
                    ))])
                } else if self.policy.contains(Policy::SEND_WHITESPACE_TAG)
                    && !self.tagged
                    && !self.allowed_versions().is_empty()
                {
                    self.tagged = true;
                    Ok(vec![messages::serialize_message(&MessageType::Tagged(
                        self.allowed_versions(),
                        content.to_vec(),
                    ))])
                } else {
                    Ok(vec![content.to_vec()])
                }
            }
            ProtocolStatus::Encrypted => {
                // NUL is the separator between content and TLV records, so it cannot occur in the
                // content itself.
                let sanitized = crate::utils::bytes::drop_by_value(content, 0);
                let version = self
                    .state
                    .version()
                    .expect("BUG: encrypted state must have a version");
                let encoded = self.state.prepare(MessageFlags::empty(), &sanitized)?;
                Ok(self.emit(&version, encoded))
            }
            ProtocolStatus::Finished => Err(OTRError::ConversationFinished),
        }
    }

    /// end terminates an encrypted session on the caller's initiative: the disconnect record and
    /// any remaining disclosed MAC keys are sent and the conversation returns to plaintext.
    pub fn end(&mut self) -> Vec<Vec<u8>> {
        let version = self.state.version();
        let (message, state) = self.state.finish();
        self.state = state;
        self.tagged = false;
        match message {
            Some(encoded) => {
                let version = version.expect("BUG: a disconnect message implies a session version");
                self.emit(&version, encoded)
            }
            None => Vec::new(),
        }
    }

    /// authenticate drives the Socialist Millionaires' Protocol: it initiates an exchange with
    /// the given question and secret, or, when the other party initiated and the engine signalled
    /// `SMPSecretNeeded`, continues the pending exchange with the matching secret.
    pub fn authenticate(
        &mut self,
        question: &str,
        secret: &[u8],
    ) -> Result<Vec<Vec<u8>>, OTRError> {
        if self.state.status() != ProtocolStatus::Encrypted {
            return Err(OTRError::IncorrectState(
                "SMP requires an established encrypted session.",
            ));
        }
        let version = self
            .state
            .version()
            .expect("BUG: encrypted state must have a version");
        let smp = self.state.smp()?;
        let tlv = if smp.awaiting_secret() {
            smp.respond(secret)?
        } else {
            smp.initiate(question.as_bytes(), secret)?
        };
        let payload = OTREncoder::new().write_byte(0).write_tlv(&tlv).to_vec();
        let encoded = self
            .state
            .prepare(MessageFlags::IGNORE_UNREADABLE, &payload)?;
        Ok(self.emit(&version, encoded))
    }

    fn handle_encoded_message(&mut self, encoded: EncodedMessage) -> Result<Received, OTRError> {
        let EncodedMessage {
            version,
            sender,
            receiver,
            message,
        } = encoded;
        self.verify_policy(&version)?;
        if version == Version::V3 {
            if receiver != INSTANCE_ZERO && receiver != self.our_tag {
                return Err(OTRError::MessageForOtherInstance);
            }
            if self.their_tag == INSTANCE_ZERO {
                self.their_tag = sender;
            } else if sender != self.their_tag {
                return Err(OTRError::MessageForOtherInstance);
            }
        }
        match message {
            EncodedMessageType::DHCommit(msg) => {
                let response = match self.ake.handle_dhcommit(&*self.rand, version, msg) {
                    Ok(response) => response,
                    Err(AKEError::MessageIgnored) => return Ok(Received::none()),
                    Err(error) => return Err(OTRError::AuthenticationError(error)),
                };
                let mut received = Received::none();
                let response_version = self.ake.version();
                let encoded = messages::encode_message(
                    &response_version,
                    self.our_tag,
                    self.their_tag,
                    response,
                );
                received.to_send = self.emit(&response_version, encoded);
                Ok(received)
            }
            EncodedMessageType::DHKey(msg) => {
                if version != self.ake.version() {
                    return Err(OTRError::WrongProtocolVersion);
                }
                let keypair = self.require_keypair()?;
                let response = match self.ake.handle_dhkey(&*self.rand, &keypair, msg) {
                    Ok(response) => response,
                    Err(AKEError::MessageIgnored) => return Ok(Received::none()),
                    Err(error) => return Err(OTRError::AuthenticationError(error)),
                };
                let mut received = Received::none();
                received.to_send = self.emit(
                    &version,
                    messages::encode_message(&version, self.our_tag, self.their_tag, response),
                );
                Ok(received)
            }
            EncodedMessageType::RevealSignature(msg) => {
                if version != self.ake.version() {
                    return Err(OTRError::WrongProtocolVersion);
                }
                let keypair = self.require_keypair()?;
                let (material, response) =
                    match self.ake.handle_reveal_signature(&*self.rand, &keypair, msg) {
                        Ok(result) => result,
                        Err(AKEError::MessageIgnored) => return Ok(Received::none()),
                        Err(error) => return Err(OTRError::AuthenticationError(error)),
                    };
                let mut received = Received::none();
                received.to_send = self.emit(
                    &version,
                    messages::encode_message(&version, self.our_tag, self.their_tag, response),
                );
                self.secure(material)?;
                received.change = SecurityChange::NewKeys;
                let flushed = self.flush_pending()?;
                received.to_send.extend(flushed);
                Ok(received)
            }
            EncodedMessageType::Signature(msg) => {
                if version != self.ake.version() {
                    return Err(OTRError::WrongProtocolVersion);
                }
                let material = match self.ake.handle_signature(msg) {
                    Ok(material) => material,
                    Err(AKEError::MessageIgnored) => return Ok(Received::none()),
                    Err(error) => return Err(OTRError::AuthenticationError(error)),
                };
                let mut received = Received::none();
                self.secure(material)?;
                received.change = SecurityChange::NewKeys;
                received.to_send = self.flush_pending()?;
                Ok(received)
            }
            EncodedMessageType::Data(msg) => {
                self.handle_data_message(&version, sender, receiver, &msg)
            }
        }
    }

    fn handle_data_message(
        &mut self,
        version: &Version,
        sender: InstanceTag,
        receiver: InstanceTag,
        msg: &DataMessage,
    ) -> Result<Received, OTRError> {
        if self.state.status() == ProtocolStatus::Encrypted
            && self.state.version() != Some(version.clone())
        {
            return Err(OTRError::WrongProtocolVersion);
        }
        match self.state.handle(&*self.rand, msg, sender, receiver) {
            Ok((content, tlvs)) => {
                let mut received = Received::none();
                received.encrypted = true;
                if !content.is_empty() {
                    received.plaintext = Some(content);
                }
                for tlv in &tlvs {
                    if tlv.0 == TLV_TYPE_PADDING {
                        continue;
                    }
                    if tlv.0 == TLV_TYPE_DISCONNECT {
                        log::info!("the other party ended the secure conversation");
                        self.state = protocol::new_finished_state(version.clone());
                        received.change = SecurityChange::ConversationEnded;
                        break;
                    }
                    if smp::is_smp_tlv(tlv) {
                        let (reply, event) = self.state.smp()?.handle(tlv)?;
                        if let Some(reply_tlv) = reply {
                            let payload = OTREncoder::new()
                                .write_byte(0)
                                .write_tlv(&reply_tlv)
                                .to_vec();
                            let encoded = self
                                .state
                                .prepare(MessageFlags::IGNORE_UNREADABLE, &payload)?;
                            received.to_send.extend(self.emit(version, encoded));
                        }
                        received.change = match event {
                            SMPEvent::None => received.change,
                            SMPEvent::SecretNeeded => SecurityChange::SMPSecretNeeded,
                            SMPEvent::Completed => SecurityChange::SMPComplete,
                            SMPEvent::Failed => SecurityChange::SMPFailed,
                        };
                    }
                }
                Ok(received)
            }
            // Counter violations are dropped without reply: the message is a replay or arrived
            // out of order.
            Err(OTRError::ReplayedMessage) => {
                log::info!("dropping replayed or reordered data message");
                Ok(Received::none())
            }
            Err(OTRError::UnreadableMessage(_)) => {
                if msg.flags.contains(MessageFlags::IGNORE_UNREADABLE) {
                    log::info!("dropping unreadable message flagged ignore-unreadable");
                    Ok(Received::none())
                } else {
                    let reply = messages::serialize_message(&MessageType::Error(
                        b" unreadable message received".to_vec(),
                    ));
                    Err(OTRError::UnreadableMessage(vec![reply]))
                }
            }
            Err(error) => Err(error),
        }
    }

    fn initiate(&mut self, version: Version) -> Result<Vec<Vec<u8>>, OTRError> {
        let response = self
            .ake
            .initiate(&*self.rand, version.clone())
            .map_err(OTRError::AuthenticationError)?;
        Ok(self.emit(
            &version,
            messages::encode_message(&version, self.our_tag, self.their_tag, response),
        ))
    }

    /// secure transitions the conversation into the encrypted message-state with the material of
    /// the completed key exchange.
    fn secure(&mut self, material: CryptographicMaterial) -> Result<(), OTRError> {
        let our_fingerprint = self.require_keypair()?.public_key().fingerprint();
        self.their_longterm = Some(material.their_dsa.clone());
        let version = material.version.clone();
        self.state = protocol::new_encrypted_state(
            Rc::clone(&self.rand),
            material,
            our_fingerprint,
            self.our_tag,
            self.their_tag,
        )?;
        self.tagged = false;
        log::info!("encrypted session established ({:?})", version);
        Ok(())
    }

    /// flush_pending encrypts and emits every message stored while waiting for the secure
    /// session.
    fn flush_pending(&mut self) -> Result<Vec<Vec<u8>>, OTRError> {
        let pending = std::mem::take(&mut self.pending);
        let version = match self.state.version() {
            Some(version) => version,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for message in pending {
            let encoded = self.state.prepare(MessageFlags::empty(), &message)?;
            out.extend(self.emit(&version, encoded));
        }
        Ok(out)
    }

    /// emit applies the configured fragmentation to a fully encoded message.
    fn emit(&self, version: &Version, encoded: Vec<u8>) -> Vec<Vec<u8>> {
        if self.fragment_size == 0 || encoded.len() <= self.fragment_size {
            return vec![encoded];
        }
        match fragment::fragment(
            version,
            self.our_tag,
            self.their_tag,
            self.fragment_size,
            &encoded,
        ) {
            Ok(fragments) => fragments,
            Err(error) => {
                log::warn!(
                    "message cannot be fragmented to the configured size, sending whole: {:?}",
                    error
                );
                vec![encoded]
            }
        }
    }

    fn verify_policy(&self, version: &Version) -> Result<(), OTRError> {
        let allowed = match version {
            Version::V2 => self.policy.contains(Policy::ALLOW_V2),
            Version::V3 => self.policy.contains(Policy::ALLOW_V3),
            Version::Unsupported(_) => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(OTRError::WrongProtocolVersion)
        }
    }

    fn select_version(&self, versions: &[Version]) -> Option<Version> {
        if versions.contains(&Version::V3) && self.policy.contains(Policy::ALLOW_V3) {
            Some(Version::V3)
        } else if versions.contains(&Version::V2) && self.policy.contains(Policy::ALLOW_V2) {
            Some(Version::V2)
        } else {
            None
        }
    }

    fn allowed_versions(&self) -> Vec<Version> {
        let mut versions = Vec::new();
        if self.policy.contains(Policy::ALLOW_V2) {
            versions.push(Version::V2);
        }
        if self.policy.contains(Policy::ALLOW_V3) {
            versions.push(Version::V3);
        }
        versions
    }

    fn require_keypair(&self) -> Result<Rc<DSA::Keypair>, OTRError> {
        self.our_longterm
            .as_ref()
            .map(Rc::clone)
            .ok_or(OTRError::MissingLongTermKey)
    }
}
