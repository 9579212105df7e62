// SPDX-License-Identifier: LGPL-3.0-only

use std::rc::Rc;

use crate::{
    ake::CryptographicMaterial,
    crypto::{constant, SHA256},
    encoding::{
        Fingerprint, MessageFlags, OTREncoder, CTR, MAC_LEN, SSID, TLV, TLV_TYPE_DISCONNECT,
    },
    host::RandomSource,
    instancetag::InstanceTag,
    keymanager::KeyManager,
    messages::{self, DataMessage, EncodedMessageType},
    smp::{SMPContext, TLV_TYPE_SMP_ABORT},
    OTRError, ProtocolStatus, Version,
};

/// ProtocolState is the message-state of a conversation. Each state decides how messages are
/// prepared for sending and how incoming data messages are handled; transitions produce the
/// replacement state.
pub trait ProtocolState {
    fn status(&self) -> ProtocolStatus;
    /// version is the protocol version this state was established under, if any.
    fn version(&self) -> Option<Version>;
    fn ssid(&self) -> Option<SSID>;
    /// handle processes a verified-as-parsed incoming data message, producing the decrypted
    /// content and its trailing TLV records.
    fn handle(
        &mut self,
        rand: &dyn RandomSource,
        msg: &DataMessage,
        sender: InstanceTag,
        receiver: InstanceTag,
    ) -> Result<(Vec<u8>, Vec<TLV>), OTRError>;
    /// prepare encrypts and authenticates payload content, producing a fully encoded data
    /// message ready for transport.
    fn prepare(&mut self, flags: MessageFlags, content: &[u8]) -> Result<Vec<u8>, OTRError>;
    /// finish ends the secure session, producing the disconnect message to transmit (when there
    /// is a session to end) and the successor state.
    fn finish(&mut self) -> (Option<Vec<u8>>, Box<dyn ProtocolState>);
    fn smp(&mut self) -> Result<&mut SMPContext, OTRError>;
    /// smp_question is the buffered challenge of a pending peer-initiated SMP exchange.
    fn smp_question(&self) -> Option<String>;
}

pub fn new_state() -> Box<dyn ProtocolState> {
    Box::new(PlaintextState {})
}

/// new_encrypted_state establishes the encrypted message-state from the cryptographic material
/// of a completed key exchange.
pub fn new_encrypted_state(
    rand: Rc<dyn RandomSource>,
    material: CryptographicMaterial,
    our_fingerprint: Fingerprint,
    our_tag: InstanceTag,
    their_tag: InstanceTag,
) -> Result<Box<dyn ProtocolState>, OTRError> {
    let CryptographicMaterial {
        version,
        ssid,
        our_dh,
        their_dh,
        their_dsa,
    } = material;
    let their_fingerprint = their_dsa.fingerprint();
    let keys = KeyManager::new(&*rand, our_dh, their_dh)?;
    let smp = SMPContext::new(Rc::clone(&rand), ssid, our_fingerprint, their_fingerprint);
    Ok(Box::new(EncryptedState {
        version,
        ssid,
        keys,
        smp,
        our_tag,
        their_tag,
    }))
}

struct PlaintextState {}

impl ProtocolState for PlaintextState {
    fn status(&self) -> ProtocolStatus {
        ProtocolStatus::Plaintext
    }

    fn version(&self) -> Option<Version> {
        None
    }

    fn ssid(&self) -> Option<SSID> {
        None
    }

    fn handle(
        &mut self,
        _rand: &dyn RandomSource,
        _msg: &DataMessage,
        _sender: InstanceTag,
        _receiver: InstanceTag,
    ) -> Result<(Vec<u8>, Vec<TLV>), OTRError> {
        // An encrypted message without a secure channel cannot be read. The reply tells the other
        // party that whatever protocol ran inside the channel is over, i.e. an SMP abort record.
        Err(OTRError::EncryptedMessageWithNoSecureChannel(vec![
            serialized_smp_abort(),
        ]))
    }

    fn prepare(&mut self, _flags: MessageFlags, _content: &[u8]) -> Result<Vec<u8>, OTRError> {
        Err(OTRError::IncorrectState(
            "Sending encrypted content requires an established session.",
        ))
    }

    fn finish(&mut self) -> (Option<Vec<u8>>, Box<dyn ProtocolState>) {
        (None, new_state())
    }

    fn smp(&mut self) -> Result<&mut SMPContext, OTRError> {
        Err(OTRError::IncorrectState(
            "SMP is available only within an encrypted session.",
        ))
    }

    fn smp_question(&self) -> Option<String> {
        None
    }
}

struct EncryptedState {
    version: Version,
    ssid: SSID,
    keys: KeyManager,
    smp: SMPContext,
    our_tag: InstanceTag,
    their_tag: InstanceTag,
}

impl ProtocolState for EncryptedState {
    fn status(&self) -> ProtocolStatus {
        ProtocolStatus::Encrypted
    }

    fn version(&self) -> Option<Version> {
        Some(self.version.clone())
    }

    fn ssid(&self) -> Option<SSID> {
        Some(self.ssid)
    }

    fn handle(
        &mut self,
        rand: &dyn RandomSource,
        msg: &DataMessage,
        sender: InstanceTag,
        receiver: InstanceTag,
    ) -> Result<(Vec<u8>, Vec<TLV>), OTRError> {
        self.keys.validate_ids(msg.sender_keyid, msg.receiver_keyid)?;
        let authenticator_data =
            messages::encode_authenticator_data(&self.version, sender, receiver, msg);
        let decrypted = {
            let keys = self
                .keys
                .session_keys(msg.receiver_keyid, msg.sender_keyid)?;
            let expected = SHA256::hmac160(keys.receive_mac_key(), &authenticator_data);
            constant::verify(&expected, &msg.authenticator)
                .or(Err(OTRError::UnreadableMessage(Vec::new())))?;
            keys.verify_receive_counter(&msg.ctr)?;
            let decrypted = keys
                .receive_crypt_key()
                .decrypt(&nonce(&msg.ctr), &msg.encrypted);
            keys.accept_receive_counter(&msg.ctr);
            decrypted
        };
        // The message checked out. Progress both rotations before surfacing the content.
        self.keys
            .register_their_next(msg.sender_keyid, msg.dh_y.clone())?;
        self.keys.acknowledge_ours(rand, msg.receiver_keyid)?;
        messages::split_plaintext_tlvs(&decrypted)
    }

    fn prepare(&mut self, flags: MessageFlags, content: &[u8]) -> Result<Vec<u8>, OTRError> {
        let sender_keyid = self.keys.our_acknowledged_keyid();
        let receiver_keyid = self.keys.their_keyid();
        let dh_y = self.keys.next_dh_public();
        let revealed = self.keys.take_revealed();
        let keys = self.keys.session_keys(sender_keyid, receiver_keyid)?;
        let ctr = keys.advance_send_counter()?;
        let encrypted = keys.send_crypt_key().encrypt(&nonce(&ctr), content);
        let mut message = DataMessage {
            flags,
            sender_keyid,
            receiver_keyid,
            dh_y,
            ctr,
            encrypted,
            authenticator: [0u8; MAC_LEN],
            revealed,
        };
        let authenticator_data = messages::encode_authenticator_data(
            &self.version,
            self.our_tag,
            self.their_tag,
            &message,
        );
        message.authenticator = SHA256::hmac160(keys.send_mac_key(), &authenticator_data);
        Ok(messages::encode_message(
            &self.version,
            self.our_tag,
            self.their_tag,
            EncodedMessageType::Data(message),
        ))
    }

    fn finish(&mut self) -> (Option<Vec<u8>>, Box<dyn ProtocolState>) {
        let payload = OTREncoder::new()
            .write_byte(0)
            .write_tlv(&TLV(TLV_TYPE_DISCONNECT, Vec::new()))
            .to_vec();
        // failing to construct the disconnect message means nothing can be salvaged; the state
        // transition to plaintext proceeds regardless.
        let message = self
            .prepare(MessageFlags::IGNORE_UNREADABLE, &payload)
            .map_err(|error| log::warn!("failed to prepare disconnect message: {:?}", error))
            .ok();
        (message, new_state())
    }

    fn smp(&mut self) -> Result<&mut SMPContext, OTRError> {
        Ok(&mut self.smp)
    }

    fn smp_question(&self) -> Option<String> {
        self.smp.question()
    }
}

struct FinishedState {
    version: Version,
}

impl ProtocolState for FinishedState {
    fn status(&self) -> ProtocolStatus {
        ProtocolStatus::Finished
    }

    fn version(&self) -> Option<Version> {
        Some(self.version.clone())
    }

    fn ssid(&self) -> Option<SSID> {
        None
    }

    fn handle(
        &mut self,
        _rand: &dyn RandomSource,
        _msg: &DataMessage,
        _sender: InstanceTag,
        _receiver: InstanceTag,
    ) -> Result<(Vec<u8>, Vec<TLV>), OTRError> {
        Err(OTRError::EncryptedMessageWithNoSecureChannel(vec![
            serialized_smp_abort(),
        ]))
    }

    fn prepare(&mut self, _flags: MessageFlags, _content: &[u8]) -> Result<Vec<u8>, OTRError> {
        // OTR-spec: "If msgstate is MSGSTATE_FINISHED: Inform the user that the message cannot be
        // sent at this time."
        Err(OTRError::ConversationFinished)
    }

    fn finish(&mut self) -> (Option<Vec<u8>>, Box<dyn ProtocolState>) {
        (None, new_state())
    }

    fn smp(&mut self) -> Result<&mut SMPContext, OTRError> {
        Err(OTRError::IncorrectState(
            "SMP is available only within an encrypted session.",
        ))
    }

    fn smp_question(&self) -> Option<String> {
        None
    }
}

/// new_finished_state is the successor state after the other party disconnected the secure
/// session. Outbound sending fails until the host explicitly resets to plaintext.
pub fn new_finished_state(version: Version) -> Box<dyn ProtocolState> {
    Box::new(FinishedState { version })
}

fn serialized_smp_abort() -> Vec<u8> {
    OTREncoder::new()
        .write_tlv(&TLV(TLV_TYPE_SMP_ABORT, Vec::new()))
        .to_vec()
}

/// nonce expands the 8-byte counter into the 16-byte initialization vector: the counter occupies
/// the high half, the low half is zero.
fn nonce(ctr: &CTR) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce[..ctr.len()].copy_from_slice(ctr);
    nonce
}

#[cfg(test)]
mod tests {
    use super::nonce;

    #[test]
    fn nonce_occupies_high_half() {
        let ctr = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(
            [1u8, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, 0, 0, 0, 0],
            nonce(&ctr)
        );
    }
}
