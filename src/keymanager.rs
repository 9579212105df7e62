// SPDX-License-Identifier: LGPL-3.0-only

use std::collections::HashMap;

use num_bigint::BigUint;

use crate::{
    crypto::{CryptoError, AES128, DH, OTR::DataSecrets},
    encoding::{KeyID, CTR, MAC_LEN},
    host::RandomSource,
    OTRError,
};

/// KeyManager maintains the rotating DH keys of both parties for an encrypted session: our two
/// most recent keypairs, their two most recent public keys, the lazily derived session keys per
/// (keyid, keyid) combination, and the MAC keys that have been retired and await disclosure.
pub struct KeyManager {
    ours: KeypairRotation,
    theirs: PublicKeyRotation,
    sessions: HashMap<(KeyID, KeyID), SessionKeys>,
    reveal_queue: Vec<[u8; MAC_LEN]>,
}

impl KeyManager {
    /// new initializes key management from the material of a completed key exchange.
    ///
    /// OTR-spec: "When starting a private conversation [...], generate two DH key pairs for
    /// yourself, and set our_keyid = 2."
    pub fn new(
        rand: &dyn RandomSource,
        our_ake_keypair: DH::Keypair,
        their_ake_public: BigUint,
    ) -> Result<Self, CryptoError> {
        let next_keypair = DH::Keypair::generate(rand)?;
        Ok(Self {
            ours: KeypairRotation {
                previous: our_ake_keypair,
                current: next_keypair,
                id: 2,
            },
            theirs: PublicKeyRotation {
                previous: None,
                current: their_ake_public,
                id: 1,
            },
            sessions: HashMap::new(),
            reveal_queue: Vec::new(),
        })
    }

    pub fn our_keyid(&self) -> KeyID {
        self.ours.id
    }

    /// our_acknowledged_keyid is the id of the most recent of our keys that the other party has
    /// confirmed knowing, hence the key to use for sending.
    pub fn our_acknowledged_keyid(&self) -> KeyID {
        self.ours.id - 1
    }

    pub fn their_keyid(&self) -> KeyID {
        self.theirs.id
    }

    /// next_dh_public is our newest public key, announced in every outgoing data message.
    pub fn next_dh_public(&self) -> BigUint {
        self.ours.current.public.clone()
    }

    /// validate_ids checks that both key ids of an incoming data message refer to keys this
    /// manager still holds.
    pub fn validate_ids(
        &self,
        sender_keyid: KeyID,
        receiver_keyid: KeyID,
    ) -> Result<(), OTRError> {
        if !self.theirs.holds(sender_keyid) {
            return Err(OTRError::ProtocolViolation("sender keyID out of range"));
        }
        if !self.ours.holds(receiver_keyid) {
            return Err(OTRError::ProtocolViolation("receiver keyID out of range"));
        }
        Ok(())
    }

    /// session_keys produces the directional secrets for the combination of our key
    /// `our_keyid` and their key `their_keyid`, deriving and caching them on first use.
    pub fn session_keys(
        &mut self,
        our_keyid: KeyID,
        their_keyid: KeyID,
    ) -> Result<&mut SessionKeys, OTRError> {
        if !self.sessions.contains_key(&(our_keyid, their_keyid)) {
            let ours = self
                .ours
                .get(our_keyid)
                .ok_or(OTRError::ProtocolViolation("receiver keyID out of range"))?;
            let theirs = self
                .theirs
                .get(their_keyid)
                .ok_or(OTRError::ProtocolViolation("sender keyID out of range"))?;
            let s = ours.generate_shared_secret(theirs);
            let secrets = DataSecrets::derive(&ours.public, theirs, &s);
            log::debug!(
                "derived session keys for combination ({}, {})",
                our_keyid,
                their_keyid
            );
            self.sessions
                .insert((our_keyid, their_keyid), SessionKeys::new(secrets));
        }
        Ok(self
            .sessions
            .get_mut(&(our_keyid, their_keyid))
            .expect("BUG: session keys must be present after derivation"))
    }

    /// acknowledge_ours processes the receiver keyid of a verified incoming data message. The
    /// other party using our newest key means our older key will never be used again: rotate, and
    /// queue the MAC keys of the retired combinations for disclosure.
    pub fn acknowledge_ours(
        &mut self,
        rand: &dyn RandomSource,
        key_id: KeyID,
    ) -> Result<(), OTRError> {
        if key_id == self.ours.id {
            let dropped = self.ours.id - 1;
            let next_keypair = DH::Keypair::generate(rand)?;
            self.ours.rotate(next_keypair);
            self.retire(Some(dropped), None);
            log::debug!("rotated our DH keys: our newest keyid is now {}", self.ours.id);
            Ok(())
        } else if key_id + 1 == self.ours.id {
            // The acknowledged key is already our previous key. Nothing to rotate.
            Ok(())
        } else {
            Err(OTRError::ProtocolViolation("unexpected keyID to confirm"))
        }
    }

    /// register_their_next processes the sender keyid and announced next public key of a verified
    /// incoming data message.
    pub fn register_their_next(
        &mut self,
        key_id: KeyID,
        next_key: BigUint,
    ) -> Result<(), OTRError> {
        if key_id == self.theirs.id {
            DH::verify_public_key(&next_key).map_err(OTRError::from)?;
            let dropped = self.theirs.previous.as_ref().map(|_| self.theirs.id - 1);
            self.theirs.rotate(next_key);
            if let Some(id) = dropped {
                self.retire(None, Some(id));
            }
            log::debug!(
                "registered their next DH key: their newest keyid is now {}",
                self.theirs.id
            );
            Ok(())
        } else if key_id + 1 == self.theirs.id {
            // Repeated announcement for a key we already registered.
            Ok(())
        } else {
            Err(OTRError::ProtocolViolation("unexpected sender keyID"))
        }
    }

    /// retire drops every session-key combination that refers to a forgotten DH key. MAC keys
    /// that authenticated received messages become safe to disclose: no message they authenticate
    /// will ever be accepted again.
    fn retire(&mut self, our_dropped: Option<KeyID>, their_dropped: Option<KeyID>) {
        let queue = &mut self.reveal_queue;
        self.sessions.retain(|(our_id, their_id), keys| {
            if Some(*our_id) == our_dropped || Some(*their_id) == their_dropped {
                if keys.used_received {
                    queue.push(*keys.secrets.receiver_mac_key());
                }
                false
            } else {
                true
            }
        });
    }

    /// take_revealed drains the queued MAC keys, concatenated for the `revealed` field of an
    /// outgoing data message. Each key is disclosed exactly once.
    pub fn take_revealed(&mut self) -> Vec<u8> {
        let mut concatenated = Vec::with_capacity(self.reveal_queue.len() * MAC_LEN);
        for mac_key in self.reveal_queue.drain(..) {
            concatenated.extend_from_slice(&mac_key);
        }
        concatenated
    }
}

/// KeypairRotation manages the rotation of our own DH keypairs.
///
/// The rotation mechanism keeps the two most recent keypairs: `id` numbers the current (newest)
/// keypair, `id - 1` the previous one. Messaging is required to be in-order for OTR, so as soon
/// as the newest key is acknowledged the older keypair is forgotten.
struct KeypairRotation {
    previous: DH::Keypair,
    current: DH::Keypair,
    id: KeyID,
}

impl KeypairRotation {
    fn holds(&self, key_id: KeyID) -> bool {
        key_id == self.id || key_id + 1 == self.id
    }

    fn get(&self, key_id: KeyID) -> Option<&DH::Keypair> {
        if key_id == self.id {
            Some(&self.current)
        } else if key_id + 1 == self.id {
            Some(&self.previous)
        } else {
            None
        }
    }

    fn rotate(&mut self, next: DH::Keypair) {
        self.previous = std::mem::replace(&mut self.current, next);
        self.id += 1;
    }
}

/// PublicKeyRotation manages the two most recent public keys received from the other party.
struct PublicKeyRotation {
    previous: Option<BigUint>,
    current: BigUint,
    id: KeyID,
}

impl PublicKeyRotation {
    fn holds(&self, key_id: KeyID) -> bool {
        key_id == self.id || (key_id + 1 == self.id && self.previous.is_some())
    }

    fn get(&self, key_id: KeyID) -> Option<&BigUint> {
        if key_id == self.id {
            Some(&self.current)
        } else if key_id + 1 == self.id {
            self.previous.as_ref()
        } else {
            None
        }
    }

    fn rotate(&mut self, next: BigUint) {
        self.previous = Some(std::mem::replace(&mut self.current, next));
        self.id += 1;
    }
}

/// SessionKeys are the derived directional secrets for one key combination, together with the
/// counter state for each direction.
pub struct SessionKeys {
    secrets: DataSecrets,
    send_ctr: u64,
    recv_ctr: u64,
    used_received: bool,
}

impl SessionKeys {
    fn new(secrets: DataSecrets) -> Self {
        Self {
            secrets,
            send_ctr: 0,
            recv_ctr: 0,
            used_received: false,
        }
    }

    pub fn send_crypt_key(&self) -> &AES128::Key {
        self.secrets.sender_crypt_key()
    }

    pub fn send_mac_key(&self) -> &[u8; MAC_LEN] {
        self.secrets.sender_mac_key()
    }

    pub fn receive_crypt_key(&self) -> &AES128::Key {
        self.secrets.receiver_crypt_key()
    }

    pub fn receive_mac_key(&self) -> &[u8; MAC_LEN] {
        self.secrets.receiver_mac_key()
    }

    /// advance_send_counter increments the sending counter and produces its wire encoding. The
    /// counter monotonically increases for each message sent with the same key combination and
    /// must not be all zero.
    pub fn advance_send_counter(&mut self) -> Result<CTR, OTRError> {
        self.send_ctr = self
            .send_ctr
            .checked_add(1)
            .ok_or(OTRError::ProtocolViolation("sending counter exhausted"))?;
        Ok(self.send_ctr.to_be_bytes())
    }

    /// verify_receive_counter checks the monotonicity requirement for an incoming counter value:
    /// it must strictly exceed the highest counter accepted so far for this key combination.
    pub fn verify_receive_counter(&self, ctr: &CTR) -> Result<(), OTRError> {
        if crate::utils::bytes::all_zero(ctr) {
            return Err(OTRError::ProtocolViolation("counter must not be all 0x00"));
        }
        if u64::from_be_bytes(*ctr) <= self.recv_ctr {
            return Err(OTRError::ReplayedMessage);
        }
        Ok(())
    }

    /// accept_receive_counter records the counter of a fully verified message, which also marks
    /// the receiving MAC key as used (and therefore due for disclosure when retired).
    pub fn accept_receive_counter(&mut self, ctr: &CTR) {
        self.recv_ctr = u64::from_be_bytes(*ctr);
        self.used_received = true;
    }
}

#[cfg(test)]
mod tests {
    use super::KeyManager;
    use crate::crypto::DH;
    use crate::host::testing::TestRandom;
    use crate::OTRError;

    fn manager(seed: u64) -> (KeyManager, KeyManager) {
        let rand = TestRandom::new(seed);
        let alice_dh = DH::Keypair::generate(&rand).unwrap();
        let bob_dh = DH::Keypair::generate(&rand).unwrap();
        let alice = KeyManager::new(&rand, alice_dh.clone(), bob_dh.public.clone()).unwrap();
        let bob = KeyManager::new(&rand, bob_dh, alice_dh.public.clone()).unwrap();
        (alice, bob)
    }

    #[test]
    fn initial_state_after_key_exchange() {
        let (alice, _) = manager(1);
        assert_eq!(2, alice.our_keyid());
        assert_eq!(1, alice.our_acknowledged_keyid());
        assert_eq!(1, alice.their_keyid());
        assert_ne!(alice.next_dh_public(), alice.ours.previous.public);
    }

    #[test]
    fn session_keys_mirrored() {
        let (mut alice, mut bob) = manager(2);
        let ours = alice.session_keys(1, 1).unwrap().send_crypt_key().0;
        let theirs = bob.session_keys(1, 1).unwrap().receive_crypt_key().0;
        assert_eq!(ours, theirs);
    }

    #[test]
    fn counters_monotonic() {
        let (mut alice, _) = manager(3);
        let keys = alice.session_keys(1, 1).unwrap();
        let first = keys.advance_send_counter().unwrap();
        let second = keys.advance_send_counter().unwrap();
        assert_eq!([0, 0, 0, 0, 0, 0, 0, 1], first);
        assert_eq!([0, 0, 0, 0, 0, 0, 0, 2], second);
        assert!(keys.verify_receive_counter(&[0, 0, 0, 0, 0, 0, 0, 1]).is_ok());
        keys.accept_receive_counter(&[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(
            OTRError::ReplayedMessage,
            keys.verify_receive_counter(&[0, 0, 0, 0, 0, 0, 0, 1]).unwrap_err()
        );
        assert!(keys
            .verify_receive_counter(&[0, 0, 0, 0, 0, 0, 0, 0])
            .is_err());
        assert!(keys.verify_receive_counter(&[0, 0, 0, 0, 0, 0, 0, 2]).is_ok());
    }

    #[test]
    fn rotation_reveals_used_mac_keys() {
        let rand = TestRandom::new(4);
        let (mut alice, _) = manager(4);
        let expected_reveal = *alice.session_keys(1, 1).unwrap().receive_mac_key();
        // receiving with combination (1, 1) marks the MAC key as used.
        let ctr = [0, 0, 0, 0, 0, 0, 0, 1];
        alice.session_keys(1, 1).unwrap().accept_receive_counter(&ctr);
        // the other party acknowledges our newest key: keyid 1 retires.
        alice.acknowledge_ours(&rand, 2).unwrap();
        assert_eq!(3, alice.our_keyid());
        let revealed = alice.take_revealed();
        assert_eq!(expected_reveal.to_vec(), revealed);
        // a MAC key is revealed at most once.
        assert!(alice.take_revealed().is_empty());
    }

    #[test]
    fn unused_mac_keys_not_revealed() {
        let rand = TestRandom::new(5);
        let (mut alice, _) = manager(5);
        alice.session_keys(1, 1).unwrap();
        alice.acknowledge_ours(&rand, 2).unwrap();
        assert!(alice.take_revealed().is_empty());
    }

    #[test]
    fn acknowledge_rejects_unknown_keyid() {
        let rand = TestRandom::new(6);
        let (mut alice, _) = manager(6);
        assert!(alice.acknowledge_ours(&rand, 1).is_ok());
        assert!(alice.acknowledge_ours(&rand, 7).is_err());
    }

    #[test]
    fn register_their_next_rotates_once() {
        let rand = TestRandom::new(7);
        let (mut alice, _) = manager(7);
        let next = DH::Keypair::generate(&rand).unwrap().public;
        alice.register_their_next(1, next.clone()).unwrap();
        assert_eq!(2, alice.their_keyid());
        // the repeated announcement changes nothing.
        alice.register_their_next(1, next).unwrap();
        assert_eq!(2, alice.their_keyid());
    }

    #[test]
    fn register_their_next_rejects_degenerate_key() {
        let (mut alice, _) = manager(8);
        assert!(alice
            .register_their_next(1, num_bigint::BigUint::from(1u8))
            .is_err());
    }
}
