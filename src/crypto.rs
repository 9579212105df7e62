// SPDX-License-Identifier: LGPL-3.0-only

/// CryptoError describes the failure modes of the cryptographic primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Verification of a value failed: digest mismatch, signature invalid, value out of range.
    VerificationFailure(&'static str),
    /// The random source failed to produce bytes.
    RandomnessFailure,
}

#[allow(non_snake_case)]
pub mod DH {
    use num_bigint::BigUint;
    use once_cell::sync::Lazy;

    use crate::host::RandomSource;

    use super::CryptoError;

    /// GENERATOR (g): 2
    static GENERATOR: Lazy<BigUint> = Lazy::new(|| BigUint::from(2u8));

    /// Modulus: the 1536-bit MODP group prime.
    pub static MODULUS: Lazy<BigUint> = Lazy::new(|| {
        BigUint::from_bytes_be(&[
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2, 0x21, 0x68,
            0xC2, 0x34, 0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1, 0x29, 0x02, 0x4E, 0x08,
            0x8A, 0x67, 0xCC, 0x74, 0x02, 0x0B, 0xBE, 0xA6, 0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A,
            0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD, 0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B,
            0x30, 0x2B, 0x0A, 0x6D, 0xF2, 0x5F, 0x14, 0x37, 0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51,
            0xC2, 0x45, 0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6, 0xF4, 0x4C, 0x42, 0xE9,
            0xA6, 0x37, 0xED, 0x6B, 0x0B, 0xFF, 0x5C, 0xB6, 0xF4, 0x06, 0xB7, 0xED, 0xEE, 0x38,
            0x6B, 0xFB, 0x5A, 0x89, 0x9F, 0xA5, 0xAE, 0x9F, 0x24, 0x11, 0x7C, 0x4B, 0x1F, 0xE6,
            0x49, 0x28, 0x66, 0x51, 0xEC, 0xE4, 0x5B, 0x3D, 0xC2, 0x00, 0x7C, 0xB8, 0xA1, 0x63,
            0xBF, 0x05, 0x98, 0xDA, 0x48, 0x36, 0x1C, 0x55, 0xD3, 0x9A, 0x69, 0x16, 0x3F, 0xA8,
            0xFD, 0x24, 0xCF, 0x5F, 0x83, 0x65, 0x5D, 0x23, 0xDC, 0xA3, 0xAD, 0x96, 0x1C, 0x62,
            0xF3, 0x56, 0x20, 0x85, 0x52, 0xBB, 0x9E, 0xD5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6D,
            0x67, 0x0C, 0x35, 0x4E, 0x4A, 0xBC, 0x98, 0x04, 0xF1, 0x74, 0x6C, 0x08, 0xCA, 0x23,
            0x73, 0x27, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
        ])
    });

    /// Modulus - 2, the upper bound (inclusive) for legal public keys.
    pub static MODULUS_MINUS_TWO: Lazy<BigUint> = Lazy::new(|| &*MODULUS - 2u8);

    /// The number of bytes of entropy drawn for a DH private key (320 bits).
    const PRIVATE_KEY_LEN: usize = 40;

    pub type SharedSecret = BigUint;

    #[must_use]
    pub fn generator() -> &'static BigUint {
        &GENERATOR
    }

    /// verify_public_key checks that a received public key is in the legal range `2 <= key <= p-2`,
    /// which excludes the degenerate values 0, 1 and p-1.
    pub fn verify_public_key(public_key: &BigUint) -> Result<(), CryptoError> {
        if public_key >= &*GENERATOR && public_key <= &*MODULUS_MINUS_TWO {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailure("DH value out of range"))
        }
    }

    #[derive(Clone)]
    pub struct Keypair {
        private: BigUint,
        pub public: BigUint,
    }

    impl Keypair {
        /// generate produces a new keypair from 320 bits of entropy from the random source.
        pub fn generate(rand: &dyn RandomSource) -> Result<Keypair, CryptoError> {
            let mut bytes = [0u8; PRIVATE_KEY_LEN];
            rand.fill(&mut bytes)?;
            let private = BigUint::from_bytes_be(&bytes);
            let public = GENERATOR.modpow(&private, &MODULUS);
            Ok(Keypair { private, public })
        }

        #[must_use]
        pub fn generate_shared_secret(&self, public_key: &BigUint) -> SharedSecret {
            public_key.modpow(&self.private, &MODULUS)
        }
    }
}

#[allow(non_snake_case)]
pub mod AES128 {
    use aes_ctr::{
        cipher::{generic_array::GenericArray, NewStreamCipher, SyncStreamCipher},
        Aes128Ctr,
    };

    use crate::host::RandomSource;

    use super::CryptoError;

    pub const KEY_LEN: usize = 16;

    #[derive(Clone)]
    pub struct Key(pub [u8; KEY_LEN]);

    impl Drop for Key {
        fn drop(&mut self) {
            self.0 = [0u8; KEY_LEN];
        }
    }

    impl Key {
        pub fn generate(rand: &dyn RandomSource) -> Result<Key, CryptoError> {
            let mut bytes = [0u8; KEY_LEN];
            rand.fill(&mut bytes)?;
            Ok(Key(bytes))
        }

        #[must_use]
        pub fn encrypt(&self, nonce: &[u8; 16], data: &[u8]) -> Vec<u8> {
            self.crypt(nonce, data)
        }

        #[must_use]
        pub fn decrypt(&self, nonce: &[u8; 16], data: &[u8]) -> Vec<u8> {
            self.crypt(nonce, data)
        }

        /// crypt provides both encrypting and decrypting logic.
        fn crypt(&self, nonce: &[u8; 16], data: &[u8]) -> Vec<u8> {
            let mut result = Vec::from(data);
            let key = GenericArray::from_slice(&self.0);
            let nonce = GenericArray::from_slice(nonce);
            let mut cipher = Aes128Ctr::new(key, nonce);
            cipher.apply_keystream(result.as_mut_slice());
            result
        }
    }
}

#[allow(non_snake_case)]
pub mod DSA {
    use num_bigint::BigUint;
    use num_integer::Integer;

    use crate::{
        encoding::{Fingerprint, OTREncoder, Signature, SIGNATURE_LEN},
        host::RandomSource,
        utils::biguint,
    };

    use super::{CryptoError, SHA1};

    /// The byte-length of the subgroup order q, and of each signature component.
    const PARAM_LEN: usize = SIGNATURE_LEN / 2;

    /// The serialized public key starts with a 2-byte type tag `0x0000`. The fingerprint is taken
    /// over the serialization with the tag left off, as clients derived from libotr do.
    const PUBKEY_TYPE_LEN: usize = 2;

    /// Keypair is a long-term DSA keypair `(p, q, g, x, y)` with `y = g^x mod p`. Generation and
    /// persistence of the keypair are the host's concern; the engine only signs and verifies.
    #[derive(Clone)]
    pub struct Keypair {
        p: BigUint,
        q: BigUint,
        g: BigUint,
        x: BigUint,
        y: BigUint,
    }

    impl Keypair {
        #[must_use]
        pub fn new(p: BigUint, q: BigUint, g: BigUint, x: BigUint, y: BigUint) -> Keypair {
            Keypair { p, q, g, x, y }
        }

        #[must_use]
        pub fn public_key(&self) -> PublicKey {
            PublicKey {
                p: self.p.clone(),
                q: self.q.clone(),
                g: self.g.clone(),
                y: self.y.clone(),
            }
        }

        /// sign produces an r‖s signature over a 32-byte digest. The digest is reduced modulo q
        /// instead of being truncated, and is not hashed again.
        pub fn sign(
            &self,
            rand: &dyn RandomSource,
            digest: &[u8; 32],
        ) -> Result<Signature, CryptoError> {
            let q = &self.q;
            let m = BigUint::from_bytes_be(digest).mod_floor(q);
            let mut bytes = [0u8; PARAM_LEN + 4];
            loop {
                rand.fill(&mut bytes)?;
                let k = BigUint::from_bytes_be(&bytes).mod_floor(q);
                if k == BigUint::from(0u8) {
                    continue;
                }
                let r = self.g.modpow(&k, &self.p).mod_floor(q);
                if r == BigUint::from(0u8) {
                    continue;
                }
                // q is prime, so the inverse of k is k^(q-2) mod q.
                let kinv = k.modpow(&(q - 2u8), q);
                let s = (&kinv * (&m + &self.x * &r)).mod_floor(q);
                if s == BigUint::from(0u8) {
                    continue;
                }
                let mut signature = [0u8; SIGNATURE_LEN];
                biguint::to_bytes_be_into(&mut signature[..PARAM_LEN], &r);
                biguint::to_bytes_be_into(&mut signature[PARAM_LEN..], &s);
                return Ok(signature);
            }
        }
    }

    #[derive(Clone)]
    pub struct PublicKey {
        p: BigUint,
        q: BigUint,
        g: BigUint,
        y: BigUint,
    }

    impl PublicKey {
        #[must_use]
        pub fn new(p: BigUint, q: BigUint, g: BigUint, y: BigUint) -> PublicKey {
            PublicKey { p, q, g, y }
        }

        #[must_use]
        pub fn p(&self) -> &BigUint {
            &self.p
        }

        #[must_use]
        pub fn q(&self) -> &BigUint {
            &self.q
        }

        #[must_use]
        pub fn g(&self) -> &BigUint {
            &self.g
        }

        #[must_use]
        pub fn y(&self) -> &BigUint {
            &self.y
        }

        pub fn verify(&self, signature: &Signature, digest: &[u8; 32]) -> Result<(), CryptoError> {
            let q = &self.q;
            let zero = BigUint::from(0u8);
            let r = BigUint::from_bytes_be(&signature[..PARAM_LEN]);
            let s = BigUint::from_bytes_be(&signature[PARAM_LEN..]);
            if r == zero || &r >= q || s == zero || &s >= q {
                return Err(CryptoError::VerificationFailure(
                    "DSA signature component out of range",
                ));
            }
            let m = BigUint::from_bytes_be(digest).mod_floor(q);
            let w = s.modpow(&(q - 2u8), q);
            let u1 = (&m * &w).mod_floor(q);
            let u2 = (&r * &w).mod_floor(q);
            let v = (self.g.modpow(&u1, &self.p) * self.y.modpow(&u2, &self.p))
                .mod_floor(&self.p)
                .mod_floor(q);
            if v == r {
                Ok(())
            } else {
                Err(CryptoError::VerificationFailure(
                    "DSA signature verification failed",
                ))
            }
        }

        /// fingerprint is the SHA-1 digest over the serialized public key, with the 2-byte type
        /// tag excluded for compatibility with OTR version 2 and 3 fingerprints.
        #[must_use]
        pub fn fingerprint(&self) -> Fingerprint {
            let serialized = OTREncoder::new().write_public_key(self).to_vec();
            SHA1::digest(&serialized[PUBKEY_TYPE_LEN..])
        }
    }
}

#[allow(non_snake_case)]
pub mod SHA1 {
    pub fn digest(data: &[u8]) -> [u8; 20] {
        let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, data);
        let mut result = [0u8; 20];
        result.clone_from_slice(digest.as_ref());
        result
    }

    /// digest_with_prefix calculates the SHA-1 digest over the prefix byte followed by the data.
    pub fn digest_with_prefix(b: u8, data: &[u8]) -> [u8; 20] {
        let mut bytes = vec![b];
        bytes.extend_from_slice(data);
        digest(&bytes)
    }
}

#[allow(non_snake_case)]
pub mod SHA256 {
    /// digest calculates the SHA256 digest value.
    pub fn digest(data: &[u8]) -> [u8; 32] {
        let digest = ring::digest::digest(&ring::digest::SHA256, data);
        let mut result = [0u8; 32];
        result.clone_from_slice(digest.as_ref());
        result
    }

    /// digest_with_prefix calculates the SHA256 digest over the prefix byte followed by the data.
    pub fn digest_with_prefix(b: u8, data: &[u8]) -> [u8; 32] {
        let mut bytes = vec![b];
        bytes.extend_from_slice(data);
        digest(&bytes)
    }

    /// hmac calculates the full SHA256-HMAC value, as used with key `m1` in the AKE.
    pub fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key);
        let digest = ring::hmac::sign(&key, data);
        let mut result = [0u8; 32];
        result.clone_from_slice(digest.as_ref());
        result
    }

    /// hmac160 calculates the first 160 bits of the SHA256-HMAC value, as used with key `m2` in
    /// the AKE and for data message authenticators.
    pub fn hmac160(key: &[u8], data: &[u8]) -> [u8; 20] {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key);
        let digest = ring::hmac::sign(&key, data);
        let mut result = [0u8; 20];
        result.clone_from_slice(&digest.as_ref()[..20]);
        result
    }
}

/// constant provides comparisons that do not branch on the content of the compared secrets.
pub mod constant {
    use super::CryptoError;

    pub fn verify(expected: &[u8], actual: &[u8]) -> Result<(), CryptoError> {
        ring::constant_time::verify_slices_are_equal(expected, actual).or(Err(
            CryptoError::VerificationFailure("MAC or digest does not match the expected value"),
        ))
    }
}

#[allow(non_snake_case)]
pub mod OTR {
    use std::convert::TryInto;

    use num_bigint::BigUint;

    use crate::encoding::{OTREncoder, SSID};

    use super::{AES128, SHA1, SHA256};

    /// AKESecrets are the secrets derived from the AKE shared secret `s`: the secure session
    /// identifier and the encryption/MAC keys that protect the signature exchange.
    pub struct AKESecrets {
        pub ssid: SSID,
        pub c: AES128::Key,
        pub cp: AES128::Key,
        pub m1: [u8; 32],
        pub m2: [u8; 32],
        pub m1p: [u8; 32],
        pub m2p: [u8; 32],
    }

    impl Drop for AKESecrets {
        fn drop(&mut self) {
            self.ssid = [0u8; 8];
            self.m1 = [0u8; 32];
            self.m2 = [0u8; 32];
            self.m1p = [0u8; 32];
            self.m2p = [0u8; 32];
        }
    }

    impl AKESecrets {
        /// Derive the shared secrets used by OTR version 2 and 3 from the serialized shared
        /// secret `secbytes`.
        #[must_use]
        pub fn derive(secbytes: &[u8]) -> AKESecrets {
            let h2secret0 = SHA256::digest_with_prefix(0x00, secbytes);
            let h2secret1 = SHA256::digest_with_prefix(0x01, secbytes);
            AKESecrets {
                ssid: h2secret0[..8].try_into().expect("BUG: incorrect slice length"),
                c: AES128::Key(h2secret1[..16].try_into().expect("BUG: incorrect slice length")),
                cp: AES128::Key(h2secret1[16..].try_into().expect("BUG: incorrect slice length")),
                m1: SHA256::digest_with_prefix(0x02, secbytes),
                m2: SHA256::digest_with_prefix(0x03, secbytes),
                m1p: SHA256::digest_with_prefix(0x04, secbytes),
                m2p: SHA256::digest_with_prefix(0x05, secbytes),
            }
        }
    }

    /// DataSecrets are the directional encryption and MAC keys for one (sender keyid, receiver
    /// keyid) combination. The party with the numerically greater public key of the pair is the
    /// "high" end and uses `0x01` as its sending-key prefix, the other end uses `0x02`.
    pub struct DataSecrets {
        send_key: AES128::Key,
        recv_key: AES128::Key,
        send_mac: [u8; 20],
        recv_mac: [u8; 20],
    }

    impl DataSecrets {
        /// derive derives the directional data keys from the shared secret `s` of the key pair
        /// `(our_key, their_key)`.
        #[must_use]
        pub fn derive(our_key: &BigUint, their_key: &BigUint, s: &BigUint) -> DataSecrets {
            let secbytes = OTREncoder::new().write_mpi(s).to_vec();
            let (sendbyte, recvbyte) = if our_key > their_key {
                (0x01u8, 0x02u8)
            } else {
                (0x02u8, 0x01u8)
            };
            let send_key = AES128::Key(
                SHA1::digest_with_prefix(sendbyte, &secbytes)[..16]
                    .try_into()
                    .expect("BUG: incorrect slice length"),
            );
            let recv_key = AES128::Key(
                SHA1::digest_with_prefix(recvbyte, &secbytes)[..16]
                    .try_into()
                    .expect("BUG: incorrect slice length"),
            );
            let send_mac = SHA1::digest(&send_key.0);
            let recv_mac = SHA1::digest(&recv_key.0);
            DataSecrets {
                send_key,
                recv_key,
                send_mac,
                recv_mac,
            }
        }

        #[must_use]
        pub fn sender_crypt_key(&self) -> &AES128::Key {
            &self.send_key
        }

        #[must_use]
        pub fn sender_mac_key(&self) -> &[u8; 20] {
            &self.send_mac
        }

        #[must_use]
        pub fn receiver_crypt_key(&self) -> &AES128::Key {
            &self.recv_key
        }

        #[must_use]
        pub fn receiver_mac_key(&self) -> &[u8; 20] {
            &self.recv_mac
        }
    }
}

#[cfg(test)]
pub mod fixtures {
    use num_bigint::BigUint;

    use super::DSA;

    const PARAM_P: &str = "8a4804d65023b87bb8d9de658aca0d59a18029d7f9e1eaa56231f58f65346cd79cad56d133509e5bd25945542a69f6f0392ec716dd9785b9a675663444d9a7481b1055ea1b38d65dd4417d736640df44bd3bacbf9d6e6f696a8e892ebaa035390439510d965f4d35a62b5a8b53b6943eaad83a87f28eca3a7340123556a5698f";
    const PARAM_Q: &str = "a6821b16f9c9ff4bbc9b1ee67e961dfeb018a3a9";
    const PARAM_G: &str = "1249f0db8dedd0041244be3379168af61fb3bc6f87434ad3a3c75c09adf8afac3ae06e84d6299e86dff97b6b539084121777683af58ed6b84a818947680c5002b09c53b1968e19f0ac56abacacb98dbe01c37237461d1c912cf582a3e91eb7ef2979f12f9ada56f841b9515e03a79e16ff92505eea99460ef0445012c91dc505";
    const ALICE_X: &str = "21965e742d5b40f8b1b9602cb97eb2ef65ee0e15";
    const ALICE_Y: &str = "72572d1ba9c8283b2296e564980d55646e3b2eaaba5cd9311f0889f8f3c412b6c002f636f86e01f2176945cb2f27e7b84a649100e755cda622903e2abc971e46bd54d68abbe574e7d79dc05575caed9f3507f9e42b54845c84d60a5459951be3f989c3924a4a25e682ae5a46cbe107fc2383ec75ee9f202022265fce6e83781a";
    const BOB_X: &str = "57ccfd5cd2f4a8d3b5c4e52743eba38c97211e7c";
    const BOB_Y: &str = "23521f74da746719516ebf5dc2b6de2b7b9b57504b61a34e07670f8846cf90b2c395becaa579a892d7139e3239d3e1112793d969749b06b2afbd2053484e751cd2a46f98c70399038d473b0052d760bb4db6c16df38e7f0af3e8f520cb2210a82a0ab2e05bb23c89023f0cb9f8ed40b628727c38e8b87b3fd96ecefa6534d0ac";

    fn bn(hexstr: &str) -> BigUint {
        BigUint::from_bytes_be(&hex::decode(hexstr).unwrap())
    }

    pub fn alice_keypair() -> DSA::Keypair {
        DSA::Keypair::new(bn(PARAM_P), bn(PARAM_Q), bn(PARAM_G), bn(ALICE_X), bn(ALICE_Y))
    }

    pub fn bob_keypair() -> DSA::Keypair {
        DSA::Keypair::new(bn(PARAM_P), bn(PARAM_Q), bn(PARAM_G), bn(BOB_X), bn(BOB_Y))
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;

    use super::{constant, fixtures, AES128, DH, OTR, SHA256};
    use crate::host::testing::TestRandom;

    #[test]
    fn dh_public_key_range() {
        assert!(DH::verify_public_key(&BigUint::from(0u8)).is_err());
        assert!(DH::verify_public_key(&BigUint::from(1u8)).is_err());
        assert!(DH::verify_public_key(&BigUint::from(2u8)).is_ok());
        assert!(DH::verify_public_key(&DH::MODULUS_MINUS_TWO).is_ok());
        assert!(DH::verify_public_key(&(&*DH::MODULUS - 1u8)).is_err());
        assert!(DH::verify_public_key(&DH::MODULUS).is_err());
    }

    #[test]
    fn dh_shared_secret_symmetric() {
        let rand = TestRandom::new(42);
        let a = DH::Keypair::generate(&rand).unwrap();
        let b = DH::Keypair::generate(&rand).unwrap();
        assert_ne!(a.public, b.public);
        assert_eq!(
            a.generate_shared_secret(&b.public),
            b.generate_shared_secret(&a.public)
        );
    }

    #[test]
    fn aes128_roundtrip() {
        let rand = TestRandom::new(7);
        let key = AES128::Key::generate(&rand).unwrap();
        let nonce = [3u8; 16];
        let plaintext = b"the quick brown fox";
        let ciphertext = key.encrypt(&nonce, plaintext);
        assert_ne!(plaintext.to_vec(), ciphertext);
        assert_eq!(plaintext.to_vec(), key.decrypt(&nonce, &ciphertext));
    }

    #[test]
    fn dsa_sign_verify() {
        let rand = TestRandom::new(11);
        let keypair = fixtures::alice_keypair();
        let digest = SHA256::digest(b"content to authenticate");
        let signature = keypair.sign(&rand, &digest).unwrap();
        assert!(keypair.public_key().verify(&signature, &digest).is_ok());
    }

    #[test]
    fn dsa_verify_rejects_modified_digest() {
        let rand = TestRandom::new(12);
        let keypair = fixtures::alice_keypair();
        let digest = SHA256::digest(b"original");
        let signature = keypair.sign(&rand, &digest).unwrap();
        let tampered = SHA256::digest(b"tampered");
        assert!(keypair.public_key().verify(&signature, &tampered).is_err());
    }

    #[test]
    fn dsa_verify_rejects_other_key() {
        let rand = TestRandom::new(13);
        let digest = SHA256::digest(b"content");
        let signature = fixtures::alice_keypair().sign(&rand, &digest).unwrap();
        assert!(fixtures::bob_keypair()
            .public_key()
            .verify(&signature, &digest)
            .is_err());
    }

    #[test]
    fn dsa_fingerprint_stable_and_distinct() {
        let alice = fixtures::alice_keypair().public_key();
        let bob = fixtures::bob_keypair().public_key();
        assert_eq!(alice.fingerprint(), alice.fingerprint());
        assert_ne!(alice.fingerprint(), bob.fingerprint());
    }

    #[test]
    fn ake_secrets_deterministic() {
        let secbytes = b"arbitrary shared secret bytes";
        let d1 = OTR::AKESecrets::derive(secbytes);
        let d2 = OTR::AKESecrets::derive(secbytes);
        assert_eq!(d1.ssid, d2.ssid);
        assert_eq!(d1.m1, d2.m1);
        assert_eq!(d1.m2p, d2.m2p);
        assert_ne!(d1.ssid, [0u8; 8]);
        assert_ne!(d1.c.0, d1.cp.0);
    }

    #[test]
    fn data_secrets_mirrored_between_parties() {
        let rand = TestRandom::new(77);
        let a = DH::Keypair::generate(&rand).unwrap();
        let b = DH::Keypair::generate(&rand).unwrap();
        let s = a.generate_shared_secret(&b.public);
        let ours = OTR::DataSecrets::derive(&a.public, &b.public, &s);
        let theirs = OTR::DataSecrets::derive(&b.public, &a.public, &s);
        assert_eq!(ours.sender_crypt_key().0, theirs.receiver_crypt_key().0);
        assert_eq!(ours.receiver_crypt_key().0, theirs.sender_crypt_key().0);
        assert_eq!(ours.sender_mac_key(), theirs.receiver_mac_key());
        assert_eq!(ours.receiver_mac_key(), theirs.sender_mac_key());
    }

    #[test]
    fn constant_time_verify() {
        assert!(constant::verify(b"abcd", b"abcd").is_ok());
        assert!(constant::verify(b"abcd", b"abce").is_err());
        assert!(constant::verify(b"abcd", b"abc").is_err());
    }
}
