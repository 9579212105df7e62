// SPDX-License-Identifier: LGPL-3.0-only

use bitflags::bitflags;
use num_bigint::BigUint;

use crate::{crypto::DSA, instancetag::{verify_instance_tag, InstanceTag}, OTRError};

pub const CTR_LEN: usize = 8;
pub const MAC_LEN: usize = 20;
pub const SIGNATURE_LEN: usize = 40;
pub const FINGERPRINT_LEN: usize = 20;
pub const SSID_LEN: usize = 8;

/// CTR is the counter-half of the AES-CTR initialization vector of a data message. The low eight
/// bytes of the vector are always zero.
pub type CTR = [u8; CTR_LEN];

/// MAC is a 20-byte message authenticator as used on the wire.
pub type MAC = [u8; MAC_LEN];

/// Signature is a DSA signature: the r and s components, each 20 bytes, concatenated.
pub type Signature = [u8; SIGNATURE_LEN];

/// Fingerprint is the SHA-1 digest identifying a long-term public key.
pub type Fingerprint = [u8; FINGERPRINT_LEN];

/// SSID is the secure session identifier derived once per key exchange.
pub type SSID = [u8; SSID_LEN];

/// KeyID numbers the rotating DH keys of one party. Zero is illegal on the wire.
pub type KeyID = u32;

/// TLV is a type-length-value record carried in the decrypted payload of a data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TLV(pub u16, pub Vec<u8>);

pub const TLV_TYPE_PADDING: u16 = 0;
pub const TLV_TYPE_DISCONNECT: u16 = 1;

bitflags! {
    /// MessageFlags are the bit-flags set on OTR-encoded data messages.
    pub struct MessageFlags: u8 {
        /// FLAG_IGNORE_UNREADABLE indicates that the message can be ignored if it cannot be read.
        /// This is typically used for control messages that have no value to the user, to indicate
        /// that there is no point in alerting the user of an inaccessible message.
        const IGNORE_UNREADABLE = 0b0000_0001;
    }
}

/// OTRDecoder contains the logic for reading protocol primitives from a byte-buffer.
pub struct OTRDecoder<'a>(&'a [u8]);

impl<'a> OTRDecoder<'a> {
    pub fn new(content: &'a [u8]) -> Self {
        Self(content)
    }

    /// read_byte reads a single byte from the buffer.
    pub fn read_byte(&mut self) -> Result<u8, OTRError> {
        if self.0.is_empty() {
            return Err(OTRError::IncompleteMessage);
        }
        let value = self.0[0];
        self.0 = &self.0[1..];
        Ok(value)
    }

    /// read_short reads a short value (2 bytes, big-endian) from the buffer.
    pub fn read_short(&mut self) -> Result<u16, OTRError> {
        if self.0.len() < 2 {
            return Err(OTRError::IncompleteMessage);
        }
        let value = u16::from_be_bytes([self.0[0], self.0[1]]);
        self.0 = &self.0[2..];
        Ok(value)
    }

    /// read_int reads an integer value (4 bytes, big-endian) from the buffer.
    pub fn read_int(&mut self) -> Result<u32, OTRError> {
        if self.0.len() < 4 {
            return Err(OTRError::IncompleteMessage);
        }
        let value = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        self.0 = &self.0[4..];
        Ok(value)
    }

    pub fn read_instance_tag(&mut self) -> Result<InstanceTag, OTRError> {
        verify_instance_tag(self.read_int()?)
    }

    /// read_data reads variable-length data from the buffer.
    pub fn read_data(&mut self) -> Result<Vec<u8>, OTRError> {
        let len = self.read_int()? as usize;
        if self.0.len() < len {
            return Err(OTRError::IncompleteMessage);
        }
        let data = Vec::from(&self.0[..len]);
        self.0 = &self.0[len..];
        Ok(data)
    }

    /// read_mpi reads a length-prefixed big-endian unsigned integer from the buffer.
    pub fn read_mpi(&mut self) -> Result<BigUint, OTRError> {
        let len = self.read_int()? as usize;
        if self.0.len() < len {
            return Err(OTRError::IncompleteMessage);
        }
        let mpi = BigUint::from_bytes_be(&self.0[..len]);
        self.0 = &self.0[len..];
        Ok(mpi)
    }

    /// read_mpi_sequence reads a counted sequence of MPI values, as defined by SMP.
    pub fn read_mpi_sequence(&mut self) -> Result<Vec<BigUint>, OTRError> {
        let len = self.read_int()? as usize;
        let mut mpis = Vec::new();
        for _ in 0..len {
            mpis.push(self.read_mpi()?);
        }
        Ok(mpis)
    }

    /// read_ctr reads a CTR value from the buffer.
    pub fn read_ctr(&mut self) -> Result<CTR, OTRError> {
        if self.0.len() < CTR_LEN {
            return Err(OTRError::IncompleteMessage);
        }
        let mut ctr: CTR = [0; CTR_LEN];
        ctr.copy_from_slice(&self.0[..CTR_LEN]);
        self.0 = &self.0[CTR_LEN..];
        Ok(ctr)
    }

    /// read_mac reads a MAC value from the buffer.
    pub fn read_mac(&mut self) -> Result<MAC, OTRError> {
        if self.0.len() < MAC_LEN {
            return Err(OTRError::IncompleteMessage);
        }
        let mut mac: MAC = [0; MAC_LEN];
        mac.copy_from_slice(&self.0[..MAC_LEN]);
        self.0 = &self.0[MAC_LEN..];
        Ok(mac)
    }

    /// read_public_key reads a DSA public key from the buffer.
    pub fn read_public_key(&mut self) -> Result<DSA::PublicKey, OTRError> {
        let pktype = self.read_short()?;
        if pktype != 0u16 {
            return Err(OTRError::ProtocolViolation(
                "Unsupported/invalid public key type.",
            ));
        }
        let p = self.read_mpi()?;
        let q = self.read_mpi()?;
        let g = self.read_mpi()?;
        let y = self.read_mpi()?;
        Ok(DSA::PublicKey::new(p, q, g, y))
    }

    /// read_signature reads a DSA signature (IEEE-P1363 format) from the buffer.
    pub fn read_signature(&mut self) -> Result<Signature, OTRError> {
        if self.0.len() < SIGNATURE_LEN {
            return Err(OTRError::IncompleteMessage);
        }
        let mut sig: Signature = [0; SIGNATURE_LEN];
        sig.copy_from_slice(&self.0[..SIGNATURE_LEN]);
        self.0 = &self.0[SIGNATURE_LEN..];
        Ok(sig)
    }

    /// read_tlv reads a single type-length-value record from the buffer.
    pub fn read_tlv(&mut self) -> Result<TLV, OTRError> {
        let typ = self.read_short()?;
        let len = self.read_short()? as usize;
        if self.0.len() < len {
            return Err(OTRError::IncompleteMessage);
        }
        let data = Vec::from(&self.0[..len]);
        self.0 = &self.0[len..];
        Ok(TLV(typ, data))
    }

    /// read_bytes_null_terminated reads bytes up to the next NUL byte, or all remaining bytes if
    /// no NUL is present. The NUL itself is consumed but not returned.
    pub fn read_bytes_null_terminated(&mut self) -> Vec<u8> {
        match self.0.iter().position(|b| *b == 0u8) {
            Some(pos) => {
                let content = Vec::from(&self.0[..pos]);
                self.0 = &self.0[pos + 1..];
                content
            }
            None => {
                let content = Vec::from(self.0);
                self.0 = &self.0[self.0.len()..];
                content
            }
        }
    }

    /// is_empty indicates that the buffer is fully consumed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// done verifies that the buffer is fully consumed, i.e. no content is left unread.
    pub fn done(&self) -> Result<(), OTRError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(OTRError::ProtocolViolation("data left over in buffer"))
        }
    }
}

/// OTREncodable is implemented by every message structure that writes itself onto the wire.
pub trait OTREncodable {
    fn encode(&self, encoder: &mut OTREncoder);
}

pub struct OTREncoder {
    buffer: Vec<u8>,
}

impl OTREncoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn write_encodable(&mut self, encodable: &dyn OTREncodable) -> &mut Self {
        encodable.encode(self);
        self
    }

    pub fn write_byte(&mut self, v: u8) -> &mut Self {
        self.buffer.push(v);
        self
    }

    pub fn write_short(&mut self, v: u16) -> &mut Self {
        self.buffer.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_int(&mut self, v: u32) -> &mut Self {
        self.buffer.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_data(&mut self, v: &[u8]) -> &mut Self {
        assert!(v.len() <= u32::MAX as usize);
        self.write_int(v.len() as u32);
        self.buffer.extend_from_slice(v);
        self
    }

    /// write_mpi writes the minimal big-endian representation: no leading zero bytes, except the
    /// value zero itself which is the single byte 0.
    pub fn write_mpi(&mut self, v: &BigUint) -> &mut Self {
        self.write_data(&v.to_bytes_be())
    }

    /// write_mpi_sequence writes a sequence of MPI values in the format defined by SMP:
    /// num_mpis, mpi1, mpi2, ...
    pub fn write_mpi_sequence(&mut self, mpis: &[&BigUint]) -> &mut Self {
        self.write_int(mpis.len() as u32);
        for mpi in mpis {
            self.write_mpi(mpi);
        }
        self
    }

    pub fn write_ctr(&mut self, v: &CTR) -> &mut Self {
        self.buffer.extend_from_slice(v);
        self
    }

    pub fn write_mac(&mut self, v: &MAC) -> &mut Self {
        self.buffer.extend_from_slice(v);
        self
    }

    pub fn write_public_key(&mut self, key: &DSA::PublicKey) -> &mut Self {
        self.write_short(0u16)
            .write_mpi(key.p())
            .write_mpi(key.q())
            .write_mpi(key.g())
            .write_mpi(key.y())
    }

    pub fn write_signature(&mut self, sig: &Signature) -> &mut Self {
        self.buffer.extend_from_slice(sig);
        self
    }

    pub fn write_tlv(&mut self, tlv: &TLV) -> &mut Self {
        assert!(tlv.1.len() <= u16::MAX as usize);
        self.write_short(tlv.0).write_short(tlv.1.len() as u16);
        self.buffer.extend_from_slice(&tlv.1);
        self
    }

    pub fn write_bytes_null_terminated(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self.buffer.push(0u8);
        self
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.buffer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{OTRDecoder, OTREncoder, TLV};
    use num_bigint::BigUint;

    #[test]
    fn encode_fixed_width_primitives_big_endian() {
        let encoded = OTREncoder::new()
            .write_byte(0x13)
            .write_short(0x0304)
            .write_int(0x0506_0708)
            .to_vec();
        assert_eq!(vec![0x13, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08], encoded);
    }

    #[test]
    fn decode_encoded_primitives() {
        let encoded = OTREncoder::new()
            .write_byte(0xff)
            .write_short(513)
            .write_int(70000)
            .write_data(b"hello")
            .write_mpi(&BigUint::from(0x1234_5678u32))
            .to_vec();
        let mut decoder = OTRDecoder::new(&encoded);
        assert_eq!(0xff, decoder.read_byte().unwrap());
        assert_eq!(513, decoder.read_short().unwrap());
        assert_eq!(70000, decoder.read_int().unwrap());
        assert_eq!(b"hello".to_vec(), decoder.read_data().unwrap());
        assert_eq!(BigUint::from(0x1234_5678u32), decoder.read_mpi().unwrap());
        assert!(decoder.done().is_ok());
    }

    #[test]
    fn decode_incomplete_data() {
        let mut encoded = OTREncoder::new().write_data(b"truncated").to_vec();
        encoded.truncate(encoded.len() - 2);
        let mut decoder = OTRDecoder::new(&encoded);
        assert!(decoder.read_data().is_err());
    }

    #[test]
    fn mpi_zero_is_single_byte() {
        let encoded = OTREncoder::new().write_mpi(&BigUint::from(0u8)).to_vec();
        assert_eq!(vec![0, 0, 0, 1, 0], encoded);
    }

    #[test]
    fn mpi_no_leading_zeros() {
        let v = BigUint::from_bytes_be(&[0, 0, 1, 2]);
        let encoded = OTREncoder::new().write_mpi(&v).to_vec();
        assert_eq!(vec![0, 0, 0, 2, 1, 2], encoded);
    }

    #[test]
    fn mpi_sequence_roundtrip() {
        let a = BigUint::from(12u8);
        let b = BigUint::from(99_999u32);
        let encoded = OTREncoder::new().write_mpi_sequence(&[&a, &b]).to_vec();
        let mut decoder = OTRDecoder::new(&encoded);
        assert_eq!(vec![a, b], decoder.read_mpi_sequence().unwrap());
        assert!(decoder.done().is_ok());
    }

    #[test]
    fn tlv_roundtrip() {
        let tlv = TLV(6, vec![1, 2, 3]);
        let encoded = OTREncoder::new().write_tlv(&tlv).to_vec();
        assert_eq!(vec![0, 6, 0, 3, 1, 2, 3], encoded);
        let mut decoder = OTRDecoder::new(&encoded);
        assert_eq!(tlv, decoder.read_tlv().unwrap());
    }

    #[test]
    fn ctr_and_mac_roundtrip() {
        let ctr = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mac = [9u8; 20];
        let encoded = OTREncoder::new().write_ctr(&ctr).write_mac(&mac).to_vec();
        let mut decoder = OTRDecoder::new(&encoded);
        assert_eq!(ctr, decoder.read_ctr().unwrap());
        assert_eq!(mac, decoder.read_mac().unwrap());
    }

    #[test]
    fn null_terminated_bytes() {
        let mut decoder = OTRDecoder::new(b"question\0rest");
        assert_eq!(b"question".to_vec(), decoder.read_bytes_null_terminated());
        assert_eq!(b"rest".to_vec(), decoder.read_bytes_null_terminated());
        assert!(decoder.is_empty());
    }
}
