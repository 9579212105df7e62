// SPDX-License-Identifier: LGPL-3.0-only

use crate::{crypto::CryptoError, host::RandomSource, OTRError};

/// InstanceTag represents a client instance tag. The instance tag is used to distinguish between
/// multiple clients using the same account.
pub type InstanceTag = u32;

pub const INSTANCE_ZERO: InstanceTag = 0;
pub const INSTANCE_MIN_VALID: InstanceTag = 0x0000_0100;

pub fn verify_instance_tag(tag: u32) -> Result<InstanceTag, OTRError> {
    if tag > INSTANCE_ZERO && tag < INSTANCE_MIN_VALID {
        Err(OTRError::ProtocolViolation("Illegal instance tag."))
    } else {
        Ok(tag)
    }
}

/// random_tag produces a valid instance tag from the conversation's random source.
pub fn random_tag(rand: &dyn RandomSource) -> Result<InstanceTag, CryptoError> {
    let mut bytes = [0u8; 4];
    loop {
        rand.fill(&mut bytes)?;
        let tag = u32::from_be_bytes(bytes);
        if tag >= INSTANCE_MIN_VALID {
            return Ok(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{random_tag, verify_instance_tag, INSTANCE_MIN_VALID};
    use crate::host::testing::TestRandom;

    #[test]
    fn test_verify_instance_tag() {
        assert!(verify_instance_tag(0).is_ok());
        assert!(verify_instance_tag(1).is_err());
        assert!(verify_instance_tag(0xff).is_err());
        assert!(verify_instance_tag(0x100).is_ok());
        assert!(verify_instance_tag(u32::MAX).is_ok());
    }

    #[test]
    fn test_random_tag_valid() {
        let rand = TestRandom::new(99);
        for _ in 0..32 {
            assert!(random_tag(&rand).unwrap() >= INSTANCE_MIN_VALID);
        }
    }
}
