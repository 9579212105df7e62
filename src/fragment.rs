// SPDX-License-Identifier: LGPL-3.0-only

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::{instancetag::{InstanceTag, INSTANCE_ZERO}, Version};

const OTR_FRAGMENT_V2_PREFIX: &[u8] = b"?OTR,";
const OTR_FRAGMENT_V3_PREFIX: &[u8] = b"?OTR|";

static FRAGMENT_V2_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\?OTR,(\d{1,5}),(\d{1,5}),([A-Za-z0-9\+/=\?:\.]+),$")
        .expect("BUG: failed to compile hard-coded regex-pattern.")
});
static FRAGMENT_V3_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\?OTR\|([0-9a-fA-F]{1,8})\|([0-9a-fA-F]{1,8}),(\d{1,5}),(\d{1,5}),([A-Za-z0-9\+/=\?:\.]+),$")
        .expect("BUG: failed to compile hard-coded regex-pattern.")
});

/// match_fragment tests whether the payload uses one of the two fragment envelopes. The version 2
/// format carries no instance tags, the version 3 format leads with sender and receiver tags.
pub fn match_fragment(content: &[u8]) -> bool {
    content.starts_with(OTR_FRAGMENT_V2_PREFIX) || content.starts_with(OTR_FRAGMENT_V3_PREFIX)
}

#[derive(Debug)]
pub struct Fragment {
    pub sender: InstanceTag,
    pub receiver: InstanceTag,
    pub part: u16,
    pub total: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FragmentError {
    /// Fragment envelope does not follow the defined syntax.
    InvalidFormat,
    /// Fragment fields carry illegal values.
    InvalidData,
    /// Fragment arrived out of sequence. Partial assembly state is discarded.
    UnexpectedFragment,
    /// Fragment accepted, but more fragments are needed to reassemble the message.
    IncompleteResult,
}

pub fn parse(content: &[u8]) -> Result<Fragment, FragmentError> {
    if content.starts_with(OTR_FRAGMENT_V3_PREFIX) {
        let captures = FRAGMENT_V3_PATTERN
            .captures(content)
            .ok_or(FragmentError::InvalidFormat)?;
        return Ok(Fragment {
            sender: parse_hex_tag(captures.get(1).expect("BUG: group must be present").as_bytes())?,
            receiver: parse_hex_tag(captures.get(2).expect("BUG: group must be present").as_bytes())?,
            part: parse_count(captures.get(3).expect("BUG: group must be present").as_bytes())?,
            total: parse_count(captures.get(4).expect("BUG: group must be present").as_bytes())?,
            payload: Vec::from(captures.get(5).expect("BUG: group must be present").as_bytes()),
        });
    }
    let captures = FRAGMENT_V2_PATTERN
        .captures(content)
        .ok_or(FragmentError::InvalidFormat)?;
    Ok(Fragment {
        sender: INSTANCE_ZERO,
        receiver: INSTANCE_ZERO,
        part: parse_count(captures.get(1).expect("BUG: group must be present").as_bytes())?,
        total: parse_count(captures.get(2).expect("BUG: group must be present").as_bytes())?,
        payload: Vec::from(captures.get(3).expect("BUG: group must be present").as_bytes()),
    })
}

fn parse_hex_tag(content: &[u8]) -> Result<InstanceTag, FragmentError> {
    let text = std::str::from_utf8(content).or(Err(FragmentError::InvalidFormat))?;
    u32::from_str_radix(text, 16).or(Err(FragmentError::InvalidFormat))
}

fn parse_count(content: &[u8]) -> Result<u16, FragmentError> {
    let text = std::str::from_utf8(content).or(Err(FragmentError::InvalidFormat))?;
    text.parse::<u16>().or(Err(FragmentError::InvalidFormat))
}

pub fn verify(fragment: &Fragment) -> Result<(), FragmentError> {
    if fragment.total == 0 || fragment.part == 0 || fragment.part > fragment.total {
        return Err(FragmentError::InvalidData);
    }
    Ok(())
}

/// Assembler reassembles a message from fragments that arrive in-order. A fragment with index 1
/// restarts assembly, discarding any partial progress; any out-of-sequence fragment discards the
/// partial state altogether.
pub struct Assembler {
    total: u16,
    last: u16,
    content: Vec<u8>,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            total: 0,
            last: 0,
            content: Vec::new(),
        }
    }

    pub fn assemble(&mut self, fragment: Fragment) -> Result<Vec<u8>, FragmentError> {
        verify(&fragment)?;
        if fragment.part == 1 {
            self.total = fragment.total;
            self.last = 1;
            self.content = fragment.payload;
        } else if fragment.total == self.total && fragment.part == self.last + 1 {
            self.last = fragment.part;
            self.content.extend(fragment.payload);
        } else {
            self.reset();
            return Err(FragmentError::UnexpectedFragment);
        }
        if self.last == self.total {
            let content = std::mem::take(&mut self.content);
            self.reset();
            Ok(content)
        } else {
            Err(FragmentError::IncompleteResult)
        }
    }

    fn reset(&mut self) {
        self.total = 0;
        self.last = 0;
        self.content.clear();
    }
}

/// fragment splits an encoded OTR message into fragments of at most `max_size` bytes each,
/// envelope included. Version 2 fragments use the tag-less format, version 3 fragments lead with
/// the sender and receiver instance tags.
pub fn fragment(
    version: &Version,
    sender: InstanceTag,
    receiver: InstanceTag,
    max_size: usize,
    content: &[u8],
) -> Result<Vec<Vec<u8>>, FragmentError> {
    assert!(!content.is_empty());
    if max_size == 0 {
        return Err(FragmentError::InvalidData);
    }
    let prefix_len = match version {
        Version::V2 => OTR_FRAGMENT_V2_PREFIX.len(),
        // "?OTR|" + 8 hex digits + "|" + 8 hex digits + ","
        Version::V3 => OTR_FRAGMENT_V3_PREFIX.len() + 8 + 1 + 8 + 1,
        Version::Unsupported(_) => panic!("BUG: unsupported version"),
    };
    let mut total = std::cmp::max(1, content.len() / max_size);
    let capacity = loop {
        if total > u16::MAX as usize {
            return Err(FragmentError::InvalidData);
        }
        // index and total take at most as many digits as the total, plus separating and
        // terminating commas.
        let overhead = prefix_len + 2 * num_digits(total) + 3;
        if max_size <= overhead {
            return Err(FragmentError::InvalidData);
        }
        let capacity = max_size - overhead;
        if total * capacity >= content.len() {
            break capacity;
        }
        total += 1;
    };
    let chunk_size = std::cmp::min(capacity, (content.len() + total - 1) / total);
    let mut fragments = Vec::with_capacity(total);
    for (index, chunk) in content.chunks(chunk_size).enumerate() {
        let mut buffer = Vec::with_capacity(chunk.len() + prefix_len + 8);
        match version {
            Version::V2 => buffer.extend_from_slice(OTR_FRAGMENT_V2_PREFIX),
            Version::V3 => {
                buffer.extend_from_slice(
                    format!("?OTR|{:08x}|{:08x},", sender, receiver).as_bytes(),
                );
            }
            Version::Unsupported(_) => panic!("BUG: unsupported version"),
        }
        buffer.extend_from_slice(format!("{},{},", index + 1, total).as_bytes());
        buffer.extend_from_slice(chunk);
        buffer.push(b',');
        fragments.push(buffer);
    }
    assert_eq!(total, fragments.len());
    Ok(fragments)
}

fn num_digits(mut value: usize) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::{fragment, match_fragment, parse, verify, Assembler, FragmentError};
    use crate::Version;

    #[test]
    fn test_match_fragment() {
        assert!(match_fragment(b"?OTR,1,2,payload,"));
        assert!(match_fragment(b"?OTR|1f2e3d4c|00000100,1,2,payload,"));
        assert!(!match_fragment(b"?OTR:AAMC."));
        assert!(!match_fragment(b"plain message"));
    }

    #[test]
    fn parse_v2_fragment() {
        let fragment = parse(b"?OTR,1,3,?OTR:AAMDabcd+/=.,").unwrap();
        assert_eq!(0, fragment.sender);
        assert_eq!(0, fragment.receiver);
        assert_eq!(1, fragment.part);
        assert_eq!(3, fragment.total);
        assert_eq!(b"?OTR:AAMDabcd+/=.".to_vec(), fragment.payload);
    }

    #[test]
    fn parse_v3_fragment() {
        let fragment = parse(b"?OTR|5a73a599|27e31597,2,3,base64chunk,").unwrap();
        assert_eq!(0x5a73_a599, fragment.sender);
        assert_eq!(0x27e3_1597, fragment.receiver);
        assert_eq!(2, fragment.part);
        assert_eq!(3, fragment.total);
        assert_eq!(b"base64chunk".to_vec(), fragment.payload);
    }

    #[test]
    fn parse_rejects_incomplete_envelope() {
        assert_eq!(
            FragmentError::InvalidFormat,
            parse(b"?OTR,1,3,unterminated").unwrap_err()
        );
    }

    #[test]
    fn verify_rejects_illegal_indexes() {
        let mut fragment = parse(b"?OTR,1,3,payload,").unwrap();
        assert!(verify(&fragment).is_ok());
        fragment.part = 0;
        assert_eq!(FragmentError::InvalidData, verify(&fragment).unwrap_err());
        fragment.part = 4;
        assert_eq!(FragmentError::InvalidData, verify(&fragment).unwrap_err());
        fragment.part = 2;
        fragment.total = 0;
        assert_eq!(FragmentError::InvalidData, verify(&fragment).unwrap_err());
    }

    #[test]
    fn assemble_in_order() {
        let mut assembler = Assembler::new();
        assert_eq!(
            FragmentError::IncompleteResult,
            assembler.assemble(parse(b"?OTR,1,3,aaa,").unwrap()).unwrap_err()
        );
        assert_eq!(
            FragmentError::IncompleteResult,
            assembler.assemble(parse(b"?OTR,2,3,bbb,").unwrap()).unwrap_err()
        );
        assert_eq!(
            b"aaabbbccc".to_vec(),
            assembler.assemble(parse(b"?OTR,3,3,ccc,").unwrap()).unwrap()
        );
    }

    #[test]
    fn assemble_restarts_on_first_fragment() {
        let mut assembler = Assembler::new();
        assembler.assemble(parse(b"?OTR,1,2,old,").unwrap()).unwrap_err();
        assembler.assemble(parse(b"?OTR,1,2,new,").unwrap()).unwrap_err();
        assert_eq!(
            b"newrest".to_vec(),
            assembler.assemble(parse(b"?OTR,2,2,rest,").unwrap()).unwrap()
        );
    }

    #[test]
    fn assemble_discards_on_out_of_sequence() {
        let mut assembler = Assembler::new();
        assembler.assemble(parse(b"?OTR,1,3,aaa,").unwrap()).unwrap_err();
        assert_eq!(
            FragmentError::UnexpectedFragment,
            assembler.assemble(parse(b"?OTR,3,3,ccc,").unwrap()).unwrap_err()
        );
        // partial state is gone, continuing the old sequence is futile.
        assert_eq!(
            FragmentError::UnexpectedFragment,
            assembler.assemble(parse(b"?OTR,2,3,bbb,").unwrap()).unwrap_err()
        );
    }

    #[test]
    fn fragment_sizes_and_count() {
        let content: Vec<u8> = std::iter::repeat(b'A').take(350).collect();
        let fragments = fragment(&Version::V2, 0, 0, 100, &content).unwrap();
        assert_eq!(4, fragments.len());
        for (i, f) in fragments.iter().enumerate() {
            assert!(f.len() <= 100);
            assert!(f.starts_with(format!("?OTR,{},4,", i + 1).as_bytes()));
            assert!(f.ends_with(b","));
        }
        let mut assembler = Assembler::new();
        let mut result = Err(FragmentError::IncompleteResult);
        for f in &fragments {
            result = assembler.assemble(parse(f).unwrap());
        }
        assert_eq!(content, result.unwrap());
    }

    #[test]
    fn fragment_v3_roundtrip() {
        let content: Vec<u8> = std::iter::repeat(b'b').take(200).collect();
        let fragments = fragment(&Version::V3, 0x100, 0x200, 80, &content).unwrap();
        let mut assembler = Assembler::new();
        let mut result = Err(FragmentError::IncompleteResult);
        for f in &fragments {
            assert!(f.len() <= 80);
            assert!(f.starts_with(b"?OTR|00000100|00000200,"));
            let parsed = parse(f).unwrap();
            assert_eq!(0x100, parsed.sender);
            assert_eq!(0x200, parsed.receiver);
            result = assembler.assemble(parsed);
        }
        assert_eq!(content, result.unwrap());
    }

    #[test]
    fn fragment_rejects_impossible_size() {
        assert_eq!(
            FragmentError::InvalidData,
            fragment(&Version::V2, 0, 0, 10, b"0123456789abcdef").unwrap_err()
        );
    }
}
