// SPDX-License-Identifier: LGPL-3.0-only

use num_bigint::BigUint;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::{
    ake,
    encoding::{KeyID, MessageFlags, OTRDecoder, OTREncodable, OTREncoder, CTR, MAC, MAC_LEN, TLV},
    instancetag::{InstanceTag, INSTANCE_ZERO},
    utils, OTRError, Version,
};

const OTR_USE_INFORMATION_MESSAGE: &[u8] = b"An Off-The-Record conversation has been requested.";

const OTR_ERROR_PREFIX: &[u8] = b"?OTR Error:";
const OTR_QUERY_MARKER: &[u8] = b"?OTR";
const OTR_ENCODED_PREFIX: &[u8] = b"?OTR:";
const OTR_ENCODED_SUFFIX: &[u8] = b".";

const OTR_DH_COMMIT_TYPE_CODE: u8 = 0x02;
const OTR_DH_KEY_TYPE_CODE: u8 = 0x0a;
const OTR_REVEAL_SIGNATURE_TYPE_CODE: u8 = 0x11;
const OTR_SIGNATURE_TYPE_CODE: u8 = 0x12;

/// OTR encoded message type code for data messages, shared by both protocol versions.
const OTR_DATA_TYPE_CODE: u8 = 0x03;

static WHITESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r" \t  \t\t\t\t \t \t \t  ([ \t]{8})*")
        .expect("BUG: failed to compile hard-coded regex-pattern.")
});
const WHITESPACE_PREFIX: &[u8] = b" \t  \t\t\t\t \t \t \t  ";
const WHITESPACE_TAG_OTRV1: &[u8] = b" \t \t  \t ";
const WHITESPACE_TAG_OTRV2: &[u8] = b"  \t\t  \t ";
const WHITESPACE_TAG_OTRV3: &[u8] = b"  \t\t  \t\t";

pub fn parse(data: &[u8]) -> Result<MessageType, OTRError> {
    if data.starts_with(OTR_ENCODED_PREFIX) && data.ends_with(OTR_ENCODED_SUFFIX) {
        let start = OTR_ENCODED_PREFIX.len();
        let end = data.len() - OTR_ENCODED_SUFFIX.len();
        parse_encoded_message(&data[start..end])
    } else {
        Ok(parse_plain_message(data))
    }
}

fn parse_encoded_message(data: &[u8]) -> Result<MessageType, OTRError> {
    // transports are allowed to re-wrap long lines, so whitespace inside the armor is tolerated.
    let stripped: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let data = base64::decode(&stripped).or(Err(OTRError::ProtocolViolation(
        "Invalid message content: content cannot be decoded from base64.",
    )))?;
    let mut decoder = OTRDecoder::new(&data);
    let version: Version = match decoder.read_short()? {
        0u16 => {
            return Err(OTRError::ProtocolViolation(
                "A protocol version must be provided.",
            ))
        }
        2u16 => Version::V2,
        3u16 => Version::V3,
        _ => return Err(OTRError::WrongProtocolVersion),
    };
    let message_type = decoder.read_byte()?;
    let (sender, receiver) = match version {
        // Version 2 messages do not carry instance tags.
        Version::V2 => (INSTANCE_ZERO, INSTANCE_ZERO),
        Version::V3 => (decoder.read_instance_tag()?, decoder.read_instance_tag()?),
        Version::Unsupported(_) => unreachable!("BUG: unsupported versions are rejected above."),
    };
    let encoded = parse_encoded_content(message_type, &mut decoder)?;
    decoder.done()?;
    Ok(MessageType::Encoded(EncodedMessage {
        version,
        sender,
        receiver,
        message: encoded,
    }))
}

fn parse_encoded_content(
    message_type: u8,
    decoder: &mut OTRDecoder,
) -> Result<EncodedMessageType, OTRError> {
    match message_type {
        OTR_DH_COMMIT_TYPE_CODE => Ok(EncodedMessageType::DHCommit(
            ake::DHCommitMessage::decode(decoder)?,
        )),
        OTR_DH_KEY_TYPE_CODE => Ok(EncodedMessageType::DHKey(ake::DHKeyMessage::decode(
            decoder,
        )?)),
        OTR_REVEAL_SIGNATURE_TYPE_CODE => Ok(EncodedMessageType::RevealSignature(
            ake::RevealSignatureMessage::decode(decoder)?,
        )),
        OTR_SIGNATURE_TYPE_CODE => Ok(EncodedMessageType::Signature(
            ake::SignatureMessage::decode(decoder)?,
        )),
        OTR_DATA_TYPE_CODE => Ok(EncodedMessageType::Data(DataMessage::decode(decoder)?)),
        _ => Err(OTRError::ProtocolViolation(
            "Invalid or unknown message type.",
        )),
    }
}

fn parse_plain_message(data: &[u8]) -> MessageType {
    if data.starts_with(OTR_ERROR_PREFIX) {
        // `?OTR Error:` prefix must start at beginning of message to avoid people messing with
        // OTR in normal plaintext messages.
        return MessageType::Error(Vec::from(&data[OTR_ERROR_PREFIX.len()..]));
    }
    if let Some(versions) = parse_query(data) {
        return MessageType::Query(versions);
    }
    if let Some(tagged) = WHITESPACE_PATTERN.find(data) {
        let cleaned = WHITESPACE_PATTERN.replace_all(data, b"".as_ref()).to_vec();
        // the repetition group captures only its last iteration, so the tags are recovered from
        // the full match with the fixed-size prefix stripped off.
        let tags = &data[tagged.start() + WHITESPACE_PREFIX.len()..tagged.end()];
        return MessageType::Tagged(parse_whitespace_tags(tags), cleaned);
    }
    MessageType::Plaintext(data.to_vec())
}

/// parse_query recognizes the published query syntaxes anywhere in a plaintext message:
/// `?OTR?` (version 1), `?OTRv<digits>?` and the combined `?OTR?v<digits>`. Digits of versions
/// this engine does not speak are preserved as `Unsupported` so that version selection can
/// consider, and reject, them explicitly.
fn parse_query(data: &[u8]) -> Option<Vec<Version>> {
    let mut offset = 0;
    while offset + OTR_QUERY_MARKER.len() <= data.len() {
        let pos = find(&data[offset..], OTR_QUERY_MARKER)? + offset;
        let mut idx = pos + OTR_QUERY_MARKER.len();
        let mut versions = Vec::new();
        let mut recognized = false;
        if data.get(idx) == Some(&b'?') {
            versions.push(Version::Unsupported(1));
            recognized = true;
            idx += 1;
        }
        if data.get(idx) == Some(&b'v') {
            idx += 1;
            let mut digits = Vec::new();
            while idx < data.len() && data[idx].is_ascii_digit() {
                digits.push(match data[idx] {
                    b'2' => Version::V2,
                    b'3' => Version::V3,
                    digit => Version::Unsupported(u16::from(digit - b'0')),
                });
                idx += 1;
            }
            if data.get(idx) == Some(&b'?') {
                recognized = true;
                versions.extend(digits);
            } else if recognized {
                // `?OTR?v<digits>` does not require the closing question mark.
                versions.extend(digits);
            }
        }
        if recognized {
            return Some(versions);
        }
        offset = pos + 1;
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_whitespace_tags(data: &[u8]) -> Vec<Version> {
    let mut result = Vec::new();
    for i in (0..data.len()).step_by(8) {
        match &data[i..i + 8] {
            WHITESPACE_TAG_OTRV1 => result.push(Version::Unsupported(1)),
            WHITESPACE_TAG_OTRV2 => result.push(Version::V2),
            WHITESPACE_TAG_OTRV3 => result.push(Version::V3),
            _ => { /* ignore unknown tags */ }
        }
    }
    result
}

pub enum MessageType {
    Error(Vec<u8>),
    Plaintext(Vec<u8>),
    Tagged(Vec<Version>, Vec<u8>),
    Query(Vec<Version>),
    Encoded(EncodedMessage),
}

pub struct EncodedMessage {
    pub version: Version,
    pub sender: InstanceTag,
    pub receiver: InstanceTag,
    pub message: EncodedMessageType,
}

impl OTREncodable for EncodedMessage {
    fn encode(&self, encoder: &mut OTREncoder) {
        encoder
            .write_short(encode_version(&self.version))
            .write_byte(match self.message {
                EncodedMessageType::DHCommit(_) => OTR_DH_COMMIT_TYPE_CODE,
                EncodedMessageType::DHKey(_) => OTR_DH_KEY_TYPE_CODE,
                EncodedMessageType::RevealSignature(_) => OTR_REVEAL_SIGNATURE_TYPE_CODE,
                EncodedMessageType::Signature(_) => OTR_SIGNATURE_TYPE_CODE,
                EncodedMessageType::Data(_) => OTR_DATA_TYPE_CODE,
            });
        if self.version == Version::V3 {
            encoder.write_int(self.sender).write_int(self.receiver);
        }
        encoder.write_encodable(match &self.message {
            EncodedMessageType::DHCommit(msg) => msg,
            EncodedMessageType::DHKey(msg) => msg,
            EncodedMessageType::RevealSignature(msg) => msg,
            EncodedMessageType::Signature(msg) => msg,
            EncodedMessageType::Data(msg) => msg,
        });
    }
}

/// EncodedMessageType represents the OTR-encoded message structures in use by OTR version 2
/// and 3.
#[allow(clippy::large_enum_variant)]
pub enum EncodedMessageType {
    /// DH-Commit-message in the AKE-process.
    DHCommit(ake::DHCommitMessage),
    /// DH-Key-message in the AKE-process.
    DHKey(ake::DHKeyMessage),
    /// RevealSignature-message in the AKE-process.
    RevealSignature(ake::RevealSignatureMessage),
    /// Signature-message in the AKE-process.
    Signature(ake::SignatureMessage),
    /// (Encrypted) data-message.
    Data(DataMessage),
}

pub struct DataMessage {
    pub flags: MessageFlags,
    pub sender_keyid: KeyID,
    pub receiver_keyid: KeyID,
    pub dh_y: BigUint,
    // OTR-spec:
    //   "The initial counter is a 16-byte value whose first 8 bytes
    //    are the above "top half of counter init" value, and whose last 8
    //    bytes are all 0x00. Note that counter mode does not change the length
    //    of the message, so no message padding needs to be done. If you *want*
    //    to do message padding (to disguise the length of your message), use
    //    the above TLV of type 0."
    pub ctr: CTR,
    pub encrypted: Vec<u8>,
    pub authenticator: MAC,
    /// revealed contains recent keys, previously used for authentication, that should now become
    /// public.
    pub revealed: Vec<u8>,
}

impl DataMessage {
    fn decode(decoder: &mut OTRDecoder) -> Result<Self, OTRError> {
        let flags = MessageFlags::from_bits(decoder.read_byte()?)
            .ok_or(OTRError::ProtocolViolation("Invalid message flags"))?;
        let sender_keyid = utils::u32::nonzero(decoder.read_int()?)
            .ok_or(OTRError::ProtocolViolation("Invalid KeyID: cannot be 0"))?;
        let receiver_keyid = utils::u32::nonzero(decoder.read_int()?)
            .ok_or(OTRError::ProtocolViolation("Invalid KeyID: cannot be 0"))?;
        let dh_y = decoder.read_mpi()?;
        let ctr = decoder.read_ctr()?;
        let encrypted = decoder.read_data()?;
        let authenticator = decoder.read_mac()?;
        let revealed = decoder.read_data()?;
        if revealed.len() % MAC_LEN != 0 {
            return Err(OTRError::ProtocolViolation(
                "Revealed MAC keys do not have the expected length.",
            ));
        }
        Ok(Self {
            flags,
            sender_keyid,
            receiver_keyid,
            dh_y,
            ctr,
            encrypted,
            authenticator,
            revealed,
        })
    }
}

impl OTREncodable for DataMessage {
    fn encode(&self, encoder: &mut OTREncoder) {
        encoder
            .write_byte(self.flags.bits())
            .write_int(self.sender_keyid)
            .write_int(self.receiver_keyid)
            .write_mpi(&self.dh_y)
            .write_ctr(&self.ctr)
            .write_data(&self.encrypted)
            .write_mac(&self.authenticator)
            .write_data(&self.revealed);
    }
}

pub fn encode_message(
    version: &Version,
    sender: InstanceTag,
    receiver: InstanceTag,
    message: EncodedMessageType,
) -> Vec<u8> {
    serialize_message(&MessageType::Encoded(EncodedMessage {
        version: version.clone(),
        sender,
        receiver,
        message,
    }))
}

/// `serialize_message` (straight-forwardly) serializes provided message into a byte-sequence.
pub fn serialize_message(msg: &MessageType) -> Vec<u8> {
    let mut buffer = Vec::<u8>::new();
    match msg {
        MessageType::Error(error) => {
            buffer.extend_from_slice(OTR_ERROR_PREFIX);
            buffer.extend(error);
            buffer
        }
        MessageType::Plaintext(message) => {
            buffer.extend(message);
            buffer
        }
        MessageType::Tagged(versions, message) => {
            assert!(!versions.is_empty());
            buffer.extend_from_slice(WHITESPACE_PREFIX);
            for v in utils::alloc::vec_unique(versions.clone()) {
                match v {
                    Version::V2 => buffer.extend_from_slice(WHITESPACE_TAG_OTRV2),
                    Version::V3 => buffer.extend_from_slice(WHITESPACE_TAG_OTRV3),
                    Version::Unsupported(_) => {
                        panic!("BUG: unsupported versions should be avoided.")
                    }
                }
            }
            buffer.extend(message);
            buffer
        }
        MessageType::Query(versions) => {
            assert!(!versions.is_empty());
            // NOTE: each version listed at most once, in arbitrary order.
            // (Version 1 has deviating syntax but is no longer supported.)
            buffer.extend_from_slice(b"?OTRv");
            for v in utils::alloc::vec_unique(versions.clone()) {
                match v {
                    Version::V2 => buffer.push(b'2'),
                    Version::V3 => buffer.push(b'3'),
                    Version::Unsupported(_) => {
                        panic!("BUG: unsupported version should be avoided.")
                    }
                }
            }
            buffer.push(b'?');
            buffer.push(b' ');
            buffer.extend_from_slice(OTR_USE_INFORMATION_MESSAGE);
            buffer
        }
        MessageType::Encoded(encoded_message) => {
            buffer.extend_from_slice(OTR_ENCODED_PREFIX);
            buffer.extend(
                base64::encode(OTREncoder::new().write_encodable(encoded_message).to_vec())
                    .into_bytes(),
            );
            buffer.extend_from_slice(OTR_ENCODED_SUFFIX);
            buffer
        }
    }
}

/// `encode_authenticator_data` encodes everything of a data message from the message header up
/// to and including the encrypted payload, which is the content covered by the authenticator.
pub fn encode_authenticator_data(
    version: &Version,
    sender: InstanceTag,
    receiver: InstanceTag,
    message: &DataMessage,
) -> Vec<u8> {
    let mut encoder = OTREncoder::new();
    encoder
        .write_short(encode_version(version))
        .write_byte(OTR_DATA_TYPE_CODE);
    if *version == Version::V3 {
        encoder.write_int(sender).write_int(receiver);
    }
    encoder
        .write_byte(message.flags.bits())
        .write_int(message.sender_keyid)
        .write_int(message.receiver_keyid)
        .write_mpi(&message.dh_y)
        .write_ctr(&message.ctr)
        .write_data(&message.encrypted)
        .to_vec()
}

/// `split_plaintext_tlvs` splits a decrypted data message payload into the human-readable part
/// and the TLV records that follow the first NUL byte.
pub fn split_plaintext_tlvs(decrypted: &[u8]) -> Result<(Vec<u8>, Vec<TLV>), OTRError> {
    match decrypted.iter().position(|b| *b == 0u8) {
        None => Ok((decrypted.to_vec(), Vec::new())),
        Some(pos) => {
            let mut tlvs = Vec::new();
            let mut decoder = OTRDecoder::new(&decrypted[pos + 1..]);
            while !decoder.is_empty() {
                tlvs.push(decoder.read_tlv()?);
            }
            Ok((Vec::from(&decrypted[..pos]), tlvs))
        }
    }
}

fn encode_version(version: &Version) -> u16 {
    match version {
        Version::V2 => 2,
        Version::V3 => 3,
        Version::Unsupported(_) => panic!("BUG: unsupported version"),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        encode_message, parse, serialize_message, split_plaintext_tlvs, EncodedMessageType,
        MessageType,
    };
    use crate::encoding::{MessageFlags, TLV};
    use crate::Version;
    use num_bigint::BigUint;

    #[test]
    fn parse_empty_message() {
        match parse(b"").unwrap() {
            MessageType::Plaintext(content) => assert_eq!(b"", content.as_slice()),
            _ => panic!("Incorrect message type received."),
        }
    }

    #[test]
    fn parse_hello_world_message() {
        match parse(b"Hello world! Greetings from <undisclosed location>").unwrap() {
            MessageType::Plaintext(content) => assert_eq!(
                b"Hello world! Greetings from <undisclosed location>".as_ref(),
                content.as_slice()
            ),
            _ => panic!("Incorrect message type received."),
        }
    }

    #[test]
    fn parse_message_false_query_tag() {
        match parse(b"?OTRv Hello world!").unwrap() {
            MessageType::Plaintext(content) => {
                assert_eq!(b"?OTRv Hello world!".as_ref(), content.as_slice())
            }
            _ => panic!("Incorrect message type received."),
        }
    }

    #[test]
    fn parse_message_false_query_tag_2() {
        match parse(b"OTRv23? Hello world!").unwrap() {
            MessageType::Plaintext(content) => {
                assert_eq!(b"OTRv23? Hello world!".as_ref(), content.as_slice())
            }
            _ => panic!("Incorrect message type received."),
        }
    }

    #[test]
    fn parse_query_message_all_published_syntaxes() {
        let expectations: Vec<(&[u8], Vec<Version>)> = vec![
            (b"?OTR?", vec![Version::Unsupported(1)]),
            (b"?OTRv2?", vec![Version::V2]),
            (b"?OTRv23?", vec![Version::V2, Version::V3]),
            (b"?OTR?v2", vec![Version::Unsupported(1), Version::V2]),
            (
                b"?OTRv248?",
                vec![
                    Version::V2,
                    Version::Unsupported(4),
                    Version::Unsupported(8),
                ],
            ),
            (b"?OTR?v?", vec![Version::Unsupported(1)]),
            (b"?OTRv?", vec![]),
        ];
        for (message, expected) in expectations {
            match parse(message).unwrap() {
                MessageType::Query(versions) => assert_eq!(expected, versions),
                _ => panic!("Unexpected message type."),
            }
        }
    }

    #[test]
    fn parse_query_message_mid_text() {
        match parse(b"hey, I heard about this: ?OTRv3? Can you speak it?").unwrap() {
            MessageType::Query(versions) => assert_eq!(vec![Version::V3], versions),
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn query_format_parse_roundtrip() {
        for versions in [
            vec![Version::V2],
            vec![Version::V3],
            vec![Version::V2, Version::V3],
        ] {
            let formatted = serialize_message(&MessageType::Query(versions.clone()));
            match parse(&formatted).unwrap() {
                MessageType::Query(parsed) => assert_eq!(versions, parsed),
                _ => panic!("Unexpected message type."),
            }
        }
    }

    #[test]
    fn parse_tagged_message_no_versions() {
        match parse(b"Hello \t  \t\t\t\t \t \t \t   world!").unwrap() {
            MessageType::Tagged(versions, content) => {
                assert_eq!(0, versions.len());
                assert_eq!(b"Hello world!", content.as_slice());
            }
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn parse_tagged_message_versions_v1v2() {
        match parse(b"Hello \t  \t\t\t\t \t \t \t   \t \t  \t   \t\t  \t  world!").unwrap() {
            MessageType::Tagged(versions, content) => {
                assert_eq!(vec![Version::Unsupported(1), Version::V2], versions);
                assert_eq!(b"Hello world!", content.as_slice());
            }
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn parse_tagged_message_versions_v3() {
        match parse(b"Hello \t  \t\t\t\t \t \t \t    \t\t  \t\t world!").unwrap() {
            MessageType::Tagged(versions, content) => {
                assert_eq!(vec![Version::V3], versions);
                assert_eq!(b"Hello world!", content.as_slice());
            }
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn tagged_message_serialize_parse_roundtrip() {
        let serialized = serialize_message(&MessageType::Tagged(
            vec![Version::V2, Version::V3],
            b"hi there".to_vec(),
        ));
        match parse(&serialized).unwrap() {
            MessageType::Tagged(versions, content) => {
                assert_eq!(vec![Version::V2, Version::V3], versions);
                assert_eq!(b"hi there".to_vec(), content);
            }
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn parse_error_message() {
        match parse(b"?OTR Error: something went wrong").unwrap() {
            MessageType::Error(content) => {
                assert_eq!(b" something went wrong".to_vec(), content)
            }
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn encoded_data_message_roundtrip_v3() {
        let message = super::DataMessage {
            flags: MessageFlags::empty(),
            sender_keyid: 1,
            receiver_keyid: 2,
            dh_y: BigUint::from(0xabcdefu32),
            ctr: [0, 0, 0, 0, 0, 0, 0, 1],
            encrypted: vec![1, 2, 3, 4, 5],
            authenticator: [7u8; 20],
            revealed: vec![9u8; 20],
        };
        let encoded = encode_message(
            &Version::V3,
            0x100,
            0x200,
            EncodedMessageType::Data(message),
        );
        assert!(encoded.starts_with(b"?OTR:"));
        assert!(encoded.ends_with(b"."));
        match parse(&encoded).unwrap() {
            MessageType::Encoded(msg) => {
                assert_eq!(Version::V3, msg.version);
                assert_eq!(0x100, msg.sender);
                assert_eq!(0x200, msg.receiver);
                match msg.message {
                    EncodedMessageType::Data(data) => {
                        assert_eq!(1, data.sender_keyid);
                        assert_eq!(2, data.receiver_keyid);
                        assert_eq!(BigUint::from(0xabcdefu32), data.dh_y);
                        assert_eq!([0, 0, 0, 0, 0, 0, 0, 1], data.ctr);
                        assert_eq!(vec![1, 2, 3, 4, 5], data.encrypted);
                        assert_eq!([7u8; 20], data.authenticator);
                        assert_eq!(vec![9u8; 20], data.revealed);
                    }
                    _ => panic!("Unexpected encoded message type."),
                }
            }
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn encoded_data_message_v2_has_no_instance_tags() {
        let message = super::DataMessage {
            flags: MessageFlags::IGNORE_UNREADABLE,
            sender_keyid: 1,
            receiver_keyid: 1,
            dh_y: BigUint::from(99u8),
            ctr: [0, 0, 0, 0, 0, 0, 0, 1],
            encrypted: vec![0xaa],
            authenticator: [1u8; 20],
            revealed: Vec::new(),
        };
        let encoded = encode_message(&Version::V2, 0, 0, EncodedMessageType::Data(message));
        let unarmored =
            base64::decode(&encoded[b"?OTR:".len()..encoded.len() - 1]).unwrap();
        assert_eq!(&[0x00, 0x02, 0x03], &unarmored[..3]);
        // flags byte follows the header immediately: no instance tags in version 2.
        assert_eq!(MessageFlags::IGNORE_UNREADABLE.bits(), unarmored[3]);
        match parse(&encoded).unwrap() {
            MessageType::Encoded(msg) => assert_eq!(Version::V2, msg.version),
            _ => panic!("Unexpected message type."),
        }
    }

    #[test]
    fn split_payload_without_tlvs() {
        let (plaintext, tlvs) = split_plaintext_tlvs(b"just a message").unwrap();
        assert_eq!(b"just a message".to_vec(), plaintext);
        assert!(tlvs.is_empty());
    }

    #[test]
    fn split_payload_with_tlvs() {
        let mut payload = b"visible".to_vec();
        payload.extend_from_slice(&[0, 0, 1, 0, 0, 0, 6, 0, 2, 0xab, 0xcd]);
        let (plaintext, tlvs) = split_plaintext_tlvs(&payload).unwrap();
        assert_eq!(b"visible".to_vec(), plaintext);
        assert_eq!(vec![TLV(1, vec![]), TLV(6, vec![0xab, 0xcd])], tlvs);
    }
}
