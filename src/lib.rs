// SPDX-License-Identifier: LGPL-3.0-only

use bitflags::bitflags;

mod ake;
mod conversation;
pub mod crypto;
mod encoding;
mod fragment;
mod host;
mod instancetag;
mod keymanager;
mod messages;
mod protocol;
mod smp;
mod utils;

pub use ake::{AKEError, AKEStatus};
pub use conversation::{Conversation, Received};
pub use encoding::{Fingerprint, SSID};
pub use host::{RandomSource, SystemRandomSource};
pub use instancetag::InstanceTag;

use crypto::CryptoError;

/// QUERY_MESSAGE can be sent to a peer to invite it into an OTR conversation.
pub const QUERY_MESSAGE: &[u8] = b"?OTRv2?";

/// ERROR_PREFIX makes an OTR error message when an error description is appended to it.
pub const ERROR_PREFIX: &[u8] = b"?OTR Error:";

/// OTRError is the enum containing the various errors that can occur.
#[derive(Debug, PartialEq, Eq)]
pub enum OTRError {
    /// Message contained invalid data according to the OTR protocol.
    ProtocolViolation(&'static str),
    /// Message payload is incomplete. The message cannot be reconstructed from the received bytes.
    IncompleteMessage,
    /// A message with a protocol version that the policy does not admit, or that deviates from the
    /// version negotiated for the session.
    WrongProtocolVersion,
    /// An OTR-encoded message was received, addressed to another instance of this account.
    MessageForOtherInstance,
    /// An encrypted message arrived while no secure channel is established. The payload carries
    /// the protocol replies that must still be transmitted, i.e. the SMP abort record.
    EncryptedMessageWithNoSecureChannel(Vec<Vec<u8>>),
    /// Message is unreadable: its authenticator or ciphertext failed to check out. The payload
    /// carries the error reply to transmit to the other party.
    UnreadableMessage(Vec<Vec<u8>>),
    /// A replayed or reordered data message: its counter does not exceed the highest counter
    /// accepted so far for the same key pair.
    ReplayedMessage,
    /// The other party sent an OTR error message. The payload is its textual content.
    ErrorMessage(Vec<u8>),
    /// No version accepted by local policy is advertised by the other party.
    NoAcceptableVersion,
    /// The long-term DSA keypair is required but was never supplied by the host.
    MissingLongTermKey,
    /// The conversation was finished by the other party and can no longer carry messages.
    ConversationFinished,
    /// The requested operation is not valid for the current protocol state.
    IncorrectState(&'static str),
    /// An SMP exchange is already in progress.
    SMPInProgress,
    /// There is no peer-initiated SMP exchange waiting for our secret.
    SMPSecretUnexpected,
    /// Error during authenticated key exchange.
    AuthenticationError(AKEError),
    /// Cryptographic failure: MAC mismatch, invalid signature, value out of range.
    CryptographicViolation(CryptoError),
    /// The random source failed to produce bytes. The conversation cannot make progress.
    RandomnessFailure,
}

impl From<CryptoError> for OTRError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::RandomnessFailure => OTRError::RandomnessFailure,
            err => OTRError::CryptographicViolation(err),
        }
    }
}

/// Version contains the protocol versions this engine can speak, plus a catch-all for versions
/// that may be advertised by the other party but are never negotiated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    Unsupported(u16),
    V2,
    V3,
}

bitflags! {
    /// Policy bit-flags control which protocol versions may be negotiated and how eagerly the
    /// engine pursues encryption. The bit positions follow libotr.
    pub struct Policy: u32 {
        const ALLOW_V2 = 0x0002;
        const ALLOW_V3 = 0x0004;
        const REQUIRE_ENCRYPTION = 0x0008;
        const SEND_WHITESPACE_TAG = 0x0010;
        const WHITESPACE_START_AKE = 0x0020;
        const ERROR_START_AKE = 0x0040;
    }
}

/// ProtocolStatus indicates the message-state of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStatus {
    Plaintext,
    Encrypted,
    Finished,
}

/// SecurityChange describes a change in the security state of a conversation, reported to the
/// host from `Conversation::receive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityChange {
    NoChange,
    /// NewKeys indicates that a key exchange has completed. This occurs when a conversation first
    /// becomes encrypted, and when the keys are renegotiated within an encrypted conversation.
    NewKeys,
    /// SMPSecretNeeded indicates that the peer has started an authentication and that we need to
    /// supply a secret. Call `smp_question` to get the optional, human-readable challenge and
    /// then `authenticate` to supply the matching secret.
    SMPSecretNeeded,
    /// SMPComplete indicates that an authentication completed. The identity of the peer has now
    /// been confirmed.
    SMPComplete,
    /// SMPFailed indicates that an authentication failed.
    SMPFailed,
    /// ConversationEnded indicates that the peer ended the secure conversation.
    ConversationEnded,
}
