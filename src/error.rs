//! Error types.

use std::fmt;
use std::io;

/// The various errors that can be returned during the encryption process.
#[derive(Debug)]
pub enum EncryptError {
    /// The passphrase given to a passphrase recipient was empty.
    EmptyPassphrase,
    /// An I/O error occurred during encryption.
    Io(io::Error),
    /// The encryptor was not given any recipients.
    MissingRecipients,
    /// A passphrase recipient was mixed with other recipients.
    MixedRecipientAndPassphrase,
    /// The X25519 key agreement for a recipient produced an all-zero shared secret,
    /// which means the recipient key is a low-order point.
    WeakSharedSecret,
    /// Wrapping the file key for one of the recipients failed.
    Wrap {
        /// The position of the failing recipient in the list given to the encryptor.
        index: usize,
        /// The underlying failure.
        source: Box<EncryptError>,
    },
}

impl fmt::Display for EncryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptError::EmptyPassphrase => write!(f, "passphrase can't be empty"),
            EncryptError::Io(e) => e.fmt(f),
            EncryptError::MissingRecipients => write!(f, "no recipients specified"),
            EncryptError::MixedRecipientAndPassphrase => {
                write!(f, "an scrypt recipient must be the only one")
            }
            EncryptError::WeakSharedSecret => write!(f, "degenerate X25519 shared secret"),
            EncryptError::Wrap { index, source } => {
                write!(f, "failed to wrap key for recipient #{}: {}", index, source)
            }
        }
    }
}

impl From<io::Error> for EncryptError {
    fn from(e: io::Error) -> Self {
        EncryptError::Io(e)
    }
}

impl std::error::Error for EncryptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncryptError::Io(inner) => Some(inner),
            EncryptError::Wrap { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The various errors that can be returned during the decryption process.
#[derive(Debug)]
pub enum DecryptError {
    /// The file failed to decrypt.
    DecryptionFailed,
    /// The file was encrypted with an scrypt work factor above the accepted maximum.
    ExcessiveWork {
        /// The work factor required to decrypt.
        required: u8,
        /// The maximum work factor this identity will accept.
        max: u8,
    },
    /// The header was structurally invalid.
    InvalidHeader(&'static str),
    /// The MAC in the header did not verify, so the header has been tampered with or
    /// was assembled without knowledge of the file key.
    InvalidMac,
    /// An I/O error occurred during decryption.
    Io(io::Error),
    /// The decryptor was not given any identities.
    MissingIdentities,
    /// None of the provided identities matched any recipient stanza.
    NoMatchingKeys,
    /// An unknown format version, probably produced by a newer client.
    UnknownFormat,
    /// The X25519 key agreement for a stanza produced an all-zero shared secret.
    WeakSharedSecret,
}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptError::DecryptionFailed => write!(f, "decryption failed"),
            DecryptError::ExcessiveWork { required, max } => write!(
                f,
                "scrypt work factor too large: {} (maximum accepted is {})",
                required, max
            ),
            DecryptError::InvalidHeader(reason) => write!(f, "invalid header: {}", reason),
            DecryptError::InvalidMac => write!(f, "bad header MAC"),
            DecryptError::Io(e) => e.fmt(f),
            DecryptError::MissingIdentities => write!(f, "no identities specified"),
            DecryptError::NoMatchingKeys => write!(f, "no identity matched a recipient"),
            DecryptError::UnknownFormat => write!(f, "unknown format version"),
            DecryptError::WeakSharedSecret => write!(f, "degenerate X25519 shared secret"),
        }
    }
}

impl From<chacha20poly1305::aead::Error> for DecryptError {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        DecryptError::DecryptionFailed
    }
}

impl From<hmac::digest::MacError> for DecryptError {
    fn from(_: hmac::digest::MacError) -> Self {
        DecryptError::InvalidMac
    }
}

impl From<io::Error> for DecryptError {
    fn from(e: io::Error) -> Self {
        DecryptError::Io(e)
    }
}

impl std::error::Error for DecryptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecryptError::Io(inner) => Some(inner),
            _ => None,
        }
    }
}
