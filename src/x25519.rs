//! The "X25519" recipient type, the native age key pair.

use base64::{prelude::BASE64_STANDARD_NO_PAD, Engine};
use bech32::{ToBase32, Variant};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::{
    error::{DecryptError, EncryptError},
    keys::{FileKey, FILE_KEY_BYTES},
    primitives::{aead_decrypt, aead_encrypt, hkdf},
    util::{parse_bech32, read::base64_arg},
    Stanza,
};

// Use lower-case HRP to avoid https://github.com/rust-bitcoin/rust-bech32/issues/40
const SECRET_KEY_PREFIX: &str = "age-secret-key-";
const PUBLIC_KEY_PREFIX: &str = "age";

pub(crate) const X25519_STANZA_TAG: &str = "X25519";
const X25519_KEY_LABEL: &[u8] = b"age-encryption.org/v1/X25519";

const EPK_LEN_BYTES: usize = 32;
const ENCRYPTED_FILE_KEY_BYTES: usize = FILE_KEY_BYTES + 16;

fn wrapping_key(epk: &PublicKey, recipient_pk: &PublicKey, shared_secret: &[u8; 32]) -> [u8; 32] {
    // Both public keys are bound into the salt, so a wrapping key is only ever valid
    // for this (ephemeral, recipient) pair.
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(epk.as_bytes());
    salt.extend_from_slice(recipient_pk.as_bytes());

    hkdf(&salt, X25519_KEY_LABEL, shared_secret)
}

/// The standard age identity, based on a Curve25519 scalar. It can decrypt files
/// encrypted to the corresponding [`Recipient`].
#[derive(Clone)]
pub struct Identity(StaticSecret);

impl std::str::FromStr for Identity {
    type Err = &'static str;

    /// Parses an X25519 identity from its `AGE-SECRET-KEY-1...` Bech32 encoding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bech32(s)
            .ok_or("invalid Bech32 encoding")
            .and_then(|(hrp, bytes)| {
                if hrp == SECRET_KEY_PREFIX {
                    TryInto::<[u8; 32]>::try_into(&bytes[..])
                        .map_err(|_| "incorrect identity length")
                        .map(StaticSecret::from)
                        .map(Identity)
                } else {
                    Err("incorrect HRP")
                }
            })
    }
}

impl Identity {
    /// Generates a new identity from the OS random number generator.
    pub fn generate() -> Self {
        Identity(StaticSecret::random_from_rng(OsRng))
    }

    /// Serializes this identity as its canonical upper-case Bech32 string.
    pub fn to_string(&self) -> SecretString {
        let mut sk_bytes = self.0.to_bytes();
        let sk_base32 = sk_bytes.to_base32();
        let mut encoded =
            bech32::encode(SECRET_KEY_PREFIX, sk_base32, Variant::Bech32).expect("HRP is valid");
        let ret = SecretString::new(encoded.to_uppercase());

        // Clear intermediates.
        sk_bytes.zeroize();
        encoded.zeroize();

        ret
    }

    /// Returns the recipient key for this identity.
    pub fn to_public(&self) -> Recipient {
        Recipient((&self.0).into())
    }
}

impl crate::Identity for Identity {
    fn stanza_tag(&self) -> &'static str {
        X25519_STANZA_TAG
    }

    fn unwrap_stanza(&self, stanza: &Stanza) -> Option<Result<FileKey, DecryptError>> {
        if stanza.tag != X25519_STANZA_TAG {
            return None;
        }

        // A structurally broken stanza is a fatal error; only a wrapped key that fails
        // to open under this particular key means "not ours".
        if stanza.args.len() != 1 {
            return Some(Err(DecryptError::InvalidHeader(
                "invalid X25519 recipient block",
            )));
        }
        let epk: PublicKey = match base64_arg::<_, EPK_LEN_BYTES>(&stanza.args[0]) {
            Some(epk) => epk.into(),
            None => {
                return Some(Err(DecryptError::InvalidHeader(
                    "invalid X25519 recipient block",
                )))
            }
        };
        if stanza.body.len() != ENCRYPTED_FILE_KEY_BYTES {
            return Some(Err(DecryptError::InvalidHeader(
                "invalid X25519 recipient block",
            )));
        }

        let pk: PublicKey = (&self.0).into();
        let shared_secret = self.0.diffie_hellman(&epk);
        if !shared_secret.was_contributory() {
            return Some(Err(DecryptError::WeakSharedSecret));
        }

        let enc_key = wrapping_key(&epk, &pk, shared_secret.as_bytes());

        aead_decrypt(&enc_key, FILE_KEY_BYTES, &stanza.body)
            .ok()
            .map(|mut pt| {
                // It's ours!
                let file_key: [u8; FILE_KEY_BYTES] =
                    pt[..].try_into().expect("plaintext is the file key");
                pt.zeroize();
                Ok(file_key.into())
            })
    }
}

/// The standard age recipient, based on a Curve25519 point. Files encrypted to this
/// recipient can be decrypted with the corresponding [`Identity`].
///
/// This recipient type is anonymous: an encrypted file alone does not reveal whether
/// it is encrypted to a certain recipient.
#[derive(Clone, Debug)]
pub struct Recipient(PublicKey);

impl std::str::FromStr for Recipient {
    type Err = &'static str;

    /// Parses a recipient from its `age1...` Bech32 encoding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bech32(s)
            .ok_or("invalid Bech32 encoding")
            .and_then(|(hrp, bytes)| {
                if hrp == PUBLIC_KEY_PREFIX {
                    TryInto::<[u8; 32]>::try_into(&bytes[..])
                        .map_err(|_| "incorrect pubkey length")
                        .map(PublicKey::from)
                        .map(Recipient)
                } else {
                    Err("incorrect HRP")
                }
            })
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            bech32::encode(
                PUBLIC_KEY_PREFIX,
                self.0.as_bytes().to_base32(),
                Variant::Bech32
            )
            .expect("HRP is valid")
        )
    }
}

impl crate::Recipient for Recipient {
    fn stanza_tag(&self) -> &'static str {
        X25519_STANZA_TAG
    }

    fn wrap_file_key(&self, file_key: &FileKey) -> Result<Stanza, EncryptError> {
        let esk = EphemeralSecret::random_from_rng(OsRng);
        let epk: PublicKey = (&esk).into();

        let shared_secret = esk.diffie_hellman(&self.0);
        if !shared_secret.was_contributory() {
            return Err(EncryptError::WeakSharedSecret);
        }

        let enc_key = wrapping_key(&epk, &self.0, shared_secret.as_bytes());
        let encrypted_file_key = aead_encrypt(&enc_key, file_key.expose_secret());

        let encoded_epk = BASE64_STANDARD_NO_PAD.encode(epk.as_bytes());

        Ok(Stanza {
            tag: X25519_STANZA_TAG.to_owned(),
            args: vec![encoded_epk],
            body: encrypted_file_key,
        })
    }
}
