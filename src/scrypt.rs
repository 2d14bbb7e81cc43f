//! The "scrypt" passphrase-based recipient type.
//!
//! A passphrase recipient must be the only recipient for a file: it cannot be mixed
//! with other recipient types, and cannot be used multiple times for the same file.
//! Its use is not recommended for automated systems, which should prefer
//! [`x25519::Recipient`].
//!
//! [`x25519::Recipient`]: crate::x25519::Recipient

use base64::{prelude::BASE64_STANDARD_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::{
    error::{DecryptError, EncryptError},
    keys::{FileKey, FILE_KEY_BYTES},
    primitives::{aead_decrypt, aead_encrypt, scrypt},
    util::read::base64_arg,
    Stanza,
};

pub(crate) const SCRYPT_STANZA_TAG: &str = "scrypt";
const SCRYPT_SALT_LABEL: &[u8] = b"age-encryption.org/v1/scrypt";

const SALT_LEN: usize = 16;
const ENCRYPTED_FILE_KEY_BYTES: usize = FILE_KEY_BYTES + 16;

/// Around one second of work on a modern machine. Hosts vary too much for the library
/// to benchmark its own default; a CLI may pick a larger factor and set it explicitly.
const DEFAULT_WORK_FACTOR: u8 = 18;

/// Around 16 seconds of work on a modern machine. Files demanding more work than this
/// are rejected, since the work factor is attacker-controlled input.
const DEFAULT_MAX_WORK_FACTOR: u8 = 22;

/// The salt passed to scrypt, namespaced so that a passphrase reused with some other
/// scrypt-based tool never derives the same key.
fn labelled_salt(salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let mut inner_salt = Vec::with_capacity(SCRYPT_SALT_LABEL.len() + SALT_LEN);
    inner_salt.extend_from_slice(SCRYPT_SALT_LABEL);
    inner_salt.extend_from_slice(salt);
    inner_salt
}

/// A passphrase-based recipient. Anyone with the passphrase can decrypt the file.
pub struct Recipient {
    passphrase: SecretString,
    log_n: u8,
}

impl Recipient {
    /// Returns a new passphrase recipient with the default work factor.
    ///
    /// Fails if the passphrase is empty.
    pub fn new(passphrase: SecretString) -> Result<Self, EncryptError> {
        if passphrase.expose_secret().is_empty() {
            return Err(EncryptError::EmptyPassphrase);
        }
        Ok(Recipient {
            passphrase,
            log_n: DEFAULT_WORK_FACTOR,
        })
    }

    /// Sets the scrypt work factor to `2^log_n`. Must be called before
    /// [`wrap_file_key`].
    ///
    /// [`wrap_file_key`]: crate::Recipient::wrap_file_key
    ///
    /// # Panics
    ///
    /// Panics if `log_n` is zero or larger than 30.
    pub fn set_work_factor(&mut self, log_n: u8) {
        assert!(
            (1..=30).contains(&log_n),
            "scrypt work factor must be between 1 and 30"
        );
        self.log_n = log_n;
    }
}

impl crate::Recipient for Recipient {
    fn stanza_tag(&self) -> &'static str {
        SCRYPT_STANZA_TAG
    }

    fn wrap_file_key(&self, file_key: &FileKey) -> Result<Stanza, EncryptError> {
        let mut salt = [0; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let mut enc_key = scrypt(
            &labelled_salt(&salt),
            self.log_n,
            self.passphrase.expose_secret(),
        )
        .expect("work factor is within range");
        let encrypted_file_key = aead_encrypt(&enc_key, file_key.expose_secret());
        enc_key.zeroize();

        let encoded_salt = BASE64_STANDARD_NO_PAD.encode(salt);

        Ok(Stanza {
            tag: SCRYPT_STANZA_TAG.to_owned(),
            args: vec![encoded_salt, format!("{}", self.log_n)],
            body: encrypted_file_key,
        })
    }
}

/// A passphrase-based identity.
pub struct Identity {
    passphrase: SecretString,
    max_log_n: u8,
}

impl Identity {
    /// Returns a new passphrase identity with the default maximum accepted work
    /// factor.
    pub fn new(passphrase: SecretString) -> Self {
        Identity {
            passphrase,
            max_log_n: DEFAULT_MAX_WORK_FACTOR,
        }
    }

    /// Sets the maximum accepted scrypt work factor to `2^max_log_n`. Must be called
    /// before [`unwrap_stanza`].
    ///
    /// [`unwrap_stanza`]: crate::Identity::unwrap_stanza
    ///
    /// This caps the amount of work that decryption may be asked to perform by a
    /// received file. The default is fairly high, and may not be suitable for systems
    /// processing untrusted files.
    ///
    /// # Panics
    ///
    /// Panics if `max_log_n` is zero or larger than 30.
    pub fn set_max_work_factor(&mut self, max_log_n: u8) {
        assert!(
            (1..=30).contains(&max_log_n),
            "scrypt work factor must be between 1 and 30"
        );
        self.max_log_n = max_log_n;
    }

    /// Validates the stanza structure and extracts the salt and work factor, without
    /// running the key derivation.
    fn stanza_params(&self, stanza: &Stanza) -> Option<Result<([u8; SALT_LEN], u8), DecryptError>> {
        if stanza.tag != SCRYPT_STANZA_TAG {
            return None;
        }

        if stanza.args.len() != 2 {
            return Some(Err(DecryptError::InvalidHeader(
                "invalid scrypt recipient block",
            )));
        }
        let salt = match base64_arg::<_, SALT_LEN>(&stanza.args[0]) {
            Some(salt) => salt,
            None => {
                return Some(Err(DecryptError::InvalidHeader(
                    "invalid scrypt recipient block",
                )))
            }
        };
        if stanza.body.len() != ENCRYPTED_FILE_KEY_BYTES {
            return Some(Err(DecryptError::InvalidHeader(
                "invalid scrypt recipient block",
            )));
        }

        let log_n = match stanza.args[1].parse::<u8>() {
            Ok(log_n) => log_n,
            Err(_) => {
                return Some(Err(DecryptError::InvalidHeader(
                    "invalid scrypt work factor",
                )))
            }
        };
        if log_n == 0 {
            return Some(Err(DecryptError::InvalidHeader(
                "invalid scrypt work factor",
            )));
        }
        if log_n > self.max_log_n {
            return Some(Err(DecryptError::ExcessiveWork {
                required: log_n,
                max: self.max_log_n,
            }));
        }

        Some(Ok((salt, log_n)))
    }
}

impl crate::Identity for Identity {
    fn stanza_tag(&self) -> &'static str {
        SCRYPT_STANZA_TAG
    }

    fn unwrap_stanza(&self, stanza: &Stanza) -> Option<Result<FileKey, DecryptError>> {
        let (salt, log_n) = match self.stanza_params(stanza)? {
            Ok(params) => params,
            Err(e) => return Some(Err(e)),
        };

        let mut enc_key = match scrypt(
            &labelled_salt(&salt),
            log_n,
            self.passphrase.expose_secret(),
        ) {
            Ok(enc_key) => enc_key,
            Err(_) => {
                return Some(Err(DecryptError::ExcessiveWork {
                    required: log_n,
                    max: self.max_log_n,
                }))
            }
        };

        // A wrong passphrase and a stanza that is not ours are indistinguishable by
        // design, so a failure to open the wrapped key is the non-fatal outcome.
        let file_key = aead_decrypt(&enc_key, FILE_KEY_BYTES, &stanza.body)
            .ok()
            .map(|mut pt| {
                let file_key: [u8; FILE_KEY_BYTES] =
                    pt[..].try_into().expect("plaintext is the file key");
                pt.zeroize();
                Ok(file_key.into())
            });
        enc_key.zeroize();

        file_key
    }

    fn match_stanza(&self, stanza: &Stanza) -> Option<Result<(), DecryptError>> {
        // Everything except the KDF itself can be checked cheaply.
        self.stanza_params(stanza).map(|r| r.map(|_| ()))
    }
}
