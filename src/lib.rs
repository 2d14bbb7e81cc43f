//! *Library for encrypting and decrypting age files*
//!
//! This crate implements file encryption according to the [age-encryption.org/v1]
//! specification: a small, random *file key* is wrapped once per recipient into a
//! textual header, the header is authenticated under a key derived from the file key,
//! and the payload is encrypted as a chunked authenticated stream.
//!
//! The encryption and decryption APIs are provided by [`Encryptor`] and [`Decryptor`]:
//! - For most cases (including programmatic usage), use [`Encryptor::with_recipients`]
//!   with [`x25519::Recipient`], and [`Decryptor`] with [`x25519::Identity`].
//! - APIs are available for passphrase-based encryption and decryption. These should
//!   only be used with passphrases that were provided by (or generated for) a human.
//!
//! The one-shot helpers [`encrypt`] and [`decrypt`] cover the common single-recipient,
//! in-memory case.
//!
//! [age-encryption.org/v1]: https://age-encryption.org/v1
//!
//! # Examples
//!
//! ## Recipient-based encryption
//!
//! ```
//! use std::io::{Read, Write};
//! use std::iter;
//!
//! # fn run_main() -> Result<(), Box<dyn std::error::Error>> {
//! let key = vintage::x25519::Identity::generate();
//! let pubkey = key.to_public();
//!
//! let plaintext = b"Hello world!";
//!
//! // Encrypt the plaintext to a ciphertext...
//! let encrypted = {
//!     let encryptor = vintage::Encryptor::with_recipients(iter::once(
//!         &pubkey as &dyn vintage::Recipient,
//!     ))?;
//!
//!     let mut encrypted = vec![];
//!     let mut writer = encryptor.wrap_output(&mut encrypted)?;
//!     writer.write_all(plaintext)?;
//!     writer.finish()?;
//!
//!     encrypted
//! };
//!
//! // ... and decrypt the obtained ciphertext to the plaintext again.
//! let decrypted = {
//!     let decryptor = vintage::Decryptor::new(&encrypted[..])?;
//!
//!     let mut decrypted = vec![];
//!     let mut reader = decryptor.decrypt(iter::once(&key as &dyn vintage::Identity))?;
//!     reader.read_to_end(&mut decrypted)?;
//!
//!     decrypted
//! };
//!
//! assert_eq!(decrypted, plaintext);
//! # Ok(())
//! # }
//! # run_main().unwrap();
//! ```
//!
//! ## Passphrase-based encryption
//!
//! ```no_run
//! use secrecy::SecretString;
//! use std::io::{Read, Write};
//! use std::iter;
//!
//! # fn run_main() -> Result<(), Box<dyn std::error::Error>> {
//! let plaintext = b"Hello world!";
//! let passphrase = "this is not a good passphrase";
//!
//! let encrypted = {
//!     let encryptor = vintage::Encryptor::with_user_passphrase(SecretString::new(
//!         passphrase.to_owned(),
//!     ))?;
//!
//!     let mut encrypted = vec![];
//!     let mut writer = encryptor.wrap_output(&mut encrypted)?;
//!     writer.write_all(plaintext)?;
//!     writer.finish()?;
//!
//!     encrypted
//! };
//!
//! let decrypted = {
//!     let identity = vintage::scrypt::Identity::new(SecretString::new(passphrase.to_owned()));
//!     let decryptor = vintage::Decryptor::new(&encrypted[..])?;
//!
//!     let mut decrypted = vec![];
//!     let mut reader = decryptor.decrypt(iter::once(&identity as &dyn vintage::Identity))?;
//!     reader.read_to_end(&mut decrypted)?;
//!
//!     decrypted
//! };
//!
//! assert_eq!(decrypted, plaintext);
//! # Ok(())
//! # }
//! # run_main().unwrap();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod format;
mod keys;
mod primitives;
mod protocol;
pub mod scrypt;
mod simple;
mod util;
pub mod x25519;

pub use error::{DecryptError, EncryptError};
pub use format::Stanza;
pub use keys::FileKey;
pub use primitives::stream::{StreamReader, StreamWriter};
pub use protocol::{Decryptor, Encryptor};
pub use simple::{decrypt, encrypt};

/// A public key or other value that can wrap an opaque file key into a recipient
/// stanza.
///
/// Implementations are borrowed by [`Encryptor`] and are never mutated by it, so a
/// single value may serve any number of encryption operations.
pub trait Recipient {
    /// Returns the stanza type produced by this recipient.
    ///
    /// This is matched against [`Stanza::tag`] when scanning a header, and drives the
    /// policy that a passphrase recipient cannot be combined with any other.
    fn stanza_tag(&self) -> &'static str;

    /// Wraps the given file key, returning a stanza to be placed in the file header.
    ///
    /// You should not need to call this directly; instead, pass recipients to
    /// [`Encryptor::with_recipients`].
    fn wrap_file_key(&self, file_key: &FileKey) -> Result<Stanza, EncryptError>;
}

/// A private key or other value that can unwrap an opaque file key from a recipient
/// stanza.
pub trait Identity {
    /// Returns the stanza type this identity can unwrap.
    fn stanza_tag(&self) -> &'static str;

    /// Attempts to unwrap the given stanza with this identity.
    ///
    /// You should not need to call this directly; instead, pass identities to
    /// [`Decryptor::decrypt`].
    ///
    /// Returns:
    /// - `Some(Ok(file_key))` on success.
    /// - `Some(Err(e))` if the stanza is addressed to this identity but cannot be
    ///   processed; this aborts the whole decryption.
    /// - `None` if the stanza is not for this identity, and the next candidate should
    ///   be tried.
    fn unwrap_stanza(&self, stanza: &Stanza) -> Option<Result<FileKey, DecryptError>>;

    /// Reports whether this identity could unwrap the given stanza, without performing
    /// the expensive part of the key derivation.
    ///
    /// [`Decryptor::decrypt`] calls this before [`Identity::unwrap_stanza`], and skips
    /// the identity when it returns `None`. The outcomes have the same meaning as for
    /// `unwrap_stanza`, with `Some(Ok(()))` meaning "maybe; try unwrapping".
    ///
    /// The default implementation always answers "maybe".
    fn match_stanza(&self, _stanza: &Stanza) -> Option<Result<(), DecryptError>> {
        Some(Ok(()))
    }
}
