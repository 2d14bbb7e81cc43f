//! One-shot helpers for the common case.

use std::io::{Read, Write};
use std::iter;

use crate::{
    error::{DecryptError, EncryptError},
    Decryptor, Encryptor, Identity, Recipient,
};

/// Encrypts the given plaintext to the given recipient.
///
/// To encrypt to more than one recipient, use [`Encryptor::with_recipients`].
pub fn encrypt(recipient: &impl Recipient, plaintext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let encryptor = Encryptor::with_recipients(iter::once(recipient as &dyn Recipient))
        .expect("we provided exactly one recipient");

    let mut ciphertext = Vec::with_capacity(plaintext.len());
    let mut writer = encryptor.wrap_output(&mut ciphertext)?;
    writer.write_all(plaintext)?;
    writer.finish()?;

    Ok(ciphertext)
}

/// Decrypts the given ciphertext with the given identity.
///
/// To attempt decryption with more than one identity, use [`Decryptor`].
pub fn decrypt(identity: &impl Identity, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
    let decryptor = Decryptor::new(ciphertext)?;

    let mut plaintext = vec![];
    let mut reader = decryptor.decrypt(iter::once(identity as &dyn Identity))?;
    reader.read_to_end(&mut plaintext)?;

    Ok(plaintext)
}
