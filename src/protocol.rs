//! Encryption and decryption routines for age files.

use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;
use std::io::{self, Read, Write};

use crate::{
    error::{DecryptError, EncryptError},
    format::{Header, HeaderV1},
    keys::FileKey,
    primitives::stream::{PayloadKey, Stream, StreamReader, StreamWriter},
    scrypt, Identity, Recipient,
};

/// The maximum number of recipient stanzas we are willing to process in a header.
///
/// The work an attacker-supplied header can demand must be bounded; twenty recipients
/// is far beyond any reasonable use of the format.
const MAX_RECIPIENT_STANZAS: usize = 20;

pub(crate) struct Nonce([u8; 16]);

impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Nonce {
    fn random() -> Self {
        let mut nonce = [0; 16];
        OsRng.fill_bytes(&mut nonce);
        Nonce(nonce)
    }

    fn read<R: Read>(input: &mut R) -> io::Result<Self> {
        let mut nonce = [0; 16];
        input.read_exact(&mut nonce)?;
        Ok(Nonce(nonce))
    }
}

/// Handles the two kinds of age encryption.
enum EncryptorType<'a> {
    /// Encryption to a list of recipients identified by keys.
    Keys(Vec<&'a dyn Recipient>),
    /// Encryption to a passphrase.
    Passphrase(scrypt::Recipient),
}

/// Encryptor for creating an age file.
pub struct Encryptor<'a>(EncryptorType<'a>);

impl<'a> Encryptor<'a> {
    /// Returns an `Encryptor` that will create an age file encrypted to a list of
    /// recipients.
    ///
    /// Returns an error if no recipients were provided, or if a passphrase recipient
    /// is mixed with any other recipient.
    pub fn with_recipients(
        recipients: impl Iterator<Item = &'a dyn Recipient>,
    ) -> Result<Self, EncryptError> {
        let recipients: Vec<_> = recipients.collect();
        if recipients.is_empty() {
            return Err(EncryptError::MissingRecipients);
        }
        if recipients.len() > 1
            && recipients
                .iter()
                .any(|r| r.stanza_tag() == scrypt::SCRYPT_STANZA_TAG)
        {
            return Err(EncryptError::MixedRecipientAndPassphrase);
        }
        Ok(Encryptor(EncryptorType::Keys(recipients)))
    }

    /// Returns an `Encryptor` that will create an age file encrypted with a
    /// passphrase. Anyone with the passphrase can decrypt the file.
    ///
    /// This API should only be used with a passphrase that was provided by (or
    /// generated for) a human. For programmatic use cases, instead generate an
    /// [`x25519::Identity`] and use [`Encryptor::with_recipients`].
    ///
    /// [`x25519::Identity`]: crate::x25519::Identity
    pub fn with_user_passphrase(passphrase: SecretString) -> Result<Encryptor<'static>, EncryptError> {
        Ok(Encryptor(EncryptorType::Passphrase(scrypt::Recipient::new(
            passphrase,
        )?)))
    }

    /// Creates the header for this age file.
    fn prepare_header(self) -> Result<(HeaderV1, Nonce, PayloadKey), EncryptError> {
        let file_key = FileKey::generate();

        let stanzas = match self.0 {
            EncryptorType::Keys(recipients) => {
                let mut stanzas = Vec::with_capacity(recipients.len());
                for (index, recipient) in recipients.into_iter().enumerate() {
                    let stanza =
                        recipient
                            .wrap_file_key(&file_key)
                            .map_err(|e| EncryptError::Wrap {
                                index,
                                source: Box::new(e),
                            })?;
                    stanzas.push(stanza);
                }
                stanzas
            }
            EncryptorType::Passphrase(recipient) => {
                vec![recipient
                    .wrap_file_key(&file_key)
                    .map_err(|e| EncryptError::Wrap {
                        index: 0,
                        source: Box::new(e),
                    })?]
            }
        };

        let header = HeaderV1::new(stanzas, file_key.mac_key());
        let nonce = Nonce::random();
        let payload_key = file_key
            .payload_key(&header, &nonce)
            .expect("a freshly computed MAC verifies");

        Ok((header, nonce, payload_key))
    }

    /// Creates a wrapper around a writer that will encrypt its input.
    ///
    /// Returns errors from the underlying writer while writing the header.
    ///
    /// You **MUST** call [`StreamWriter::finish`] when you are done writing, in order
    /// to finish the encryption process. Failing to call [`StreamWriter::finish`] will
    /// result in a truncated file that will fail to decrypt.
    pub fn wrap_output<W: Write>(self, mut output: W) -> Result<StreamWriter<W>, EncryptError> {
        let (header, nonce, payload_key) = self.prepare_header()?;
        header.write(&mut output)?;
        output.write_all(nonce.as_ref())?;
        Ok(Stream::encrypt(payload_key, output))
    }
}

/// Decryptor for an age file.
pub struct Decryptor<R> {
    input: R,
    header: HeaderV1,
    nonce: Nonce,
}

impl<R: Read> Decryptor<R> {
    /// Attempts to create a decryptor for an age file.
    ///
    /// Returns an error if the input does not contain a valid age header, carries more
    /// recipient stanzas than we are willing to process, or carries a passphrase
    /// stanza alongside any other stanza.
    pub fn new(mut input: R) -> Result<Self, DecryptError> {
        let header = match Header::read(&mut input)? {
            Header::V1(header) => header,
            Header::Unknown(_) => return Err(DecryptError::UnknownFormat),
        };

        if header.recipients.len() > MAX_RECIPIENT_STANZAS {
            return Err(DecryptError::InvalidHeader("too many recipients"));
        }
        if header
            .recipients
            .iter()
            .any(|s| s.tag == scrypt::SCRYPT_STANZA_TAG)
            && header.recipients.len() != 1
        {
            return Err(DecryptError::InvalidHeader(
                "an scrypt recipient must be the only one",
            ));
        }

        let nonce = Nonce::read(&mut input)?;

        Ok(Decryptor {
            input,
            header,
            nonce,
        })
    }

    /// Attempts to decrypt the age file with the provided identities.
    ///
    /// Stanzas are scanned in header order, and for each stanza the identities are
    /// tried in the order provided; the first identity to unwrap a stanza wins. The
    /// header MAC is then verified under the recovered file key before any plaintext
    /// can be read.
    ///
    /// If successful, returns a reader that will provide the plaintext.
    pub fn decrypt<'a>(
        self,
        identities: impl Iterator<Item = &'a dyn Identity>,
    ) -> Result<StreamReader<R>, DecryptError> {
        let identities: Vec<_> = identities.collect();
        if identities.is_empty() {
            return Err(DecryptError::MissingIdentities);
        }

        let mut file_key = None;
        'stanzas: for stanza in &self.header.recipients {
            for identity in &identities {
                if identity.stanza_tag() != stanza.tag {
                    continue;
                }

                match identity.match_stanza(stanza) {
                    None => continue,
                    Some(Err(e)) => return Err(e),
                    Some(Ok(())) => (),
                }

                match identity.unwrap_stanza(stanza) {
                    None => continue,
                    Some(Err(e)) => return Err(e),
                    Some(Ok(key)) => {
                        file_key = Some(key);
                        break 'stanzas;
                    }
                }
            }
        }

        let file_key = file_key.ok_or(DecryptError::NoMatchingKeys)?;
        let payload_key = file_key.payload_key(&self.header, &self.nonce)?;

        Ok(Stream::decrypt(payload_key, self.input))
    }
}
