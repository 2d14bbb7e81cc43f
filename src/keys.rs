//! The file key and the keys derived from it.

use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};

use crate::{
    error::DecryptError,
    format::HeaderV1,
    primitives::{hkdf, stream::PayloadKey, HmacKey},
    protocol::Nonce,
};

/// The length of an age file key.
pub(crate) const FILE_KEY_BYTES: usize = 16;

const HEADER_KEY_LABEL: &[u8] = b"header";
const PAYLOAD_KEY_LABEL: &[u8] = b"payload";

/// The file key: the per-file symmetric secret that is wrapped to every recipient, and
/// from which the header MAC key and the payload key are derived.
///
/// The buffer is cleared on drop. A file key only exists for the duration of a single
/// encryption or decryption operation.
pub struct FileKey(Secret<[u8; FILE_KEY_BYTES]>);

impl From<[u8; FILE_KEY_BYTES]> for FileKey {
    fn from(file_key: [u8; FILE_KEY_BYTES]) -> Self {
        FileKey(Secret::new(file_key))
    }
}

impl ExposeSecret<[u8; FILE_KEY_BYTES]> for FileKey {
    fn expose_secret(&self) -> &[u8; FILE_KEY_BYTES] {
        self.0.expose_secret()
    }
}

impl FileKey {
    pub(crate) fn generate() -> Self {
        let mut file_key = [0; FILE_KEY_BYTES];
        OsRng.fill_bytes(&mut file_key);
        file_key.into()
    }

    pub(crate) fn mac_key(&self) -> HmacKey {
        HmacKey(Secret::new(hkdf(
            &[],
            HEADER_KEY_LABEL,
            self.0.expose_secret(),
        )))
    }

    /// Verifies the header MAC and derives the payload key.
    ///
    /// The MAC check and the derivation are deliberately fused: no payload key exists
    /// for a header that was not assembled by someone knowing this file key.
    pub(crate) fn payload_key(
        &self,
        header: &HeaderV1,
        nonce: &Nonce,
    ) -> Result<PayloadKey, DecryptError> {
        header.verify_mac(self.mac_key())?;

        Ok(PayloadKey(Secret::new(hkdf(
            nonce.as_ref(),
            PAYLOAD_KEY_LABEL,
            self.0.expose_secret(),
        ))))
    }
}
