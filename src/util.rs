use base64::{prelude::BASE64_STANDARD_NO_PAD, Engine};
use bech32::{FromBase32, Variant};

pub(crate) fn parse_bech32(s: &str) -> Option<(String, Vec<u8>)> {
    bech32::decode(s).ok().and_then(|(hrp, data, variant)| {
        if let Variant::Bech32 = variant {
            Vec::from_base32(&data).ok().map(|d| (hrp, d))
        } else {
            None
        }
    })
}

pub(crate) mod read {
    use super::*;

    /// Decodes an unpadded Base64 argument of a known decoded length.
    ///
    /// Returns `None` if the encoded length does not match, or the argument is not
    /// canonical Base64.
    pub(crate) fn base64_arg<A: AsRef<[u8]>, const N: usize>(arg: &A) -> Option<[u8; N]> {
        if arg.as_ref().len() != ((4 * N) + 2) / 3 {
            return None;
        }

        BASE64_STANDARD_NO_PAD
            .decode(arg.as_ref())
            .ok()
            .and_then(|decoded| decoded.try_into().ok())
    }
}

pub(crate) mod write {
    use super::*;
    use cookie_factory::{combinator::string, SerializeFn};
    use std::io::Write;

    pub(crate) fn encoded_data<W: Write>(data: &[u8]) -> impl SerializeFn<W> {
        let encoded = BASE64_STANDARD_NO_PAD.encode(data);
        string(encoded)
    }
}
