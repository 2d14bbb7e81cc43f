//! The age file header format.

use hmac::digest::MacError;
use std::io::{self, Read, Write};

use crate::{
    error::DecryptError,
    primitives::{HmacKey, HmacWriter},
};

const AGE_MAGIC: &[u8] = b"age-encryption.org/";
const V1_MAGIC: &[u8] = b"v1";
const STANZA_TAG: &str = "-> ";
const MAC_TAG: &[u8] = b"---";

/// A section of the header that encapsulates the file key as encrypted to a specific
/// recipient.
///
/// On the wire, a stanza is a `-> ` line carrying the tag and arguments, followed by a
/// body of canonical unpadded Base64 wrapped at 64 columns and terminated by a short
/// (possibly empty) line.
#[derive(Debug, PartialEq, Eq)]
pub struct Stanza {
    /// A tag identifying the recipient type that produced this stanza.
    pub tag: String,
    /// Zero or more arguments carrying the public parameters of the wrapping.
    pub args: Vec<String>,
    /// The wrapped file key.
    pub body: Vec<u8>,
}

/// A v1 header: an ordered sequence of recipient stanzas, authenticated by an HMAC
/// keyed from the file key.
pub(crate) struct HeaderV1 {
    pub(crate) recipients: Vec<Stanza>,
    pub(crate) mac: [u8; 32],
}

impl HeaderV1 {
    pub(crate) fn new(recipients: Vec<Stanza>, mac_key: HmacKey) -> Self {
        let mut header = HeaderV1 {
            recipients,
            mac: [0; 32],
        };

        let mut mac = HmacWriter::new(mac_key);
        cookie_factory::gen(write::header_v1_minus_mac(&header), &mut mac)
            .expect("can serialize header into HmacWriter");
        header.mac = mac.finalize();

        header
    }

    pub(crate) fn verify_mac(&self, mac_key: HmacKey) -> Result<(), MacError> {
        let mut mac = HmacWriter::new(mac_key);
        cookie_factory::gen(write::header_v1_minus_mac(self), &mut mac)
            .expect("can serialize header into HmacWriter");
        mac.verify(&self.mac)
    }

    pub(crate) fn write<W: Write>(&self, mut output: W) -> io::Result<()> {
        cookie_factory::gen(write::header_v1(self), &mut output)
            .map(|_| ())
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("failed to write header: {}", e),
                )
            })
    }
}

pub(crate) enum Header {
    V1(HeaderV1),
    Unknown(String),
}

impl Header {
    /// Reads a header incrementally from the given reader.
    ///
    /// The streaming parser only ever requests the bytes it needs, so on success the
    /// reader is positioned exactly at the first byte after the header.
    pub(crate) fn read<R: Read>(mut input: R) -> Result<Self, DecryptError> {
        let mut data = vec![];
        loop {
            match read::header(&data) {
                Ok((_, header)) => break Ok(header),
                Err(nom::Err::Incomplete(nom::Needed::Size(n))) => {
                    let m = data.len();
                    data.resize(m + n.get(), 0);
                    input.read_exact(&mut data[m..])?;
                }
                Err(nom::Err::Incomplete(nom::Needed::Unknown)) => {
                    let m = data.len();
                    data.resize(m + 1, 0);
                    input.read_exact(&mut data[m..])?;
                }
                Err(_) => break Err(DecryptError::InvalidHeader("malformed header")),
            }
        }
    }
}

mod read {
    use base64::{prelude::BASE64_STANDARD_NO_PAD, Engine};
    use nom::{
        branch::alt,
        bytes::streaming::{tag, take, take_while1, take_while_m_n},
        character::streaming::newline,
        combinator::{map, map_opt, verify},
        multi::{many1, many_till, separated_list1},
        sequence::{pair, preceded, terminated},
        IResult,
    };

    use super::*;
    use crate::util::read::base64_arg;

    fn is_base64_char(c: u8) -> bool {
        // The standard Base64 character set.
        matches!(c, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/')
    }

    /// Rejects encodings whose final character leaves non-zero trailing bits, which
    /// would allow multiple encodings of the same byte string.
    fn base64_has_no_trailing_bits(line: &[u8]) -> bool {
        match line.len() % 4 {
            0 => true,
            // A length of 1 mod 4 is never a valid Base64 encoding.
            1 => false,
            // The last character contributes up to four bits.
            2 => matches!(line.last().unwrap(), b'A' | b'Q' | b'g' | b'w'),
            // The last character contributes up to two bits.
            3 => matches!(
                line.last().unwrap(),
                b'A' | b'E'
                    | b'I'
                    | b'M'
                    | b'Q'
                    | b'U'
                    | b'Y'
                    | b'c'
                    | b'g'
                    | b'k'
                    | b'o'
                    | b's'
                    | b'w'
                    | b'0'
                    | b'4'
                    | b'8'
            ),
            _ => unreachable!(),
        }
    }

    /// Reads an "arbitrary string": one or more ASCII characters with values 33 to 126.
    fn arbitrary_string(input: &[u8]) -> IResult<&[u8], &str> {
        map(take_while1(|c| (33..=126).contains(&c)), |bytes| {
            std::str::from_utf8(bytes).expect("printable ASCII is valid UTF-8")
        })(input)
    }

    /// Reads a stanza body: zero or more full 64-column lines of Base64, followed by
    /// a mandatory short (possibly empty) line.
    fn wrapped_body(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
        map(
            many_till(
                terminated(take_while_m_n(64, 64, is_base64_char), newline),
                verify(
                    terminated(take_while_m_n(0, 63, is_base64_char), newline),
                    |line: &[u8]| base64_has_no_trailing_bits(line),
                ),
            ),
            |(full_lines, partial_line): (Vec<&[u8]>, &[u8])| {
                let mut encoded = Vec::with_capacity(full_lines.len() * 64 + partial_line.len());
                for line in &full_lines {
                    encoded.extend_from_slice(line);
                }
                encoded.extend_from_slice(partial_line);

                // The lines are guaranteed to be canonical Base64 by construction.
                BASE64_STANDARD_NO_PAD.decode(&encoded).unwrap()
            },
        )(input)
    }

    fn stanza(input: &[u8]) -> IResult<&[u8], Stanza> {
        map(
            pair(
                preceded(
                    tag(STANZA_TAG),
                    terminated(separated_list1(tag(" "), arbitrary_string), newline),
                ),
                wrapped_body,
            ),
            |(mut args, body)| {
                let tag = args.remove(0).to_owned();
                Stanza {
                    tag,
                    args: args.into_iter().map(String::from).collect(),
                    body,
                }
            },
        )(input)
    }

    fn header_v1(input: &[u8]) -> IResult<&[u8], HeaderV1> {
        preceded(
            pair(tag(V1_MAGIC), newline),
            map(
                pair(
                    many1(stanza),
                    preceded(
                        pair(tag(MAC_TAG), tag(" ")),
                        terminated(
                            map_opt(take(43usize), |mac: &[u8]| base64_arg::<_, 32>(&mac)),
                            newline,
                        ),
                    ),
                ),
                |(recipients, mac)| HeaderV1 { recipients, mac },
            ),
        )(input)
    }

    /// Reads the whole header.
    ///
    /// The first line is `age-encryption.org/` followed by an arbitrary version
    /// string; everything after the first line is owned by that version. Only `v1` is
    /// parsed further; other versions are surfaced as [`Header::Unknown`]. A `v1`
    /// header that does not parse is a hard error, not an unknown version.
    pub(super) fn header(input: &[u8]) -> IResult<&[u8], Header> {
        preceded(
            tag(AGE_MAGIC),
            alt((
                map(header_v1, Header::V1),
                map(
                    verify(arbitrary_string, |v: &str| v.as_bytes() != V1_MAGIC),
                    |s| Header::Unknown(s.to_owned()),
                ),
            )),
        )(input)
    }
}

mod write {
    use base64::{prelude::BASE64_STANDARD_NO_PAD, Engine};
    use cookie_factory::{
        combinator::{slice, string},
        multi::{all, separated_list},
        sequence::{pair, tuple},
        SerializeFn, WriteContext,
    };
    use std::io::Write;
    use std::iter;

    use super::*;
    use crate::util::write::encoded_data;

    fn wrapped_body<'a, W: 'a + Write>(body: &[u8]) -> impl SerializeFn<W> + 'a {
        let encoded = BASE64_STANDARD_NO_PAD.encode(body);

        move |mut w: WriteContext<W>| {
            let mut s = encoded.as_str();

            // Write full body lines.
            while s.len() >= 64 {
                let (line, rest) = s.split_at(64);
                w = pair(string(line), string("\n"))(w)?;
                s = rest;
            }

            // The last body line MUST be short (empty if necessary).
            pair(string(s), string("\n"))(w)
        }
    }

    fn stanza<'a, W: 'a + Write>(s: &'a Stanza) -> impl SerializeFn<W> + 'a {
        pair(
            tuple((
                string(STANZA_TAG),
                separated_list(
                    string(" "),
                    iter::once(&s.tag).chain(s.args.iter()).map(string),
                ),
                string("\n"),
            )),
            wrapped_body(&s.body),
        )
    }

    pub(super) fn header_v1_minus_mac<'a, W: 'a + Write>(
        h: &'a HeaderV1,
    ) -> impl SerializeFn<W> + 'a {
        tuple((
            slice(AGE_MAGIC),
            slice(V1_MAGIC),
            string("\n"),
            all(h.recipients.iter().map(move |s| stanza(s))),
            slice(MAC_TAG),
        ))
    }

    pub(super) fn header_v1<'a, W: 'a + Write>(h: &'a HeaderV1) -> impl SerializeFn<W> + 'a {
        tuple((
            header_v1_minus_mac(h),
            string(" "),
            encoded_data(&h.mac),
            string("\n"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, HeaderV1, Stanza};
    use crate::error::DecryptError;

    const TEST_HEADER: &str = "age-encryption.org/v1
-> X25519 CJM36AHmTbdHSuOQL+NESqyVQE75f2e610iRdLPEN20
C3ZAeY64NXS4QFrksLm3EGz+uPRyI0eQsWw7LWbbYig
-> scrypt bBjlhJVYZeE4aqUdmtRHfw 15
ZV/AhotwSGqaPCU43cepl4WYUouAa17a3xpu4G2yi5k
-> some-other-recipient mhir0Q BjH7FA 37
m/uPLMQdlIkiOOdbsrE6tFesRLZNHAYspeRKI9MJ++Xg9i7rutU34ZM+1BL6KgZf
J9FSm+GFHiVWpr1MfYCo/w
--- fgMiVLJHMlg9fW7CVG/hPS5EAU4Zeg19LyCP7SoH5nA
";

    fn parse_v1<R: std::io::Read>(data: R) -> Result<HeaderV1, DecryptError> {
        match Header::read(data)? {
            Header::V1(header) => Ok(header),
            Header::Unknown(_) => panic!("expected v1 header"),
        }
    }

    #[test]
    fn parse_and_serialize_round_trip() {
        let header = parse_v1(TEST_HEADER.as_bytes()).unwrap();
        assert_eq!(header.recipients.len(), 3);
        assert_eq!(header.recipients[0].tag, "X25519");
        assert_eq!(header.recipients[1].tag, "scrypt");
        assert_eq!(
            header.recipients[1].args,
            vec!["bBjlhJVYZeE4aqUdmtRHfw", "15"]
        );

        let mut data = vec![];
        header.write(&mut data).unwrap();
        assert_eq!(std::str::from_utf8(&data), Ok(TEST_HEADER));
    }

    #[test]
    fn parse_consumes_exactly_the_header() {
        let mut file = TEST_HEADER.as_bytes().to_vec();
        file.extend_from_slice(&[0xc9; 16]);

        let mut reader = &file[..];
        parse_v1(&mut reader).unwrap();

        // The payload nonce is still unread.
        assert_eq!(reader, &[0xc9; 16]);
    }

    #[test]
    fn parse_unknown_version() {
        let header = "age-encryption.org/v2\nnonsense follows\n";
        match Header::read(header.as_bytes()).unwrap() {
            Header::Unknown(version) => assert_eq!(version, "v2"),
            Header::V1(_) => panic!("expected unknown header"),
        }
    }

    #[test]
    fn malformed_v1_is_not_an_unknown_version() {
        // A v1 magic followed by garbage must not fall through to Header::Unknown.
        let header = "age-encryption.org/v1\nnot a stanza\n";
        assert!(matches!(
            Header::read(header.as_bytes()),
            Err(DecryptError::InvalidHeader(_))
        ));
    }

    #[test]
    fn stanza_with_empty_body() {
        let header = "age-encryption.org/v1
-> empty-body some arguments

--- fgMiVLJHMlg9fW7CVG/hPS5EAU4Zeg19LyCP7SoH5nA
";
        let parsed = parse_v1(header.as_bytes()).unwrap();
        assert_eq!(
            parsed.recipients[0],
            Stanza {
                tag: "empty-body".to_owned(),
                args: vec!["some".to_owned(), "arguments".to_owned()],
                body: vec![],
            }
        );
    }

    #[test]
    fn stanza_with_full_final_line_requires_empty_line() {
        // The body fills a complete column, so the stanza needs a trailing empty line
        // to mark its end.
        let header = "age-encryption.org/v1
-> full-body
xD7o4VEOu1t7KZQ1gDgq2FPzBEeSRqbnqvQEXdLRYy143BxR6oFxsUUJCRB0ErXA

--- fgMiVLJHMlg9fW7CVG/hPS5EAU4Zeg19LyCP7SoH5nA
";
        let parsed = parse_v1(header.as_bytes()).unwrap();
        assert_eq!(parsed.recipients[0].body.len(), 48);

        let without_empty_line = "age-encryption.org/v1
-> full-body
xD7o4VEOu1t7KZQ1gDgq2FPzBEeSRqbnqvQEXdLRYy143BxR6oFxsUUJCRB0ErXA
--- fgMiVLJHMlg9fW7CVG/hPS5EAU4Zeg19LyCP7SoH5nA
";
        assert!(parse_v1(without_empty_line.as_bytes()).is_err());
    }

    #[test]
    fn base64_padding_rejected() {
        let header = "age-encryption.org/v1
-> X25519 CJM36AHmTbdHSuOQL+NESqyVQE75f2e610iRdLPEN20
C3ZAeY64NXS4QFrksLm3EGz+uPRyI0eQsWw7LWbbYig=
--- fgMiVLJHMlg9fW7CVG/hPS5EAU4Zeg19LyCP7SoH5nA
";
        assert!(parse_v1(header.as_bytes()).is_err());
    }

    #[test]
    fn base64_trailing_bits_rejected() {
        // "dy" decodes to a single byte with four trailing bits set.
        let header = "age-encryption.org/v1
-> trailing-bits
dy
--- fgMiVLJHMlg9fW7CVG/hPS5EAU4Zeg19LyCP7SoH5nA
";
        assert!(parse_v1(header.as_bytes()).is_err());
    }
}
