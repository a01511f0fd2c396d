//! Base32 (RFC 4648, unpadded) text form of secret keys.

use crate::error::{DecodeError, Error};
use crate::validated::Validated;
use totp_rs::Secret;

/// Decode a user- or URI-supplied base32 secret.
///
/// Whitespace and trailing `=` padding are ignored and lowercase is accepted,
/// since keys are commonly shown in spaced groups.
pub fn decode(text: &str) -> Validated<Vec<u8>, Error> {
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|_| Error::from(DecodeError::InvalidSecretValue))
        .into()
}

pub fn encode(key: &[u8]) -> String {
    Secret::Raw(key.to_vec()).to_encoded().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_KEY: [u8; 10] = [0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x21, 0xde, 0xad, 0xbe, 0xef];

    #[test]
    fn decodes_canonical_text() {
        assert_eq!(decode("JBSWY3DPEHPK3PXP").valid(), Some(HELLO_KEY.to_vec()));
    }

    #[test]
    fn decodes_spaced_lowercase_text() {
        assert_eq!(decode("jbsw y3dp ehpk 3pxp").valid(), Some(HELLO_KEY.to_vec()));
    }

    #[test]
    fn decodes_short_unpadded_text() {
        assert_eq!(decode("23456").valid(), Some(vec![0xd6, 0xf9, 0xdf]));
    }

    #[test]
    fn rejects_characters_outside_the_alphabet() {
        let errors = decode("JBSW1!").into_result().unwrap_err();
        assert!(matches!(
            errors.first(),
            Error::Decode(DecodeError::InvalidSecretValue)
        ));
    }

    #[test]
    fn encodes_without_padding() {
        assert_eq!(encode(&HELLO_KEY), "JBSWY3DPEHPK3PXP");
        assert_eq!(encode(&[0xd6, 0xf9, 0xdf]), "23456");
    }
}
