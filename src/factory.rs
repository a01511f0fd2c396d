//! Builds stored tokens: decode, persist in the secret store, wrap with an id.
//! Every step depends on the previous one, so the first failure wins.

use crate::error::Error;
use crate::keychain::{SecretRef, SecretStore};
use crate::secret;
use crate::token::{Algorithm, Otp, Token, TokenKind};
use crate::uri;
use crate::validated::Validated;
use uuid::Uuid;

/// Token entered field by field.
#[allow(clippy::too_many_arguments)]
pub fn add_from_fields(
    keychain: &mut impl SecretStore,
    issuer: &str,
    account: &str,
    key: &str,
    kind: TokenKind,
    algorithm: Algorithm,
    digits: u32,
    id: Uuid,
) -> Validated<Otp, Error> {
    secret::decode(key)
        .flat_map(|key| {
            uri::check_kind(kind)
                .zip(uri::check_digits(digits))
                .map(|(kind, digits)| Token::new(kind, key, algorithm, digits, issuer, account))
        })
        .flat_map(|token| {
            uri::encode(&token)
                .flat_map(|text| keychain.create(&token.account, &token.issuer, &text))
                .map(|secret_ref| Otp::new(id, secret_ref, token))
        })
}

/// Token from an `otpauth://` text; the text itself is what gets stored.
pub fn add_from_uri(keychain: &mut impl SecretStore, text: &str, id: Uuid) -> Validated<Otp, Error> {
    uri::decode(text).flat_map(|token| {
        keychain
            .create(&token.account, &token.issuer, text.trim())
            .map(|secret_ref| Otp::new(id, secret_ref, token))
    })
}

/// Token previously stored under `secret_ref`.
pub fn from_keychain(keychain: &impl SecretStore, secret_ref: SecretRef, id: Uuid) -> Validated<Otp, Error> {
    keychain
        .read(&secret_ref)
        .flat_map(|text| uri::decode(&text))
        .map(|token| Otp::new(id, secret_ref, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::keychain::MemoryKeychain;

    const URL: &str = "otpauth://totp/Example:alice@google.com?secret=JBSWY3DPEHPK3PXP&issuer=Example";

    #[test]
    fn fields_are_stored_as_canonical_url() {
        let mut keychain = MemoryKeychain::new();
        let otp = add_from_fields(
            &mut keychain,
            "GitHub",
            "david@gofake1.net",
            "23456",
            TokenKind::TimeStep(30),
            Algorithm::Sha1,
            6,
            Uuid::nil(),
        )
        .valid()
        .unwrap();

        assert_eq!(otp.id, Uuid::nil());
        assert_eq!(otp.token.issuer, "GitHub");
        assert_eq!(
            keychain.read(&otp.secret_ref).valid().as_deref(),
            Some("otpauth://totp/GitHub:david@gofake1.net?secret=23456&issuer=GitHub&algorithm=SHA1&digits=6&period=30")
        );
        assert_eq!(keychain.labels(&otp.secret_ref), Some(("david@gofake1.net", "GitHub")));
    }

    #[test]
    fn bad_secret_never_reaches_the_store() {
        let mut keychain = MemoryKeychain::new();
        let result = add_from_fields(
            &mut keychain,
            "GitHub",
            "david",
            "not base32!",
            TokenKind::Counter(0),
            Algorithm::Sha1,
            6,
            Uuid::nil(),
        );

        let errors = result.into_result().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.first(), Error::Decode(DecodeError::InvalidSecretValue)));
        assert!(keychain.is_empty());
    }

    #[test]
    fn out_of_range_digits_are_rejected() {
        let mut keychain = MemoryKeychain::new();
        let result = add_from_fields(
            &mut keychain,
            "A",
            "a",
            "AA",
            TokenKind::TimeStep(30),
            Algorithm::Sha1,
            10,
            Uuid::nil(),
        );
        assert!(matches!(
            result.errors().map(|e| e.first()),
            Some(Error::Decode(DecodeError::InvalidDigitsValue(_)))
        ));
        assert!(keychain.is_empty());
    }

    #[test]
    fn zero_period_never_reaches_the_store() {
        let mut keychain = MemoryKeychain::new();
        for period in [0, -30] {
            let result = add_from_fields(
                &mut keychain,
                "A",
                "a",
                "AA",
                TokenKind::TimeStep(period),
                Algorithm::Sha1,
                6,
                Uuid::nil(),
            );
            assert!(matches!(
                result.errors().map(|e| e.first()),
                Some(Error::Decode(DecodeError::InvalidPeriodValue(_)))
            ));
        }
        assert!(keychain.is_empty());
    }

    #[test]
    fn store_failure_propagates() {
        let mut keychain = MemoryKeychain::new();
        keychain.fail_creates(true);
        let result = add_from_uri(&mut keychain, URL, Uuid::nil());
        assert!(matches!(result.errors().map(|e| e.first()), Some(Error::Store(_))));
    }

    #[test]
    fn uri_text_is_stored_verbatim() {
        let mut keychain = MemoryKeychain::new();
        let otp = add_from_uri(&mut keychain, URL, Uuid::nil()).valid().unwrap();

        assert_eq!(keychain.read(&otp.secret_ref).valid().as_deref(), Some(URL));
        assert_eq!(otp.token.account, "alice@google.com");
    }

    #[test]
    fn loads_back_from_the_same_reference() {
        let mut keychain = MemoryKeychain::new();
        let stored = add_from_uri(&mut keychain, URL, Uuid::nil()).valid().unwrap();

        let id = Uuid::from_u128(7);
        let loaded = from_keychain(&keychain, stored.secret_ref.clone(), id).valid().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.secret_ref, stored.secret_ref);
        assert_eq!(loaded.token, stored.token);
    }

    #[test]
    fn corrupt_stored_text_fails_to_load() {
        let mut keychain = MemoryKeychain::new();
        let secret_ref = keychain.create("a", "s", "otpauth://totp/a").valid().unwrap();

        let errors = from_keychain(&keychain, secret_ref, Uuid::nil()).into_result().unwrap_err();
        assert!(matches!(errors.first(), Error::Decode(DecodeError::InvalidSecretValue)));
    }
}
