//! `otpauth://` key URIs:
//! <https://github.com/google/google-authenticator/wiki/Key-Uri-Format>
//!
//! `otpauth://{hotp|totp}/{issuer}:{account}?secret=..&issuer=..&algorithm=..&digits=..&(counter|period)=..`

use crate::error::{DecodeError, Error};
use crate::secret;
use crate::token::{Algorithm, DEFAULT_DIGITS, DEFAULT_PERIOD, MAX_DIGITS, Token, TokenKind};
use crate::validated::{OrInvalid, Validated};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::collections::HashMap;
use url::Url;

const SCHEME: &str = "otpauth";

/// Escaped inside the label; `:` separates issuer from account.
const LABEL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Escaped inside query values.
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn decode(text: &str) -> Validated<Token, Error> {
    let url = match Url::parse(text.trim()) {
        Ok(url) if url.scheme() == SCHEME => url,
        _ => return Validated::invalid(DecodeError::InvalidUrl(text.to_owned()).into()),
    };

    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    let kind = decode_kind(url.host_str(), &query);
    let key = query
        .get("secret")
        .filter(|text| !text.is_empty())
        .or_invalid(|| Error::from(DecodeError::InvalidSecretValue))
        .flat_map(|text| secret::decode(text));
    let digits = decode_digits(&query);

    kind.zip(key).zip(digits).map(|((kind, key), digits)| {
        let (issuer, account) = decode_labels(url.path(), &query);
        let algorithm = query
            .get("algorithm")
            .and_then(|name| Algorithm::parse(name))
            .unwrap_or_default();
        Token::new(kind, key, algorithm, digits, issuer, account)
    })
}

fn decode_kind(host: Option<&str>, query: &HashMap<String, String>) -> Validated<TokenKind, Error> {
    match host {
        Some("hotp") => query
            .get("counter")
            .and_then(|c| c.parse::<u64>().ok())
            .map(TokenKind::Counter)
            .or_invalid(|| DecodeError::InvalidCounterValue.into()),
        Some("totp") => match query.get("period").map(|p| p.parse::<i32>()) {
            Some(Ok(period)) => check_period(period).map(TokenKind::TimeStep),
            Some(Err(_)) | None => Validated::Valid(TokenKind::TimeStep(DEFAULT_PERIOD)),
        },
        _ => Validated::invalid(DecodeError::InvalidTokenType.into()),
    }
}

fn decode_digits(query: &HashMap<String, String>) -> Validated<u32, Error> {
    match query.get("digits").map(|d| d.parse::<u32>()) {
        Some(Ok(digits)) => check_digits(digits),
        Some(Err(_)) | None => Validated::Valid(DEFAULT_DIGITS),
    }
}

pub(crate) fn check_digits(digits: u32) -> Validated<u32, Error> {
    if (1..=MAX_DIGITS).contains(&digits) {
        Validated::Valid(digits)
    } else {
        Validated::invalid(DecodeError::InvalidDigitsValue(digits.to_string()).into())
    }
}

pub(crate) fn check_period(period: i32) -> Validated<i32, Error> {
    if period > 0 {
        Validated::Valid(period)
    } else {
        Validated::invalid(DecodeError::InvalidPeriodValue(period.to_string()).into())
    }
}

/// Counter tokens are always usable; time tokens need a positive step.
pub(crate) fn check_kind(kind: TokenKind) -> Validated<TokenKind, Error> {
    match kind {
        TokenKind::Counter(_) => Validated::Valid(kind),
        TokenKind::TimeStep(period) => check_period(period).map(TokenKind::TimeStep),
    }
}

/// `/issuer:account` or `/account`. A non-empty issuer prefix in the label
/// wins over the `issuer` query parameter.
fn decode_labels(path: &str, query: &HashMap<String, String>) -> (String, String) {
    let label = path.strip_prefix('/').unwrap_or(path);
    let query_issuer = || query.get("issuer").cloned().unwrap_or_default();

    match label.split_once(':') {
        Some((issuer, account)) => {
            let issuer = unescape(issuer);
            let issuer = if issuer.is_empty() { query_issuer() } else { issuer };
            (issuer, unescape(account))
        }
        None => (query_issuer(), unescape(label)),
    }
}

fn unescape(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Query items are always emitted as secret, issuer, algorithm, digits, then
/// counter or period.
pub fn encode(token: &Token) -> Validated<String, Error> {
    let moving_factor = match token.kind {
        TokenKind::Counter(counter) => ("counter", counter.to_string()),
        TokenKind::TimeStep(period) => ("period", period.to_string()),
    };
    let query = [
        ("secret", secret::encode(&token.key)),
        ("issuer", token.issuer.clone()),
        ("algorithm", token.algorithm.as_str().to_owned()),
        ("digits", token.digits.to_string()),
        (moving_factor.0, moving_factor.1),
    ]
    .iter()
    .map(|(name, value)| format!("{name}={}", utf8_percent_encode(value, QUERY_VALUE)))
    .collect::<Vec<_>>()
    .join("&");

    let text = format!(
        "{SCHEME}://{}/{}:{}?{query}",
        token.kind.host(),
        utf8_percent_encode(&token.issuer, LABEL),
        utf8_percent_encode(&token.account, LABEL),
    );

    match Url::parse(&text) {
        Ok(_) => Validated::Valid(text),
        Err(_) => Validated::invalid(Error::Encode(Box::new(token.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_KEY: [u8; 10] = [0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x21, 0xde, 0xad, 0xbe, 0xef];

    fn decode_errors(text: &str) -> Vec<Error> {
        decode(text).into_result().unwrap_err().into_vec()
    }

    #[test]
    fn decodes_google_example() {
        let token = decode(
            "otpauth://totp/Example:alice@google.com?secret=JBSWY3DPEHPK3PXP&issuer=Example",
        )
        .valid()
        .unwrap();

        assert_eq!(token.kind, TokenKind::TimeStep(30));
        assert_eq!(token.key.as_slice(), &HELLO_KEY);
        assert_eq!(token.algorithm, Algorithm::Sha1);
        assert_eq!(token.digits, 6);
        assert_eq!(token.issuer, "Example");
        assert_eq!(token.account, "alice@google.com");
    }

    #[test]
    fn totp_without_secret_is_one_error() {
        let errors = decode_errors("otpauth://totp/Example:alice@google.com");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::Decode(DecodeError::InvalidSecretValue)));
    }

    #[test]
    fn secret_without_value_counts_as_missing() {
        for text in ["otpauth://totp/a?secret", "otpauth://totp/a?secret=&issuer=A"] {
            let errors = decode_errors(text);
            assert_eq!(errors.len(), 1, "{text}");
            assert!(matches!(errors[0], Error::Decode(DecodeError::InvalidSecretValue)));
        }
    }

    #[test]
    fn kind_check_rejects_non_positive_periods() {
        assert!(check_kind(TokenKind::TimeStep(30)).is_valid());
        assert!(check_kind(TokenKind::Counter(0)).is_valid());
        for period in [0, -30] {
            assert!(matches!(
                check_kind(TokenKind::TimeStep(period)).errors().map(|e| e.first()),
                Some(Error::Decode(DecodeError::InvalidPeriodValue(_)))
            ));
        }
    }

    #[test]
    fn hotp_requires_numeric_counter() {
        for text in [
            "otpauth://hotp/acct?secret=JBSWY3DPEHPK3PXP",
            "otpauth://hotp/acct?secret=JBSWY3DPEHPK3PXP&counter=ten",
        ] {
            let errors = decode_errors(text);
            assert_eq!(errors.len(), 1, "{text}");
            assert!(matches!(errors[0], Error::Decode(DecodeError::InvalidCounterValue)));
        }
    }

    #[test]
    fn hotp_reads_counter() {
        let token = decode("otpauth://hotp/acct?secret=JBSWY3DPEHPK3PXP&counter=42")
            .valid()
            .unwrap();
        assert_eq!(token.kind, TokenKind::Counter(42));
        assert_eq!(token.issuer, "");
        assert_eq!(token.account, "acct");
    }

    #[test]
    fn unknown_host_is_an_error() {
        let errors = decode_errors("otpauth://motp/acct?secret=JBSWY3DPEHPK3PXP");
        assert!(matches!(errors[..], [Error::Decode(DecodeError::InvalidTokenType)]));
    }

    #[test]
    fn independent_failures_accumulate() {
        let errors = decode_errors("otpauth://xotp/acct?digits=12");
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], Error::Decode(DecodeError::InvalidTokenType)));
        assert!(matches!(errors[1], Error::Decode(DecodeError::InvalidSecretValue)));
        assert!(matches!(errors[2], Error::Decode(DecodeError::InvalidDigitsValue(_))));
    }

    #[test]
    fn other_schemes_and_garbage_are_invalid_urls() {
        for text in ["https://totp/a?secret=AA", "not a url"] {
            let errors = decode_errors(text);
            assert!(matches!(errors[..], [Error::Decode(DecodeError::InvalidUrl(_))]));
        }
    }

    #[test]
    fn undecodable_secret_is_an_error() {
        let errors = decode_errors("otpauth://totp/a?secret=not-base32!");
        assert!(matches!(errors[..], [Error::Decode(DecodeError::InvalidSecretValue)]));
    }

    #[test]
    fn unknown_algorithm_falls_back_to_sha1() {
        let token = decode("otpauth://totp/a?secret=JBSWY3DPEHPK3PXP&algorithm=MD5")
            .valid()
            .unwrap();
        assert_eq!(token.algorithm, Algorithm::Sha1);

        let token = decode("otpauth://totp/a?secret=JBSWY3DPEHPK3PXP&algorithm=sha512")
            .valid()
            .unwrap();
        assert_eq!(token.algorithm, Algorithm::Sha512);
    }

    #[test]
    fn period_and_digits_defaults_and_bounds() {
        let token = decode("otpauth://totp/a?secret=AA&period=abc&digits=x").valid().unwrap();
        assert_eq!(token.kind, TokenKind::TimeStep(30));
        assert_eq!(token.digits, 6);

        let token = decode("otpauth://totp/a?secret=AA&period=60&digits=8").valid().unwrap();
        assert_eq!(token.kind, TokenKind::TimeStep(60));
        assert_eq!(token.digits, 8);

        let errors = decode_errors("otpauth://totp/a?secret=AA&period=0");
        assert!(matches!(errors[..], [Error::Decode(DecodeError::InvalidPeriodValue(_))]));
    }

    #[test]
    fn label_issuer_wins_over_query_issuer() {
        let token = decode("otpauth://totp/Label:bob?secret=AA&issuer=Query").valid().unwrap();
        assert_eq!(token.issuer, "Label");

        let token = decode("otpauth://totp/:bob?secret=AA&issuer=Query").valid().unwrap();
        assert_eq!(token.issuer, "Query");
        assert_eq!(token.account, "bob");

        let token = decode("otpauth://totp/bob?secret=AA&issuer=Query").valid().unwrap();
        assert_eq!(token.issuer, "Query");
        assert_eq!(token.account, "bob");
    }

    #[test]
    fn label_is_percent_decoded() {
        let token = decode("otpauth://totp/ACME%20Co:john%40example.com?secret=AA")
            .valid()
            .unwrap();
        assert_eq!(token.issuer, "ACME Co");
        assert_eq!(token.account, "john@example.com");
    }

    #[test]
    fn encodes_in_canonical_order() {
        let token = Token::new(
            TokenKind::TimeStep(30),
            HELLO_KEY.to_vec(),
            Algorithm::Sha1,
            6,
            "Example",
            "alice@google.com",
        );
        assert_eq!(
            encode(&token).valid().unwrap(),
            "otpauth://totp/Example:alice@google.com?secret=JBSWY3DPEHPK3PXP&issuer=Example&algorithm=SHA1&digits=6&period=30"
        );
    }

    #[test]
    fn canonical_text_survives_decode_then_encode() {
        for text in [
            "otpauth://totp/Example:alice@google.com?secret=JBSWY3DPEHPK3PXP&issuer=Example&algorithm=SHA1&digits=6&period=30",
            "otpauth://hotp/GitHub:david@gofake1.net?secret=23456&issuer=GitHub&algorithm=SHA256&digits=8&counter=7",
        ] {
            let token = decode(text).valid().unwrap();
            assert_eq!(encode(&token).valid().as_deref(), Some(text));
        }
    }

    #[test]
    fn tokens_survive_encode_then_decode() {
        let tokens = [
            Token::new(TokenKind::Counter(0), vec![], Algorithm::Sha1, 6, "", ""),
            Token::new(TokenKind::Counter(u64::MAX), vec![1, 2, 3], Algorithm::Sha512, 9, "A&B Co", "x:y z"),
            Token::new(TokenKind::TimeStep(45), HELLO_KEY.to_vec(), Algorithm::Sha256, 7, "Ünïcode", "100%+1=#?/"),
        ];
        for token in tokens {
            let text = encode(&token).valid().unwrap();
            assert_eq!(decode(&text).valid(), Some(token), "{text}");
        }
    }
}
