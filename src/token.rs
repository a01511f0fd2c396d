use crate::hashing::Hashing;
use crate::keychain::SecretRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

pub const DEFAULT_DIGITS: u32 = 6;
pub const DEFAULT_PERIOD: i32 = 30;
pub const MAX_DIGITS: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Algorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Case-insensitive lookup of the `algorithm` query value.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha1" => Some(Algorithm::Sha1),
            "sha256" => Some(Algorithm::Sha256),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha1 => "SHA1",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha512 => "SHA512",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moving-factor source of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// HOTP, next counter value to consume.
    Counter(u64),
    /// TOTP, step length in seconds.
    TimeStep(i32),
}

impl TokenKind {
    pub fn is_counter(&self) -> bool {
        matches!(self, TokenKind::Counter(_))
    }

    pub fn host(&self) -> &'static str {
        match self {
            TokenKind::Counter(_) => "hotp",
            TokenKind::TimeStep(_) => "totp",
        }
    }
}

/// Secret key plus everything needed to derive passcodes from it.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub key: Zeroizing<Vec<u8>>,
    pub algorithm: Algorithm,
    pub digits: u32,
    pub issuer: String,
    pub account: String,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        key: Vec<u8>,
        algorithm: Algorithm,
        digits: u32,
        issuer: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: Zeroizing::new(key),
            algorithm,
            digits,
            issuer: issuer.into(),
            account: account.into(),
        }
    }

    pub fn with_kind(&self, kind: TokenKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    pub fn with_labels(&self, issuer: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            account: account.into(),
            ..self.clone()
        }
    }

    pub fn matches(&self, filter: &str) -> bool {
        let filter = filter.to_lowercase();
        self.issuer.to_lowercase().contains(&filter) || self.account.to_lowercase().contains(&filter)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("kind", &self.kind)
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .field("algorithm", &self.algorithm)
            .field("digits", &self.digits)
            .field("issuer", &self.issuer)
            .field("account", &self.account)
            .finish()
    }
}

/// A token persisted in the secret store.
///
/// Two `Otp`s are equal when their ids are; the token inside may have moved on
/// (advanced counter, edited labels) while still being the same entry.
#[derive(Debug, Clone)]
pub struct Otp {
    pub id: Uuid,
    pub secret_ref: SecretRef,
    pub token: Token,
}

impl PartialEq for Otp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Otp {}

impl Otp {
    pub fn new(id: Uuid, secret_ref: SecretRef, token: Token) -> Self {
        Self {
            id,
            secret_ref,
            token,
        }
    }

    /// Derive the displayed passcode for an already-encoded moving factor.
    pub(crate) fn passcode(&self, factor: &[u8; 8]) -> Passcode {
        let word = Hashing::new(self.token.algorithm).run(factor, &self.token.key);
        Passcode {
            id: self.id,
            issuer: self.token.issuer.clone(),
            account: self.token.account.clone(),
            text: render(word, self.token.digits),
            is_counter: self.token.kind.is_counter(),
        }
    }
}

/// Mask to 31 bits, reduce modulo 10^digits, left-pad with zeros.
pub fn render(word: u32, digits: u32) -> String {
    let value = u64::from(word & 0x7fff_ffff);
    let modulus = 10u64.checked_pow(digits).unwrap_or(u64::MAX);
    format!("{:0width$}", value % modulus, width = digits as usize)
}

/// What the presentation layer shows for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passcode {
    /// Same id as the owning [`Otp`].
    pub id: Uuid,
    pub issuer: String,
    pub account: String,
    pub text: String,
    pub is_counter: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_parse_ignores_case() {
        assert_eq!(Algorithm::parse("sha256"), Some(Algorithm::Sha256));
        assert_eq!(Algorithm::parse("SHA512"), Some(Algorithm::Sha512));
        assert_eq!(Algorithm::parse("Sha1"), Some(Algorithm::Sha1));
        assert_eq!(Algorithm::parse("md5"), None);
    }

    #[test]
    fn render_masks_before_reducing() {
        // 0x80000000 | 1234567 must not contribute the sign bit.
        assert_eq!(render(0x8000_0000 | 1_234_567, 6), "234567");
        assert_eq!(render(0x4c93cf18, 6), "755224");
        assert_eq!(render(0x41397eea, 8), "94287082");
    }

    #[test]
    fn render_pads_to_digit_count() {
        assert_eq!(render(73348, 6), "073348");
        assert_eq!(render(5, 1), "5");
    }

    #[test]
    fn otp_equality_is_identity() {
        let id = Uuid::nil();
        let token = Token::new(TokenKind::TimeStep(30), vec![1], Algorithm::Sha1, 6, "A", "a");
        let a = Otp::new(id, SecretRef::new("one"), token.clone());
        let b = Otp::new(id, SecretRef::new("two"), token.with_labels("B", "b"));
        let c = Otp::new(Uuid::from_u128(1), SecretRef::new("one"), token);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn token_filter_is_case_insensitive() {
        let token = Token::new(TokenKind::TimeStep(30), vec![], Algorithm::Sha1, 6, "GitHub", "david@gofake1.net");
        assert!(token.matches("git"));
        assert!(token.matches("GOFAKE"));
        assert!(!token.matches("google"));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let token = Token::new(TokenKind::Counter(0), vec![0xde, 0xad], Algorithm::Sha1, 6, "", "");
        let shown = format!("{token:?}");
        assert!(shown.contains("<2 bytes>"));
        assert!(!shown.contains("222"));
    }
}
