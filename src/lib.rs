//! HOTP/TOTP authenticator: `otpauth://` tokens kept in an encrypted store,
//! ordered and shown as passcodes.

pub mod app;
pub mod clipboard;
pub mod clock;
pub mod collection;
pub mod config;
pub mod crypto;
pub mod error;
pub mod factory;
pub mod generator;
pub mod hashing;
pub mod keychain;
pub mod prompt;
pub mod qr;
pub mod refs;
pub mod secret;
pub mod session;
pub mod token;
pub mod uri;
pub mod validated;

pub use app::{App, NewToken, PasscodeType};
pub use error::{DecodeError, Error};
pub use keychain::{SecretRef, SecretStore};
pub use refs::RefList;
pub use token::{Algorithm, Otp, Passcode, Token, TokenKind};
pub use validated::{Errors, Validated};
