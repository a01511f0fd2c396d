//! One authenticator session: the token list together with the stores that
//! back it. Every method handles one user action to completion; failures are
//! logged and leave the session as it was.

use crate::clock::Clock;
use crate::collection::TokenList;
use crate::config::TokenDefaults;
use crate::error::Error;
use crate::factory;
use crate::keychain::SecretStore;
use crate::qr::QrScanner;
use crate::refs::RefList;
use crate::token::{Otp, Passcode, TokenKind};
use crate::uri;
use crate::validated::Validated;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasscodeType {
    Hotp,
    #[default]
    Totp,
}

/// A token typed in by hand.
#[derive(Debug, Clone, Default)]
pub struct NewToken {
    pub issuer: String,
    pub account: String,
    /// Base32 secret.
    pub key: String,
    pub kind: PasscodeType,
}

pub struct App<K, R> {
    keychain: K,
    refs: R,
    list: TokenList,
    filter: String,
    defaults: TokenDefaults,
    make_id: Box<dyn FnMut() -> Uuid>,
}

impl<K: SecretStore, R: RefList> App<K, R> {
    pub fn new(keychain: K, refs: R, clock: Box<dyn Clock>, defaults: TokenDefaults) -> Self {
        Self {
            keychain,
            refs,
            list: TokenList::new(clock),
            filter: String::new(),
            defaults,
            make_id: Box::new(Uuid::new_v4),
        }
    }

    /// Replace the source of fresh token ids.
    pub fn with_ids(mut self, make_id: impl FnMut() -> Uuid + 'static) -> Self {
        self.make_id = Box::new(make_id);
        self
    }

    pub fn keychain(&self) -> &K {
        &self.keychain
    }

    pub fn refs(&self) -> &R {
        &self.refs
    }

    pub fn tokens(&self) -> &TokenList {
        &self.list
    }

    pub fn defaults(&self) -> &TokenDefaults {
        &self.defaults
    }

    /// Load every stored token in persisted order. Tokens that cannot be read
    /// are logged and skipped; returns how many were loaded.
    pub fn setup(&mut self) -> usize {
        let refs = match self.refs.get() {
            Validated::Valid(refs) => refs,
            Validated::Invalid(errors) => {
                log_failure("load reference list", &errors);
                return 0;
            }
        };

        let mut loaded = Vec::with_capacity(refs.len());
        for secret_ref in refs {
            let id = (self.make_id)();
            match factory::from_keychain(&self.keychain, secret_ref.clone(), id) {
                Validated::Valid(otp) => loaded.push(otp),
                Validated::Invalid(errors) => {
                    tracing::error!(secret = %secret_ref, %errors, "skipping unreadable token");
                }
            }
        }

        let count = loaded.len();
        match self.list.add(loaded) {
            Ok(()) => {
                tracing::debug!(count, "tokens loaded");
                count
            }
            Err(e) => {
                tracing::error!(error = %e, "could not load tokens");
                0
            }
        }
    }

    pub fn update_time(&mut self, now: OffsetDateTime) {
        self.list.retick(now);
    }

    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter = text.into();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Passcodes shown under the current filter.
    pub fn passcodes(&self) -> Vec<Passcode> {
        self.list.visible_passcodes(&self.filter)
    }

    pub fn passcode(&self, id: Uuid) -> Option<&Passcode> {
        self.list.passcode(id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.list.position(id)
    }

    /// Id of the token shown at `offset` in the unfiltered list.
    pub fn id_at(&self, offset: usize) -> Option<Uuid> {
        self.list.ids().get(offset).copied()
    }

    pub fn lookup(&self, id: Uuid) -> Option<&Otp> {
        self.list.lookup(id)
    }

    pub fn add_token(&mut self, form: NewToken) -> Validated<Uuid, Error> {
        let result = check_filled("issuer", &form.issuer)
            .zip(check_filled("account", &form.account))
            .zip(check_filled("key", &form.key))
            .flat_map(|_| {
                let kind = match form.kind {
                    PasscodeType::Hotp => TokenKind::Counter(0),
                    PasscodeType::Totp => TokenKind::TimeStep(self.defaults.period),
                };
                let id = (self.make_id)();
                factory::add_from_fields(
                    &mut self.keychain,
                    form.issuer.trim(),
                    form.account.trim(),
                    &form.key,
                    kind,
                    self.defaults.algorithm,
                    self.defaults.digits,
                    id,
                )
            })
            .flat_map(|otp| self.insert(otp));
        logged("add token", result)
    }

    /// Add whatever the scanner captured. Returns `None` if nothing was scanned.
    pub fn scan(&mut self, scanner: &mut impl QrScanner) -> Validated<Option<Uuid>, Error> {
        let result = scanner.scan().flat_map(|scanned| match scanned {
            None => Validated::Valid(None),
            Some(text) => {
                let id = (self.make_id)();
                factory::add_from_uri(&mut self.keychain, &text, id)
                    .flat_map(|otp| self.insert(otp))
                    .map(Some)
            }
        });
        logged("scan token", result)
    }

    /// Rename a token. The secret is rewritten under the new labels and the
    /// reference the store hands back replaces the old one.
    pub fn edit(&mut self, id: Uuid, issuer: &str, account: &str) -> Validated<(), Error> {
        let result = match self.list.lookup(id) {
            None => Validated::invalid(Error::UnknownId(id)),
            Some(current) => {
                let old_ref = current.secret_ref.clone();
                let token = current.token.with_labels(issuer.trim(), account.trim());
                uri::encode(&token)
                    .flat_map(|text| {
                        self.keychain
                            .update(&old_ref, &token.account, &token.issuer, &text)
                    })
                    .flat_map(|new_ref| Validated::from(self.list.replace(Otp::new(id, new_ref, token))))
                    .map(|()| self.persist())
            }
        };
        logged("edit token", result)
    }

    /// Delete the tokens at `offsets` along with their secrets. Returns how
    /// many tokens went; repeated offsets count once.
    pub fn delete(&mut self, offsets: &[usize]) -> Validated<usize, Error> {
        let result = Validated::from(self.list.remove(offsets)).map(|removed| {
            for otp in &removed {
                if let Validated::Invalid(errors) = self.keychain.delete(&otp.secret_ref) {
                    tracing::error!(secret = %otp.secret_ref, %errors, "could not delete secret");
                }
            }
            self.persist();
            removed.len()
        });
        logged("delete tokens", result)
    }

    pub fn move_items(&mut self, sources: &[usize], destination: usize) -> Validated<(), Error> {
        let result = Validated::from(self.list.reorder(sources, destination)).map(|()| self.persist());
        logged("move tokens", result)
    }

    /// Show the next HOTP passcode for `id`.
    pub fn increment_counter(&mut self, id: Uuid) -> Validated<Passcode, Error> {
        let result = Validated::from(self.list.advance_counter(id).cloned());
        logged("increment counter", result)
    }

    /// Add a freshly stored token to the list. If the list refuses it, the
    /// secret just written is removed again.
    fn insert(&mut self, otp: Otp) -> Validated<Uuid, Error> {
        let id = otp.id;
        let secret_ref = otp.secret_ref.clone();
        match self.list.add(vec![otp]) {
            Ok(()) => {
                self.persist();
                Validated::Valid(id)
            }
            Err(e) => {
                if let Validated::Invalid(errors) = self.keychain.delete(&secret_ref) {
                    tracing::warn!(secret = %secret_ref, %errors, "could not roll back stored secret");
                }
                Validated::invalid(e)
            }
        }
    }

    fn persist(&mut self) {
        self.refs.set(&self.list.current_refs());
    }
}

fn check_filled(field: &'static str, value: &str) -> Validated<(), Error> {
    if value.trim().is_empty() {
        Validated::invalid(Error::EmptyField(field))
    } else {
        Validated::Valid(())
    }
}

fn log_failure(action: &str, errors: &crate::validated::Errors<Error>) {
    for error in errors {
        tracing::error!(action, %error, "action failed");
    }
}

fn logged<T>(action: &str, result: Validated<T, Error>) -> Validated<T, Error> {
    if let Some(errors) = result.errors() {
        log_failure(action, errors);
    }
    result
}
