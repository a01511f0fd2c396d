//! Secret store collaborator: keeps `otpauth://` texts out of plain sight and
//! hands back an opaque reference for each.

use crate::crypto::{self, MasterKey};
use crate::error::Error;
use crate::validated::Validated;
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Opaque handle to one stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait SecretStore {
    fn create(&mut self, account: &str, service: &str, value: &str) -> Validated<SecretRef, Error>;

    fn read(&self, secret_ref: &SecretRef) -> Validated<String, Error>;

    fn delete(&mut self, secret_ref: &SecretRef) -> Validated<(), Error>;

    /// Replace a secret, returning the reference that now stands for it.
    ///
    /// The new entry is written before the old one is removed, so a failed
    /// write leaves the old secret intact. A failed removal afterwards only
    /// leaves an orphan behind; the new reference is still returned.
    fn update(
        &mut self,
        secret_ref: &SecretRef,
        account: &str,
        service: &str,
        new_value: &str,
    ) -> Validated<SecretRef, Error> {
        self.create(account, service, new_value).map(|new_ref| {
            if let Validated::Invalid(errors) = self.delete(secret_ref) {
                tracing::warn!(
                    old = %secret_ref,
                    new = %new_ref,
                    %errors,
                    "replaced secret but could not remove the previous entry"
                );
            }
            new_ref
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SecretItem {
    account: String,
    service: String,
    value: String,
}

/// Secrets held in memory only; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    items: HashMap<SecretRef, SecretItem>,
    next: u64,
    fail_creates: bool,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create` fail, to exercise abort paths.
    pub fn fail_creates(&mut self, fail: bool) {
        self.fail_creates = fail;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, secret_ref: &SecretRef) -> bool {
        self.items.contains_key(secret_ref)
    }

    /// (account, service) the secret was filed under.
    pub fn labels(&self, secret_ref: &SecretRef) -> Option<(&str, &str)> {
        self.items
            .get(secret_ref)
            .map(|item| (item.account.as_str(), item.service.as_str()))
    }
}

impl SecretStore for MemoryKeychain {
    fn create(&mut self, account: &str, service: &str, value: &str) -> Validated<SecretRef, Error> {
        if self.fail_creates {
            return Validated::invalid(Error::Store("keychain is read-only".into()));
        }
        self.next += 1;
        let secret_ref = SecretRef(format!("mem-{}", self.next));
        self.items.insert(
            secret_ref.clone(),
            SecretItem {
                account: account.to_owned(),
                service: service.to_owned(),
                value: value.to_owned(),
            },
        );
        Validated::Valid(secret_ref)
    }

    fn read(&self, secret_ref: &SecretRef) -> Validated<String, Error> {
        match self.items.get(secret_ref) {
            Some(item) => Validated::Valid(item.value.clone()),
            None => Validated::invalid(Error::Store(format!("no item for {secret_ref}"))),
        }
    }

    fn delete(&mut self, secret_ref: &SecretRef) -> Validated<(), Error> {
        match self.items.remove(secret_ref) {
            Some(_) => Validated::Valid(()),
            None => Validated::invalid(Error::Store(format!("no item for {secret_ref}"))),
        }
    }
}

/// Secrets encrypted with the master key, one file per reference under
/// `<root>/secrets/<ref>.enc`.
pub struct FileKeychain {
    dir: PathBuf,
    master_key: MasterKey,
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    version: u32,
    nonce: String,
    ciphertext: String,
}

impl FileKeychain {
    pub fn new(root: &Path, master_key: MasterKey) -> Self {
        Self {
            dir: root.join("secrets"),
            master_key,
        }
    }

    fn path_for(&self, secret_ref: &SecretRef) -> anyhow::Result<PathBuf> {
        let id = Uuid::parse_str(secret_ref.as_str())
            .map_err(|_| anyhow!("malformed secret reference {secret_ref}"))?;
        Ok(self.dir.join(id.simple().to_string()).with_extension("enc"))
    }

    fn write_item(&self, item: &SecretItem) -> anyhow::Result<SecretRef> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create {}", self.dir.display()))?;

        let secret_ref = SecretRef(Uuid::new_v4().simple().to_string());
        let json = zeroize::Zeroizing::new(serde_json::to_vec(item)?);
        let (nonce, ciphertext) = crypto::seal(&self.master_key, &json)?;
        let fe = FileEntry {
            version: 1,
            nonce,
            ciphertext,
        };

        let path = self.path_for(&secret_ref)?;
        std::fs::write(&path, serde_json::to_string_pretty(&fe)?)
            .with_context(|| format!("cannot write {}", path.display()))?;
        Ok(secret_ref)
    }

    fn read_item(&self, secret_ref: &SecretRef) -> anyhow::Result<SecretItem> {
        let path = self.path_for(secret_ref)?;
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read secret file {}", path.display()))?;
        let fe: FileEntry = serde_json::from_str(&data)?;
        let plaintext = crypto::open(&self.master_key, &fe.nonce, &fe.ciphertext)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn remove_item(&self, secret_ref: &SecretRef) -> anyhow::Result<()> {
        let path = self.path_for(secret_ref)?;
        std::fs::remove_file(&path).with_context(|| format!("cannot remove {}", path.display()))
    }
}

impl SecretStore for FileKeychain {
    fn create(&mut self, account: &str, service: &str, value: &str) -> Validated<SecretRef, Error> {
        let item = SecretItem {
            account: account.to_owned(),
            service: service.to_owned(),
            value: value.to_owned(),
        };
        self.write_item(&item).map_err(Error::store).into()
    }

    fn read(&self, secret_ref: &SecretRef) -> Validated<String, Error> {
        self.read_item(secret_ref)
            .map(|item| item.value)
            .map_err(Error::store)
            .into()
    }

    fn delete(&mut self, secret_ref: &SecretRef) -> Validated<(), Error> {
        self.remove_item(secret_ref).map_err(Error::store).into()
    }
}
