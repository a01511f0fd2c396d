use crate::error::Error;
use crate::keychain::SecretRef;
use crate::validated::Validated;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Persisted display order of the stored secrets.
pub trait RefList {
    fn get(&self) -> Validated<Vec<SecretRef>, Error>;

    /// Fire-and-forget; implementations log their own failures.
    fn set(&mut self, refs: &[SecretRef]);
}

/// `refs.json` in the store root: a JSON array of reference strings.
pub struct JsonRefList {
    path: PathBuf,
}

impl JsonRefList {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join("refs.json"),
        }
    }

    fn write(&self, refs: &[SecretRef]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(refs)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("cannot write {}", self.path.display()))
    }
}

impl RefList for JsonRefList {
    fn get(&self) -> Validated<Vec<SecretRef>, Error> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Validated::Valid(Vec::new()),
            Err(e) => return Validated::invalid(Error::reference_list(e)),
        };
        serde_json::from_str(&data)
            .map_err(|e| Error::reference_list(format!("{}: {e}", self.path.display())))
            .into()
    }

    fn set(&mut self, refs: &[SecretRef]) {
        if let Err(e) = self.write(refs) {
            tracing::error!(error = %format!("{e:#}"), "failed to persist reference list");
        }
    }
}

/// In-memory list that remembers how often it was written.
#[derive(Debug, Default)]
pub struct MemoryRefList {
    refs: Vec<SecretRef>,
    writes: usize,
}

impl MemoryRefList {
    pub fn new(refs: Vec<SecretRef>) -> Self {
        Self { refs, writes: 0 }
    }

    pub fn refs(&self) -> &[SecretRef] {
        &self.refs
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl RefList for MemoryRefList {
    fn get(&self) -> Validated<Vec<SecretRef>, Error> {
        Validated::Valid(self.refs.clone())
    }

    fn set(&mut self, refs: &[SecretRef]) {
        self.refs = refs.to_vec();
        self.writes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = JsonRefList::new(dir.path());
        assert_eq!(list.get().valid(), Some(vec![]));
    }

    #[test]
    fn set_then_get_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = JsonRefList::new(dir.path());
        let refs = vec![SecretRef::new("b"), SecretRef::new("a"), SecretRef::new("c")];

        list.set(&refs);
        assert_eq!(list.get().valid(), Some(refs));
    }

    #[test]
    fn malformed_file_is_a_reference_list_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("refs.json"), r#"{"not": "a list"}"#).unwrap();

        let got = JsonRefList::new(dir.path()).get();
        let errors = got.into_result().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors.first(), Error::ReferenceList(_)));
    }
}
