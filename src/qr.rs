use crate::error::Error;
use crate::prompt::prompt_string;
use crate::validated::Validated;

/// One-shot capture of a QR payload. `None` means nothing was scanned.
pub trait QrScanner {
    fn scan(&mut self) -> Validated<Option<String>, Error>;
}

/// Terminal stand-in for a camera: the user pastes the decoded QR text.
#[derive(Debug, Default)]
pub struct PasteScanner;

impl QrScanner for PasteScanner {
    fn scan(&mut self) -> Validated<Option<String>, Error> {
        match prompt_string("Paste otpauth:// URL (empty to cancel): ") {
            Ok(line) => Validated::Valid(non_empty(&line)),
            Err(e) => Validated::invalid(Error::Scan(format!("{e:#}"))),
        }
    }
}

/// Scanner that hands out a prepared sequence of results.
#[derive(Debug, Default)]
pub struct ScriptedScanner {
    results: Vec<Option<String>>,
}

impl ScriptedScanner {
    pub fn new(results: impl IntoIterator<Item = Option<String>>) -> Self {
        let mut results: Vec<_> = results.into_iter().collect();
        results.reverse();
        Self { results }
    }
}

impl QrScanner for ScriptedScanner {
    fn scan(&mut self) -> Validated<Option<String>, Error> {
        Validated::Valid(self.results.pop().flatten())
    }
}

fn non_empty(line: &str) -> Option<String> {
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}
