//! Ordered, id-keyed table of generators plus the passcodes last derived from them.

use crate::clock::Clock;
use crate::error::Error;
use crate::generator::Generator;
use crate::keychain::SecretRef;
use crate::token::{Otp, Passcode};
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;
use uuid::Uuid;

pub struct TokenList {
    ids: Vec<Uuid>,
    entries: HashMap<Uuid, Generator>,
    cache: HashMap<Uuid, Passcode>,
    clock: Box<dyn Clock>,
}

impl TokenList {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            ids: Vec::new(),
            entries: HashMap::new(),
            cache: HashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Append tokens in order and derive their first passcode.
    ///
    /// Counter tokens consume one counter value here. Nothing is added unless
    /// every token can be.
    pub fn add(&mut self, otps: Vec<Otp>) -> Result<(), Error> {
        let mut seen = HashSet::new();
        let mut generators = Vec::with_capacity(otps.len());
        for otp in otps {
            if self.entries.contains_key(&otp.id) || !seen.insert(otp.id) {
                return Err(Error::DuplicateId(otp.id));
            }
            generators.push(Generator::new(otp)?);
        }

        let now = self.clock.now();
        for mut generator in generators {
            let id = generator.otp().id;
            let passcode = generator.generate(now);
            tracing::debug!(%id, counter = generator.is_counter(), "token added");
            self.ids.push(id);
            self.cache.insert(id, passcode);
            self.entries.insert(id, generator);
        }
        Ok(())
    }

    pub fn lookup(&self, id: Uuid) -> Option<&Otp> {
        self.entries.get(&id).map(Generator::otp)
    }

    pub fn passcode(&self, id: Uuid) -> Option<&Passcode> {
        self.cache.get(&id)
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.ids.iter().position(|other| *other == id)
    }

    /// Produce the next HOTP passcode for `id`.
    pub fn advance_counter(&mut self, id: Uuid) -> Result<&Passcode, Error> {
        let now = self.clock.now();
        let generator = self.entries.get_mut(&id).ok_or(Error::UnknownId(id))?;
        if !generator.is_counter() {
            return Err(Error::NotCounterBased(id));
        }
        let passcode = generator.generate(now);
        tracing::debug!(%id, "counter advanced");
        self.cache.insert(id, passcode);
        Ok(&self.cache[&id])
    }

    /// Regenerate every time-based passcode for `now`. Counter tokens are left alone.
    pub fn retick(&mut self, now: OffsetDateTime) {
        for (id, generator) in &mut self.entries {
            if let Generator::TimeStep(totp) = generator {
                self.cache.insert(*id, totp.generate(now));
            }
        }
    }

    /// Swap in an edited token under the same id, keeping its position.
    pub fn replace(&mut self, otp: Otp) -> Result<(), Error> {
        let id = otp.id;
        if !self.entries.contains_key(&id) {
            return Err(Error::UnknownId(id));
        }
        let mut generator = Generator::new(otp)?;
        let passcode = generator.generate(self.clock.now());
        self.entries.insert(id, generator);
        self.cache.insert(id, passcode);
        tracing::debug!(%id, "token replaced");
        Ok(())
    }

    /// Move the items at `sources` so they sit in front of the item that was at
    /// `destination` (`len()` means the end), keeping their relative order.
    pub fn reorder(&mut self, sources: &[usize], destination: usize) -> Result<(), Error> {
        let len = self.ids.len();
        if let Some(&bad) = sources.iter().find(|&&offset| offset >= len) {
            return Err(Error::InvalidOffset(bad));
        }
        if destination > len {
            return Err(Error::InvalidOffset(destination));
        }

        let sources: HashSet<usize> = sources.iter().copied().collect();
        let mut moved = Vec::with_capacity(sources.len());
        let mut kept = Vec::with_capacity(len);
        for (offset, id) in self.ids.iter().copied().enumerate() {
            if sources.contains(&offset) {
                moved.push(id);
            } else {
                kept.push(id);
            }
        }
        let insert_at = destination - sources.iter().filter(|&&offset| offset < destination).count();
        kept.splice(insert_at..insert_at, moved);
        self.ids = kept;
        tracing::debug!(?sources, destination, "tokens reordered");
        Ok(())
    }

    /// Remove the items at `offsets` from all three tables, returning them in
    /// their former order.
    pub fn remove(&mut self, offsets: &[usize]) -> Result<Vec<Otp>, Error> {
        if let Some(&bad) = offsets.iter().find(|&&offset| offset >= self.ids.len()) {
            return Err(Error::InvalidOffset(bad));
        }
        let mut offsets = offsets.to_vec();
        offsets.sort_unstable();
        offsets.dedup();

        let mut removed = Vec::with_capacity(offsets.len());
        for offset in offsets.into_iter().rev() {
            let id = self.ids.remove(offset);
            self.cache.remove(&id);
            if let Some(generator) = self.entries.remove(&id) {
                removed.push(generator.otp().clone());
            }
            tracing::debug!(%id, "token removed");
        }
        removed.reverse();
        Ok(removed)
    }

    /// Secret references in display order; this is what gets persisted.
    pub fn current_refs(&self) -> Vec<SecretRef> {
        self.ids
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|generator| generator.otp().secret_ref.clone())
            .collect()
    }

    /// Cached passcodes in order, restricted to tokens whose issuer or account
    /// contains `filter` (ignoring case).
    pub fn visible_passcodes(&self, filter: &str) -> Vec<Passcode> {
        self.ids
            .iter()
            .filter(|id| {
                filter.is_empty() || self.lookup(**id).is_some_and(|otp| otp.token.matches(filter))
            })
            .filter_map(|id| self.cache.get(id).cloned())
            .collect()
    }
}
