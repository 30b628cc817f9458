//! In-memory text module.
//!
//! Das Test- und Einbettungs-Backend: gleiche Semantik wie die
//! Datei-Backends (Ordinale, Links, Roh-Filter), nur ohne Persistenz.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::filter::RawFilter;
use crate::key::VerseKey;
use crate::v11n::System;
use crate::FastHashMap;

enum Slot {
    Text(Vec<u8>),
    Link(u32),
}

pub struct MemModule {
    system: Rc<System>,
    slots: FastHashMap<u32, Slot>,
    current: Option<u32>,
    raw_filters: Vec<Box<dyn RawFilter>>,
}

impl MemModule {
    pub fn new(system: Rc<System>) -> Self {
        Self {
            system,
            slots: FastHashMap::default(),
            current: None,
            raw_filters: Vec::new(),
        }
    }

    fn resolve(&self, ordinal: u32) -> Option<&Vec<u8>> {
        let mut ord = ordinal;
        // Links sind einstufig, aber ein Hop Toleranz schadet nicht
        for _ in 0..2 {
            match self.slots.get(&ord)? {
                Slot::Text(bytes) => return Some(bytes),
                Slot::Link(dest) => ord = *dest,
            }
        }
        None
    }

    /// Test-Sicht: Eintragstext an einem Schlüssel (Links aufgelöst),
    /// Roh-Filter bereits rückgängig gemacht.
    pub fn entry_at(&self, key: &VerseKey) -> Option<Vec<u8>> {
        let ord = key.ordinal()?;
        let mut bytes = self.resolve(ord)?.clone();
        for f in self.raw_filters.iter().rev() {
            f.decipher(&mut bytes).ok()?;
        }
        Some(bytes)
    }

    /// Test-Sicht: ist der Schlüssel ein Link auf `dest`?
    pub fn is_link(&self, key: &VerseKey, dest: &VerseKey) -> bool {
        match (key.ordinal(), dest.ordinal()) {
            (Some(k), Some(d)) => {
                matches!(self.slots.get(&k), Some(Slot::Link(target)) if *target == d)
            }
            _ => false,
        }
    }

    /// Anzahl gespeicherter Slots (Texte und Links).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl super::TextModule for MemModule {
    fn system(&self) -> &Rc<System> {
        &self.system
    }

    fn set_key(&mut self, key: &VerseKey) {
        self.current = key.ordinal();
    }

    fn has_entry(&self, key: &VerseKey) -> bool {
        key.ordinal()
            .map(|ord| self.slots.contains_key(&ord))
            .unwrap_or(false)
    }

    fn raw_entry(&mut self) -> Result<Vec<u8>> {
        let ord = match self.current {
            Some(o) => o,
            None => return Ok(Vec::new()),
        };
        let mut bytes = self.resolve(ord).cloned().unwrap_or_default();
        for f in self.raw_filters.iter().rev() {
            f.decipher(&mut bytes)?;
        }
        Ok(bytes)
    }

    fn set_entry(&mut self, bytes: &[u8]) -> Result<()> {
        let ord = self
            .current
            .ok_or_else(|| Error::Io("set_entry without a positioned key".into()))?;
        let mut data = bytes.to_vec();
        for f in &self.raw_filters {
            f.encipher(&mut data)?;
        }
        self.slots.insert(ord, Slot::Text(data));
        Ok(())
    }

    fn link_entry(&mut self, dest: &VerseKey) -> Result<()> {
        let ord = self
            .current
            .ok_or_else(|| Error::Io("link_entry without a positioned key".into()))?;
        let dest_ord = dest
            .ordinal()
            .ok_or_else(|| Error::Io("link destination outside the versification".into()))?;
        self.slots.insert(ord, Slot::Link(dest_ord));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn add_raw_filter(&mut self, filter: Box<dyn RawFilter>) {
        self.raw_filters.push(filter);
    }

    fn is_writable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::TextModule;
    use super::*;
    use crate::filter::CipherFilter;

    fn sys() -> Rc<System> {
        Rc::new(System::kjv())
    }

    #[test]
    fn set_and_read_back() {
        let s = sys();
        let mut m = MemModule::new(s.clone());
        let k = VerseKey::from_osis(s, "Gen.1.1").unwrap();
        m.set_key(&k);
        m.set_entry(b"In the beginning").unwrap();
        assert!(m.has_entry(&k));
        assert_eq!(m.raw_entry().unwrap(), b"In the beginning");
        assert_eq!(m.entry_at(&k).unwrap(), b"In the beginning");
    }

    #[test]
    fn links_resolve_to_destination_text() {
        let s = sys();
        let mut m = MemModule::new(s.clone());
        let dest = VerseKey::from_osis(s.clone(), "Gen.1.29").unwrap();
        let link = VerseKey::from_osis(s, "Gen.1.30").unwrap();
        m.set_key(&dest);
        m.set_entry(b"X").unwrap();
        m.set_key(&link);
        m.link_entry(&dest).unwrap();
        assert!(m.has_entry(&link));
        assert!(m.is_link(&link, &dest));
        assert_eq!(m.entry_at(&link).unwrap(), b"X");
    }

    #[test]
    fn invalid_keys_have_no_entries() {
        let s = sys();
        let m = MemModule::new(s.clone());
        let bad = VerseKey::from_osis(s, "Gen.1.32").unwrap();
        assert!(!m.has_entry(&bad));
    }

    /// Roh-Filter laufen beim Schreiben vorwärts und beim Lesen rückwärts.
    #[test]
    fn raw_filters_are_inverted_on_read() {
        let s = sys();
        let mut m = MemModule::new(s.clone());
        m.add_raw_filter(Box::new(CipherFilter::new("k")));
        let k = VerseKey::from_osis(s, "Gen.1.1").unwrap();
        m.set_key(&k);
        m.set_entry(b"secret text").unwrap();
        assert_eq!(m.raw_entry().unwrap(), b"secret text");
    }
}
