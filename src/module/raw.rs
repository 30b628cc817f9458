//! Uncompressed on-disk module.
//!
//! Zwei Dateien: `index.dat` mit einem Festbreiten-Record je Ordinal
//! (u32-Offset + Größenfeld in Eintragsbreite 2 oder 4 Bytes, little
//! endian) und `text.dat` mit den Eintragsbytes. Offset 0 heißt "kein
//! Eintrag"; die Datendatei beginnt deshalb mit einem Pad-Byte. Ein Link
//! ist ein Index-Record, der auf die Spanne seines Ziels zeigt — Links
//! werden erst nach allen Text-Schreibvorgängen angelegt, damit die
//! Spannen endgültig sind.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::filter::RawFilter;
use crate::key::VerseKey;
use crate::module::EntryWidth;
use crate::v11n::System;

const INDEX_NAME: &str = "index.dat";
const TEXT_NAME: &str = "text.dat";

pub struct RawModule {
    path: PathBuf,
    system: Rc<System>,
    width: EntryWidth,
    index: Vec<(u32, u32)>,
    data: Vec<u8>,
    current: Option<u32>,
    raw_filters: Vec<Box<dyn RawFilter>>,
    writable: bool,
}

impl RawModule {
    /// Creates the files for a fresh module.
    pub fn create(path: &Path, system: Rc<System>, width: EntryWidth) -> Result<Self> {
        let total = system.total_entries() as usize;
        let module = Self {
            path: path.to_path_buf(),
            system,
            width,
            index: vec![(0, 0); total],
            data: vec![0],
            current: None,
            raw_filters: Vec::new(),
            writable: true,
        };
        module.persist()?;
        Ok(module)
    }

    /// Opens an existing module for appending.
    pub fn open(path: &Path, system: Rc<System>, width: EntryWidth) -> Result<Self> {
        let idx_bytes = std::fs::read(path.join(INDEX_NAME))
            .map_err(|e| Error::NotWritable(format!("{}: {e}", path.join(INDEX_NAME).display())))?;
        let data = std::fs::read(path.join(TEXT_NAME))
            .map_err(|e| Error::NotWritable(format!("{}: {e}", path.join(TEXT_NAME).display())))?;
        let rec = 4 + match width {
            EntryWidth::Two => 2,
            EntryWidth::Four => 4,
        };
        let mut index = Vec::with_capacity(idx_bytes.len() / rec);
        for chunk in idx_bytes.chunks_exact(rec) {
            let offset = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let size = match width {
                EntryWidth::Two => u16::from_le_bytes([chunk[4], chunk[5]]) as u32,
                EntryWidth::Four => u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
            };
            index.push((offset, size));
        }
        let total = system.total_entries() as usize;
        index.resize(total, (0, 0));
        Ok(Self {
            path: path.to_path_buf(),
            system,
            width,
            index,
            data,
            current: None,
            raw_filters: Vec::new(),
            writable: true,
        })
    }

    fn persist(&self) -> Result<()> {
        let rec = 4 + match self.width {
            EntryWidth::Two => 2,
            EntryWidth::Four => 4,
        };
        let mut idx_bytes = Vec::with_capacity(self.index.len() * rec);
        for &(offset, size) in &self.index {
            idx_bytes.extend_from_slice(&offset.to_le_bytes());
            match self.width {
                EntryWidth::Two => {
                    idx_bytes.extend_from_slice(&(size.min(u16::MAX as u32) as u16).to_le_bytes())
                }
                EntryWidth::Four => idx_bytes.extend_from_slice(&size.to_le_bytes()),
            }
        }
        std::fs::write(self.path.join(INDEX_NAME), idx_bytes)
            .map_err(|e| Error::io("writing index.dat", e))?;
        std::fs::write(self.path.join(TEXT_NAME), &self.data)
            .map_err(|e| Error::io("writing text.dat", e))
    }

    fn span(&self, ordinal: u32) -> Option<(u32, u32)> {
        let (offset, size) = *self.index.get(ordinal as usize)?;
        (offset != 0).then_some((offset, size))
    }
}

impl super::TextModule for RawModule {
    fn system(&self) -> &Rc<System> {
        &self.system
    }

    fn set_key(&mut self, key: &VerseKey) {
        self.current = key.ordinal();
    }

    fn has_entry(&self, key: &VerseKey) -> bool {
        key.ordinal().and_then(|o| self.span(o)).is_some()
    }

    fn raw_entry(&mut self) -> Result<Vec<u8>> {
        let ord = match self.current {
            Some(o) => o,
            None => return Ok(Vec::new()),
        };
        let (offset, size) = match self.span(ord) {
            Some(s) => s,
            None => return Ok(Vec::new()),
        };
        let start = offset as usize;
        let end = (start + size as usize).min(self.data.len());
        let mut bytes = self.data[start..end].to_vec();
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
        // Größenfeld-Limit der Eintragsbreite
        data.truncate(self.width.max_len());
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(&data);
        self.index[ord as usize] = (offset, data.len() as u32);
        Ok(())
    }

    fn link_entry(&mut self, dest: &VerseKey) -> Result<()> {
        let ord = self
            .current
            .ok_or_else(|| Error::Io("link_entry without a positioned key".into()))?;
        let dest_ord = dest
            .ordinal()
            .ok_or_else(|| Error::Io("link destination outside the versification".into()))?;
        self.index[ord as usize] = self.index[dest_ord as usize];
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.persist()
    }

    fn add_raw_filter(&mut self, filter: Box<dyn RawFilter>) {
        self.raw_filters.push(filter);
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

impl Drop for RawModule {
    fn drop(&mut self) {
        let _ = self.persist();
    }
}
