//! Block-compressed on-disk module.
//!
//! Einträge werden nach `-b` zu Blöcken gruppiert (Vers/Kapitel/Buch,
//! ausgedrückt als Start-Ordinal der Gruppe), Blöcke als Ganzes durch den
//! gewählten [`Compressor`] gepackt und — wenn ein Cipher-Filter hängt —
//! über den komprimierten Bytes chiffriert (Filterreihenfolge wie bei den
//! klassischen Modulen: Kompression, dann Cipher).
//!
//! Drei Dateien: `ztext.dat` (gepackte Blöcke), `zidx.dat` (Blockkatalog:
//! Offset, gepackte und ungepackte Größe) und `zvs.dat` (je Ordinal:
//! Blocknummer+1, Offset im Block, Größenfeld in Eintragsbreite; 0 = kein
//! Eintrag, `u32::MAX` = Link auf das Ordinal im Offsetfeld).

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::compress::Compressor;
use crate::error::{Error, Result};
use crate::filter::RawFilter;
use crate::key::VerseKey;
use crate::module::{BlockLevel, EntryWidth};
use crate::v11n::System;
use crate::FastHashMap;

const TEXT_NAME: &str = "ztext.dat";
const BLOCK_IDX_NAME: &str = "zidx.dat";
const VERSE_IDX_NAME: &str = "zvs.dat";

const LINK_MARK: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    None,
    Span { block: u32, offset: u32, size: u32 },
    Link(u32),
}

pub struct ZModule {
    path: PathBuf,
    system: Rc<System>,
    width: EntryWidth,
    level: BlockLevel,
    compressor: Box<dyn Compressor>,
    /// Gepackte (und ggf. chiffrierte) Blöcke.
    blocks: Vec<Vec<u8>>,
    /// Ungepackte Größe je Block (informativ, für den Katalog).
    block_usize: Vec<u32>,
    /// Gruppen-Start-Ordinal → Blocknummer.
    block_of_group: FastHashMap<u32, u32>,
    slots: Vec<Slot>,
    /// Offener Block: (Gruppen-Start, Blocknummer, Klartext).
    open: Option<(u32, u32, Vec<u8>)>,
    /// Zuletzt entpackter Block für Lesezugriffe.
    read_cache: Option<(u32, Vec<u8>)>,
    current: Option<u32>,
    raw_filters: Vec<Box<dyn RawFilter>>,
    writable: bool,
}

impl ZModule {
    pub fn create(
        path: &Path,
        system: Rc<System>,
        width: EntryWidth,
        level: BlockLevel,
        compressor: Box<dyn Compressor>,
    ) -> Result<Self> {
        let total = system.total_entries() as usize;
        let module = Self {
            path: path.to_path_buf(),
            system,
            width,
            level,
            compressor,
            blocks: Vec::new(),
            block_usize: Vec::new(),
            block_of_group: FastHashMap::default(),
            slots: vec![Slot::None; total],
            open: None,
            read_cache: None,
            current: None,
            raw_filters: Vec::new(),
            writable: true,
        };
        module.persist()?;
        Ok(module)
    }

    pub fn open(
        path: &Path,
        system: Rc<System>,
        width: EntryWidth,
        level: BlockLevel,
        compressor: Box<dyn Compressor>,
    ) -> Result<Self> {
        let read = |name: &str| -> Result<Vec<u8>> {
            std::fs::read(path.join(name))
                .map_err(|e| Error::NotWritable(format!("{}: {e}", path.join(name).display())))
        };
        let text = read(TEXT_NAME)?;
        let bidx = read(BLOCK_IDX_NAME)?;
        let vidx = read(VERSE_IDX_NAME)?;

        let mut blocks = Vec::new();
        let mut block_usize = Vec::new();
        for rec in bidx.chunks_exact(12) {
            let offset = u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]) as usize;
            let csize = u32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]) as usize;
            let usize_ = u32::from_le_bytes([rec[8], rec[9], rec[10], rec[11]]);
            if offset + csize > text.len() {
                return Err(Error::NotWritable("block catalog out of range".into()));
            }
            blocks.push(text[offset..offset + csize].to_vec());
            block_usize.push(usize_);
        }

        let rec_len = 8 + match width {
            EntryWidth::Two => 2,
            EntryWidth::Four => 4,
        };
        let total = system.total_entries() as usize;
        let mut slots = vec![Slot::None; total];
        for (ord, rec) in vidx.chunks_exact(rec_len).enumerate().take(total) {
            let block = u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]);
            let offset = u32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]);
            let size = match width {
                EntryWidth::Two => u16::from_le_bytes([rec[8], rec[9]]) as u32,
                EntryWidth::Four => u32::from_le_bytes([rec[8], rec[9], rec[10], rec[11]]),
            };
            slots[ord] = match block {
                0 => Slot::None,
                LINK_MARK => Slot::Link(offset),
                b => Slot::Span {
                    block: b - 1,
                    offset,
                    size,
                },
            };
        }

        let mut module = Self {
            path: path.to_path_buf(),
            system,
            width,
            level,
            compressor,
            blocks,
            block_usize,
            block_of_group: FastHashMap::default(),
            slots,
            open: None,
            read_cache: None,
            current: None,
            raw_filters: Vec::new(),
            writable: true,
        };
        module.rebuild_group_map();
        Ok(module)
    }

    /// Nach dem Laden: Gruppenzuordnung aus den Slots rekonstruieren.
    fn rebuild_group_map(&mut self) {
        for (ord, slot) in self.slots.iter().enumerate() {
            if let Slot::Span { block, .. } = slot {
                let group = self.group_start(ord as u32);
                self.block_of_group.entry(group).or_insert(*block);
            }
        }
    }

    /// Start-Ordinal der Blockgruppe eines Ordinals.
    fn group_start(&self, ordinal: u32) -> u32 {
        if self.level == BlockLevel::Verse {
            return ordinal;
        }
        let (t, b, c, _v) = match self.system.key_parts_at(ordinal) {
            Some(parts) => parts,
            None => return ordinal,
        };
        if b == 0 {
            // Modul-/Testament-Intros bilden eigene Gruppen
            return ordinal;
        }
        match self.level {
            BlockLevel::Book => self.system.ordinal(t, b, 0, 0).unwrap_or(ordinal),
            BlockLevel::Chapter => self.system.ordinal(t, b, c, 0).unwrap_or(ordinal),
            BlockLevel::Verse => ordinal,
        }
    }

    /// Packt den offenen Block zurück in den Blockspeicher.
    fn close_open(&mut self) -> Result<()> {
        if let Some((_group, block_no, plain)) = self.open.take() {
            let mut packed = self.compressor.compress(&plain)?;
            for f in &self.raw_filters {
                f.encipher(&mut packed)?;
            }
            let no = block_no as usize;
            if no >= self.blocks.len() {
                self.blocks.resize(no + 1, Vec::new());
                self.block_usize.resize(no + 1, 0);
            }
            self.blocks[no] = packed;
            self.block_usize[no] = plain.len() as u32;
            // der Lese-Cache könnte den alten Stand halten
            if matches!(self.read_cache, Some((n, _)) if n == block_no) {
                self.read_cache = None;
            }
        }
        Ok(())
    }

    fn unpack_block(&self, block_no: u32) -> Result<Vec<u8>> {
        let packed = self
            .blocks
            .get(block_no as usize)
            .ok_or_else(|| Error::Io(format!("missing block {block_no}")))?;
        let mut bytes = packed.clone();
        for f in self.raw_filters.iter().rev() {
            f.decipher(&mut bytes)?;
        }
        self.compressor.decompress(&bytes)
    }

    /// Öffnet die Gruppe zum Anhängen; lädt existierende Blöcke zurück.
    fn open_group(&mut self, group: u32) -> Result<()> {
        if matches!(self.open, Some((g, _, _)) if g == group) {
            return Ok(());
        }
        self.close_open()?;
        match self.block_of_group.get(&group).copied() {
            Some(block_no) => {
                let plain = self.unpack_block(block_no)?;
                self.open = Some((group, block_no, plain));
            }
            None => {
                let block_no = self.blocks.len() as u32;
                self.blocks.push(Vec::new());
                self.block_usize.push(0);
                self.block_of_group.insert(group, block_no);
                self.open = Some((group, block_no, Vec::new()));
            }
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let mut text = Vec::new();
        let mut bidx = Vec::with_capacity(self.blocks.len() * 12);
        for (i, block) in self.blocks.iter().enumerate() {
            bidx.extend_from_slice(&(text.len() as u32).to_le_bytes());
            bidx.extend_from_slice(&(block.len() as u32).to_le_bytes());
            bidx.extend_from_slice(&self.block_usize[i].to_le_bytes());
            text.extend_from_slice(block);
        }

        let mut vidx = Vec::new();
        for slot in &self.slots {
            let (block, offset, size) = match *slot {
                Slot::None => (0u32, 0u32, 0u32),
                Slot::Link(dest) => (LINK_MARK, dest, 0),
                Slot::Span {
                    block,
                    offset,
                    size,
                } => (block + 1, offset, size),
            };
            vidx.extend_from_slice(&block.to_le_bytes());
            vidx.extend_from_slice(&offset.to_le_bytes());
            match self.width {
                EntryWidth::Two => {
                    vidx.extend_from_slice(&(size.min(u16::MAX as u32) as u16).to_le_bytes())
                }
                EntryWidth::Four => vidx.extend_from_slice(&size.to_le_bytes()),
            }
        }

        std::fs::write(self.path.join(TEXT_NAME), text)
            .map_err(|e| Error::io("writing ztext.dat", e))?;
        std::fs::write(self.path.join(BLOCK_IDX_NAME), bidx)
            .map_err(|e| Error::io("writing zidx.dat", e))?;
        std::fs::write(self.path.join(VERSE_IDX_NAME), vidx)
            .map_err(|e| Error::io("writing zvs.dat", e))
    }

    fn slot(&self, ordinal: u32) -> Slot {
        self.slots
            .get(ordinal as usize)
            .copied()
            .unwrap_or(Slot::None)
    }

    fn resolve(&self, ordinal: u32) -> Slot {
        match self.slot(ordinal) {
            Slot::Link(dest) => self.slot(dest),
            s => s,
        }
    }
}

impl super::TextModule for ZModule {
    fn system(&self) -> &Rc<System> {
        &self.system
    }

    fn set_key(&mut self, key: &VerseKey) {
        self.current = key.ordinal();
    }

    fn has_entry(&self, key: &VerseKey) -> bool {
        key.ordinal()
            .map(|o| !matches!(self.slot(o), Slot::None))
            .unwrap_or(false)
    }

    fn raw_entry(&mut self) -> Result<Vec<u8>> {
        let ord = match self.current {
            Some(o) => o,
            None => return Ok(Vec::new()),
        };
        let (block, offset, size) = match self.resolve(ord) {
            Slot::Span {
                block,
                offset,
                size,
            } => (block, offset, size),
            _ => return Ok(Vec::new()),
        };
        let slice = |plain: &[u8]| {
            let start = offset as usize;
            let end = (start + size as usize).min(plain.len());
            plain[start..end].to_vec()
        };
        // erst im offenen Block nachsehen
        if let Some((_g, no, plain)) = &self.open {
            if *no == block {
                return Ok(slice(plain));
            }
        }
        if let Some((n, plain)) = &self.read_cache {
            if *n == block {
                return Ok(slice(plain));
            }
        }
        let plain = self.unpack_block(block)?;
        let bytes = slice(&plain);
        self.read_cache = Some((block, plain));
        Ok(bytes)
    }

    fn set_entry(&mut self, bytes: &[u8]) -> Result<()> {
        let ord = self
            .current
            .ok_or_else(|| Error::Io("set_entry without a positioned key".into()))?;
        let group = self.group_start(ord);
        self.open_group(group)?;
        let mut data = bytes.to_vec();
        data.truncate(self.width.max_len());
        match self.open.as_mut() {
            Some((_g, block_no, plain)) => {
                let offset = plain.len() as u32;
                plain.extend_from_slice(&data);
                self.slots[ord as usize] = Slot::Span {
                    block: *block_no,
                    offset,
                    size: data.len() as u32,
                };
                Ok(())
            }
            None => Err(Error::Io("no open block after open_group".into())),
        }
    }

    fn link_entry(&mut self, dest: &VerseKey) -> Result<()> {
        let ord = self
            .current
            .ok_or_else(|| Error::Io("link_entry without a positioned key".into()))?;
        let dest_ord = dest
            .ordinal()
            .ok_or_else(|| Error::Io("link destination outside the versification".into()))?;
        self.slots[ord as usize] = Slot::Link(dest_ord);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.close_open()?;
        self.persist()
    }

    fn add_raw_filter(&mut self, filter: Box<dyn RawFilter>) {
        self.raw_filters.push(filter);
    }

    fn is_writable(&self) -> bool {
        self.writable
    }
}

impl Drop for ZModule {
    fn drop(&mut self) {
        if self.close_open().is_ok() {
            let _ = self.persist();
        }
    }
}
