//! Verse-keyed text-module storage.
//!
//! Der Importer spricht Module nur über [`TextModule`] an: Schlüssel setzen,
//! Eintrag lesen/schreiben/verlinken, flushen. Adressiert wird über die
//! dichte Ordinalzahl des Versschemas (Intro-Slots eingeschlossen), sodass
//! der Rückwärtslauf der Re-Versifikation und die Dateiadressierung dieselbe
//! Abbildung benutzen.
//!
//! Backends: [`MemModule`] (Tests/Einbettung), [`RawModule`]
//! (Index + Datendatei), [`ZModule`] (blockkomprimiert, optional chiffriert).

use std::path::Path;
use std::rc::Rc;

use crate::compress::CompressType;
use crate::error::{Error, Result};
use crate::filter::RawFilter;
use crate::key::VerseKey;
use crate::v11n::{System, VersificationMgr};

mod mem;
mod raw;
mod zcom;

pub use mem::MemModule;
pub use raw::RawModule;
pub use zcom::ZModule;

/// Compression block granularity (`-b`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLevel {
    Verse,
    Chapter,
    Book,
}

impl BlockLevel {
    pub fn from_flag(n: u32) -> Option<Self> {
        match n {
            2 => Some(Self::Verse),
            3 => Some(Self::Chapter),
            4 => Some(Self::Book),
            _ => None,
        }
    }

    pub fn as_flag(self) -> u32 {
        match self {
            Self::Verse => 2,
            Self::Chapter => 3,
            Self::Book => 4,
        }
    }
}

/// Width of the per-entry size field (`-s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryWidth {
    Two,
    Four,
}

impl EntryWidth {
    pub fn from_flag(n: u32) -> Option<Self> {
        match n {
            2 => Some(Self::Two),
            4 => Some(Self::Four),
            _ => None,
        }
    }

    pub fn max_len(self) -> usize {
        match self {
            Self::Two => u16::MAX as usize,
            Self::Four => u32::MAX as usize,
        }
    }

    pub fn as_flag(self) -> u32 {
        match self {
            Self::Two => 2,
            Self::Four => 4,
        }
    }
}

/// Requested on-disk shape of a module.
#[derive(Debug, Clone)]
pub struct ModuleShape {
    pub compress: Option<CompressType>,
    pub block_level: BlockLevel,
    pub entry_width: EntryWidth,
    pub level: Option<u32>,
}

impl Default for ModuleShape {
    fn default() -> Self {
        Self {
            compress: None,
            block_level: BlockLevel::Book,
            entry_width: EntryWidth::Two,
            level: None,
        }
    }
}

/// The storage operations the importer consumes.
pub trait TextModule {
    fn system(&self) -> &Rc<System>;
    /// Positioniert das Modul; ungültige Schlüssel machen die Folge-Ops
    /// zu Fehlern bzw. `false`.
    fn set_key(&mut self, key: &VerseKey);
    fn has_entry(&self, key: &VerseKey) -> bool;
    /// Eintrag am aktuellen Schlüssel (Roh-Filter bereits rückgängig);
    /// leer wenn nicht vorhanden.
    fn raw_entry(&mut self) -> Result<Vec<u8>>;
    fn set_entry(&mut self, bytes: &[u8]) -> Result<()>;
    /// Verlinkt den aktuellen Schlüssel auf `dest`.
    fn link_entry(&mut self, dest: &VerseKey) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn add_raw_filter(&mut self, filter: Box<dyn RawFilter>);
    fn is_writable(&self) -> bool;
}

impl std::fmt::Debug for dyn TextModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<dyn TextModule>")
    }
}

/// Creates a new module of the requested shape at `path`.
pub fn create_module(
    path: &Path,
    shape: &ModuleShape,
    system: Rc<System>,
) -> Result<Box<dyn TextModule>> {
    write_conf(path, shape, &system)?;
    match shape.compress {
        None => Ok(Box::new(RawModule::create(path, system, shape.entry_width)?)),
        Some(ct) => {
            let mut compressor = ct.create()?;
            if let Some(level) = shape.level {
                compressor.set_level(level);
            }
            Ok(Box::new(ZModule::create(
                path,
                system,
                shape.entry_width,
                shape.block_level,
                compressor,
            )?))
        }
    }
}

/// Opens an existing module (`-a`), Form und Schema aus der conf.
pub fn open_module(path: &Path, mgr: &VersificationMgr) -> Result<Box<dyn TextModule>> {
    let (shape, v11n) = read_conf(path)?;
    let system = mgr
        .get(&v11n)
        .ok_or_else(|| Error::NotWritable(format!("unknown versification {v11n} in module conf")))?;
    match shape.compress {
        None => Ok(Box::new(RawModule::open(path, system, shape.entry_width)?)),
        Some(ct) => {
            let mut compressor = ct.create()?;
            if let Some(level) = shape.level {
                compressor.set_level(level);
            }
            Ok(Box::new(ZModule::open(
                path,
                system,
                shape.entry_width,
                shape.block_level,
                compressor,
            )?))
        }
    }
}

const CONF_NAME: &str = "module.conf";

fn write_conf(path: &Path, shape: &ModuleShape, system: &System) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| Error::ModuleCreate(format!("{}: {e}", path.display())))?;
    let compress = shape
        .compress
        .map(|c| c.label().to_string())
        .unwrap_or_else(|| "none".to_string());
    let conf = format!(
        "[rosis]\nv11n={}\ncompress={}\nblocking={}\nentry_width={}\n",
        system.name(),
        compress,
        shape.block_level.as_flag(),
        shape.entry_width.as_flag(),
    );
    std::fs::write(path.join(CONF_NAME), conf)
        .map_err(|e| Error::ModuleCreate(format!("{}: {e}", path.display())))
}

fn read_conf(path: &Path) -> Result<(ModuleShape, String)> {
    let text = std::fs::read_to_string(path.join(CONF_NAME))
        .map_err(|e| Error::NotWritable(format!("{}: {e}", path.join(CONF_NAME).display())))?;
    let mut shape = ModuleShape::default();
    let mut v11n = String::from("KJV");
    for line in text.lines() {
        let line = line.trim();
        if let Some((k, v)) = line.split_once('=') {
            match k {
                "v11n" => v11n = v.to_string(),
                "compress" => {
                    shape.compress = match v {
                        "none" => None,
                        "LZSS" => Some(CompressType::Lzss),
                        "ZIP" => Some(CompressType::Zip),
                        "BZIP2" => Some(CompressType::Bzip2),
                        "XZ" => Some(CompressType::Xz),
                        other => {
                            return Err(Error::NotWritable(format!(
                                "unknown compression {other} in module conf"
                            )))
                        }
                    }
                }
                "blocking" => {
                    shape.block_level = v
                        .parse::<u32>()
                        .ok()
                        .and_then(BlockLevel::from_flag)
                        .ok_or_else(|| {
                            Error::NotWritable(format!("bad blocking value {v} in module conf"))
                        })?;
                }
                "entry_width" => {
                    shape.entry_width = v
                        .parse::<u32>()
                        .ok()
                        .and_then(EntryWidth::from_flag)
                        .ok_or_else(|| {
                            Error::NotWritable(format!("bad entry width {v} in module conf"))
                        })?;
                }
                _ => {}
            }
        }
    }
    Ok((shape, v11n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rosis-module-{tag}-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn conf_round_trips_shape() {
        let dir = temp_dir("conf");
        let sys = System::kjv();
        let shape = ModuleShape {
            compress: Some(CompressType::Zip),
            block_level: BlockLevel::Chapter,
            entry_width: EntryWidth::Four,
            level: None,
        };
        write_conf(&dir, &shape, &sys).unwrap();
        let (read, v11n) = read_conf(&dir).unwrap();
        assert_eq!(v11n, "KJV");
        assert_eq!(read.compress, Some(CompressType::Zip));
        assert_eq!(read.block_level, BlockLevel::Chapter);
        assert_eq!(read.entry_width, EntryWidth::Four);
    }

    #[test]
    fn open_without_conf_is_an_error() {
        let dir = temp_dir("noconf");
        let mgr = VersificationMgr::new();
        let err = open_module(&dir, &mgr).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn block_and_width_flags_parse() {
        assert_eq!(BlockLevel::from_flag(2), Some(BlockLevel::Verse));
        assert_eq!(BlockLevel::from_flag(4), Some(BlockLevel::Book));
        assert_eq!(BlockLevel::from_flag(5), None);
        assert_eq!(EntryWidth::from_flag(2), Some(EntryWidth::Two));
        assert_eq!(EntryWidth::from_flag(3), None);
        assert_eq!(EntryWidth::Two.max_len(), 65535);
    }
}
