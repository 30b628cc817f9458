//! rosis – OSIS Bible/commentary importer for verse-keyed text modules
//!
//! # Beispiel
//!
//! ```
//! use std::rc::Rc;
//! use rosis::{import, ImportOptions, MemModule, Reporter, TextModule, VerseKey};
//! use rosis::v11n::System;
//!
//! let osis = r#"<osis><osisText><header></header>
//!   <div type="book" osisID="Gen" sID="g"/>
//!   <chapter osisID="Gen.1" sID="gc"/>
//!   <verse osisID="Gen.1.1" sID="gv"/>In the beginning.<verse eID="gv"/>
//!   <chapter eID="gc"/><div eID="g"/></osisText></osis>"#;
//!
//! let system = Rc::new(System::kjv());
//! let module = Box::new(MemModule::new(system.clone()));
//! let reporter = Reporter::with_writer(Default::default(), Box::new(Vec::new()));
//! let (module, stats) = import(
//!     ImportOptions::default(),
//!     module,
//!     reporter,
//!     std::io::Cursor::new(osis.as_bytes()),
//! )
//! .unwrap();
//!
//! let key = VerseKey::from_osis(system, "Gen.1.1").unwrap();
//! assert!(module.has_entry(&key));
//! assert!(stats.entries_written >= 1);
//! ```

pub mod compress;
pub mod diag;
pub mod error;
pub mod filter;
pub mod importer;
pub mod key;
pub mod module;
pub mod options;
pub mod tag;
pub mod unicode;
pub mod v11n;

mod canon;
mod pending;
mod scanner;
mod transform;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent — für interne
/// Datenstrukturen wie Buchnamen- und Block-Lookups).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration für die
/// Versschema-Registry und die Hilfe-Ausgabe).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Diagnostik
pub use diag::{DebugFlags, Reporter};

// Public API: Schlüssel und Schemata
pub use key::{ListKey, VerseKey};
pub use v11n::{System, VersificationMgr};

// Public API: Module
pub use module::{
    create_module, open_module, BlockLevel, EntryWidth, MemModule, ModuleShape, RawModule,
    TextModule, ZModule,
};

// Public API: Import
pub use importer::{import, Importer};
pub use options::{ImportOptions, OutputEncoding};
pub use pending::ImportStats;

// Public API: Bausteine für Einbettungen
pub use compress::{CompressType, Compressor};
pub use filter::{RawFilter, TextFilter};
pub use tag::XmlTag;
