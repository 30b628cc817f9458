//! Import options.
//!
//! Reine Daten, keine Logik — der Treiber (CLI oder Einbettung) befüllt
//! sie und baut daraus Importer, Modul und Filterkette zusammen.

use crate::diag::DebugFlags;

/// Output encoding of stored entries (`-e`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Utf8,
    Utf16,
    Scsu,
}

/// Knobs of one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Versification scheme name (nach Auflösung durch den Manager).
    pub v11n: String,
    /// UTF-8-Erzwingung und NFC-Normalisierung beim Flush (`-N` schaltet ab).
    pub normalize: bool,
    /// Debug-Kategorien (`-d`).
    pub debug: DebugFlags,
    /// Speicher-Encoding der Einträge (`-e`).
    pub encoding: OutputEncoding,
    /// Kommentar-Modus (`-C`). Wird angenommen und festgehalten; die
    /// annotateRef-Behandlung läuft unabhängig davon.
    pub commentary: bool,
    /// Eskaliert den Tag-Namens-Mismatch der Milestone-Prüfung zum
    /// fatalen Nesting-Fehler (Default: nur Diagnose).
    pub strict_nesting: bool,
    /// Verse als anonymisierte `<milestone resp="v"/>` in den Text spiegeln
    /// (Diagnose, an DebugFlags::VERSE gekoppelt).
    pub verse_milestones: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            v11n: "KJV".to_string(),
            normalize: true,
            debug: DebugFlags::none(),
            encoding: OutputEncoding::Utf8,
            commentary: false,
            strict_nesting: false,
            verse_milestones: false,
        }
    }
}

impl ImportOptions {
    /// Koppelt abgeleitete Schalter an die Debug-Flags.
    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.verse_milestones = debug.contains(DebugFlags::VERSE);
        self.debug = debug;
        self
    }
}
