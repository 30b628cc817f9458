//! Diagnostics: debug categories and the position-aware reporter.
//!
//! Jede Meldung hat die Form `LEVEL(CATEGORY)[line,col](osisID): message`.
//! `[line,col]` entfällt wenn die Zeile 0 ist (noch kein Scanner-Input),
//! `(osisID)` entfällt wenn leer. Der Reporter hält die aktuelle Position
//! (vom Scanner fortgeschrieben) und die zuletzt gesehene osisID (von der
//! State-Machine fortgeschrieben), damit Meldungen aus jeder Pipeline-Stufe
//! verortbar sind.

use std::fmt;
use std::io::Write;

/// Bitmask of debug categories (`-d` flag, OR-kombinierbar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFlags(pub u32);

impl DebugFlags {
    /// Writes to the module, very verbose.
    pub const WRITE: u32 = 1;
    /// Verse start and end.
    pub const VERSE: u32 = 2;
    /// Quotes, especially Words of Christ.
    pub const QUOTE: u32 = 4;
    /// Titles.
    pub const TITLE: u32 = 8;
    /// Inter-verse material.
    pub const INTERVERSE: u32 = 16;
    /// BSP to BCV transformations.
    pub const XFORM: u32 = 32;
    /// Versification exceptions.
    pub const REV11N: u32 = 64;
    /// Parsing of osisID and osisRef.
    pub const REF: u32 = 128;
    /// Internal tag stack.
    pub const STACK: u32 = 256;
    /// Ins and outs of books, chapters and verses.
    pub const OTHER: u32 = 512;
    /// Parsing of numeric and character entities and comments.
    pub const PARSE: u32 = 1024;

    pub fn none() -> Self {
        Self(0)
    }

    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask != 0
    }
}

impl std::ops::BitOrAssign<u32> for DebugFlags {
    fn bitor_assign(&mut self, rhs: u32) {
        self.0 |= rhs;
    }
}

/// Position- und Kontext-bewusster Diagnose-Reporter.
///
/// Schreibt auf einen injizierten `Write` (CLI: stdout, Tests: Puffer).
/// Write-Fehler werden verschluckt — Diagnostik darf den Import nie abbrechen.
pub struct Reporter {
    debug: DebugFlags,
    line: u32,
    col: u32,
    osis_id: String,
    out: Box<dyn Write>,
}

impl Reporter {
    /// Reporter mit stdout als Ziel (CLI-Pfad).
    pub fn new(debug: DebugFlags) -> Self {
        Self::with_writer(debug, Box::new(std::io::stdout()))
    }

    /// Reporter mit beliebigem Ziel (Test-Pfad).
    pub fn with_writer(debug: DebugFlags, out: Box<dyn Write>) -> Self {
        Self {
            debug,
            line: 0,
            col: 0,
            osis_id: String::from("N/A"),
            out,
        }
    }

    pub fn debug_flags(&self) -> DebugFlags {
        self.debug
    }

    /// Scanner-Position fortschreiben (1-basierte Zeile).
    pub fn set_position(&mut self, line: u32, col: u32) {
        self.line = line;
        self.col = col;
    }

    /// Aktuelle osisID fortschreiben (State-Machine).
    pub fn set_context(&mut self, osis_id: &str) {
        self.osis_id.clear();
        self.osis_id.push_str(osis_id);
    }

    pub fn context(&self) -> &str {
        &self.osis_id
    }

    /// Builds the `LEVEL(CATEGORY)[line,col](osisID): ` prefix.
    fn prefix(&self, level: &str, category: &str, id: &str) -> String {
        let mut buf = format!("{level}({category})");
        if self.line > 0 {
            buf.push_str(&format!("[{},{}]", self.line, self.col));
        }
        if !id.is_empty() {
            buf.push_str(&format!("({id})"));
        }
        buf.push_str(": ");
        buf
    }

    fn emit(&mut self, level: &str, category: &str, id: &str, msg: fmt::Arguments<'_>) {
        let prefix = self.prefix(level, category, id);
        let _ = writeln!(self.out, "{prefix}{msg}");
    }

    /// INFO-Meldung mit expliziter osisID.
    pub fn info(&mut self, category: &str, id: &str, msg: fmt::Arguments<'_>) {
        self.emit("INFO", category, id, msg);
    }

    /// WARNING mit expliziter osisID.
    pub fn warning(&mut self, category: &str, id: &str, msg: fmt::Arguments<'_>) {
        self.emit("WARNING", category, id, msg);
    }

    /// WARNING mit der aktuellen osisID als Kontext.
    pub fn warning_ctx(&mut self, category: &str, msg: fmt::Arguments<'_>) {
        let id = self.osis_id.clone();
        self.emit("WARNING", category, &id, msg);
    }

    /// ERROR mit expliziter osisID.
    pub fn error(&mut self, category: &str, id: &str, msg: fmt::Arguments<'_>) {
        self.emit("ERROR", category, id, msg);
    }

    /// ERROR mit der aktuellen osisID.
    pub fn error_ctx(&mut self, category: &str, msg: fmt::Arguments<'_>) {
        let id = self.osis_id.clone();
        self.emit("ERROR", category, &id, msg);
    }

    /// FATAL wird gemeldet, aber der Abbruch ist Sache des Aufrufers
    /// (die Library liefert den Fehler als `Result` nach oben).
    pub fn fatal(&mut self, category: &str, id: &str, msg: fmt::Arguments<'_>) {
        self.emit("FATAL", category, id, msg);
    }

    /// DEBUG, nur wenn die Kategorie per `-d` aktiv ist.
    pub fn dbg(&mut self, mask: u32, category: &str, id: &str, msg: fmt::Arguments<'_>) {
        if self.debug.contains(mask) {
            self.emit("DEBUG", category, id, msg);
        }
    }

    /// DEBUG mit aktueller osisID.
    pub fn dbg_ctx(&mut self, mask: u32, category: &str, msg: fmt::Arguments<'_>) {
        if self.debug.contains(mask) {
            let id = self.osis_id.clone();
            self.emit("DEBUG", category, &id, msg);
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("debug", &self.debug)
            .field("line", &self.line)
            .field("col", &self.col)
            .field("osis_id", &self.osis_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared Vec<u8>-Writer zum Abfangen der Diagnostik in Tests.
    #[derive(Clone, Default)]
    pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prefix_omits_position_when_line_zero() {
        let rpt = Reporter::with_writer(DebugFlags::none(), Box::new(Vec::new()));
        assert_eq!(rpt.prefix("ERROR", "REF", ""), "ERROR(REF): ");
    }

    #[test]
    fn prefix_includes_position_and_id() {
        let mut rpt = Reporter::with_writer(DebugFlags::none(), Box::new(Vec::new()));
        rpt.set_position(12, 34);
        assert_eq!(
            rpt.prefix("WARNING", "V11N", "Gen.1.1"),
            "WARNING(V11N)[12,34](Gen.1.1): "
        );
    }

    #[test]
    fn debug_messages_are_gated_by_mask() {
        let cap = Capture::default();
        let mut rpt =
            Reporter::with_writer(DebugFlags(DebugFlags::QUOTE), Box::new(cap.clone()));
        rpt.dbg(DebugFlags::QUOTE, "QUOTE", "", format_args!("visible"));
        rpt.dbg(DebugFlags::WRITE, "WRITE", "", format_args!("hidden"));
        let out = cap.contents();
        assert!(out.contains("visible"), "{out}");
        assert!(!out.contains("hidden"), "{out}");
    }

    #[test]
    fn warning_ctx_uses_current_osis_id() {
        let cap = Capture::default();
        let mut rpt = Reporter::with_writer(DebugFlags::none(), Box::new(cap.clone()));
        rpt.set_context("Matt.5.3");
        rpt.warning_ctx("NESTING", format_args!("verse is not well formed"));
        assert!(cap.contents().contains("(Matt.5.3)"), "{}", cap.contents());
    }

    #[test]
    fn flag_accumulation_ors_values() {
        let mut d = DebugFlags::none();
        d |= DebugFlags::VERSE;
        d |= DebugFlags::REF;
        assert!(d.contains(DebugFlags::VERSE));
        assert!(d.contains(DebugFlags::REF));
        assert!(!d.contains(DebugFlags::WRITE));
    }
}
