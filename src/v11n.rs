//! Versification systems and their registry.
//!
//! Ein [`System`] legt Bücher, Kapitel- und Versgrenzen eines Schemas fest
//! und vergibt für jeden adressierbaren Slot eine dichte Ordinalzahl:
//!
//! ```text
//! 0                Modul-Intro
//! 1                AT-Intro
//! 2..              je AT-Buch: Buch-Intro, dann je Kapitel: Kapitel-Intro + Verse
//! nt_intro..       NT-Intro, dann die NT-Bücher nach demselben Muster
//! ```
//!
//! Über diese eine Abbildung laufen sowohl die Schlüssel-Arithmetik
//! (increment/decrement/Normalisierung) als auch die Adressierung der
//! Storage-Backends — Rückwärtslauf bei der Re-Versifikation und
//! Eintrags-Index teilen sich damit dieselbe Quelle.

use std::rc::Rc;

use crate::canon::{BookDef, KJV_BOOKS};
use crate::error::{Error, Result};
use crate::{FastHashMap, FastIndexMap};

/// One book inside a [`System`].
#[derive(Debug, Clone)]
pub struct Book {
    osis: String,
    testament: u8,
    verses: Vec<u16>,
    first_ordinal: u32,
}

impl Book {
    pub fn osis(&self) -> &str {
        &self.osis
    }

    pub fn testament(&self) -> u8 {
        self.testament
    }

    pub fn chapter_count(&self) -> u16 {
        self.verses.len() as u16
    }

    /// Versmaximum eines Kapitels (1-basiert); Kapitel 0 (Intro) hat 0 Verse.
    pub fn verse_max(&self, chapter: u16) -> u16 {
        if chapter == 0 || chapter as usize > self.verses.len() {
            0
        } else {
            self.verses[chapter as usize - 1]
        }
    }

    /// Ordinal des Kapitel-Intros relativ zum Buchanfang.
    fn chapter_offset(&self, chapter: u16) -> u32 {
        let mut off = 1u32; // Buch-Intro
        for c in 0..chapter.saturating_sub(1) {
            off += 1 + self.verses[c as usize] as u32;
        }
        off
    }

    /// Buch-Intro + alle Kapitel mit Intro und Versen.
    fn entry_count(&self) -> u32 {
        1 + self
            .verses
            .iter()
            .map(|&v| 1 + v as u32)
            .sum::<u32>()
    }
}

/// A named versification system.
#[derive(Debug)]
pub struct System {
    name: String,
    books: Vec<Book>,
    by_osis: FastHashMap<String, usize>,
    ot_count: usize,
    nt_intro: u32,
    total: u32,
}

impl System {
    /// Baut ein System aus Buchdefinitionen. Die Bücher müssen je Testament
    /// zusammenhängend angegeben sein (AT vor NT).
    pub fn from_books<I>(name: &str, defs: I) -> Self
    where
        I: IntoIterator<Item = (String, u8, Vec<u16>)>,
    {
        let mut books = Vec::new();
        let mut by_osis = FastHashMap::default();
        let mut ot_count = 0usize;
        // Ordinal 0 = Modul-Intro, 1 = AT-Intro
        let mut next = 2u32;
        let mut nt_intro = 0u32;

        for (osis, testament, verses) in defs {
            if testament == 2 && nt_intro == 0 {
                nt_intro = next;
                next += 1;
            }
            if testament == 1 {
                ot_count += 1;
            }
            let book = Book {
                osis: osis.clone(),
                testament,
                verses,
                first_ordinal: next,
            };
            next += book.entry_count();
            by_osis.insert(osis, books.len());
            books.push(book);
        }
        if nt_intro == 0 {
            // kein NT-Buch: Intro-Slot trotzdem reservieren
            nt_intro = next;
            next += 1;
        }

        Self {
            name: name.to_string(),
            books,
            by_osis,
            ot_count,
            nt_intro,
            total: next,
        }
    }

    fn from_defs(name: &str, defs: &[BookDef]) -> Self {
        Self::from_books(
            name,
            defs.iter()
                .map(|d| (d.osis.to_string(), d.testament, d.verses.to_vec())),
        )
    }

    /// The built-in KJV system.
    pub fn kjv() -> Self {
        Self::from_defs("KJV", KJV_BOOKS)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Book number by OSIS abbreviation, global 0-based.
    pub fn book_index(&self, osis: &str) -> Option<usize> {
        self.by_osis.get(osis).copied()
    }

    pub fn book(&self, index: usize) -> Option<&Book> {
        self.books.get(index)
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }

    /// Bücher im Testament (1 oder 2).
    pub fn books_in_testament(&self, testament: u8) -> usize {
        match testament {
            1 => self.ot_count,
            2 => self.books.len() - self.ot_count,
            _ => 0,
        }
    }

    /// Global index from (testament, 1-based book number within testament).
    pub fn global_index(&self, testament: u8, book: u16) -> Option<usize> {
        if book == 0 {
            return None;
        }
        let idx = match testament {
            1 => book as usize - 1,
            2 => self.ot_count + book as usize - 1,
            _ => return None,
        };
        (idx < self.books.len() && self.books[idx].testament == testament).then_some(idx)
    }

    /// (testament, 1-based book number) from a global index.
    pub fn testament_book(&self, index: usize) -> (u8, u16) {
        let b = &self.books[index];
        if b.testament == 1 {
            (1, index as u16 + 1)
        } else {
            (2, (index - self.ot_count) as u16 + 1)
        }
    }

    /// Total number of addressable slots (Intros eingeschlossen).
    pub fn total_entries(&self) -> u32 {
        self.total
    }

    /// Dense ordinal of a key; `None` wenn außerhalb des Schemas.
    pub fn ordinal(&self, testament: u8, book: u16, chapter: u16, verse: u16) -> Option<u32> {
        match testament {
            0 => (book == 0 && chapter == 0 && verse == 0).then_some(0),
            1 | 2 => {
                if book == 0 {
                    if chapter != 0 || verse != 0 {
                        return None;
                    }
                    return Some(if testament == 1 { 1 } else { self.nt_intro });
                }
                let idx = self.global_index(testament, book)?;
                let b = &self.books[idx];
                if chapter == 0 {
                    return (verse == 0).then_some(b.first_ordinal);
                }
                if chapter > b.chapter_count() {
                    return None;
                }
                if verse > b.verse_max(chapter) {
                    return None;
                }
                Some(b.first_ordinal + b.chapter_offset(chapter) + verse as u32)
            }
            _ => None,
        }
    }

    /// Inverse of [`System::ordinal`].
    pub fn key_parts_at(&self, ordinal: u32) -> Option<(u8, u16, u16, u16)> {
        if ordinal >= self.total {
            return None;
        }
        if ordinal == 0 {
            return Some((0, 0, 0, 0));
        }
        if ordinal == 1 {
            return Some((1, 0, 0, 0));
        }
        if ordinal == self.nt_intro {
            return Some((2, 0, 0, 0));
        }
        let idx = match self
            .books
            .binary_search_by(|b| b.first_ordinal.cmp(&ordinal))
        {
            Ok(i) => i,
            // Vorgänger-Buch; NT-Intro liegt zwischen zwei first_ordinals
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let b = &self.books[idx];
        if ordinal >= b.first_ordinal + b.entry_count() {
            // Lücke (NT-Intro) — oben bereits behandelt, hier defensiv
            return None;
        }
        let (testament, book_no) = self.testament_book(idx);
        let mut rel = ordinal - b.first_ordinal;
        if rel == 0 {
            return Some((testament, book_no, 0, 0));
        }
        rel -= 1;
        for (c, &vmax) in b.verses.iter().enumerate() {
            let span = 1 + vmax as u32;
            if rel < span {
                return Some((testament, book_no, c as u16 + 1, rel as u16));
            }
            rel -= span;
        }
        None
    }
}

/// Resolves an abbreviation or partial name against candidates.
///
/// Strategie wie im Importwerkzeug üblich: (1) exakter Treffer,
/// (2) exakter Treffer ohne Groß/Kleinschreibung, (3) Präfix ohne
/// Groß/Kleinschreibung. 0 Treffer = unbekannt, >1 = mehrdeutig.
pub fn resolve_abbreviation<'a>(input: &str, candidates: &'a [String]) -> Vec<&'a str> {
    for c in candidates {
        if input == c {
            return vec![c.as_str()];
        }
    }
    let upper = input.to_uppercase();
    for c in candidates {
        if upper == c.to_uppercase() {
            return vec![c.as_str()];
        }
    }
    candidates
        .iter()
        .filter(|c| c.to_uppercase().starts_with(&upper))
        .map(|c| c.as_str())
        .collect()
}

/// Registry of versification systems.
///
/// IndexMap hält die Registrierungsreihenfolge fest, damit die Hilfe-Ausgabe
/// deterministisch bleibt.
pub struct VersificationMgr {
    systems: FastIndexMap<String, Rc<System>>,
}

impl VersificationMgr {
    /// Registry with the built-in systems.
    pub fn new() -> Self {
        let mut mgr = Self {
            systems: FastIndexMap::default(),
        };
        mgr.register(System::kjv());
        mgr
    }

    pub fn register(&mut self, system: System) {
        self.systems
            .insert(system.name().to_string(), Rc::new(system));
    }

    /// Scheme names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.systems.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Rc<System>> {
        self.systems.get(name).cloned()
    }

    /// Resolves a (possibly abbreviated) scheme name.
    ///
    /// 0 Treffer und Mehrdeutigkeit sind Usage-Fehler (Exit 1) mit
    /// Kandidatenliste.
    pub fn resolve(&self, input: &str) -> Result<Rc<System>> {
        let names = self.names();
        let matches = resolve_abbreviation(input, &names);
        match matches.len() {
            0 => Err(Error::usage(format!("-v {input} is unknown"))),
            1 => Ok(self.systems[matches[0]].clone()),
            _ => Err(Error::usage(format!(
                "-v {input} is ambiguous, matching {}",
                matches.join(", ")
            ))),
        }
    }
}

impl Default for VersificationMgr {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kjv() -> System {
        System::kjv()
    }

    #[test]
    fn ordinals_start_with_intros() {
        let s = kjv();
        assert_eq!(s.ordinal(0, 0, 0, 0), Some(0));
        assert_eq!(s.ordinal(1, 0, 0, 0), Some(1));
        // Gen-Buch-Intro direkt nach dem AT-Intro
        assert_eq!(s.ordinal(1, 1, 0, 0), Some(2));
        // Gen.1-Kapitel-Intro, dann Gen.1.1
        assert_eq!(s.ordinal(1, 1, 1, 0), Some(3));
        assert_eq!(s.ordinal(1, 1, 1, 1), Some(4));
    }

    #[test]
    fn ordinal_round_trips_over_the_whole_system() {
        let s = kjv();
        for ord in 0..s.total_entries() {
            let (t, b, c, v) = s.key_parts_at(ord).unwrap_or_else(|| {
                panic!("no key parts at ordinal {ord}");
            });
            assert_eq!(
                s.ordinal(t, b, c, v),
                Some(ord),
                "round trip failed at {ord} → ({t},{b},{c},{v})"
            );
        }
    }

    #[test]
    fn out_of_scheme_references_have_no_ordinal() {
        let s = kjv();
        let gen = s.book_index("Gen").unwrap();
        assert_eq!(s.book(gen).unwrap().verse_max(1), 31);
        assert_eq!(s.ordinal(1, 1, 1, 32), None); // Gen.1.32
        assert_eq!(s.ordinal(1, 1, 51, 1), None); // Gen.51
        assert_eq!(s.ordinal(1, 200, 1, 1), None);
    }

    #[test]
    fn nt_intro_sits_between_testaments() {
        let s = kjv();
        let nt_intro = s.ordinal(2, 0, 0, 0).unwrap();
        assert_eq!(s.key_parts_at(nt_intro), Some((2, 0, 0, 0)));
        // Matt-Buch-Intro folgt direkt
        assert_eq!(s.ordinal(2, 1, 0, 0), Some(nt_intro + 1));
        let mal = s.book_index("Mal").unwrap();
        let (t, b) = s.testament_book(mal);
        let last_mal = s.ordinal(t, b, 4, 6).unwrap();
        assert_eq!(nt_intro, last_mal + 1);
    }

    #[test]
    fn book_lookup_by_osis_name() {
        let s = kjv();
        assert!(s.book_index("Gen").is_some());
        assert!(s.book_index("Rev").is_some());
        assert!(s.book_index("Tob").is_none()); // Apokryphen sind nicht im KJV-Schema
        let matt = s.book_index("Matt").unwrap();
        assert_eq!(s.testament_book(matt), (2, 1));
    }

    #[test]
    fn abbreviation_exact_match_wins_over_prefix() {
        let names = vec!["KJV".to_string(), "KJVA".to_string()];
        assert_eq!(resolve_abbreviation("KJV", &names), ["KJV"]);
        // Präfix ohne exakten Treffer bleibt mehrdeutig
        assert_eq!(resolve_abbreviation("KJ", &names).len(), 2);
    }

    #[test]
    fn abbreviation_is_case_insensitive() {
        let names = vec!["Calvin".to_string(), "Catholic".to_string()];
        assert_eq!(resolve_abbreviation("cal", &names), ["Calvin"]);
        assert_eq!(resolve_abbreviation("CALVIN", &names), ["Calvin"]);
        assert_eq!(resolve_abbreviation("ca", &names).len(), 2);
        assert!(resolve_abbreviation("xyz", &names).is_empty());
    }

    #[test]
    fn mgr_resolves_prefix_and_reports_ambiguity() {
        let mut mgr = VersificationMgr::new();
        mgr.register(System::from_books(
            "Calvin",
            vec![("Gen".to_string(), 1, vec![31, 25])],
        ));
        assert_eq!(mgr.resolve("cal").unwrap().name(), "Calvin");
        assert_eq!(mgr.resolve("kj").unwrap().name(), "KJV");
        let err = mgr.resolve("nope").unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn mgr_ambiguous_prefix_lists_candidates() {
        let mut mgr = VersificationMgr::new();
        mgr.register(System::from_books(
            "Calvin",
            vec![("Gen".to_string(), 1, vec![31])],
        ));
        mgr.register(System::from_books(
            "Catholic",
            vec![("Gen".to_string(), 1, vec![31])],
        ));
        let err = mgr.resolve("ca").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ambiguous"), "{msg}");
        assert!(msg.contains("Calvin") && msg.contains("Catholic"), "{msg}");
        assert_eq!(err.exit_code(), 1);
    }
}
