//! Document state machine and import driver.
//!
//! Konsumiert den Scanner-Strom nach dem BSP→BCV-Umschreiben und verfolgt
//! Modul/Testament/Buch/Kapitel/Vers samt ihrer Intro-Phasen. Die Regeln
//! für Material zwischen den Versen:
//!
//! 1. Zwischen Buchanfang und erstem Kapitel ist alles Buch-Intro.
//! 2. Zwischen Kapitelanfang und erstem Vers teilt sich das Material in
//!    Kapitel-Intro und Pre-Verse-Material (Sektions-Divs und Vers-Titel
//!    beenden das Intro); Pre-Verse wird in `x-preverse`-Milestones
//!    geklammert und wandert in den Folgevers.
//! 3. Zwischen Versen gehören Start-Tags zum nächsten, End- und leere
//!    Tags zum vorigen Vers.
//!
//! "Words of Christ" (`<q who="Jesus">`) werden an jeder Versgrenze
//! geschlossen und im Folgevers neu geöffnet, damit jeder gespeicherte
//! Eintrag für sich wohlgeformt bleibt.

use std::io::BufRead;
use std::rc::Rc;

use crate::diag::{DebugFlags, Reporter};
use crate::error::{Error, Result};
use crate::filter::{ScsuUtf8, TextFilter, Utf16Utf8, Utf8Scsu, Utf8Utf16};
use crate::key::{parse_verse_list, prepare_osis_ref, VerseKey};
use crate::module::TextModule;
use crate::options::{ImportOptions, OutputEncoding};
use crate::pending::{EntryWriter, ImportStats};
use crate::scanner::{Scanner, TokenSink};
use crate::tag::XmlTag;
use crate::transform::BspTransform;
use crate::v11n::System;

/// Markup für Words of Christ je Vers; der leere Marker unterdrückt die
/// erneute Anführungszeichen-Erzeugung in Frontends.
const WOC_TAG: &str = "<q who=\"Jesus\" marker=\"\">";

/// One import run: scanner → transform → state machine → write-behind.
pub struct Importer {
    system: Rc<System>,
    opts: ImportOptions,
    rpt: Reporter,
    xform: BspTransform,
    writer: EntryWriter,
    current: VerseKey,
    text: Vec<u8>,

    in_module: bool,
    in_module_intro: bool,
    in_ot: bool,
    in_nt: bool,
    in_book: bool,
    in_book_intro: bool,
    in_chapter: bool,
    in_chapter_intro: bool,
    in_verse: bool,
    in_pre_verse: bool,
    in_woc: bool,
    header_ended: bool,
    in_canonical_book: bool,

    gen_id: u32,
    sid_book: String,
    sid_chapter: String,
    sid_verse: String,

    quote_stack: Vec<XmlTag>,
    tag_stack: Vec<XmlTag>,
    book_depth: usize,
    chapter_depth: usize,
    verse_depth: usize,
}

impl Importer {
    pub fn new(opts: ImportOptions, module: Box<dyn TextModule>, rpt: Reporter) -> Self {
        let system = module.system().clone();
        let (encoder, decoder): (Option<Box<dyn TextFilter>>, Option<Box<dyn TextFilter>>) =
            match opts.encoding {
                OutputEncoding::Utf8 => (None, None),
                OutputEncoding::Utf16 => (Some(Box::new(Utf8Utf16)), Some(Box::new(Utf16Utf8))),
                OutputEncoding::Scsu => (Some(Box::new(Utf8Scsu)), Some(Box::new(ScsuUtf8))),
            };
        let writer = EntryWriter::new(module, system.clone(), opts.normalize, encoder, decoder);
        let current = VerseKey::new(system.clone());
        let xform = BspTransform::new(opts.strict_nesting);
        Self {
            system,
            opts,
            rpt,
            xform,
            writer,
            current,
            text: Vec::new(),
            in_module: false,
            in_module_intro: false,
            in_ot: false,
            in_nt: false,
            in_book: false,
            in_book_intro: false,
            in_chapter: false,
            in_chapter_intro: false,
            in_verse: false,
            in_pre_verse: false,
            in_woc: false,
            header_ended: false,
            in_canonical_book: true,
            gen_id: 1,
            sid_book: String::new(),
            sid_chapter: String::new(),
            sid_verse: String::new(),
            quote_stack: Vec::new(),
            tag_stack: Vec::new(),
            book_depth: 0,
            chapter_depth: 0,
            verse_depth: 0,
        }
    }

    /// Drives the whole stream, then forces the last flush and the link pass.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<()> {
        self.rpt.set_context("N/A");
        let mut scanner = Scanner::new();
        scanner.run(input, self)?;

        // Material nach dem letzten Eintrag wird nicht mehr zugeordnet
        self.text.clear();
        self.write_entry(true)?;
        self.writer.write_links(&mut self.rpt)?;
        Ok(())
    }

    pub fn stats(&self) -> ImportStats {
        self.writer.stats()
    }

    /// Gibt Modul und Zähler zurück (flusht das Modul).
    pub fn finish(self) -> Result<(Box<dyn TextModule>, ImportStats)> {
        self.writer.finish()
    }

    fn write_entry(&mut self, force: bool) -> Result<()> {
        self.writer.write(
            &mut self.current,
            self.in_canonical_book,
            &mut self.text,
            force,
            &mut self.rpt,
        )
    }

    fn append_tag(&mut self, tag: &XmlTag) {
        let s = tag.to_string();
        self.text.extend_from_slice(s.as_bytes());
    }

    /// Anonymisierter Vers-Milestone für die Diagnose (`-d 2`).
    fn verse_milestone(token: &XmlTag) -> XmlTag {
        let mut m = XmlTag::parse("<milestone resp=\"v\"/>");
        let names: Vec<String> = token.attr_names().map(|n| n.to_string()).collect();
        for name in names {
            if let Some(v) = token.attr(&name) {
                m.set_attr(&name, v);
            }
        }
        m
    }

    /// One token after the BSP rewrite. `Ok(true)` wenn der Token behandelt
    /// (oder verworfen) wurde, `Ok(false)` wenn der Aufrufer ihn wörtlich in
    /// den Text übernehmen soll.
    fn handle_token(&mut self, token: XmlTag) -> Result<bool> {
        let mut tag_depth = self.tag_stack.len();
        let token_name = token.name().to_string();
        let is_end_tag = token.is_end_tag() || token.attr("eID").is_some();
        let type_attr = token.attr_or_empty("type").to_string();
        let eid_attr = token.attr_or_empty("eID").to_string();

        if !is_end_tag {
            // Nicht-leere Start-Tags für die Wohlgeformtheits-Prüfung merken
            if !token.is_empty() {
                self.tag_stack.push(token.clone());
                self.rpt.dbg_ctx(
                    DebugFlags::STACK,
                    "STACK",
                    format_args!("Push({}) {token}", self.tag_stack.len()),
                );
            }

            // alles vor dem ersten div außerhalb des Headers verwerfen
            if !self.in_module {
                if self.header_ended && token_name == "div" {
                    self.rpt.dbg(
                        DebugFlags::OTHER,
                        "FOUND",
                        "",
                        format_args!(
                            "Found first div and pitching prior material: {}",
                            String::from_utf8_lossy(&self.text)
                        ),
                    );
                    self.in_module = true;
                    self.in_module_intro = true;
                    self.current.set_testament(0);
                    self.text.clear();
                    self.rpt.dbg_ctx(
                        DebugFlags::TITLE,
                        "TITLE",
                        format_args!("Looking for module introduction"),
                    );
                } else {
                    return Ok(false);
                }
            }

            // ---- mit osisID oder annotateRef: Buch, Kapitel, Vers ----
            if token.attr("osisID").is_some() || token.attr("annotateRef").is_some() {
                if token_name == "div" && type_attr == "book" {
                    return self.handle_book_start(&token);
                }

                if token_name == "chapter" || (token_name == "div" && type_attr == "chapter") {
                    return self.handle_chapter_start(&token);
                }

                if token_name == "verse"
                    || (token_name == "div" && token.attr("annotateType").is_some())
                {
                    return self.handle_verse_start(&token, &token_name);
                }
            }

            // Modul-Intro: divs, die weder Buch noch bookGroup sind, sammeln
            if self.in_module_intro
                && token_name == "div"
                && type_attr != "bookGroup"
                && type_attr != "book"
            {
                return Ok(false);
            }

            // eine bookGroup beendet das Modul-Intro
            if token_name == "div" && type_attr == "bookGroup" {
                if self.in_module_intro {
                    self.current.set_testament(0);
                    self.rpt.dbg_ctx(
                        DebugFlags::TITLE,
                        "TITLE",
                        format_args!("MODULE INTRO {}", String::from_utf8_lossy(&self.text)),
                    );
                    self.write_entry(false)?;
                    self.in_module_intro = false;
                }
                return Ok(false);
            }

            if token_name == "q" {
                return self.handle_quote_start(&token);
            }

            // Pre-Verse-Erkennung innerhalb eines Kapitels
            if self.in_chapter && !self.in_pre_verse {
                if self.in_chapter_intro {
                    let sub_type = token.attr_or_empty("subType");
                    let section_div = token_name == "div"
                        && matches!(
                            type_attr.as_str(),
                            "section" | "subSection" | "majorSection"
                        )
                        && sub_type != "x-introduction";
                    let verse_title = token_name == "title"
                        && !type_attr.is_empty()
                        && !matches!(type_attr.as_str(), "main" | "chapter" | "sub");
                    if section_div || verse_title {
                        self.rpt.dbg_ctx(
                            DebugFlags::TITLE,
                            "TITLE",
                            format_args!("Done looking for chapter introduction"),
                        );
                        if !self.text.is_empty() {
                            self.rpt.dbg_ctx(
                                DebugFlags::TITLE,
                                "TITLE",
                                format_args!(
                                    "CHAPTER INTRO {}",
                                    String::from_utf8_lossy(&self.text)
                                ),
                            );
                            self.write_entry(false)?;
                        }
                        self.in_chapter_intro = false;
                        self.in_pre_verse = true;
                    }
                } else if !self.in_verse {
                    self.in_pre_verse = true;
                }

                if self.in_pre_verse {
                    let open = format!(
                        "<div type=\"x-milestone\" subType=\"x-preverse\" sID=\"pv{}\"/>",
                        self.gen_id
                    );
                    self.text.extend_from_slice(open.as_bytes());
                }
            }

            if !self.in_verse && self.in_chapter {
                self.rpt.dbg_ctx(
                    DebugFlags::INTERVERSE,
                    "INTERVERSE",
                    format_args!(
                        "Interverse start token {token}:{}",
                        String::from_utf8_lossy(&self.text)
                    ),
                );
            }

            return Ok(false);
        }

        // ---- End-Tags ----

        if self.tag_stack.is_empty() {
            let id = self.rpt.context().to_string();
            self.rpt
                .fatal("NESTING", &id, format_args!("End tag expected"));
            return Err(Error::BadNesting(format!(
                "end tag {token_name} with no open element"
            )));
        }

        // leere End-Tags tragen das eID-Attribut und poppen nicht
        if !token.is_empty() {
            tag_depth = self.tag_stack.len();
            let top = match self.tag_stack.pop() {
                Some(t) => t,
                None => return Ok(false),
            };
            self.rpt.dbg_ctx(
                DebugFlags::STACK,
                "STACK",
                format_args!("Pop({tag_depth}) {top}"),
            );

            if token_name != top.name() {
                // Milestone-Paarungs-Prüfung: bei validem OSIS unerreichbar,
                // als Diagnose belassen (strict eskaliert im Transformer)
                let id = self.rpt.context().to_string();
                self.rpt.fatal(
                    "NESTING",
                    &id,
                    format_args!("Expected {} found {token_name}", top.name()),
                );
            }
        }

        // vor dem ersten div gibt es wenig zu tun
        if !self.in_module {
            if token_name == "header" {
                self.header_ended = true;
                self.rpt.dbg(
                    DebugFlags::OTHER,
                    "FOUND",
                    "",
                    format_args!("End of header found"),
                );
            }
            return Ok(false);
        }

        // VERSE / Kommentar-Eintrag Ende
        if token_name == "verse" || (token_name == "div" && eid_attr == self.sid_verse) {
            if tag_depth != self.verse_depth {
                self.rpt.warning_ctx(
                    "NESTING",
                    format_args!(
                        "Verse is not well formed. verseDepth={} tagDepth={tag_depth}",
                        self.verse_depth
                    ),
                );
            }

            if self.in_woc {
                self.text.extend_from_slice(b"</q>");
            }

            if token_name != "verse" {
                self.append_tag(&token);
            } else if self.opts.verse_milestones {
                let m = Self::verse_milestone(&token);
                self.append_tag(&m);
            }

            self.write_entry(false)?;

            self.in_verse = false;
            self.in_pre_verse = false;
            self.verse_depth = 0;
            return Ok(true);
        }

        if token_name == "q" {
            return self.handle_quote_end(&token);
        }

        let in_intro = self.in_module_intro || self.in_book_intro || self.in_chapter_intro;
        if !self.in_verse && !in_intro {
            // Kapitel-Ende
            if token_name == "chapter" || (token_name == "div" && eid_attr == self.sid_chapter) {
                self.append_tag(&token);
                self.write_entry(false)?;
                self.in_chapter = false;
                self.sid_chapter.clear();
                self.chapter_depth = 0;
                self.verse_depth = 0;
                return Ok(true);
            }

            // Buch-Ende
            if token_name == "div" && eid_attr == self.sid_book {
                self.append_tag(&token);
                self.write_entry(false)?;
                self.book_depth = 0;
                self.chapter_depth = 0;
                self.verse_depth = 0;
                self.in_book = false;
                return Ok(true);
            }

            if token_name == "div" && type_attr == "bookGroup" {
                self.append_tag(&token);
                self.write_entry(false)?;
                return Ok(true);
            }

            // das Dokumentende gehört in keinen Eintrag
            if token_name == "osisText" || token_name == "osis" {
                self.book_depth = 0;
                self.chapter_depth = 0;
                self.verse_depth = 0;
                return Ok(true);
            }

            // Interverse-End-Tags gehören zum vorigen Vers
            if !self.in_pre_verse && self.in_book {
                self.append_tag(&token);
                self.write_entry(false)?;
                self.rpt.dbg_ctx(
                    DebugFlags::INTERVERSE,
                    "INTERVERSE",
                    format_args!(
                        "Appending interverse end tag: {token} tagDepth={tag_depth} \
                         chapterDepth={} bookDepth={}",
                        self.chapter_depth, self.book_depth
                    ),
                );
                return Ok(true);
            }

            self.rpt.dbg_ctx(
                DebugFlags::INTERVERSE,
                "INTERVERSE",
                format_args!("Interverse end tag: {token}"),
            );
            return Ok(false);
        }

        Ok(false)
    }

    /// `<div type="book" osisID=...>`: Intros abschließen, Flags neu setzen.
    fn handle_book_start(&mut self, token: &XmlTag) -> Result<bool> {
        let osis_id = token.attr_or_empty("osisID").to_string();

        if self.in_module_intro {
            self.current.set_testament(0);
            self.rpt.dbg_ctx(
                DebugFlags::TITLE,
                "TITLE",
                format_args!("MODULE INTRO(book) {}", String::from_utf8_lossy(&self.text)),
            );
            self.write_entry(false)?;
            self.in_module_intro = false;
        } else {
            // Testament-Intros entstehen lazy beim ersten Buch des Testaments;
            // angenommen wird, dass die Bücher eines Testaments beieinander
            // stehen.
            if let Some(tmp) = VerseKey::from_osis(self.system.clone(), &osis_id) {
                if !self.in_ot && tmp.testament() == 1 {
                    self.rpt.dbg(
                        DebugFlags::TITLE,
                        "TITLE",
                        &osis_id,
                        format_args!("OT INTRO {}", String::from_utf8_lossy(&self.text)),
                    );
                    self.current.set_testament(1);
                    self.write_entry(false)?;
                }
                if !self.in_nt && tmp.testament() == 2 {
                    self.rpt.dbg(
                        DebugFlags::TITLE,
                        "TITLE",
                        &osis_id,
                        format_args!("NT INTRO {}", String::from_utf8_lossy(&self.text)),
                    );
                    self.current.set_testament(2);
                    self.write_entry(false)?;
                }
            }
        }

        let parsed = self.current.set_from_osis(&osis_id);
        if parsed {
            self.current.set_chapter(0);
            self.current.set_verse(0);
            let ctx = self.current.osis_ref();
            self.rpt.set_context(&ctx);
        } else {
            self.rpt.set_context(&osis_id);
        }

        self.sid_book = token.attr_or_empty("sID").to_string();
        self.in_ot = self.current.testament() == 1;
        self.in_nt = self.current.testament() == 2;
        self.in_book = true;
        self.in_chapter = false;
        self.in_verse = false;
        self.in_pre_verse = false;
        self.in_module_intro = false;
        self.in_book_intro = true;
        self.in_chapter_intro = false;

        self.rpt.dbg_ctx(
            DebugFlags::TITLE,
            "TITLE",
            format_args!("Looking for book introduction"),
        );

        self.book_depth = self.tag_stack.len();
        self.chapter_depth = 0;
        self.verse_depth = 0;

        self.in_canonical_book = parsed;
        if !self.in_canonical_book {
            self.rpt.warning(
                "V11N",
                &osis_id,
                format_args!(
                    "New book is not in {} versification, ignoring",
                    self.system.name()
                ),
            );
        } else {
            self.rpt.dbg_ctx(
                DebugFlags::OTHER,
                "FOUND",
                format_args!("Found new book"),
            );
        }

        Ok(false)
    }

    /// `<chapter osisID=...>` oder `<div type="chapter" ...>`.
    fn handle_chapter_start(&mut self, token: &XmlTag) -> Result<bool> {
        if self.in_book_intro {
            self.rpt.dbg_ctx(
                DebugFlags::TITLE,
                "TITLE",
                format_args!("BOOK INTRO {}", String::from_utf8_lossy(&self.text)),
            );
            self.write_entry(false)?;
            self.in_book_intro = false;
        }

        let osis_id = token.attr_or_empty("osisID").to_string();
        if self.current.set_from_osis(&osis_id) {
            self.current.set_verse(0);
        }

        self.rpt.dbg_ctx(
            DebugFlags::OTHER,
            "FOUND",
            format_args!("Current chapter is {osis_id}"),
        );
        let ctx = self.current.osis_ref();
        self.rpt.set_context(&ctx);

        self.sid_chapter = token.attr_or_empty("sID").to_string();
        self.in_chapter = true;
        self.in_verse = false;
        self.in_pre_verse = false;
        self.in_chapter_intro = true;

        self.rpt.dbg_ctx(
            DebugFlags::TITLE,
            "TITLE",
            format_args!("Looking for chapter introduction"),
        );

        self.chapter_depth = self.tag_stack.len();
        self.verse_depth = 0;

        Ok(false)
    }

    /// `<verse osisID=...>` oder Kommentar-`<div annotateType=... annotateRef=...>`.
    fn handle_verse_start(&mut self, token: &XmlTag, token_name: &str) -> Result<bool> {
        if self.in_chapter_intro {
            self.rpt.dbg_ctx(
                DebugFlags::TITLE,
                "TITLE",
                format_args!("Done looking for chapter introduction"),
            );
            if !self.text.is_empty() {
                self.rpt.dbg_ctx(
                    DebugFlags::TITLE,
                    "TITLE",
                    format_args!("CHAPTER INTRO {}", String::from_utf8_lossy(&self.text)),
                );
                self.write_entry(false)?;
            }
        }

        // offenes Pre-Verse-Material schließen; es wandert mit in den Vers
        if self.in_pre_verse {
            let close = format!(
                "<div type=\"x-milestone\" subType=\"x-preverse\" eID=\"pv{}\"/>",
                self.gen_id
            );
            self.gen_id += 1;
            self.text.extend_from_slice(close.as_bytes());
        }

        let ref_val = token
            .attr_or_empty(if token_name == "verse" {
                "osisID"
            } else {
                "annotateRef"
            })
            .to_string();
        self.rpt.dbg(
            DebugFlags::OTHER,
            "FOUND",
            &ref_val,
            format_args!("Entering verse"),
        );

        // in die Form bringen, die der Schlüssel-Parser versteht
        let mut key_val = ref_val.clone();
        prepare_osis_ref(&mut key_val, &mut self.rpt);

        let mut keys = parse_verse_list(&self.system, &key_val, &self.current);
        if keys.count() > 0 {
            keys.set_top();
            if let Some(first) = keys.element() {
                self.current = first.clone();
            }
            // mehr als ein Vers? Dann später verlinken.
            keys.increment();
            if !keys.pop_error() {
                self.rpt.dbg(
                    DebugFlags::REF,
                    "LINK MASTER",
                    &self.current.osis_ref(),
                    format_args!("multi-verse reference, queueing links"),
                );
                keys.set_top();
                self.writer.enqueue_links(keys);
            }
        } else {
            self.rpt.error(
                "REF",
                &ref_val,
                format_args!("Invalid osisID/annotateRef"),
            );
        }

        let ctx = self.current.osis_ref();
        self.rpt.set_context(&ctx);
        self.rpt.dbg_ctx(
            DebugFlags::OTHER,
            "FOUND",
            format_args!("New current verse"),
        );

        self.sid_verse = token.attr_or_empty("sID").to_string();
        self.in_verse = true;
        self.in_pre_verse = false;
        self.in_book_intro = false;
        self.in_chapter_intro = false;
        self.verse_depth = self.tag_stack.len();

        // Kommentar-divs bleiben im Text, Verse nicht
        if token_name != "verse" {
            self.append_tag(token);
        } else if self.opts.verse_milestones {
            let m = Self::verse_milestone(token);
            self.append_tag(&m);
        }

        if self.in_woc {
            self.text.extend_from_slice(WOC_TAG.as_bytes());
        }
        Ok(true)
    }

    fn handle_quote_start(&mut self, token: &XmlTag) -> Result<bool> {
        self.quote_stack.push(token.clone());
        self.rpt.dbg_ctx(
            DebugFlags::QUOTE,
            "QUOTE",
            format_args!("Quote top({}) {token}", self.quote_stack.len()),
        );

        if token.attr_or_empty("who") == "Jesus" {
            self.in_woc = true;
            self.text.extend_from_slice(WOC_TAG.as_bytes());

            // Anführungszeichen innerhalb des WOC-Markups: fehlt der
            // marker, erzeugt ihn das Frontend; ist er explizit leer,
            // entfällt der Tag komplett.
            if token.attr("marker").map(|m| !m.is_empty()).unwrap_or(true) {
                let mut t = token.clone();
                t.remove_attr("who");
                self.append_tag(&t);
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn handle_quote_end(&mut self, token: &XmlTag) -> Result<bool> {
        let top = match self.quote_stack.pop() {
            Some(t) => t,
            None => {
                self.rpt
                    .warning_ctx("NESTING", format_args!("q end without q start"));
                return Ok(false);
            }
        };
        self.rpt.dbg_ctx(
            DebugFlags::QUOTE,
            "QUOTE",
            format_args!("Quote pop({}) {top} -- {token}", self.quote_stack.len()),
        );

        if token.attr_or_empty("who") == "Jesus" {
            self.in_woc = false;

            let sid = top.attr_or_empty("sID");
            let eid = token.attr_or_empty("eID");
            if sid != eid {
                let id = self.rpt.context().to_string();
                self.rpt.error(
                    "NESTING",
                    &id,
                    format_args!(
                        "Improper nesting. Matching (sID,eID) not found. Looking at ({sid},{eid})"
                    ),
                );
            }

            if token.attr("marker").map(|m| !m.is_empty()).unwrap_or(true) {
                let mut t = token.clone();
                t.remove_attr("who");
                self.append_tag(&t);
            }

            self.text.extend_from_slice(b"</q>");
            return Ok(true);
        }
        Ok(false)
    }
}

impl TokenSink for Importer {
    fn text(&mut self, chunk: &[u8]) {
        self.text.extend_from_slice(chunk);
    }

    fn token(&mut self, raw: &str) -> Result<()> {
        let tag = XmlTag::parse(raw);
        let tag = self.xform.transform(tag, &mut self.rpt)?;
        if !self.handle_token(tag.clone())? {
            self.append_tag(&tag);
        }
        Ok(())
    }

    fn reporter(&mut self) -> &mut Reporter {
        &mut self.rpt
    }
}

/// Convenience driver: ein kompletter Import in einem Aufruf.
pub fn import<R: BufRead>(
    opts: ImportOptions,
    module: Box<dyn TextModule>,
    reporter: Reporter,
    input: R,
) -> Result<(Box<dyn TextModule>, ImportStats)> {
    let mut importer = Importer::new(opts, module, reporter);
    importer.run(input)?;
    importer.finish()
}
