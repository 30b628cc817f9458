//! Write-behind entry writer and link pass.
//!
//! Genau ein Vers ist "pending": sein Text sammelt sich, bis die
//! State-Machine einen Schlüsselwechsel meldet oder das Stream-Ende den
//! Flush erzwingt. Erst beim Flush passiert alles Teure: Re-Versifikation
//! von Schlüsseln außerhalb des Schemas, Unicode-Aufbereitung, optionales
//! Transcoding, Anhängen an schon existierende Einträge.
//!
//! Mehrvers-Referenzen werden während des Parsens nur als Link-Sets
//! eingereiht und nach dem letzten Flush geschrieben — ein späteres
//! Anhängen an einen Vers verschiebt dessen Spanne, also dürfen Links
//! erst entstehen, wenn keine Texte mehr geschrieben werden.

use std::rc::Rc;

use crate::diag::{DebugFlags, Reporter};
use crate::error::Result;
use crate::filter::{TextFilter, Utf8Nfc};
use crate::key::{ListKey, VerseKey};
use crate::module::TextModule;
use crate::unicode::{cp1252_to_utf8, detect_utf8, Utf8State};
use crate::v11n::System;

/// Counters reported after an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Einträge, die von cp1252 nach UTF-8 konvertiert wurden.
    pub converted: u32,
    /// Einträge, die die NFC-Normalisierung verändert hat.
    pub normalized: u32,
    /// Geschriebene Texteinträge.
    pub entries_written: u32,
    /// Geschriebene Link-Einträge.
    pub links_written: u32,
}

pub(crate) struct EntryWriter {
    module: Box<dyn TextModule>,
    system: Rc<System>,
    normalize: bool,
    encoder: Option<Box<dyn TextFilter>>,
    decoder: Option<Box<dyn TextFilter>>,
    revision: Vec<u8>,
    first_out: bool,
    active_osis_id: String,
    last_key: Option<VerseKey>,
    active_text: Vec<u8>,
    linked: Vec<ListKey>,
    stats: ImportStats,
}

impl EntryWriter {
    pub(crate) fn new(
        module: Box<dyn TextModule>,
        system: Rc<System>,
        normalize: bool,
        encoder: Option<Box<dyn TextFilter>>,
        decoder: Option<Box<dyn TextFilter>>,
    ) -> Self {
        let revision = format!(
            "<milestone type=\"x-importer\" subType=\"x-osis2mod\" n=\"rosis {}\"/>",
            env!("CARGO_PKG_VERSION")
        )
        .into_bytes();
        Self {
            module,
            system,
            normalize,
            encoder,
            decoder,
            revision,
            first_out: true,
            active_osis_id: String::new(),
            last_key: None,
            active_text: Vec::new(),
            linked: Vec::new(),
            stats: ImportStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> ImportStats {
        self.stats
    }

    /// Reiht ein Link-Set ein; das erste Element ist das Schreibziel.
    pub(crate) fn enqueue_links(&mut self, list: ListKey) {
        self.linked.push(list);
    }

    /// Write-behind: flusht den pending Vers, wenn der Schlüssel wechselt
    /// (oder `force`), und übernimmt dann `text` als neues/weiteres
    /// Material des aktuellen Schlüssels. `text` ist danach leer.
    pub(crate) fn write(
        &mut self,
        current: &mut VerseKey,
        in_canonical_book: bool,
        text: &mut Vec<u8>,
        force: bool,
        rpt: &mut Reporter,
    ) -> Result<()> {
        // Bücher außerhalb des Schemas: Inhalt wird unterdrückt
        if !in_canonical_book {
            text.clear();
            return Ok(());
        }

        let key_osis_id = current.osis_ref();
        let save_key = current.clone();

        if !self.active_osis_id.is_empty() && (force || self.active_osis_id != key_osis_id) {
            let mut target = self
                .last_key
                .clone()
                .unwrap_or_else(|| VerseKey::new(self.system.clone()));
            if !target.is_valid() {
                self.make_valid_ref(&mut target, rpt);
            }
            *current = target;
            self.flush_pending(current, rpt)?;
        }

        // Erstmaterial eines Verses verliert führenden Whitespace,
        // Folgematerial wird unverändert angehängt.
        if self.active_text.is_empty() {
            let start = text
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(text.len());
            self.active_text.extend_from_slice(&text[start..]);
        } else {
            self.active_text.extend_from_slice(text);
        }
        text.clear();

        *current = save_key;
        self.last_key = Some(current.clone());
        self.active_osis_id = key_osis_id;
        Ok(())
    }

    fn flush_pending(&mut self, current: &mut VerseKey, rpt: &mut Reporter) -> Result<()> {
        self.prepare_text(rpt)?;

        // Revisions-Milestone: Intros bekommen ihn vorangestellt, sonst
        // entsteht ein eigener Testament-Eintrag vor dem ersten Output.
        if self.first_out {
            if current.testament() == 0 || current.book() == 0 {
                let mut with_rev = self.revision.clone();
                with_rev.extend_from_slice(&self.active_text);
                self.active_text = with_rev;
            } else {
                let save = current.clone();
                let mut intro_key = current.clone();
                intro_key.set_testament(current.testament());
                self.module.set_key(&intro_key);
                self.module.set_entry(&self.revision)?;
                self.stats.entries_written += 1;
                *current = save;
            }
            self.first_out = false;
        }

        if let Some(enc) = &self.encoder {
            enc.process(&mut self.active_text, Some(current))?;
        }

        self.module.set_key(current);
        if self.module.has_entry(current) {
            self.module.flush()?;
            let mut existing = self.module.raw_entry()?;
            rpt.info(
                "WRITE",
                &self.active_osis_id,
                format_args!(
                    "Appending entry to {}: {}",
                    current.osis_ref(),
                    String::from_utf8_lossy(&self.active_text)
                ),
            );
            // vor dem Zusammenfügen in die Transportform zurück
            if let Some(dec) = &self.decoder {
                dec.process(&mut self.active_text, Some(current))?;
                dec.process(&mut existing, Some(current))?;
            }
            let mut joined = existing;
            joined.push(b' ');
            joined.extend_from_slice(&self.active_text);
            self.active_text = joined;
            if let Some(enc) = &self.encoder {
                enc.process(&mut self.active_text, Some(current))?;
            }
        }

        rpt.dbg(
            DebugFlags::WRITE,
            "WRITE",
            &self.active_osis_id,
            format_args!("{}", String::from_utf8_lossy(&self.active_text)),
        );

        self.module.set_entry(&self.active_text)?;
        self.stats.entries_written += 1;
        self.active_text.clear();
        Ok(())
    }

    /// Unicode-Aufbereitung des pending Texts beim Flush:
    /// UTF-8-Erkennung, cp1252-Annahme, NFC.
    fn prepare_text(&mut self, rpt: &mut Reporter) -> Result<()> {
        let id = self.active_osis_id.clone();
        let mut state = detect_utf8(&self.active_text);

        if !self.normalize && state == Utf8State::Invalid {
            rpt.warning(
                "UTF8",
                &id,
                format_args!(
                    "Should be converted to UTF-8 ({})",
                    String::from_utf8_lossy(&self.active_text)
                ),
            );
        }

        if self.normalize {
            if state == Utf8State::Invalid {
                rpt.info(
                    "UTF8",
                    &id,
                    format_args!(
                        "Converting to UTF-8 ({})",
                        String::from_utf8_lossy(&self.active_text)
                    ),
                );
                self.active_text = cp1252_to_utf8(&self.active_text);
                self.stats.converted += 1;
                state = detect_utf8(&self.active_text);
            }
            if state == Utf8State::Invalid {
                rpt.error(
                    "UTF8",
                    &id,
                    format_args!("Could not convert to UTF-8"),
                );
            }
            if state == Utf8State::Valid {
                // ASCII braucht keine Normalisierung
                let before = self.active_text.clone();
                Utf8Nfc.process(&mut self.active_text, None)?;
                if before != self.active_text {
                    self.stats.normalized += 1;
                    rpt.info("UTF8", &id, format_args!("Normalizing to NFC"));
                }
            }
        }
        Ok(())
    }

    /// Constrains an out-of-scheme key to the nearest prior slot that has
    /// content.
    ///
    /// Kapitel über dem Buchmaximum klemmen aufs letzte Kapitel; der Vers
    /// klemmt aufs Kapitelmaximum; danach rückwärts bis zum ersten Slot,
    /// der schon einen Eintrag hat (Mehrvers-osisIDs hinterlassen leere
    /// Zwischenverse — deren Inhalt sitzt im ersten Vers des Sets).
    fn make_valid_ref(&mut self, key: &mut VerseKey, rpt: &mut Reporter) {
        let save = key.clone();
        let chapter_max = key.chapter_max();
        let beyond_chapter = key.chapter() > chapter_max;
        if beyond_chapter {
            key.set_chapter(chapter_max);
        }
        let verse_max = key.verse_max();
        key.set_verse(verse_max);

        rpt.dbg(
            DebugFlags::REV11N,
            "V11N",
            &save.osis_ref(),
            format_args!("Chapter max:{chapter_max}, Verse Max:{verse_max}"),
        );

        while !beyond_chapter && !key.pop_error() && !self.module.has_entry(key) {
            key.decrement();
        }

        rpt.info(
            "V11N",
            &save.osis_ref(),
            format_args!(
                "Verse is not in the {} versification. Appending content to {}",
                self.system.name(),
                key.osis_ref()
            ),
        );
    }

    fn link_to_entry(&mut self, link: &VerseKey, dest: &VerseKey, rpt: &mut Reporter) -> Result<()> {
        // nur Ziele innerhalb des Schemas verlinken
        if !link.is_valid() {
            rpt.dbg(
                DebugFlags::REV11N,
                "LINK",
                &link.osis_ref(),
                format_args!("not in the versification, skipping link"),
            );
            return Ok(());
        }
        if link.testament() != dest.testament() {
            rpt.error(
                "LINK",
                &link.osis_ref(),
                format_args!(
                    "link crosses testaments (destination {}), skipping",
                    dest.osis_ref()
                ),
            );
            return Ok(());
        }
        rpt.info(
            "LINK",
            &link.osis_ref(),
            format_args!("Linking to {}", dest.osis_ref()),
        );
        self.module.set_key(link);
        self.module.link_entry(dest)?;
        self.stats.links_written += 1;
        Ok(())
    }

    /// Drains the link queue after the final flush.
    pub(crate) fn write_links(&mut self, rpt: &mut Reporter) -> Result<()> {
        let lists = std::mem::take(&mut self.linked);
        for mut list in lists {
            list.set_top();
            let dest = match list.element() {
                Some(k) => k.clone(),
                None => continue,
            };
            list.increment();
            while !list.pop_error() {
                let link = list.element().cloned();
                if let Some(link) = link {
                    self.link_to_entry(&link, &dest, rpt)?;
                }
                list.increment();
            }
        }
        Ok(())
    }

    /// Final flush + module flush; gibt das Modul zur Inspektion zurück.
    pub(crate) fn finish(mut self) -> Result<(Box<dyn TextModule>, ImportStats)> {
        self.module.flush()?;
        Ok((self.module, self.stats))
    }
}
