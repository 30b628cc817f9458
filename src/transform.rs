//! BSP→BCV transform.
//!
//! OSIS erlaubt Dokumentstruktur (Book/Section/Paragraph), die
//! Versgrenzen frei überlappt. Gespeichert wird aber je Vers, und jeder
//! Eintrag muss für sich wohlgeformt sein. Container, die Versgrenzen
//! kreuzen können, werden deshalb in Milestone-Paare umgeschrieben:
//! `<p>` hat keine Milestone-Form und wird zu `<div type="x-p">`;
//! die übrigen Container bekommen `sID`/`eID` — bei `verse`, `chapter`
//! und `div type="book"` aus der osisID, sonst generiert (`gen<N>`).
//!
//! `<div type="colophon">` bleibt absichtlich ein echter Container,
//! damit Kolophone als Block behandelt werden können.

use crate::diag::{DebugFlags, Reporter};
use crate::error::{Error, Result};
use crate::tag::XmlTag;

/// Container elements with a milestoned form (ohne das speziell
/// behandelte `p`).
fn is_milestoneable(name: &str, type_attr: &str) -> bool {
    match name {
        "chapter" | "closer" | "l" | "lg" | "q" | "salute" | "signed" | "speech" | "verse" => {
            true
        }
        "div" => type_attr != "colophon",
        _ => false,
    }
}

/// Stack-gestützter Umschreiber; ein Exemplar pro Import-Lauf.
pub(crate) struct BspTransform {
    stack: Vec<XmlTag>,
    gen_id: u32,
    /// Eskaliert den Namens-Mismatch beim Schließen zum fatalen Fehler.
    strict_nesting: bool,
}

impl BspTransform {
    pub(crate) fn new(strict_nesting: bool) -> Self {
        Self {
            stack: Vec::new(),
            gen_id: 1,
            strict_nesting,
        }
    }

    /// Rewrites one tag. Leere Tags und Nicht-Container laufen unverändert
    /// durch; Start-Tags landen (ggf. umgeschrieben) auf dem Stack, End-Tags
    /// werden zu Klonen ihres Openers mit `sID`→`eID`.
    pub(crate) fn transform(&mut self, tag: XmlTag, rpt: &mut Reporter) -> Result<XmlTag> {
        if tag.is_empty() {
            return Ok(tag);
        }

        let orig = tag.clone();
        let name = tag.name().to_string();
        let mut t = tag;
        let mut changed = false;

        if !t.is_end_tag() {
            let type_attr = t.attr_or_empty("type").to_string();
            if name == "p" {
                // <p> ist nicht milestonebar: als <div type="x-p"> ausgeben
                let mut div = XmlTag::parse("<div type=\"x-p\"/>");
                div.set_attr("sID", &format!("gen{}", self.gen_id));
                self.gen_id += 1;
                t = div;
                changed = true;
            } else if is_milestoneable(&name, &type_attr) {
                t.set_empty(true);
                let osis_sid = name == "verse"
                    || name == "chapter"
                    || (name == "div" && type_attr == "book");
                if osis_sid {
                    let osis_id = t.attr_or_empty("osisID").to_string();
                    t.set_attr("sID", &osis_id);
                } else {
                    t.set_attr("sID", &format!("gen{}", self.gen_id));
                    self.gen_id += 1;
                }
                changed = true;
            }
            self.stack.push(t.clone());

            if changed {
                rpt.dbg_ctx(
                    DebugFlags::XFORM,
                    "XFORM",
                    format_args!("Transform start tag from {orig} to {t}"),
                );
            }
        } else {
            let top = match self.stack.pop() {
                Some(top) => top,
                None => {
                    let id = rpt.context().to_string();
                    rpt.fatal(
                        "XFORM",
                        &id,
                        format_args!("Closing tag without opening tag"),
                    );
                    // der fatale Abbruch folgt in der State-Machine
                    // (End-Tag ohne offenen Container)
                    return Ok(t);
                }
            };

            // </p> schließt einen <div type="x-p">-Opener
            if name != "p" && name != top.name() {
                let id = rpt.context().to_string();
                rpt.fatal(
                    "XFORM",
                    &id,
                    format_args!(
                        "Closing tag ({name}) does not match opening tag ({})",
                        top.name()
                    ),
                );
                if self.strict_nesting {
                    return Err(Error::BadNesting(format!(
                        "closing tag {name} does not match opening tag {}",
                        top.name()
                    )));
                }
            }

            let top_type = top.attr_or_empty("type");
            let closeable = name == "p" || is_milestoneable(&name, top_type);
            if closeable {
                // Klon des Openers mit sID → eID
                let sid = top.attr_or_empty("sID").to_string();
                let mut clone = top.clone();
                clone.set_attr("eID", &sid);
                clone.remove_attr("sID");
                t = clone;
                changed = true;
            }

            if changed {
                rpt.dbg_ctx(
                    DebugFlags::XFORM,
                    "XFORM",
                    format_args!("Transform end tag from {orig} to {t}"),
                );
            }
        }

        Ok(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DebugFlags;

    fn rpt() -> Reporter {
        Reporter::with_writer(DebugFlags::none(), Box::new(Vec::new()))
    }

    fn xf(t: &mut BspTransform, raw: &str) -> String {
        t.transform(XmlTag::parse(raw), &mut rpt())
            .unwrap()
            .to_string()
    }

    #[test]
    fn paragraph_becomes_xp_div_pair() {
        let mut t = BspTransform::new(false);
        assert_eq!(xf(&mut t, "<p>"), "<div type=\"x-p\" sID=\"gen1\"/>");
        assert_eq!(xf(&mut t, "</p>"), "<div type=\"x-p\" eID=\"gen1\"/>");
    }

    #[test]
    fn verse_sid_comes_from_osis_id() {
        let mut t = BspTransform::new(false);
        let out = xf(&mut t, "<verse osisID=\"Gen.1.1\">");
        assert_eq!(out, "<verse osisID=\"Gen.1.1\" sID=\"Gen.1.1\"/>");
        let out = xf(&mut t, "</verse>");
        assert_eq!(out, "<verse osisID=\"Gen.1.1\" eID=\"Gen.1.1\"/>");
    }

    #[test]
    fn quote_gets_generated_id() {
        let mut t = BspTransform::new(false);
        let out = xf(&mut t, "<q who=\"Jesus\">");
        assert_eq!(out, "<q who=\"Jesus\" sID=\"gen1\"/>");
        let out = xf(&mut t, "</q>");
        assert_eq!(out, "<q who=\"Jesus\" eID=\"gen1\"/>");
    }

    /// Generierte IDs sind prozessmonoton über Elementsorten hinweg.
    #[test]
    fn generated_ids_are_monotonic() {
        let mut t = BspTransform::new(false);
        assert!(xf(&mut t, "<lg>").contains("gen1"));
        assert!(xf(&mut t, "<l>").contains("gen2"));
        assert!(xf(&mut t, "</l>").contains("gen2"));
        assert!(xf(&mut t, "</lg>").contains("gen1"));
    }

    #[test]
    fn colophon_div_passes_through() {
        let mut t = BspTransform::new(false);
        let out = xf(&mut t, "<div type=\"colophon\">");
        assert_eq!(out, "<div type=\"colophon\">");
        let out = xf(&mut t, "</div>");
        assert_eq!(out, "</div>");
    }

    #[test]
    fn non_container_tags_pass_through() {
        let mut t = BspTransform::new(false);
        assert_eq!(xf(&mut t, "<title>"), "<title>");
        assert_eq!(xf(&mut t, "</title>"), "</title>");
        assert_eq!(
            xf(&mut t, "<milestone type=\"x\"/>"),
            "<milestone type=\"x\"/>"
        );
    }

    #[test]
    fn already_empty_tags_are_untouched() {
        let mut t = BspTransform::new(false);
        let raw = "<verse osisID=\"Gen.1.1\" sID=\"gv\"/>";
        assert_eq!(xf(&mut t, raw), raw);
    }

    /// Namens-Mismatch: Default ist Warnung + Weiterlauf, strict eskaliert.
    #[test]
    fn name_mismatch_warns_by_default_and_fails_strict() {
        let mut t = BspTransform::new(false);
        let _ = xf(&mut t, "<lg>");
        let out = t.transform(XmlTag::parse("</q>"), &mut rpt());
        assert!(out.is_ok());

        let mut t = BspTransform::new(true);
        let _ = xf(&mut t, "<lg>");
        let out = t.transform(XmlTag::parse("</q>"), &mut rpt());
        assert!(matches!(out, Err(Error::BadNesting(_))));
    }

    #[test]
    fn close_without_open_passes_tag_through() {
        let mut t = BspTransform::new(false);
        let out = t.transform(XmlTag::parse("</div>"), &mut rpt()).unwrap();
        assert_eq!(out.to_string(), "</div>");
    }
}
