//! Byte-at-a-time OSIS stream scanner.
//!
//! Liest die Eingabe Byte für Byte und liefert dem [`TokenSink`] einen
//! linearen Strom aus Textläufen und kompletten Tokens (`<...>`). Intern
//! erledigt der Scanner drei Dinge, die der Sink nie zu sehen bekommt:
//!
//! - **Whitespace**: außerhalb von Tokens wird jeder Whitespace-Lauf zu
//!   genau einem Blank zusammengezogen; innerhalb von Tokens bleibt er stehen.
//! - **Kommentare**: `<!--` … `-->` wird über einen eigenen Automaten
//!   verworfen; fehlgeschlagene Kommentar-Anfänge fallen auf die normale
//!   Token-Behandlung zurück.
//! - **Entities**: `&...;` (max. 32 Zeichen) über einen endlichen Automaten.
//!   Die fünf XML-Namen bleiben benannt, numerische Entities der Codepoints
//!   38/60/62/34/39 werden auf die benannte Form umgeschrieben, andere gültige
//!   numerische Entities zu UTF-8. Kaputte Entities werden als `&amp;` plus
//!   Literalrest ausgegeben und der Strom läuft weiter.
//!
//! Zeile/Spalte werden 1-basiert mitgeführt und in den Reporter gespiegelt,
//! damit jede nachgelagerte Diagnose verortet ist.

use crate::diag::{DebugFlags, Reporter};
use crate::error::{Error, Result};
use std::io::{BufRead, Read};

/// Maximum length for an entity, including `&` and `;`.
const MAX_ENTITY_LENGTH: usize = 32;

/// Abnehmer des Scanner-Outputs (Importer oder Test-Doppel).
pub(crate) trait TokenSink {
    /// Ein Stück Text (Bytes, keine UTF-8-Garantie — Latin-1-Eingaben
    /// laufen unverändert durch bis zur Unicode-Aufbereitung beim Flush).
    fn text(&mut self, chunk: &[u8]);
    /// Ein komplettes Token inklusive spitzer Klammern.
    fn token(&mut self, raw: &str) -> Result<()>;
    fn reporter(&mut self) -> &mut Reporter;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentState {
    /// Not in a comment, or just seen `<`.
    Start,
    /// Seen `<!`.
    Slam,
    /// Seen `<!-`.
    Dash1,
    /// Inside comment content.
    Comment,
    /// Seen `-` inside the comment.
    EndDash1,
    /// Seen `--` inside the comment.
    EndDash2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityType {
    Start,
    NumHash,
    NumDec,
    NumHex,
    Named,
    Err,
}

/// Der Scanner-Automat. Ein Exemplar pro Import-Lauf.
pub(crate) struct Scanner {
    line: u32,
    col: u32,
    intoken: bool,
    token: Vec<u8>,
    incomment: bool,
    comment: CommentState,
    inentity: bool,
    entity_type: EntityType,
    entity_token: Vec<u8>,
    in_whitespace: bool,
    inattribute: bool,
    attr_quote: u8,
}

impl Scanner {
    pub(crate) fn new() -> Self {
        Self {
            line: 1,
            col: 0,
            intoken: false,
            token: Vec::new(),
            incomment: false,
            comment: CommentState::Start,
            inentity: false,
            entity_type: EntityType::Start,
            entity_token: Vec::new(),
            in_whitespace: false,
            inattribute: false,
            attr_quote: 0,
        }
    }

    /// Treibt den gesamten Strom durch den Automaten.
    ///
    /// Ein unerwartetes EOF mitten im Token verwirft das angefangene Token;
    /// gesammelter Text wurde bereits an den Sink gereicht.
    pub(crate) fn run<R: BufRead>(&mut self, input: R, sink: &mut impl TokenSink) -> Result<()> {
        for byte in input.bytes() {
            let b = match byte {
                Ok(b) => b,
                // gestörte Bytes überspringen, wie ein scheiternder Read im Original
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io("reading OSIS input", e)),
            };
            self.feed(b, sink)?;
        }
        Ok(())
    }

    /// Appends bytes to the open token, or hands them to the sink as text.
    fn emit(&mut self, sink: &mut impl TokenSink, bytes: &[u8]) {
        if self.intoken {
            self.token.extend_from_slice(bytes);
        } else {
            sink.text(bytes);
        }
    }

    fn feed(&mut self, byte: u8, sink: &mut impl TokenSink) -> Result<()> {
        let mut c = byte;

        // Zeilenumbrüche sind nur Whitespace; Position fortschreiben.
        if c == b'\n' {
            c = b' ';
            self.col = 0;
            self.line += 1;
        }
        self.col += 1;
        sink.reporter().set_position(self.line, self.col);

        // Attribut-Kontext für die Entity-Diagnostik und Token-Ende verfolgen.
        if self.inattribute && (c == b'\'' || c == b'"') {
            if self.attr_quote == c {
                self.inattribute = false;
                self.attr_quote = 0;
            } else {
                self.attr_quote = c;
            }
        }
        if self.intoken && c == b'=' {
            self.inattribute = true;
            self.attr_quote = 0;
        }

        if self.handle_entity(c, sink)? {
            return Ok(());
        }

        if !self.intoken && c == b'<' {
            self.intoken = true;
            self.token.clear();
            self.token.push(b'<');
            self.inattribute = false;
            self.attr_quote = 0;
            return Ok(());
        }

        if self.intoken && !self.incomment && self.handle_comment(c, sink)? {
            return Ok(());
        }
        if self.incomment && self.handle_comment(c, sink)? {
            return Ok(());
        }

        // Außerhalb von Tokens: Whitespace-Läufe zu einem Blank zusammenziehen.
        if !self.intoken {
            let seeing_space = c.is_ascii_whitespace();
            if seeing_space {
                if self.in_whitespace {
                    return Ok(());
                }
                c = b' ';
            }
            self.in_whitespace = seeing_space;
        }

        if self.intoken && c == b'>' && !(self.inattribute && self.attr_quote != 0) {
            self.intoken = false;
            self.in_whitespace = false;
            self.token.push(b'>');
            let ok = self.token.len() > 2
                && (self.token[1].is_ascii_alphabetic()
                    || ((self.token[1] == b'/' || self.token[1] == b'?')
                        && self.token.len() > 3
                        && self.token[2].is_ascii_alphabetic()));
            if ok {
                let raw = String::from_utf8_lossy(&self.token).into_owned();
                sink.token(&raw)?;
            } else {
                let shown = String::from_utf8_lossy(&self.token).into_owned();
                sink.reporter()
                    .warning_ctx("PARSE", format_args!("malformed token: {shown}"));
            }
            return Ok(());
        }

        if self.intoken {
            self.token.push(c);
        } else if c == b'>' {
            sink.reporter()
                .warning_ctx("PARSE", format_args!("> should be &gt;"));
            sink.text(b"&gt;");
        } else {
            sink.text(&[c]);
        }
        Ok(())
    }

    /// Comment automaton. Returns true when the byte was consumed.
    fn handle_comment(&mut self, c: u8, sink: &mut impl TokenSink) -> Result<bool> {
        if !self.incomment {
            match self.comment {
                CommentState::Start => {
                    if c == b'!' {
                        sink.reporter()
                            .dbg(DebugFlags::PARSE, "COMMENTS", "", format_args!("Found <!"));
                        self.comment = CommentState::Slam;
                        self.token.push(c);
                        return Ok(true);
                    }
                    Ok(false)
                }
                CommentState::Slam => {
                    if c == b'-' {
                        self.comment = CommentState::Dash1;
                        self.token.push(c);
                        return Ok(true);
                    }
                    self.comment = CommentState::Start;
                    Ok(false)
                }
                CommentState::Dash1 => {
                    if c == b'-' {
                        sink.reporter().dbg(
                            DebugFlags::PARSE,
                            "COMMENTS",
                            "",
                            format_args!("Found <!-- Now in comment."),
                        );
                        self.incomment = true;
                        self.comment = CommentState::Comment;
                        self.token.push(c);
                        return Ok(true);
                    }
                    self.comment = CommentState::Start;
                    Ok(false)
                }
                state => {
                    sink.reporter().fatal(
                        "COMMENTS",
                        "",
                        format_args!("Unknown commentstate on comment start: {state:?}"),
                    );
                    Err(Error::BadComment(format!(
                        "comment automaton out of sync at start: {state:?}"
                    )))
                }
            }
        } else {
            match self.comment {
                CommentState::Comment => {
                    if c == b'-' {
                        self.comment = CommentState::EndDash1;
                    }
                    // Kommentarinhalt wird verworfen
                    Ok(true)
                }
                CommentState::EndDash1 => {
                    if c == b'-' {
                        self.comment = CommentState::EndDash2;
                    } else {
                        self.comment = CommentState::Comment;
                    }
                    Ok(true)
                }
                CommentState::EndDash2 => {
                    if c == b'>' {
                        sink.reporter().dbg(
                            DebugFlags::PARSE,
                            "COMMENTS",
                            "",
                            format_args!("Found --> comment ended."),
                        );
                        self.intoken = false;
                        self.incomment = false;
                        self.comment = CommentState::Start;
                    } else {
                        self.comment = CommentState::Comment;
                    }
                    Ok(true)
                }
                state => {
                    sink.reporter().fatal(
                        "COMMENTS",
                        "",
                        format_args!("Unknown commentstate on comment end: {state:?}"),
                    );
                    Err(Error::BadComment(format!(
                        "comment automaton out of sync inside comment: {state:?}"
                    )))
                }
            }
        }
    }

    /// Entity automaton. Returns true when the byte was consumed.
    ///
    /// Achtung Wiedereintritt: beendet ein Nicht-`;`-Zeichen die Entity
    /// (Fehlerfall), wird es nach der Fehlerausgabe ganz normal
    /// weiterverarbeitet — das ist der "Neustart" nach kaputten Entities.
    fn handle_entity(&mut self, c: u8, sink: &mut impl TokenSink) -> Result<bool> {
        if !self.inentity && c != b'&' {
            return Ok(false);
        }
        if !self.inentity {
            self.inentity = true;
            self.in_whitespace = false;
            self.entity_type = EntityType::Start;
            self.entity_token.clear();
            self.entity_token.push(b'&');
            return Ok(true);
        }

        if self.entity_token.len() >= MAX_ENTITY_LENGTH {
            self.inentity = false;
            self.entity_type = EntityType::Err;
            let shown = String::from_utf8_lossy(&self.entity_token).into_owned();
            sink.reporter().warning_ctx(
                "PARSE",
                format_args!(
                    "Entity length exceeds maximum ({MAX_ENTITY_LENGTH} characters), \
                     treating as malformed: {shown}"
                ),
            );
        } else if c == b';' {
            self.inentity = false;
        }
        if self.entity_type != EntityType::Err {
            self.entity_token.push(c);
        }

        if self.inentity {
            match self.entity_type {
                EntityType::Start => {
                    if c == b'#' {
                        self.entity_type = EntityType::NumHash;
                    } else if c.is_ascii_alphanumeric() {
                        self.entity_type = EntityType::Named;
                    } else {
                        self.inentity = false;
                        self.entity_type = EntityType::Err;
                    }
                }
                EntityType::NumHash => {
                    if c == b'x' || c == b'X' {
                        self.entity_type = EntityType::NumHex;
                    } else if c.is_ascii_digit() {
                        self.entity_type = EntityType::NumDec;
                    } else {
                        self.inentity = false;
                        self.entity_type = EntityType::Err;
                    }
                }
                EntityType::NumDec => {
                    if !c.is_ascii_digit() {
                        self.inentity = false;
                        self.entity_type = EntityType::Err;
                    }
                }
                EntityType::NumHex => {
                    if !c.is_ascii_hexdigit() {
                        self.inentity = false;
                        self.entity_type = EntityType::Err;
                    }
                }
                EntityType::Named => {
                    if !c.is_ascii_alphanumeric() {
                        self.inentity = false;
                        self.entity_type = EntityType::Err;
                    }
                }
                EntityType::Err => {
                    sink.reporter().fatal(
                        "PARSE",
                        "",
                        format_args!("Unknown EntityType: {:?}", self.entity_type),
                    );
                    return Err(Error::BadEntity(
                        "entity automaton advanced in error state".into(),
                    ));
                }
            }
            if self.inentity {
                return Ok(true);
            }
        }

        // Entity abgeschlossen (regulär oder im Fehlerfall): auswerten und ausgeben.
        self.finish_entity(sink);

        Ok(c == b';')
    }

    fn finish_entity(&mut self, sink: &mut impl TokenSink) {
        if self.entity_type == EntityType::NumDec || self.entity_type == EntityType::NumHex {
            let codepoint = self.parse_numeric_entity();
            match codepoint {
                Some(cp) => {
                    let named: Option<&[u8]> = match cp {
                        38 => Some(b"&amp;"),
                        60 => Some(b"&lt;"),
                        62 => Some(b"&gt;"),
                        34 => Some(b"&quot;"),
                        39 => Some(b"&apos;"),
                        _ => None,
                    };
                    if let Some(named) = named {
                        let orig = String::from_utf8_lossy(&self.entity_token).into_owned();
                        sink.reporter().dbg_ctx(
                            DebugFlags::PARSE,
                            "PARSE",
                            format_args!(
                                "Converted numeric entity {orig} to named entity {}",
                                String::from_utf8_lossy(named)
                            ),
                        );
                        self.entity_token.clear();
                        self.entity_token.extend_from_slice(named);
                        self.entity_type = EntityType::Named;
                    } else {
                        let orig = String::from_utf8_lossy(&self.entity_token).into_owned();
                        self.entity_token = encode_codepoint_utf8(cp);
                        sink.reporter().dbg_ctx(
                            DebugFlags::PARSE,
                            "PARSE",
                            format_args!("Converted numeric entity {orig} to UTF-8 character"),
                        );
                    }
                }
                None => {
                    let shown = String::from_utf8_lossy(&self.entity_token).into_owned();
                    sink.reporter().warning_ctx(
                        "PARSE",
                        format_args!(
                            "Invalid numeric entity, codepoint out of range or malformed: {shown}"
                        ),
                    );
                    self.entity_type = EntityType::Err;
                }
            }
        }

        match self.entity_type {
            EntityType::Err => {
                // führendes '&' abwerfen, als "&amp;" + Literalrest ausgeben
                let rest: Vec<u8> = self.entity_token[1..].to_vec();
                let shown = String::from_utf8_lossy(&rest).into_owned();
                sink.reporter().warning_ctx(
                    "PARSE",
                    format_args!("Malformed entity, replacing with &amp;{shown}"),
                );
                let mut out = b"&amp;".to_vec();
                out.extend_from_slice(&rest);
                self.emit(sink, &out);
            }
            EntityType::Named => {
                let tok = self.entity_token.clone();
                match tok.as_slice() {
                    b"&apos;" | b"&quot;" => {
                        let reduced = self.reduce_quote_entity(&tok, sink);
                        self.emit(sink, &reduced);
                    }
                    b"&amp;" | b"&lt;" | b"&gt;" => {
                        self.emit(sink, &tok);
                    }
                    _ => {
                        let shown = String::from_utf8_lossy(&tok).into_owned();
                        sink.reporter().warning_ctx(
                            "PARSE",
                            format_args!(
                                "XML only supports &amp;, &lt;, &gt;, &quot;, &apos;, found {shown}"
                            ),
                        );
                        self.emit(sink, &tok);
                    }
                }
            }
            _ => {
                let tok = self.entity_token.clone();
                self.emit(sink, &tok);
            }
        }
    }

    /// `&apos;`/`&quot;` kontextabhängig auf `'`/`"` reduzieren.
    ///
    /// Außerhalb von Attributen sind beide unnötig; innerhalb nur dann nötig,
    /// wenn das Attribut mit demselben Zeichen quotiert ist.
    fn reduce_quote_entity(&self, entity: &[u8], sink: &mut impl TokenSink) -> Vec<u8> {
        let (plain, same_quote, name) = if entity == b"&apos;" {
            (b'\'', b'\'', "&apos;")
        } else {
            (b'"', b'"', "&quot;")
        };
        let in_attr = self.inattribute && self.attr_quote != 0;
        if !in_attr {
            sink.reporter().dbg_ctx(
                DebugFlags::PARSE,
                "PARSE",
                format_args!("{name} unnecessary outside attributes. Replacing."),
            );
            return vec![plain];
        }
        if self.attr_quote != same_quote {
            sink.reporter().dbg_ctx(
                DebugFlags::PARSE,
                "PARSE",
                format_args!("{name} unnecessary in complementary-quoted attributes. Replacing."),
            );
            return vec![plain];
        }
        entity.to_vec()
    }

    /// Decodes `&#...;`/`&#x...;` from the accumulated entity token.
    /// `None` bei 0, >0x10FFFF oder Überlauf.
    fn parse_numeric_entity(&self) -> Option<u32> {
        let body = &self.entity_token;
        // "&#" … ";" ist durch den Automaten garantiert
        let digits = &body[2..body.len() - 1];
        let (digits, radix) = match digits.first() {
            Some(b'x') | Some(b'X') => (&digits[1..], 16),
            _ => (digits, 10),
        };
        let s = std::str::from_utf8(digits).ok()?;
        let cp = i64::from_str_radix(s, radix).ok()?;
        if cp > 0 && cp <= 0x10FFFF {
            Some(cp as u32)
        } else {
            None
        }
    }
}

/// Encodes a codepoint (1..=0x10FFFF) as UTF-8 bytes.
///
/// Bewusst Bit-Arithmetik statt `char::from_u32`: Surrogates laufen wie im
/// Eingabematerial durch, die Unicode-Aufbereitung beim Flush meldet sie dann.
fn encode_codepoint_utf8(cp: u32) -> Vec<u8> {
    if cp <= 0x7F {
        vec![cp as u8]
    } else if cp <= 0x7FF {
        vec![0xC0 | (cp >> 6) as u8, 0x80 | (cp & 0x3F) as u8]
    } else if cp <= 0xFFFF {
        vec![
            0xE0 | (cp >> 12) as u8,
            0x80 | ((cp >> 6) & 0x3F) as u8,
            0x80 | (cp & 0x3F) as u8,
        ]
    } else {
        vec![
            0xF0 | (cp >> 18) as u8,
            0x80 | ((cp >> 12) & 0x3F) as u8,
            0x80 | ((cp >> 6) & 0x3F) as u8,
            0x80 | (cp & 0x3F) as u8,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{DebugFlags, Reporter};

    /// Test-Sink: sammelt Text und Tokens getrennt ein.
    struct Collect {
        text: Vec<u8>,
        tokens: Vec<String>,
        rpt: Reporter,
    }

    impl Collect {
        fn new() -> Self {
            Self {
                text: Vec::new(),
                tokens: Vec::new(),
                rpt: Reporter::with_writer(DebugFlags::none(), Box::new(Vec::new())),
            }
        }

        fn text_str(&self) -> String {
            String::from_utf8_lossy(&self.text).into_owned()
        }
    }

    impl TokenSink for Collect {
        fn text(&mut self, chunk: &[u8]) {
            self.text.extend_from_slice(chunk);
        }
        fn token(&mut self, raw: &str) -> Result<()> {
            self.tokens.push(raw.to_string());
            Ok(())
        }
        fn reporter(&mut self) -> &mut Reporter {
            &mut self.rpt
        }
    }

    fn scan(input: &str) -> Collect {
        let mut sink = Collect::new();
        let mut sc = Scanner::new();
        sc.run(std::io::Cursor::new(input.as_bytes()), &mut sink)
            .unwrap();
        sink
    }

    #[test]
    fn splits_text_and_tokens() {
        let out = scan("pre <verse osisID=\"Gen.1.1\"/> post");
        assert_eq!(out.tokens, ["<verse osisID=\"Gen.1.1\"/>"]);
        assert_eq!(out.text_str(), "pre  post");
    }

    /// Whitespace-Läufe außerhalb von Tokens werden zu genau einem Blank.
    #[test]
    fn collapses_whitespace_runs_outside_tokens() {
        let out = scan("a  \t \n  b");
        assert_eq!(out.text_str(), "a b");
    }

    #[test]
    fn preserves_whitespace_inside_tokens() {
        let out = scan("<div   type=\"a  b\">");
        assert_eq!(out.tokens, ["<div   type=\"a  b\">"]);
    }

    /// Kein Byte des Kommentars darf im Output auftauchen.
    #[test]
    fn comments_are_elided_completely() {
        let out = scan("x<!-- aside - -- <evil> &amp; -->y");
        assert_eq!(out.text_str(), "xy");
        assert!(out.tokens.is_empty());
    }

    #[test]
    fn failed_comment_start_falls_back_to_token() {
        let out = scan("<!DOCTYPE osis>text");
        // kein alpha an token[1] → verworfen mit Warnung
        assert!(out.tokens.is_empty());
        assert_eq!(out.text_str(), "text");
    }

    #[test]
    fn named_entities_pass_through() {
        let out = scan("a &amp; b &lt; c &gt; d");
        assert_eq!(out.text_str(), "a &amp; b &lt; c &gt; d");
    }

    /// Die fünf Spezial-Codepoints werden auf die benannte Form umgeschrieben.
    #[test]
    fn special_numeric_entities_become_named() {
        let out = scan("&#38; &#60; &#62; &#34;");
        assert_eq!(out.text_str(), "&amp; &lt; &gt; &quot;");
    }

    #[test]
    fn apos_numeric_outside_attribute_reduces_to_plain() {
        // &#39; → &apos; → außerhalb von Attributen zu ' reduziert
        let out = scan("&#39;");
        assert_eq!(out.text_str(), "'");
    }

    #[test]
    fn numeric_entities_decode_to_utf8() {
        let out = scan("&#65;&#xC4;&#x10FFFF;");
        let mut expected = vec![b'A'];
        expected.extend_from_slice("Ä".as_bytes());
        expected.extend_from_slice(&[0xF4, 0x8F, 0xBF, 0xBF]);
        assert_eq!(out.text, expected);
    }

    #[test]
    fn unknown_named_entity_passes_unchanged() {
        let out = scan("&bogus;");
        assert_eq!(out.text_str(), "&bogus;");
    }

    /// Kaputte Entities: `&amp;` plus Literalrest, Strom läuft weiter.
    #[test]
    fn malformed_entity_emits_amp_plus_rest() {
        let out = scan("&#zz; tail");
        assert!(out.text_str().starts_with("&amp;#z"), "{}", out.text_str());
        assert!(out.text_str().ends_with(" tail"), "{}", out.text_str());
    }

    #[test]
    fn zero_and_out_of_range_codepoints_are_malformed() {
        let out = scan("&#0;");
        assert!(out.text_str().contains("&amp;#0;"), "{}", out.text_str());
        let out = scan("&#x110000;");
        assert!(
            out.text_str().contains("&amp;#x110000;"),
            "{}",
            out.text_str()
        );
    }

    #[test]
    fn overlong_entity_is_cut_off() {
        let input = format!("&{};", "a".repeat(40));
        let out = scan(&input);
        assert!(out.text_str().starts_with("&amp;a"), "{}", out.text_str());
    }

    #[test]
    fn entities_inside_tokens_land_in_the_token() {
        let out = scan("<title type=\"x\">A &amp; B</title>");
        assert_eq!(out.tokens.len(), 2);
        assert_eq!(out.text_str(), "A &amp; B");
    }

    /// &quot; in einem einfach quotierten Attribut wird zu `"` reduziert.
    #[test]
    fn quot_in_single_quoted_attribute_reduces() {
        let out = scan("<seg marker='&quot;'>");
        assert_eq!(out.tokens, ["<seg marker='\"'>"]);
    }

    #[test]
    fn quot_in_double_quoted_attribute_is_kept() {
        let out = scan("<seg marker=\"&quot;\">");
        assert_eq!(out.tokens, ["<seg marker=\"&quot;\">"]);
    }

    #[test]
    fn bare_gt_in_text_becomes_named_entity() {
        let out = scan("a > b");
        assert_eq!(out.text_str(), "a &gt; b");
    }

    #[test]
    fn gt_inside_quoted_attribute_does_not_end_token() {
        let out = scan("<note osisRef=\"Gen.1.1\" n=\"a>b\">x");
        assert_eq!(out.tokens, ["<note osisRef=\"Gen.1.1\" n=\"a>b\">"]);
        assert_eq!(out.text_str(), "x");
    }

    /// Zeilenzähler läuft auch über Newlines in Kommentaren korrekt weiter.
    #[test]
    fn line_counter_advances_inside_comments() {
        let mut sink = Collect::new();
        let mut sc = Scanner::new();
        sc.run(
            std::io::Cursor::new("<!--\n\n\n-->x".as_bytes()),
            &mut sink,
        )
        .unwrap();
        assert_eq!(sc.line, 4);
        assert_eq!(sink.text_str(), "x");
    }

    #[test]
    fn malformed_token_is_discarded_with_warning() {
        let out = scan("<123>keep");
        assert!(out.tokens.is_empty());
        assert_eq!(out.text_str(), "keep");
    }

    #[test]
    fn processing_instruction_is_a_token() {
        let out = scan("<?xml version=\"1.0\"?>");
        assert_eq!(out.tokens, ["<?xml version=\"1.0\"?>"]);
    }

    #[test]
    fn eof_inside_token_drops_the_token() {
        let out = scan("text<div type=\"x");
        assert_eq!(out.text_str(), "text");
        assert!(out.tokens.is_empty());
    }
}
