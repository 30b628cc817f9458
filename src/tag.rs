//! Parsed representation of one XML token.
//!
//! Das Attribut-Modell ist bewusst eine geordnete Liste von Paaren statt
//! einer Map: Tags werden wörtlich in den Verstext zurückgeschrieben und
//! müssen ihre Attributreihenfolge behalten. Unbekannte Attribute sind
//! erlaubt und werden unverändert durchgereicht.
//!
//! Ein Tag gilt als End-Tag wenn er mit `</` beginnt ODER ein `eID`-Attribut
//! trägt (Milestone-Ende) — letzteres prüft der Aufrufer, da `is_end_tag`
//! hier nur die syntaktische Form meldet.

use std::fmt;

/// One parsed XML tag: name, ordered attributes, end/empty form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlTag {
    name: String,
    attrs: Vec<(String, String)>,
    is_end: bool,
    is_empty: bool,
}

impl XmlTag {
    /// Parses a raw token (`<...>`; die Klammern dürfen fehlen).
    ///
    /// Kein Validator: Unparsbares wird ausgelassen, nie abgebrochen —
    /// der Scanner hat offensichtlich kaputte Tokens bereits verworfen.
    pub fn parse(raw: &str) -> Self {
        let mut s = raw.trim();
        s = s.strip_prefix('<').unwrap_or(s);
        s = s.strip_suffix('>').unwrap_or(s);

        let mut is_empty = false;
        if let Some(rest) = s.strip_suffix('/') {
            is_empty = true;
            s = rest;
        } else if s.len() > 1 {
            // Processing-Instruction-Form <?...?>
            if let Some(rest) = s.strip_suffix('?') {
                if rest.starts_with('?') {
                    is_empty = true;
                    s = rest;
                }
            }
        }

        let mut is_end = false;
        if let Some(rest) = s.strip_prefix('/') {
            is_end = true;
            s = rest;
        }

        let bytes = s.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let name = s[..pos].to_string();

        let mut attrs = Vec::new();
        while pos < bytes.len() {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }
            let name_start = pos;
            while pos < bytes.len() && bytes[pos] != b'=' && !bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            let attr_name = s[name_start..pos].to_string();
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() || bytes[pos] != b'=' {
                // nacktes Wort ohne Wert: überspringen
                continue;
            }
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                break;
            }
            let quote = bytes[pos];
            let value = if quote == b'"' || quote == b'\'' {
                pos += 1;
                let val_start = pos;
                while pos < bytes.len() && bytes[pos] != quote {
                    pos += 1;
                }
                let v = s[val_start..pos].to_string();
                if pos < bytes.len() {
                    pos += 1;
                }
                v
            } else {
                // unquoted value bis zum nächsten Whitespace
                let val_start = pos;
                while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                s[val_start..pos].to_string()
            };
            if !attr_name.is_empty() {
                attrs.push((attr_name, value));
            }
        }

        Self {
            name,
            attrs,
            is_end,
            is_empty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Syntactic end-tag form (`</name>`).
    pub fn is_end_tag(&self) -> bool {
        self.is_end
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn set_empty(&mut self, empty: bool) {
        self.is_empty = empty;
    }

    /// Attribute lookup; `None` wenn nicht vorhanden.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value or empty string (das häufige Abfragemuster).
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or("")
    }

    /// Setzt ein Attribut; existierende behalten ihre Position, neue werden
    /// hinten angehängt (Reihenfolge der Wiederausgabe!).
    pub fn set_attr(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.attrs.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            self.attrs.push((name.to_string(), value.to_string()));
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(n, _)| n != name);
    }

    /// Attributnamen in Dokumentreihenfolge.
    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Display for XmlTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end && !self.is_empty {
            return write!(f, "</{}>", self.name);
        }
        write!(f, "<{}", self.name)?;
        for (n, v) in &self.attrs {
            write!(f, " {n}=\"{v}\"")?;
        }
        if self.is_empty {
            write!(f, "/>")
        } else {
            write!(f, ">")
        }
    }
}
