//! UTF-8 detection and cp1252 conversion.
//!
//! Die Erkennung prüft nur die Rahmenstruktur (2–4-Byte-Folgen, korrekte
//! Fortsetzungsbytes) und lehnt die Überlang-Muster `1111110x`, `11111110`
//! und `11111111` ab — Codepoint-Bereiche prüft sie nicht. Nicht-UTF-8-Text
//! wird beim Import als Windows-1252 angenommen und konvertiert.

/// Result of scanning a byte run for UTF-8 validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8State {
    /// High-order bytes present, but not valid UTF-8 framing.
    Invalid,
    /// Valid multi-byte UTF-8 sequences present.
    Valid,
    /// No high-order bytes at all (plain ASCII — auch gültiges UTF-8).
    Ascii,
}

/// Scans the whole run. Jede High-Bit-Sequenz muss der UTF-8-Rahmung
/// entsprechen, sonst ist der gesamte Lauf `Invalid`.
pub fn detect_utf8(bytes: &[u8]) -> Utf8State {
    let mut count_multibyte = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 != 0 {
            // Anzahl gesetzter High-Bits = Länge der Sequenz
            let mut lead = b;
            let mut count = 0u8;
            while lead & 0x80 != 0 {
                count += 1;
                lead <<= 1;
            }
            // 10nnnnnn als Start und 111110xx.. aufwärts sind keine Starts
            if !(2..=4).contains(&count) {
                return Utf8State::Invalid;
            }
            for _ in 1..count {
                i += 1;
                match bytes.get(i) {
                    Some(&f) if f & 0xC0 == 0x80 => {}
                    _ => return Utf8State::Invalid,
                }
            }
            count_multibyte += 1;
        }
        i += 1;
    }
    if count_multibyte > 0 {
        Utf8State::Valid
    } else {
        Utf8State::Ascii
    }
}

/// cp1252 specials in 0x80..=0x9F; undefinierte Slots fallen auf die
/// Latin-1-C1-Codepoints zurück.
const CP1252_HIGH: [u32; 32] = [
    0x20AC, 0x0081, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, //
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0x008D, 0x017D, 0x008F, //
    0x0090, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, //
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0x009D, 0x017E, 0x0178,
];

/// Converts Windows-1252 bytes to UTF-8.
pub fn cp1252_to_utf8(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if b < 0x80 {
            out.push(b);
        } else {
            let cp = if b < 0xA0 {
                CP1252_HIGH[(b - 0x80) as usize]
            } else {
                b as u32
            };
            let mut buf = [0u8; 4];
            // alle Tabellenwerte sind gültige Codepoints
            let c = char::from_u32(cp).unwrap_or('\u{FFFD}');
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}
