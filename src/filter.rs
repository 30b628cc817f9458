//! Text filters: transcoding, normalization, cipher.
//!
//! Alle Transformationen teilen sich die Form `(Bytes, Schlüssel) → Bytes`
//! und hängen als Trait-Objekte am Importer-Kontext bzw. am Storage-Modul:
//!
//! - [`TextFilter`]: one-way (Latin-1→UTF-8, NFC, UTF-8↔UTF-16, UTF-8↔SCSU).
//!   Encoder/Decoder sind getrennte Instanzen, wie bei den klassischen
//!   Filterpaaren der Modulwerkzeuge.
//! - [`RawFilter`]: bidirektional über den Roh-Bytes des Moduls (Cipher).

use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::key::VerseKey;
use crate::unicode::cp1252_to_utf8;

/// One-way byte transform, keyed for diagnostics.
pub trait TextFilter {
    fn process(&self, bytes: &mut Vec<u8>, key: Option<&VerseKey>) -> Result<()>;
}

/// Bidirectional transform over the module's raw entry bytes.
pub trait RawFilter {
    fn encipher(&self, bytes: &mut Vec<u8>) -> Result<()>;
    fn decipher(&self, bytes: &mut Vec<u8>) -> Result<()>;
}

// ============================================================================
// Latin-1 (cp1252) → UTF-8
// ============================================================================

/// Assumes cp1252 input and produces UTF-8.
pub struct Latin1Utf8;

impl TextFilter for Latin1Utf8 {
    fn process(&self, bytes: &mut Vec<u8>, _key: Option<&VerseKey>) -> Result<()> {
        *bytes = cp1252_to_utf8(bytes);
        Ok(())
    }
}

// ============================================================================
// UTF-8 NFC normalization
// ============================================================================

/// Canonical composition (NFC) über gültigem UTF-8; ungültige Eingaben
/// bleiben unverändert (der Aufrufer hat vorher konvertiert oder gewarnt).
pub struct Utf8Nfc;

impl TextFilter for Utf8Nfc {
    fn process(&self, bytes: &mut Vec<u8>, _key: Option<&VerseKey>) -> Result<()> {
        if let Ok(s) = std::str::from_utf8(bytes) {
            let composed: String = s.nfc().collect();
            *bytes = composed.into_bytes();
        }
        Ok(())
    }
}

// ============================================================================
// UTF-8 ↔ UTF-16 (little endian, mit BOM)
// ============================================================================

/// UTF-8 → UTF-16LE with BOM.
pub struct Utf8Utf16;

impl TextFilter for Utf8Utf16 {
    fn process(&self, bytes: &mut Vec<u8>, _key: Option<&VerseKey>) -> Result<()> {
        let s = String::from_utf8_lossy(bytes);
        let mut out = Vec::with_capacity(2 + s.len() * 2);
        out.extend_from_slice(&[0xFF, 0xFE]);
        for unit in s.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        *bytes = out;
        Ok(())
    }
}

/// UTF-16 (BOM-aware, default LE) → UTF-8.
pub struct Utf16Utf8;

impl TextFilter for Utf16Utf8 {
    fn process(&self, bytes: &mut Vec<u8>, _key: Option<&VerseKey>) -> Result<()> {
        let mut data = bytes.as_slice();
        let mut big_endian = false;
        if data.len() >= 2 {
            match (data[0], data[1]) {
                (0xFF, 0xFE) => data = &data[2..],
                (0xFE, 0xFF) => {
                    big_endian = true;
                    data = &data[2..];
                }
                _ => {}
            }
        }
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|c| {
                if big_endian {
                    u16::from_be_bytes([c[0], c[1]])
                } else {
                    u16::from_le_bytes([c[0], c[1]])
                }
            })
            .collect();
        let s = String::from_utf16_lossy(&units);
        *bytes = s.into_bytes();
        Ok(())
    }
}

// ============================================================================
// UTF-8 ↔ SCSU (Single-Byte-Modus mit dynamischem Fenster 0)
// ============================================================================

/// Default dynamic window offsets (SCSU Tabelle der Startbelegung).
const SCSU_DEFAULT_WINDOWS: [u32; 8] = [
    0x0080, 0x00C0, 0x0400, 0x0600, 0x0900, 0x3040, 0x30A0, 0xFF00,
];

const SCSU_SQU: u8 = 0x0E;
const SCSU_SD0: u8 = 0x18;

/// UTF-8 → SCSU. Arbeitet ausschließlich im Single-Byte-Modus mit
/// Fensterwechseln über SD0; alles außerhalb erreichbarer Fenster wird
/// per SQU quotiert. Das Modul speichert nur selbst erzeugtes SCSU,
/// daher genügt diese Teilmenge.
pub struct Utf8Scsu;

impl TextFilter for Utf8Scsu {
    fn process(&self, bytes: &mut Vec<u8>, _key: Option<&VerseKey>) -> Result<()> {
        let s = String::from_utf8_lossy(bytes);
        let mut out = Vec::with_capacity(s.len());
        let mut window0 = SCSU_DEFAULT_WINDOWS[0];
        for ch in s.chars() {
            let cp = ch as u32;
            match cp {
                0x09 | 0x0A | 0x0D => out.push(cp as u8),
                0x20..=0x7E => out.push(cp as u8),
                _ if cp >= window0 && cp < window0 + 0x80 => {
                    out.push((cp - window0 + 0x80) as u8)
                }
                0x80..=0x337F => {
                    // Fenster auf den Halbblock des Zeichens umdefinieren
                    let offset_byte = (cp >> 7) as u8;
                    window0 = (offset_byte as u32) << 7;
                    out.push(SCSU_SD0);
                    out.push(offset_byte);
                    out.push((cp - window0 + 0x80) as u8);
                }
                _ => {
                    // SQU je UTF-16-Einheit (Surrogatpaare als zwei Quotes)
                    let mut units = [0u16; 2];
                    for unit in ch.encode_utf16(&mut units).iter() {
                        out.push(SCSU_SQU);
                        out.extend_from_slice(&unit.to_be_bytes());
                    }
                }
            }
        }
        *bytes = out;
        Ok(())
    }
}

/// SCSU → UTF-8 für die vom Encoder erzeugte Teilmenge.
pub struct ScsuUtf8;

impl TextFilter for ScsuUtf8 {
    fn process(&self, bytes: &mut Vec<u8>, _key: Option<&VerseKey>) -> Result<()> {
        fn push_codepoint(units: &mut Vec<u16>, cp: u32) {
            let mut buf = [0u16; 2];
            let c = char::from_u32(cp).unwrap_or('\u{FFFD}');
            units.extend_from_slice(c.encode_utf16(&mut buf));
        }

        let mut windows = SCSU_DEFAULT_WINDOWS;
        let mut active = 0usize;
        let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
        let mut i = 0usize;
        let data = bytes.as_slice();
        while i < data.len() {
            let b = data[i];
            match b {
                0x09 | 0x0A | 0x0D => {
                    units.push(b as u16);
                    i += 1;
                }
                0x20..=0x7F => {
                    units.push(b as u16);
                    i += 1;
                }
                0x80..=0xFF => {
                    push_codepoint(&mut units, windows[active] + (b as u32 - 0x80));
                    i += 1;
                }
                SCSU_SQU => {
                    if i + 2 >= data.len() {
                        break;
                    }
                    units.push(u16::from_be_bytes([data[i + 1], data[i + 2]]));
                    i += 3;
                }
                0x18..=0x1F => {
                    // SDn: Fenster n umdefinieren und aktivieren
                    if i + 1 >= data.len() {
                        break;
                    }
                    let n = (b - SCSU_SD0) as usize;
                    windows[n] = (data[i + 1] as u32) << 7;
                    active = n;
                    i += 2;
                }
                0x10..=0x17 => {
                    // SCn: Fenster n aktivieren
                    active = (b - 0x10) as usize;
                    i += 1;
                }
                0x01..=0x08 => {
                    // SQn: Einzelzeichen aus Fenster n
                    if i + 1 >= data.len() {
                        break;
                    }
                    let n = (b - 0x01) as usize;
                    let q = data[i + 1];
                    if q >= 0x80 {
                        push_codepoint(&mut units, windows[n] + (q as u32 - 0x80));
                    } else {
                        units.push(q as u16);
                    }
                    i += 2;
                }
                _ => {
                    // unbekannter Tag (Unicode-Modus o.ä.): nicht unsere Teilmenge
                    return Err(Error::Io(format!(
                        "unsupported SCSU tag 0x{b:02X} at offset {i}"
                    )));
                }
            }
        }
        *bytes = String::from_utf16_lossy(&units).into_bytes();
        Ok(())
    }
}

// ============================================================================
// Cipher (Sapphire-II-Stromchiffre über den Rohdaten)
// ============================================================================

/// Keyed stream cipher over raw module bytes.
///
/// Der klassische Modul-Cipher: ein Byte Strom-Zustand aus einer
/// schlüsselinitialisierten Permutation. Ver- und Entschlüsselung laufen
/// über denselben Zustandsautomaten, nur die Rückkopplung unterscheidet sich.
pub struct CipherFilter {
    key: Vec<u8>,
}

impl CipherFilter {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }
}

struct SapphireState {
    cards: [u8; 256],
    rotor: u8,
    ratchet: u8,
    avalanche: u8,
    last_plain: u8,
    last_cipher: u8,
}

impl SapphireState {
    fn new(key: &[u8]) -> Self {
        let mut cards = [0u8; 256];
        for (i, c) in cards.iter_mut().enumerate() {
            *c = i as u8;
        }
        let mut keypos = 0usize;
        let mut rsum = 0u8;
        if !key.is_empty() {
            for i in (1..=255u32).rev() {
                let j = Self::keyrand(i as u8, key, &mut rsum, &mut keypos, &cards);
                cards.swap(i as usize, j as usize);
            }
        }
        let rotor = cards[1];
        let ratchet = cards[3];
        let avalanche = cards[5];
        let last_plain = cards[7];
        let last_cipher = cards[9];
        Self {
            cards,
            rotor,
            ratchet,
            avalanche,
            last_plain,
            last_cipher,
        }
    }

    fn keyrand(
        limit: u8,
        key: &[u8],
        rsum: &mut u8,
        keypos: &mut usize,
        cards: &[u8; 256],
    ) -> u8 {
        if limit == 0 {
            return 0;
        }
        // kleinste 2^n-1-Maske >= limit
        let mut mask = 1u16;
        while mask < limit as u16 {
            mask = (mask << 1) + 1;
        }
        let mut retry = 0u8;
        loop {
            *rsum = cards[*rsum as usize].wrapping_add(key[*keypos]);
            *keypos += 1;
            if *keypos >= key.len() {
                *keypos = 0;
                *rsum = rsum.wrapping_add(key.len() as u8);
            }
            let mut u = (mask & *rsum as u16) as u8;
            retry = retry.wrapping_add(1);
            if retry > 11 {
                u %= limit;
            }
            if u <= limit {
                return u;
            }
        }
    }

    fn mix(&mut self) -> (u8, u8) {
        self.ratchet = self
            .ratchet
            .wrapping_add(self.cards[self.rotor as usize]);
        self.rotor = self.rotor.wrapping_add(1);
        let swaptemp = self.cards[self.last_cipher as usize];
        self.cards[self.last_cipher as usize] = self.cards[self.ratchet as usize];
        self.cards[self.ratchet as usize] = self.cards[self.last_plain as usize];
        self.cards[self.last_plain as usize] = self.cards[self.rotor as usize];
        self.cards[self.rotor as usize] = swaptemp;
        self.avalanche = self.avalanche.wrapping_add(self.cards[swaptemp as usize]);
        let a = self.cards[(self.cards[self.ratchet as usize]
            .wrapping_add(self.cards[self.rotor as usize]))
            as usize];
        let b = self.cards[self.cards[(self.cards[self.last_plain as usize]
            .wrapping_add(self.cards[self.last_cipher as usize])
            .wrapping_add(self.cards[self.avalanche as usize]))
            as usize] as usize];
        (a, b)
    }

    fn encrypt_byte(&mut self, b: u8) -> u8 {
        let (a, c) = self.mix();
        self.last_cipher = b ^ a ^ c;
        self.last_plain = b;
        self.last_cipher
    }

    fn decrypt_byte(&mut self, b: u8) -> u8 {
        let (a, c) = self.mix();
        self.last_plain = b ^ a ^ c;
        self.last_cipher = b;
        self.last_plain
    }
}

impl RawFilter for CipherFilter {
    fn encipher(&self, bytes: &mut Vec<u8>) -> Result<()> {
        let mut st = SapphireState::new(&self.key);
        for b in bytes.iter_mut() {
            *b = st.encrypt_byte(*b);
        }
        Ok(())
    }

    fn decipher(&self, bytes: &mut Vec<u8>) -> Result<()> {
        let mut st = SapphireState::new(&self.key);
        for b in bytes.iter_mut() {
            *b = st.decrypt_byte(*b);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(f: &dyn TextFilter, input: &[u8]) -> Vec<u8> {
        let mut buf = input.to_vec();
        f.process(&mut buf, None).unwrap();
        buf
    }

    #[test]
    fn latin1_filter_produces_utf8() {
        let out = run(&Latin1Utf8, b"caf\xE9 \x93x\x94");
        assert_eq!(out, "café \u{201C}x\u{201D}".as_bytes());
    }

    /// Zerlegtes A + Trema komponiert zu Ä.
    #[test]
    fn nfc_composes_decomposed_sequences() {
        let out = run(&Utf8Nfc, "A\u{0308}bc".as_bytes());
        assert_eq!(out, "Äbc".as_bytes());
    }

    #[test]
    fn nfc_leaves_invalid_utf8_alone() {
        let out = run(&Utf8Nfc, b"\xE9\xE9");
        assert_eq!(out, b"\xE9\xE9");
    }

    #[test]
    fn utf16_round_trip() {
        let text = "Im Anfang — ἐν ἀρχῇ \u{10FFFF}";
        let encoded = run(&Utf8Utf16, text.as_bytes());
        assert_eq!(&encoded[..2], &[0xFF, 0xFE]);
        let decoded = run(&Utf16Utf8, &encoded);
        assert_eq!(decoded, text.as_bytes());
    }

    #[test]
    fn scsu_ascii_stays_ascii() {
        let encoded = run(&Utf8Scsu, b"In the beginning");
        assert_eq!(encoded, b"In the beginning");
        assert_eq!(run(&ScsuUtf8, &encoded), b"In the beginning");
    }

    #[test]
    fn scsu_round_trip_latin_and_greek() {
        for text in ["café äöü", "ἐν ἀρχῇ ἦν ὁ λόγος", "mixed: a–b … €"] {
            let encoded = run(&Utf8Scsu, text.as_bytes());
            let decoded = run(&ScsuUtf8, &encoded);
            assert_eq!(decoded, text.as_bytes(), "round trip of {text:?}");
        }
    }

    #[test]
    fn scsu_round_trip_supplementary_plane() {
        let text = "Gothic: \u{10330}\u{10331}";
        let encoded = run(&Utf8Scsu, text.as_bytes());
        let decoded = run(&ScsuUtf8, &encoded);
        assert_eq!(decoded, text.as_bytes());
    }

    #[test]
    fn scsu_latin1_is_single_byte_per_char() {
        let encoded = run(&Utf8Scsu, "äöü".as_bytes());
        assert_eq!(encoded.len(), 3);
    }

    #[test]
    fn cipher_round_trips() {
        let cipher = CipherFilter::new("secret phrase");
        let plain = b"In the beginning God created".to_vec();
        let mut buf = plain.clone();
        cipher.encipher(&mut buf).unwrap();
        assert_ne!(buf, plain);
        cipher.decipher(&mut buf).unwrap();
        assert_eq!(buf, plain);
    }

    #[test]
    fn cipher_output_depends_on_key() {
        let a = CipherFilter::new("key a");
        let b = CipherFilter::new("key b");
        let mut buf_a = b"identical input".to_vec();
        let mut buf_b = b"identical input".to_vec();
        a.encipher(&mut buf_a).unwrap();
        b.encipher(&mut buf_b).unwrap();
        assert_ne!(buf_a, buf_b);
    }

    #[test]
    fn empty_key_cipher_is_still_reversible() {
        let cipher = CipherFilter::new("");
        let mut buf = b"text".to_vec();
        cipher.encipher(&mut buf).unwrap();
        cipher.decipher(&mut buf).unwrap();
        assert_eq!(buf, b"text");
    }
}
