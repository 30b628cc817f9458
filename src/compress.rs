//! Block compressors for compressed text modules.
//!
//! Vier Verfahren wie bei den klassischen Modulen: LZSS (in-crate, das
//! Ringpuffer-Format der alten Werkzeuge), ZIP/zlib über flate2 sowie
//! bzip2 und xz hinter Cargo-Features — nicht einkompilierte Verfahren
//! melden einen Usage-Fehler statt still zu degradieren.

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// One whole-block compression scheme.
pub trait Compressor {
    fn name(&self) -> &'static str;
    /// Kompressionslevel 1–9; Verfahren ohne Level ignorieren den Aufruf.
    fn set_level(&mut self, level: u32);
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Compression selection from the CLI (`-z`/`-Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressType {
    Lzss,
    Zip,
    Bzip2,
    Xz,
}

impl CompressType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Lzss => "LZSS",
            Self::Zip => "ZIP",
            Self::Bzip2 => "BZIP2",
            Self::Xz => "XZ",
        }
    }

    /// Instantiates the compressor, or reports the missing feature.
    pub fn create(self) -> Result<Box<dyn Compressor>> {
        match self {
            Self::Lzss => Ok(Box::new(LzssCompressor)),
            Self::Zip => Ok(Box::new(ZipCompressor::default())),
            #[cfg(feature = "bzip2")]
            Self::Bzip2 => Ok(Box::new(Bzip2Compressor::default())),
            #[cfg(not(feature = "bzip2"))]
            Self::Bzip2 => Err(Error::usage(
                "not compiled with bzip2 compression support (enable the `bzip2` feature)",
            )),
            #[cfg(feature = "xz")]
            Self::Xz => Ok(Box::new(XzCompressor::default())),
            #[cfg(not(feature = "xz"))]
            Self::Xz => Err(Error::usage(
                "not compiled with xz compression support (enable the `xz` feature)",
            )),
        }
    }
}

// ============================================================================
// LZSS (Ringpuffer 4096, Matchlänge 3..18)
// ============================================================================

const LZSS_N: usize = 4096;
const LZSS_F: usize = 18;
const LZSS_THRESHOLD: usize = 2;

/// LZSS im klassischen Modulformat: Steuerbyte mit acht Flags, Bit 1 =
/// Literal, Bit 0 = (Position, Länge)-Paar mit absoluter Ringposition.
pub struct LzssCompressor;

impl Compressor for LzssCompressor {
    fn name(&self) -> &'static str {
        "LZSS"
    }

    fn set_level(&mut self, _level: u32) {}

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() / 2 + 16);
        // Ring startet mit Blanks, Schreibposition bei N-F
        let mut r = LZSS_N - LZSS_F;
        let mut i = 0usize;

        // Kettensuche über 3-Byte-Anker im bereits ausgegebenen Fenster
        let mut heads: crate::FastHashMap<[u8; 3], Vec<usize>> = crate::FastHashMap::default();

        let mut unit: Vec<u8> = Vec::with_capacity(1 + 16);
        let mut flags = 0u8;
        let mut flag_count = 0u8;
        unit.push(0);

        let mut flush_unit = |out: &mut Vec<u8>, unit: &mut Vec<u8>, flags: &mut u8| {
            unit[0] = *flags;
            out.extend_from_slice(unit);
            unit.clear();
            unit.push(0);
            *flags = 0;
        };

        while i < data.len() {
            // längsten Match im Fenster suchen
            let mut best_len = 0usize;
            let mut best_pos = 0usize;
            if i + LZSS_THRESHOLD < data.len() {
                let anchor = [data[i], data[i + 1], data[i + 2]];
                if let Some(chain) = heads.get(&anchor) {
                    for &cand in chain.iter().rev().take(64) {
                        let dist = i - cand;
                        if dist == 0 || dist > LZSS_N - LZSS_F {
                            continue;
                        }
                        let max = LZSS_F.min(data.len() - i);
                        let mut l = 0usize;
                        while l < max && data[cand + l] == data[i + l] {
                            l += 1;
                        }
                        if l > best_len {
                            best_len = l;
                            best_pos = cand;
                            if l == LZSS_F {
                                break;
                            }
                        }
                    }
                }
            }

            if best_len > LZSS_THRESHOLD {
                let dist = i - best_pos;
                // absolute Ringposition des Matchanfangs
                let pos = (r.wrapping_sub(dist)) & (LZSS_N - 1);
                unit.push((pos & 0xFF) as u8);
                unit.push((((pos >> 4) & 0xF0) | (best_len - LZSS_THRESHOLD - 1)) as u8);
                for k in 0..best_len {
                    let idx = i + k;
                    if idx + 2 < data.len() {
                        heads
                            .entry([data[idx], data[idx + 1], data[idx + 2]])
                            .or_default()
                            .push(idx);
                    }
                }
                i += best_len;
                r = (r + best_len) & (LZSS_N - 1);
            } else {
                flags |= 1 << flag_count;
                unit.push(data[i]);
                if i + 2 < data.len() {
                    heads
                        .entry([data[i], data[i + 1], data[i + 2]])
                        .or_default()
                        .push(i);
                }
                i += 1;
                r = (r + 1) & (LZSS_N - 1);
            }
            flag_count += 1;
            if flag_count == 8 {
                flush_unit(&mut out, &mut unit, &mut flags);
                flag_count = 0;
            }
        }
        if flag_count > 0 || unit.len() > 1 {
            flush_unit(&mut out, &mut unit, &mut flags);
        }
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 3);
        let mut ring = [b' '; LZSS_N];
        let mut r = LZSS_N - LZSS_F;
        let mut i = 0usize;
        let mut flags = 0u32;

        while i < data.len() {
            flags >>= 1;
            if flags & 0x100 == 0 {
                flags = data[i] as u32 | 0xFF00;
                i += 1;
                if i >= data.len() {
                    break;
                }
            }
            if flags & 1 != 0 {
                let c = data[i];
                i += 1;
                out.push(c);
                ring[r] = c;
                r = (r + 1) & (LZSS_N - 1);
            } else {
                if i + 1 >= data.len() {
                    break;
                }
                let lo = data[i] as usize;
                let hi = data[i + 1] as usize;
                i += 2;
                let pos = lo | ((hi & 0xF0) << 4);
                let len = (hi & 0x0F) + LZSS_THRESHOLD + 1;
                for k in 0..len {
                    let c = ring[(pos + k) & (LZSS_N - 1)];
                    out.push(c);
                    ring[r] = c;
                    r = (r + 1) & (LZSS_N - 1);
                }
            }
        }
        Ok(out)
    }
}

// ============================================================================
// ZIP (zlib / DEFLATE über flate2)
// ============================================================================

/// zlib-gerahmtes DEFLATE, Level 1–9.
pub struct ZipCompressor {
    level: u32,
}

impl Default for ZipCompressor {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Compressor for ZipCompressor {
    fn name(&self) -> &'static str {
        "ZIP"
    }

    fn set_level(&mut self, level: u32) {
        self.level = level.clamp(1, 9);
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut enc =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        enc.write_all(data)
            .and_then(|_| enc.finish())
            .map_err(|e| Error::Io(format!("deflate: {e}")))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        flate2::read::ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::Io(format!("inflate: {e}")))?;
        Ok(out)
    }
}

// ============================================================================
// bzip2 / xz (Feature-gated)
// ============================================================================

#[cfg(feature = "bzip2")]
pub struct Bzip2Compressor {
    level: u32,
}

#[cfg(feature = "bzip2")]
impl Default for Bzip2Compressor {
    fn default() -> Self {
        Self { level: 9 }
    }
}

#[cfg(feature = "bzip2")]
impl Compressor for Bzip2Compressor {
    fn name(&self) -> &'static str {
        "BZIP2"
    }

    fn set_level(&mut self, level: u32) {
        self.level = level.clamp(1, 9);
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = bzip2::write::BzEncoder::new(
            Vec::new(),
            bzip2::Compression::new(self.level),
        );
        enc.write_all(data)
            .and_then(|_| enc.finish())
            .map_err(|e| Error::Io(format!("bzip2: {e}")))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        bzip2::read::BzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::Io(format!("bunzip2: {e}")))?;
        Ok(out)
    }
}

#[cfg(feature = "xz")]
pub struct XzCompressor {
    level: u32,
}

#[cfg(feature = "xz")]
impl Default for XzCompressor {
    fn default() -> Self {
        Self { level: 6 }
    }
}

#[cfg(feature = "xz")]
impl Compressor for XzCompressor {
    fn name(&self) -> &'static str {
        "XZ"
    }

    fn set_level(&mut self, level: u32) {
        self.level = level.clamp(1, 9);
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), self.level);
        enc.write_all(data)
            .and_then(|_| enc.finish())
            .map_err(|e| Error::Io(format!("xz: {e}")))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        xz2::read::XzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::Io(format!("unxz: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(c: &dyn Compressor, data: &[u8]) {
        let packed = c.compress(data).unwrap();
        let unpacked = c.decompress(&packed).unwrap();
        assert_eq!(unpacked, data, "{} round trip", c.name());
    }

    #[test]
    fn lzss_round_trips_repetitive_text() {
        let text = "In the beginning God created the heaven and the earth. "
            .repeat(50);
        round_trip(&LzssCompressor, text.as_bytes());
    }

    #[test]
    fn lzss_round_trips_short_and_empty() {
        round_trip(&LzssCompressor, b"");
        round_trip(&LzssCompressor, b"a");
        round_trip(&LzssCompressor, b"abcabcabcabc");
    }

    /// Wiederholtes Material muss tatsächlich schrumpfen.
    #[test]
    fn lzss_compresses_repetition() {
        let text = "and God said ".repeat(100);
        let packed = LzssCompressor.compress(text.as_bytes()).unwrap();
        assert!(packed.len() < text.len() / 2, "{} vs {}", packed.len(), text.len());
    }

    #[test]
    fn lzss_handles_binary_data() {
        let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        round_trip(&LzssCompressor, &data);
    }

    #[test]
    fn zip_round_trips() {
        let text = "καὶ εἶπεν ὁ θεός ".repeat(40);
        round_trip(&ZipCompressor::default(), text.as_bytes());
    }

    #[test]
    fn zip_level_changes_output_size_monotonically_or_equal() {
        let text = "In the beginning God created the heaven and the earth. "
            .repeat(200);
        let mut fast = ZipCompressor::default();
        fast.set_level(1);
        let mut best = ZipCompressor::default();
        best.set_level(9);
        let a = fast.compress(text.as_bytes()).unwrap();
        let b = best.compress(text.as_bytes()).unwrap();
        assert!(b.len() <= a.len());
    }

    #[test]
    fn create_rejects_missing_features() {
        #[cfg(not(feature = "bzip2"))]
        assert!(CompressType::Bzip2.create().is_err());
        #[cfg(not(feature = "xz"))]
        assert!(CompressType::Xz.create().is_err());
        assert!(CompressType::Lzss.create().is_ok());
        assert!(CompressType::Zip.create().is_ok());
    }
}
