//! MacRoman text coding and the login obfuscation transform.
//!
//! Hotline strings travel as MacRoman bytes with `\r` line endings. Decoding
//! is total (every byte maps to a scalar); encoding falls back to raw UTF-8
//! bytes for text outside the MacRoman repertoire so that such strings still
//! round-trip through the opaque-bytes path. Login and password fields use a
//! byte-wise complement (XOR `0xFF`) on top of the string coding.

#![expect(
    clippy::indexing_slicing,
    reason = "table lookups are bounded by the byte range"
)]

use std::{collections::HashMap, sync::OnceLock};

use crate::config::StringEncoding;

/// Upper half of the MacRoman table: byte `0x80 + i` maps to `HIGH_TABLE[i]`.
const HIGH_TABLE: [char; 128] = [
    '\u{C4}', '\u{C5}', '\u{C7}', '\u{C9}', '\u{D1}', '\u{D6}', '\u{DC}', '\u{E1}', '\u{E0}',
    '\u{E2}', '\u{E4}', '\u{E3}', '\u{E5}', '\u{E7}', '\u{E9}', '\u{E8}', '\u{EA}', '\u{EB}',
    '\u{ED}', '\u{EC}', '\u{EE}', '\u{EF}', '\u{F1}', '\u{F3}', '\u{F2}', '\u{F4}', '\u{F6}',
    '\u{F5}', '\u{FA}', '\u{F9}', '\u{FB}', '\u{FC}', '\u{2020}', '\u{B0}', '\u{A2}', '\u{A3}',
    '\u{A7}', '\u{2022}', '\u{B6}', '\u{DF}', '\u{AE}', '\u{A9}', '\u{2122}', '\u{B4}',
    '\u{A8}', '\u{2260}', '\u{C6}', '\u{D8}', '\u{221E}', '\u{B1}', '\u{2264}', '\u{2265}',
    '\u{A5}', '\u{B5}', '\u{2202}', '\u{2211}', '\u{220F}', '\u{3C0}', '\u{222B}', '\u{AA}',
    '\u{BA}', '\u{3A9}', '\u{E6}', '\u{F8}', '\u{BF}', '\u{A1}', '\u{AC}', '\u{221A}',
    '\u{192}', '\u{2248}', '\u{2206}', '\u{AB}', '\u{BB}', '\u{2026}', '\u{A0}', '\u{C0}',
    '\u{C3}', '\u{D5}', '\u{152}', '\u{153}', '\u{2013}', '\u{2014}', '\u{201C}', '\u{201D}',
    '\u{2018}', '\u{2019}', '\u{F7}', '\u{25CA}', '\u{FF}', '\u{178}', '\u{2044}', '\u{20AC}',
    '\u{2039}', '\u{203A}', '\u{FB01}', '\u{FB02}', '\u{2021}', '\u{B7}', '\u{201A}',
    '\u{201E}', '\u{2030}', '\u{C2}', '\u{CA}', '\u{C1}', '\u{CB}', '\u{C8}', '\u{CD}',
    '\u{CE}', '\u{CF}', '\u{CC}', '\u{D3}', '\u{D4}', '\u{F8FF}', '\u{D2}', '\u{DA}',
    '\u{DB}', '\u{D9}', '\u{131}', '\u{2C6}', '\u{2DC}', '\u{AF}', '\u{2D8}', '\u{2D9}',
    '\u{2DA}', '\u{B8}', '\u{2DD}', '\u{2DB}', '\u{2C7}',
];

fn reverse_table() -> &'static HashMap<char, u8> {
    static REVERSE: OnceLock<HashMap<char, u8>> = OnceLock::new();
    REVERSE.get_or_init(|| {
        HIGH_TABLE
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, 0x80 + i as u8))
            .collect()
    })
}

/// Decode MacRoman bytes into a string.
///
/// Every byte maps to exactly one scalar, so this function is total.
#[must_use]
pub fn decode_macroman(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                char::from(b)
            } else {
                HIGH_TABLE[usize::from(b - 0x80)]
            }
        })
        .collect()
}

/// Encode a string as MacRoman bytes.
///
/// Returns `None` if any scalar falls outside the MacRoman repertoire.
#[must_use]
pub fn encode_macroman(text: &str) -> Option<Vec<u8>> {
    let reverse = reverse_table();
    text.chars()
        .map(|c| {
            if c.is_ascii() {
                Some(c as u8)
            } else {
                reverse.get(&c).copied()
            }
        })
        .collect()
}

/// Encode a string for the wire: MacRoman when representable, UTF-8 otherwise.
#[must_use]
pub fn encode_text(text: &str) -> Vec<u8> {
    encode_macroman(text).unwrap_or_else(|| text.as_bytes().to_vec())
}

/// Encode a string under the configured wire encoding.
#[must_use]
pub fn encode_text_as(text: &str, encoding: StringEncoding) -> Vec<u8> {
    match encoding {
        StringEncoding::MacRoman => encode_text(text),
        StringEncoding::Utf8 => text.as_bytes().to_vec(),
    }
}

/// Decode wire bytes into text.
///
/// ASCII decodes directly. Other byte sequences that form valid UTF-8 are
/// assumed to come from a UTF-8 peer; everything else is MacRoman.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> String {
    if bytes.is_ascii() {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    std::str::from_utf8(bytes).map_or_else(|_| decode_macroman(bytes), str::to_owned)
}

/// Convert classic Mac `\r` line endings into `\n` for rendering.
///
/// Wire bytes are never touched; only the rendered string changes.
#[must_use]
pub fn render_line_breaks(text: &str) -> String { text.replace('\r', "\n") }

/// Apply the byte-wise complement used for login and password fields.
///
/// The transform is its own inverse.
#[must_use]
pub fn negate(bytes: &[u8]) -> Vec<u8> { bytes.iter().map(|b| !b).collect() }

/// Encode a credential string: text coding followed by the complement.
#[must_use]
pub fn encode_negated(text: &str) -> Vec<u8> { negate(&encode_text(text)) }

/// Decode a complemented credential field back into text.
#[must_use]
pub fn decode_negated(bytes: &[u8]) -> String { decode_text(&negate(bytes)) }

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("plain ascii", b"plain ascii".as_slice())]
    #[case("caf\u{E9}", b"caf\x8E".as_slice())]
    #[case("\u{2020}\u{F8FF}", b"\xA0\xF0".as_slice())]
    fn encodes_known_strings(#[case] text: &str, #[case] wire: &[u8]) {
        assert_eq!(encode_macroman(text).as_deref(), Some(wire));
        assert_eq!(decode_macroman(wire), text);
    }

    #[test]
    fn repertoire_misses_encode_as_utf8() {
        let text = "\u{65E5}\u{672C}";
        assert_eq!(encode_macroman(text), None);
        assert_eq!(encode_text(text), text.as_bytes());
        assert_eq!(decode_text(text.as_bytes()), text);
    }

    #[test]
    fn negation_is_involutive() {
        let wire = encode_negated("guest");
        assert_ne!(wire, b"guest");
        assert_eq!(decode_negated(&wire), "guest");
    }

    #[test]
    fn line_breaks_render_as_lf() {
        assert_eq!(render_line_breaks("a\rb\rc"), "a\nb\nc");
    }

    proptest! {
        #[test]
        fn macroman_repertoire_round_trips(indices in proptest::collection::vec(any::<u8>(), 0..64)) {
            let text: String = indices
                .iter()
                .map(|&i| {
                    if i < 0x80 {
                        char::from(i)
                    } else {
                        HIGH_TABLE[usize::from(i - 0x80)]
                    }
                })
                .collect();
            let wire = encode_macroman(&text).expect("repertoire strings encode");
            prop_assert_eq!(decode_macroman(&wire), text);
        }

        #[test]
        fn negate_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            prop_assert_eq!(negate(&negate(&bytes)), bytes);
        }
    }
}
