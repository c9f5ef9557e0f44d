// Windows-1252 text codec
//
// Every fixed-codepage string in the JMXV formats is single-byte Western.
// Bytes 0x00-0x7F and 0xA0-0xFF map straight to the same code point; the
// 0x80-0x9F block carries the typographic extras below. The five holes in
// that block decode to their C1 control code points so nothing is lost.

use crate::error::{FormatError, Result};

const HIGH_BLOCK: [u16; 32] = [
    0x20AC, 0x0081, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, //
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0x008D, 0x017D, 0x008F, //
    0x0090, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, //
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0x009D, 0x017E, 0x0178, //
];

pub fn decode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => char::from_u32(HIGH_BLOCK[(b - 0x80) as usize] as u32).unwrap_or('\u{FFFD}'),
            _ => b as char,
        })
        .collect()
}

pub fn encode_char(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x00..=0x7F | 0xA0..=0xFF => Some(code as u8),
        _ => HIGH_BLOCK
            .iter()
            .position(|&mapped| mapped as u32 == code)
            .map(|idx| 0x80 + idx as u8),
    }
}

pub fn encode(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            encode_char(c).ok_or_else(|| {
                FormatError::constraint(format!(
                    "character {:?} (U+{:04X}) in {:?} is not representable in code page 1252",
                    c, c as u32, text
                ))
            })
        })
        .collect()
}
