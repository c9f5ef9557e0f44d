// Text registries (.ifo)
//
// Line 1 is the signature, line 2 the record count, then one record per line.
//   object.ifo  "JMXVOBJI1000":  <id> <hex flags> "<path>"
//   tile2d.ifo  "JMXV2DTI1001":  <id> <hex flags> "<category>" "<file>" [extra]
// Bytes outside ASCII are taken as cp1252, so no file is rejected for its
// encoding alone.

use std::collections::BTreeMap;
use std::path::Path;

use jmx_shared::error::read_file;
use jmx_shared::util::codepage;
use jmx_shared::{FormatError, Result};
use serde::{Deserialize, Serialize};

use crate::resource::normalize_path;

pub const OBJECT_SIGNATURE: &str = "JMXVOBJI1000";
pub const TILE_SIGNATURE: &str = "JMXV2DTI1001";

/// One data line with its 1-based line number and byte offset
struct Line<'a> {
    number: usize,
    offset: usize,
    text: &'a str,
}

/// Check the two header lines and hand back exactly `count` records.
fn records<'a>(text: &'a str, signature: &'static str) -> Result<Vec<Line<'a>>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for (index, raw) in text.split_inclusive('\n').enumerate() {
        lines.push(Line {
            number: index + 1,
            offset,
            text: raw.trim_end_matches(['\r', '\n']),
        });
        offset += raw.len();
    }

    let header = lines
        .first()
        .map(|l| l.text.trim_start_matches('\u{feff}').trim())
        .unwrap_or("");
    if header != signature {
        return Err(FormatError::BadSignature {
            expected: signature,
            found: header.to_string(),
        });
    }

    let count_line = lines.get(1).ok_or(FormatError::InvalidText {
        line: 2,
        detail: "missing record count".into(),
    })?;
    let count: usize = count_line.text.trim().parse().map_err(|_| FormatError::InvalidText {
        line: 2,
        detail: format!("record count {:?} is not a number", count_line.text),
    })?;

    let mut data: Vec<Line> = lines.into_iter().skip(2).collect();
    while data.last().is_some_and(|l| l.text.trim().is_empty()) {
        data.pop();
    }
    if data.len() != count {
        return Err(FormatError::RecordCountMismatch {
            offset: data.get(count).map(|l| l.offset).unwrap_or(text.len()),
            detail: format!("header declares {} records, found {}", count, data.len()),
        });
    }
    Ok(data)
}

fn parse_id(line: &Line, field: &str) -> Result<u32> {
    field.parse().map_err(|_| FormatError::InvalidText {
        line: line.number,
        detail: format!("bad id {:?}", field),
    })
}

fn parse_flags(line: &Line, field: &str) -> Result<u32> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u32::from_str_radix(digits, 16).map_err(|_| FormatError::InvalidText {
        line: line.number,
        detail: format!("bad hex flags {:?}", field),
    })
}

/// Split off the next space-separated field, `None` when the line runs out
fn next_field(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.split_once(' ') {
        Some((field, rest)) => Some((field, rest)),
        None => Some((text, "")),
    }
}

/// Split off the next quoted field, returning its contents without quotes
fn next_quoted(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start().strip_prefix('"')?;
    let end = text.find('"')?;
    Some((&text[..end], &text[end + 1..]))
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => codepage::decode(bytes),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub flags: u32,
    /// Relative to the Data root, `/` separated
    pub path: String,
}

/// object.ifo: object id to resource path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectIndex {
    pub entries: BTreeMap<u32, ObjectEntry>,
}

impl ObjectIndex {
    pub fn load(path: &Path) -> Result<ObjectIndex> {
        let bytes = read_file(path)?;
        ObjectIndex::parse(&decode_text(&bytes)).map_err(|e| e.with_path(path))
    }

    pub fn parse(text: &str) -> Result<ObjectIndex> {
        let mut entries = BTreeMap::new();
        for line in records(text, OBJECT_SIGNATURE)? {
            let invalid = |detail: &str| FormatError::InvalidText {
                line: line.number,
                detail: detail.to_string(),
            };
            let (id, rest) = next_field(line.text).ok_or_else(|| invalid("empty record"))?;
            let (flags, rest) = next_field(rest).ok_or_else(|| invalid("missing flags"))?;
            let path = rest.trim().replace('"', "");
            if path.is_empty() {
                return Err(invalid("missing path"));
            }

            let id = parse_id(&line, id)?;
            let entry = ObjectEntry {
                flags: parse_flags(&line, flags)?,
                path: normalize_path(&path),
            };
            if entries.insert(id, entry).is_some() {
                tracing::warn!("object.ifo line {}: id {} listed twice, keeping the last", line.number, id);
            }
        }
        tracing::debug!("object.ifo: {} entries", entries.len());
        Ok(ObjectIndex { entries })
    }

    pub fn get(&self, id: u32) -> Option<&ObjectEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEntry {
    pub flags: u32,
    pub category: String,
    /// Texture file name under Map/tile2d
    pub file: String,
    /// Trailing field some tiles carry (grass settings)
    pub extra: Option<String>,
}

/// tile2d.ifo: terrain texture id to texture file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TileIndex {
    pub entries: BTreeMap<u32, TileEntry>,
}

impl TileIndex {
    pub fn load(path: &Path) -> Result<TileIndex> {
        let bytes = read_file(path)?;
        TileIndex::parse(&decode_text(&bytes)).map_err(|e| e.with_path(path))
    }

    pub fn parse(text: &str) -> Result<TileIndex> {
        let mut entries = BTreeMap::new();
        for line in records(text, TILE_SIGNATURE)? {
            let invalid = |detail: &str| FormatError::InvalidText {
                line: line.number,
                detail: detail.to_string(),
            };
            let (id, rest) = next_field(line.text).ok_or_else(|| invalid("empty record"))?;
            let (flags, rest) = next_field(rest).ok_or_else(|| invalid("missing flags"))?;
            let (category, rest) = next_quoted(rest).ok_or_else(|| invalid("missing quoted category"))?;
            let (file, rest) = next_quoted(rest).ok_or_else(|| invalid("missing quoted file"))?;
            let extra = Some(rest.trim()).filter(|e| !e.is_empty()).map(str::to_string);

            let id = parse_id(&line, id)?;
            entries.insert(
                id,
                TileEntry {
                    flags: parse_flags(&line, flags)?,
                    category: category.to_string(),
                    file: file.to_string(),
                    extra,
                },
            );
        }
        tracing::debug!("tile2d.ifo: {} entries", entries.len());
        Ok(TileIndex { entries })
    }

    pub fn get(&self, id: u32) -> Option<&TileEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECTS: &str = "JMXVOBJI1000\r\n\
        3\r\n\
        00000 0x00000000 \"res\\bldg\\europe\\euro_inn01.bsr\"\r\n\
        00001 0x00000001 \"res/nature/tree 01.bsr\"\r\n\
        00017 0x0000000A \"res\\bldg\\gate.cpd\"\r\n";

    const TILES: &str = "JMXV2DTI1001\n\
        2\n\
        0 0x00000000 \"oakk\" \"oakk_dust_earth03.ddj\"\n\
        5 0x00000001 \"oakk\" \"oakk_grass01.ddj\" {grass01}\n\
        \n";

    #[test]
    fn test_object_index() {
        let index = ObjectIndex::parse(OBJECTS).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(0).unwrap().path, "res/bldg/europe/euro_inn01.bsr");
        assert_eq!(index.get(1).unwrap().path, "res/nature/tree 01.bsr");
        assert_eq!(index.get(17).unwrap().flags, 0xA);
        assert!(index.get(2).is_none());
    }

    #[test]
    fn test_tile_index() {
        let index = TileIndex::parse(TILES).unwrap();
        assert_eq!(index.len(), 2);
        let plain = index.get(0).unwrap();
        assert_eq!(plain.category, "oakk");
        assert_eq!(plain.file, "oakk_dust_earth03.ddj");
        assert_eq!(plain.extra, None);
        let grass = index.get(5).unwrap();
        assert_eq!(grass.flags, 1);
        assert_eq!(grass.extra.as_deref(), Some("{grass01}"));
    }

    #[test]
    fn test_signature_mismatch() {
        let err = ObjectIndex::parse(TILES).unwrap_err();
        assert!(matches!(
            err,
            FormatError::BadSignature {
                expected: OBJECT_SIGNATURE,
                ..
            }
        ));
    }

    #[test]
    fn test_count_mismatch() {
        let short = "JMXVOBJI1000\n2\n1 0x0 \"a.bsr\"\n";
        assert!(matches!(
            ObjectIndex::parse(short),
            Err(FormatError::RecordCountMismatch { .. })
        ));

        let long = "JMXVOBJI1000\n1\n1 0x0 \"a.bsr\"\n2 0x0 \"b.bsr\"\n";
        match ObjectIndex::parse(long) {
            Err(FormatError::RecordCountMismatch { offset, .. }) => {
                assert_eq!(&long[offset..offset + 1], "2")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_lines() {
        let bad_flags = "JMXVOBJI1000\n1\n1 zz \"a.bsr\"\n";
        assert!(matches!(
            ObjectIndex::parse(bad_flags),
            Err(FormatError::InvalidText { line: 3, .. })
        ));

        let unquoted = "JMXV2DTI1001\n1\n1 0x0 oakk \"a.ddj\"\n";
        assert!(matches!(
            TileIndex::parse(unquoted),
            Err(FormatError::InvalidText { line: 3, .. })
        ));
    }

    #[test]
    fn test_latin1_bytes() {
        let mut bytes = b"JMXVOBJI1000\n1\n4 0x0 \"res/caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b".bsr\"\n");
        let index = ObjectIndex::parse(&decode_text(&bytes)).unwrap();
        assert_eq!(index.get(4).unwrap().path, "res/caf\u{e9}.bsr");
    }
}
