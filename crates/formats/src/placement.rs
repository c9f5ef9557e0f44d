// Object placement files (.o / .o2)
//
// 12-byte header, then 36 map cells visited column-major (column outer,
// row inner). Each cell has 4 LOD buckets; a bucket is a u16 count followed
// by that many entries:
//   u32 object id, 3 x f32 position, u16 static flag, f32 yaw, u16 unique id,
//   u16 secondary value, u8 big flag, u8 struct flag [, u16 region id in .o2]
//
// The two variants cannot be told apart from the bytes, so the caller picks
// one. Reading with the wrong variant ends in a truncation or leftover bytes.

use std::path::Path;

use jmx_shared::error::read_file;
use jmx_shared::{ByteCursor, FormatError, Result};
use serde::{Deserialize, Serialize};

pub const HEADER_LEN: usize = 12;
pub const CELLS_PER_SIDE: u8 = 6;
pub const LOD_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementVariant {
    /// `.o`: no region id per entry
    Plain,
    /// `.o2`: trailing u16 region id per entry
    WithRegion,
}

impl PlacementVariant {
    pub fn entry_len(&self) -> usize {
        match self {
            PlacementVariant::Plain => 28,
            PlacementVariant::WithRegion => 30,
        }
    }

    /// Variant implied by a file extension, `None` for anything else
    pub fn from_path(path: &Path) -> Option<PlacementVariant> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "o" => Some(PlacementVariant::Plain),
            "o2" => Some(PlacementVariant::WithRegion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementEntry {
    /// Key into object.ifo
    pub object_id: u32,
    /// Local to the region
    pub position: [f32; 3],
    pub static_flag: u16,
    pub yaw: f32,
    pub unique_id: u16,
    pub short_value: u16,
    pub big_flag: u8,
    pub struct_flag: u8,
    pub region_id: Option<u16>,
}

impl PlacementEntry {
    pub fn is_static(&self) -> bool {
        self.static_flag != 0
    }

    pub fn is_big(&self) -> bool {
        self.big_flag != 0
    }

    pub fn is_struct(&self) -> bool {
        self.struct_flag != 0
    }

    fn read_from(cursor: &mut ByteCursor, variant: PlacementVariant) -> Result<Self> {
        cursor.ensure(variant.entry_len())?;
        let object_id = cursor.read_u32()?;
        let position = [cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?];
        let static_flag = cursor.read_u16()?;
        let yaw = cursor.read_f32()?;
        let unique_id = cursor.read_u16()?;
        let short_value = cursor.read_u16()?;
        let big_flag = cursor.read_u8()?;
        let struct_flag = cursor.read_u8()?;
        let region_id = match variant {
            PlacementVariant::Plain => None,
            PlacementVariant::WithRegion => Some(cursor.read_u16()?),
        };
        Ok(PlacementEntry {
            object_id,
            position,
            static_flag,
            yaw,
            unique_id,
            short_value,
            big_flag,
            struct_flag,
            region_id,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor, variant: PlacementVariant) -> Result<()> {
        let region_id = match (variant, self.region_id) {
            (PlacementVariant::Plain, None) => None,
            (PlacementVariant::WithRegion, Some(region)) => Some(region),
            (PlacementVariant::Plain, Some(_)) => {
                return Err(FormatError::constraint(format!(
                    "object {} carries a region id, .o entries have none",
                    self.object_id
                )));
            }
            (PlacementVariant::WithRegion, None) => {
                return Err(FormatError::constraint(format!(
                    "object {} has no region id, required in .o2 entries",
                    self.object_id
                )));
            }
        };

        cursor.write_u32(self.object_id);
        for axis in self.position {
            cursor.write_f32(axis);
        }
        cursor.write_u16(self.static_flag);
        cursor.write_f32(self.yaw);
        cursor.write_u16(self.unique_id);
        cursor.write_u16(self.short_value);
        cursor.write_u8(self.big_flag);
        cursor.write_u8(self.struct_flag);
        if let Some(region) = region_id {
            cursor.write_u16(region);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlacementCell {
    pub column: u8,
    pub row: u8,
    pub lods: [Vec<PlacementEntry>; LOD_COUNT],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementFile {
    pub header: [u8; HEADER_LEN],
    pub variant: PlacementVariant,
    /// In file order: column-major
    pub cells: Vec<PlacementCell>,
}

impl PlacementFile {
    /// Load with the variant implied by the extension, or `variant` if given.
    pub fn load(path: &Path, variant: Option<PlacementVariant>) -> Result<PlacementFile> {
        let variant = variant
            .or_else(|| PlacementVariant::from_path(path))
            .ok_or_else(|| {
                FormatError::constraint(format!(
                    "cannot tell .o from .o2 for {}",
                    path.display()
                ))
            })?;
        let bytes = read_file(path)?;
        PlacementFile::decode(bytes, variant).map_err(|e| e.with_path(path))
    }

    pub fn decode(bytes: Vec<u8>, variant: PlacementVariant) -> Result<PlacementFile> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&cursor.read_bytes(HEADER_LEN)?);

        let mut cells = Vec::with_capacity(CELLS_PER_SIDE as usize * CELLS_PER_SIDE as usize);
        for column in 0..CELLS_PER_SIDE {
            for row in 0..CELLS_PER_SIDE {
                let mut cell = PlacementCell {
                    column,
                    row,
                    ..PlacementCell::default()
                };
                for lod in cell.lods.iter_mut() {
                    let count = cursor.read_u16()?;
                    cursor.ensure(count as usize * variant.entry_len())?;
                    for _ in 0..count {
                        lod.push(PlacementEntry::read_from(&mut cursor, variant)?);
                    }
                }
                cells.push(cell);
            }
        }

        if cursor.remaining() != 0 {
            return Err(FormatError::RecordCountMismatch {
                offset: cursor.position(),
                detail: format!(
                    "{} byte(s) left after all placement cells; wrong .o/.o2 variant?",
                    cursor.remaining()
                ),
            });
        }

        let file = PlacementFile {
            header,
            variant,
            cells,
        };
        tracing::trace!("placement file: {} entries", file.entries().count());
        Ok(file)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let expected = CELLS_PER_SIDE as usize * CELLS_PER_SIDE as usize;
        if self.cells.len() != expected {
            return Err(FormatError::constraint(format!(
                "placement file has {} cells, expected {}",
                self.cells.len(),
                expected
            )));
        }

        let mut cursor = ByteCursor::new();
        cursor.write_bytes(&self.header);
        for cell in &self.cells {
            for lod in &cell.lods {
                if lod.len() > u16::MAX as usize {
                    return Err(FormatError::constraint(format!(
                        "cell ({}, {}) has {} entries in one LOD",
                        cell.column,
                        cell.row,
                        lod.len()
                    )));
                }
                cursor.write_u16(lod.len() as u16);
                for entry in lod {
                    entry.write_to(&mut cursor, self.variant)?;
                }
            }
        }
        Ok(cursor.into_inner())
    }

    /// Every entry with its cell and LOD
    pub fn entries(&self) -> impl Iterator<Item = (&PlacementCell, usize, &PlacementEntry)> {
        self.cells.iter().flat_map(|cell| {
            cell.lods
                .iter()
                .enumerate()
                .flat_map(move |(lod, entries)| entries.iter().map(move |e| (cell, lod, e)))
        })
    }
}
