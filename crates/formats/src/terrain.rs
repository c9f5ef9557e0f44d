// Terrain height/tile files (.m)
//
// 12-byte header, then exactly 36 blocks laid out 6 x 6 (block i sits at
// column i % 6, row i / 6). Each block:
//   u32 flag, u16 environment id
//   17 x 17 vertices: f32 height, u16 packed texture, u8 brightness
//   i8 water type (-1 none), u8 wave type, f32 water height
//   16 x 16 u16 tile indices
//   f32 max height, f32 min height, 20 reserved bytes
//
// The packed texture field keeps the texture id in its low bits and an
// integer scale above bit 10.

use std::collections::BTreeSet;
use std::path::Path;

use jmx_shared::error::read_file;
use jmx_shared::{ByteCursor, FormatError, Result};
use serde::{Deserialize, Serialize};

pub const HEADER_LEN: usize = 12;
pub const BLOCK_COUNT: usize = 36;
pub const BLOCKS_PER_SIDE: usize = 6;
pub const VERTICES_PER_SIDE: usize = 17;
pub const TILES_PER_SIDE: usize = 16;
const RESERVED_LEN: usize = 20;

const VERTEX_LEN: usize = 4 + 2 + 1;
/// Encoded size of one block
pub const BLOCK_LEN: usize = 4
    + 2
    + VERTICES_PER_SIDE * VERTICES_PER_SIDE * VERTEX_LEN
    + 1
    + 1
    + 4
    + TILES_PER_SIDE * TILES_PER_SIDE * 2
    + 4
    + 4
    + RESERVED_LEN;

const TEXTURE_SCALE_SHIFT: u32 = 10;

/// Which bits of the packed texture field hold the texture id.
///
/// `Standard` is the 10-bit layout; `Legacy` is the wider 0xFFFFF mask one
/// older reader used. Pick per data set, there is no marker in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureMask {
    #[default]
    Standard,
    Legacy,
}

impl TextureMask {
    pub fn bits(&self) -> u32 {
        match self {
            TextureMask::Standard => 0x3FF,
            TextureMask::Legacy => 0xF_FFFF,
        }
    }

    /// Accepts "10bit"/"standard" and "20bit"/"legacy", or the mask itself.
    pub fn parse(text: &str) -> Option<TextureMask> {
        match text.trim().to_ascii_lowercase().as_str() {
            "10bit" | "standard" | "0x3ff" => Some(TextureMask::Standard),
            "20bit" | "legacy" | "0xfffff" | "0x000fffff" => Some(TextureMask::Legacy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TerrainVertex {
    pub height: f32,
    /// Packed texture id and scale
    pub texture: u16,
    pub brightness: u8,
}

impl TerrainVertex {
    pub fn texture_id(&self, mask: TextureMask) -> u32 {
        self.texture as u32 & mask.bits()
    }

    pub fn texture_scale(&self) -> u32 {
        self.texture as u32 >> TEXTURE_SCALE_SHIFT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainBlock {
    /// 0 = visible, 1 = culled
    pub flag: u32,
    pub environment_id: u16,
    /// Row-major, 17 x 17
    pub vertices: Vec<TerrainVertex>,
    /// -1 = none, 0 = water, 1 = ice
    pub water_type: i8,
    pub water_wave_type: u8,
    pub water_height: f32,
    /// Row-major, 16 x 16
    pub tiles: Vec<u16>,
    pub height_max: f32,
    pub height_min: f32,
    pub reserved: [u8; RESERVED_LEN],
}

impl Default for TerrainBlock {
    fn default() -> Self {
        TerrainBlock {
            flag: 0,
            environment_id: 0,
            vertices: vec![TerrainVertex::default(); VERTICES_PER_SIDE * VERTICES_PER_SIDE],
            water_type: -1,
            water_wave_type: 0,
            water_height: 0.0,
            tiles: vec![0; TILES_PER_SIDE * TILES_PER_SIDE],
            height_max: 0.0,
            height_min: 0.0,
            reserved: [0; RESERVED_LEN],
        }
    }
}

impl TerrainBlock {
    pub fn has_water(&self) -> bool {
        self.water_type >= 0
    }

    pub fn vertex(&self, column: usize, row: usize) -> Option<&TerrainVertex> {
        if column >= VERTICES_PER_SIDE || row >= VERTICES_PER_SIDE {
            return None;
        }
        self.vertices.get(row * VERTICES_PER_SIDE + column)
    }

    fn read_from(cursor: &mut ByteCursor) -> Result<Self> {
        cursor.ensure(BLOCK_LEN)?;
        let flag = cursor.read_u32()?;
        let environment_id = cursor.read_u16()?;

        let mut vertices = Vec::with_capacity(VERTICES_PER_SIDE * VERTICES_PER_SIDE);
        for _ in 0..VERTICES_PER_SIDE * VERTICES_PER_SIDE {
            vertices.push(TerrainVertex {
                height: cursor.read_f32()?,
                texture: cursor.read_u16()?,
                brightness: cursor.read_u8()?,
            });
        }

        let water_type = cursor.read_i8()?;
        let water_wave_type = cursor.read_u8()?;
        let water_height = cursor.read_f32()?;

        let mut tiles = Vec::with_capacity(TILES_PER_SIDE * TILES_PER_SIDE);
        for _ in 0..TILES_PER_SIDE * TILES_PER_SIDE {
            tiles.push(cursor.read_u16()?);
        }

        let height_max = cursor.read_f32()?;
        let height_min = cursor.read_f32()?;
        let mut reserved = [0u8; RESERVED_LEN];
        reserved.copy_from_slice(&cursor.read_bytes(RESERVED_LEN)?);

        Ok(TerrainBlock {
            flag,
            environment_id,
            vertices,
            water_type,
            water_wave_type,
            water_height,
            tiles,
            height_max,
            height_min,
            reserved,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor) -> Result<()> {
        if self.vertices.len() != VERTICES_PER_SIDE * VERTICES_PER_SIDE {
            return Err(FormatError::constraint(format!(
                "terrain block has {} vertices, expected {}",
                self.vertices.len(),
                VERTICES_PER_SIDE * VERTICES_PER_SIDE
            )));
        }
        if self.tiles.len() != TILES_PER_SIDE * TILES_PER_SIDE {
            return Err(FormatError::constraint(format!(
                "terrain block has {} tiles, expected {}",
                self.tiles.len(),
                TILES_PER_SIDE * TILES_PER_SIDE
            )));
        }

        cursor.write_u32(self.flag);
        cursor.write_u16(self.environment_id);
        for v in &self.vertices {
            cursor.write_f32(v.height);
            cursor.write_u16(v.texture);
            cursor.write_u8(v.brightness);
        }
        cursor.write_i8(self.water_type);
        cursor.write_u8(self.water_wave_type);
        cursor.write_f32(self.water_height);
        for &tile in &self.tiles {
            cursor.write_u16(tile);
        }
        cursor.write_f32(self.height_max);
        cursor.write_f32(self.height_min);
        cursor.write_bytes(&self.reserved);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainFile {
    /// Kept verbatim; readers do not check it
    pub header: [u8; HEADER_LEN],
    pub blocks: Vec<TerrainBlock>,
}

impl TerrainFile {
    pub fn load(path: &Path) -> Result<TerrainFile> {
        let bytes = read_file(path)?;
        TerrainFile::decode(bytes).map_err(|e| e.with_path(path))
    }

    pub fn decode(bytes: Vec<u8>) -> Result<TerrainFile> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&cursor.read_bytes(HEADER_LEN)?);

        let mut blocks = Vec::with_capacity(BLOCK_COUNT);
        for _ in 0..BLOCK_COUNT {
            blocks.push(TerrainBlock::read_from(&mut cursor)?);
        }
        if cursor.remaining() != 0 {
            return Err(FormatError::RecordCountMismatch {
                offset: cursor.position(),
                detail: format!(
                    "{} byte(s) after {} terrain blocks",
                    cursor.remaining(),
                    BLOCK_COUNT
                ),
            });
        }
        Ok(TerrainFile { header, blocks })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.blocks.len() != BLOCK_COUNT {
            return Err(FormatError::constraint(format!(
                "terrain file has {} blocks, expected {}",
                self.blocks.len(),
                BLOCK_COUNT
            )));
        }
        let mut cursor = ByteCursor::with_capacity(HEADER_LEN + BLOCK_COUNT * BLOCK_LEN);
        cursor.write_bytes(&self.header);
        for block in &self.blocks {
            block.write_to(&mut cursor)?;
        }
        Ok(cursor.into_inner())
    }

    /// (column, row) of block `index` inside the region
    pub fn block_position(index: usize) -> (usize, usize) {
        (index % BLOCKS_PER_SIDE, index / BLOCKS_PER_SIDE)
    }

    pub fn texture_ids(&self, mask: TextureMask) -> BTreeSet<u32> {
        self.blocks
            .iter()
            .flat_map(|b| b.vertices.iter())
            .map(|v| v.texture_id(mask))
            .collect()
    }

    /// Lowest and highest vertex height over all blocks
    pub fn height_range(&self) -> Option<(f32, f32)> {
        self.blocks
            .iter()
            .flat_map(|b| b.vertices.iter())
            .map(|v| v.height)
            .fold(None, |range, h| match range {
                None => Some((h, h)),
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
            })
    }
}

/// Region coordinates of a map file laid out as `<row>/<column>.<ext>`.
pub fn region_of(path: &Path) -> Option<(u8, u8)> {
    let column = path.file_stem()?.to_str()?.parse().ok()?;
    let row = path.parent()?.file_name()?.to_str()?.parse().ok()?;
    Some((column, row))
}
