// Standalone region navmesh ("JMXVNVM 1000")
//
// One file per map region. Layout after the signature:
//   u16 object count, per object:
//       u32 asset id, f32 x, f32 z, f32 y, u16 type, f32 yaw, u16 local uid,
//       u16 short value, u8 big flag, u8 struct flag, u16 region id,
//       u16 link count + count x (u16 edge, u16 object, u16 object edge)
//   u32 cell count, u32 walkable cell count, per cell:
//       2 x f32 min, 2 x f32 max, u8 object count + count x u16 object index
//   u32 global edge count, per edge (27 bytes):
//       2 x f32 a, 2 x f32 b, u8 flag, u8 src dir, u8 dst dir,
//       u16 src cell, u16 dst cell, u16 src region, u16 dst region
//   u32 internal edge count, per edge (23 bytes): same without regions
//   96 x 96 tiles: u32 cell id, u16 flags, u16 tile id
//   97 x 97 f32 heights, one every 20 units

use std::path::Path;

use jmx_shared::error::read_file;
use jmx_shared::{ByteCursor, FormatError, Result};
use serde::{Deserialize, Serialize};

use crate::navmesh::EdgeFlags;

pub const SIGNATURE: &str = "JMXVNVM 1000";
pub const TILES_PER_SIDE: usize = 96;
pub const HEIGHTS_PER_SIDE: usize = 97;
/// Distance between two heightmap samples
pub const HEIGHT_SPACING: f32 = 20.0;

const GLOBAL_EDGE_LEN: usize = 27;
const INTERNAL_EDGE_LEN: usize = 23;
const TILE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLink {
    pub edge: u16,
    pub object: u16,
    pub object_edge: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvmObject {
    pub asset_id: u32,
    pub position: [f32; 3],
    pub object_type: u16,
    pub yaw: f32,
    pub local_uid: u16,
    pub short_value: u16,
    pub big_flag: u8,
    pub struct_flag: u8,
    pub region_id: u16,
    pub links: Vec<ObjectLink>,
}

impl NvmObject {
    pub fn is_struct(&self) -> bool {
        self.struct_flag == 1
    }

    fn read_from(cursor: &mut ByteCursor) -> Result<Self> {
        let asset_id = cursor.read_u32()?;
        let position = cursor.read_vec3_xzy()?;
        let object_type = cursor.read_u16()?;
        let yaw = cursor.read_f32()?;
        let local_uid = cursor.read_u16()?;
        let short_value = cursor.read_u16()?;
        let big_flag = cursor.read_u8()?;
        let struct_flag = cursor.read_u8()?;
        let region_id = cursor.read_u16()?;

        let count = cursor.read_u16()? as usize;
        cursor.ensure(count * 6)?;
        let mut links = Vec::with_capacity(count);
        for _ in 0..count {
            links.push(ObjectLink {
                edge: cursor.read_u16()?,
                object: cursor.read_u16()?,
                object_edge: cursor.read_u16()?,
            });
        }

        Ok(NvmObject {
            asset_id,
            position,
            object_type,
            yaw,
            local_uid,
            short_value,
            big_flag,
            struct_flag,
            region_id,
            links,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor) -> Result<()> {
        cursor.write_u32(self.asset_id);
        cursor.write_vec3_xzy(self.position);
        cursor.write_u16(self.object_type);
        cursor.write_f32(self.yaw);
        cursor.write_u16(self.local_uid);
        cursor.write_u16(self.short_value);
        cursor.write_u8(self.big_flag);
        cursor.write_u8(self.struct_flag);
        cursor.write_u16(self.region_id);
        cursor.write_u16(count_u16(self.links.len(), "object links")?);
        for link in &self.links {
            cursor.write_u16(link.edge);
            cursor.write_u16(link.object);
            cursor.write_u16(link.object_edge);
        }
        Ok(())
    }
}

/// Axis-aligned terrain collision cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvmCell {
    pub min: [f32; 2],
    pub max: [f32; 2],
    pub objects: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NvmEdge {
    pub a: [f32; 2],
    pub b: [f32; 2],
    pub flags: EdgeFlags,
    pub src_direction: u8,
    pub dst_direction: u8,
    pub src_cell: u16,
    pub dst_cell: u16,
    /// Only global edges link across regions
    pub regions: Option<(u16, u16)>,
}

impl NvmEdge {
    fn read_from(cursor: &mut ByteCursor, global: bool) -> Result<Self> {
        let a = [cursor.read_f32()?, cursor.read_f32()?];
        let b = [cursor.read_f32()?, cursor.read_f32()?];
        let flags = EdgeFlags::from_bits_retain(cursor.read_u8()?);
        let src_direction = cursor.read_u8()?;
        let dst_direction = cursor.read_u8()?;
        let src_cell = cursor.read_u16()?;
        let dst_cell = cursor.read_u16()?;
        let regions = if global {
            Some((cursor.read_u16()?, cursor.read_u16()?))
        } else {
            None
        };
        Ok(NvmEdge {
            a,
            b,
            flags,
            src_direction,
            dst_direction,
            src_cell,
            dst_cell,
            regions,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor, global: bool) -> Result<()> {
        for axis in self.a.iter().chain(self.b.iter()) {
            cursor.write_f32(*axis);
        }
        cursor.write_u8(self.flags.bits());
        cursor.write_u8(self.src_direction);
        cursor.write_u8(self.dst_direction);
        cursor.write_u16(self.src_cell);
        cursor.write_u16(self.dst_cell);
        match (global, self.regions) {
            (true, Some((src, dst))) => {
                cursor.write_u16(src);
                cursor.write_u16(dst);
            }
            (false, None) => {}
            (true, None) => {
                return Err(FormatError::constraint("global terrain edge without region links"));
            }
            (false, Some(_)) => {
                return Err(FormatError::constraint("internal terrain edge with region links"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NvmTile {
    pub cell_id: u32,
    pub flags: u16,
    pub tile_id: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvmFile {
    pub objects: Vec<NvmObject>,
    pub cells: Vec<NvmCell>,
    pub walkable_cells: u32,
    pub global_edges: Vec<NvmEdge>,
    pub internal_edges: Vec<NvmEdge>,
    /// Row-major, `TILES_PER_SIDE` squared
    pub tiles: Vec<NvmTile>,
    /// Row-major, `HEIGHTS_PER_SIDE` squared
    pub heights: Vec<f32>,
}

impl NvmFile {
    pub fn load(path: &Path) -> Result<NvmFile> {
        let bytes = read_file(path)?;
        NvmFile::decode(bytes).map_err(|e| e.with_path(path))
    }

    pub fn decode(bytes: Vec<u8>) -> Result<NvmFile> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        cursor.expect_signature(SIGNATURE)?;

        let object_count = cursor.read_u16()?;
        let mut objects = Vec::with_capacity(object_count as usize);
        for _ in 0..object_count {
            objects.push(NvmObject::read_from(&mut cursor)?);
        }

        let cell_count = cursor.read_u32()? as usize;
        let walkable_cells = cursor.read_u32()?;
        if walkable_cells as usize > cell_count {
            return Err(FormatError::RecordCountMismatch {
                offset: cursor.position() - 4,
                detail: format!("{} walkable cells out of {}", walkable_cells, cell_count),
            });
        }
        cursor.ensure(cell_count * 17)?;
        let mut cells = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            let min = [cursor.read_f32()?, cursor.read_f32()?];
            let max = [cursor.read_f32()?, cursor.read_f32()?];
            let count = cursor.read_u8()?;
            let mut indices = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let index = cursor.read_u16()?;
                if index as usize >= objects.len() {
                    return Err(FormatError::InvalidReference {
                        what: "nvm object",
                        index: index as usize,
                        limit: objects.len(),
                    });
                }
                indices.push(index);
            }
            cells.push(NvmCell {
                min,
                max,
                objects: indices,
            });
        }

        let global_edges = read_edges(&mut cursor, true)?;
        let internal_edges = read_edges(&mut cursor, false)?;

        cursor.ensure(TILES_PER_SIDE * TILES_PER_SIDE * TILE_LEN)?;
        let mut tiles = Vec::with_capacity(TILES_PER_SIDE * TILES_PER_SIDE);
        for _ in 0..TILES_PER_SIDE * TILES_PER_SIDE {
            tiles.push(NvmTile {
                cell_id: cursor.read_u32()?,
                flags: cursor.read_u16()?,
                tile_id: cursor.read_u16()?,
            });
        }

        cursor.ensure(HEIGHTS_PER_SIDE * HEIGHTS_PER_SIDE * 4)?;
        let mut heights = Vec::with_capacity(HEIGHTS_PER_SIDE * HEIGHTS_PER_SIDE);
        for _ in 0..HEIGHTS_PER_SIDE * HEIGHTS_PER_SIDE {
            heights.push(cursor.read_f32()?);
        }

        if cursor.remaining() != 0 {
            tracing::debug!("nvm: {} trailing byte(s) ignored", cursor.remaining());
        }

        tracing::debug!(
            "nvm: {} objects, {} cells ({} walkable), {} global / {} internal edges",
            objects.len(),
            cells.len(),
            walkable_cells,
            global_edges.len(),
            internal_edges.len()
        );

        Ok(NvmFile {
            objects,
            cells,
            walkable_cells,
            global_edges,
            internal_edges,
            tiles,
            heights,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.tiles.len() != TILES_PER_SIDE * TILES_PER_SIDE {
            return Err(FormatError::constraint(format!(
                "nvm tile map has {} entries, expected {}",
                self.tiles.len(),
                TILES_PER_SIDE * TILES_PER_SIDE
            )));
        }
        if self.heights.len() != HEIGHTS_PER_SIDE * HEIGHTS_PER_SIDE {
            return Err(FormatError::constraint(format!(
                "nvm heightmap has {} samples, expected {}",
                self.heights.len(),
                HEIGHTS_PER_SIDE * HEIGHTS_PER_SIDE
            )));
        }

        let mut cursor = ByteCursor::new();
        cursor.write_fixed_string(SIGNATURE)?;

        cursor.write_u16(count_u16(self.objects.len(), "nvm objects")?);
        for object in &self.objects {
            object.write_to(&mut cursor)?;
        }

        cursor.write_u32(self.cells.len() as u32);
        cursor.write_u32(self.walkable_cells);
        for cell in &self.cells {
            for axis in cell.min.iter().chain(cell.max.iter()) {
                cursor.write_f32(*axis);
            }
            let count = u8::try_from(cell.objects.len()).map_err(|_| {
                FormatError::constraint(format!("terrain cell lists {} objects", cell.objects.len()))
            })?;
            cursor.write_u8(count);
            for index in &cell.objects {
                cursor.write_u16(*index);
            }
        }

        for (edges, global) in [(&self.global_edges, true), (&self.internal_edges, false)] {
            cursor.write_u32(edges.len() as u32);
            for edge in edges {
                edge.write_to(&mut cursor, global)?;
            }
        }

        for tile in &self.tiles {
            cursor.write_u32(tile.cell_id);
            cursor.write_u16(tile.flags);
            cursor.write_u16(tile.tile_id);
        }
        for height in &self.heights {
            cursor.write_f32(*height);
        }
        Ok(cursor.into_inner())
    }

    pub fn tile(&self, column: usize, row: usize) -> Option<&NvmTile> {
        if column >= TILES_PER_SIDE || row >= TILES_PER_SIDE {
            return None;
        }
        self.tiles.get(row * TILES_PER_SIDE + column)
    }

    /// Heightmap sample as a local (x, y, height) point
    pub fn height_point(&self, column: usize, row: usize) -> Option<[f32; 3]> {
        if column >= HEIGHTS_PER_SIDE || row >= HEIGHTS_PER_SIDE {
            return None;
        }
        let height = *self.heights.get(row * HEIGHTS_PER_SIDE + column)?;
        Some([
            column as f32 * HEIGHT_SPACING,
            row as f32 * HEIGHT_SPACING,
            height,
        ])
    }

    pub fn walkable(&self) -> &[NvmCell] {
        &self.cells[..(self.walkable_cells as usize).min(self.cells.len())]
    }
}

fn read_edges(cursor: &mut ByteCursor, global: bool) -> Result<Vec<NvmEdge>> {
    let count = cursor.read_u32()? as usize;
    let len = if global {
        GLOBAL_EDGE_LEN
    } else {
        INTERNAL_EDGE_LEN
    };
    cursor.ensure(count * len)?;
    let mut edges = Vec::with_capacity(count);
    for _ in 0..count {
        edges.push(NvmEdge::read_from(cursor, global)?);
    }
    Ok(edges)
}

fn count_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| FormatError::constraint(format!("{} {} exceed a u16 count", len, what)))
}

/// Region id from a file stem ending in the hex pair `YYXX`, as in `nv_5a64`.
pub fn region_from_stem(stem: &str) -> Option<u16> {
    let hex = stem.get(stem.len().checked_sub(4)?..)?;
    let ry = u8::from_str_radix(hex.get(..2)?, 16).ok()?;
    let rx = u8::from_str_radix(hex.get(2..)?, 16).ok()?;
    Some(((ry as u16) << 8) | rx as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NvmFile {
        NvmFile {
            objects: vec![NvmObject {
                asset_id: 77,
                position: [120.0, 340.0, 8.5],
                object_type: 0,
                yaw: 0.5,
                local_uid: 3,
                short_value: 0xFFFF,
                big_flag: 0,
                struct_flag: 1,
                region_id: 0x5A64,
                links: vec![ObjectLink {
                    edge: 4,
                    object: 0,
                    object_edge: 9,
                }],
            }],
            cells: vec![
                NvmCell {
                    min: [0.0, 0.0],
                    max: [960.0, 960.0],
                    objects: vec![0],
                },
                NvmCell {
                    min: [960.0, 0.0],
                    max: [1920.0, 960.0],
                    objects: vec![],
                },
            ],
            walkable_cells: 1,
            global_edges: vec![NvmEdge {
                a: [0.0, 0.0],
                b: [0.0, 960.0],
                flags: EdgeFlags::GLOBAL,
                src_direction: 3,
                dst_direction: 1,
                src_cell: 0,
                dst_cell: 12,
                regions: Some((0x5A64, 0x5A63)),
            }],
            internal_edges: vec![NvmEdge {
                a: [960.0, 0.0],
                b: [960.0, 960.0],
                flags: EdgeFlags::INTERNAL | EdgeFlags::LOCKED_INSIDE,
                src_direction: 1,
                dst_direction: 3,
                src_cell: 0,
                dst_cell: 1,
                regions: None,
            }],
            tiles: vec![NvmTile::default(); TILES_PER_SIDE * TILES_PER_SIDE],
            heights: (0..HEIGHTS_PER_SIDE * HEIGHTS_PER_SIDE).map(|i| i as f32 * 0.25).collect(),
        }
    }

    #[test]
    fn test_record_sizes() {
        let bytes = sample().encode().unwrap();
        let expected = 12
            + 2 + (4 + 12 + 2 + 4 + 2 + 2 + 1 + 1 + 2 + 2 + 6)
            + 8 + (17 + 2) + 17
            + 4 + GLOBAL_EDGE_LEN
            + 4 + INTERNAL_EDGE_LEN
            + TILES_PER_SIDE * TILES_PER_SIDE * TILE_LEN
            + HEIGHTS_PER_SIDE * HEIGHTS_PER_SIDE * 4;
        assert_eq!(bytes.len(), expected);
    }

    #[test]
    fn test_decode_encode() {
        let file = sample();
        let bytes = file.encode().unwrap();
        let back = NvmFile::decode(bytes.clone()).unwrap();
        assert_eq!(back, file);
        assert_eq!(back.encode().unwrap(), bytes);
        assert!(back.objects[0].is_struct());
        assert_eq!(back.walkable().len(), 1);
        assert_eq!(back.height_point(2, 1), Some([40.0, 20.0, (97 + 2) as f32 * 0.25]));
        assert_eq!(back.height_point(97, 0), None);
    }

    #[test]
    fn test_bad_object_index() {
        let mut file = sample();
        file.cells[1].objects.push(5);
        let err = NvmFile::decode(file.encode().unwrap()).unwrap_err();
        assert!(matches!(err, FormatError::InvalidReference { index: 5, limit: 1, .. }));
    }

    #[test]
    fn test_truncated_heightmap() {
        let mut bytes = sample().encode().unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            NvmFile::decode(bytes),
            Err(FormatError::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn test_signature() {
        let mut bytes = sample().encode().unwrap();
        bytes[11] = b'1';
        assert!(matches!(
            NvmFile::decode(bytes),
            Err(FormatError::BadSignature { .. })
        ));
    }

    #[test]
    fn test_region_from_stem() {
        assert_eq!(region_from_stem("nv_5a64"), Some(0x5A64));
        assert_eq!(region_from_stem("nv_6096"), Some(0x6096));
        assert_eq!(region_from_stem("64"), None);
        assert_eq!(region_from_stem("nv_zz01"), None);
    }
}
