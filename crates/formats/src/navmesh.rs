// Embedded navmesh block of a BMS mesh
//
// Layout (all little-endian):
//   u32 vertex count, then per vertex: f32 x, f32 z, f32 y, u8 normal byte
//   u32 cell count, then per cell: 3 x u16 vertex, u16 flag [+ u8 if CELL_EXTRA_BYTE]
//   u32 global edge count, then per edge: u16 a, u16 b, u16 src cell, u16 dst cell,
//       u8 flag [+ u8 if EDGE_EXTRA_BYTE]
//   u32 internal edge count, same record
//   [u32 event count + strings if EVENTS]
//   lookup grid: f32 origin x, f32 origin y, u32 width, u32 height, u32 cell count,
//       then per square (row-major): u32 count + count x u16 global edge index

use std::collections::BTreeMap;

use bitflags::bitflags;
use jmx_shared::{ByteCursor, FormatError, Result};
use serde::{Deserialize, Serialize};

use crate::edge_key::EdgeKey;
use crate::geometry::{self, LookupGrid, Point2, Topology};

/// Destination cell written for a global edge.
const NO_CELL: u16 = 0xFFFF;

bitflags! {
    /// Header bits that gate optional navmesh bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct NavFlags: u32 {
        const EDGE_EXTRA_BYTE = 0x01;
        const CELL_EXTRA_BYTE = 0x02;
        const EVENTS = 0x04;
    }
}

bitflags! {
    /// Collision edge options. GLOBAL/INTERNAL are re-derived on write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EdgeFlags: u8 {
        const LOCKED_INSIDE = 0x01;
        const LOCKED_OUTSIDE = 0x02;
        const INTERNAL = 0x04;
        const GLOBAL = 0x08;
        const UNDERPASS = 0x10;
        const ENTRANCE = 0x20;
        const UNKNOWN = 0x40;
        const SIEGE = 0x80;
    }
}

impl EdgeFlags {
    pub fn is_locked(&self) -> bool {
        self.intersects(EdgeFlags::LOCKED_INSIDE | EdgeFlags::LOCKED_OUTSIDE)
    }

    /// User-editable bits with the topology class replaced.
    pub fn with_class(self, global: bool) -> EdgeFlags {
        let options = self - (EdgeFlags::INTERNAL | EdgeFlags::GLOBAL);
        if global {
            options | EdgeFlags::GLOBAL
        } else {
            options | EdgeFlags::INTERNAL
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavVertex {
    pub position: [f32; 3],
    pub normal_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionEdge {
    pub is_global: bool,
    pub flags: EdgeFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavMesh {
    pub vertices: Vec<NavVertex>,
    pub cells: Vec<[u16; 3]>,
    pub edges: BTreeMap<EdgeKey, CollisionEdge>,
    pub events: Vec<String>,
    /// Grid as read from disk. Writing always rebuilds it.
    pub lookup_grid: LookupGrid,
}

impl NavMesh {
    /// Header flags matching what `write_to` emits.
    pub fn nav_flags(&self) -> NavFlags {
        if self.events.is_empty() {
            NavFlags::empty()
        } else {
            NavFlags::EVENTS
        }
    }

    pub fn topology(&self) -> Topology {
        Topology::from_cells(&self.cells)
    }

    fn points_2d(&self) -> Vec<Point2> {
        self.vertices
            .iter()
            .map(|v| [v.position[0] as f64, v.position[1] as f64])
            .collect()
    }

    /// XY bounding box of the vertices, zero box when empty
    pub fn bounds_2d(&self) -> ([f32; 2], [f32; 2]) {
        let mut iter = self.vertices.iter();
        let Some(first) = iter.next() else {
            return ([0.0; 2], [0.0; 2]);
        };
        let mut min = [first.position[0], first.position[1]];
        let mut max = min;
        for v in iter {
            min[0] = min[0].min(v.position[0]);
            min[1] = min[1].min(v.position[1]);
            max[0] = max[0].max(v.position[0]);
            max[1] = max[1].max(v.position[1]);
        }
        (min, max)
    }

    /// Outline normal byte for every vertex, from the current cells.
    pub fn encode_normals(&self) -> Result<Vec<u8>> {
        geometry::encode_vertex_normals(&self.points_2d(), &self.cells, &self.topology())
    }

    /// Lookup grid over the current global edges.
    pub fn build_lookup_grid(&self) -> Result<LookupGrid> {
        self.lookup_grid_for(&self.topology())
    }

    fn lookup_grid_for(&self, topology: &Topology) -> Result<LookupGrid> {
        self.check_cells()?;
        let points = self.points_2d();
        let segments: Vec<(Point2, Point2)> = topology
            .global_edges()
            .map(|e| (points[e.a as usize], points[e.b as usize]))
            .collect();
        let (min, max) = self.bounds_2d();
        geometry::build_lookup_grid(min, max, &segments)
    }

    fn check_cells(&self) -> Result<()> {
        let limit = self.vertices.len();
        for cell in &self.cells {
            for &index in cell {
                if index as usize >= limit {
                    return Err(FormatError::InvalidReference {
                        what: "navmesh vertex",
                        index: index as usize,
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    // ---- Decode ----

    pub fn read_from(cursor: &mut ByteCursor, flags: NavFlags) -> Result<Self> {
        let start = cursor.position();
        let mut nav = NavMesh::default();

        let vertex_count = cursor.read_u32()?;
        for _ in 0..vertex_count {
            let position = cursor.read_vec3_xzy()?;
            let normal_index = cursor.read_u8()?;
            nav.vertices.push(NavVertex {
                position,
                normal_index,
            });
        }

        let cell_count = cursor.read_u32()?;
        for _ in 0..cell_count {
            let cell = [cursor.read_u16()?, cursor.read_u16()?, cursor.read_u16()?];
            cursor.skip(2)?;
            if flags.contains(NavFlags::CELL_EXTRA_BYTE) {
                cursor.skip(1)?;
            }
            nav.cells.push(cell);
        }
        nav.check_cells()?;

        for is_global in [true, false] {
            let edge_count = cursor.read_u32()?;
            for _ in 0..edge_count {
                let a = cursor.read_u16()?;
                let b = cursor.read_u16()?;
                cursor.skip(4)?;
                let flag = EdgeFlags::from_bits_retain(cursor.read_u8()?);
                if flags.contains(NavFlags::EDGE_EXTRA_BYTE) {
                    cursor.skip(1)?;
                }
                for index in [a, b] {
                    if index as u32 >= vertex_count {
                        return Err(FormatError::InvalidReference {
                            what: "navmesh edge vertex",
                            index: index as usize,
                            limit: vertex_count as usize,
                        });
                    }
                }
                nav.edges.insert(
                    EdgeKey::new(a as u32, b as u32),
                    CollisionEdge {
                        is_global,
                        flags: flag,
                    },
                );
            }
        }

        if flags.contains(NavFlags::EVENTS) {
            let event_count = cursor.read_u32()?;
            for _ in 0..event_count {
                nav.events.push(cursor.read_string()?);
            }
        }

        nav.lookup_grid = read_lookup_grid(cursor)?;

        tracing::debug!(
            "navmesh @{}: {} vertices, {} cells, {} edges, {} events, grid {}x{}",
            start,
            nav.vertices.len(),
            nav.cells.len(),
            nav.edges.len(),
            nav.events.len(),
            nav.lookup_grid.width,
            nav.lookup_grid.height
        );
        Ok(nav)
    }

    // ---- Encode ----

    /// Write the block. Normal bytes, edge classes, the edge order and the
    /// lookup grid are all derived from `cells`; the stored values are ignored.
    pub fn write_to(&self, cursor: &mut ByteCursor) -> Result<()> {
        self.check_cells()?;
        if self.cells.len() > NO_CELL as usize {
            return Err(FormatError::constraint(format!(
                "navmesh has {} cells, at most {} can be addressed",
                self.cells.len(),
                NO_CELL
            )));
        }

        let topology = self.topology();
        let normals = geometry::encode_vertex_normals(&self.points_2d(), &self.cells, &topology)?;
        let grid = self.lookup_grid_for(&topology)?;

        cursor.write_u32(self.vertices.len() as u32);
        for (vertex, normal) in self.vertices.iter().zip(&normals) {
            cursor.write_vec3_xzy(vertex.position);
            cursor.write_u8(*normal);
        }

        cursor.write_u32(self.cells.len() as u32);
        for cell in &self.cells {
            for &index in cell {
                cursor.write_u16(index);
            }
            cursor.write_u16(0);
        }

        let options = |key: EdgeKey| {
            self.edges
                .get(&key)
                .map(|e| e.flags)
                .unwrap_or_default()
        };

        cursor.write_u32(topology.global_edges().count() as u32);
        for edge in topology.global_edges() {
            cursor.write_u16(edge.a as u16);
            cursor.write_u16(edge.b as u16);
            cursor.write_u16(edge.cells.first().copied().unwrap_or(0) as u16);
            cursor.write_u16(NO_CELL);
            cursor.write_u8(options(edge.key()).with_class(true).bits());
        }

        cursor.write_u32(topology.internal_edges().count() as u32);
        for edge in topology.internal_edges() {
            let (c0, c1) = (edge.cells[0] as u16, edge.cells[1] as u16);
            cursor.write_u16(edge.a as u16);
            cursor.write_u16(edge.b as u16);
            cursor.write_u16(c0.min(c1));
            cursor.write_u16(c0.max(c1));
            cursor.write_u8(options(edge.key()).with_class(false).bits());
        }

        let stale = self
            .edges
            .keys()
            .filter(|key| topology.get(key).is_none())
            .count();
        if stale > 0 {
            tracing::debug!("{} collision edge option(s) match no cell edge and were dropped", stale);
        }

        if !self.events.is_empty() {
            cursor.write_u32(self.events.len() as u32);
            for event in &self.events {
                cursor.write_string(event)?;
            }
        }

        write_lookup_grid(cursor, &grid)
    }
}

fn read_lookup_grid(cursor: &mut ByteCursor) -> Result<LookupGrid> {
    let origin = [cursor.read_f32()?, cursor.read_f32()?];
    let width = cursor.read_u32()?;
    let height = cursor.read_u32()?;
    let declared = cursor.read_u32()?;
    let squares = width as u64 * height as u64;
    if declared as u64 != squares {
        tracing::warn!(
            "lookup grid declares {} squares for a {}x{} grid",
            declared,
            width,
            height
        );
    }

    let mut cells = Vec::new();
    for _ in 0..squares {
        let count = cursor.read_u32()? as usize;
        cursor.ensure(count * 2)?;
        let mut bucket = Vec::with_capacity(count);
        for _ in 0..count {
            bucket.push(cursor.read_u16()?);
        }
        cells.push(bucket);
    }

    Ok(LookupGrid {
        origin,
        width,
        height,
        cells,
    })
}

fn write_lookup_grid(cursor: &mut ByteCursor, grid: &LookupGrid) -> Result<()> {
    let squares = grid
        .width
        .checked_mul(grid.height)
        .filter(|&n| n as usize == grid.cells.len())
        .ok_or_else(|| {
            FormatError::constraint(format!(
                "lookup grid {}x{} does not match its {} square(s)",
                grid.width,
                grid.height,
                grid.cells.len()
            ))
        })?;

    cursor.write_f32(grid.origin[0]);
    cursor.write_f32(grid.origin[1]);
    cursor.write_u32(grid.width);
    cursor.write_u32(grid.height);
    cursor.write_u32(squares);
    for bucket in &grid.cells {
        cursor.write_u32(bucket.len() as u32);
        for &index in bucket {
            cursor.write_u16(index);
        }
    }
    Ok(())
}
