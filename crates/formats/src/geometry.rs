// Navmesh geometry
//
// Two artifacts are derived from a navmesh's triangle cells whenever it is
// written: the per-vertex outline normal byte, and the 2D lookup grid that
// buckets boundary ("global") edges into 100x100 world-unit squares. Both
// are recomputed from topology, never copied from a decoded file.

use std::collections::HashMap;

use jmx_shared::{FormatError, Result};
use serde::{Deserialize, Serialize};

use crate::edge_key::EdgeKey;

/// Side length of one lookup-grid square, in world units.
pub const GRID_CELL_SIZE: f64 = 100.0;

pub type Point2 = [f64; 2];

// ============================================================================
// Topology
// ============================================================================

/// An edge of the cell mesh with the cells that share it.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyEdge {
    /// Endpoints in the direction they were first seen
    pub a: u32,
    pub b: u32,
    pub cells: Vec<u32>,
}

impl TopologyEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.a, self.b)
    }

    /// Outline (global) edges border at most one cell.
    pub fn is_outline(&self) -> bool {
        self.cells.len() <= 1
    }
}

/// Edge/cell adjacency of a triangle cell list.
///
/// Edges are ordered by first appearance walking each cell a->b, b->c, c->a.
/// That order fixes the local index of every global edge in the lookup grid.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    edges: Vec<TopologyEdge>,
    index: HashMap<EdgeKey, usize>,
}

impl Topology {
    pub fn from_cells(cells: &[[u16; 3]]) -> Self {
        let mut topology = Topology::default();
        for (cell_index, cell) in cells.iter().enumerate() {
            let [a, b, c] = cell.map(u32::from);
            for (from, to) in [(a, b), (b, c), (c, a)] {
                topology.link(from, to, cell_index as u32);
            }
        }
        topology
    }

    fn link(&mut self, from: u32, to: u32, cell: u32) {
        let key = EdgeKey::new(from, to);
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                self.edges.push(TopologyEdge {
                    a: from,
                    b: to,
                    cells: Vec::with_capacity(2),
                });
                self.index.insert(key, self.edges.len() - 1);
                self.edges.len() - 1
            }
        };
        let linked = &mut self.edges[slot].cells;
        if !linked.contains(&cell) {
            linked.push(cell);
        }
    }

    pub fn edges(&self) -> &[TopologyEdge] {
        &self.edges
    }

    pub fn get(&self, key: &EdgeKey) -> Option<&TopologyEdge> {
        self.index.get(key).map(|&slot| &self.edges[slot])
    }

    pub fn global_edges(&self) -> impl Iterator<Item = &TopologyEdge> {
        self.edges.iter().filter(|e| e.is_outline())
    }

    pub fn internal_edges(&self) -> impl Iterator<Item = &TopologyEdge> {
        self.edges.iter().filter(|e| !e.is_outline())
    }
}

// ============================================================================
// Outline normal encoding
// ============================================================================

/// Map an angle in degrees onto the byte scale, 255 steps per turn.
pub fn quantize_angle(degrees: f64) -> u8 {
    let wrapped = degrees.rem_euclid(360.0);
    (wrapped * 255.0 / 360.0).round() as u8
}

/// Inverse of `quantize_angle` (bucket centre, in degrees).
pub fn dequantize_angle(byte: u8) -> f64 {
    byte as f64 * 360.0 / 255.0
}

/// Angle stored for a 2D outline normal.
///
/// atan2 in degrees moved to [0, 360), then mirrored (360 - a) when non-zero.
/// A zero vector yields 0.
pub fn outline_angle(normal: Point2) -> f64 {
    let mut angle = normal[1].atan2(normal[0]).to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    if angle != 0.0 {
        angle = 360.0 - angle;
    }
    angle
}

fn normalized(v: Point2) -> Point2 {
    let len = (v[0] * v[0] + v[1] * v[1]).sqrt();
    if len == 0.0 {
        return v;
    }
    [v[0] / len, v[1] / len]
}

/// Normal of edge a->b pointing away from the cell's third vertex c.
fn edge_outward_normal(a: Point2, b: Point2, c: Point2) -> Point2 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ac = [c[0] - a[0], c[1] - a[1]];
    let mut normal = normalized([-ab[1], ab[0]]);
    let signed_angle = (ab[1] * ac[0] - ab[0] * ac[1]).atan2(ab[0] * ac[0] + ab[1] * ac[1]);
    if signed_angle < 0.0 {
        normal = [-normal[0], -normal[1]];
    }
    normal
}

/// Encode one byte per vertex from the outline edges touching it.
///
/// `positions` are the XY of each navmesh vertex. Vertices that no outline
/// edge touches encode 0.
pub fn encode_vertex_normals(positions: &[Point2], cells: &[[u16; 3]], topology: &Topology) -> Result<Vec<u8>> {
    let point = |index: u32| -> Result<Point2> {
        positions
            .get(index as usize)
            .copied()
            .ok_or(FormatError::InvalidReference {
                what: "navmesh vertex",
                index: index as usize,
                limit: positions.len(),
            })
    };

    let mut sums: Vec<Option<Point2>> = vec![None; positions.len()];
    for edge in topology.global_edges() {
        let Some(&cell_index) = edge.cells.first() else {
            continue;
        };
        let cell = cells[cell_index as usize].map(u32::from);
        let Some(&third) = cell.iter().find(|&&v| v != edge.a && v != edge.b) else {
            continue;
        };
        let normal = edge_outward_normal(point(edge.a)?, point(edge.b)?, point(third)?);
        for vertex in [edge.a, edge.b] {
            let sum = sums[vertex as usize].get_or_insert([0.0, 0.0]);
            sum[0] += normal[0];
            sum[1] += normal[1];
        }
    }

    Ok(sums
        .into_iter()
        .map(|sum| match sum {
            Some(sum) => quantize_angle(outline_angle(normalized(sum))),
            None => 0,
        })
        .collect())
}

// ============================================================================
// Lookup grid
// ============================================================================

/// Boundary-edge bucket grid stored at the end of a navmesh block.
///
/// `cells` is row-major (row = Y step, column = X step); each entry holds
/// sorted local indices into the ordered global-edge list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupGrid {
    pub origin: [f32; 2],
    pub width: u32,
    pub height: u32,
    pub cells: Vec<Vec<u16>>,
}

impl LookupGrid {
    pub fn cell(&self, column: u32, row: u32) -> Option<&[u16]> {
        if column >= self.width || row >= self.height {
            return None;
        }
        let index = (row as usize)
            .checked_mul(self.width as usize)?
            .checked_add(column as usize)?;
        self.cells.get(index).map(Vec::as_slice)
    }

    /// Closed rectangle covered by a grid square: (min, max)
    pub fn cell_bounds(&self, column: u32, row: u32) -> (Point2, Point2) {
        cell_bounds(
            [self.origin[0] as f64, self.origin[1] as f64],
            column,
            row,
        )
    }
}

fn cell_bounds(origin: Point2, column: u32, row: u32) -> (Point2, Point2) {
    let x = origin[0] + column as f64 * GRID_CELL_SIZE;
    let y = origin[1] + row as f64 * GRID_CELL_SIZE;
    ([x, y], [x + GRID_CELL_SIZE, y + GRID_CELL_SIZE])
}

/// Bucket `segments` (in order, index = local id) into grid squares over the
/// box `min`..`max`.
pub fn build_lookup_grid(min: [f32; 2], max: [f32; 2], segments: &[(Point2, Point2)]) -> Result<LookupGrid> {
    if segments.len() > u16::MAX as usize + 1 {
        return Err(FormatError::constraint(format!(
            "{} global edges do not fit 16-bit lookup-grid indices",
            segments.len()
        )));
    }

    let origin = [min[0] as f64, min[1] as f64];
    let width = ((max[0] as f64 - origin[0]) / GRID_CELL_SIZE).ceil().max(0.0) as u32;
    let height = ((max[1] as f64 - origin[1]) / GRID_CELL_SIZE).ceil().max(0.0) as u32;

    let squares = width.checked_mul(height).ok_or_else(|| {
        FormatError::constraint(format!(
            "lookup grid of {}x{} squares overflows the square count",
            width, height
        ))
    })?;

    let mut cells = Vec::with_capacity(squares as usize);
    for row in 0..height {
        for column in 0..width {
            let (lo, hi) = cell_bounds(origin, column, row);
            let bucket: Vec<u16> = segments
                .iter()
                .enumerate()
                .filter(|(_, (p, q))| {
                    point_in_rect(lo, hi, *p) || point_in_rect(lo, hi, *q) || segment_crosses_rect(lo, hi, *p, *q)
                })
                .map(|(local, _)| local as u16)
                .collect();
            cells.push(bucket);
        }
    }

    Ok(LookupGrid {
        origin: min,
        width,
        height,
        cells,
    })
}

/// Closed-rectangle containment
pub fn point_in_rect(lo: Point2, hi: Point2, p: Point2) -> bool {
    p[0] >= lo[0] && p[0] <= hi[0] && p[1] >= lo[1] && p[1] <= hi[1]
}

/// Does segment p-q intersect any of the rectangle's four borders?
pub fn segment_crosses_rect(lo: Point2, hi: Point2, p: Point2, q: Point2) -> bool {
    let bottom_left = lo;
    let bottom_right = [hi[0], lo[1]];
    let top_left = [lo[0], hi[1]];
    let top_right = hi;

    segments_intersect(bottom_left, bottom_right, p, q)
        || segments_intersect(top_left, top_right, p, q)
        || segments_intersect(bottom_left, top_left, p, q)
        || segments_intersect(bottom_right, top_right, p, q)
}

/// Orientation of the ordered triplet: 1, 0 (collinear) or -1.
fn orientation(p1: Point2, p2: Point2, p3: Point2) -> i8 {
    let lhs = (p3[1] - p1[1]) * (p2[0] - p1[0]);
    let rhs = (p2[1] - p1[1]) * (p3[0] - p1[0]);
    if lhs > rhs {
        1
    } else if lhs == rhs {
        0
    } else {
        -1
    }
}

/// Strictly-between test on whichever axis the segment spans, or an
/// endpoint match. Only meaningful for collinear input.
fn collinear_contains(s1: Point2, s2: Point2, p: Point2) -> bool {
    let between = |a: f64, b: f64, v: f64| (a < b && a < v && v < b) || (b < a && b < v && v < a);
    between(s1[0], s2[0], p[0]) || between(s1[1], s2[1], p[1]) || s1 == p || s2 == p
}

/// General segment/segment intersection, touching included.
pub fn segments_intersect(p1: Point2, p2: Point2, p3: Point2, p4: Point2) -> bool {
    let f1 = orientation(p1, p2, p4);
    let f2 = orientation(p1, p2, p3);
    let f3 = orientation(p1, p3, p4);
    let f4 = orientation(p2, p3, p4);

    if f1 == 0 && f2 == 0 && f3 == 0 && f4 == 0 {
        return collinear_contains(p1, p2, p3)
            || collinear_contains(p1, p2, p4)
            || collinear_contains(p3, p4, p1)
            || collinear_contains(p3, p4, p2);
    }
    f1 != f2 && f3 != f4
}
