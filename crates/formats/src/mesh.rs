// BMS mesh codec ("JMXVBMS 0110")
//
// Header:
//   [0..12)   signature
//   [12..52)  10 x u32 section offsets (see SectionOffsets)
//   [52..72)  u32 reserved, u32 nav flags, u32 sub-primitive count,
//             u32 vertex flags, u32 reserved
//   name, material (u32 length + code page 1252 bytes), u32 reserved
//
// Sections follow in offset-table order. Decoding walks them sequentially
// and only uses the navmesh offset; encoding records every section start and
// back-patches the table once the body is written.

use std::collections::BTreeMap;
use std::path::Path;

use bitflags::bitflags;
use jmx_shared::error::read_file;
use jmx_shared::{ByteCursor, FormatError, Result, SeekOrigin};
use serde::{Deserialize, Serialize};

use crate::edge_key::EdgeKey;
use crate::navmesh::{NavFlags, NavMesh};

pub const SIGNATURE: &str = "JMXVBMS 0110";

/// Position of the offset table, right after the signature.
pub const OFFSET_TABLE_POS: usize = 12;

/// Weight slots stored per vertex.
const WEIGHT_SLOTS: usize = 2;
/// Group index marking an unused weight slot.
const NO_GROUP: u8 = 0xFF;
const WEIGHT_SCALE: f32 = 0xFFFF as f32;

const MORPH_BYTES_PER_VERTEX: usize = 32;
const EXTRA_BLOCK_RECORD_BYTES: usize = 24;
const VERTEX_TRAILER_BYTES: usize = 12;

bitflags! {
    /// Optional per-vertex data announced in the header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct VertexFlags: u32 {
        const LIGHTMAP = 0x0400;
        const MORPH = 0x0800;
        const EXTRA_BLOCK = 0x1000;
    }
}

/// Start of every section, as stored in the header table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOffsets {
    pub vertices: u32,
    pub vertex_groups: u32,
    pub faces: u32,
    pub vertex_clothes: u32,
    pub edge_clothes: u32,
    pub bounding_box: u32,
    pub occlusion_portals: u32,
    pub navmesh: u32,
    pub skinned_navmesh: u32,
    pub unknown: u32,
}

impl SectionOffsets {
    pub fn as_array(&self) -> [u32; 10] {
        [
            self.vertices,
            self.vertex_groups,
            self.faces,
            self.vertex_clothes,
            self.edge_clothes,
            self.bounding_box,
            self.occlusion_portals,
            self.navmesh,
            self.skinned_navmesh,
            self.unknown,
        ]
    }

    pub fn read_from(cursor: &mut ByteCursor) -> Result<Self> {
        let mut slots = [0u32; 10];
        for slot in slots.iter_mut() {
            *slot = cursor.read_u32()?;
        }
        let [
            vertices,
            vertex_groups,
            faces,
            vertex_clothes,
            edge_clothes,
            bounding_box,
            occlusion_portals,
            navmesh,
            skinned_navmesh,
            unknown,
        ] = slots;
        Ok(SectionOffsets {
            vertices,
            vertex_groups,
            faces,
            vertex_clothes,
            edge_clothes,
            bounding_box,
            occlusion_portals,
            navmesh,
            skinned_navmesh,
            unknown,
        })
    }

    pub fn write_to(&self, cursor: &mut ByteCursor) {
        for slot in self.as_array() {
            cursor.write_u32(slot);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Texture UV with V already flipped to bottom-up
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexWeight {
    pub vertex: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VertexGroup {
    pub name: String,
    pub weights: Vec<VertexWeight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexCloth {
    pub distance: f32,
    pub pinned: bool,
}

impl Default for VertexCloth {
    // Vertices left out of the cloth map are written pinned in place.
    fn default() -> Self {
        VertexCloth {
            distance: 0.0,
            pinned: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeCloth {
    pub a: u32,
    pub b: u32,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClothSettings {
    /// 0 = deform with wind, 1 = deform towards ground
    pub deformation_type: u32,
    pub offset: [f32; 3],
    pub speed: f32,
    pub elasticity: f32,
    pub movements: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return BoundingBox::default();
        };
        let mut bbox = BoundingBox {
            min: *first,
            max: *first,
        };
        for p in iter {
            for axis in 0..3 {
                bbox.min[axis] = bbox.min[axis].min(p[axis]);
                bbox.max[axis] = bbox.max[axis].max(p[axis]);
            }
        }
        bbox
    }

    fn read_from(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(BoundingBox {
            min: cursor.read_vec3_xzy()?,
            max: cursor.read_vec3_xzy()?,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor) {
        cursor.write_vec3_xzy(self.min);
        cursor.write_vec3_xzy(self.max);
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub material: String,
    pub vertices: Vec<MeshVertex>,
    /// One entry per vertex when `lightmap_path` is set, empty otherwise
    pub lightmap_uvs: Vec<[f32; 2]>,
    pub lightmap_path: Option<String>,
    pub vertex_groups: Vec<VertexGroup>,
    pub faces: Vec<[u16; 3]>,
    pub vertex_clothes: BTreeMap<u32, VertexCloth>,
    pub edge_clothes: BTreeMap<EdgeKey, EdgeCloth>,
    /// Present whenever `edge_clothes` is non-empty in a decoded file
    pub cloth_settings: Option<ClothSettings>,
    pub bounding_box: BoundingBox,
    pub navmesh: Option<NavMesh>,
}

fn flip_v([u, v]: [f32; 2]) -> [f32; 2] {
    [u, 1.0 - v]
}

fn check_index(what: &'static str, index: usize, limit: usize) -> Result<()> {
    if index >= limit {
        return Err(FormatError::InvalidReference { what, index, limit });
    }
    Ok(())
}

/// Weight as stored: rounded to 3 decimals, then scaled to 16 bits.
fn quantize_weight(weight: f32) -> u16 {
    let rounded = (weight as f64 * 1000.0).round() / 1000.0;
    (rounded * 0xFFFF as f64).round().clamp(0.0, 0xFFFF as f64) as u16
}

impl Mesh {
    pub fn load(path: &Path) -> Result<Mesh> {
        let bytes = read_file(path)?;
        Mesh::decode(bytes).map_err(|e| e.with_path(path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.encode().map_err(|e| e.with_path(path))?;
        std::fs::write(path, bytes).map_err(|e| FormatError::io(path, e))
    }

    /// Header flags matching what `encode` emits
    pub fn vertex_flags(&self) -> VertexFlags {
        if self.lightmap_path.is_some() {
            VertexFlags::LIGHTMAP
        } else {
            VertexFlags::empty()
        }
    }

    pub fn nav_flags(&self) -> NavFlags {
        self.navmesh
            .as_ref()
            .map(NavMesh::nav_flags)
            .unwrap_or_default()
    }

    // ---- Decode ----

    pub fn decode(bytes: Vec<u8>) -> Result<Mesh> {
        Mesh::read_from(&mut ByteCursor::from_bytes(bytes))
    }

    pub fn read_from(cursor: &mut ByteCursor) -> Result<Mesh> {
        cursor.expect_signature(SIGNATURE)?;
        let offsets = SectionOffsets::read_from(cursor)?;
        cursor.skip(4)?;
        let nav_flags = NavFlags::from_bits_retain(cursor.read_u32()?);
        cursor.skip(4)?;
        let vertex_flags = VertexFlags::from_bits_retain(cursor.read_u32()?);
        cursor.skip(4)?;

        let mut mesh = Mesh {
            name: cursor.read_string()?,
            material: cursor.read_string()?,
            ..Mesh::default()
        };
        cursor.skip(4)?;

        tracing::trace!("mesh {:?}: offsets {:?}", mesh.name, offsets);

        mesh.read_vertices(cursor, vertex_flags)?;
        mesh.read_vertex_groups(cursor)?;
        mesh.read_faces(cursor)?;
        mesh.read_cloth(cursor)?;
        mesh.bounding_box = BoundingBox::read_from(cursor)?;

        if offsets.navmesh != 0 {
            cursor.seek(offsets.navmesh as i64, SeekOrigin::Begin)?;
            mesh.navmesh = Some(NavMesh::read_from(cursor, nav_flags)?);
        }

        tracing::debug!(
            "mesh {:?}: {} vertices, {} faces, {} groups, {} cloth vertices, {} cloth edges, navmesh={}",
            mesh.name,
            mesh.vertices.len(),
            mesh.faces.len(),
            mesh.vertex_groups.len(),
            mesh.vertex_clothes.len(),
            mesh.edge_clothes.len(),
            mesh.navmesh.is_some()
        );
        Ok(mesh)
    }

    fn read_vertices(&mut self, cursor: &mut ByteCursor, flags: VertexFlags) -> Result<()> {
        let count = cursor.read_u32()?;
        for _ in 0..count {
            let position = cursor.read_vec3_xzy()?;
            let normal = cursor.read_vec3_xzy()?;
            let uv = flip_v([cursor.read_f32()?, cursor.read_f32()?]);
            if flags.contains(VertexFlags::LIGHTMAP) {
                self.lightmap_uvs
                    .push(flip_v([cursor.read_f32()?, cursor.read_f32()?]));
            }
            if flags.contains(VertexFlags::MORPH) {
                cursor.skip(MORPH_BYTES_PER_VERTEX)?;
            }
            cursor.skip(VERTEX_TRAILER_BYTES)?;
            self.vertices.push(MeshVertex {
                position,
                normal,
                uv,
            });
        }

        if flags.contains(VertexFlags::LIGHTMAP) {
            self.lightmap_path = Some(cursor.read_string()?);
        }
        if flags.contains(VertexFlags::EXTRA_BLOCK) {
            let records = cursor.read_u32()? as usize;
            cursor.skip(records.saturating_mul(EXTRA_BLOCK_RECORD_BYTES))?;
        }
        Ok(())
    }

    fn read_vertex_groups(&mut self, cursor: &mut ByteCursor) -> Result<()> {
        let group_count = cursor.read_u32()? as usize;
        if group_count == 0 {
            return Ok(());
        }
        for _ in 0..group_count {
            self.vertex_groups.push(VertexGroup {
                name: cursor.read_string()?,
                weights: Vec::new(),
            });
        }
        for vertex in 0..self.vertices.len() {
            for _ in 0..WEIGHT_SLOTS {
                let group = cursor.read_u8()?;
                let weight = cursor.read_u16()?;
                if group == NO_GROUP {
                    continue;
                }
                check_index("vertex group", group as usize, group_count)?;
                self.vertex_groups[group as usize].weights.push(VertexWeight {
                    vertex: vertex as u32,
                    weight: weight as f32 / WEIGHT_SCALE,
                });
            }
        }
        Ok(())
    }

    fn read_faces(&mut self, cursor: &mut ByteCursor) -> Result<()> {
        let count = cursor.read_u32()?;
        for _ in 0..count {
            let face = [cursor.read_u16()?, cursor.read_u16()?, cursor.read_u16()?];
            for index in face {
                check_index("face vertex", index as usize, self.vertices.len())?;
            }
            self.faces.push(face);
        }
        Ok(())
    }

    fn read_cloth(&mut self, cursor: &mut ByteCursor) -> Result<()> {
        let vertex_count = cursor.read_u32()?;
        for index in 0..vertex_count {
            let distance = cursor.read_f32()?;
            let pinned = cursor.read_u32()? == 1;
            self.vertex_clothes
                .insert(index, VertexCloth { distance, pinned });
        }

        let edge_count = cursor.read_u32()?;
        if edge_count == 0 {
            return Ok(());
        }
        for _ in 0..edge_count {
            let a = cursor.read_u32()?;
            let b = cursor.read_u32()?;
            let distance = cursor.read_f32()?;
            self.edge_clothes
                .insert(EdgeKey::new(a, b), EdgeCloth { a, b, distance });
        }
        // Index-order block, one u32 per edge
        cursor.skip(edge_count as usize * 4)?;

        let deformation_type = cursor.read_u32()?;
        let offset = cursor.read_vec3_xzy()?;
        let speed = cursor.read_f32()?;
        let unused = [cursor.read_f32()?, cursor.read_f32()?];
        let elasticity = cursor.read_f32()?;
        let movements = cursor.read_i32()?;
        tracing::trace!("cloth reserved floats {:?}", unused);

        self.cloth_settings = Some(ClothSettings {
            deformation_type,
            offset,
            speed,
            elasticity,
            movements,
        });
        Ok(())
    }

    // ---- Encode ----

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::with_capacity(1024 + self.vertices.len() * 48);
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Serialize into `cursor` (expected empty) and return the patched table.
    pub fn write_to(&self, cursor: &mut ByteCursor) -> Result<SectionOffsets> {
        self.validate()?;

        cursor.write_fixed_string(SIGNATURE)?;
        SectionOffsets::default().write_to(cursor);
        cursor.write_u32(0);
        cursor.write_u32(self.nav_flags().bits());
        cursor.write_u32(1); // sub-primitive count
        cursor.write_u32(self.vertex_flags().bits());
        cursor.write_u32(0);
        cursor.write_string(&self.name)?;
        cursor.write_string(&self.material)?;
        cursor.write_u32(0);

        let mut offsets = SectionOffsets {
            vertices: cursor.position() as u32,
            ..SectionOffsets::default()
        };
        self.write_vertices(cursor)?;

        offsets.vertex_groups = cursor.position() as u32;
        self.write_vertex_groups(cursor)?;

        offsets.faces = cursor.position() as u32;
        cursor.write_u32(self.faces.len() as u32);
        for face in &self.faces {
            for &index in face {
                cursor.write_u16(index);
            }
        }

        offsets.vertex_clothes = cursor.position() as u32;
        self.write_vertex_clothes(cursor);

        offsets.edge_clothes = cursor.position() as u32;
        self.write_edge_clothes(cursor);

        offsets.bounding_box = cursor.position() as u32;
        self.bounding_box.write_to(cursor);

        offsets.occlusion_portals = cursor.position() as u32;
        cursor.write_u32(0);

        offsets.unknown = cursor.position() as u32;
        cursor.write_u32(0);

        if let Some(navmesh) = &self.navmesh {
            offsets.navmesh = cursor.position() as u32;
            navmesh.write_to(cursor)?;
        }

        let end = cursor.position();
        cursor.seek(OFFSET_TABLE_POS as i64, SeekOrigin::Begin)?;
        offsets.write_to(cursor);
        cursor.seek(end as i64, SeekOrigin::Begin)?;

        tracing::debug!("mesh {:?}: wrote {} bytes, offsets {:?}", self.name, end, offsets);
        Ok(offsets)
    }

    fn validate(&self) -> Result<()> {
        let vertex_count = self.vertices.len();
        match &self.lightmap_path {
            Some(_) if self.lightmap_uvs.len() != vertex_count => {
                return Err(FormatError::constraint(format!(
                    "lightmap has {} UVs for {} vertices",
                    self.lightmap_uvs.len(),
                    vertex_count
                )));
            }
            None if !self.lightmap_uvs.is_empty() => {
                return Err(FormatError::constraint("lightmap UVs given without a lightmap path"));
            }
            _ => {}
        }
        for face in &self.faces {
            for &index in face {
                check_index("face vertex", index as usize, vertex_count)?;
            }
        }
        for &index in self.vertex_clothes.keys() {
            check_index("cloth vertex", index as usize, vertex_count)?;
        }
        for cloth in self.edge_clothes.values() {
            check_index("cloth edge vertex", cloth.a as usize, vertex_count)?;
            check_index("cloth edge vertex", cloth.b as usize, vertex_count)?;
        }
        Ok(())
    }

    fn write_vertices(&self, cursor: &mut ByteCursor) -> Result<()> {
        cursor.write_u32(self.vertices.len() as u32);
        for (index, vertex) in self.vertices.iter().enumerate() {
            cursor.write_vec3_xzy(vertex.position);
            cursor.write_vec3_xzy(vertex.normal);
            let [u, v] = flip_v(vertex.uv);
            cursor.write_f32(u);
            cursor.write_f32(v);
            if self.lightmap_path.is_some() {
                let [u, v] = flip_v(self.lightmap_uvs[index]);
                cursor.write_f32(u);
                cursor.write_f32(v);
            }
            cursor.write_f32(0.0);
            cursor.write_u32(0xFFFF_FFFF);
            cursor.write_u32(0);
        }
        if let Some(path) = &self.lightmap_path {
            cursor.write_string(path)?;
        }
        Ok(())
    }

    fn write_vertex_groups(&self, cursor: &mut ByteCursor) -> Result<()> {
        cursor.write_u32(self.vertex_groups.len() as u32);
        if self.vertex_groups.is_empty() {
            return Ok(());
        }
        if self.vertex_groups.len() > NO_GROUP as usize {
            return Err(FormatError::constraint(format!(
                "{} vertex groups, at most {} can be indexed",
                self.vertex_groups.len(),
                NO_GROUP
            )));
        }

        let mut slots: Vec<Vec<(u8, f32)>> = vec![Vec::new(); self.vertices.len()];
        for (group_index, group) in self.vertex_groups.iter().enumerate() {
            cursor.write_string(&group.name)?;
            for w in &group.weights {
                check_index("weighted vertex", w.vertex as usize, self.vertices.len())?;
                slots[w.vertex as usize].push((group_index as u8, w.weight));
            }
        }

        for (index, assigned) in slots.iter().enumerate() {
            if assigned.is_empty() {
                return Err(FormatError::constraint(format!(
                    "vertex {} at {:?} has no vertex group",
                    index, self.vertices[index].position
                )));
            }
            if assigned.len() > WEIGHT_SLOTS {
                return Err(FormatError::constraint(format!(
                    "vertex {} belongs to {} groups, at most {} are stored",
                    index,
                    assigned.len(),
                    WEIGHT_SLOTS
                )));
            }
            for slot in 0..WEIGHT_SLOTS {
                match assigned.get(slot) {
                    Some(&(group, weight)) => {
                        cursor.write_u8(group);
                        cursor.write_u16(quantize_weight(weight));
                    }
                    None => {
                        cursor.write_u8(NO_GROUP);
                        cursor.write_u16(0);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_vertex_clothes(&self, cursor: &mut ByteCursor) {
        if self.vertex_clothes.is_empty() {
            cursor.write_u32(0);
            return;
        }
        cursor.write_u32(self.vertices.len() as u32);
        for index in 0..self.vertices.len() as u32 {
            let cloth = self
                .vertex_clothes
                .get(&index)
                .copied()
                .unwrap_or_default();
            cursor.write_f32(cloth.distance);
            cursor.write_u32(cloth.pinned as u32);
        }
    }

    fn write_edge_clothes(&self, cursor: &mut ByteCursor) {
        cursor.write_u32(self.edge_clothes.len() as u32);
        if self.edge_clothes.is_empty() {
            return;
        }
        for cloth in self.edge_clothes.values() {
            cursor.write_u32(cloth.a);
            cursor.write_u32(cloth.b);
            cursor.write_f32(cloth.distance);
        }
        for order in 0..self.edge_clothes.len() as u32 {
            cursor.write_u32(order);
        }

        let settings = self.cloth_settings.unwrap_or_default();
        cursor.write_u32(settings.deformation_type);
        cursor.write_vec3_xzy(settings.offset);
        cursor.write_f32(settings.speed);
        cursor.write_f32(1.0);
        cursor.write_f32(1.0);
        cursor.write_f32(settings.elasticity);
        cursor.write_i32(settings.movements);
    }
}
