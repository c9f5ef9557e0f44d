// Binary resource chain: compounds (CPD), descriptors (RES) and materials (BMT)
//
// CPD "JMXVCPD 0101": u32 reserved, u32 offset of the resource list.
//   At that offset: u32 count + count x string.
// RES "JMXVRES 0109": 8 x u32 section offsets (material, mesh, skeleton,
//   animation, mesh group, animation group, sound, bounding box), u32 mesh
//   flags, u32 mod data flag, 3 x u32 reserved, u32 type, string name.
//   Bounding box section: string root mesh, 6 x f32, 6 x f32.
//   Material section: u32 count + count x (u32 id, string path).
//   Mesh section: u32 count + count x (string path [, u32 flag if mesh flag bit0]).
// BMT "JMXVBMT 0102": u32 count, per material: string name, 4 x RGBA f32
//   (diffuse, ambient, specular, emissive), f32 parameter, u32 options,
//   string texture, f32 texture parameter, u8, u8, u8 relative flag.
//
// Strings are a u32 length and cp1252 bytes. Paths come back with `/`.

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use jmx_shared::error::read_file;
use jmx_shared::{ByteCursor, FormatError, Result, SeekOrigin};
use serde::{Deserialize, Serialize};

pub const CPD_SIGNATURE: &str = "JMXVCPD 0101";
pub const RES_SIGNATURE: &str = "JMXVRES 0109";
pub const BMT_SIGNATURE: &str = "JMXVBMT 0102";

/// Client paths use `\`; everything handed out uses `/`.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

fn read_path(cursor: &mut ByteCursor) -> Result<String> {
    Ok(normalize_path(&cursor.read_string()?))
}

fn seek_to(cursor: &mut ByteCursor, offset: u32, section: &str) -> Result<()> {
    if offset as usize > cursor.len() {
        return Err(FormatError::constraint(format!(
            "{} section offset {} is past the end of a {} byte file",
            section,
            offset,
            cursor.len()
        )));
    }
    cursor.seek(offset as i64, SeekOrigin::Begin)?;
    Ok(())
}

/// Signature probe used to tell a compound from a descriptor.
pub fn has_signature(bytes: &[u8], signature: &str) -> bool {
    bytes.len() >= signature.len() && &bytes[..signature.len()] == signature.as_bytes()
}

// ---- CPD ----

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompoundFile {
    pub reserved: u32,
    pub resources: Vec<String>,
}

impl CompoundFile {
    pub fn load(path: &Path) -> Result<CompoundFile> {
        let bytes = read_file(path)?;
        CompoundFile::decode(bytes).map_err(|e| e.with_path(path))
    }

    pub fn decode(bytes: Vec<u8>) -> Result<CompoundFile> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        cursor.expect_signature(CPD_SIGNATURE)?;
        let reserved = cursor.read_u32()?;
        let offset = cursor.read_u32()?;
        seek_to(&mut cursor, offset, "compound resource")?;

        let count = cursor.read_u32()? as usize;
        cursor.ensure(count.saturating_mul(4))?;
        let mut resources = Vec::with_capacity(count);
        for _ in 0..count {
            resources.push(read_path(&mut cursor)?);
        }
        Ok(CompoundFile {
            reserved,
            resources,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::new();
        cursor.write_fixed_string(CPD_SIGNATURE)?;
        cursor.write_u32(self.reserved);
        cursor.write_u32(20);
        cursor.write_u32(self.resources.len() as u32);
        for resource in &self.resources {
            cursor.write_string(resource)?;
        }
        Ok(cursor.into_inner())
    }
}

// ---- RES ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceOffsets {
    pub material: u32,
    pub mesh: u32,
    pub skeleton: u32,
    pub animation: u32,
    pub mesh_group: u32,
    pub animation_group: u32,
    pub sound: u32,
    pub bounding_box: u32,
}

impl ResourceOffsets {
    fn read_from(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(ResourceOffsets {
            material: cursor.read_u32()?,
            mesh: cursor.read_u32()?,
            skeleton: cursor.read_u32()?,
            animation: cursor.read_u32()?,
            mesh_group: cursor.read_u32()?,
            animation_group: cursor.read_u32()?,
            sound: cursor.read_u32()?,
            bounding_box: cursor.read_u32()?,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor) {
        for offset in [
            self.material,
            self.mesh,
            self.skeleton,
            self.animation,
            self.mesh_group,
            self.animation_group,
            self.sound,
            self.bounding_box,
        ] {
            cursor.write_u32(offset);
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct MeshListFlags: u32 {
        /// Every mesh entry carries a trailing u32
        const ENTRY_FLAG = 0x01;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBounds {
    pub root_mesh: String,
    pub primary: [f32; 6],
    pub secondary: [f32; 6],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMaterial {
    pub id: u32,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMesh {
    pub path: String,
    pub flag: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Offsets as found on disk
    pub offsets: ResourceOffsets,
    pub mesh_flags: MeshListFlags,
    pub mod_data: u32,
    pub reserved: [u32; 3],
    pub resource_type: u32,
    pub name: String,
    pub bounds: Option<ResourceBounds>,
    pub materials: Vec<ResourceMaterial>,
    pub meshes: Vec<ResourceMesh>,
}

impl ResourceDescriptor {
    pub fn load(path: &Path) -> Result<ResourceDescriptor> {
        let bytes = read_file(path)?;
        ResourceDescriptor::decode(bytes).map_err(|e| e.with_path(path))
    }

    pub fn decode(bytes: Vec<u8>) -> Result<ResourceDescriptor> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        cursor.expect_signature(RES_SIGNATURE)?;
        let offsets = ResourceOffsets::read_from(&mut cursor)?;
        let mesh_flags = MeshListFlags::from_bits_retain(cursor.read_u32()?);
        let mod_data = cursor.read_u32()?;
        let reserved = [cursor.read_u32()?, cursor.read_u32()?, cursor.read_u32()?];
        let resource_type = cursor.read_u32()?;
        let name = cursor.read_string()?;

        let bounds = if offsets.bounding_box != 0 {
            seek_to(&mut cursor, offsets.bounding_box, "bounding box")?;
            let root_mesh = read_path(&mut cursor)?;
            let mut boxes = [[0f32; 6]; 2];
            for values in boxes.iter_mut() {
                for value in values.iter_mut() {
                    *value = cursor.read_f32()?;
                }
            }
            Some(ResourceBounds {
                root_mesh,
                primary: boxes[0],
                secondary: boxes[1],
            })
        } else {
            None
        };

        let mut materials = Vec::new();
        if offsets.material != 0 {
            seek_to(&mut cursor, offsets.material, "material")?;
            let count = cursor.read_u32()? as usize;
            cursor.ensure(count.saturating_mul(8))?;
            for _ in 0..count {
                let id = cursor.read_u32()?;
                let path = read_path(&mut cursor)?;
                materials.push(ResourceMaterial { id, path });
            }
        }

        let mut meshes = Vec::new();
        if offsets.mesh != 0 {
            seek_to(&mut cursor, offsets.mesh, "mesh")?;
            let count = cursor.read_u32()? as usize;
            cursor.ensure(count.saturating_mul(4))?;
            for _ in 0..count {
                let path = read_path(&mut cursor)?;
                let flag = if mesh_flags.contains(MeshListFlags::ENTRY_FLAG) {
                    Some(cursor.read_u32()?)
                } else {
                    None
                };
                meshes.push(ResourceMesh { path, flag });
            }
        }

        tracing::trace!(
            "resource {:?}: type {}, {} material(s), {} mesh(es)",
            name,
            resource_type,
            materials.len(),
            meshes.len()
        );

        Ok(ResourceDescriptor {
            offsets,
            mesh_flags,
            mod_data,
            reserved,
            resource_type,
            name,
            bounds,
            materials,
            meshes,
        })
    }

    /// Write the header plus the bounding box, material and mesh sections.
    /// Sections this type does not model are written with a zero offset.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let entry_flag = self.mesh_flags.contains(MeshListFlags::ENTRY_FLAG);
        if let Some(mesh) = self.meshes.iter().find(|m| m.flag.is_some() != entry_flag) {
            return Err(FormatError::constraint(format!(
                "mesh {:?} flag presence disagrees with the mesh list flags",
                mesh.path
            )));
        }

        let mut cursor = ByteCursor::new();
        cursor.write_fixed_string(RES_SIGNATURE)?;
        ResourceOffsets::default().write_to(&mut cursor);
        cursor.write_u32(self.mesh_flags.bits());
        cursor.write_u32(self.mod_data);
        for value in self.reserved {
            cursor.write_u32(value);
        }
        cursor.write_u32(self.resource_type);
        cursor.write_string(&self.name)?;

        let mut offsets = ResourceOffsets::default();
        if let Some(bounds) = &self.bounds {
            offsets.bounding_box = cursor.position() as u32;
            cursor.write_string(&bounds.root_mesh)?;
            for value in bounds.primary.iter().chain(bounds.secondary.iter()) {
                cursor.write_f32(*value);
            }
        }

        offsets.material = cursor.position() as u32;
        cursor.write_u32(self.materials.len() as u32);
        for material in &self.materials {
            cursor.write_u32(material.id);
            cursor.write_string(&material.path)?;
        }

        offsets.mesh = cursor.position() as u32;
        cursor.write_u32(self.meshes.len() as u32);
        for mesh in &self.meshes {
            cursor.write_string(&mesh.path)?;
            if let Some(flag) = mesh.flag {
                cursor.write_u32(flag);
            }
        }

        cursor.seek(12, SeekOrigin::Begin)?;
        offsets.write_to(&mut cursor);
        Ok(cursor.into_inner())
    }

    pub fn mesh_paths(&self) -> impl Iterator<Item = &str> {
        self.meshes.iter().map(|m| m.path.as_str())
    }

    pub fn material_paths(&self) -> impl Iterator<Item = &str> {
        self.materials.iter().map(|m| m.path.as_str())
    }
}

// ---- BMT ----

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct MaterialOptions: u32 {
        const TINT = 1 << 6;
        const DIFFUSE = 1 << 8;
        const ALPHA = 1 << 9;
        const BUMP = 1 << 13;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    fn read_from(cursor: &mut ByteCursor) -> Result<Self> {
        Ok(Rgba {
            r: cursor.read_f32()?,
            g: cursor.read_f32()?,
            b: cursor.read_f32()?,
            a: cursor.read_f32()?,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor) {
        for channel in [self.r, self.g, self.b, self.a] {
            cursor.write_f32(channel);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureRef {
    pub path: String,
    pub parameter: f32,
    pub flags: [u8; 2],
    /// Path is relative to the Data root, not to the material file
    pub relative_to_root: bool,
}

impl TextureRef {
    /// On-disk location of the texture for a material read from `material_dir`.
    pub fn resolve(&self, data_root: &Path, material_dir: &Path) -> PathBuf {
        if self.relative_to_root {
            data_root.join(&self.path)
        } else {
            material_dir.join(&self.path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub diffuse: Rgba,
    pub ambient: Rgba,
    pub specular: Rgba,
    pub emissive: Rgba,
    pub parameter: f32,
    pub options: MaterialOptions,
    pub texture: TextureRef,
}

impl Material {
    fn read_from(cursor: &mut ByteCursor) -> Result<Self> {
        let name = cursor.read_string()?;
        let diffuse = Rgba::read_from(cursor)?;
        let ambient = Rgba::read_from(cursor)?;
        let specular = Rgba::read_from(cursor)?;
        let emissive = Rgba::read_from(cursor)?;
        let parameter = cursor.read_f32()?;
        let options = MaterialOptions::from_bits_retain(cursor.read_u32()?);
        let texture = TextureRef {
            path: read_path(cursor)?,
            parameter: cursor.read_f32()?,
            flags: [cursor.read_u8()?, cursor.read_u8()?],
            relative_to_root: cursor.read_bool()?,
        };
        Ok(Material {
            name,
            diffuse,
            ambient,
            specular,
            emissive,
            parameter,
            options,
            texture,
        })
    }

    fn write_to(&self, cursor: &mut ByteCursor) -> Result<()> {
        cursor.write_string(&self.name)?;
        for color in [&self.diffuse, &self.ambient, &self.specular, &self.emissive] {
            color.write_to(cursor);
        }
        cursor.write_f32(self.parameter);
        cursor.write_u32(self.options.bits());
        cursor.write_string(&self.texture.path)?;
        cursor.write_f32(self.texture.parameter);
        cursor.write_u8(self.texture.flags[0]);
        cursor.write_u8(self.texture.flags[1]);
        cursor.write_bool(self.texture.relative_to_root);
        Ok(())
    }

    pub fn has_texture(&self) -> bool {
        self.options.contains(MaterialOptions::DIFFUSE) && !self.texture.path.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaterialFile {
    pub materials: Vec<Material>,
}

impl MaterialFile {
    pub fn load(path: &Path) -> Result<MaterialFile> {
        let bytes = read_file(path)?;
        MaterialFile::decode(bytes).map_err(|e| e.with_path(path))
    }

    pub fn decode(bytes: Vec<u8>) -> Result<MaterialFile> {
        let mut cursor = ByteCursor::from_bytes(bytes);
        cursor.expect_signature(BMT_SIGNATURE)?;
        let count = cursor.read_u32()? as usize;
        cursor.ensure(count.saturating_mul(4))?;
        let mut materials = Vec::with_capacity(count);
        for _ in 0..count {
            materials.push(Material::read_from(&mut cursor)?);
        }
        Ok(MaterialFile { materials })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::new();
        cursor.write_fixed_string(BMT_SIGNATURE)?;
        cursor.write_u32(self.materials.len() as u32);
        for material in &self.materials {
            material.write_to(&mut cursor)?;
        }
        Ok(cursor.into_inner())
    }
}
