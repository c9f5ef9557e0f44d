// Decode cache and the object id resolution chain
//
//   object id -> object.ifo path -> [CPD -> resource paths] -> RES
//             -> mesh paths + material paths -> BMT -> diffuse textures
//
// Every hop checks the target exists. A broken hop is recorded on the
// `Resolution` and logged; the rest of the chain keeps going. Decoded files
// are cached by absolute path for the life of one `DecodeCache`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use jmx_shared::error::read_file;
use jmx_shared::{FormatError, Result};
use serde::Serialize;

use crate::ifo::ObjectIndex;
use crate::mesh::Mesh;
use crate::resource::{CPD_SIGNATURE, CompoundFile, MaterialFile, ResourceDescriptor, has_signature};

/// What an object.ifo path turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceFile {
    Compound(CompoundFile),
    Descriptor(ResourceDescriptor),
}

impl ResourceFile {
    pub fn load(path: &Path) -> Result<ResourceFile> {
        let bytes = read_file(path)?;
        let decoded = if has_signature(&bytes, CPD_SIGNATURE) {
            CompoundFile::decode(bytes).map(ResourceFile::Compound)
        } else {
            // Anything else must be a descriptor; its decoder reports the signature.
            ResourceDescriptor::decode(bytes).map(ResourceFile::Descriptor)
        };
        decoded.map_err(|e| e.with_path(path))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Successfully decoded files keyed by absolute path. A decode error is
/// handed back to the caller and not stored, so the next lookup reads the
/// file again.
#[derive(Debug, Default)]
pub struct DecodeCache {
    resources: HashMap<PathBuf, ResourceFile>,
    materials: HashMap<PathBuf, MaterialFile>,
    meshes: HashMap<PathBuf, Mesh>,
    stats: CacheStats,
}

fn cache_key(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| FormatError::io(path, e))
}

fn cached<'a, T>(
    map: &'a mut HashMap<PathBuf, T>,
    stats: &mut CacheStats,
    path: &Path,
    load: fn(&Path) -> Result<T>,
) -> Result<&'a T> {
    match map.entry(cache_key(path)?) {
        Entry::Occupied(entry) => {
            stats.hits += 1;
            Ok(entry.into_mut())
        }
        Entry::Vacant(entry) => {
            stats.misses += 1;
            let value = load(entry.key())?;
            Ok(entry.insert(value))
        }
    }
}

impl DecodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&mut self, path: &Path) -> Result<&ResourceFile> {
        cached(&mut self.resources, &mut self.stats, path, ResourceFile::load)
    }

    pub fn material(&mut self, path: &Path) -> Result<&MaterialFile> {
        cached(&mut self.materials, &mut self.stats, path, MaterialFile::load)
    }

    pub fn mesh(&mut self, path: &Path) -> Result<&Mesh> {
        cached(&mut self.meshes, &mut self.stats, path, Mesh::load)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of files decoded
    pub fn len(&self) -> usize {
        self.resources.len() + self.materials.len() + self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.resources.clear();
        self.materials.clear();
        self.meshes.clear();
        self.stats = CacheStats::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Hop {
    ObjectId,
    Resource,
    Mesh,
    Material,
    Texture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopIssue {
    pub hop: Hop,
    pub path: Option<PathBuf>,
    /// File is absent, as opposed to present but undecodable
    pub missing: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub object_id: u32,
    /// Descriptors reached, after compound expansion
    pub resources: Vec<PathBuf>,
    pub meshes: Vec<PathBuf>,
    pub materials: Vec<PathBuf>,
    pub textures: Vec<PathBuf>,
    pub issues: Vec<HopIssue>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }

    fn issue(&mut self, hop: Hop, path: Option<&Path>, missing: bool, detail: impl Into<String>) {
        let detail = detail.into();
        match path {
            Some(path) => tracing::warn!("object {}: {:?} hop {}: {}", self.object_id, hop, path.display(), detail),
            None => tracing::warn!("object {}: {:?} hop: {}", self.object_id, hop, detail),
        }
        self.issues.push(HopIssue {
            hop,
            path: path.map(Path::to_path_buf),
            missing,
            detail,
        });
    }

    /// Record a decode failure; the path is already on the issue.
    fn failure(&mut self, hop: Hop, path: &Path, error: &FormatError) {
        self.issue(hop, Some(path), error.is_missing_file(), error.kind().to_string());
    }

    fn push_unique(list: &mut Vec<PathBuf>, path: PathBuf) {
        if !list.contains(&path) {
            list.push(path);
        }
    }
}

/// One resolution session: the object registry plus the cache it fills.
pub struct ResourceResolver {
    data_dir: PathBuf,
    objects: ObjectIndex,
    cache: DecodeCache,
    decode_meshes: bool,
}

impl ResourceResolver {
    pub fn new(data_dir: impl Into<PathBuf>, objects: ObjectIndex) -> Self {
        ResourceResolver {
            data_dir: data_dir.into(),
            objects,
            cache: DecodeCache::new(),
            decode_meshes: false,
        }
    }

    /// Decode every reached mesh instead of only checking it exists.
    pub fn with_mesh_decoding(mut self, decode: bool) -> Self {
        self.decode_meshes = decode;
        self
    }

    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DecodeCache {
        &mut self.cache
    }

    pub fn resolve(&mut self, object_id: u32) -> Resolution {
        let mut resolution = Resolution {
            object_id,
            ..Resolution::default()
        };

        let Some(entry) = self.objects.get(object_id) else {
            resolution.issue(Hop::ObjectId, None, true, "id not listed in object.ifo");
            return resolution;
        };
        let root = self.data_dir.join(&entry.path);

        for descriptor_path in self.expand(&root, &mut resolution) {
            self.resolve_descriptor(&descriptor_path, &mut resolution);
        }

        tracing::debug!(
            "object {}: {} resource(s), {} mesh(es), {} material(s), {} texture(s), {} issue(s)",
            object_id,
            resolution.resources.len(),
            resolution.meshes.len(),
            resolution.materials.len(),
            resolution.textures.len(),
            resolution.issues.len()
        );
        resolution
    }

    /// Descriptor paths behind an object.ifo path; compounds expand one level.
    fn expand(&mut self, root: &Path, resolution: &mut Resolution) -> Vec<PathBuf> {
        if !root.exists() {
            resolution.issue(Hop::Resource, Some(root), true, "file not found");
            return Vec::new();
        }
        let listed = match self.cache.resource(root) {
            Ok(ResourceFile::Descriptor(_)) => return vec![root.to_path_buf()],
            Ok(ResourceFile::Compound(compound)) => compound.resources.clone(),
            Err(e) => {
                resolution.failure(Hop::Resource, root, &e);
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        for relative in listed {
            let path = self.data_dir.join(&relative);
            if path.exists() {
                found.push(path);
            } else {
                resolution.issue(Hop::Resource, Some(&path), true, "compound entry not found");
            }
        }
        found
    }

    fn resolve_descriptor(&mut self, path: &Path, resolution: &mut Resolution) {
        let (meshes, materials) = match self.cache.resource(path) {
            Ok(ResourceFile::Descriptor(res)) => (
                res.mesh_paths().map(|p| self.data_dir.join(p)).collect::<Vec<_>>(),
                res.material_paths().map(|p| self.data_dir.join(p)).collect::<Vec<_>>(),
            ),
            Ok(ResourceFile::Compound(_)) => {
                resolution.issue(Hop::Resource, Some(path), false, "compound nested in a compound");
                return;
            }
            Err(e) => {
                resolution.failure(Hop::Resource, path, &e);
                return;
            }
        };
        Resolution::push_unique(&mut resolution.resources, path.to_path_buf());

        for mesh in meshes {
            if !mesh.exists() {
                resolution.issue(Hop::Mesh, Some(&mesh), true, "mesh not found");
                continue;
            }
            if self.decode_meshes {
                if let Err(e) = self.cache.mesh(&mesh) {
                    resolution.failure(Hop::Mesh, &mesh, &e);
                    continue;
                }
            }
            Resolution::push_unique(&mut resolution.meshes, mesh);
        }

        for material in materials {
            self.resolve_material(&material, resolution);
        }
    }

    fn resolve_material(&mut self, path: &Path, resolution: &mut Resolution) {
        if !path.exists() {
            resolution.issue(Hop::Material, Some(path), true, "material not found");
            return;
        }
        let material_dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        let textures: Vec<PathBuf> = match self.cache.material(path) {
            Ok(bmt) => bmt
                .materials
                .iter()
                .filter(|m| m.has_texture())
                .map(|m| m.texture.resolve(&self.data_dir, &material_dir))
                .collect(),
            Err(e) => {
                resolution.failure(Hop::Material, path, &e);
                return;
            }
        };
        Resolution::push_unique(&mut resolution.materials, path.to_path_buf());

        for texture in textures {
            if texture.exists() {
                Resolution::push_unique(&mut resolution.textures, texture);
            } else {
                resolution.issue(Hop::Texture, Some(&texture), true, "texture not found");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        Material, MaterialOptions, MeshListFlags, ResourceMaterial, ResourceMesh, ResourceOffsets,
        Rgba, TextureRef,
    };

    fn descriptor(meshes: &[&str], materials: &[&str]) -> ResourceDescriptor {
        ResourceDescriptor {
            offsets: ResourceOffsets::default(),
            mesh_flags: MeshListFlags::empty(),
            mod_data: 0,
            reserved: [0; 3],
            resource_type: 0x20000,
            name: "fixture".into(),
            bounds: None,
            materials: materials
                .iter()
                .enumerate()
                .map(|(id, path)| ResourceMaterial {
                    id: id as u32,
                    path: path.to_string(),
                })
                .collect(),
            meshes: meshes
                .iter()
                .map(|path| ResourceMesh {
                    path: path.to_string(),
                    flag: None,
                })
                .collect(),
        }
    }

    fn material(texture: &str, relative_to_root: bool) -> Material {
        Material {
            name: "wall".into(),
            diffuse: Rgba::default(),
            ambient: Rgba::default(),
            specular: Rgba::default(),
            emissive: Rgba::default(),
            parameter: 0.0,
            options: MaterialOptions::DIFFUSE,
            texture: TextureRef {
                path: texture.into(),
                parameter: 1.0,
                flags: [0, 0],
                relative_to_root,
            },
        }
    }

    fn write(root: &Path, relative: &str, bytes: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    /// Data dir with:
    ///   0 -> inn.bsr (mesh present, material with one present and one missing texture)
    ///   1 -> gate.cpd -> [gate.bsr, gone.bsr]; gate.bsr has a missing mesh
    ///   2 -> broken.bsr (not a JMXV file)
    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        write(
            root,
            "res/inn.bsr",
            &descriptor(&["prim/mesh/inn.bms"], &["prim/mtrl/inn.bmt"]).encode().unwrap(),
        );
        write(root, "prim/mesh/inn.bms", b"not decoded unless asked");
        write(
            root,
            "prim/mtrl/inn.bmt",
            &MaterialFile {
                materials: vec![material("inn_wall.ddj", false), material("prim/mtrl/tex/roof.ddj", true)],
            }
            .encode()
            .unwrap(),
        );
        write(root, "prim/mtrl/inn_wall.ddj", b"ddj");

        write(
            root,
            "res/gate.cpd",
            &CompoundFile {
                reserved: 0,
                resources: vec!["res/gate.bsr".into(), "res/gone.bsr".into()],
            }
            .encode()
            .unwrap(),
        );
        write(
            root,
            "res/gate.bsr",
            &descriptor(&["prim/mesh/gate.bms"], &[]).encode().unwrap(),
        );

        write(root, "res/broken.bsr", b"garbage bytes that are long enough");
        dir
    }

    fn objects() -> ObjectIndex {
        ObjectIndex::parse(
            "JMXVOBJI1000\n3\n\
             00000 0x00000000 \"res\\inn.bsr\"\n\
             00001 0x00000000 \"res\\gate.cpd\"\n\
             00002 0x00000000 \"res\\broken.bsr\"\n",
        )
        .unwrap()
    }

    #[test]
    fn test_full_chain_with_missing_texture() {
        let dir = data_dir();
        let mut resolver = ResourceResolver::new(dir.path(), objects());
        let resolution = resolver.resolve(0);

        assert_eq!(resolution.resources, vec![dir.path().join("res/inn.bsr")]);
        assert_eq!(resolution.meshes, vec![dir.path().join("prim/mesh/inn.bms")]);
        assert_eq!(resolution.materials, vec![dir.path().join("prim/mtrl/inn.bmt")]);
        assert_eq!(resolution.textures, vec![dir.path().join("prim/mtrl/inn_wall.ddj")]);
        assert_eq!(resolution.issues.len(), 1);
        let issue = &resolution.issues[0];
        assert_eq!(issue.hop, Hop::Texture);
        assert!(issue.missing);
        assert_eq!(issue.path.as_deref(), Some(dir.path().join("prim/mtrl/tex/roof.ddj").as_path()));
    }

    #[test]
    fn test_compound_expansion() {
        let dir = data_dir();
        let mut resolver = ResourceResolver::new(dir.path(), objects());
        let resolution = resolver.resolve(1);

        assert_eq!(resolution.resources, vec![dir.path().join("res/gate.bsr")]);
        let hops: Vec<(Hop, bool)> = resolution.issues.iter().map(|i| (i.hop, i.missing)).collect();
        assert_eq!(hops, vec![(Hop::Resource, true), (Hop::Mesh, true)]);
        assert!(!resolution.is_complete());
    }

    #[test]
    fn test_unknown_id_and_broken_file() {
        let dir = data_dir();
        let mut resolver = ResourceResolver::new(dir.path(), objects());

        let unknown = resolver.resolve(99);
        assert_eq!(unknown.issues[0].hop, Hop::ObjectId);

        let broken = resolver.resolve(2);
        assert_eq!(broken.issues.len(), 1);
        assert!(!broken.issues[0].missing);
        assert!(broken.issues[0].detail.contains("bad signature"), "{}", broken.issues[0].detail);
        assert!(!unknown.is_complete() && !broken.is_complete());
    }

    #[test]
    fn test_mesh_decoding_reports_bad_mesh() {
        let dir = data_dir();
        let mut resolver = ResourceResolver::new(dir.path(), objects()).with_mesh_decoding(true);
        let resolution = resolver.resolve(0);
        assert!(resolution.meshes.is_empty());
        assert!(resolution.issues.iter().any(|i| i.hop == Hop::Mesh && !i.missing));
    }

    #[test]
    fn test_cache_reuse() {
        let dir = data_dir();
        let mut resolver = ResourceResolver::new(dir.path(), objects());
        resolver.resolve(0);
        let first = resolver.cache().stats();
        assert_eq!(first.hits, 1);
        assert_eq!(first.misses, 2);

        let again = resolver.resolve(0);
        let second = resolver.cache().stats();
        assert_eq!(second.misses, first.misses);
        assert!(second.hits > first.hits);
        assert_eq!(again.textures.len(), 1);

        // Failures are not cached: each lookup of the broken file reads it again.
        resolver.resolve(2);
        resolver.resolve(2);
        assert_eq!(resolver.cache().stats().misses, 4);

        resolver.cache_mut().clear();
        assert!(resolver.cache().is_empty());
        assert_eq!(resolver.cache().stats(), CacheStats::default());
    }

    #[test]
    fn test_failed_decode_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bmt");
        let mut cache = DecodeCache::new();

        std::fs::write(&path, b"garbage").unwrap();
        let err = cache.material(&path).unwrap_err();
        assert!(matches!(err.kind(), FormatError::TruncatedBuffer { .. } | FormatError::BadSignature { .. }));
        assert!(cache.is_empty());

        std::fs::write(&path, MaterialFile { materials: Vec::new() }.encode().unwrap()).unwrap();
        assert!(cache.material(&path).unwrap().materials.is_empty());
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 2 });

        cache.material(&path).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_errors_keep_their_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = DecodeCache::new();

        let err = cache.mesh(&dir.path().join("absent.bms")).unwrap_err();
        assert!(err.is_missing_file());

        let bad = dir.path().join("bad.bms");
        std::fs::write(&bad, b"JMXVBMS 0109 and then some more bytes").unwrap();
        let err = cache.mesh(&bad).unwrap_err();
        assert!(matches!(err.kind(), FormatError::BadSignature { expected: "JMXVBMS 0110", .. }));
    }

    #[test]
    fn test_repaired_resource_resolves() {
        let dir = data_dir();
        let mut resolver = ResourceResolver::new(dir.path(), objects());
        assert!(!resolver.resolve(2).is_complete());

        write(dir.path(), "res/broken.bsr", &descriptor(&[], &[]).encode().unwrap());
        let resolution = resolver.resolve(2);
        assert!(resolution.is_complete(), "{:?}", resolution.issues);
        assert_eq!(resolution.resources, vec![dir.path().join("res/broken.bsr")]);
    }
}
