// jmx-formats - codecs for JMXV client asset files
//
// Binary meshes with embedded navigation data, terrain blocks, object
// placements, standalone navmeshes, resource/material chains and the
// text registries that tie object ids to paths.

pub mod cache;
pub mod edge_key;
pub mod geometry;
pub mod ifo;
pub mod mesh;
pub mod navmesh;
pub mod nvm;
pub mod placement;
pub mod resource;
pub mod terrain;
pub mod texture;

pub use edge_key::EdgeKey;
pub use jmx_shared::{ByteCursor, FormatError, Result, SeekOrigin};
pub use mesh::Mesh;
pub use navmesh::NavMesh;
