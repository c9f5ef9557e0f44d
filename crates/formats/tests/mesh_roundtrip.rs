use approx::assert_abs_diff_eq;
use byteorder::{ByteOrder, LittleEndian};
use jmx_formats::mesh::{
    BoundingBox, ClothSettings, EdgeCloth, Mesh, MeshVertex, OFFSET_TABLE_POS, SectionOffsets, VertexCloth,
    VertexGroup, VertexWeight,
};
use jmx_formats::navmesh::{CollisionEdge, EdgeFlags, NavMesh, NavVertex};
use jmx_formats::{ByteCursor, EdgeKey};

/// Hand-laid three-vertex mesh with a zeroed offset table.
fn scenario_bytes() -> Vec<u8> {
    let mut buf = ByteCursor::new();
    buf.write_fixed_string("JMXVBMS 0110").unwrap();
    for _ in 0..10 {
        buf.write_u32(0);
    }
    buf.write_u32(0); // reserved
    buf.write_u32(0); // nav flags
    buf.write_u32(1); // sub-primitive count
    buf.write_u32(0); // vertex flags
    buf.write_u32(0);
    buf.write_string("tri").unwrap();
    buf.write_string("mat").unwrap();
    buf.write_u32(0);

    // vertices
    buf.write_u32(3);
    let corners = [([0.0f32, 0.0, 0.0], [0.0f32, 1.0]), ([10.0, 0.0, 0.0], [1.0, 1.0]), ([0.0, 10.0, 0.0], [0.0, 0.5])];
    for (p, uv) in corners {
        // X, Z, Y
        buf.write_f32(p[0]);
        buf.write_f32(p[2]);
        buf.write_f32(p[1]);
        // normal (0, 0, 1) stored X, Z, Y
        buf.write_f32(0.0);
        buf.write_f32(1.0);
        buf.write_f32(0.0);
        buf.write_f32(uv[0]);
        buf.write_f32(uv[1]);
        buf.write_f32(0.0);
        buf.write_u32(0xFFFF_FFFF);
        buf.write_u32(0);
    }
    buf.write_u32(0); // vertex groups
    buf.write_u32(1); // faces
    buf.write_u16(0);
    buf.write_u16(1);
    buf.write_u16(2);
    buf.write_u32(0); // vertex cloth
    buf.write_u32(0); // edge cloth
    for v in [0.0f32, 0.0, 0.0, 10.0, 0.0, 10.0] {
        buf.write_f32(v);
    }
    buf.write_u32(0); // occlusion portals
    buf.write_u32(0); // unknown
    buf.into_inner()
}

#[test]
fn three_vertex_scenario_reencodes_identically() {
    let input = scenario_bytes();
    let mesh = Mesh::decode(input.clone()).unwrap();

    assert_eq!(mesh.name, "tri");
    assert_eq!(mesh.material, "mat");
    assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    assert!(mesh.vertex_clothes.is_empty());
    assert!(mesh.edge_clothes.is_empty());
    assert!(mesh.vertex_groups.is_empty());
    assert!(mesh.navmesh.is_none());
    assert_eq!(mesh.vertices[1].position, [10.0, 0.0, 0.0]);
    assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
    assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
    assert_eq!(mesh.vertices[2].uv, [0.0, 0.5]);
    // stored X, Z, Y = 10, 0, 10
    assert_eq!(mesh.bounding_box.max, [10.0, 10.0, 0.0]);

    let encoded = mesh.encode().unwrap();
    assert_eq!(encoded.len(), input.len());
    assert_eq!(&encoded[..OFFSET_TABLE_POS], &input[..OFFSET_TABLE_POS]);
    assert_eq!(&encoded[52..], &input[52..]);

    let table: Vec<u32> = (0..10)
        .map(|slot| LittleEndian::read_u32(&encoded[OFFSET_TABLE_POS + slot * 4..]))
        .collect();
    // header 72 + "tri" 7 + "mat" 7 + reserved 4
    let vertices = 90;
    let groups = vertices + 4 + 3 * 44;
    let faces = groups + 4;
    let vertex_cloth = faces + 4 + 6;
    let edge_cloth = vertex_cloth + 4;
    let bbox = edge_cloth + 4;
    let occlusion = bbox + 24;
    let unknown = occlusion + 4;
    assert_eq!(
        table,
        vec![vertices, groups, faces, vertex_cloth, edge_cloth, bbox, occlusion, 0, 0, unknown]
    );
    assert_eq!(unknown as usize + 4, encoded.len());

    // The section starts hold the counts we wrote.
    assert_eq!(LittleEndian::read_u32(&encoded[vertices as usize..]), 3);
    assert_eq!(LittleEndian::read_u32(&encoded[faces as usize..]), 1);
}

#[test]
fn write_to_returns_the_patched_table() {
    let mesh = Mesh::decode(scenario_bytes()).unwrap();
    let mut cursor = ByteCursor::new();
    let offsets = mesh.write_to(&mut cursor).unwrap();
    cursor.seek(OFFSET_TABLE_POS as i64, jmx_formats::SeekOrigin::Begin).unwrap();
    assert_eq!(SectionOffsets::read_from(&mut cursor).unwrap(), offsets);
    assert_eq!(offsets.navmesh, 0);
}

fn grid_mesh(groups: usize, edge_cloth: bool) -> Mesh {
    let mut vertices = Vec::new();
    for y in 0..3 {
        for x in 0..3 {
            vertices.push(MeshVertex {
                position: [x as f32 * 1.5, y as f32 * 2.25, 0.125 * x as f32],
                normal: [0.0, 0.0, 1.0],
                uv: [x as f32 / 2.0, 0.3 * y as f32],
            });
        }
    }
    let faces = vec![[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4], [3, 4, 7], [3, 7, 6], [4, 5, 8], [4, 8, 7]];

    let mut mesh = Mesh {
        name: "cloth_banner".into(),
        material: "banner_red".into(),
        bounding_box: BoundingBox::from_points(vertices.iter().map(|v| &v.position)),
        vertices,
        faces,
        ..Mesh::default()
    };

    match groups {
        0 => {}
        1 => mesh.vertex_groups.push(VertexGroup {
            name: "root".into(),
            weights: (0..9).map(|vertex| VertexWeight { vertex, weight: 1.0 }).collect(),
        }),
        _ => {
            mesh.vertex_groups.push(VertexGroup {
                name: "root".into(),
                weights: (0..9).map(|vertex| VertexWeight { vertex, weight: 0.75 }).collect(),
            });
            mesh.vertex_groups.push(VertexGroup {
                name: "tip".into(),
                weights: (3..9).map(|vertex| VertexWeight { vertex, weight: 0.25 }).collect(),
            });
        }
    }

    if edge_cloth {
        for index in 0..9u32 {
            mesh.vertex_clothes.insert(
                index,
                VertexCloth {
                    distance: if index < 3 { 0.0 } else { 0.5 * index as f32 },
                    pinned: index < 3,
                },
            );
        }
        for (a, b) in [(4u32, 3u32), (4, 5), (7, 4)] {
            mesh.edge_clothes.insert(EdgeKey::new(a, b), EdgeCloth { a, b, distance: 1.75 });
        }
        mesh.cloth_settings = Some(ClothSettings {
            deformation_type: 1,
            offset: [0.5, -0.25, 2.0],
            speed: 3.5,
            elasticity: 0.8,
            movements: 12,
        });
    }
    mesh
}

fn assert_round_trip(mesh: &Mesh) {
    let back = Mesh::decode(mesh.encode().unwrap()).unwrap();

    assert_eq!(back.faces, mesh.faces);
    assert_eq!(back.vertices.len(), mesh.vertices.len());
    for (got, want) in back.vertices.iter().zip(&mesh.vertices) {
        for axis in 0..3 {
            assert_abs_diff_eq!(got.position[axis], want.position[axis], epsilon = 1e-6);
        }
        assert_abs_diff_eq!(got.uv[1], want.uv[1], epsilon = 1e-6);
    }

    assert_eq!(back.vertex_groups.len(), mesh.vertex_groups.len());
    for (got, want) in back.vertex_groups.iter().zip(&mesh.vertex_groups) {
        assert_eq!(got.name, want.name);
        assert_eq!(got.weights.len(), want.weights.len());
        for (gw, ww) in got.weights.iter().zip(&want.weights) {
            assert_eq!(gw.vertex, ww.vertex);
            assert_abs_diff_eq!(gw.weight, ww.weight, epsilon = 1e-3);
        }
    }

    assert_eq!(back.vertex_clothes, mesh.vertex_clothes);
    assert_eq!(back.edge_clothes, mesh.edge_clothes);
    assert_eq!(back.cloth_settings, mesh.cloth_settings);
    assert_eq!(back.bounding_box, mesh.bounding_box);
}

#[test]
fn round_trip_without_groups() {
    assert_round_trip(&grid_mesh(0, false));
    assert_round_trip(&grid_mesh(0, true));
}

#[test]
fn round_trip_with_one_group() {
    assert_round_trip(&grid_mesh(1, false));
    assert_round_trip(&grid_mesh(1, true));
}

#[test]
fn round_trip_with_two_groups() {
    assert_round_trip(&grid_mesh(2, false));
    assert_round_trip(&grid_mesh(2, true));
}

#[test]
fn cloth_block_layout() {
    let mesh = grid_mesh(0, true);
    let mut cursor = ByteCursor::new();
    let offsets = mesh.write_to(&mut cursor).unwrap();
    let bytes = cursor.into_inner();

    let at = offsets.vertex_clothes as usize;
    assert_eq!(LittleEndian::read_u32(&bytes[at..]), 9);
    // vertex 0 pinned
    assert_eq!(LittleEndian::read_u32(&bytes[at + 8..]), 1);

    let at = offsets.edge_clothes as usize;
    assert_eq!(LittleEndian::read_u32(&bytes[at..]), 3);
    // order block follows the three 12-byte records
    let order = at + 4 + 3 * 12;
    assert_eq!(LittleEndian::read_u32(&bytes[order + 8..]), 2);
    // sim params: type, x, z, y, speed, 1.0, 1.0, elasticity, movements
    let params = order + 12;
    assert_eq!(LittleEndian::read_u32(&bytes[params..]), 1);
    assert_eq!(LittleEndian::read_f32(&bytes[params + 8..]), 2.0);
    assert_eq!(LittleEndian::read_f32(&bytes[params + 20..]), 1.0);
    assert_eq!(LittleEndian::read_i32(&bytes[params + 32..]), 12);
    assert_eq!(params + 36, offsets.bounding_box as usize);
}

#[test]
fn embedded_navmesh_round_trip() {
    let mut mesh = grid_mesh(0, false);
    let mut nav = NavMesh {
        vertices: mesh
            .vertices
            .iter()
            .map(|v| NavVertex {
                position: [v.position[0] * 100.0, v.position[1] * 100.0, 0.0],
                normal_index: 0,
            })
            .collect(),
        cells: mesh.faces.clone(),
        events: vec!["gate".into()],
        ..NavMesh::default()
    };
    nav.edges.insert(
        EdgeKey::new(0, 1),
        CollisionEdge {
            is_global: true,
            flags: EdgeFlags::ENTRANCE,
        },
    );
    mesh.navmesh = Some(nav);

    let bytes = mesh.encode().unwrap();
    let offsets = SectionOffsets::read_from(&mut {
        let mut c = ByteCursor::from_bytes(bytes.clone());
        c.seek(OFFSET_TABLE_POS as i64, jmx_formats::SeekOrigin::Begin).unwrap();
        c
    })
    .unwrap();
    assert_eq!(offsets.navmesh, offsets.unknown + 4);
    // nav flags announce the event list
    assert_eq!(LittleEndian::read_u32(&bytes[56..]), 4);

    let back = Mesh::decode(bytes).unwrap();
    let nav = back.navmesh.unwrap();
    assert_eq!(nav.cells, mesh.faces);
    assert_eq!(nav.events, vec!["gate".to_string()]);
    // 3x3 grid of vertices: 8 outline edges, 8 shared
    assert_eq!(nav.edges.values().filter(|e| e.is_global).count(), 8);
    assert_eq!(nav.edges.values().filter(|e| !e.is_global).count(), 8);
    assert_eq!(nav.edges[&EdgeKey::new(1, 0)].flags, EdgeFlags::ENTRANCE | EdgeFlags::GLOBAL);
    // 300 x 450 units
    assert_eq!((nav.lookup_grid.width, nav.lookup_grid.height), (3, 5));
    // centre vertex touches no outline edge
    assert_eq!(nav.vertices[4].normal_index, 0);
}
