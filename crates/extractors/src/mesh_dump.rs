// mesh_dump.rs - BMS mesh inspection and rewrite

use std::path::Path;

use anyhow::Context;
use jmx_formats::Mesh;

use crate::batch::run_batch;
use crate::settings::Settings;
use crate::{MeshArgs, MeshRewriteArgs};

fn log_summary(path: &Path, mesh: &Mesh) {
    tracing::info!(
        "{}: {:?} material={:?} vertices={} faces={} groups={} vertex_cloth={} edge_cloth={} lightmap={}",
        path.display(),
        mesh.name,
        mesh.material,
        mesh.vertices.len(),
        mesh.faces.len(),
        mesh.vertex_groups.len(),
        mesh.vertex_clothes.len(),
        mesh.edge_clothes.len(),
        mesh.lightmap_path.as_deref().unwrap_or("-")
    );
    if let Some(nav) = &mesh.navmesh {
        let topology = nav.topology();
        tracing::info!(
            "{}: navmesh vertices={} cells={} global_edges={} internal_edges={} events={} grid={}x{}",
            path.display(),
            nav.vertices.len(),
            nav.cells.len(),
            topology.global_edges().count(),
            topology.internal_edges().count(),
            nav.events.len(),
            nav.lookup_grid.width,
            nav.lookup_grid.height
        );
    }
}

pub fn run_mesh(args: MeshArgs, _settings: &Settings) -> anyhow::Result<()> {
    run_batch("mesh", &args.files, |path| {
        let mesh = Mesh::load(path)?;
        log_summary(path, &mesh);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&mesh)?);
        }
        Ok(())
    })?;
    Ok(())
}

pub fn run_mesh_rewrite(args: MeshRewriteArgs, settings: &Settings) -> anyhow::Result<()> {
    let overwrite = args.overwrite || settings.overwrite;
    if args.output.exists() && !overwrite {
        anyhow::bail!(
            "Output exists: {} (pass --overwrite or set Overwrite = 1)",
            args.output.display()
        );
    }

    let mesh = Mesh::load(&args.input)?;
    log_summary(&args.input, &mesh);
    mesh.save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    tracing::info!("{} -> {}", args.input.display(), args.output.display());
    Ok(())
}
