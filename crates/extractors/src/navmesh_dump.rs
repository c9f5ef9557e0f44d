// navmesh_dump.rs - standalone region navmesh (.nvm) inspection

use jmx_formats::nvm::{NvmFile, region_from_stem};

use crate::NavmeshArgs;
use crate::batch::run_batch;
use crate::settings::Settings;

pub fn run_navmesh(args: NavmeshArgs, _settings: &Settings) -> anyhow::Result<()> {
    run_batch("navmesh", &args.files, |path| {
        let nvm = NvmFile::load(path)?;
        let region = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(region_from_stem)
            .map(|id| format!("0x{:04X}", id))
            .unwrap_or_else(|| "?".to_string());

        tracing::info!(
            "{}: region {} objects={} cells={} (walkable {}) global_edges={} internal_edges={}",
            path.display(),
            region,
            nvm.objects.len(),
            nvm.cells.len(),
            nvm.walkable_cells,
            nvm.global_edges.len(),
            nvm.internal_edges.len()
        );
        for object in &nvm.objects {
            tracing::debug!(
                "  asset {} uid {} at {:?} struct={} links={}",
                object.asset_id,
                object.local_uid,
                object.position,
                object.is_struct(),
                object.links.len()
            );
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&nvm)?);
        }
        Ok(())
    })?;
    Ok(())
}
