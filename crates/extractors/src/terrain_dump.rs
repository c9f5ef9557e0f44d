// terrain_dump.rs - .m terrain inspection

use jmx_formats::ifo::TileIndex;
use jmx_formats::terrain::{TerrainFile, TextureMask, region_of};

use crate::TerrainArgs;
use crate::batch::run_batch;
use crate::settings::Settings;

/// tile2d.ifo, when a Map folder is configured and holds one
fn load_tiles(settings: &Settings) -> Option<TileIndex> {
    let path = settings.tile_index_path()?;
    match TileIndex::load(&path) {
        Ok(index) => Some(index),
        Err(e) if e.is_missing_file() => {
            tracing::debug!("no tile index at {}", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("tile index unusable: {}", e);
            None
        }
    }
}

pub fn run_terrain(args: TerrainArgs, settings: &Settings) -> anyhow::Result<()> {
    let mask = if args.legacy_texture_mask {
        TextureMask::Legacy
    } else {
        settings.texture_mask
    };
    let tiles = load_tiles(settings);

    run_batch("terrain", &args.files, |path| {
        let terrain = TerrainFile::load(path)?;
        let region = region_of(path)
            .map(|(column, row)| format!("{}x{}", column, row))
            .unwrap_or_else(|| "?".to_string());
        let textures = terrain.texture_ids(mask);

        match terrain.height_range() {
            Some((low, high)) => tracing::info!(
                "{}: region {} blocks={} height {:.2}..{:.2} textures={}",
                path.display(),
                region,
                terrain.blocks.len(),
                low,
                high,
                textures.len()
            ),
            None => tracing::info!("{}: region {} has no vertices", path.display(), region),
        }

        for id in &textures {
            match tiles.as_ref().map(|t| t.get(*id)) {
                Some(Some(tile)) => tracing::debug!("  texture {} = {}/{}", id, tile.category, tile.file),
                Some(None) => tracing::warn!("{}: texture {} not in tile2d.ifo", path.display(), id),
                None => tracing::debug!("  texture {}", id),
            }
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&terrain)?);
        }
        Ok(())
    })?;
    Ok(())
}
