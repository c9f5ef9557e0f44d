// placement_dump.rs - .o/.o2 placement inspection and object resolution

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use jmx_formats::cache::ResourceResolver;
use jmx_formats::ifo::ObjectIndex;
use jmx_formats::placement::{PlacementFile, PlacementVariant};

use crate::PlacementArgs;
use crate::batch::run_batch;
use crate::settings::Settings;

fn variant_for(path: &Path, region_ids: bool) -> PlacementVariant {
    if region_ids {
        return PlacementVariant::WithRegion;
    }
    PlacementVariant::from_path(path).unwrap_or(PlacementVariant::Plain)
}

fn open_resolver(settings: &Settings, decode_meshes: bool) -> anyhow::Result<ResourceResolver> {
    let data_dir = settings.require_data_dir()?;
    let index_path = settings.object_index_path()?;
    let objects = ObjectIndex::load(&index_path)
        .with_context(|| format!("Failed to read object registry {}", index_path.display()))?;
    tracing::info!("{}: {} objects", index_path.display(), objects.len());
    Ok(ResourceResolver::new(data_dir, objects).with_mesh_decoding(decode_meshes))
}

pub fn run_placements(args: PlacementArgs, settings: &Settings) -> anyhow::Result<()> {
    // One resolver, and so one decode cache, for the whole invocation.
    let mut resolver = if args.resolve {
        Some(open_resolver(settings, args.decode_meshes)?)
    } else {
        None
    };
    let mut incomplete = BTreeSet::new();

    run_batch("placements", &args.files, |path| {
        let file = PlacementFile::load(path, Some(variant_for(path, args.region_ids)))?;
        let ids: BTreeSet<u32> = file.entries().map(|(_, _, e)| e.object_id).collect();
        tracing::info!(
            "{}: {:?} entries={} distinct objects={}",
            path.display(),
            file.variant,
            file.entries().count(),
            ids.len()
        );
        for (cell, lod, entry) in file.entries() {
            tracing::trace!(
                "  cell ({}, {}) lod {} object {} at {:?} yaw {:.3} uid {}",
                cell.column,
                cell.row,
                lod,
                entry.object_id,
                entry.position,
                entry.yaw,
                entry.unique_id
            );
        }

        if let Some(resolver) = resolver.as_mut() {
            for id in ids {
                let resolution = resolver.resolve(id);
                if !resolution.is_complete() {
                    incomplete.insert(id);
                }
                tracing::debug!(
                    "  object {}: {} mesh(es), {} texture(s)",
                    id,
                    resolution.meshes.len(),
                    resolution.textures.len()
                );
            }
        }
        Ok(())
    })?;

    if let Some(resolver) = &resolver {
        let stats = resolver.cache().stats();
        tracing::info!(
            "resolution: {} object(s) with broken hops, cache {} decoded, {} hit(s), {} miss(es)",
            incomplete.len(),
            resolver.cache().len(),
            stats.hits,
            stats.misses
        );
    }
    Ok(())
}
