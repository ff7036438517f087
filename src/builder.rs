// Batch orchestration: enumerate transit records, pair them with
// existing road tiles, and rebuild each tile across worker threads.
//
// Workers lock the shared store only around (a) reading a tile and
// constructing its builder and (b) committing the rewritten tile; the
// build itself is thread-local. Source ids translate to final ids
// through `tile_node_counts`, computed up front for every
// participating tile so no locks are needed during translation.

use crate::config::BuilderConfig;
use crate::departures::{build_stop_edges, process_stop_pairs};
use crate::formats::graph_tile::{TransitStop, load_pbf};
use crate::formats::transit_tile::TransitTile;
use crate::graph_id::GraphId;
use crate::hierarchy::{TRANSIT_TILE_EXT, TileHierarchy};
use crate::rewrite::{add_routes, add_to_graph};
use crate::snapping::{add_stop_connections, sort_connection_edges};
use crate::store::{GraphTileBuilder, TileStore};
use ahash::AHashMap;
use anyhow::{Context, Result};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

/// Per-worker counters, merged by the main thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuilderStats {
    pub tiles_built: u32,
    pub stops: u32,
    pub departures: u32,
    pub connection_edges: u32,
}

impl BuilderStats {
    pub fn merge(&mut self, other: &BuilderStats) {
        self.tiles_built += other.tiles_built;
        self.stops += other.stops;
        self.departures += other.departures;
        self.connection_edges += other.connection_edges;
    }
}

/// Load the transit record for a tile.
pub fn read_transit_tile(
    transit_dir: &Path,
    hierarchy: &TileHierarchy,
    id: GraphId,
) -> Result<TransitTile> {
    let path = transit_dir.join(hierarchy.file_suffix(id.tile_base(), TRANSIT_TILE_EXT));
    load_pbf(&path).with_context(|| format!("Couldn't load {}", path.display()))
}

fn collect_transit_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_transit_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(TRANSIT_TILE_EXT) {
            out.push(path);
        }
    }
    Ok(())
}

/// Worker loop over a contiguous range of tiles.
fn build_tiles(
    tile_ids: &[GraphId],
    transit_dir: &Path,
    tile_dir: &Path,
    hierarchy: &TileHierarchy,
    tile_node_counts: &AHashMap<u64, usize>,
    lock: &Mutex<()>,
) -> Result<BuilderStats> {
    // Local reader; the shared mutex only guards the backing files.
    let mut store = TileStore::new(tile_dir, hierarchy.clone());
    let mut stats = BuilderStats::default();

    for &tile_id in tile_ids {
        if store.over_committed() {
            store.clear();
        }

        let transit_path = transit_dir.join(hierarchy.file_suffix(tile_id, TRANSIT_TILE_EXT));
        if !transit_path.is_file() {
            error!("File not found.  {}", transit_path.display());
            return Ok(stats);
        }
        let transit: TransitTile = match load_pbf(&transit_path) {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to parse file: {}: {}", transit_path.display(), e);
                return Ok(stats);
            }
        };

        // Read-only tile for reference plus a writable builder
        // deserialized from it, both under the store lock.
        let (tile, mut builder) = {
            let _guard = lock.lock().unwrap();
            let tile = store.get_graph_tile(tile_id)?;
            let builder = GraphTileBuilder::from_tile(&tile);
            (tile, builder)
        };

        if transit.stops.is_empty() {
            info!(
                "Tile {}: transit record has no stops, tile left untouched",
                tile_id.tile_id()
            );
            continue;
        }

        // Connect each stop to 1 or 2 road nodes along the closest
        // edge of its OSM way, and record the stop in the transit
        // stop table.
        let mut connection_edges = Vec::new();
        for stop in &transit.stops {
            add_stop_connections(stop, &tile, hierarchy, &mut connection_edges);
            let onestop_offset = builder.add_name(&stop.onestop_id);
            let name_offset = builder.add_name(&stop.name);
            builder.add_transit_stop(TransitStop {
                onestop_offset,
                name_offset,
            });
        }
        sort_connection_edges(&mut connection_edges);
        info!(
            "Tile {}: added {} stops and {} connection edges",
            tile_id.tile_id(),
            transit.stops.len(),
            connection_edges.len()
        );

        let extracted = process_stop_pairs(&transit, builder.date_created, tile_id)?;
        let departure_count: usize = extracted.departures.values().map(Vec::len).sum();

        let (stop_edge_map, _route_keys) = build_stop_edges(&transit, &extracted, &mut builder);
        let route_types = add_routes(&transit, &mut builder, tile_id);

        add_to_graph(
            &mut builder,
            &transit,
            &stop_edge_map,
            &extracted.stop_access,
            &connection_edges,
            &route_types,
            tile_node_counts,
            transit_dir,
            hierarchy,
        );

        // Commit. A failure here leaves the original tile in place.
        let data = builder.to_tile_data();
        {
            let _guard = lock.lock().unwrap();
            store.store_tile(&data)?;
        }

        stats.tiles_built += 1;
        stats.stops += transit.stops.len() as u32;
        stats.departures += departure_count as u32;
        stats.connection_edges += connection_edges.len() as u32;
    }

    Ok(stats)
}

/// Add transit to the graph. No-op when no transit directory is
/// configured or no transit record matches an existing road tile.
pub fn build(config: &BuilderConfig) -> Result<()> {
    let t1 = Instant::now();

    let Some(transit_dir) = config.transit_dir.as_deref() else {
        info!("Transit directory not found. Transit will not be added.");
        return Ok(());
    };
    if !transit_dir.is_dir() {
        info!("Transit directory not found. Transit will not be added.");
        return Ok(());
    }

    let hierarchy = config.hierarchy.to_hierarchy();
    let tile_dir = config.hierarchy.tile_dir.as_path();
    let local_level = hierarchy.local_level();

    let level_dir = transit_dir.join(local_level.to_string());
    let mut transit_files = Vec::new();
    if level_dir.is_dir() {
        collect_transit_files(&level_dir, &mut transit_files)?;
    }

    // Pair each transit record with its road tile and remember every
    // participating tile's prior node count. Stops must connect to
    // the road network, so records without a road tile are excluded.
    let mut store = TileStore::new(tile_dir, hierarchy.clone());
    let mut tile_node_counts: AHashMap<u64, usize> = AHashMap::new();
    let mut transit_tiles: Vec<GraphId> = Vec::new();
    for path in transit_files {
        let graph_id = match hierarchy.graph_id_from_path(&path) {
            Ok(id) => id.tile_base(),
            Err(e) => {
                error!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        if !store.does_tile_exist(graph_id) {
            continue;
        }
        let tile = store.get_graph_tile(graph_id)?;
        tile_node_counts.insert(graph_id.value(), tile.nodes.len());
        transit_tiles.push(graph_id);
    }
    drop(store);

    if transit_tiles.is_empty() {
        info!("No transit tiles found. Transit will not be added.");
        return Ok(());
    }
    transit_tiles.sort();

    let thread_count = config
        .concurrency
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1);

    info!(
        "Adding {} transit tiles to the local graph...",
        transit_tiles.len()
    );

    let lock = Mutex::new(());
    let mut stats = BuilderStats::default();

    // Contiguous range split; the first `len mod n` workers take the
    // ceiling.
    let floor = transit_tiles.len() / thread_count;
    let at_ceiling = transit_tiles.len() - thread_count * floor;

    std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(thread_count);
        let mut start = 0usize;
        for i in 0..thread_count {
            let tile_count = if i < at_ceiling { floor + 1 } else { floor };
            let range = &transit_tiles[start..start + tile_count];
            start += tile_count;

            let counts = &tile_node_counts;
            let lock = &lock;
            let hierarchy = &hierarchy;
            handles.push(s.spawn(move || {
                build_tiles(range, transit_dir, tile_dir, hierarchy, counts, lock)
            }));
        }

        // A failed worker degrades the batch, it does not abort it.
        for handle in handles {
            match handle.join() {
                Ok(Ok(worker_stats)) => stats.merge(&worker_stats),
                Ok(Err(e)) => error!("Worker failed: {:#}", e),
                Err(_) => error!("Worker thread panicked"),
            }
        }
    });

    info!(
        "Finished - transit builder took {} secs: {} tiles, {} stops, {} departures, {} connection edges",
        t1.elapsed().as_secs(),
        stats.tiles_built,
        stats.stops,
        stats.departures,
        stats.connection_edges
    );
    Ok(())
}
