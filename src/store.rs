// Tile store: read side with a capacity-bounded cache, and the
// builder used to rewrite one tile.

use crate::formats::graph_tile::{
    AccessRestriction, DirectedEdge, EdgeInfo, GraphTileData, NodeInfo, Sign, TransitDeparture,
    TransitRoute, TransitStop, load_pbf, save_pbf,
};
use crate::geometry::shape_to_coords;
use crate::graph_id::GraphId;
use crate::hierarchy::{ROAD_TILE_EXT, TileHierarchy};
use ahash::AHashMap;
use anyhow::{Context, Result};
use geo::Point;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CACHE_TILES: usize = 64;

/// Read access to the tile set. Each worker holds its own store; the
/// backing file set is guarded by the orchestrator's mutex.
pub struct TileStore {
    tile_dir: PathBuf,
    pub hierarchy: TileHierarchy,
    cache: AHashMap<u64, Arc<GraphTileData>>,
    cache_order: VecDeque<u64>,
    max_cached: usize,
}

impl TileStore {
    pub fn new(tile_dir: &Path, hierarchy: TileHierarchy) -> Self {
        TileStore {
            tile_dir: tile_dir.to_path_buf(),
            hierarchy,
            cache: AHashMap::new(),
            cache_order: VecDeque::new(),
            max_cached: DEFAULT_CACHE_TILES,
        }
    }

    pub fn tile_path(&self, id: GraphId) -> PathBuf {
        self.tile_dir
            .join(self.hierarchy.file_suffix(id.tile_base(), ROAD_TILE_EXT))
    }

    pub fn does_tile_exist(&self, id: GraphId) -> bool {
        self.tile_path(id).is_file()
    }

    /// Memory budget check; callers clear the cache between tiles
    /// when this trips.
    pub fn over_committed(&self) -> bool {
        self.cache.len() >= self.max_cached
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.cache_order.clear();
    }

    pub fn get_graph_tile(&mut self, id: GraphId) -> Result<Arc<GraphTileData>> {
        let key = id.tile_base().value();
        if let Some(tile) = self.cache.get(&key) {
            // Promote to back (recently used).
            if let Some(pos) = self.cache_order.iter().position(|&k| k == key) {
                self.cache_order.remove(pos);
                self.cache_order.push_back(key);
            }
            return Ok(tile.clone());
        }

        let path = self.tile_path(id);
        let tile: GraphTileData = load_pbf(&path)
            .with_context(|| format!("Couldn't load {}", path.display()))?;
        let tile = Arc::new(tile);

        if self.cache.len() >= self.max_cached {
            if let Some(old_key) = self.cache_order.pop_front() {
                self.cache.remove(&old_key);
            }
        }
        self.cache.insert(key, tile.clone());
        self.cache_order.push_back(key);
        Ok(tile)
    }

    /// Commit a rebuilt tile to disk, replacing the original file.
    pub fn store_tile(&mut self, data: &GraphTileData) -> Result<()> {
        let id = GraphId::from_value(data.graphid);
        let path = self.tile_path(id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        save_pbf(data, &path).with_context(|| format!("Couldn't store {}", path.display()))?;

        // Drop any stale cached copy.
        let key = id.tile_base().value();
        if self.cache.remove(&key).is_some() {
            if let Some(pos) = self.cache_order.iter().position(|&k| k == key) {
                self.cache_order.remove(pos);
            }
        }
        Ok(())
    }
}

/// Mutable tile under rebuild. Deserialized from an existing tile so
/// new strings and edge infos intern against the existing pools.
pub struct GraphTileBuilder {
    pub graphid: u64,
    pub date_created: u32,
    pub nodes: Vec<NodeInfo>,
    pub directed_edges: Vec<DirectedEdge>,
    pub signs: Vec<Sign>,
    pub access_restrictions: Vec<AccessRestriction>,
    pub edge_infos: Vec<EdgeInfo>,
    pub transit_routes: Vec<TransitRoute>,
    pub transit_stops: Vec<TransitStop>,
    pub transit_departures: Vec<TransitDeparture>,
    pub names: Vec<String>,
    name_index: AHashMap<String, u32>,
    /// (way_id, unordered endpoint pair) -> offset. Lets the reverse
    /// half of an edge pair find the shape its forward half stored.
    edge_info_index: AHashMap<(u64, u64, u64), u32>,
}

impl GraphTileBuilder {
    pub fn from_tile(tile: &GraphTileData) -> Self {
        let mut name_index = AHashMap::with_capacity(tile.names.len());
        for (i, name) in tile.names.iter().enumerate() {
            name_index.entry(name.clone()).or_insert(i as u32);
        }
        GraphTileBuilder {
            graphid: tile.graphid,
            date_created: tile.date_created,
            nodes: tile.nodes.clone(),
            directed_edges: tile.directed_edges.clone(),
            signs: tile.signs.clone(),
            access_restrictions: tile.access_restrictions.clone(),
            edge_infos: tile.edge_infos.clone(),
            transit_routes: tile.transit_routes.clone(),
            transit_stops: tile.transit_stops.clone(),
            transit_departures: tile.transit_departures.clone(),
            names: tile.names.clone(),
            name_index,
            edge_info_index: AHashMap::new(),
        }
    }

    /// Intern a string into the tile's name pool, returning its
    /// offset. Repeated adds of the same string share one entry.
    pub fn add_name(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.name_index.get(name) {
            return offset;
        }
        let offset = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), offset);
        offset
    }

    /// Add an edge info record, deduplicated on (way_id, endpoint
    /// pair). Returns (offset, added): `added == false` means the
    /// record already existed, i.e. the caller's edge is the reverse
    /// orientation of the stored shape.
    pub fn add_edge_info(
        &mut self,
        way_id: u64,
        from: GraphId,
        to: GraphId,
        shape: &[Point<f64>],
    ) -> (u32, bool) {
        let (lo, hi) = if from.value() <= to.value() {
            (from.value(), to.value())
        } else {
            (to.value(), from.value())
        };
        if let Some(&offset) = self.edge_info_index.get(&(way_id, lo, hi)) {
            return (offset, false);
        }
        let offset = self.edge_infos.len() as u32;
        self.edge_infos.push(EdgeInfo {
            way_id,
            coords: shape_to_coords(shape),
            name_offsets: vec![],
        });
        self.edge_info_index.insert((way_id, lo, hi), offset);
        (offset, true)
    }

    pub fn add_transit_route(&mut self, route: TransitRoute) {
        self.transit_routes.push(route);
    }

    pub fn add_transit_stop(&mut self, stop: TransitStop) {
        self.transit_stops.push(stop);
    }

    pub fn add_transit_departure(&mut self, departure: TransitDeparture) {
        self.transit_departures.push(departure);
    }

    pub fn to_tile_data(&self) -> GraphTileData {
        GraphTileData {
            graphid: self.graphid,
            date_created: self.date_created,
            nodes: self.nodes.clone(),
            directed_edges: self.directed_edges.clone(),
            edge_infos: self.edge_infos.clone(),
            signs: self.signs.clone(),
            access_restrictions: self.access_restrictions.clone(),
            transit_routes: self.transit_routes.clone(),
            transit_stops: self.transit_stops.clone(),
            transit_departures: self.transit_departures.clone(),
            names: self.names.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_tile(graphid: u64) -> GraphTileData {
        GraphTileData {
            graphid,
            date_created: 730,
            names: vec!["existing".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_add_name_dedupes() {
        let mut builder = GraphTileBuilder::from_tile(&empty_tile(1));
        // Interning dedupes against the pre-existing pool too.
        assert_eq!(builder.add_name("existing"), 0);
        let a = builder.add_name("Downtown");
        let b = builder.add_name("Uptown");
        assert_ne!(a, b);
        assert_eq!(builder.add_name("Downtown"), a);
        assert_eq!(builder.names.len(), 3);
    }

    #[test]
    fn test_add_edge_info_pairs() {
        let mut builder = GraphTileBuilder::from_tile(&empty_tile(1));
        let from = GraphId::new(10, 2, 0);
        let to = GraphId::new(10, 2, 5);
        let shape = vec![Point::new(0.0, 0.0), Point::new(0.001, 0.0)];

        let (off, added) = builder.add_edge_info(0, from, to, &shape);
        assert!(added);
        // Reverse direction resolves to the same record and reports
        // it was not newly added.
        let (off2, added2) = builder.add_edge_info(0, to, from, &shape);
        assert_eq!(off, off2);
        assert!(!added2);
        assert_eq!(builder.edge_infos.len(), 1);

        // A different way id between the same endpoints is distinct.
        let (off3, added3) = builder.add_edge_info(7, from, to, &shape);
        assert_ne!(off, off3);
        assert!(added3);
    }

    #[test]
    fn test_store_roundtrip_and_cache() {
        let dir = std::env::temp_dir().join("tilia_test_store_roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let hierarchy = TileHierarchy::default();
        let mut store = TileStore::new(&dir, hierarchy);

        let id = GraphId::new(12, 2, 0);
        let tile = empty_tile(id.value());
        store.store_tile(&tile).unwrap();
        assert!(store.does_tile_exist(id));

        let loaded = store.get_graph_tile(id).unwrap();
        assert_eq!(loaded.graphid, id.value());
        // Second read hits the cache.
        let again = store.get_graph_tile(id).unwrap();
        assert!(Arc::ptr_eq(&loaded, &again));

        // A store invalidates the cached copy.
        let mut rebuilt = tile.clone();
        rebuilt.names.push("new".to_string());
        store.store_tile(&rebuilt).unwrap();
        let reread = store.get_graph_tile(id).unwrap();
        assert_eq!(reread.names.len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_tile() {
        let dir = std::env::temp_dir().join("tilia_test_store_missing");
        std::fs::create_dir_all(&dir).unwrap();
        let mut store = TileStore::new(&dir, TileHierarchy::default());
        assert!(!store.does_tile_exist(GraphId::new(999, 2, 0)));
        assert!(store.get_graph_tile(GraphId::new(999, 2, 0)).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
