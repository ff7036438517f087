// Tile hierarchy: level ladder, world tiling arithmetic, and the
// on-disk path convention shared by road tiles (.gph) and transit
// records (.pbf).

use crate::graph_id::GraphId;
use anyhow::{Context, Result, anyhow};
use std::path::Path;

pub const ROAD_TILE_EXT: &str = "gph";
pub const TRANSIT_TILE_EXT: &str = "pbf";

#[derive(Clone, Debug)]
pub struct TileLevel {
    pub level: u8,
    /// Tile edge size in degrees.
    pub size: f64,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct TileHierarchy {
    pub levels: Vec<TileLevel>,
}

impl Default for TileHierarchy {
    fn default() -> Self {
        TileHierarchy {
            levels: vec![
                TileLevel {
                    level: 0,
                    size: 4.0,
                    name: "highway".to_string(),
                },
                TileLevel {
                    level: 1,
                    size: 1.0,
                    name: "arterial".to_string(),
                },
                TileLevel {
                    level: 2,
                    size: 0.25,
                    name: "local".to_string(),
                },
            ],
        }
    }
}

impl TileHierarchy {
    /// The most detailed level. Transit is merged at this level only.
    pub fn local_level(&self) -> u8 {
        self.levels.last().map(|l| l.level).unwrap_or(0)
    }

    pub fn level(&self, level: u8) -> Option<&TileLevel> {
        self.levels.iter().find(|l| l.level == level)
    }

    fn columns(size: f64) -> u32 {
        (360.0 / size).round() as u32
    }

    /// Bounding box (min_lon, min_lat, max_lon, max_lat) of a tile.
    /// Tiling runs row-major from the south-west corner of the world.
    pub fn bounding_box(&self, id: GraphId) -> Option<(f64, f64, f64, f64)> {
        let level = self.level(id.level() as u8)?;
        let ncols = Self::columns(level.size);
        let col = id.tile_id() % ncols;
        let row = id.tile_id() / ncols;
        let min_lon = -180.0 + f64::from(col) * level.size;
        let min_lat = -90.0 + f64::from(row) * level.size;
        Some((min_lon, min_lat, min_lon + level.size, min_lat + level.size))
    }

    /// Relative file path for a tile: the nine-digit zero-padded tile
    /// id split into groups of three, e.g. `2/000/754/432.gph`.
    pub fn file_suffix(&self, id: GraphId, ext: &str) -> String {
        let digits = format!("{:09}", id.tile_id());
        format!(
            "{}/{}/{}/{}.{}",
            id.level(),
            &digits[0..3],
            &digits[3..6],
            &digits[6..9],
            ext
        )
    }

    /// Inverse of `file_suffix`: recover the tile-base GraphId from a
    /// tile path. Only the trailing four path components matter, so
    /// both absolute and relative paths work.
    pub fn graph_id_from_path(&self, path: &Path) -> Result<GraphId> {
        let mut components: Vec<&str> = path
            .iter()
            .filter_map(|c| c.to_str())
            .collect();
        if components.len() < 4 {
            return Err(anyhow!("tile path too short: {}", path.display()));
        }
        components = components.split_off(components.len() - 4);

        let level: u8 = components[0]
            .parse()
            .with_context(|| format!("bad tile level in {}", path.display()))?;
        self.level(level)
            .ok_or_else(|| anyhow!("unknown tile level {} in {}", level, path.display()))?;

        let stem = Path::new(components[3])
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("bad tile file name in {}", path.display()))?;
        let digits = format!("{}{}{}", components[1], components[2], stem);
        let tile_id: u32 = digits
            .parse()
            .with_context(|| format!("bad tile id digits in {}", path.display()))?;

        Ok(GraphId::new(tile_id, u32::from(level), 0))
    }
}
