// Builder configuration, loaded from a JSON file.

use crate::hierarchy::{TileHierarchy, TileLevel};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct BuilderConfig {
    /// Root directory of transit records. Absent or missing on disk
    /// means the build is a no-op.
    #[serde(default)]
    pub transit_dir: Option<PathBuf>,

    pub hierarchy: HierarchyConfig,

    /// Worker thread count. Defaults to hardware parallelism, floored
    /// at 1.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HierarchyConfig {
    /// Root directory of road tiles.
    pub tile_dir: PathBuf,

    /// Level ladder override; the built-in three-level ladder applies
    /// when omitted.
    #[serde(default)]
    pub levels: Option<Vec<LevelConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelConfig {
    pub level: u8,
    pub size: f64,
    pub name: String,
}

impl HierarchyConfig {
    pub fn to_hierarchy(&self) -> TileHierarchy {
        match &self.levels {
            None => TileHierarchy::default(),
            Some(levels) => TileHierarchy {
                levels: levels
                    .iter()
                    .map(|l| TileLevel {
                        level: l.level,
                        size: l.size,
                        name: l.name.clone(),
                    })
                    .collect(),
            },
        }
    }
}

pub fn load_config(path: &Path) -> Result<BuilderConfig> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Couldn't open config {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("Couldn't parse config {}", path.display()))
}
