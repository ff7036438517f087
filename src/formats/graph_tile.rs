// This module defines the binary schema for the tiled road graph.
// It uses Protocol Buffers (via the `prost` crate) so tiles are
// compact, cross-platform, and backwards compatible.
//
// ARCHITECTURE:
// - One GraphTileData per fixed-geography tile, one file per tile.
// - Topology is an adjacency array: a node points at its first
//   outgoing directed edge via `edge_index` and owns the next
//   `edge_count` entries. The tile rewrite preserves this layout.
// - Strings (names, headsigns, timezones, onestop ids) live in one
//   interned `names` pool referenced by offset.

use prost::Message;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

// ===========================================================================
// CONSTANTS & BITMASKS
// ===========================================================================

pub mod access {
    /// Bit 0: pedestrians allowed.
    pub const PEDESTRIAN: u32 = 0b0000_0001;
    /// Bit 1: bicycles allowed.
    pub const BICYCLE: u32 = 0b0000_0010;
    /// Bit 2: automobiles allowed.
    pub const AUTO: u32 = 0b0000_0100;
}

/// Directed edge use. Stored as u32 in the tile.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Use {
    Road = 0,
    Rail = 1,
    Bus = 2,
    TransitConnection = 3,
}

impl Use {
    pub fn from_u32(v: u32) -> Use {
        match v {
            1 => Use::Rail,
            2 => Use::Bus,
            3 => Use::TransitConnection,
            _ => Use::Road,
        }
    }

    pub fn is_transit(self) -> bool {
        matches!(self, Use::Rail | Use::Bus)
    }
}

/// Node type. Stored as u32 in the tile.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeType {
    Street = 0,
    MultiUseTransitStop = 1,
}

impl NodeType {
    pub fn from_u32(v: u32) -> NodeType {
        match v {
            1 => NodeType::MultiUseTransitStop,
            _ => NodeType::Street,
        }
    }
}

/// Road classification ladder. Stored as u32 in the tile.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RoadClass {
    Motorway = 0,
    Trunk = 1,
    Primary = 2,
    Secondary = 3,
    Tertiary = 4,
    Unclassified = 5,
    Residential = 6,
    ServiceOther = 7,
}

impl RoadClass {
    pub fn from_u32(v: u32) -> RoadClass {
        match v {
            0 => RoadClass::Motorway,
            1 => RoadClass::Trunk,
            2 => RoadClass::Primary,
            3 => RoadClass::Secondary,
            4 => RoadClass::Tertiary,
            5 => RoadClass::Unclassified,
            6 => RoadClass::Residential,
            _ => RoadClass::ServiceOther,
        }
    }
}

// ===========================================================================
// TILE CONTAINER
// ===========================================================================

/// The root container for one graph tile.
#[derive(Clone, PartialEq, Message)]
pub struct GraphTileData {
    /// Packed GraphId of this tile (tile-base form, index 0).
    #[prost(uint64, tag = "1")]
    pub graphid: u64,

    /// Tile creation date as days from the pivot date. Reference date
    /// for all service-day bitmaps stored in this tile.
    #[prost(uint32, tag = "2")]
    pub date_created: u32,

    /// All nodes, road nodes first in their original order, transit
    /// stop nodes appended after.
    #[prost(message, repeated, tag = "3")]
    pub nodes: Vec<NodeInfo>,

    /// Flattened directed edge array. Nodes index into this via
    /// `edge_index` / `edge_count`.
    #[prost(message, repeated, tag = "4")]
    pub directed_edges: Vec<DirectedEdge>,

    /// Shared edge attribute blobs (way id, shape, names). Directed
    /// edges reference these by offset; a forward/reverse edge pair
    /// shares one entry.
    #[prost(message, repeated, tag = "5")]
    pub edge_infos: Vec<EdgeInfo>,

    /// Exit sign records, ordered by the edge index they attach to.
    #[prost(message, repeated, tag = "6")]
    pub signs: Vec<Sign>,

    /// Access restriction records, ordered by edge index.
    #[prost(message, repeated, tag = "7")]
    pub access_restrictions: Vec<AccessRestriction>,

    /// Transit sidecar tables.
    #[prost(message, repeated, tag = "8")]
    pub transit_routes: Vec<TransitRoute>,

    #[prost(message, repeated, tag = "9")]
    pub transit_stops: Vec<TransitStop>,

    #[prost(message, repeated, tag = "10")]
    pub transit_departures: Vec<TransitDeparture>,

    /// Interned string pool. Offsets elsewhere in the tile index into
    /// this vector.
    #[prost(string, repeated, tag = "11")]
    pub names: Vec<String>,
}

/// A node in the graph. Road intersection or transit stop.
#[derive(Clone, PartialEq, Message)]
pub struct NodeInfo {
    /// Latitude in degrees (WGS84).
    #[prost(double, tag = "1")]
    pub lat: f64,

    /// Longitude in degrees (WGS84).
    #[prost(double, tag = "2")]
    pub lon: f64,

    /// Index of this node's first outgoing edge in `directed_edges`.
    #[prost(uint32, tag = "3")]
    pub edge_index: u32,

    /// Number of outgoing edges, contiguous from `edge_index`.
    #[prost(uint32, tag = "4")]
    pub edge_count: u32,

    /// Access bitmask, see the `access` module.
    #[prost(uint32, tag = "5")]
    pub access: u32,

    /// NodeType as u32.
    #[prost(uint32, tag = "6")]
    pub node_type: u32,

    /// Best RoadClass of any connected edge, as u32.
    #[prost(uint32, tag = "7")]
    pub road_class: u32,

    /// True where a traveler may switch modes (e.g. board transit).
    #[prost(bool, tag = "8")]
    pub mode_change: bool,

    /// For transit nodes: position of the stop in the tile's transit
    /// record stop array.
    #[prost(uint32, tag = "9")]
    pub stop_index: u32,

    /// Offset of the timezone name in the `names` pool.
    #[prost(uint32, tag = "10")]
    pub timezone_offset: u32,
}

/// A directed edge between two nodes.
#[derive(Clone, PartialEq, Message)]
pub struct DirectedEdge {
    /// Packed GraphId of the end node. May point into another tile.
    #[prost(uint64, tag = "1")]
    pub end_node: u64,

    /// Length in meters.
    #[prost(float, tag = "2")]
    pub length_m: f32,

    /// Use as u32.
    #[prost(uint32, tag = "3")]
    pub use_type: u32,

    /// Speed in km/h.
    #[prost(uint32, tag = "4")]
    pub speed: u32,

    /// RoadClass as u32.
    #[prost(uint32, tag = "5")]
    pub classification: u32,

    /// Position of this edge among its start node's outgoing edges.
    #[prost(uint32, tag = "6")]
    pub local_edge_idx: u32,

    /// Access bitmask along the edge direction.
    #[prost(uint32, tag = "7")]
    pub forward_access: u32,

    /// Access bitmask against the edge direction.
    #[prost(uint32, tag = "8")]
    pub reverse_access: u32,

    /// Transit line id. 0 on non-transit edges, never 0 on a transit
    /// edge.
    #[prost(uint32, tag = "9")]
    pub line_id: u32,

    /// Offset into `edge_infos`.
    #[prost(uint32, tag = "10")]
    pub edge_info_offset: u32,

    /// True if this edge runs in the stored shape's direction.
    #[prost(bool, tag = "11")]
    pub forward: bool,

    /// True if sign records reference this edge.
    #[prost(bool, tag = "12")]
    pub exit_sign: bool,

    /// True if access restriction records reference this edge.
    #[prost(bool, tag = "13")]
    pub access_restriction: bool,
}

/// Shared edge attributes, referenced by one or two directed edges.
#[derive(Clone, PartialEq, Message)]
pub struct EdgeInfo {
    /// OSM way id, or 0 for synthesized edges. Transit edges store the
    /// route index here.
    #[prost(uint64, tag = "1")]
    pub way_id: u64,

    /// Shape as alternating [lon, lat, lon, lat, ...].
    #[prost(double, repeated, tag = "2")]
    pub coords: Vec<f64>,

    /// Offsets of street names in the `names` pool.
    #[prost(uint32, repeated, tag = "3")]
    pub name_offsets: Vec<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Sign {
    /// Directed edge this sign attaches to.
    #[prost(uint32, tag = "1")]
    pub edge_index: u32,

    /// Sign text offset in the `names` pool.
    #[prost(uint32, tag = "2")]
    pub text_offset: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct AccessRestriction {
    /// Directed edge this restriction attaches to.
    #[prost(uint32, tag = "1")]
    pub edge_index: u32,

    #[prost(uint32, tag = "2")]
    pub restriction_type: u32,

    #[prost(uint64, tag = "3")]
    pub value: u64,

    /// Travel modes the restriction applies to.
    #[prost(uint32, tag = "4")]
    pub modes: u32,
}

/// A transit route serving stops in this tile. String fields are
/// offsets into the `names` pool.
#[derive(Clone, PartialEq, Message)]
pub struct TransitRoute {
    /// Index of the route in the tile's transit record.
    #[prost(uint32, tag = "1")]
    pub route_index: u32,

    #[prost(uint32, tag = "2")]
    pub onestop_offset: u32,

    #[prost(uint32, tag = "3")]
    pub operated_by_onestop_offset: u32,

    #[prost(uint32, tag = "4")]
    pub operated_by_name_offset: u32,

    #[prost(uint32, tag = "5")]
    pub operated_by_website_offset: u32,

    #[prost(uint32, tag = "6")]
    pub route_color: u32,

    #[prost(uint32, tag = "7")]
    pub route_text_color: u32,

    #[prost(uint32, tag = "8")]
    pub name_offset: u32,

    #[prost(uint32, tag = "9")]
    pub long_name_offset: u32,

    #[prost(uint32, tag = "10")]
    pub desc_offset: u32,
}

/// A transit stop materialized in this tile.
#[derive(Clone, PartialEq, Message)]
pub struct TransitStop {
    #[prost(uint32, tag = "1")]
    pub onestop_offset: u32,

    #[prost(uint32, tag = "2")]
    pub name_offset: u32,
}

/// One scheduled departure, compacted to a calendar bitmap.
#[derive(Clone, PartialEq, Message)]
pub struct TransitDeparture {
    /// Line id shared with the transit directed edge this departure
    /// runs along. Never 0.
    #[prost(uint32, tag = "1")]
    pub line_id: u32,

    #[prost(uint32, tag = "2")]
    pub trip: u32,

    #[prost(uint32, tag = "3")]
    pub route_index: u32,

    #[prost(uint32, tag = "4")]
    pub block_id: u32,

    #[prost(uint32, tag = "5")]
    pub headsign_offset: u32,

    /// Departure time in seconds past midnight.
    #[prost(uint32, tag = "6")]
    pub departure_time: u32,

    /// Arrival minus departure, in seconds.
    #[prost(uint32, tag = "7")]
    pub elapsed_time: u32,

    /// Days from feed start to feed end, for expiry handling.
    #[prost(uint32, tag = "8")]
    pub end_day: u32,

    /// Day-of-week mask, Monday = bit 0.
    #[prost(uint32, tag = "9")]
    pub dow_mask: u32,

    /// Service-day bitmap. Bit d = service runs d days after the
    /// tile's `date_created`.
    #[prost(uint64, tag = "10")]
    pub days: u64,
}

// ===========================================================================
// IO HELPERS
// ===========================================================================

/// Generic helper to save any Protobuf message to a file.
pub fn save_pbf<T: Message>(data: &T, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let payload = data.encode_to_vec();
    writer.write_all(&payload)?;
    Ok(())
}

/// Generic helper to load any Protobuf message from a file.
pub fn load_pbf<T: Message + Default>(path: &Path) -> io::Result<T> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    T::decode(&buffer[..]).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Protobuf decode error: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_io() {
        let tile = GraphTileData {
            graphid: 12345,
            date_created: 700,
            nodes: vec![NodeInfo {
                lat: 34.0,
                lon: -118.0,
                edge_index: 0,
                edge_count: 1,
                access: access::PEDESTRIAN | access::AUTO,
                node_type: NodeType::Street as u32,
                road_class: RoadClass::Residential as u32,
                mode_change: false,
                stop_index: 0,
                timezone_offset: 0,
            }],
            directed_edges: vec![DirectedEdge {
                end_node: 99,
                length_m: 50.0,
                use_type: Use::Road as u32,
                speed: 30,
                classification: RoadClass::Residential as u32,
                local_edge_idx: 0,
                forward_access: access::PEDESTRIAN,
                reverse_access: access::PEDESTRIAN,
                line_id: 0,
                edge_info_offset: 0,
                forward: true,
                exit_sign: false,
                access_restriction: false,
            }],
            edge_infos: vec![EdgeInfo {
                way_id: 42,
                coords: vec![-118.0, 34.0, -118.01, 34.01],
                name_offsets: vec![],
            }],
            signs: vec![],
            access_restrictions: vec![],
            transit_routes: vec![],
            transit_stops: vec![],
            transit_departures: vec![],
            names: vec!["Main St".to_string()],
        };

        let path = std::env::temp_dir().join("tilia_test_tile_io.gph");
        save_pbf(&tile, &path).expect("Failed to save");
        let loaded: GraphTileData = load_pbf(&path).expect("Failed to load");

        assert_eq!(loaded.graphid, 12345);
        assert_eq!(loaded.nodes.len(), 1);
        assert_eq!(loaded.directed_edges[0].end_node, 99);
        assert_eq!(loaded.edge_infos[0].way_id, 42);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_use_from_u32() {
        assert_eq!(Use::from_u32(3), Use::TransitConnection);
        assert_eq!(Use::from_u32(999), Use::Road);
        assert!(Use::Rail.is_transit());
        assert!(!Use::TransitConnection.is_transit());
    }
}
