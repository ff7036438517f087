// Snaps transit stops onto the road network: for each stop, find the
// closest directed edge on the stop's OSM way within the tile and
// emit pedestrian connection edges to the road nodes bounding it.

use crate::formats::graph_tile::GraphTileData;
use crate::formats::transit_tile::TransitTileStop;
use crate::geometry::{closest_point_on_polyline, coords_to_shape, polyline_length_m};
use crate::graph_id::GraphId;
use crate::hierarchy::TileHierarchy;
use geo::Point;
use log::error;

/// A pedestrian connection between a road node and a transit stop.
/// Materialized twice during the rewrite, once per direction, both
/// referencing the same shape.
#[derive(Clone, Debug)]
pub struct ConnectionEdge {
    /// Road node end, already in final graph-id space.
    pub road_node: GraphId,
    /// Stop end, in source graph-id space.
    pub stop_src_id: GraphId,
    pub length_m: f32,
    /// Road node first, stop position last.
    pub shape: Vec<Point<f64>>,
}

/// Order connections for the tile rewrite's node traversal.
pub fn sort_connection_edges(connection_edges: &mut [ConnectionEdge]) {
    connection_edges.sort_by_key(|c| (c.road_node.tile_id(), c.road_node.index()));
}

/// Find the closest edge of the stop's OSM way and append one or two
/// connection edges. A stop with no matching way gets none and is
/// logged; it still becomes a transit node later, just unreachable
/// from the road graph.
pub fn add_stop_connections(
    stop: &TransitTileStop,
    tile: &GraphTileData,
    hierarchy: &TileHierarchy,
    connection_edges: &mut Vec<ConnectionEdge>,
) {
    let stop_ll = Point::new(stop.lon, stop.lat);
    let way_id = stop.osm_way_id;
    let tile_graphid = GraphId::from_value(tile.graphid);

    // Scan every directed edge of the tile, keeping the globally
    // closest point among edges on the matching way.
    let mut min_dist = f64::MAX;
    let mut start_node = GraphId::invalid();
    let mut end_node = GraphId::invalid();
    let mut edge_length = 0.0f32;
    let mut closest_shape: Vec<Point<f64>> = vec![];
    let mut closest_point = Point::new(0.0, 0.0);
    let mut closest_segment = 0usize;

    for (i, node) in tile.nodes.iter().enumerate() {
        for j in 0..node.edge_count {
            let edge = &tile.directed_edges[(node.edge_index + j) as usize];
            let Some(info) = tile.edge_infos.get(edge.edge_info_offset as usize) else {
                continue;
            };
            if info.way_id != way_id {
                continue;
            }

            let mut shape = coords_to_shape(&info.coords);
            // Orient the shape along this directed edge before any
            // index arithmetic against it.
            if !edge.forward {
                shape.reverse();
            }
            let Some(closest) = closest_point_on_polyline(stop_ll, &shape) else {
                continue;
            };
            if closest.distance_m < min_dist {
                min_dist = closest.distance_m;
                start_node = tile_graphid.with_index(i as u32);
                end_node = GraphId::from_value(edge.end_node);
                edge_length = edge.length_m;
                closest_point = closest.point;
                closest_segment = closest.segment;
                closest_shape = shape;
            }
        }
    }

    if !start_node.is_valid() && !end_node.is_valid() {
        let bbox = hierarchy
            .bounding_box(tile_graphid)
            .unwrap_or((0.0, 0.0, 0.0, 0.0));
        error!(
            "No closest edge found for this stop: {} way Id = {} tile {}, {}, {}, {}",
            stop.name, way_id, bbox.0, bbox.1, bbox.2, bbox.3
        );
        return;
    }

    let stop_src_id = GraphId::from_value(stop.graphid);
    let mut conn_count = 0;
    let mut length = 0.0f64;

    // Connection to the start node: shape runs from the node along the
    // edge to the closest point, then to the stop.
    if stop_src_id.tile_base() == start_node.tile_base() {
        let mut shape: Vec<Point<f64>> = closest_shape[..=closest_segment].to_vec();
        shape.push(closest_point);
        shape.push(stop_ll);
        length = polyline_length_m(&shape).max(1.0);
        connection_edges.push(ConnectionEdge {
            road_node: start_node,
            stop_src_id,
            length_m: length as f32,
            shape,
        });
        conn_count += 1;
    }

    // Connection to the end node: reversed suffix back to the closest
    // point, then to the stop. Only when both road nodes share a tile.
    let mut length2 = 0.0f64;
    if stop_src_id.tile_base() == end_node.tile_base()
        && start_node.tile_id() == end_node.tile_id()
    {
        let mut shape: Vec<Point<f64>> = closest_shape[closest_segment + 1..]
            .iter()
            .rev()
            .copied()
            .collect();
        shape.push(closest_point);
        shape.push(stop_ll);
        length2 = polyline_length_m(&shape).max(1.0);
        connection_edges.push(ConnectionEdge {
            road_node: end_node,
            stop_src_id,
            length_m: length2 as f32,
            shape,
        });
        conn_count += 1;
    }

    // Sanity: the two halves should cover at least the original edge.
    if length != 0.0 && length2 != 0.0 && (length + length2) < f64::from(edge_length) - 1.0 {
        error!(
            "EdgeLength= {} < connection lengths: {},{} when connecting to stop {}",
            edge_length, length, length2, stop.name
        );
    }
    if conn_count == 0 {
        error!(
            "Stop {} has no connections to OSM! Stop TileId = {} Start Node Tile: {} End Node Tile: {}",
            stop.name,
            stop_src_id.tile_id(),
            start_node.tile_id(),
            end_node.tile_id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::graph_tile::{
        DirectedEdge, EdgeInfo, NodeInfo, RoadClass, Use, access,
    };
    use crate::geometry::shape_to_coords;

    const TILE: u32 = 100;

    fn road_tile() -> GraphTileData {
        // Two nodes joined by way 42 running east along the equator,
        // with a forward edge from node 0 and its reverse from node 1.
        let shape = vec![
            Point::new(0.0, 0.0),
            Point::new(0.005, 0.0),
            Point::new(0.01, 0.0),
        ];
        let length = polyline_length_m(&shape) as f32;
        GraphTileData {
            graphid: GraphId::new(TILE, 2, 0).value(),
            date_created: 730,
            nodes: vec![
                NodeInfo {
                    lat: 0.0,
                    lon: 0.0,
                    edge_index: 0,
                    edge_count: 1,
                    access: access::PEDESTRIAN | access::AUTO,
                    node_type: 0,
                    road_class: RoadClass::Residential as u32,
                    mode_change: false,
                    stop_index: 0,
                    timezone_offset: 0,
                },
                NodeInfo {
                    lat: 0.0,
                    lon: 0.01,
                    edge_index: 1,
                    edge_count: 1,
                    access: access::PEDESTRIAN | access::AUTO,
                    node_type: 0,
                    road_class: RoadClass::Residential as u32,
                    mode_change: false,
                    stop_index: 0,
                    timezone_offset: 0,
                },
            ],
            directed_edges: vec![
                DirectedEdge {
                    end_node: GraphId::new(TILE, 2, 1).value(),
                    length_m: length,
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
                },
                DirectedEdge {
                    end_node: GraphId::new(TILE, 2, 0).value(),
                    length_m: length,
                    use_type: Use::Road as u32,
                    speed: 30,
                    classification: RoadClass::Residential as u32,
                    local_edge_idx: 0,
                    forward_access: access::PEDESTRIAN,
                    reverse_access: access::PEDESTRIAN,
                    line_id: 0,
                    edge_info_offset: 0,
                    forward: false,
                    exit_sign: false,
                    access_restriction: false,
                },
            ],
            edge_infos: vec![EdgeInfo {
                way_id: 42,
                coords: shape_to_coords(&shape),
                name_offsets: vec![],
            }],
            ..Default::default()
        }
    }

    fn transit_stop(idx: u32, lon: f64, lat: f64, way: u64) -> TransitTileStop {
        TransitTileStop {
            graphid: GraphId::new(TILE, 2, idx).value(),
            name: "Test Stop".to_string(),
            onestop_id: "s-test".to_string(),
            lon,
            lat,
            osm_way_id: way,
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn test_stop_mid_way_connects_both_nodes() {
        let tile = road_tile();
        let stop = transit_stop(0, 0.004, 0.0002, 42);
        let mut connections = vec![];
        add_stop_connections(&stop, &tile, &TileHierarchy::default(), &mut connections);

        assert_eq!(connections.len(), 2);
        let to_start = &connections[0];
        let to_end = &connections[1];
        assert_eq!(to_start.road_node, GraphId::new(TILE, 2, 0));
        assert_eq!(to_end.road_node, GraphId::new(TILE, 2, 1));

        // Shapes run road node -> closest point -> stop.
        assert_eq!(to_start.shape.first().unwrap().x(), 0.0);
        assert_eq!(to_end.shape.first().unwrap().x(), 0.01);
        for c in &connections {
            let last = c.shape.last().unwrap();
            assert_eq!((last.x(), last.y()), (0.004, 0.0002));
        }

        // The two halves cover the edge.
        let total = f64::from(to_start.length_m) + f64::from(to_end.length_m);
        let edge_len = f64::from(tile.directed_edges[0].length_m);
        assert!(total >= edge_len - 1.0);
    }

    #[test]
    fn test_stop_on_node_floors_length() {
        let tile = road_tile();
        let stop = transit_stop(0, 0.0, 0.0, 42);
        let mut connections = vec![];
        add_stop_connections(&stop, &tile, &TileHierarchy::default(), &mut connections);
        assert!(!connections.is_empty());
        assert!(connections.iter().all(|c| c.length_m >= 1.0));
    }

    #[test]
    fn test_orphan_stop_gets_no_connections() {
        let tile = road_tile();
        let stop = transit_stop(0, 0.004, 0.0002, 9999);
        let mut connections = vec![];
        add_stop_connections(&stop, &tile, &TileHierarchy::default(), &mut connections);
        assert!(connections.is_empty());
    }

    #[test]
    fn test_reverse_edge_orientation() {
        // Same geometry reachable only via the reverse-direction edge:
        // drop the forward edge from node 0.
        let mut tile = road_tile();
        tile.nodes[0].edge_count = 0;
        tile.nodes[1].edge_index = 0;
        tile.directed_edges = vec![tile.directed_edges[1].clone()];

        let stop = transit_stop(0, 0.002, 0.0001, 42);
        let mut connections = vec![];
        add_stop_connections(&stop, &tile, &TileHierarchy::default(), &mut connections);

        // Best edge starts at node 1; its oriented shape runs east to
        // west, so the prefix connection starts at node 1's position.
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].road_node, GraphId::new(TILE, 2, 1));
        assert_eq!(connections[0].shape.first().unwrap().x(), 0.01);
    }

    #[test]
    fn test_sort_by_road_node() {
        let mut connections = vec![
            ConnectionEdge {
                road_node: GraphId::new(TILE, 2, 5),
                stop_src_id: GraphId::new(TILE, 2, 0),
                length_m: 1.0,
                shape: vec![],
            },
            ConnectionEdge {
                road_node: GraphId::new(TILE, 2, 1),
                stop_src_id: GraphId::new(TILE, 2, 1),
                length_m: 1.0,
                shape: vec![],
            },
        ];
        sort_connection_edges(&mut connections);
        assert_eq!(connections[0].road_node.index(), 1);
        assert_eq!(connections[1].road_node.index(), 5);
    }
}
