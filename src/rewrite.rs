// Copyright Catenary Transit Initiatives
//
// Tile rewrite: rebuilds a tile's node and directed edge arrays,
// interleaving stop connection edges at their road nodes, appending
// transit stop nodes with their outbound edges, and re-indexing the
// sign and access-restriction tables that reference edges by
// position.

use crate::departures::StopEdges;
use crate::formats::graph_tile::{
    DirectedEdge, NodeInfo, NodeType, RoadClass, TransitRoute, Use, access,
};
use crate::formats::transit_tile::TransitTile;
use crate::graph_id::GraphId;
use crate::hierarchy::TileHierarchy;
use crate::snapping::ConnectionEdge;
use crate::store::GraphTileBuilder;
use ahash::AHashMap;
use geo::{HaversineDistance, Point};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

const TRANSIT_SPEED_KPH: u32 = 5;

/// Map a GTFS vehicle type to an edge use.
pub fn get_transit_use(route_type: u32) -> Use {
    match route_type {
        3 => Use::Bus,     // Bus
        4 => Use::Rail,    // Ferry (boat) - needs its own use
        // Tram, subway, rail, cable car, gondola, funicular
        _ => Use::Rail,
    }
}

/// Translate a stop's source graph id to its final graph id by adding
/// the destination tile's prior road node count. Invalid if the tile
/// is not part of this build.
pub fn get_final_id(node_id: GraphId, tile_node_counts: &AHashMap<u64, usize>) -> GraphId {
    match tile_node_counts.get(&node_id.tile_base().value()) {
        None => GraphId::invalid(),
        Some(&count) => node_id.with_index(node_id.index() + count as u32),
    }
}

/// Placeholder shape: straight line between the stops. Shape-table
/// interpolation is deferred.
fn get_shape(stop_ll: Point<f64>, end_ll: Point<f64>, _shape_id: u32) -> Vec<Point<f64>> {
    vec![stop_ll, end_ll]
}

/// Add the transit record's routes to the tile. Returns route index
/// mapped to vehicle type, needed when materializing transit edges.
pub fn add_routes(
    transit: &TransitTile,
    builder: &mut GraphTileBuilder,
    tile_id: GraphId,
) -> AHashMap<u32, u32> {
    let mut route_types = AHashMap::new();
    for (i, r) in transit.routes.iter().enumerate() {
        let route = TransitRoute {
            route_index: i as u32,
            onestop_offset: builder.add_name(&r.onestop_id),
            operated_by_onestop_offset: builder.add_name(&r.operated_by_onestop_id),
            operated_by_name_offset: builder.add_name(&r.operated_by_name),
            operated_by_website_offset: builder.add_name(&r.operated_by_website),
            route_color: r.route_color,
            route_text_color: r.route_text_color,
            name_offset: builder.add_name(&r.name),
            long_name_offset: builder.add_name(&r.route_long_name),
            desc_offset: builder.add_name(&r.route_desc),
        };
        debug!("Route idx = {}: {}, {}", i, r.name, r.route_long_name);
        builder.add_transit_route(route);
        route_types.insert(i as u32, r.vehicle_type);
    }
    info!(
        "Tile {}: added {} routes",
        tile_id.tile_id(),
        route_types.len()
    );
    route_types
}

/// Look up a destination stop's position, reading the other tile's
/// transit record when the stop lives elsewhere.
fn end_stop_position(
    dest_src_id: GraphId,
    tile_id: GraphId,
    transit: &TransitTile,
    transit_dir: &Path,
    hierarchy: &TileHierarchy,
) -> Option<Point<f64>> {
    if dest_src_id.tile_base() == tile_id {
        let stop = transit.stops.get(dest_src_id.index() as usize)?;
        return Some(Point::new(stop.lon, stop.lat));
    }
    let other = match crate::builder::read_transit_tile(transit_dir, hierarchy, dest_src_id) {
        Ok(t) => t,
        Err(e) => {
            error!(
                "Couldn't load transit record for end stop {}: {:#}",
                dest_src_id, e
            );
            return None;
        }
    };
    let stop = other.stops.get(dest_src_id.index() as usize)?;
    Some(Point::new(stop.lon, stop.lat))
}

/// Rebuild the tile's node and edge arrays with transit merged in.
#[allow(clippy::too_many_arguments)]
pub fn add_to_graph(
    builder: &mut GraphTileBuilder,
    transit: &TransitTile,
    stop_edge_map: &BTreeMap<GraphId, StopEdges>,
    // Recorded per stop but not yet applied: bicycle access on
    // transit nodes is deferred.
    _stop_access: &AHashMap<GraphId, bool>,
    connection_edges: &[ConnectionEdge],
    route_types: &AHashMap<u32, u32>,
    tile_node_counts: &AHashMap<u64, usize>,
    transit_dir: &Path,
    hierarchy: &TileHierarchy,
) {
    let t1 = Instant::now();

    // Move the existing node and directed edge arrays out; they are
    // streamed back in below with new indices.
    let current_nodes = std::mem::take(&mut builder.nodes);
    let node_count = current_nodes.len();
    let current_edges = std::mem::take(&mut builder.directed_edges);
    let edge_count = current_edges.len();

    let tile_id = GraphId::from_value(builder.graphid).tile_base();

    // Cursors into the sign and access restriction tables, which are
    // ordered by the edge index they reference.
    let sign_count = builder.signs.len();
    let mut sign_idx = 0usize;
    let mut next_sign_idx = if sign_count > 0 {
        builder.signs[0].edge_index
    } else {
        edge_count as u32 + 1
    };
    let res_count = builder.access_restrictions.len();
    let mut res_idx = 0usize;
    let mut next_res_idx = if res_count > 0 {
        builder.access_restrictions[0].edge_index
    } else {
        edge_count as u32 + 1
    };

    // Pass 1: road nodes. Copy each node's outbound edges in order,
    // shift any sign/restriction that referenced them, and interleave
    // connection edges bound for this node.
    let mut added_edges = 0usize;
    for (node_id, mut nb) in current_nodes.into_iter().enumerate() {
        let new_edge_index = builder.directed_edges.len();

        for j in 0..nb.edge_count {
            let idx = nb.edge_index + j;
            builder
                .directed_edges
                .push(current_edges[idx as usize].clone());

            // Signs referencing this edge move by the number of
            // connection edges inserted before it.
            while idx == next_sign_idx && sign_idx < sign_count {
                if !current_edges[idx as usize].exit_sign {
                    error!("Signs for this index but directededge says no sign");
                }
                builder.signs[sign_idx].edge_index = idx + added_edges as u32;
                sign_idx += 1;
                next_sign_idx = if sign_idx >= sign_count {
                    0
                } else {
                    builder.signs[sign_idx].edge_index
                };
            }

            // Same shift for access restrictions.
            while idx == next_res_idx && res_idx < res_count {
                if !current_edges[idx as usize].access_restriction {
                    error!("Access restrictions for this index but directededge says none");
                }
                builder.access_restrictions[res_idx].edge_index = idx + added_edges as u32;
                res_idx += 1;
                next_res_idx = if res_idx >= res_count {
                    0
                } else {
                    builder.access_restrictions[res_idx].edge_index
                };
            }
        }

        // Connection edges from this road node to transit stops.
        while added_edges < connection_edges.len()
            && connection_edges[added_edges].road_node.index() == node_id as u32
        {
            let conn = &connection_edges[added_edges];
            let end_node = get_final_id(conn.stop_src_id, tile_node_counts);
            if !end_node.is_valid() {
                // Skip and advance; the destination tile is not part
                // of this build.
                warn!(
                    "Connection at node {} dropped, stop tile {} unknown",
                    node_id,
                    conn.stop_src_id.tile_id()
                );
                added_edges += 1;
                continue;
            }

            let local_edge_idx = (builder.directed_edges.len() - new_edge_index) as u32;
            let (edge_info_offset, added) =
                builder.add_edge_info(0, conn.road_node, end_node, &conn.shape);
            builder.directed_edges.push(DirectedEdge {
                end_node: end_node.value(),
                length_m: conn.length_m,
                use_type: Use::TransitConnection as u32,
                speed: TRANSIT_SPEED_KPH,
                classification: RoadClass::ServiceOther as u32,
                local_edge_idx,
                forward_access: access::PEDESTRIAN,
                reverse_access: access::PEDESTRIAN,
                line_id: 0,
                edge_info_offset,
                forward: added,
                exit_sign: false,
                access_restriction: false,
            });
            debug!("Add conn from road to stop: ei offset = {}", edge_info_offset);
            added_edges += 1;
        }

        nb.edge_index = new_edge_index as u32;
        nb.edge_count = (builder.directed_edges.len() - new_edge_index) as u32;
        builder.nodes.push(nb);
    }

    if added_edges != connection_edges.len() {
        error!(
            "Part 1: Added {} but there are {} connections",
            added_edges,
            connection_edges.len()
        );
    }

    // Pass 2: transit nodes, appended after all road nodes. The map
    // iterates in source-id order, so stop k lands at final index
    // k + node_count.
    let mut reverse_added = 0usize;
    for (stop_src_id, stop_edges) in stop_edge_map {
        let stop_index = stop_src_id.index() as usize;
        let Some(stop) = transit.stops.get(stop_index) else {
            error!("Stop index {} out of range in tile {}", stop_index, tile_id.tile_id());
            continue;
        };
        if GraphId::from_value(stop.graphid) != *stop_src_id {
            error!("Stop key not equal!");
        }

        let origin_node = get_final_id(*stop_src_id, tile_node_counts);
        let stop_ll = Point::new(stop.lon, stop.lat);

        let timezone_offset = builder.add_name(&stop.timezone);
        let mut node = NodeInfo {
            lat: stop.lat,
            lon: stop.lon,
            edge_index: builder.directed_edges.len() as u32,
            edge_count: 0,
            // Bicycle access from stop_access is deferred.
            access: access::PEDESTRIAN,
            node_type: NodeType::MultiUseTransitStop as u32,
            road_class: RoadClass::ServiceOther as u32,
            mode_change: true,
            stop_index: stop_index as u32,
            timezone_offset,
        };

        // Reverse connections back to the road network.
        // TODO - replace the linear scan with an index keyed by stop id
        for conn in connection_edges {
            if conn.stop_src_id != *stop_src_id {
                continue;
            }
            let local_edge_idx = (builder.directed_edges.len() - node.edge_index as usize) as u32;
            let (edge_info_offset, added) =
                builder.add_edge_info(0, origin_node, conn.road_node, &conn.shape);
            builder.directed_edges.push(DirectedEdge {
                end_node: conn.road_node.value(),
                length_m: conn.length_m,
                use_type: Use::TransitConnection as u32,
                speed: TRANSIT_SPEED_KPH,
                classification: RoadClass::ServiceOther as u32,
                local_edge_idx,
                forward_access: access::PEDESTRIAN,
                reverse_access: access::PEDESTRIAN,
                line_id: 0,
                edge_info_offset,
                forward: added,
                exit_sign: false,
                access_restriction: false,
            });
            debug!("Add conn from stop to road: ei offset = {}", edge_info_offset);
            reverse_added += 1;
        }

        // One directed edge per transit line out of this stop.
        for line in &stop_edges.lines {
            let end_node = get_final_id(line.dest_src_id, tile_node_counts);
            if !end_node.is_valid() {
                // Destination tile may belong to a different job.
                continue;
            }
            let Some(end_ll) =
                end_stop_position(line.dest_src_id, tile_id, transit, transit_dir, hierarchy)
            else {
                continue;
            };

            let route_type = route_types.get(&line.route_index).copied().unwrap_or(0);
            let local_edge_idx = (builder.directed_edges.len() - node.edge_index as usize) as u32;
            let shape = get_shape(stop_ll, end_ll, line.shape_id);
            let (edge_info_offset, added) = builder.add_edge_info(
                u64::from(line.route_index),
                origin_node,
                end_node,
                &shape,
            );
            builder.directed_edges.push(DirectedEdge {
                end_node: end_node.value(),
                length_m: stop_ll.haversine_distance(&end_ll) as f32,
                use_type: get_transit_use(route_type) as u32,
                speed: TRANSIT_SPEED_KPH,
                classification: RoadClass::ServiceOther as u32,
                local_edge_idx,
                forward_access: access::PEDESTRIAN,
                reverse_access: access::PEDESTRIAN,
                line_id: line.line_id,
                edge_info_offset,
                forward: added,
                exit_sign: false,
                access_restriction: false,
            });
            debug!(
                "Add transit directededge - lineId = {} Route Key = {}",
                line.line_id, line.route_index
            );
        }

        node.edge_count = (builder.directed_edges.len() - node.edge_index as usize) as u32;
        if node.edge_count == 0 {
            error!("No directed edges from this node");
        }
        builder.nodes.push(node);
    }

    if reverse_added != connection_edges.len() {
        error!(
            "Added {} but there are {} connections",
            reverse_added,
            connection_edges.len()
        );
    }

    info!(
        "Tile {}: added {} edges and {} nodes. time = {} ms",
        tile_id.tile_id(),
        builder.directed_edges.len() - edge_count,
        builder.nodes.len() - node_count,
        t1.elapsed().as_millis()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_transit_use() {
        for rt in [0, 1, 2, 5, 6, 7] {
            assert_eq!(get_transit_use(rt), Use::Rail);
        }
        assert_eq!(get_transit_use(3), Use::Bus);
        assert_eq!(get_transit_use(4), Use::Rail);
        assert_eq!(get_transit_use(42), Use::Rail);
    }

    #[test]
    fn test_get_final_id() {
        let mut counts = AHashMap::new();
        counts.insert(GraphId::new(10, 2, 0).value(), 7usize);

        let src = GraphId::new(10, 2, 3);
        let final_id = get_final_id(src, &counts);
        assert!(final_id.is_valid());
        assert_eq!(final_id.index(), 10);
        assert_eq!(final_id.tile_base(), src.tile_base());

        // Unknown tile maps to the invalid sentinel.
        assert!(!get_final_id(GraphId::new(11, 2, 3), &counts).is_valid());
    }
}
