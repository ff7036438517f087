// Walks a tile's scheduled stop pairs into per-stop departure records
// and deduplicates (route, destination) pairs into transit lines.

use crate::calendar;
use crate::formats::graph_tile::TransitDeparture;
use crate::formats::transit_tile::TransitTile;
use crate::graph_id::GraphId;
use crate::store::GraphTileBuilder;
use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use log::{info, warn};
use std::collections::BTreeMap;

/// One scheduled departure, keyed internally by source graph ids
/// until the tile rewrite translates them to final ids.
#[derive(Clone, Debug)]
pub struct Departure {
    /// Service-day bitmap relative to the tile reference date.
    /// Nonzero before exception dates apply; pairs whose regular
    /// schedule misses the window entirely are dropped during
    /// extraction.
    pub days: u64,
    pub orig_src_id: GraphId,
    pub dest_src_id: GraphId,
    pub trip: u32,
    pub route: u32,
    pub block_id: u32,
    pub shape_id: u32,
    pub dep_time: u32,
    pub arr_time: u32,
    pub end_day: u32,
    pub dow_mask: u32,
    pub wheelchair_accessible: bool,
    pub headsign: String,
    pub short_name: String,
}

/// Unique (route, destination stop) pair at one origin stop.
#[derive(Clone, Debug)]
pub struct TransitLine {
    /// Tile-global line id, allocated from 1. 0 is reserved and never
    /// appears on a materialized edge.
    pub line_id: u32,
    pub route_index: u32,
    pub dest_src_id: GraphId,
    pub shape_id: u32,
}

/// Edges to materialize from one origin stop.
#[derive(Clone, Debug, Default)]
pub struct StopEdges {
    pub origin_src_id: GraphId,
    /// Intra-station connections. Station hierarchy is deferred, so
    /// this stays empty for now.
    pub intrastation: Vec<GraphId>,
    pub lines: Vec<TransitLine>,
}

/// Scheduled departures grouped by origin stop, plus the per-stop
/// access flags derived alongside.
pub struct ExtractedDepartures {
    pub departures: AHashMap<GraphId, Vec<Departure>>,
    pub stop_access: AHashMap<GraphId, bool>,
}

/// Walk the tile's stop pairs into Departure records. Pairs whose
/// service window misses the tile's 60-day bitmap are dropped with a
/// warning; malformed dates are a hard error.
pub fn process_stop_pairs(
    transit: &TransitTile,
    tile_ref: u32,
    tile_id: GraphId,
) -> Result<ExtractedDepartures> {
    let mut departures: AHashMap<GraphId, Vec<Departure>> = AHashMap::new();
    let mut stop_access: AHashMap<GraphId, bool> = AHashMap::new();

    if transit.stop_pairs.is_empty() {
        if !transit.stops.is_empty() {
            warn!(
                "Tile {} has 0 schedule stop pairs but has {} stops",
                tile_id.tile_id(),
                transit.stops.len()
            );
        }
        return Ok(ExtractedDepartures {
            departures,
            stop_access,
        });
    }

    let mut count = 0usize;
    for sp in &transit.stop_pairs {
        // The end node may be in a tile this run is not building; that
        // is resolved later during edge materialization.
        let orig_src_id = GraphId::from_value(sp.origin_graphid);
        let dest_src_id = GraphId::from_value(sp.destination_graphid);

        let dow_mask = calendar::dow_mask(&sp.service_days_of_week);
        let start = calendar::parse_yyyymmdd(sp.service_start_date)?;
        let end = calendar::parse_yyyymmdd(sp.service_end_date)?;

        let mut days = calendar::service_days(start, end, tile_ref, dow_mask);
        if days == 0 {
            warn!(
                "Feed rejected! End date: {} (day {})",
                end,
                calendar::days_from_pivot(end)
            );
            continue;
        }

        // Exception subtractions first, then additions.
        for &d in &sp.service_except_dates {
            days = calendar::remove_service_day(days, start, end, tile_ref, calendar::parse_yyyymmdd(d)?);
        }
        for &d in &sp.service_added_dates {
            days = calendar::add_service_day(days, start, end, tile_ref, calendar::parse_yyyymmdd(d)?);
        }

        // OR across every pair touching a stop, so one bike-friendly
        // pair is enough.
        *stop_access.entry(orig_src_id).or_insert(false) |= sp.bikes_allowed;
        *stop_access.entry(dest_src_id).or_insert(false) |= sp.bikes_allowed;

        let dep = Departure {
            days,
            orig_src_id,
            dest_src_id,
            trip: sp.trip_key,
            route: sp.route_index,
            block_id: sp.block_id,
            shape_id: 0,
            dep_time: sp.origin_departure_time,
            arr_time: sp.destination_arrival_time,
            end_day: calendar::end_day(start, end),
            dow_mask,
            wheelchair_accessible: sp.wheelchair_accessible,
            headsign: sp.trip_headsign.clone(),
            short_name: sp.trip_short_name.clone(),
        };
        departures.entry(orig_src_id).or_default().push(dep);
        count += 1;
    }

    info!("Tile {}: added {} departures", tile_id.tile_id(), count);
    Ok(ExtractedDepartures {
        departures,
        stop_access,
    })
}

/// Assign line ids and compact departures into the tile builder.
/// Returns the per-stop edge sets ordered by origin stop source id,
/// and the set of route indices referenced by any departure.
pub fn build_stop_edges(
    transit: &TransitTile,
    extracted: &ExtractedDepartures,
    builder: &mut GraphTileBuilder,
) -> (BTreeMap<GraphId, StopEdges>, AHashSet<u32>) {
    let mut stop_edge_map: BTreeMap<GraphId, StopEdges> = BTreeMap::new();
    let mut route_keys: AHashSet<u32> = AHashSet::new();
    let mut unique_line_id = 1u32;

    for stop in &transit.stops {
        let stop_src_id = GraphId::from_value(stop.graphid);
        let mut stop_edges = StopEdges {
            origin_src_id: stop_src_id,
            ..Default::default()
        };

        // Unique (route, destination) pairs at this origin share one
        // line id, stored on the transit directed edge and on every
        // compacted departure along it.
        let mut unique_transit_edges: AHashMap<(u32, GraphId), u32> = AHashMap::new();
        if let Some(deps) = extracted.departures.get(&stop_src_id) {
            for dep in deps {
                route_keys.insert(dep.route);

                let line_id = match unique_transit_edges.get(&(dep.route, dep.dest_src_id)) {
                    Some(&line_id) => line_id,
                    None => {
                        let line_id = unique_line_id;
                        unique_transit_edges.insert((dep.route, dep.dest_src_id), line_id);
                        unique_line_id += 1;
                        stop_edges.lines.push(TransitLine {
                            line_id,
                            route_index: dep.route,
                            dest_src_id: dep.dest_src_id,
                            shape_id: dep.shape_id,
                        });
                        line_id
                    }
                };

                let headsign_offset = builder.add_name(&dep.headsign);
                builder.add_transit_departure(TransitDeparture {
                    line_id,
                    trip: dep.trip,
                    route_index: dep.route,
                    block_id: dep.block_id,
                    headsign_offset,
                    departure_time: dep.dep_time,
                    elapsed_time: dep.arr_time.saturating_sub(dep.dep_time),
                    end_day: dep.end_day,
                    dow_mask: dep.dow_mask,
                    days: dep.days,
                });
            }
        }

        stop_edge_map.insert(stop_src_id, stop_edges);
    }

    (stop_edge_map, route_keys)
}
