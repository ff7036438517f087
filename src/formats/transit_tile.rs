// Binary schema for the per-tile transit record consumed by the
// builder. One TransitTile per graph tile, produced by the feed
// ingest, path convention `<transit_dir>/<level>/<tile path>.pbf`.

use prost::Message;

/// The root container for one tile's transit data.
#[derive(Clone, PartialEq, Message)]
pub struct TransitTile {
    #[prost(message, repeated, tag = "1")]
    pub stops: Vec<TransitTileStop>,

    #[prost(message, repeated, tag = "2")]
    pub routes: Vec<TransitTileRoute>,

    #[prost(message, repeated, tag = "3")]
    pub stop_pairs: Vec<TransitTileStopPair>,
}

/// A stop within the tile. `graphid`'s index equals the stop's
/// position in `stops`.
#[derive(Clone, PartialEq, Message)]
pub struct TransitTileStop {
    /// Packed source GraphId of the stop.
    #[prost(uint64, tag = "1")]
    pub graphid: u64,

    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(string, tag = "3")]
    pub onestop_id: String,

    #[prost(double, tag = "4")]
    pub lon: f64,

    #[prost(double, tag = "5")]
    pub lat: f64,

    /// OSM way the stop should be attached to.
    #[prost(uint64, tag = "6")]
    pub osm_way_id: u64,

    /// IANA timezone name, e.g. "America/Los_Angeles".
    #[prost(string, tag = "7")]
    pub timezone: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransitTileRoute {
    #[prost(string, tag = "1")]
    pub onestop_id: String,

    #[prost(string, tag = "2")]
    pub operated_by_onestop_id: String,

    #[prost(string, tag = "3")]
    pub operated_by_name: String,

    #[prost(string, tag = "4")]
    pub operated_by_website: String,

    #[prost(uint32, tag = "5")]
    pub route_color: u32,

    #[prost(uint32, tag = "6")]
    pub route_text_color: u32,

    #[prost(string, tag = "7")]
    pub name: String,

    #[prost(string, tag = "8")]
    pub route_long_name: String,

    #[prost(string, tag = "9")]
    pub route_desc: String,

    /// GTFS vehicle type (0 tram, 1 subway, 2 rail, 3 bus, 4 ferry,
    /// 5 cable car, 6 gondola, 7 funicular).
    #[prost(uint32, tag = "10")]
    pub vehicle_type: u32,
}

/// One scheduled stop-to-stop departure.
#[derive(Clone, PartialEq, Message)]
pub struct TransitTileStopPair {
    /// Source GraphId of the origin stop.
    #[prost(uint64, tag = "1")]
    pub origin_graphid: u64,

    /// Source GraphId of the destination stop. May live in another
    /// tile.
    #[prost(uint64, tag = "2")]
    pub destination_graphid: u64,

    /// Index into `TransitTile.routes`.
    #[prost(uint32, tag = "3")]
    pub route_index: u32,

    #[prost(uint32, tag = "4")]
    pub trip_key: u32,

    #[prost(uint32, tag = "5")]
    pub block_id: u32,

    /// Seconds past midnight.
    #[prost(uint32, tag = "6")]
    pub origin_departure_time: u32,

    /// Seconds past midnight.
    #[prost(uint32, tag = "7")]
    pub destination_arrival_time: u32,

    /// Service validity window as YYYYMMDD integers.
    #[prost(uint32, tag = "8")]
    pub service_start_date: u32,

    #[prost(uint32, tag = "9")]
    pub service_end_date: u32,

    /// Seven entries, Monday first.
    #[prost(bool, repeated, tag = "10")]
    pub service_days_of_week: Vec<bool>,

    /// Dates removed from the regular schedule (YYYYMMDD).
    #[prost(uint32, repeated, tag = "11")]
    pub service_except_dates: Vec<u32>,

    /// Dates added to the regular schedule (YYYYMMDD).
    #[prost(uint32, repeated, tag = "12")]
    pub service_added_dates: Vec<u32>,

    #[prost(bool, tag = "13")]
    pub bikes_allowed: bool,

    #[prost(bool, tag = "14")]
    pub wheelchair_accessible: bool,

    #[prost(string, tag = "15")]
    pub trip_headsign: String,

    #[prost(string, tag = "16")]
    pub trip_short_name: String,
}
