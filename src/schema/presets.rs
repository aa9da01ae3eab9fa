// src/schema/presets.rs

use super::types::{ColumnTypeMap, ScalarType};

/// Column types of the yellow taxi trip records.
pub fn yellow_tripdata() -> ColumnTypeMap {
    use ScalarType::*;

    [
        ("VendorID", Int64),
        ("passenger_count", Int64),
        ("trip_distance", Float64),
        ("RatecodeID", Int64),
        ("store_and_fwd_flag", Text),
        ("PULocationID", Int64),
        ("DOLocationID", Int64),
        ("payment_type", Int64),
        ("fare_amount", Float64),
        ("extra", Float64),
        ("mta_tax", Float64),
        ("tip_amount", Float64),
        ("tolls_amount", Float64),
        ("improvement_surcharge", Float64),
        ("total_amount", Float64),
        ("congestion_surcharge", Float64),
    ]
    .into_iter()
    .fold(ColumnTypeMap::new(), |map, (col, ty)| map.with(col, ty))
    .with_parse_dates(["tpep_pickup_datetime", "tpep_dropoff_datetime"])
}

/// Column types of the taxi zone lookup table.
pub fn taxi_zone_lookup() -> ColumnTypeMap {
    ColumnTypeMap::new()
        .with("LocationID", ScalarType::Int64)
        .with("Borough", ScalarType::Text)
        .with("Zone", ScalarType::Text)
        .with("service_zone", ScalarType::Text)
}
