// src/fetch/mod.rs

pub mod download;
pub mod urls;

pub use download::download_to;
pub use urls::{enumerate_units, Month, UnitOfWork, DEFAULT_BASE_URL, TAXI_ZONE_LOOKUP_URL};
