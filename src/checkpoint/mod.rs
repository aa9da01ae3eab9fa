// src/checkpoint/mod.rs

use crate::fetch::UnitOfWork;
use std::path::Path;

/// A unit is done once its converted Parquet file exists. Raw downloads and
/// `.part`/`.tmp` leftovers never count.
pub fn is_done(converted: &Path) -> bool {
    converted.is_file()
}

/// Split `units` into `(done, pending)` against the converted files under
/// `data_dir`, keeping the input order in both.
pub fn partition_units(
    units: impl IntoIterator<Item = UnitOfWork>,
    data_dir: &Path,
) -> (Vec<UnitOfWork>, Vec<UnitOfWork>) {
    units
        .into_iter()
        .partition(|unit| is_done(&unit.converted_path(data_dir)))
}
