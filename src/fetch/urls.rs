// src/fetch/urls.rs
use crate::error::{IngestError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Release host for the monthly trip archives.
pub const DEFAULT_BASE_URL: &str = "https://github.com/DataTalksClub/nyc-tlc-data/releases/download";

/// Fixed location of the zone lookup table.
pub const TAXI_ZONE_LOOKUP_URL: &str =
    "https://raw.githubusercontent.com/Fedi-AB/docker_workshop/main/CSV_files/taxi_zone_lookup.csv";

/// Calendar month, always within 1..=12.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month(u8);

impl Month {
    pub fn new(month: u32) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Month(month as u8))
        } else {
            Err(IngestError::parameter(format!(
                "month must be between 1 and 12, got {month}"
            )))
        }
    }

    pub fn get(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// One `(dataset_type, year, month)` to download, convert and load.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnitOfWork {
    dataset_type: String,
    year: i32,
    month: Month,
}

impl UnitOfWork {
    pub fn new(dataset_type: impl Into<String>, year: i32, month: u32) -> Result<Self> {
        let dataset_type = dataset_type.into();
        validate_dataset_type(&dataset_type)?;
        Ok(Self {
            dataset_type,
            year,
            month: Month::new(month)?,
        })
    }

    pub fn dataset_type(&self) -> &str {
        &self.dataset_type
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Month {
        self.month
    }

    /// `{type}_tripdata_{year}-{month:02}`
    pub fn stem(&self) -> String {
        format!("{}_tripdata_{}-{}", self.dataset_type, self.year, self.month)
    }

    pub fn raw_file_name(&self) -> String {
        format!("{}.csv.gz", self.stem())
    }

    pub fn converted_file_name(&self) -> String {
        format!("{}.parquet", self.stem())
    }

    /// `{base}/{type}/{type}_tripdata_{year}-{month:02}.csv.gz`
    pub fn url(&self, base: &str) -> Result<Url> {
        let raw = format!(
            "{}/{}/{}",
            base.trim_end_matches('/'),
            self.dataset_type,
            self.raw_file_name()
        );
        Url::parse(&raw).map_err(|e| IngestError::parameter(format!("bad base URL {base}: {e}")))
    }

    pub fn dataset_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.dataset_type)
    }

    pub fn raw_path(&self, data_dir: &Path) -> PathBuf {
        self.dataset_dir(data_dir).join(self.raw_file_name())
    }

    pub fn converted_path(&self, data_dir: &Path) -> PathBuf {
        self.dataset_dir(data_dir).join(self.converted_file_name())
    }
}

impl fmt::Display for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}-{}", self.dataset_type, self.year, self.month)
    }
}

/// Dataset types end up in paths and table names, so keep them to
/// lowercase ASCII letters, digits and underscores.
fn validate_dataset_type(dataset_type: &str) -> Result<()> {
    let ok = !dataset_type.is_empty()
        && dataset_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(IngestError::parameter(format!(
            "invalid dataset type {dataset_type:?}"
        )))
    }
}

/// Enumerate every unit, dataset-major then year then month, validating all
/// of them before the caller touches the network or disk.
pub fn enumerate_units(
    dataset_types: &[String],
    years: &[i32],
    months: &[u32],
) -> Result<Vec<UnitOfWork>> {
    let mut units = Vec::with_capacity(dataset_types.len() * years.len() * months.len());
    for dataset_type in dataset_types {
        for &year in years {
            for &month in months {
                units.push(UnitOfWork::new(dataset_type.clone(), year, month)?);
            }
        }
    }
    Ok(units)
}
