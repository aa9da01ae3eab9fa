pub mod arrow;
pub mod presets;
pub mod types;

pub use self::arrow::{build_arrow_schema, make_read_schema, map_to_arrow_type};
pub use types::{ColumnTypeMap, ScalarType, SchemaSource};
