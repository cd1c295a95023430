/*!
`magnetdata` provides the schema layer for heterogeneous
magnet-instrument data: a taxonomy of measurement field types, unit-aware
field definitions, per-format field schemas resolved through a central
registry, and key-addressed in-memory data owners with validation and
coverage reporting.

A minimal session binds a format's schema to loaded data:

```rust
use magnetdata::prelude::*;
use magnetdata::config::ConfigManager;

# fn main() -> Result<(), magnetdata::data::DataError> {
let dir = tempfile::tempdir().unwrap();
let mut registry = FormatRegistry::new(ConfigManager::from_base_dir(dir.path()));
let definition = registry.get_format("pupitre").unwrap();

let mut table = DataTable::new();
table.insert("Field", vec![0.0, 5.0, 10.0])?;
table.insert("IH", vec![0.0, 15000.0, 30000.0])?;

let mut data = MagnetData::from_table("M9_2024.txt", "pupitre", table)
    .with_units(registry.units().clone());
data.bind_definition(definition);

assert_eq!(data.get_field_label("Field", true), "B [T]");
let summary = data.get_field_validation_summary();
assert_eq!(summary.summary.coverage_percent, 100.0);
# Ok(())
# }
```
*/
pub mod config;
pub mod data;
pub mod fields;
pub mod format;
pub mod housing;
pub mod units;

pub mod prelude;

pub use crate::config::{ConfigCategory, ConfigManager, ConfigPaths};
pub use crate::data::{DataError, DataTable, MagnetData, Storage};
pub use crate::fields::{Field, FieldType};
pub use crate::format::{FormatDefinition, FormatError, FormatRegistry};
pub use crate::housing::HousingConfig;
pub use crate::units::{UnitExpr, UnitRegistry};
