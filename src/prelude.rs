//! Common imports for working with formats, fields, and loaded data.
pub use crate::data::{Column, DataInput, DataTable, MagnetData, Storage};
pub use crate::fields::{Field, FieldType};
pub use crate::format::{
    FormatDefinition, FormatRegistry, ReaderKind, ResolvedFormat, StorageKind,
};
pub use crate::housing::HousingConfig;
pub use crate::units::{UnitExpr, UnitRegistry};
