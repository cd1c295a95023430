/*!
In-memory owners of loaded measurement data.

[`MagnetData`] owns either a single table of columns or named groups of
tables, depending on the source format, behind one key-addressed API.
Grouped channels are addressed by `group/channel` composite keys. A
[`FormatDefinition`](crate::format::FormatDefinition) can be bound to
give keys units, symbols, and labels; everything degrades gracefully
when it is absent.
*/
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod formula;
pub mod table;
pub mod validation;

pub use formula::{parse_assignment, Expr, FormulaError};
pub use table::{Column, DataTable};
pub use validation::{FieldStatus, FieldValidation, ValidationStats, ValidationSummary};

use crate::fields::FieldType;
use crate::format::FormatDefinition;
use crate::units::UnitRegistry;

/// Errors raised by key-addressed data manipulation.
#[derive(Debug, Error)]
pub enum DataError {
    /// One or more requested keys are absent
    #[error("keys not found: {0:?}")]
    KeyNotFound(Vec<String>),
    /// A column's length disagrees with the table it joins
    #[error("column '{key}' has {actual} values, expected {expected}")]
    LengthMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
    /// A formula failed to parse or evaluate
    #[error("formula for '{key}' failed")]
    Formula {
        key: String,
        #[source]
        source: FormulaError,
    },
    /// Grouped data requires `group/channel` composite keys
    #[error("grouped data needs a group/channel key, got '{0}'")]
    GroupRequired(String),
    /// The composite key names a group that does not exist
    #[error("unknown group '{0}'")]
    UnknownGroup(String),
    /// The key holds text, not numbers
    #[error("key '{0}' is not numeric")]
    NonNumeric(String),
}

/// New data for a key: either literal values or a formula over existing
/// keys.
#[derive(Debug, Clone)]
pub enum DataInput {
    Formula(String),
    Values(Vec<f64>),
}

impl From<&str> for DataInput {
    fn from(text: &str) -> Self {
        Self::Formula(text.to_string())
    }
}

impl From<String> for DataInput {
    fn from(text: String) -> Self {
        Self::Formula(text)
    }
}

impl From<Vec<f64>> for DataInput {
    fn from(values: Vec<f64>) -> Self {
        Self::Values(values)
    }
}

/// The two in-memory layouts a format can produce.
#[derive(Debug, Clone)]
pub enum Storage {
    Tabular(DataTable),
    Grouped(IndexMap<String, DataTable>),
}

impl Storage {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Tabular(_) => "tabular",
            Self::Grouped(_) => "grouped",
        }
    }
}

/// Schema details for one key, resolved through the bound definition.
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: FieldType,
    pub unit: String,
    pub symbol: String,
    pub description: String,
    pub label: String,
}

/// A structural snapshot of a data set for logs and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DataInfo {
    pub filename: String,
    pub format_type: String,
    pub storage_kind: &'static str,
    pub key_count: usize,
    pub keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_rows: Option<IndexMap<String, usize>>,
    pub definition: Option<String>,
    pub metadata_keys: Vec<String>,
}

/**
One loaded data set: source identity, metadata, the measurement columns,
and an optional bound field schema.

Keys are column names for tabular storage and `group/channel` composites
for grouped storage. Schema lookups try the full key first, then the
channel part alone, so a grouped key still finds a definition written
against bare channel names.
*/
#[derive(Debug, Clone)]
pub struct MagnetData {
    pub filename: String,
    pub format_type: String,
    pub metadata: Map<String, Value>,
    storage: Storage,
    definition: Option<Arc<FormatDefinition>>,
    units: Arc<UnitRegistry>,
}

impl MagnetData {
    pub fn from_table<S: Into<String>, F: Into<String>>(
        filename: S,
        format_type: F,
        table: DataTable,
    ) -> Self {
        Self {
            filename: filename.into(),
            format_type: format_type.into(),
            metadata: Map::new(),
            storage: Storage::Tabular(table),
            definition: None,
            units: Arc::new(UnitRegistry::new()),
        }
    }

    pub fn from_groups<S: Into<String>, F: Into<String>>(
        filename: S,
        format_type: F,
        groups: IndexMap<String, DataTable>,
    ) -> Self {
        Self {
            filename: filename.into(),
            format_type: format_type.into(),
            metadata: Map::new(),
            storage: Storage::Grouped(groups),
            definition: None,
            units: Arc::new(UnitRegistry::new()),
        }
    }

    /// Share a unit registry instead of the default per-instance one.
    pub fn with_units(mut self, units: Arc<UnitRegistry>) -> Self {
        self.units = units;
        self
    }

    pub fn bind_definition(&mut self, definition: Arc<FormatDefinition>) {
        self.definition = Some(definition);
    }

    pub fn definition(&self) -> Option<&Arc<FormatDefinition>> {
        self.definition.as_ref()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Every addressable key, in storage order. Grouped keys come out as
    /// `group/channel` composites.
    pub fn keys(&self) -> Vec<String> {
        match &self.storage {
            Storage::Tabular(table) => table.keys().map(str::to_string).collect(),
            Storage::Grouped(groups) => groups
                .iter()
                .flat_map(|(group, table)| {
                    table
                        .keys()
                        .map(move |channel| format!("{}/{}", group, channel))
                })
                .collect(),
        }
    }

    /// Canonical form of a key: for grouped data a bare channel name
    /// resolves to its composite when exactly one group holds it.
    fn resolve_key(&self, key: &str) -> Option<String> {
        match &self.storage {
            Storage::Tabular(table) => table.contains_key(key).then(|| key.to_string()),
            Storage::Grouped(groups) => {
                if let Some((group, channel)) = key.split_once('/') {
                    return groups
                        .get(group)
                        .is_some_and(|t| t.contains_key(channel))
                        .then(|| key.to_string());
                }
                let mut hits = groups
                    .iter()
                    .filter(|(_, table)| table.contains_key(key))
                    .map(|(group, _)| format!("{}/{}", group, key));
                let first = hits.next()?;
                // Ambiguous bare names do not resolve
                hits.next().is_none().then_some(first)
            }
        }
    }

    /// Check that every key exists, reporting all the missing ones at
    /// once.
    pub fn validate_keys<S: AsRef<str>>(&self, keys: &[S]) -> Result<(), DataError> {
        let missing: Vec<String> = keys
            .iter()
            .map(|k| k.as_ref())
            .filter(|k| self.resolve_key(k).is_none())
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DataError::KeyNotFound(missing))
        }
    }

    /// The whole data set as one table (grouped storage flattens to
    /// composite-named, NaN-padded columns), or just the selected keys.
    pub fn get_data<S: AsRef<str>>(&self, keys: Option<&[S]>) -> Result<DataTable, DataError> {
        let flat = match &self.storage {
            Storage::Tabular(table) => table.clone(),
            Storage::Grouped(groups) => {
                let mut flat = DataTable::new();
                for (group, table) in groups {
                    flat.extend_prefixed(group, table);
                }
                flat
            }
        };
        match keys {
            None => Ok(flat),
            Some(keys) => {
                let resolved: Vec<String> = keys
                    .iter()
                    .map(|k| {
                        self.resolve_key(k.as_ref())
                            .ok_or_else(|| DataError::KeyNotFound(vec![k.as_ref().to_string()]))
                    })
                    .collect::<Result<_, _>>()?;
                flat.select(&resolved)
            }
        }
    }

    /// Numeric values for one key.
    pub fn get_values(&self, key: &str) -> Result<Vec<f64>, DataError> {
        let resolved = self
            .resolve_key(key)
            .ok_or_else(|| DataError::KeyNotFound(vec![key.to_string()]))?;
        let column = match &self.storage {
            Storage::Tabular(table) => table.get(&resolved),
            Storage::Grouped(groups) => {
                let (group, channel) = resolved.split_once('/').unwrap();
                groups.get(group).and_then(|t| t.get(channel))
            }
        };
        column
            .and_then(Column::as_floats)
            .map(|v| v.to_vec())
            .ok_or_else(|| DataError::NonNumeric(key.to_string()))
    }

    /// Add or replace a key from literal values or a formula over
    /// existing keys. Formulas on grouped data evaluate in the target
    /// group's context; references to channels of other groups are pulled
    /// in when their lengths line up.
    pub fn add_data<I: Into<DataInput>>(&mut self, key: &str, input: I) -> Result<(), DataError> {
        if self.resolve_key(key).is_some() {
            warn!("Overwriting existing data key '{}'", key);
        }
        match input.into() {
            DataInput::Values(values) => self.insert_values(key, Column::Float(values)),
            DataInput::Formula(text) => self.add_from_formula(key, &text),
        }
    }

    fn insert_values(&mut self, key: &str, column: Column) -> Result<(), DataError> {
        match &mut self.storage {
            Storage::Tabular(table) => table.insert(key, column),
            Storage::Grouped(groups) => {
                let (group, channel) = key
                    .split_once('/')
                    .ok_or_else(|| DataError::GroupRequired(key.to_string()))?;
                let table = groups
                    .get_mut(group)
                    .ok_or_else(|| DataError::UnknownGroup(group.to_string()))?;
                table.insert(channel, column)
            }
        }
    }

    fn add_from_formula(&mut self, key: &str, text: &str) -> Result<(), DataError> {
        let wrap = |source: FormulaError| DataError::Formula {
            key: key.to_string(),
            source,
        };
        let (target, expr) = parse_assignment(text).map_err(wrap)?;
        if let Some(target) = target {
            let expected = match &self.storage {
                // "GR1/P" accepts an assignment written as "P = ..."
                Storage::Grouped(_) => key.split_once('/').map_or(key, |(_, c)| c),
                Storage::Tabular(_) => key,
            };
            if target != key && target != expected {
                warn!(
                    "Formula assigns '{}' but is stored under '{}'",
                    target, key
                );
            }
        }
        let column = match &self.storage {
            Storage::Tabular(table) => Self::eval_tabular(table, key, &expr)?,
            Storage::Grouped(groups) => Self::eval_grouped(groups, key, &expr)?,
        };
        self.insert_values(key, column)
    }

    fn eval_tabular(table: &DataTable, key: &str, expr: &Expr) -> Result<Column, DataError> {
        let wrap = |source: FormulaError| DataError::Formula {
            key: key.to_string(),
            source,
        };
        // An alias may copy any column, text included
        if let Some(alias) = expr.as_alias() {
            return table
                .get(alias)
                .cloned()
                .ok_or_else(|| wrap(FormulaError::UnknownColumn(alias.to_string())));
        }
        let mut context: HashMap<&str, &[f64]> = HashMap::new();
        for name in expr.column_refs() {
            match table.get(name) {
                Some(column) => {
                    let values = column
                        .as_floats()
                        .ok_or_else(|| wrap(FormulaError::NonNumericColumn(name.to_string())))?;
                    context.insert(name, values);
                }
                None => return Err(wrap(FormulaError::UnknownColumn(name.to_string()))),
            }
        }
        let values = expr.evaluate(&context, table.row_count()).map_err(wrap)?;
        Ok(Column::Float(values))
    }

    fn eval_grouped(
        groups: &IndexMap<String, DataTable>,
        key: &str,
        expr: &Expr,
    ) -> Result<Column, DataError> {
        let wrap = |source: FormulaError| DataError::Formula {
            key: key.to_string(),
            source,
        };
        let (group, _) = key
            .split_once('/')
            .ok_or_else(|| DataError::GroupRequired(key.to_string()))?;
        let target = groups
            .get(group)
            .ok_or_else(|| DataError::UnknownGroup(group.to_string()))?;

        if let Some(alias) = expr.as_alias() {
            let source = target.get(alias).or_else(|| {
                groups
                    .values()
                    .find_map(|table| table.get(alias))
            });
            return source
                .cloned()
                .ok_or_else(|| wrap(FormulaError::UnknownColumn(alias.to_string())));
        }

        let mut context: HashMap<&str, &[f64]> = HashMap::new();
        let mut rows = target.row_count();
        for name in expr.column_refs() {
            // Target group first, then any other group holding the channel
            let column = target
                .get(name)
                .or_else(|| groups.values().find_map(|table| table.get(name)));
            let Some(column) = column else {
                return Err(wrap(FormulaError::UnknownColumn(name.to_string())));
            };
            let values = column
                .as_floats()
                .ok_or_else(|| wrap(FormulaError::NonNumericColumn(name.to_string())))?;
            if rows == 0 {
                rows = values.len();
            } else if values.len() != rows {
                return Err(DataError::LengthMismatch {
                    key: name.to_string(),
                    expected: rows,
                    actual: values.len(),
                });
            }
            context.insert(name, values);
        }
        let values = expr.evaluate(&context, rows).map_err(wrap)?;
        Ok(Column::Float(values))
    }

    /// Remove keys, silently skipping the ones that are already absent.
    pub fn remove_data<S: AsRef<str>>(&mut self, keys: &[S]) {
        for key in keys {
            let key = key.as_ref();
            let Some(resolved) = self.resolve_key(key) else {
                debug!("remove_data: key '{}' not present, skipping", key);
                continue;
            };
            match &mut self.storage {
                Storage::Tabular(table) => {
                    table.remove(&resolved);
                }
                Storage::Grouped(groups) => {
                    let (group, channel) = resolved.split_once('/').unwrap();
                    if let Some(table) = groups.get_mut(group) {
                        table.remove(channel);
                    }
                }
            }
        }
    }

    /// Rename a key in place. For grouped data the new name stays inside
    /// the old key's group; a composite new name must agree on the group.
    pub fn rename_data(&mut self, old: &str, new: &str) -> Result<(), DataError> {
        let resolved = self
            .resolve_key(old)
            .ok_or_else(|| DataError::KeyNotFound(vec![old.to_string()]))?;
        match &mut self.storage {
            Storage::Tabular(table) => table.rename(&resolved, new),
            Storage::Grouped(groups) => {
                let (group, channel) = resolved.split_once('/').unwrap();
                let new_channel = match new.split_once('/') {
                    Some((new_group, channel)) if new_group == group => channel,
                    Some((new_group, _)) => {
                        return Err(DataError::UnknownGroup(new_group.to_string()));
                    }
                    None => new,
                };
                let group = group.to_string();
                let channel = channel.to_string();
                groups
                    .get_mut(&group)
                    .ok_or_else(|| DataError::UnknownGroup(group.clone()))?
                    .rename(&channel, new_channel)
            }
        }
    }

    /// Apply several renames, stopping at the first failure.
    pub fn rename_data_map(&mut self, renames: &[(&str, &str)]) -> Result<(), DataError> {
        for (old, new) in renames {
            self.rename_data(old, new)?;
        }
        Ok(())
    }

    /// The field covering a key, trying the full key and then the channel
    /// part for composites.
    fn field_for(&self, key: &str) -> Option<&crate::fields::Field> {
        let def = self.definition.as_deref()?;
        def.get_field(key)
            .or_else(|| key.rsplit_once('/').and_then(|(_, c)| def.get_field(c)))
    }

    pub fn get_field_info(&self, key: &str) -> Option<FieldInfo> {
        let field = self.field_for(key)?;
        Some(FieldInfo {
            name: field.name.clone(),
            field_type: field.field_type,
            unit: field.unit.clone(),
            symbol: field.symbol.clone(),
            description: field.description.clone(),
            label: field.get_label(&self.units, true),
        })
    }

    /// Axis label for a key, degrading to the bare key without a schema.
    pub fn get_field_label(&self, key: &str, show_unit: bool) -> String {
        match self.field_for(key) {
            Some(field) => field.get_label(&self.units, show_unit),
            None => key.to_string(),
        }
    }

    /// A key's values converted to `target_unit`, passed through
    /// unchanged when the key has no schema or the conversion is
    /// impossible.
    pub fn convert_field_values(&self, key: &str, target_unit: &str) -> Result<Vec<f64>, DataError> {
        let values = self.get_values(key)?;
        match self.field_for(key) {
            Some(field) => Ok(field.convert_values(&values, target_unit, &self.units)),
            None => Ok(values),
        }
    }

    pub fn get_compatible_units(&self, key: &str) -> Vec<String> {
        let Some(field) = self.field_for(key) else {
            return Vec::new();
        };
        field
            .field_type
            .candidate_units()
            .iter()
            .filter(|unit| field.is_compatible_unit(unit, &self.units))
            .map(|unit| unit.to_string())
            .collect()
    }

    pub fn get_info(&self) -> DataInfo {
        let keys = self.keys();
        let (row_count, group_rows) = match &self.storage {
            Storage::Tabular(table) => (Some(table.row_count()), None),
            Storage::Grouped(groups) => (
                None,
                Some(
                    groups
                        .iter()
                        .map(|(name, table)| (name.clone(), table.row_count()))
                        .collect(),
                ),
            ),
        };
        DataInfo {
            filename: self.filename.clone(),
            format_type: self.format_type.clone(),
            storage_kind: self.storage.kind_name(),
            key_count: keys.len(),
            keys,
            row_count,
            group_rows,
            definition: self
                .definition
                .as_ref()
                .map(|d| d.format_name.clone()),
            metadata_keys: self.metadata.keys().cloned().collect(),
        }
    }

    /// Validate every key against the bound schema and its own values.
    /// Non-finite values count as failures; text columns have none.
    pub fn get_field_validation_summary(&self) -> ValidationSummary {
        let mut results = IndexMap::new();
        for key in self.keys() {
            let column = match &self.storage {
                Storage::Tabular(table) => table.get(&key).cloned(),
                Storage::Grouped(groups) => {
                    let (group, channel) = key.split_once('/').unwrap();
                    groups.get(group).and_then(|t| t.get(channel)).cloned()
                }
            };
            let (total, failed) = match &column {
                Some(Column::Float(values)) => (
                    values.len(),
                    values.iter().filter(|v| !v.is_finite()).count(),
                ),
                Some(Column::Text(values)) => (values.len(), 0),
                None => (0, 0),
            };
            let status = if self.field_for(&key).is_some() {
                validation::classify(total, failed)
            } else {
                FieldStatus::NoFieldDefinition
            };
            results.insert(
                key,
                FieldValidation {
                    status,
                    total_values: total,
                    failed_values: failed,
                },
            );
        }
        validation::summarize(results)
    }
}
