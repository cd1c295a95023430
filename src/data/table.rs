use indexmap::IndexMap;

use super::DataError;

/// One column of measurement data. Numeric channels dominate, but some
/// formats carry text columns (timestamps, operator annotations).
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Self::Text(v) => Some(v),
            Self::Float(_) => None,
        }
    }

    /// Extend with padding values up to `len` rows.
    fn pad_to(&mut self, len: usize) {
        match self {
            Self::Float(v) => v.resize(len, f64::NAN),
            Self::Text(v) => v.resize(len, String::new()),
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Self::Text(v)
    }
}

/// An ordered set of equal-length named columns.
///
/// Column order is insertion order and is observable: derived channels
/// appended later list after the raw ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: IndexMap<String, Column>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows; zero when the table has no columns.
    pub fn row_count(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.columns.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Column> {
        self.columns.get(key)
    }

    pub fn get_floats(&self, key: &str) -> Option<&[f64]> {
        self.columns.get(key).and_then(Column::as_floats)
    }

    /// Insert a column, enforcing the uniform row count. Replaces any
    /// existing column of the same name.
    pub fn insert<C: Into<Column>>(&mut self, key: &str, column: C) -> Result<(), DataError> {
        let column = column.into();
        // Replacing the only column may change the row count freely
        let others: Vec<&str> = self.keys().filter(|k| *k != key).collect();
        if !others.is_empty() {
            let expected = self.columns[others[0]].len();
            if column.len() != expected {
                return Err(DataError::LengthMismatch {
                    key: key.to_string(),
                    expected,
                    actual: column.len(),
                });
            }
        }
        self.columns.insert(key.to_string(), column);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Column> {
        self.columns.shift_remove(key)
    }

    /// Rename a column in place, keeping its position.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), DataError> {
        if !self.columns.contains_key(old) {
            return Err(DataError::KeyNotFound(vec![old.to_string()]));
        }
        self.columns = std::mem::take(&mut self.columns)
            .into_iter()
            .map(|(k, v)| if k == old { (new.to_string(), v) } else { (k, v) })
            .collect();
        Ok(())
    }

    /// A new table holding only `keys`, in the requested order.
    pub fn select<S: AsRef<str>>(&self, keys: &[S]) -> Result<DataTable, DataError> {
        let missing: Vec<String> = keys
            .iter()
            .map(|k| k.as_ref())
            .filter(|k| !self.columns.contains_key(*k))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(DataError::KeyNotFound(missing));
        }
        let mut out = DataTable::new();
        for key in keys {
            let key = key.as_ref();
            out.columns
                .insert(key.to_string(), self.columns[key].clone());
        }
        Ok(out)
    }

    /// Append another table's columns under prefixed names, padding every
    /// column with NaN (or empty strings) to the longer row count. Used to
    /// flatten grouped data into one table.
    pub fn extend_prefixed(&mut self, prefix: &str, other: &DataTable) {
        let rows = self.row_count().max(other.row_count());
        for column in self.columns.values_mut() {
            column.pad_to(rows);
        }
        for (key, column) in &other.columns {
            let mut column = column.clone();
            column.pad_to(rows);
            self.columns.insert(format!("{}/{}", prefix, key), column);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> DataTable {
        let mut t = DataTable::new();
        t.insert("t", vec![0.0, 1.0, 2.0]).unwrap();
        t.insert("Field", vec![0.0, 5.0, 10.0]).unwrap();
        t
    }

    #[test]
    fn uniform_length_enforced() {
        let mut t = table();
        let err = t.insert("bad", vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            DataError::LengthMismatch {
                expected: 3,
                actual: 1,
                ..
            }
        ));
        // Replacement of an existing column keeps the constraint
        t.insert("Field", vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.row_count(), 3);
    }

    #[test]
    fn rename_preserves_order() {
        let mut t = table();
        t.rename("t", "time").unwrap();
        assert_eq!(t.keys().collect::<Vec<_>>(), vec!["time", "Field"]);
        assert!(t.rename("gone", "x").is_err());
    }

    #[test]
    fn select_in_requested_order() {
        let t = table();
        let picked = t.select(&["Field", "t"]).unwrap();
        assert_eq!(picked.keys().collect::<Vec<_>>(), vec!["Field", "t"]);
        let err = t.select(&["Field", "nope"]).unwrap_err();
        assert!(matches!(err, DataError::KeyNotFound(missing) if missing == vec!["nope"]));
    }

    #[test]
    fn extend_prefixed_pads_short_columns() {
        let mut flat = DataTable::new();
        let mut g1 = DataTable::new();
        g1.insert("I", vec![1.0, 2.0]).unwrap();
        let mut g2 = DataTable::new();
        g2.insert("U", vec![5.0, 6.0, 7.0]).unwrap();
        flat.extend_prefixed("GR1", &g1);
        flat.extend_prefixed("GR2", &g2);
        assert_eq!(flat.row_count(), 3);
        let i = flat.get_floats("GR1/I").unwrap();
        assert_eq!(&i[..2], &[1.0, 2.0]);
        assert!(i[2].is_nan());
        assert_eq!(flat.get_floats("GR2/U").unwrap(), &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn text_columns_round_trip() {
        let mut t = table();
        t.insert(
            "stamp",
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
        )
        .unwrap();
        assert!(t.get_floats("stamp").is_none());
        assert_eq!(t.get("stamp").unwrap().as_text().unwrap().len(), 3);
    }
}
