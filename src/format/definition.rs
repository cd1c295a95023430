use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::FormatError;
use crate::fields::{infer_field, Field, FieldType};
use crate::units::UnitRegistry;

/// The full field schema for one instrument/file format: an ordered
/// mapping of field name to [`Field`], plus free-form metadata.
///
/// `format_name` is the external identity the registry resolves; the map
/// keys always equal each field's own `name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FormatDefinitionRepr", into = "FormatDefinitionRepr")]
pub struct FormatDefinition {
    pub format_name: String,
    fields: IndexMap<String, Field>,
    pub metadata: Map<String, Value>,
}

/// The canonical JSON shape: fields serialized as a list in insertion
/// order.
#[derive(Debug, Serialize, Deserialize)]
struct FormatDefinitionRepr {
    format_name: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    fields: Vec<Field>,
}

impl From<FormatDefinitionRepr> for FormatDefinition {
    fn from(repr: FormatDefinitionRepr) -> Self {
        let mut def = FormatDefinition::new(repr.format_name);
        def.metadata = repr.metadata;
        for mut field in repr.fields {
            field.fill_default_symbol();
            def.add_field(field);
        }
        def
    }
}

impl From<FormatDefinition> for FormatDefinitionRepr {
    fn from(def: FormatDefinition) -> Self {
        FormatDefinitionRepr {
            format_name: def.format_name,
            metadata: def.metadata,
            fields: def.fields.into_values().collect(),
        }
    }
}

/// Per-field unit validation result.
#[derive(Debug, Clone, Serialize)]
pub struct FieldUnitReport {
    pub valid: bool,
    pub formatted_unit: String,
    pub dimensionality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FormatDefinition {
    pub fn new<S: Into<String>>(format_name: S) -> Self {
        Self {
            format_name: format_name.into(),
            fields: IndexMap::new(),
            metadata: Map::new(),
        }
    }

    /// Build an auto-detected definition from raw column names, guessing
    /// each field's type, unit, and symbol from its name.
    pub fn from_data_keys<S: AsRef<str>>(format_name: &str, keys: &[S]) -> Self {
        let mut def = Self::new(format_name);
        def.metadata.insert(
            "description".to_string(),
            Value::String(format!("Auto-detected format for {}", format_name)),
        );
        for key in keys {
            def.add_field(infer_field(key.as_ref()));
        }
        def
    }

    /// Upsert a field by name; the last write wins on collision.
    pub fn add_field(&mut self, field: Field) {
        self.fields.insert(field.name.clone(), field);
    }

    /// Look up a field by name. Absence is an expected case, not an error:
    /// data keys are allowed to drift from the schema.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn list_fields(&self) -> Vec<&str> {
        self.fields.keys().map(|k| k.as_str()).collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields of one measurement kind, in schema order. Used for
    /// "first field of interest" selection policies like default plot axes.
    pub fn get_fields_by_type(&self, field_type: FieldType) -> Vec<&Field> {
        self.fields
            .values()
            .filter(|f| f.field_type == field_type)
            .collect()
    }

    /// Convert values for a named field; unknown fields and conversion
    /// failures pass the values through unchanged.
    pub fn convert_field_values(
        &self,
        field_name: &str,
        values: &[f64],
        target_unit: &str,
        reg: &UnitRegistry,
    ) -> Vec<f64> {
        match self.get_field(field_name) {
            Some(field) => field.convert_values(values, target_unit, reg),
            None => values.to_vec(),
        }
    }

    /// Display label for a named field, degrading to the bare name for
    /// unknown fields.
    pub fn get_field_label(&self, field_name: &str, show_unit: bool, reg: &UnitRegistry) -> String {
        match self.get_field(field_name) {
            Some(field) => field.get_label(reg, show_unit),
            None => field_name.to_string(),
        }
    }

    /// Validate that a field's unit expression parses, reporting its
    /// compact rendering and dimensionality.
    pub fn validate_field_unit(&self, field_name: &str, reg: &UnitRegistry) -> FieldUnitReport {
        let Some(field) = self.get_field(field_name) else {
            return FieldUnitReport {
                valid: false,
                formatted_unit: String::new(),
                dimensionality: String::new(),
                error: Some("Field not found".to_string()),
            };
        };
        match reg.parse_expression(&field.unit) {
            Ok(expr) => FieldUnitReport {
                valid: true,
                formatted_unit: expr.display().to_string(),
                dimensionality: expr.dims.to_string(),
                error: None,
            },
            Err(e) => FieldUnitReport {
                valid: false,
                formatted_unit: String::new(),
                dimensionality: String::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Candidate target units for a field, re-derived from the live unit
    /// expression rather than hard-coded per field.
    pub fn get_compatible_units(&self, field_name: &str, reg: &UnitRegistry) -> Vec<String> {
        let Some(field) = self.get_field(field_name) else {
            return Vec::new();
        };
        field
            .field_type
            .candidate_units()
            .iter()
            .filter(|unit| field.is_compatible_unit(unit, reg))
            .map(|unit| unit.to_string())
            .collect()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, filepath: P) -> Result<(), FormatError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(filepath, text)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(filepath: P) -> Result<Self, FormatError> {
        let text = fs::read_to_string(filepath)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::units::UnitRegistry;

    fn demo_format() -> FormatDefinition {
        let mut def = FormatDefinition::new("demo");
        def.metadata.insert(
            "description".to_string(),
            Value::String("demo format".to_string()),
        );
        def.add_field(Field::new("Field", FieldType::MagneticField, "tesla"));
        def.add_field(Field::new("Current", FieldType::Current, "ampere"));
        def
    }

    #[test]
    fn add_field_is_an_upsert() {
        let mut def = demo_format();
        assert_eq!(def.len(), 2);
        def.add_field(Field::new("Field", FieldType::MagneticField, "gauss"));
        assert_eq!(def.len(), 2);
        assert_eq!(def.get_field("Field").unwrap().unit, "gauss");
    }

    #[test]
    fn lookup_by_type() {
        let def = demo_format();
        let fields = def.get_fields_by_type(FieldType::MagneticField);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "Field");
        assert!(def.get_fields_by_type(FieldType::Pressure).is_empty());
    }

    #[test]
    fn json_round_trip_preserves_everything() {
        let def = demo_format();
        let text = serde_json::to_string(&def).unwrap();
        let back: FormatDefinition = serde_json::from_str(&text).unwrap();
        assert_eq!(back, def);
        // Field order survives the list representation
        assert_eq!(back.list_fields(), vec!["Field", "Current"]);
    }

    #[test]
    fn deserialized_fields_get_default_symbols() {
        let text = r#"{
            "format_name": "bare",
            "fields": [
                {"name": "Field", "field_type": "magnetic_field", "unit": "tesla"}
            ]
        }"#;
        let def: FormatDefinition = serde_json::from_str(text).unwrap();
        assert_eq!(def.get_field("Field").unwrap().symbol, "B");
    }

    #[test]
    fn unknown_field_degrades_to_identity() {
        let reg = UnitRegistry::new();
        let def = demo_format();
        assert_eq!(
            def.convert_field_values("Missing", &[1.0, 2.0], "gauss", &reg),
            vec![1.0, 2.0]
        );
        assert_eq!(def.get_field_label("Missing", true, &reg), "Missing");
    }

    #[test]
    fn compatible_units_rederived_from_unit_expression() {
        let reg = UnitRegistry::new();
        let def = demo_format();
        let units = def.get_compatible_units("Field", &reg);
        assert!(units.contains(&"gauss".to_string()));
        assert!(units.contains(&"mT".to_string()));
        assert!(def.get_compatible_units("Missing", &reg).is_empty());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        let def = demo_format();
        def.save_to_file(&path).unwrap();
        let back = FormatDefinition::load_from_file(&path).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn inferred_definition_covers_all_keys() {
        let def = FormatDefinition::from_data_keys("auto", &["t", "Field", "Icoil1", "weird"]);
        assert_eq!(def.len(), 4);
        assert_eq!(def.get_field("t").unwrap().field_type, FieldType::Time);
        assert_eq!(def.get_field("weird").unwrap().field_type, FieldType::Index);
    }
}
