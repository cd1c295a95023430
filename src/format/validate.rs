use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use super::FormatDefinition;
use crate::fields::FieldType;
use crate::units::UnitRegistry;

/// The outcome of checking a format definition for authoring mistakes.
///
/// Issues make the definition invalid; warnings flag things worth a look
/// but do not block registration.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub total_fields: usize,
    pub field_types: IndexMap<&'static str, usize>,
}

/// Check a definition for duplicate display symbols, unparsable units,
/// missing descriptions, and suspicious dimensionless units.
pub fn validate_format_definition(
    def: &FormatDefinition,
    reg: &UnitRegistry,
) -> ValidationReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    // Two different field names sharing one display symbol is ambiguous
    // on a plot axis.
    let mut symbols: HashMap<&str, &str> = HashMap::new();
    for field in def.fields() {
        if let Some(first) = symbols.get(field.symbol.as_str()) {
            issues.push(format!(
                "Duplicate symbol '{}' used by '{}' and '{}'",
                field.symbol, field.name, first
            ));
        } else {
            symbols.insert(&field.symbol, &field.name);
        }
    }

    let missing: Vec<&str> = def
        .fields()
        .filter(|f| f.description.is_empty())
        .map(|f| f.name.as_str())
        .collect();
    if !missing.is_empty() {
        warnings.push(format!("Fields missing descriptions: {:?}", missing));
    }

    for field in def.fields() {
        match reg.parse_expression(&field.unit) {
            Ok(expr) => {
                // Index, percentage, and raw time counters legitimately
                // carry dimensionless units; everything else should not.
                let exempt = matches!(
                    field.field_type,
                    FieldType::Index | FieldType::Percentage | FieldType::Time
                );
                if expr.is_dimensionless() && !exempt {
                    warnings.push(format!(
                        "Field '{}' has dimensionless unit but type '{}'",
                        field.name, field.field_type
                    ));
                }
            }
            Err(e) => {
                issues.push(format!(
                    "Invalid unit '{}' for field '{}': {}",
                    field.unit, field.name, e
                ));
            }
        }
    }

    let field_types = FieldType::ALL
        .iter()
        .map(|ft| (ft.as_str(), def.get_fields_by_type(*ft).len()))
        .collect();

    ValidationReport {
        valid: issues.is_empty(),
        issues,
        warnings,
        total_fields: def.len(),
        field_types,
    }
}

/// Merge two definitions: all of `base`'s fields and metadata first, then
/// `overlay` on top. Overlay fields win on name collision and metadata is
/// shallow-merged the same way; collisions are never an error.
pub fn merge_format_definitions(
    base: &FormatDefinition,
    overlay: &FormatDefinition,
) -> FormatDefinition {
    let mut merged = FormatDefinition::new(base.format_name.clone());
    merged.metadata = base.metadata.clone();
    for field in base.fields() {
        merged.add_field(field.clone());
    }
    for (key, value) in &overlay.metadata {
        merged.metadata.insert(key.clone(), value.clone());
    }
    for field in overlay.fields() {
        merged.add_field(field.clone());
    }
    merged
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeSummary {
    pub count: usize,
    pub fields: Vec<String>,
}

/// A condensed view of a definition's fields, grouped by type.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    pub format_name: String,
    pub total_fields: usize,
    pub by_type: IndexMap<&'static str, TypeSummary>,
    pub units_used: Vec<String>,
    pub symbols_used: Vec<String>,
}

pub fn field_summary(def: &FormatDefinition) -> FieldSummary {
    let mut by_type = IndexMap::new();
    for ft in FieldType::ALL {
        let fields = def.get_fields_by_type(ft);
        if !fields.is_empty() {
            by_type.insert(
                ft.as_str(),
                TypeSummary {
                    count: fields.len(),
                    fields: fields.iter().map(|f| f.name.clone()).collect(),
                },
            );
        }
    }
    let mut units_used: Vec<String> = def.fields().map(|f| f.unit.clone()).collect();
    units_used.sort();
    units_used.dedup();
    let mut symbols_used: Vec<String> = def.fields().map(|f| f.symbol.clone()).collect();
    symbols_used.sort();
    symbols_used.dedup();

    FieldSummary {
        format_name: def.format_name.clone(),
        total_fields: def.len(),
        by_type,
        units_used,
        symbols_used,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fields::Field;
    use serde_json::Value;

    fn reg() -> UnitRegistry {
        UnitRegistry::new()
    }

    fn base() -> FormatDefinition {
        let mut def = FormatDefinition::new("demo");
        def.metadata
            .insert("description".into(), Value::String("base".into()));
        def.add_field(
            Field::new("Field", FieldType::MagneticField, "tesla").with_description("main field"),
        );
        def.add_field(
            Field::new("Current", FieldType::Current, "ampere").with_description("supply current"),
        );
        def
    }

    #[test]
    fn clean_definition_validates() {
        let report = validate_format_definition(&base(), &reg());
        assert!(report.valid);
        assert!(report.issues.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(report.total_fields, 2);
        assert_eq!(report.field_types["magnetic_field"], 1);
    }

    #[test]
    fn duplicate_symbols_are_issues() {
        let mut def = base();
        def.add_field(
            Field::new("Bz", FieldType::MagneticField, "tesla")
                .with_symbol("B")
                .with_description("axial field"),
        );
        let report = validate_format_definition(&def, &reg());
        assert!(!report.valid);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("Duplicate symbol 'B'"));
    }

    #[test]
    fn unparsable_unit_is_an_issue() {
        let mut def = base();
        def.add_field(
            Field::new("Odd", FieldType::Pressure, "wizbangs").with_description("whatever"),
        );
        let report = validate_format_definition(&def, &reg());
        assert!(!report.valid);
        assert!(report.issues[0].contains("Invalid unit 'wizbangs'"));
    }

    #[test]
    fn dimensionless_on_dimensioned_type_warns() {
        let mut def = base();
        def.add_field(
            Field::new("T1", FieldType::Temperature, "dimensionless").with_description("odd"),
        );
        def.add_field(
            Field::new("pct", FieldType::Percentage, "percent").with_description("duty"),
        );
        let report = validate_format_definition(&def, &reg());
        // Valid (warnings only), and the percentage field is exempt
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("'T1'"));
    }

    #[test]
    fn merge_overlay_wins() {
        let mut overlay = FormatDefinition::new("patch");
        overlay
            .metadata
            .insert("description".into(), Value::String("patched".into()));
        overlay.add_field(
            Field::new("Field", FieldType::MagneticField, "gauss").with_symbol("Φ"),
        );
        overlay.add_field(Field::new("Extra", FieldType::Index, "dimensionless"));

        let merged = merge_format_definitions(&base(), &overlay);
        assert_eq!(merged.format_name, "demo");
        // Overlay replaced the colliding field entirely
        let field = merged.get_field("Field").unwrap();
        assert_eq!(field.unit, "gauss");
        assert_eq!(field.symbol, "Φ");
        // Base-only fields survive
        assert_eq!(merged.get_field("Current").unwrap().unit, "ampere");
        assert_eq!(merged.get_field("Extra").unwrap().name, "Extra");
        // Metadata shallow-merged, overlay winning
        assert_eq!(merged.metadata["description"], "patched");
    }

    #[test]
    fn merged_duplicate_symbol_fully_replaced() {
        // Both define "Field", one with symbol B and one with Φ; after the
        // merge there must be no leftover B entry to collide with.
        let mut overlay = FormatDefinition::new("demo");
        overlay.add_field(
            Field::new("Field", FieldType::MagneticField, "tesla")
                .with_symbol("Φ")
                .with_description("flux"),
        );
        let mut base_def = FormatDefinition::new("demo");
        base_def.add_field(
            Field::new("Field", FieldType::MagneticField, "tesla")
                .with_symbol("B")
                .with_description("field"),
        );
        let merged = merge_format_definitions(&base_def, &overlay);
        let report = validate_format_definition(&merged, &reg());
        assert!(report.valid);
        assert!(report.issues.is_empty());
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn summary_collects_units_and_symbols() {
        let summary = field_summary(&base());
        assert_eq!(summary.total_fields, 2);
        assert_eq!(summary.by_type["current"].fields, vec!["Current"]);
        assert_eq!(summary.units_used, vec!["ampere", "tesla"]);
        assert!(summary.symbols_used.contains(&"B".to_string()));
    }
}
