/*!
Site-specific housing descriptions.

A housing config describes one magnet housing (M9, M10, ...): for each
magnet type installed there and each file format recorded there, the
named field categories the site cares about. A category either groups
raw source fields or derives a new one through a formula over them.

Housing configs are plain JSON files in the configuration store's
housings directory, loaded through the [`ConfigManager`].
*/
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ConfigCategory, ConfigManager};
use crate::fields::{Field, FieldType};

/// One named field category of a housing: the raw fields it draws on
/// and, for computed categories, the formula that derives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpec {
    #[serde(default)]
    pub fields: Vec<String>,
    pub field_type: FieldType,
    #[serde(default)]
    pub symbol: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl CategorySpec {
    pub fn is_computed(&self) -> bool {
        self.formula.is_some()
    }

    /// A schema field for this category, with the category's own name.
    pub fn to_field(&self, name: &str) -> Field {
        let mut field = Field::new(name, self.field_type, self.unit.clone());
        if !self.symbol.is_empty() {
            field = field.with_symbol(self.symbol.clone());
        }
        field
    }
}

/// What a housing expects from a data set, checked against its keys.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HousingReport {
    pub valid: bool,
    /// Required raw fields absent from the data
    pub missing_required: Vec<String>,
    /// Computed categories whose formula inputs are absent, with the
    /// inputs they lack
    pub missing_inputs: IndexMap<String, Vec<String>>,
}

/// One housing's full description: `magnet type -> format -> category`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HousingConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub magnet_types: IndexMap<String, IndexMap<String, IndexMap<String, CategorySpec>>>,
}

impl HousingConfig {
    /// Load a housing by name from the configuration store. Missing or
    /// malformed entries are logged and return `None`.
    pub fn load(config: &mut ConfigManager, name: &str) -> Option<Self> {
        let value = config.load_config(&ConfigCategory::Housing, name, true)?;
        match serde_json::from_value::<Self>(value) {
            Ok(mut housing) => {
                housing.name = name.to_lowercase();
                Some(housing)
            }
            Err(e) => {
                warn!("Housing config '{}' is malformed: {}", name, e);
                None
            }
        }
    }

    /// Persist this housing back to the store.
    pub fn save(&self, config: &mut ConfigManager) -> bool {
        match serde_json::to_value(self) {
            Ok(value) => config.save_config(&ConfigCategory::Housing, &self.name, &value),
            Err(e) => {
                warn!("Could not serialize housing '{}': {}", self.name, e);
                false
            }
        }
    }

    pub fn magnet_types(&self) -> Vec<&str> {
        self.magnet_types.keys().map(|k| k.as_str()).collect()
    }

    /// The categories recorded for one magnet type and format.
    pub fn categories(
        &self,
        magnet_type: &str,
        format: &str,
    ) -> Option<&IndexMap<String, CategorySpec>> {
        self.magnet_types.get(magnet_type)?.get(format)
    }

    /// The assignment formula for a computed category, in the
    /// `"name = expr"` form [`MagnetData::add_data`] accepts.
    ///
    /// [`MagnetData::add_data`]: crate::data::MagnetData::add_data
    pub fn assignment_for(
        &self,
        magnet_type: &str,
        format: &str,
        category: &str,
    ) -> Option<String> {
        let spec = self.categories(magnet_type, format)?.get(category)?;
        spec.formula
            .as_ref()
            .map(|formula| format!("{} = {}", category, formula))
    }

    /// Check a data set's keys against this housing's expectations for
    /// one magnet type and format. Composite `group/channel` keys match
    /// on their channel part.
    pub fn validate_against<S: AsRef<str>>(
        &self,
        magnet_type: &str,
        format: &str,
        keys: &[S],
    ) -> HousingReport {
        let mut report = HousingReport {
            valid: true,
            ..Default::default()
        };
        let Some(categories) = self.categories(magnet_type, format) else {
            return report;
        };
        let present = |name: &str| {
            keys.iter().any(|key| {
                let key = key.as_ref();
                key == name || key.rsplit_once('/').is_some_and(|(_, c)| c == name)
            })
        };
        for (name, spec) in categories {
            if spec.required {
                for field in &spec.fields {
                    if !present(field) {
                        report.missing_required.push(field.clone());
                    }
                }
            }
            if let Some(formula) = &spec.formula {
                let missing: Vec<String> = match crate::data::Expr::parse(formula) {
                    Ok(expr) => expr
                        .column_refs()
                        .into_iter()
                        .filter(|input| !present(input))
                        .map(str::to_string)
                        .collect(),
                    Err(e) => {
                        warn!(
                            "Housing '{}' category '{}' has a bad formula: {}",
                            self.name, name, e
                        );
                        vec![formula.clone()]
                    }
                };
                if !missing.is_empty() {
                    report.missing_inputs.insert(name.clone(), missing);
                }
            }
        }
        report.valid = report.missing_required.is_empty() && report.missing_inputs.is_empty();
        report
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn demo_housing() -> HousingConfig {
        let value = json!({
            "metadata": {"description": "test housing"},
            "Insert": {
                "pupitre": {
                    "currents": {
                        "fields": ["IH", "IB"],
                        "field_type": "current",
                        "unit": "ampere",
                        "required": true
                    },
                    "total_current": {
                        "fields": [],
                        "field_type": "current",
                        "symbol": "I_t",
                        "unit": "ampere",
                        "formula": "IH + IB"
                    }
                }
            }
        });
        let mut housing: HousingConfig = serde_json::from_value(value).unwrap();
        housing.name = "m9".to_string();
        housing
    }

    #[test]
    fn flattened_layout_round_trips() {
        let housing = demo_housing();
        assert_eq!(housing.magnet_types(), vec!["Insert"]);
        let categories = housing.categories("Insert", "pupitre").unwrap();
        assert_eq!(categories.len(), 2);
        assert!(!categories["currents"].is_computed());
        assert!(categories["total_current"].is_computed());

        let text = serde_json::to_string(&housing).unwrap();
        let mut back: HousingConfig = serde_json::from_str(&text).unwrap();
        back.name = housing.name.clone();
        assert_eq!(back, housing);
    }

    #[test]
    fn computed_category_yields_assignment() {
        let housing = demo_housing();
        assert_eq!(
            housing.assignment_for("Insert", "pupitre", "total_current"),
            Some("total_current = IH + IB".to_string())
        );
        assert!(housing
            .assignment_for("Insert", "pupitre", "currents")
            .is_none());
        assert!(housing.assignment_for("Insert", "nope", "x").is_none());
    }

    #[test]
    fn to_field_carries_symbol_and_unit() {
        let housing = demo_housing();
        let spec = &housing.categories("Insert", "pupitre").unwrap()["total_current"];
        let field = spec.to_field("total_current");
        assert_eq!(field.name, "total_current");
        assert_eq!(field.symbol, "I_t");
        assert_eq!(field.unit, "ampere");
    }

    #[test]
    fn validation_reports_missing_fields_and_inputs() {
        let housing = demo_housing();
        let ok = housing.validate_against("Insert", "pupitre", &["IH", "IB", "t"]);
        assert!(ok.valid);

        let bad = housing.validate_against("Insert", "pupitre", &["IH", "t"]);
        assert!(!bad.valid);
        assert_eq!(bad.missing_required, vec!["IB"]);
        assert_eq!(bad.missing_inputs["total_current"], vec!["IB"]);

        // Composite keys match on the channel part
        let grouped = housing.validate_against("Insert", "pupitre", &["A/IH", "B/IB"]);
        assert!(grouped.valid);

        // Unknown magnet type or format places no expectations
        assert!(housing.validate_against("Bitters", "pupitre", &["x"]).valid);
    }

    #[test]
    fn load_and_save_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ConfigManager::from_base_dir(dir.path());
        let housing = demo_housing();
        assert!(housing.save(&mut config));
        // Loader lowercases on lookup and stamps the name
        let loaded = HousingConfig::load(&mut config, "M9").unwrap();
        assert_eq!(loaded.name, "m9");
        assert_eq!(loaded.magnet_types(), vec!["Insert"]);
        assert!(HousingConfig::load(&mut config, "m10").is_none());
    }
}
