/*!
Typed, unit-bearing column descriptors.

A [`Field`] gives one data column a semantic identity: a [`FieldType`]
drawn from a closed taxonomy of measurement kinds, a unit expression, a
display symbol, and a description. Fields are immutable value objects;
"editing" one means replacing the entry in its owning format definition.
*/
use std::fmt::{self, Display};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::units::{UnitExpr, UnitRegistry};

/// The closed set of measurement kinds a column can belong to.
///
/// Unclassified columns use [`FieldType::Index`] rather than an absent
/// type, so every field always has exactly one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Time,
    MagneticField,
    Current,
    Voltage,
    Temperature,
    Pressure,
    FlowRate,
    Power,
    RotationSpeed,
    Percentage,
    Resistance,
    Coordinate,
    Length,
    Area,
    Volume,
    Index,
}

impl FieldType {
    pub const ALL: [FieldType; 16] = [
        Self::Time,
        Self::MagneticField,
        Self::Current,
        Self::Voltage,
        Self::Temperature,
        Self::Pressure,
        Self::FlowRate,
        Self::Power,
        Self::RotationSpeed,
        Self::Percentage,
        Self::Resistance,
        Self::Coordinate,
        Self::Length,
        Self::Area,
        Self::Volume,
        Self::Index,
    ];

    /// The serialized (snake_case) name of this type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::MagneticField => "magnetic_field",
            Self::Current => "current",
            Self::Voltage => "voltage",
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::FlowRate => "flow_rate",
            Self::Power => "power",
            Self::RotationSpeed => "rotation_speed",
            Self::Percentage => "percentage",
            Self::Resistance => "resistance",
            Self::Coordinate => "coordinate",
            Self::Length => "length",
            Self::Area => "area",
            Self::Volume => "volume",
            Self::Index => "index",
        }
    }

    /// The display symbol used when a field does not supply its own.
    pub const fn default_symbol(&self) -> &'static str {
        match self {
            Self::Time => "t",
            Self::MagneticField => "B",
            Self::Current => "I",
            Self::Voltage => "U",
            Self::Temperature => "T",
            Self::Pressure => "P",
            Self::FlowRate => "Q",
            Self::Power => "P",
            Self::RotationSpeed => "ω",
            Self::Percentage => "%",
            Self::Resistance => "R",
            Self::Coordinate => "x",
            Self::Length => "L",
            Self::Area => "A",
            Self::Volume => "V",
            Self::Index => "idx",
        }
    }

    /// The unit assumed for auto-inferred fields of this type.
    pub const fn default_unit(&self) -> &'static str {
        match self {
            Self::Time => "second",
            Self::MagneticField => "tesla",
            Self::Current => "ampere",
            Self::Voltage => "volt",
            Self::Temperature => "celsius",
            Self::Pressure => "bar",
            Self::FlowRate => "liter/minute",
            Self::Power => "watt",
            Self::RotationSpeed => "rpm",
            Self::Percentage => "percent",
            Self::Resistance => "ohm",
            Self::Coordinate => "meter",
            Self::Length => "meter",
            Self::Area => "square_meter",
            Self::Volume => "cubic_meter",
            Self::Index => "dimensionless",
        }
    }

    /// Candidate target units commonly offered for this type. Callers
    /// re-check each against the live unit expression before offering it.
    pub fn candidate_units(&self) -> &'static [&'static str] {
        match self {
            Self::MagneticField => &["tesla", "gauss", "millitesla", "T", "G", "mT"],
            Self::Current => &["ampere", "milliampere", "kiloampere", "A", "mA", "kA"],
            Self::Voltage => &["volt", "millivolt", "kilovolt", "V", "mV", "kV"],
            Self::Temperature => &["celsius", "kelvin", "fahrenheit", "°C", "K", "°F"],
            Self::Pressure => &["pascal", "bar", "atmosphere", "torr", "Pa", "atm"],
            Self::Power => &["watt", "kilowatt", "megawatt", "W", "kW", "MW"],
            Self::Resistance => &["ohm", "milliohm", "kiloohm", "Ω", "mΩ", "kΩ"],
            Self::FlowRate => &["liter/minute", "meter**3/hour", "L/min", "m³/h"],
            Self::RotationSpeed => &["rpm", "hertz", "radian/second", "Hz", "rad/s"],
            Self::Time => &["second", "minute", "hour", "s", "min", "h"],
            Self::Percentage => &["percent", "dimensionless", "%"],
            Self::Coordinate | Self::Length => {
                &["meter", "centimeter", "millimeter", "m", "cm", "mm"]
            }
            Self::Area => &["square_meter", "square_centimeter", "m**2", "cm**2"],
            Self::Volume => &[
                "cubic_meter",
                "liter",
                "cubic_centimeter",
                "m**3",
                "L",
                "cm**3",
            ],
            Self::Index => &["dimensionless"],
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed, unit-bearing descriptor of one data column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub unit: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub description: String,
}

impl Field {
    pub fn new<S: Into<String>, U: Into<String>>(name: S, field_type: FieldType, unit: U) -> Self {
        let mut inst = Self {
            name: name.into(),
            field_type,
            unit: unit.into(),
            symbol: String::new(),
            description: String::new(),
        };
        inst.fill_default_symbol();
        inst
    }

    pub fn with_symbol<S: Into<String>>(mut self, symbol: S) -> Self {
        self.symbol = symbol.into();
        self.fill_default_symbol();
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Replace an empty symbol with the type default. Deserialized fields
    /// pass through here so the symbol invariant holds for them too.
    pub fn fill_default_symbol(&mut self) {
        if self.symbol.is_empty() {
            self.symbol = self.field_type.default_symbol().to_string();
        }
    }

    /// The parsed unit for this field, degrading to dimensionless when the
    /// unit string is not resolvable.
    pub fn unit_expr(&self, reg: &UnitRegistry) -> UnitExpr {
        reg.parse_or_dimensionless(&self.unit)
    }

    /// Convert a value from this field's unit to `target_unit`, returning
    /// the input unchanged on any failure.
    pub fn convert_value(&self, value: f64, target_unit: &str, reg: &UnitRegistry) -> f64 {
        let source = self.unit_expr(reg);
        match reg.parse_expression(target_unit) {
            Ok(target) => source.convert(value, &target).unwrap_or(value),
            Err(_) => value,
        }
    }

    /// Convert a slice of values to `target_unit`; on failure the values
    /// come back unchanged.
    pub fn convert_values(&self, values: &[f64], target_unit: &str, reg: &UnitRegistry) -> Vec<f64> {
        let source = self.unit_expr(reg);
        match reg.parse_expression(target_unit) {
            Ok(target) if source.compatible_with(&target) => values
                .iter()
                .map(|v| source.convert(*v, &target).unwrap_or(*v))
                .collect(),
            _ => values.to_vec(),
        }
    }

    /// Multiply field values by this factor to express them in `target_unit`.
    pub fn conversion_factor(&self, target_unit: &str, reg: &UnitRegistry) -> f64 {
        self.convert_value(1.0, target_unit, reg)
    }

    /// True when `target_unit` parses and has the same dimensionality as
    /// this field's unit. Mere parseability is not enough.
    pub fn is_compatible_unit(&self, target_unit: &str, reg: &UnitRegistry) -> bool {
        let source = self.unit_expr(reg);
        match reg.parse_expression(target_unit) {
            Ok(target) => source.compatible_with(&target),
            Err(_) => false,
        }
    }

    /// The compact unit rendering for labels (`"T"`, `"L/min"`, …).
    pub fn format_unit(&self, reg: &UnitRegistry) -> String {
        self.unit_expr(reg).display().to_string()
    }

    /// Plot label: `"{symbol} [{unit}]"`, or the bare symbol when the unit
    /// is hidden, empty, or dimensionless.
    pub fn get_label(&self, reg: &UnitRegistry, show_unit: bool) -> String {
        if show_unit {
            let unit_str = self.format_unit(reg);
            if !unit_str.is_empty() && unit_str != "dimensionless" {
                return format!("{} [{}]", self.symbol, unit_str);
            }
        }
        self.symbol.clone()
    }
}

fn type_patterns() -> &'static Vec<(Regex, FieldType)> {
    static PATTERNS: OnceLock<Vec<(Regex, FieldType)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)^t$|time|date", FieldType::Time),
            (r"(?i)field|champ|^b\b|^b[z_]", FieldType::MagneticField),
            (r"(?i)^icoil\d+|^idcct\d*|current|courant|référence", FieldType::Current),
            (r"(?i)^ucoil\d+|voltage|tension|^u\d*$", FieldType::Voltage),
            (r"(?i)^tin|^tout|^teb|^tsb|temp", FieldType::Temperature),
            (r"(?i)^hp\d*|^bp\d*|pressure", FieldType::Pressure),
            (r"(?i)flow|debit|débit", FieldType::FlowRate),
            (r"(?i)^p(magnet|tot)|power|puissance", FieldType::Power),
            (r"(?i)rpm", FieldType::RotationSpeed),
            (r"(?i)^dr\d*$|resistance", FieldType::Resistance),
            (r"%", FieldType::Percentage),
            (r"(?i)^i", FieldType::Current),
            (r"(?i)^u", FieldType::Voltage),
        ]
        .iter()
        .map(|(pat, ft)| (Regex::new(pat).unwrap(), *ft))
        .collect()
    })
}

/// Heuristic classification of a raw column name. Falls back to
/// [`FieldType::Index`] when nothing matches.
pub fn guess_field_type(name: &str) -> FieldType {
    for (pattern, field_type) in type_patterns() {
        if pattern.is_match(name) {
            return *field_type;
        }
    }
    FieldType::Index
}

/// The unit assumed for a column whose type was guessed from its name.
pub fn guess_unit(field_type: FieldType) -> &'static str {
    field_type.default_unit()
}

/// Heuristic display symbol from the column name, falling back to the
/// type default.
pub fn guess_symbol(name: &str, field_type: FieldType) -> String {
    let lower = name.to_lowercase();
    if lower.contains("field") || lower.contains("champ") {
        "B".to_string()
    } else if lower.contains("flow") || lower.contains("debit") {
        "Q".to_string()
    } else if lower.contains("rpm") {
        "ω".to_string()
    } else if lower.contains("power") || lower.contains("puissance") {
        "P".to_string()
    } else if lower.contains("resistance") || lower.starts_with("dr") {
        "R".to_string()
    } else if lower.starts_with('i') {
        "I".to_string()
    } else if lower.starts_with('u') {
        "U".to_string()
    } else {
        field_type.default_symbol().to_string()
    }
}

/// Build an auto-detected [`Field`] for a raw column name.
pub fn infer_field(name: &str) -> Field {
    let field_type = guess_field_type(name);
    Field::new(name, field_type, guess_unit(field_type))
        .with_symbol(guess_symbol(name, field_type))
        .with_description(format!("Auto-detected field: {}", name))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn field_type_round_trips_through_serde() {
        for ft in FieldType::ALL {
            let text = serde_json::to_string(&ft).unwrap();
            assert_eq!(text, format!("\"{}\"", ft.as_str()));
            let back: FieldType = serde_json::from_str(&text).unwrap();
            assert_eq!(back, ft);
        }
    }

    #[test]
    fn default_symbol_applies_when_missing() {
        let field = Field::new("Field", FieldType::MagneticField, "tesla");
        assert_eq!(field.symbol, "B");
        let field = Field::new("IH", FieldType::Current, "ampere").with_symbol("I_H");
        assert_eq!(field.symbol, "I_H");
    }

    #[test]
    fn convert_values_tesla_to_gauss() {
        let reg = UnitRegistry::new();
        let field = Field::new("Field", FieldType::MagneticField, "tesla");
        assert_eq!(field.convert_values(&[1.0], "gauss", &reg), vec![10000.0]);
    }

    #[test]
    fn conversion_failure_returns_original_values() {
        let reg = UnitRegistry::new();
        let field = Field::new("Field", FieldType::MagneticField, "tesla");
        // Unparsable target unit
        assert_eq!(
            field.convert_values(&[1.0, 2.5], "florbs", &reg),
            vec![1.0, 2.5]
        );
        // Incompatible target unit
        assert_eq!(field.convert_value(3.0, "second", &reg), 3.0);
    }

    #[test]
    fn compatibility_requires_dimensional_equality() {
        let reg = UnitRegistry::new();
        let field = Field::new("Field", FieldType::MagneticField, "tesla");
        assert!(field.is_compatible_unit("gauss", &reg));
        assert!(field.is_compatible_unit("mT", &reg));
        // "second" parses fine but is not compatible
        assert!(!field.is_compatible_unit("second", &reg));
        assert!(!field.is_compatible_unit("florbs", &reg));
    }

    #[test]
    fn labels_suppress_dimensionless_units() {
        let reg = UnitRegistry::new();
        let field = Field::new("Field", FieldType::MagneticField, "tesla");
        assert_eq!(field.get_label(&reg, true), "B [T]");
        assert_eq!(field.get_label(&reg, false), "B");

        let index = Field::new("row", FieldType::Index, "dimensionless");
        assert_eq!(index.get_label(&reg, true), "idx");
    }

    #[test]
    fn guessing_from_channel_names() {
        assert_eq!(guess_field_type("Field"), FieldType::MagneticField);
        assert_eq!(guess_field_type("Icoil7"), FieldType::Current);
        assert_eq!(guess_field_type("Ucoil12"), FieldType::Voltage);
        assert_eq!(guess_field_type("Flow1"), FieldType::FlowRate);
        assert_eq!(guess_field_type("Rpm2"), FieldType::RotationSpeed);
        assert_eq!(guess_field_type("Tin1"), FieldType::Temperature);
        assert_eq!(guess_field_type("HP1"), FieldType::Pressure);
        assert_eq!(guess_field_type("Pmagnet"), FieldType::Power);
        assert_eq!(guess_field_type("Référence_A1"), FieldType::Current);
        assert_eq!(guess_field_type("whatever"), FieldType::Index);
    }

    #[test]
    fn inferred_field_is_complete() {
        let field = infer_field("Flow1");
        assert_eq!(field.field_type, FieldType::FlowRate);
        assert_eq!(field.unit, "liter/minute");
        assert_eq!(field.symbol, "Q");
        assert!(!field.description.is_empty());
    }
}
