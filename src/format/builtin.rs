/*!
Compiled default format definitions.

These make the system usable with zero configuration files present: when
the registry cannot find a definition on disk it falls back to the
programmatically generated defaults below. Site deployments are expected
to export these as JSON and extend them.
*/
use serde_json::Value;

use super::FormatDefinition;
use crate::fields::{Field, FieldType};

pub const BUILTIN_FORMAT_NAMES: [&str; 3] = ["pupitre", "pigbrother", "bprofile"];

/// Look up a compiled default by name.
pub fn builtin_format(name: &str) -> Option<FormatDefinition> {
    match name {
        "pupitre" => Some(create_pupitre_format()),
        "pigbrother" => Some(create_pigbrother_format()),
        "bprofile" => Some(create_bprofile_format()),
        _ => None,
    }
}

fn meta(def: &mut FormatDefinition, pairs: &[(&str, &str)]) {
    for (key, value) in pairs {
        def.metadata
            .insert(key.to_string(), Value::String(value.to_string()));
    }
}

/// The pupitre control-system table format: one whitespace-separated text
/// table per run, columns split between the helix (H) and bitter (B)
/// circuits.
pub fn create_pupitre_format() -> FormatDefinition {
    let mut def = FormatDefinition::new("pupitre");
    meta(
        &mut def,
        &[
            ("description", "Pupitre control system data format"),
            ("file_extension", ".txt"),
            ("delimiter", "whitespace"),
            ("header_row", "true"),
        ],
    );
    let fields = [
        Field::new("t", FieldType::Time, "second").with_description("Elapsed time since start"),
        Field::new("Field", FieldType::MagneticField, "tesla")
            .with_description("Magnetic field at magnet center"),
        Field::new("IH", FieldType::Current, "ampere")
            .with_symbol("I_H")
            .with_description("Helix circuit current"),
        Field::new("IB", FieldType::Current, "ampere")
            .with_symbol("I_B")
            .with_description("Bitter circuit current"),
        Field::new("UH", FieldType::Voltage, "volt")
            .with_symbol("U_H")
            .with_description("Helix circuit voltage"),
        Field::new("UB", FieldType::Voltage, "volt")
            .with_symbol("U_B")
            .with_description("Bitter circuit voltage"),
        Field::new("TinH", FieldType::Temperature, "celsius")
            .with_symbol("T_inH")
            .with_description("Helix cooling water inlet temperature"),
        Field::new("ToutH", FieldType::Temperature, "celsius")
            .with_symbol("T_outH")
            .with_description("Helix cooling water outlet temperature"),
        Field::new("TinB", FieldType::Temperature, "celsius")
            .with_symbol("T_inB")
            .with_description("Bitter cooling water inlet temperature"),
        Field::new("ToutB", FieldType::Temperature, "celsius")
            .with_symbol("T_outB")
            .with_description("Bitter cooling water outlet temperature"),
        Field::new("FlowH", FieldType::FlowRate, "liter/minute")
            .with_symbol("Q_H")
            .with_description("Helix cooling water flow"),
        Field::new("FlowB", FieldType::FlowRate, "liter/minute")
            .with_symbol("Q_B")
            .with_description("Bitter cooling water flow"),
        Field::new("RpmH", FieldType::RotationSpeed, "rpm")
            .with_symbol("ω_H")
            .with_description("Helix pump rotation speed"),
        Field::new("RpmB", FieldType::RotationSpeed, "rpm")
            .with_symbol("ω_B")
            .with_description("Bitter pump rotation speed"),
        Field::new("HPH", FieldType::Pressure, "bar")
            .with_symbol("P_inH")
            .with_description("Helix circuit high pressure"),
        Field::new("HPB", FieldType::Pressure, "bar")
            .with_symbol("P_inB")
            .with_description("Bitter circuit high pressure"),
        Field::new("BP", FieldType::Pressure, "bar")
            .with_symbol("P_out")
            .with_description("Common low pressure"),
        Field::new("Pmagnet", FieldType::Power, "megawatt")
            .with_symbol("P_m")
            .with_description("Magnet electrical power"),
        Field::new("Ptot", FieldType::Power, "megawatt")
            .with_symbol("P_t")
            .with_description("Total site electrical power"),
        Field::new("teb", FieldType::Temperature, "celsius")
            .with_symbol("T_eb")
            .with_description("Cold source inlet temperature"),
        Field::new("tsb", FieldType::Temperature, "celsius")
            .with_symbol("T_sb")
            .with_description("Cold source outlet temperature"),
        Field::new("debitbrut", FieldType::FlowRate, "meter**3/hour")
            .with_symbol("Q_raw")
            .with_description("Raw cold source flow"),
    ];
    for field in fields {
        def.add_field(field);
    }
    def
}

/// The pigbrother TDMS acquisition format: named channel groups, keys are
/// `group/channel` composites. Field names here are channel names; lookup
/// falls back to the channel part of a composite key.
pub fn create_pigbrother_format() -> FormatDefinition {
    let mut def = FormatDefinition::new("pigbrother");
    meta(
        &mut def,
        &[
            ("description", "PigBrother TDMS data acquisition format"),
            ("file_extension", ".tdms"),
            ("format_type", "binary"),
            ("structure", "groups/channels"),
        ],
    );
    let fields = [
        Field::new("Courant_GR1", FieldType::Current, "ampere")
            .with_symbol("I_GR1")
            .with_description("Group 1 supply current"),
        Field::new("Courant_GR2", FieldType::Current, "ampere")
            .with_symbol("I_GR2")
            .with_description("Group 2 supply current"),
        Field::new("Référence_A1", FieldType::Current, "ampere")
            .with_symbol("Iref_A1")
            .with_description("Supply A1 current reference"),
        Field::new("Référence_A2", FieldType::Current, "ampere")
            .with_symbol("Iref_A2")
            .with_description("Supply A2 current reference"),
        Field::new("Référence_A3", FieldType::Current, "ampere")
            .with_symbol("Iref_A3")
            .with_description("Supply A3 current reference"),
        Field::new("Référence_A4", FieldType::Current, "ampere")
            .with_symbol("Iref_A4")
            .with_description("Supply A4 current reference"),
        Field::new("Référence_GR1", FieldType::Current, "ampere")
            .with_symbol("Iref_GR1")
            .with_description("Group 1 current reference (A1 + A2)"),
        Field::new("Référence_GR2", FieldType::Current, "ampere")
            .with_symbol("Iref_GR2")
            .with_description("Group 2 current reference (A3 + A4)"),
        Field::new("Tension_GR1", FieldType::Voltage, "volt")
            .with_symbol("U_GR1")
            .with_description("Group 1 supply voltage"),
        Field::new("Tension_GR2", FieldType::Voltage, "volt")
            .with_symbol("U_GR2")
            .with_description("Group 2 supply voltage"),
        Field::new("Champ_magn", FieldType::MagneticField, "tesla")
            .with_description("Magnetic field probe"),
        Field::new("Puissance_GR1", FieldType::Power, "megawatt")
            .with_symbol("P_GR1")
            .with_description("Group 1 electrical power"),
        Field::new("Puissance_GR2", FieldType::Power, "megawatt")
            .with_symbol("P_GR2")
            .with_description("Group 2 electrical power"),
    ];
    for field in fields {
        def.add_field(field);
    }
    def
}

/// The bprofile field-mapping format: axial profile of the magnetic field
/// measured by a moving probe.
pub fn create_bprofile_format() -> FormatDefinition {
    let mut def = FormatDefinition::new("bprofile");
    meta(
        &mut def,
        &[
            ("description", "Magnetic field profile measurement data"),
            ("file_extension", ".txt"),
            ("delimiter", ","),
            ("header_row", "true"),
        ],
    );
    let fields = [
        Field::new("t", FieldType::Time, "second").with_description("Acquisition time"),
        Field::new("Position", FieldType::Coordinate, "millimeter")
            .with_symbol("z")
            .with_description("Probe position along the magnet axis"),
        Field::new("Bz", FieldType::MagneticField, "tesla")
            .with_symbol("B_z")
            .with_description("Axial magnetic field at the probe"),
    ];
    for field in fields {
        def.add_field(field);
    }
    def
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::validate::validate_format_definition;
    use crate::units::UnitRegistry;

    #[test]
    fn all_builtins_resolve() {
        for name in BUILTIN_FORMAT_NAMES {
            let def = builtin_format(name).unwrap();
            assert_eq!(def.format_name, name);
            assert!(!def.is_empty());
        }
        assert!(builtin_format("nope").is_none());
    }

    #[test]
    fn builtins_pass_validation() {
        let reg = UnitRegistry::new();
        for name in BUILTIN_FORMAT_NAMES {
            let def = builtin_format(name).unwrap();
            let report = validate_format_definition(&def, &reg);
            assert!(
                report.valid,
                "builtin '{}' has issues: {:?}",
                name, report.issues
            );
        }
    }

    #[test]
    fn pupitre_units_convert() {
        let reg = UnitRegistry::new();
        let def = create_pupitre_format();
        let field = def.get_field("Field").unwrap();
        assert_eq!(field.convert_value(1.0, "gauss", &reg), 10000.0);
    }
}
