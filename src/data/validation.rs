use indexmap::IndexMap;
use serde::Serialize;

/// How well one data key lines up with its schema and how clean its
/// values are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// A definition exists and every value is usable
    Valid,
    /// A definition exists and fewer than half the values failed
    MostlyValid,
    /// A definition exists but at least half the values failed
    Invalid,
    /// No field definition covers this key
    NoFieldDefinition,
}

/// Per-key validation outcome.
#[derive(Debug, Clone, Serialize)]
pub struct FieldValidation {
    pub status: FieldStatus,
    pub total_values: usize,
    pub failed_values: usize,
}

/// Aggregate statistics across every key of a data set.
///
/// `coverage_percent` is the share of keys with a field definition;
/// `quality_percent` is the share of keys that are valid or mostly valid.
/// Both use all keys as the denominator, so an unbound key drags both
/// down.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationStats {
    pub total_keys: usize,
    pub keys_with_definition: usize,
    pub valid: usize,
    pub mostly_valid: usize,
    pub invalid: usize,
    pub no_field_definition: usize,
    pub coverage_percent: f64,
    pub quality_percent: f64,
}

/// The full validation report: one entry per key plus the aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub field_results: IndexMap<String, FieldValidation>,
    pub summary: ValidationStats,
}

/// Round to one decimal, so 2 of 3 reads as 66.7 rather than a long
/// fraction.
pub(crate) fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Classify a bound key from its failure count. Empty columns have
/// nothing wrong with them and count as valid.
pub(crate) fn classify(total: usize, failed: usize) -> FieldStatus {
    if failed == 0 {
        FieldStatus::Valid
    } else if failed * 2 >= total {
        FieldStatus::Invalid
    } else {
        FieldStatus::MostlyValid
    }
}

pub(crate) fn summarize(field_results: IndexMap<String, FieldValidation>) -> ValidationSummary {
    let total_keys = field_results.len();
    let mut valid = 0;
    let mut mostly_valid = 0;
    let mut invalid = 0;
    let mut no_field_definition = 0;
    for result in field_results.values() {
        match result.status {
            FieldStatus::Valid => valid += 1,
            FieldStatus::MostlyValid => mostly_valid += 1,
            FieldStatus::Invalid => invalid += 1,
            FieldStatus::NoFieldDefinition => no_field_definition += 1,
        }
    }
    let keys_with_definition = total_keys - no_field_definition;
    let (coverage_percent, quality_percent) = if total_keys == 0 {
        (100.0, 100.0)
    } else {
        (
            round1(keys_with_definition as f64 / total_keys as f64 * 100.0),
            round1((valid + mostly_valid) as f64 / total_keys as f64 * 100.0),
        )
    };
    ValidationSummary {
        field_results,
        summary: ValidationStats {
            total_keys,
            keys_with_definition,
            valid,
            mostly_valid,
            invalid,
            no_field_definition,
            coverage_percent,
            quality_percent,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(0, 0), FieldStatus::Valid);
        assert_eq!(classify(100, 0), FieldStatus::Valid);
        assert_eq!(classify(100, 49), FieldStatus::MostlyValid);
        // Exactly half failed tips over to invalid
        assert_eq!(classify(100, 50), FieldStatus::Invalid);
        assert_eq!(classify(3, 2), FieldStatus::Invalid);
    }

    #[test]
    fn two_of_three_rounds_to_66_7() {
        let mut results = IndexMap::new();
        for key in ["Field", "Current"] {
            results.insert(
                key.to_string(),
                FieldValidation {
                    status: FieldStatus::Valid,
                    total_values: 10,
                    failed_values: 0,
                },
            );
        }
        results.insert(
            "Extra".to_string(),
            FieldValidation {
                status: FieldStatus::NoFieldDefinition,
                total_values: 10,
                failed_values: 0,
            },
        );
        let summary = summarize(results).summary;
        assert_eq!(summary.total_keys, 3);
        assert_eq!(summary.keys_with_definition, 2);
        assert_eq!(summary.coverage_percent, 66.7);
        assert_eq!(summary.quality_percent, 66.7);
    }

    #[test]
    fn empty_data_is_fully_covered() {
        let summary = summarize(IndexMap::new()).summary;
        assert_eq!(summary.coverage_percent, 100.0);
        assert_eq!(summary.quality_percent, 100.0);
    }
}
