//! Matrix expansion for job fan-out.

use gantry_core::workflow::MatrixConfig;
use std::collections::BTreeMap;

/// One concrete assignment of matrix axis values.
pub type MatrixCombination = BTreeMap<String, String>;

/// Expand a matrix into the cross-product of its axis values.
///
/// An absent matrix yields exactly one empty combination. Axes are
/// iterated in sorted name order, so expansion order is deterministic.
pub fn expand(matrix: Option<&MatrixConfig>) -> Vec<MatrixCombination> {
    let Some(matrix) = matrix else {
        return vec![BTreeMap::new()];
    };

    let mut combinations = vec![BTreeMap::new()];
    for (axis, values) in &matrix.axes {
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for combination in &combinations {
            for value in values {
                let mut expanded = combination.clone();
                expanded.insert(axis.clone(), value.clone());
                next.push(expanded);
            }
        }
        combinations = next;
    }
    combinations
}

/// Short combination key, e.g. `os=linux` or `os=linux, rust=stable`.
pub fn matrix_key(combination: &MatrixCombination) -> Option<String> {
    if combination.is_empty() {
        return None;
    }
    Some(
        combination
            .iter()
            .map(|(axis, value)| format!("{}={}", axis, value))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Display name for an instance, e.g. `test (os=linux)`.
pub fn display_name(job_name: &str, combination: &MatrixCombination) -> String {
    match matrix_key(combination) {
        Some(key) => format!("{} ({})", job_name, key),
        None => job_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(axes: &[(&str, &[&str])]) -> MatrixConfig {
        MatrixConfig {
            axes: axes
                .iter()
                .map(|(name, values)| {
                    (
                        name.to_string(),
                        values.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_no_matrix_yields_one_combination() {
        let combinations = expand(None);
        assert_eq!(combinations.len(), 1);
        assert!(combinations[0].is_empty());
    }

    #[test]
    fn test_single_axis() {
        let matrix = matrix(&[("os", &["linux", "windows", "macos"])]);
        let combinations = expand(Some(&matrix));
        assert_eq!(combinations.len(), 3);
        assert_eq!(combinations[0]["os"], "linux");
        assert_eq!(combinations[2]["os"], "macos");
    }

    #[test]
    fn test_cross_product() {
        let matrix = matrix(&[("os", &["linux", "macos"]), ("rust", &["stable", "nightly"])]);
        let combinations = expand(Some(&matrix));
        assert_eq!(combinations.len(), 4);
        // Every (os, rust) pair appears exactly once.
        let keys: Vec<String> = combinations.iter().filter_map(matrix_key).collect();
        assert!(keys.contains(&"os=linux, rust=stable".to_string()));
        assert!(keys.contains(&"os=macos, rust=nightly".to_string()));
    }

    #[test]
    fn test_display_name() {
        let matrix = matrix(&[("os", &["linux"])]);
        let combinations = expand(Some(&matrix));
        assert_eq!(display_name("test", &combinations[0]), "test (os=linux)");
        assert_eq!(display_name("fmt", &BTreeMap::new()), "fmt");
    }
}
