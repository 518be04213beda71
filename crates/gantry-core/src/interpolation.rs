//! Matrix value substitution.

use regex::Regex;
use std::collections::BTreeMap;

/// Context for substituting matrix values into step parameters and
/// platform tags.
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    /// Matrix values for the current job instance.
    pub matrix: BTreeMap<String, String>,
}

impl InterpolationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matrix(matrix: BTreeMap<String, String>) -> Self {
        Self { matrix }
    }

    /// Replace every `${{ matrix.key }}` occurrence in `input`.
    ///
    /// Unknown expressions resolve to the empty string.
    pub fn interpolate(&self, input: &str) -> String {
        // Simple regex for ${{ ... }}; nesting not supported.
        let re = Regex::new(r"\$\{\{\s*([^}]+)\s*\}\}").unwrap();

        re.replace_all(input, |caps: &regex::Captures| {
            let expr = caps.get(1).map_or("", |m| m.as_str()).trim();
            self.resolve(expr)
        })
        .to_string()
    }

    fn resolve(&self, expr: &str) -> String {
        if let Some(key) = expr.strip_prefix("matrix.") {
            return self.matrix.get(key).cloned().unwrap_or_default();
        }
        String::new()
    }
}
