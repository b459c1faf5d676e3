use std::fmt;

/// A field-labeled record of every invariant a state graph violates.
///
/// Validation never stops at the first failure; each sub-state appends all of
/// its violations so the caller sees the complete picture in one error.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    violations: Vec<(String, String)>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.violations.push((field.to_string(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[(String, String)] {
        &self.violations
    }

    /// Check a start/stop range list pair: equal lengths and start <= stop elementwise
    pub fn check_range_lists(&mut self, field: &str, start: &[f64], stop: &[f64]) {
        if start.len() != stop.len() {
            self.add(
                field,
                format!(
                    "start and stop lists have mismatched lengths ({} vs {})",
                    start.len(),
                    stop.len()
                ),
            );
            return;
        }
        for (idx, (lo, hi)) in start.iter().zip(stop.iter()).enumerate() {
            if lo > hi {
                self.add(
                    field,
                    format!("range {idx} has start {lo} greater than stop {hi}"),
                );
            }
        }
    }

    /// Check an optional bound pair: both set or both unset, and min <= max when set
    pub fn check_bound_pair(&mut self, field: &str, min: Option<f64>, max: Option<f64>) {
        match (min, max) {
            (Some(lo), Some(hi)) => {
                if lo > hi {
                    self.add(field, format!("min {lo} is greater than max {hi}"));
                }
            }
            (None, None) => (),
            _ => self.add(field, "min and max must be set together"),
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for (field, message) in &self.violations {
            write!(f, "; {field}: {message}")?;
        }
        Ok(())
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_aggregates_all_violations() {
        let mut report = ValidationReport::new();
        report.check_range_lists("mask.bin", &[1.0, 5.0], &[2.0]);
        report.check_bound_pair("q", Some(1.0), None);
        report.check_bound_pair("wavelength", Some(10.0), Some(2.0));
        assert_eq!(report.len(), 3);
        let text = report.to_string();
        assert!(text.contains("mask.bin"));
        assert!(text.contains("wavelength"));
    }
}
