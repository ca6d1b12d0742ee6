//! Invariant reports and the policy that decides whether they are fatal

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Outcome of checking a per-cell invariant over a set of rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantReport {
    /// What was checked, e.g. `frac_poulter_9pft_2015`
    pub subject: String,
    /// Cells that took part in the check (unmasked cells)
    pub checked_cells: usize,
    /// Cells deviating beyond the tolerance
    pub violating_cells: usize,
    /// Largest absolute deviation observed
    pub worst_deviation: f64,
    /// Area-weighted means whose total weight was zero
    pub zero_weight_cells: usize,
    /// Tolerance the check ran with
    pub tolerance: f64,
    /// Free-form findings that are not per-cell deviations
    pub notes: Vec<String>,
}

impl InvariantReport {
    pub fn new(subject: impl Into<String>, tolerance: f64) -> Self {
        Self {
            subject: subject.into(),
            checked_cells: 0,
            violating_cells: 0,
            worst_deviation: 0.0,
            zero_weight_cells: 0,
            tolerance,
            notes: Vec::new(),
        }
    }

    /// Record one checked cell and its deviation from the expected value.
    pub fn observe(&mut self, deviation: f64) {
        self.checked_cells += 1;
        let d = deviation.abs();
        if d > self.tolerance || d.is_nan() {
            self.violating_cells += 1;
        }
        if d > self.worst_deviation {
            self.worst_deviation = d;
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Fraction of checked cells that violate the invariant
    pub fn violating_fraction(&self) -> f64 {
        if self.checked_cells == 0 {
            return 0.0;
        }
        self.violating_cells as f64 / self.checked_cells as f64
    }

    pub fn is_clean(&self) -> bool {
        self.violating_cells == 0 && self.notes.is_empty()
    }
}

impl fmt::Display for InvariantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} cells ({:.3}%) deviate by up to {:.6} (tolerance {})",
            self.subject,
            self.violating_cells,
            self.checked_cells,
            100.0 * self.violating_fraction(),
            self.worst_deviation,
            self.tolerance
        )?;
        if self.zero_weight_cells > 0 {
            write!(f, "; {} zero-weight cells", self.zero_weight_cells)?;
        }
        for note in &self.notes {
            write!(f, "; {}", note)?;
        }
        Ok(())
    }
}

/// How invariant checks are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvariantPolicy {
    /// Allowed absolute deviation per cell
    pub tolerance: f64,
    /// Fail the compute call on any violation; otherwise report and continue
    pub hard_fail: bool,
}

impl Default for InvariantPolicy {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            hard_fail: true,
        }
    }
}

impl InvariantPolicy {
    pub fn report(&self, subject: impl Into<String>) -> InvariantReport {
        InvariantReport::new(subject, self.tolerance)
    }

    /// Turn a report into an error when the policy demands it.
    pub fn enforce(&self, report: InvariantReport) -> Result<InvariantReport> {
        if self.hard_fail && !report.is_clean() {
            return Err(Error::InvariantViolation(report));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_counts_violations() {
        let mut report = InvariantReport::new("frac", 1e-3);
        report.observe(0.0);
        report.observe(0.0005);
        report.observe(-0.2);
        assert_eq!(report.checked_cells, 3);
        assert_eq!(report.violating_cells, 1);
        assert!((report.worst_deviation - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_enforce_hard_fail() {
        let policy = InvariantPolicy::default();
        let mut report = policy.report("frac");
        report.observe(0.5);
        assert!(matches!(
            policy.enforce(report.clone()),
            Err(Error::InvariantViolation(_))
        ));

        let lenient = InvariantPolicy {
            hard_fail: false,
            ..policy
        };
        assert!(lenient.enforce(report).is_ok());
    }

    #[test]
    fn test_display_names_fraction_and_deviation() {
        let mut report = InvariantReport::new("frac_raw_2015", 1e-3);
        report.observe(0.0);
        report.observe(0.25);
        let s = report.to_string();
        assert!(s.contains("1 of 2 cells"));
        assert!(s.contains("50.000%"));
        assert!(s.contains("0.250000"));
    }
}
