use std::fmt;
use std::time::Duration;

use super::resolution::Resolution;

/// Detailed evaluation report returned by
/// [`RuleSet::evaluate_detailed()`](super::ruleset::RuleSet::evaluate_detailed)
/// and [`Bdd::evaluate_detailed()`](crate::Bdd::evaluate_detailed).
///
/// Contains the resolution, every condition tested with its outcome in
/// evaluation order, and the wall-clock duration of the evaluation.
#[derive(Debug, Clone)]
#[must_use]
pub struct EvaluationReport {
    resolution: Resolution,
    path: Vec<(String, bool)>,
    duration: Duration,
}

impl EvaluationReport {
    pub(crate) fn new(resolution: Resolution, path: Vec<(String, bool)>, duration: Duration) -> Self {
        Self {
            resolution,
            path,
            duration,
        }
    }

    /// The evaluation result, same as the plain `evaluate` call.
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Conditions tested, in order, with their truth value.
    #[must_use]
    pub fn path(&self) -> &[(String, bool)] {
        &self.path
    }

    /// Number of conditions evaluated.
    #[must_use]
    pub fn conditions_evaluated(&self) -> usize {
        self.path.len()
    }

    /// Wall-clock duration of the evaluation.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resolution: {}", self.resolution)?;
        let tested: Vec<String> = self
            .path
            .iter()
            .map(|(cond, outcome)| format!("{cond} = {outcome}"))
            .collect();
        write!(f, ", tested: [{}]", tested.join(", "))?;
        write!(f, ", duration: {:?}", self.duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_accessors() {
        let report = EvaluationReport::new(
            Resolution::Error("bad".into()),
            vec![("isSet(Region)".into(), false)],
            Duration::from_nanos(500),
        );

        assert_eq!(report.resolution(), &Resolution::Error("bad".into()));
        assert_eq!(report.path(), &[("isSet(Region)".to_owned(), false)]);
        assert_eq!(report.conditions_evaluated(), 1);
        assert_eq!(report.duration(), Duration::from_nanos(500));
    }

    #[test]
    fn report_display() {
        let report = EvaluationReport::new(
            Resolution::NoMatch,
            vec![("isSet(Region)".into(), true), ("UseFIPS".into(), false)],
            Duration::from_nanos(100),
        );
        let s = report.to_string();
        assert!(s.contains("resolution: no match"));
        assert!(s.contains("tested: [isSet(Region) = true, UseFIPS = false]"));
    }
}
