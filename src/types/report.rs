use std::fmt;

/// A stage of the compilation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Raw,
    Sifting,
    Cost,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Raw => write!(f, "raw"),
            Stage::Sifting => write!(f, "sifting"),
            Stage::Cost => write!(f, "cost"),
        }
    }
}

/// A non-fatal condition recorded in the compile report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A pass ran out of rounds or wall-clock time; its best diagram so far
    /// was kept.
    ResourceBudgetExceeded { stage: Stage, detail: String },
    /// A pass's output was discarded and the previous stage's diagram kept.
    StageRejected { stage: Stage, reason: String },
    /// A test case disagreed with the rule tree itself and does not gate
    /// any stage.
    TestExcluded { test: String, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ResourceBudgetExceeded { stage, detail } => {
                write!(f, "{stage} pass exceeded its budget: {detail}")
            }
            Warning::StageRejected { stage, reason } => {
                write!(f, "{stage} output rejected: {reason}")
            }
            Warning::TestExcluded { test, reason } => {
                write!(f, "test '{test}' excluded: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_messages() {
        let w = Warning::StageRejected {
            stage: Stage::Cost,
            reason: "test 't1' failed".into(),
        };
        assert_eq!(w.to_string(), "cost output rejected: test 't1' failed");

        let w = Warning::ResourceBudgetExceeded {
            stage: Stage::Sifting,
            detail: "time budget of 5ms".into(),
        };
        assert_eq!(
            w.to_string(),
            "sifting pass exceeded its budget: time budget of 5ms"
        );
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Raw < Stage::Sifting);
        assert!(Stage::Sifting < Stage::Cost);
    }
}
