use super::deps::DependencyGraph;
use crate::types::OrderingViolation;

/// A total order over conditions: `order[level]` is the condition tested at
/// that level. Always a linear extension of the dependency relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOrder {
    order: Vec<usize>,
    levels: Vec<usize>,
}

impl ConditionOrder {
    /// Validate `order` against `deps`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderingViolation::NotAPermutation`] if `order` does not list
    /// every condition exactly once, or [`OrderingViolation::DependencyEdge`]
    /// if a condition precedes one it depends on.
    pub fn new(order: Vec<usize>, deps: &DependencyGraph) -> Result<Self, OrderingViolation> {
        let levels = levels_of(&order, deps.len()).ok_or(OrderingViolation::NotAPermutation {
            expected: deps.len(),
        })?;
        for &condition in &order {
            for &dependency in deps.dependencies(condition) {
                if levels[dependency] >= levels[condition] {
                    return Err(OrderingViolation::DependencyEdge {
                        condition,
                        dependency,
                    });
                }
            }
        }
        Ok(Self { order, levels })
    }

    /// Wrap an order already known to be a valid linear extension.
    pub(crate) fn from_linear_extension(order: Vec<usize>) -> Self {
        let mut levels = vec![0; order.len()];
        for (level, &condition) in order.iter().enumerate() {
            levels[condition] = level;
        }
        Self { order, levels }
    }

    /// Conditions by level.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    #[must_use]
    pub fn level_of(&self, condition: usize) -> usize {
        self.levels[condition]
    }

    #[must_use]
    pub fn condition_at(&self, level: usize) -> usize {
        self.order[level]
    }

    /// Levels indexed by condition.
    pub(crate) fn levels(&self) -> &[usize] {
        &self.levels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Inverse of `order` if it is a permutation of `0..n`.
pub(crate) fn levels_of(order: &[usize], n: usize) -> Option<Vec<usize>> {
    if order.len() != n {
        return None;
    }
    let mut levels = vec![usize::MAX; n];
    for (level, &condition) in order.iter().enumerate() {
        let slot = levels.get_mut(condition)?;
        if *slot != usize::MAX {
            return None;
        }
        *slot = level;
    }
    Some(levels)
}
