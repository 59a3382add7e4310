use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::Diagram;
use crate::cfg::DependencyGraph;
use crate::types::OrderingViolation;

/// Limits for the sifting pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiftingConfig {
    pub max_passes: usize,
    pub time_budget: Option<Duration>,
}

impl Default for SiftingConfig {
    fn default() -> Self {
        Self {
            max_passes: 16,
            time_budget: None,
        }
    }
}

impl SiftingConfig {
    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiftingStats {
    pub initial_nodes: usize,
    pub final_nodes: usize,
    pub passes: usize,
    pub swaps: usize,
    pub conditions_moved: usize,
    pub budget_exhausted: bool,
}

/// Move `var` through every legal level, scoring each position, and leave it
/// at the best one.
///
/// Positions scoring `None` are out of bounds. The move is committed only
/// when the best score is strictly below the starting score; among equal
/// scores the smallest level wins. Returns whether `var` changed level.
pub(super) fn sift_one<S, F>(
    diagram: &mut Diagram,
    deps: &DependencyGraph,
    var: usize,
    mut score: F,
    swaps: &mut usize,
) -> Result<bool, OrderingViolation>
where
    S: Ord + Copy,
    F: FnMut(&Diagram) -> Option<S>,
{
    let start = diagram.level_of(var);
    let start_score = score(diagram);
    let mut best = start_score.map(|s| (s, start));
    let mut consider = |diagram: &Diagram, level: usize, best: &mut Option<(S, usize)>| {
        if let Some(s) = score(diagram) {
            if best.is_none_or(|b| (s, level) < b) {
                *best = Some((s, level));
            }
        }
    };

    let mut level = start;
    while level > 0 && diagram.can_swap(level - 1, deps) {
        diagram.swap(level - 1, deps)?;
        *swaps += 1;
        level -= 1;
        consider(diagram, level, &mut best);
    }
    while diagram.can_swap(level, deps) {
        diagram.swap(level, deps)?;
        *swaps += 1;
        level += 1;
        if level != start {
            consider(diagram, level, &mut best);
        }
    }

    let target = match (best, start_score) {
        (Some((s, l)), Some(initial)) if s < initial => l,
        (Some((_, l)), None) => l,
        _ => start,
    };
    while level > target {
        diagram.swap(level - 1, deps)?;
        *swaps += 1;
        level -= 1;
    }
    diagram.collect_garbage();
    Ok(target != start)
}

/// Conditions in visiting order: most populated level first, then by level.
pub(super) fn schedule(diagram: &Diagram) -> Vec<usize> {
    let sizes = diagram.level_sizes();
    let mut levels: Vec<usize> = (0..diagram.len()).collect();
    levels.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]).then(a.cmp(&b)));
    levels.into_iter().map(|l| diagram.var_at(l)).collect()
}

/// Rudell-style sifting over legal adjacent swaps. The node count never
/// increases.
pub(super) fn sift(
    diagram: &mut Diagram,
    deps: &DependencyGraph,
    config: &SiftingConfig,
) -> Result<SiftingStats, OrderingViolation> {
    let started = Instant::now();
    let mut stats = SiftingStats {
        initial_nodes: diagram.node_count(),
        ..SiftingStats::default()
    };

    'passes: while stats.passes < config.max_passes {
        let before = diagram.node_count();
        stats.passes += 1;
        for var in schedule(diagram) {
            if config.time_budget.is_some_and(|b| started.elapsed() >= b) {
                stats.budget_exhausted = true;
                break 'passes;
            }
            let nodes = diagram.node_count();
            let moved = sift_one(
                diagram,
                deps,
                var,
                |d| Some(d.node_count()),
                &mut stats.swaps,
            )?;
            if moved {
                stats.conditions_moved += 1;
                debug!(
                    "sifted condition {var} to level {}: {nodes} -> {} nodes",
                    diagram.level_of(var),
                    diagram.node_count()
                );
            }
        }
        if diagram.node_count() >= before {
            break;
        }
    }

    stats.final_nodes = diagram.node_count();
    if stats.budget_exhausted {
        warn!(
            "sifting stopped after {:?} time budget, {} passes",
            config.time_budget.unwrap_or_default(),
            stats.passes
        );
    }
    info!(
        "sifting: {} -> {} nodes in {} passes ({} swaps)",
        stats.initial_nodes, stats.final_nodes, stats.passes, stats.swaps
    );
    Ok(stats)
}
