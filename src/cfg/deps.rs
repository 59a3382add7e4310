use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::types::{Condition, StructuralError};

/// Which conditions read variables bound by which other conditions.
///
/// Condition A depends on condition B when A references the name B assigns.
/// Every condition order must place B before A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub(crate) fn new(conditions: &[Condition]) -> Result<Self, StructuralError> {
        let mut binders: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, cond) in conditions.iter().enumerate() {
            if let Some(name) = cond.binding() {
                binders.entry(name).or_default().push(i);
            }
        }

        let mut dependencies = vec![Vec::new(); conditions.len()];
        let mut dependents = vec![Vec::new(); conditions.len()];
        for (i, cond) in conditions.iter().enumerate() {
            let references =
                cond.expr
                    .references()
                    .map_err(|e| StructuralError::InvalidTemplate {
                        location: format!("conditions[{i}]"),
                        template: cond.to_string(),
                        reason: e.to_string(),
                    })?;
            for name in references {
                if let Some(bound_by) = binders.get(name.as_str()) {
                    for &b in bound_by {
                        dependencies[i].push(b);
                        dependents[b].push(i);
                    }
                }
            }
        }
        for list in dependencies.iter_mut().chain(dependents.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        let graph = Self {
            dependencies,
            dependents,
        };
        if graph.kahn_order(&[]).len() != conditions.len() {
            return Err(StructuralError::BindingCycle {
                path: graph
                    .find_cycle()
                    .into_iter()
                    .map(|i| conditions[i].to_string())
                    .collect(),
            });
        }
        Ok(graph)
    }

    /// Number of conditions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Whether `a` directly depends on `b`.
    #[must_use]
    pub fn depends_on(&self, a: usize, b: usize) -> bool {
        self.dependencies
            .get(a)
            .is_some_and(|deps| deps.binary_search(&b).is_ok())
    }

    /// Direct dependencies of `condition`, ascending.
    #[must_use]
    pub fn dependencies(&self, condition: usize) -> &[usize] {
        self.dependencies
            .get(condition)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether `order` is a permutation of all conditions that places every
    /// dependency before its dependents.
    #[must_use]
    pub fn is_linear_extension(&self, order: &[usize]) -> bool {
        let Some(levels) = super::order::levels_of(order, self.len()) else {
            return false;
        };
        self.dependencies
            .iter()
            .enumerate()
            .all(|(a, deps)| deps.iter().all(|&b| levels[b] < levels[a]))
    }

    /// Stable topological sort: among the conditions whose dependencies are
    /// placed, the one with the smallest `rank` goes next.
    pub(crate) fn topological_order(&self, rank: &[usize]) -> Vec<usize> {
        self.kahn_order(rank)
    }

    /// Kahn's algorithm. An empty `rank` means index order. Returns fewer
    /// than `len()` conditions if the graph has a cycle.
    fn kahn_order(&self, rank: &[usize]) -> Vec<usize> {
        let key = |i: usize| rank.get(i).copied().unwrap_or(i);
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| Reverse((key(i), i)))
            .collect();

        let mut sorted = Vec::with_capacity(self.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            for &dependent in &self.dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse((key(dependent), dependent)));
                }
            }
            sorted.push(i);
        }
        sorted
    }

    /// DFS-based cycle finder for error reporting. The returned path repeats
    /// its first condition at the end.
    fn find_cycle(&self) -> Vec<usize> {
        let mut state = vec![DfsState::Unvisited; self.len()];
        let mut stack = Vec::new();
        for start in 0..self.len() {
            if state[start] == DfsState::Unvisited {
                if let Some(cycle) = self.dfs(start, &mut state, &mut stack) {
                    return cycle;
                }
            }
        }
        // Unreachable when called after Kahn's algorithm found a cycle.
        Vec::new()
    }

    fn dfs(
        &self,
        node: usize,
        state: &mut [DfsState],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state[node] = DfsState::InStack;
        stack.push(node);

        for &next in &self.dependencies[node] {
            match state[next] {
                DfsState::InStack => {
                    let pos = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle = stack[pos..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                DfsState::Unvisited => {
                    if let Some(cycle) = self.dfs(next, state, stack) {
                        return Some(cycle);
                    }
                }
                DfsState::Done => {}
            }
        }

        stack.pop();
        state[node] = DfsState::Done;
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DfsState {
    Unvisited,
    InStack,
    Done,
}
