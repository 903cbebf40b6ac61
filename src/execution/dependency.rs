use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::analysis::components::UnionFind;
use crate::model::test_case::{TestCaseId, TestSuite};

#[derive(Debug, Clone, Serialize)]
pub struct DependencyNode {
    pub dependencies: Vec<TestCaseId>,
    pub dependency_count: usize,

    /// Depends on nothing
    pub is_leaf: bool,

    /// Nothing depends on it
    pub is_root: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencySummary {
    pub total_test_cases: usize,
    pub test_cases_with_dependencies: usize,
    pub total_dependencies: usize,
    pub circular_dependency_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyAnalysis {
    /// Suite order, kept for deterministic tie-breaks
    pub order: Vec<TestCaseId>,
    pub dependencies: BTreeMap<TestCaseId, Vec<TestCaseId>>,
    pub dependents: BTreeMap<TestCaseId, Vec<TestCaseId>>,

    /// Each cycle starts and ends on the same id
    pub cycles: Vec<Vec<TestCaseId>>,
    pub graph: BTreeMap<TestCaseId, DependencyNode>,
    pub summary: DependencySummary,
}

impl DependencyAnalysis {
    pub fn dependencies_of(&self, id: TestCaseId) -> &[TestCaseId] {
        self.dependencies.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Kahn's algorithm, prerequisites first, ties in suite order. Cycle
    /// members are appended in suite order.
    pub fn execution_order(&self) -> Vec<TestCaseId> {
        let position: HashMap<TestCaseId, usize> =
            self.order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut in_degree: HashMap<TestCaseId, usize> = self
            .order
            .iter()
            .map(|&id| (id, self.dependencies_of(id).len()))
            .collect();

        let mut ready: Vec<TestCaseId> = self
            .order
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(self.order.len());

        while !ready.is_empty() {
            ready.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            let node = ready.remove(0);
            result.push(node);

            for &dependent in self.dependents.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }

        for &id in &self.order {
            if !result.contains(&id) {
                result.push(id);
            }
        }
        result
    }

    /// Weakly connected components of the dependency graph.
    pub fn independent_groups(&self) -> Vec<Vec<TestCaseId>> {
        let index: HashMap<TestCaseId, usize> =
            self.order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut uf = UnionFind::new(self.order.len());

        for (id, deps) in &self.dependencies {
            for dep in deps {
                if let (Some(&a), Some(&b)) = (index.get(id), index.get(dep)) {
                    uf.union(a, b);
                }
            }
        }

        uf.components()
            .into_iter()
            .map(|component| component.into_iter().map(|i| self.order[i]).collect())
            .collect()
    }

    /// Longest prerequisite chain below each id; cycle members count as 0.
    pub fn levels(&self) -> BTreeMap<TestCaseId, usize> {
        let mut levels = BTreeMap::new();
        for id in self.execution_order() {
            let level = self
                .dependencies_of(id)
                .iter()
                .filter_map(|dep| levels.get(dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            levels.insert(id, level);
        }
        levels
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    pub fn analyze(&self, suite: &TestSuite) -> DependencyAnalysis {
        let mut dependencies: BTreeMap<TestCaseId, Vec<TestCaseId>> = BTreeMap::new();
        let mut dependents: BTreeMap<TestCaseId, Vec<TestCaseId>> = BTreeMap::new();

        for tc in suite.iter() {
            let deps: Vec<TestCaseId> = tc
                .prerequisite_case
                .filter(|p| *p != tc.id && suite.contains(*p))
                .into_iter()
                .collect();
            for &dep in &deps {
                dependents.entry(dep).or_default().push(tc.id);
            }
            dependencies.insert(tc.id, deps);
        }

        let cycles = find_cycles(suite.ids(), &dependencies);
        if !cycles.is_empty() {
            tracing::warn!(cycles = cycles.len(), "circular test case dependencies");
        }

        let graph = suite
            .ids()
            .iter()
            .map(|&id| {
                let deps = dependencies.get(&id).cloned().unwrap_or_default();
                let node = DependencyNode {
                    dependency_count: deps.len(),
                    is_leaf: deps.is_empty(),
                    is_root: !dependents.contains_key(&id),
                    dependencies: deps,
                };
                (id, node)
            })
            .collect();

        let summary = DependencySummary {
            total_test_cases: suite.len(),
            test_cases_with_dependencies: dependencies.values().filter(|d| !d.is_empty()).count(),
            total_dependencies: dependencies.values().map(Vec::len).sum(),
            circular_dependency_count: cycles.len(),
        };

        DependencyAnalysis {
            order: suite.ids().to_vec(),
            dependencies,
            dependents,
            cycles,
            graph,
            summary,
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Iterative three-colour DFS. A grey successor closes a cycle.
fn find_cycles(
    order: &[TestCaseId],
    dependencies: &BTreeMap<TestCaseId, Vec<TestCaseId>>,
) -> Vec<Vec<TestCaseId>> {
    let mut colour: HashMap<TestCaseId, Colour> = order.iter().map(|&id| (id, Colour::White)).collect();
    let mut cycles = Vec::new();

    for &start in order {
        if colour.get(&start) != Some(&Colour::White) {
            continue;
        }

        // (node, index of the next successor to visit)
        let mut stack: Vec<(TestCaseId, usize)> = vec![(start, 0)];
        let mut path: Vec<TestCaseId> = vec![start];
        colour.insert(start, Colour::Grey);

        while let Some((node, next)) = stack.last().copied() {
            let successors = dependencies.get(&node).map(Vec::as_slice).unwrap_or(&[]);
            if next < successors.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let succ = successors[next];
                match colour.get(&succ).copied().unwrap_or(Colour::Black) {
                    Colour::White => {
                        colour.insert(succ, Colour::Grey);
                        stack.push((succ, 0));
                        path.push(succ);
                    }
                    Colour::Grey => {
                        if let Some(start_at) = path.iter().position(|&p| p == succ) {
                            let mut cycle = path[start_at..].to_vec();
                            cycle.push(succ);
                            cycles.push(cycle);
                        }
                    }
                    Colour::Black => {}
                }
            } else {
                colour.insert(node, Colour::Black);
                stack.pop();
                path.pop();
            }
        }
    }
    cycles
}
