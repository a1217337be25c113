//! Dependency resolution
//!
//! Iterative depth-first traversal with an explicit work stack of
//! (node, remaining-dependencies) frames. Unseen dependencies are pushed;
//! a dependency already on the stack marks the stack slice from its
//! position to the top as one cycle and is not re-pushed; an emptied
//! frame pops and appends its node to the emission order. Nodes outside
//! the graph (imported or excluded) are treated as always satisfied.
//!
//! The same routine orders whole modules by inter-module import for
//! diagnostics.

use std::collections::BTreeSet;

/// Emission order plus detected cycles
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Every node, dependencies first
    pub order: Vec<usize>,
    /// Each cycle as the stack slice that closed it
    pub cycles: Vec<Vec<usize>>,
}

impl Resolution {
    /// Nodes requiring a forward declaration
    pub fn cycle_members(&self) -> BTreeSet<usize> {
        self.cycles.iter().flatten().copied().collect()
    }
}

/// Resolve emission order over `node_count` nodes. `deps(n)` returns the
/// outgoing references of node `n`; ids outside `0..node_count` are
/// ignored as always satisfied.
pub fn resolve<F>(node_count: usize, deps: F) -> Resolution
where
    F: Fn(usize) -> Vec<usize>,
{
    let mut order = Vec::with_capacity(node_count);
    let mut emitted = vec![false; node_count];
    let mut visited = vec![false; node_count];
    let mut stack_pos: Vec<Option<usize>> = vec![None; node_count];
    let mut cycles: Vec<Vec<usize>> = Vec::new();
    let mut seen_cycles: BTreeSet<Vec<usize>> = BTreeSet::new();

    // (node, dependency list, next dependency index)
    let mut stack: Vec<(usize, Vec<usize>, usize)> = Vec::new();

    for root in 0..node_count {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        stack_pos[root] = Some(0);
        stack.push((root, deps(root), 0));

        while !stack.is_empty() {
            let top = stack.len() - 1;
            let next_dep = {
                let frame = &mut stack[top];
                if frame.2 < frame.1.len() {
                    let dep = frame.1[frame.2];
                    frame.2 += 1;
                    Some(dep)
                } else {
                    None
                }
            };

            match next_dep {
                Some(dep) if dep >= node_count => {}
                Some(dep) => {
                    if let Some(pos) = stack_pos[dep] {
                        let cycle: Vec<usize> = stack[pos..].iter().map(|f| f.0).collect();
                        let mut key = cycle.clone();
                        key.sort_unstable();
                        if seen_cycles.insert(key) {
                            cycles.push(cycle);
                        }
                    } else if !visited[dep] {
                        visited[dep] = true;
                        stack_pos[dep] = Some(stack.len());
                        stack.push((dep, deps(dep), 0));
                    }
                }
                None => {
                    let (node, _, _) = stack.pop().expect("non-empty stack");
                    stack_pos[node] = None;
                    if !emitted[node] {
                        emitted[node] = true;
                        order.push(node);
                    }
                }
            }
        }
    }

    Resolution { order, cycles }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps_of(edges: &[(usize, usize)]) -> impl Fn(usize) -> Vec<usize> + '_ {
        move |n| {
            edges
                .iter()
                .filter(|(from, _)| *from == n)
                .map(|(_, to)| *to)
                .collect()
        }
    }

    #[test]
    fn test_dependency_before_dependent() {
        // A(0) depends on B(1); B first
        let resolution = resolve(2, deps_of(&[(0, 1)]));
        assert_eq!(resolution.order, vec![1, 0]);
        assert!(resolution.cycles.is_empty());
    }

    #[test]
    fn test_two_node_cycle() {
        let resolution = resolve(2, deps_of(&[(0, 1), (1, 0)]));
        assert_eq!(resolution.order.len(), 2);
        assert_eq!(resolution.cycles.len(), 1);
        let members = resolution.cycle_members();
        assert!(members.contains(&0) && members.contains(&1));
    }

    #[test]
    fn test_diamond_emits_once() {
        // 0 -> 1 -> 3, 0 -> 2 -> 3
        let resolution = resolve(4, deps_of(&[(0, 1), (0, 2), (1, 3), (2, 3)]));
        assert_eq!(resolution.order.len(), 4);
        assert_eq!(resolution.order[0], 3);
        assert_eq!(*resolution.order.last().unwrap(), 0);
        assert!(resolution.cycles.is_empty());
    }

    #[test]
    fn test_excluded_dependency_is_satisfied() {
        // dependency id beyond node_count stands for an imported symbol
        let resolution = resolve(1, |_| vec![7]);
        assert_eq!(resolution.order, vec![0]);
        assert!(resolution.cycles.is_empty());
    }

    #[test]
    fn test_independent_nodes_keep_declaration_order() {
        let resolution = resolve(3, |_| Vec::new());
        assert_eq!(resolution.order, vec![0, 1, 2]);
    }

    #[test]
    fn test_self_cycle() {
        let resolution = resolve(1, |_| vec![0]);
        assert_eq!(resolution.order, vec![0]);
        assert_eq!(resolution.cycles, vec![vec![0]]);
    }

    #[test]
    fn test_chain_order() {
        // 0 -> 1 -> 2
        let resolution = resolve(3, deps_of(&[(0, 1), (1, 2)]));
        assert_eq!(resolution.order, vec![2, 1, 0]);
    }
}
