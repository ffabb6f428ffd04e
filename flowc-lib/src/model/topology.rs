use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// Error type for topology operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError<K: Debug + Clone> {
    /// Cycle detected in the graph
    CycleDetected { path: Vec<K> },
}

impl<K: Debug + Clone> std::fmt::Display for TopologyError<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::CycleDetected { path } => {
                write!(f, "cycle detected: ")?;
                for (i, node) in path.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{:?}", node)?;
                }
                Ok(())
            }
        }
    }
}

impl<K: Debug + Clone> std::error::Error for TopologyError<K> {}

/// Generic topological sort using DFS
///
/// # Arguments
/// * `nodes` - Iterator over all nodes to sort
/// * `get_dependencies` - Function that returns the dependencies (predecessors) for a node
///
/// # Returns
/// A vector of nodes in topological order (dependencies before dependents),
/// or an error naming the nodes of a cycle. Nodes that do not depend on each
/// other keep their relative input order.
pub fn topological_sort<K>(
    nodes: impl IntoIterator<Item = K>,
    get_dependencies: impl Fn(&K) -> Vec<K>,
) -> Result<Vec<K>, TopologyError<K>>
where
    K: Hash + Eq + Clone + Debug,
{
    let nodes: Vec<K> = nodes.into_iter().collect();

    let mut dependencies: HashMap<K, Vec<K>> = HashMap::with_capacity(nodes.len());
    for node in &nodes {
        dependencies.insert(node.clone(), get_dependencies(node));
    }

    let mut sorted = Vec::with_capacity(nodes.len());
    let mut visited = HashSet::new();
    let mut path = Vec::new();

    // Post-order over dependency edges puts every dependency first.
    fn visit<K>(
        node: K,
        dependencies: &HashMap<K, Vec<K>>,
        visited: &mut HashSet<K>,
        path: &mut Vec<K>,
        sorted: &mut Vec<K>,
    ) -> Result<(), TopologyError<K>>
    where
        K: Hash + Eq + Clone + Debug,
    {
        if let Some(start) = path.iter().position(|n| *n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Err(TopologyError::CycleDetected { path: cycle });
        }

        if visited.contains(&node) {
            return Ok(());
        }

        path.push(node.clone());

        if let Some(deps) = dependencies.get(&node) {
            for dep in deps {
                visit(dep.clone(), dependencies, visited, path, sorted)?;
            }
        }

        path.pop();
        visited.insert(node.clone());
        sorted.push(node);

        Ok(())
    }

    for node in &nodes {
        if !visited.contains(node) {
            visit(
                node.clone(),
                &dependencies,
                &mut visited,
                &mut path,
                &mut sorted,
            )?;
        }
    }

    Ok(sorted)
}

/// Every node reachable from `roots` through dependency edges, roots included,
/// in discovery order.
pub fn dependency_closure<K>(
    roots: impl IntoIterator<Item = K>,
    get_dependencies: impl Fn(&K) -> Vec<K>,
) -> Vec<K>
where
    K: Hash + Eq + Clone + Debug,
{
    let mut seen = HashSet::new();
    let mut closure = Vec::new();
    let mut stack: Vec<K> = roots.into_iter().collect();
    stack.reverse();

    while let Some(node) = stack.pop() {
        if !seen.insert(node.clone()) {
            continue;
        }
        let mut deps = get_dependencies(&node);
        deps.reverse();
        stack.extend(deps);
        closure.push(node);
    }

    closure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_chain() {
        // a -> b -> c
        let nodes = vec!["c", "b", "a"];
        let deps = |node: &&str| -> Vec<&str> {
            match *node {
                "b" => vec!["a"],
                "c" => vec!["b"],
                _ => vec![],
            }
        };

        let sorted = topological_sort(nodes, deps).unwrap();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond() {
        // a -> b -> d
        // a -> c -> d
        let nodes = vec!["a", "b", "c", "d"];
        let deps = |node: &&str| -> Vec<&str> {
            match *node {
                "b" => vec!["a"],
                "c" => vec!["a"],
                "d" => vec!["b", "c"],
                _ => vec![],
            }
        };

        let sorted = topological_sort(nodes, deps).unwrap();
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_detection() {
        // a -> b -> a (cycle)
        let nodes = vec!["a", "b"];
        let deps = |node: &&str| -> Vec<&str> {
            match *node {
                "a" => vec!["b"],
                "b" => vec!["a"],
                _ => vec![],
            }
        };

        match topological_sort(nodes, deps) {
            Err(TopologyError::CycleDetected { path }) => {
                assert_eq!(path, vec!["a", "b", "a"]);
            }
            other => panic!("Expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_closure_skips_unrelated_nodes() {
        let deps = |node: &&str| -> Vec<&str> {
            match *node {
                "d" => vec!["b", "c"],
                "b" => vec!["a"],
                "c" => vec!["a"],
                _ => vec![],
            }
        };

        let closure = dependency_closure(vec!["b"], deps);
        assert_eq!(closure, vec!["b", "a"]);

        let closure = dependency_closure(vec!["d"], deps);
        assert_eq!(closure.len(), 4);
        assert_eq!(closure[0], "d");
    }
}
