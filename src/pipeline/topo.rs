// src/pipeline/topo.rs

//! Topological ordering of a dependency-linked source set (Kahn's algorithm).

use std::collections::{BTreeMap, VecDeque};

use crate::error::{AppError, Result};

/// Order the linked sources so every producer precedes its dependents.
///
/// `edges` maps producer -> dependents. Simultaneously-ready nodes are
/// emitted in lexicographic order, which keeps the schedule deterministic.
/// A cycle returns [`AppError::CycleDetected`] carrying the nodes that could
/// not be ordered; the caller skips the whole scope for that pass.
pub fn topo_sort(nodes: &[String], edges: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> =
        nodes.iter().map(|n| (n.as_str(), 0)).collect();

    for (producer, dependents) in edges {
        if !in_degree.contains_key(producer.as_str()) {
            continue;
        }
        for dependent in dependents {
            if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                *degree += 1;
            }
        }
    }

    // BTreeMap iteration seeds the queue in sorted order.
    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        if let Some(dependents) = edges.get(current) {
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }
    }

    if order.len() == nodes.len() {
        Ok(order)
    } else {
        let remaining: Vec<String> = nodes
            .iter()
            .filter(|n| !order.contains(n))
            .cloned()
            .collect();
        Err(AppError::CycleDetected { remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn edges(list: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        list.iter()
            .map(|(k, v)| (k.to_string(), names(v)))
            .collect()
    }

    fn assert_precedes(order: &[String], before: &str, after: &str) {
        let b = order.iter().position(|n| n == before).unwrap();
        let a = order.iter().position(|n| n == after).unwrap();
        assert!(b < a, "{before} must precede {after} in {order:?}");
    }

    #[test]
    fn test_chain() {
        let order = topo_sort(
            &names(&["a", "b", "c"]),
            &edges(&[("a", &["b"]), ("b", &["c"])]),
        )
        .unwrap();
        assert_eq!(order, names(&["a", "b", "c"]));
    }

    #[test]
    fn test_every_edge_respected_in_diamond() {
        let order = topo_sort(
            &names(&["a", "b", "c", "d"]),
            &edges(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"])]),
        )
        .unwrap();
        assert_eq!(order.len(), 4);
        assert_precedes(&order, "a", "b");
        assert_precedes(&order, "a", "c");
        assert_precedes(&order, "b", "d");
        assert_precedes(&order, "c", "d");
    }

    #[test]
    fn test_ready_ties_break_lexicographically() {
        let order = topo_sort(
            &names(&["z", "a", "m"]),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(order, names(&["a", "m", "z"]));
    }

    #[test]
    fn test_cycle_detected() {
        let err = topo_sort(
            &names(&["a", "b", "c"]),
            &edges(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::CycleDetected { remaining } if remaining.len() == 3
        ));
    }

    #[test]
    fn test_partial_cycle_reports_only_cyclic_nodes() {
        let err = topo_sort(
            &names(&["root", "x", "y"]),
            &edges(&[("root", &["x"]), ("x", &["y"]), ("y", &["x"])]),
        )
        .unwrap_err();
        match err {
            AppError::CycleDetected { remaining } => {
                assert_eq!(remaining, names(&["x", "y"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
