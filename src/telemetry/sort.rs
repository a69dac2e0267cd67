// src/telemetry/sort.rs

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{DfsPostOrder, VisitMap};

use crate::telemetry::board::TaskBoard;
use crate::types::TaskName;

/// Order the board's tasks so every task comes after the tasks it depends
/// on.
///
/// Roots are visited by start time (tasks that never started go last, ties
/// keep first-seen order), and each root's dependencies are emitted before
/// it. Dependencies on names the board does not know are ignored.
pub fn sort_by_dependencies(board: &TaskBoard) -> Vec<TaskName> {
    // Edge direction: task -> dependency, so a post-order visit yields
    // dependencies first.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in board.names() {
        graph.add_node(name);
    }

    for (name, state) in board.iter() {
        for dep in &state.dependencies {
            if graph.contains_node(dep.as_str()) {
                graph.add_edge(name, dep.as_str(), ());
            }
        }
    }

    let mut by_start: Vec<(&str, _)> = board
        .iter()
        .map(|(name, state)| (name, state.started_at))
        .collect();
    by_start.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let mut ordered = Vec::with_capacity(by_start.len());
    let mut dfs = DfsPostOrder::empty(&graph);

    for (root, _) in by_start {
        if dfs.discovered.is_visited(&root) {
            continue;
        }
        dfs.move_to(root);
        while let Some(name) = dfs.next(&graph) {
            ordered.push(name.to_string());
        }
    }

    ordered
}
