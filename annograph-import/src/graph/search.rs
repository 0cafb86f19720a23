//! Bounded searches along `precedes` edges

use super::{AnnotationGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Direction of travel along a precedence chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward successors
    Forward,
    /// Toward predecessors
    Backward,
}

impl AnnotationGraph {
    pub fn neighbours(&self, index: NodeIndex, direction: Direction) -> &[NodeIndex] {
        match direction {
            Direction::Forward => self.successors(index),
            Direction::Backward => self.predecessors(index),
        }
    }

    /// Walk from `start` (exclusive) for at most `max_hops` steps, collecting
    /// nodes while `accept` holds. Stops at the first rejected node.
    ///
    /// On a well-formed chain every node has at most one neighbour per
    /// direction; on a branching chain only the first neighbour is followed.
    pub fn walk_while<F>(
        &self,
        start: NodeIndex,
        direction: Direction,
        max_hops: usize,
        mut accept: F,
    ) -> Vec<NodeIndex>
    where
        F: FnMut(NodeIndex) -> bool,
    {
        let mut collected = Vec::new();
        let mut current = start;
        let mut seen = HashSet::from([start]);

        while collected.len() < max_hops {
            let Some(&next) = self.neighbours(current, direction).first() else {
                break;
            };
            if !seen.insert(next) || !accept(next) {
                break;
            }
            collected.push(next);
            current = next;
        }

        collected
    }

    /// Shortest forward path from `from` to `to` (both inclusive) using at
    /// most `max_hops` edges. `from == to` yields a single-node path.
    pub fn shortest_path(&self, from: NodeIndex, to: NodeIndex, max_hops: usize) -> Option<Vec<NodeIndex>> {
        if from == to {
            return Some(vec![from]);
        }

        let mut came_from: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut frontier = VecDeque::from([(from, 0usize)]);
        let mut visited = HashSet::from([from]);

        while let Some((node, depth)) = frontier.pop_front() {
            if depth == max_hops {
                continue;
            }
            for &next in self.successors(node) {
                if !visited.insert(next) {
                    continue;
                }
                came_from.insert(next, node);
                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(&prev) = came_from.get(&cursor) {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                frontier.push_back((next, depth + 1));
            }
        }

        None
    }
}
