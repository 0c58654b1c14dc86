//! Directed dependency graph with ordering algorithms
//!
//! `Graph` is a general-purpose directed graph keyed by opaque string IDs.
//! It knows nothing about models or SQL: Discovery feeds it node IDs and
//! edges, the orchestrator consumes its orderings. Edges point from a
//! parent (dependency) to a child (dependent), so a topological order lists
//! every parent before its children.

use crate::error::{CoreError, CoreResult};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A directed graph of string-keyed nodes with an opaque payload per node.
///
/// The structure lives in a petgraph `DiGraph` whose node weights are the
/// IDs, with a `node_map` from ID to node index and payloads in a side
/// map. All query results that return multiple IDs are sorted
/// lexicographically so orderings are deterministic across runs and
/// platforms; petgraph's own traversal order is never exposed.
#[derive(Debug, Clone, Default)]
pub struct Graph<T> {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
    data: HashMap<String, T>,
}

impl<T> Graph<T> {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            data: HashMap::new(),
        }
    }

    /// Add a node, or replace the payload of an existing one.
    ///
    /// Upserting an existing ID keeps its edges intact.
    pub fn add_node(&mut self, id: impl Into<String>, data: T) {
        let id = id.into();
        if !self.node_map.contains_key(&id) {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id.clone(), idx);
        }
        self.data.insert(id, data);
    }

    /// Add a directed edge from `parent` to `child`.
    ///
    /// Both endpoints must already be registered. Self-loops are rejected.
    /// Inserting the same edge twice is a no-op.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> CoreResult<()> {
        let Some(&from) = self.node_map.get(parent) else {
            return Err(CoreError::UnknownNode {
                id: parent.to_string(),
            });
        };
        let Some(&to) = self.node_map.get(child) else {
            return Err(CoreError::UnknownNode {
                id: child.to_string(),
            });
        };
        if parent == child {
            return Err(CoreError::SelfLoop {
                id: parent.to_string(),
            });
        }

        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
        Ok(())
    }

    fn neighbor_ids(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        out.sort();
        out
    }

    /// Direct parents of a node. Absent IDs yield an empty list.
    pub fn parents(&self, id: &str) -> Vec<String> {
        self.neighbor_ids(id, Direction::Incoming)
    }

    /// Direct children of a node. Absent IDs yield an empty list.
    pub fn children(&self, id: &str) -> Vec<String> {
        self.neighbor_ids(id, Direction::Outgoing)
    }

    /// Whether a node is registered
    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    /// Payload of a node, if registered
    pub fn node_data(&self, id: &str) -> Option<&T> {
        self.data.get(id)
    }

    /// All node IDs, sorted
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.node_map.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Remove all nodes and edges
    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_map.clear();
        self.data.clear();
    }

    /// Find a cycle if one exists, returning the ordered node path.
    ///
    /// `toposort` locates a node on a cycle; a depth-first walk from it
    /// with a gray set (nodes on the current recursion stack) recovers
    /// the loop. The returned path starts at the re-entered node and
    /// follows the edges that close it, e.g. `[a, b, c]` for
    /// a -> b -> c -> a.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let start = match toposort(&self.graph, None) {
            Ok(_) => return None,
            Err(cycle) => cycle.node_id(),
        };
        let mut done: HashSet<NodeIndex> = HashSet::new();
        let mut gray: HashSet<NodeIndex> = HashSet::new();
        let mut path: Vec<NodeIndex> = Vec::new();
        self.cycle_dfs(start, &mut done, &mut gray, &mut path)
    }

    fn cycle_dfs(
        &self,
        idx: NodeIndex,
        done: &mut HashSet<NodeIndex>,
        gray: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        gray.insert(idx);
        path.push(idx);

        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        children.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for child in children {
            if gray.contains(&child) {
                // Back-edge: the cycle is the path suffix starting at `child`.
                let start = path.iter().position(|n| *n == child).unwrap_or(0);
                return Some(path[start..].iter().map(|n| self.graph[*n].clone()).collect());
            }
            if !done.contains(&child) {
                if let Some(cycle) = self.cycle_dfs(child, done, gray, path) {
                    return Some(cycle);
                }
            }
        }

        gray.remove(&idx);
        path.pop();
        done.insert(idx);
        None
    }

    /// Whether the graph contains at least one cycle
    pub fn has_cycle(&self) -> bool {
        toposort(&self.graph, None).is_err()
    }

    fn cycle_error(&self, start: NodeIndex) -> CoreError {
        let mut done: HashSet<NodeIndex> = HashSet::new();
        let mut gray: HashSet<NodeIndex> = HashSet::new();
        let mut path: Vec<NodeIndex> = Vec::new();
        let cycle = self
            .cycle_dfs(start, &mut done, &mut gray, &mut path)
            .unwrap_or_default();
        CoreError::CyclicGraph {
            cycle: cycle.join(" -> "),
        }
    }

    /// Nodes in topological order: every edge's parent precedes its child.
    ///
    /// `toposort` proves an order exists; the order itself is rebuilt by
    /// visiting node IDs lexicographically and emitting each node's
    /// parents before the node, so the output is deterministic for a
    /// given graph. Fails with `CyclicGraph` when no order exists.
    pub fn topological_sort(&self) -> CoreResult<Vec<String>> {
        if let Err(cycle) = toposort(&self.graph, None) {
            return Err(self.cycle_error(cycle.node_id()));
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();
        for id in self.node_ids() {
            self.emit_after_parents(&id, &mut visited, &mut order);
        }
        Ok(order)
    }

    fn emit_after_parents(&self, id: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !visited.insert(id.to_string()) {
            return;
        }
        for parent in self.parents(id) {
            self.emit_after_parents(&parent, visited, order);
        }
        order.push(id.to_string());
    }

    /// Group nodes into execution levels.
    ///
    /// A node's level is 0 when it has no parents, otherwise one more than
    /// the highest parent level. Nodes sharing a level have no path between
    /// them and may run in any relative order once all lower levels are
    /// done. Level members are sorted. Fails with `CyclicGraph` on cycles.
    pub fn execution_levels(&self) -> CoreResult<Vec<Vec<String>>> {
        if let Err(cycle) = toposort(&self.graph, None) {
            return Err(self.cycle_error(cycle.node_id()));
        }

        let mut memo: HashMap<String, usize> = HashMap::new();
        let mut max_level = 0usize;
        for id in self.node_ids() {
            max_level = max_level.max(self.level_of(&id, &mut memo));
        }

        let mut levels: Vec<Vec<String>> = vec![Vec::new(); max_level + 1];
        for id in self.node_ids() {
            levels[memo[&id]].push(id);
        }
        if self.node_map.is_empty() {
            levels.clear();
        }
        Ok(levels)
    }

    fn level_of(&self, id: &str, memo: &mut HashMap<String, usize>) -> usize {
        if let Some(&level) = memo.get(id) {
            return level;
        }
        let parents = self.parents(id);
        let level = if parents.is_empty() {
            0
        } else {
            1 + parents
                .iter()
                .map(|p| self.level_of(p, memo))
                .max()
                .unwrap_or(0)
        };
        memo.insert(id.to_string(), level);
        level
    }

    /// Forward transitive closure: the seed nodes plus every descendant.
    ///
    /// Seeds that are not registered contribute nothing. Deduplicated and
    /// sorted.
    pub fn affected_nodes(&self, seeds: &[String]) -> Vec<String> {
        let mut result: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<String> = seeds
            .iter()
            .filter(|s| self.contains(s))
            .cloned()
            .collect();

        while let Some(current) = stack.pop() {
            if !result.insert(current.clone()) {
                continue;
            }
            for child in self.children(&current) {
                if !result.contains(&child) {
                    stack.push(child);
                }
            }
        }
        result.into_iter().collect()
    }

    /// Backward transitive closure: every ancestor of `id`, excluding `id`.
    pub fn upstream_nodes(&self, id: &str) -> Vec<String> {
        let mut result: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<String> = self.parents(id);

        while let Some(current) = stack.pop() {
            if !result.insert(current.clone()) {
                continue;
            }
            for parent in self.parents(&current) {
                if !result.contains(&parent) {
                    stack.push(parent);
                }
            }
        }
        result.into_iter().collect()
    }

    /// Nodes with no parents, sorted
    pub fn roots(&self) -> Vec<String> {
        self.node_ids()
            .into_iter()
            .filter(|id| self.parents(id).is_empty())
            .collect()
    }

    /// Nodes with no children, sorted
    pub fn leaves(&self) -> Vec<String> {
        self.node_ids()
            .into_iter()
            .filter(|id| self.children(id).is_empty())
            .collect()
    }
}

impl<T: Clone> Graph<T> {
    /// Induced subgraph: only the named nodes, and only edges with both
    /// endpoints in the set.
    pub fn subgraph(&self, ids: &HashSet<String>) -> Graph<T> {
        let mut sub = Graph::new();
        for id in ids {
            if let Some(data) = self.data.get(id) {
                sub.add_node(id.clone(), data.clone());
            }
        }
        for id in ids {
            if !self.node_map.contains_key(id) {
                continue;
            }
            for child in self.children(id) {
                if ids.contains(&child) {
                    // Both endpoints registered above, cannot fail.
                    let _ = sub.add_edge(id, &child);
                }
            }
        }
        sub
    }
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
