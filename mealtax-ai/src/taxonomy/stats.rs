//! Structural statistics for a loaded taxonomy

use super::TaxonomyIndex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyStats {
    pub node_count: usize,
    /// Parent links as stored, including links to absent ids
    pub edge_count_parent_links: usize,
    pub root_count: usize,
    pub missing_parent_links: usize,
    pub unreachable_count: usize,
    pub cycle_node_count: usize,
    pub max_level: u32,
    pub counts_by_level: BTreeMap<u32, usize>,
    pub leaf_counts_by_level: BTreeMap<u32, usize>,
}

impl TaxonomyStats {
    pub fn compute(index: &TaxonomyIndex) -> Self {
        let nodes = index.nodes();

        let mut edge_count = 0;
        let mut missing = 0;
        let mut roots = 0;
        let mut unreachable = 0;
        let mut counts_by_level = BTreeMap::new();
        let mut leaf_counts_by_level = BTreeMap::new();

        for (handle, node) in nodes.iter().enumerate() {
            edge_count += node.parent_ids.len();
            let present = node.parent_ids.iter().filter(|p| index.contains(p)).count();
            missing += node.parent_ids.len() - present;
            if present == 0 {
                roots += 1;
            }
            if !index.is_reachable(handle) {
                unreachable += 1;
            }

            *counts_by_level.entry(node.level).or_insert(0) += 1;
            if index.children_of(handle).is_empty() {
                *leaf_counts_by_level.entry(node.level).or_insert(0) += 1;
            }
        }

        Self {
            node_count: nodes.len(),
            edge_count_parent_links: edge_count,
            root_count: roots,
            missing_parent_links: missing,
            unreachable_count: unreachable,
            cycle_node_count: cycle_nodes(index).len(),
            max_level: nodes.iter().map(|n| n.level).max().unwrap_or(0),
            counts_by_level,
            leaf_counts_by_level,
        }
    }
}

impl TaxonomyIndex {
    pub fn stats(&self) -> TaxonomyStats {
        TaxonomyStats::compute(self)
    }
}

impl fmt::Display for TaxonomyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nodes:                 {}", self.node_count)?;
        writeln!(f, "Parent links:          {}", self.edge_count_parent_links)?;
        writeln!(f, "Missing parent links:  {}", self.missing_parent_links)?;
        writeln!(f, "Roots:                 {}", self.root_count)?;
        writeln!(f, "Unreachable nodes:     {}", self.unreachable_count)?;
        writeln!(f, "Nodes in cycles:       {}", self.cycle_node_count)?;
        writeln!(f, "Max level:             {}", self.max_level)?;
        writeln!(f)?;
        writeln!(f, "{:>5}  {:>8}  {:>8}", "level", "nodes", "leaves")?;
        for (level, count) in &self.counts_by_level {
            let leaves = self.leaf_counts_by_level.get(level).copied().unwrap_or(0);
            writeln!(f, "{:>5}  {:>8}  {:>8}", level, count, leaves)?;
        }
        Ok(())
    }
}

/// Handles that lie on at least one cycle: members of a strongly connected
/// component with more than one node, plus self-looping nodes.
/// Iterative Tarjan over the child adjacency.
fn cycle_nodes(index: &TaxonomyIndex) -> HashSet<usize> {
    const UNVISITED: usize = usize::MAX;

    let n = index.len();
    let mut order = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut scc_stack: Vec<usize> = Vec::new();
    let mut next_order = 0usize;
    let mut in_cycle = HashSet::new();

    for start in 0..n {
        if order[start] != UNVISITED {
            continue;
        }

        // (node, next child offset)
        let mut call_stack: Vec<(usize, usize)> = vec![(start, 0)];
        order[start] = next_order;
        low[start] = next_order;
        next_order += 1;
        scc_stack.push(start);
        on_stack[start] = true;

        while let Some((u, offset)) = call_stack.last_mut() {
            let u = *u;
            let children = index.children_of(u);
            if let Some(&v) = children.get(*offset) {
                *offset += 1;
                if order[v] == UNVISITED {
                    order[v] = next_order;
                    low[v] = next_order;
                    next_order += 1;
                    scc_stack.push(v);
                    on_stack[v] = true;
                    call_stack.push((v, 0));
                } else if on_stack[v] {
                    low[u] = low[u].min(order[v]);
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                low[parent] = low[parent].min(low[u]);
            }

            if low[u] == order[u] {
                let mut component = Vec::new();
                while let Some(w) = scc_stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == u {
                        break;
                    }
                }
                if component.len() > 1 || index.children_of(u).contains(&u) {
                    in_cycle.extend(component);
                }
            }
        }
    }

    in_cycle
}
