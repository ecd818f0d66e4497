// graph.rs — Block dependency index
//
// Adjacency structures over one patch snapshot: an arc per enabled edge, and
// an arc from every enabled publisher's block to every enabled listener's
// block on the same bus. Built once per snapshot and queried by the
// validator, the auto-wire resolver and the compile pipeline.
//
// Every traversal is iterative, so patch size never threatens the stack.
//
// Preconditions: none (edges naming unknown blocks are ignored here; the
//   validator reports them).
// Postconditions: all orders are deterministic, ties broken by block id.
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeSet, HashMap};

use crate::id::BlockId;
use crate::patch::Patch;

// ── Index ───────────────────────────────────────────────────────────────────

/// Whether a traversal follows port edges only, or bus routes as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arcs {
    Edges,
    Dependencies,
}

#[derive(Debug, Clone)]
pub struct GraphIndex {
    /// Block ids in ascending order; node `i` is `ids[i]`.
    ids: Vec<BlockId>,
    index: HashMap<BlockId, usize>,
    /// Edge-induced successors / predecessors, sorted and deduplicated.
    succ: Vec<Vec<usize>>,
    pred: Vec<Vec<usize>>,
    /// Bus publish→listen successors / predecessors.
    bus_succ: Vec<Vec<usize>>,
    bus_pred: Vec<Vec<usize>>,
}

fn insert_sorted(list: &mut Vec<usize>, value: usize) {
    if let Err(pos) = list.binary_search(&value) {
        list.insert(pos, value);
    }
}

impl GraphIndex {
    #[tracing::instrument(level = "debug", skip_all, fields(blocks = patch.blocks.len()))]
    pub fn build(patch: &Patch) -> GraphIndex {
        let mut ids: Vec<BlockId> = patch.blocks.iter().map(|b| b.id.clone()).collect();
        ids.sort();
        ids.dedup();
        let index: HashMap<BlockId, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let n = ids.len();
        let mut graph = GraphIndex {
            ids,
            index,
            succ: vec![Vec::new(); n],
            pred: vec![Vec::new(); n],
            bus_succ: vec![Vec::new(); n],
            bus_pred: vec![Vec::new(); n],
        };

        for edge in patch.enabled_edges() {
            graph.add_arc(&edge.from.block_id, &edge.to.block_id);
        }

        for publisher in patch.publishers.iter().filter(|p| p.enabled) {
            let Some(&from) = graph.index.get(&publisher.from.block_id) else {
                continue;
            };
            for listener in patch
                .listeners
                .iter()
                .filter(|l| l.enabled && l.bus == publisher.bus)
            {
                if let Some(&to) = graph.index.get(&listener.to.block_id) {
                    insert_sorted(&mut graph.bus_succ[from], to);
                    insert_sorted(&mut graph.bus_pred[to], from);
                }
            }
        }

        tracing::debug!(
            nodes = graph.ids.len(),
            arcs = graph.succ.iter().map(Vec::len).sum::<usize>(),
            "built graph index"
        );
        graph
    }

    /// Add an edge arc, e.g. for a connection staged but not yet committed.
    /// Unknown endpoints are ignored.
    pub fn add_arc(&mut self, from: &BlockId, to: &BlockId) {
        if let (Some(&f), Some(&t)) = (self.index.get(from), self.index.get(to)) {
            insert_sorted(&mut self.succ[f], t);
            insert_sorted(&mut self.pred[t], f);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.index.contains_key(id)
    }

    /// All block ids in ascending order.
    pub fn block_ids(&self) -> &[BlockId] {
        &self.ids
    }

    fn successors(&self, node: usize, arcs: Arcs) -> impl Iterator<Item = usize> + '_ {
        let bus: &[usize] = match arcs {
            Arcs::Edges => &[],
            Arcs::Dependencies => &self.bus_succ[node],
        };
        self.succ[node].iter().chain(bus.iter()).copied()
    }

    fn names(&self, nodes: impl IntoIterator<Item = usize>) -> Vec<&BlockId> {
        nodes.into_iter().map(|i| &self.ids[i]).collect()
    }

    fn merged(a: &[usize], b: &[usize]) -> Vec<usize> {
        let set: BTreeSet<usize> = a.iter().chain(b.iter()).copied().collect();
        set.into_iter().collect()
    }

    // ── Neighbour queries ───────────────────────────────────────────────

    /// Blocks directly fed by `id` through an edge or a bus, ascending.
    pub fn downstream_blocks(&self, id: &BlockId) -> Vec<&BlockId> {
        match self.index.get(id) {
            Some(&i) => self.names(Self::merged(&self.succ[i], &self.bus_succ[i])),
            None => Vec::new(),
        }
    }

    /// Blocks directly feeding `id` through an edge or a bus, ascending.
    pub fn upstream_blocks(&self, id: &BlockId) -> Vec<&BlockId> {
        match self.index.get(id) {
            Some(&i) => self.names(Self::merged(&self.pred[i], &self.bus_pred[i])),
            None => Vec::new(),
        }
    }

    /// Every block reachable from `id` (excluding `id` itself unless it sits
    /// on a cycle), ascending.
    pub fn transitive_downstream(&self, id: &BlockId) -> Vec<&BlockId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };
        let mut seen = vec![false; self.ids.len()];
        let mut stack: Vec<usize> = self.successors(start, Arcs::Dependencies).collect();
        while let Some(node) = stack.pop() {
            if seen[node] {
                continue;
            }
            seen[node] = true;
            stack.extend(self.successors(node, Arcs::Dependencies).filter(|&s| !seen[s]));
        }
        self.names((0..self.ids.len()).filter(|&i| seen[i]))
    }

    // ── Ordering ────────────────────────────────────────────────────────

    /// Kahn's algorithm over edge and bus arcs. Ready blocks are taken in
    /// ascending id order; blocks left over by a cycle are appended in
    /// ascending id order, so the result is always a permutation of every
    /// block id.
    pub fn topological_order(&self) -> Vec<BlockId> {
        let n = self.ids.len();
        let mut in_degree = vec![0usize; n];
        for node in 0..n {
            for next in self.successors(node, Arcs::Dependencies) {
                in_degree[next] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some(node) = ready.pop_first() {
            placed[node] = true;
            order.push(self.ids[node].clone());
            for next in self.successors(node, Arcs::Dependencies) {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < n {
            tracing::debug!(stuck = n - order.len(), "cyclic blocks appended to order");
            order.extend((0..n).filter(|&i| !placed[i]).map(|i| self.ids[i].clone()));
        }
        order
    }

    // ── Cycles ──────────────────────────────────────────────────────────

    /// Would an edge `from → to` close a cycle in the edge graph?
    ///
    /// A self-loop always does. Otherwise this is a reachability search from
    /// `to` back to `from`, O(V+E).
    pub fn would_create_cycle(&self, from: &BlockId, to: &BlockId) -> bool {
        if from == to {
            return true;
        }
        let (Some(&src), Some(&dst)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        let mut seen = vec![false; self.ids.len()];
        let mut stack = vec![dst];
        while let Some(node) = stack.pop() {
            if node == src {
                return true;
            }
            if seen[node] {
                continue;
            }
            seen[node] = true;
            stack.extend(self.succ[node].iter().copied().filter(|&s| !seen[s]));
        }
        false
    }

    /// Cycles in the edge graph found by depth-first search, each listed
    /// from its first-discovered block. Deterministic.
    pub fn find_cycles(&self) -> Vec<Vec<BlockId>> {
        self.cycles(Arcs::Edges)
            .into_iter()
            .map(|c| c.into_iter().map(|i| self.ids[i].clone()).collect())
            .collect()
    }

    /// Dependency cycles that only close through a bus route, i.e. that
    /// contain at least one bus arc with no parallel edge.
    pub fn find_bus_feedback(&self) -> Vec<Vec<BlockId>> {
        self.cycles(Arcs::Dependencies)
            .into_iter()
            .filter(|cycle| {
                cycle.iter().enumerate().any(|(k, &u)| {
                    let v = cycle[(k + 1) % cycle.len()];
                    self.succ[u].binary_search(&v).is_err()
                })
            })
            .map(|c| c.into_iter().map(|i| self.ids[i].clone()).collect())
            .collect()
    }

    fn cycles(&self, arcs: Arcs) -> Vec<Vec<usize>> {
        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;

        let n = self.ids.len();
        let mut color = vec![WHITE; n];
        let mut cycles = Vec::new();

        for root in 0..n {
            if color[root] != WHITE {
                continue;
            }
            // (node, successors, cursor) frames; `path` mirrors the grey nodes.
            let mut stack: Vec<(usize, Vec<usize>, usize)> =
                vec![(root, self.successors(root, arcs).collect(), 0)];
            let mut path = vec![root];
            color[root] = GREY;

            while let Some((node, next, cursor)) = stack.last_mut() {
                if *cursor == next.len() {
                    color[*node] = BLACK;
                    path.pop();
                    stack.pop();
                    continue;
                }
                let succ = next[*cursor];
                *cursor += 1;
                match color[succ] {
                    WHITE => {
                        color[succ] = GREY;
                        path.push(succ);
                        stack.push((succ, self.successors(succ, arcs).collect(), 0));
                    }
                    GREY => {
                        if let Some(pos) = path.iter().position(|&p| p == succ) {
                            let cycle = path[pos..].to_vec();
                            if !cycles.contains(&cycle) {
                                cycles.push(cycle);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        cycles
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
