// autowire.rs — Connection proposals for a newly placed block
//
// Suggests edges for a block the user just dropped into the patch. The
// resolver only wires when exactly one compatible endpoint exists; any
// ambiguity leaves the port alone.
//
// Preconditions: `new_block` exists in the patch.
// Postconditions: every proposed edge is type-compatible, targets a free
//   input, and keeps the edge graph acyclic together with the edges staged
//   before it.
// Failure modes: none. A missing block or port yields a reason string.
// Side effects: none. The caller applies the proposals.

use std::collections::HashSet;

use crate::graph::GraphIndex;
use crate::id::{auto_edge_id, BlockId};
use crate::patch::{Block, Direction, Edge, EdgeRole, Patch, PortRef, PortView, Slot};
use crate::types::are_slot_types_compatible;

#[derive(Debug, Clone)]
pub struct AutoWireContext<'a> {
    pub patch: &'a Patch,
    pub new_block: BlockId,
    /// Input on another block the new block should feed.
    pub target_input: Option<PortRef>,
    /// Output on another block that should feed the new block.
    pub source_output: Option<PortRef>,
}

impl<'a> AutoWireContext<'a> {
    pub fn new(patch: &'a Patch, new_block: impl Into<BlockId>) -> Self {
        AutoWireContext {
            patch,
            new_block: new_block.into(),
            target_input: None,
            source_output: None,
        }
    }

    pub fn with_target_input(mut self, port: PortRef) -> Self {
        self.target_input = Some(port);
        self
    }

    pub fn with_source_output(mut self, port: PortRef) -> Self {
        self.source_output = Some(port);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoWireResult {
    pub connections: Vec<Edge>,
    /// Why nothing (or less than everything) was wired.
    pub reason: Option<String>,
}

impl AutoWireResult {
    fn bail(reason: impl Into<String>) -> Self {
        AutoWireResult {
            connections: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    fn single(edge: Edge) -> Self {
        AutoWireResult {
            connections: vec![edge],
            reason: None,
        }
    }
}

fn view<'p>(block: &'p Block, slot: &'p Slot, direction: Direction) -> PortView<'p> {
    PortView {
        block,
        slot,
        direction,
    }
}

fn auto_edge(from: PortRef, to: PortRef) -> Edge {
    let id = auto_edge_id(&from.block_id, &from.slot_id, &to.block_id, &to.slot_id);
    Edge::new(id, from, to).with_role(EdgeRole::Auto)
}

/// Propose connections for `ctx.new_block`.
///
/// An explicit target input takes priority over an explicit source output;
/// with neither, every free input of the new block is matched against the
/// free outputs of the rest of the patch.
#[tracing::instrument(level = "debug", skip_all, fields(block = %ctx.new_block))]
pub fn compute_auto_wire(ctx: &AutoWireContext<'_>) -> AutoWireResult {
    let Some(block) = ctx.patch.block(&ctx.new_block) else {
        return AutoWireResult::bail(format!("block '{}' does not exist", ctx.new_block));
    };
    let result = if let Some(target) = &ctx.target_input {
        wire_to_target(ctx.patch, block, target)
    } else if let Some(source) = &ctx.source_output {
        wire_from_source(ctx.patch, block, source)
    } else {
        wire_free_inputs(ctx.patch, block)
    };
    tracing::debug!(
        proposed = result.connections.len(),
        reason = result.reason.as_deref().unwrap_or(""),
        "auto-wire"
    );
    result
}

// ── Explicit target ─────────────────────────────────────────────────────────

fn wire_to_target(patch: &Patch, block: &Block, target: &PortRef) -> AutoWireResult {
    let Some(input) = patch.port(target) else {
        return AutoWireResult::bail(format!("port '{}' does not exist", target));
    };
    if input.direction != Direction::Input {
        return AutoWireResult::bail(format!("port '{}' is not an input", target));
    }
    if patch.is_input_connected(target) {
        return AutoWireResult::bail(format!("input '{}' is already connected", target));
    }

    let candidates: Vec<&Slot> = block
        .outputs
        .iter()
        .filter(|slot| are_slot_types_compatible(&view(block, slot, Direction::Output), &input))
        .collect();
    let slot = match candidates.as_slice() {
        [] => {
            return AutoWireResult::bail(format!(
                "no output of '{}' is compatible with '{}'",
                block.id, target
            ))
        }
        [slot] => *slot,
        many => {
            return AutoWireResult::bail(format!(
                "{} outputs of '{}' are compatible with '{}'; ambiguous",
                many.len(),
                block.id,
                target
            ))
        }
    };

    if GraphIndex::build(patch).would_create_cycle(&block.id, &target.block_id) {
        return AutoWireResult::bail(format!(
            "connecting '{}' to '{}' would create a cycle",
            block.id, target
        ));
    }
    AutoWireResult::single(auto_edge(block.port(slot), target.clone()))
}

// ── Explicit source ─────────────────────────────────────────────────────────

fn wire_from_source(patch: &Patch, block: &Block, source: &PortRef) -> AutoWireResult {
    let Some(output) = patch.port(source) else {
        return AutoWireResult::bail(format!("port '{}' does not exist", source));
    };
    if output.direction != Direction::Output {
        return AutoWireResult::bail(format!("port '{}' is not an output", source));
    }

    let candidates: Vec<&Slot> = block
        .inputs
        .iter()
        .filter(|slot| !patch.is_input_connected(&block.port(slot)))
        .filter(|slot| are_slot_types_compatible(&output, &view(block, slot, Direction::Input)))
        .collect();
    let slot = match candidates.as_slice() {
        [] => {
            return AutoWireResult::bail(format!(
                "no free input of '{}' accepts '{}'",
                block.id, source
            ))
        }
        [slot] => *slot,
        many => {
            return AutoWireResult::bail(format!(
                "{} free inputs of '{}' accept '{}'; ambiguous",
                many.len(),
                block.id,
                source
            ))
        }
    };

    if GraphIndex::build(patch).would_create_cycle(&source.block_id, &block.id) {
        return AutoWireResult::bail(format!(
            "connecting '{}' to '{}' would create a cycle",
            source, block.id
        ));
    }
    AutoWireResult::single(auto_edge(source.clone(), block.port(slot)))
}

// ── Free inputs ─────────────────────────────────────────────────────────────

fn wire_free_inputs(patch: &Patch, block: &Block) -> AutoWireResult {
    let mut graph = GraphIndex::build(patch);
    let mut staged_outputs: HashSet<PortRef> = HashSet::new();
    let mut connections = Vec::new();

    let mut others: Vec<&Block> = patch.blocks.iter().filter(|b| b.id != block.id).collect();
    others.sort_by(|a, b| a.id.cmp(&b.id));

    for input in &block.inputs {
        let to = block.port(input);
        if patch.is_input_connected(&to) {
            continue;
        }
        let sink = view(block, input, Direction::Input);

        // Outputs that would close a loop are not candidates. Two remaining
        // candidates already make the input ambiguous.
        let candidates: Vec<PortRef> = others
            .iter()
            .flat_map(|&other| {
                other
                    .outputs
                    .iter()
                    .filter(move |slot| {
                        are_slot_types_compatible(&view(other, slot, Direction::Output), &sink)
                    })
                    .map(move |slot| other.port(slot))
            })
            .filter(|port| !patch.is_output_consumed(port) && !staged_outputs.contains(port))
            .filter(|port| !graph.would_create_cycle(&port.block_id, &block.id))
            .take(2)
            .collect();

        let [from] = candidates.as_slice() else {
            tracing::trace!(input = %to, candidates = candidates.len(), "left unwired");
            continue;
        };

        graph.add_arc(&from.block_id, &block.id);
        staged_outputs.insert(from.clone());
        connections.push(auto_edge(from.clone(), to));
    }

    let reason = connections
        .is_empty()
        .then(|| format!("no unambiguous connection found for '{}'", block.id));
    AutoWireResult {
        connections,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Domain, TypeDesc};

    fn node(id: &str) -> Block {
        Block::new(id, "Node")
            .with_input(Slot::new("in", TypeDesc::signal(Domain::Float)))
            .with_output(Slot::new("out", TypeDesc::signal(Domain::Float)))
    }

    fn patch(blocks: Vec<Block>, edges: Vec<Edge>) -> Patch {
        Patch {
            blocks,
            edges,
            ..Patch::default()
        }
    }

    #[test]
    fn single_free_candidate_is_wired() {
        let p = patch(vec![node("a"), node("new")], vec![]);
        let result = compute_auto_wire(&AutoWireContext::new(&p, "new"));
        assert_eq!(result.reason, None);
        assert_eq!(result.connections.len(), 1);
        let edge = &result.connections[0];
        assert_eq!(edge.id.as_str(), "auto_a.out_new.in");
        assert_eq!(edge.role, EdgeRole::Auto);
        assert_eq!(edge.from, PortRef::new("a", "out"));
        assert_eq!(edge.to, PortRef::new("new", "in"));
    }

    #[test]
    fn ambiguity_leaves_input_unwired() {
        let p = patch(vec![node("a"), node("b"), node("new")], vec![]);
        let result = compute_auto_wire(&AutoWireContext::new(&p, "new"));
        assert!(result.connections.is_empty());
        assert!(result.reason.is_some());
    }

    #[test]
    fn consumed_outputs_are_not_candidates() {
        let p = patch(
            vec![node("a"), node("b"), node("c"), node("new")],
            vec![Edge::new(
                "e1",
                PortRef::new("a", "out"),
                PortRef::new("c", "in"),
            )],
        );
        // a.out is consumed; c.out and b.out remain. Still ambiguous.
        let result = compute_auto_wire(&AutoWireContext::new(&p, "new"));
        assert!(result.connections.is_empty());

        let p = patch(
            vec![node("a"), node("c"), node("new")],
            vec![Edge::new(
                "e1",
                PortRef::new("a", "out"),
                PortRef::new("c", "in"),
            )],
        );
        let result = compute_auto_wire(&AutoWireContext::new(&p, "new"));
        assert_eq!(result.connections[0].from, PortRef::new("c", "out"));
    }

    #[test]
    fn staged_edges_consume_outputs() {
        let new = Block::new("new", "Mix")
            .with_input(Slot::new("x", TypeDesc::signal(Domain::Float)))
            .with_input(Slot::new("y", TypeDesc::signal(Domain::Float)));
        let p = patch(vec![node("a"), new], vec![]);
        let result = compute_auto_wire(&AutoWireContext::new(&p, "new"));
        assert_eq!(result.connections.len(), 1);
        assert_eq!(result.connections[0].to, PortRef::new("new", "x"));
    }

    #[test]
    fn free_scan_never_closes_a_cycle() {
        // new.out -> a.in already exists, so a.out -> new.in would loop.
        let p = patch(
            vec![node("a"), node("new")],
            vec![Edge::new(
                "e1",
                PortRef::new("new", "out"),
                PortRef::new("a", "in"),
            )],
        );
        let result = compute_auto_wire(&AutoWireContext::new(&p, "new"));
        assert!(result.connections.is_empty());
    }

    #[test]
    fn cyclic_candidate_does_not_count_as_ambiguity() {
        // down.out is compatible and free, but down is fed by new.o2.
        let new = node("new").with_output(Slot::new("o2", TypeDesc::signal(Domain::Float)));
        let p = patch(
            vec![node("a"), node("down"), new],
            vec![Edge::new(
                "e1",
                PortRef::new("new", "o2"),
                PortRef::new("down", "in"),
            )],
        );
        let result = compute_auto_wire(&AutoWireContext::new(&p, "new"));
        assert_eq!(result.reason, None);
        assert_eq!(result.connections.len(), 1);
        assert_eq!(result.connections[0].id.as_str(), "auto_a.out_new.in");
    }

    #[test]
    fn explicit_target() {
        let p = patch(vec![node("a"), node("new")], vec![]);
        let ctx = AutoWireContext::new(&p, "new").with_target_input(PortRef::new("a", "in"));
        let result = compute_auto_wire(&ctx);
        assert_eq!(result.connections[0].id.as_str(), "auto_new.out_a.in");
    }

    #[test]
    fn explicit_target_already_wired() {
        let p = patch(
            vec![node("a"), node("b"), node("new")],
            vec![Edge::new(
                "e1",
                PortRef::new("b", "out"),
                PortRef::new("a", "in"),
            )],
        );
        let ctx = AutoWireContext::new(&p, "new").with_target_input(PortRef::new("a", "in"));
        let result = compute_auto_wire(&ctx);
        assert!(result.connections.is_empty());
        assert!(result.reason.unwrap().contains("already connected"));
    }

    #[test]
    fn explicit_target_ambiguous() {
        let new = node("new").with_output(Slot::new("alt", TypeDesc::signal(Domain::Int)));
        let p = patch(vec![node("a"), new], vec![]);
        let ctx = AutoWireContext::new(&p, "new").with_target_input(PortRef::new("a", "in"));
        let result = compute_auto_wire(&ctx);
        assert!(result.connections.is_empty());
        assert!(result.reason.unwrap().contains("ambiguous"));
    }

    #[test]
    fn explicit_target_cycle_rejected() {
        let p = patch(
            vec![node("a"), node("new")],
            vec![Edge::new(
                "e1",
                PortRef::new("a", "out"),
                PortRef::new("new", "in"),
            )],
        );
        let ctx = AutoWireContext::new(&p, "new").with_target_input(PortRef::new("a", "in"));
        let result = compute_auto_wire(&ctx);
        assert!(result.connections.is_empty());
        assert!(result.reason.unwrap().contains("cycle"));
    }

    #[test]
    fn explicit_source() {
        let p = patch(vec![node("a"), node("new")], vec![]);
        let ctx = AutoWireContext::new(&p, "new").with_source_output(PortRef::new("a", "out"));
        let result = compute_auto_wire(&ctx);
        assert_eq!(result.connections[0].id.as_str(), "auto_a.out_new.in");
    }

    #[test]
    fn explicit_source_incompatible() {
        let p = patch(
            vec![
                Block::new("f", "Grid").with_output(Slot::new("pos", TypeDesc::field(Domain::Vec2))),
                node("new"),
            ],
            vec![],
        );
        let ctx = AutoWireContext::new(&p, "new").with_source_output(PortRef::new("f", "pos"));
        assert!(compute_auto_wire(&ctx).connections.is_empty());
    }

    #[test]
    fn missing_block() {
        let p = Patch::default();
        let result = compute_auto_wire(&AutoWireContext::new(&p, "ghost"));
        assert!(result.reason.unwrap().contains("does not exist"));
    }
}
