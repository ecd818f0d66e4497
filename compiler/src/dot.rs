// dot.rs — Graphviz DOT output for patches
//
// Renders blocks, edges and bus routes in DOT format suitable for `dot`
// or other Graphviz layout engines.
//
// Preconditions: none. Dangling references are drawn as-is.
// Postconditions: returns a valid DOT string; node and edge order follow
//   the patch, so output is deterministic.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::HashSet;
use std::fmt::Write;

use crate::graph::GraphIndex;
use crate::id::BlockId;
use crate::patch::{Block, BlockRole, Edge, EdgeRole, Patch};

/// Emit the patch as a Graphviz DOT string.
pub fn emit_dot(patch: &Patch) -> String {
    let mut buf = String::new();
    writeln!(buf, "digraph patch {{").unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    let cycle_arcs = cycle_arcs(patch);

    writeln!(buf).unwrap();
    for block in &patch.blocks {
        writeln!(buf, "    {} [{}];", block_node(&block.id), block_attrs(block)).unwrap();
    }

    if !patch.buses.is_empty() {
        writeln!(buf).unwrap();
        for bus in &patch.buses {
            writeln!(
                buf,
                "    {} [shape=hexagon, style=filled, fillcolor=lightyellow, label=\"{}\\n{} ({})\"];",
                bus_node(bus.id.as_str()),
                escape(&bus.name),
                escape(&bus.type_desc.to_string()),
                bus.combine
            )
            .unwrap();
        }
    }

    writeln!(buf).unwrap();
    for edge in &patch.edges {
        let on_cycle = edge.enabled
            && cycle_arcs.contains(&(edge.from.block_id.clone(), edge.to.block_id.clone()));
        writeln!(
            buf,
            "    {} -> {} [{}];",
            block_node(&edge.from.block_id),
            block_node(&edge.to.block_id),
            edge_attrs(edge, on_cycle)
        )
        .unwrap();
    }

    for publisher in &patch.publishers {
        writeln!(
            buf,
            "    {} -> {} [style=dashed, color=darkorange, label=\"{}\"{}];",
            block_node(&publisher.from.block_id),
            bus_node(publisher.bus.as_str()),
            escape(publisher.from.slot_id.as_str()),
            disabled_suffix(publisher.enabled)
        )
        .unwrap();
    }
    for listener in &patch.listeners {
        writeln!(
            buf,
            "    {} -> {} [style=dashed, color=darkorange, label=\"{}\"{}];",
            bus_node(listener.bus.as_str()),
            block_node(&listener.to.block_id),
            escape(listener.to.slot_id.as_str()),
            disabled_suffix(listener.enabled)
        )
        .unwrap();
    }

    writeln!(buf, "}}").unwrap();
    buf
}

/// Edge-graph arcs lying on a detected cycle.
fn cycle_arcs(patch: &Patch) -> HashSet<(BlockId, BlockId)> {
    let mut arcs = HashSet::new();
    for cycle in GraphIndex::build(patch).find_cycles() {
        for (k, from) in cycle.iter().enumerate() {
            let to = &cycle[(k + 1) % cycle.len()];
            arcs.insert((from.clone(), to.clone()));
        }
    }
    arcs
}

fn block_attrs(block: &Block) -> String {
    let label = format!("{}\\n{}", escape(block.id.as_str()), escape(&block.block_type));
    match block.role {
        BlockRole::DefaultProvider => format!(
            "shape=box, style=\"rounded,dashed\", color=gray60, fontcolor=gray40, label=\"{label}\""
        ),
        BlockRole::User => format!("shape=box, style=rounded, label=\"{label}\""),
    }
}

fn edge_attrs(edge: &Edge, on_cycle: bool) -> String {
    let mut attrs = format!(
        "label=\"{}→{}\"",
        escape(edge.from.slot_id.as_str()),
        escape(edge.to.slot_id.as_str())
    );
    match edge.role {
        EdgeRole::User => {}
        EdgeRole::Auto => attrs.push_str(", color=forestgreen"),
        EdgeRole::DefaultProvider => attrs.push_str(", color=gray60"),
    }
    if on_cycle {
        attrs.push_str(", style=bold, color=red");
    }
    attrs.push_str(disabled_suffix(edge.enabled));
    attrs
}

fn disabled_suffix(enabled: bool) -> &'static str {
    if enabled {
        ""
    } else {
        ", style=dotted"
    }
}

fn block_node(id: &BlockId) -> String {
    format!("b_{}", sanitize(id.as_str()))
}

fn bus_node(id: &str) -> String {
    format!("bus_{}", sanitize(id))
}

/// Sanitize an identifier for use as a DOT node ID.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Escape text for a double-quoted DOT label.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
