// patch.rs — Patch snapshot data model
//
// A `Patch` is an immutable snapshot of the editor document: blocks with
// their declared slots, port-to-port edges, buses, and the publisher /
// listener records routing ports through buses. Every pass takes `&Patch`
// and returns a new `Patch`; nothing here mutates a snapshot after it is
// built.
//
// The JSON shape mirrors the editor store's document so the CLI and the
// tests can load snapshots directly; it is not a versioned file format.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PatchError, PatchResult};
use crate::id::{BlockId, BusId, EdgeId, RouteId, SlotId};
use crate::types::{TypeDesc, World};

// ── Literals and default sources ────────────────────────────────────────────

/// A literal parameter or default value.
///
/// Numeric vectors carry their components in order: 2 → vec2, 3 → vec3,
/// 4 → rgba color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    Vector(Vec<f64>),
    Text(String),
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Number(n) => Some(*n),
            Literal::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Literal::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Implicit value for an input, used only while the input is unconnected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultSource {
    pub world: World,
    pub value: Literal,
}

// ── Slots and blocks ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// A declared port. Direction is implied by the block list holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    #[serde(rename = "type")]
    pub type_desc: TypeDesc,
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_source: Option<DefaultSource>,
}

impl Slot {
    pub fn new(id: impl Into<SlotId>, type_desc: TypeDesc) -> Self {
        Slot {
            id: id.into(),
            type_desc,
            default_source: None,
        }
    }

    pub fn with_default(mut self, world: World, value: Literal) -> Self {
        self.default_source = Some(DefaultSource { world, value });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockRole {
    #[default]
    User,
    DefaultProvider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Literal>,
    #[serde(default)]
    pub inputs: Vec<Slot>,
    #[serde(default)]
    pub outputs: Vec<Slot>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default)]
    pub role: BlockRole,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_true() -> bool {
    true
}

impl Block {
    pub fn new(id: impl Into<BlockId>, block_type: impl Into<String>) -> Self {
        Block {
            id: id.into(),
            block_type: block_type.into(),
            params: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            hidden: false,
            role: BlockRole::User,
        }
    }

    pub fn with_input(mut self, slot: Slot) -> Self {
        self.inputs.push(slot);
        self
    }

    pub fn with_output(mut self, slot: Slot) -> Self {
        self.outputs.push(slot);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Literal) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn input(&self, id: &SlotId) -> Option<&Slot> {
        self.inputs.iter().find(|s| &s.id == id)
    }

    pub fn output(&self, id: &SlotId) -> Option<&Slot> {
        self.outputs.iter().find(|s| &s.id == id)
    }

    /// Find a slot in either list. Inputs shadow outputs on an id clash.
    pub fn find_slot(&self, id: &SlotId) -> Option<(Direction, &Slot)> {
        self.input(id)
            .map(|s| (Direction::Input, s))
            .or_else(|| self.output(id).map(|s| (Direction::Output, s)))
    }

    pub fn port(&self, slot: &Slot) -> PortRef {
        PortRef {
            block_id: self.id.clone(),
            slot_id: slot.id.clone(),
        }
    }
}

// ── Ports and edges ─────────────────────────────────────────────────────────

/// Address of a slot on a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    #[serde(rename = "block")]
    pub block_id: BlockId,
    #[serde(rename = "slot")]
    pub slot_id: SlotId,
}

impl PortRef {
    pub fn new(block: impl Into<BlockId>, slot: impl Into<SlotId>) -> Self {
        PortRef {
            block_id: block.into(),
            slot_id: slot.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block_id, self.slot_id)
    }
}

/// A resolved port: the owning block, the slot and its direction.
#[derive(Debug, Clone, Copy)]
pub struct PortView<'a> {
    pub block: &'a Block,
    pub slot: &'a Slot,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeRole {
    #[default]
    User,
    Auto,
    DefaultProvider,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: PortRef,
    pub to: PortRef,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub role: EdgeRole,
}

impl Edge {
    pub fn new(id: impl Into<EdgeId>, from: PortRef, to: PortRef) -> Self {
        Edge {
            id: id.into(),
            from,
            to,
            enabled: true,
            role: EdgeRole::User,
        }
    }

    pub fn with_role(mut self, role: EdgeRole) -> Self {
        self.role = role;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ── Buses ───────────────────────────────────────────────────────────────────

/// How a bus folds its producers into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    Last,
    Sum,
    Average,
    Max,
    Min,
}

impl fmt::Display for CombineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CombineMode::Last => "last",
            CombineMode::Sum => "sum",
            CombineMode::Average => "average",
            CombineMode::Max => "max",
            CombineMode::Min => "min",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    #[serde(rename = "type")]
    pub type_desc: TypeDesc,
    pub combine: CombineMode,
    #[serde(rename = "default")]
    pub default_value: Literal,
}

impl Bus {
    pub fn new(
        id: impl Into<BusId>,
        type_desc: TypeDesc,
        combine: CombineMode,
        default_value: Literal,
    ) -> Self {
        let id = id.into();
        Bus {
            name: id.to_string(),
            id,
            type_desc,
            combine,
            default_value,
        }
    }
}

/// Routes an output port into a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub id: RouteId,
    pub bus: BusId,
    pub from: PortRef,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "sortKey", default)]
    pub sort_key: i64,
}

impl Publisher {
    pub fn new(id: impl Into<RouteId>, bus: impl Into<BusId>, from: PortRef, sort_key: i64) -> Self {
        Publisher {
            id: id.into(),
            bus: bus.into(),
            from,
            enabled: true,
            sort_key,
        }
    }
}

/// Routes a bus into an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    pub id: RouteId,
    pub bus: BusId,
    pub to: PortRef,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Listener {
    pub fn new(id: impl Into<RouteId>, bus: impl Into<BusId>, to: PortRef) -> Self {
        Listener {
            id: id.into(),
            bus: bus.into(),
            to,
            enabled: true,
        }
    }
}

// ── Patch ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub buses: Vec<Bus>,
    #[serde(default)]
    pub publishers: Vec<Publisher>,
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

impl Patch {
    pub fn from_json_str(source: &str) -> PatchResult<Patch> {
        serde_json::from_str(source).map_err(|e| PatchError::json("patch", e))
    }

    pub fn load(path: &Path) -> PatchResult<Patch> {
        let source = std::fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
        serde_json::from_str(&source)
            .map_err(|e| PatchError::json(format!("patch {}", path.display()), e))
    }

    /// Compact JSON with a stable field order; used for fingerprints.
    pub fn canonical_json(&self) -> PatchResult<String> {
        serde_json::to_string(self).map_err(|e| PatchError::json("patch canonical form", e))
    }

    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn bus(&self, id: &BusId) -> Option<&Bus> {
        self.buses.iter().find(|b| &b.id == id)
    }

    /// Resolve a port reference against the snapshot.
    pub fn port(&self, port: &PortRef) -> Option<PortView<'_>> {
        let block = self.block(&port.block_id)?;
        let (direction, slot) = block.find_slot(&port.slot_id)?;
        Some(PortView {
            block,
            slot,
            direction,
        })
    }

    pub fn enabled_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.enabled)
    }

    /// Enabled edges terminating at `port`.
    pub fn incoming_edges<'a>(&'a self, port: &'a PortRef) -> impl Iterator<Item = &'a Edge> {
        self.enabled_edges().filter(move |e| &e.to == port)
    }

    /// An input is connected when an enabled edge or listener feeds it.
    pub fn is_input_connected(&self, port: &PortRef) -> bool {
        self.incoming_edges(port).next().is_some()
            || self
                .listeners
                .iter()
                .any(|l| l.enabled && &l.to == port)
    }

    /// An output is consumed when an enabled edge or publisher reads it.
    pub fn is_output_consumed(&self, port: &PortRef) -> bool {
        self.enabled_edges().any(|e| &e.from == port)
            || self
                .publishers
                .iter()
                .any(|p| p.enabled && &p.from == port)
    }
}
