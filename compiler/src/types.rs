// types.rs — Port type descriptors and the compatibility oracle
//
// `TypeDesc` is the canonical port type. `is_assignable` is the single
// predicate deciding whether an output may feed an input; the UI wiring
// layer, the validator, the auto-wire resolver and the bus checks all call
// it and never re-derive compatibility locally.
//
// Preconditions: none.
// Postconditions: every function is pure and total over all TypeDesc pairs.
// Failure modes: none (incompatibility is a `false`, never an error).
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::patch::{Direction, PortView};

// ── Worlds and domains ──────────────────────────────────────────────────────

/// Evaluation domain of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum World {
    /// Compile-time constant.
    Scalar,
    /// Per-frame function of time.
    Signal,
    /// Per-element function of (seed, count).
    Field,
    /// Structural values such as element domains.
    Special,
    /// Render tree values.
    Render,
    /// Whole compiled programs.
    Program,
    /// Pseudo-world for inspector configuration; materializes as `Scalar`.
    Config,
}

impl World {
    pub const ALL: [World; 7] = [
        World::Scalar,
        World::Signal,
        World::Field,
        World::Special,
        World::Render,
        World::Program,
        World::Config,
    ];

    /// Lower-case key used in provider lookups and messages.
    pub fn key(self) -> &'static str {
        match self {
            World::Scalar => "scalar",
            World::Signal => "signal",
            World::Field => "field",
            World::Special => "special",
            World::Render => "render",
            World::Program => "program",
            World::Config => "config",
        }
    }

    /// Capitalised name used in slot-type strings (`Signal<float>`).
    pub fn type_name(self) -> &'static str {
        match self {
            World::Scalar => "Scalar",
            World::Signal => "Signal",
            World::Field => "Field",
            World::Special => "Special",
            World::Render => "Render",
            World::Program => "Program",
            World::Config => "Config",
        }
    }

    pub fn from_type_name(name: &str) -> Option<World> {
        World::ALL.into_iter().find(|w| w.type_name() == name)
    }

    /// `config` is a pseudo-world: its values are constants.
    pub fn normalized(self) -> World {
        match self {
            World::Config => World::Scalar,
            other => other,
        }
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Payload shape within a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Domain {
    Float,
    Int,
    Bool,
    Time,
    Phase,
    Vec2,
    Vec3,
    Point,
    Color,
    TargetPositions,
    Domain,
    RenderTree,
    RenderNode,
    Render,
    Program,
}

impl Domain {
    pub const ALL: [Domain; 15] = [
        Domain::Float,
        Domain::Int,
        Domain::Bool,
        Domain::Time,
        Domain::Phase,
        Domain::Vec2,
        Domain::Vec3,
        Domain::Point,
        Domain::Color,
        Domain::TargetPositions,
        Domain::Domain,
        Domain::RenderTree,
        Domain::RenderNode,
        Domain::Render,
        Domain::Program,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Domain::Float => "float",
            Domain::Int => "int",
            Domain::Bool => "bool",
            Domain::Time => "time",
            Domain::Phase => "phase",
            Domain::Vec2 => "vec2",
            Domain::Vec3 => "vec3",
            Domain::Point => "point",
            Domain::Color => "color",
            Domain::TargetPositions => "targetPositions",
            Domain::Domain => "domain",
            Domain::RenderTree => "renderTree",
            Domain::RenderNode => "renderNode",
            Domain::Render => "render",
            Domain::Program => "program",
        }
    }

    /// Parse a domain name. `number` is accepted as an alias of `float`.
    pub fn from_name(name: &str) -> Option<Domain> {
        if name == "number" {
            return Some(Domain::Float);
        }
        Domain::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Natural component count of the payload.
    pub fn default_arity(self) -> u8 {
        match self {
            Domain::Vec2 | Domain::Point | Domain::TargetPositions => 2,
            Domain::Vec3 => 3,
            Domain::Color => 4,
            _ => 1,
        }
    }

    fn default_category(self) -> TypeCategory {
        match self {
            Domain::Domain
            | Domain::RenderTree
            | Domain::RenderNode
            | Domain::Render
            | Domain::Program => TypeCategory::Internal,
            _ => TypeCategory::Core,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a type is user-facing (`core`) or plumbing (`internal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Core,
    Internal,
}

// ── TypeDesc ────────────────────────────────────────────────────────────────

/// Canonical port type.
///
/// Serialized as its slot-type string (`"Field<vec2:position>"`); see
/// [`crate::slot_type`] for the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeDesc {
    pub world: World,
    pub domain: Domain,
    pub semantics: Option<String>,
    pub category: TypeCategory,
    pub bus_eligible: bool,
    pub bundle_arity: u8,
}

impl TypeDesc {
    /// Build a descriptor with the domain's natural arity and category.
    /// Core signal and field types are bus-eligible.
    pub fn new(world: World, domain: Domain) -> Self {
        let category = domain.default_category();
        TypeDesc {
            world,
            domain,
            semantics: None,
            category,
            bus_eligible: category == TypeCategory::Core
                && matches!(world, World::Signal | World::Field),
            bundle_arity: domain.default_arity(),
        }
    }

    pub fn signal(domain: Domain) -> Self {
        Self::new(World::Signal, domain)
    }

    pub fn field(domain: Domain) -> Self {
        Self::new(World::Field, domain)
    }

    pub fn scalar(domain: Domain) -> Self {
        Self::new(World::Scalar, domain)
    }

    pub fn with_semantics(mut self, semantics: impl Into<String>) -> Self {
        self.semantics = Some(semantics.into());
        self
    }

    pub fn with_arity(mut self, arity: u8) -> Self {
        self.bundle_arity = arity;
        self
    }

    pub fn with_bus_eligible(mut self, eligible: bool) -> Self {
        self.bus_eligible = eligible;
        self
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}", self.world.type_name(), self.domain)?;
        if let Some(sem) = &self.semantics {
            write!(f, ":{}", sem)?;
        }
        write!(f, ">")?;
        if self.bundle_arity != self.domain.default_arity() {
            write!(f, "[{}]", self.bundle_arity)?;
        }
        Ok(())
    }
}

impl From<TypeDesc> for String {
    fn from(desc: TypeDesc) -> String {
        desc.to_string()
    }
}

impl TryFrom<String> for TypeDesc {
    type Error = crate::error::PatchError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        crate::slot_type::parse_slot_type(&s)
    }
}

impl std::str::FromStr for TypeDesc {
    type Err = crate::error::PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::slot_type::parse_slot_type(s)
    }
}

// ── Compatibility tables ────────────────────────────────────────────────────

/// Domains interchangeable within one world (subject to the arity veto).
const EQUIVALENCE_SETS: &[&[Domain]] = &[
    &[Domain::Point, Domain::Vec2],
    &[Domain::Float, Domain::Int],
    &[Domain::RenderTree, Domain::RenderNode, Domain::Render],
];

/// Declared one-way coercions. Never symmetric.
fn has_one_way_coercion(from: &TypeDesc, to: &TypeDesc) -> bool {
    match ((from.world, from.domain), (to.world, to.domain)) {
        ((World::Field, Domain::TargetPositions), (World::Field, Domain::Vec2)) => true,
        ((World::Signal, Domain::Phase), (World::Signal, Domain::Float)) => true,
        ((World::Signal, Domain::Time), (World::Signal, Domain::Float)) => true,
        ((World::Scalar, a), (World::Config, b)) => a == b,
        _ => false,
    }
}

fn domains_equivalent(a: Domain, b: Domain) -> bool {
    a == b
        || EQUIVALENCE_SETS
            .iter()
            .any(|set| set.contains(&a) && set.contains(&b))
}

// ── Oracle ──────────────────────────────────────────────────────────────────

/// Can a value of type `from` be written into a port of type `to`?
///
/// First match wins:
/// 1. same world, domain and arity;
/// 2. a declared one-way coercion (arity must still agree);
/// 3. different worlds are incompatible;
/// 4. equivalent domains, provided the arity agrees;
/// 5. otherwise incompatible.
pub fn is_assignable(from: &TypeDesc, to: &TypeDesc) -> bool {
    if from.world == to.world
        && from.domain == to.domain
        && from.bundle_arity == to.bundle_arity
    {
        return true;
    }
    if has_one_way_coercion(from, to) {
        return from.bundle_arity == to.bundle_arity;
    }
    if from.world != to.world {
        return false;
    }
    if domains_equivalent(from.domain, to.domain) {
        return from.bundle_arity == to.bundle_arity;
    }
    false
}

/// Slot-level check: `from` must be an output, `to` an input, and the
/// output's type assignable to the input's.
pub fn are_slot_types_compatible(from: &PortView<'_>, to: &PortView<'_>) -> bool {
    from.direction == Direction::Output
        && to.direction == Direction::Input
        && is_assignable(&from.slot.type_desc, &to.slot.type_desc)
}

/// Buses only carry user-facing types explicitly marked eligible.
pub fn is_bus_eligible(desc: &TypeDesc) -> bool {
    desc.category == TypeCategory::Core && desc.bus_eligible
}

fn components(n: u8) -> String {
    if n == 1 {
        "1 component".to_string()
    } else {
        format!("{} components", n)
    }
}

/// Human-readable reason why `from` cannot feed `to`.
pub fn get_type_mismatch_message(from: &TypeDesc, to: &TypeDesc) -> String {
    if is_assignable(from, to) {
        return format!("{} is assignable to {}", from, to);
    }
    if from.world != to.world && !has_one_way_coercion(from, to) {
        return format!(
            "cannot connect {} to {}: different worlds ({} vs {})",
            from, to, from.world, to.world
        );
    }
    if from.bundle_arity != to.bundle_arity {
        return format!(
            "cannot connect {} to {}: different component counts ({} vs {})",
            from,
            to,
            components(from.bundle_arity),
            components(to.bundle_arity)
        );
    }
    format!(
        "cannot connect {} to {}: incompatible domains ({} vs {})",
        from, to, from.domain, to.domain
    )
}

/// Suggest an adapter the user can insert between `from` and `to`.
/// `None` when the types already connect or no adapter is known.
pub fn get_compatibility_hint(from: &TypeDesc, to: &TypeDesc) -> Option<String> {
    if is_assignable(from, to) {
        return None;
    }
    match (from.world.normalized(), to.world.normalized()) {
        (World::Signal, World::Field) => Some(
            "insert a Broadcast block to lift the signal into a per-element field".to_string(),
        ),
        (World::Field, World::Signal) => {
            Some("insert a Reduce block to collapse the field into a signal".to_string())
        }
        (World::Scalar, World::Signal) => {
            Some("promote the constant with a Constant signal block".to_string())
        }
        (a, b) if a == b && from.bundle_arity != to.bundle_arity => Some(format!(
            "no lossless conversion from {} to {}; insert an explicit pack or swizzle block",
            components(from.bundle_arity),
            components(to.bundle_arity)
        )),
        (a, b) if a == b => Some(format!(
            "insert a conversion from {} to {}",
            from.domain, to.domain
        )),
        _ => None,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
