// materialize.rs — Default-source materialization (pass 0)
//
// Turns implicit per-input defaults into explicit graph structure: every
// unconnected input that declares a default source gets a hidden provider
// block and one edge from it. After this pass every input that carries a
// value is backed by an edge, so later passes never consult defaults.
//
// Preconditions: none.
// Postconditions: the input snapshot is untouched; the output contains it
//   verbatim followed by the synthesized blocks and edges, in block/slot
//   declaration order. Re-running on the output adds nothing.
// Failure modes: none. Unmapped (world, domain) pairs fall back to a float
//   signal provider with `W_DEFAULT_PROVIDER_FALLBACK`.
// Side effects: `tracing` warning on fallback.

use std::collections::HashSet;

use crate::diag::{codes, DiagTarget, Diagnostic};
use crate::id::{default_provider_edge_id, default_provider_id, BlockId, EdgeId};
use crate::patch::{Block, BlockRole, DefaultSource, Edge, EdgeRole, Patch, PortRef, Slot};
use crate::registry::{BlockDefinition, Registry, Subcategory};
use crate::types::{Domain, TypeDesc, World};

// ── Provider table ──────────────────────────────────────────────────────────

/// Built-in constant provider block types, one per supported
/// (world, domain) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    ScalarFloat,
    ScalarInt,
    ScalarBool,
    ScalarVec2,
    ScalarColor,
    SignalFloat,
    SignalInt,
    SignalBool,
    SignalVec2,
    SignalColor,
    SignalPhase,
    SignalTime,
    FieldFloat,
    FieldInt,
    FieldBool,
    FieldVec2,
    FieldColor,
}

/// Output slot id of every provider block.
pub const PROVIDER_OUTPUT: &str = "out";

impl ProviderKind {
    pub const ALL: [ProviderKind; 17] = [
        ProviderKind::ScalarFloat,
        ProviderKind::ScalarInt,
        ProviderKind::ScalarBool,
        ProviderKind::ScalarVec2,
        ProviderKind::ScalarColor,
        ProviderKind::SignalFloat,
        ProviderKind::SignalInt,
        ProviderKind::SignalBool,
        ProviderKind::SignalVec2,
        ProviderKind::SignalColor,
        ProviderKind::SignalPhase,
        ProviderKind::SignalTime,
        ProviderKind::FieldFloat,
        ProviderKind::FieldInt,
        ProviderKind::FieldBool,
        ProviderKind::FieldVec2,
        ProviderKind::FieldColor,
    ];

    /// Provider for an input of the given world and domain. `config` inputs
    /// are served by scalar providers; `point` by vec2 ones.
    pub fn select(world: World, domain: Domain) -> Option<ProviderKind> {
        use ProviderKind::*;
        let kind = match (world.normalized(), domain) {
            (World::Scalar, Domain::Float) => ScalarFloat,
            (World::Scalar, Domain::Int) => ScalarInt,
            (World::Scalar, Domain::Bool) => ScalarBool,
            (World::Scalar, Domain::Vec2 | Domain::Point) => ScalarVec2,
            (World::Scalar, Domain::Color) => ScalarColor,
            (World::Signal, Domain::Float) => SignalFloat,
            (World::Signal, Domain::Int) => SignalInt,
            (World::Signal, Domain::Bool) => SignalBool,
            (World::Signal, Domain::Vec2 | Domain::Point) => SignalVec2,
            (World::Signal, Domain::Color) => SignalColor,
            (World::Signal, Domain::Phase) => SignalPhase,
            (World::Signal, Domain::Time) => SignalTime,
            (World::Field, Domain::Float) => FieldFloat,
            (World::Field, Domain::Int) => FieldInt,
            (World::Field, Domain::Bool) => FieldBool,
            (World::Field, Domain::Vec2 | Domain::Point) => FieldVec2,
            (World::Field, Domain::Color) => FieldColor,
            _ => return None,
        };
        Some(kind)
    }

    pub fn from_block_type(block_type: &str) -> Option<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.block_type() == block_type)
    }

    pub fn block_type(self) -> &'static str {
        use ProviderKind::*;
        match self {
            ScalarFloat => "DSConstScalarFloat",
            ScalarInt => "DSConstScalarInt",
            ScalarBool => "DSConstScalarBool",
            ScalarVec2 => "DSConstScalarVec2",
            ScalarColor => "DSConstScalarColor",
            SignalFloat => "DSConstSignalFloat",
            SignalInt => "DSConstSignalInt",
            SignalBool => "DSConstSignalBool",
            SignalVec2 => "DSConstSignalVec2",
            SignalColor => "DSConstSignalColor",
            SignalPhase => "DSConstSignalPhase",
            SignalTime => "DSConstSignalTime",
            FieldFloat => "DSConstFieldFloat",
            FieldInt => "DSConstFieldInt",
            FieldBool => "DSConstFieldBool",
            FieldVec2 => "DSConstFieldVec2",
            FieldColor => "DSConstFieldColor",
        }
    }

    /// The provider's declared output type.
    pub fn output_type(self) -> TypeDesc {
        use ProviderKind::*;
        let (world, domain) = match self {
            ScalarFloat => (World::Scalar, Domain::Float),
            ScalarInt => (World::Scalar, Domain::Int),
            ScalarBool => (World::Scalar, Domain::Bool),
            ScalarVec2 => (World::Scalar, Domain::Vec2),
            ScalarColor => (World::Scalar, Domain::Color),
            SignalFloat => (World::Signal, Domain::Float),
            SignalInt => (World::Signal, Domain::Int),
            SignalBool => (World::Signal, Domain::Bool),
            SignalVec2 => (World::Signal, Domain::Vec2),
            SignalColor => (World::Signal, Domain::Color),
            SignalPhase => (World::Signal, Domain::Phase),
            SignalTime => (World::Signal, Domain::Time),
            FieldFloat => (World::Field, Domain::Float),
            FieldInt => (World::Field, Domain::Int),
            FieldBool => (World::Field, Domain::Bool),
            FieldVec2 => (World::Field, Domain::Vec2),
            FieldColor => (World::Field, Domain::Color),
        };
        TypeDesc::new(world, domain)
    }

    /// Registry definition for this provider type.
    pub fn definition(self) -> BlockDefinition {
        BlockDefinition::new(self.block_type(), Subcategory::DefaultSource)
            .with_output(Slot::new(PROVIDER_OUTPUT, self.output_type()))
    }
}

// ── Pass ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MaterializeResult {
    pub patch: Patch,
    /// Fallback warnings, one per affected input.
    pub diagnostics: Vec<Diagnostic>,
}

/// Back every unconnected defaulted input with a hidden provider block and
/// an edge.
///
/// An already-present provider block (same derived id) is reused, and only
/// a missing edge is added, so the pass is idempotent.
#[tracing::instrument(level = "debug", skip_all, fields(blocks = patch.blocks.len()))]
pub fn materialize_default_sources(patch: &Patch) -> MaterializeResult {
    let mut block_ids: HashSet<BlockId> = patch.blocks.iter().map(|b| b.id.clone()).collect();
    let mut edge_ids: HashSet<EdgeId> = patch.edges.iter().map(|e| e.id.clone()).collect();

    let mut new_blocks: Vec<Block> = Vec::new();
    let mut new_edges: Vec<Edge> = Vec::new();
    let mut diagnostics = Vec::new();

    for block in &patch.blocks {
        for slot in &block.inputs {
            let Some(default) = &slot.default_source else {
                continue;
            };
            let target = block.port(slot);
            if patch.is_input_connected(&target) {
                continue;
            }

            let provider_id = default_provider_id(&block.id, &slot.id);
            let edge_id = default_provider_edge_id(&provider_id);

            let world = slot.type_desc.world;
            if default.world.normalized() != world.normalized() {
                tracing::debug!(
                    port = %target,
                    declared = %default.world,
                    input = %world,
                    "default world differs from input; providing in the input's world"
                );
            }
            let kind = ProviderKind::select(world, slot.type_desc.domain);
            if kind.is_none() {
                tracing::warn!(
                    port = %target,
                    world = %world,
                    domain = %slot.type_desc.domain,
                    "no default provider for type; using float signal"
                );
                diagnostics.push(
                    Diagnostic::warning(
                        codes::W_DEFAULT_PROVIDER_FALLBACK,
                        DiagTarget::Port {
                            port: target.clone(),
                        },
                        format!(
                            "no default provider for {} {}; using {}",
                            world,
                            slot.type_desc.domain,
                            ProviderKind::SignalFloat.block_type()
                        ),
                    )
                    .with_hint("connect the input explicitly"),
                );
            }

            if block_ids.insert(provider_id.clone()) {
                new_blocks.push(provider_block(
                    provider_id.clone(),
                    kind.unwrap_or(ProviderKind::SignalFloat),
                    default,
                    slot,
                ));
            }
            if edge_ids.insert(edge_id.clone()) {
                new_edges.push(
                    Edge::new(
                        edge_id,
                        PortRef::new(provider_id, PROVIDER_OUTPUT),
                        target,
                    )
                    .with_role(EdgeRole::DefaultProvider),
                );
            }
        }
    }

    tracing::debug!(
        providers = new_blocks.len(),
        edges = new_edges.len(),
        "materialized default sources"
    );

    let mut out = patch.clone();
    out.blocks.extend(new_blocks);
    out.edges.extend(new_edges);
    MaterializeResult {
        patch: out,
        diagnostics,
    }
}

/// Pass 0 over the registry's view of `patch`: blocks of known types get
/// their declared slots and defaults from their definitions first. Blocks
/// of unknown types keep only what they declare themselves.
pub fn materialize_with_registry(patch: &Patch, registry: &Registry) -> MaterializeResult {
    materialize_default_sources(&registry.resolve_patch(patch))
}

/// The provider's output carries the input's own type (with `config`
/// normalized to `scalar`), so the new edge type-checks whatever world the
/// default declares; fallbacks keep the provider's native type.
fn provider_block(id: BlockId, kind: ProviderKind, default: &DefaultSource, input: &Slot) -> Block {
    let world = input.type_desc.world;
    let output_type = if ProviderKind::select(world, input.type_desc.domain) == Some(kind) {
        TypeDesc {
            world: world.normalized(),
            ..input.type_desc.clone()
        }
    } else {
        kind.output_type()
    };
    let mut block = Block::new(id, kind.block_type())
        .with_param("value", default.value.clone())
        .with_output(Slot::new(PROVIDER_OUTPUT, output_type));
    block.hidden = true;
    block.role = BlockRole::DefaultProvider;
    block
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Literal;
    use crate::types::is_assignable;

    fn osc() -> Block {
        Block::new("osc", "Oscillator")
            .with_input(
                Slot::new("freq", TypeDesc::signal(Domain::Float))
                    .with_default(World::Signal, Literal::Number(1.0)),
            )
            .with_input(
                Slot::new("amp", TypeDesc::signal(Domain::Float))
                    .with_default(World::Signal, Literal::Number(0.5)),
            )
            .with_input(
                Slot::new("tint", TypeDesc::field(Domain::Color))
                    .with_default(World::Field, Literal::Vector(vec![1.0, 1.0, 1.0, 1.0])),
            )
            .with_input(Slot::new("phase", TypeDesc::signal(Domain::Phase)))
            .with_output(Slot::new("out", TypeDesc::signal(Domain::Float)))
    }

    fn ids<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> Vec<String> {
        items.into_iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn three_defaults_three_providers() {
        let patch = Patch {
            blocks: vec![osc()],
            ..Patch::default()
        };
        let result = materialize_default_sources(&patch);
        assert!(result.diagnostics.is_empty());
        let out = result.patch;
        assert_eq!(
            ids(out.blocks.iter().map(|b| &b.id)),
            vec!["osc", "osc_default_freq", "osc_default_amp", "osc_default_tint"]
        );
        assert_eq!(
            ids(out.edges.iter().map(|e| &e.id)),
            vec![
                "osc_default_freq_edge",
                "osc_default_amp_edge",
                "osc_default_tint_edge"
            ]
        );
        for edge in &out.edges {
            assert_eq!(edge.role, EdgeRole::DefaultProvider);
            let from = out.port(&edge.from).unwrap();
            let to = out.port(&edge.to).unwrap();
            assert!(is_assignable(&from.slot.type_desc, &to.slot.type_desc));
        }
        let provider = out.block(&BlockId::from("osc_default_tint")).unwrap();
        assert!(provider.hidden);
        assert_eq!(provider.role, BlockRole::DefaultProvider);
        assert_eq!(provider.block_type, "DSConstFieldColor");
        assert_eq!(
            provider.params.get("value"),
            Some(&Literal::Vector(vec![1.0, 1.0, 1.0, 1.0]))
        );
    }

    #[test]
    fn input_is_not_mutated() {
        let patch = Patch {
            blocks: vec![osc()],
            ..Patch::default()
        };
        let before = patch.clone();
        let _ = materialize_default_sources(&patch);
        assert_eq!(patch, before);
    }

    #[test]
    fn idempotent() {
        let patch = Patch {
            blocks: vec![osc()],
            ..Patch::default()
        };
        let once = materialize_default_sources(&patch).patch;
        let twice = materialize_default_sources(&once).patch;
        assert_eq!(once, twice);
    }

    #[test]
    fn connected_inputs_are_skipped() {
        let lfo = Block::new("lfo", "Lfo").with_output(Slot::new("out", TypeDesc::signal(Domain::Float)));
        let patch = Patch {
            blocks: vec![osc(), lfo],
            edges: vec![Edge::new(
                "e1",
                PortRef::new("lfo", "out"),
                PortRef::new("osc", "freq"),
            )],
            ..Patch::default()
        };
        let out = materialize_default_sources(&patch).patch;
        assert!(out.block(&BlockId::from("osc_default_freq")).is_none());
        assert!(out.block(&BlockId::from("osc_default_amp")).is_some());
    }

    #[test]
    fn disabled_edge_does_not_count_as_connection() {
        let lfo = Block::new("lfo", "Lfo").with_output(Slot::new("out", TypeDesc::signal(Domain::Float)));
        let patch = Patch {
            blocks: vec![osc(), lfo],
            edges: vec![Edge::new(
                "e1",
                PortRef::new("lfo", "out"),
                PortRef::new("osc", "freq"),
            )
            .disabled()],
            ..Patch::default()
        };
        let out = materialize_default_sources(&patch).patch;
        assert!(out.block(&BlockId::from("osc_default_freq")).is_some());
    }

    #[test]
    fn existing_provider_is_reused() {
        let patch = Patch {
            blocks: vec![osc()],
            ..Patch::default()
        };
        let mut once = materialize_default_sources(&patch).patch;
        // Drop one provider edge; the block stays.
        once.edges.retain(|e| e.id.as_str() != "osc_default_amp_edge");
        let again = materialize_default_sources(&once).patch;
        assert_eq!(again.blocks.len(), once.blocks.len());
        assert_eq!(again.edges.len(), once.edges.len() + 1);
        assert_eq!(again.edges.last().unwrap().id.as_str(), "osc_default_amp_edge");
    }

    #[test]
    fn config_inputs_get_scalar_providers() {
        let block = Block::new("b", "Thing").with_input(
            Slot::new("count", TypeDesc::new(World::Config, Domain::Int))
                .with_default(World::Config, Literal::Number(3.0)),
        );
        let out = materialize_default_sources(&Patch {
            blocks: vec![block],
            ..Patch::default()
        })
        .patch;
        let provider = out.block(&BlockId::from("b_default_count")).unwrap();
        assert_eq!(provider.block_type, "DSConstScalarInt");
        assert_eq!(
            provider.outputs[0].type_desc,
            TypeDesc::scalar(Domain::Int)
        );
    }

    #[test]
    fn provider_follows_input_world_not_default_world() {
        let block = Block::new("osc", "Oscillator").with_input(
            Slot::new("amp", TypeDesc::signal(Domain::Float))
                .with_default(World::Scalar, Literal::Number(1.0)),
        );
        let result = materialize_default_sources(&Patch {
            blocks: vec![block],
            ..Patch::default()
        });
        assert!(result.diagnostics.is_empty());
        let provider = result
            .patch
            .block(&BlockId::from("osc_default_amp"))
            .unwrap();
        assert_eq!(provider.block_type, "DSConstSignalFloat");
        assert_eq!(provider.outputs[0].type_desc, TypeDesc::signal(Domain::Float));

        let mut registry = Registry::with_default_providers();
        registry
            .register(BlockDefinition::new("TimeRoot", Subcategory::TimeRoot), "test")
            .unwrap();
        registry
            .register(BlockDefinition::new("Oscillator", Subcategory::Signal), "test")
            .unwrap();
        let mut patch = result.patch;
        patch.blocks.push(Block::new("time", "TimeRoot"));
        let validation = crate::validate::validate_all(&patch, &registry);
        assert!(validation.ok, "{:#?}", validation.errors);
    }

    #[test]
    fn registry_defaults_back_bare_blocks() {
        let mut registry = Registry::with_default_providers();
        registry
            .register(
                BlockDefinition::new("Oscillator", Subcategory::Signal).with_input(
                    Slot::new("amp", TypeDesc::signal(Domain::Float))
                        .with_default(World::Signal, Literal::Number(0.5)),
                ),
                "test",
            )
            .unwrap();
        let patch = Patch {
            blocks: vec![Block::new("osc", "Oscillator"), Block::new("m", "Mystery")],
            ..Patch::default()
        };
        let out = materialize_with_registry(&patch, &registry).patch;
        assert_eq!(
            ids(out.blocks.iter().map(|b| &b.id)),
            vec!["osc", "m", "osc_default_amp"]
        );
        assert_eq!(out.blocks[0].inputs.len(), 1);
        assert!(out.blocks[1].inputs.is_empty());
    }

    #[test]
    fn unmapped_type_falls_back_with_warning() {
        let block = Block::new("r", "Renderer").with_input(
            Slot::new("tree", TypeDesc::new(World::Render, Domain::RenderTree))
                .with_default(World::Render, Literal::Text("empty".into())),
        );
        let result = materialize_default_sources(&Patch {
            blocks: vec![block],
            ..Patch::default()
        });
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(
            result.diagnostics[0].code,
            Some(codes::W_DEFAULT_PROVIDER_FALLBACK)
        );
        let provider = result
            .patch
            .block(&BlockId::from("r_default_tree"))
            .unwrap();
        assert_eq!(provider.block_type, "DSConstSignalFloat");
        assert_eq!(provider.outputs[0].type_desc, TypeDesc::signal(Domain::Float));
    }

    #[test]
    fn provider_table_round_trips_block_types() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::from_block_type(kind.block_type()), Some(kind));
            let out = kind.output_type();
            assert_eq!(ProviderKind::select(out.world, out.domain), Some(kind));
        }
    }
}
