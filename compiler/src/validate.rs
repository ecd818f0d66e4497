// validate.rs — Structural and type validation of a patch snapshot
//
// A fixed battery of rules run over one snapshot. Every rule runs on every
// call; nothing short-circuits, so the editor sees the complete list after
// each mutation.
//
// Preconditions: none. Unknown block types are skipped with a warning.
// Postconditions: diagnostics are grouped by rule and ordered by patch
//   declaration order within a rule.
// Failure modes: none (all problems are diagnostics).
// Side effects: none.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::bus::supports_mode;
use crate::diag::{codes, DiagTarget, Diagnostic};
use crate::graph::GraphIndex;
use crate::id::BlockId;
use crate::materialize::ProviderKind;
use crate::patch::{Block, BlockRole, Direction, Patch, PortRef, PortView};
use crate::registry::{Registry, Subcategory};
use crate::types::{get_compatibility_hint, get_type_mismatch_message, is_assignable, is_bus_eligible};

// ── Result ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            diagnostics.into_iter().partition(Diagnostic::is_error);
        ValidationResult {
            ok: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Errors first, then warnings.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn has_code(&self, code: crate::diag::DiagCode) -> bool {
        self.diagnostics().any(|d| d.code == Some(code))
    }
}

// ── Validator ───────────────────────────────────────────────────────────────

struct Validator<'a> {
    patch: &'a Patch,
    registry: &'a Registry,
    blocks: HashMap<&'a BlockId, &'a Block>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Validator<'a> {
    fn new(patch: &'a Patch, registry: &'a Registry) -> Self {
        let mut blocks = HashMap::with_capacity(patch.blocks.len());
        for block in &patch.blocks {
            blocks.entry(&block.id).or_insert(block);
        }
        Validator {
            patch,
            registry,
            blocks,
            diagnostics: Vec::new(),
        }
    }

    fn port(&self, port: &PortRef) -> Option<PortView<'a>> {
        let block = *self.blocks.get(&port.block_id)?;
        let (direction, slot) = block.find_slot(&port.slot_id)?;
        Some(PortView {
            block,
            slot,
            direction,
        })
    }

    /// Registry subcategory, with the built-in providers always known.
    fn subcategory(&self, block: &Block) -> Option<Subcategory> {
        self.registry.subcategory(&block.block_type).or_else(|| {
            ProviderKind::from_block_type(&block.block_type).map(|_| Subcategory::DefaultSource)
        })
    }

    fn is_default_provider(&self, block: &Block) -> bool {
        block.role == BlockRole::DefaultProvider
            || self.subcategory(block) == Some(Subcategory::DefaultSource)
    }

    fn run(mut self) -> Vec<Diagnostic> {
        let graph = GraphIndex::build(self.patch);
        self.check_block_types();
        self.check_time_roots();
        self.check_endpoints();
        self.check_exclusive_writers();
        self.check_edge_types();
        self.check_buses();
        self.check_cycles(&graph);
        self.diagnostics
    }

    // ── Block types ─────────────────────────────────────────────────────

    fn check_block_types(&mut self) {
        for block in &self.patch.blocks {
            if self.subcategory(block).is_none() {
                tracing::warn!(block = %block.id, block_type = %block.block_type, "unknown block type");
                self.diagnostics.push(Diagnostic::warning(
                    codes::W_UNKNOWN_BLOCK_TYPE,
                    DiagTarget::Block {
                        block: block.id.clone(),
                    },
                    format!(
                        "block '{}' has unknown type '{}'; skipped",
                        block.id, block.block_type
                    ),
                ));
            }
        }
    }

    // ── Time root ───────────────────────────────────────────────────────

    fn check_time_roots(&mut self) {
        let patch = self.patch;
        let roots: Vec<&'a Block> = patch
            .blocks
            .iter()
            .filter(|b| self.subcategory(b) == Some(Subcategory::TimeRoot))
            .collect();

        match roots.len() {
            0 => self.diagnostics.push(
                Diagnostic::error(
                    codes::E_TIME_ROOT_MISSING,
                    DiagTarget::Graph,
                    "patch has no time root",
                )
                .with_hint("add exactly one time root block"),
            ),
            1 => {}
            n => {
                let mut diag = Diagnostic::error(
                    codes::E_TIME_ROOT_MULTIPLE,
                    DiagTarget::Graph,
                    format!("patch has {n} time roots; exactly one is allowed"),
                );
                for root in &roots {
                    diag = diag.with_related(
                        DiagTarget::Block {
                            block: root.id.clone(),
                        },
                        "time root",
                    );
                }
                self.diagnostics.push(diag);
            }
        }

        for root in roots {
            self.check_time_root_purity(root);
        }
    }

    /// A time root may only be fed by default providers.
    fn check_time_root_purity(&mut self, root: &'a Block) {
        let patch = self.patch;
        for slot in &root.inputs {
            let port = root.port(slot);
            for edge in patch.incoming_edges(&port) {
                let Some(source) = self.blocks.get(&edge.from.block_id).copied() else {
                    continue;
                };
                if self.is_default_provider(source) {
                    continue;
                }
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::E_TIME_ROOT_UPSTREAM_DEPENDENCY,
                        DiagTarget::Port { port: port.clone() },
                        format!(
                            "time root '{}' depends on block '{}'",
                            root.id, source.id
                        ),
                    )
                    .with_hint("time roots may only read constant defaults")
                    .with_related(
                        DiagTarget::Edge {
                            edge: edge.id.clone(),
                        },
                        "offending edge",
                    ),
                );
            }
            for listener in patch
                .listeners
                .iter()
                .filter(|l| l.enabled && l.to == port)
            {
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::E_TIME_ROOT_BUS_LISTENER,
                        DiagTarget::Port { port: port.clone() },
                        format!(
                            "time root '{}' listens to bus '{}'",
                            root.id, listener.bus
                        ),
                    )
                    .with_related(
                        DiagTarget::Route {
                            route: listener.id.clone(),
                        },
                        "listener",
                    ),
                );
            }
        }
    }

    // ── Endpoints ───────────────────────────────────────────────────────

    fn endpoint_problem(&self, port: &PortRef, want: Direction) -> Option<String> {
        if !self.blocks.contains_key(&port.block_id) {
            return Some(format!("block '{}' does not exist", port.block_id));
        }
        match self.port(port) {
            None => Some(format!("port '{}' does not exist", port)),
            Some(view) if view.direction != want => {
                Some(format!("port '{}' is not an {}", port, want))
            }
            Some(_) => None,
        }
    }

    fn check_endpoints(&mut self) {
        let mut found = Vec::new();
        for edge in &self.patch.edges {
            let target = || DiagTarget::Edge {
                edge: edge.id.clone(),
            };
            if let Some(problem) = self.endpoint_problem(&edge.from, Direction::Output) {
                found.push((target(), format!("edge '{}' source: {}", edge.id, problem)));
            }
            if let Some(problem) = self.endpoint_problem(&edge.to, Direction::Input) {
                found.push((target(), format!("edge '{}' target: {}", edge.id, problem)));
            }
        }
        for publisher in &self.patch.publishers {
            let target = || DiagTarget::Route {
                route: publisher.id.clone(),
            };
            if let Some(problem) = self.endpoint_problem(&publisher.from, Direction::Output) {
                found.push((target(), format!("publisher '{}': {}", publisher.id, problem)));
            }
            if self.patch.bus(&publisher.bus).is_none() {
                found.push((
                    target(),
                    format!("publisher '{}': bus '{}' does not exist", publisher.id, publisher.bus),
                ));
            }
        }
        for listener in &self.patch.listeners {
            let target = || DiagTarget::Route {
                route: listener.id.clone(),
            };
            if let Some(problem) = self.endpoint_problem(&listener.to, Direction::Input) {
                found.push((target(), format!("listener '{}': {}", listener.id, problem)));
            }
            if self.patch.bus(&listener.bus).is_none() {
                found.push((
                    target(),
                    format!("listener '{}': bus '{}' does not exist", listener.id, listener.bus),
                ));
            }
        }
        for (target, message) in found {
            self.diagnostics.push(Diagnostic::error(
                codes::E_INVALID_CONNECTION,
                target,
                message,
            ));
        }
    }

    // ── Exclusive writer ────────────────────────────────────────────────

    fn check_exclusive_writers(&mut self) {
        let mut writers: BTreeMap<&PortRef, Vec<DiagTarget>> = BTreeMap::new();
        for edge in self.patch.enabled_edges() {
            writers.entry(&edge.to).or_default().push(DiagTarget::Edge {
                edge: edge.id.clone(),
            });
        }
        for listener in self.patch.listeners.iter().filter(|l| l.enabled) {
            writers.entry(&listener.to).or_default().push(DiagTarget::Route {
                route: listener.id.clone(),
            });
        }

        for (port, sources) in writers {
            if sources.len() < 2 {
                continue;
            }
            let mut diag = Diagnostic::error(
                codes::E_MULTIPLE_WRITERS,
                DiagTarget::Port { port: port.clone() },
                format!(
                    "Multiple writers: input '{}' has {} active writers",
                    port,
                    sources.len()
                ),
            )
            .with_hint("disable or remove all but one connection, or route through a bus");
            for source in sources {
                diag = diag.with_related(source, "writer");
            }
            self.diagnostics.push(diag);
        }
    }

    // ── Edge types ──────────────────────────────────────────────────────

    fn check_edge_types(&mut self) {
        for edge in self.patch.enabled_edges() {
            let (Some(from), Some(to)) = (self.port(&edge.from), self.port(&edge.to)) else {
                continue;
            };
            if from.direction != Direction::Output || to.direction != Direction::Input {
                continue;
            }
            let (src, dst) = (&from.slot.type_desc, &to.slot.type_desc);
            if is_assignable(src, dst) {
                continue;
            }
            let mut diag = Diagnostic::error(
                codes::E_TYPE_MISMATCH,
                DiagTarget::Port {
                    port: edge.to.clone(),
                },
                get_type_mismatch_message(src, dst),
            )
            .with_related(
                DiagTarget::Edge {
                    edge: edge.id.clone(),
                },
                "edge",
            );
            if let Some(hint) = get_compatibility_hint(src, dst) {
                diag = diag.with_hint(hint);
            }
            self.diagnostics.push(diag);
        }
    }

    // ── Buses ───────────────────────────────────────────────────────────

    fn check_buses(&mut self) {
        for bus in &self.patch.buses {
            let target = DiagTarget::Bus {
                bus: bus.id.clone(),
            };
            if !is_bus_eligible(&bus.type_desc) {
                self.diagnostics.push(Diagnostic::error(
                    codes::E_BUS_INELIGIBLE_TYPE,
                    target.clone(),
                    format!("bus '{}' cannot carry {}", bus.id, bus.type_desc),
                ));
            } else if !supports_mode(bus.type_desc.world, bus.combine) {
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::E_BUS_COMBINE_MODE,
                        target.clone(),
                        format!(
                            "combine mode '{}' is not supported on {} bus '{}'",
                            bus.combine, bus.type_desc.world, bus.id
                        ),
                    )
                    .with_hint("signal buses support 'last' and 'sum'"),
                );
            }

            let publishers: Vec<_> = self
                .patch
                .publishers
                .iter()
                .filter(|p| p.enabled && p.bus == bus.id)
                .collect();
            if publishers.is_empty() {
                self.diagnostics.push(Diagnostic::warning(
                    codes::W_BUS_NO_PUBLISHERS,
                    target.clone(),
                    format!("bus '{}' has no publishers", bus.id),
                ));
            }

            for publisher in publishers {
                let Some(from) = self.port(&publisher.from) else {
                    continue;
                };
                if is_assignable(&from.slot.type_desc, &bus.type_desc) {
                    continue;
                }
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::E_BUS_TYPE_MISMATCH,
                        DiagTarget::Route {
                            route: publisher.id.clone(),
                        },
                        format!(
                            "publisher '{}' on bus '{}': {}",
                            publisher.id,
                            bus.id,
                            get_type_mismatch_message(&from.slot.type_desc, &bus.type_desc)
                        ),
                    )
                    .with_related(target.clone(), "bus"),
                );
            }

            for listener in self
                .patch
                .listeners
                .iter()
                .filter(|l| l.enabled && l.bus == bus.id)
            {
                let Some(to) = self.port(&listener.to) else {
                    continue;
                };
                if is_assignable(&bus.type_desc, &to.slot.type_desc) {
                    continue;
                }
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::E_BUS_TYPE_MISMATCH,
                        DiagTarget::Route {
                            route: listener.id.clone(),
                        },
                        format!(
                            "listener '{}' on bus '{}': {}",
                            listener.id,
                            bus.id,
                            get_type_mismatch_message(&bus.type_desc, &to.slot.type_desc)
                        ),
                    )
                    .with_related(target.clone(), "bus"),
                );
            }
        }
    }

    // ── Cycles ──────────────────────────────────────────────────────────

    fn check_cycles(&mut self, graph: &GraphIndex) {
        for cycle in graph.find_cycles() {
            let path = cycle_path(&cycle);
            let mut diag = Diagnostic::error(
                codes::E_CYCLE_DETECTED,
                DiagTarget::Block {
                    block: cycle[0].clone(),
                },
                format!("cycle detected: {path}"),
            )
            .with_hint("break the loop or feed back through a bus");
            for member in &cycle[1..] {
                diag = diag.with_related(
                    DiagTarget::Block {
                        block: member.clone(),
                    },
                    "in cycle",
                );
            }
            self.diagnostics.push(diag);
        }

        for cycle in graph.find_bus_feedback() {
            self.diagnostics.push(Diagnostic::warning(
                codes::W_BUS_FEEDBACK,
                DiagTarget::Block {
                    block: cycle[0].clone(),
                },
                format!("bus feedback loop: {}", cycle_path(&cycle)),
            ));
        }
    }
}

fn cycle_path(cycle: &[BlockId]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(BlockId::as_str).collect();
    if let Some(first) = names.first().copied() {
        names.push(first);
    }
    names.join(" -> ")
}

// ── Public API ──────────────────────────────────────────────────────────────

/// Run every structural, type and bus rule over `patch`, with each block of
/// a registered type seen through its definition (`Registry::resolve_patch`).
#[tracing::instrument(level = "debug", skip_all, fields(blocks = patch.blocks.len(), edges = patch.edges.len()))]
pub fn validate_all(patch: &Patch, registry: &Registry) -> ValidationResult {
    let resolved = registry.resolve_patch(patch);
    let diagnostics = Validator::new(&resolved, registry).run();
    let result = ValidationResult::from_diagnostics(diagnostics);
    tracing::debug!(
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validated patch"
    );
    result
}

/// Preflight for a single prospective edge `from → to`: endpoint lookup,
/// type compatibility and cycle check only. Cheap enough for drag feedback.
pub fn can_add_connection(patch: &Patch, from: &PortRef, to: &PortRef) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let invalid = |message: String| {
        Diagnostic::error(
            codes::E_INVALID_CONNECTION,
            DiagTarget::Port { port: to.clone() },
            message,
        )
    };

    let source = patch.port(from);
    let sink = patch.port(to);
    match (source, sink) {
        (None, _) => diagnostics.push(invalid(format!("port '{from}' does not exist"))),
        (_, None) => diagnostics.push(invalid(format!("port '{to}' does not exist"))),
        (Some(src), Some(dst)) => {
            if src.direction != Direction::Output {
                diagnostics.push(invalid(format!("port '{from}' is not an output")));
            } else if dst.direction != Direction::Input {
                diagnostics.push(invalid(format!("port '{to}' is not an input")));
            } else if !is_assignable(&src.slot.type_desc, &dst.slot.type_desc) {
                let mut diag = Diagnostic::error(
                    codes::E_TYPE_MISMATCH,
                    DiagTarget::Port { port: to.clone() },
                    get_type_mismatch_message(&src.slot.type_desc, &dst.slot.type_desc),
                );
                if let Some(hint) = get_compatibility_hint(&src.slot.type_desc, &dst.slot.type_desc) {
                    diag = diag.with_hint(hint);
                }
                diagnostics.push(diag);
            }

            let graph = GraphIndex::build(patch);
            if graph.would_create_cycle(&from.block_id, &to.block_id) {
                diagnostics.push(Diagnostic::error(
                    codes::E_CYCLE_DETECTED,
                    DiagTarget::Port { port: to.clone() },
                    format!("connecting '{from}' to '{to}' would create a cycle"),
                ));
            }
        }
    }
    ValidationResult::from_diagnostics(diagnostics)
}

// ── Tests ───────────────────────────────────────────────────────────────────
