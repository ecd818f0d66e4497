// pipeline.rs — Compile orchestration
//
// Runs the passes over one patch snapshot in a fixed order:
// resolve → materialize → validate → schedule, then stamps provenance.
//
// Preconditions: `registry` holds every block type the patch should know.
// Postconditions: `CompileResult.patch` is the resolved (and, unless
//   disabled, materialized) snapshot; `order`
//   is a permutation of its block ids; diagnostics from every pass are kept
//   in pass order.
// Failure modes: none. Problems are diagnostics; see `has_error()`.
// Side effects: none.

use std::time::Instant;

use serde::Serialize;

use crate::diag::{DiagLevel, Diagnostic};
use crate::error::PatchResult;
use crate::graph::GraphIndex;
use crate::id::BlockId;
use crate::materialize::materialize_default_sources;
use crate::patch::Patch;
use crate::registry::Registry;
use crate::validate::validate_all;

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Run Pass 0 before validation.
    pub materialize: bool,
    /// Promote every warning to an error.
    pub deny_warnings: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            materialize: true,
            deny_warnings: false,
        }
    }
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Build provenance for reproducibility.
///
/// `patch_hash`: SHA-256 of the input patch's canonical JSON.
/// `registry_fingerprint`: SHA-256 of `Registry::canonical_json()`.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub patch_hash: [u8; 32],
    pub registry_fingerprint: [u8; 32],
    pub compiler_version: &'static str,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    patch_hash: String,
    registry_fingerprint: String,
    compiler_version: &'a str,
}

impl Provenance {
    pub fn patch_hash_hex(&self) -> String {
        bytes_to_hex(&self.patch_hash)
    }

    pub fn registry_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.registry_fingerprint)
    }

    /// Pretty JSON for `--emit build-info`.
    pub fn to_json(&self) -> PatchResult<String> {
        let info = BuildInfo {
            patch_hash: self.patch_hash_hex(),
            registry_fingerprint: self.registry_fingerprint_hex(),
            compiler_version: self.compiler_version,
        };
        let mut json = serde_json::to_string_pretty(&info)
            .map_err(|e| crate::error::PatchError::json("build info", e))?;
        json.push('\n');
        Ok(json)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

fn sha256(text: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

/// Hash the canonical forms of `patch` and `registry`. Field order is fixed
/// by the serde derives, so equal snapshots hash equal.
pub fn compute_provenance(patch: &Patch, registry: &Registry) -> PatchResult<Provenance> {
    Ok(Provenance {
        patch_hash: sha256(&patch.canonical_json()?),
        registry_fingerprint: sha256(&registry.canonical_json()?),
        compiler_version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Result ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompileResult {
    /// The snapshot the later passes saw: resolved through the registry and
    /// materialized unless disabled.
    pub patch: Patch,
    /// Evaluation order over edge and bus dependencies.
    pub order: Vec<BlockId>,
    pub diagnostics: Vec<Diagnostic>,
    /// `None` when a snapshot could not be serialized for hashing.
    pub provenance: Option<Provenance>,
}

impl CompileResult {
    pub fn has_error(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// Compile one patch snapshot.
#[tracing::instrument(level = "debug", skip_all, fields(blocks = patch.blocks.len()))]
pub fn compile(patch: &Patch, registry: &Registry, options: &CompileOptions) -> CompileResult {
    let provenance = match compute_provenance(patch, registry) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(error = %e, "provenance unavailable");
            None
        }
    };
    let mut diagnostics = Vec::new();

    let t = Instant::now();
    let resolved = registry.resolve_patch(patch);
    tracing::debug!(elapsed = ?t.elapsed(), "pass resolve");

    let t = Instant::now();
    let patch = if options.materialize {
        let result = materialize_default_sources(&resolved);
        diagnostics.extend(result.diagnostics);
        result.patch
    } else {
        resolved.into_owned()
    };
    tracing::debug!(elapsed = ?t.elapsed(), blocks = patch.blocks.len(), "pass materialize");

    let t = Instant::now();
    let validation = validate_all(&patch, registry);
    diagnostics.extend(validation.errors);
    diagnostics.extend(validation.warnings);
    tracing::debug!(elapsed = ?t.elapsed(), diagnostics = diagnostics.len(), "pass validate");

    let t = Instant::now();
    let order = GraphIndex::build(&patch).topological_order();
    tracing::debug!(elapsed = ?t.elapsed(), "pass schedule");

    if options.deny_warnings {
        for diag in &mut diagnostics {
            diag.level = DiagLevel::Error;
        }
    }

    CompileResult {
        patch,
        order,
        diagnostics,
        provenance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::codes;
    use crate::patch::{Block, Edge, Literal, PortRef, Slot};
    use crate::registry::{BlockDefinition, Subcategory};
    use crate::types::{Domain, TypeDesc, World};

    fn registry() -> Registry {
        let mut reg = Registry::with_default_providers();
        reg.register(BlockDefinition::new("TimeRoot", Subcategory::TimeRoot), "test")
            .unwrap();
        reg.register(BlockDefinition::new("Osc", Subcategory::Signal), "test")
            .unwrap();
        reg
    }

    fn sample() -> Patch {
        Patch {
            blocks: vec![
                Block::new("time", "TimeRoot")
                    .with_output(Slot::new("phase", TypeDesc::signal(Domain::Phase))),
                Block::new("osc", "Osc")
                    .with_input(Slot::new("phase", TypeDesc::signal(Domain::Float)))
                    .with_input(
                        Slot::new("amp", TypeDesc::signal(Domain::Float))
                            .with_default(World::Signal, Literal::Number(1.0)),
                    )
                    .with_output(Slot::new("out", TypeDesc::signal(Domain::Float))),
            ],
            edges: vec![Edge::new(
                "e1",
                PortRef::new("time", "phase"),
                PortRef::new("osc", "phase"),
            )],
            ..Patch::default()
        }
    }

    #[test]
    fn compile_materializes_and_orders() {
        let result = compile(&sample(), &registry(), &CompileOptions::default());
        assert!(!result.has_error(), "{:?}", result.diagnostics);
        assert_eq!(result.patch.blocks.len(), 3);
        let order: Vec<&str> = result.order.iter().map(BlockId::as_str).collect();
        assert_eq!(order, vec!["osc_default_amp", "time", "osc"]);
    }

    #[test]
    fn compile_without_materialize() {
        let options = CompileOptions {
            materialize: false,
            ..CompileOptions::default()
        };
        let result = compile(&sample(), &registry(), &options);
        assert_eq!(result.patch, sample());
        assert_eq!(result.order.len(), 2);
    }

    #[test]
    fn deny_warnings_promotes() {
        let mut patch = sample();
        patch.blocks.push(Block::new("x", "Mystery"));
        let lenient = compile(&patch, &registry(), &CompileOptions::default());
        assert!(!lenient.has_error());
        assert_eq!(lenient.warnings().count(), 1);

        let strict = compile(
            &patch,
            &registry(),
            &CompileOptions {
                deny_warnings: true,
                ..CompileOptions::default()
            },
        );
        assert!(strict.has_error());
        assert_eq!(
            strict.errors().next().and_then(|d| d.code),
            Some(codes::W_UNKNOWN_BLOCK_TYPE)
        );
    }

    #[test]
    fn provenance_is_stable() {
        let a = compute_provenance(&sample(), &registry()).unwrap();
        let b = compute_provenance(&sample(), &registry()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.patch_hash_hex().len(), 64);

        let mut other = sample();
        other.edges.clear();
        assert_ne!(
            compute_provenance(&other, &registry()).unwrap().patch_hash,
            a.patch_hash
        );
    }

    #[test]
    fn build_info_json() {
        let json = compute_provenance(&sample(), &registry())
            .unwrap()
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["compiler_version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(value["patch_hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn compile_stamps_provenance_of_input() {
        let result = compile(&sample(), &registry(), &CompileOptions::default());
        assert_eq!(
            result.provenance,
            Some(compute_provenance(&sample(), &registry()).unwrap())
        );
    }

    #[test]
    fn compile_resolves_bare_blocks_from_registry() {
        let mut reg = Registry::with_default_providers();
        reg.register(
            BlockDefinition::new("TimeRoot", Subcategory::TimeRoot)
                .with_output(Slot::new("phase", TypeDesc::signal(Domain::Phase))),
            "test",
        )
        .unwrap();
        reg.register(
            BlockDefinition::new("Osc", Subcategory::Signal)
                .with_input(Slot::new("phase", TypeDesc::signal(Domain::Float)))
                .with_input(
                    Slot::new("amp", TypeDesc::signal(Domain::Float))
                        .with_default(World::Signal, Literal::Number(1.0)),
                ),
            "test",
        )
        .unwrap();
        let patch = Patch {
            blocks: vec![Block::new("time", "TimeRoot"), Block::new("osc", "Osc")],
            edges: vec![Edge::new(
                "e1",
                PortRef::new("time", "phase"),
                PortRef::new("osc", "phase"),
            )],
            ..Patch::default()
        };
        let result = compile(&patch, &reg, &CompileOptions::default());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let order: Vec<&str> = result.order.iter().map(BlockId::as_str).collect();
        assert_eq!(order, vec!["osc_default_amp", "time", "osc"]);
    }
}
