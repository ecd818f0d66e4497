// diag.rs — Unified diagnostics model
//
// Shared diagnostic types used by the validator, the materializer and the
// compile pipeline. Diagnostic codes are the stable contract the editor UI
// switches on.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::id::{BlockId, BusId, EdgeId, RouteId};
use crate::patch::PortRef;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E_CYCLE_DETECTED`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // ── Structure ──
    pub const E_TIME_ROOT_MISSING: DiagCode = DiagCode("E_TIME_ROOT_MISSING");
    pub const E_TIME_ROOT_MULTIPLE: DiagCode = DiagCode("E_TIME_ROOT_MULTIPLE");
    pub const E_TIME_ROOT_UPSTREAM_DEPENDENCY: DiagCode =
        DiagCode("E_TIME_ROOT_UPSTREAM_DEPENDENCY");
    pub const E_TIME_ROOT_BUS_LISTENER: DiagCode = DiagCode("E_TIME_ROOT_BUS_LISTENER");
    pub const E_MULTIPLE_WRITERS: DiagCode = DiagCode("E_MULTIPLE_WRITERS");
    pub const E_INVALID_CONNECTION: DiagCode = DiagCode("E_INVALID_CONNECTION");
    pub const E_CYCLE_DETECTED: DiagCode = DiagCode("E_CYCLE_DETECTED");

    // ── Types ──
    pub const E_TYPE_MISMATCH: DiagCode = DiagCode("E_TYPE_MISMATCH");

    // ── Buses ──
    pub const E_BUS_TYPE_MISMATCH: DiagCode = DiagCode("E_BUS_TYPE_MISMATCH");
    pub const E_BUS_INELIGIBLE_TYPE: DiagCode = DiagCode("E_BUS_INELIGIBLE_TYPE");
    pub const E_BUS_COMBINE_MODE: DiagCode = DiagCode("E_BUS_COMBINE_MODE");

    // ── Warnings ──
    pub const W_BUS_NO_PUBLISHERS: DiagCode = DiagCode("W_BUS_NO_PUBLISHERS");
    pub const W_BUS_FEEDBACK: DiagCode = DiagCode("W_BUS_FEEDBACK");
    pub const W_UNKNOWN_BLOCK_TYPE: DiagCode = DiagCode("W_UNKNOWN_BLOCK_TYPE");
    pub const W_DEFAULT_PROVIDER_FALLBACK: DiagCode = DiagCode("W_DEFAULT_PROVIDER_FALLBACK");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Target ───────────────────────────────────────────────────────────────

/// The patch element a diagnostic is attached to. The editor uses it to
/// highlight the offending block, port, wire or bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiagTarget {
    Graph,
    Block { block: BlockId },
    Port { port: PortRef },
    Edge { edge: EdgeId },
    Bus { bus: BusId },
    Route { route: RouteId },
}

impl fmt::Display for DiagTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagTarget::Graph => write!(f, "graph"),
            DiagTarget::Block { block } => write!(f, "block '{}'", block),
            DiagTarget::Port { port } => write!(f, "port '{}'", port),
            DiagTarget::Edge { edge } => write!(f, "edge '{}'", edge),
            DiagTarget::Bus { bus } => write!(f, "bus '{}'", bus),
            DiagTarget::Route { route } => write!(f, "route '{}'", route),
        }
    }
}

// ── Related target ───────────────────────────────────────────────────────

/// A secondary location providing context for a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedTarget {
    pub target: DiagTarget,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub target: DiagTarget,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedTarget>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related targets.
    pub fn new(level: DiagLevel, target: DiagTarget, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            target,
            message: message.into(),
            hint: None,
            related: Vec::new(),
        }
    }

    pub fn error(code: DiagCode, target: DiagTarget, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, target, message).with_code(code)
    }

    pub fn warning(code: DiagCode, target: DiagTarget, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, target, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related target.
    pub fn with_related(mut self, target: DiagTarget, label: impl Into<String>) -> Self {
        self.related.push(RelatedTarget {
            target,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if self.target != DiagTarget::Graph {
            write!(f, "\n  at: {}", self.target)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
