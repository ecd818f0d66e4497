// artifact.rs — Artifact evaluation model
//
// Compiled blocks produce artifacts: constants, signals (functions of time)
// and fields (functions of seed and element count). Signals and fields are
// lazy: they hold an `Evaluable` and compute on demand. Every evaluable is
// side-effect-free and repeatable, so callers may memoize or share them.
//
// Preconditions: none.
// Postconditions: artifacts are immutable; cloning shares the underlying Arc.
// Failure modes: failures are carried as `Artifact::Error`, never panics.
// Side effects: none.

use std::fmt;
use std::sync::Arc;

use crate::patch::Literal;

// ── Evaluation contexts ─────────────────────────────────────────────────────

/// Per-frame context for signal evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalCtx {
    pub t_ms: f64,
    pub frame: u64,
}

impl SignalCtx {
    pub fn at(t_ms: f64) -> Self {
        SignalCtx { t_ms, frame: 0 }
    }
}

/// Per-element context for field evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldCtx {
    pub t_ms: f64,
    pub seed: u64,
    pub count: usize,
}

impl FieldCtx {
    pub fn new(count: usize) -> Self {
        FieldCtx {
            t_ms: 0.0,
            seed: 0,
            count,
        }
    }

    /// The signal context for the same instant.
    pub fn signal_ctx(&self) -> SignalCtx {
        SignalCtx::at(self.t_ms)
    }
}

// ── Evaluable ───────────────────────────────────────────────────────────────

/// A lazily evaluated computation over a context.
pub trait Evaluable<C>: Send + Sync {
    type Output;

    fn eval(&self, ctx: &C) -> Self::Output;
}

impl<C, T, F> Evaluable<C> for F
where
    F: Fn(&C) -> T + Send + Sync,
{
    type Output = T;

    fn eval(&self, ctx: &C) -> T {
        self(ctx)
    }
}

/// A per-frame function of time.
pub type Signal<T> = Arc<dyn Evaluable<SignalCtx, Output = T>>;

/// A per-element function; yields one value per element.
pub type Field<T> = Arc<dyn Evaluable<FieldCtx, Output = Vec<T>>>;

// ── Value types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }
}

/// Linear RGBA, components in `0.0..=1.0` by convention (not enforced).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Color { r, g, b, a }
    }
}

/// Component-wise arithmetic used by bus combiners.
pub trait BusValue: Copy + Send + Sync + 'static {
    fn zero() -> Self;
    fn add(self, other: Self) -> Self;
    fn scale(self, k: f64) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
}

impl BusValue for f64 {
    fn zero() -> Self {
        0.0
    }
    fn add(self, other: Self) -> Self {
        self + other
    }
    fn scale(self, k: f64) -> Self {
        self * k
    }
    fn min(self, other: Self) -> Self {
        f64::min(self, other)
    }
    fn max(self, other: Self) -> Self {
        f64::max(self, other)
    }
}

impl BusValue for Vec2 {
    fn zero() -> Self {
        Vec2::default()
    }
    fn add(self, o: Self) -> Self {
        Vec2::new(self.x + o.x, self.y + o.y)
    }
    fn scale(self, k: f64) -> Self {
        Vec2::new(self.x * k, self.y * k)
    }
    fn min(self, o: Self) -> Self {
        Vec2::new(self.x.min(o.x), self.y.min(o.y))
    }
    fn max(self, o: Self) -> Self {
        Vec2::new(self.x.max(o.x), self.y.max(o.y))
    }
}

impl BusValue for Color {
    fn zero() -> Self {
        Color::default()
    }
    fn add(self, o: Self) -> Self {
        Color::new(self.r + o.r, self.g + o.g, self.b + o.b, self.a + o.a)
    }
    fn scale(self, k: f64) -> Self {
        Color::new(self.r * k, self.g * k, self.b * k, self.a * k)
    }
    fn min(self, o: Self) -> Self {
        Color::new(self.r.min(o.r), self.g.min(o.g), self.b.min(o.b), self.a.min(o.a))
    }
    fn max(self, o: Self) -> Self {
        Color::new(self.r.max(o.r), self.g.max(o.g), self.b.max(o.b), self.a.max(o.a))
    }
}

/// A constant payload decoded from a literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Float(f64),
    Vec2(Vec2),
    Color(Color),
}

impl Payload {
    /// Infer the payload kind from a literal's shape: numbers and bools are
    /// floats, 2-vectors are `Vec2`, 4-vectors are colors.
    pub fn from_literal(value: &Literal) -> Option<Payload> {
        match value {
            Literal::Number(_) | Literal::Bool(_) => value.as_f64().map(Payload::Float),
            Literal::Vector(v) => match v.as_slice() {
                [x, y] => Some(Payload::Vec2(Vec2::new(*x, *y))),
                [r, g, b, a] => Some(Payload::Color(Color::new(*r, *g, *b, *a))),
                _ => None,
            },
            Literal::Text(_) => None,
        }
    }
}

// ── Element domain ──────────────────────────────────────────────────────────

/// A population of elements with stable ids `0..count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDomain {
    pub id: String,
    pub element_ids: Arc<[usize]>,
}

impl ElementDomain {
    pub fn len(&self) -> usize {
        self.element_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.element_ids.is_empty()
    }

    /// Field context sized to this domain.
    pub fn field_ctx(&self, t_ms: f64, seed: u64) -> FieldCtx {
        FieldCtx {
            t_ms,
            seed,
            count: self.len(),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// A localized evaluation failure. Only consumers of the failing artifact
/// see it; the rest of the graph compiles normally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactError {
    #[error("combine mode '{mode}' is not supported for {kind} producers")]
    UnsupportedMode { mode: String, kind: &'static str },

    #[error("bus producers mix {first} and {second} artifacts")]
    MixedKinds {
        first: &'static str,
        second: &'static str,
    },

    #[error("bus default {value} has no artifact shape")]
    UnsupportedDefault { value: String },

    #[error("buses cannot carry {world} values")]
    UnsupportedWorld { world: String },

    #[error("no artifact for publisher '{route}'")]
    MissingProducer { route: String },
}

// ── Artifact ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum Artifact {
    ScalarFloat(f64),
    ScalarVec2(Vec2),
    ScalarColor(Color),
    SignalFloat(Signal<f64>),
    SignalVec2(Signal<Vec2>),
    SignalColor(Signal<Color>),
    FieldFloat(Field<f64>),
    FieldVec2(Field<Vec2>),
    FieldColor(Field<Color>),
    Domain(ElementDomain),
    Error(ArtifactError),
}

impl Artifact {
    /// Short kind name, e.g. `Signal<float>`.
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::ScalarFloat(_) => "Scalar<float>",
            Artifact::ScalarVec2(_) => "Scalar<vec2>",
            Artifact::ScalarColor(_) => "Scalar<color>",
            Artifact::SignalFloat(_) => "Signal<float>",
            Artifact::SignalVec2(_) => "Signal<vec2>",
            Artifact::SignalColor(_) => "Signal<color>",
            Artifact::FieldFloat(_) => "Field<float>",
            Artifact::FieldVec2(_) => "Field<vec2>",
            Artifact::FieldColor(_) => "Field<color>",
            Artifact::Domain(_) => "Domain",
            Artifact::Error(_) => "Error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Artifact::Error(_))
    }

    pub fn error(&self) -> Option<&ArtifactError> {
        match self {
            Artifact::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_signal_float(&self) -> Option<&Signal<f64>> {
        match self {
            Artifact::SignalFloat(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_field_vec2(&self) -> Option<&Field<Vec2>> {
        match self {
            Artifact::FieldVec2(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_field_float(&self) -> Option<&Field<f64>> {
        match self {
            Artifact::FieldFloat(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::ScalarFloat(v) => write!(f, "ScalarFloat({v})"),
            Artifact::ScalarVec2(v) => write!(f, "ScalarVec2({v:?})"),
            Artifact::ScalarColor(v) => write!(f, "ScalarColor({v:?})"),
            Artifact::Domain(d) => write!(f, "Domain({} x{})", d.id, d.len()),
            Artifact::Error(e) => write!(f, "Error({e})"),
            other => write!(f, "{}(<lazy>)", other.kind()),
        }
    }
}
