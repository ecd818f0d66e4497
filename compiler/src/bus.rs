// bus.rs — Bus combination semantics
//
// A bus is the only many-to-one fan-in in a patch. Its producers are folded
// in the order given by `sorted_publishers`; the editor preview and the
// compiled runtime both go through this module so they can never disagree.
//
// Combination is lazy: the result is a new signal or field that evaluates
// its producers on demand. Unsupported modes or mixed payloads degrade to an
// `Artifact::Error` that only the bus's consumers see.
//
// Preconditions: producer artifacts are passed in sorted publisher order.
// Postconditions: one producer is returned unchanged; none yields the bus default.
// Failure modes: `Artifact::Error` (never panics).
// Side effects: none.

use std::sync::Arc;

use crate::artifact::{
    Artifact, ArtifactError, BusValue, Evaluable, Field, FieldCtx, Payload, Signal, SignalCtx,
};
use crate::generators::{constant_field, constant_signal};
use crate::patch::{Bus, CombineMode, Literal, PortRef, Publisher};
use crate::types::World;

// ── Ordering ────────────────────────────────────────────────────────────────

/// Publishers in combination order: ascending `sort_key`, ties by id.
pub fn sorted_publishers<'a>(
    publishers: impl IntoIterator<Item = &'a Publisher>,
) -> Vec<&'a Publisher> {
    let mut sorted: Vec<&Publisher> = publishers.into_iter().collect();
    sorted.sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.id.cmp(&b.id)));
    sorted
}

/// Combine modes a bus of the given world supports.
pub fn supports_mode(world: World, mode: CombineMode) -> bool {
    match world {
        World::Signal => matches!(mode, CombineMode::Last | CombineMode::Sum),
        World::Field => true,
        _ => false,
    }
}

// ── Generic reducers ────────────────────────────────────────────────────────

fn combine_signals<T: BusValue>(
    signals: Vec<Signal<T>>,
    mode: CombineMode,
) -> Result<Signal<T>, ArtifactError> {
    match mode {
        CombineMode::Last => signals.last().cloned().ok_or(ArtifactError::UnsupportedMode {
            mode: mode.to_string(),
            kind: "empty",
        }),
        CombineMode::Sum => {
            let sum: Signal<T> = Arc::new(move |ctx: &SignalCtx| {
                signals
                    .iter()
                    .fold(T::zero(), |acc, s| acc.add(s.eval(ctx)))
            });
            Ok(sum)
        }
        CombineMode::Average | CombineMode::Max | CombineMode::Min => {
            Err(ArtifactError::UnsupportedMode {
                mode: mode.to_string(),
                kind: "signal",
            })
        }
    }
}

fn combine_fields<T: BusValue>(fields: Vec<Field<T>>, mode: CombineMode) -> Field<T> {
    Arc::new(move |ctx: &FieldCtx| {
        let evaluated: Vec<Vec<T>> = fields.iter().map(|f| f.eval(ctx)).collect();
        (0..ctx.count)
            .map(|i| reduce_index(&evaluated, i, mode))
            .collect::<Vec<T>>()
    })
}

/// Fold the `i`-th element of every producer. Producers shorter than the
/// context count do not contribute at that index.
fn reduce_index<T: BusValue>(evaluated: &[Vec<T>], i: usize, mode: CombineMode) -> T {
    let values = evaluated.iter().filter_map(|v| v.get(i).copied());
    match mode {
        CombineMode::Last => values.last().unwrap_or_else(T::zero),
        CombineMode::Sum => values.fold(T::zero(), T::add),
        CombineMode::Average => {
            let (sum, n) = values.fold((T::zero(), 0usize), |(acc, n), v| (acc.add(v), n + 1));
            if n == 0 {
                T::zero()
            } else {
                sum.scale(1.0 / n as f64)
            }
        }
        CombineMode::Max => values.reduce(T::max).unwrap_or_else(T::zero),
        CombineMode::Min => values.reduce(T::min).unwrap_or_else(T::zero),
    }
}

// ── Defaults ────────────────────────────────────────────────────────────────

fn default_artifact(world: World, value: &Literal) -> Artifact {
    let unsupported = || {
        Artifact::Error(ArtifactError::UnsupportedDefault {
            value: value.to_string(),
        })
    };
    let Some(payload) = Payload::from_literal(value) else {
        return unsupported();
    };
    match (world, payload) {
        (World::Signal, Payload::Float(v)) => Artifact::SignalFloat(constant_signal(v)),
        (World::Signal, Payload::Vec2(v)) => Artifact::SignalVec2(constant_signal(v)),
        (World::Signal, Payload::Color(v)) => Artifact::SignalColor(constant_signal(v)),
        (World::Field, Payload::Float(v)) => Artifact::FieldFloat(constant_field(v)),
        (World::Field, Payload::Vec2(v)) => Artifact::FieldVec2(constant_field(v)),
        (World::Field, Payload::Color(v)) => Artifact::FieldColor(constant_field(v)),
        _ => unsupported(),
    }
}

fn mixed(first: &Artifact, other: &Artifact) -> Artifact {
    Artifact::Error(ArtifactError::MixedKinds {
        first: first.kind(),
        second: other.kind(),
    })
}

/// Unwrap every artifact with `pick`, or report the first one that does not
/// match the kind of `artifacts[0]`.
fn collect_kind<T>(
    artifacts: &[Artifact],
    pick: impl Fn(&Artifact) -> Option<T>,
) -> Result<Vec<T>, Artifact> {
    artifacts
        .iter()
        .map(|a| pick(a).ok_or_else(|| mixed(&artifacts[0], a)))
        .collect()
}

fn first_error(artifacts: &[Artifact]) -> Option<Artifact> {
    artifacts.iter().find(|a| a.is_error()).cloned()
}

// ── Public API ──────────────────────────────────────────────────────────────

/// Combine signal producers (already in sorted order).
///
/// `last` keeps the highest-sorted producer; `sum` adds producers pointwise
/// at evaluation time.
pub fn combine_signal_artifacts(
    artifacts: &[Artifact],
    mode: CombineMode,
    default_value: &Literal,
) -> Artifact {
    match artifacts {
        [] => return default_artifact(World::Signal, default_value),
        [single] => return single.clone(),
        _ => {}
    }
    if let Some(err) = first_error(artifacts) {
        return err;
    }

    let combined = match &artifacts[0] {
        Artifact::SignalFloat(_) => collect_kind(artifacts, |a| match a {
            Artifact::SignalFloat(s) => Some(s.clone()),
            _ => None,
        })
        .map(|s| combine_signals(s, mode).map(Artifact::SignalFloat)),
        Artifact::SignalVec2(_) => collect_kind(artifacts, |a| match a {
            Artifact::SignalVec2(s) => Some(s.clone()),
            _ => None,
        })
        .map(|s| combine_signals(s, mode).map(Artifact::SignalVec2)),
        Artifact::SignalColor(_) => collect_kind(artifacts, |a| match a {
            Artifact::SignalColor(s) => Some(s.clone()),
            _ => None,
        })
        .map(|s| combine_signals(s, mode).map(Artifact::SignalColor)),
        other => {
            return Artifact::Error(ArtifactError::UnsupportedMode {
                mode: mode.to_string(),
                kind: other.kind(),
            })
        }
    };

    match combined {
        Ok(Ok(artifact)) => artifact,
        Ok(Err(e)) => Artifact::Error(e),
        Err(mixed) => mixed,
    }
}

/// Combine field producers (already in sorted order).
///
/// Every mode reduces per element index over the producers' evaluated
/// arrays, at evaluation time.
pub fn combine_field_artifacts(
    artifacts: &[Artifact],
    mode: CombineMode,
    default_value: &Literal,
) -> Artifact {
    match artifacts {
        [] => return default_artifact(World::Field, default_value),
        [single] => return single.clone(),
        _ => {}
    }
    if let Some(err) = first_error(artifacts) {
        return err;
    }

    let combined = match &artifacts[0] {
        Artifact::FieldFloat(_) => collect_kind(artifacts, |a| match a {
            Artifact::FieldFloat(f) => Some(f.clone()),
            _ => None,
        })
        .map(|f| Artifact::FieldFloat(combine_fields(f, mode))),
        Artifact::FieldVec2(_) => collect_kind(artifacts, |a| match a {
            Artifact::FieldVec2(f) => Some(f.clone()),
            _ => None,
        })
        .map(|f| Artifact::FieldVec2(combine_fields(f, mode))),
        Artifact::FieldColor(_) => collect_kind(artifacts, |a| match a {
            Artifact::FieldColor(f) => Some(f.clone()),
            _ => None,
        })
        .map(|f| Artifact::FieldColor(combine_fields(f, mode))),
        other => {
            return Artifact::Error(ArtifactError::UnsupportedMode {
                mode: mode.to_string(),
                kind: other.kind(),
            })
        }
    };

    combined.unwrap_or_else(|mixed| mixed)
}

/// Resolve and combine every enabled publisher of `bus`.
///
/// `resolve` maps a publisher's source port to the artifact it produces; a
/// port without an artifact turns the bus into an error.
#[tracing::instrument(level = "debug", skip_all, fields(bus = %bus.id))]
pub fn combine_bus(
    bus: &Bus,
    publishers: &[Publisher],
    resolve: impl Fn(&PortRef) -> Option<Artifact>,
) -> Artifact {
    let ordered = sorted_publishers(
        publishers
            .iter()
            .filter(|p| p.enabled && p.bus == bus.id),
    );
    tracing::debug!(producers = ordered.len(), mode = %bus.combine, "combining bus");

    let mut artifacts = Vec::with_capacity(ordered.len());
    for publisher in ordered {
        match resolve(&publisher.from) {
            Some(artifact) => artifacts.push(artifact),
            None => {
                return Artifact::Error(ArtifactError::MissingProducer {
                    route: publisher.id.to_string(),
                })
            }
        }
    }

    match bus.type_desc.world {
        World::Signal => combine_signal_artifacts(&artifacts, bus.combine, &bus.default_value),
        World::Field => combine_field_artifacts(&artifacts, bus.combine, &bus.default_value),
        other => Artifact::Error(ArtifactError::UnsupportedWorld {
            world: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Vec2;
    use crate::generators::element_domain;
    use crate::types::{Domain, TypeDesc};

    fn sig(v: f64) -> Artifact {
        Artifact::SignalFloat(constant_signal(v))
    }

    fn field(values: Vec<f64>) -> Artifact {
        Artifact::FieldFloat(Arc::new(move |ctx: &FieldCtx| {
            values.iter().copied().take(ctx.count).collect::<Vec<f64>>()
        }))
    }

    fn eval_signal(a: &Artifact, t: f64) -> f64 {
        a.as_signal_float()
            .expect("signal float")
            .eval(&SignalCtx::at(t))
    }

    fn eval_field(a: &Artifact, n: usize) -> Vec<f64> {
        a.as_field_float().expect("field float").eval(&FieldCtx::new(n))
    }

    #[test]
    fn publishers_sort_by_key_then_id() {
        let p = |id: &str, key| Publisher::new(id, "bus", PortRef::new("b", "o"), key);
        let pubs = vec![p("c", 1), p("b", 0), p("a", 1)];
        let ids: Vec<&str> = sorted_publishers(&pubs)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn signal_sum_is_lazy_and_pointwise() {
        let ramp = Artifact::SignalFloat(Arc::new(|ctx: &SignalCtx| ctx.t_ms));
        let sum = combine_signal_artifacts(&[ramp, sig(1.0)], CombineMode::Sum, &Literal::Number(0.0));
        assert_eq!(eval_signal(&sum, 0.0), 1.0);
        assert_eq!(eval_signal(&sum, 10.0), 11.0);
    }

    #[test]
    fn signal_last_takes_highest_sorted() {
        let last = combine_signal_artifacts(
            &[sig(1.0), sig(2.0), sig(3.0)],
            CombineMode::Last,
            &Literal::Number(0.0),
        );
        assert_eq!(eval_signal(&last, 0.0), 3.0);
    }

    #[test]
    fn signal_rejects_field_only_modes() {
        let out = combine_signal_artifacts(&[sig(1.0), sig(2.0)], CombineMode::Max, &Literal::Number(0.0));
        assert!(matches!(
            out.error(),
            Some(ArtifactError::UnsupportedMode { kind: "signal", .. })
        ));
    }

    #[test]
    fn zero_producers_use_default_shape() {
        let out = combine_signal_artifacts(&[], CombineMode::Sum, &Literal::Number(4.0));
        assert_eq!(eval_signal(&out, 123.0), 4.0);

        let out = combine_field_artifacts(&[], CombineMode::Sum, &Literal::Vector(vec![1.0, 2.0]));
        let values = out.as_field_vec2().unwrap().eval(&FieldCtx::new(2));
        assert_eq!(values, vec![Vec2::new(1.0, 2.0); 2]);

        let out = combine_signal_artifacts(&[], CombineMode::Sum, &Literal::Text("x".into()));
        assert!(out.is_error());
    }

    #[test]
    fn single_producer_returned_unchanged() {
        let only = Artifact::Domain(element_domain("d", 3));
        let out = combine_signal_artifacts(&[only], CombineMode::Max, &Literal::Number(0.0));
        assert!(matches!(out, Artifact::Domain(_)));
    }

    #[test]
    fn mixed_kinds_are_an_error() {
        let v = Artifact::SignalVec2(constant_signal(Vec2::new(1.0, 1.0)));
        let out = combine_signal_artifacts(&[sig(1.0), v], CombineMode::Sum, &Literal::Number(0.0));
        assert_eq!(
            out.error(),
            Some(&ArtifactError::MixedKinds {
                first: "Signal<float>",
                second: "Signal<vec2>"
            })
        );
    }

    #[test]
    fn error_producers_propagate() {
        let err = Artifact::Error(ArtifactError::MissingProducer { route: "p".into() });
        let out = combine_signal_artifacts(&[sig(1.0), err.clone()], CombineMode::Sum, &Literal::Number(0.0));
        assert_eq!(out.error(), err.error());
    }

    #[test]
    fn field_reducers() {
        let a = field(vec![1.0, 5.0, 3.0]);
        let b = field(vec![4.0, 2.0, 3.0]);
        let zero = Literal::Number(0.0);
        let run = |mode| eval_field(&combine_field_artifacts(&[a.clone(), b.clone()], mode, &zero), 3);
        assert_eq!(run(CombineMode::Sum), vec![5.0, 7.0, 6.0]);
        assert_eq!(run(CombineMode::Average), vec![2.5, 3.5, 3.0]);
        assert_eq!(run(CombineMode::Max), vec![4.0, 5.0, 3.0]);
        assert_eq!(run(CombineMode::Min), vec![1.0, 2.0, 3.0]);
        assert_eq!(run(CombineMode::Last), vec![4.0, 2.0, 3.0]);
    }

    #[test]
    fn field_short_producer_does_not_contribute() {
        let a = field(vec![1.0, 1.0, 1.0]);
        let b = field(vec![3.0]);
        let avg = combine_field_artifacts(&[a, b], CombineMode::Average, &Literal::Number(0.0));
        assert_eq!(eval_field(&avg, 3), vec![2.0, 1.0, 1.0]);
    }

    #[test]
    fn combine_bus_uses_sorted_enabled_publishers() {
        let bus = Bus::new(
            "energy",
            TypeDesc::signal(Domain::Float),
            CombineMode::Last,
            Literal::Number(0.0),
        );
        let mut muted = Publisher::new("p0", "energy", PortRef::new("c", "out"), 9);
        muted.enabled = false;
        let publishers = vec![
            Publisher::new("p2", "energy", PortRef::new("b", "out"), 1),
            Publisher::new("p1", "energy", PortRef::new("a", "out"), 0),
            Publisher::new("px", "other", PortRef::new("d", "out"), 5),
            muted,
        ];
        let out = combine_bus(&bus, &publishers, |port| {
            let v = match port.block_id.as_str() {
                "a" => 10.0,
                "b" => 3.0,
                _ => 99.0,
            };
            Some(sig(v))
        });
        assert_eq!(eval_signal(&out, 0.0), 3.0);
    }

    #[test]
    fn combine_bus_missing_producer() {
        let bus = Bus::new(
            "energy",
            TypeDesc::signal(Domain::Float),
            CombineMode::Sum,
            Literal::Number(0.0),
        );
        let publishers = vec![Publisher::new("p1", "energy", PortRef::new("a", "out"), 0)];
        let out = combine_bus(&bus, &publishers, |_| None);
        assert_eq!(
            out.error(),
            Some(&ArtifactError::MissingProducer { route: "p1".into() })
        );
    }

    #[test]
    fn mode_support_table() {
        assert!(supports_mode(World::Signal, CombineMode::Sum));
        assert!(!supports_mode(World::Signal, CombineMode::Average));
        assert!(supports_mode(World::Field, CombineMode::Min));
        assert!(!supports_mode(World::Scalar, CombineMode::Last));
    }
}
