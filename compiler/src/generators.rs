// generators.rs — Standard artifact generators
//
// The small set of block behaviours the runtime needs out of the box:
// constants, the phase clock, element domains, grid layout and
// signal-to-field broadcast. Each returns a lazy artifact; nothing is
// evaluated at construction time.

use std::sync::Arc;

use crate::artifact::{
    BusValue, ElementDomain, Evaluable, Field, FieldCtx, Signal, SignalCtx, Vec2,
};

/// A domain of `count` elements with ids `0..count`.
pub fn element_domain(id: impl Into<String>, count: usize) -> ElementDomain {
    ElementDomain {
        id: id.into(),
        element_ids: (0..count).collect(),
    }
}

/// Element traversal order for grid layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridOrder {
    #[default]
    RowMajor,
    ColumnMajor,
}

/// Lay elements out on a grid `cols` wide, `spacing` apart, starting at
/// `origin`. A zero column count is treated as one column.
pub fn grid_positions(cols: usize, spacing: f64, origin: Vec2, order: GridOrder) -> Field<Vec2> {
    let cols = cols.max(1);
    Arc::new(move |ctx: &FieldCtx| {
        let rows = ctx.count.div_ceil(cols).max(1);
        (0..ctx.count)
            .map(|i| {
                let (col, row) = match order {
                    GridOrder::RowMajor => (i % cols, i / cols),
                    GridOrder::ColumnMajor => (i / rows, i % rows),
                };
                Vec2::new(
                    origin.x + col as f64 * spacing,
                    origin.y + row as f64 * spacing,
                )
            })
            .collect::<Vec<_>>()
    })
}

pub fn constant_signal<T: BusValue>(value: T) -> Signal<T> {
    Arc::new(move |_: &SignalCtx| value)
}

pub fn constant_field<T: BusValue>(value: T) -> Field<T> {
    Arc::new(move |ctx: &FieldCtx| vec![value; ctx.count])
}

/// Normalized phase in `[0, 1)` cycling every `period_ms`. Non-positive
/// periods hold the phase at zero.
pub fn phase_signal(period_ms: f64) -> Signal<f64> {
    Arc::new(move |ctx: &SignalCtx| {
        if period_ms <= 0.0 {
            return 0.0;
        }
        ctx.t_ms.rem_euclid(period_ms) / period_ms
    })
}

/// Lift a signal into a field holding the signal's value at every element.
pub fn broadcast<T: BusValue>(signal: Signal<T>) -> Field<T> {
    Arc::new(move |ctx: &FieldCtx| vec![signal.eval(&ctx.signal_ctx()); ctx.count])
}
