//! Sums of totalable columns over the filtered set.

use sea_query::{Expr, Func, SimpleExpr};

use crate::storage::Cell;

/// `COALESCE(SUM(expr), 0)`
pub(crate) fn sum(expr: SimpleExpr) -> SimpleExpr {
    Func::coalesce([Expr::expr(expr).sum(), Expr::val(0).into()]).into()
}

/// Totals are reported with two decimals.
pub fn round_total(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn total_from_cell(cell: Option<&Cell>) -> f64 {
    round_total(cell.and_then(Cell::as_f64).unwrap_or(0.0))
}
