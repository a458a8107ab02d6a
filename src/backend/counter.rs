//! "Set to absolute value" on top of increment-only counters.
//!
//! The engine reads the current ticks, increments by the difference and reads
//! again. When a concurrent writer moved the counter in between, it retries
//! against the same target, up to [`MAX_COUNTER_ATTEMPTS`] increments. No lock
//! is held across attempts.

use crate::core::{DbError, Result, Value};
use crate::model::{ColumnField, EntityMetadata};
use tracing::{debug, trace, warn};

/// Increments issued before reconciliation gives up: the first plus three retries.
pub const MAX_COUNTER_ATTEMPTS: u32 = 4;

/// Raw counter access a backend offers the engine.
pub trait CounterCells {
    /// Current ticks, `None` when the counter was never written.
    fn read_ticks(&self, meta: &EntityMetadata, row: &str, column: &str) -> Result<Option<i64>>;

    fn add_ticks(&self, meta: &EntityMetadata, row: &str, column: &str, amount: i64) -> Result<()>;
}

/// Drives the counter `field` of `row` to `target` ticks.
///
/// Returns the number of increments issued; zero when the counter already
/// holds the target.
pub fn reconcile<C: CounterCells + ?Sized>(
    cells: &C,
    meta: &EntityMetadata,
    row: &str,
    field: &ColumnField,
    target: i64,
) -> Result<u32> {
    let column = field.name();
    let mut current = cells.read_ticks(meta, row, column)?.unwrap_or(0);
    let mut attempts = 0;

    while current != target {
        if attempts == MAX_COUNTER_ATTEMPTS {
            warn!(
                family = meta.family(),
                row,
                column,
                target,
                observed = current,
                "counter did not converge"
            );
            return Err(DbError::ConvergenceFailure {
                family: meta.family().to_string(),
                row: row.to_string(),
                column: column.to_string(),
                target,
                observed: current,
                attempts,
            });
        }

        let diff = target.checked_sub(current).ok_or_else(|| {
            DbError::TypeMismatch(format!("counter {} cannot move from {} to {}", column, current, target))
        })?;
        attempts += 1;
        trace!(family = meta.family(), row, column, attempt = attempts, current, target, diff, "reconciling counter");

        cells.add_ticks(meta, row, column, diff)?;
        current = cells.read_ticks(meta, row, column)?.unwrap_or(0);
    }

    if attempts > 1 {
        debug!(family = meta.family(), row, column, attempts, "counter converged after retries");
    }
    Ok(attempts)
}

/// Relative adjustment by `amount` ticks.
pub fn adjust<C: CounterCells + ?Sized>(
    cells: &C,
    meta: &EntityMetadata,
    row: &str,
    field: &ColumnField,
    amount: i64,
) -> Result<()> {
    trace!(family = meta.family(), row, column = field.name(), amount, "incrementing counter");
    cells.add_ticks(meta, row, field.name(), amount)
}

/// Logical value of a counter, scaled for decimal counters.
pub fn read<C: CounterCells + ?Sized>(
    cells: &C,
    meta: &EntityMetadata,
    row: &str,
    field: &ColumnField,
) -> Result<Value> {
    let raw = match cells.read_ticks(meta, row, field.name())? {
        Some(ticks) => Value::Integer(ticks),
        None => Value::Null,
    };
    Ok(field.parse_value(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldKind, FieldSpec};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Cells {
        values: RefCell<HashMap<String, i64>>,
        increments: Cell<u32>,
        // Added by a simulated concurrent writer after each increment.
        interference: Vec<i64>,
    }

    impl CounterCells for Cells {
        fn read_ticks(&self, _meta: &EntityMetadata, row: &str, column: &str) -> Result<Option<i64>> {
            Ok(self.values.borrow().get(&format!("{}/{}", row, column)).copied())
        }

        fn add_ticks(&self, _meta: &EntityMetadata, row: &str, column: &str, amount: i64) -> Result<()> {
            let n = self.increments.get();
            self.increments.set(n + 1);
            let extra = self.interference.get(n as usize).copied().unwrap_or(0);
            *self.values.borrow_mut().entry(format!("{}/{}", row, column)).or_insert(0) += amount + extra;
            Ok(())
        }
    }

    fn meta() -> EntityMetadata {
        let mut id = FieldSpec::new("id", FieldKind::Text);
        id.identity = true;
        let mut quantity = FieldSpec::new("quantity", FieldKind::Integer);
        quantity.counter = true;
        let mut refund = FieldSpec::new("refund", FieldKind::Decimal);
        refund.counter = true;
        refund.scale = Some(2);
        EntityMetadata::build("Order", vec![id, quantity, refund]).unwrap()
    }

    #[test]
    fn test_missing_counter_reads_as_zero() {
        let meta = meta();
        let cells = Cells::default();
        let field = meta.field_for("quantity").unwrap();
        assert_eq!(reconcile(&cells, &meta, "r", field, 5).unwrap(), 1);
        assert_eq!(cells.read_ticks(&meta, "r", "QUANTITY").unwrap(), Some(5));
    }

    #[test]
    fn test_repeat_set_is_a_no_op() {
        let meta = meta();
        let cells = Cells::default();
        let field = meta.field_for("quantity").unwrap();
        reconcile(&cells, &meta, "r", field, 9).unwrap();
        assert_eq!(reconcile(&cells, &meta, "r", field, 9).unwrap(), 0);
        assert_eq!(cells.increments.get(), 1);
    }

    #[test]
    fn test_retries_after_interference() {
        let meta = meta();
        let cells = Cells {
            interference: vec![3, -1],
            ..Cells::default()
        };
        let field = meta.field_for("quantity").unwrap();
        assert_eq!(reconcile(&cells, &meta, "r", field, 10).unwrap(), 3);
        assert_eq!(cells.read_ticks(&meta, "r", "QUANTITY").unwrap(), Some(10));
    }

    #[test]
    fn test_gives_up_after_four_increments() {
        let meta = meta();
        let cells = Cells {
            interference: vec![1; 8],
            ..Cells::default()
        };
        let field = meta.field_for("quantity").unwrap();
        match reconcile(&cells, &meta, "r", field, 10) {
            Err(DbError::ConvergenceFailure { target, observed, attempts, .. }) => {
                assert_eq!(target, 10);
                assert_eq!(observed, 11);
                assert_eq!(attempts, MAX_COUNTER_ATTEMPTS);
            }
            other => panic!("expected convergence failure, got {:?}", other),
        }
        assert_eq!(cells.increments.get(), MAX_COUNTER_ATTEMPTS);
    }

    #[test]
    fn test_decimal_read_is_scaled() {
        let meta = meta();
        let cells = Cells::default();
        let field = meta.field_for("refund").unwrap();
        adjust(&cells, &meta, "r", field, 15).unwrap();
        assert_eq!(read(&cells, &meta, "r", field).unwrap().to_string(), "0.15");
        adjust(&cells, &meta, "r", field, 15).unwrap();
        assert_eq!(read(&cells, &meta, "r", field).unwrap().to_string(), "0.30");
    }
}
