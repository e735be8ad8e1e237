//! `generate_series(start, stop, step)` as a table-valued function.
//!
//! ```sql
//! SELECT value FROM generate_series(1, 10, 3);          -- 1, 4, 7, 10
//! SELECT value FROM generate_series(0, 100) WHERE value > 95;
//! SELECT value FROM generate_series(1, 5) ORDER BY value DESC;
//! ```
//!
//! `start` is required. `stop` defaults to 4294967295 and `step` to 1; a
//! step of 0 is treated as 1. A negative step walks the series from the top
//! unless an ORDER BY on `value` asks otherwise. A NULL parameter yields no
//! rows. Range constraints on `value` are pushed into the scan, and ORDER BY
//! `value` in either direction never needs a sort.

use tablebridge_core::{
    Arguments, BridgeError, ChosenPlan, ColumnFilter, ColumnPlanner, ConstraintOp, Cursor,
    PlanOutcome, PlanRequest, Provider, ProviderOptions, Result, Value,
};
use tracing::trace;

/// Default upper bound when `stop` is not given.
pub const DEFAULT_STOP: i64 = 0xffff_ffff;

const VALUE: i32 = 0;
const START: i32 = 1;
const STOP: i32 = 2;
const STEP: i32 = 3;

/// Plan id bits.
const START_BIT: i32 = 0x01;
const STOP_BIT: i32 = 0x02;
const STEP_BIT: i32 = 0x04;
const VALUE_BIT: i32 = 0x08;
const ASC_BIT: i32 = 0x10;
const DESC_BIT: i32 = 0x20;

/// Rough row count before any constraint narrows the series.
const ESTIMATED_ROWS: i64 = 1_000_000;

/// Provider behind `generate_series`.
#[derive(Debug, Clone)]
pub struct Series {
    planner: ColumnPlanner,
}

impl Provider for Series {
    type Cursor = SeriesCursor;

    fn construct(args: &Arguments) -> Result<Self> {
        if !args.args().is_empty() {
            return Err(BridgeError::construction(format!(
                "{} takes no module arguments, got {}",
                args.module(),
                args.args().join(", ")
            )));
        }
        let planner = ColumnPlanner::new(ESTIMATED_ROWS)
            .filter(ColumnFilter::equality(START, START_BIT).required().omit())
            .filter(ColumnFilter::equality(STOP, STOP_BIT).omit())
            .filter(ColumnFilter::equality(STEP, STEP_BIT).omit())
            .filter(ColumnFilter::range(VALUE, VALUE_BIT))
            .ordered_by(VALUE, Some(ASC_BIT), Some(DESC_BIT));
        Ok(Series { planner })
    }

    fn schema(&self) -> String {
        "CREATE TABLE x(value INTEGER, start HIDDEN, stop HIDDEN, step HIDDEN)".to_string()
    }

    fn options(&self) -> ProviderOptions {
        ProviderOptions::default().innocuous()
    }

    fn plan(&self, request: &PlanRequest) -> Result<PlanOutcome> {
        self.planner.plan(request)
    }

    fn open(&self) -> Result<SeriesCursor> {
        Ok(SeriesCursor::default())
    }
}

/// Bounds of one scan, as member indexes `k` of `start + k * step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Walk {
    start: i64,
    stop: i64,
    step: i64,
    /// Magnitude of `step`.
    stride: i128,
    first: i128,
    last: i128,
    descending: bool,
}

impl Walk {
    fn value(&self, k: i128) -> i64 {
        // In range by construction: start <= value <= stop.
        (i128::from(self.start) + k * self.stride) as i64
    }
}

/// Cursor over one `generate_series` scan.
#[derive(Debug, Clone, Default)]
pub struct SeriesCursor {
    walk: Walk,
    current: i128,
    done: bool,
}

impl SeriesCursor {
    fn parameter(value: &Value, name: &str) -> Result<Option<i64>> {
        match value {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            Value::Real(f) => Ok(Some(*f as i64)),
            Value::Text(s) => s.trim().parse().map(Some).map_err(|_| {
                BridgeError::execution(format!("generate_series {name} must be an integer, got '{s}'"))
            }),
            Value::Blob(_) => Err(BridgeError::execution(format!(
                "generate_series {name} must be an integer, got a blob"
            ))),
        }
    }
}

/// Smallest value allowed by a lower bound or equality on `value`.
///
/// Integer bounds stay exact; only real bounds are rounded.
fn min_value(op: ConstraintOp, bound: &Value) -> Option<i128> {
    match (bound, op) {
        (Value::Integer(i), ConstraintOp::Gt) => Some(i128::from(*i) + 1),
        (Value::Integer(i), _) => Some(i128::from(*i)),
        (Value::Real(f), _) if f.is_nan() => None,
        (Value::Real(f), ConstraintOp::Gt) => Some((f.floor() as i128).saturating_add(1)),
        (Value::Real(f), _) => Some(f.ceil() as i128),
        _ => None,
    }
}

/// Largest value allowed by an upper bound or equality on `value`.
fn max_value(op: ConstraintOp, bound: &Value) -> Option<i128> {
    match (bound, op) {
        (Value::Integer(i), ConstraintOp::Lt) => Some(i128::from(*i) - 1),
        (Value::Integer(i), _) => Some(i128::from(*i)),
        (Value::Real(f), _) if f.is_nan() => None,
        (Value::Real(f), ConstraintOp::Lt) => Some((f.ceil() as i128).saturating_sub(1)),
        (Value::Real(f), _) => Some(f.floor() as i128),
        _ => None,
    }
}

/// Smallest member index whose value is at least `min`.
fn lower_index(start: i64, stride: i128, min: i128) -> i128 {
    let offset = min.saturating_sub(i128::from(start));
    if offset <= 0 {
        0
    } else {
        offset.saturating_add(stride - 1) / stride
    }
}

/// Largest member index whose value is at most `max`.
fn upper_index(start: i64, stride: i128, max: i128) -> i128 {
    let offset = max.saturating_sub(i128::from(start));
    if offset < 0 { -1 } else { offset / stride }
}

impl Cursor for SeriesCursor {
    fn filter(&mut self, args: &[Value], plan: &ChosenPlan<'_>) -> Result<()> {
        let terms = plan.terms()?;
        if terms.len() != args.len() {
            return Err(BridgeError::execution(format!(
                "plan names {} arguments, received {}",
                terms.len(),
                args.len()
            )));
        }

        let mut start = None;
        let mut stop = Some(DEFAULT_STOP);
        let mut step = Some(1);
        let mut bounds = Vec::new();
        for (term, arg) in terms.iter().zip(args) {
            match term.column {
                START => start = Self::parameter(arg, "start")?,
                STOP => stop = Self::parameter(arg, "stop")?,
                STEP => step = Self::parameter(arg, "step")?,
                VALUE => bounds.push((term.op, arg)),
                other => {
                    return Err(BridgeError::execution(format!(
                        "generate_series has no constraint on column {other}"
                    )));
                }
            }
        }

        let (Some(start), Some(stop), Some(step)) = (start, stop, step) else {
            self.done = true;
            return Ok(());
        };
        let step = if step == 0 { 1 } else { step };
        let stride = i128::from(step).abs();
        let count = if stop < start {
            0
        } else {
            (i128::from(stop) - i128::from(start)) / stride + 1
        };

        let mut first = 0i128;
        let mut last = count - 1;
        // Non-numeric bounds are left to the engine.
        for (op, bound) in bounds {
            if op.is_equality() || op.is_lower_bound() {
                if let Some(min) = min_value(op, bound) {
                    first = first.max(lower_index(start, stride, min));
                }
            }
            if op.is_equality() || op.is_upper_bound() {
                if let Some(max) = max_value(op, bound) {
                    last = last.min(upper_index(start, stride, max));
                }
            }
        }

        let descending = if plan.id.contains(DESC_BIT) {
            true
        } else if plan.id.contains(ASC_BIT) {
            false
        } else {
            step < 0
        };

        self.walk = Walk {
            start,
            stop,
            step,
            stride,
            first,
            last,
            descending,
        };
        self.done = first > last;
        self.current = if descending { last } else { first };
        trace!(start, stop, step, first = %first, last = %last, descending, "series filter");
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        if self.walk.descending {
            self.current -= 1;
            self.done = self.current < self.walk.first;
        } else {
            self.current += 1;
            self.done = self.current > self.walk.last;
        }
        Ok(())
    }

    fn at_end(&self) -> bool {
        self.done
    }

    fn column(&self, index: usize) -> Result<Value> {
        let value = match index as i32 {
            VALUE => self.walk.value(self.current),
            START => self.walk.start,
            STOP => self.walk.stop,
            STEP => self.walk.step,
            _ => return Err(BridgeError::execution(format!("no column {index}"))),
        };
        Ok(Value::Integer(value))
    }

    fn row_identity(&self) -> Result<i64> {
        Ok(self.walk.value(self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablebridge_core::{ConnectMode, Constraint, OrderTerm, PlanId, PlanLabel, PlanTerm};

    fn series() -> Series {
        Series::construct(&Arguments::new(
            ConnectMode::Connect,
            "generate_series",
            "main",
            "generate_series",
            vec![],
        ))
        .unwrap()
    }

    fn scan(id: i32, terms: &[(i32, ConstraintOp)], args: &[Value]) -> Vec<i64> {
        let terms: Vec<PlanTerm> = terms
            .iter()
            .map(|&(column, op)| PlanTerm { column, op })
            .collect();
        let label = PlanLabel::encode(&terms);
        let mut cursor = series().open().unwrap();
        cursor
            .filter(args, &ChosenPlan::new(PlanId(id), Some(&label)))
            .unwrap();
        let mut out = Vec::new();
        while !cursor.at_end() {
            out.push(cursor.column(0).unwrap().as_i64().unwrap());
            assert_eq!(cursor.row_identity().unwrap(), *out.last().unwrap());
            cursor.advance().unwrap();
        }
        out
    }

    const EQ: ConstraintOp = ConstraintOp::Eq;

    #[test]
    fn test_rejects_module_arguments() {
        let err = Series::construct(&Arguments::new(
            ConnectMode::Create,
            "generate_series",
            "main",
            "s",
            vec!["x=1".into()],
        ))
        .unwrap_err();
        assert!(matches!(err, BridgeError::Construction(_)));
    }

    #[test]
    fn test_start_is_required() {
        let request = PlanRequest::new(vec![Constraint::new(STOP, EQ, true)], vec![]);
        assert_eq!(series().plan(&request).unwrap(), PlanOutcome::NoUsablePlan);
    }

    #[test]
    fn test_plan_consumes_value_ordering() {
        let request = PlanRequest::new(
            vec![Constraint::new(START, EQ, true)],
            vec![OrderTerm::new(VALUE, true)],
        );
        let outcome = series().plan(&request).unwrap();
        let plan = outcome.plan().unwrap();
        assert!(plan.order_consumed());
        assert!(plan.id().contains(START_BIT | DESC_BIT));
    }

    #[test]
    fn test_basic_series() {
        let terms = [(START, EQ), (STOP, EQ), (STEP, EQ)];
        let args = [Value::Integer(1), Value::Integer(10), Value::Integer(3)];
        assert_eq!(scan(7, &terms, &args), vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_default_step_and_zero_step() {
        let terms = [(START, EQ), (STOP, EQ)];
        assert_eq!(
            scan(3, &terms, &[Value::Integer(-2), Value::Integer(2)]),
            vec![-2, -1, 0, 1, 2]
        );
        let terms = [(START, EQ), (STOP, EQ), (STEP, EQ)];
        let args = [Value::Integer(5), Value::Integer(7), Value::Integer(0)];
        assert_eq!(scan(7, &terms, &args), vec![5, 6, 7]);
    }

    #[test]
    fn test_negative_step_reverses_unless_ordered() {
        let terms = [(START, EQ), (STOP, EQ), (STEP, EQ)];
        let args = [Value::Integer(0), Value::Integer(10), Value::Integer(-5)];
        assert_eq!(scan(7, &terms, &args), vec![10, 5, 0]);
        assert_eq!(scan(7 | ASC_BIT, &terms, &args), vec![0, 5, 10]);
    }

    #[test]
    fn test_descending_plan_bit() {
        let terms = [(START, EQ), (STOP, EQ)];
        let args = [Value::Integer(1), Value::Integer(3)];
        assert_eq!(scan(3 | DESC_BIT, &terms, &args), vec![3, 2, 1]);
    }

    #[test]
    fn test_value_bounds_narrow_the_walk() {
        let terms = [
            (START, EQ),
            (STOP, EQ),
            (STEP, EQ),
            (VALUE, ConstraintOp::Gt),
            (VALUE, ConstraintOp::Le),
        ];
        let args = [
            Value::Integer(0),
            Value::Integer(100),
            Value::Integer(10),
            Value::Integer(25),
            Value::Real(70.5),
        ];
        assert_eq!(scan(15, &terms, &args), vec![30, 40, 50, 60, 70]);
    }

    #[test]
    fn test_value_equality_and_empty_ranges() {
        let terms = [(START, EQ), (STOP, EQ), (VALUE, EQ)];
        let hit = [Value::Integer(0), Value::Integer(9), Value::Integer(4)];
        let miss = [Value::Integer(0), Value::Integer(9), Value::Real(4.5)];
        assert_eq!(scan(11, &terms, &hit), vec![4]);
        assert!(scan(11, &terms, &miss).is_empty());

        let terms = [(START, EQ), (STOP, EQ)];
        assert!(scan(3, &terms, &[Value::Integer(5), Value::Integer(1)]).is_empty());
    }

    #[test]
    fn test_integer_bounds_beyond_f64_precision_are_exact() {
        const BASE: i64 = 9_007_199_254_740_990;
        let terms = [(START, EQ), (STOP, EQ), (VALUE, EQ)];
        let args = [
            Value::Integer(BASE),
            Value::Integer(BASE + 10),
            Value::Integer(BASE + 5),
        ];
        assert_eq!(scan(11, &terms, &args), vec![BASE + 5]);

        let terms = [
            (START, EQ),
            (STOP, EQ),
            (VALUE, ConstraintOp::Ge),
            (VALUE, ConstraintOp::Le),
        ];
        let args = [
            Value::Integer(BASE),
            Value::Integer(BASE + 10),
            Value::Integer(BASE + 5),
            Value::Integer(BASE + 7),
        ];
        assert_eq!(scan(11, &terms, &args), vec![BASE + 5, BASE + 6, BASE + 7]);

        let terms = [
            (START, EQ),
            (STOP, EQ),
            (VALUE, ConstraintOp::Gt),
            (VALUE, ConstraintOp::Lt),
        ];
        let args = [
            Value::Integer(i64::MAX - 4),
            Value::Integer(i64::MAX),
            Value::Integer(i64::MAX - 3),
            Value::Integer(i64::MAX),
        ];
        assert_eq!(scan(11, &terms, &args), vec![i64::MAX - 2, i64::MAX - 1]);
    }

    #[test]
    fn test_text_value_bound_does_not_narrow() {
        let terms = [(START, EQ), (STOP, EQ), (VALUE, ConstraintOp::Lt)];
        let args = [Value::Integer(1), Value::Integer(3), Value::from("a")];
        assert_eq!(scan(11, &terms, &args), vec![1, 2, 3]);
    }

    #[test]
    fn test_null_parameter_yields_nothing() {
        let terms = [(START, EQ), (STOP, EQ)];
        assert!(scan(3, &terms, &[Value::Integer(1), Value::Null]).is_empty());
    }

    #[test]
    fn test_extreme_bounds_do_not_overflow() {
        let terms = [(START, EQ), (STOP, EQ), (STEP, EQ)];
        let args = [
            Value::Integer(i64::MAX - 2),
            Value::Integer(i64::MAX),
            Value::Integer(i64::MAX),
        ];
        assert_eq!(scan(7, &terms, &args), vec![i64::MAX - 2]);

        let args = [
            Value::Integer(i64::MIN),
            Value::Integer(i64::MAX),
            Value::Integer(i64::MIN),
        ];
        assert_eq!(scan(7 | ASC_BIT, &terms, &args), vec![i64::MIN, 0]);
    }

    #[test]
    fn test_default_stop() {
        let terms = [(START, EQ), (VALUE, ConstraintOp::Ge)];
        let args = [Value::Integer(0), Value::Integer(DEFAULT_STOP - 1)];
        assert_eq!(scan(9, &terms, &args), vec![DEFAULT_STOP - 1, DEFAULT_STOP]);
    }

    #[test]
    fn test_text_parameter_must_be_numeric() {
        let mut cursor = series().open().unwrap();
        let label = PlanLabel::encode(&[PlanTerm { column: START, op: EQ }]);
        let err = cursor
            .filter(&[Value::from("abc")], &ChosenPlan::new(PlanId(1), Some(&label)))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution(_)));
    }
}
