//! Declarative column-by-column planning.
//!
//! Most providers plan the same way: a handful of columns can be filtered,
//! some only by equality, some also by range, some are mandatory parameters.
//! [`ColumnPlanner`] captures that description once and turns every
//! [`PlanRequest`] into a [`PlanOutcome`].
//!
//! Selection rules, applied per filter in declaration order:
//!
//! 1. Only constraints on the filter's column with a supported operator are
//!    considered, in engine-supplied order.
//! 2. The first usable equality constraint wins.
//! 3. Otherwise, for range filters, the first usable lower bound and the
//!    first usable upper bound are accepted.
//! 4. A required filter left with nothing usable makes the whole request
//!    [`PlanOutcome::NoUsablePlan`].
//!
//! Accepted constraints receive argument positions in the same order, and
//! the plan label lists them so the cursor can decode its arguments.

use crate::error::Result;
use crate::plan::{
    ConstraintOp, PlanBuilder, PlanId, PlanLabel, PlanOutcome, PlanRequest, PlanTerm,
};

/// Row reduction assumed for an accepted equality constraint.
const EQUALITY_SELECTIVITY: f64 = 10.0;

/// Row reduction assumed for each accepted range bound.
const RANGE_SELECTIVITY: f64 = 4.0;

/// Operators a filter can honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operators {
    /// `=` and `IS` only.
    Equality,
    /// Equality plus `<`, `<=`, `>` and `>=`.
    EqualityOrRange,
}

/// A column the provider can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnFilter {
    column: i32,
    bit: i32,
    operators: Operators,
    required: bool,
    unique: bool,
    omit: bool,
}

impl ColumnFilter {
    /// Equality-only filter on `column`; `bit` is set in the plan id when
    /// the filter is used.
    pub fn equality(column: i32, bit: i32) -> Self {
        Self {
            column,
            bit,
            operators: Operators::Equality,
            required: false,
            unique: false,
            omit: false,
        }
    }

    /// Equality-or-range filter on `column`.
    pub fn range(column: i32, bit: i32) -> Self {
        Self {
            operators: Operators::EqualityOrRange,
            ..Self::equality(column, bit)
        }
    }

    /// Plans without this filter are infeasible.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// An equality match on this column yields at most one row.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// The cursor enforces the constraint exactly; the engine need not
    /// re-check it.
    pub fn omit(mut self) -> Self {
        self.omit = true;
        self
    }

    pub fn column(&self) -> i32 {
        self.column
    }

    pub fn bit(&self) -> i32 {
        self.bit
    }

    fn supports(&self, op: ConstraintOp) -> bool {
        op.is_equality() || (self.operators == Operators::EqualityOrRange && op.is_range())
    }
}

/// A natural output order the provider can produce without sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ordering {
    column: i32,
    ascending_bit: Option<i32>,
    descending_bit: Option<i32>,
}

/// Declarative planner built from [`ColumnFilter`]s.
///
/// # Examples
///
/// ```
/// use tablebridge_core::*;
///
/// // A table-valued function with a mandatory parameter column 1.
/// let planner = ColumnPlanner::new(100)
///     .filter(ColumnFilter::equality(1, 0x1).required().omit());
///
/// let unusable = PlanRequest::new(vec![Constraint::new(1, ConstraintOp::Eq, false)], vec![]);
/// assert_eq!(planner.plan(&unusable).unwrap(), PlanOutcome::NoUsablePlan);
///
/// let usable = PlanRequest::new(vec![Constraint::new(1, ConstraintOp::Eq, true)], vec![]);
/// let outcome = planner.plan(&usable).unwrap();
/// assert!(outcome.plan().unwrap().id().contains(0x1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlanner {
    table_rows: i64,
    filters: Vec<ColumnFilter>,
    orderings: Vec<Ordering>,
}

impl ColumnPlanner {
    /// Creates a planner for a table of roughly `table_rows` rows.
    pub fn new(table_rows: i64) -> Self {
        Self {
            table_rows: table_rows.max(1),
            filters: Vec::new(),
            orderings: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: ColumnFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Declares that rows can be produced ordered by `column`. The matching
    /// bit is set in the plan id when a single-term ORDER BY on `column` is
    /// consumed; a direction without a bit is left for the engine to sort.
    pub fn ordered_by(
        mut self,
        column: i32,
        ascending_bit: Option<i32>,
        descending_bit: Option<i32>,
    ) -> Self {
        self.orderings.push(Ordering {
            column,
            ascending_bit,
            descending_bit,
        });
        self
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        &self.filters
    }

    /// Negotiates a plan for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Planning`](crate::BridgeError::Planning) only if
    /// the builder rejects a choice, which indicates a bug in the filter
    /// description rather than an unusable request.
    pub fn plan(&self, request: &PlanRequest) -> Result<PlanOutcome> {
        let mut builder = PlanBuilder::new(request);
        let mut id = PlanId::FULL_SCAN;
        let mut terms = Vec::new();
        let mut rows = self.table_rows as f64;
        let mut unique = false;

        for filter in &self.filters {
            let chosen = choose(filter, request);
            if chosen.is_empty() {
                if filter.required {
                    return Ok(PlanOutcome::NoUsablePlan);
                }
                continue;
            }

            for (index, op) in chosen {
                builder.accept(index, filter.omit)?;
                terms.push(PlanTerm {
                    column: filter.column,
                    op,
                });
                if op.is_equality() {
                    rows /= EQUALITY_SELECTIVITY;
                    unique |= filter.unique;
                } else {
                    rows /= RANGE_SELECTIVITY;
                }
            }
            id = id.with(filter.bit);
        }

        if let [term] = request.order_by.as_slice()
            && let Some(ordering) = self.orderings.iter().find(|o| o.column == term.column)
        {
            let bit = if term.descending {
                ordering.descending_bit
            } else {
                ordering.ascending_bit
            };
            if let Some(bit) = bit {
                id = id.with(bit);
                builder.consume_order();
            }
        }

        builder.set_id(id);
        if !terms.is_empty() {
            builder.set_label(PlanLabel::encode(&terms));
        }
        if unique {
            builder.set_unique();
        } else {
            builder.set_estimated_rows(rows.ceil() as i64);
        }
        Ok(builder.finish())
    }
}

/// Picks the constraints `filter` will accept, in argument order.
fn choose(filter: &ColumnFilter, request: &PlanRequest) -> Vec<(usize, ConstraintOp)> {
    let candidates: Vec<_> = request
        .on_column(filter.column)
        .filter(|(_, c)| c.usable && filter.supports(c.op))
        .collect();

    if let Some((index, c)) = candidates.iter().find(|(_, c)| c.op.is_equality()) {
        return vec![(*index, c.op)];
    }

    let lower = candidates.iter().find(|(_, c)| c.op.is_lower_bound());
    let upper = candidates.iter().find(|(_, c)| c.op.is_upper_bound());
    lower
        .into_iter()
        .chain(upper)
        .map(|(index, c)| (*index, c.op))
        .collect()
}
