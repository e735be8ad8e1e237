//! Query plan negotiation model.
//!
//! Before each scan the engine describes the WHERE-clause constraints and
//! ORDER BY terms it could push down ([`PlanRequest`]). The provider answers
//! with a [`PlanOutcome`]: either a [`Plan`] saying which constraints it will
//! honor (and in which argument position their values arrive at `filter`),
//! or [`PlanOutcome::NoUsablePlan`] so the engine tries another strategy.
//!
//! [`PlanBuilder`] is the only way to produce a [`Plan`]. It hands out
//! argument positions itself, so every accepted constraint receives a unique
//! position and the positions form the contiguous range
//! `FIRST_ARGUMENT..FIRST_ARGUMENT + accepted`.

use crate::error::{BridgeError, Result};

/// Argument position given to the first accepted constraint.
pub const FIRST_ARGUMENT: u32 = 1;

/// Row estimate used when a plan accepts nothing.
pub const FULL_SCAN_ROWS: i64 = 1_000_000;

/// Comparison operator of a candidate constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintOp {
    Eq,
    Gt,
    Le,
    Lt,
    Ge,
    Match,
    Like,
    Glob,
    Regexp,
    Ne,
    IsNot,
    IsNotNull,
    IsNull,
    Is,
    Limit,
    Offset,
    /// Overloaded function operator (engine code 150 and above).
    Function(u8),
}

impl ConstraintOp {
    /// Decodes an engine operator code.
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Self::Eq,
            4 => Self::Gt,
            8 => Self::Le,
            16 => Self::Lt,
            32 => Self::Ge,
            64 => Self::Match,
            65 => Self::Like,
            66 => Self::Glob,
            67 => Self::Regexp,
            68 => Self::Ne,
            69 => Self::IsNot,
            70 => Self::IsNotNull,
            71 => Self::IsNull,
            72 => Self::Is,
            73 => Self::Limit,
            74 => Self::Offset,
            other => Self::Function(other),
        }
    }

    /// Encodes this operator as an engine operator code.
    pub fn code(self) -> u8 {
        match self {
            Self::Eq => 2,
            Self::Gt => 4,
            Self::Le => 8,
            Self::Lt => 16,
            Self::Ge => 32,
            Self::Match => 64,
            Self::Like => 65,
            Self::Glob => 66,
            Self::Regexp => 67,
            Self::Ne => 68,
            Self::IsNot => 69,
            Self::IsNotNull => 70,
            Self::IsNull => 71,
            Self::Is => 72,
            Self::Limit => 73,
            Self::Offset => 74,
            Self::Function(code) => code,
        }
    }

    /// `=` and `IS` pin a column to a single value.
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Is)
    }

    /// `>`, `>=`, `<` and `<=`.
    pub fn is_range(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }

    pub fn is_lower_bound(self) -> bool {
        matches!(self, Self::Gt | Self::Ge)
    }

    pub fn is_upper_bound(self) -> bool {
        matches!(self, Self::Lt | Self::Le)
    }
}

/// A candidate WHERE-clause term on one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    /// Column index; `-1` is the row identity.
    pub column: i32,
    pub op: ConstraintOp,
    /// `false` when the right-hand side is not available for this plan
    /// (for example it comes from a table later in the join order).
    pub usable: bool,
}

impl Constraint {
    pub fn new(column: i32, op: ConstraintOp, usable: bool) -> Self {
        Self { column, op, usable }
    }
}

/// One ORDER BY term requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: i32,
    pub descending: bool,
}

impl OrderTerm {
    pub fn new(column: i32, descending: bool) -> Self {
        Self { column, descending }
    }
}

/// Everything the engine offers for one round of plan negotiation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanRequest {
    /// Candidate constraints, in engine order.
    pub constraints: Vec<Constraint>,
    /// Requested output order.
    pub order_by: Vec<OrderTerm>,
    /// Bit `n` set when column `n` is read by the statement (bit 63 covers
    /// every column from 63 upwards).
    pub columns_used: u64,
}

impl PlanRequest {
    pub fn new(constraints: Vec<Constraint>, order_by: Vec<OrderTerm>) -> Self {
        Self {
            constraints,
            order_by,
            columns_used: u64::MAX,
        }
    }

    /// Sets the column usage mask.
    pub fn with_columns_used(mut self, mask: u64) -> Self {
        self.columns_used = mask;
        self
    }

    /// Iterates constraints on `column`, keeping their indexes.
    pub fn on_column(&self, column: i32) -> impl Iterator<Item = (usize, &Constraint)> {
        self.constraints
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.column == column)
    }
}

/// Opaque plan number handed back to the cursor's `filter` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlanId(pub i32);

impl PlanId {
    /// The plan that accepts nothing.
    pub const FULL_SCAN: PlanId = PlanId(0);

    /// Returns `true` if every bit of `bits` is set.
    pub fn contains(self, bits: i32) -> bool {
        bits != 0 && self.0 & bits == bits
    }

    /// Returns this id with `bits` set.
    pub fn with(self, bits: i32) -> Self {
        PlanId(self.0 | bits)
    }
}

/// How an accepted constraint reaches the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintUse {
    /// 1-based position of the constraint's value in the `filter` arguments.
    pub argument: u32,
    /// When `true` the engine trusts the cursor to enforce the constraint
    /// and does not re-check rows.
    pub omit: bool,
}

/// An accepted query plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    id: PlanId,
    label: Option<String>,
    usage: Vec<Option<ConstraintUse>>,
    estimated_cost: f64,
    estimated_rows: i64,
    order_consumed: bool,
    unique: bool,
}

impl Plan {
    pub fn id(&self) -> PlanId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Usage per request constraint, parallel to
    /// [`PlanRequest::constraints`].
    pub fn usage(&self) -> &[Option<ConstraintUse>] {
        &self.usage
    }

    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    pub fn estimated_rows(&self) -> i64 {
        self.estimated_rows
    }

    /// `true` when rows come out in the requested ORDER BY order.
    pub fn order_consumed(&self) -> bool {
        self.order_consumed
    }

    /// `true` when the scan visits at most one row.
    pub fn unique(&self) -> bool {
        self.unique
    }

    /// Number of accepted constraints.
    pub fn accepted(&self) -> usize {
        self.usage.iter().flatten().count()
    }
}

/// Result of plan negotiation.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// Use this plan.
    Use(Plan),
    /// No plan exists for this combination of usable constraints. This is a
    /// normal outcome, not an error: the engine tries another join order or
    /// strategy.
    NoUsablePlan,
}

impl PlanOutcome {
    /// Returns the plan, if one was chosen.
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            PlanOutcome::Use(plan) => Some(plan),
            PlanOutcome::NoUsablePlan => None,
        }
    }
}

/// Incrementally builds a [`Plan`] for one [`PlanRequest`].
///
/// # Examples
///
/// ```
/// use tablebridge_core::*;
///
/// let request = PlanRequest::new(
///     vec![
///         Constraint::new(0, ConstraintOp::Eq, true),
///         Constraint::new(2, ConstraintOp::Eq, false),
///         Constraint::new(1, ConstraintOp::Lt, true),
///     ],
///     vec![],
/// );
/// let mut builder = PlanBuilder::new(&request);
/// assert_eq!(builder.accept(2, false).unwrap(), 1);
/// assert_eq!(builder.accept(0, true).unwrap(), 2);
/// assert!(builder.accept(1, false).is_err()); // not usable
///
/// let plan = builder.finish();
/// assert_eq!(plan.plan().unwrap().accepted(), 2);
/// ```
#[derive(Debug)]
pub struct PlanBuilder<'a> {
    request: &'a PlanRequest,
    usage: Vec<Option<ConstraintUse>>,
    next_argument: u32,
    id: PlanId,
    label: Option<String>,
    estimated_cost: Option<f64>,
    estimated_rows: i64,
    order_consumed: bool,
    unique: bool,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(request: &'a PlanRequest) -> Self {
        Self {
            request,
            usage: vec![None; request.constraints.len()],
            next_argument: FIRST_ARGUMENT,
            id: PlanId::FULL_SCAN,
            label: None,
            estimated_cost: None,
            estimated_rows: FULL_SCAN_ROWS,
            order_consumed: false,
            unique: false,
        }
    }

    /// Accepts constraint `index` and returns its argument position.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Planning`] if `index` is out of range, the
    /// constraint is not usable, or it was already accepted.
    pub fn accept(&mut self, index: usize, omit: bool) -> Result<u32> {
        let constraint = self.request.constraints.get(index).ok_or_else(|| {
            BridgeError::planning(format!(
                "constraint index {index} out of range ({} candidates)",
                self.request.constraints.len()
            ))
        })?;
        if !constraint.usable {
            return Err(BridgeError::planning(format!(
                "constraint {index} on column {} is not usable",
                constraint.column
            )));
        }
        if self.usage[index].is_some() {
            return Err(BridgeError::planning(format!(
                "constraint {index} accepted twice"
            )));
        }
        let argument = self.next_argument;
        self.usage[index] = Some(ConstraintUse { argument, omit });
        self.next_argument += 1;
        Ok(argument)
    }

    /// Number of constraints accepted so far.
    pub fn accepted(&self) -> usize {
        (self.next_argument - FIRST_ARGUMENT) as usize
    }

    pub fn set_id(&mut self, id: PlanId) -> &mut Self {
        self.id = id;
        self
    }

    pub fn set_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the row estimate; values below one are clamped to one.
    pub fn set_estimated_rows(&mut self, rows: i64) -> &mut Self {
        self.estimated_rows = rows.max(1);
        self
    }

    /// Sets the cost estimate. Defaults to the row estimate.
    pub fn set_estimated_cost(&mut self, cost: f64) -> &mut Self {
        self.estimated_cost = Some(cost);
        self
    }

    /// Marks the requested ORDER BY as satisfied by the scan.
    pub fn consume_order(&mut self) -> &mut Self {
        self.order_consumed = true;
        self
    }

    /// Marks the scan as visiting at most one row.
    pub fn set_unique(&mut self) -> &mut Self {
        self.unique = true;
        self.estimated_rows = 1;
        self
    }

    pub fn finish(self) -> PlanOutcome {
        PlanOutcome::Use(Plan {
            id: self.id,
            label: self.label,
            usage: self.usage,
            estimated_cost: self
                .estimated_cost
                .unwrap_or(self.estimated_rows as f64),
            estimated_rows: self.estimated_rows,
            order_consumed: self.order_consumed,
            unique: self.unique,
        })
    }
}

/// One accepted `(column, operator)` pair recorded in a plan label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanTerm {
    pub column: i32,
    pub op: ConstraintOp,
}

/// Encoding of accepted terms into the plan label string.
///
/// Terms are written in argument order as `column:opcode` separated by
/// commas, e.g. `1:2,0:32` for "column 1 equals arg 1, column 0 >= arg 2".
pub struct PlanLabel;

impl PlanLabel {
    pub fn encode(terms: &[PlanTerm]) -> String {
        terms
            .iter()
            .map(|t| format!("{}:{}", t.column, t.op.code()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// # Errors
    ///
    /// Returns [`BridgeError::Execution`] for a malformed label.
    pub fn decode(label: &str) -> Result<Vec<PlanTerm>> {
        if label.is_empty() {
            return Ok(Vec::new());
        }
        label
            .split(',')
            .map(|part| {
                let (column, code) = part
                    .split_once(':')
                    .ok_or_else(|| BridgeError::execution(format!("malformed plan term '{part}'")))?;
                let column = column
                    .parse::<i32>()
                    .map_err(|_| BridgeError::execution(format!("malformed plan column '{column}'")))?;
                let code = code
                    .parse::<u8>()
                    .map_err(|_| BridgeError::execution(format!("malformed plan operator '{code}'")))?;
                Ok(PlanTerm {
                    column,
                    op: ConstraintOp::from_code(code),
                })
            })
            .collect()
    }
}

/// The plan selected by the engine, as seen by a cursor's `filter` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChosenPlan<'a> {
    pub id: PlanId,
    pub label: Option<&'a str>,
}

impl<'a> ChosenPlan<'a> {
    pub fn new(id: PlanId, label: Option<&'a str>) -> Self {
        Self { id, label }
    }

    /// Decodes the label into accepted terms, in argument order.
    pub fn terms(&self) -> Result<Vec<PlanTerm>> {
        match self.label {
            Some(label) => PlanLabel::decode(label),
            None => Ok(Vec::new()),
        }
    }
}
