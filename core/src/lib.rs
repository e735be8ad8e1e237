//! Engine-neutral model for pluggable table providers.
//!
//! This crate defines everything a table provider needs to talk to a query
//! engine without touching the engine's C ABI:
//!
//! - [`Provider`] and [`Cursor`]: the capability sets a user type implements
//!   to back a virtual table and to iterate one scan over it.
//! - [`Value`]: the row value model (integer, real, text, blob, null).
//! - [`Arguments`]: the argument strings handed to a provider constructor,
//!   with `key=value` parsing helpers.
//! - [`PlanRequest`], [`PlanBuilder`], [`PlanOutcome`]: the query plan
//!   negotiation model, plus [`ColumnPlanner`] for declarative planning.
//! - [`BridgeError`] / [`ErrorKind`]: recoverable errors raised by providers
//!   and cursors.
//!
//! The SQLite bridge lives in `tablebridge-sqlite`; nothing here depends on
//! it, so providers and their planning logic can be unit tested in isolation.
//!
//! # Example
//!
//! ```
//! use tablebridge_core::*;
//!
//! let request = PlanRequest::new(
//!     vec![
//!         Constraint::new(1, ConstraintOp::Ge, true),
//!         Constraint::new(1, ConstraintOp::Eq, true),
//!     ],
//!     vec![],
//! );
//! let planner = ColumnPlanner::new(1_000).filter(ColumnFilter::range(1, 0x1));
//!
//! let PlanOutcome::Use(plan) = planner.plan(&request).unwrap() else {
//!     panic!("expected a usable plan");
//! };
//! // Equality wins over the range constraint on the same column.
//! assert_eq!(plan.usage()[1].map(|u| u.argument), Some(1));
//! assert!(plan.usage()[0].is_none());
//! ```

mod args;
mod error;
mod plan;
mod planner;
mod provider;
mod value;

pub use args::{Arguments, ConnectMode, dequote, parameter, parse_boolean};
pub use error::{BridgeError, ErrorKind, Result};
pub use plan::{
    ChosenPlan, Constraint, ConstraintOp, ConstraintUse, FIRST_ARGUMENT, FULL_SCAN_ROWS,
    OrderTerm, Plan, PlanBuilder, PlanId, PlanLabel, PlanOutcome, PlanRequest, PlanTerm,
};
pub use planner::{ColumnFilter, ColumnPlanner, Operators};
pub use provider::{Cursor, Provider, ProviderOptions};
pub use value::{Value, ValueType};
