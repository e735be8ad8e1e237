//! Query Planner Negotiation glue: `sqlite3_index_info` in, plan out.

use std::ffi::c_int;
use std::slice;

use rusqlite::ffi;
use tablebridge_core::{
    BridgeError, Constraint, ConstraintOp, OrderTerm, Plan, PlanOutcome, PlanRequest, Provider,
    Result,
};
use tracing::trace;

use crate::connect;
use crate::translate;

pub(crate) unsafe extern "C" fn x_best_index<P: Provider>(
    vtab: *mut ffi::sqlite3_vtab,
    info: *mut ffi::sqlite3_index_info,
) -> c_int {
    let provider: &P = unsafe { connect::provider(vtab) };
    let info = unsafe { &mut *info };
    let request = unsafe { read_request(info) };

    let result = translate::guard(|| provider.plan(&request)).and_then(|outcome| match outcome {
        PlanOutcome::Use(plan) => {
            unsafe { write_plan(info, &plan) }?;
            trace!(
                plan = plan.id().0,
                label = plan.label(),
                accepted = plan.accepted(),
                rows = plan.estimated_rows(),
                "plan chosen"
            );
            Ok(ffi::SQLITE_OK)
        }
        PlanOutcome::NoUsablePlan => {
            trace!(constraints = request.constraints.len(), "no usable plan");
            Ok(ffi::SQLITE_CONSTRAINT)
        }
    });

    match result {
        Ok(rc) => rc,
        Err(err) => {
            let rc = unsafe { translate::report_table(vtab, &err) };
            // SQLITE_CONSTRAINT from this callback means "no usable plan".
            if rc & 0xff == ffi::SQLITE_CONSTRAINT {
                ffi::SQLITE_ERROR
            } else {
                rc
            }
        }
    }
}

/// # Safety
///
/// `info` must be the structure passed to the running `xBestIndex` call.
unsafe fn read_request(info: &ffi::sqlite3_index_info) -> PlanRequest {
    let constraints = if info.nConstraint > 0 && !info.aConstraint.is_null() {
        unsafe { slice::from_raw_parts(info.aConstraint, info.nConstraint as usize) }
    } else {
        &[]
    };
    let order_by = if info.nOrderBy > 0 && !info.aOrderBy.is_null() {
        unsafe { slice::from_raw_parts(info.aOrderBy, info.nOrderBy as usize) }
    } else {
        &[]
    };

    PlanRequest::new(
        constraints
            .iter()
            .map(|c| Constraint::new(c.iColumn, ConstraintOp::from_code(c.op), c.usable != 0))
            .collect(),
        order_by
            .iter()
            .map(|o| OrderTerm::new(o.iColumn, o.desc != 0))
            .collect(),
    )
    .with_columns_used(info.colUsed)
}

/// # Safety
///
/// `info` must be the structure passed to the running `xBestIndex` call.
unsafe fn write_plan(info: &mut ffi::sqlite3_index_info, plan: &Plan) -> Result<()> {
    let count = info.nConstraint.max(0) as usize;
    if plan.usage().len() != count {
        return Err(BridgeError::planning(format!(
            "plan covers {} constraints, engine offered {count}",
            plan.usage().len()
        )));
    }
    if count > 0 {
        let usage = unsafe { slice::from_raw_parts_mut(info.aConstraintUsage, count) };
        for (slot, accepted) in usage.iter_mut().zip(plan.usage()) {
            if let Some(accepted) = accepted {
                slot.argvIndex = accepted.argument as c_int;
                slot.omit = u8::from(accepted.omit);
            }
        }
    }

    if let Some(label) = plan.label() {
        let text = translate::alloc_text(label);
        if text.is_null() {
            return Err(BridgeError::NoMemory);
        }
        info.idxStr = text;
        info.needToFreeIdxStr = 1;
    }
    info.idxNum = plan.id().0;
    info.orderByConsumed = c_int::from(plan.order_consumed());
    info.estimatedCost = plan.estimated_cost();
    info.estimatedRows = plan.estimated_rows();
    if plan.unique() {
        info.idxFlags |= ffi::SQLITE_INDEX_SCAN_UNIQUE;
    }
    Ok(())
}
