use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;

/// Advance every published exam whose close time has passed to `closed` and
/// return how many were transitioned. Safe to run concurrently with request
/// traffic and with itself: the write is a single statement keyed on the
/// stored status, so a second run finds nothing left to do.
pub(crate) async fn run(state: &AppState) -> Result<u64> {
    let reconciled = repositories::exams::close_overdue(state.db(), primitive_now_utc())
        .await
        .context("Failed to close overdue exams")?;

    if reconciled > 0 {
        tracing::info!(reconciled, "Closed overdue published exams");
    }
    metrics::counter!("exams_reconciled_total").increment(reconciled);

    Ok(reconciled)
}
