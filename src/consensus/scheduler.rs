use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::Engine;
use super::executor::apply_approved;
use super::lifecycle::settle;
use super::voter_pool::resolve_voter_pool;
use crate::errors::AppError;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired open proposals this pass moved to a terminal status.
    pub resolved: usize,
    /// Approved proposals whose activity was (re)applied.
    pub applied: usize,
    pub failed: usize,
}

/// One pass: settle open proposals past their expiry, then retry the
/// itinerary mutation for approvals that never landed.
pub async fn sweep_once<S: Store>(engine: &Engine<S>) -> Result<SweepReport, AppError> {
    let mut report = SweepReport::default();

    for proposal in engine.store.find_expired_open(Utc::now()).await? {
        let id = proposal.id;
        let settled = match resolve_voter_pool(&engine.store, proposal.trip_id).await {
            Ok(pool) => settle(engine, proposal, &pool).await,
            Err(e) => Err(e),
        };
        match settled {
            Ok(p) if !p.is_open() => report.resolved += 1,
            Ok(_) => {}
            Err(e) => {
                report.failed += 1;
                log::error!("Expiry sweep: settling proposal {id} failed: {e}");
            }
        }
    }

    for proposal in engine.store.find_unapplied_approved().await? {
        match apply_approved(engine, &proposal).await {
            Ok(true) => report.applied += 1,
            Ok(false) => {
                report.failed += 1;
                log::error!(
                    "ALERT: proposal {} still not applied to trip {} (version conflicts)",
                    proposal.id,
                    proposal.trip_id
                );
            }
            Err(e) => {
                report.failed += 1;
                log::error!("ALERT: proposal {} could not be applied: {e}", proposal.id);
            }
        }
    }

    Ok(report)
}

/// Runs `sweep_once` every `every` on the actix runtime.
pub fn spawn_expiry_sweep<S>(engine: Arc<Engine<S>>, every: Duration)
where
    S: Store + 'static,
{
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sweep_once(&engine).await {
                Ok(report) if report == SweepReport::default() => {}
                Ok(report) => log::info!(
                    "Expiry sweep: {} resolved, {} applied, {} failed",
                    report.resolved,
                    report.applied,
                    report.failed
                ),
                Err(e) => log::error!("Expiry sweep failed: {e}"),
            }
        }
    });
}
