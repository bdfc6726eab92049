//! Background workers. Do not await the returned JoinHandles, as they run indefinitely.
use chrono::Duration;
use log::*;
use storefront_payment_engine::{FulfillmentApi, ReconcilerApi, SqliteDatabase};
use tokio::task::JoinHandle;

fn std_interval(interval: Duration) -> std::time::Duration {
    interval.to_std().unwrap_or(std::time::Duration::from_secs(60))
}

/// Starts the status poll worker.
///
/// Every `interval`, each unsettled payment that has not changed for at least `interval` is looked up at its
/// processor and reconciled. Pending payments older than `expiry` are then expired.
pub fn start_status_poll_worker(
    api: ReconcilerApi<SqliteDatabase>,
    interval: Duration,
    expiry: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std_interval(interval));
        info!("🕰️ Payment status poll worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running payment status poll");
            match api.poll_unsettled_payments(interval).await {
                Ok(summary) if summary.polled > 0 => info!(
                    "🕰️ Polled {} payment(s): {} applied, {} unchanged, {} rejected, {} errors",
                    summary.polled, summary.applied, summary.unchanged, summary.rejected, summary.errors
                ),
                Ok(_) => trace!("🕰️ No unsettled payments to poll"),
                Err(e) => error!("🕰️ Error running the payment status poll: {e}"),
            }
            if let Err(e) = api.expire_stale_payments(expiry).await {
                error!("🕰️ Error expiring stale payments: {e}");
            }
        }
    })
}

/// Starts the provisioning sweep, which retries every paid-for order that still has unprovisioned line items.
pub fn start_provisioning_sweep(api: FulfillmentApi<SqliteDatabase>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std_interval(interval));
        info!("🕰️ Provisioning sweep worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running provisioning sweep");
            match api.retry_outstanding().await {
                Ok(reports) => {
                    let confirmed = reports.iter().filter(|r| r.confirmed).count();
                    let needs_review = reports.iter().map(|r| r.needs_review).sum::<usize>();
                    if !reports.is_empty() {
                        info!(
                            "🕰️ Provisioning sweep: {} order(s) retried, {confirmed} confirmed, {needs_review} line \
                             item(s) need manual review",
                            reports.len()
                        );
                    }
                },
                Err(e) => error!("🕰️ Error running the provisioning sweep: {e}"),
            }
        }
    })
}
