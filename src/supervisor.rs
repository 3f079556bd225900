use tokio_util::sync::CancellationToken;

use crate::{coordinator::ReconnectOutcome, Coordinator, GatewayClient, HostPlatform};

/// Rebuilds the session with exponential backoff until it is healthy again.
///
/// Authentication failures end the loop; the user has to re-authenticate.
pub(crate) async fn supervise<G: GatewayClient, H: HostPlatform>(
    coordinator: Coordinator<G, H>,
    cancel: CancellationToken,
) {
    log::debug!("Reconnect worker started");
    loop {
        if coordinator.is_healthy() {
            log::debug!("Session healthy, reconnect worker exiting");
            return;
        }

        let (attempt, delay) = coordinator.begin_retry();
        log::info!(
            "Reconnecting in {:.1}s (attempt {})",
            delay.as_secs_f64(),
            attempt
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Reconnect worker cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if coordinator.is_healthy() {
            log::debug!("Session recovered while waiting, reconnect worker exiting");
            return;
        }

        match coordinator.reconnect(&cancel).await {
            ReconnectOutcome::Started => {
                log::debug!("Reconnect attempt {} started a new session", attempt);
                return;
            }
            ReconnectOutcome::AlreadyHealthy | ReconnectOutcome::Cancelled => return,
            ReconnectOutcome::Failed(err) if !err.is_transient() => {
                log::warn!("Giving up reconnecting: {}", err);
                coordinator.notify_auth_failure();
                return;
            }
            ReconnectOutcome::Failed(err) => {
                log::warn!("Reconnect attempt {} failed: {}", attempt, err);
            }
        }

        if cancel.is_cancelled() {
            return;
        }
        coordinator.maybe_notify_outage(attempt);
        coordinator.throttled_outage_refresh();
    }
}
