use tokio_util::sync::CancellationToken;

use crate::{Coordinator, GatewayClient, GatewaySession, HostPlatform};

/// Requests a state refresh for every known appliance once per poll interval.
///
/// Bound to the session generation it was started for and exits as soon as
/// that session is replaced. Cycles are skipped while the session is not
/// connected and available.
pub(crate) async fn poll_appliances<G: GatewayClient, H: HostPlatform>(
    coordinator: Coordinator<G, H>,
    generation: u64,
    cancel: CancellationToken,
) {
    log::debug!("Start requesting periodic updates (generation {})", generation);
    let interval = coordinator.config().poll_interval;

    'poll: loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if coordinator.generation() != generation {
            log::debug!("Session {} replaced, stopping periodic updates", generation);
            break;
        }
        let Some(session) = coordinator.polling_session() else {
            continue;
        };

        for wrapper in coordinator.appliances() {
            log::debug!("Requesting update for {}", wrapper.id());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'poll,
                result = session.request_state_refresh(wrapper.id()) => {
                    if let Err(err) = result {
                        log::debug!("Poll update failed for {}: {}", wrapper.id(), err);
                    }
                }
            }
        }
    }
    log::debug!("Stopped requesting periodic updates");
}
