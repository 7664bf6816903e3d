use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use equiplend_events::{EventBus, EventEnvelope};
use equiplend_lending::LendingEvent;

use crate::repository::LendingRepository;
use crate::service::LendingService;

/// Run [`LendingService::sweep_overdue`] every `every` on the current tokio runtime.
///
/// The first sweep happens immediately. Failures are logged and the loop
/// keeps going; abort the returned handle to stop it.
pub fn spawn_overdue_sweep<R, B>(service: Arc<LendingService<R, B>>, every: Duration) -> JoinHandle<()>
where
    R: LendingRepository + 'static,
    B: EventBus<EventEnvelope<LendingEvent>> + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match service.sweep_overdue().await {
                Ok(marked) => debug!(count = marked.len(), "overdue sweep finished"),
                Err(err) => warn!(error = %err, "overdue sweep failed"),
            }
        }
    })
}
