//! Domain event sink: writes assistant activity to the structured log.

use dealroom_core::event::{DomainEvent, EventBus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Subscribe to `bus` and log every event until the bus is dropped.
/// The task resolves to the number of events it logged.
pub fn spawn_event_log(bus: &EventBus) -> JoinHandle<u64> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        let mut logged = 0;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    log_event(&event);
                    logged += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind, events dropped");
                }
                Err(RecvError::Closed) => return logged,
            }
        }
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::TurnStarted {
            conversation_id,
            organization_id,
            ..
        } => debug!(%conversation_id, %organization_id, "event: turn_started"),
        DomainEvent::ToolExecuted {
            conversation_id,
            tool_name,
            success,
            duration_ms,
            ..
        } => info!(
            %conversation_id,
            tool = %tool_name,
            success,
            duration_ms,
            "event: tool_executed"
        ),
        DomainEvent::TurnCompleted {
            conversation_id,
            rounds,
            tool_calls,
            truncated,
            tokens_used,
            ..
        } => info!(
            %conversation_id,
            rounds,
            tool_calls,
            truncated,
            tokens_used,
            "event: turn_completed"
        ),
        DomainEvent::TurnFailed {
            conversation_id,
            error_message,
            ..
        } => info!(%conversation_id, error = %error_message, "event: turn_failed"),
    }
}
