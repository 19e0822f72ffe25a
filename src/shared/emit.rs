use tokio::sync::broadcast;
use tracing::trace;

use super::events::HistoryEvent;

/// Publish a history event to every subscriber
pub fn emit_event(tx: &broadcast::Sender<HistoryEvent>, event: HistoryEvent) {
    // Nobody listening is the normal state for one-shot CLI commands
    if let Err(broadcast::error::SendError(event)) = tx.send(event) {
        trace!(?event, "no history subscribers");
    }
}
