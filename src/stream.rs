//! Decision event stream
//!
//! Each line is one JSON object: an `action` (`add` or `delete`) next to the
//! decision fields.
//!
//! ```json
//! {"action":"add","value":"203.0.113.7","duration":"4h","scenario":"ssh-bf"}
//! ```
//!
//! Events apply in arrival order and every event is committed before the
//! next one is read. A bad event only costs itself: unparseable lines and
//! decisions the backend rejects as malformed are logged and skipped. The
//! stream ends early only when the backend itself becomes unusable.

use crate::core::backend::Backend;
use crate::core::decision::Decision;
use crate::core::error::Result;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// One line of the decision stream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum StreamEvent {
    Add(Decision),
    Delete(Decision),
}

/// Per-stream event counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Events the backend accepted (applied, queued, tolerated or skipped)
    pub routed: usize,
    /// Decisions rejected as malformed or failed on their own
    pub rejected: usize,
    /// Lines that were not a valid event
    pub malformed: usize,
}

/// Applies every event read from `reader` until EOF.
///
/// The caller owns the lifecycle: `init` before, `shut_down` after.
///
/// # Errors
///
/// Returns `Err` if reading fails, if a commit fails, or if a decision fails
/// in a way that affects every later decision (see
/// [`Error::is_decision_scoped`](crate::core::error::Error::is_decision_scoped)).
pub async fn apply_stream<B, R>(backend: &mut B, reader: R) -> Result<StreamSummary>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
{
    let mut summary = StreamSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let event: StreamEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    "skipping malformed event '{}': {e}",
                    crate::utils::truncate_string(&line, 120)
                );
                summary.malformed += 1;
                continue;
            }
        };

        let result = match &event {
            StreamEvent::Add(decision) => backend.add(decision).await,
            StreamEvent::Delete(decision) => backend.delete(decision).await,
        };

        match result {
            Ok(outcome) => {
                debug!("event {}", outcome.label());
                summary.routed += 1;
            }
            Err(e) if e.is_decision_scoped() => {
                warn!("skipping decision: {e}");
                summary.rejected += 1;
                continue;
            }
            Err(e) => return Err(e),
        }

        backend.commit().await?;
        backend.collect_metrics().await;
    }

    info!(
        "decision stream closed: {} routed, {} rejected, {} malformed",
        summary.routed, summary.rejected, summary.malformed
    );
    Ok(summary)
}
