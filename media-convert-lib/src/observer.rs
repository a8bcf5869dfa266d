//! Notification sink for conversion lifecycle events

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::ConversionError;
use crate::temp::TempKind;
use crate::types::MediaKind;

/// Per-request state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Validating,
    ResourceAcquired,
    Converting,
    Finalizing,
    Succeeded,
    Failed,
}

impl ConversionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionState::Validating => "validating",
            ConversionState::ResourceAcquired => "resource_acquired",
            ConversionState::Converting => "converting",
            ConversionState::Finalizing => "finalizing",
            ConversionState::Succeeded => "succeeded",
            ConversionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the request an event belongs to
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub request_id: &'a str,
    pub kind: MediaKind,
    pub format: &'a str,
    pub input_bytes: u64,
}

/// Receives lifecycle events from the orchestrator.
///
/// Every method has an empty default so implementors only override what they
/// care about. Calls happen on the request's task and must not block.
pub trait ConversionObserver: Send + Sync {
    fn on_state(&self, _ctx: &RequestContext<'_>, _state: ConversionState) {}

    fn on_resource_acquired(&self, _ctx: &RequestContext<'_>, _kind: TempKind, _path: &Path) {}

    fn on_resource_released(&self, _ctx: &RequestContext<'_>, _kind: TempKind, _path: &Path) {}

    fn on_succeeded(&self, _ctx: &RequestContext<'_>, _output_bytes: u64, _elapsed: Duration) {}

    fn on_failed(&self, _ctx: &RequestContext<'_>, _error: &ConversionError, _elapsed: Duration) {}
}

/// Default observer: structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ConversionObserver for TracingObserver {
    fn on_state(&self, ctx: &RequestContext<'_>, state: ConversionState) {
        tracing::debug!(
            request_id = ctx.request_id,
            kind = %ctx.kind,
            format = ctx.format,
            %state,
            "conversion state"
        );
    }

    fn on_resource_acquired(&self, ctx: &RequestContext<'_>, kind: TempKind, path: &Path) {
        tracing::debug!(request_id = ctx.request_id, %kind, path = %path.display(), "acquired temp resource");
    }

    fn on_resource_released(&self, ctx: &RequestContext<'_>, kind: TempKind, path: &Path) {
        tracing::debug!(request_id = ctx.request_id, %kind, path = %path.display(), "released temp resource");
    }

    fn on_succeeded(&self, ctx: &RequestContext<'_>, output_bytes: u64, elapsed: Duration) {
        tracing::info!(
            request_id = ctx.request_id,
            kind = %ctx.kind,
            format = ctx.format,
            input_bytes = ctx.input_bytes,
            output_bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            "conversion succeeded"
        );
    }

    fn on_failed(&self, ctx: &RequestContext<'_>, error: &ConversionError, elapsed: Duration) {
        if error.is_client_error() {
            tracing::info!(
                request_id = ctx.request_id,
                kind = %ctx.kind,
                format = ctx.format,
                error = %error,
                "conversion rejected"
            );
            return;
        }

        match error {
            ConversionError::ExternalTool {
                last_output_lines, ..
            } => tracing::error!(
                request_id = ctx.request_id,
                kind = %ctx.kind,
                format = ctx.format,
                error = %error,
                output = %last_output_lines.join("\n"),
                elapsed_ms = elapsed.as_millis() as u64,
                "conversion failed"
            ),
            ConversionError::Cancelled => tracing::warn!(
                request_id = ctx.request_id,
                kind = %ctx.kind,
                elapsed_ms = elapsed.as_millis() as u64,
                "conversion cancelled"
            ),
            _ => tracing::error!(
                request_id = ctx.request_id,
                kind = %ctx.kind,
                format = ctx.format,
                error = %error,
                elapsed_ms = elapsed.as_millis() as u64,
                "conversion failed"
            ),
        }
    }
}

/// Forwards every event to each inner observer in order
pub struct Observers(pub Vec<std::sync::Arc<dyn ConversionObserver>>);

impl ConversionObserver for Observers {
    fn on_state(&self, ctx: &RequestContext<'_>, state: ConversionState) {
        self.0.iter().for_each(|o| o.on_state(ctx, state));
    }

    fn on_resource_acquired(&self, ctx: &RequestContext<'_>, kind: TempKind, path: &Path) {
        self.0.iter().for_each(|o| o.on_resource_acquired(ctx, kind, path));
    }

    fn on_resource_released(&self, ctx: &RequestContext<'_>, kind: TempKind, path: &Path) {
        self.0.iter().for_each(|o| o.on_resource_released(ctx, kind, path));
    }

    fn on_succeeded(&self, ctx: &RequestContext<'_>, output_bytes: u64, elapsed: Duration) {
        self.0.iter().for_each(|o| o.on_succeeded(ctx, output_bytes, elapsed));
    }

    fn on_failed(&self, ctx: &RequestContext<'_>, error: &ConversionError, elapsed: Duration) {
        self.0.iter().for_each(|o| o.on_failed(ctx, error, elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(ConversionState::ResourceAcquired.to_string(), "resource_acquired");
        assert_eq!(ConversionState::Failed.as_str(), "failed");
    }
}
