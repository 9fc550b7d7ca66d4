use async_trait::async_trait;
use serde::Serialize;

pub const SEARCH_LOG_TARGET: &str = "memory::search";

pub type TelemetryResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// One completed search-tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchEvent {
    pub tool: &'static str,
    pub user_id: String,
    pub duration_ms: u64,
    pub match_count: usize,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub regex: bool,
}

/// Sink for search observations.
#[async_trait]
pub trait SearchTelemetry: Send + Sync {
    async fn record(&self, event: &SearchEvent) -> TelemetryResult;
}

/// Emits events as JSON lines through `log`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetry;

#[async_trait]
impl SearchTelemetry for LogTelemetry {
    async fn record(&self, event: &SearchEvent) -> TelemetryResult {
        let line = serde_json::to_string(event)?;
        log::info!(target: SEARCH_LOG_TARGET, "{line}");
        Ok(())
    }
}

/// Records `event` if a sink is configured. Failures are logged and reported as `false`.
pub async fn record_best_effort(telemetry: Option<&dyn SearchTelemetry>, event: &SearchEvent) -> bool {
    let Some(sink) = telemetry else {
        return false;
    };
    match sink.record(event).await {
        Ok(()) => true,
        Err(err) => {
            log::warn!("Search telemetry for {} dropped: {err}", event.tool);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTelemetry;

    #[async_trait]
    impl SearchTelemetry for FailingTelemetry {
        async fn record(&self, _event: &SearchEvent) -> TelemetryResult {
            Err("sink offline".into())
        }
    }

    fn event() -> SearchEvent {
        SearchEvent {
            tool: "md.search",
            user_id: "u1".into(),
            duration_ms: 4,
            match_count: 2,
            timed_out: false,
            prefix: None,
            regex: false,
        }
    }

    #[tokio::test]
    async fn best_effort_reports_outcome() {
        assert!(record_best_effort(Some(&LogTelemetry as &dyn SearchTelemetry), &event()).await);
        assert!(!record_best_effort(Some(&FailingTelemetry as &dyn SearchTelemetry), &event()).await);
        assert!(!record_best_effort(None, &event()).await);
    }
}
