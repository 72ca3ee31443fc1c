//! Human-readable run summary.

use std::{fmt, path::PathBuf};

use chatload_core::{PromptCategory, SessionLog, SessionOutcome};
use serde::Serialize;

/// Aggregate view of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub outcome: SessionOutcome,
    pub failure: Option<String>,
    pub endpoint: String,
    pub category: PromptCategory,
    pub max_messages: u32,
    pub messages_sent: u32,
    pub responses_received: u32,
    pub error_count: u32,
    pub duration_secs: f64,
    pub log_path: Option<PathBuf>,
    pub persist_error: Option<String>,
}

impl RunSummary {
    #[must_use]
    pub fn new(log: &SessionLog, log_path: Option<PathBuf>, persist_error: Option<String>) -> Self {
        let counters = &log.stats.counters;
        Self {
            outcome: log.status,
            failure: log.failure.clone(),
            endpoint: log.config.endpoint.clone(),
            category: log.config.category,
            max_messages: log.config.max_messages,
            messages_sent: counters.messages_sent,
            responses_received: counters.responses_received,
            error_count: counters.error_count,
            duration_secs: log.stats.duration_secs,
            log_path,
            persist_error,
        }
    }

    /// Prompts per minute over the whole run.
    #[must_use]
    pub fn messages_per_minute(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        f64::from(self.messages_sent) * 60.0 / self.duration_secs
    }

    /// Responses as a percentage of prompts sent.
    #[must_use]
    pub fn response_rate(&self) -> f64 {
        if self.messages_sent == 0 {
            return 0.0;
        }
        f64::from(self.responses_received) * 100.0 / f64::from(self.messages_sent)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session summary")?;
        writeln!(f, "  Outcome:    {}", self.outcome)?;
        if let Some(failure) = &self.failure {
            writeln!(f, "  Reason:     {failure}")?;
        }
        writeln!(f, "  Endpoint:   {}", self.endpoint)?;
        writeln!(f, "  Category:   {}", self.category)?;
        writeln!(f, "  Duration:   {:.1}s", self.duration_secs)?;
        writeln!(
            f,
            "  Sent:       {}/{} ({:.1}/min)",
            self.messages_sent,
            self.max_messages,
            self.messages_per_minute()
        )?;
        writeln!(
            f,
            "  Received:   {} ({:.0}%)",
            self.responses_received,
            self.response_rate()
        )?;
        writeln!(f, "  Errors:     {}", self.error_count)?;
        match (&self.log_path, &self.persist_error) {
            (_, Some(err)) => write!(f, "  Log:        not saved ({err})"),
            (Some(path), None) => write!(f, "  Log:        {}", path.display()),
            (None, None) => write!(f, "  Log:        kept in memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chatload_core::{Configuration, LogStats, SessionStats};
    use uuid::Uuid;

    use super::*;

    fn log(sent: u32, received: u32, duration_secs: f64) -> SessionLog {
        SessionLog {
            run_id: Uuid::new_v4(),
            status: SessionOutcome::Completed,
            failure: None,
            config: Configuration::builder("ws://example")
                .log_path("log.json")
                .build()
                .unwrap(),
            stats: LogStats {
                counters: SessionStats {
                    messages_sent: sent,
                    responses_received: received,
                    error_count: 2,
                    ..SessionStats::default()
                },
                duration_secs,
            },
            events: Vec::new(),
        }
    }

    #[test]
    fn test_rates() {
        let summary = RunSummary::new(&log(10, 5, 120.0), None, None);
        assert!((summary.messages_per_minute() - 5.0).abs() < f64::EPSILON);
        assert!((summary.response_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_duration_rates() {
        let summary = RunSummary::new(&log(0, 0, 0.0), None, None);
        assert!(summary.messages_per_minute().abs() < f64::EPSILON);
        assert!(summary.response_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_reports_errors_and_persist_failure() {
        let summary = RunSummary::new(
            &log(3, 3, 6.0),
            None,
            Some("permission denied".to_string()),
        );
        let text = summary.to_string();
        assert!(text.contains("Errors:     2"));
        assert!(text.contains("Sent:       3/50"));
        assert!(text.contains("not saved (permission denied)"));
    }

    #[test]
    fn test_display_log_path() {
        let summary = RunSummary::new(&log(1, 0, 1.0), Some(PathBuf::from("out.json")), None);
        assert!(summary.to_string().contains("Log:        out.json"));
    }
}
