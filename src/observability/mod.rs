//! Simple metrics module for the event fusion pipeline
//!
//! Provides a straightforward API for recording metrics using standard
//! Prometheus naming conventions. The embedding application is responsible
//! for installing an exporter; without one these calls are no-ops.

use std::fmt;

/// Enum representing all metric names used in the system
/// This eliminates magic strings and provides compile-time safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Extraction metrics
    ExtractRequests,
    ExtractSuccess,
    ExtractFailures,
    ExtractTimeouts,
    ExtractRejectedInputs,
    ExtractDuration,

    // Fusion metrics
    FusionRuns,
    FusionConflictsDetected,
    FusionManualConflicts,
    FusionOverallConfidence,
    FusionNeedsReview,

    // Gap analysis metrics
    GapAnalysisRuns,
    GapCompleteness,
    GapCriticalGaps,

    // Data quality metrics
    QualityAnalysisRuns,
    QualityIssuesDetected,
    QualityDuplicateGroups,
    QualityVenueSuggestions,
    QualityHealthScore,
    QualityAnalysisDuration,

    // Orchestrator metrics
    OrchestratorRuns,
    OrchestratorRunsFailed,
    OrchestratorBatchSize,
    OrchestratorRunDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::ExtractRequests => "ef_extract_requests_total",
            MetricName::ExtractSuccess => "ef_extract_success_total",
            MetricName::ExtractFailures => "ef_extract_failures_total",
            MetricName::ExtractTimeouts => "ef_extract_timeouts_total",
            MetricName::ExtractRejectedInputs => "ef_extract_rejected_inputs_total",
            MetricName::ExtractDuration => "ef_extract_duration_seconds",

            MetricName::FusionRuns => "ef_fusion_runs_total",
            MetricName::FusionConflictsDetected => "ef_fusion_conflicts_detected_total",
            MetricName::FusionManualConflicts => "ef_fusion_manual_conflicts_total",
            MetricName::FusionOverallConfidence => "ef_fusion_overall_confidence",
            MetricName::FusionNeedsReview => "ef_fusion_needs_review_total",

            MetricName::GapAnalysisRuns => "ef_gap_analysis_runs_total",
            MetricName::GapCompleteness => "ef_gap_completeness_percent",
            MetricName::GapCriticalGaps => "ef_gap_critical_gaps",

            MetricName::QualityAnalysisRuns => "ef_quality_analysis_runs_total",
            MetricName::QualityIssuesDetected => "ef_quality_issues_detected_total",
            MetricName::QualityDuplicateGroups => "ef_quality_duplicate_groups",
            MetricName::QualityVenueSuggestions => "ef_quality_venue_suggestions",
            MetricName::QualityHealthScore => "ef_quality_health_score",
            MetricName::QualityAnalysisDuration => "ef_quality_analysis_duration_seconds",

            MetricName::OrchestratorRuns => "ef_orchestrator_runs_total",
            MetricName::OrchestratorRunsFailed => "ef_orchestrator_runs_failed_total",
            MetricName::OrchestratorBatchSize => "ef_orchestrator_batch_size",
            MetricName::OrchestratorRunDuration => "ef_orchestrator_run_duration_seconds",
        };
        write!(f, "{}", name)
    }
}

/// Increment a counter metric by the given amount
pub fn emit_counter(name: MetricName, value: f64) {
    ::metrics::counter!(name.to_string()).increment(value as u64);
}

/// Record a histogram observation
pub fn emit_histogram(name: MetricName, value: f64) {
    ::metrics::histogram!(name.to_string()).record(value);
}

/// Set a gauge to the given value
pub fn emit_gauge(name: MetricName, value: f64) {
    ::metrics::gauge!(name.to_string()).set(value);
}
