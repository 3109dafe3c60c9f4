use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::domain::SourceType;
use crate::error::{ProcessingError, Result};
use crate::observability::{emit_counter, emit_gauge, emit_histogram, MetricName};
use crate::pipeline::processing::extract::{
    ProcessingResult, ProcessorRegistry, SourceInput, SourceProcessor,
};
use crate::pipeline::processing::fusion::{
    FusionEngine, FusionResult, Resolution, PRIORITY_OVERRIDE_KEY,
};
use crate::pipeline::processing::gaps::{GapAnalyzer, GapReport, GapStatus, Importance};
use crate::progress::{ProcessingProgress, ProgressTracker, Stage};

/// Everything one orchestration run produces: the fused record with its
/// conflict report, the raw per-source results in input order, and a gap
/// report for the fused record.
#[derive(Debug, Clone)]
pub struct MultiSourceResult {
    pub fusion: FusionResult,
    pub gap_report: GapReport,
    /// One entry per admissible input, in input order
    pub source_results: Vec<ProcessingResult>,
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    /// Validation and per-source warnings accumulated across the run
    pub warnings: Vec<String>,
    pub total_time_ms: u64,
}

/// Drives one multi-source run: validates inputs against the registry,
/// processes admissible sources in timed batches, then hands the survivors
/// to fusion and gap analysis. Partial failure is tolerated; only a run with
/// zero successes is an error.
pub struct Orchestrator {
    registry: ProcessorRegistry,
    fusion: FusionEngine,
    config: PipelineConfig,
    progress: ProgressTracker,
}

impl Orchestrator {
    pub fn new(registry: ProcessorRegistry, config: PipelineConfig) -> Self {
        Self {
            registry,
            fusion: FusionEngine::new(config.fusion.clone()),
            config,
            progress: ProgressTracker::new(),
        }
    }

    /// Observe progress of the current run.
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub async fn process_sources(&self, inputs: Vec<SourceInput>) -> Result<MultiSourceResult> {
        let start = Instant::now();
        emit_counter(MetricName::OrchestratorRuns, 1.0);
        emit_gauge(
            MetricName::OrchestratorBatchSize,
            self.config.orchestrator.batch_size as f64,
        );

        self.progress.update(ProcessingProgress {
            stage: Stage::Initializing,
            total_sources: inputs.len(),
            completed_sources: 0,
            current_source: None,
        });

        let (admissible, mut warnings) = self.validate(inputs);
        if admissible.is_empty() {
            self.fail_progress();
            emit_counter(MetricName::OrchestratorRunsFailed, 1.0);
            return Err(ProcessingError::NoAdmissibleSources(warnings.join("; ")));
        }

        let total = admissible.len();
        info!(sources = total, "orchestration run started");

        let results = if self.config.orchestrator.sequential {
            self.run_sequential(admissible).await
        } else {
            self.run_batched(admissible).await
        };

        let sources_succeeded = results.iter().filter(|r| r.success).count();
        for result in &results {
            warnings.extend(result.warnings.iter().cloned());
        }

        if sources_succeeded == 0 {
            self.fail_progress();
            emit_counter(MetricName::OrchestratorRunsFailed, 1.0);
            let detail = results
                .iter()
                .filter_map(|r| r.error.as_deref())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProcessingError::AllSourcesFailed(detail));
        }

        self.progress.update(ProcessingProgress {
            stage: Stage::Fusing,
            total_sources: total,
            completed_sources: total,
            current_source: None,
        });

        let fusion = self.fusion.fuse(&results)?;
        emit_counter(MetricName::FusionRuns, 1.0);
        emit_counter(
            MetricName::FusionConflictsDetected,
            fusion.conflicts.len() as f64,
        );
        let manual = fusion
            .conflicts
            .iter()
            .filter(|c| c.resolution == Resolution::Manual)
            .count();
        if manual > 0 {
            emit_counter(MetricName::FusionManualConflicts, manual as f64);
        }
        if fusion.needs_review {
            emit_counter(MetricName::FusionNeedsReview, 1.0);
        }
        emit_gauge(
            MetricName::FusionOverallConfidence,
            fusion.fused.overall_confidence as f64,
        );

        let used_sources: Vec<SourceType> = results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.data.as_ref().and_then(|d| d.source_type))
            .collect();
        let gap_report = GapAnalyzer::new().analyze(&fusion.fused, &used_sources);
        emit_counter(MetricName::GapAnalysisRuns, 1.0);
        emit_gauge(MetricName::GapCompleteness, gap_report.completeness as f64);
        emit_gauge(
            MetricName::GapCriticalGaps,
            gap_report
                .gaps
                .iter()
                .filter(|g| g.importance == Importance::Critical && g.status != GapStatus::Good)
                .count() as f64,
        );

        self.progress.update(ProcessingProgress {
            stage: Stage::Complete,
            total_sources: total,
            completed_sources: total,
            current_source: None,
        });

        let total_time_ms = start.elapsed().as_millis() as u64;
        emit_histogram(
            MetricName::OrchestratorRunDuration,
            start.elapsed().as_secs_f64(),
        );
        info!(
            sources = total,
            succeeded = sources_succeeded,
            conflicts = fusion.conflicts.len(),
            confidence = fusion.fused.overall_confidence,
            needs_review = fusion.needs_review,
            elapsed_ms = total_time_ms,
            "orchestration run complete"
        );

        Ok(MultiSourceResult {
            fusion,
            gap_report,
            source_results: results,
            sources_attempted: total,
            sources_succeeded,
            warnings,
            total_time_ms,
        })
    }

    /// Resolve each input to a processor. Inadmissible inputs are dropped
    /// with a warning rather than failing the run.
    fn validate(
        &self,
        inputs: Vec<SourceInput>,
    ) -> (Vec<(SourceInput, Arc<dyn SourceProcessor>)>, Vec<String>) {
        let mut admissible = Vec::new();
        let mut warnings = Vec::new();

        for input in inputs {
            match self.registry.find_best(&input) {
                Some(processor) => admissible.push((input, processor)),
                None => {
                    let warning = format!("no processor can handle input: {}", input.describe());
                    warn!("{}", warning);
                    emit_counter(MetricName::ExtractRejectedInputs, 1.0);
                    warnings.push(warning);
                }
            }
        }

        (admissible, warnings)
    }

    async fn run_sequential(
        &self,
        sources: Vec<(SourceInput, Arc<dyn SourceProcessor>)>,
    ) -> Vec<ProcessingResult> {
        let total = sources.len();
        let mut results = Vec::with_capacity(total);

        for (completed, (input, processor)) in sources.into_iter().enumerate() {
            self.progress.update(ProcessingProgress {
                stage: Stage::Processing,
                total_sources: total,
                completed_sources: completed,
                current_source: Some(input.describe()),
            });
            results.push(self.process_one(input, processor).await);
        }

        results
    }

    /// Process sources in fixed-size concurrent batches, preserving input
    /// order in the returned results.
    async fn run_batched(
        &self,
        sources: Vec<(SourceInput, Arc<dyn SourceProcessor>)>,
    ) -> Vec<ProcessingResult> {
        let total = sources.len();
        let timeout = Duration::from_secs(self.config.orchestrator.timeout_seconds);
        let mut results: Vec<Option<ProcessingResult>> = Vec::new();
        results.resize_with(total, || None);
        let mut completed = 0usize;

        let mut remaining = sources.into_iter().enumerate();
        loop {
            let batch: Vec<_> = remaining
                .by_ref()
                .take(self.config.orchestrator.batch_size)
                .collect();
            if batch.is_empty() {
                break;
            }

            self.progress.update(ProcessingProgress {
                stage: Stage::Processing,
                total_sources: total,
                completed_sources: completed,
                current_source: batch.first().map(|(_, (input, _))| input.describe()),
            });

            let mut set = JoinSet::new();
            for (index, (input, processor)) in batch {
                set.spawn(async move {
                    (index, run_with_timeout(input, processor, timeout).await)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, result)) => {
                        results[index] = Some(result);
                        completed += 1;
                        self.progress.update(ProcessingProgress {
                            stage: Stage::Processing,
                            total_sources: total,
                            completed_sources: completed,
                            current_source: None,
                        });
                    }
                    Err(e) => {
                        // A panicked task surfaces as a failed slot below
                        warn!("source task join failed: {}", e);
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| ProcessingResult::failed("source task aborted", 0))
            })
            .collect()
    }

    async fn process_one(
        &self,
        input: SourceInput,
        processor: Arc<dyn SourceProcessor>,
    ) -> ProcessingResult {
        let timeout = Duration::from_secs(self.config.orchestrator.timeout_seconds);
        run_with_timeout(input, processor, timeout).await
    }

    fn fail_progress(&self) {
        let mut progress = self.progress.get();
        progress.stage = Stage::Error;
        self.progress.update(progress);
    }
}

/// Run one processor call under the per-source timeout. An elapsed timeout
/// drops the processor future, so late completions are discarded, and the
/// slot becomes a failed result.
async fn run_with_timeout(
    input: SourceInput,
    processor: Arc<dyn SourceProcessor>,
    timeout: Duration,
) -> ProcessingResult {
    emit_counter(MetricName::ExtractRequests, 1.0);
    let start = Instant::now();

    let mut result = match tokio::time::timeout(timeout, processor.process(&input)).await {
        Ok(result) => result,
        Err(_) => {
            emit_counter(MetricName::ExtractTimeouts, 1.0);
            warn!(
                source = input.describe(),
                timeout_secs = timeout.as_secs(),
                "source processing timed out"
            );
            ProcessingResult::failed(
                format!("processing timed out after {}s", timeout.as_secs()),
                start.elapsed().as_millis() as u64,
            )
        }
    };

    if result.success {
        emit_counter(MetricName::ExtractSuccess, 1.0);
    } else {
        emit_counter(MetricName::ExtractFailures, 1.0);
    }
    emit_histogram(MetricName::ExtractDuration, start.elapsed().as_secs_f64());

    // Carry a caller-supplied priority override into fusion
    if let Some(priority) = input.priority {
        if let Some(record) = result.data.as_mut() {
            record
                .metadata
                .insert(PRIORITY_OVERRIDE_KEY.to_string(), serde_json::json!(priority));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventRecord, FusableField, ParsedField};
    use crate::pipeline::processing::extract::SourcePayload;
    use async_trait::async_trait;

    struct StubProcessor {
        source_type: SourceType,
        record: Option<EventRecord>,
        delay: Duration,
    }

    impl StubProcessor {
        fn succeeding(source_type: SourceType, title: &str, confidence: u8) -> Self {
            let mut record = EventRecord {
                source_type: Some(source_type),
                overall_confidence: confidence,
                ..EventRecord::default()
            };
            record.set_field(
                FusableField::Title,
                Some(ParsedField::new(title, confidence, "stub")),
            );
            record.set_field(
                FusableField::Date,
                Some(ParsedField::new("3 Oct 2026", 90, "stub")),
            );
            Self {
                source_type,
                record: Some(record),
                delay: Duration::ZERO,
            }
        }

        fn failing(source_type: SourceType) -> Self {
            Self {
                source_type,
                record: None,
                delay: Duration::ZERO,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl SourceProcessor for StubProcessor {
        fn source_type(&self) -> SourceType {
            self.source_type
        }

        fn can_handle(&self, input: &SourceInput) -> bool {
            matches!(
                (&input.payload, self.source_type),
                (SourcePayload::Text(_), SourceType::Text)
                    | (SourcePayload::Image { .. }, SourceType::Image)
                    | (SourcePayload::Url(_), SourceType::Url)
            )
        }

        async fn process(&self, _input: &SourceInput) -> ProcessingResult {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.record {
                Some(record) => ProcessingResult::ok(record.clone(), Vec::new(), 5),
                None => ProcessingResult::failed("stub failure", 5),
            }
        }
    }

    fn orchestrator_with(processors: Vec<StubProcessor>, config: PipelineConfig) -> Orchestrator {
        let mut registry = ProcessorRegistry::new();
        for processor in processors {
            registry.register(Arc::new(processor));
        }
        Orchestrator::new(registry, config)
    }

    #[tokio::test]
    async fn test_partial_failure_still_fuses() {
        let orchestrator = orchestrator_with(
            vec![
                StubProcessor::succeeding(SourceType::Text, "Village Fete", 85),
                StubProcessor::failing(SourceType::Image),
                StubProcessor::succeeding(SourceType::Url, "Village Fete", 90),
            ],
            PipelineConfig::default(),
        );

        let result = orchestrator
            .process_sources(vec![
                SourceInput::text("flyer text"),
                SourceInput::image(vec![1, 2], "image/png"),
                SourceInput::url("https://example.org/fete"),
            ])
            .await
            .unwrap();

        assert_eq!(result.source_results.len(), 3);
        assert_eq!(result.sources_attempted, 3);
        assert_eq!(result.sources_succeeded, 2);
        assert!(!result.source_results[1].success);
        assert_eq!(
            result.fusion.fused.title.as_ref().unwrap().value,
            "Village Fete"
        );
        assert_eq!(orchestrator.progress().get().stage, Stage::Complete);
    }

    #[tokio::test]
    async fn test_no_admissible_sources_is_an_error() {
        let orchestrator = orchestrator_with(
            vec![StubProcessor::succeeding(SourceType::Text, "Anything", 80)],
            PipelineConfig::default(),
        );

        let err = orchestrator
            .process_sources(vec![SourceInput::image(vec![1], "image/png")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::NoAdmissibleSources(_)));
        assert_eq!(orchestrator.progress().get().stage, Stage::Error);
    }

    #[tokio::test]
    async fn test_all_sources_failed_is_an_error() {
        let orchestrator = orchestrator_with(
            vec![StubProcessor::failing(SourceType::Text)],
            PipelineConfig::default(),
        );

        let err = orchestrator
            .process_sources(vec![SourceInput::text("whatever")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::AllSourcesFailed(_)));
    }

    #[tokio::test]
    async fn test_slow_source_times_out_without_sinking_run() {
        let mut config = PipelineConfig::default();
        config.orchestrator.timeout_seconds = 1;

        let orchestrator = orchestrator_with(
            vec![
                StubProcessor::succeeding(SourceType::Text, "Quiz Night", 85),
                StubProcessor::succeeding(SourceType::Url, "Quiz Night", 90)
                    .slow(Duration::from_secs(5)),
            ],
            config,
        );

        let result = orchestrator
            .process_sources(vec![
                SourceInput::text("poster"),
                SourceInput::url("https://example.org/slow"),
            ])
            .await
            .unwrap();

        assert_eq!(result.sources_succeeded, 1);
        let timed_out = &result.source_results[1];
        assert!(!timed_out.success);
        assert!(timed_out.error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_sequential_mode_preserves_order() {
        let mut config = PipelineConfig::default();
        config.orchestrator.sequential = true;

        let orchestrator = orchestrator_with(
            vec![
                StubProcessor::succeeding(SourceType::Text, "Order Check", 80),
                StubProcessor::succeeding(SourceType::Url, "Order Check", 85),
            ],
            config,
        );

        let result = orchestrator
            .process_sources(vec![
                SourceInput::url("https://example.org/a"),
                SourceInput::text("b"),
            ])
            .await
            .unwrap();

        assert_eq!(
            result.source_results[0].data.as_ref().unwrap().source_type,
            Some(SourceType::Url)
        );
        assert_eq!(
            result.source_results[1].data.as_ref().unwrap().source_type,
            Some(SourceType::Text)
        );
    }

    #[tokio::test]
    async fn test_priority_override_lands_in_metadata() {
        let orchestrator = orchestrator_with(
            vec![StubProcessor::succeeding(SourceType::Text, "Pinned", 80)],
            PipelineConfig::default(),
        );

        let result = orchestrator
            .process_sources(vec![SourceInput::text("pinned text").with_priority(9)])
            .await
            .unwrap();

        let record = result.source_results[0].data.as_ref().unwrap();
        assert_eq!(
            record
                .metadata
                .get(PRIORITY_OVERRIDE_KEY)
                .and_then(|v| v.as_u64()),
            Some(9)
        );
    }

    #[tokio::test]
    async fn test_gap_report_attached() {
        let orchestrator = orchestrator_with(
            vec![StubProcessor::succeeding(SourceType::Text, "Gappy", 80)],
            PipelineConfig::default(),
        );

        let result = orchestrator
            .process_sources(vec![SourceInput::text("gappy")])
            .await
            .unwrap();

        // Title and date only, so the important fields all show up as gaps
        assert!(!result.gap_report.gaps.is_empty());
    }
}
