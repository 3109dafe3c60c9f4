use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::app::ports::{CatalogPort, VenueMatcherPort};
use crate::config::QualityConfig;
use crate::error::{ProcessingError, Result};
use crate::observability::{emit_counter, emit_gauge, emit_histogram, MetricName};
use crate::pipeline::processing::quality::{DataQualityAnalyzer, QualityAnalysis};

/// Catalog-wide quality pass: pulls event and venue snapshots through the
/// catalog port and runs the analyzer over them.
pub struct QualityUseCase {
    catalog: Arc<dyn CatalogPort>,
    analyzer: DataQualityAnalyzer,
}

impl QualityUseCase {
    pub fn new(
        catalog: Arc<dyn CatalogPort>,
        matcher: Arc<dyn VenueMatcherPort>,
        config: QualityConfig,
    ) -> Self {
        Self {
            catalog,
            analyzer: DataQualityAnalyzer::new(config, matcher),
        }
    }

    pub async fn run(&self) -> Result<QualityAnalysis> {
        let start = Instant::now();
        emit_counter(MetricName::QualityAnalysisRuns, 1.0);

        let events = self
            .catalog
            .all_events()
            .await
            .map_err(ProcessingError::Catalog)?;
        let venues = self
            .catalog
            .all_venues()
            .await
            .map_err(ProcessingError::Catalog)?;

        info!(
            events = events.len(),
            venues = venues.len(),
            "starting catalog quality analysis"
        );
        let analysis = self.analyzer.analyze(&events, &venues);

        emit_counter(
            MetricName::QualityIssuesDetected,
            analysis.issues.len() as f64,
        );
        emit_gauge(
            MetricName::QualityDuplicateGroups,
            analysis.duplicate_groups.len() as f64,
        );
        emit_gauge(
            MetricName::QualityVenueSuggestions,
            analysis.venue_suggestions.len() as f64,
        );
        emit_gauge(MetricName::QualityHealthScore, analysis.health_score as f64);
        emit_histogram(
            MetricName::QualityAnalysisDuration,
            start.elapsed().as_secs_f64(),
        );

        Ok(analysis)
    }
}
