//! End-to-end orchestration over real processors with stubbed outer ports.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use event_fusion::app::ports::{FetchedPage, VisionExtraction, VisionPort, WebFetchPort};
use event_fusion::app::Orchestrator;
use event_fusion::config::PipelineConfig;
use event_fusion::domain::{FusableField, SourceType};
use event_fusion::pipeline::processing::extract::{
    ImageProcessor, ProcessorRegistry, SourceInput, TextProcessor, UrlProcessor,
};
use event_fusion::pipeline::processing::fusion::FusionStrategy;
use event_fusion::progress::Stage;
use event_fusion::ProcessingError;

const FLYER_TEXT: &str = "SUMMER JAZZ NIGHT\n\
Friday 12 July 2026, 7:30pm\n\
At The Corner House, 14 Mill Road\n\
An evening of swing and bebop with the City Quartet.\n\
Tickets: £12 adv\n\
#jazz #livemusic";

const EVENT_PAGE: &str = r#"<html><head>
<script type="application/ld+json">
{"@context":"https://schema.org","@type":"MusicEvent",
 "name":"Summer Jazz Night",
 "startDate":"2026-07-12T19:30",
 "location":{"@type":"Place","name":"The Corner House","address":{"streetAddress":"14 Mill Road"}},
 "offers":{"price":"15","priceCurrency":"GBP"},
 "description":"An evening of swing and bebop with the City Quartet."}
</script>
</head><body><h1>Summer Jazz Night</h1></body></html>"#;

struct PageFetcher {
    body: String,
}

#[async_trait]
impl WebFetchPort for PageFetcher {
    async fn fetch(
        &self,
        _url: &str,
        _timeout: Duration,
        _headers: &[(String, String)],
    ) -> Result<FetchedPage, String> {
        Ok(FetchedPage {
            body: self.body.clone(),
            content_type: "text/html".to_string(),
            status: 200,
        })
    }
}

struct StubVision {
    result: Result<VisionExtraction, String>,
}

impl StubVision {
    fn extracting(fields: &[(&str, &str, u8)]) -> Self {
        let mut field_map = HashMap::new();
        let mut confidence_map = HashMap::new();
        for (name, value, confidence) in fields {
            field_map.insert(name.to_string(), value.to_string());
            confidence_map.insert(name.to_string(), *confidence);
        }
        Self {
            result: Ok(VisionExtraction {
                fields: field_map,
                confidences: confidence_map,
                success: true,
                error: None,
            }),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl VisionPort for StubVision {
    async fn extract_from_image(
        &self,
        _bytes: &[u8],
        _mime: &str,
    ) -> Result<VisionExtraction, String> {
        self.result.clone()
    }
}

fn full_registry(vision: StubVision, page: &str) -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(TextProcessor::new()));
    registry.register(Arc::new(ImageProcessor::new(Arc::new(vision))));
    registry.register(Arc::new(UrlProcessor::new(Arc::new(PageFetcher {
        body: page.to_string(),
    }))));
    registry
}

fn all_three_inputs() -> Vec<SourceInput> {
    vec![
        SourceInput::text(FLYER_TEXT),
        SourceInput::image(vec![0xFF, 0xD8, 0xFF], "image/jpeg"),
        SourceInput::url("https://example.org/jazz-night"),
    ]
}

#[tokio::test]
async fn three_sources_fuse_into_one_record() {
    let vision = StubVision::extracting(&[
        ("title", "Summer Jazz Night", 80),
        ("date", "12 July 2026", 75),
        ("location", "Corner House", 70),
    ]);
    let orchestrator = Orchestrator::new(
        full_registry(vision, EVENT_PAGE),
        PipelineConfig::default(),
    );

    let result = orchestrator.process_sources(all_three_inputs()).await.unwrap();

    assert_eq!(result.sources_attempted, 3);
    assert_eq!(result.sources_succeeded, 3);
    assert_eq!(result.source_results.len(), 3);

    let fused = &result.fusion.fused;
    assert_eq!(fused.title.as_ref().unwrap().value, "Summer Jazz Night");

    // The structured page wins the ticket disagreement on confidence
    assert_eq!(fused.ticket_info.as_ref().unwrap().value, "15 GBP");
    assert!(result
        .fusion
        .conflicts
        .iter()
        .any(|c| c.field == FusableField::TicketInfo));

    // Date representations disagree across sources, which flags review
    assert!(result
        .fusion
        .conflicts
        .iter()
        .any(|c| c.field == FusableField::Date));
    assert!(result.fusion.needs_review);

    assert!(result.gap_report.completeness > 0);
    assert_eq!(orchestrator.progress().get().stage, Stage::Complete);
}

#[tokio::test]
async fn failing_source_does_not_sink_the_run() {
    let orchestrator = Orchestrator::new(
        full_registry(StubVision::failing("ocr backend offline"), EVENT_PAGE),
        PipelineConfig::default(),
    );

    let result = orchestrator.process_sources(all_three_inputs()).await.unwrap();

    assert_eq!(result.source_results.len(), 3);
    assert_eq!(result.sources_succeeded, 2);
    let image_result = &result.source_results[1];
    assert!(!image_result.success);
    assert!(image_result
        .error
        .as_ref()
        .unwrap()
        .contains("ocr backend offline"));

    // Fusion still ran over the two survivors
    assert_eq!(
        result.fusion.fused.title.as_ref().unwrap().value,
        "Summer Jazz Night"
    );
}

#[tokio::test]
async fn priority_override_steers_source_priority_strategy() {
    let mut config = PipelineConfig::default();
    config
        .fusion
        .field_strategies
        .insert("title".to_string(), FusionStrategy::SourcePriority);

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(TextProcessor::new()));
    registry.register(Arc::new(UrlProcessor::new(Arc::new(PageFetcher {
        body: EVENT_PAGE.to_string(),
    }))));
    let orchestrator = Orchestrator::new(registry, config);

    let result = orchestrator
        .process_sources(vec![
            SourceInput::text("SPECIAL LATE SET\nFriday 12 July 2026, 7:30pm").with_priority(9),
            SourceInput::url("https://example.org/jazz-night"),
        ])
        .await
        .unwrap();

    // The pinned text source outranks the structured page for the title
    assert_eq!(
        result.fusion.fused.title.as_ref().unwrap().value,
        "Special Late Set"
    );
}

#[tokio::test]
async fn inadmissible_inputs_are_dropped_with_warnings() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(TextProcessor::new()));
    let orchestrator = Orchestrator::new(registry, PipelineConfig::default());

    let result = orchestrator
        .process_sources(vec![
            SourceInput::text(FLYER_TEXT),
            SourceInput::image(vec![1, 2, 3], "image/png"),
        ])
        .await
        .unwrap();

    assert_eq!(result.sources_attempted, 1);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("no processor can handle")));
}

#[tokio::test]
async fn run_with_only_inadmissible_inputs_errors() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(TextProcessor::new()));
    let orchestrator = Orchestrator::new(registry, PipelineConfig::default());

    let err = orchestrator
        .process_sources(vec![SourceInput::url("not-a-url")])
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessingError::NoAdmissibleSources(_)));
}

#[tokio::test]
async fn single_source_passes_through() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(TextProcessor::new()));
    let orchestrator = Orchestrator::new(registry, PipelineConfig::default());

    let result = orchestrator
        .process_sources(vec![SourceInput::text(FLYER_TEXT)])
        .await
        .unwrap();

    assert_eq!(result.fusion.agreement, 100);
    assert!(result.fusion.conflicts.is_empty());
    assert_eq!(
        result.fusion.fused.source_type,
        Some(SourceType::Text)
    );
}
