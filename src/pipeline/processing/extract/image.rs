use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::{text, ProcessingResult, SourceInput, SourcePayload, SourceProcessor};
use crate::app::ports::{VisionExtraction, VisionPort};
use crate::domain::{EventRecord, FusableField, ParsedField, SourceType};

pub const PROCESSOR_NAME: &str = "image_processor";

/// Fields checked by the plausibility pass: a usable flyer scan should fill
/// at least three of these.
const KEY_FIELDS: [FusableField; 5] = [
    FusableField::Title,
    FusableField::Date,
    FusableField::Location,
    FusableField::Description,
    FusableField::Organizer,
];

/// Adapter over an external vision extraction service. Maps the service's
/// flat field+confidence maps onto an `EventRecord` and attaches plausibility
/// warnings.
pub struct ImageProcessor {
    vision: Arc<dyn VisionPort>,
}

impl ImageProcessor {
    pub fn new(vision: Arc<dyn VisionPort>) -> Self {
        Self { vision }
    }

    fn map_extraction(&self, extraction: &VisionExtraction) -> EventRecord {
        let mut record = EventRecord {
            source_type: Some(SourceType::Image),
            ..EventRecord::default()
        };

        for field in FusableField::ALL {
            if let Some(value) = extraction.fields.get(field.name()) {
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                let confidence = extraction
                    .confidences
                    .get(field.name())
                    .copied()
                    .unwrap_or(50);
                record.set_field(
                    field,
                    Some(ParsedField::new(value, confidence, PROCESSOR_NAME)),
                );
            }
        }

        if let Some(categories) = extraction.fields.get("categories") {
            record.categories = categories
                .split(',')
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .take(3)
                .collect();
        }
        if let Some(tags) = extraction.fields.get("tags") {
            record.tags = tags
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .take(10)
                .collect();
        }

        record.overall_confidence = text::overall_confidence(&record);
        record
    }

    fn plausibility_warnings(&self, record: &EventRecord) -> Vec<String> {
        let mut warnings = Vec::new();

        if record.overall_confidence < 60 {
            warnings.push(format!(
                "low overall extraction confidence ({})",
                record.overall_confidence
            ));
        }

        if let Some(title) = &record.title {
            let total = title.value.chars().filter(|c| !c.is_whitespace()).count();
            let noise = title
                .value
                .chars()
                .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
                .count();
            if total > 0 && noise * 10 > total * 3 {
                warnings.push("title contains unusual non-alphanumeric noise".to_string());
            }
        }

        if let Some(date) = &record.date {
            if !date.value.chars().any(|c| c.is_ascii_digit()) {
                warnings.push("extracted date contains no digits".to_string());
            }
        }

        let populated = KEY_FIELDS
            .iter()
            .filter(|f| record.field(**f).is_some())
            .count();
        if populated < 3 {
            warnings.push(format!(
                "only {} of {} key fields populated",
                populated,
                KEY_FIELDS.len()
            ));
        }

        warnings
    }
}

#[async_trait]
impl SourceProcessor for ImageProcessor {
    fn source_type(&self) -> SourceType {
        SourceType::Image
    }

    fn can_handle(&self, input: &SourceInput) -> bool {
        matches!(
            &input.payload,
            SourcePayload::Image { bytes, mime } if !bytes.is_empty() && mime.starts_with("image/")
        )
    }

    async fn process(&self, input: &SourceInput) -> ProcessingResult {
        let start = Instant::now();
        let (bytes, mime) = match &input.payload {
            SourcePayload::Image { bytes, mime } => (bytes, mime),
            _ => {
                return ProcessingResult::failed(
                    "image processor received a non-image payload",
                    start.elapsed().as_millis() as u64,
                )
            }
        };

        let extraction = match self.vision.extract_from_image(bytes, mime).await {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!("vision extraction call failed: {}", e);
                return ProcessingResult::failed(
                    format!("vision extraction failed: {}", e),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        if !extraction.success {
            let message = extraction
                .error
                .unwrap_or_else(|| "vision service reported failure".to_string());
            return ProcessingResult::failed(
                format!("vision extraction failed: {}", message),
                start.elapsed().as_millis() as u64,
            );
        }

        let record = self.map_extraction(&extraction);
        let warnings = self.plausibility_warnings(&record);
        debug!(
            fields = record.populated_fields().len(),
            warnings = warnings.len(),
            "image extraction complete"
        );
        ProcessingResult::ok(record, warnings, start.elapsed().as_millis() as u64)
    }
}
